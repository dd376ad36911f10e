//! DOM Node representation

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Byte range of the input that produced a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub length: usize,
}

impl Span {
    pub fn new(start: usize, length: usize) -> Self {
        Self { start, length }
    }

    /// Zero-length span, used for tokens the source synthesized
    pub fn empty_at(start: usize) -> Self {
        Self { start, length: 0 }
    }

    /// One past the last byte covered
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Whether the span lies inside an input of `len` bytes
    pub fn fits(&self, len: usize) -> bool {
        self.end() <= len
    }

    /// The covered text, if the span is in bounds and on char boundaries
    pub fn slice<'a>(&self, input: &'a str) -> Option<&'a str> {
        input.get(self.start..self.end())
    }

    /// Split the input into the text before, inside and after the span
    pub fn split<'a>(&self, input: &'a str) -> Option<(&'a str, &'a str, &'a str)> {
        let before = input.get(..self.start)?;
        let selected = input.get(self.start..self.end())?;
        let after = input.get(self.end()..)?;
        Some((before, selected, after))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.start, self.length)
    }
}

/// Element namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    #[default]
    Html,
    Svg,
    Math,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Html => "html",
            Namespace::Svg => "svg",
            Namespace::Math => "math",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document rendering-compatibility classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompatMode {
    Quirks,
    LimitedQuirks,
    #[default]
    NoQuirks,
}

impl CompatMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CompatMode::Quirks => "quirks",
            CompatMode::LimitedQuirks => "limited-quirks",
            CompatMode::NoQuirks => "no-quirks",
        }
    }
}

impl fmt::Display for CompatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a comment node came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommentKind {
    HtmlComment,
    AbruptlyClosed,
    PresumptuousTag,
    FunkyComment,
    CdataLookalike,
    PiLookalike,
    InvalidHtml,
}

impl CommentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommentKind::HtmlComment => "html-comment",
            CommentKind::AbruptlyClosed => "abruptly-closed",
            CommentKind::PresumptuousTag => "presumptuous-tag",
            CommentKind::FunkyComment => "funky-comment",
            CommentKind::CdataLookalike => "cdata-lookalike",
            CommentKind::PiLookalike => "pi-lookalike",
            CommentKind::InvalidHtml => "invalid-html",
        }
    }
}

/// Element attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// There is no default-attribute concept, every attribute was written
    pub fn specified(&self) -> bool {
        true
    }
}

impl Serialize for Attribute {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("nodeType", &Node::ATTRIBUTE_NODE)?;
        map.serialize_entry("specified", &self.specified())?;
        map.serialize_entry("nodeName", &self.name)?;
        map.serialize_entry("nodeValue", &self.value)?;
        map.end()
    }
}

/// DOCTYPE fields
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctypeData {
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
}

/// Element-specific data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    /// Qualified name, prefixed with the namespace outside of HTML
    pub name: String,
    pub namespace: Namespace,
    pub attributes: Vec<Attribute>,
    pub is_closer: bool,
    /// Selector match reported by the token source, when one was requested
    pub matches_selector: Option<bool>,
}

impl ElementData {
    pub fn new(name: impl Into<String>, namespace: Namespace) -> Self {
        Self {
            name: name.into(),
            namespace,
            attributes: Vec::new(),
            is_closer: false,
            matches_selector: None,
        }
    }

    pub fn closer(name: impl Into<String>, namespace: Namespace) -> Self {
        Self {
            is_closer: true,
            ..Self::new(name, namespace)
        }
    }

    /// Name without the namespace prefix
    pub fn local_name(&self) -> &str {
        match self.name.split_once(' ') {
            Some((_, local)) if self.namespace != Namespace::Html => local,
            _ => &self.name,
        }
    }

    /// Get an attribute value (first occurrence)
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.get_attribute("id")
    }
}

/// Type of node and associated data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    DocumentType(DoctypeData),
    Element(ElementData),
    Text(String),
    CdataSection(String),
    Comment { value: String, kind: CommentKind },
    ProcessingInstruction { target: String, data: String },
}

/// Where a node came from in the token stream
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Diagnostics {
    /// `None` for nodes the builder synthesized
    pub span: Option<Span>,
    pub breadcrumbs: Vec<String>,
    /// Ancestors (document excluded) when the node was appended
    pub depth: usize,
    pub insertion_mode: Option<String>,
    /// `None` when the token source cannot detect virtual nodes
    pub is_virtual: Option<bool>,
}

/// A node in a parse tree
///
/// Children are shared handles so a finished snapshot can alias every
/// subtree that later tokens leave untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub children: Vec<Arc<Node>>,
    pub diagnostics: Option<Diagnostics>,
}

impl Node {
    pub const ELEMENT_NODE: u8 = 1;
    pub const ATTRIBUTE_NODE: u8 = 2;
    pub const TEXT_NODE: u8 = 3;
    pub const CDATA_SECTION_NODE: u8 = 4;
    pub const PROCESSING_INSTRUCTION_NODE: u8 = 7;
    pub const COMMENT_NODE: u8 = 8;
    pub const DOCUMENT_NODE: u8 = 9;
    pub const DOCUMENT_TYPE_NODE: u8 = 10;

    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
            diagnostics: None,
        }
    }

    pub fn document() -> Self {
        Self::new(NodeKind::Document)
    }

    pub fn element(data: ElementData) -> Self {
        Self::new(NodeKind::Element(data))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(NodeKind::Text(value.into()))
    }

    pub fn comment(value: impl Into<String>, kind: CommentKind) -> Self {
        Self::new(NodeKind::Comment {
            value: value.into(),
            kind,
        })
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(Arc::new(child));
        self
    }

    /// DOM `nodeType` number
    pub fn node_type(&self) -> u8 {
        match self.kind {
            NodeKind::Document => Self::DOCUMENT_NODE,
            NodeKind::DocumentType(_) => Self::DOCUMENT_TYPE_NODE,
            NodeKind::Element(_) => Self::ELEMENT_NODE,
            NodeKind::Text(_) => Self::TEXT_NODE,
            NodeKind::CdataSection(_) => Self::CDATA_SECTION_NODE,
            NodeKind::Comment { .. } => Self::COMMENT_NODE,
            NodeKind::ProcessingInstruction { .. } => Self::PROCESSING_INSTRUCTION_NODE,
        }
    }

    /// DOM `nodeName`
    pub fn node_name(&self) -> &str {
        match &self.kind {
            NodeKind::Document => "#document",
            NodeKind::DocumentType(doctype) => &doctype.name,
            NodeKind::Element(element) => &element.name,
            NodeKind::Text(_) => "#text",
            NodeKind::CdataSection(_) => "#cdata-section",
            NodeKind::Comment { .. } => "#comment",
            NodeKind::ProcessingInstruction { target, .. } => target,
        }
    }

    /// DOM `nodeValue`
    pub fn node_value(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Text(value) | NodeKind::CdataSection(value) => Some(value),
            // The text lives on the synthetic processing instruction child
            NodeKind::Comment {
                kind: CommentKind::PiLookalike,
                ..
            } => None,
            NodeKind::Comment { value, .. } => Some(value),
            NodeKind::ProcessingInstruction { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self.kind, NodeKind::Element(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, NodeKind::Text(_))
    }

    pub fn is_comment(&self) -> bool {
        matches!(self.kind, NodeKind::Comment { .. })
    }

    /// Whether this node is an element closer
    pub fn is_closer(&self) -> bool {
        self.as_element().map(|e| e.is_closer).unwrap_or(false)
    }

    /// Element, document and comment nodes may hold children
    pub fn can_have_children(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Document | NodeKind::Element(_) | NodeKind::Comment { .. }
        )
    }

    pub fn as_element(&self) -> Option<&ElementData> {
        match &self.kind {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn tag_name(&self) -> Option<&str> {
        self.as_element().map(|e| e.name.as_str())
    }

    pub fn span(&self) -> Option<Span> {
        self.diagnostics.as_ref().and_then(|d| d.span)
    }

    pub fn depth(&self) -> Option<usize> {
        self.diagnostics.as_ref().map(|d| d.depth)
    }

    pub fn child(&self, index: usize) -> Option<&Node> {
        self.children.get(index).map(|c| c.as_ref())
    }

    /// Nodes in this subtree, including this one
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("nodeType", &self.node_type())?;
        map.serialize_entry("nodeName", self.node_name())?;
        if let Some(value) = self.node_value() {
            map.serialize_entry("nodeValue", value)?;
        }

        match &self.kind {
            NodeKind::DocumentType(doctype) => {
                map.serialize_entry("publicId", &doctype.public_id)?;
                map.serialize_entry("systemId", &doctype.system_id)?;
            }
            NodeKind::Element(element) => {
                map.serialize_entry("attributes", &element.attributes)?;
                map.serialize_entry("_namespace", &element.namespace)?;
                map.serialize_entry("_closer", &element.is_closer)?;
                if let Some(matches) = element.matches_selector {
                    map.serialize_entry("_matches", &matches)?;
                }
            }
            NodeKind::Comment { kind, .. } => {
                map.serialize_entry("_commentType", kind)?;
            }
            _ => {}
        }

        map.serialize_entry("childNodes", &self.children)?;

        if let Some(diagnostics) = &self.diagnostics {
            map.serialize_entry("_span", &diagnostics.span)?;
            map.serialize_entry("_bc", &diagnostics.breadcrumbs)?;
            map.serialize_entry("_depth", &diagnostics.depth)?;
            map.serialize_entry("_mode", &diagnostics.insertion_mode)?;
            map.serialize_entry("_virtual", &diagnostics.is_virtual)?;
        }
        map.end()
    }
}
