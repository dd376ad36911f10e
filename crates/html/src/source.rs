//! Token source interface
//!
//! A host parser hands out token sources; a token source walks one input
//! token by token and answers questions about the current token. The tree
//! builder only ever talks to these traits.

use parsetrail_dom::{CompatMode, Namespace, Span};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of the token a source is currently paused on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenType {
    #[serde(rename = "#tag")]
    Tag,
    #[serde(rename = "#text")]
    Text,
    #[serde(rename = "#cdata-section")]
    CdataSection,
    #[serde(rename = "#comment")]
    Comment,
    #[serde(rename = "#doctype")]
    Doctype,
    #[serde(rename = "#presumptuous-tag")]
    PresumptuousTag,
    #[serde(rename = "#funky-comment")]
    FunkyComment,
    #[serde(rename = "#xml-declaration")]
    XmlDeclaration,
    #[serde(rename = "#processing-instruction")]
    ProcessingInstruction,
}

impl TokenType {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenType::Tag => "#tag",
            TokenType::Text => "#text",
            TokenType::CdataSection => "#cdata-section",
            TokenType::Comment => "#comment",
            TokenType::Doctype => "#doctype",
            TokenType::PresumptuousTag => "#presumptuous-tag",
            TokenType::FunkyComment => "#funky-comment",
            TokenType::XmlDeclaration => "#xml-declaration",
            TokenType::ProcessingInstruction => "#processing-instruction",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the source classified a `#comment` token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommentType {
    #[serde(rename = "COMMENT_AS_HTML_COMMENT")]
    HtmlComment,
    #[serde(rename = "COMMENT_AS_ABRUPTLY_CLOSED_COMMENT")]
    AbruptlyClosed,
    #[serde(rename = "COMMENT_AS_CDATA_LOOKALIKE")]
    CdataLookalike,
    #[serde(rename = "COMMENT_AS_PI_NODE_LOOKALIKE")]
    PiLookalike,
    #[serde(rename = "COMMENT_AS_INVALID_HTML")]
    InvalidHtml,
}

/// Attribute value as reported by the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Attribute written without a value
    Boolean(bool),
    Text(String),
}

impl AttributeValue {
    /// Valueless attributes read as the empty string in the tree
    pub fn into_string(self) -> String {
        match self {
            AttributeValue::Boolean(_) => String::new(),
            AttributeValue::Text(value) => value,
        }
    }
}

/// Fields of a DOCTYPE token
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DoctypeInfo {
    pub name: Option<String>,
    pub public_identifier: Option<String>,
    pub system_identifier: Option<String>,
    pub indicated_compatability_mode: CompatMode,
}

/// Terminal error reported by a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    pub message: String,
    /// Description of the construct the source refused to handle, if that is why it stopped
    #[serde(default)]
    pub unsupported: Option<String>,
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            unsupported: None,
        }
    }

    pub fn unsupported(detail: impl Into<String>) -> Self {
        Self {
            message: "unsupported".to_string(),
            unsupported: Some(detail.into()),
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unsupported {
            Some(detail) => write!(f, "{}: {}", self.message, detail),
            None => f.write_str(&self.message),
        }
    }
}

/// Optional features of a host parser, queried once per host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// Can tell whether the current token was synthesized by the parser
    pub virtual_nodes: bool,
    /// Can parse a complete document
    pub full_parser: bool,
    /// Can start a fragment parser at an element found in another parse
    pub fragment_at_node: bool,
    /// Reports namespace-adjusted tag names
    pub qualified_names: bool,
    /// Reports DOCTYPE fields
    pub doctype_info: bool,
    /// Can evaluate a CSS selector against the current token
    pub selector_matching: bool,
    /// Can tokenize XML documents, reporting declarations and processing instructions
    #[serde(default)]
    pub xml_parser: bool,
}

impl Capabilities {
    /// Everything supported
    pub fn all() -> Self {
        Self {
            virtual_nodes: true,
            full_parser: true,
            fragment_at_node: true,
            qualified_names: true,
            doctype_info: true,
            selector_matching: true,
            xml_parser: true,
        }
    }

    /// A fragment-only source with no optional accessors
    pub fn minimal() -> Self {
        Self {
            virtual_nodes: false,
            full_parser: false,
            fragment_at_node: false,
            qualified_names: false,
            doctype_info: false,
            selector_matching: false,
            xml_parser: false,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::minimal()
    }
}

/// Element a fragment parse is started inside of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextElement {
    /// Tag name as reported by `tag()`
    pub name: String,
    pub namespace: Namespace,
    /// Breadcrumbs of the element in the parse that found it
    pub breadcrumbs: Vec<String>,
    pub attributes: Vec<(String, String)>,
}

/// Sequential token stream over one input
pub trait TokenSource {
    /// Advance to the next token; false at the end of input or after an error
    fn next_token(&mut self) -> bool;

    /// Type of the current token
    fn token_type(&self) -> Option<TokenType>;

    /// Upper-case tag name of the current tag, or the target of a PI-lookalike comment
    fn tag(&self) -> Option<String>;

    /// Namespace-adjusted tag name
    fn qualified_tag_name(&self) -> Option<String>;

    fn is_tag_closer(&self) -> bool;

    fn has_self_closing_flag(&self) -> bool;

    fn namespace(&self) -> Namespace;

    /// Attribute names of the current tag in source order
    fn attribute_names(&self) -> Vec<String>;

    fn attribute(&self, name: &str) -> Option<AttributeValue>;

    /// Decoded text of the current text, comment or self-contained element
    fn modifiable_text(&self) -> String;

    fn comment_type(&self) -> Option<CommentType>;

    fn doctype_info(&self) -> Option<DoctypeInfo>;

    /// Names of the open elements, ending with the current token
    fn breadcrumbs(&self) -> Vec<String>;

    fn current_depth(&self) -> usize;

    /// Label of the tree-construction state that processed the current token
    fn insertion_mode(&self) -> Option<String>;

    /// `None` when virtual-node detection is unsupported
    fn is_virtual(&self) -> Option<bool>;

    /// Input bytes of the current token
    fn token_span(&self) -> Option<Span>;

    fn last_error(&self) -> Option<SourceError>;

    fn paused_at_incomplete_token(&self) -> bool;

    /// Evaluate `selector` against the current token, `None` when unsupported
    fn matches_selector(&self, selector: &str) -> Option<bool>;
}

/// Factory for token sources
pub trait HostParser {
    type Source: TokenSource;

    fn capabilities(&self) -> Capabilities;

    /// Parser for a complete document, `None` if it cannot be created
    fn create_full_parser(&self, input: &str) -> Option<Self::Source>;

    /// Parser for a fragment inside `context`, or inside the default context when absent
    fn create_fragment(&self, input: &str, context: Option<&ContextElement>) -> Option<Self::Source>;

    /// Parser for an XML document, `None` if the host only speaks HTML
    fn create_xml_parser(&self, _input: &str) -> Option<Self::Source> {
        None
    }
}
