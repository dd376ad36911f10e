//! Tree builder
//!
//! Rebuilds a document tree from a token source. The builder keeps a cursor,
//! the child indices leading from the root to the node new tokens are
//! appended under. Before each token it compares the cursor with the depth
//! the source reports: when the token sits shallower than the cursor, the
//! cursor pops once. Openers that can have children then push their own
//! index; closers, void elements, self-closing foreign elements and
//! self-contained elements never do.
//!
//! XML builds start from an empty document. Every opener that is not
//! self-closing pushes, and declarations and processing instructions become
//! nodes of their own.

use log::{debug, trace, warn};
use parsetrail_dom::elements::{is_self_contained_element, is_void_element};
use parsetrail_dom::{
    Attribute, CommentKind, CompatMode, Diagnostics, DoctypeData, DomTree, ElementData, Namespace, Node, NodeKind,
    NodePath,
};
use parsetrail_html::{Capabilities, CommentType, ContextElement, HostParser, TokenSource, TokenType};
use serde::Serialize;

use crate::assemble::{terminal_error, BuildResult};
use crate::error::{BuildError, BuilderResult};
use crate::options::{BuildOptions, Markup};
use crate::recorder::Recorder;

/// Flat listing entry for one consumed token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    #[serde(rename = "type")]
    pub token_type: TokenType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closer: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_type: Option<CommentType>,
}

/// Everything learned from parsing the context HTML
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedContext {
    pub element: ContextElement,
    /// Name of the context element as it would appear in the tree
    pub node_name: String,
    pub compat_mode: CompatMode,
    pub doctype: Option<DoctypeData>,
    pub title: Option<String>,
}

/// Incremental tree construction state for one build
#[derive(Debug)]
pub struct TreeBuilder {
    tree: DomTree,
    cursor: NodePath,
    /// Levels the source counts that have no node in this tree
    depth_offset: usize,
    capabilities: Capabilities,
    markup: Markup,
    selector: Option<String>,
    compat_mode: CompatMode,
    doctype: Option<DoctypeData>,
    title: Option<String>,
    warnings: Vec<String>,
    tokens: Vec<TokenRecord>,
}

impl TreeBuilder {
    fn new(capabilities: Capabilities, markup: Markup, selector: Option<String>, compat_mode: CompatMode) -> Self {
        let mut builder = Self {
            tree: DomTree::new(),
            cursor: NodePath::new(),
            depth_offset: 0,
            capabilities,
            markup,
            selector,
            compat_mode,
            doctype: None,
            title: None,
            warnings: Vec::new(),
            tokens: Vec::new(),
        };

        if !capabilities.virtual_nodes {
            builder.warn("Token source cannot detect virtual nodes; virtual flags are unknown");
        }
        if markup == Markup::Html && !capabilities.qualified_names {
            builder.warn("Token source does not report qualified tag names; using plain tag names");
        }
        if builder.selector.is_some() && !capabilities.selector_matching {
            builder.warn("Token source cannot match selectors; selector ignored");
        }
        builder
    }

    /// Builder for a full document parse
    pub fn document(capabilities: Capabilities, selector: Option<String>) -> Self {
        Self::new(capabilities, Markup::Html, selector, CompatMode::Quirks)
    }

    /// Builder for an XML document
    pub fn xml(capabilities: Capabilities, selector: Option<String>) -> Self {
        Self::new(capabilities, Markup::Xml, selector, CompatMode::NoQuirks)
    }

    /// Builder for a fragment parsed without a context element
    ///
    /// The HTML, HEAD and BODY elements the source assumes are created up
    /// front, without spans, and tokens are appended under BODY.
    pub fn fragment(capabilities: Capabilities, selector: Option<String>) -> BuilderResult<Self> {
        let mut builder = Self::new(capabilities, Markup::Html, selector, CompatMode::NoQuirks);
        let html = builder
            .tree
            .append_child(&[], Node::element(ElementData::new("HTML", Namespace::Html)))?;
        builder
            .tree
            .append_child(&[html], Node::element(ElementData::new("HEAD", Namespace::Html)))?;
        let body = builder
            .tree
            .append_child(&[html], Node::element(ElementData::new("BODY", Namespace::Html)))?;
        builder.cursor.push(html);
        builder.cursor.push(body);
        Ok(builder)
    }

    /// Builder for a fragment inside a resolved context element
    ///
    /// The context element is not part of the tree but the source counts it,
    /// so reported depths are one deeper than the tree.
    pub fn in_context(capabilities: Capabilities, selector: Option<String>, context: &ResolvedContext) -> Self {
        let mut builder = Self::new(capabilities, Markup::Html, selector, context.compat_mode);
        builder.depth_offset = 1;
        builder.doctype = context.doctype.clone();
        builder.title = context.title.clone();
        builder
    }

    pub fn tree(&self) -> &DomTree {
        &self.tree
    }

    pub fn cursor(&self) -> &[usize] {
        &self.cursor
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn warn(&mut self, message: &str) {
        if self.warnings.iter().any(|w| w == message) {
            return;
        }
        warn!("{}", message);
        self.warnings.push(message.to_string());
    }

    /// Apply the source's current token to the tree
    pub fn apply<S: TokenSource>(&mut self, source: &S) -> BuilderResult<()> {
        let depth = source.current_depth().saturating_sub(self.depth_offset);
        if self.cursor.len() + 1 > depth {
            self.cursor.pop();
        }

        let token_type = source
            .token_type()
            .ok_or_else(|| BuildError::UnhandledTokenType("none".to_string()))?;
        trace!(
            "Applying {} at depth {} with cursor {:?}",
            token_type,
            depth,
            self.cursor.as_slice()
        );

        let diagnostics = Diagnostics {
            span: source.token_span(),
            breadcrumbs: source.breadcrumbs(),
            depth: self.cursor.len(),
            insertion_mode: source.insertion_mode(),
            is_virtual: if self.capabilities.virtual_nodes {
                source.is_virtual()
            } else {
                None
            },
        };

        match token_type {
            TokenType::Doctype => self.apply_doctype(source, diagnostics),
            TokenType::Tag => self.apply_tag(source, diagnostics),
            TokenType::Text => {
                let text = source.modifiable_text();
                self.record(token_type, None, None, Some(text.clone()), None);
                self.append(Node::text(text).with_diagnostics(diagnostics))
            }
            TokenType::CdataSection => {
                let text = source.modifiable_text();
                self.record(token_type, None, None, Some(text.clone()), None);
                self.append(Node::new(NodeKind::CdataSection(text)).with_diagnostics(diagnostics))
            }
            TokenType::Comment => self.apply_comment(source, diagnostics),
            TokenType::PresumptuousTag | TokenType::FunkyComment => {
                let kind = if token_type == TokenType::PresumptuousTag {
                    CommentKind::PresumptuousTag
                } else {
                    CommentKind::FunkyComment
                };
                let text = source.modifiable_text();
                self.record(token_type, None, None, Some(text.clone()), source.comment_type());
                self.append(Node::comment(text, kind).with_diagnostics(diagnostics))
            }
            TokenType::XmlDeclaration | TokenType::ProcessingInstruction if self.markup == Markup::Xml => {
                self.apply_instruction(source, token_type, diagnostics)
            }
            TokenType::XmlDeclaration | TokenType::ProcessingInstruction => {
                Err(BuildError::UnhandledTokenType(token_type.to_string()))
            }
        }
    }

    fn append(&mut self, node: Node) -> BuilderResult<()> {
        self.tree.append_child(&self.cursor, node)?;
        Ok(())
    }

    fn record(
        &mut self,
        token_type: TokenType,
        name: Option<String>,
        closer: Option<bool>,
        content: Option<String>,
        comment_type: Option<CommentType>,
    ) {
        self.tokens.push(TokenRecord {
            token_type,
            name,
            closer,
            content,
            comment_type,
        });
    }

    fn apply_doctype<S: TokenSource>(&mut self, source: &S, diagnostics: Diagnostics) -> BuilderResult<()> {
        let doctype = if self.capabilities.doctype_info {
            match source.doctype_info() {
                Some(info) => {
                    self.compat_mode = info.indicated_compatability_mode;
                    DoctypeData {
                        name: info.name.unwrap_or_default(),
                        public_id: info.public_identifier,
                        system_id: info.system_identifier,
                    }
                }
                None => DoctypeData::default(),
            }
        } else {
            self.warn("Token source does not report DOCTYPE details; DOCTYPE left unnamed");
            DoctypeData::default()
        };

        self.record(TokenType::Doctype, Some(doctype.name.clone()), None, None, None);
        if self.doctype.is_none() {
            self.doctype = Some(doctype.clone());
        }
        self.append(Node::new(NodeKind::DocumentType(doctype)).with_diagnostics(diagnostics))
    }

    fn apply_tag<S: TokenSource>(&mut self, source: &S, diagnostics: Diagnostics) -> BuilderResult<()> {
        let tag = source.tag().unwrap_or_default();
        let namespace = source.namespace();
        let closer = source.is_tag_closer();
        let name = match self.markup {
            Markup::Html => element_name(source, &tag, namespace, self.capabilities),
            Markup::Xml => tag.clone(),
        };
        self.record(TokenType::Tag, Some(tag.clone()), Some(closer), None, None);

        if closer {
            let element = ElementData::closer(name, namespace);
            return self.append(Node::element(element).with_diagnostics(diagnostics));
        }

        let mut element = ElementData::new(name, namespace);
        for attribute_name in source.attribute_names() {
            let value = source
                .attribute(&attribute_name)
                .map(|value| value.into_string())
                .unwrap_or_default();
            element.attributes.push(Attribute::new(attribute_name, value));
        }
        if let Some(selector) = &self.selector {
            if self.capabilities.selector_matching {
                element.matches_selector = source.matches_selector(selector);
            }
        }

        let xml = self.markup == Markup::Xml;
        let html = !xml && namespace == Namespace::Html;
        let self_contained = html && is_self_contained_element(&tag);
        let depth = diagnostics.depth;
        let mut node = Node::element(element).with_diagnostics(diagnostics);

        if self_contained || xml {
            let text = source.modifiable_text();
            if html && tag.eq_ignore_ascii_case("TITLE") && self.title.is_none() {
                self.title = Some(normalize_title(&text));
            }
            if !text.is_empty() {
                node = node.with_child(Node::text(text).with_diagnostics(Diagnostics {
                    depth: depth + 1,
                    ..Default::default()
                }));
            }
        }

        let index = self.tree.append_child(&self.cursor, node)?;

        let leaf = (html && is_void_element(&tag)) || (!html && source.has_self_closing_flag()) || self_contained;
        if !leaf {
            self.cursor.push(index);
        }
        Ok(())
    }

    fn apply_comment<S: TokenSource>(&mut self, source: &S, diagnostics: Diagnostics) -> BuilderResult<()> {
        let comment_type = source.comment_type().ok_or(BuildError::UnhandledCommentType)?;
        let text = source.modifiable_text();
        self.record(TokenType::Comment, None, None, Some(text.clone()), Some(comment_type));

        let kind = match comment_type {
            CommentType::HtmlComment => CommentKind::HtmlComment,
            CommentType::AbruptlyClosed => CommentKind::AbruptlyClosed,
            CommentType::CdataLookalike => CommentKind::CdataLookalike,
            CommentType::PiLookalike => CommentKind::PiLookalike,
            CommentType::InvalidHtml => CommentKind::InvalidHtml,
        };

        if kind != CommentKind::PiLookalike {
            return self.append(Node::comment(text, kind).with_diagnostics(diagnostics));
        }

        // The instruction child carries the text, the comment stays empty
        let instruction = Node::new(NodeKind::ProcessingInstruction {
            target: source.tag().unwrap_or_default(),
            data: text,
        })
        .with_diagnostics(Diagnostics {
            depth: diagnostics.depth + 1,
            ..Default::default()
        });
        let node = Node::comment(String::new(), kind).with_child(instruction);
        self.append(node.with_diagnostics(diagnostics))
    }

    fn apply_instruction<S: TokenSource>(
        &mut self,
        source: &S,
        token_type: TokenType,
        diagnostics: Diagnostics,
    ) -> BuilderResult<()> {
        let target = match token_type {
            TokenType::XmlDeclaration => "xml".to_string(),
            _ => source.tag().unwrap_or_default(),
        };
        let data = source.modifiable_text();
        self.record(token_type, Some(target.clone()), None, Some(data.clone()), None);
        self.append(Node::new(NodeKind::ProcessingInstruction { target, data }).with_diagnostics(diagnostics))
    }

    /// Hand over the finished tree and metadata
    fn into_parts(self) -> (DomTree, Metadata) {
        let metadata = Metadata {
            compat_mode: self.compat_mode,
            doctype: self.doctype,
            title: self.title,
            warnings: self.warnings,
            tokens: self.tokens,
        };
        (self.tree, metadata)
    }
}

/// Document facts gathered while building
pub(crate) struct Metadata {
    pub compat_mode: CompatMode,
    pub doctype: Option<DoctypeData>,
    pub title: Option<String>,
    pub warnings: Vec<String>,
    pub tokens: Vec<TokenRecord>,
}

/// Tree name of the current tag: qualified when possible, prefixed with the
/// namespace outside HTML
fn element_name<S: TokenSource>(source: &S, tag: &str, namespace: Namespace, capabilities: Capabilities) -> String {
    let local = if capabilities.qualified_names {
        source.qualified_tag_name().unwrap_or_else(|| tag.to_string())
    } else {
        tag.to_string()
    };
    match namespace {
        Namespace::Html => local,
        foreign => format!("{} {}", foreign.as_str(), local),
    }
}

/// Collapse ASCII whitespace runs to one space and trim
pub fn normalize_title(title: &str) -> String {
    title
        .split(|c: char| matches!(c, ' ' | '\t' | '\n' | '\x0C' | '\r'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse `context_html` as a document and take its last opened element
pub fn resolve_context<H: HostParser>(host: &H, context_html: &str) -> BuilderResult<ResolvedContext> {
    let capabilities = host.capabilities();
    if !capabilities.full_parser || !capabilities.fragment_at_node {
        return Err(BuildError::ContextResolution(
            "token source cannot parse fragments inside a context element".to_string(),
        ));
    }

    let mut source = host
        .create_full_parser(context_html)
        .ok_or(BuildError::SourceUnavailable("context HTML"))?;

    let mut resolved: Option<(ContextElement, String)> = None;
    let mut compat_mode = CompatMode::Quirks;
    let mut doctype = None;
    let mut title = None;

    while source.next_token() {
        match source.token_type() {
            Some(TokenType::Doctype) if doctype.is_none() => {
                if let Some(info) = source.doctype_info() {
                    compat_mode = info.indicated_compatability_mode;
                    doctype = Some(DoctypeData {
                        name: info.name.unwrap_or_default(),
                        public_id: info.public_identifier,
                        system_id: info.system_identifier,
                    });
                }
            }
            Some(TokenType::Tag) if !source.is_tag_closer() => {
                let tag = source.tag().unwrap_or_default();
                let namespace = source.namespace();
                if namespace == Namespace::Html && tag.eq_ignore_ascii_case("TITLE") && title.is_none() {
                    title = Some(normalize_title(&source.modifiable_text()));
                }

                let attributes = source
                    .attribute_names()
                    .into_iter()
                    .map(|name| {
                        let value = source.attribute(&name).map(|v| v.into_string()).unwrap_or_default();
                        (name, value)
                    })
                    .collect();
                let node_name = element_name(&source, &tag, namespace, capabilities);
                resolved = Some((
                    ContextElement {
                        name: tag,
                        namespace,
                        breadcrumbs: source.breadcrumbs(),
                        attributes,
                    },
                    node_name,
                ));
            }
            _ => {}
        }
    }

    if let Some(error) = source.last_error() {
        return Err(BuildError::ContextResolution(format!("context HTML failed to parse: {}", error)));
    }
    if source.paused_at_incomplete_token() {
        return Err(BuildError::ContextResolution(
            "context HTML ends inside an incomplete token".to_string(),
        ));
    }

    let (element, node_name) =
        resolved.ok_or_else(|| BuildError::ContextResolution("no element found in context HTML".to_string()))?;
    debug!("Resolved context element {} at {:?}", node_name, element.breadcrumbs);

    Ok(ResolvedContext {
        element,
        node_name,
        compat_mode,
        doctype,
        title,
    })
}

/// Build the annotated tree and its playback for `input`
pub fn build<H: HostParser>(host: &H, input: &str, options: &BuildOptions) -> BuilderResult<BuildResult> {
    let capabilities = host.capabilities();
    let selector = options.selector.clone();

    let (mut builder, mut source, context_node_name) = match (&options.context_html, options.markup) {
        (Some(_), Markup::Xml) => {
            return Err(BuildError::ContextResolution(
                "XML documents are not parsed inside a context element".to_string(),
            ));
        }
        (None, Markup::Xml) => {
            let source = host
                .create_xml_parser(input)
                .ok_or(BuildError::SourceUnavailable("XML document"))?;
            debug!("Building XML document of {} bytes", input.len());
            (TreeBuilder::xml(capabilities, selector), source, None)
        }
        (Some(context_html), Markup::Html) => {
            let context = resolve_context(host, context_html)?;
            let source = host
                .create_fragment(input, Some(&context.element))
                .ok_or(BuildError::SourceUnavailable("fragment"))?;
            debug!("Building fragment of {} bytes inside {}", input.len(), context.node_name);
            let builder = TreeBuilder::in_context(capabilities, selector, &context);
            (builder, source, Some(context.node_name))
        }
        (None, Markup::Html) if capabilities.full_parser => {
            let source = host
                .create_full_parser(input)
                .ok_or(BuildError::SourceUnavailable("document"))?;
            debug!("Building document of {} bytes", input.len());
            (TreeBuilder::document(capabilities, selector), source, None)
        }
        (None, Markup::Html) => {
            let source = host
                .create_fragment(input, None)
                .ok_or(BuildError::SourceUnavailable("fragment"))?;
            debug!("Building body fragment of {} bytes", input.len());
            (TreeBuilder::fragment(capabilities, selector)?, source, None)
        }
    };

    let mut recorder = Recorder::new(input);
    let mut consumed = 0;
    while source.next_token() {
        if let Some(span) = source.token_span() {
            consumed = consumed.max(span.end());
        }
        recorder.record(consumed, builder.tree());
        builder.apply(&source)?;
    }

    if let Some(error) = terminal_error(&source, consumed) {
        debug!("Build failed: {}", error);
        return Err(error);
    }

    let playback = recorder.finish(builder.tree());
    let (tree, metadata) = builder.into_parts();
    debug!(
        "Built {} nodes from {} tokens",
        tree.len(),
        metadata.tokens.len()
    );

    Ok(BuildResult::assemble(tree, playback, metadata, context_node_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parsetrail_dom::{Queryable, Span};
    use parsetrail_html::{
        AttributeValue, RecordedToken, ReferenceHost, Script, ScriptedHost, ScriptedSource, SourceError, Tokenizer,
    };
    use parsetrail_html::{Lexeme, Scan};
    use std::sync::Arc;

    fn build_document(input: &str) -> BuildResult {
        build(&ReferenceHost::new(), input, &BuildOptions::default()).unwrap()
    }

    fn element_children(node: &Node) -> Vec<&Node> {
        node.children
            .iter()
            .map(|c| c.as_ref())
            .filter(|c| c.is_element() && !c.is_closer())
            .collect()
    }

    #[test]
    fn test_simple_document() {
        let result = build_document("<p>Hi");
        let tree = DomTree::from(Arc::clone(&result.tree));

        let body = tree.get(&[0, 2]).unwrap();
        assert_eq!(body.tag_name(), Some("BODY"));
        let paragraphs = element_children(body);
        assert_eq!(paragraphs.len(), 1);
        assert_eq!(paragraphs[0].tag_name(), Some("P"));
        assert_eq!(paragraphs[0].children.len(), 1);
        assert_eq!(paragraphs[0].children[0].as_text(), Some("Hi"));
        assert!(paragraphs[0].children[0].is_text());

        assert_eq!(result.compat_mode, CompatMode::Quirks);
        assert!(result.doctype.is_none());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_doctype_sets_compat_mode() {
        let result = build_document("<!DOCTYPE html><p>x");
        assert_eq!(result.compat_mode, CompatMode::NoQuirks);
        assert_eq!(result.doctype.as_ref().map(|d| d.name.as_str()), Some("html"));
        assert_eq!(result.tree.children[0].node_type(), Node::DOCUMENT_TYPE_NODE);
    }

    #[test]
    fn test_malformed_comment() {
        let result = build_document("<!--> -->");
        let tree = DomTree::from(Arc::clone(&result.tree));
        let comments: Vec<&Node> = tree.walk().into_iter().map(|(_, n)| n).filter(|n| n.is_comment()).collect();

        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].node_value(), Some(""));
        assert!(matches!(
            comments[0].kind,
            NodeKind::Comment {
                kind: CommentKind::AbruptlyClosed,
                ..
            }
        ));
        assert_eq!(comments[0].span(), Some(Span::new(0, 5)));
        assert_eq!(result.tree.text_content(), " -->");
    }

    #[test]
    fn test_fragment_with_context() {
        let options = BuildOptions::default().with_context("<table>");
        let result = build(&ReferenceHost::new(), "<tr><td>x</td></tr>", &options).unwrap();

        assert_eq!(result.context_node_name.as_deref(), Some("TABLE"));
        let top = element_children(&result.tree);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].tag_name(), Some("TR"));
        assert_eq!(top[0].depth(), Some(0));

        let cells = element_children(top[0]);
        assert_eq!(cells[0].tag_name(), Some("TD"));
        assert_eq!(cells[0].depth(), Some(1));
        assert_eq!(cells[0].children[0].as_text(), Some("x"));
        assert!(result.tree.get_elements_by_tag_name("tbody").is_empty());
        assert_eq!(result.compat_mode, CompatMode::Quirks);
    }

    #[test]
    fn test_context_metadata_comes_from_context_html() {
        let options = BuildOptions::default().with_context("<!DOCTYPE html><title> A\n  page </title><ul>");
        let result = build(&ReferenceHost::new(), "<li>x", &options).unwrap();

        assert_eq!(result.context_node_name.as_deref(), Some("UL"));
        assert_eq!(result.compat_mode, CompatMode::NoQuirks);
        assert_eq!(result.document_title.as_deref(), Some("A page"));
        assert_eq!(result.doctype.map(|d| d.name), Some("html".to_string()));
    }

    #[test]
    fn test_context_element_is_passed_to_host() {
        let host = ScriptedHost::new(Capabilities::all())
            .with_script(
                "<ul class=x>",
                Script::new(vec![
                    RecordedToken::opener("UL", 3, Span::new(0, 12))
                        .with_attribute("class", AttributeValue::Text("x".into()))
                        .with_breadcrumbs(&["HTML", "BODY", "UL"]),
                    RecordedToken::closer("UL", 2, Span::new(12, 0)).virtual_token(),
                ]),
            )
            .with_script("<li>", Script::new(vec![RecordedToken::opener("LI", 2, Span::new(0, 4))]));

        let options = BuildOptions::default().with_context("<ul class=x>");
        let result = build(&host, "<li>", &options).unwrap();

        let contexts = host.requested_contexts();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].name, "UL");
        assert_eq!(contexts[0].attributes, vec![("class".to_string(), "x".to_string())]);
        assert_eq!(result.tree.children[0].tag_name(), Some("LI"));
    }

    #[test]
    fn test_context_resolution_failures() {
        let host = ReferenceHost::with_capabilities(Capabilities {
            fragment_at_node: false,
            ..Capabilities::all()
        });
        let options = BuildOptions::default().with_context("<div>");
        assert!(matches!(
            build(&host, "x", &options),
            Err(BuildError::ContextResolution(_))
        ));

        let options = BuildOptions::default().with_context("<div");
        assert!(matches!(
            build(&ReferenceHost::new(), "x", &options),
            Err(BuildError::ContextResolution(_))
        ));

        let textual = ScriptedHost::new(Capabilities::all())
            .with_script("plain", Script::new(vec![RecordedToken::text("plain", 1, Span::new(0, 5))]));
        let options = BuildOptions::default().with_context("plain");
        assert!(matches!(
            build(&textual, "x", &options),
            Err(BuildError::ContextResolution(_))
        ));
    }

    #[test]
    fn test_unterminated_input() {
        let error = build(&ReferenceHost::new(), "<div", &BuildOptions::default()).unwrap_err();
        assert!(matches!(error, BuildError::IncompleteToken { parsed: 0 }));
        assert_eq!(error.to_string(), "Paused at incomplete token after byte 0");
    }

    #[test]
    fn test_legacy_fragment_wrapper() {
        let host = ReferenceHost::with_capabilities(Capabilities::minimal());
        let result = build(&host, "<b>x</b>", &BuildOptions::default()).unwrap();
        let tree = DomTree::from(Arc::clone(&result.tree));

        assert_eq!(tree.get(&[0]).and_then(|n| n.tag_name()), Some("HTML"));
        assert_eq!(tree.get(&[0, 0]).and_then(|n| n.tag_name()), Some("HEAD"));
        assert_eq!(tree.get(&[0, 1]).and_then(|n| n.tag_name()), Some("BODY"));
        assert!(tree.get(&[0]).unwrap().diagnostics.is_none());

        let bold = tree.get(&[0, 1, 0]).unwrap();
        assert_eq!(bold.tag_name(), Some("B"));
        assert_eq!(bold.depth(), Some(2));
        assert!(tree.get(&[0, 1, 1]).unwrap().is_closer());

        assert_eq!(result.compat_mode, CompatMode::NoQuirks);
        assert_eq!(result.warnings.len(), 2);
        assert_eq!(bold.diagnostics.as_ref().and_then(|d| d.is_virtual), None);
    }

    #[test]
    fn test_unhandled_token_types() {
        let host = ScriptedHost::new(Capabilities::all()).with_script(
            "<?xml version=\"1.0\"?>",
            Script::new(vec![RecordedToken::new(TokenType::XmlDeclaration, 1, Span::new(0, 21))]),
        );
        let error = build(&host, "<?xml version=\"1.0\"?>", &BuildOptions::default()).unwrap_err();
        assert!(matches!(error, BuildError::UnhandledTokenType(ref t) if t == "#xml-declaration"));

        let untyped = RecordedToken {
            depth: 1,
            ..Default::default()
        };
        let host = ScriptedHost::new(Capabilities::all()).with_script("?", Script::new(vec![untyped]));
        assert!(matches!(
            build(&host, "?", &BuildOptions::default()),
            Err(BuildError::UnhandledTokenType(_))
        ));
    }

    #[test]
    fn test_unhandled_comment_type() {
        let host = ScriptedHost::new(Capabilities::all()).with_script(
            "<!-- -->",
            Script::new(vec![RecordedToken::comment(" ", None, 1, Span::new(0, 8))]),
        );
        assert!(matches!(
            build(&host, "<!-- -->", &BuildOptions::default()),
            Err(BuildError::UnhandledCommentType)
        ));
    }

    #[test]
    fn test_unsupported_construct_and_parse_error() {
        let error = build(&ReferenceHost::new(), "<b><i>x</b>", &BuildOptions::default()).unwrap_err();
        match error {
            BuildError::UnsupportedConstruct(detail) => assert!(detail.contains("</b>")),
            other => panic!("unexpected {:?}", other),
        }

        let host = ScriptedHost::new(Capabilities::all())
            .with_script("x", Script::default().with_error(SourceError::new("boom")));
        let error = build(&host, "x", &BuildOptions::default()).unwrap_err();
        assert!(matches!(error, BuildError::Parse(ref message) if message == "boom"));
    }

    #[test]
    fn test_selector_pass_through() {
        let script = Script::new(vec![
            RecordedToken::opener("P", 1, Span::new(0, 3)).with_matches(true),
            RecordedToken::opener("B", 2, Span::new(3, 3)),
            RecordedToken::closer("B", 1, Span::new(6, 4)).with_matches(true),
        ]);
        let host = ScriptedHost::new(Capabilities::all()).with_script("<p><b></b>", script);

        let options = BuildOptions::default().with_selector("p");
        let result = build(&host, "<p><b></b>", &options).unwrap();
        let paragraph = result.tree.child(0).unwrap();
        assert_eq!(paragraph.as_element().unwrap().matches_selector, Some(true));
        assert_eq!(paragraph.child(0).unwrap().as_element().unwrap().matches_selector, Some(false));
        assert_eq!(paragraph.child(1).unwrap().as_element().unwrap().matches_selector, None);

        let unselected = build(&host, "<p><b></b>", &BuildOptions::default()).unwrap();
        assert_eq!(unselected.tree.child(0).unwrap().as_element().unwrap().matches_selector, None);
    }

    #[test]
    fn test_selector_without_capability_warns() {
        let options = BuildOptions::default().with_selector("p");
        let result = build(&ReferenceHost::new(), "<p>", &options).unwrap();
        assert_eq!(result.warnings, vec!["Token source cannot match selectors; selector ignored"]);
        assert!(result
            .tree
            .get_elements_by_tag_name("p")
            .iter()
            .all(|p| p.as_element().unwrap().matches_selector.is_none()));
    }

    #[test]
    fn test_foreign_names() {
        let result = build_document("<svg><foreignObject></foreignObject><circle/></svg>");
        let names: Vec<&str> = result
            .tree
            .descendants()
            .into_iter()
            .filter(|n| n.is_element() && !n.is_closer())
            .filter_map(|n| n.tag_name())
            .collect();
        assert_eq!(
            names,
            vec!["HTML", "HEAD", "BODY", "svg svg", "svg foreignObject", "svg circle"]
        );

        let host = ReferenceHost::with_capabilities(Capabilities {
            qualified_names: false,
            ..Capabilities::all()
        });
        let result = build(&host, "<svg><foreignObject/></svg>", &BuildOptions::default()).unwrap();
        assert_eq!(result.tree.get_elements_by_tag_name("FOREIGNOBJECT").len(), 1);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_doctype_without_details() {
        let host = ReferenceHost::with_capabilities(Capabilities {
            doctype_info: false,
            ..Capabilities::all()
        });
        let result = build(&host, "<!DOCTYPE html>", &BuildOptions::default()).unwrap();
        assert_eq!(result.doctype.as_ref().map(|d| d.name.as_str()), Some(""));
        assert_eq!(result.compat_mode, CompatMode::Quirks);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_document_title() {
        let result = build_document("<title>\n  Hello \t world  </title><title>Second</title>");
        assert_eq!(result.document_title.as_deref(), Some("Hello world"));

        let result = build_document("<svg><title>Icon</title></svg>");
        assert_eq!(result.document_title, None);
    }

    #[test]
    fn test_self_contained_text_child() {
        let result = build_document("<script>a<b</script>");
        let script = result.tree.get_elements_by_tag_name("script")[0];
        assert_eq!(script.children.len(), 1);
        let text = script.child(0).unwrap();
        assert_eq!(text.as_text(), Some("a<b"));
        assert_eq!(text.span(), None);
        assert_eq!(text.depth(), script.depth().map(|d| d + 1));
    }

    #[test]
    fn test_pi_lookalike_child() {
        let result = build_document("<?php echo 1; ?>");
        let comment = result.tree.child(0).unwrap();
        assert!(comment.is_comment());
        assert_eq!(comment.node_value(), None);
        assert!(serde_json::to_value(comment).unwrap().get("nodeValue").is_none());
        assert_eq!(comment.span(), Some(Span::new(0, 16)));
        let instruction = comment.child(0).unwrap();
        assert_eq!(instruction.node_name(), "PHP");
        assert_eq!(instruction.node_value(), Some("echo 1; "));
        assert_eq!(instruction.span(), None);
    }

    #[test]
    fn test_presumptuous_tag_and_funky_comment() {
        let result = build_document("a</>b<//x>c");
        let tree = DomTree::from(Arc::clone(&result.tree));
        let comments: Vec<(NodePath, &Node)> = tree.walk().into_iter().filter(|(_, n)| n.is_comment()).collect();
        assert_eq!(comments.len(), 2);

        let (path, presumptuous) = &comments[0];
        assert!(matches!(
            presumptuous.kind,
            NodeKind::Comment {
                kind: CommentKind::PresumptuousTag,
                ..
            }
        ));
        assert_eq!(presumptuous.node_value(), Some(""));
        assert_eq!(presumptuous.span(), Some(Span::new(1, 3)));
        assert_eq!(presumptuous.depth(), Some(2));
        assert_eq!(tree.get(&path[..path.len() - 1]).and_then(|n| n.tag_name()), Some("BODY"));

        let (path, funky) = &comments[1];
        assert!(matches!(
            funky.kind,
            NodeKind::Comment {
                kind: CommentKind::FunkyComment,
                ..
            }
        ));
        assert_eq!(funky.node_value(), Some("/x"));
        assert_eq!(funky.span(), Some(Span::new(5, 5)));
        assert_eq!(funky.depth(), Some(2));
        assert_eq!(path.len(), 3);

        let kinds: Vec<TokenType> = result.tokens.iter().map(|t| t.token_type).collect();
        assert!(kinds.contains(&TokenType::PresumptuousTag));
        assert!(kinds.contains(&TokenType::FunkyComment));
    }

    #[test]
    fn test_cdata_section_in_foreign_content() {
        let result = build_document("<svg><![CDATA[x]]></svg>");
        let tree = DomTree::from(Arc::clone(&result.tree));
        let (path, cdata) = tree
            .walk()
            .into_iter()
            .find(|(_, n)| n.node_type() == Node::CDATA_SECTION_NODE)
            .unwrap();

        assert!(matches!(cdata.kind, NodeKind::CdataSection(ref text) if text == "x"));
        assert_eq!(cdata.node_name(), "#cdata-section");
        assert_eq!(cdata.node_value(), Some("x"));
        assert_eq!(cdata.span(), Some(Span::new(5, 13)));
        assert_eq!(cdata.depth(), Some(3));

        let parent = tree.get(&path[..path.len() - 1]).unwrap();
        assert_eq!(parent.tag_name(), Some("svg svg"));
        assert_eq!(parent.depth(), Some(2));
    }

    fn xml_host() -> ScriptedHost {
        let instruction = RecordedToken {
            tag: Some("style".to_string()),
            text: "a".to_string(),
            ..RecordedToken::new(TokenType::ProcessingInstruction, 2, Span::new(24, 11))
        }
        .with_breadcrumbs(&["r"]);
        let declaration = RecordedToken {
            text: "version=\"1.0\"".to_string(),
            ..RecordedToken::new(TokenType::XmlDeclaration, 1, Span::new(0, 21))
        };
        let script = Script::new(vec![
            declaration,
            RecordedToken::opener("r", 1, Span::new(21, 3)).with_breadcrumbs(&["r"]),
            instruction,
            RecordedToken {
                self_closing: true,
                ..RecordedToken::opener("a", 2, Span::new(35, 4)).with_breadcrumbs(&["r", "a"])
            },
            RecordedToken::text("hi", 2, Span::new(39, 2)),
            RecordedToken::closer("r", 1, Span::new(41, 4)),
        ]);
        ScriptedHost::new(Capabilities::all()).with_script(XML_INPUT, script)
    }

    const XML_INPUT: &str = "<?xml version=\"1.0\"?><r><?style a?><a/>hi</r>";

    #[test]
    fn test_xml_document() {
        let options = BuildOptions::default().with_markup(Markup::Xml);
        let result = build(&xml_host(), XML_INPUT, &options).unwrap();
        let tree = DomTree::from(Arc::clone(&result.tree));

        let declaration = tree.get(&[0]).unwrap();
        assert_eq!(declaration.node_type(), Node::PROCESSING_INSTRUCTION_NODE);
        assert_eq!(declaration.node_name(), "xml");
        assert_eq!(declaration.node_value(), Some("version=\"1.0\""));
        assert_eq!(declaration.span(), Some(Span::new(0, 21)));
        assert_eq!(declaration.depth(), Some(0));

        let root = tree.get(&[1]).unwrap();
        assert_eq!(root.tag_name(), Some("r"));
        let instruction = tree.get(&[1, 0]).unwrap();
        assert_eq!(instruction.node_type(), Node::PROCESSING_INSTRUCTION_NODE);
        assert_eq!(instruction.node_name(), "style");
        assert_eq!(instruction.node_value(), Some("a"));
        assert_eq!(instruction.span(), Some(Span::new(24, 11)));
        assert_eq!(instruction.depth(), Some(1));
        assert_eq!(
            instruction.diagnostics.as_ref().map(|d| d.breadcrumbs.clone()),
            Some(vec!["r".to_string()])
        );

        assert_eq!(tree.get(&[1, 1]).and_then(|n| n.tag_name()), Some("a"));
        assert_eq!(tree.get(&[1, 2]).and_then(|n| n.as_text()), Some("hi"));
        assert!(tree.get(&[2]).unwrap().is_closer());

        assert_eq!(result.compat_mode, CompatMode::NoQuirks);
        assert!(result.warnings.is_empty());
        assert_eq!(result.tokens[0].token_type, TokenType::XmlDeclaration);
        assert_eq!(result.tokens[0].name.as_deref(), Some("xml"));
        assert_eq!(result.playback.len(), 7);
    }

    #[test]
    fn test_xml_tokens_fail_in_html_mode() {
        let error = build(&xml_host(), XML_INPUT, &BuildOptions::default()).unwrap_err();
        assert!(matches!(error, BuildError::UnhandledTokenType(ref t) if t == "#xml-declaration"));
    }

    #[test]
    fn test_xml_needs_a_capable_host() {
        let options = BuildOptions::default().with_markup(Markup::Xml);
        assert!(matches!(
            build(&ReferenceHost::new(), "<r/>", &options),
            Err(BuildError::SourceUnavailable("XML document"))
        ));

        let host = ScriptedHost::new(Capabilities {
            xml_parser: false,
            ..Capabilities::all()
        })
        .with_script("<r/>", Script::default());
        assert!(matches!(
            build(&host, "<r/>", &options),
            Err(BuildError::SourceUnavailable(_))
        ));

        let in_context = options.with_context("<div>");
        assert!(matches!(
            build(&xml_host(), XML_INPUT, &in_context),
            Err(BuildError::ContextResolution(_))
        ));
    }

    #[test]
    fn test_xml_tag_text_child() {
        let script = Script::new(vec![RecordedToken {
            text: "raw".to_string(),
            ..RecordedToken::opener("v", 1, Span::new(0, 3)).with_breadcrumbs(&["v"])
        }]);
        let mut source = ScriptedSource::new(script, Capabilities::all());
        let mut builder = TreeBuilder::xml(Capabilities::all(), None);
        while source.next_token() {
            builder.apply(&source).unwrap();
        }

        let element = builder.tree().get(&[0]).unwrap();
        assert_eq!(element.children.len(), 1);
        let text = element.child(0).unwrap();
        assert_eq!(text.as_text(), Some("raw"));
        assert_eq!(text.span(), None);
        assert_eq!(text.depth(), Some(1));
        assert_eq!(builder.cursor(), &[0]);
    }

    #[test]
    fn test_depth_matches_ancestors() {
        let inputs = [
            "<!DOCTYPE html><html><head><title>t</title></head><body><ul><li>a<li>b</ul><p>x<div>y</div></body></html>",
            "<table><tr><td>1<td>2</table><svg><g><rect/></g></svg><!-- end -->",
            "<dl><dt>a<dd>b</dl><select><option>1<option>2</select>",
        ];
        for input in inputs {
            let result = build_document(input);
            let tree = DomTree::from(Arc::clone(&result.tree));
            for (path, node) in tree.walk() {
                if let Some(depth) = node.depth() {
                    assert_eq!(depth, path.len() - 1, "{} at {:?} in {}", node.node_name(), path, input);
                }
            }
        }
    }

    #[test]
    fn test_spans_are_contained_and_retokenize() {
        let input = "<div class=a>one<!-- two --><br></div>&amp;";
        let result = build_document(input);
        let tree = DomTree::from(Arc::clone(&result.tree));

        for (_, node) in tree.walk() {
            let Some(span) = node.span() else { continue };
            assert!(span.fits(input.len()));
            if span.is_empty() {
                continue;
            }
            let slice = span.slice(input).unwrap();
            let scan = Tokenizer::new(slice).scan(false);
            let Scan::Token { lexeme, span: inner } = scan else {
                panic!("{:?} did not retokenize", slice);
            };
            assert_eq!(inner.length, slice.len());
            match &node.kind {
                NodeKind::Element(_) => assert!(matches!(lexeme, Lexeme::Tag(_))),
                NodeKind::Text(_) => assert!(matches!(lexeme, Lexeme::Text(_))),
                NodeKind::Comment { .. } => assert!(matches!(lexeme, Lexeme::Comment { .. })),
                _ => {}
            }
        }
    }

    #[test]
    fn test_playback_length_and_monotonicity() {
        let input = "<ul><li>a<li>b</ul><!-- c -->";
        let result = build_document(input);
        let playback = &result.playback;

        assert_eq!(playback.len(), result.tokens.len() + 1);
        assert_eq!(playback.frames()[0].tree().node_count(), 1);
        assert_eq!(playback.last().unwrap().consumed_input_prefix(), input);
        assert_eq!(**playback.last().unwrap().tree(), *result.tree);

        for pair in playback.frames().windows(2) {
            assert!(pair[1].consumed_input_prefix().starts_with(pair[0].consumed_input_prefix()));
            assert!(pair[1].tree().node_count() >= pair[0].tree().node_count());
        }
    }

    #[test]
    fn test_frames_only_grow() {
        let inputs = [
            "<!DOCTYPE html><ul><li>a<li>b</ul><!-- c --><svg><![CDATA[d]]></svg><?php e ?>",
            "<table><tr><td>1<td>2</table><p>x</>y",
        ];
        for input in inputs {
            let result = build_document(input);
            for pair in result.playback.frames().windows(2) {
                let before = DomTree::from(Arc::clone(pair[0].tree()));
                let after = DomTree::from(Arc::clone(pair[1].tree()));
                for (path, node) in before.walk() {
                    let kept = after
                        .get(&path)
                        .unwrap_or_else(|| panic!("{:?} vanished in {}", path, input));
                    assert_eq!(kept.node_type(), node.node_type());
                    assert_eq!(kept.node_name(), node.node_name());
                    assert_eq!(kept.node_value(), node.node_value());
                }
            }
        }
    }

    #[test]
    fn test_frames_share_untouched_subtrees() {
        let result = build_document("<p>a</p><p>b</p>");
        let frames = result.playback.frames();

        // HEAD is complete once HTML, HEAD and /HEAD are applied
        for pair in frames[3..].windows(2) {
            let before = &pair[0].tree().children[0].children[0];
            let after = &pair[1].tree().children[0].children[0];
            assert!(Arc::ptr_eq(before, after));
        }
        assert!(!Arc::ptr_eq(frames[4].tree(), frames[5].tree()));
    }

    #[test]
    fn test_cursor_growth() {
        let script = Script::new(vec![
            RecordedToken::opener("DIV", 1, Span::new(0, 5)),
            RecordedToken::opener("BR", 2, Span::new(5, 4)),
            RecordedToken::opener("svg", 2, Span::new(9, 5)).with_namespace(Namespace::Svg, "svg"),
            RecordedToken {
                self_closing: true,
                ..RecordedToken::opener("circle", 3, Span::new(14, 9)).with_namespace(Namespace::Svg, "circle")
            },
            RecordedToken::closer("svg", 2, Span::new(23, 6)).with_namespace(Namespace::Svg, "svg"),
            RecordedToken::closer("DIV", 1, Span::new(29, 6)),
        ]);
        let mut source = ScriptedSource::new(script, Capabilities::all());
        let mut builder = TreeBuilder::document(Capabilities::all(), None);

        let mut lengths = Vec::new();
        while source.next_token() {
            let before = builder.cursor().len();
            builder.apply(&source).unwrap();
            lengths.push((before, builder.cursor().len()));
        }
        assert_eq!(lengths, vec![(0, 1), (1, 1), (1, 2), (2, 2), (2, 1), (1, 0)]);
    }

    #[test]
    fn test_token_listing() {
        let result = build_document("<p>Hi<!--x-->");
        let tags: Vec<String> = result
            .tags()
            .into_iter()
            .map(|t| if t.closer { format!("/{}", t.name) } else { t.name })
            .collect();
        assert_eq!(tags, vec!["HTML", "HEAD", "/HEAD", "BODY", "P", "/P", "/BODY", "/HTML"]);

        let comment = result.tokens.iter().find(|t| t.token_type == TokenType::Comment).unwrap();
        assert_eq!(comment.content.as_deref(), Some("x"));
        assert_eq!(comment.comment_type, Some(CommentType::HtmlComment));
    }

    #[test]
    fn test_build_is_idempotent() {
        let input = "<!DOCTYPE html><ul><li>a<li>b</ul><svg><circle/></svg>";
        let options = BuildOptions::default().with_context("<div>");
        for options in [BuildOptions::default(), options] {
            let first = build(&ReferenceHost::new(), input, &options).unwrap();
            let second = build(&ReferenceHost::new(), input, &options).unwrap();
            assert_eq!(first.tree, second.tree);
            assert_eq!(first.playback.len(), second.playback.len());
            assert_eq!(first.tokens, second.tokens);
        }
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  a\t\tb\n c "), "a b c");
        assert_eq!(normalize_title(" \n "), "");
        assert_eq!(normalize_title("x\u{A0}y"), "x\u{A0}y");
    }
}
