//! Reference host parser
//!
//! A compact tree-construction pass over the tokenizer. It keeps a stack of
//! open elements and reports, for every token it visits, the depth, the
//! breadcrumbs and the insertion mode that handled it. Elements the parser
//! implies (HTML, HEAD, BODY, implied end tags, closers at end of input) are
//! reported as virtual tokens with an empty span at the position of the token
//! that caused them.
//!
//! This is a simplified processor: it covers implied end tags for the common
//! auto-closing elements and foreign content, and reports anything that
//! needs the adoption agency, foster parenting or template handling as
//! unsupported.

use log::{debug, trace};
use parsetrail_dom::elements::is_void_element;
use parsetrail_dom::{Namespace, Span};
use std::collections::VecDeque;
use std::fmt;

use crate::source::{
    AttributeValue, Capabilities, CommentType, ContextElement, DoctypeInfo, HostParser, SourceError, TokenSource,
    TokenType,
};
use crate::tokenizer::{Attributes, Lexeme, Scan, TagLexeme, Tokenizer};

/// Tree-construction state reported for each token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertionMode {
    Initial,
    BeforeHtml,
    BeforeHead,
    InHead,
    AfterHead,
    InBody,
    InTable,
    InTableBody,
    InRow,
    InCell,
    InCaption,
    InColumnGroup,
    InSelect,
    InForeignContent,
    AfterBody,
    AfterAfterBody,
}

impl InsertionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            InsertionMode::Initial => "initial",
            InsertionMode::BeforeHtml => "before html",
            InsertionMode::BeforeHead => "before head",
            InsertionMode::InHead => "in head",
            InsertionMode::AfterHead => "after head",
            InsertionMode::InBody => "in body",
            InsertionMode::InTable => "in table",
            InsertionMode::InTableBody => "in table body",
            InsertionMode::InRow => "in row",
            InsertionMode::InCell => "in cell",
            InsertionMode::InCaption => "in caption",
            InsertionMode::InColumnGroup => "in column group",
            InsertionMode::InSelect => "in select",
            InsertionMode::InForeignContent => "in foreign content",
            InsertionMode::AfterBody => "after body",
            InsertionMode::AfterAfterBody => "after after body",
        }
    }
}

impl fmt::Display for InsertionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const HEAD_CONTENT: &[&str] = &["BASE", "BASEFONT", "BGSOUND", "LINK", "META", "NOFRAMES", "SCRIPT", "STYLE", "TITLE"];

const CLOSES_P: &[&str] = &[
    "ADDRESS", "ARTICLE", "ASIDE", "BLOCKQUOTE", "CENTER", "DETAILS", "DIALOG", "DIR", "DIV", "DL", "DD", "DT",
    "FIELDSET", "FIGCAPTION", "FIGURE", "FOOTER", "FORM", "H1", "H2", "H3", "H4", "H5", "H6", "HEADER", "HGROUP",
    "HR", "LI", "LISTING", "MAIN", "MENU", "NAV", "OL", "P", "PRE", "SEARCH", "SECTION", "SUMMARY", "TABLE", "UL",
    "XMP",
];

const HEADINGS: &[&str] = &["H1", "H2", "H3", "H4", "H5", "H6"];

const FORMATTING: &[&str] = &[
    "A", "B", "BIG", "CODE", "EM", "FONT", "I", "NOBR", "S", "SMALL", "STRIKE", "STRONG", "TT", "U",
];

const SCOPE_BOUNDARIES: &[&str] = &["APPLET", "CAPTION", "HTML", "TABLE", "TD", "TH", "MARQUEE", "OBJECT", "TEMPLATE"];

const TABLE_SCOPE_BOUNDARIES: &[&str] = &["HTML", "TABLE", "TEMPLATE"];

const FOSTER_PARENTS: &[&str] = &["TABLE", "TBODY", "THEAD", "TFOOT", "TR"];

/// Tags that leave SVG or MathML content and return to HTML
const FOREIGN_BREAKOUT: &[&str] = &[
    "B", "BIG", "BLOCKQUOTE", "BODY", "BR", "CENTER", "CODE", "DD", "DIV", "DL", "DT", "EM", "EMBED", "H1", "H2",
    "H3", "H4", "H5", "H6", "HEAD", "HR", "I", "IMG", "LI", "LISTING", "MENU", "META", "NOBR", "OL", "P", "PRE",
    "RUBY", "S", "SMALL", "SPAN", "STRONG", "STRIKE", "SUB", "SUP", "TABLE", "TT", "U", "UL", "VAR",
];

const UNSUPPORTED_TAGS: &[&str] = &["TEMPLATE", "FRAMESET", "PLAINTEXT"];

/// SVG element names whose qualified form is camel-cased
const SVG_NAME_ADJUSTMENTS: &[(&str, &str)] = &[
    ("altglyph", "altGlyph"),
    ("animatecolor", "animateColor"),
    ("animatemotion", "animateMotion"),
    ("animatetransform", "animateTransform"),
    ("clippath", "clipPath"),
    ("feblend", "feBlend"),
    ("fecolormatrix", "feColorMatrix"),
    ("fecomposite", "feComposite"),
    ("fedropshadow", "feDropShadow"),
    ("feflood", "feFlood"),
    ("fegaussianblur", "feGaussianBlur"),
    ("feimage", "feImage"),
    ("femerge", "feMerge"),
    ("femergenode", "feMergeNode"),
    ("feoffset", "feOffset"),
    ("feturbulence", "feTurbulence"),
    ("foreignobject", "foreignObject"),
    ("lineargradient", "linearGradient"),
    ("radialgradient", "radialGradient"),
    ("textpath", "textPath"),
];

fn adjust_svg_name(name: &str) -> String {
    SVG_NAME_ADJUSTMENTS
        .iter()
        .find(|(lower, _)| *lower == name)
        .map(|(_, adjusted)| adjusted.to_string())
        .unwrap_or_else(|| name.to_string())
}

/// Entry on the stack of open elements
#[derive(Debug, Clone, PartialEq, Eq)]
struct OpenElement {
    /// Upper-cased local name, as reported by `tag()`
    tag: String,
    /// Local name with SVG camel-casing, upper-cased in HTML
    qualified: String,
    namespace: Namespace,
}

impl OpenElement {
    fn new(name: &str, namespace: Namespace) -> Self {
        let qualified = match namespace {
            Namespace::Html => name.to_ascii_uppercase(),
            Namespace::Svg => adjust_svg_name(&name.to_ascii_lowercase()),
            Namespace::Math => name.to_ascii_lowercase(),
        };
        Self {
            tag: name.to_ascii_uppercase(),
            qualified,
            namespace,
        }
    }

    fn is_html(&self, tag: &str) -> bool {
        self.namespace == Namespace::Html && self.tag == tag
    }

    fn is_html_any(&self, tags: &[&str]) -> bool {
        self.namespace == Namespace::Html && tags.contains(&self.tag.as_str())
    }

    /// Foreign elements whose children are parsed as HTML
    fn is_integration_point(&self) -> bool {
        match self.namespace {
            Namespace::Svg => matches!(self.qualified.as_str(), "foreignObject" | "desc" | "title"),
            Namespace::Math => matches!(self.qualified.as_str(), "mi" | "mo" | "mn" | "ms" | "mtext"),
            Namespace::Html => false,
        }
    }
}

/// Everything reported about one visited token
#[derive(Debug, Clone)]
struct Token {
    token_type: TokenType,
    element: Option<OpenElement>,
    closer: bool,
    self_closing: bool,
    attributes: Attributes,
    text: String,
    comment_type: Option<CommentType>,
    /// `tag()` of a PI-lookalike comment
    target: Option<String>,
    doctype: Option<DoctypeInfo>,
    breadcrumbs: Vec<String>,
    depth: usize,
    mode: InsertionMode,
    is_virtual: bool,
    span: Span,
}

/// How the processor was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseKind {
    Document,
    /// Fragment inside BODY with no context element reported
    BodyFragment,
    /// Fragment inside a context element taken from another parse
    ContextFragment,
}

/// Token source over one input
pub struct HtmlProcessor {
    tokenizer: Tokenizer,
    capabilities: Capabilities,
    kind: ParseKind,
    stack: Vec<OpenElement>,
    /// Bottom entries that end tags may not pop
    floor: usize,
    phase: InsertionMode,
    pending: VecDeque<Token>,
    current: Option<Token>,
    visited: usize,
    finished: bool,
    paused_at: Option<usize>,
    error: Option<SourceError>,
}

impl HtmlProcessor {
    /// Processor for a complete document
    pub fn full(input: &str, capabilities: Capabilities) -> Self {
        Self::new(input, capabilities, ParseKind::Document, Vec::new(), InsertionMode::Initial)
    }

    /// Processor for a fragment, inside BODY when `context` is absent
    pub fn fragment(input: &str, context: Option<&ContextElement>, capabilities: Capabilities) -> Self {
        match context {
            Some(context) => {
                let element = OpenElement::new(&context.name, context.namespace);
                Self::new(
                    input,
                    capabilities,
                    ParseKind::ContextFragment,
                    vec![element],
                    InsertionMode::InBody,
                )
            }
            None => {
                let stack = vec![
                    OpenElement::new("HTML", Namespace::Html),
                    OpenElement::new("BODY", Namespace::Html),
                ];
                Self::new(input, capabilities, ParseKind::BodyFragment, stack, InsertionMode::InBody)
            }
        }
    }

    fn new(
        input: &str,
        capabilities: Capabilities,
        kind: ParseKind,
        stack: Vec<OpenElement>,
        phase: InsertionMode,
    ) -> Self {
        let floor = match kind {
            ParseKind::Document | ParseKind::BodyFragment => 2,
            ParseKind::ContextFragment => 1,
        };
        debug!("Starting {:?} parse of {} bytes", kind, input.len());
        Self {
            tokenizer: Tokenizer::new(input),
            capabilities,
            kind,
            stack,
            floor,
            phase,
            pending: VecDeque::new(),
            current: None,
            visited: 0,
            finished: false,
            paused_at: None,
            error: None,
        }
    }

    /// Offset where the incomplete token starts, if the input ended inside one
    pub fn incomplete_token_at(&self) -> Option<usize> {
        self.paused_at
    }

    /// Mode reported for tokens processed right now
    fn mode(&self) -> InsertionMode {
        if self.phase != InsertionMode::InBody {
            return self.phase;
        }
        let Some(top) = self.stack.last() else {
            return self.phase;
        };
        if top.namespace != Namespace::Html {
            return if top.is_integration_point() {
                InsertionMode::InBody
            } else {
                InsertionMode::InForeignContent
            };
        }
        match top.tag.as_str() {
            "TABLE" => InsertionMode::InTable,
            "TBODY" | "THEAD" | "TFOOT" => InsertionMode::InTableBody,
            "TR" => InsertionMode::InRow,
            "TD" | "TH" => InsertionMode::InCell,
            "CAPTION" => InsertionMode::InCaption,
            "COLGROUP" => InsertionMode::InColumnGroup,
            "SELECT" => InsertionMode::InSelect,
            _ => InsertionMode::InBody,
        }
    }

    /// Inside SVG or MathML, outside any integration point
    fn in_foreign_content(&self) -> bool {
        self.stack
            .last()
            .map(|top| top.namespace != Namespace::Html && !top.is_integration_point())
            .unwrap_or(false)
    }

    fn breadcrumbs_with(&self, last: Option<&str>) -> Vec<String> {
        let mut breadcrumbs: Vec<String> = self.stack.iter().map(|e| e.tag.clone()).collect();
        if let Some(last) = last {
            breadcrumbs.push(last.to_string());
        }
        breadcrumbs
    }

    fn blank_token(&self, token_type: TokenType, span: Span) -> Token {
        Token {
            token_type,
            element: None,
            closer: false,
            self_closing: false,
            attributes: Attributes::new(),
            text: String::new(),
            comment_type: None,
            target: None,
            doctype: None,
            breadcrumbs: Vec::new(),
            depth: 0,
            mode: self.mode(),
            is_virtual: false,
            span,
        }
    }

    /// Queue a leaf token (text, comment, doctype) under the current node
    fn emit_leaf(&mut self, mut token: Token, label: &str) {
        token.breadcrumbs = self.breadcrumbs_with(Some(label));
        token.depth = self.stack.len() + 1;
        self.pending.push_back(token);
    }

    /// Queue an opener and push it unless it cannot have children
    fn open(&mut self, element: OpenElement, tag: Option<&TagLexeme>, span: Span, is_virtual: bool) {
        let mut token = self.blank_token(TokenType::Tag, span);
        token.is_virtual = is_virtual;
        token.breadcrumbs = self.breadcrumbs_with(Some(element.tag.as_str()));
        token.depth = self.stack.len() + 1;

        let mut push = true;
        if let Some(tag) = tag {
            token.attributes = tag.attributes.clone();
            token.self_closing = tag.self_closing;
            if let Some(raw) = &tag.raw_text {
                token.text = raw.clone();
                push = false;
            }
            if element.namespace != Namespace::Html && tag.self_closing {
                push = false;
            }
        }
        if element.namespace == Namespace::Html && is_void_element(&element.tag) {
            push = false;
        }

        token.element = Some(element.clone());
        self.pending.push_back(token);
        if push {
            self.stack.push(element);
        }
    }

    /// Pop the current node and queue its closer
    fn close_current(&mut self, span: Span, is_virtual: bool) {
        let breadcrumbs = self.breadcrumbs_with(None);
        let Some(element) = self.stack.pop() else {
            return;
        };
        let mut token = self.blank_token(TokenType::Tag, span);
        token.closer = true;
        token.is_virtual = is_virtual;
        token.breadcrumbs = breadcrumbs;
        token.depth = self.stack.len();
        token.element = Some(element);
        self.pending.push_back(token);
    }

    /// Pop everything above `index` as implied, then the element at `index`
    fn close_through(&mut self, index: usize, at: usize, real_span: Option<Span>) {
        let empty = Span::empty_at(at);
        while self.stack.len() > index + 1 {
            self.close_current(empty, true);
        }
        match real_span {
            Some(span) => self.close_current(span, false),
            None => self.close_current(empty, true),
        }
    }

    /// Find an HTML element in scope, searching from the current node
    fn find_in_scope(&self, tags: &[&str], boundaries: &[&str]) -> Option<usize> {
        for (index, element) in self.stack.iter().enumerate().rev() {
            if index < self.floor {
                return None;
            }
            if element.is_html_any(tags) {
                return Some(index);
            }
            if element.is_html_any(boundaries) || element.is_integration_point() {
                return None;
            }
        }
        None
    }

    fn fail(&mut self, error: SourceError) {
        debug!("Processor stopped: {}", error);
        self.error = Some(error);
        self.pending.clear();
    }

    fn unsupported(&mut self, detail: String) {
        self.fail(SourceError::unsupported(detail));
    }

    /// Handle one lexeme, queueing the tokens it produces
    fn process(&mut self, lexeme: Lexeme, span: Span) {
        match self.phase {
            InsertionMode::Initial | InsertionMode::BeforeHtml => self.process_before_html(lexeme, span),
            InsertionMode::BeforeHead => self.process_before_head(lexeme, span),
            InsertionMode::InHead => self.process_in_head(lexeme, span),
            InsertionMode::AfterHead => self.process_after_head(lexeme, span),
            InsertionMode::AfterBody | InsertionMode::AfterAfterBody => self.process_after_body(lexeme, span),
            _ => self.process_in_body(lexeme, span),
        }
    }

    fn process_before_html(&mut self, lexeme: Lexeme, span: Span) {
        match lexeme {
            Lexeme::Doctype(info) if self.phase == InsertionMode::Initial => {
                let mut token = self.blank_token(TokenType::Doctype, span);
                token.doctype = Some(info);
                self.emit_leaf(token, "#doctype");
                self.phase = InsertionMode::BeforeHtml;
            }
            Lexeme::Doctype(_) => {}
            Lexeme::Text(text) if is_whitespace(&text) => {}
            Lexeme::Comment { .. } => {
                self.phase = InsertionMode::BeforeHtml;
                self.process_leaf(lexeme, span);
            }
            Lexeme::Tag(tag) if !tag.is_end && tag.name == "html" => {
                self.phase = InsertionMode::BeforeHtml;
                self.open(OpenElement::new("HTML", Namespace::Html), Some(&tag), span, false);
                self.phase = InsertionMode::BeforeHead;
            }
            Lexeme::Tag(tag) if tag.is_end && !matches!(tag.name.as_str(), "head" | "body" | "html" | "br") => {}
            other => {
                self.phase = InsertionMode::BeforeHtml;
                self.open(OpenElement::new("HTML", Namespace::Html), None, Span::empty_at(span.start), true);
                self.phase = InsertionMode::BeforeHead;
                self.process(other, span);
            }
        }
    }

    fn process_before_head(&mut self, lexeme: Lexeme, span: Span) {
        match lexeme {
            Lexeme::Text(text) if is_whitespace(&text) => {}
            Lexeme::Comment { .. } => self.process_leaf(lexeme, span),
            Lexeme::Doctype(_) => {}
            Lexeme::Tag(tag) if !tag.is_end && tag.name == "head" => {
                self.open(OpenElement::new("HEAD", Namespace::Html), Some(&tag), span, false);
                self.phase = InsertionMode::InHead;
            }
            Lexeme::Tag(tag) if !tag.is_end && tag.name == "html" => {}
            Lexeme::Tag(tag) if tag.is_end && !matches!(tag.name.as_str(), "head" | "body" | "html" | "br") => {}
            other => {
                self.open(OpenElement::new("HEAD", Namespace::Html), None, Span::empty_at(span.start), true);
                self.phase = InsertionMode::InHead;
                self.process(other, span);
            }
        }
    }

    fn process_in_head(&mut self, lexeme: Lexeme, span: Span) {
        match lexeme {
            Lexeme::Text(text) if is_whitespace(&text) => {
                let mut token = self.blank_token(TokenType::Text, span);
                token.text = text;
                self.emit_leaf(token, "#text");
            }
            Lexeme::Comment { .. } => self.process_leaf(lexeme, span),
            Lexeme::Doctype(_) => {}
            Lexeme::Tag(tag) if !tag.is_end && HEAD_CONTENT.contains(&tag.name.to_ascii_uppercase().as_str()) => {
                let element = OpenElement::new(&tag.name, Namespace::Html);
                self.open(element, Some(&tag), span, false);
            }
            Lexeme::Tag(tag) if tag.is_end && tag.name == "head" => {
                self.close_current(span, false);
                self.phase = InsertionMode::AfterHead;
            }
            Lexeme::Tag(tag) if !tag.is_end && matches!(tag.name.as_str(), "head" | "html") => {}
            Lexeme::Tag(tag) if tag.is_end && !matches!(tag.name.as_str(), "body" | "html" | "br") => {}
            other => {
                self.close_current(Span::empty_at(span.start), true);
                self.phase = InsertionMode::AfterHead;
                self.process(other, span);
            }
        }
    }

    fn process_after_head(&mut self, lexeme: Lexeme, span: Span) {
        match lexeme {
            Lexeme::Text(text) if is_whitespace(&text) => {
                let mut token = self.blank_token(TokenType::Text, span);
                token.text = text;
                self.emit_leaf(token, "#text");
            }
            Lexeme::Comment { .. } => self.process_leaf(lexeme, span),
            Lexeme::Doctype(_) => {}
            Lexeme::Tag(tag) if !tag.is_end && tag.name == "body" => {
                self.open(OpenElement::new("BODY", Namespace::Html), Some(&tag), span, false);
                self.phase = InsertionMode::InBody;
            }
            Lexeme::Tag(tag) if !tag.is_end && matches!(tag.name.as_str(), "head" | "html") => {}
            Lexeme::Tag(tag) if tag.is_end && !matches!(tag.name.as_str(), "body" | "html" | "br") => {}
            other => {
                self.open(OpenElement::new("BODY", Namespace::Html), None, Span::empty_at(span.start), true);
                self.phase = InsertionMode::InBody;
                self.process(other, span);
            }
        }
    }

    fn process_after_body(&mut self, lexeme: Lexeme, span: Span) {
        match lexeme {
            Lexeme::Comment { .. } => self.process_leaf(lexeme, span),
            Lexeme::Text(text) if is_whitespace(&text) => {
                let mut token = self.blank_token(TokenType::Text, span);
                token.text = text;
                self.emit_leaf(token, "#text");
            }
            Lexeme::Doctype(_) => {}
            Lexeme::Tag(tag) if tag.is_end && tag.name == "html" => {
                self.phase = InsertionMode::AfterAfterBody;
            }
            other => {
                self.phase = InsertionMode::InBody;
                self.process(other, span);
            }
        }
    }

    /// Text, comments and the other leaves, placed under the current node
    fn process_leaf(&mut self, lexeme: Lexeme, span: Span) {
        match lexeme {
            Lexeme::Text(text) => {
                let top_is_table = self.stack.last().map(|top| top.is_html_any(FOSTER_PARENTS)).unwrap_or(false);
                if top_is_table && !is_whitespace(&text) {
                    self.unsupported("text directly inside a table needs foster parenting".to_string());
                    return;
                }
                let mut token = self.blank_token(TokenType::Text, span);
                token.text = text;
                self.emit_leaf(token, "#text");
            }
            Lexeme::CdataSection(text) => {
                let mut token = self.blank_token(TokenType::CdataSection, span);
                token.text = text;
                self.emit_leaf(token, "#cdata-section");
            }
            Lexeme::Comment { text, kind, target } => {
                let mut token = self.blank_token(TokenType::Comment, span);
                token.text = text;
                token.comment_type = Some(kind);
                token.target = target.map(|t| t.to_ascii_uppercase());
                self.emit_leaf(token, "#comment");
            }
            Lexeme::PresumptuousTag => {
                let token = self.blank_token(TokenType::PresumptuousTag, span);
                self.emit_leaf(token, "#presumptuous-tag");
            }
            Lexeme::FunkyComment(text) => {
                let mut token = self.blank_token(TokenType::FunkyComment, span);
                token.text = text;
                self.emit_leaf(token, "#funky-comment");
            }
            Lexeme::Doctype(_) | Lexeme::Tag(_) => {}
        }
    }

    fn process_in_body(&mut self, lexeme: Lexeme, span: Span) {
        match lexeme {
            Lexeme::Tag(tag) if tag.is_end => self.process_end_tag(tag, span),
            Lexeme::Tag(tag) if self.in_foreign_content() => self.process_foreign_start_tag(tag, span),
            Lexeme::Tag(tag) => self.process_start_tag(tag, span),
            Lexeme::Doctype(_) => {}
            other => self.process_leaf(other, span),
        }
    }

    fn process_start_tag(&mut self, tag: TagLexeme, span: Span) {
        let name = tag.name.to_ascii_uppercase();
        let at = span.start;

        if UNSUPPORTED_TAGS.contains(&name.as_str()) {
            self.unsupported(format!("cannot process {} elements", name));
            return;
        }
        if matches!(name.as_str(), "HTML" | "BODY" | "HEAD") {
            trace!("Ignoring <{}> in body", tag.name);
            return;
        }

        if CLOSES_P.contains(&name.as_str()) {
            if let Some(index) = self.find_in_scope(&["P"], &with_extra(SCOPE_BOUNDARIES, "BUTTON")) {
                self.close_through(index, at, None);
            }
        }

        match name.as_str() {
            "LI" => {
                if let Some(index) = self.find_in_scope(&["LI"], &with_extras(SCOPE_BOUNDARIES, &["OL", "UL"])) {
                    self.close_through(index, at, None);
                }
            }
            "DD" | "DT" => {
                if let Some(index) = self.find_in_scope(&["DD", "DT"], &with_extra(SCOPE_BOUNDARIES, "DL")) {
                    self.close_through(index, at, None);
                }
            }
            h if HEADINGS.contains(&h) => {
                if self.stack.last().map(|top| top.is_html_any(HEADINGS)).unwrap_or(false) {
                    self.close_current(Span::empty_at(at), true);
                }
            }
            "OPTION" => {
                if self.stack.last().map(|top| top.is_html("OPTION")).unwrap_or(false) {
                    self.close_current(Span::empty_at(at), true);
                }
            }
            "TR" => {
                if let Some(index) = self.find_in_scope(&["TR"], TABLE_SCOPE_BOUNDARIES) {
                    self.close_through(index, at, None);
                }
            }
            "TD" | "TH" => {
                if let Some(index) = self.find_in_scope(&["TD", "TH"], TABLE_SCOPE_BOUNDARIES) {
                    self.close_through(index, at, None);
                }
            }
            _ => {}
        }

        let namespace = match name.as_str() {
            "SVG" => Namespace::Svg,
            "MATH" => Namespace::Math,
            _ => Namespace::Html,
        };
        self.open(OpenElement::new(&tag.name, namespace), Some(&tag), span, false);
    }

    fn process_end_tag(&mut self, tag: TagLexeme, span: Span) {
        let name = tag.name.to_ascii_uppercase();
        let at = span.start;

        let foreign = self
            .stack
            .iter()
            .enumerate()
            .rev()
            .take_while(|(index, element)| *index >= self.floor && element.namespace != Namespace::Html)
            .find(|(_, element)| element.tag == name)
            .map(|(index, _)| index);
        if let Some(index) = foreign {
            self.close_through(index, at, Some(span));
            return;
        }

        match name.as_str() {
            "BODY" | "HTML" if self.kind == ParseKind::Document => {
                self.phase = if name == "HTML" {
                    InsertionMode::AfterAfterBody
                } else {
                    InsertionMode::AfterBody
                };
                return;
            }
            "P" => {
                let boundaries = with_extra(SCOPE_BOUNDARIES, "BUTTON");
                if self.find_in_scope(&["P"], &boundaries).is_none() {
                    self.open(OpenElement::new("P", Namespace::Html), None, Span::empty_at(at), true);
                }
                if let Some(index) = self.find_in_scope(&["P"], &boundaries) {
                    self.close_through(index, at, Some(span));
                }
                return;
            }
            _ => {}
        }

        let Some(index) = self.find_in_scope(&[name.as_str()], SCOPE_BOUNDARIES) else {
            trace!("Dropping stray </{}>", tag.name);
            return;
        };

        if FORMATTING.contains(&name.as_str()) && index + 1 != self.stack.len() {
            self.unsupported(format!("cannot process misnested </{}>", tag.name));
            return;
        }

        self.close_through(index, at, Some(span));
    }

    fn process_foreign_start_tag(&mut self, tag: TagLexeme, span: Span) {
        let name = tag.name.to_ascii_uppercase();

        if FOREIGN_BREAKOUT.contains(&name.as_str()) {
            while self.in_foreign_content() && self.stack.len() > self.floor {
                self.close_current(Span::empty_at(span.start), true);
            }
            if self.in_foreign_content() {
                self.unsupported(format!("cannot leave foreign content for <{}>", tag.name));
                return;
            }
            self.process_start_tag(tag, span);
            return;
        }

        let namespace = match (name.as_str(), self.stack.last().map(|top| top.namespace)) {
            ("SVG", _) => Namespace::Svg,
            (_, Some(namespace)) => namespace,
            (_, None) => Namespace::Html,
        };
        self.open(OpenElement::new(&tag.name, namespace), Some(&tag), span, false);
    }

    /// Queue closers for everything still open at the end of input
    fn finish(&mut self) {
        let at = self.tokenizer.input().len();
        if self.kind == ParseKind::Document {
            // An empty document still gets its implied HTML, HEAD and BODY
            while !matches!(
                self.phase,
                InsertionMode::InBody | InsertionMode::AfterBody | InsertionMode::AfterAfterBody
            ) {
                self.process_implied_end(at);
            }
            while !self.stack.is_empty() {
                self.close_current(Span::empty_at(at), true);
            }
        } else {
            while self.stack.len() > self.floor {
                self.close_current(Span::empty_at(at), true);
            }
        }
    }

    fn process_implied_end(&mut self, at: usize) {
        let empty = Span::empty_at(at);
        match self.phase {
            InsertionMode::Initial | InsertionMode::BeforeHtml => {
                self.phase = InsertionMode::BeforeHtml;
                self.open(OpenElement::new("HTML", Namespace::Html), None, empty, true);
                self.phase = InsertionMode::BeforeHead;
            }
            InsertionMode::BeforeHead => {
                self.open(OpenElement::new("HEAD", Namespace::Html), None, empty, true);
                self.phase = InsertionMode::InHead;
            }
            InsertionMode::InHead => {
                self.close_current(empty, true);
                self.phase = InsertionMode::AfterHead;
            }
            _ => {
                self.open(OpenElement::new("BODY", Namespace::Html), None, empty, true);
                self.phase = InsertionMode::InBody;
            }
        }
    }

    fn current_tag(&self) -> Option<&OpenElement> {
        self.current.as_ref().and_then(|token| token.element.as_ref())
    }
}

impl TokenSource for HtmlProcessor {
    fn next_token(&mut self) -> bool {
        self.current = None;
        loop {
            if self.error.is_some() || self.paused_at.is_some() {
                return false;
            }
            if let Some(token) = self.pending.pop_front() {
                trace!(
                    "Visiting {} {:?} at {}",
                    token.token_type,
                    token.element.as_ref().map(|e| e.tag.as_str()),
                    token.span
                );
                self.current = Some(token);
                self.visited += 1;
                return true;
            }
            if self.finished {
                return false;
            }

            let foreign = self.in_foreign_content();
            match self.tokenizer.scan(foreign) {
                Scan::Token { lexeme, span } => self.process(lexeme, span),
                Scan::Incomplete { at } => {
                    debug!("Input ends inside a token starting at {}", at);
                    self.paused_at = Some(at);
                }
                Scan::End => {
                    self.finish();
                    self.finished = true;
                    debug!("Reached end of input after {} tokens", self.visited + self.pending.len());
                }
            }
        }
    }

    fn token_type(&self) -> Option<TokenType> {
        self.current.as_ref().map(|token| token.token_type)
    }

    fn tag(&self) -> Option<String> {
        let token = self.current.as_ref()?;
        match &token.element {
            Some(element) => Some(element.tag.clone()),
            None => token.target.clone(),
        }
    }

    fn qualified_tag_name(&self) -> Option<String> {
        if !self.capabilities.qualified_names {
            return None;
        }
        self.current_tag().map(|element| element.qualified.clone())
    }

    fn is_tag_closer(&self) -> bool {
        self.current.as_ref().map(|token| token.closer).unwrap_or(false)
    }

    fn has_self_closing_flag(&self) -> bool {
        self.current.as_ref().map(|token| token.self_closing).unwrap_or(false)
    }

    fn namespace(&self) -> Namespace {
        self.current_tag().map(|element| element.namespace).unwrap_or_default()
    }

    fn attribute_names(&self) -> Vec<String> {
        self.current
            .as_ref()
            .map(|token| token.attributes.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }

    fn attribute(&self, name: &str) -> Option<AttributeValue> {
        let token = self.current.as_ref()?;
        token
            .attributes
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| match value {
                Some(value) => AttributeValue::Text(value.clone()),
                None => AttributeValue::Boolean(true),
            })
    }

    fn modifiable_text(&self) -> String {
        self.current.as_ref().map(|token| token.text.clone()).unwrap_or_default()
    }

    fn comment_type(&self) -> Option<CommentType> {
        self.current.as_ref().and_then(|token| token.comment_type)
    }

    fn doctype_info(&self) -> Option<DoctypeInfo> {
        if !self.capabilities.doctype_info {
            return None;
        }
        self.current.as_ref().and_then(|token| token.doctype.clone())
    }

    fn breadcrumbs(&self) -> Vec<String> {
        self.current.as_ref().map(|token| token.breadcrumbs.clone()).unwrap_or_default()
    }

    fn current_depth(&self) -> usize {
        self.current.as_ref().map(|token| token.depth).unwrap_or(0)
    }

    fn insertion_mode(&self) -> Option<String> {
        self.current.as_ref().map(|token| token.mode.as_str().to_string())
    }

    fn is_virtual(&self) -> Option<bool> {
        if !self.capabilities.virtual_nodes {
            return None;
        }
        self.current.as_ref().map(|token| token.is_virtual)
    }

    fn token_span(&self) -> Option<Span> {
        self.current.as_ref().map(|token| token.span)
    }

    fn last_error(&self) -> Option<SourceError> {
        self.error.clone()
    }

    fn paused_at_incomplete_token(&self) -> bool {
        self.paused_at.is_some()
    }

    fn matches_selector(&self, _selector: &str) -> Option<bool> {
        None
    }
}

/// Host parser backed by [`HtmlProcessor`]
#[derive(Debug, Clone, Copy)]
pub struct ReferenceHost {
    capabilities: Capabilities,
}

impl ReferenceHost {
    pub fn new() -> Self {
        Self {
            capabilities: Capabilities {
                selector_matching: false,
                xml_parser: false,
                ..Capabilities::all()
            },
        }
    }

    /// Host that reports and honors only the given capabilities
    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            capabilities: Capabilities {
                selector_matching: false,
                xml_parser: false,
                ..capabilities
            },
        }
    }
}

impl Default for ReferenceHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostParser for ReferenceHost {
    type Source = HtmlProcessor;

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn create_full_parser(&self, input: &str) -> Option<HtmlProcessor> {
        if !self.capabilities.full_parser {
            return None;
        }
        Some(HtmlProcessor::full(input, self.capabilities))
    }

    fn create_fragment(&self, input: &str, context: Option<&ContextElement>) -> Option<HtmlProcessor> {
        if context.is_some() && !self.capabilities.fragment_at_node {
            return None;
        }
        Some(HtmlProcessor::fragment(input, context, self.capabilities))
    }
}

fn is_whitespace(text: &str) -> bool {
    text.chars().all(|c| matches!(c, ' ' | '\t' | '\n' | '\x0C' | '\r'))
}

fn with_extra<'a>(base: &[&'a str], extra: &'a str) -> Vec<&'a str> {
    with_extras(base, &[extra])
}

fn with_extras<'a>(base: &[&'a str], extras: &[&'a str]) -> Vec<&'a str> {
    base.iter().chain(extras.iter()).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Visit {
        label: String,
        depth: usize,
        is_virtual: bool,
    }

    /// `P`, `/P` or `#text` for each visited token
    fn label(source: &HtmlProcessor) -> String {
        match source.token_type() {
            Some(TokenType::Tag) => {
                let tag = source.tag().unwrap_or_default();
                if source.is_tag_closer() {
                    format!("/{}", tag)
                } else {
                    tag
                }
            }
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    fn visit(mut source: HtmlProcessor) -> (Vec<Visit>, HtmlProcessor) {
        let mut visits = Vec::new();
        while source.next_token() {
            visits.push(Visit {
                label: label(&source),
                depth: source.current_depth(),
                is_virtual: source.is_virtual().unwrap_or(false),
            });
        }
        (visits, source)
    }

    fn labels(visits: &[Visit]) -> Vec<&str> {
        visits.iter().map(|v| v.label.as_str()).collect()
    }

    fn full(input: &str) -> Vec<Visit> {
        let source = ReferenceHost::new().create_full_parser(input).unwrap();
        visit(source).0
    }

    #[test]
    fn test_implied_document_structure() {
        let visits = full("<p>Hi");
        assert_eq!(
            labels(&visits),
            vec!["HTML", "HEAD", "/HEAD", "BODY", "P", "#text", "/P", "/BODY", "/HTML"]
        );
        let depths: Vec<usize> = visits.iter().map(|v| v.depth).collect();
        assert_eq!(depths, vec![1, 2, 1, 2, 3, 4, 2, 1, 0]);
        let virtuals: Vec<bool> = visits.iter().map(|v| v.is_virtual).collect();
        assert_eq!(virtuals, vec![true, true, true, true, false, false, true, true, true]);
    }

    #[test]
    fn test_virtual_tokens_have_empty_spans() {
        let mut source = ReferenceHost::new().create_full_parser("<p>Hi").unwrap();
        assert!(source.next_token());
        assert_eq!(source.token_span(), Some(Span::empty_at(0)));
        assert_eq!(source.insertion_mode().as_deref(), Some("before html"));
        while source.next_token() {
            if source.tag().as_deref() == Some("P") && !source.is_tag_closer() {
                assert_eq!(source.token_span(), Some(Span::new(0, 3)));
                assert_eq!(source.breadcrumbs(), vec!["HTML", "BODY", "P"]);
                assert_eq!(source.insertion_mode().as_deref(), Some("in body"));
            }
        }
        assert!(!source.paused_at_incomplete_token());
        assert!(source.last_error().is_none());
    }

    #[test]
    fn test_doctype_and_head_content() {
        let visits = full("<!DOCTYPE html>\n<html><head><title>A</title></head><body>x</body></html>");
        assert_eq!(
            labels(&visits),
            vec!["#doctype", "HTML", "HEAD", "TITLE", "/HEAD", "BODY", "#text", "/BODY", "/HTML"]
        );
        assert!(!visits[3].is_virtual);
        // End tags for BODY and HTML only switch modes; the closers come at the end
        assert!(visits[7].is_virtual);
    }

    #[test]
    fn test_doctype_info_capability() {
        let mut source = ReferenceHost::new().create_full_parser("<!DOCTYPE html>").unwrap();
        assert!(source.next_token());
        let info = source.doctype_info().unwrap();
        assert_eq!(info.name.as_deref(), Some("html"));

        let host = ReferenceHost::with_capabilities(Capabilities {
            doctype_info: false,
            ..Capabilities::all()
        });
        let mut source = host.create_full_parser("<!DOCTYPE html>").unwrap();
        assert!(source.next_token());
        assert!(source.doctype_info().is_none());
    }

    #[test]
    fn test_implied_end_tags() {
        let visits = full("<ul><li>a<li>b</ul>");
        let body: Vec<&str> = labels(&visits)[4..].to_vec();
        assert_eq!(
            body,
            vec!["UL", "LI", "#text", "/LI", "LI", "#text", "/LI", "/UL", "/BODY", "/HTML"]
        );
        assert!(visits[7].is_virtual);
        assert!(visits[10].is_virtual);
        assert!(!visits[11].is_virtual);
    }

    #[test]
    fn test_paragraph_closed_by_block() {
        let visits = full("<p>a<div>b</div>");
        let body: Vec<&str> = labels(&visits)[4..].to_vec();
        assert_eq!(body, vec!["P", "#text", "/P", "DIV", "#text", "/DIV", "/BODY", "/HTML"]);
    }

    #[test]
    fn test_stray_paragraph_closer() {
        let visits = full("x</p>");
        let body: Vec<&str> = labels(&visits)[4..].to_vec();
        assert_eq!(body, vec!["#text", "P", "/P", "/BODY", "/HTML"]);
        assert!(visits[5].is_virtual);
        assert!(!visits[6].is_virtual);
    }

    #[test]
    fn test_stray_end_tag_is_dropped() {
        let visits = full("<div></span></div>");
        let body: Vec<&str> = labels(&visits)[4..].to_vec();
        assert_eq!(body, vec!["DIV", "/DIV", "/BODY", "/HTML"]);
    }

    #[test]
    fn test_void_and_self_contained_are_not_pushed() {
        let visits = full("<br><script>x</script><p>");
        let body: Vec<(&str, usize)> = visits[4..].iter().map(|v| (v.label.as_str(), v.depth)).collect();
        assert_eq!(
            body,
            vec![("BR", 3), ("SCRIPT", 3), ("P", 3), ("/P", 2), ("/BODY", 1), ("/HTML", 0)]
        );
    }

    #[test]
    fn test_self_contained_text() {
        let mut source = ReferenceHost::new().create_fragment("<textarea>a &lt; b</textarea>", None).unwrap();
        assert!(source.next_token());
        assert_eq!(source.tag().as_deref(), Some("TEXTAREA"));
        assert_eq!(source.modifiable_text(), "a < b");
        assert!(!source.next_token());
    }

    #[test]
    fn test_body_fragment() {
        let source = ReferenceHost::new().create_fragment("<b>x</b>", None).unwrap();
        let (visits, _) = visit(source);
        assert_eq!(labels(&visits), vec!["B", "#text", "/B"]);
        assert_eq!(visits[0].depth, 3);
        assert_eq!(visits[2].depth, 2);
    }

    #[test]
    fn test_context_fragment() {
        let context = ContextElement {
            name: "TABLE".into(),
            namespace: Namespace::Html,
            breadcrumbs: vec!["HTML".into(), "BODY".into(), "TABLE".into()],
            attributes: Vec::new(),
        };
        let mut source = ReferenceHost::new()
            .create_fragment("<tr><td>x</td></tr>", Some(&context))
            .unwrap();

        assert!(source.next_token());
        assert_eq!(source.tag().as_deref(), Some("TR"));
        assert_eq!(source.current_depth(), 2);
        assert_eq!(source.insertion_mode().as_deref(), Some("in table"));

        let (visits, _) = visit(source);
        assert_eq!(labels(&visits), vec!["TD", "#text", "/TD", "/TR"]);
        assert_eq!(visits[3].depth, 1);
    }

    #[test]
    fn test_context_fragment_requires_capability() {
        let host = ReferenceHost::with_capabilities(Capabilities {
            fragment_at_node: false,
            ..Capabilities::all()
        });
        let context = ContextElement {
            name: "DIV".into(),
            namespace: Namespace::Html,
            breadcrumbs: Vec::new(),
            attributes: Vec::new(),
        };
        assert!(host.create_fragment("x", Some(&context)).is_none());
        assert!(host.create_fragment("x", None).is_some());
    }

    #[test]
    fn test_foreign_content() {
        let mut source = ReferenceHost::new()
            .create_fragment("<svg><foreignObject><p>x</p></foreignObject><circle/></svg>", None)
            .unwrap();
        let mut seen = Vec::new();
        while source.next_token() {
            if source.token_type() == Some(TokenType::Tag) && !source.is_tag_closer() {
                seen.push((source.qualified_tag_name().unwrap_or_default(), source.namespace()));
            }
        }
        assert_eq!(
            seen,
            vec![
                ("svg".to_string(), Namespace::Svg),
                ("foreignObject".to_string(), Namespace::Svg),
                ("P".to_string(), Namespace::Html),
                ("circle".to_string(), Namespace::Svg),
            ]
        );
    }

    #[test]
    fn test_foreign_self_closing_not_pushed() {
        let source = ReferenceHost::new().create_fragment("<svg><circle/><rect></rect></svg>", None).unwrap();
        let (visits, _) = visit(source);
        assert_eq!(labels(&visits), vec!["SVG", "CIRCLE", "RECT", "/RECT", "/SVG"]);
        assert_eq!(visits[1].depth, 4);
        assert_eq!(visits[2].depth, 4);
    }

    #[test]
    fn test_cdata_only_in_foreign_content() {
        let mut source = ReferenceHost::new()
            .create_fragment("<![CDATA[a]]><math><![CDATA[b]]></math>", None)
            .unwrap();
        let mut types = Vec::new();
        while source.next_token() {
            types.push(source.token_type());
        }
        assert_eq!(
            types,
            vec![
                Some(TokenType::Comment),
                Some(TokenType::Tag),
                Some(TokenType::CdataSection),
                Some(TokenType::Tag),
            ]
        );
    }

    #[test]
    fn test_pi_lookalike_target() {
        let mut source = ReferenceHost::new().create_fragment("<?xml-stylesheet href=a?>", None).unwrap();
        assert!(source.next_token());
        assert_eq!(source.comment_type(), Some(CommentType::PiLookalike));
        assert_eq!(source.tag().as_deref(), Some("XML-STYLESHEET"));
        assert_eq!(source.modifiable_text(), "href=a");
    }

    #[test]
    fn test_misnested_formatting_is_unsupported() {
        let source = ReferenceHost::new().create_fragment("<b><i>x</b>", None).unwrap();
        let (visits, source) = visit(source);
        assert_eq!(labels(&visits), vec!["B", "I", "#text"]);
        let error = source.last_error().unwrap();
        assert!(error.unsupported.unwrap().contains("</b>"));
    }

    #[test]
    fn test_template_is_unsupported() {
        let source = ReferenceHost::new().create_fragment("<template>", None).unwrap();
        let (visits, source) = visit(source);
        assert!(visits.is_empty());
        assert!(source.last_error().and_then(|e| e.unsupported).is_some());
    }

    #[test]
    fn test_incomplete_input_pauses() {
        let source = ReferenceHost::new().create_full_parser("<div").unwrap();
        let (visits, source) = visit(source);
        assert!(visits.is_empty());
        assert!(source.paused_at_incomplete_token());
        assert_eq!(source.incomplete_token_at(), Some(0));
        assert!(source.last_error().is_none());
    }

    #[test]
    fn test_leading_whitespace_dropped() {
        let visits = full("  \n<html>");
        assert_eq!(labels(&visits)[0], "HTML");
        assert!(!visits[0].is_virtual);
    }

    #[test]
    fn test_empty_document() {
        let visits = full("");
        assert_eq!(
            labels(&visits),
            vec!["HTML", "HEAD", "/HEAD", "BODY", "/BODY", "/HTML"]
        );
    }

    #[test]
    fn test_virtual_detection_capability() {
        let host = ReferenceHost::with_capabilities(Capabilities {
            virtual_nodes: false,
            ..Capabilities::all()
        });
        let mut source = host.create_full_parser("x").unwrap();
        assert!(source.next_token());
        assert_eq!(source.is_virtual(), None);
        assert!(!host.capabilities().selector_matching);
    }
}
