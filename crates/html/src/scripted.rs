//! Scripted host parser
//!
//! Replays token streams recorded ahead of time, keyed by the exact input
//! they describe. Scripts can be written in code or loaded from JSON, which
//! makes it possible to reproduce any token sequence a real host produces,
//! including capability gaps and token kinds the reference processor never
//! emits.

use parsetrail_dom::{Namespace, Span};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::io::Read;

use crate::error::{HtmlError, HtmlResult};
use crate::source::{
    AttributeValue, Capabilities, CommentType, ContextElement, DoctypeInfo, HostParser, SourceError, TokenSource,
    TokenType,
};

/// One token as a host reported it
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordedToken {
    /// `None` reproduces a host that could not name the token
    #[serde(rename = "type")]
    pub token_type: Option<TokenType>,
    pub tag: Option<String>,
    pub qualified_tag_name: Option<String>,
    pub closer: bool,
    pub self_closing: bool,
    pub namespace: Namespace,
    pub attributes: Vec<(String, AttributeValue)>,
    pub text: String,
    pub comment_type: Option<CommentType>,
    pub doctype: Option<DoctypeInfo>,
    pub breadcrumbs: Vec<String>,
    pub depth: usize,
    pub mode: Option<String>,
    pub is_virtual: bool,
    pub span: Option<Span>,
    pub matches: Option<bool>,
}

impl RecordedToken {
    pub fn new(token_type: TokenType, depth: usize, span: Span) -> Self {
        Self {
            token_type: Some(token_type),
            depth,
            span: Some(span),
            ..Default::default()
        }
    }

    /// Opening tag in the HTML namespace
    pub fn opener(tag: &str, depth: usize, span: Span) -> Self {
        Self {
            tag: Some(tag.to_string()),
            qualified_tag_name: Some(tag.to_string()),
            ..Self::new(TokenType::Tag, depth, span)
        }
    }

    pub fn closer(tag: &str, depth: usize, span: Span) -> Self {
        Self {
            closer: true,
            ..Self::opener(tag, depth, span)
        }
    }

    pub fn text(text: &str, depth: usize, span: Span) -> Self {
        Self {
            text: text.to_string(),
            ..Self::new(TokenType::Text, depth, span)
        }
    }

    pub fn comment(text: &str, comment_type: Option<CommentType>, depth: usize, span: Span) -> Self {
        Self {
            text: text.to_string(),
            comment_type,
            ..Self::new(TokenType::Comment, depth, span)
        }
    }

    pub fn with_attribute(mut self, name: &str, value: AttributeValue) -> Self {
        self.attributes.push((name.to_string(), value));
        self
    }

    pub fn with_namespace(mut self, namespace: Namespace, qualified: &str) -> Self {
        self.namespace = namespace;
        self.qualified_tag_name = Some(qualified.to_string());
        self
    }

    pub fn with_breadcrumbs(mut self, breadcrumbs: &[&str]) -> Self {
        self.breadcrumbs = breadcrumbs.iter().map(|b| b.to_string()).collect();
        self
    }

    pub fn with_matches(mut self, matches: bool) -> Self {
        self.matches = Some(matches);
        self
    }

    pub fn virtual_token(mut self) -> Self {
        self.is_virtual = true;
        self
    }
}

/// Everything a source reports for one input
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Script {
    pub tokens: Vec<RecordedToken>,
    /// Reported once the tokens run out
    pub error: Option<SourceError>,
    pub paused: bool,
}

impl Script {
    pub fn new(tokens: Vec<RecordedToken>) -> Self {
        Self {
            tokens,
            ..Default::default()
        }
    }

    pub fn with_error(mut self, error: SourceError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn paused(mut self) -> Self {
        self.paused = true;
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Fixture {
    #[serde(default)]
    capabilities: Capabilities,
    scripts: FxHashMap<String, Script>,
}

/// Host parser replaying scripts
#[derive(Debug, Default)]
pub struct ScriptedHost {
    capabilities: Capabilities,
    scripts: FxHashMap<String, Script>,
    contexts: RefCell<Vec<ContextElement>>,
}

impl ScriptedHost {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            scripts: FxHashMap::default(),
            contexts: RefCell::new(Vec::new()),
        }
    }

    /// Register the script replayed for `input`
    pub fn with_script(mut self, input: &str, script: Script) -> Self {
        self.scripts.insert(input.to_string(), script);
        self
    }

    /// Load a fixture of the form `{"capabilities": {..}, "scripts": {input: script}}`
    pub fn from_json(json: &str) -> HtmlResult<Self> {
        let fixture: Fixture = serde_json::from_str(json)?;
        Self::from_fixture(fixture)
    }

    pub fn from_reader<R: Read>(reader: R) -> HtmlResult<Self> {
        let fixture: Fixture = serde_json::from_reader(reader)?;
        Self::from_fixture(fixture)
    }

    fn from_fixture(fixture: Fixture) -> HtmlResult<Self> {
        for (input, script) in &fixture.scripts {
            for (index, token) in script.tokens.iter().enumerate() {
                if let Some(span) = token.span {
                    if !span.fits(input.len()) {
                        return Err(HtmlError::SpanOutOfBounds {
                            input: input.clone(),
                            index,
                            span,
                        });
                    }
                }
            }
        }

        Ok(Self {
            capabilities: fixture.capabilities,
            scripts: fixture.scripts,
            contexts: RefCell::new(Vec::new()),
        })
    }

    /// Context elements fragments were requested with, oldest first
    pub fn requested_contexts(&self) -> Vec<ContextElement> {
        self.contexts.borrow().clone()
    }

    fn source_for(&self, input: &str) -> Option<ScriptedSource> {
        self.scripts
            .get(input)
            .map(|script| ScriptedSource::new(script.clone(), self.capabilities))
    }
}

impl HostParser for ScriptedHost {
    type Source = ScriptedSource;

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn create_full_parser(&self, input: &str) -> Option<ScriptedSource> {
        if !self.capabilities.full_parser {
            return None;
        }
        self.source_for(input)
    }

    fn create_fragment(&self, input: &str, context: Option<&ContextElement>) -> Option<ScriptedSource> {
        if let Some(context) = context {
            if !self.capabilities.fragment_at_node {
                return None;
            }
            self.contexts.borrow_mut().push(context.clone());
        }
        self.source_for(input)
    }

    fn create_xml_parser(&self, input: &str) -> Option<ScriptedSource> {
        if !self.capabilities.xml_parser {
            return None;
        }
        self.source_for(input)
    }
}

/// Source replaying one script
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    script: Script,
    capabilities: Capabilities,
    /// Index of the current token plus one, zero before the first call
    position: usize,
}

impl ScriptedSource {
    pub fn new(script: Script, capabilities: Capabilities) -> Self {
        Self {
            script,
            capabilities,
            position: 0,
        }
    }

    fn current(&self) -> Option<&RecordedToken> {
        self.position.checked_sub(1).and_then(|index| self.script.tokens.get(index))
    }

    fn exhausted(&self) -> bool {
        self.position > self.script.tokens.len()
    }
}

impl TokenSource for ScriptedSource {
    fn next_token(&mut self) -> bool {
        if self.exhausted() {
            return false;
        }
        self.position += 1;
        !self.exhausted()
    }

    fn token_type(&self) -> Option<TokenType> {
        self.current().and_then(|token| token.token_type)
    }

    fn tag(&self) -> Option<String> {
        self.current().and_then(|token| token.tag.clone())
    }

    fn qualified_tag_name(&self) -> Option<String> {
        if !self.capabilities.qualified_names {
            return None;
        }
        self.current().and_then(|token| token.qualified_tag_name.clone())
    }

    fn is_tag_closer(&self) -> bool {
        self.current().map(|token| token.closer).unwrap_or(false)
    }

    fn has_self_closing_flag(&self) -> bool {
        self.current().map(|token| token.self_closing).unwrap_or(false)
    }

    fn namespace(&self) -> Namespace {
        self.current().map(|token| token.namespace).unwrap_or_default()
    }

    fn attribute_names(&self) -> Vec<String> {
        self.current()
            .map(|token| token.attributes.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }

    fn attribute(&self, name: &str) -> Option<AttributeValue> {
        self.current()?
            .attributes
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, value)| value.clone())
    }

    fn modifiable_text(&self) -> String {
        self.current().map(|token| token.text.clone()).unwrap_or_default()
    }

    fn comment_type(&self) -> Option<CommentType> {
        self.current().and_then(|token| token.comment_type)
    }

    fn doctype_info(&self) -> Option<DoctypeInfo> {
        if !self.capabilities.doctype_info {
            return None;
        }
        self.current().and_then(|token| token.doctype.clone())
    }

    fn breadcrumbs(&self) -> Vec<String> {
        self.current().map(|token| token.breadcrumbs.clone()).unwrap_or_default()
    }

    fn current_depth(&self) -> usize {
        self.current().map(|token| token.depth).unwrap_or(0)
    }

    fn insertion_mode(&self) -> Option<String> {
        self.current().and_then(|token| token.mode.clone())
    }

    fn is_virtual(&self) -> Option<bool> {
        if !self.capabilities.virtual_nodes {
            return None;
        }
        self.current().map(|token| token.is_virtual)
    }

    fn token_span(&self) -> Option<Span> {
        self.current().and_then(|token| token.span)
    }

    fn last_error(&self) -> Option<SourceError> {
        if self.exhausted() {
            self.script.error.clone()
        } else {
            None
        }
    }

    fn paused_at_incomplete_token(&self) -> bool {
        self.exhausted() && self.script.paused
    }

    fn matches_selector(&self, _selector: &str) -> Option<bool> {
        if !self.capabilities.selector_matching {
            return None;
        }
        Some(self.current()?.matches.unwrap_or(false))
    }
}
