//! Result assembly
//!
//! Turns a finished build into the values handed back to callers, and maps
//! the token source's terminal state onto build errors.

use log::info;
use parsetrail_dom::serialize::to_html;
use parsetrail_dom::{CompatMode, DoctypeData, DomTree, Node};
use parsetrail_html::{Capabilities, HostParser, TokenSource, TokenType};
use serde::Serialize;
use std::sync::Arc;

use crate::builder::{build, Metadata, TokenRecord};
use crate::error::BuildError;
use crate::options::Request;
use crate::recorder::Playback;

/// A finished build
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    pub tree: Arc<Node>,
    pub playback: Playback,
    pub compat_mode: CompatMode,
    pub doctype: Option<DoctypeData>,
    pub document_title: Option<String>,
    pub context_node_name: Option<String>,
    pub warnings: Vec<String>,
    pub tokens: Vec<TokenRecord>,
}

/// Tag entry of the token listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagRecord {
    pub name: String,
    pub closer: bool,
}

impl BuildResult {
    pub(crate) fn assemble(
        tree: DomTree,
        playback: Playback,
        metadata: Metadata,
        context_node_name: Option<String>,
    ) -> Self {
        Self {
            tree: tree.into_root(),
            playback,
            compat_mode: metadata.compat_mode,
            doctype: metadata.doctype,
            document_title: metadata.title,
            context_node_name,
            warnings: metadata.warnings,
            tokens: metadata.tokens,
        }
    }

    /// Tag tokens in the order they were consumed
    pub fn tags(&self) -> Vec<TagRecord> {
        self.tokens
            .iter()
            .filter(|token| token.token_type == TokenType::Tag)
            .map(|token| TagRecord {
                name: token.name.clone().unwrap_or_default(),
                closer: token.closer.unwrap_or(false),
            })
            .collect()
    }

    /// The finished tree written back out as HTML
    pub fn normalized_html(&self) -> String {
        to_html(&self.tree)
    }
}

/// Error for a source that stopped early, if it did
///
/// `parsed` is how far into the input the consumed tokens reached.
pub fn terminal_error<S: TokenSource>(source: &S, parsed: usize) -> Option<BuildError> {
    if let Some(error) = source.last_error() {
        return Some(match error.unsupported {
            Some(detail) => BuildError::UnsupportedConstruct(detail),
            None => BuildError::Parse(error.message),
        });
    }
    if source.paused_at_incomplete_token() {
        return Some(BuildError::IncompleteToken { parsed });
    }
    None
}

/// Reply to a debugger request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub supports: Capabilities,
    pub html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<BuildResult>,
}

impl Response {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Build `request` and package the outcome
///
/// Failures become the `error` text; no partial result is ever attached.
pub fn respond<H: HostParser>(host: &H, request: &Request) -> Response {
    let supports = host.capabilities();
    match build(host, &request.html, &request.options()) {
        Ok(result) => Response {
            supports,
            html: request.html.clone(),
            error: None,
            normalized_html: Some(result.normalized_html()),
            result: Some(result),
        },
        Err(error) => {
            info!("Request failed: {}", error);
            Response {
                supports,
                html: request.html.clone(),
                error: Some(error.to_string()),
                normalized_html: None,
                result: None,
            }
        }
    }
}
