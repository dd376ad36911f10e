//! Host parser error types

use parsetrail_dom::Span;
use thiserror::Error;

/// Host parser result type
pub type HtmlResult<T> = Result<T, HtmlError>;

/// Errors raised while setting up a host parser
#[derive(Debug, Error)]
pub enum HtmlError {
    #[error("Invalid token script: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not read token script: {0}")]
    Io(#[from] std::io::Error),

    #[error("Token {index} of script for {input:?} has span {span} outside the input")]
    SpanOutOfBounds { input: String, index: usize, span: Span },
}
