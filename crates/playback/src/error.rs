//! Tree building error types

use parsetrail_dom::DomError;
use thiserror::Error;

/// Tree building result type
pub type BuilderResult<T> = Result<T, BuildError>;

/// Reasons a build is abandoned
///
/// None of these leave a partial tree behind.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Could not create a token source for the {0}")]
    SourceUnavailable(&'static str),

    #[error("Could not resolve a context element: {0}")]
    ContextResolution(String),

    #[error("Unhandled token type for tree construction: {0}")]
    UnhandledTokenType(String),

    #[error("Unhandled comment type for tree construction")]
    UnhandledCommentType,

    #[error("{0}")]
    Parse(String),

    #[error("Unsupported: {0}")]
    UnsupportedConstruct(String),

    #[error("Paused at incomplete token after byte {parsed}")]
    IncompleteToken { parsed: usize },

    #[error("Tree cursor out of sync: {0}")]
    Tree(#[from] DomError),
}
