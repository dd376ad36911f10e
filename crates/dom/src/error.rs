//! DOM error types

use thiserror::Error;

/// DOM operation result type
pub type DomResult<T> = Result<T, DomError>;

/// DOM errors
#[derive(Debug, Error)]
pub enum DomError {
    #[error("No node at path {0:?}")]
    InvalidPath(Vec<usize>),

    #[error("Node at path {0:?} cannot have children")]
    NotAContainer(Vec<usize>),
}
