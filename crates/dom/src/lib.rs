//! Parsetrail DOM - annotated parse trees
//!
//! Provides the persistent node tree that the playback builder grows one
//! token at a time, plus queries, serialization and a text renderer.

mod node;
mod tree;
mod error;
mod query;
pub mod elements;
pub mod serialize;
pub mod render;

pub use node::{
    Attribute, CommentKind, CompatMode, Diagnostics, DoctypeData, ElementData, Namespace, Node,
    NodeKind, Span,
};
pub use tree::{DomTree, NodePath};
pub use error::{DomError, DomResult};
pub use query::Queryable;
