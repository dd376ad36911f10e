//! Parsetrail Playback - tree building and step-by-step replay
//!
//! Drives a token source over an input, rebuilds the tree it describes and
//! records a snapshot of that tree before every token.

mod assemble;
mod builder;
mod error;
mod options;
mod recorder;

pub use assemble::{respond, terminal_error, BuildResult, Response, TagRecord};
pub use builder::{build, normalize_title, resolve_context, ResolvedContext, TokenRecord, TreeBuilder};
pub use error::{BuildError, BuilderResult};
pub use options::{BuildOptions, Markup, Request};
pub use recorder::{Playback, PlaybackFrame, Recorder};
