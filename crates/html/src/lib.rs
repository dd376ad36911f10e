//! Parsetrail host parsers
//!
//! The token source interface the playback builder consumes, plus two
//! implementations: a reference HTML processor and a scripted replayer.

mod entities;
mod error;
mod processor;
mod scripted;
mod source;
mod tokenizer;

pub use entities::{decode_entity, decode_numeric, decode_text};
pub use error::{HtmlError, HtmlResult};
pub use processor::{HtmlProcessor, InsertionMode, ReferenceHost};
pub use scripted::{RecordedToken, Script, ScriptedHost, ScriptedSource};
pub use source::{
    AttributeValue, Capabilities, CommentType, ContextElement, DoctypeInfo, HostParser, SourceError, TokenSource,
    TokenType,
};
pub use tokenizer::{Lexeme, Scan, TagLexeme, Tokenizer};
