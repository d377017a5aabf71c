//! Protocol data model, parser and validator
//!
//! A protocol is a versioned JSON document: metadata, optional named macros,
//! and an ordered action list. Protocols are immutable once parsed; the
//! executor re-validates on receipt before running them.

mod model;
mod parser;

pub use model::{Action, Complexity, Metadata, Protocol, PROTOCOL_VERSION};
pub use parser::{ActionCatalog, ParseIssue, ParsedProtocol, ProtocolError, ProtocolParser};
