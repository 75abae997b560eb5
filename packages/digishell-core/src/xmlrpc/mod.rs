//! Minimal XML-RPC codec for the fldigi control API
//!
//! fldigi exposes its controls as XML-RPC methods over HTTP POST to `/RPC2`.
//! Only the subset of the format fldigi produces is supported.
//!
//! ## Key components:
//! - `escape` - XML character entity handling
//! - `value` - Typed values and `methodCall` encoding
//! - `parser` - Parse `methodResponse` documents into a value or a fault

mod escape;
mod parser;
mod value;

pub use escape::{escape_text, unescape_text};
pub use parser::parse_response;
pub use value::{encode_call, Value};
