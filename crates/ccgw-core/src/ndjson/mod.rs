//! NDJSON event records from Claude Code's `stream-json` output.
//!
//! Every stdout line becomes an [`EventRecord`]: the decoded JSON object, or a
//! synthesized `{"type":"text","content":...}` wrapper when the line is not
//! JSON. [`parse_value`] gives a typed [`Message`] view for translation while
//! implementing a tolerant reader pattern.

mod parser;
mod record;
mod types;

pub use parser::{parse_line, parse_value};
pub use record::EventRecord;
pub use types::*;
