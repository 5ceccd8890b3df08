//! Stream Parser: converts a raw model token stream into `(text | tool call)`
//! events with at-most-once delivery and no lost tail.

pub mod events;
pub mod parser;

pub use events::{ParsedToolCall, StreamEvent};
pub use parser::{TagStreamParser, parse_native_tool_calls, validates_against_schema};
