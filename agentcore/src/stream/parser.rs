//! Incremental tool-call extraction from a model token stream.
//!
//! Two call conventions are supported: a provider's native function-calling
//! tokens (already reconstructed into [`crate::message::ChatMessageToolCall`]
//! by [`crate::message::aggregate_stream_deltas`]), and an inline textual
//! tag convention for providers without native tool calling. Both converge
//! on the same [`ParsedToolCall`] shape.
//!
//! Inline tag grammar: `<<<TOOL_CALL name="NAME">>>{json input}<<<END_TOOL_CALL>>>`.
//! The end-of-step bit travels inside the JSON input under the `cb_easp`
//! key and is extracted into [`ParsedToolCall::ends_agent_step`] rather than
//! left in the call's input.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use crate::message::ChatMessageToolCall;
use crate::stream::events::{ParsedToolCall, StreamEvent};

const OPEN_PREFIX: &str = "<<<TOOL_CALL";
const OPEN_SUFFIX: &str = ">>>";
const CLOSE_TAG: &str = "<<<END_TOOL_CALL>>>";
const END_STEP_KEY: &str = "cb_easp";

static CALL_COUNTER: AtomicU64 = AtomicU64::new(0);

fn generate_call_id() -> String {
    format!("call_{}", CALL_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Strip `cb_easp` out of a raw tool input, returning the sanitized input
/// and whether the flag was set.
fn extract_end_of_step(mut input: Value) -> (Value, bool) {
    let ends_step = match &mut input {
        Value::Object(map) => map.remove(END_STEP_KEY).is_some_and(|v| v == Value::Bool(true)),
        _ => false,
    };
    (input, ends_step)
}

/// Validate a custom tool's input against its declared JSON schema.
#[must_use]
pub fn validates_against_schema(schema: &Value, input: &Value) -> bool {
    jsonschema::is_valid(schema, input)
}

/// Build [`StreamEvent::ToolCall`]s from a fully-aggregated set of native
/// provider tool calls (see [`crate::message::aggregate_stream_deltas`]).
/// `declared_tools` is the template's allowed-tool set, used to mark
/// `UnknownTool`.
///
/// Schema validation happens later, in the dispatcher, which is the one
/// place both tool-call conventions (native and the inline tag grammar)
/// converge before a handler actually runs.
#[must_use]
pub fn parse_native_tool_calls(calls: &[ChatMessageToolCall], declared_tools: &HashSet<String>) -> Vec<ParsedToolCall> {
    calls
        .iter()
        .map(|call| {
            let raw_input = call.arguments().clone();
            let (input, ends_agent_step) = extract_end_of_step(raw_input);
            let known = declared_tools.contains(call.name());
            ParsedToolCall {
                id: call.id.clone(),
                name: call.name().to_string(),
                input,
                ends_agent_step,
                known,
            }
        })
        .collect()
}

/// Incremental parser for the inline tag convention, fed one token at a time.
#[derive(Debug, Default)]
pub struct TagStreamParser {
    pending: String,
    declared_tools: HashSet<String>,
}

impl TagStreamParser {
    /// Create a parser that marks calls to names outside `declared_tools`
    /// as unknown.
    #[must_use]
    pub fn new(declared_tools: HashSet<String>) -> Self {
        Self {
            pending: String::new(),
            declared_tools,
        }
    }

    /// Feed the next token, returning any events it completes. Text
    /// beginning with `-` is ordinary content and passes through unchanged;
    /// the parser never treats it as flag syntax.
    pub fn push_token(&mut self, token: &str) -> Vec<StreamEvent> {
        self.pending.push_str(token);
        self.drain(false)
    }

    /// Flush any complete events remaining in the buffer at stream close.
    /// A partial tag left in the buffer is discarded, never emitted.
    pub fn flush(&mut self) -> Vec<StreamEvent> {
        self.drain(true)
    }

    fn drain(&mut self, at_close: bool) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        loop {
            let Some(start) = self.pending.find(OPEN_PREFIX) else {
                // No tag start in the buffer. Hold back a suffix that could
                // still be the beginning of one, unless we're flushing.
                let hold_back = if at_close { 0 } else { overlap_with_prefix(&self.pending, OPEN_PREFIX) };
                let split_at = self.pending.len() - hold_back;
                if split_at > 0 {
                    let text = self.pending[..split_at].to_string();
                    events.push(StreamEvent::TextChunk(strip_trailing_newline(text)));
                }
                self.pending = self.pending[split_at..].to_string();
                break;
            };

            if start > 0 {
                let text = self.pending[..start].to_string();
                events.push(StreamEvent::TextChunk(strip_trailing_newline(text)));
            }

            let rest = &self.pending[start..];
            let Some(open_end_rel) = rest.find(OPEN_SUFFIX) else {
                if at_close {
                    self.pending.clear();
                } else {
                    self.pending = rest.to_string();
                }
                break;
            };
            let header_start = start + OPEN_PREFIX.len();
            let header_end = start + open_end_rel;
            let body_start = header_end + OPEN_SUFFIX.len();

            let Some(close_rel) = self.pending[body_start..].find(CLOSE_TAG) else {
                if at_close {
                    self.pending.clear();
                } else {
                    self.pending = self.pending[start..].to_string();
                }
                break;
            };
            let body_end = body_start + close_rel;
            let after = body_end + CLOSE_TAG.len();

            let header = self.pending[header_start..header_end].to_string();
            let body = self.pending[body_start..body_end].to_string();
            events.push(self.build_tool_call(&header, &body));

            self.pending = self.pending[after..].to_string();
        }
        events
    }

    fn build_tool_call(&self, header: &str, body: &str) -> StreamEvent {
        let name = extract_name_attribute(header).unwrap_or_default();
        let raw_input: Value = serde_json::from_str(body.trim()).unwrap_or(Value::Null);
        let (input, ends_agent_step) = extract_end_of_step(raw_input);
        let known = self.declared_tools.contains(&name);
        StreamEvent::ToolCall(ParsedToolCall {
            id: generate_call_id(),
            name,
            input,
            ends_agent_step,
            known,
        })
    }
}

fn extract_name_attribute(header: &str) -> Option<String> {
    let needle = "name=\"";
    let start = header.find(needle)? + needle.len();
    let end = header[start..].find('"')? + start;
    Some(header[start..end].to_string())
}

fn strip_trailing_newline(mut text: String) -> String {
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
    text
}

/// Length of the longest suffix of `text` that is a prefix of `needle` —
/// used to avoid splitting a tag marker across two pushed tokens.
fn overlap_with_prefix(text: &str, needle: &str) -> usize {
    let max_len = text.len().min(needle.len());
    for len in (1..=max_len).rev() {
        if text.ends_with(&needle[..len]) {
            return len;
        }
    }
    0
}
