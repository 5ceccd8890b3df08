//! Events emitted by the [`super::parser`] as it consumes a token stream.

use serde_json::Value;

/// A tool call reconstructed from the token stream.
#[derive(Debug, Clone)]
pub struct ParsedToolCall {
    /// Stable id for this call — generated if the provider didn't supply one.
    pub id: String,
    /// Name of the tool, as emitted by the model.
    pub name: String,
    /// Parsed input object.
    pub input: Value,
    /// Set when the stream marked this call as closing the current step.
    /// Stripped from `input` before it reaches any tool handler.
    pub ends_agent_step: bool,
    /// `false` when `name` was not found in the template's declared tool
    /// set — the dispatcher surfaces this as `UnknownTool`.
    pub known: bool,
}

/// One event produced while incrementally parsing a token stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A chunk of assistant-visible text.
    TextChunk(String),
    /// A fully-reconstructed tool call.
    ToolCall(ParsedToolCall),
}
