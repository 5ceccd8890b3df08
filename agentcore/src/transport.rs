//! External client transport (§6): the JSON-framed action protocol a
//! connected client and the step loop exchange over a persistent connection.
//! Authentication is carried out-of-band via the `x-codebuff-api-key` header
//! on the connection itself, not as part of any framed action.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Message;

/// Header name clients authenticate the transport connection with.
pub const API_KEY_HEADER: &str = "x-codebuff-api-key";

/// One action exchanged over the client transport, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientAction {
    /// Opens a run: the client supplies the agent type and initial prompt.
    Init {
        /// Template id of the top-level agent to run.
        agent_type: String,
        /// The user's initial prompt.
        prompt: String,
    },
    /// A subsequent prompt sent mid-run (e.g. after `prompt-response`).
    Prompt {
        /// Id of the instance this prompt continues.
        instance_id: String,
        /// The new user turn.
        prompt: String,
    },
    /// An incremental chunk of assistant-visible text as it streams.
    ResponseChunk {
        /// Id of the instance streaming this chunk.
        instance_id: String,
        /// The text chunk.
        text: String,
    },
    /// A client-invokable tool call the step loop needs the client to run.
    ToolCall {
        /// Id of the instance making the call.
        instance_id: String,
        /// Stable id for this call, matched by a later `tool-result`.
        call_id: String,
        /// Name of the tool being called.
        tool_name: String,
        /// Sanitized input (the `cb_easp` bit already stripped).
        input: Value,
    },
    /// The client's answer to a prior `tool-call` action.
    ToolResult {
        /// Id of the instance the call belonged to.
        instance_id: String,
        /// Id of the call this result answers.
        call_id: String,
        /// The tool's result payload.
        output: Value,
    },
    /// The run ended with an unrecoverable error.
    PromptError {
        /// Id of the instance that failed.
        instance_id: String,
        /// Human-readable error message.
        message: String,
    },
    /// The run ended cleanly with a final assistant message.
    PromptResponse {
        /// Id of the instance that finished.
        instance_id: String,
        /// The final message, if one was produced.
        message: Option<Message>,
    },
}

impl ClientAction {
    /// The action's `type` tag, for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Prompt { .. } => "prompt",
            Self::ResponseChunk { .. } => "response-chunk",
            Self::ToolCall { .. } => "tool-call",
            Self::ToolResult { .. } => "tool-result",
            Self::PromptError { .. } => "prompt-error",
            Self::PromptResponse { .. } => "prompt-response",
        }
    }
}
