//! Error types for the agent step loop and its surrounding subsystems.
//!
//! This module defines all error kinds used throughout the crate. Recoverable
//! errors (tool-facing) become `ToolError` and are folded into a tool-role
//! message so the model can react to them; terminal errors become an
//! `AgentError` variant and end the instance.

use thiserror::Error;

/// A type alias for `Result<T, AgentError>`.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors surfaced from a single tool invocation.
///
/// `ToolError` is always recoverable: the dispatcher folds it into a
/// tool-role result message with an error field rather than unwinding the
/// step loop.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// The call named a tool the agent's template does not declare.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// No tool registered under this name was found in the dispatcher's registry.
    #[error("no tool registered under name: {0}")]
    NotFound(String),
    /// The call's input failed schema validation.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// The tool handler ran and returned an error.
    #[error("tool execution failed: {0}")]
    Execution(String),
    /// No `tool-result` arrived from the client before the per-call deadline.
    #[error("tool call timed out waiting for a result")]
    Timeout,
    /// A file or terminal tool attempted to operate outside the project root.
    #[error("path '{path}' resolves outside the project root")]
    CwdOutsideProject {
        /// The path that was rejected.
        path: String,
    },
}

/// The main error type for agent step-loop operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Error during tool execution (unrecovered at the dispatcher boundary).
    #[error("tool execution error in '{tool_name}': {message}")]
    ToolExecution {
        /// Name of the tool that failed.
        tool_name: String,
        /// The underlying error message.
        message: String,
    },

    /// Error parsing model output into tool-call events.
    #[error("parsing error: {message}. output: {output}")]
    Parsing {
        /// The output that failed to parse.
        output: String,
        /// The parsing error message.
        message: String,
    },

    /// Error from the model/LLM stream itself.
    #[error("model error: {message}")]
    Model {
        /// The underlying error message.
        message: String,
    },

    /// A spawn call named a tool/template not in the parent's `spawnableAgents`.
    #[error("spawn not permitted for agent type '{agent_type}'")]
    SpawnNotPermitted {
        /// The child agent type that was requested.
        agent_type: String,
    },

    /// A spawn call's matched identifier does not resolve to a known template.
    #[error("template not found: {template_id}")]
    TemplateNotFound {
        /// The template id that could not be resolved.
        template_id: String,
    },

    /// The instance exhausted `stepsRemaining` without reaching `end_turn`.
    #[error("step budget exhausted ({steps}/{max_steps})")]
    StepBudgetExhausted {
        /// Number of steps taken.
        steps: usize,
        /// Maximum allowed steps.
        max_steps: usize,
    },

    /// The session-level credit counter was exhausted.
    #[error("session credits exhausted")]
    CreditsExhausted,

    /// Agent execution was cancelled (terminal, not an error in the usual sense).
    #[error("agent execution was cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration issue.
        message: String,
    },

    /// HTTP/network error.
    #[error("http error: {message}")]
    Http {
        /// The underlying error message.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("json error: {message}")]
    Json {
        /// The underlying error message.
        message: String,
    },

    /// Generic internal error.
    #[error("internal error: {message}")]
    Internal {
        /// The underlying error message.
        message: String,
    },
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<ToolError> for AgentError {
    fn from(err: ToolError) -> Self {
        Self::ToolExecution {
            tool_name: String::new(),
            message: err.to_string(),
        }
    }
}

impl AgentError {
    /// Create a new tool execution error.
    #[must_use]
    pub fn tool_execution(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Create a new parsing error.
    #[must_use]
    pub fn parsing(output: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parsing {
            output: output.into(),
            message: message.into(),
        }
    }

    /// Create a new model error.
    #[must_use]
    pub fn model(message: impl Into<String>) -> Self {
        Self::Model {
            message: message.into(),
        }
    }

    /// Create a new step-budget-exhausted error.
    #[must_use]
    pub const fn step_budget_exhausted(steps: usize, max_steps: usize) -> Self {
        Self::StepBudgetExhausted { steps, max_steps }
    }

    /// Create a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error is terminal for the instance (vs. recoverable
    /// inline as a tool-result, which never reaches `AgentError`).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        true
    }
}
