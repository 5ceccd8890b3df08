//! Step-loop lifecycle events dispatched through the callback registry.

use crate::message::Message;
use crate::usage::Usage;

/// A lifecycle event emitted by the agent step loop, dispatched to every
/// registered callback via [`crate::callback::CallbackRegistry`].
#[derive(Debug, Clone)]
pub enum StepEvent {
    /// A new step has begun for the named agent instance.
    StepStarted {
        /// Id of the instance whose step is starting.
        instance_id: String,
        /// 1-indexed step number.
        step: usize,
    },
    /// A step finished and produced the given usage delta.
    StepEnded {
        /// Id of the instance whose step ended.
        instance_id: String,
        /// 1-indexed step number.
        step: usize,
        /// Token usage consumed by this step.
        usage: Usage,
    },
    /// A tool call was dispatched.
    ToolCallStarted {
        /// Id of the instance dispatching the call.
        instance_id: String,
        /// Name of the tool being called.
        tool_name: String,
        /// Stable id of this tool call.
        call_id: String,
    },
    /// A tool call finished, successfully or not.
    ToolCallCompleted {
        /// Id of the instance that dispatched the call.
        instance_id: String,
        /// Name of the tool that was called.
        tool_name: String,
        /// Stable id of this tool call.
        call_id: String,
        /// Whether the call completed without error.
        succeeded: bool,
    },
    /// A child agent was spawned.
    SpawnStarted {
        /// Id of the spawning instance.
        parent_instance_id: String,
        /// Id of the newly created child instance.
        child_instance_id: String,
        /// Resolved template id of the spawned agent.
        agent_id: String,
    },
    /// A spawned child agent finished running.
    SpawnCompleted {
        /// Id of the spawning instance.
        parent_instance_id: String,
        /// Id of the child instance that finished.
        child_instance_id: String,
        /// Whether the child run ended without error.
        succeeded: bool,
    },
    /// A top-level run ended, normally, by error, or by cancellation.
    RunEnded {
        /// Id of the instance whose run ended.
        instance_id: String,
        /// The final assistant message, if one was produced.
        message: Option<Message>,
    },
}

impl StepEvent {
    /// Short, stable name of the event kind, suitable for log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::StepStarted { .. } => "step_started",
            Self::StepEnded { .. } => "step_ended",
            Self::ToolCallStarted { .. } => "tool_call_started",
            Self::ToolCallCompleted { .. } => "tool_call_completed",
            Self::SpawnStarted { .. } => "spawn_started",
            Self::SpawnCompleted { .. } => "spawn_completed",
            Self::RunEnded { .. } => "run_ended",
        }
    }
}
