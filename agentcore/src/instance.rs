//! An `AgentInstance`: one running copy of an [`crate::template::AgentTemplate`],
//! its message history, and its position in the step-loop state machine.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::fabric::{CancellationToken, StepBudget};
use crate::message::Message;
use crate::template::AgentTemplate;
use crate::usage::Usage;

/// Where an instance sits in the step loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// Waiting for its next step to be driven.
    Idle,
    /// A model response is being streamed and parsed.
    Streaming,
    /// Tool calls from the last step are being dispatched.
    ToolDispatch,
    /// Ran to completion cleanly (`end_turn`, or no further tool calls).
    Ended,
    /// Stopped by an unrecoverable error.
    Failed,
    /// Stopped by cancellation.
    Cancelled,
}

impl AgentState {
    /// Whether this state accepts no further steps.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Failed | Self::Cancelled)
    }
}

/// One running agent: a template reference, its own history, and its place
/// in the state machine. Cheap to clone the `Arc<AgentTemplate>`; the
/// instance itself owns its mutable history and state.
pub struct AgentInstance {
    /// Unique id for this running instance.
    pub id: String,
    /// Template this instance was created from.
    pub template: Arc<AgentTemplate>,
    /// Append-only (except for whole-vector pruner rewrites) message history.
    pub history: Vec<Message>,
    /// Current step-loop state.
    pub state: AgentState,
    /// Steps consumed so far, mirrored against `step_budget`.
    pub step: usize,
    /// Cumulative token usage across all steps.
    pub usage: Usage,
    /// Per-instance step budget, inherited from the parent on spawn.
    pub step_budget: StepBudget,
    /// Cancellation signal shared with any async children.
    pub cancellation: CancellationToken,
    /// Id of the spawning instance, `None` for a top-level run.
    pub parent_instance_id: Option<String>,
    /// Arbitrary per-instance scratch state (e.g. auto-discovered knowledge
    /// file contents folded into the prompt).
    pub session_state: HashMap<String, Value>,
}

impl AgentInstance {
    /// Create a fresh top-level instance.
    #[must_use]
    pub fn new(id: impl Into<String>, template: Arc<AgentTemplate>, max_steps: usize) -> Self {
        Self {
            id: id.into(),
            template,
            history: Vec::new(),
            state: AgentState::Idle,
            step: 0,
            usage: Usage::zero(),
            step_budget: StepBudget::new(max_steps),
            cancellation: CancellationToken::new(),
            parent_instance_id: None,
            session_state: HashMap::new(),
        }
    }

    /// Create a child instance spawned from `parent`, inheriting its
    /// cancellation token so a parent cancellation propagates to async
    /// children, and optionally its history.
    #[must_use]
    pub fn spawn_child(
        id: impl Into<String>,
        template: Arc<AgentTemplate>,
        parent: &Self,
        max_steps: usize,
        inherited_history: Option<Vec<Message>>,
    ) -> Self {
        Self {
            id: id.into(),
            template,
            history: inherited_history.unwrap_or_default(),
            state: AgentState::Idle,
            step: 0,
            usage: Usage::zero(),
            step_budget: StepBudget::new(max_steps),
            cancellation: parent.cancellation.clone(),
            parent_instance_id: Some(parent.id.clone()),
            session_state: HashMap::new(),
        }
    }

    /// Append a message to the history.
    pub fn push_message(&mut self, message: Message) {
        self.history.push(message);
    }

    /// Replace the entire history, as performed by the `set_messages`
    /// built-in when the Pruner subagent runs.
    pub fn replace_history(&mut self, messages: Vec<Message>) {
        self.history = messages;
    }

    /// Advance `state`, refusing to leave a terminal state.
    pub fn transition(&mut self, next: AgentState) {
        if self.state.is_terminal() {
            return;
        }
        self.state = next;
    }

    /// History filtered for inclusion in a synchronous child's prompt: the
    /// parent's own re-derived instructions-prompt messages are stripped,
    /// since the child renders its own from its own template.
    #[must_use]
    pub fn history_for_child(&self) -> Vec<Message> {
        self.history
            .iter()
            .filter(|m| !m.has_tag(crate::message::Tag::InstructionsPrompt))
            .cloned()
            .collect()
    }
}
