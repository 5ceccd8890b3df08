//! Built-in tools every agent template can declare: reflection, turn
//! control, subagent spawning, and the history-replacement tool used by the
//! Pruner subagent.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::message::Message;
use crate::tool::Tool;

/// A thought recorded for the model's own benefit; never makes progress on
/// its own (see [`crate::config::NON_PROGRESS_TOOLS`]).
#[derive(Debug, Default)]
pub struct ThinkDeeplyTool;

#[derive(Debug, Deserialize)]
pub struct ThinkDeeplyArgs {
    /// The reasoning text to record.
    pub thought: String,
}

#[derive(Debug, Serialize)]
pub struct ThinkDeeplyOutput {
    recorded: bool,
}

#[async_trait]
impl Tool for ThinkDeeplyTool {
    const NAME: &'static str = "think_deeply";
    type Args = ThinkDeeplyArgs;
    type Output = ThinkDeeplyOutput;
    type Error = ToolError;

    fn description(&self) -> String {
        "Record a chain of reasoning without taking any other action.".to_string()
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "thought": { "type": "string" } },
            "required": ["thought"],
        })
    }

    async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
        Ok(ThinkDeeplyOutput { recorded: true })
    }
}

/// Ends the current agent step. Always registered with
/// [`crate::tool::ToolRegistration::ending_agent_step`].
#[derive(Debug, Default)]
pub struct EndTurnTool;

#[derive(Debug, Deserialize, Default)]
pub struct EndTurnArgs {
    /// Optional closing message for the step.
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EndTurnOutput {
    ended: bool,
}

#[async_trait]
impl Tool for EndTurnTool {
    const NAME: &'static str = "end_turn";
    type Args = EndTurnArgs;
    type Output = EndTurnOutput;
    type Error = ToolError;

    fn description(&self) -> String {
        "Signal that the agent is done with its current turn.".to_string()
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "message": { "type": "string" } },
        })
    }

    async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
        Ok(EndTurnOutput { ended: true })
    }
}

/// One requested child agent spawn.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpawnRequest {
    /// Template id of the agent to spawn.
    pub agent_type: String,
    /// Prompt handed to the child as its first user message.
    pub prompt: String,
    /// When `true`, the parent does not suspend waiting for the child.
    #[serde(default)]
    pub asynchronous: bool,
    /// Whether to include the parent's message history in the child's context.
    #[serde(default)]
    pub include_message_history: bool,
    /// Explicit `stepsRemaining` override for the child. When absent, the
    /// child gets `DEFAULT_MAX_AGENT_STEPS`.
    #[serde(default)]
    pub step_budget: Option<usize>,
}

/// One child's outcome, as reported back to the parent.
#[derive(Debug, Clone, Serialize)]
pub struct SpawnOutcome {
    /// Id assigned to the spawned instance.
    pub child_instance_id: String,
    /// Agent type that was spawned.
    pub agent_type: String,
    /// Final output, present only for synchronous spawns that completed.
    pub output: Option<String>,
    /// `true` if the spawn was rejected (permission denied, unknown template).
    pub failed: bool,
    /// Human-readable reason the spawn failed, set whenever `failed` is true.
    pub error: Option<String>,
}

/// Seam the [`SpawnAgentsTool`] delegates to; implemented by the subagent
/// scheduler. Kept as a trait so the tool can be unit-tested without a real
/// scheduler wired in.
#[async_trait]
pub trait SpawnHandler: Send + Sync {
    /// Spawn every requested child, synchronous ones resolved before
    /// returning, asynchronous ones returned as pending placeholders.
    async fn spawn(&self, requests: Vec<SpawnRequest>) -> Result<Vec<SpawnOutcome>, ToolError>;
}

/// Spawns one or more subagents, some synchronous and some fire-and-forget.
pub struct SpawnAgentsTool {
    handler: Arc<dyn SpawnHandler>,
}

impl SpawnAgentsTool {
    /// Build a spawner delegating to `handler`.
    #[must_use]
    pub fn new(handler: Arc<dyn SpawnHandler>) -> Self {
        Self { handler }
    }
}

#[derive(Debug, Deserialize)]
pub struct SpawnAgentsArgs {
    /// Children to spawn, in order.
    pub agents: Vec<SpawnRequest>,
}

#[async_trait]
impl Tool for SpawnAgentsTool {
    const NAME: &'static str = "spawn_agents";
    type Args = SpawnAgentsArgs;
    type Output = Vec<SpawnOutcome>;
    type Error = ToolError;

    fn description(&self) -> String {
        "Spawn one or more subagents, synchronously or in the background.".to_string()
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "agents": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "agentType": { "type": "string" },
                            "prompt": { "type": "string" },
                            "asynchronous": { "type": "boolean" },
                            "includeMessageHistory": { "type": "boolean" },
                            "stepBudget": { "type": "integer", "minimum": 1 },
                        },
                        "required": ["agentType", "prompt"],
                    },
                },
            },
            "required": ["agents"],
        })
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        self.handler.spawn(args.agents).await
    }
}

/// Replaces the calling instance's entire message history. Declared only on
/// the built-in Pruner subagent's template; the step loop, not this tool,
/// performs the actual replacement by reading the call's sanitized input.
#[derive(Debug, Default)]
pub struct SetMessagesTool;

#[derive(Debug, Deserialize)]
pub struct SetMessagesArgs {
    /// The replacement history, in order.
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct SetMessagesOutput {
    accepted: usize,
}

#[async_trait]
impl Tool for SetMessagesTool {
    const NAME: &'static str = "set_messages";
    type Args = SetMessagesArgs;
    type Output = SetMessagesOutput;
    type Error = ToolError;

    fn description(&self) -> String {
        "Replace the full message history with a pruned replacement.".to_string()
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "messages": { "type": "array" },
            },
            "required": ["messages"],
        })
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        Ok(SetMessagesOutput { accepted: args.messages.len() })
    }
}
