//! Agent templates: the immutable descriptions instances are created from.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent_id::AgentId;

/// Reasoning configuration attached to a template, if its model supports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReasoningOptions {
    /// A named effort level (e.g. `"low"`, `"medium"`, `"high"`).
    Effort(String),
    /// An explicit token budget for reasoning.
    MaxTokens(u32),
    /// Reasoning disabled for this template even if the model supports it.
    Disabled,
}

/// An immutable description of an agent, produced from a user or built-in
/// definition. Templates are never mutated after construction; instances are
/// created from a reference to one.
#[derive(Debug, Clone)]
pub struct AgentTemplate {
    /// Stable id for this template, e.g. `"pub1/alpha@1.0.0"` or `"alpha"`.
    pub id: String,
    /// Parsed form of `id`, used for spawn-permission matching.
    pub agent_id: AgentId,
    /// Human-readable display name.
    pub display_name: String,
    /// Identifier of the model this template runs against.
    pub model_id: String,
    /// The resolved system prompt.
    pub system_prompt: String,
    /// Instructions / step prompt text, re-rendered fresh each step and
    /// tagged `INSTRUCTIONS_PROMPT` in the resulting message.
    pub instructions_prompt: String,
    /// Tool names this template's agent may call. May include
    /// platform-internal tool names when `trusted` is set.
    pub allowed_tools: HashSet<String>,
    /// Template ids this agent is permitted to spawn as children.
    pub spawnable_agents: Vec<AgentId>,
    /// Optional JSON schema the agent's final structured output must match.
    pub output_schema: Option<Value>,
    /// Reasoning configuration, if any.
    pub reasoning: Option<ReasoningOptions>,
    /// Whether a spawned child of this template inherits the parent's
    /// resolved system prompt instead of its own.
    pub inherit_parent_system_prompt: bool,
    /// Whether a synchronous spawn of this template receives the parent's
    /// message history (system-role entries stripped).
    pub include_message_history: bool,
    /// Whether this template is trusted to reference platform-internal
    /// tools not on the public published-tool list.
    pub trusted: bool,
}

impl AgentTemplate {
    /// Validate the invariant that non-public tool names may appear only in
    /// trusted templates.
    ///
    /// # Errors
    /// Returns the offending tool name if an untrusted template references a
    /// tool outside `public_tools`.
    pub fn validate_tool_visibility(&self, public_tools: &HashSet<String>) -> Result<(), String> {
        if self.trusted {
            return Ok(());
        }
        for tool in &self.allowed_tools {
            if !public_tools.contains(tool) {
                return Err(tool.clone());
            }
        }
        Ok(())
    }
}
