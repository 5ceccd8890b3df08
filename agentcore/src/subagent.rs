//! Subagent Scheduler (§4.4): resolves spawn requests against a parent
//! template's spawnable-agent list, and drives synchronous children to
//! completion or lets asynchronous ones run in the background.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::agent_id::{self, AgentId};
use crate::builtin::{SpawnHandler, SpawnOutcome, SpawnRequest};
use crate::callback::CallbackRegistry;
use crate::dispatcher::ClientToolTransport;
use crate::error::ToolError;
use crate::fabric::{CreditLedger, TerminalErrorGuard};
use crate::instance::AgentInstance;
use crate::message::Message;
use crate::providers::common::Model;
use crate::step::{self, StepDeps, StepOutcome, StepEvent};
use crate::template::AgentTemplate;
use crate::tool::ToolBox;

/// Lookup table from a resolved [`AgentId`]'s canonical string to its
/// template, populated by whoever owns the set of publishable templates.
#[derive(Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Arc<AgentTemplate>>,
}

impl TemplateRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template under its own canonical id.
    pub fn register(&mut self, template: Arc<AgentTemplate>) {
        self.templates.insert(template.id.clone(), template);
    }

    /// Resolve a spawn request: find the first of `spawnable` that matches
    /// `requested`, then look its template up.
    #[must_use]
    pub fn resolve(&self, spawnable: &[AgentId], requested: &str) -> Option<Arc<AgentTemplate>> {
        match self.resolve_detailed(spawnable, requested) {
            SpawnResolution::Resolved(template) => Some(template),
            SpawnResolution::NotPermitted | SpawnResolution::TemplateNotFound { .. } => None,
        }
    }

    /// Resolve a spawn request, distinguishing "no matching entry in
    /// `spawnableAgents`" from "matched, but no template registered under
    /// that id" (§7's `SpawnNotPermitted` vs. `TemplateNotFound`).
    #[must_use]
    pub fn resolve_detailed(&self, spawnable: &[AgentId], requested: &str) -> SpawnResolution {
        let Some(allowed) = agent_id::resolve_spawn(spawnable, requested) else {
            return SpawnResolution::NotPermitted;
        };
        let template_id = allowed.to_canonical_string();
        match self.templates.get(&template_id) {
            Some(template) => SpawnResolution::Resolved(template.clone()),
            None => SpawnResolution::TemplateNotFound { template_id },
        }
    }
}

/// Result of resolving one spawn request against a parent's permissions and
/// the template registry.
pub enum SpawnResolution {
    /// Matched a permitted entry and a registered template.
    Resolved(Arc<AgentTemplate>),
    /// No entry in the parent's `spawnableAgents` matched the request.
    NotPermitted,
    /// A permitted entry matched, but no template is registered under it.
    TemplateNotFound {
        /// The canonical template id that could not be resolved.
        template_id: String,
    },
}

/// Looks a concrete [`Model`] up by the id a template declares.
pub trait ModelRegistry: Send + Sync {
    /// Resolve `model_id` to a model instance, if known.
    fn model_for(&self, model_id: &str) -> Option<Arc<dyn Model>>;
}

/// Everything needed to drive a spawned child instance, shared (via `Arc`)
/// so it can be moved into a background task for asynchronous spawns.
#[derive(Clone)]
pub struct SpawnEnvironment {
    /// Published/local templates children may be created from.
    pub templates: Arc<TemplateRegistry>,
    /// Model lookup by template `model_id`.
    pub models: Arc<dyn ModelRegistry>,
    /// Tools available for dispatch in child steps.
    pub toolbox: Arc<ToolBox>,
    /// Transport used to fulfil client-invokable calls.
    pub client: Arc<dyn ClientToolTransport>,
    /// Root directory file/terminal tools are confined to.
    pub project_root: Arc<PathBuf>,
    /// Observers of step-loop lifecycle events, shared across parent and children.
    pub callbacks: Arc<CallbackRegistry>,
    /// Context window size the pruner trims toward.
    pub max_context_length: usize,
    /// Session-level credit ledger, shared across the whole run tree.
    pub credits: Arc<CreditLedger>,
    /// Guards the run's single terminal `prompt-error` emission, shared
    /// across parent and every descendant child.
    pub terminal_error: Arc<TerminalErrorGuard>,
}

/// A completed or failed asynchronous child, queued until the parent's next
/// step picks it up as a background completion message.
pub struct PendingChildCompletion {
    /// Id of the child instance that finished.
    pub child_instance_id: String,
    /// Agent type that was spawned.
    pub agent_type: String,
    /// Output text, if the child ended cleanly.
    pub output: Option<String>,
}

/// Drives spawn requests for a single parent instance.
pub struct SubagentScheduler {
    parent_id: String,
    parent_spawnable: Vec<AgentId>,
    parent_instance: Arc<Mutex<AgentInstance>>,
    env: SpawnEnvironment,
    pending: Arc<Mutex<Vec<PendingChildCompletion>>>,
}

impl SubagentScheduler {
    /// Build a scheduler for `parent`, consulting its template's spawnable
    /// list for permission checks.
    #[must_use]
    pub fn new(parent_instance: Arc<Mutex<AgentInstance>>, parent_id: String, parent_spawnable: Vec<AgentId>, env: SpawnEnvironment) -> Self {
        Self {
            parent_id,
            parent_spawnable,
            parent_instance,
            env,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Drain and return any asynchronous children that finished since the
    /// last call, for the step loop to fold into the parent's history as
    /// background completion messages.
    #[must_use]
    pub fn drain_completions(&self) -> Vec<PendingChildCompletion> {
        std::mem::take(&mut self.pending.lock().unwrap())
    }

    async fn spawn_one(&self, request: SpawnRequest) -> SpawnOutcome {
        let template = match self.env.templates.resolve_detailed(&self.parent_spawnable, &request.agent_type) {
            SpawnResolution::Resolved(template) => template,
            SpawnResolution::NotPermitted => {
                let error = crate::error::AgentError::SpawnNotPermitted { agent_type: request.agent_type.clone() };
                return SpawnOutcome {
                    child_instance_id: String::new(),
                    agent_type: request.agent_type,
                    output: None,
                    failed: true,
                    error: Some(error.to_string()),
                };
            }
            SpawnResolution::TemplateNotFound { template_id } => {
                let error = crate::error::AgentError::TemplateNotFound { template_id };
                return SpawnOutcome {
                    child_instance_id: String::new(),
                    agent_type: request.agent_type,
                    output: None,
                    failed: true,
                    error: Some(error.to_string()),
                };
            }
        };

        let child_id = format!("{}/child-{}", self.parent_id, request.agent_type);
        let inherited_history = if request.include_message_history {
            Some(self.parent_instance.lock().unwrap().history_for_child())
        } else {
            None
        };

        // A child's step budget comes from an explicit request parameter,
        // defaulting to the global constant when unspecified; it is not
        // capped by how many steps the parent itself has left.
        let max_child_steps = request.step_budget.unwrap_or(crate::config::DEFAULT_MAX_AGENT_STEPS);

        let mut child = {
            let parent = self.parent_instance.lock().unwrap();
            AgentInstance::spawn_child(child_id.clone(), template.clone(), &parent, max_child_steps, inherited_history)
        };
        child.push_message(Message::user(request.prompt.clone()));

        self.env.callbacks.dispatch(
            &StepEvent::SpawnStarted {
                parent_instance_id: self.parent_id.clone(),
                child_instance_id: child_id.clone(),
                agent_id: template.id.clone(),
            },
            &crate::callback::CallbackContext::new().with_agent_name(template.display_name.clone()),
        );

        if request.asynchronous {
            let env = self.env.clone();
            let pending = Arc::clone(&self.pending);
            let parent_id = self.parent_id.clone();
            tokio::spawn(async move {
                let output = run_child_to_completion(&mut child, &env).await;
                env.callbacks.dispatch(
                    &StepEvent::SpawnCompleted {
                        parent_instance_id: parent_id,
                        child_instance_id: child.id.clone(),
                        succeeded: output.is_some(),
                    },
                    &crate::callback::CallbackContext::new(),
                );
                pending.lock().unwrap().push(PendingChildCompletion {
                    child_instance_id: child.id.clone(),
                    agent_type: child.template.id.clone(),
                    output,
                });
            });
            return SpawnOutcome {
                child_instance_id: child_id,
                agent_type: template.id.clone(),
                output: None,
                failed: false,
                error: None,
            };
        }

        let output = run_child_to_completion(&mut child, &self.env).await;
        self.env.callbacks.dispatch(
            &StepEvent::SpawnCompleted {
                parent_instance_id: self.parent_id.clone(),
                child_instance_id: child_id.clone(),
                succeeded: output.is_some(),
            },
            &crate::callback::CallbackContext::new(),
        );
        SpawnOutcome {
            child_instance_id: child_id,
            agent_type: template.id.clone(),
            output,
            failed: false,
            error: None,
        }
    }
}

async fn run_child_to_completion(child: &mut AgentInstance, env: &SpawnEnvironment) -> Option<String> {
    let Some(model) = env.models.model_for(&child.template.model_id) else {
        return None;
    };

    loop {
        if env.credits.check().is_err() {
            return None;
        }
        let deps = StepDeps {
            model: model.as_ref(),
            toolbox: env.toolbox.as_ref(),
            client: env.client.as_ref(),
            project_root: env.project_root.as_ref(),
            callbacks: env.callbacks.as_ref(),
            max_context_length: env.max_context_length,
            terminal_error: env.terminal_error.as_ref(),
        };
        match step::run_step(child, &deps).await {
            StepOutcome::ContinueNextStep => continue,
            StepOutcome::EndedTurn => return Some(child_output(child)),
            StepOutcome::FailedWithError(_) | StepOutcome::Cancelled => return None,
        }
    }
}

/// A finished child's reported output: its own structured output from a
/// designated tool when the template declares `output_schema`, identified by
/// the most recent tool-result whose JSON content validates against that
/// schema; otherwise the last assistant message's text.
fn child_output(child: &AgentInstance) -> String {
    if let Some(schema) = &child.template.output_schema {
        let structured = child.history.iter().rev().find_map(|message| {
            if message.role != crate::message::Role::Tool {
                return None;
            }
            message.content.iter().find_map(|part| match part {
                crate::message::ContentPart::Json(value) if crate::stream::validates_against_schema(schema, value) => {
                    Some(value.to_string())
                }
                _ => None,
            })
        });
        if let Some(structured) = structured {
            return structured;
        }
    }

    child
        .history
        .iter()
        .rev()
        .find_map(|m| {
            if m.role == crate::message::Role::Assistant {
                m.content.iter().find_map(|p| p.as_text().map(str::to_string))
            } else {
                None
            }
        })
        .unwrap_or_default()
}

#[async_trait]
impl SpawnHandler for SubagentScheduler {
    async fn spawn(&self, requests: Vec<SpawnRequest>) -> Result<Vec<SpawnOutcome>, ToolError> {
        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            outcomes.push(self.spawn_one(request).await);
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_id::AgentId;

    fn alpha_template() -> Arc<AgentTemplate> {
        Arc::new(AgentTemplate {
            id: "pub1/alpha@1.0.0".to_string(),
            agent_id: AgentId::parse_lenient("pub1/alpha@1.0.0"),
            display_name: "Alpha".to_string(),
            model_id: "mock".to_string(),
            system_prompt: String::new(),
            instructions_prompt: String::new(),
            allowed_tools: Default::default(),
            spawnable_agents: Vec::new(),
            output_schema: None,
            reasoning: None,
            inherit_parent_system_prompt: false,
            include_message_history: false,
            trusted: false,
        })
    }

    #[test]
    fn registry_resolves_name_only_request_through_qualified_template() {
        let mut registry = TemplateRegistry::new();
        registry.register(alpha_template());
        let spawnable = vec![AgentId::parse_lenient("pub1/alpha@1.0.0")];
        let resolved = registry.resolve(&spawnable, "alpha").expect("should resolve");
        assert_eq!(resolved.id, "pub1/alpha@1.0.0");
    }

    #[test]
    fn registry_rejects_unlisted_agent_type() {
        let registry = TemplateRegistry::new();
        let spawnable = vec![AgentId::parse_lenient("pub1/alpha@1.0.0")];
        assert!(registry.resolve(&spawnable, "beta").is_none());
    }

    #[test]
    fn registry_distinguishes_not_permitted_from_template_not_found() {
        let registry = TemplateRegistry::new();
        let spawnable = vec![AgentId::parse_lenient("pub1/alpha@1.0.0")];
        assert!(matches!(registry.resolve_detailed(&spawnable, "beta"), SpawnResolution::NotPermitted));

        let spawnable_but_unregistered = vec![AgentId::parse_lenient("pub1/ghost@1.0.0")];
        assert!(matches!(
            registry.resolve_detailed(&spawnable_but_unregistered, "ghost"),
            SpawnResolution::TemplateNotFound { .. }
        ));
    }

    fn child_with_history(output_schema: Option<serde_json::Value>, history: Vec<Message>) -> AgentInstance {
        let mut template = (*alpha_template()).clone();
        template.output_schema = output_schema;
        let mut instance = AgentInstance::new("child-1", Arc::new(template), 10);
        instance.history = history;
        instance
    }

    #[test]
    fn child_output_falls_back_to_last_assistant_text_without_a_schema() {
        let history = vec![Message::user("go"), Message::assistant("the answer is 42")];
        let child = child_with_history(None, history);
        assert_eq!(child_output(&child), "the answer is 42");
    }

    #[test]
    fn child_output_prefers_a_tool_result_matching_the_declared_schema() {
        let schema = serde_json::json!({
            "type": "object",
            "required": ["verdict"],
            "properties": { "verdict": { "type": "string" } },
        });
        let structured = serde_json::json!({ "verdict": "approved" });
        let history = vec![
            Message::assistant("thinking..."),
            Message::tool_result("call-1".to_string(), "submit".to_string(), vec![crate::message::ContentPart::Json(structured.clone())]),
        ];
        let child = child_with_history(Some(schema), history);
        assert_eq!(child_output(&child), structured.to_string());
    }

    #[test]
    fn child_output_falls_back_when_no_tool_result_matches_the_schema() {
        let schema = serde_json::json!({
            "type": "object",
            "required": ["verdict"],
            "properties": { "verdict": { "type": "string" } },
        });
        let history = vec![
            Message::tool_result(
                "call-1".to_string(),
                "search".to_string(),
                vec![crate::message::ContentPart::Json(serde_json::json!({"hits": 3}))],
            ),
            Message::assistant("final answer"),
        ];
        let child = child_with_history(Some(schema), history);
        assert_eq!(child_output(&child), "final answer");
    }
}
