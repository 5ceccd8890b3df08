//! The agent step loop: drives a single agent instance through the
//! stream → parse → dispatch → terminate cycle for one step at a time.

pub mod events;
pub mod prompt;

pub use events::StepEvent;

use std::collections::HashSet;
use std::path::Path;

use futures::StreamExt;

use crate::callback::{CallbackContext, CallbackRegistry};
use crate::dispatcher::{self, ClientToolTransport, DispatchContext};
use crate::error::AgentError;
use crate::fabric::TerminalErrorGuard;
use crate::instance::{AgentInstance, AgentState};
use crate::message::{aggregate_stream_deltas, ChatMessageStreamDelta, ContentPart, Message};
use crate::providers::common::{GenerateOptions, Model};
use crate::pruner::{self, PruneBudget};
use crate::stream::{self, StreamEvent, TagStreamParser};
use crate::tool::ToolBox;
use crate::usage::Usage;

/// Result of driving one instance through a single step.
#[derive(Debug)]
pub enum StepOutcome {
    /// The step produced tool calls that made progress; call again.
    ContinueNextStep,
    /// The turn ended cleanly (`end_turn`, no tool calls, or the
    /// non-progress termination rule fired).
    EndedTurn,
    /// An unrecoverable error stopped the instance.
    FailedWithError(AgentError),
    /// Cancellation stopped the instance before or during the step.
    Cancelled,
}

/// Everything `run_step` needs beyond the instance itself.
pub struct StepDeps<'a> {
    /// Model this instance's template runs against.
    pub model: &'a dyn Model,
    /// Registry of tools available for dispatch.
    pub toolbox: &'a ToolBox,
    /// Transport used to fulfil client-invokable calls.
    pub client: &'a dyn ClientToolTransport,
    /// Root directory file/terminal tools are confined to.
    pub project_root: &'a Path,
    /// Observers of step-loop lifecycle events.
    pub callbacks: &'a CallbackRegistry,
    /// Context window size, in tokens, the pruner trims toward.
    pub max_context_length: usize,
    /// Guards this run's single terminal `prompt-error` emission. Shared by
    /// every step of the same top-level run (not reset per step).
    pub terminal_error: &'a TerminalErrorGuard,
}

/// Drive `instance` through exactly one step.
pub async fn run_step(instance: &mut AgentInstance, deps: &StepDeps<'_>) -> StepOutcome {
    if instance.cancellation.is_cancelled() {
        instance.transition(AgentState::Cancelled);
        return StepOutcome::Cancelled;
    }

    if let Err(error) = instance.step_budget.consume_one() {
        instance.transition(AgentState::Failed);
        fire_terminal_error(deps.terminal_error, &error, &instance.id);
        return StepOutcome::FailedWithError(error);
    }
    instance.step += 1;

    deps.callbacks.dispatch(
        &StepEvent::StepStarted { instance_id: instance.id.clone(), step: instance.step },
        &callback_context(instance),
    );

    instance.transition(AgentState::Streaming);
    instance.push_message(prompt::build_instructions_message(&instance.template));

    let system_tokens = instance.template.system_prompt.len() / 3 + 1;
    let budget = PruneBudget {
        max_context_length: deps.max_context_length,
        system_prompt_tokens: system_tokens,
        tool_def_tokens: instance.template.allowed_tools.len() * 50,
    };
    instance.history = pruner::prune(std::mem::take(&mut instance.history), budget);

    let system_message = prompt::build_system_chat_message(&instance.template, deps.toolbox);
    let chat_messages = prompt::to_chat_messages(system_message, &instance.history);

    let tool_definitions = instance
        .template
        .allowed_tools
        .iter()
        .filter_map(|name| deps.toolbox.get(name).map(|t| t.definition()))
        .collect::<Vec<_>>();
    let options = GenerateOptions::new().with_tools(tool_definitions);

    let outcome = match deps.model.generate_stream(chat_messages, options).await {
        Ok(stream) => run_with_stream(instance, deps, stream).await,
        Err(error) => Err(error),
    };

    match outcome {
        Ok(result) => {
            instance.usage.input_tokens += result.usage.input_tokens;
            instance.usage.output_tokens += result.usage.output_tokens;
            instance.usage.total_tokens += result.usage.total_tokens;
            deps.callbacks.dispatch(
                &StepEvent::StepEnded { instance_id: instance.id.clone(), step: instance.step, usage: result.usage },
                &callback_context(instance),
            );
            if result.ended {
                instance.transition(AgentState::Ended);
                deps.callbacks.dispatch(
                    &StepEvent::RunEnded {
                        instance_id: instance.id.clone(),
                        message: instance.history.last().cloned(),
                    },
                    &callback_context(instance),
                );
                StepOutcome::EndedTurn
            } else {
                instance.transition(AgentState::Idle);
                StepOutcome::ContinueNextStep
            }
        }
        Err(error) => {
            instance.transition(AgentState::Failed);
            fire_terminal_error(deps.terminal_error, &error, &instance.id);
            StepOutcome::FailedWithError(error)
        }
    }
}

/// Emit the one and only `prompt-error`-worthy log line for this run. A run's
/// `TerminalErrorGuard` is shared across every step of the same top-level
/// instance, so only the first terminal error is ever logged here; later
/// ones (e.g. a child instance failing after the parent already failed) are
/// silently dropped rather than double-reported.
fn fire_terminal_error(guard: &TerminalErrorGuard, error: &AgentError, instance_id: &str) {
    if guard.fire_once() {
        tracing::error!(instance_id, error = %error, "terminal agent error");
    }
}

struct StepResult {
    usage: Usage,
    ended: bool,
}

async fn run_with_stream(
    instance: &mut AgentInstance,
    deps: &StepDeps<'_>,
    mut model_stream: crate::providers::common::ModelStream,
) -> Result<StepResult, AgentError> {
    let mut deltas = Vec::new();
    let mut usage = Usage::zero();

    while let Some(delta) = model_stream.next().await {
        let delta: ChatMessageStreamDelta = delta?;
        if let Some(tokens) = &delta.token_usage {
            usage.input_tokens += tokens.input_tokens;
            usage.output_tokens += tokens.output_tokens;
            usage.total_tokens += tokens.input_tokens + tokens.output_tokens;
        }
        deltas.push(delta);
    }

    let aggregated = aggregate_stream_deltas(&deltas);
    let declared_tools: HashSet<String> = instance.template.allowed_tools.iter().cloned().collect();

    let (text, tool_calls) = if deps.model.supports_tool_calling() && aggregated.has_tool_calls() {
        let text = aggregated.text_content().unwrap_or_default();
        let calls =
            stream::parse_native_tool_calls(aggregated.tool_calls.as_deref().unwrap_or_default(), &declared_tools);
        (text, calls)
    } else {
        let mut parser = TagStreamParser::new(declared_tools);
        let mut text = String::new();
        let mut calls = Vec::new();
        for delta in &deltas {
            if let Some(chunk) = &delta.content {
                for event in parser.push_token(chunk) {
                    collect_event(event, &mut text, &mut calls);
                }
            }
        }
        for event in parser.flush() {
            collect_event(event, &mut text, &mut calls);
        }
        (text, calls)
    };

    let mut assistant_content = Vec::new();
    if !text.is_empty() {
        assistant_content.push(ContentPart::text(text));
    }
    for call in &tool_calls {
        assistant_content.push(ContentPart::tool_call(call.id.clone(), call.name.clone(), call.input.clone()));
    }
    if !assistant_content.is_empty() {
        instance.push_message(Message {
            role: crate::message::Role::Assistant,
            content: assistant_content,
            tags: None,
            tool_call_id: None,
            tool_name: None,
            followups: None,
        });
    }

    if tool_calls.is_empty() {
        return Ok(StepResult { usage, ended: true });
    }

    instance.transition(AgentState::ToolDispatch);

    let mut called_names = Vec::with_capacity(tool_calls.len());
    let mut explicit_end = false;
    for call in &tool_calls {
        called_names.push(call.name.clone());
        if call.ends_agent_step || call.name == "end_turn" {
            explicit_end = true;
        }

        deps.callbacks.dispatch(
            &StepEvent::ToolCallStarted {
                instance_id: instance.id.clone(),
                tool_name: call.name.clone(),
                call_id: call.id.clone(),
            },
            &callback_context(instance),
        );

        let dispatch_ctx = DispatchContext {
            toolbox: deps.toolbox,
            cancellation: &instance.cancellation,
            project_root: deps.project_root,
            client: deps.client,
        };
        let result_message = dispatcher::dispatch(call, &dispatch_ctx).await;
        let succeeded = !result_message
            .content
            .iter()
            .any(|part| matches!(part, ContentPart::Json(v) if v.get("error").is_some()));

        deps.callbacks.dispatch(
            &StepEvent::ToolCallCompleted {
                instance_id: instance.id.clone(),
                tool_name: call.name.clone(),
                call_id: call.id.clone(),
                succeeded,
            },
            &callback_context(instance),
        );

        instance.push_message(result_message);
    }

    let ended = explicit_end || prompt::step_made_no_progress(&called_names);
    Ok(StepResult { usage, ended })
}

fn collect_event(event: StreamEvent, text: &mut String, calls: &mut Vec<stream::ParsedToolCall>) {
    match event {
        StreamEvent::TextChunk(chunk) => text.push_str(&chunk),
        StreamEvent::ToolCall(call) => calls.push(call),
    }
}

fn callback_context(instance: &AgentInstance) -> CallbackContext {
    CallbackContext::new()
        .with_agent_name(instance.template.display_name.clone())
        .with_step(instance.step)
        .with_usage(instance.usage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_id::AgentId;
    use crate::dispatcher::NoClientTransport;
    use crate::providers::common::{ModelResponse, ModelStream, TokenUsage};
    use crate::template::AgentTemplate;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Arc;

    struct StubModel {
        replies: std::sync::Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl Model for StubModel {
        fn model_id(&self) -> &str {
            "stub"
        }

        async fn generate(
            &self,
            _messages: Vec<crate::message::ChatMessage>,
            _options: GenerateOptions,
        ) -> Result<ModelResponse, AgentError> {
            let mut replies = self.replies.lock().unwrap();
            let text = if replies.is_empty() { "" } else { replies.remove(0) };
            Ok(ModelResponse::new(crate::message::ChatMessage::assistant(text)).with_token_usage(TokenUsage::new(10, 5)))
        }

        fn supports_tool_calling(&self) -> bool {
            false
        }
    }

    fn template() -> Arc<AgentTemplate> {
        Arc::new(AgentTemplate {
            id: "alpha".to_string(),
            agent_id: AgentId::parse_lenient("alpha"),
            display_name: "Alpha".to_string(),
            model_id: "stub".to_string(),
            system_prompt: "You are Alpha.".to_string(),
            instructions_prompt: "Stay focused.".to_string(),
            allowed_tools: Default::default(),
            spawnable_agents: Vec::new(),
            output_schema: None,
            reasoning: None,
            inherit_parent_system_prompt: false,
            include_message_history: false,
            trusted: false,
        })
    }

    #[tokio::test]
    async fn step_with_no_tool_calls_ends_the_turn() {
        let model = StubModel { replies: std::sync::Mutex::new(vec!["all done"]) };
        let toolbox = ToolBox::new();
        let client = NoClientTransport;
        let callbacks = CallbackRegistry::new();
        let root = PathBuf::from("/project");
        let deps = StepDeps {
            model: &model,
            toolbox: &toolbox,
            client: &client,
            project_root: &root,
            callbacks: &callbacks,
            max_context_length: 100_000,
            terminal_error: &TerminalErrorGuard::new(),
        };
        let mut instance = AgentInstance::new("inst-1", template(), 20);

        let outcome = run_step(&mut instance, &deps).await;
        assert!(matches!(outcome, StepOutcome::EndedTurn));
        assert_eq!(instance.state, AgentState::Ended);
    }

    #[tokio::test]
    async fn exhausted_step_budget_fails_the_step() {
        let model = StubModel { replies: std::sync::Mutex::new(vec!["x"]) };
        let toolbox = ToolBox::new();
        let client = NoClientTransport;
        let callbacks = CallbackRegistry::new();
        let root = PathBuf::from("/project");
        let deps = StepDeps {
            model: &model,
            toolbox: &toolbox,
            client: &client,
            project_root: &root,
            callbacks: &callbacks,
            max_context_length: 100_000,
            terminal_error: &TerminalErrorGuard::new(),
        };
        let mut instance = AgentInstance::new("inst-1", template(), 0);

        let outcome = run_step(&mut instance, &deps).await;
        assert!(matches!(outcome, StepOutcome::FailedWithError(_)));
    }

    #[tokio::test]
    async fn cancelled_instance_short_circuits() {
        let model = StubModel { replies: std::sync::Mutex::new(vec!["x"]) };
        let toolbox = ToolBox::new();
        let client = NoClientTransport;
        let callbacks = CallbackRegistry::new();
        let root = PathBuf::from("/project");
        let deps = StepDeps {
            model: &model,
            toolbox: &toolbox,
            client: &client,
            project_root: &root,
            callbacks: &callbacks,
            max_context_length: 100_000,
            terminal_error: &TerminalErrorGuard::new(),
        };
        let mut instance = AgentInstance::new("inst-1", template(), 20);
        instance.cancellation.cancel();

        let outcome = run_step(&mut instance, &deps).await;
        assert!(matches!(outcome, StepOutcome::Cancelled));
    }
}
