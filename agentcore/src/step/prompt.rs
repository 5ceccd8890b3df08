//! Prompt construction: turns a template and an instance's history into the
//! provider-wire messages sent to [`crate::providers::Model`].

use crate::config;
use crate::message::{ChatMessage, ChatMessageToolCall, ContentPart, Message, MessageContent, Role, Tag};
use crate::template::AgentTemplate;
use crate::tool::ToolBox;

/// Render the instructions block re-derived fresh every step, tagged so the
/// pruner's Pass 0.5 can dedupe repeats and [`crate::instance::AgentInstance::history_for_child`]
/// can strip it from a spawned child's inherited history.
#[must_use]
pub fn build_instructions_message(template: &AgentTemplate) -> Message {
    Message::user(template.instructions_prompt.clone()).with_tag(Tag::InstructionsPrompt)
}

/// Render the spawnable-subagent block listed in the prompt, one line per
/// declared identifier.
#[must_use]
pub fn build_spawnable_agents_block(template: &AgentTemplate) -> String {
    if template.spawnable_agents.is_empty() {
        return String::new();
    }
    let mut block = String::from("You may spawn the following agent types:\n");
    for agent_id in &template.spawnable_agents {
        block.push_str("- ");
        block.push_str(&agent_id.to_canonical_string());
        block.push('\n');
    }
    block
}

/// Render per-tool documentation for custom tools, including any example
/// inputs declared on their dispatcher registration.
#[must_use]
pub fn build_custom_tool_docs(template: &AgentTemplate, toolbox: &ToolBox) -> String {
    let mut block = String::new();
    for tool_name in &template.allowed_tools {
        if toolbox.category_of(tool_name) != crate::tool::ToolCategory::Custom {
            continue;
        }
        let registration = toolbox.registration_of(tool_name);
        block.push_str("### ");
        block.push_str(tool_name);
        block.push('\n');
        for example in &registration.example_inputs {
            block.push_str("example input: ");
            block.push_str(&example.to_string());
            block.push('\n');
        }
    }
    block
}

/// Translate an instance's full system prompt (template prompt + spawnable
/// block + custom tool docs) into the leading `ChatMessage::system`.
#[must_use]
pub fn build_system_chat_message(template: &AgentTemplate, toolbox: &ToolBox) -> ChatMessage {
    let mut text = template.system_prompt.clone();
    let spawnable = build_spawnable_agents_block(template);
    if !spawnable.is_empty() {
        text.push_str("\n\n");
        text.push_str(&spawnable);
    }
    let custom_docs = build_custom_tool_docs(template, toolbox);
    if !custom_docs.is_empty() {
        text.push_str("\n\n");
        text.push_str(&custom_docs);
    }
    ChatMessage::system(text)
}

/// Translate the instance history into the `ChatMessage` sequence a
/// [`crate::providers::Model`] expects, given a pre-built system message.
#[must_use]
pub fn to_chat_messages(system_message: ChatMessage, history: &[Message]) -> Vec<ChatMessage> {
    let mut out = vec![system_message];
    for message in history {
        match message.role {
            Role::User => out.push(ChatMessage::user(text_of(message))),
            Role::Assistant => out.push(assistant_chat_message(message)),
            Role::Tool => out.push(ChatMessage::tool_response(
                message.tool_call_id.clone().unwrap_or_default(),
                json_parts_as_text(message),
            )),
        }
    }
    out
}

fn text_of(message: &Message) -> String {
    message
        .content
        .iter()
        .filter_map(ContentPart::as_text)
        .collect::<Vec<_>>()
        .join("\n")
}

fn json_parts_as_text(message: &Message) -> String {
    message
        .content
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => text.clone(),
            ContentPart::Json(value) => value.to_string(),
            ContentPart::Image { reference, .. } => reference.clone(),
            ContentPart::Media { media_type, .. } => format!("[{media_type} content omitted]"),
            ContentPart::ToolCall { name, .. } => format!("[unexpected tool call: {name}]"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn assistant_chat_message(message: &Message) -> ChatMessage {
    let text = text_of(message);
    let tool_calls: Vec<ChatMessageToolCall> = message
        .content
        .iter()
        .filter_map(|part| match part {
            ContentPart::ToolCall { id, name, input } => {
                Some(ChatMessageToolCall::new(id.clone(), name.clone(), input.clone()))
            }
            _ => None,
        })
        .collect();

    if tool_calls.is_empty() {
        return ChatMessage::assistant(text);
    }
    if text.is_empty() {
        return ChatMessage::assistant_with_tool_calls(tool_calls);
    }
    ChatMessage {
        role: crate::message::MessageRole::Assistant,
        content: Some(vec![MessageContent::text(text)]),
        tool_calls: Some(tool_calls),
        tool_call_id: None,
    }
}

/// Whether the non-progress termination rule (§4.1) fires for a completed
/// step: every tool call made this step named a tool in
/// [`config::NON_PROGRESS_TOOLS`], and at least one call was made.
#[must_use]
pub fn step_made_no_progress(called_tool_names: &[String]) -> bool {
    !called_tool_names.is_empty()
        && called_tool_names.iter().all(|name| config::NON_PROGRESS_TOOLS.contains(name.as_str()))
}
