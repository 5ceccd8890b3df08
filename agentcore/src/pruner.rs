//! Context Pruner: keeps an agent instance's message history within its
//! model's context window between steps.
//!
//! The pruner runs a fixed sequence of passes (§4.5) that together guarantee
//! the pair invariant (every tool-call part has exactly one matching
//! tool-role message) is preserved no matter how much history gets dropped.

use std::collections::HashSet;

use crate::config::{
    IMPORTANT_TOOLS, PRUNER_LARGE_RESULT_CHARS, PRUNER_RECENT_WINDOW, PRUNER_TARGET_FRACTION,
    PRUNER_PLACEHOLDER_TEXT,
};
use crate::message::{ContentPart, Message, Role, Tag};

/// Parameters the pruner needs beyond the message history itself.
#[derive(Debug, Clone, Copy)]
pub struct PruneBudget {
    /// The model's total context window, in the core's token approximation.
    pub max_context_length: usize,
    /// Tokens consumed by the resolved system prompt.
    pub system_prompt_tokens: usize,
    /// Tokens consumed by the serialized tool-definition list.
    pub tool_def_tokens: usize,
}

impl PruneBudget {
    /// `maxContextLength − systemPromptTokens − toolDefTokens`, floored at 0.
    #[must_use]
    pub const fn effective_budget(&self) -> usize {
        self.max_context_length.saturating_sub(self.system_prompt_tokens + self.tool_def_tokens)
    }
}

/// Run the full pruning pipeline over `messages`, returning the rewritten
/// history. Never adds information; only removes or replaces content.
#[must_use]
pub fn prune(messages: Vec<Message>, budget: PruneBudget) -> Vec<Message> {
    let effective_budget = budget.effective_budget();

    let mut messages = pass0_structural_cleanup(messages);

    if total_tokens(&messages) < effective_budget {
        return messages;
    }

    messages = pass0_5_dedupe_instructions(messages);
    messages = pass1_truncate_large_results(messages);
    messages = pass2_drop_old_non_important_pairs(messages);

    let target = (effective_budget as f64 * PRUNER_TARGET_FRACTION) as usize;
    let (messages_after_pass3, _placed_placeholder) = pass3_trim_toward_target(messages, target);
    messages = messages_after_pass3;

    if total_tokens(&messages) > target {
        messages = pass4_head_trim(messages, target);
    }

    final_validation(messages)
}

fn total_tokens(messages: &[Message]) -> usize {
    messages.iter().map(Message::token_count).sum()
}

/// Pass 0: drop the most recent `INSTRUCTIONS_PROMPT` and `SUBAGENT_SPAWN`
/// tagged messages (they are re-derived fresh by the step loop).
fn pass0_structural_cleanup(mut messages: Vec<Message>) -> Vec<Message> {
    remove_last_tagged(&mut messages, Tag::InstructionsPrompt);
    remove_last_tagged(&mut messages, Tag::SubagentSpawn);
    messages
}

fn remove_last_tagged(messages: &mut Vec<Message>, tag: Tag) {
    if let Some(index) = messages.iter().rposition(|m| m.has_tag(tag)) {
        messages.remove(index);
    }
}

/// Pass 0.5: keep only the most recent remaining `INSTRUCTIONS_PROMPT`.
fn pass0_5_dedupe_instructions(messages: Vec<Message>) -> Vec<Message> {
    let Some(last_index) = messages.iter().rposition(|m| m.has_tag(Tag::InstructionsPrompt)) else {
        return messages;
    };
    messages
        .into_iter()
        .enumerate()
        .filter(|(index, message)| *index == last_index || !message.has_tag(Tag::InstructionsPrompt))
        .map(|(_, message)| message)
        .collect()
}

const LARGE_RESULT_OMITTED: &str = "[LARGE_TOOL_RESULT_OMITTED]";

/// Pass 1: collapse oversized tool-role message content to a marker object.
fn pass1_truncate_large_results(mut messages: Vec<Message>) -> Vec<Message> {
    for message in &mut messages {
        if message.role != Role::Tool {
            continue;
        }
        let serialized_len = serde_json::to_string(&message.content).map(|s| s.len()).unwrap_or(0);
        if serialized_len > PRUNER_LARGE_RESULT_CHARS {
            message.content = vec![ContentPart::Json(serde_json::json!({
                "message": LARGE_RESULT_OMITTED,
                "originalSize": serialized_len,
            }))];
        }
    }
    messages
}

/// Pass 2: drop tool-call/tool-result pairs entirely outside the recent
/// window whose tool name is not in the protected "important" set.
fn pass2_drop_old_non_important_pairs(messages: Vec<Message>) -> Vec<Message> {
    let len = messages.len();
    let window_start = len.saturating_sub(PRUNER_RECENT_WINDOW);

    let pairs = find_pairs(&messages);
    let mut to_remove: HashSet<usize> = HashSet::new();
    for pair in &pairs {
        let both_outside_window = pair.call_index < window_start && pair.result_index < window_start;
        if both_outside_window && !IMPORTANT_TOOLS.contains(pair.tool_name.as_str()) {
            to_remove.insert(pair.call_index);
            to_remove.insert(pair.result_index);
        }
    }

    remove_indices_dropping_empty_assistants(messages, &to_remove)
}

/// Pass 3: trim oldest-first toward `target`, skipping user messages and any
/// message that is part of a tool-call/tool-result pair. Prepends a
/// placeholder if anything was removed. Returns whether a placeholder was
/// inserted so Pass 4 can respect the at-most-two-placeholders rule.
fn pass3_trim_toward_target(messages: Vec<Message>, target: usize) -> (Vec<Message>, bool) {
    let current = total_tokens(&messages);
    if current <= target {
        return (messages, false);
    }

    let pairs = find_pairs(&messages);
    let paired_indices: HashSet<usize> =
        pairs.iter().flat_map(|p| [p.call_index, p.result_index]).collect();

    let mut removed_tokens = 0usize;
    let needed = current.saturating_sub(target);
    let mut to_remove: HashSet<usize> = HashSet::new();

    for (index, message) in messages.iter().enumerate() {
        if removed_tokens >= needed {
            break;
        }
        if message.role == Role::User || paired_indices.contains(&index) {
            continue;
        }
        to_remove.insert(index);
        removed_tokens += message.token_count();
    }

    if to_remove.is_empty() {
        return (messages, false);
    }

    let mut result = remove_indices_dropping_empty_assistants(messages, &to_remove);
    prepend_placeholder(&mut result);
    (result, true)
}

/// Pass 4: last-resort trim from the front, one message at a time, until
/// under `target`. Runs only if Pass 3 left the total above target. Removing
/// from the front can delete a placeholder Pass 3 already prepended, so this
/// checks the front of the result directly rather than trusting that a
/// placeholder placed earlier is still there.
fn pass4_head_trim(mut messages: Vec<Message>, target: usize) -> Vec<Message> {
    let mut removed_any = false;
    while total_tokens(&messages) > target && !messages.is_empty() {
        messages.remove(0);
        removed_any = true;
    }
    if removed_any && !starts_with_placeholder(&messages) {
        prepend_placeholder(&mut messages);
    }
    messages
}

fn starts_with_placeholder(messages: &[Message]) -> bool {
    messages
        .first()
        .is_some_and(|message| message.content.iter().any(|part| part.as_text() == Some(PRUNER_PLACEHOLDER_TEXT)))
}

fn prepend_placeholder(messages: &mut Vec<Message>) {
    messages.insert(0, Message::user(PRUNER_PLACEHOLDER_TEXT));
}

struct Pair {
    call_index: usize,
    result_index: usize,
    tool_name: String,
}

/// Find every tool-call part and its matching tool-role message by id.
/// Unmatched calls/results are simply omitted from the returned pairs.
fn find_pairs(messages: &[Message]) -> Vec<Pair> {
    let mut pairs = Vec::new();
    for (call_index, message) in messages.iter().enumerate() {
        for part in &message.content {
            let ContentPart::ToolCall { id, name, .. } = part else {
                continue;
            };
            if let Some(result_index) = messages
                .iter()
                .position(|m| m.role == Role::Tool && m.tool_call_id.as_deref() == Some(id.as_str()))
            {
                pairs.push(Pair {
                    call_index,
                    result_index,
                    tool_name: name.clone(),
                });
            }
        }
    }
    pairs
}

/// Remove the messages at `indices`, then drop any assistant message that is
/// left with empty content because all of its tool-call parts were removed
/// along with their pairs. `indices` names whole messages to drop outright;
/// callers that only mean to clear tool-call parts inside a kept assistant
/// message should not include that message's index here.
fn remove_indices_dropping_empty_assistants(messages: Vec<Message>, indices: &HashSet<usize>) -> Vec<Message> {
    messages
        .into_iter()
        .enumerate()
        .filter(|(index, _)| !indices.contains(index))
        .map(|(_, message)| message)
        .filter(|message| message.role != Role::Assistant || !message.content.is_empty())
        .collect()
}

/// Final validation: drop orphaned tool-role messages and orphaned
/// tool-call parts so the pair invariant holds in the emitted history.
fn final_validation(messages: Vec<Message>) -> Vec<Message> {
    let result_ids: HashSet<&str> = messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    let call_ids: HashSet<&str> = messages
        .iter()
        .flat_map(|m| m.tool_call_ids())
        .collect();

    messages
        .into_iter()
        .filter_map(|mut message| {
            if message.role == Role::Tool {
                let id = message.tool_call_id.clone().unwrap_or_default();
                if !call_ids.contains(id.as_str()) {
                    return None;
                }
                return Some(message);
            }

            message.content.retain(|part| match part.tool_call_id() {
                Some(id) => result_ids.contains(id),
                None => true,
            });

            if message.role == Role::Assistant && message.content.is_empty() {
                return None;
            }
            Some(message)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(id: &str, tool: &str) -> (Message, Message) {
        let call = Message {
            role: Role::Assistant,
            content: vec![ContentPart::tool_call(id, tool, serde_json::json!({}))],
            tags: None,
            tool_call_id: None,
            tool_name: None,
            followups: None,
        };
        let result = Message::tool_result(id, tool, vec![ContentPart::text("ok")]);
        (call, result)
    }

    fn generous_budget() -> PruneBudget {
        PruneBudget {
            max_context_length: 200_000,
            system_prompt_tokens: 0,
            tool_def_tokens: 0,
        }
    }

    #[test]
    fn s1_early_exit_leaves_history_unchanged() {
        let messages: Vec<Message> = (0..80).map(|i| Message::user(format!("msg{i}"))).collect();
        let result = prune(messages, generous_budget());
        assert_eq!(result.len(), 80);
    }

    #[test]
    fn s2_large_tool_result_is_truncated_with_marker() {
        let mut messages = Vec::new();
        for _ in 0..4 {
            messages.push(Message::user("x".repeat(150_000)));
        }
        let (call, _) = pair("call1", "read_files");
        let large_content = "y".repeat(2000 - 2); // serialize as a JSON string adds 2 quote chars
        let result_msg = Message::tool_result("call1", "read_files", vec![ContentPart::text(large_content)]);
        messages.push(call);
        messages.push(result_msg);

        let tight_budget = PruneBudget {
            max_context_length: 1000,
            system_prompt_tokens: 0,
            tool_def_tokens: 0,
        };
        let result = prune(messages, tight_budget);

        let tool_msg = result.iter().find(|m| m.role == Role::Tool).expect("tool result survives");
        match &tool_msg.content[0] {
            ContentPart::Json(value) => {
                assert_eq!(value["message"], LARGE_RESULT_OMITTED);
            }
            other => panic!("expected a Json marker part, got {other:?}"),
        }
    }

    #[test]
    fn s3_pair_invariant_holds_after_dropping_old_pairs() {
        let mut messages = Vec::new();
        let (call, result) = pair("old1", "some_search_tool");
        messages.push(call);
        messages.push(result);
        for i in 0..40 {
            messages.push(Message::user(format!("filler{i}")));
        }

        let tight_budget = PruneBudget {
            max_context_length: 1,
            system_prompt_tokens: 0,
            tool_def_tokens: 0,
        };
        let result = prune(messages, tight_budget);

        let has_orphan_call = result.iter().any(|m| m.tool_call_ids().next().is_some());
        let has_orphan_result = result.iter().any(|m| m.role == Role::Tool);
        assert_eq!(has_orphan_call, has_orphan_result);
    }

    #[test]
    fn important_tool_pair_survives_pass2() {
        let mut messages = Vec::new();
        let (call, result) = pair("imp1", "write_file");
        messages.push(call);
        messages.push(result);
        for i in 0..40 {
            messages.push(Message::user(format!("filler{i}")));
        }

        let pruned = pass2_drop_old_non_important_pairs(messages);
        assert!(pruned.iter().any(|m| m.tool_call_ids().any(|id| id == "imp1")));
    }

    #[test]
    fn placeholder_is_never_duplicated_past_two() {
        let messages: Vec<Message> = (0..200).map(|i| Message::assistant("z".repeat(2000) + &i.to_string())).collect();
        let tight_budget = PruneBudget {
            max_context_length: 500,
            system_prompt_tokens: 0,
            tool_def_tokens: 0,
        };
        let result = prune(messages, tight_budget);

        let placeholder_count = result
            .iter()
            .filter(|m| m.content.iter().any(|p| p.as_text() == Some(PRUNER_PLACEHOLDER_TEXT)))
            .count();
        assert!(placeholder_count <= 2);

        let mut previous_was_placeholder = false;
        for message in &result {
            let is_placeholder = message.content.iter().any(|p| p.as_text() == Some(PRUNER_PLACEHOLDER_TEXT));
            assert!(!(is_placeholder && previous_was_placeholder), "two adjacent placeholders");
            previous_was_placeholder = is_placeholder;
        }
    }

    #[test]
    fn final_validation_drops_assistant_message_left_empty() {
        let (call, _result) = pair("orphan1", "tool_x");
        let messages = vec![call];
        let result = final_validation(messages);
        assert!(result.is_empty());
    }

    #[test]
    fn s5_head_trim_removing_a_tool_call_also_drops_its_tool_result() {
        // A tool-call/tool-result pair sits at the very front of history,
        // with enough padding after it that pass2/pass3 leave it alone but
        // pass4's head trim reaches in and removes the call message.
        let (call, result) = pair("head1", "some_search_tool");
        let mut messages = vec![call, result];
        for i in 0..5 {
            messages.push(Message::assistant("z".repeat(400) + &i.to_string()));
        }

        let tight_budget = PruneBudget {
            max_context_length: 300,
            system_prompt_tokens: 0,
            tool_def_tokens: 0,
        };
        let result = prune(messages, tight_budget);

        assert!(!result.iter().any(|m| m.tool_call_ids().any(|id| id == "head1")));
        assert!(!result.iter().any(|m| m.role == Role::Tool && m.tool_call_id.as_deref() == Some("head1")));
    }

    #[test]
    fn pass4_still_leaves_a_placeholder_when_it_removes_pass3s() {
        let messages: Vec<Message> = (0..10).map(|i| Message::assistant("z".repeat(50) + &i.to_string())).collect();
        let (after_pass3, placed) = pass3_trim_toward_target(messages, 20);
        assert!(placed);
        assert!(starts_with_placeholder(&after_pass3));

        // A target of 0 forces pass4 to trim everything, including the
        // placeholder pass3 just prepended.
        let after_pass4 = pass4_head_trim(after_pass3, 0);
        assert!(starts_with_placeholder(&after_pass4), "placeholder lost despite removed content");
    }
}
