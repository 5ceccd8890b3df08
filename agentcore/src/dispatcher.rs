//! Tool Dispatcher: executes a validated tool call and returns a structured
//! result, routing by [`crate::tool::ToolCategory`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolError;
use crate::fabric::CancellationToken;
use crate::message::{ContentPart, Message};
use crate::stream::ParsedToolCall;
use crate::tool::{ToolBox, ToolCategory};

/// Handles client-invokable tool calls by round-tripping them over the
/// external client transport (§6): send the sanitized input, await a
/// matching `tool-result`.
#[async_trait]
pub trait ClientToolTransport: Send + Sync {
    /// Forward a sanitized call to the connected client and await its result.
    async fn call(&self, call_id: &str, tool_name: &str, sanitized_input: Value) -> Result<Value, ToolError>;
}

/// A transport that always times out — useful where no client is attached
/// (e.g. a headless subagent run with no client-invokable tools declared).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClientTransport;

#[async_trait]
impl ClientToolTransport for NoClientTransport {
    async fn call(&self, _call_id: &str, _tool_name: &str, _sanitized_input: Value) -> Result<Value, ToolError> {
        Err(ToolError::Timeout)
    }
}

/// Everything the dispatcher needs beyond the call itself.
pub struct DispatchContext<'a> {
    /// Registry of built-in and custom tools.
    pub toolbox: &'a ToolBox,
    /// Cooperative cancellation signal, checked before and after dispatch.
    pub cancellation: &'a CancellationToken,
    /// Root directory tool file/terminal access is confined to.
    pub project_root: &'a Path,
    /// Transport used to fulfil client-invokable calls.
    pub client: &'a dyn ClientToolTransport,
}

/// Execute one parsed tool call and produce the tool-role message that
/// answers it. Never returns `Err` for a recoverable tool failure — those
/// become an error-shaped result message so the model can react.
pub async fn dispatch(call: &ParsedToolCall, ctx: &DispatchContext<'_>) -> Message {
    if ctx.cancellation.is_cancelled() {
        return error_result(call, ToolError::Timeout);
    }

    if !call.known {
        return error_result(call, ToolError::UnknownTool(call.name.clone()));
    }

    let registration = ctx.toolbox.registration_of(&call.name);

    if registration.confine_to_cwd
        && let Some(path) = extract_path(&call.input)
        && !path_confined_to_root(&path, ctx.project_root)
    {
        return error_result(call, ToolError::CwdOutsideProject { path: path.display().to_string() });
    }

    if registration.category == ToolCategory::Custom
        && let Some(schema) = ctx.toolbox.get(&call.name).map(|tool| tool.definition().parameters)
        && !crate::stream::validates_against_schema(&schema, &call.input)
    {
        return error_result(
            call,
            ToolError::InvalidArguments(format!("input for '{}' does not match its declared schema", call.name)),
        );
    }

    let result = match registration.category {
        ToolCategory::BuiltIn | ToolCategory::Custom => {
            run_with_hard_stop(
                ctx.cancellation,
                run_with_optional_timeout(registration.timeout_seconds, ctx.toolbox.call(&call.name, call.input.clone())),
            )
            .await
        }
        ToolCategory::ClientInvokable => {
            run_with_hard_stop(
                ctx.cancellation,
                run_with_optional_timeout(
                    registration.timeout_seconds,
                    ctx.client.call(&call.id, &call.name, call.input.clone()),
                ),
            )
            .await
        }
    };

    match result {
        Ok(value) => success_result(call, cap_output(value, registration.max_output_bytes)),
        Err(error) => error_result(call, error),
    }
}

async fn run_with_optional_timeout<F>(timeout_seconds: Option<u64>, future: F) -> Result<Value, ToolError>
where
    F: std::future::Future<Output = Result<Value, ToolError>>,
{
    match timeout_seconds {
        Some(seconds) => tokio::time::timeout(Duration::from_secs(seconds), future)
            .await
            .unwrap_or(Err(ToolError::Timeout)),
        None => future.await,
    }
}

/// Race a tool call against a second cancellation activation: a call already
/// in flight when cancellation first fires is left to finish (or hit its own
/// timeout), but a second activation means the caller wants it aborted now.
async fn run_with_hard_stop<F>(token: &CancellationToken, future: F) -> Result<Value, ToolError>
where
    F: std::future::Future<Output = Result<Value, ToolError>>,
{
    tokio::select! {
        result = future => result,
        () = wait_for_hard_stop(token) => Err(ToolError::Timeout),
    }
}

async fn wait_for_hard_stop(token: &CancellationToken) {
    while !token.should_hard_stop() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Cap an oversized result, annotating it with a truncation note rather than
/// silently dropping data (§4.3: "an output with the raw data and a
/// truncation note").
fn cap_output(value: Value, max_output_bytes: Option<usize>) -> Value {
    let Some(max_bytes) = max_output_bytes else {
        return value;
    };
    let serialized = serde_json::to_string(&value).unwrap_or_default();
    if serialized.len() <= max_bytes {
        return value;
    }
    serde_json::json!({
        "data": value,
        "truncated": true,
        "maxOutputBytes": max_bytes,
    })
}

fn extract_path(input: &Value) -> Option<PathBuf> {
    input
        .get("path")
        .or_else(|| input.get("cwd"))
        .and_then(Value::as_str)
        .map(PathBuf::from)
}

fn path_confined_to_root(path: &Path, root: &Path) -> bool {
    let joined = if path.is_absolute() { path.to_path_buf() } else { root.join(path) };
    normalize(&joined).starts_with(normalize(root))
}

/// Lexical normalization (no filesystem access): resolves `.`/`..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn success_result(call: &ParsedToolCall, value: Value) -> Message {
    Message::tool_result(call.id.clone(), call.name.clone(), vec![ContentPart::Json(value)])
}

fn error_result(call: &ParsedToolCall, error: ToolError) -> Message {
    let value = serde_json::json!({ "error": error.to_string() });
    Message::tool_result(call.id.clone(), call.name.clone(), vec![ContentPart::Json(value)])
}
