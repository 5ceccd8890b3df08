//! Session state (§3): the top-level container a run is driven through —
//! the root [`AgentInstance`](crate::instance::AgentInstance) plus
//! process-wide metadata that doesn't belong to any single instance.

use std::collections::HashSet;
use std::sync::LazyLock;

use crate::fabric::{CancellationToken, CreditLedger, TerminalErrorGuard};

/// File basenames recognized as project knowledge files when a session
/// doesn't supply `knowledgeFiles` explicitly, matched case-insensitively
/// against the final path segment.
static KNOWLEDGE_FILE_BASENAMES: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| HashSet::from(["knowledge.md", "claude.md"]));

/// Process-wide metadata for one run: identity, filesystem confinement, and
/// the knowledge-file set the step loop's prompt assembly draws on.
///
/// Does not own the root [`AgentInstance`](crate::instance::AgentInstance);
/// callers hold that separately and pass a `SessionState` alongside it.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Opaque identity string for the API key a client authenticated with.
    pub api_key_identity: String,
    /// Filesystem root every tool's cwd confinement is checked against.
    pub project_root: std::path::PathBuf,
    /// Project-relative paths recognized as knowledge files for this run.
    pub knowledge_files: Vec<String>,
    /// Session-wide cooperative cancellation signal, shared by every
    /// instance in the run's tree.
    pub cancellation: CancellationToken,
    /// Session-level credit counter, shared by every instance.
    pub credits: CreditLedger,
    /// Guards against emitting more than one terminal `prompt-error`.
    pub terminal_error: TerminalErrorGuard,
}

impl SessionState {
    /// Start a new session. `knowledge_files` is resolved from an explicit
    /// list when `Some`, or auto-discovered from `project_files` otherwise
    /// (never both — an explicit list is never overwritten by discovery).
    #[must_use]
    pub fn new(
        api_key_identity: impl Into<String>,
        project_root: impl Into<std::path::PathBuf>,
        initial_credits: i64,
        knowledge_files: Option<Vec<String>>,
        project_files: &[String],
    ) -> Self {
        let knowledge_files =
            knowledge_files.unwrap_or_else(|| discover_knowledge_files(project_files));
        Self {
            api_key_identity: api_key_identity.into(),
            project_root: project_root.into(),
            knowledge_files,
            cancellation: CancellationToken::new(),
            credits: CreditLedger::new(initial_credits),
            terminal_error: TerminalErrorGuard::new(),
        }
    }
}

/// Scan `project_files` for paths whose basename matches a known knowledge
/// file name, case-insensitively. Order of the input is preserved.
#[must_use]
pub fn discover_knowledge_files(project_files: &[String]) -> Vec<String> {
    project_files
        .iter()
        .filter(|path| {
            let basename = path.rsplit('/').next().unwrap_or(path.as_str());
            KNOWLEDGE_FILE_BASENAMES.contains(basename.to_lowercase().as_str())
        })
        .cloned()
        .collect()
}
