//! Tunable constants shared across the step loop, pruner, and scheduler.
//!
//! These values are empirical (see the design notes on Pass 2/Pass 3 in the
//! pruner) and are plausible candidates for future tuning, but their
//! concrete values must be preserved for behavioral parity.

use std::collections::HashSet;
use std::sync::LazyLock;

/// Default number of steps a fresh top-level agent instance is given when
/// the caller does not supply an explicit budget.
pub const DEFAULT_MAX_AGENT_STEPS: usize = 20;

/// Size of the "recent messages" window below which old tool-call/result
/// pairs are exempt from Pass 2 removal.
pub const PRUNER_RECENT_WINDOW: usize = 30;

/// Fraction of the effective message budget that Pass 3 trims toward.
pub const PRUNER_TARGET_FRACTION: f64 = 0.25;

/// Tool-result serialized length, in characters, above which Pass 1 replaces
/// the content with a truncation marker.
pub const PRUNER_LARGE_RESULT_CHARS: usize = 1000;

/// Maximum number of replacement placeholder messages a pruned history may
/// contain, and the minimum required gap between any two of them.
pub const PRUNER_MAX_PLACEHOLDERS: usize = 2;

/// Tool names whose sole presence in a step's tool calls (and results)
/// implies the turn should end: "reflective" tools that make no progress.
pub static NON_PROGRESS_TOOLS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| HashSet::from(["think_deeply"]));

/// Tool names exempt from Pass 2's old-pair removal regardless of age.
pub static IMPORTANT_TOOLS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "read_files",
        "write_todos",
        "write_file",
        "str_replace",
        "propose_write_file",
        "propose_str_replace",
    ])
});

/// Text of the placeholder message the pruner prepends when it removes
/// messages in Pass 3 or Pass 4.
pub const PRUNER_PLACEHOLDER_TEXT: &str = "<system>Previous message(s) omitted due to length</system>";
