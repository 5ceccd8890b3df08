//! Credit, Cancellation, and Error Fabric: the session-wide mechanisms every
//! component shares for budget checks, cooperative cancellation, and
//! terminal-error propagation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use crate::config::DEFAULT_MAX_AGENT_STEPS;
use crate::error::AgentError;

/// Cooperative cancellation signal shared by a run and all of its
/// descendants. Checked at tool-call boundaries and between steps.
///
/// A second activation within the signal's lifetime escalates
/// [`CancellationToken::should_hard_stop`] to `true`, so callers holding an
/// in-flight tool call know to abort it rather than let it run to
/// completion.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    activations: Arc<AtomicUsize>,
}

impl CancellationToken {
    /// Create a fresh, not-yet-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            activations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Signal cancellation. Safe to call more than once; the second and
    /// later calls escalate to a hard-stop request.
    pub fn cancel(&self) {
        self.activations.fetch_add(1, Ordering::SeqCst);
    }

    /// Whether cancellation has been signalled at least once.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.activations.load(Ordering::SeqCst) > 0
    }

    /// Whether cancellation has been signalled more than once — in-flight
    /// tool calls should be hard-stopped rather than awaited to completion.
    #[must_use]
    pub fn should_hard_stop(&self) -> bool {
        self.activations.load(Ordering::SeqCst) > 1
    }

    /// Return `Err(AgentError::Cancelled)` if cancellation has fired. Call
    /// this at every tool-call boundary and between steps.
    ///
    /// # Errors
    /// Returns [`AgentError::Cancelled`] if this token has been cancelled.
    pub fn check(&self) -> Result<(), AgentError> {
        if self.is_cancelled() { Err(AgentError::Cancelled) } else { Ok(()) }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// A session-level counter, decremented as tool/model usage is billed
/// through the external billing interface. Mutations use a
/// compare-and-update discipline so exhaustion is observed at most once.
#[derive(Debug)]
pub struct CreditLedger {
    remaining: AtomicI64,
}

impl CreditLedger {
    /// Start a ledger with `initial_credits` available.
    #[must_use]
    pub fn new(initial_credits: i64) -> Self {
        Self {
            remaining: AtomicI64::new(initial_credits),
        }
    }

    /// Remaining credits. May go negative transiently between a debit and
    /// the next `check`.
    #[must_use]
    pub fn remaining(&self) -> i64 {
        self.remaining.load(Ordering::SeqCst)
    }

    /// Debit `amount` credits for usage that has already happened.
    pub fn debit(&self, amount: i64) {
        self.remaining.fetch_sub(amount, Ordering::SeqCst);
    }

    /// Return `Err(AgentError::CreditsExhausted)` if the ledger has run dry.
    ///
    /// # Errors
    /// Returns [`AgentError::CreditsExhausted`] once `remaining() <= 0`.
    pub fn check(&self) -> Result<(), AgentError> {
        if self.remaining() <= 0 { Err(AgentError::CreditsExhausted) } else { Ok(()) }
    }
}

/// Per-instance step budget, inherited by children from an explicit spawn
/// parameter or [`DEFAULT_MAX_AGENT_STEPS`].
#[derive(Debug)]
pub struct StepBudget {
    remaining: AtomicUsize,
    max_steps: usize,
}

impl StepBudget {
    /// Create a budget with the given maximum step count.
    #[must_use]
    pub fn new(max_steps: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(max_steps),
            max_steps,
        }
    }

    /// The platform-default step budget, [`DEFAULT_MAX_AGENT_STEPS`].
    #[must_use]
    pub fn default_budget() -> Self {
        Self::new(DEFAULT_MAX_AGENT_STEPS)
    }

    /// Steps remaining before exhaustion.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::SeqCst)
    }

    /// Consume one step. Returns `Ok(())` if a step was available, or
    /// `Err(AgentError::StepBudgetExhausted)` if the budget had already hit
    /// zero.
    ///
    /// # Errors
    /// Returns [`AgentError::StepBudgetExhausted`] when no steps remain.
    pub fn consume_one(&self) -> Result<(), AgentError> {
        loop {
            let current = self.remaining.load(Ordering::SeqCst);
            if current == 0 {
                return Err(AgentError::step_budget_exhausted(self.max_steps, self.max_steps));
            }
            if self
                .remaining
                .compare_exchange(current, current - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Ok(());
            }
        }
    }

    /// Reset to the full budget, as happens at the start of each top-level run.
    pub fn reset(&self) {
        self.remaining.store(self.max_steps, Ordering::SeqCst);
    }
}

/// Tracks whether this run has already emitted its single terminal
/// `prompt-error` for a given `userInputId`, so callers never send both an
/// error and a success response for the same prompt.
#[derive(Debug, Default)]
pub struct TerminalErrorGuard {
    fired: AtomicBool,
}

impl TerminalErrorGuard {
    /// A fresh guard, armed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to fire the terminal error. Returns `true` the first time
    /// it's called, `false` on every subsequent call, so only one
    /// `prompt-error` is ever emitted per prompt.
    pub fn fire_once(&self) -> bool {
        self.fired.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok()
    }
}
