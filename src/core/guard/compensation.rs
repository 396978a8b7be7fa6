/*!
 * Compensation Stack
 *
 * Reverse-order undo actions for a pipeline of fallible acquisitions.
 * Actions are pushed right after the resource they undo is acquired and run
 * only when the pipeline as a whole fails.
 */

use tracing::{debug, warn};

/// A single undo action
pub type CompensationAction<'a> = Box<dyn FnOnce() -> anyhow::Result<()> + 'a>;

/// Stack lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackState {
    /// Accepting actions
    Active,
    /// Pipeline succeeded, actions discarded without running
    Committed,
    /// Actions ran in reverse order
    Unwound,
}

struct Compensation<'a> {
    step: &'static str,
    action: CompensationAction<'a>,
}

/// An undo action that failed while unwinding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnwindFailure {
    pub step: &'static str,
    pub error: String,
}

/// Outcome of an unwind: every step attempted, in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnwindReport {
    pub attempted: Vec<&'static str>,
    pub failures: Vec<UnwindFailure>,
}

impl UnwindReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Ordered stack of compensating actions
///
/// Dropping an active, non-empty stack unwinds it, so an early return or a
/// panic between acquisition and commit still releases everything.
pub struct CompensationStack<'a> {
    actions: Vec<Compensation<'a>>,
    state: StackState,
}

impl<'a> CompensationStack<'a> {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            state: StackState::Active,
        }
    }

    /// Register the undo action for a resource that was just acquired
    pub fn push<F>(&mut self, step: &'static str, action: F)
    where
        F: FnOnce() -> anyhow::Result<()> + 'a,
    {
        debug!(step, depth = self.actions.len() + 1, "compensation registered");
        self.actions.push(Compensation {
            step,
            action: Box::new(action),
        });
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn state(&self) -> StackState {
        self.state
    }

    /// Registered step names, oldest first
    pub fn steps(&self) -> Vec<&'static str> {
        self.actions.iter().map(|c| c.step).collect()
    }

    /// Discard every action; the acquired resources are now owned elsewhere
    pub fn commit(mut self) {
        debug!(discarded = self.actions.len(), "compensation stack committed");
        self.actions.clear();
        self.state = StackState::Committed;
    }

    /// Run every action in reverse registration order
    ///
    /// A failing action is logged and recorded; the remaining actions still run.
    pub fn unwind(mut self) -> UnwindReport {
        self.drain()
    }

    fn drain(&mut self) -> UnwindReport {
        let mut report = UnwindReport::default();

        while let Some(Compensation { step, action }) = self.actions.pop() {
            report.attempted.push(step);
            if let Err(e) = action() {
                warn!(step, error = %e, "compensation failed during unwind");
                report.failures.push(UnwindFailure {
                    step,
                    error: format!("{:#}", e),
                });
            }
        }

        self.state = StackState::Unwound;
        report
    }
}

impl Default for CompensationStack<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompensationStack<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompensationStack")
            .field("steps", &self.steps())
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for CompensationStack<'_> {
    fn drop(&mut self) {
        if self.state == StackState::Active && !self.actions.is_empty() {
            warn!(
                pending = self.actions.len(),
                "compensation stack dropped while active, unwinding"
            );
            let _ = self.drain();
        }
    }
}
