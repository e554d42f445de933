//! The `execution` module holds the deadline state of an instance's evaluation.
//!
//! ## Governor states
//!
//! A [`Governor`] is either `Idle`, when no evaluation is in progress, or `Armed`, when an
//! evaluation is running against a deadline. The engine's interrupt hook polls
//! [`Governor::should_abort`] periodically; the first poll past the deadline makes the engine
//! unwind with an uncatchable internal error, which the bridge reports as
//! [`Error::Interrupted`](../../error/enum.Error.html#variant.Interrupted).
//!
//! ## Re-entrancy
//!
//! A host function may evaluate more code on the same instance while an evaluation is already
//! running. Arming an already-armed governor does not move the deadline: it only records one more
//! level of nesting. The deadline is released when the outermost [`DeadlineGuard`] drops.
//!
//! ## Clock
//!
//! The start of an evaluation is an [`Instant`], so adjustments to the wall clock can neither
//! extend nor cut short a running evaluation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GovernorState {
    Idle,
    Armed {
        started_at: Instant,
        budget: Duration,
        depth: usize,
    },
}

/// Owns the deadline of the evaluation in progress.
///
/// The governor is shared (through an `Arc`) with the interrupt hook installed on the engine
/// runtime, which is the only reason it sits behind a lock.
#[derive(Debug)]
pub struct Governor {
    state: Mutex<GovernorState>,
}

impl Governor {
    pub fn new() -> Arc<Governor> {
        Arc::new(Governor {
            state: Mutex::new(GovernorState::Idle),
        })
    }

    fn lock(&self) -> MutexGuard<'_, GovernorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm the deadline for an evaluation, or join the one already in progress.
    pub fn arm(self: &Arc<Self>, budget: Duration) -> DeadlineGuard {
        let mut state = self.lock();
        *state = match *state {
            GovernorState::Idle => GovernorState::Armed {
                started_at: Instant::now(),
                budget,
                depth: 1,
            },
            GovernorState::Armed {
                started_at,
                budget,
                depth,
            } => GovernorState::Armed {
                started_at,
                budget,
                depth: depth + 1,
            },
        };
        DeadlineGuard {
            governor: self.clone(),
        }
    }

    fn release(&self) {
        let mut state = self.lock();
        if let GovernorState::Armed {
            started_at,
            budget,
            depth,
        } = *state
        {
            *state = if depth > 1 {
                GovernorState::Armed {
                    started_at,
                    budget,
                    depth: depth - 1,
                }
            } else {
                GovernorState::Idle
            };
        }
    }

    /// Drop the deadline regardless of nesting. Used when the instance is torn down.
    pub fn disarm(&self) {
        *self.lock() = GovernorState::Idle;
    }

    /// Called from the engine's interrupt hook.
    ///
    /// Once the deadline has passed this keeps returning `true` until the governor is idle again,
    /// so guest code cannot resume by catching the first interruption.
    pub fn should_abort(&self) -> bool {
        match *self.lock() {
            GovernorState::Idle => false,
            GovernorState::Armed {
                started_at, budget, ..
            } => started_at.elapsed() >= budget,
        }
    }

    /// Time left before the deadline, or `None` when no evaluation is running.
    pub fn remaining(&self) -> Option<Duration> {
        match *self.lock() {
            GovernorState::Idle => None,
            GovernorState::Armed {
                started_at, budget, ..
            } => Some(budget.checked_sub(started_at.elapsed()).unwrap_or_default()),
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(*self.lock(), GovernorState::Armed { .. })
    }
}

/// Keeps a governor armed for as long as it lives.
#[must_use]
#[derive(Debug)]
pub struct DeadlineGuard {
    governor: Arc<Governor>,
}

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        self.governor.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn idle_governor_never_aborts() {
        let governor = Governor::new();
        assert!(!governor.should_abort());
        assert_eq!(governor.remaining(), None);
        assert!(!governor.is_armed());
    }

    #[test]
    fn armed_governor_aborts_after_budget() {
        let governor = Governor::new();
        let guard = governor.arm(Duration::from_millis(20));
        assert!(!governor.should_abort());
        thread::sleep(Duration::from_millis(30));
        assert!(governor.should_abort());
        assert_eq!(governor.remaining(), Some(Duration::from_millis(0)));
        drop(guard);
        assert!(!governor.should_abort());
    }

    #[test]
    fn nested_arming_keeps_the_outer_deadline() {
        let governor = Governor::new();
        let outer = governor.arm(Duration::from_millis(20));
        thread::sleep(Duration::from_millis(30));
        {
            let _inner = governor.arm(Duration::from_secs(10));
            assert!(governor.should_abort());
        }
        assert!(governor.is_armed());
        assert!(governor.should_abort());
        drop(outer);
        assert!(!governor.is_armed());
    }

    #[test]
    fn remaining_shrinks() {
        let governor = Governor::new();
        let _guard = governor.arm(Duration::from_secs(10));
        let first = governor.remaining().unwrap();
        thread::sleep(Duration::from_millis(5));
        assert!(governor.remaining().unwrap() < first);
    }

    #[test]
    fn disarm_ignores_nesting() {
        let governor = Governor::new();
        let _outer = governor.arm(Duration::from_millis(1));
        let _inner = governor.arm(Duration::from_millis(1));
        governor.disarm();
        assert!(!governor.is_armed());
    }
}
