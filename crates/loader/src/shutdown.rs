use std::time::Duration;

use courier_runtime::ShutdownConfig;
use log::{debug, error, warn};

use crate::pool::{Drain, Termination};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownTimeouts {
    /// Wait for queued and in-flight work to finish
    pub graceful: Duration,
    /// Wait after cancelling in-flight work
    pub forced: Duration,
}

impl From<&ShutdownConfig> for ShutdownTimeouts {
    fn from(cfg: &ShutdownConfig) -> Self {
        Self {
            graceful: cfg.graceful_timeout(),
            forced: cfg.forced_timeout(),
        }
    }
}

impl Default for ShutdownTimeouts {
    fn default() -> Self {
        Self::from(&ShutdownConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// All work finished within the graceful window
    Drained,
    /// Workers stopped after in-flight work was cancelled
    Forced,
    /// Workers were still alive after both windows. Fatal.
    TimedOut,
    /// The waiting thread was interrupted
    Interrupted,
}

impl ShutdownOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Drained | Self::Forced)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Forcing,
    Terminated(ShutdownOutcome),
}

/// Escalating drain of a pool: wait, then cancel and wait, then give up.
pub struct ShutdownController {
    timeouts: ShutdownTimeouts,
    state: ShutdownState,
}

impl ShutdownController {
    pub fn new(timeouts: ShutdownTimeouts) -> Self {
        Self {
            timeouts,
            state: ShutdownState::Running,
        }
    }

    pub fn state(&self) -> ShutdownState {
        self.state
    }

    /// Perform one transition and return the new state. Terminal states are sticky.
    pub fn step<D: Drain + ?Sized>(&mut self, pool: &mut D) -> ShutdownState {
        let next = match self.state {
            ShutdownState::Running => {
                pool.shutdown();
                ShutdownState::Draining
            }
            ShutdownState::Draining => match pool.await_termination(self.timeouts.graceful) {
                Termination::Terminated => ShutdownState::Terminated(ShutdownOutcome::Drained),
                Termination::TimedOut => {
                    warn!(
                        "Workers still busy after {:?}; cancelling in-flight deliveries",
                        self.timeouts.graceful
                    );
                    pool.shutdown_now();
                    ShutdownState::Forcing
                }
                Termination::Interrupted => Self::interrupted(pool),
            },
            ShutdownState::Forcing => match pool.await_termination(self.timeouts.forced) {
                Termination::Terminated => ShutdownState::Terminated(ShutdownOutcome::Forced),
                Termination::TimedOut => {
                    error!(
                        "Loader pool did not terminate within {:?} + {:?}",
                        self.timeouts.graceful, self.timeouts.forced
                    );
                    ShutdownState::Terminated(ShutdownOutcome::TimedOut)
                }
                Termination::Interrupted => Self::interrupted(pool),
            },
            terminated @ ShutdownState::Terminated(_) => terminated,
        };

        if next != self.state {
            debug!("[shutdown] {:?} -> {:?}", self.state, next);
            self.state = next;
        }
        next
    }

    /// Drive the pool to a terminal state.
    pub fn run<D: Drain + ?Sized>(&mut self, pool: &mut D) -> ShutdownOutcome {
        loop {
            if let ShutdownState::Terminated(outcome) = self.step(pool) {
                return outcome;
            }
        }
    }

    /// Cancel everything right away because the caller was interrupted.
    pub fn abort<D: Drain + ?Sized>(&mut self, pool: &mut D) -> ShutdownOutcome {
        if let ShutdownState::Terminated(outcome) = self.state {
            return outcome;
        }
        debug!("[shutdown] {:?} -> aborted", self.state);
        self.state = Self::interrupted(pool);
        ShutdownOutcome::Interrupted
    }

    fn interrupted<D: Drain + ?Sized>(pool: &mut D) -> ShutdownState {
        warn!("Interrupted while draining the loader pool; cancelling workers");
        pool.shutdown_now();
        ShutdownState::Terminated(ShutdownOutcome::Interrupted)
    }
}

#[cfg(test)]
#[path = "shutdown_tests.rs"]
mod tests;
