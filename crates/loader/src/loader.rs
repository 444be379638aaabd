use std::{io, sync::Arc, time::Duration};

use courier_protocol::{Encoder, Record};
use courier_runtime::{ConfigError, LoaderConfig};
use log::{debug, info};
use thiserror::Error;

use crate::{
    batch::{Aborted, Batch, accumulate},
    delivery::DeliveryTask,
    destination::Destination,
    pool::{Job, PoolShape, SubmitError, WorkerPool},
    shutdown::{ShutdownController, ShutdownOutcome, ShutdownTimeouts},
    signal::{CancelToken, Interrupt},
    stats::{DeliveryStats, DeliverySummary},
};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to start load workers: {0}")]
    Spawn(#[source] io::Error),

    #[error("load interrupted after {observed} records")]
    Interrupted { observed: usize },

    #[error(
        "loader pool did not terminate within {graceful:?} + {forced:?} ({observed} records observed)"
    )]
    ShutdownTimedOut {
        observed: usize,
        graceful: Duration,
        forced: Duration,
    },

    #[error("worker pool refused a batch after {observed} records: {source}")]
    Submit {
        observed: usize,
        #[source]
        source: SubmitError,
    },
}

impl LoadError {
    /// Records pulled from the source before the run failed, when known.
    pub fn observed(&self) -> Option<usize> {
        match self {
            Self::Spawn(_) => None,
            Self::Interrupted { observed }
            | Self::ShutdownTimedOut { observed, .. }
            | Self::Submit { observed, .. } => Some(*observed),
        }
    }
}

/// Result of a run that shut down cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    /// Records pulled from the source, whatever became of them
    pub observed: usize,
    pub outcome: ShutdownOutcome,
    pub summary: DeliverySummary,
}

/// Bulk loader delivering records to `<prefix>/<id>`. The prefix is used as given.
///
/// Each call to [`Loader::load`] runs on its own worker pool, which is drained
/// before the call returns.
pub struct Loader<E, D> {
    prefix: Arc<str>,
    encoder: Arc<E>,
    destination: Arc<D>,
    batch_size: usize,
    log_interval: usize,
    retry_budget: u32,
    pool: PoolShape,
    timeouts: ShutdownTimeouts,
    interrupt: Interrupt,
}

impl<E, D> Loader<E, D>
where
    D: Destination,
{
    pub fn new(
        prefix: &str,
        encoder: E,
        destination: D,
        config: &LoaderConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            prefix: Arc::from(prefix),
            encoder: Arc::new(encoder),
            destination: Arc::new(destination),
            batch_size: config.batch_size,
            log_interval: config.log_interval,
            retry_budget: config.retry_budget,
            pool: PoolShape::from(&config.pool),
            timeouts: ShutdownTimeouts::from(&config.shutdown),
            interrupt: Interrupt::new(),
        })
    }

    /// Use an externally owned interrupt flag, e.g. one wired to signal handlers.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn with_pool_shape(mut self, shape: PoolShape) -> Self {
        self.pool = shape;
        self
    }

    pub fn with_shutdown_timeouts(mut self, timeouts: ShutdownTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Deliver every record and return how many were pulled from `records`.
    pub fn load<R, I>(&self, records: I) -> Result<usize, LoadError>
    where
        R: Record,
        I: IntoIterator<Item = R>,
        E: Encoder<R>,
    {
        self.run(records).map(|report| report.observed)
    }

    /// Like [`Loader::load`], also returning the delivery counters.
    pub fn run<R, I>(&self, records: I) -> Result<LoadReport, LoadError>
    where
        R: Record,
        I: IntoIterator<Item = R>,
        E: Encoder<R>,
    {
        debug!("Starting import into '{}'", self.prefix);

        let stats = Arc::new(DeliveryStats::default());
        let mut pool =
            WorkerPool::new(self.pool, self.interrupt.clone()).map_err(LoadError::Spawn)?;
        let mut controller = ShutdownController::new(self.timeouts);

        let submitted = accumulate(
            records,
            self.batch_size,
            self.log_interval,
            &self.prefix,
            |batch| pool.submit(self.job(batch, &stats)),
        );

        let observed = match submitted {
            Ok(observed) => observed,
            Err(Aborted { observed, error }) => {
                controller.abort(&mut pool);
                return Err(match error {
                    SubmitError::Interrupted => LoadError::Interrupted { observed },
                    source => LoadError::Submit { observed, source },
                });
            }
        };

        let outcome = controller.run(&mut pool);

        let mut summary = stats.summary();
        summary.panicked_tasks = pool.panicked_tasks();
        summary.discarded_batches = pool.discarded_jobs();

        match outcome {
            ShutdownOutcome::Drained | ShutdownOutcome::Forced => {
                info!(
                    "Loaded {observed} records into {} ({outcome:?}): {summary}",
                    self.prefix
                );
                Ok(LoadReport {
                    observed,
                    outcome,
                    summary,
                })
            }
            ShutdownOutcome::TimedOut => Err(LoadError::ShutdownTimedOut {
                observed,
                graceful: self.timeouts.graceful,
                forced: self.timeouts.forced,
            }),
            ShutdownOutcome::Interrupted => Err(LoadError::Interrupted { observed }),
        }
    }

    fn job<R>(&self, batch: Batch<R>, stats: &Arc<DeliveryStats>) -> Job
    where
        R: Record,
        E: Encoder<R>,
    {
        let task = DeliveryTask::new(
            Arc::clone(&self.prefix),
            batch,
            Arc::clone(&self.encoder),
            Arc::clone(&self.destination),
            self.retry_budget,
            Arc::clone(stats),
        );
        Box::new(move |cancel: &CancelToken| task.run(cancel))
    }
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
