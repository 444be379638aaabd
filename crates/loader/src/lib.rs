mod batch;
mod delivery;
mod destination;
mod http;
mod loader;
mod pool;
mod shutdown;
mod signal;
mod stats;

#[cfg(test)]
mod test_support;

pub use batch::{Aborted, Batch, BatchAccumulator, BatchRange, accumulate};
pub use delivery::DeliveryTask;
pub use destination::{Destination, TransportError, WriteResponse};
pub use http::HttpDestination;
pub use loader::{LoadError, LoadReport, Loader};
pub use pool::{Drain, Job, PoolShape, SubmitError, Termination, WorkerPool};
pub use shutdown::{ShutdownController, ShutdownOutcome, ShutdownState, ShutdownTimeouts};
pub use signal::{CancelToken, Interrupt};
pub use stats::{DeliveryStats, DeliverySummary};
