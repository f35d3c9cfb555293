//! Booking and registration lifecycles.
//!
//! Every operation validates against the current time from the injected
//! [`Clock`], then writes through the [`Store`]. The store re-checks the
//! uniqueness and capacity constraints inside its commit, so a pre-check that
//! loses a race still ends in the same rejection.

mod availability;
mod conflict;
mod error;
mod queries;
mod registrations;
mod reservations;
mod sweeps;
mod tournaments;
#[cfg(test)]
mod tests;

pub use availability::SlotStatus;
pub use error::{msg, EngineError, ErrorKind};
pub use sweeps::FinalizeReport;

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::observability::OPERATION_DURATION_SECONDS;
use crate::store::Store;

pub struct Engine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// Record latency of `operation`, and count a rejection under `rejected` labelled by error kind.
fn record_outcome<T>(
    operation: &'static str,
    rejected: &'static str,
    started: Instant,
    result: &Result<T, EngineError>,
) {
    metrics::histogram!(OPERATION_DURATION_SECONDS, "operation" => operation)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = result {
        metrics::counter!(rejected, "reason" => e.kind().as_str()).increment(1);
    }
}
