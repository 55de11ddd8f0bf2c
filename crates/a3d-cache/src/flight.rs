//! Per-key single-flight coordination.
//!
//! The first caller for a key becomes the leader and computes the value; later
//! callers for the same key block until the leader finishes and then observe
//! its outcome. Different keys never block each other.
//!
//! The leader holds a [`LeaderGuard`]. Dropping the guard without reporting an
//! outcome (panic, cancellation, early return) marks the flight as failed,
//! removes it from the table and wakes every waiter.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;

/// Status of a computation in flight.
#[derive(Debug, Clone)]
enum FlightStatus {
    InProgress,
    Complete,
    Failed(String),
}

struct Flight {
    status: Mutex<FlightStatus>,
    done: Condvar,
}

/// What a waiter observed when the leader finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Complete,
    Failed(String),
}

/// Role assigned to a caller by [`FlightTable::begin`].
pub(crate) enum Role<'a> {
    Leader(LeaderGuard<'a>),
    Waiter(Outcome),
}

/// Table of keys currently being computed.
#[derive(Default)]
pub(crate) struct FlightTable {
    in_flight: Mutex<HashMap<String, Arc<Flight>>>,
}

impl FlightTable {
    /// Join the flight for `key`, becoming its leader if none is running.
    ///
    /// Waiters block here until the leader reports an outcome.
    pub(crate) fn begin(&self, key: &str) -> Role<'_> {
        let flight = {
            let mut table = self.in_flight.lock();
            match table.get(key) {
                Some(existing) => Arc::clone(existing),
                None => {
                    let flight = Arc::new(Flight {
                        status: Mutex::new(FlightStatus::InProgress),
                        done: Condvar::new(),
                    });
                    table.insert(key.to_string(), Arc::clone(&flight));
                    return Role::Leader(LeaderGuard {
                        table: self,
                        key: key.to_string(),
                        flight,
                        outcome: None,
                    });
                }
            }
        };

        let mut status = flight.status.lock();
        loop {
            let current = status.clone();
            match current {
                FlightStatus::InProgress => flight.done.wait(&mut status),
                FlightStatus::Complete => return Role::Waiter(Outcome::Complete),
                FlightStatus::Failed(reason) => return Role::Waiter(Outcome::Failed(reason)),
            }
        }
    }

    /// Number of keys currently in flight.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.in_flight.lock().len()
    }
}

/// Held by the leader of a flight until it reports an outcome.
pub(crate) struct LeaderGuard<'a> {
    table: &'a FlightTable,
    key: String,
    flight: Arc<Flight>,
    outcome: Option<FlightStatus>,
}

impl LeaderGuard<'_> {
    pub(crate) fn complete(mut self) {
        self.outcome = Some(FlightStatus::Complete);
    }

    pub(crate) fn fail(mut self, reason: String) {
        self.outcome = Some(FlightStatus::Failed(reason));
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| FlightStatus::Failed("computation abandoned before completion".to_string()));

        // Remove first, so late arrivals start a fresh flight instead of
        // observing this one
        self.table.in_flight.lock().remove(&self.key);

        *self.flight.status.lock() = outcome;
        self.flight.done.notify_all();
    }
}
