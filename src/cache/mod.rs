/// Cache tiers over the aggregation pipeline
///
/// Both tiers share the same freshness model (fresh / stale / expired zones
/// derived from snapshot age) and the same single-flight rule: at most one
/// refresh runs at a time, and every caller that needs its result joins the
/// in-flight operation instead of starting another.
pub mod recent;
pub mod snapshot;

use crate::errors::RefreshError;
use crate::types::SnapshotState;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Outcome of one refresh cycle, shared between the leader and every joiner.
pub type RefreshOutcome = Result<SnapshotState, RefreshError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Expired,
}

/// Place an age in the freshness zones. Boundaries are inclusive: an age of
/// exactly `fresh_ttl` is still fresh.
pub fn classify(age: Duration, fresh_ttl: Duration, stale_ttl: Duration) -> Freshness {
    if age <= fresh_ttl {
        Freshness::Fresh
    } else if age <= stale_ttl {
        Freshness::Stale
    } else {
        Freshness::Expired
    }
}

// ============================================================================
// SINGLE-FLIGHT
// ============================================================================

/// Pending-operation handle collapsing concurrent refreshes into one.
///
/// The first caller becomes the leader and runs the operation; everyone else
/// gets a receiver for the leader's published outcome. The slot clears when
/// the leader publishes (or is dropped), so the next cycle starts clean.
pub(crate) struct SingleFlight<T> {
    pending: Mutex<Option<watch::Receiver<Option<Arc<T>>>>>,
}

pub(crate) enum FlightTicket<T> {
    Leader(FlightPublisher<T>),
    Follower(watch::Receiver<Option<Arc<T>>>),
}

pub(crate) struct FlightPublisher<T> {
    flight: Arc<SingleFlight<T>>,
    sender: watch::Sender<Option<Arc<T>>>,
}

impl<T> SingleFlight<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(None),
        })
    }

    /// Join the in-flight operation if one exists, otherwise become leader.
    pub fn begin(self: &Arc<Self>) -> FlightTicket<T> {
        let mut pending = self.pending.lock().unwrap();
        if let Some(receiver) = pending.as_ref() {
            return FlightTicket::Follower(receiver.clone());
        }
        let (sender, receiver) = watch::channel(None);
        *pending = Some(receiver);
        FlightTicket::Leader(FlightPublisher {
            flight: self.clone(),
            sender,
        })
    }

    /// Await the leader's outcome. `None` means the leader was dropped
    /// before publishing anything.
    pub async fn wait(mut receiver: watch::Receiver<Option<Arc<T>>>) -> Option<Arc<T>> {
        loop {
            let current = receiver.borrow().clone();
            if let Some(outcome) = current {
                return Some(outcome);
            }
            if receiver.changed().await.is_err() {
                return receiver.borrow().clone();
            }
        }
    }
}

impl<T> FlightPublisher<T> {
    /// Broadcast the outcome to every follower; dropping the publisher then
    /// clears the pending slot for the next cycle.
    pub fn publish(self, outcome: Arc<T>) {
        let _ = self.sender.send(Some(outcome));
    }
}

impl<T> Drop for FlightPublisher<T> {
    fn drop(&mut self) {
        *self.flight.pending.lock().unwrap() = None;
    }
}
