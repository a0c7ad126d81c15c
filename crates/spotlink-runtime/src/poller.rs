//! [`TripPoller`] – polls the backend for a trip assigned to this spot.
//!
//! While armed, the poller asks the backend for the active trip once per
//! period, skipping ticks whenever a trip is already active. The first
//! response carrying a trip id is turned into a navigation goal, the trip
//! flag is raised and the poller disarms itself by cancelling its run token.
//!
//! Polling stays off until [`TripPoller::arm`] is called again; the command
//! relay does this when a trip is cancelled. A reply that arrives after the
//! poller was disarmed is dropped without publishing a goal.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use spotlink_middleware::GoalPublisher;
use spotlink_types::NavGoal;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{AssignedTrip, Backend, BackendError, TripId};
use crate::session::Session;
use crate::status::StatusAggregator;

/// Result of a single poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    NoTrip,
    TripAssigned { id: TripId, goal_published: bool },
}

pub struct TripPoller {
    backend: Arc<dyn Backend>,
    session: Arc<Session>,
    status: Arc<StatusAggregator>,
    publisher: Arc<dyn GoalPublisher>,
    period: Duration,
    shutdown: CancellationToken,
    run_token: Mutex<Option<CancellationToken>>,
}

impl TripPoller {
    pub fn new(
        backend: Arc<dyn Backend>,
        session: Arc<Session>,
        status: Arc<StatusAggregator>,
        publisher: Arc<dyn GoalPublisher>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            backend,
            session,
            status,
            publisher,
            period,
            shutdown,
            run_token: Mutex::new(None),
        }
    }

    /// Start polling unless already running.
    ///
    /// Returns `false` when the poller was already armed or the process is
    /// shutting down. Must be called from within a Tokio runtime.
    pub fn arm(self: &Arc<Self>) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        let mut slot = self.run_token.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|t| !t.is_cancelled()) {
            return false;
        }
        let token = self.shutdown.child_token();
        *slot = Some(token.clone());
        drop(slot);

        info!(period_ms = self.period.as_millis() as u64, "trip polling armed");
        tokio::spawn(Arc::clone(self).run(token));
        true
    }

    /// Stop polling. No-op when not armed.
    pub fn disarm(&self) {
        if let Some(token) = self
            .run_token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            token.cancel();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.run_token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }

    /// Ask the backend once for an assigned trip and act on the answer.
    ///
    /// An assigned trip raises the trip flag even if its goal could not be
    /// published.
    pub async fn poll_trip(&self) -> Result<PollOutcome, BackendError> {
        Ok(match self.fetch_trip().await? {
            Some(trip) => self.apply_trip(trip),
            None => PollOutcome::NoTrip,
        })
    }

    async fn fetch_trip(&self) -> Result<Option<AssignedTrip>, BackendError> {
        let token = self.session.token();
        self.backend.active_trip(&token).await
    }

    fn apply_trip(&self, trip: AssignedTrip) -> PollOutcome {
        let goal = NavGoal::from_dropoff(trip.dropoff);
        let goal_published = match self.publisher.publish_goal(goal) {
            Ok(()) => true,
            Err(e) => {
                warn!(trip = %trip.id, error = %e, "trip goal not published");
                false
            }
        };
        self.status.set_trip_active(true);
        info!(
            trip = %trip.id,
            latitude = trip.dropoff.latitude,
            longitude = trip.dropoff.longitude,
            "trip assigned by backend"
        );
        PollOutcome::TripAssigned {
            id: trip.id,
            goal_published,
        }
    }

    async fn run(self: Arc<Self>, token: CancellationToken) {
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }
            if self.status.trip_active() {
                debug!("trip active, poll skipped");
                continue;
            }
            let reply = self.fetch_trip().await;
            // A disarm that landed while the request was in flight wins; a
            // later arm() owns polling from here on.
            if token.is_cancelled() {
                if let Ok(Some(trip)) = &reply {
                    debug!(trip = %trip.id, "poller disarmed mid-poll, trip left for the next poll");
                }
                break;
            }
            match reply {
                Ok(Some(trip)) => {
                    self.apply_trip(trip);
                    token.cancel();
                    break;
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "trip poll failed"),
            }
        }
        info!("trip polling stopped");
    }
}
