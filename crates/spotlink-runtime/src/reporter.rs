//! [`StatusReporter`] – periodic push of the aggregated status to the backend.
//!
//! The cadence depends on trip state: `idle_period` while no trip is active,
//! `trip_period` once one is. The flag is re-read before every sleep, so a
//! trip starting or ending takes effect on the next cycle.
//!
//! Delivery is best effort. Failures are logged and the loop carries on with
//! no backoff. A 503 from the backend additionally publishes a hold-position
//! goal as a degraded-mode signal to the robot.

use std::sync::Arc;
use std::time::Duration;

use spotlink_middleware::GoalPublisher;
use spotlink_types::NavGoal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::{Backend, BackendError};
use crate::session::Session;
use crate::status::StatusAggregator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReporterConfig {
    pub idle_period: Duration,
    pub trip_period: Duration,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            idle_period: Duration::from_secs(1),
            trip_period: Duration::from_secs(10),
        }
    }
}

pub struct StatusReporter {
    backend: Arc<dyn Backend>,
    session: Arc<Session>,
    status: Arc<StatusAggregator>,
    publisher: Arc<dyn GoalPublisher>,
    config: ReporterConfig,
}

impl StatusReporter {
    pub fn new(
        backend: Arc<dyn Backend>,
        session: Arc<Session>,
        status: Arc<StatusAggregator>,
        publisher: Arc<dyn GoalPublisher>,
        config: ReporterConfig,
    ) -> Self {
        Self {
            backend,
            session,
            status,
            publisher,
            config,
        }
    }

    /// Interval until the next report given the current trip state.
    pub fn period(&self) -> Duration {
        if self.status.trip_active() {
            self.config.trip_period
        } else {
            self.config.idle_period
        }
    }

    /// Push one status snapshot.
    ///
    /// On [`BackendError::ServiceUnavailable`] a hold-position goal is
    /// published before the error is returned.
    pub async fn report_status(&self) -> Result<(), BackendError> {
        let snapshot = self.status.snapshot();
        let token = self.session.token();
        match self.backend.update_status(&token, &snapshot).await {
            Ok(()) => {
                debug!(
                    spot_status = %snapshot.spot_status,
                    charge = snapshot.charge_level,
                    "status sent"
                );
                Ok(())
            }
            Err(e) if e.is_service_unavailable() => {
                let goal = NavGoal::hold_position(snapshot.position);
                match self.publisher.publish_goal(goal) {
                    Ok(()) => warn!("backend unavailable, published hold-position goal"),
                    Err(pe) => warn!(error = %pe, "backend unavailable, hold-position goal not published"),
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Report until `shutdown` is cancelled. The first report goes out one
    /// period after start.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(self.period()) => {}
            }
            if let Err(e) = self.report_status().await {
                warn!(error = %e, "error sending status update");
            }
        }
    }
}
