//! [`CommandRelay`] – turns backend-originated trip commands into navigation
//! goals and local state changes.
//!
//! The relay is transport-agnostic: the HTTP surface in `spotlink-server`
//! parses requests with [`NewTripRequest::from_json`] and maps the results to
//! responses.

use std::sync::Arc;

use serde::Deserialize;
use spotlink_middleware::GoalPublisher;
use spotlink_types::{GeoPoint, NavGoal, NavPath, SpotStatus};
use thiserror::Error;
use tracing::{info, warn};

use crate::path_cache::PathCache;
use crate::poller::TripPoller;
use crate::status::StatusAggregator;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    #[error("invalid trip request: {0}")]
    InvalidRequest(String),
    #[error("invalid trip request: dropoffLocation is required")]
    MissingDropoff,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssignedSpot {
    pub status: SpotStatus,
}

/// Body of an inbound trip assignment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTripRequest {
    #[serde(default)]
    pub dropoff_location: Option<GeoPoint>,
    #[serde(default)]
    pub assigned_spot: Option<AssignedSpot>,
}

impl NewTripRequest {
    pub fn from_json(body: &[u8]) -> Result<Self, RelayError> {
        serde_json::from_slice(body).map_err(|e| RelayError::InvalidRequest(e.to_string()))
    }
}

pub struct CommandRelay {
    status: Arc<StatusAggregator>,
    path_cache: Arc<PathCache>,
    publisher: Arc<dyn GoalPublisher>,
    poller: Option<Arc<TripPoller>>,
}

impl CommandRelay {
    pub fn new(
        status: Arc<StatusAggregator>,
        path_cache: Arc<PathCache>,
        publisher: Arc<dyn GoalPublisher>,
    ) -> Self {
        Self {
            status,
            path_cache,
            publisher,
            poller: None,
        }
    }

    /// Re-arm `poller` whenever a trip is cancelled (builder-style).
    pub fn with_poller(mut self, poller: Arc<TripPoller>) -> Self {
        self.poller = Some(poller);
        self
    }

    /// Accept a trip assignment.
    ///
    /// The goal is published before any state changes. A publish failure
    /// only downgrades the command to a status update. Returns the cached
    /// planned path.
    pub fn handle_new_trip(&self, request: NewTripRequest) -> Result<NavPath, RelayError> {
        let dropoff = request.dropoff_location.ok_or(RelayError::MissingDropoff)?;

        let goal = NavGoal::from_dropoff(dropoff);
        if let Err(e) = self.publisher.publish_goal(goal) {
            warn!(error = %e, "trip goal not published, applying status only");
        }

        if let Some(spot) = request.assigned_spot {
            self.status.set_spot_status(spot.status);
        }
        self.status.set_trip_active(true);
        info!(
            latitude = dropoff.latitude,
            longitude = dropoff.longitude,
            spot_status = %self.status.spot_status(),
            "trip received from backend"
        );
        Ok(self.path_cache.current())
    }

    /// Cancel the active trip.
    ///
    /// Returns `true` iff the hold-position goal was published. The trip is
    /// concluded either way and trip polling is re-armed.
    pub fn handle_cancel_trip(&self) -> bool {
        let goal = NavGoal::hold_position(self.status.position());
        let published = match self.publisher.publish_goal(goal) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "hold-position goal not published");
                false
            }
        };

        self.status.set_spot_status(SpotStatus::Available);
        self.status.set_trip_active(false);
        if let Some(poller) = &self.poller {
            poller.arm();
        }
        info!(published, "trip cancelled");
        published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::status::SensorUpdate;
    use crate::test_support::{MockBackend, RecordingPublisher};
    use spotlink_types::ros::{Point, Pose, PoseStamped};
    use spotlink_types::PathMsg;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn relay(publisher: RecordingPublisher) -> (CommandRelay, Arc<RecordingPublisher>) {
        let publisher = Arc::new(publisher);
        let relay = CommandRelay::new(
            Arc::new(StatusAggregator::new()),
            Arc::new(PathCache::new()),
            publisher.clone(),
        );
        (relay, publisher)
    }

    fn request(body: &str) -> NewTripRequest {
        NewTripRequest::from_json(body.as_bytes()).unwrap()
    }

    #[test]
    fn new_trip_publishes_goal_and_updates_state() {
        let (relay, publisher) = relay(RecordingPublisher::default());
        relay.path_cache.on_path_update(&PathMsg {
            poses: vec![PoseStamped {
                pose: Pose {
                    position: Point { x: 1.0, y: 2.0, z: 0.0 },
                },
            }],
        });

        let path = relay
            .handle_new_trip(request(
                r#"{"dropoffLocation":{"latitude":"30.1","longitude":"-97.7"},
                    "assignedSpot":{"status":"dropoff"}}"#,
            ))
            .unwrap();

        assert_eq!(
            publisher.goals(),
            vec![NavGoal { x: 30.1, y: -97.7, theta: 0.0 }]
        );
        assert_eq!(relay.status.spot_status(), SpotStatus::Dropoff);
        assert!(relay.status.trip_active());
        assert_eq!(path.location_points, vec![GeoPoint::new(1.0, 2.0)]);
    }

    #[test]
    fn new_trip_without_dropoff_is_rejected_without_mutation() {
        let (relay, publisher) = relay(RecordingPublisher::default());
        let err = relay
            .handle_new_trip(request(r#"{"assignedSpot":{"status":"dropoff"}}"#))
            .unwrap_err();

        assert_eq!(err, RelayError::MissingDropoff);
        assert!(!err.to_string().is_empty());
        assert!(!relay.status.trip_active());
        assert_eq!(relay.status.spot_status(), SpotStatus::Available);
        assert!(publisher.goals().is_empty());
    }

    #[test]
    fn new_trip_without_publisher_degrades_to_status_update() {
        let (relay, _publisher) = relay(RecordingPublisher::unavailable());
        let path = relay.handle_new_trip(request(
            r#"{"dropoffLocation":{"latitude":30.1,"longitude":-97.7},
                "assignedSpot":{"status":"occupied"}}"#,
        ));
        assert!(path.is_ok());
        assert_eq!(relay.status.spot_status(), SpotStatus::Occupied);
        assert!(relay.status.trip_active());
    }

    #[test]
    fn new_trip_without_assigned_spot_keeps_spot_status() {
        let (relay, _publisher) = relay(RecordingPublisher::default());
        relay.status.set_spot_status(SpotStatus::Occupied);
        relay
            .handle_new_trip(request(r#"{"dropoffLocation":{"latitude":1,"longitude":2}}"#))
            .unwrap();
        assert_eq!(relay.status.spot_status(), SpotStatus::Occupied);
    }

    #[test]
    fn malformed_body_is_invalid_request() {
        assert!(matches!(
            NewTripRequest::from_json(b"{not json"),
            Err(RelayError::InvalidRequest(_))
        ));
        assert!(matches!(
            NewTripRequest::from_json(br#"{"dropoffLocation":{"latitude":"abc","longitude":1}}"#),
            Err(RelayError::InvalidRequest(_))
        ));
    }

    #[test]
    fn non_finite_dropoff_is_rejected_without_mutation() {
        let (relay, publisher) = relay(RecordingPublisher::default());
        for body in [
            r#"{"dropoffLocation":{"latitude":"NaN","longitude":"inf"},"assignedSpot":{"status":"dropoff"}}"#,
            r#"{"dropoffLocation":{"latitude":30.1,"longitude":"-inf"}}"#,
        ] {
            let err = NewTripRequest::from_json(body.as_bytes())
                .and_then(|req| relay.handle_new_trip(req))
                .unwrap_err();
            assert!(matches!(err, RelayError::InvalidRequest(_)), "{body}: {err:?}");
        }
        assert!(publisher.goals().is_empty());
        assert!(!relay.status.trip_active());
        assert_eq!(relay.status.spot_status(), SpotStatus::Available);
    }

    #[test]
    fn cancel_with_publisher_holds_position() {
        let (relay, publisher) = relay(RecordingPublisher::default());
        relay.status.on_sensor_update(SensorUpdate {
            latitude: Some(30.2),
            longitude: Some(-97.6),
            ..SensorUpdate::default()
        });
        relay.status.set_trip_active(true);
        relay.status.set_spot_status(SpotStatus::Dropoff);

        assert!(relay.handle_cancel_trip());
        assert_eq!(
            publisher.goals(),
            vec![NavGoal { x: -97.6, y: -97.6, theta: 0.0 }]
        );
        assert_eq!(relay.status.spot_status(), SpotStatus::Available);
        assert!(!relay.status.trip_active());
    }

    #[test]
    fn cancel_without_publisher_reports_false() {
        let (relay, _publisher) = relay(RecordingPublisher::unavailable());
        relay.status.set_trip_active(true);

        assert!(!relay.handle_cancel_trip());
        assert!(!relay.status.trip_active());
        assert_eq!(relay.status.spot_status(), SpotStatus::Available);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_rearms_trip_polling() {
        let backend = Arc::new(MockBackend::default());
        let status = Arc::new(StatusAggregator::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let shutdown = CancellationToken::new();
        let poller = Arc::new(TripPoller::new(
            backend.clone(),
            Arc::new(Session::new()),
            Arc::clone(&status),
            publisher.clone(),
            Duration::from_secs(1),
            shutdown.clone(),
        ));
        let relay = CommandRelay::new(status, Arc::new(PathCache::new()), publisher)
            .with_poller(Arc::clone(&poller));

        assert!(!poller.is_armed());
        relay.handle_cancel_trip();
        assert!(poller.is_armed());

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(backend.trip_calls(), 2);
        shutdown.cancel();
    }
}
