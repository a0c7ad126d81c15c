//! The navigation-goal seam.
//!
//! The coordinator never talks to the middleware transport directly. It hands
//! [`NavGoal`]s to a [`GoalPublisher`]; the default implementation,
//! [`BusGoalPublisher`], drops them onto [`Topic::NavGoals`] where the
//! rosbridge client picks them up once it has advertised the goal topic.

use std::sync::Arc;

use spotlink_types::{Event, EventPayload, NavGoal, SpotError};
use tracing::debug;

use crate::bus::{EventBus, Topic};

/// Anything that can deliver a navigation goal to the robot.
///
/// # Contract
///
/// `publish_goal` is fire-and-forget: `Ok(())` means the goal was handed to
/// the transport, not that navigation accepted it. Implementations return
/// [`SpotError::PublisherUnavailable`] when no transport is ready yet.
pub trait GoalPublisher: Send + Sync {
    fn publish_goal(&self, goal: NavGoal) -> Result<(), SpotError>;
}

/// [`GoalPublisher`] backed by the in-process [`EventBus`].
#[derive(Clone)]
pub struct BusGoalPublisher {
    bus: Arc<EventBus>,
}

impl BusGoalPublisher {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    /// `true` once something is listening for goals on the bus.
    pub fn is_ready(&self) -> bool {
        self.bus.subscriber_count(Topic::NavGoals) > 0
    }
}

impl GoalPublisher for BusGoalPublisher {
    fn publish_goal(&self, goal: NavGoal) -> Result<(), SpotError> {
        let event = Event::new("spotlink-middleware::goal", EventPayload::NavGoal(goal));
        match self.bus.publish_to(Topic::NavGoals, event) {
            Ok(receivers) => {
                debug!(receivers, x = goal.x, y = goal.y, "nav goal queued");
                Ok(())
            }
            Err(SpotError::Channel(_)) => Err(SpotError::PublisherUnavailable),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_listener_is_unavailable() {
        let publisher = BusGoalPublisher::new(Arc::new(EventBus::default()));
        assert!(!publisher.is_ready());
        let result = publisher.publish_goal(NavGoal { x: 1.0, y: 2.0, theta: 0.0 });
        assert_eq!(result, Err(SpotError::PublisherUnavailable));
    }

    #[tokio::test]
    async fn publish_with_listener_delivers_goal() -> Result<(), Box<dyn std::error::Error>> {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe_to(Topic::NavGoals);
        let publisher = BusGoalPublisher::new(Arc::clone(&bus));
        assert!(publisher.is_ready());

        let goal = NavGoal { x: 30.1, y: -97.7, theta: 0.0 };
        publisher.publish_goal(goal)?;

        match rx.recv().await?.payload {
            EventPayload::NavGoal(received) => assert_eq!(received, goal),
            other => panic!("expected NavGoal, got {other:?}"),
        }
        Ok(())
    }
}
