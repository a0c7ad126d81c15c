//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Localization`] | GPS fixes from the localization stack |
//! | [`Topic::HardwareStatus`] | Base platform status (hardware id, battery) |
//! | [`Topic::PlannedPath`] | Global plans produced by navigation |
//! | [`Topic::GoalStatus`] | Goal-completion notifications from navigation |
//! | [`Topic::NavGoals`] | Outbound navigation goals awaiting delivery |

use spotlink_types::{Event, SpotError};
use tokio::sync::broadcast;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Enumeration of all routing topics on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Localization,
    HardwareStatus,
    PlannedPath,
    GoalStatus,
    NavGoals,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    localization: broadcast::Sender<Event>,
    hardware_status: broadcast::Sender<Event>,
    planned_path: broadcast::Sender<Event>,
    goal_status: broadcast::Sender<Event>,
    nav_goals: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (localization, _) = broadcast::channel(capacity);
        let (hardware_status, _) = broadcast::channel(capacity);
        let (planned_path, _) = broadcast::channel(capacity);
        let (goal_status, _) = broadcast::channel(capacity);
        let (nav_goals, _) = broadcast::channel(capacity);
        Self {
            localization,
            hardware_status,
            planned_path,
            goal_status,
            nav_goals,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event, or
    /// [`SpotError::Channel`] when nobody is listening on the topic.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, SpotError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| SpotError::Channel(format!("No subscribers for topic {topic:?}")))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of receivers currently attached to `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Localization => &self.localization,
            Topic::HardwareStatus => &self.hardware_status,
            Topic::PlannedPath => &self.planned_path,
            Topic::GoalStatus => &self.goal_status,
            Topic::NavGoals => &self.nav_goals,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.  The caller decides whether to
    ///   continue or abort.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`][Self::recv].
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotlink_types::{EventPayload, NavGoal, NavSatFix};

    fn make_event(source: &str) -> Event {
        Event::new(
            source,
            EventPayload::Localization(NavSatFix {
                latitude: Some(30.0),
                longitude: Some(-97.0),
            }),
        )
    }

    #[tokio::test]
    async fn topic_multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut subscriber1 = bus.subscribe_to(Topic::Localization);
        let mut subscriber2 = bus.subscribe_to(Topic::Localization);

        let event = make_event("rosbridge::gps");
        bus.publish_to(Topic::Localization, event.clone())?;

        assert_eq!(subscriber1.recv().await?.id, event.id);
        assert_eq!(subscriber2.recv().await?.id, event.id);
        Ok(())
    }

    #[test]
    fn publish_no_subscribers_returns_error() {
        let bus = EventBus::default();
        let result = bus.publish_to(Topic::NavGoals, make_event("test"));
        assert!(matches!(result, Err(SpotError::Channel(_))));
    }

    /// A subscriber on `GoalStatus` must not receive events published to
    /// `Localization` because they are routed through separate channels.
    #[tokio::test]
    async fn topic_subscriber_does_not_receive_other_topic_events() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut status_sub = bus.subscribe_to(Topic::GoalStatus);
        let _gps_sub = bus.subscribe_to(Topic::Localization);

        bus.publish_to(Topic::Localization, make_event("rosbridge::gps"))?;

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            status_sub.recv(),
        )
        .await;
        assert!(result.is_err(), "GoalStatus subscriber must not see a Localization event");
        Ok(())
    }

    #[test]
    fn subscriber_count_tracks_receivers() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(Topic::NavGoals), 0);
        let rx = bus.subscribe_to(Topic::NavGoals);
        assert_eq!(bus.subscriber_count(Topic::NavGoals), 1);
        assert_eq!(rx.topic(), Topic::NavGoals);
        drop(rx);
        assert_eq!(bus.subscriber_count(Topic::NavGoals), 0);
    }

    #[tokio::test]
    async fn topic_channel_lag_on_slow_subscriber() {
        let bus = EventBus::new(16);
        let mut slow_sub = bus.subscribe_to(Topic::NavGoals);

        for _ in 0..1_000 {
            let _ = bus.publish_to(
                Topic::NavGoals,
                Event::new("flood", EventPayload::NavGoal(NavGoal { x: 0.0, y: 0.0, theta: 0.0 })),
            );
        }

        let result = slow_sub.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }
}
