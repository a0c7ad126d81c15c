//! `spotlink-middleware` – robot-side plumbing
//!
//! Routes robot middleware traffic into the coordinator and navigation goals
//! back out, without caring about the data's meaning.
//!
//! # Modules
//!
//! - [`bus`] – Headless, typed, topic-based publish/subscribe event bus built
//!   on Tokio broadcast channels.
//! - [`publisher`] – The [`GoalPublisher`] seam used by the coordinator to
//!   emit navigation goals.
//! - [`rosbridge`] – rosbridge v2 WebSocket client that feeds sensor topics
//!   onto the bus and publishes goals to the navigation stack.

pub mod bus;
pub mod publisher;
pub mod rosbridge;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use publisher::{BusGoalPublisher, GoalPublisher};
pub use rosbridge::{RosbridgeClient, RosbridgeConfig};
