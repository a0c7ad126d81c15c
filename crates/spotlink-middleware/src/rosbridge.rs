//! rosbridge v2 WebSocket client.
//!
//! [`RosbridgeClient`] connects to a `rosbridge_server` and:
//!
//! 1. **Subscribes** to the GPS, hardware-status, planned-path and
//!    goal-status topics and translates every inbound `publish` frame into an
//!    [`Event`] on the matching [`Topic`] lane of the [`EventBus`].
//!
//! 2. **Advertises** the navigation goal topic as `geometry_msgs/Pose2D` and
//!    forwards every [`EventPayload::NavGoal`] seen on [`Topic::NavGoals`] as a
//!    rosbridge `publish` op.
//!
//! GPS and hardware-status frames are throttled client-side so a chatty
//! driver cannot flood the aggregator. The client reconnects after a fixed
//! delay whenever the socket drops.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde_json::{Value, json};
use spotlink_types::{
    Event, EventPayload, GoalStatusArray, HardwareStatus, NavGoal, NavSatFix, PathMsg, SpotError,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, Topic};

/// Topic names and connection parameters for [`RosbridgeClient`].
#[derive(Debug, Clone)]
pub struct RosbridgeConfig {
    pub url: String,
    pub gps_topic: String,
    pub hardware_status_topic: String,
    /// Message type of the hardware-status topic; depends on the base driver.
    pub hardware_status_type: String,
    pub path_topic: String,
    pub goal_status_topic: String,
    pub goal_topic: String,
    /// Minimum spacing between accepted GPS / hardware-status frames.
    /// `Duration::ZERO` disables throttling.
    pub sensor_throttle: Duration,
    pub reconnect_delay: Duration,
}

impl Default for RosbridgeConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:9090".to_string(),
            gps_topic: "/gps/fix".to_string(),
            hardware_status_topic: "/status".to_string(),
            hardware_status_type: "jackal_msgs/Status".to_string(),
            path_topic: "/move_base/NavfnROS/plan".to_string(),
            goal_status_topic: "/move_base/status".to_string(),
            goal_topic: "/smads_waypoint/goal".to_string(),
            sensor_throttle: Duration::from_millis(1000),
            reconnect_delay: Duration::from_secs(2),
        }
    }
}

/// Bridge between a rosbridge server and the internal [`EventBus`].
#[derive(Clone)]
pub struct RosbridgeClient {
    bus: Arc<EventBus>,
    config: RosbridgeConfig,
    gps_limiter: Option<Arc<DefaultDirectRateLimiter>>,
    status_limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl RosbridgeClient {
    pub fn new(bus: Arc<EventBus>, config: RosbridgeConfig) -> Self {
        let limiter = || {
            Quota::with_period(config.sensor_throttle)
                .map(|q| Arc::new(RateLimiter::direct(q.allow_burst(NonZeroU32::MIN))))
        };
        Self {
            gps_limiter: limiter(),
            status_limiter: limiter(),
            bus,
            config,
        }
    }

    // -----------------------------------------------------------------------
    // Ingest helpers
    // -----------------------------------------------------------------------

    /// Publish a GPS fix onto [`Topic::Localization`].
    ///
    /// Returns `Ok(0)` without publishing when the frame is throttled.
    pub fn ingest_gps(&self, fix: NavSatFix) -> Result<usize, SpotError> {
        if !admit(self.gps_limiter.as_deref()) {
            return Ok(0);
        }
        self.bus.publish_to(
            Topic::Localization,
            Event::new("spotlink-middleware::rosbridge/gps", EventPayload::Localization(fix)),
        )
    }

    /// Publish a hardware-status frame onto [`Topic::HardwareStatus`].
    pub fn ingest_hardware_status(&self, status: HardwareStatus) -> Result<usize, SpotError> {
        if !admit(self.status_limiter.as_deref()) {
            return Ok(0);
        }
        self.bus.publish_to(
            Topic::HardwareStatus,
            Event::new(
                "spotlink-middleware::rosbridge/status",
                EventPayload::HardwareStatus(status),
            ),
        )
    }

    pub fn ingest_path(&self, path: PathMsg) -> Result<usize, SpotError> {
        self.bus.publish_to(
            Topic::PlannedPath,
            Event::new("spotlink-middleware::rosbridge/path", EventPayload::PlannedPath(path)),
        )
    }

    pub fn ingest_goal_status(&self, status: GoalStatusArray) -> Result<usize, SpotError> {
        self.bus.publish_to(
            Topic::GoalStatus,
            Event::new(
                "spotlink-middleware::rosbridge/goal_status",
                EventPayload::GoalStatus(status),
            ),
        )
    }

    /// Decode one rosbridge text frame and route it to the bus.
    ///
    /// Frames that are not `publish` ops, or that carry a topic this client
    /// did not subscribe to, are ignored and yield `Ok(None)`.
    pub fn handle_frame(&self, text: &str) -> Result<Option<usize>, SpotError> {
        let frame: Value =
            serde_json::from_str(text).map_err(|e| SpotError::Parsing(e.to_string()))?;
        if frame.get("op").and_then(Value::as_str) != Some("publish") {
            return Ok(None);
        }
        let topic = frame.get("topic").and_then(Value::as_str).unwrap_or("");
        let msg = frame.get("msg").cloned().unwrap_or(Value::Null);

        let decode_err = |e: serde_json::Error| SpotError::Parsing(format!("{topic}: {e}"));
        let delivered = if topic == self.config.gps_topic {
            self.ingest_gps(serde_json::from_value(msg).map_err(decode_err)?)?
        } else if topic == self.config.hardware_status_topic {
            self.ingest_hardware_status(serde_json::from_value(msg).map_err(decode_err)?)?
        } else if topic == self.config.path_topic {
            self.ingest_path(serde_json::from_value(msg).map_err(decode_err)?)?
        } else if topic == self.config.goal_status_topic {
            self.ingest_goal_status(serde_json::from_value(msg).map_err(decode_err)?)?
        } else {
            return Ok(None);
        };
        Ok(Some(delivered))
    }

    // -----------------------------------------------------------------------
    // rosbridge protocol ops
    // -----------------------------------------------------------------------

    fn subscribe_ops(&self) -> Vec<Value> {
        let throttle_ms = self.config.sensor_throttle.as_millis() as u64;
        vec![
            json!({
                "op": "subscribe",
                "topic": self.config.gps_topic,
                "type": "sensor_msgs/NavSatFix",
                "throttle_rate": throttle_ms,
                "queue_length": 1
            }),
            json!({
                "op": "subscribe",
                "topic": self.config.hardware_status_topic,
                "type": self.config.hardware_status_type,
                "throttle_rate": throttle_ms,
                "queue_length": 1
            }),
            json!({
                "op": "subscribe",
                "topic": self.config.path_topic,
                "type": "nav_msgs/Path"
            }),
            json!({
                "op": "subscribe",
                "topic": self.config.goal_status_topic,
                "type": "actionlib_msgs/GoalStatusArray"
            }),
        ]
    }

    fn advertise_op(&self) -> Value {
        json!({
            "op": "advertise",
            "topic": self.config.goal_topic,
            "type": "geometry_msgs/Pose2D"
        })
    }

    fn publish_op(&self, goal: &NavGoal) -> Value {
        json!({
            "op": "publish",
            "topic": self.config.goal_topic,
            "msg": { "x": goal.x, "y": goal.y, "theta": goal.theta }
        })
    }

    // -----------------------------------------------------------------------
    // Connection loop
    // -----------------------------------------------------------------------

    /// Keep a rosbridge session alive until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            match self.session(&shutdown).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(url = %self.config.url, error = %e, "rosbridge session ended");
                }
            }
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    /// One connected session. Returns `Ok(())` only on shutdown.
    async fn session(&self, shutdown: &CancellationToken) -> Result<(), SpotError> {
        let (ws_stream, _) = connect_async(self.config.url.as_str())
            .await
            .map_err(|e| SpotError::Transport(format!("connect {}: {e}", self.config.url)))?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let mut ops = self.subscribe_ops();
        ops.push(self.advertise_op());
        for op in ops {
            ws_tx
                .send(Message::Text(op.to_string().into()))
                .await
                .map_err(|e| SpotError::Transport(e.to_string()))?;
        }

        // Listening on NavGoals is what makes BusGoalPublisher ready, so only
        // start after the advertise op went out.
        let mut goals = self.bus.subscribe_to(Topic::NavGoals);
        info!(url = %self.config.url, goal_topic = %self.config.goal_topic, "rosbridge connected");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return Ok(());
                }
                result = goals.recv() => {
                    match result {
                        Ok(Event { payload: EventPayload::NavGoal(goal), .. }) => {
                            ws_tx
                                .send(Message::Text(self.publish_op(&goal).to_string().into()))
                                .await
                                .map_err(|e| SpotError::Transport(e.to_string()))?;
                            info!(x = goal.x, y = goal.y, theta = goal.theta, "nav goal published");
                        }
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!(lagged_by = n, "goal forwarder lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
                    }
                }
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.handle_frame(text.as_str()) {
                                debug!(error = %e, "dropped rosbridge frame");
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(SpotError::Transport("rosbridge closed the connection".into()));
                        }
                        Some(Err(e)) => return Err(SpotError::Transport(e.to_string())),
                        _ => {}
                    }
                }
            }
        }
    }
}

fn admit(limiter: Option<&DefaultDirectRateLimiter>) -> bool {
    limiter.is_none_or(|l| l.check().is_ok())
}
