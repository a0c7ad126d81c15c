//! [`Coordinator`] – owns the shared robot state and wires every component
//! to it.
//!
//! ```text
//!   EventBus ──► listeners ──► StatusAggregator ──► StatusReporter ──► backend
//!                          └─► PathCache ─────────► CommandRelay ◄──── HTTP
//!                                                      │
//!   backend ◄──► TripPoller ───────────────────────────┴──► GoalPublisher
//! ```
//!
//! All state is held in `Arc` handles created here; nothing is global.

use std::sync::Arc;
use std::time::Duration;

use spotlink_middleware::{EventBus, GoalPublisher, Topic, TopicReceiver};
use spotlink_types::{Event, EventPayload};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::{Backend, Credentials};
use crate::path_cache::PathCache;
use crate::poller::TripPoller;
use crate::relay::CommandRelay;
use crate::reporter::{ReporterConfig, StatusReporter};
use crate::session::{Session, SessionManager};
use crate::status::{SensorUpdate, StatusAggregator};

/// Timer settings for the coordinator's periodic tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub reporter: ReporterConfig,
    pub poll_period: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            reporter: ReporterConfig::default(),
            poll_period: Duration::from_secs(1),
        }
    }
}

pub struct Coordinator {
    bus: Arc<EventBus>,
    status: Arc<StatusAggregator>,
    path_cache: Arc<PathCache>,
    session: Arc<Session>,
    session_manager: Arc<SessionManager>,
    reporter: Arc<StatusReporter>,
    poller: Arc<TripPoller>,
    relay: Arc<CommandRelay>,
    shutdown: CancellationToken,
}

impl Coordinator {
    pub fn new(
        bus: Arc<EventBus>,
        backend: Arc<dyn Backend>,
        publisher: Arc<dyn GoalPublisher>,
        credentials: Credentials,
        config: CoordinatorConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let status = Arc::new(StatusAggregator::new());
        let path_cache = Arc::new(PathCache::new());
        let session = Arc::new(Session::new());
        let session_manager = Arc::new(SessionManager::new(
            Arc::clone(&session),
            Arc::clone(&backend),
            credentials,
        ));
        let reporter = Arc::new(StatusReporter::new(
            Arc::clone(&backend),
            Arc::clone(&session),
            Arc::clone(&status),
            Arc::clone(&publisher),
            config.reporter,
        ));
        let poller = Arc::new(TripPoller::new(
            Arc::clone(&backend),
            Arc::clone(&session),
            Arc::clone(&status),
            Arc::clone(&publisher),
            config.poll_period,
            shutdown.clone(),
        ));
        let relay = Arc::new(
            CommandRelay::new(Arc::clone(&status), Arc::clone(&path_cache), publisher)
                .with_poller(Arc::clone(&poller)),
        );
        Self {
            bus,
            status,
            path_cache,
            session,
            session_manager,
            reporter,
            poller,
            relay,
            shutdown,
        }
    }

    pub fn status(&self) -> Arc<StatusAggregator> {
        Arc::clone(&self.status)
    }

    pub fn path_cache(&self) -> Arc<PathCache> {
        Arc::clone(&self.path_cache)
    }

    pub fn session(&self) -> Arc<Session> {
        Arc::clone(&self.session)
    }

    pub fn session_manager(&self) -> Arc<SessionManager> {
        Arc::clone(&self.session_manager)
    }

    pub fn poller(&self) -> Arc<TripPoller> {
        Arc::clone(&self.poller)
    }

    pub fn relay(&self) -> Arc<CommandRelay> {
        Arc::clone(&self.relay)
    }

    /// Apply one middleware event to the shared state.
    pub fn dispatch(&self, event: &Event) {
        match &event.payload {
            EventPayload::Localization(fix) => self.status.on_sensor_update(SensorUpdate::from(fix)),
            EventPayload::HardwareStatus(hw) => self.status.on_sensor_update(SensorUpdate::from(hw)),
            EventPayload::PlannedPath(path) => self.path_cache.on_path_update(path),
            EventPayload::GoalStatus(goals) => {
                self.status.on_nav_status_update(goals);
            }
            EventPayload::NavGoal(_) => {}
        }
    }

    /// Subscribe to every inbound topic and feed events into [`dispatch`].
    ///
    /// Subscriptions are taken before this returns, so nothing published
    /// afterwards is missed.
    ///
    /// [`dispatch`]: Self::dispatch
    pub fn spawn_listeners(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        [
            Topic::Localization,
            Topic::HardwareStatus,
            Topic::PlannedPath,
            Topic::GoalStatus,
        ]
        .into_iter()
        .map(|topic| {
            let rx = self.bus.subscribe_to(topic);
            tokio::spawn(Arc::clone(self).listen(rx))
        })
        .collect()
    }

    /// Start the status reporter and arm the trip poller.
    pub fn start_timers(&self) -> JoinHandle<()> {
        self.poller.arm();
        tokio::spawn(Arc::clone(&self.reporter).run(self.shutdown.clone()))
    }

    /// Log in to the backend in the background, retrying every `retry`
    /// until success, `attempts` failures (`0` = unlimited) or shutdown.
    ///
    /// Call after [`start_timers`]: the timers run with an empty token until
    /// the login lands.
    ///
    /// [`start_timers`]: Self::start_timers
    pub fn spawn_login(&self, retry: Duration, attempts: u32) -> JoinHandle<bool> {
        let manager = Arc::clone(&self.session_manager);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move { manager.login_until_ready(retry, attempts, &shutdown).await })
    }

    async fn listen(self: Arc<Self>, mut rx: TopicReceiver) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                result = rx.recv() => match result {
                    Ok(event) => {
                        debug!(source = %event.source, "middleware event");
                        self.dispatch(&event);
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(topic = ?rx.topic(), lagged_by = n, "listener lagged");
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        }
    }
}
