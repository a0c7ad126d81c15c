//! In-crate doubles for the backend and the goal publisher.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use spotlink_middleware::GoalPublisher;
use spotlink_types::{NavGoal, RobotStatus, SpotError};

use crate::backend::{AssignedTrip, Backend, BackendError, Credentials};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) enum StatusReply {
    #[default]
    Accept,
    Unavailable,
    Unauthorized,
}

#[derive(Default)]
pub(crate) struct MockBackend {
    login_calls: AtomicUsize,
    issued_tokens: AtomicUsize,
    failing_logins: AtomicUsize,
    status_calls: AtomicUsize,
    status_reply: Mutex<StatusReply>,
    reported: Mutex<Vec<(String, RobotStatus)>>,
    trip_calls: AtomicUsize,
    failing_polls: AtomicUsize,
    trips: Mutex<VecDeque<Option<AssignedTrip>>>,
    poll_delay: Mutex<Duration>,
}

impl MockBackend {
    pub(crate) fn fail_logins(&self, n: usize) {
        self.failing_logins.store(n, Ordering::SeqCst);
    }

    pub(crate) fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn reply_to_status(&self, reply: StatusReply) {
        *self.status_reply.lock().unwrap() = reply;
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn reported(&self) -> Vec<(String, RobotStatus)> {
        self.reported.lock().unwrap().clone()
    }

    /// Queue the replies for the next polls; once drained, polls see no trip.
    pub(crate) fn queue_trips(&self, replies: impl IntoIterator<Item = Option<AssignedTrip>>) {
        self.trips.lock().unwrap().extend(replies);
    }

    pub(crate) fn fail_polls(&self, n: usize) {
        self.failing_polls.store(n, Ordering::SeqCst);
    }

    /// Hold every trip reply for `delay` before answering.
    pub(crate) fn delay_polls(&self, delay: Duration) {
        *self.poll_delay.lock().unwrap() = delay;
    }

    pub(crate) fn trip_calls(&self) -> usize {
        self.trip_calls.load(Ordering::SeqCst)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Backend for MockBackend {
    async fn login(&self, _credentials: &Credentials) -> Result<String, BackendError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.failing_logins) {
            return Err(BackendError::Unauthorized(401));
        }
        let n = self.issued_tokens.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("token-{n}"))
    }

    async fn update_status(&self, token: &str, status: &RobotStatus) -> Result<(), BackendError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.reported
            .lock()
            .unwrap()
            .push((token.to_string(), status.clone()));
        match *self.status_reply.lock().unwrap() {
            StatusReply::Accept => Ok(()),
            StatusReply::Unavailable => Err(BackendError::ServiceUnavailable),
            StatusReply::Unauthorized => Err(BackendError::Unauthorized(401)),
        }
    }

    async fn active_trip(&self, _token: &str) -> Result<Option<AssignedTrip>, BackendError> {
        self.trip_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.poll_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if take_one(&self.failing_polls) {
            return Err(BackendError::Status {
                status: 502,
                body: "bad gateway".into(),
            });
        }
        Ok(self.trips.lock().unwrap().pop_front().flatten())
    }
}

/// Goal publisher that records every goal, or refuses them all.
#[derive(Default)]
pub(crate) struct RecordingPublisher {
    goals: Mutex<Vec<NavGoal>>,
    unavailable: bool,
}

impl RecordingPublisher {
    pub(crate) fn unavailable() -> Self {
        Self {
            goals: Mutex::new(Vec::new()),
            unavailable: true,
        }
    }

    pub(crate) fn goals(&self) -> Vec<NavGoal> {
        self.goals.lock().unwrap().clone()
    }
}

impl GoalPublisher for RecordingPublisher {
    fn publish_goal(&self, goal: NavGoal) -> Result<(), SpotError> {
        if self.unavailable {
            return Err(SpotError::PublisherUnavailable);
        }
        self.goals.lock().unwrap().push(goal);
        Ok(())
    }
}
