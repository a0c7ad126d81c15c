//! Backend authentication.
//!
//! [`Session`] holds the bearer token shared by every authorised call.
//! [`SessionManager`] performs the login and is the only writer of the token.
//!
//! There is no automatic refresh: once the token expires, authorised calls
//! fail with [`BackendError::Unauthorized`] until [`SessionManager::refresh`]
//! is invoked or the process restarts.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backend::{Backend, BackendError, Credentials};
use crate::status::Field;

/// Process-wide authentication state. Empty until the first login succeeds.
#[derive(Debug, Default)]
pub struct Session {
    token: Field<String>,
    logged_in: AtomicBool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// The token as of now. May be empty or stale.
    pub fn token(&self) -> String {
        self.token.get()
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }
}

pub struct SessionManager {
    session: Arc<Session>,
    backend: Arc<dyn Backend>,
    credentials: Credentials,
    // Serialises login attempts so concurrent callers never double-post.
    login_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(session: Arc<Session>, backend: Arc<dyn Backend>, credentials: Credentials) -> Self {
        Self {
            session,
            backend,
            credentials,
            login_lock: Mutex::new(()),
        }
    }

    pub fn session(&self) -> Arc<Session> {
        Arc::clone(&self.session)
    }

    /// Log in unless already logged in.
    ///
    /// On failure the session is left logged out and the error is returned;
    /// nothing is retried here.
    pub async fn login(&self) -> Result<(), BackendError> {
        let _guard = self.login_lock.lock().await;
        if self.session.is_logged_in() {
            return Ok(());
        }
        info!(identifier = %self.credentials.identifier, "logging in to backend");
        match self.backend.login(&self.credentials).await {
            Ok(token) => {
                self.session.token.set(token);
                self.session.logged_in.store(true, Ordering::SeqCst);
                info!("logged in to backend");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "backend login failed");
                Err(e)
            }
        }
    }

    /// Drop the login gate and log in again.
    ///
    /// The old token stays in place until the new one arrives.
    pub async fn refresh(&self) -> Result<(), BackendError> {
        self.session.logged_in.store(false, Ordering::SeqCst);
        self.login().await
    }

    /// Retry [`login`][Self::login] every `retry` until it succeeds,
    /// `attempts` is exhausted (`0` means unlimited), or `shutdown` fires.
    ///
    /// Returns whether the session ended up logged in.
    pub async fn login_until_ready(
        &self,
        retry: Duration,
        attempts: u32,
        shutdown: &CancellationToken,
    ) -> bool {
        let mut tried = 0u32;
        loop {
            if self.login().await.is_ok() {
                return true;
            }
            tried += 1;
            if attempts != 0 && tried >= attempts {
                warn!(attempts = tried, "giving up on backend login");
                return false;
            }
            tokio::select! {
                _ = shutdown.cancelled() => return false,
                _ = tokio::time::sleep(retry) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockBackend;

    fn creds() -> Credentials {
        Credentials {
            identifier: "robot-0".into(),
            password: "secret".into(),
            name: "rover".into(),
        }
    }

    #[tokio::test]
    async fn successful_login_stores_token() {
        let backend = Arc::new(MockBackend::default());
        let session = Arc::new(Session::new());
        let manager = SessionManager::new(Arc::clone(&session), backend.clone(), creds());

        assert_eq!(session.token(), "");
        manager.login().await.unwrap();
        assert!(session.is_logged_in());
        assert_eq!(session.token(), "token-1");
    }

    #[tokio::test]
    async fn second_login_is_gated() {
        let backend = Arc::new(MockBackend::default());
        let manager = SessionManager::new(Arc::new(Session::new()), backend.clone(), creds());

        manager.login().await.unwrap();
        manager.login().await.unwrap();
        assert_eq!(backend.login_calls(), 1);
    }

    #[tokio::test]
    async fn failed_login_leaves_session_logged_out() {
        let backend = Arc::new(MockBackend::default());
        backend.fail_logins(1);
        let session = Arc::new(Session::new());
        let manager = SessionManager::new(Arc::clone(&session), backend.clone(), creds());

        assert!(manager.login().await.is_err());
        assert!(!session.is_logged_in());
        assert_eq!(session.token(), "");
    }

    #[tokio::test]
    async fn refresh_fetches_a_new_token() {
        let backend = Arc::new(MockBackend::default());
        let session = Arc::new(Session::new());
        let manager = SessionManager::new(Arc::clone(&session), backend.clone(), creds());

        manager.login().await.unwrap();
        manager.refresh().await.unwrap();
        assert_eq!(session.token(), "token-2");
        assert_eq!(backend.login_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn login_until_ready_retries_until_success() {
        let backend = Arc::new(MockBackend::default());
        backend.fail_logins(3);
        let manager = SessionManager::new(Arc::new(Session::new()), backend.clone(), creds());

        let ok = manager
            .login_until_ready(Duration::from_secs(5), 0, &CancellationToken::new())
            .await;
        assert!(ok);
        assert_eq!(backend.login_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn login_until_ready_respects_attempt_cap() {
        let backend = Arc::new(MockBackend::default());
        backend.fail_logins(10);
        let manager = SessionManager::new(Arc::new(Session::new()), backend.clone(), creds());

        let ok = manager
            .login_until_ready(Duration::from_secs(5), 2, &CancellationToken::new())
            .await;
        assert!(!ok);
        assert_eq!(backend.login_calls(), 2);
    }
}
