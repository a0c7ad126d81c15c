//! Fleet-backend HTTP client.
//!
//! [`Backend`] is the seam the coordinator talks through; [`HttpBackend`] is
//! the production implementation built on `reqwest`. Every authorised call
//! takes the bearer token as an argument so callers always send whatever the
//! session holds at call time.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use spotlink_types::{GeoPoint, RobotStatus};
use thiserror::Error;
use tracing::instrument;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum BackendError {
    /// Transport-level failure (DNS, connect, timeout, body decode).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The backend answered 503.
    #[error("backend service unavailable")]
    ServiceUnavailable,
    /// The backend rejected the credentials or the bearer token.
    #[error("backend rejected authorization (HTTP {0})")]
    Unauthorized(u16),
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response: {0}")]
    MalformedResponse(String),
}

impl BackendError {
    /// `true` for the failure class that triggers a degraded-mode nudge.
    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, BackendError::ServiceUnavailable)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire shapes
// ─────────────────────────────────────────────────────────────────────────────

/// Robot login credentials. Wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub identifier: String,
    pub password: String,
    pub name: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    identifier: &'a str,
    password: &'a str,
    name: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

/// Trip identifiers arrive as numbers or strings depending on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TripId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for TripId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TripId::Number(n) => write!(f, "{n}"),
            TripId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTrip {
    #[serde(default)]
    id: Option<TripId>,
    #[serde(default)]
    dropoff_location: Option<GeoPoint>,
}

/// A trip the backend has assigned to this spot.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignedTrip {
    pub id: TripId,
    pub dropoff: GeoPoint,
}

impl RawTrip {
    fn into_assigned(self) -> Result<Option<AssignedTrip>, BackendError> {
        let Some(id) = self.id else {
            return Ok(None);
        };
        let dropoff = self.dropoff_location.ok_or_else(|| {
            BackendError::MalformedResponse(format!("trip {id} has no dropoffLocation"))
        })?;
        Ok(Some(AssignedTrip { id, dropoff }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend trait
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait Backend: Send + Sync {
    /// `POST /auth/login`; returns the bearer token.
    async fn login(&self, credentials: &Credentials) -> Result<String, BackendError>;

    /// `PUT /spots/{id}/statusUpdate`.
    async fn update_status(&self, token: &str, status: &RobotStatus) -> Result<(), BackendError>;

    /// `GET /spots/{id}/activeTrip`. `Ok(None)` means no trip is assigned.
    async fn active_trip(&self, token: &str) -> Result<Option<AssignedTrip>, BackendError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HttpBackend
// ─────────────────────────────────────────────────────────────────────────────

/// [`Backend`] over HTTP. Construct once and share.
pub struct HttpBackend {
    base_url: String,
    spot_id: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, spot_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            spot_id: spot_id.into(),
            client: reqwest::Client::new(),
        }
    }

    fn spot_url(&self, action: &str) -> String {
        format!("{}/spots/{}/{}", self.base_url, self.spot_id, action)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::SERVICE_UNAVAILABLE => Err(BackendError::ServiceUnavailable),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(BackendError::Unauthorized(status.as_u16()))
        }
        _ => Err(BackendError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        }),
    }
}

#[async_trait]
impl Backend for HttpBackend {
    #[instrument(skip_all, fields(identifier = %credentials.identifier))]
    async fn login(&self, credentials: &Credentials) -> Result<String, BackendError> {
        let body = LoginRequest {
            identifier: &credentials.identifier,
            password: &credentials.password,
            name: &credentials.name,
        };
        let response = self
            .client
            .post(format!("{}/auth/login", self.base_url))
            .json(&body)
            .send()
            .await?;
        let login: LoginResponse = check_status(response).await?.json().await?;
        if login.token.is_empty() {
            return Err(BackendError::MalformedResponse("empty token".into()));
        }
        Ok(login.token)
    }

    #[instrument(skip_all, fields(spot = %self.spot_id))]
    async fn update_status(&self, token: &str, status: &RobotStatus) -> Result<(), BackendError> {
        let response = self
            .client
            .put(self.spot_url("statusUpdate"))
            .bearer_auth(token)
            .json(status)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(spot = %self.spot_id))]
    async fn active_trip(&self, token: &str) -> Result<Option<AssignedTrip>, BackendError> {
        let response = self
            .client
            .get(self.spot_url("activeTrip"))
            .bearer_auth(token)
            .send()
            .await?;
        let raw: Option<RawTrip> = check_status(response).await?.json().await?;
        match raw {
            Some(trip) => trip.into_assigned(),
            None => Ok(None),
        }
    }
}
