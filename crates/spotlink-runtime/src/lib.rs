//! `spotlink-runtime` – status synchronisation and command relay
//!
//! Reconciles three independently changing views of robot state: the live
//! middleware feed, the locally cached status, and the fleet backend.
//!
//! # Modules
//!
//! - [`status`] – [`StatusAggregator`]: the authoritative local robot status
//!   with per-field last-write-wins updates and goal-completion dedup.
//! - [`path_cache`] – [`PathCache`]: the latest planned path, replaced
//!   wholesale on every update.
//! - [`session`] – [`Session`] / [`SessionManager`]: bearer token and login.
//! - [`backend`] – the [`Backend`] seam and its `reqwest` implementation
//!   [`HttpBackend`].
//! - [`reporter`] – [`StatusReporter`]: trip-dependent periodic status push
//!   with a hold-position nudge when the backend reports 503.
//! - [`poller`] – [`TripPoller`]: one-shot polling for an assigned trip,
//!   stopped through a cancellation token.
//! - [`relay`] – [`CommandRelay`]: inbound trip assignment and cancellation.
//! - [`coordinator`] – [`Coordinator`]: builds the shared state and wires the
//!   event bus and timers to it.
//! - [`telemetry`] – [`init_tracing`]: `tracing` subscriber with optional
//!   OTLP export.

pub mod backend;
pub mod coordinator;
pub mod path_cache;
pub mod poller;
pub mod relay;
pub mod reporter;
pub mod session;
pub mod status;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use backend::{AssignedTrip, Backend, BackendError, Credentials, HttpBackend, TripId};
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use path_cache::PathCache;
pub use poller::{PollOutcome, TripPoller};
pub use relay::{CommandRelay, NewTripRequest, RelayError};
pub use reporter::{ReporterConfig, StatusReporter};
pub use session::{Session, SessionManager};
pub use status::{SensorUpdate, StatusAggregator};
pub use telemetry::{TracerProviderGuard, init_tracing};
