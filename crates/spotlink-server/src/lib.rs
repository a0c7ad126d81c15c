//! `spotlink-server` – local HTTP surface for backend-originated commands
//!
//! Exposes the endpoints the fleet backend calls on the robot (default port
//! `9143`):
//!
//! | Route | Effect |
//! |---|---|
//! | `POST /newTrip` | Assign a trip; replies with the cached planned path |
//! | `PUT /cancelledTrip` | Cancel the active trip; replies `{success}` |
//! | `GET /status` | Current status snapshot, trip flag and login state |
//!
//! All responses carry permissive CORS headers and are gzip-compressed when
//! the client accepts it. Request bodies are capped at 10 MiB.
//!
//! # Usage
//!
//! ```rust,no_run
//! use spotlink_server::{AppState, SpotlinkServer};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(state: AppState) {
//! SpotlinkServer::new(state)
//!     .with_port(9143)
//!     .run(CancellationToken::new())
//!     .await
//!     .expect("spotlink server failed");
//! # }
//! ```

pub mod server;

pub use server::{AppState, DEFAULT_PORT, SpotlinkServer, build_router};
