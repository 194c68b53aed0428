//! # roomcast-server
//!
//! Axum HTTP + `WebSocket` front end for the relay engine.
//!
//! - `WebSocket` gateway at `/ws` (and `/`): token auth, frame codec,
//!   per-connection outbound pump with ping/liveness
//! - HTTP endpoints: `/health`, `/metrics` (Prometheus text)
//! - Shared-secret token auth (AES-256-GCM, hex encoded)
//! - JSON file configuration with `ROOMCAST_*` env overrides
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod handler;
pub mod health;
pub mod metrics;
pub mod server;
pub mod session;
pub mod shutdown;

pub use auth::Authenticator;
pub use config::RelayConfig;
pub use server::RelayServer;
pub use shutdown::ShutdownCoordinator;
