//! bugtrail-core library.
//!
//! Tickets whose history is kept as reverse diffs: each update stores only
//! the values the changed fields held before it, and the readable log is
//! reconstructed by replaying those records backward from the present.
//!
//! # Conventions
//!
//! - **Errors**: store and history operations return [`error::TrailError`];
//!   setup helpers return `anyhow::Result`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).

pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod model;

pub use error::{ErrorCode, TrailError};
