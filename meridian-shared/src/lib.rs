//! # Meridian Shared Library
//!
//! Shared types, persistence and business rules used by the Meridian API
//! server and the notification worker.
//!
//! ## Module Organization
//!
//! - `db`: connection pool and migrations
//! - `models`: database models and their queries
//! - `auth`: passwords, JWTs, one-time tokens, request identity and ownership checks
//! - `payments`: payment gateway client and payment reconciliation
//! - `notifications`: transactional email enqueueing (outbox)

pub mod auth;
pub mod db;
pub mod models;
pub mod notifications;
pub mod payments;

/// Current version of the Meridian shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
