//! # Meridian API Server Library
//!
//! Router, handlers and configuration for the Meridian HTTP API. The binary
//! in `main.rs` only wires these together.
//!
//! ## Modules
//!
//! - `app`: application state and router builder
//! - `config`: environment configuration
//! - `error`: error handling and HTTP response mapping
//! - `middleware`: security headers
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
