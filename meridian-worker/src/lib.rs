//! # Meridian Worker Library
//!
//! Drains the `email_jobs` outbox written by the API.
//!
//! ## Modules
//!
//! - `config`: environment configuration
//! - `queue`: claiming jobs and recording outcomes
//! - `templates`: subject and bodies per notification kind
//! - `mailer`: SMTP or file delivery via lettre
//! - `dispatcher`: the polling loop tying them together

pub mod config;
pub mod dispatcher;
pub mod mailer;
pub mod queue;
pub mod templates;
