/// Payment gateway abstraction and payment reconciliation
///
/// The gateway is reached through the [`PaymentGateway`] trait so handlers
/// and tests never depend on a concrete HTTP client. [`paystack`] provides
/// the production implementation; [`reconcile`] converges local payment,
/// enrollment, appointment and course state from a verified transaction.
///
/// # Example
///
/// ```no_run
/// use meridian_shared::payments::{paystack::PaystackGateway, PaymentGateway};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let gateway = PaystackGateway::new(
///     "https://api.paystack.co",
///     "sk_test_xxx",
///     Duration::from_secs(10),
/// )?;
/// let transaction = gateway.verify("MRD-2F9K3LQ0ZP").await?;
/// println!("{:?}", transaction.status);
/// # Ok(())
/// # }
/// ```

pub mod paystack;
pub mod reconcile;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::tokens::random_token;

/// Prefix of every reference this platform generates
pub const REFERENCE_PREFIX: &str = "MRD-";

/// Gateway errors
///
/// None of these mean the customer's payment failed; they mean we could not
/// find out. Callers must not mutate local state on any of them.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Payment gateway timed out")]
    Timeout,

    #[error("Payment gateway unreachable: {0}")]
    Network(String),

    #[error("Payment gateway rejected the request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid payment gateway response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

/// Transaction state as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Success,
    Failed,
    Abandoned,
    Reversed,
    /// Not settled yet (`ongoing`, `pending`, `processing`, ...)
    Pending,
}

impl TransactionStatus {
    /// Maps the gateway's status string; anything unrecognised is treated as
    /// not settled
    pub fn from_gateway(status: &str) -> Self {
        match status {
            "success" => TransactionStatus::Success,
            "failed" => TransactionStatus::Failed,
            "abandoned" => TransactionStatus::Abandoned,
            "reversed" => TransactionStatus::Reversed,
            _ => TransactionStatus::Pending,
        }
    }

    /// The gateway will not move this transaction to success
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Failed | TransactionStatus::Abandoned | TransactionStatus::Reversed
        )
    }
}

/// Parameters for opening a transaction
#[derive(Debug, Clone)]
pub struct InitializeRequest {
    pub email: String,
    /// Minor currency units
    pub amount_minor: i64,
    pub currency: String,
    pub reference: String,
    pub callback_url: Option<String>,
    pub metadata: serde_json::Value,
}

/// A transaction the customer can now pay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializedTransaction {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

/// The gateway's authoritative view of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedTransaction {
    pub reference: String,
    pub status: TransactionStatus,
    pub amount_minor: i64,
    pub currency: String,
    /// card, bank, ussd, ...
    pub channel: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Payment gateway operations
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a transaction and returns the URL the customer pays at
    async fn initialize(
        &self,
        request: &InitializeRequest,
    ) -> Result<InitializedTransaction, GatewayError>;

    /// Asks the gateway for the current state of a transaction
    async fn verify(&self, reference: &str) -> Result<VerifiedTransaction, GatewayError>;

    /// Checks a webhook signature against the raw request body
    ///
    /// Must run in constant time with respect to the signature.
    fn verify_webhook_signature(&self, body: &[u8], signature: Option<&str>) -> bool;
}

/// Generates a fresh transaction reference
///
/// # Example
///
/// ```
/// use meridian_shared::payments::{generate_reference, REFERENCE_PREFIX};
///
/// let reference = generate_reference();
/// assert!(reference.starts_with(REFERENCE_PREFIX));
/// ```
pub fn generate_reference() -> String {
    format!("{}{}", REFERENCE_PREFIX, random_token(20).to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_gateway() {
        assert_eq!(TransactionStatus::from_gateway("success"), TransactionStatus::Success);
        assert_eq!(TransactionStatus::from_gateway("failed"), TransactionStatus::Failed);
        assert_eq!(TransactionStatus::from_gateway("abandoned"), TransactionStatus::Abandoned);
        assert_eq!(TransactionStatus::from_gateway("reversed"), TransactionStatus::Reversed);
        assert_eq!(TransactionStatus::from_gateway("ongoing"), TransactionStatus::Pending);
        assert_eq!(TransactionStatus::from_gateway("queued"), TransactionStatus::Pending);
    }

    #[test]
    fn test_failure_statuses() {
        assert!(TransactionStatus::Failed.is_failure());
        assert!(TransactionStatus::Abandoned.is_failure());
        assert!(TransactionStatus::Reversed.is_failure());
        assert!(!TransactionStatus::Success.is_failure());
        assert!(!TransactionStatus::Pending.is_failure());
    }

    #[test]
    fn test_generate_reference() {
        let a = generate_reference();
        let b = generate_reference();

        assert!(a.starts_with(REFERENCE_PREFIX));
        assert_eq!(a.len(), REFERENCE_PREFIX.len() + 20);
        assert_ne!(a, b);
    }
}
