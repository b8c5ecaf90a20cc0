/// Paystack gateway client
///
/// Every response is wrapped in `{"status": bool, "message": str, "data": ...}`.
/// Amounts are integers in the currency's minor unit. Webhooks are signed with
/// HMAC-SHA512 of the raw body keyed by the secret key, hex encoded in the
/// `x-paystack-signature` header.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    GatewayError, InitializeRequest, InitializedTransaction, PaymentGateway, TransactionStatus,
    VerifiedTransaction,
};

/// Header carrying the webhook signature
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// The only event that is reconciled
pub const CHARGE_SUCCESS: &str = "charge.success";

type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
struct InitializeBody<'a> {
    email: &'a str,
    amount: i64,
    currency: &'a str,
    reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
    metadata: &'a serde_json::Value,
}

/// Transaction object as it appears in verify responses and webhook events
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeData {
    pub reference: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    pub channel: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<ChargeData> for VerifiedTransaction {
    fn from(data: ChargeData) -> Self {
        VerifiedTransaction {
            status: TransactionStatus::from_gateway(&data.status),
            reference: data.reference,
            amount_minor: data.amount,
            currency: data.currency,
            channel: data.channel,
            paid_at: data.paid_at,
        }
    }
}

/// Parsed webhook body
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: ChargeData,
}

impl WebhookEvent {
    /// Parses a webhook body
    ///
    /// Call only after [`verify_signature`] accepted the same bytes.
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    pub fn is_charge_success(&self) -> bool {
        self.event == CHARGE_SUCCESS
    }
}

/// Verifies a webhook signature in constant time
///
/// Returns `false` for a missing header, bad hex or a mismatch.
pub fn verify_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };

    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };

    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    mac.verify_slice(&expected).is_ok()
}

/// Computes the signature Paystack would send for `body`
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha512::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Paystack HTTP client
///
/// Holds one `reqwest::Client` built at startup with a request timeout.
#[derive(Debug, Clone)]
pub struct PaystackGateway {
    client: Client,
    base_url: String,
    secret_key: String,
}

impl PaystackGateway {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    async fn unwrap_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let http_status = response.status();
        let body = response.bytes().await?;

        let envelope: Envelope<T> = serde_json::from_slice(&body).map_err(|e| {
            if http_status.is_success() {
                GatewayError::InvalidResponse(e.to_string())
            } else {
                GatewayError::Api {
                    status: http_status.as_u16(),
                    message: String::from_utf8_lossy(&body).chars().take(200).collect(),
                }
            }
        })?;

        if !http_status.is_success() || !envelope.status {
            return Err(GatewayError::Api {
                status: http_status.as_u16(),
                message: envelope.message,
            });
        }

        envelope
            .data
            .ok_or_else(|| GatewayError::InvalidResponse("missing data".to_string()))
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    async fn initialize(
        &self,
        request: &InitializeRequest,
    ) -> Result<InitializedTransaction, GatewayError> {
        debug!(reference = %request.reference, amount = request.amount_minor, "Initializing transaction");

        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&InitializeBody {
                email: &request.email,
                amount: request.amount_minor,
                currency: &request.currency,
                reference: &request.reference,
                callback_url: request.callback_url.as_deref(),
                metadata: &request.metadata,
            })
            .send()
            .await?;

        let transaction: InitializedTransaction = Self::unwrap_envelope(response).await?;

        if transaction.reference != request.reference {
            warn!(
                sent = %request.reference,
                received = %transaction.reference,
                "Gateway returned a different reference"
            );
            return Err(GatewayError::InvalidResponse(
                "reference mismatch".to_string(),
            ));
        }

        Ok(transaction)
    }

    async fn verify(&self, reference: &str) -> Result<VerifiedTransaction, GatewayError> {
        debug!(reference = %reference, "Verifying transaction");

        let response = self
            .client
            .get(format!("{}/transaction/verify/{}", self.base_url, reference))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        let data: ChargeData = Self::unwrap_envelope(response).await?;
        Ok(data.into())
    }

    fn verify_webhook_signature(&self, body: &[u8], signature: Option<&str>) -> bool {
        verify_signature(&self.secret_key, body, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SECRET: &str = "sk_test_meridian";

    fn gateway(server: &MockServer) -> PaystackGateway {
        PaystackGateway::new(server.uri(), SECRET, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_signature_roundtrip() {
        let body = br#"{"event":"charge.success","data":{}}"#;
        let signature = sign(SECRET, body);

        assert_eq!(signature.len(), 128);
        assert!(verify_signature(SECRET, body, Some(&signature)));
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let body = br#"{"event":"charge.success","data":{"amount":100}}"#;
        let signature = sign(SECRET, body);

        assert!(!verify_signature(SECRET, br#"{"event":"charge.success","data":{"amount":999}}"#, Some(&signature)));
        assert!(!verify_signature("sk_other", body, Some(&signature)));
        assert!(!verify_signature(SECRET, body, None));
        assert!(!verify_signature(SECRET, body, Some("not-hex")));
        assert!(!verify_signature(SECRET, body, Some("")));
    }

    #[test]
    fn test_parse_webhook_event() {
        let body = json!({
            "event": "charge.success",
            "data": {
                "reference": "MRD-ABC",
                "status": "success",
                "amount": 500000,
                "currency": "NGN",
                "channel": "card",
                "paid_at": "2026-01-05T10:00:00Z"
            }
        })
        .to_string();

        let event = WebhookEvent::parse(body.as_bytes()).unwrap();
        assert!(event.is_charge_success());

        let verified: VerifiedTransaction = event.data.into();
        assert_eq!(verified.reference, "MRD-ABC");
        assert_eq!(verified.status, TransactionStatus::Success);
        assert_eq!(verified.amount_minor, 500000);
        assert_eq!(verified.channel.as_deref(), Some("card"));
        assert!(verified.paid_at.is_some());
    }

    #[test]
    fn test_parse_malformed_webhook() {
        assert!(WebhookEvent::parse(b"not json").is_err());
        assert!(WebhookEvent::parse(br#"{"event":"charge.success"}"#).is_err());
    }

    #[tokio::test]
    async fn test_verify_success() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/transaction/verify/MRD-OK"))
            .and(header("authorization", format!("Bearer {}", SECRET).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "message": "Verification successful",
                "data": {
                    "reference": "MRD-OK",
                    "status": "success",
                    "amount": 2500000,
                    "currency": "NGN",
                    "channel": "bank",
                    "paid_at": null
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let verified = gateway(&server).verify("MRD-OK").await.unwrap();

        assert_eq!(verified.status, TransactionStatus::Success);
        assert_eq!(verified.amount_minor, 2500000);
        assert_eq!(verified.currency, "NGN");
        assert_eq!(verified.channel.as_deref(), Some("bank"));
    }

    #[tokio::test]
    async fn test_verify_abandoned() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/transaction/verify/MRD-GONE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "message": "Verification successful",
                "data": {
                    "reference": "MRD-GONE",
                    "status": "abandoned",
                    "amount": 1000,
                    "currency": "NGN"
                }
            })))
            .mount(&server)
            .await;

        let verified = gateway(&server).verify("MRD-GONE").await.unwrap();
        assert!(verified.status.is_failure());
        assert!(verified.channel.is_none());
    }

    #[tokio::test]
    async fn test_verify_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/transaction/verify/MRD-NOPE"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "status": false,
                "message": "Transaction reference not found"
            })))
            .mount(&server)
            .await;

        let err = gateway(&server).verify("MRD-NOPE").await.unwrap_err();
        match err {
            GatewayError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Transaction reference not found");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_verify_garbage_response() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/transaction/verify/MRD-X"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = gateway(&server).verify("MRD-X").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_verify_timeout() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/transaction/verify/MRD-SLOW"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": true, "message": "ok", "data": null}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let gateway =
            PaystackGateway::new(server.uri(), SECRET, Duration::from_millis(200)).unwrap();
        let err = gateway.verify("MRD-SLOW").await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout));
    }

    #[tokio::test]
    async fn test_initialize() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "message": "Authorization URL created",
                "data": {
                    "authorization_url": "https://checkout.paystack.com/abc",
                    "access_code": "abc",
                    "reference": "MRD-NEW"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transaction = gateway(&server)
            .initialize(&InitializeRequest {
                email: "student@example.com".to_string(),
                amount_minor: 500000,
                currency: "NGN".to_string(),
                reference: "MRD-NEW".to_string(),
                callback_url: None,
                metadata: json!({"enrollment_id": "x"}),
            })
            .await
            .unwrap();

        assert_eq!(transaction.authorization_url, "https://checkout.paystack.com/abc");
        assert_eq!(transaction.reference, "MRD-NEW");
    }
}
