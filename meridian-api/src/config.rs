/// Configuration management for the API server
///
/// Loaded from environment variables (and a `.env` file in development).
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `CORS_ORIGINS`: comma-separated origins, `*` for any (default: *)
/// - `PRODUCTION`: enables HSTS (default: false)
/// - `FRONTEND_URL`: base for links in emails (default: http://localhost:3000)
/// - `JWT_SECRET`: Secret key for JWT signing (required, at least 32 characters)
/// - `PAYSTACK_SECRET_KEY`: gateway secret, also the webhook signing key (required)
/// - `PAYSTACK_BASE_URL`: gateway API base (default: https://api.paystack.co)
/// - `PAYMENT_TIMEOUT_SECS`: timeout for every gateway call (default: 15)
/// - `CURRENCY`: currency for new payments (default: NGN)
/// - `APPOINTMENT_FEE_MINOR`: appointment fee in minor units (default: 2000000)
///
/// # Example
///
/// ```no_run
/// use meridian_api::config::Config;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}:{}", config.api.host, config.api.port);
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT configuration
    pub jwt: JwtConfig,

    /// Payment gateway configuration
    pub payment: PaymentConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Allowed CORS origins; `["*"]` allows any
    pub cors_origins: Vec<String>,

    /// Production mode (HSTS on)
    pub production: bool,

    /// Public frontend, used to build links in emails
    pub frontend_url: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// Must be at least 32 bytes. Generate with: `openssl rand -hex 32`
    #[serde(skip_serializing)]
    pub secret: String,
}

/// Payment gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    #[serde(skip_serializing)]
    pub secret_key: String,

    pub base_url: String,

    /// Timeout applied to every gateway call
    pub timeout_secs: u64,

    /// ISO 4217 code for new payments
    pub currency: String,

    /// Appointment fee in minor units
    pub appointment_fee_minor: i64,
}

impl PaymentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn var_or<T>(name: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", name, e))
}

fn required(name: &str) -> anyhow::Result<String> {
    env::var(name).map_err(|_| anyhow::anyhow!("{} environment variable is required", name))
}

/// Splits a comma-separated list, dropping blanks
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing
    /// - Environment variables have invalid values
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let config = Self {
            api: ApiConfig {
                host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: var_or("API_PORT", "8080")?,
                cors_origins: parse_list(&env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string())),
                production: var_or("PRODUCTION", "false")?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string())
                    .trim_end_matches('/')
                    .to_string(),
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                max_connections: var_or("DATABASE_MAX_CONNECTIONS", "10")?,
            },
            jwt: JwtConfig {
                secret: required("JWT_SECRET")?,
            },
            payment: PaymentConfig {
                secret_key: required("PAYSTACK_SECRET_KEY")?,
                base_url: env::var("PAYSTACK_BASE_URL")
                    .unwrap_or_else(|_| "https://api.paystack.co".to_string()),
                timeout_secs: var_or("PAYMENT_TIMEOUT_SECS", "15")?,
                currency: env::var("CURRENCY").unwrap_or_else(|_| "NGN".to_string()),
                appointment_fee_minor: var_or("APPOINTMENT_FEE_MINOR", "2000000")?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.jwt.secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        if self.payment.timeout_secs == 0 {
            anyhow::bail!("PAYMENT_TIMEOUT_SECS must be greater than zero");
        }

        if self.payment.appointment_fee_minor <= 0 {
            anyhow::bail!("APPOINTMENT_FEE_MINOR must be positive");
        }

        if self.payment.currency.len() != 3 {
            anyhow::bail!("CURRENCY must be a 3-letter ISO 4217 code");
        }

        if self.api.cors_origins.is_empty() {
            anyhow::bail!("CORS_ORIGINS must list at least one origin (or *)");
        }

        Ok(())
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Whether any origin may call the API
    pub fn cors_allows_any(&self) -> bool {
        self.api.cors_origins.iter().any(|o| o == "*")
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            production: false,
            frontend_url: "http://localhost:3000".to_string(),
        },
        database: DatabaseConfig {
            url: "postgresql://localhost/meridian_test".to_string(),
            max_connections: 5,
        },
        jwt: JwtConfig {
            secret: "test-secret-key-at-least-32-bytes-long".to_string(),
        },
        payment: PaymentConfig {
            secret_key: "sk_test_meridian".to_string(),
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 1,
            currency: "NGN".to_string(),
            appointment_fee_minor: 2_000_000,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address() {
        assert_eq!(test_config().bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list("https://a.example, https://b.example,,"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(parse_list("  ").is_empty());
    }

    #[test]
    fn test_validate() {
        let mut config = test_config();
        assert!(config.validate().is_ok());
        assert!(config.cors_allows_any());

        config.jwt.secret = "short".to_string();
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.payment.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.payment.currency = "NAIRA".to_string();
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.api.cors_origins = vec!["https://meridian.example".to_string()];
        assert!(config.validate().is_ok());
        assert!(!config.cors_allows_any());
    }
}
