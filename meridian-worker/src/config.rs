/// Worker configuration
///
/// Loaded from environment variables (and a `.env` file in development).
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 5)
/// - `EMAIL_FILE_DIR`: write emails as `.eml` files here instead of using SMTP
/// - `SMTP_HOST`: SMTP relay (required unless `EMAIL_FILE_DIR` is set)
/// - `SMTP_PORT`: (default: 587)
/// - `SMTP_USERNAME`, `SMTP_PASSWORD`: credentials (optional)
/// - `SMTP_TLS`: STARTTLS on or off (default: true)
/// - `EMAIL_FROM`: sender address (required)
/// - `EMAIL_FROM_NAME`: sender display name (default: Meridian)
/// - `EMAIL_POLL_SECS`: idle poll interval (default: 5)
/// - `EMAIL_BATCH_SIZE`: jobs claimed per poll (default: 20)
/// - `EMAIL_SEND_DELAY_MS`: pause between two sends (default: 1000)
/// - `EMAIL_MAX_ATTEMPTS`: attempts before a job is marked failed (default: 5)

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub mail: MailConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub transport: MailTransportConfig,
    pub from_email: String,
    pub from_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MailTransportConfig {
    Smtp {
        host: String,
        port: u16,
        credentials: Option<(String, String)>,
        tls: bool,
    },
    /// Development transport, one `.eml` file per message
    File { dir: PathBuf },
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    /// Pause after every send so the relay is never flooded
    pub send_delay: Duration,
    pub max_attempts: i32,
    /// `sending` rows older than this are assumed abandoned by a dead worker
    pub stale_after: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 20,
            send_delay: Duration::from_millis(1000),
            max_attempts: 5,
            stale_after: Duration::from_secs(600),
        }
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

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &str) -> anyhow::Result<String> {
    optional(name).ok_or_else(|| anyhow::anyhow!("{} environment variable is required", name))
}

impl MailTransportConfig {
    fn from_env() -> anyhow::Result<Self> {
        if let Some(dir) = optional("EMAIL_FILE_DIR") {
            return Ok(MailTransportConfig::File { dir: dir.into() });
        }

        let credentials = match (optional("SMTP_USERNAME"), optional("SMTP_PASSWORD")) {
            (Some(user), Some(pass)) => Some((user, pass)),
            (None, None) => None,
            _ => anyhow::bail!("SMTP_USERNAME and SMTP_PASSWORD must be set together"),
        };

        Ok(MailTransportConfig::Smtp {
            host: required("SMTP_HOST")
                .map_err(|_| anyhow::anyhow!("SMTP_HOST or EMAIL_FILE_DIR must be set"))?,
            port: var_or("SMTP_PORT", "587")?,
            credentials,
            tls: var_or("SMTP_TLS", "true")?,
        })
    }
}

impl WorkerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: required("DATABASE_URL")?,
            max_connections: var_or("DATABASE_MAX_CONNECTIONS", "5")?,
            mail: MailConfig {
                transport: MailTransportConfig::from_env()?,
                from_email: required("EMAIL_FROM")?,
                from_name: env::var("EMAIL_FROM_NAME").unwrap_or_else(|_| "Meridian".to_string()),
            },
            dispatch: DispatchConfig {
                poll_interval: Duration::from_secs(var_or("EMAIL_POLL_SECS", "5")?),
                batch_size: var_or("EMAIL_BATCH_SIZE", "20")?,
                send_delay: Duration::from_millis(var_or("EMAIL_SEND_DELAY_MS", "1000")?),
                max_attempts: var_or("EMAIL_MAX_ATTEMPTS", "5")?,
                ..DispatchConfig::default()
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.dispatch.batch_size < 1 {
            anyhow::bail!("EMAIL_BATCH_SIZE must be at least 1");
        }

        if self.dispatch.max_attempts < 1 {
            anyhow::bail!("EMAIL_MAX_ATTEMPTS must be at least 1");
        }

        if self.dispatch.poll_interval.is_zero() {
            anyhow::bail!("EMAIL_POLL_SECS must be greater than zero");
        }

        if !self.mail.from_email.contains('@') {
            anyhow::bail!("EMAIL_FROM must be an email address");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WorkerConfig {
        WorkerConfig {
            database_url: "postgresql://localhost/meridian".to_string(),
            max_connections: 5,
            mail: MailConfig {
                transport: MailTransportConfig::File {
                    dir: PathBuf::from("/tmp/meridian-mail"),
                },
                from_email: "hello@meridian.example".to_string(),
                from_name: "Meridian".to_string(),
            },
            dispatch: DispatchConfig::default(),
        }
    }

    #[test]
    fn test_default_dispatch() {
        let dispatch = DispatchConfig::default();
        assert_eq!(dispatch.send_delay, Duration::from_millis(1000));
        assert_eq!(dispatch.stale_after, Duration::from_secs(600));
        assert_eq!(dispatch.max_attempts, 5);
    }

    #[test]
    fn test_validate() {
        assert!(config().validate().is_ok());

        let mut bad = config();
        bad.dispatch.batch_size = 0;
        assert!(bad.validate().is_err());

        let mut bad = config();
        bad.mail.from_email = "meridian".to_string();
        assert!(bad.validate().is_err());
    }
}
