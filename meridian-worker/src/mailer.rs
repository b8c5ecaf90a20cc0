/// Mail transport
///
/// [`Mailer`] is the seam the dispatcher sends through. [`LettreMailer`] is
/// built once at startup from [`MailConfig`] and wraps either an SMTP relay
/// or, for development, a directory of `.eml` files.

use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;

use crate::config::{MailConfig, MailTransportConfig};

#[derive(Debug, Clone, Error)]
pub enum MailError {
    /// Retrying will not help
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    /// Relay unreachable or refused; worth retrying
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to set up transport: {0}")]
    Setup(String),
}

impl MailError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, MailError::InvalidAddress { .. } | MailError::Build(_))
    }
}

/// A rendered message addressed to one recipient
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to_email: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

enum Transport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

pub struct LettreMailer {
    transport: Transport,
    from: Mailbox,
}

fn mailbox(name: Option<&str>, email: &str) -> Result<Mailbox, MailError> {
    let address = email.parse().map_err(|e: lettre::address::AddressError| {
        MailError::InvalidAddress {
            address: email.to_string(),
            reason: e.to_string(),
        }
    })?;

    Ok(Mailbox::new(name.map(str::to_string), address))
}

impl LettreMailer {
    pub fn from_config(config: &MailConfig) -> Result<Self, MailError> {
        let transport = match &config.transport {
            MailTransportConfig::Smtp {
                host,
                port,
                credentials,
                tls,
            } => {
                let builder = if *tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                        .map_err(|e| MailError::Setup(e.to_string()))?
                } else {
                    tracing::warn!("SMTP TLS is disabled");
                    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                };

                let builder = builder.port(*port);
                let builder = match credentials {
                    Some((user, pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
                    None => builder,
                };

                tracing::info!(host = %host, port = port, "Using SMTP mail transport");
                Transport::Smtp(builder.build())
            }
            MailTransportConfig::File { dir } => {
                std::fs::create_dir_all(dir).map_err(|e| MailError::Setup(e.to_string()))?;
                tracing::info!(dir = %dir.display(), "Using file mail transport");
                Transport::File(AsyncFileTransport::<Tokio1Executor>::new(dir))
            }
        };

        Ok(Self {
            transport,
            from: mailbox(Some(&config.from_name), &config.from_email)?,
        })
    }

    fn build(&self, email: &OutgoingEmail) -> Result<Message, MailError> {
        let to = mailbox(email.to_name.as_deref(), &email.to_email)?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                email.text.clone(),
                email.html.clone(),
            ))
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl Mailer for LettreMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let message = self.build(email)?;

        match &self.transport {
            Transport::Smtp(smtp) => {
                smtp.send(message)
                    .await
                    .map_err(|e| MailError::Transport(e.to_string()))?;
            }
            Transport::File(file) => {
                file.send(message)
                    .await
                    .map_err(|e| MailError::Transport(e.to_string()))?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(to: &str) -> OutgoingEmail {
        OutgoingEmail {
            to_email: to.to_string(),
            to_name: Some("Ada Obi".to_string()),
            subject: "Welcome to Meridian".to_string(),
            html: "<p>Hello</p>".to_string(),
            text: "Hello".to_string(),
        }
    }

    fn file_mailer(dir: &std::path::Path) -> LettreMailer {
        LettreMailer::from_config(&MailConfig {
            transport: MailTransportConfig::File {
                dir: dir.to_path_buf(),
            },
            from_email: "hello@meridian.example".to_string(),
            from_name: "Meridian".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_file_transport_writes_message() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = file_mailer(dir.path());

        mailer.send(&email("ada@example.com")).await.unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().map_or(false, |ext| ext == "eml"))
            .collect();
        assert_eq!(files.len(), 1);

        let raw = std::fs::read_to_string(&files[0]).unwrap();
        assert!(raw.contains("Subject: Welcome to Meridian"));
        assert!(raw.contains("ada@example.com"));
        assert!(raw.contains("hello@meridian.example"));
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = file_mailer(dir.path());

        let err = mailer.send(&email("not an address")).await.unwrap_err();
        assert!(matches!(err, MailError::InvalidAddress { .. }));
        assert!(err.is_permanent());
    }

    #[test]
    fn test_transport_errors_are_retryable() {
        assert!(!MailError::Transport("connection refused".to_string()).is_permanent());
    }
}
