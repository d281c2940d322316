//! lettre-backed SMTP transport.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use super::{MailTransport, OutgoingMail};
use crate::config::Smtp as SmtpConfig;
use crate::senders::SinkError;

/// Sends mail over SMTP. With `tls` enabled the connection upgrades via
/// STARTTLS with certificate verification; without it the transport
/// speaks plaintext (lab setups).
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: String,
}

impl SmtpMailer {
    /// # Errors
    /// [`SinkError::Smtp`] when the relay cannot be configured.
    pub fn new(config: &SmtpConfig) -> Result<Self, SinkError> {
        let mut builder = if config.tls {
            SmtpTransport::starttls_relay(&config.host).map_err(|e| SinkError::Smtp {
                message: e.to_string(),
            })?
        } else {
            SmtpTransport::builder_dangerous(&config.host)
        };
        if config.port != 0 {
            builder = builder.port(config.port);
        }
        if !config.password.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }
        Ok(Self {
            transport: builder.build(),
            from: config.mail_from.clone(),
        })
    }

    fn mailbox(address: &str) -> Result<Mailbox, SinkError> {
        address.parse().map_err(|e: lettre::address::AddressError| {
            SinkError::Address {
                address: address.to_owned(),
                message: e.to_string(),
            }
        })
    }
}

impl MailTransport for SmtpMailer {
    fn verify(&self) -> Result<(), SinkError> {
        match self.transport.test_connection() {
            Ok(true) => Ok(()),
            Ok(false) => Err(SinkError::Smtp {
                message: "smtp server did not respond to NOOP".to_owned(),
            }),
            Err(e) => Err(SinkError::Smtp {
                message: e.to_string(),
            }),
        }
    }

    fn deliver(&self, mail: &OutgoingMail) -> Result<(), SinkError> {
        let mut builder = Message::builder()
            .from(Self::mailbox(&self.from)?)
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_HTML);
        for recipient in &mail.to {
            builder = builder.to(Self::mailbox(recipient)?);
        }
        let message = builder
            .body(mail.html_body.clone())
            .map_err(|e| SinkError::Smtp {
                message: e.to_string(),
            })?;
        self.transport.send(&message).map_err(|e| SinkError::Smtp {
            message: e.to_string(),
        })?;
        Ok(())
    }
}
