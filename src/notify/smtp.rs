//! Report delivery through a plain SMTP relay.

#![allow(missing_docs)]

use std::path::Path;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::{Address, Message, SmtpTransport, Transport};
use tracing::info;

use crate::core::config::MailConfig;
use crate::core::errors::{MoverError, Result};
use crate::notify::{Notifier, read_attachment};

pub struct SmtpNotifier {
    from: Mailbox,
    to: Vec<Mailbox>,
    host: String,
    port: u16,
    /// File name the log is attached under.
    attachment_name: String,
}

impl SmtpNotifier {
    pub fn new(mail: &MailConfig, attachment_name: &str) -> Result<Self> {
        let sender: Address = mail.sender.parse().map_err(|err| MoverError::InvalidConfig {
            details: format!("mail.sender {:?}: {err}", mail.sender),
        })?;
        let to = mail
            .receivers
            .iter()
            .filter(|addr| !addr.is_empty())
            .map(|addr| {
                addr.parse::<Mailbox>()
                    .map_err(|err| MoverError::InvalidConfig {
                        details: format!("mail.receiver {addr:?}: {err}"),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            from: Mailbox::new(Some(mail.from_name.clone()), sender),
            to,
            host: mail.smtp_host.clone(),
            port: mail.smtp_port,
            attachment_name: attachment_name.to_string(),
        })
    }

    /// Build the message; with an attachment it becomes `multipart/mixed`.
    pub fn build_message(
        &self,
        subject: &str,
        body: &str,
        attachment: Option<Vec<u8>>,
    ) -> Result<Message> {
        let mut builder = Message::builder().from(self.from.clone()).subject(subject);
        for receiver in &self.to {
            builder = builder.to(receiver.clone());
        }

        let built = match attachment {
            Some(data) => builder.multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(body.to_string()))
                    .singlepart(
                        Attachment::new(self.attachment_name.clone())
                            .body(data, ContentType::TEXT_PLAIN),
                    ),
            ),
            None => builder.header(ContentType::TEXT_PLAIN).body(body.to_string()),
        };
        built.map_err(|err| MoverError::Notification {
            details: format!("could not build report mail: {err}"),
        })
    }
}

impl Notifier for SmtpNotifier {
    fn send(&self, subject: &str, body: &str, attachment: Option<&Path>) -> Result<()> {
        let data = attachment.map(read_attachment).transpose()?;
        let message = self.build_message(subject, body, data)?;

        let transport = SmtpTransport::builder_dangerous(&self.host)
            .port(self.port)
            .build();
        transport
            .send(&message)
            .map_err(|err| MoverError::Notification {
                details: format!("smtp {}:{}: {err}", self.host, self.port),
            })?;

        let receivers: Vec<String> = self.to.iter().map(ToString::to_string).collect();
        info!(subject, to = %receivers.join(", "), "report mail sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SmtpNotifier;
    use crate::core::config::MailConfig;
    use crate::core::errors::MoverError;
    use crate::notify::Notifier;
    use std::path::Path;

    fn mail() -> MailConfig {
        MailConfig {
            enabled: true,
            from_name: "Cold Backup".to_string(),
            sender: "backup@example.org".to_string(),
            receivers: vec!["ops@example.org".to_string(), "admin@example.org".to_string()],
            smtp_host: "127.0.0.1".to_string(),
            smtp_port: 25,
        }
    }

    #[test]
    fn message_with_attachment_is_multipart() {
        let notifier = SmtpNotifier::new(&mail(), "mover.log").unwrap();
        let message = notifier
            .build_message("[SUCCESS] Cold Backup", "all done", Some(b"log body".to_vec()))
            .unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).into_owned();
        assert!(raw.contains("Subject: [SUCCESS] Cold Backup"), "{raw}");
        assert!(raw.contains("multipart/mixed"), "{raw}");
        assert!(raw.contains("mover.log"), "{raw}");
        assert!(raw.contains("ops@example.org"), "{raw}");
        assert!(raw.contains("admin@example.org"), "{raw}");
    }

    #[test]
    fn message_without_attachment_is_plain() {
        let notifier = SmtpNotifier::new(&mail(), "mover.log").unwrap();
        let message = notifier.build_message("s", "body text", None).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).into_owned();
        assert!(!raw.contains("multipart"), "{raw}");
        assert!(raw.contains("body text"), "{raw}");
    }

    #[test]
    fn invalid_sender_is_config_error() {
        let mut cfg = mail();
        cfg.sender = "not an address".to_string();
        let err = SmtpNotifier::new(&cfg, "mover.log").err().expect("bad sender");
        assert!(matches!(err, MoverError::InvalidConfig { .. }));
    }

    #[test]
    fn missing_attachment_aborts_before_connecting() {
        let notifier = SmtpNotifier::new(&mail(), "mover.log").unwrap();
        let err = notifier
            .send("s", "b", Some(Path::new("/nonexistent/mover.log")))
            .expect_err("attachment missing");
        assert!(matches!(err, MoverError::AttachmentMissing { .. }));
    }
}
