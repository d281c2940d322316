//! Batching email sink.
//!
//! Findings accumulate until the batch is full (100) or the configured
//! delay elapses, then one HTML message per recipient group goes out:
//! always to the auditor list, and — when `sent_to_author` is set — one
//! message per commit author with only their findings, subject to the
//! optional recipient regex.
//!
//! The SMTP transport sits behind [`MailTransport`] so tests can record
//! deliveries; the shipped implementation is [`SmtpMailer`] on lettre.

mod batch;
mod smtp;
mod template;

pub use smtp::SmtpMailer;

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{after, bounded, select, Receiver, Sender};
use regex::Regex;
use tracing::{debug, warn};

use super::{Sink, SinkError};
use crate::config::Smtp as SmtpConfig;
use crate::model::{Finding, Leak, VulnerableDependency};

use self::batch::{group_exposures_by_author, group_leaks_by_author};
use self::template::{render_exposures, render_leaks};

const MAX_BATCH_SIZE: usize = 100;
const QUEUE_CAPACITY: usize = 256;

/// Which finding type this sink instance batches. Two instances are
/// registered when email is enabled, one per kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmailKind {
    Leaks,
    Exposures,
}

/// One rendered message ready for the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
}

/// The delivery boundary. `verify` is the sink's start precondition
/// (dial, STARTTLS, auth); `deliver` sends one message.
pub trait MailTransport: Send + Sync {
    /// # Errors
    /// A failure keeps the router from starting.
    fn verify(&self) -> Result<(), SinkError>;

    /// # Errors
    /// Logged per batch by the caller; never retried.
    fn deliver(&self, mail: &OutgoingMail) -> Result<(), SinkError>;
}

/// Recipient policy derived from the SMTP config.
#[derive(Clone)]
struct RecipientPolicy {
    auditors: Vec<String>,
    sent_to_author: bool,
    recipient_regex: Option<Regex>,
}

impl RecipientPolicy {
    fn from_config(config: &SmtpConfig) -> Result<Self, SinkError> {
        let auditors = config
            .recipient
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        let recipient_regex = if config.recipient_regex.is_empty() {
            None
        } else {
            Some(
                Regex::new(&config.recipient_regex).map_err(|e| SinkError::Smtp {
                    message: format!("invalid recipient_regex: {e}"),
                })?,
            )
        };
        Ok(Self {
            auditors,
            sent_to_author: config.sent_to_author,
            recipient_regex,
        })
    }

    fn author_allowed(&self, email: &str) -> bool {
        self.recipient_regex
            .as_ref()
            .is_none_or(|re| re.is_match(email))
    }
}

pub struct EmailSink {
    kind: EmailKind,
    transport: Arc<dyn MailTransport>,
    tx: Mutex<Option<Sender<Finding>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EmailSink {
    /// Build the sink and spawn its batcher thread.
    ///
    /// # Errors
    /// [`SinkError`] when the recipient regex does not compile.
    pub fn new(
        kind: EmailKind,
        config: &SmtpConfig,
        transport: Arc<dyn MailTransport>,
    ) -> Result<Self, SinkError> {
        let policy = RecipientPolicy::from_config(config)?;
        let delay = config.delay_value;
        let (tx, rx) = bounded(QUEUE_CAPACITY);
        let batcher_transport = Arc::clone(&transport);
        let worker = std::thread::spawn(move || {
            batch_loop(kind, delay, &policy, batcher_transport.as_ref(), &rx);
        });
        Ok(Self {
            kind,
            transport,
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }
}

impl Sink for EmailSink {
    fn name(&self) -> &'static str {
        match self.kind {
            EmailKind::Leaks => "email-leaks",
            EmailKind::Exposures => "email-exposures",
        }
    }

    fn start(&self) -> Result<(), SinkError> {
        self.transport.verify()
    }

    fn accepts(&self, finding: &Finding) -> bool {
        matches!(
            (self.kind, finding),
            (EmailKind::Leaks, Finding::Leak(_))
                | (EmailKind::Exposures, Finding::Exposure(_))
        )
    }

    fn send(&self, finding: Finding) -> Result<(), SinkError> {
        let guard = self.tx.lock().expect("email queue poisoned");
        let Some(tx) = guard.as_ref() else {
            return Err(SinkError::Stopped);
        };
        tx.try_send(finding).map_err(|_| SinkError::QueueFull)
    }

    fn stop(&self) {
        // Closing the queue makes the batcher flush its in-flight batch.
        self.tx.lock().expect("email queue poisoned").take();
        if let Some(worker) = self.worker.lock().expect("email worker poisoned").take() {
            let _ = worker.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Batcher
// ---------------------------------------------------------------------------

fn batch_loop(
    kind: EmailKind,
    delay: Duration,
    policy: &RecipientPolicy,
    transport: &dyn MailTransport,
    rx: &Receiver<Finding>,
) {
    loop {
        // The batch window opens at the first finding.
        let first = match rx.recv() {
            Ok(finding) => finding,
            Err(_) => return,
        };
        let mut batch = vec![first];
        let deadline = after(delay);
        let mut closing = false;
        loop {
            select! {
                recv(deadline) -> _ => break,
                recv(rx) -> finding => match finding {
                    Ok(finding) => {
                        batch.push(finding);
                        if batch.len() >= MAX_BATCH_SIZE {
                            break;
                        }
                    }
                    Err(_) => {
                        closing = true;
                        break;
                    }
                },
            }
        }
        fire(kind, policy, transport, batch);
        if closing {
            return;
        }
    }
}

fn fire(
    kind: EmailKind,
    policy: &RecipientPolicy,
    transport: &dyn MailTransport,
    batch: Vec<Finding>,
) {
    match kind {
        EmailKind::Leaks => {
            let leaks: Vec<Leak> = batch
                .into_iter()
                .filter_map(|f| match f {
                    Finding::Leak(leak) => Some(leak),
                    Finding::Exposure(_) => None,
                })
                .collect();
            if leaks.is_empty() {
                return;
            }
            if !policy.auditors.is_empty() {
                deliver(transport, policy.auditors.clone(), render_leaks(&leaks));
            }
            if policy.sent_to_author {
                for (author, theirs) in group_leaks_by_author(&leaks) {
                    if !policy.author_allowed(&author) {
                        continue;
                    }
                    deliver(transport, vec![author], render_leaks(&theirs));
                }
            }
        }
        EmailKind::Exposures => {
            let exposures: Vec<VulnerableDependency> = batch
                .into_iter()
                .filter_map(|f| match f {
                    Finding::Exposure(dep) => Some(dep),
                    Finding::Leak(_) => None,
                })
                .collect();
            if exposures.is_empty() {
                return;
            }
            if !policy.auditors.is_empty() {
                deliver(
                    transport,
                    policy.auditors.clone(),
                    render_exposures(&exposures),
                );
            }
            if policy.sent_to_author {
                for (author, theirs) in group_exposures_by_author(&exposures) {
                    if !policy.author_allowed(&author) {
                        continue;
                    }
                    deliver(transport, vec![author], render_exposures(&theirs));
                }
            }
        }
    }
}

fn deliver(transport: &dyn MailTransport, to: Vec<String>, rendered: (String, String)) {
    let (subject, html_body) = rendered;
    let mail = OutgoingMail {
        to,
        subject,
        html_body,
    };
    match transport.deliver(&mail) {
        Ok(()) => debug!(recipients = mail.to.len(), subject = %mail.subject, "mail sent"),
        Err(err) => warn!(error = %err, "cannot send mail"),
    }
}
