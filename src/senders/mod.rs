//! Notification sinks.
//!
//! A sink is a small capability set — `start`, `accepts`, `send`, `stop` —
//! registered with the router. `send` must not block the pipeline: sinks
//! either write locally (file) or enqueue into their own worker (webhook,
//! email). New transports are added by implementing [`Sink`] and
//! registering with the router; there is no hierarchy.

pub mod email;
pub mod file;
pub mod webhook;

pub use file::FileSink;
pub use webhook::WebhookSink;

use thiserror::Error;

use crate::model::Finding;

/// A delivery failure. Logged per batch; never retried, never blocking.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("smtp: {message}")]
    Smtp { message: String },

    #[error("invalid mail address `{address}`: {message}")]
    Address { address: String, message: String },

    #[error("sink is stopped")]
    Stopped,

    #[error("sink queue is full")]
    QueueFull,
}

/// The sink capability set.
pub trait Sink: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &'static str;

    /// Optional precondition check (dial SMTP, etc.). Called once before
    /// any `send`.
    ///
    /// # Errors
    /// A failure here keeps the router from starting.
    fn start(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Whether this sink handles the given finding type.
    fn accepts(&self, finding: &Finding) -> bool;

    /// Enqueue one finding. Must not block.
    ///
    /// # Errors
    /// [`SinkError`] when the finding cannot be accepted; the router logs
    /// and drops it.
    fn send(&self, finding: Finding) -> Result<(), SinkError>;

    /// Flush buffered findings and shut down.
    fn stop(&self);
}
