//! HTTP webhook sink.
//!
//! Each leak is posted as a JSON body by a dedicated worker thread so a
//! slow endpoint never blocks the router. Failures are logged and dropped.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, warn};

use super::{Sink, SinkError};
use crate::config::Webhook as WebhookConfig;
use crate::model::Finding;

const QUEUE_CAPACITY: usize = 100;

pub struct WebhookSink {
    tx: Mutex<Option<Sender<Finding>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WebhookSink {
    /// Build the sink and spawn its delivery worker.
    ///
    /// # Errors
    /// [`SinkError::Http`] when the HTTP client cannot be built.
    pub fn new(config: &WebhookConfig) -> Result<Self, SinkError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("leakhound/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        let method = reqwest::Method::from_bytes(config.method.as_bytes())
            .unwrap_or(reqwest::Method::POST);
        let url = config.url.clone();
        let headers = config.headers.clone();

        let (tx, rx) = bounded(QUEUE_CAPACITY);
        let worker = std::thread::spawn(move || deliver_loop(&client, &method, &url, &headers, &rx));
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }
}

fn deliver_loop(
    client: &reqwest::blocking::Client,
    method: &reqwest::Method,
    url: &str,
    headers: &BTreeMap<String, String>,
    rx: &Receiver<Finding>,
) {
    for finding in rx.iter() {
        let Finding::Leak(leak) = finding else {
            continue;
        };
        let mut request = client.request(method.clone(), url).json(&leak);
        for (key, value) in headers {
            request = request.header(key, value);
        }
        match request.send().and_then(reqwest::blocking::Response::error_for_status) {
            Ok(_) => debug!(url, "webhook delivered"),
            Err(err) => warn!(url, error = %err, "webhook delivery failed"),
        }
    }
}

impl Sink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn accepts(&self, finding: &Finding) -> bool {
        matches!(finding, Finding::Leak(_))
    }

    fn send(&self, finding: Finding) -> Result<(), SinkError> {
        let guard = self.tx.lock().expect("webhook queue poisoned");
        let Some(tx) = guard.as_ref() else {
            return Err(SinkError::Stopped);
        };
        match tx.try_send(finding) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SinkError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(SinkError::Stopped),
        }
    }

    fn stop(&self) {
        self.tx.lock().expect("webhook queue poisoned").take();
        if let Some(worker) = self.worker.lock().expect("webhook worker poisoned").take() {
            let _ = worker.join();
        }
    }
}
