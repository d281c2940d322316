//! Finding router.
//!
//! One receiver thread multiplexes the leak and vulnerable-dependency
//! channels and offers every finding to every registered sink that
//! accepts its type. Sink failures are logged and dropped — the pipeline
//! is never blocked by a slow or broken transport.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{select, Receiver};
use tracing::{debug, warn};

use crate::config::Config;
use crate::model::{Finding, Leak, VulnerableDependency};
use crate::senders::email::{EmailKind, EmailSink, MailTransport, SmtpMailer};
use crate::senders::{FileSink, Sink, SinkError, WebhookSink};
use crate::shutdown::Shutdown;

pub struct Router {
    sinks: Arc<Vec<Box<dyn Sink>>>,
    shutdown: Shutdown,
    receiver: Option<JoinHandle<()>>,
}

impl Router {
    /// Build the configured sinks, run their start checks, and launch the
    /// receiver thread.
    ///
    /// # Errors
    /// The first sink whose precondition check fails (e.g. SMTP dial).
    pub fn start(
        config: &Config,
        leak_rx: Receiver<Leak>,
        vulns_rx: Receiver<VulnerableDependency>,
    ) -> Result<Self, SinkError> {
        let mut sinks: Vec<Box<dyn Sink>> = Vec::new();

        sinks.push(Box::new(FileSink::new(
            &config.common.leaks_file,
            &config.common.vulnerabilities_file,
        )));

        if config.webhook.enable {
            sinks.push(Box::new(WebhookSink::new(&config.webhook)?));
        }

        if config.smtp.enable {
            let transport: Arc<dyn MailTransport> = Arc::new(SmtpMailer::new(&config.smtp)?);
            sinks.push(Box::new(EmailSink::new(
                EmailKind::Leaks,
                &config.smtp,
                Arc::clone(&transport),
            )?));
            sinks.push(Box::new(EmailSink::new(
                EmailKind::Exposures,
                &config.smtp,
                transport,
            )?));
        }

        Self::start_with_sinks(sinks, leak_rx, vulns_rx)
    }

    /// [`start`](Self::start) with caller-provided sinks (tests, embedders).
    ///
    /// # Errors
    /// The first sink whose precondition check fails.
    pub fn start_with_sinks(
        sinks: Vec<Box<dyn Sink>>,
        leak_rx: Receiver<Leak>,
        vulns_rx: Receiver<VulnerableDependency>,
    ) -> Result<Self, SinkError> {
        for sink in &sinks {
            sink.start()?;
            debug!(sink = sink.name(), "sink started");
        }

        let sinks = Arc::new(sinks);
        let shutdown = Shutdown::new();
        let dying = shutdown.subscribe();
        let routed = Arc::clone(&sinks);
        let receiver = std::thread::spawn(move || {
            loop {
                let finding = select! {
                    recv(dying.receiver()) -> _ => return,
                    recv(leak_rx) -> leak => match leak {
                        Ok(leak) => Finding::Leak(leak),
                        Err(_) => return,
                    },
                    recv(vulns_rx) -> dep => match dep {
                        Ok(dep) => Finding::Exposure(dep),
                        Err(_) => return,
                    },
                };
                for sink in routed.iter() {
                    if !sink.accepts(&finding) {
                        continue;
                    }
                    if let Err(err) = sink.send(finding.clone()) {
                        warn!(sink = sink.name(), error = %err, "sink send failed");
                    }
                }
            }
        });

        Ok(Self {
            sinks,
            shutdown,
            receiver: Some(receiver),
        })
    }

    /// Stop the receiver, then flush and stop every sink.
    pub fn stop(mut self) {
        self.shutdown.signal();
        if let Some(receiver) = self.receiver.take() {
            let _ = receiver.join();
        }
        for sink in self.sinks.iter() {
            sink.stop();
            debug!(sink = sink.name(), "sink stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use chrono::Utc;
    use crossbeam_channel::bounded;

    use super::*;

    struct RecordingSink {
        seen: Arc<Mutex<Vec<String>>>,
        leaks_only: bool,
    }

    impl Sink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }
        fn accepts(&self, finding: &Finding) -> bool {
            !self.leaks_only || matches!(finding, Finding::Leak(_))
        }
        fn send(&self, finding: Finding) -> Result<(), SinkError> {
            self.seen
                .lock()
                .expect("recorder poisoned")
                .push(finding.repo_url().to_owned());
            Ok(())
        }
        fn stop(&self) {}
    }

    fn leak(repo_url: &str) -> Leak {
        Leak {
            pattern_name: "pw".to_owned(),
            pattern_regex: String::new(),
            file_path: "x.conf".to_owned(),
            repo_path: String::new(),
            leak_string: "password=x".to_owned(),
            repo_url: repo_url.to_owned(),
            commit_hash: String::new(),
            timestamp: Utc::now(),
            line: 0,
            commit_author: String::new(),
            commit_email: String::new(),
        }
    }

    #[test]
    fn findings_reach_accepting_sinks() {
        let (leak_tx, leak_rx) = bounded(1);
        let (_vulns_tx, vulns_rx) = bounded::<VulnerableDependency>(1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = RecordingSink {
            seen: Arc::clone(&seen),
            leaks_only: true,
        };
        let router = Router::start_with_sinks(vec![Box::new(sink)], leak_rx, vulns_rx)
            .expect("router");

        leak_tx.send(leak("https://a")).expect("send");
        std::thread::sleep(Duration::from_millis(200));
        router.stop();

        assert_eq!(*seen.lock().expect("recorder poisoned"), vec!["https://a".to_owned()]);
    }
}
