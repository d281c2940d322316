//! Counter registry with optional Graphite export.
//!
//! The pipeline publishes exactly two counters (`leaks.found`,
//! `vulnerabilities.found`). When a Graphite address and prefix are
//! configured, a publisher thread writes the plaintext line protocol
//! (`<prefix>.<name> <value> <epoch>\n`) on every send interval; otherwise
//! the counters are plain atomics that nobody reads.

use std::io::Write;
use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use tracing::{debug, warn};

use crate::config::Metrics as MetricsConfig;

/// A monotonically increasing counter. Cheap to clone; all clones share
/// one cell.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicU64>);

impl Counter {
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    #[must_use]
    pub fn value(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

type CounterTable = Arc<Mutex<Vec<(String, Counter)>>>;

/// Counter registry plus the optional publisher thread.
pub struct MetricsRegistry {
    counters: CounterTable,
    dying: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MetricsRegistry {
    /// Start the registry. Spawns the Graphite publisher only when the
    /// configuration names an address and prefix.
    #[must_use]
    pub fn start(config: &MetricsConfig) -> Self {
        let counters: CounterTable = Arc::new(Mutex::new(Vec::new()));
        if !config.is_enabled() {
            return Self {
                counters,
                dying: Mutex::new(None),
                worker: Mutex::new(None),
            };
        }

        let address = config.graphite_address.clone();
        let prefix = config.prefix.trim_end_matches('.').to_owned();
        let interval = config.send_interval_value.max(Duration::from_secs(1));
        let table = Arc::clone(&counters);
        let (dying_tx, dying_rx) = bounded::<()>(0);
        let worker = std::thread::spawn(move || publish_loop(&address, &prefix, interval, &table, &dying_rx));

        Self {
            counters,
            dying: Mutex::new(Some(dying_tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Create or fetch the counter registered under `name`.
    ///
    /// # Panics
    ///
    /// Panics if the counter table mutex is poisoned.
    #[must_use]
    pub fn counter(&self, name: &str) -> Counter {
        let mut table = self.counters.lock().expect("metrics table poisoned");
        if let Some((_, counter)) = table.iter().find(|(n, _)| n == name) {
            return counter.clone();
        }
        let counter = Counter::default();
        table.push((name.to_owned(), counter.clone()));
        counter
    }

    /// Final flush and publisher shutdown. Idempotent; a no-op without a
    /// publisher.
    ///
    /// # Panics
    ///
    /// Panics if the publisher handle mutex is poisoned.
    pub fn stop(&self) {
        self.dying
            .lock()
            .expect("metrics shutdown handle poisoned")
            .take();
        if let Some(worker) = self
            .worker
            .lock()
            .expect("metrics worker handle poisoned")
            .take()
        {
            let _ = worker.join();
        }
    }
}

fn publish_loop(
    address: &str,
    prefix: &str,
    interval: Duration,
    counters: &CounterTable,
    dying: &Receiver<()>,
) {
    let ticker = tick(interval);
    loop {
        select! {
            recv(dying) -> _ => {
                flush(address, prefix, counters);
                return;
            }
            recv(ticker) -> _ => flush(address, prefix, counters),
        }
    }
}

fn flush(address: &str, prefix: &str, counters: &CounterTable) {
    let snapshot: Vec<(String, u64)> = {
        let table = counters.lock().expect("metrics table poisoned");
        table.iter().map(|(n, c)| (n.clone(), c.value())).collect()
    };
    if snapshot.is_empty() {
        return;
    }
    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut payload = String::new();
    for (name, value) in snapshot {
        payload.push_str(&format!("{prefix}.{name} {value} {epoch}\n"));
    }
    match TcpStream::connect(address) {
        Ok(mut stream) => {
            if let Err(err) = stream.write_all(payload.as_bytes()) {
                warn!(address, error = %err, "graphite write failed");
            } else {
                debug!(address, bytes = payload.len(), "metrics published");
            }
        }
        Err(err) => warn!(address, error = %err, "graphite connect failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled_registry() -> MetricsRegistry {
        MetricsRegistry::start(&MetricsConfig::default())
    }

    #[test]
    fn counters_accumulate() {
        let registry = disabled_registry();
        let counter = registry.counter("leaks.found");
        counter.add(2);
        counter.add(3);
        assert_eq!(counter.value(), 5);
        registry.stop();
    }

    #[test]
    fn same_name_shares_one_cell() {
        let registry = disabled_registry();
        let a = registry.counter("leaks.found");
        let b = registry.counter("leaks.found");
        a.add(1);
        assert_eq!(b.value(), 1);
        registry.stop();
    }

    #[test]
    fn publisher_flushes_to_graphite() {
        use std::io::Read;
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let address = listener.local_addr().expect("addr").to_string();
        let accept = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut buffer = String::new();
            let _ = stream.read_to_string(&mut buffer);
            buffer
        });

        let mut config = MetricsConfig {
            graphite_address: address,
            prefix: "leakhound.".to_owned(),
            send_interval: "1h".to_owned(),
            ..MetricsConfig::default()
        };
        config.send_interval_value = Duration::from_secs(3600);

        let registry = MetricsRegistry::start(&config);
        registry.counter("leaks.found").add(4);
        registry.stop(); // final flush on shutdown

        let payload = accept.join().expect("join");
        assert!(payload.contains("leakhound.leaks.found 4 "));
    }
}
