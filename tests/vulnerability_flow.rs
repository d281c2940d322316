//! Dependency → catalog lookup → suppression flow, driven through the
//! dispatcher against a local stub of the vulnerability catalog.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, Sender};

use leakhound::analyzer::AnalyzerDispatcher;
use leakhound::config::{Config, SuppressionRule};
use leakhound::metrics::MetricsRegistry;
use leakhound::model::{Diff, Leak, VulnerableDependency};
use leakhound::ossindex::OssIndexClient;

const LOCK_FILE: &str = r#"{
    "dependencies": {
        "foo": { "version": "1.0.0" }
    }
}"#;

const REPORT: &str = r#"[{
    "coordinates": "pkg:npm/foo@1.0.0",
    "vulnerabilities": [{
        "id": "OI-1",
        "title": "Prototype pollution",
        "description": "Deep merge allows proto override",
        "cvssScore": 7.5,
        "cvssVector": "CVSS:3.1/AV:N",
        "cwe": "CWE-1321",
        "cve": "CVE-2020-1",
        "reference": "https://ossindex.sonatype.org/vuln/OI-1"
    }]
}]"#;

// ---------------------------------------------------------------------------
// Stub catalog server
// ---------------------------------------------------------------------------

/// Serve one HTTP request with a canned JSON body, on a random local port.
fn stub_catalog(response_json: &'static str) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let endpoint = format!("http://{}", listener.local_addr().expect("addr"));
    let handle = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        let mut header_end = None;
        let mut content_length = 0usize;
        loop {
            let n = stream.read(&mut chunk).expect("read request");
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..n]);
            if header_end.is_none() {
                if let Some(pos) = find_subsequence(&buffer, b"\r\n\r\n") {
                    header_end = Some(pos + 4);
                    let headers = String::from_utf8_lossy(&buffer[..pos]).to_ascii_lowercase();
                    content_length = headers
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|value| value.trim().parse().ok())
                        .unwrap_or(0);
                }
            }
            if let Some(end) = header_end {
                if buffer.len() >= end + content_length {
                    break;
                }
            }
        }
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{response_json}",
            response_json.len()
        );
        stream.write_all(response.as_bytes()).expect("write response");
    });
    (endpoint, handle)
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Flow {
    dispatcher: AnalyzerDispatcher,
    diff_tx: Sender<Arc<Diff>>,
    vulns_rx: Receiver<VulnerableDependency>,
    _leak_rx: Receiver<Leak>,
    metrics: MetricsRegistry,
}

fn flow(endpoint: &str, suppressions: Vec<SuppressionRule>) -> Flow {
    let mut config = Config {
        suppressions,
        ..Config::default()
    };
    config.common.scan_interval = "1s".to_owned();
    config.common.workers = 1;
    config.validate().expect("config validates");

    let metrics = MetricsRegistry::start(&config.metrics);
    let (diff_tx, diff_rx) = bounded::<Arc<Diff>>(16);
    let (leak_tx, leak_rx) = bounded::<Leak>(16);
    let (vulns_tx, vulns_rx) = bounded::<VulnerableDependency>(16);

    let client = OssIndexClient::new("", "").with_endpoint(endpoint);
    let dispatcher = AnalyzerDispatcher::start_with_client(
        &config, diff_rx, leak_tx, vulns_tx, &metrics, client,
    )
    .expect("dispatcher");

    Flow {
        dispatcher,
        diff_tx,
        vulns_rx,
        _leak_rx: leak_rx,
        metrics,
    }
}

fn manifest_diff() -> Arc<Diff> {
    Arc::new(Diff {
        commit_hash: "c0ffee".to_owned(),
        repo_url: "https://gh/ex/r".to_owned(),
        repo_path: "ex/r".to_owned(),
        file_path: "package-lock.json".to_owned(),
        line_begin: 1,
        content: LOCK_FILE.to_owned(),
        author: "Alice".to_owned(),
        author_email: "alice@example.com".to_owned(),
        timestamp: Utc::now(),
    })
}

impl Flow {
    fn wait_for_stats<F: Fn(u64, u64) -> bool>(&self, check: F) {
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        loop {
            let stats = self.dispatcher.status("https://gh/ex/r");
            if check(stats.vulnerabilities_found, stats.vulnerabilities_suppressed) {
                return;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "stats condition not reached; last: {stats:?}"
            );
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    fn shutdown(self) {
        drop(self.diff_tx);
        self.dispatcher.stop();
        self.metrics.stop();
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn vulnerable_dependency_is_reported() {
    let (endpoint, server) = stub_catalog(REPORT);
    let flow = flow(&endpoint, Vec::new());

    flow.diff_tx.send(manifest_diff()).expect("send diff");

    // Batch timeout (2 s) + lookup round trip.
    let finding = flow
        .vulns_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("vulnerable dependency");
    assert_eq!(finding.dependency_name, "foo");
    assert_eq!(finding.version, "1.0.0");
    assert_eq!(finding.file_path, "package-lock.json");
    assert_eq!(finding.repo_url, "https://gh/ex/r");
    assert_eq!(finding.vulnerabilities.len(), 1);
    assert_eq!(finding.vulnerabilities[0].id, "OI-1");
    assert_eq!(finding.vulnerabilities[0].cve, "CVE-2020-1");
    assert_eq!(finding.vulnerabilities[0].source, "Sonatype OSS Index");

    flow.wait_for_stats(|found, suppressed| found == 1 && suppressed == 0);
    server.join().expect("server served");
    flow.shutdown();
}

#[test]
fn suppression_drops_the_finding_and_counts_it() {
    let (endpoint, server) = stub_catalog(REPORT);
    let suppression = SuppressionRule {
        repository: "ex/r".to_owned(),
        dep_name: "foo".to_owned(),
        dep_version: r"1\.0\.0".to_owned(),
        file_path: "package-lock".to_owned(),
        id: "OI-1".to_owned(),
        ..SuppressionRule::default()
    };
    let flow = flow(&endpoint, vec![suppression]);

    flow.diff_tx.send(manifest_diff()).expect("send diff");

    flow.wait_for_stats(|found, suppressed| found == 0 && suppressed == 1);
    assert!(
        flow.vulns_rx.recv_timeout(Duration::from_millis(300)).is_err(),
        "suppressed vulnerability must not be emitted"
    );
    server.join().expect("server served");
    flow.shutdown();
}
