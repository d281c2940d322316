//! The leakhound daemon.
//!
//! Wires the pipeline together — state store, notification router,
//! analyzer dispatcher, scan manager — then parks in a signal loop:
//! SIGHUP reloads the configuration in place, SIGINT/SIGTERM shut the
//! components down in reverse start order.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use crossbeam_channel::{bounded, select, tick};
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use leakhound::analyzer::{AnalyzerDispatcher, StatsProbe};
use leakhound::config::{Config, Logging};
use leakhound::duration::pretty_duration;
use leakhound::metrics::MetricsRegistry;
use leakhound::model::{Diff, Leak, VulnerableDependency};
use leakhound::router::Router;
use leakhound::scanmanager::{ScanManager, ScanProbe};
use leakhound::shutdown::{Shutdown, ShutdownSignal};
use leakhound::state::{FileStateStore, StateManager};

/// Capacity of the scan-manager → analyzer diff channel. Bounded so a slow
/// analyzer stalls the commit walker instead of growing memory.
const DIFF_BUFFER: usize = 100;
const STATUS_INTERVAL: Duration = Duration::from_secs(10);
const DIAGNOSTICS_ADDR: &str = "0.0.0.0:6060";

/// Background scanner hunting leaked secrets and vulnerable dependencies
/// in git history.
#[derive(Parser)]
#[command(name = "leakhound")]
#[command(version, about)]
struct Cli {
    /// Config file location
    #[arg(long, default_value = "config.yml")]
    config: PathBuf,

    /// Refresh scan state for all repositories without emitting findings,
    /// then exit
    #[arg(long)]
    skip_scan: bool,

    /// Print a default config skeleton to stdout and exit
    #[arg(long)]
    default_config: bool,

    /// Expose a diagnostic HTTP endpoint on :6060
    #[arg(long)]
    pprof: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.default_config {
        let skeleton = Config::default_skeleton()
            .to_yaml()
            .context("cannot render default config")?;
        print!("{skeleton}");
        return Ok(());
    }

    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    let _log_guard = init_logging(&config.logging)?;

    let state = Arc::new(
        FileStateStore::start(PathBuf::from(&config.common.state_file))
            .context("cannot start state store")?,
    );

    let (diff_tx, diff_rx) = bounded::<Arc<Diff>>(DIFF_BUFFER);
    let (leak_tx, leak_rx) = bounded::<Leak>(1);
    let (vulns_tx, vulns_rx) = bounded::<VulnerableDependency>(1);

    if cli.skip_scan {
        info!("dry run: refreshing scan state without scanning");
        let scan_manager =
            ScanManager::new(config, diff_tx, Arc::clone(&state) as Arc<dyn StateManager>);
        scan_manager.dry_run();
        scan_manager.stop();
        state.stop();
        return Ok(());
    }

    let metrics = MetricsRegistry::start(&config.metrics);

    let router =
        Router::start(&config, leak_rx, vulns_rx).context("cannot start notification router")?;

    let dispatcher = AnalyzerDispatcher::start(&config, diff_rx, leak_tx, vulns_tx, &metrics)
        .context("cannot start analyzer dispatcher")?;

    let mut scan_manager = ScanManager::new(
        config,
        diff_tx,
        Arc::clone(&state) as Arc<dyn StateManager>,
    );
    scan_manager.spawn_driver();

    let mut ticker_shutdown = Shutdown::new();
    let ticker = spawn_status_ticker(
        scan_manager.probe(),
        dispatcher.probe(),
        ticker_shutdown.subscribe(),
    );

    if cli.pprof {
        spawn_diagnostics_listener(scan_manager.probe(), dispatcher.probe());
    }

    info!(version = env!("CARGO_PKG_VERSION"), "started");

    let mut signals =
        Signals::new([SIGINT, SIGTERM, SIGHUP]).context("cannot install signal handlers")?;
    for signal in signals.forever() {
        info!(signal, "received signal");
        if signal != SIGHUP {
            break;
        }
        match Config::load(&cli.config) {
            Ok(new_config) => {
                if let Err(err) = dispatcher.update(&new_config) {
                    error!(error = %err, "cannot compile new rules; keeping previous set");
                    continue;
                }
                scan_manager.set_config(new_config);
                info!("settings reloaded");
            }
            Err(err) => error!(error = %err, "cannot reload config"),
        }
    }

    ticker_shutdown.signal();
    let _ = ticker.join();

    // Reverse start order: the scan manager's exit closes the diff
    // channel, draining each downstream stage before it is stopped.
    scan_manager.stop();
    dispatcher.stop();
    router.stop();
    state.stop();
    metrics.stop();

    info!("stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn init_logging(config: &Logging) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let level = config
        .level_filter()
        .map_err(|reason| anyhow::anyhow!(reason))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if config.file.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(None);
    }

    let path = Path::new(&config.file);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .map_or_else(|| "leakhound.log".to_owned(), |n| n.to_string_lossy().into_owned());
    let appender = tracing_appender::rolling::daily(dir, name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}

// ---------------------------------------------------------------------------
// Status ticker
// ---------------------------------------------------------------------------

fn spawn_status_ticker(
    scan: ScanProbe,
    stats: StatsProbe,
    dying: ShutdownSignal,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let ticker = tick(STATUS_INTERVAL);
        loop {
            select! {
                recv(dying.receiver()) -> _ => return,
                recv(ticker) -> _ => {
                    let Some(repo) = scan.current() else { continue };
                    let repo_stats = stats.status(&repo.location.url);
                    let elapsed = repo
                        .scan
                        .start_time
                        .and_then(|start| (Utc::now() - start).to_std().ok())
                        .unwrap_or_default();
                    info!(
                        repo = %repo.location.url,
                        leaks = repo_stats.leaks_found,
                        leaks_filtered = repo_stats.leaks_filtered,
                        duration = %pretty_duration(elapsed),
                        "scanning"
                    );
                }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Minimal HTTP endpoint reporting the in-flight scan; detached, lives for
/// the process.
fn spawn_diagnostics_listener(scan: ScanProbe, stats: StatsProbe) {
    std::thread::spawn(move || {
        let listener = match TcpListener::bind(DIAGNOSTICS_ADDR) {
            Ok(listener) => listener,
            Err(err) => {
                error!(error = %err, addr = DIAGNOSTICS_ADDR, "cannot start diagnostics listener");
                return;
            }
        };
        info!(addr = DIAGNOSTICS_ADDR, "diagnostics listening");
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request);
            let body = match scan.current() {
                Some(repo) => {
                    let repo_stats = stats.status(&repo.location.url);
                    serde_json::json!({
                        "status": "scanning",
                        "repo": repo.location.url,
                        "leaks_found": repo_stats.leaks_found,
                        "leaks_filtered": repo_stats.leaks_filtered,
                        "vulnerabilities_found": repo_stats.vulnerabilities_found,
                    })
                    .to_string()
                }
                None => serde_json::json!({ "status": "idle" }).to_string(),
            };
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
}
