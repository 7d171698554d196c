//! The readiness gate.
//!
//! A session must not open its stream until the compiler service is
//! actually reachable. Two strategies: poll connectivity against an
//! already-running endpoint, or spawn the compiler locally and watch its
//! stdout for the "listening on port N" line before connecting. Either
//! way, failure aborts the session with `ServiceUnavailable` before any
//! stream exists.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::time;
use tonic::transport::{Channel, Endpoint};

use crate::error::{Error, Result};

/// Default bound on how long the gate waits for the service.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

const CONNECT_RETRY_PAUSE: Duration = Duration::from_millis(100);
const READY_MARKER: &str = "listening on port";

/// How to reach the compiler service.
#[derive(Debug, Clone)]
pub enum ServiceConfig {
    /// Connect to an already-running service.
    External { uri: String, timeout: Duration },
    /// Spawn the compiler locally and wait for its readiness line.
    Spawn {
        program: String,
        args: Vec<String>,
        timeout: Duration,
    },
}

impl ServiceConfig {
    pub fn external(uri: impl Into<String>) -> Self {
        Self::External {
            uri: uri.into(),
            timeout: DEFAULT_READY_TIMEOUT,
        }
    }

    pub fn spawn(program: impl Into<String>, args: Vec<String>) -> Self {
        Self::Spawn {
            program: program.into(),
            args,
            timeout: DEFAULT_READY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, value: Duration) -> Self {
        match &mut self {
            Self::External { timeout, .. } | Self::Spawn { timeout, .. } => *timeout = value,
        }
        self
    }
}

/// A ready channel, plus the subprocess keeping it alive when the
/// compiler was spawned locally. Dropping this terminates the subprocess.
pub(crate) struct ReadyService {
    pub(crate) channel: Channel,
    _child: Option<ChildGuard>,
}

/// Kill-on-drop handle for a spawned compiler.
///
/// `kill_on_drop` covers runtime teardown; `start_kill` on drop makes
/// termination prompt when the session ends normally.
struct ChildGuard(Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Err(err) = self.0.start_kill() {
            tracing::debug!(error = %err, "compiler subprocess already gone");
        }
    }
}

/// Block until the service is reachable, per the configured strategy.
pub(crate) async fn wait_ready(config: &ServiceConfig) -> Result<ReadyService> {
    match config {
        ServiceConfig::External { uri, timeout } => {
            let channel = connect_with_deadline(uri.clone(), *timeout).await?;
            Ok(ReadyService {
                channel,
                _child: None,
            })
        }
        ServiceConfig::Spawn {
            program,
            args,
            timeout,
        } => {
            tracing::info!(%program, "spawning compiler service");
            let started = time::Instant::now();
            let mut child = Command::new(program)
                .args(args)
                .stdout(Stdio::piped())
                .kill_on_drop(true)
                .spawn()?;
            let stdout = child.stdout.take().ok_or(Error::ServiceUnavailable)?;
            let port = time::timeout(*timeout, scan_for_port(stdout))
                .await
                .map_err(|_| Error::ServiceUnavailable)??;
            tracing::info!(port, "compiler service ready");
            // The stdout scan and the connect share one budget.
            let remaining = timeout.saturating_sub(started.elapsed());
            let channel =
                connect_with_deadline(format!("http://127.0.0.1:{port}"), remaining).await?;
            Ok(ReadyService {
                channel,
                _child: Some(ChildGuard(child)),
            })
        }
    }
}

/// Read subprocess stdout line by line until the readiness signal.
async fn scan_for_port(stdout: ChildStdout) -> Result<u16> {
    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines.next_line().await? {
        tracing::debug!(%line, "compiler output");
        if let Some(port) = parse_ready_line(&line) {
            return Ok(port);
        }
    }
    // Stdout closed without the signal: the process died or never bound.
    Err(Error::ServiceUnavailable)
}

fn parse_ready_line(line: &str) -> Option<u16> {
    let rest = line.split(READY_MARKER).nth(1)?;
    rest.split_whitespace().next()?.parse().ok()
}

/// Retry connecting until the channel is ready or the bound passes.
///
/// The bound covers the whole loop, not just the pauses between
/// attempts: a blackholed host that lets a single connect hang for the
/// OS TCP timeout still fails within the configured budget.
async fn connect_with_deadline(uri: String, timeout: Duration) -> Result<Channel> {
    let endpoint = Endpoint::from_shared(uri)
        .map_err(|_| Error::ServiceUnavailable)?
        .connect_timeout(timeout);
    time::timeout(timeout, retry_connect(&endpoint))
        .await
        .map_err(|_| {
            tracing::warn!("compiler service never became ready");
            Error::ServiceUnavailable
        })
}

async fn retry_connect(endpoint: &Endpoint) -> Channel {
    loop {
        match endpoint.connect().await {
            Ok(channel) => return channel,
            Err(err) => {
                tracing::debug!(error = %err, "compiler service not ready yet");
                time::sleep(CONNECT_RETRY_PAUSE).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ready_line() {
        assert_eq!(parse_ready_line("Server listening on port 14310"), Some(14310));
        assert_eq!(parse_ready_line("listening on port 80 (http)"), Some(80));
        assert_eq!(parse_ready_line("compiling model..."), None);
        assert_eq!(parse_ready_line("listening on port"), None);
        assert_eq!(parse_ready_line("listening on port banana"), None);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_service_unavailable() {
        // Port 1 is essentially never listening; the tiny bound keeps the
        // test fast either way.
        let config =
            ServiceConfig::external("http://127.0.0.1:1").with_timeout(Duration::from_millis(200));
        match wait_ready(&config).await {
            Err(Error::ServiceUnavailable) => {}
            Ok(_) => panic!("connected to a port that should be closed"),
            Err(other) => panic!("expected ServiceUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn spawned_process_without_signal_is_service_unavailable() {
        // `true` exits immediately without ever printing a ready line.
        let config = ServiceConfig::spawn("true", vec![]).with_timeout(Duration::from_millis(500));
        match wait_ready(&config).await {
            Err(Error::ServiceUnavailable) => {}
            Ok(_) => panic!("gate opened without a readiness signal"),
            Err(other) => panic!("expected ServiceUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn gate_fails_within_its_configured_bound() {
        let config =
            ServiceConfig::external("http://127.0.0.1:1").with_timeout(Duration::from_millis(300));
        let started = std::time::Instant::now();
        match wait_ready(&config).await {
            Err(Error::ServiceUnavailable) => {}
            Ok(_) => panic!("connected to a port that should be closed"),
            Err(other) => panic!("expected ServiceUnavailable, got {other:?}"),
        }
        // Generous margin to stay robust on slow machines; the point is
        // that a connect attempt cannot stall the gate past its bound.
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "readiness gate ran past its configured bound"
        );
    }

    #[tokio::test]
    async fn spawn_scan_and_connect_share_one_budget() {
        // The child announces a port nothing listens on and then idles;
        // the connect retries must burn only what the scan left over.
        let config = ServiceConfig::spawn(
            "sh",
            vec![
                "-c".to_string(),
                "echo 'Server listening on port 1'; sleep 30".to_string(),
            ],
        )
        .with_timeout(Duration::from_millis(300));
        let started = std::time::Instant::now();
        match wait_ready(&config).await {
            Err(Error::ServiceUnavailable) => {}
            Ok(_) => panic!("connected to a port that should be closed"),
            Err(other) => panic!("expected ServiceUnavailable, got {other:?}"),
        }
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "spawn gate ran past its configured bound"
        );
    }

    #[test]
    fn timeout_applies_to_either_strategy() {
        let external = ServiceConfig::external("http://x").with_timeout(Duration::from_secs(1));
        match external {
            ServiceConfig::External { timeout, .. } => {
                assert_eq!(timeout, Duration::from_secs(1));
            }
            _ => unreachable!(),
        }
    }
}
