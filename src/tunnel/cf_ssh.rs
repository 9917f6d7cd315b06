use async_trait::async_trait;
use backon::{ConstantBuilder, Retryable};
use std::net::{Ipv4Addr, SocketAddr};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error as ThisError;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, info, warn};

use super::{ForwardProcess, Transport, TunnelHandle};
use crate::config::{Config, TunnelConfig};
use crate::error::ConnectError;
use crate::types::Credentials;

/// How long to wait for the local end of a new tunnel to accept connections.
#[derive(Debug, Clone, Copy)]
pub struct ProbePolicy {
    pub attempts: usize,
    pub interval: Duration,
}

impl From<&TunnelConfig> for ProbePolicy {
    fn from(cfg: &TunnelConfig) -> Self {
        Self {
            attempts: cfg.probe_attempts,
            interval: cfg.probe_interval(),
        }
    }
}

/// Forwards through `cf ssh -N -L`, i.e. over the platform's SSH proxy into an
/// application container that can reach the store.
#[derive(Debug, Clone)]
pub struct CfSshTransport {
    program: String,
    probe: ProbePolicy,
}

impl CfSshTransport {
    pub fn new(cfg: &Config) -> Self {
        Self::with_program(cfg.cf_binary.clone(), ProbePolicy::from(&cfg.tunnel))
    }

    pub fn with_program(program: impl Into<String>, probe: ProbePolicy) -> Self {
        Self {
            program: program.into(),
            probe,
        }
    }

    pub fn forward_args(local_port: u16, creds: &Credentials, app_name: &str) -> Vec<String> {
        vec![
            "ssh".to_string(),
            "-N".to_string(),
            "-L".to_string(),
            format!(
                "{}:{local_port}:{}:{}",
                Ipv4Addr::LOCALHOST,
                creds.host,
                creds.port
            ),
            app_name.to_string(),
        ]
    }
}

#[async_trait]
impl Transport for CfSshTransport {
    async fn open(&self, creds: &Credentials, app_name: &str) -> Result<TunnelHandle, ConnectError> {
        let local_port = free_local_port().await?;

        let args = Self::forward_args(local_port, creds, app_name);
        let mut child = spawn_forwarder(&self.program, args).map_err(|e| {
            ConnectError::Transport(format!("failed to start {}: {e}", self.program))
        })?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(relay_stderr(stderr));
        }
        debug!(program = %self.program, pid = ?child.id(), local_port, "forwarding process started");

        let mut process = ChildProcess::new(self.program.clone(), child);
        if let Err(e) = wait_until_ready(&mut process.child, local_port, self.probe).await {
            if let Err(stop) = process.terminate().await {
                warn!(error = %stop, "failed to stop forwarding process after a failed start");
            }
            return Err(e);
        }

        info!(
            local_port,
            remote_host = %creds.host,
            remote_port = creds.port,
            app = app_name,
            "tunnel ready"
        );
        Ok(TunnelHandle::new(local_port, process))
    }
}

/// Start the forwarder detached from the terminal's foreground process group.
///
/// Terminal-generated signals (Ctrl-C, Ctrl-\) go to the whole foreground group;
/// the forwarder must outlive a Ctrl-C the interactive client handles itself.
fn spawn_forwarder(program: &str, args: Vec<String>) -> std::io::Result<Child> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd.spawn()
}

/// Ask the OS for a free loopback port.
///
/// The listener is released before the forwarder binds the port, so another
/// process could take it in between; the readiness probe then fails loudly.
pub async fn free_local_port() -> Result<u16, ConnectError> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .map_err(|e| ConnectError::Transport(format!("failed to reserve a local port: {e}")))?;
    let addr = listener
        .local_addr()
        .map_err(|e| ConnectError::Transport(format!("failed to read the local port: {e}")))?;
    Ok(addr.port())
}

#[derive(Debug, ThisError)]
enum ProbeError {
    #[error("forwarding process exited ({0}) before the tunnel was ready")]
    Exited(ExitStatus),

    #[error("failed to poll forwarding process: {0}")]
    Wait(std::io::Error),

    #[error("local port not accepting connections: {0}")]
    Connect(std::io::Error),
}

/// Connect-and-close against the local end until it answers, giving up early
/// once the forwarding process has died.
async fn wait_until_ready(
    child: &mut Child,
    local_port: u16,
    policy: ProbePolicy,
) -> Result<(), ConnectError> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, local_port));
    let backoff = ConstantBuilder::default()
        .with_delay(policy.interval)
        .with_max_times(policy.attempts);

    (|| {
        let polled = child.try_wait();
        async move {
            match polled {
                Ok(Some(status)) => Err(ProbeError::Exited(status)),
                Err(e) => Err(ProbeError::Wait(e)),
                Ok(None) => TcpStream::connect(addr)
                    .await
                    .map(drop)
                    .map_err(ProbeError::Connect),
            }
        }
    })
    .retry(backoff)
    .when(|e: &ProbeError| matches!(e, ProbeError::Connect(_)))
    .notify(|err: &ProbeError, dur: Duration| {
        debug!(local_port, error = %err, "tunnel not ready, probing again in {:?}", dur);
    })
    .await
    .map_err(|e| ConnectError::Transport(format!("port {local_port}: {e}")))
}

async fn relay_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.trim().is_empty() {
            warn!(source = "cf ssh", "{line}");
        }
    }
}

/// A forwarding process owned by this session.
pub struct ChildProcess {
    program: String,
    child: Child,
}

impl ChildProcess {
    pub fn new(program: impl Into<String>, child: Child) -> Self {
        Self {
            program: program.into(),
            child,
        }
    }
}

#[async_trait]
impl ForwardProcess for ChildProcess {
    async fn terminate(&mut self) -> Result<(), ConnectError> {
        let stop_err =
            |e: std::io::Error| ConnectError::Transport(format!("failed to stop {}: {e}", self.program));
        if let Some(status) = self.child.try_wait().map_err(stop_err)? {
            warn!(program = %self.program, %status, "forwarding process had already exited");
            return Ok(());
        }
        self.child.kill().await.map_err(stop_err)?;
        info!(program = %self.program, "forwarding process stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            host: "10.0.0.12".to_string(),
            port: 5432,
            username: "u".to_string(),
            password: "p".to_string(),
            database: None,
            scheme: None,
        }
    }

    fn quick_probe() -> ProbePolicy {
        ProbePolicy {
            attempts: 3,
            interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn forward_args_bind_loopback() {
        let args = CfSshTransport::forward_args(40100, &creds(), "jump-app");
        assert_eq!(
            args,
            ["ssh", "-N", "-L", "127.0.0.1:40100:10.0.0.12:5432", "jump-app"]
        );
    }

    #[tokio::test]
    async fn free_port_is_not_zero() {
        let port = free_local_port().await.unwrap();
        assert_ne!(port, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn early_exit_fails_fast() {
        let transport = CfSshTransport::with_program(
            "false",
            ProbePolicy {
                attempts: 200,
                interval: Duration::from_millis(50),
            },
        );
        let started = std::time::Instant::now();
        let err = transport.open(&creds(), "app").await.unwrap_err();
        assert!(matches!(err, ConnectError::Transport(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn missing_binary_is_a_transport_error() {
        let transport = CfSshTransport::with_program("svc-connect-no-such-cf", quick_probe());
        let err = transport.open(&creds(), "app").await.unwrap_err();
        assert!(err.to_string().contains("failed to start"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn probe_succeeds_once_port_listens() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut child = Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        wait_until_ready(&mut child, port, quick_probe()).await.unwrap();
        child.kill().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn probe_gives_up_after_bounded_attempts() {
        let port = free_local_port().await.unwrap();
        let mut child = Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let err = wait_until_ready(&mut child, port, quick_probe())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not accepting connections"));
        child.kill().await.unwrap();
    }

    /// Process group id of `pid`, read from `/proc/<pid>/stat`.
    #[cfg(target_os = "linux")]
    fn pgid_of(pid: &str) -> i64 {
        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).unwrap();
        // comm may contain spaces; fields after it are "state ppid pgrp ..."
        let (_, rest) = stat.rsplit_once(')').unwrap();
        rest.split_whitespace().nth(2).unwrap().parse().unwrap()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn forwarder_runs_in_its_own_process_group() {
        let mut child = spawn_forwarder("sleep", vec!["30".to_string()]).unwrap();
        let pid = child.id().unwrap();
        let own = pgid_of("self");
        let forwarder = pgid_of(&pid.to_string());
        assert_ne!(forwarder, own);
        assert_eq!(forwarder, i64::from(pid));
        child.kill().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_stops_a_running_process() {
        let child = Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let mut process = ChildProcess::new("sleep", child);
        process.terminate().await.unwrap();
        assert!(process.child.try_wait().unwrap().is_some());
        // second call sees the exited process
        process.terminate().await.unwrap();
    }
}
