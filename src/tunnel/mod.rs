//! Local port forwarding to a private store endpoint.
//!
//! Layout:
//! - `mod.rs`: the `Transport` seam and the handle it returns
//! - `cf_ssh.rs`: forwarding through `cf ssh -L`, with a readiness probe

pub mod cf_ssh;

use async_trait::async_trait;

use crate::error::ConnectError;
use crate::types::Credentials;

pub use cf_ssh::{CfSshTransport, ChildProcess, ProbePolicy};

/// Opens a forwarding channel from a free local port to `creds.host:creds.port`,
/// routed through an instance of `app_name`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns once the local end accepts connections. Nothing is left running on error.
    async fn open(&self, creds: &Credentials, app_name: &str) -> Result<TunnelHandle, ConnectError>;
}

/// The background process carrying a tunnel.
#[async_trait]
pub trait ForwardProcess: Send {
    /// Stop the process and reap it. Stopping an already exited process is `Ok`.
    async fn terminate(&mut self) -> Result<(), ConnectError>;
}

/// A running tunnel bound to `local_port`.
pub struct TunnelHandle {
    local_port: u16,
    process: Box<dyn ForwardProcess>,
}

impl TunnelHandle {
    pub fn new(local_port: u16, process: impl ForwardProcess + 'static) -> Self {
        Self {
            local_port,
            process: Box::new(process),
        }
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub async fn terminate(mut self) -> Result<(), ConnectError> {
        self.process.terminate().await
    }
}

impl std::fmt::Debug for TunnelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelHandle")
            .field("local_port", &self.local_port)
            .finish_non_exhaustive()
    }
}
