//! Scoped ownership of the two remote/OS resources a session provisions.
//!
//! `release()` consumes the guard, so each resource is torn down at most once;
//! the orchestrator calls it on every path, so it is torn down exactly once.

use tracing::warn;

use crate::api::Platform;
use crate::error::ConnectError;
use crate::tunnel::TunnelHandle;
use crate::types::CredentialGrant;

/// Owns a created service key until it is deleted.
pub struct GrantGuard<'a, P: Platform + ?Sized> {
    platform: &'a P,
    grant: CredentialGrant,
    released: bool,
}

impl<'a, P: Platform + ?Sized> GrantGuard<'a, P> {
    pub fn new(platform: &'a P, grant: CredentialGrant) -> Self {
        Self {
            platform,
            grant,
            released: false,
        }
    }

    pub fn grant(&self) -> &CredentialGrant {
        &self.grant
    }

    pub async fn release(mut self) -> Result<(), ConnectError> {
        self.released = true;
        self.platform.delete_service_key(&self.grant).await
    }
}

impl<P: Platform + ?Sized> Drop for GrantGuard<'_, P> {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                grant = %self.grant.name,
                "service key left behind; it is removed by the next session for this instance"
            );
        }
    }
}

/// Owns a running tunnel until it is terminated.
pub struct TunnelGuard {
    local_port: u16,
    handle: Option<TunnelHandle>,
}

impl TunnelGuard {
    pub fn new(handle: TunnelHandle) -> Self {
        Self {
            local_port: handle.local_port(),
            handle: Some(handle),
        }
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub async fn release(mut self) -> Result<(), ConnectError> {
        match self.handle.take() {
            Some(handle) => handle.terminate().await,
            None => Ok(()),
        }
    }
}

impl Drop for TunnelGuard {
    fn drop(&mut self) {
        if self.handle.is_some() {
            // The child is spawned with kill_on_drop, so dropping the handle stops it.
            warn!(local_port = self.local_port, "tunnel dropped without release");
        }
    }
}
