use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info, warn};

use crate::api::Platform;
use crate::error::ConnectError;
use crate::service::classifier::{ServiceClassifier, ServiceKind, ServiceRegistry};
use crate::service::credentials::resolve_credentials;
use crate::service::guard::{GrantGuard, TunnelGuard};
use crate::service::launcher::{LOOPBACK, SessionExit, SessionRunner};
use crate::tunnel::Transport;
use crate::types::{CredentialGrant, Credentials, CredentialsError, ServiceInstance};

/// What the user asked for.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Application whose instance relays the tunnel.
    pub app_name: String,
    pub service_instance: String,
    /// Keep the tunnel open and print its parameters instead of starting a client.
    pub no_client: bool,
}

/// Drives one session: instance → service key → credentials → tunnel → client,
/// then tears down the tunnel and the service key whatever happened.
pub struct Orchestrator<P, T, R> {
    platform: P,
    transport: T,
    runner: R,
    registry: ServiceRegistry,
}

impl<P, T, R> Orchestrator<P, T, R>
where
    P: Platform,
    T: Transport,
    R: SessionRunner,
{
    pub fn new(platform: P, transport: T, runner: R, registry: ServiceRegistry) -> Self {
        Self {
            platform,
            transport,
            runner,
            registry,
        }
    }

    /// Run a session. `interrupt` resolves when the process is asked to stop
    /// (SIGINT, SIGTERM or SIGHUP); it is only watched outside the interactive
    /// client, which handles its own interrupts.
    pub async fn connect<I>(&self, opts: &ConnectOptions, interrupt: I) -> Result<(), ConnectError>
    where
        I: Future<Output = ()>,
    {
        tokio::pin!(interrupt);

        println!("Finding the service instance details...");
        let instance = interruptible(
            &mut interrupt,
            self.platform.fetch_service_instance(&opts.service_instance),
        )
        .await?;

        let grant = CredentialGrant::for_instance(&instance);
        if let Err(e) = self.platform.delete_service_key(&grant).await {
            debug!(grant = %grant.name, error = %e, "stale service key not removed");
        }
        // Not raced against the interrupt: an abandoned create could still land
        // remotely with nobody left to delete it.
        self.platform.create_service_key(&grant).await?;
        let grant = GrantGuard::new(&self.platform, grant);

        let outcome = self
            .with_grant(opts, &instance, grant.grant(), &mut interrupt)
            .await;
        settle(outcome, grant.release().await, "deleting service key")
    }

    async fn with_grant<I>(
        &self,
        opts: &ConnectOptions,
        instance: &ServiceInstance,
        grant: &CredentialGrant,
        interrupt: &mut Pin<&mut I>,
    ) -> Result<(), ConnectError>
    where
        I: Future<Output = ()>,
    {
        let creds = interruptible(
            interrupt,
            resolve_credentials(&self.platform, &grant.service_instance_guid, &grant.name),
        )
        .await?;

        println!("Setting up SSH tunnel...");
        let tunnel = interruptible(interrupt, self.transport.open(&creds, &opts.app_name)).await?;
        let tunnel = TunnelGuard::new(tunnel);

        let outcome = self
            .with_tunnel(opts, instance, grant, &creds, tunnel.local_port(), interrupt)
            .await;
        settle(outcome, tunnel.release().await, "stopping SSH tunnel")
    }

    async fn with_tunnel<I>(
        &self,
        opts: &ConnectOptions,
        instance: &ServiceInstance,
        grant: &CredentialGrant,
        creds: &Credentials,
        local_port: u16,
        interrupt: &mut Pin<&mut I>,
    ) -> Result<(), ConnectError>
    where
        I: Future<Output = ()>,
    {
        let kind = self.registry.classify(instance);
        info!(%kind, service = %instance.service, plan = %instance.plan, "service classified");

        if opts.no_client {
            print_connection_details(kind, local_port, creds);
            interrupt.as_mut().await;
            return Ok(());
        }

        let needs_username = self
            .registry
            .entry(kind)
            .is_some_and(|e| e.style.requires_username());
        if needs_username && creds.username.is_empty() {
            return Err(ConnectError::MalformedCredentials {
                grant: grant.name.clone(),
                source: CredentialsError::Missing("username"),
            });
        }

        let command = self
            .registry
            .launch_command(kind, local_port, creds)
            .ok_or_else(|| ConnectError::UnsupportedService {
                service: instance.service.clone(),
                plan: instance.plan.clone(),
            })?;

        println!("Connecting to {kind}...");
        match self.runner.run(&command).await? {
            SessionExit::Exited(0) => Ok(()),
            SessionExit::Exited(code) => Err(ConnectError::ClientExit {
                program: command.program,
                code,
            }),
            SessionExit::Signaled | SessionExit::Terminated => Err(ConnectError::Interrupted),
        }
    }
}

/// Run `step` unless the interrupt fires first. The interrupt is polled first so
/// a pending Ctrl-C wins over a step that happens to be ready.
async fn interruptible<I, F, T>(interrupt: &mut Pin<&mut I>, step: F) -> Result<T, ConnectError>
where
    I: Future<Output = ()>,
    F: Future<Output = Result<T, ConnectError>>,
{
    tokio::select! {
        biased;
        _ = interrupt.as_mut() => Err(ConnectError::Interrupted),
        res = step => res,
    }
}

/// Combine a stage's outcome with the cleanup that follows it. The stage's own
/// error wins; a cleanup error surfaces only when nothing else failed, or when
/// the earlier failure was itself a cleanup.
fn settle(
    outcome: Result<(), ConnectError>,
    cleanup: Result<(), ConnectError>,
    step: &'static str,
) -> Result<(), ConnectError> {
    match (outcome, cleanup) {
        (outcome, Ok(())) => outcome,
        (Ok(()), Err(e)) => Err(ConnectError::Cleanup {
            step,
            source: Box::new(e),
        }),
        (Err(earlier @ ConnectError::Cleanup { .. }), Err(e)) => {
            warn!(error = %earlier, "cleanup failed");
            Err(ConnectError::Cleanup {
                step,
                source: Box::new(e),
            })
        }
        (Err(primary), Err(e)) => {
            warn!(step, error = %e, "cleanup failed");
            Err(primary)
        }
    }
}

fn print_connection_details(kind: ServiceKind, local_port: u16, creds: &Credentials) {
    println!();
    println!("Tunnel open ({kind}). Connect with:");
    println!("  Host:     {LOOPBACK}");
    println!("  Port:     {local_port}");
    println!("  Username: {}", creds.username);
    println!("  Password: {}", creds.password);
    if let Some(db) = &creds.database {
        println!("  Database: {db}");
    }
    println!();
    println!("Press Ctrl-C to close the tunnel.");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleanup_err() -> ConnectError {
        ConnectError::Transport("kill failed".to_string())
    }

    #[test]
    fn primary_error_wins_over_cleanup() {
        let res = settle(Err(ConnectError::Interrupted), Err(cleanup_err()), "x");
        assert!(matches!(res, Err(ConnectError::Interrupted)));
    }

    #[test]
    fn cleanup_error_surfaces_when_alone() {
        let res = settle(Ok(()), Err(cleanup_err()), "stopping SSH tunnel");
        assert!(matches!(
            res,
            Err(ConnectError::Cleanup {
                step: "stopping SSH tunnel",
                ..
            })
        ));
    }

    #[test]
    fn later_cleanup_replaces_earlier_cleanup() {
        let earlier = ConnectError::Cleanup {
            step: "stopping SSH tunnel",
            source: Box::new(cleanup_err()),
        };
        let res = settle(Err(earlier), Err(cleanup_err()), "deleting service key");
        assert!(matches!(
            res,
            Err(ConnectError::Cleanup {
                step: "deleting service key",
                ..
            })
        ));
    }

    #[test]
    fn success_stays_success() {
        assert!(settle(Ok(()), Ok(()), "x").is_ok());
    }

    #[tokio::test]
    async fn pending_interrupt_wins_over_ready_step() {
        let interrupt = std::future::ready(());
        tokio::pin!(interrupt);
        let res = interruptible(&mut interrupt, async { Ok::<_, ConnectError>(1) }).await;
        assert!(matches!(res, Err(ConnectError::Interrupted)));
    }
}
