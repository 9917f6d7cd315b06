use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use std::process::ExitCode;
use svc_connect::api::CloudController;
use svc_connect::config::Config;
use svc_connect::service::{ServiceRegistry, StopSignals, TerminalRunner};
use svc_connect::tunnel::CfSshTransport;
use svc_connect::{ConnectError, ConnectOptions, Orchestrator};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "svc-connect")]
#[command(version, about = "Open a shell connected to a private service instance", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a shell that's connected to a service instance
    #[command(name = "connect-to-service")]
    ConnectToService {
        /// Application whose container relays the tunnel
        app_name: String,

        /// Service instance to connect to
        service_instance: String,

        /// Only open the tunnel and print its connection details
        #[arg(long)]
        no_client: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(e.exit_code());
        }
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        api_endpoint = %cfg.api_endpoint.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        proxy = %cfg.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        cf_binary = %cfg.cf_binary,
        loglevel = %cfg.loglevel
    );

    let signals = match StopSignals::install() {
        Ok(signals) => signals,
        Err(e) => {
            eprintln!("Error: failed to install signal handlers: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli, &cfg, signals).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(kind = ?e.kind(), "session failed");
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli, cfg: &Config, signals: StopSignals) -> Result<(), ConnectError> {
    let Commands::ConnectToService {
        app_name,
        service_instance,
        no_client,
    } = cli.command;

    let orchestrator = Orchestrator::new(
        CloudController::new(cfg)?,
        CfSshTransport::new(cfg),
        TerminalRunner,
        ServiceRegistry::builtin(&cfg.clients),
    );
    let opts = ConnectOptions {
        app_name,
        service_instance,
        no_client,
    };

    let stop = async move {
        let signal = signals.recv().await;
        info!(%signal, "stop requested, cleaning up");
    };
    orchestrator.connect(&opts, stop).await
}
