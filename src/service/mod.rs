//! Session services.
//!
//! Layout:
//! - `classifier.rs`: ordered registry mapping service instances to store kinds
//! - `credentials.rs`: reads a service key back into `Credentials`
//! - `launcher.rs`: client argument forms and the foreground runner
//! - `guard.rs`: scoped release of the service key and the tunnel
//! - `orchestrator.rs`: the session lifecycle
//! - `shutdown.rs`: SIGINT/SIGTERM/SIGHUP watched outside the client

pub mod classifier;
pub mod credentials;
pub mod guard;
pub mod launcher;
pub mod orchestrator;
pub mod shutdown;

pub use classifier::{ServiceClassifier, ServiceEntry, ServiceKind, ServiceRegistry};
pub use launcher::{ClientStyle, LaunchCommand, SessionExit, SessionRunner, TerminalRunner};
pub use orchestrator::{ConnectOptions, Orchestrator};
pub use shutdown::{StopSignal, StopSignals};
