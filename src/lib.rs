pub mod api;
pub mod config;
pub mod error;
pub mod service;
pub mod tunnel;
pub mod types;

pub use error::{ConnectError, ErrorKind};
pub use service::{ConnectOptions, Orchestrator};
