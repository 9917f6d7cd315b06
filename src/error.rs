use reqwest::{Method, StatusCode};
use thiserror::Error as ThisError;

use crate::types::credentials::CredentialsError;

/// Coarse failure classes, used for exit codes and for deciding how loud to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Resolution,
    Transport,
    UnsupportedService,
    Launch,
    Cleanup,
    Interrupted,
}

#[derive(Debug, ThisError)]
pub enum ConnectError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{method} {path} failed with status {status}: {body}")]
    PlatformStatus {
        method: Method,
        path: String,
        status: StatusCode,
        body: String,
    },

    #[error("service instance '{0}' not found in the targeted space")]
    InstanceNotFound(String),

    #[error("service key '{name}' not found for service instance {instance_guid}")]
    GrantNotFound { name: String, instance_guid: String },

    #[error("malformed credentials in service key '{grant}': {source}")]
    MalformedCredentials {
        grant: String,
        #[source]
        source: CredentialsError,
    },

    #[error("SSH tunnel failed: {0}")]
    Transport(String),

    #[error(
        "Unsupported service. Service Name '{service}' Plan Name '{plan}'. \
         Please file an issue that includes these names."
    )]
    UnsupportedService { service: String, plan: String },

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {code}")]
    ClientExit { program: String, code: i32 },

    #[error("interrupted")]
    Interrupted,

    #[error("cleanup failed while {step}: {source}")]
    Cleanup {
        step: &'static str,
        #[source]
        source: Box<ConnectError>,
    },
}

impl ConnectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectError::Config(_) => ErrorKind::Config,
            ConnectError::UrlParse(_)
            | ConnectError::Reqwest(_)
            | ConnectError::Json(_)
            | ConnectError::PlatformStatus { .. }
            | ConnectError::InstanceNotFound(_)
            | ConnectError::GrantNotFound { .. }
            | ConnectError::MalformedCredentials { .. } => ErrorKind::Resolution,
            ConnectError::Transport(_) => ErrorKind::Transport,
            ConnectError::UnsupportedService { .. } => ErrorKind::UnsupportedService,
            ConnectError::Launch { .. } | ConnectError::ClientExit { .. } => ErrorKind::Launch,
            ConnectError::Interrupted => ErrorKind::Interrupted,
            ConnectError::Cleanup { .. } => ErrorKind::Cleanup,
        }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::Interrupted => 130,
            _ => 1,
        }
    }
}

impl From<figment::Error> for ConnectError {
    fn from(e: figment::Error) -> Self {
        ConnectError::Config(e.to_string())
    }
}
