use std::fmt;

use crate::config::ClientBinaries;
use crate::service::launcher::{ClientStyle, LaunchCommand};
use crate::types::{Credentials, ServiceInstance};

/// Store kinds an interactive client exists for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    MongoDb,
    MySql,
    Postgres,
    Redis,
    Unknown,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ServiceKind::MongoDb => "MongoDB",
            ServiceKind::MySql => "MySQL",
            ServiceKind::Postgres => "Postgres",
            ServiceKind::Redis => "Redis",
            ServiceKind::Unknown => "unknown",
        })
    }
}

/// Maps a service instance onto a store kind.
pub trait ServiceClassifier: Send + Sync {
    fn classify(&self, instance: &ServiceInstance) -> ServiceKind;
}

/// One registry row: which instances it claims and how to start their client.
#[derive(Debug, Clone)]
pub struct ServiceEntry {
    pub kind: ServiceKind,
    /// Matched case-insensitively as substrings of the service label and plan name.
    pub terms: Vec<String>,
    pub program: String,
    pub style: ClientStyle,
}

impl ServiceEntry {
    pub fn new(
        kind: ServiceKind,
        terms: &[&str],
        program: impl Into<String>,
        style: ClientStyle,
    ) -> Self {
        Self {
            kind,
            terms: terms.iter().map(|t| t.to_string()).collect(),
            program: program.into(),
            style,
        }
    }
}

/// Ordered list of recognised store kinds. Earlier entries win.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    entries: Vec<ServiceEntry>,
}

impl ServiceRegistry {
    pub fn new(entries: Vec<ServiceEntry>) -> Self {
        Self { entries }
    }

    /// MongoDB, MySQL, Postgres, Redis, in that priority order.
    pub fn builtin(clients: &ClientBinaries) -> Self {
        Self::new(vec![
            ServiceEntry::new(
                ServiceKind::MongoDb,
                &["mongo"],
                &clients.mongo,
                ClientStyle::Mongo,
            ),
            ServiceEntry::new(
                ServiceKind::MySql,
                &["mysql"],
                &clients.mysql,
                ClientStyle::Mysql,
            ),
            ServiceEntry::new(
                ServiceKind::Postgres,
                &["psql", "postgres"],
                &clients.psql,
                ClientStyle::Psql,
            ),
            ServiceEntry::new(
                ServiceKind::Redis,
                &["redis"],
                &clients.redis,
                ClientStyle::RedisCli,
            ),
        ])
    }

    pub fn entry(&self, kind: ServiceKind) -> Option<&ServiceEntry> {
        self.entries.iter().find(|e| e.kind == kind)
    }

    /// Client invocation for `kind`, or `None` for kinds without a registered client.
    pub fn launch_command(
        &self,
        kind: ServiceKind,
        local_port: u16,
        creds: &Credentials,
    ) -> Option<LaunchCommand> {
        self.entry(kind)
            .map(|e| e.style.command(&e.program, local_port, creds))
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::builtin(&ClientBinaries::default())
    }
}

impl ServiceClassifier for ServiceRegistry {
    fn classify(&self, instance: &ServiceInstance) -> ServiceKind {
        self.entries
            .iter()
            .find(|e| instance.contains_terms(e.terms.as_slice()))
            .map(|e| e.kind)
            .unwrap_or(ServiceKind::Unknown)
    }
}
