/// Suffix appended to the service instance name to name the session's service key.
pub const GRANT_SUFFIX: &str = "-svc-connect";

/// A provisioned backing store, as fetched from the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    pub name: String,
    /// Label of the service offering, e.g. `aws-rds` or `redis`.
    pub service: String,
    pub plan: String,
    pub guid: String,
}

impl ServiceInstance {
    /// True when any term occurs, case-insensitively, in the service label or plan name.
    pub fn contains_terms<S: AsRef<str>>(&self, terms: &[S]) -> bool {
        let service = self.service.to_lowercase();
        let plan = self.plan.to_lowercase();
        terms.iter().any(|term| {
            let term = term.as_ref().to_lowercase();
            !term.is_empty() && (service.contains(&term) || plan.contains(&term))
        })
    }
}

/// The service key created for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialGrant {
    pub name: String,
    pub service_instance_guid: String,
}

impl CredentialGrant {
    /// The name is derived from the instance name only, so a later session finds
    /// (and removes) a key left behind by an earlier one.
    pub fn for_instance(instance: &ServiceInstance) -> Self {
        Self {
            name: grant_name(&instance.name),
            service_instance_guid: instance.guid.clone(),
        }
    }
}

pub fn grant_name(instance_name: &str) -> String {
    format!("{instance_name}{GRANT_SUFFIX}")
}
