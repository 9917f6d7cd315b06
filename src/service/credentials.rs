use crate::api::Platform;
use crate::error::ConnectError;
use crate::types::Credentials;
use tracing::debug;

/// Read back the credentials of the service key `grant_name` on an instance.
///
/// The name filter is applied again locally: only an exact name match counts.
/// Not retried; a failure here ends the session.
pub async fn resolve_credentials<P>(
    platform: &P,
    instance_guid: &str,
    grant_name: &str,
) -> Result<Credentials, ConnectError>
where
    P: Platform + ?Sized,
{
    let keys = platform.service_keys(instance_guid, grant_name).await?;
    debug!(count = keys.len(), grant = grant_name, "service keys listed");

    let key = keys
        .into_iter()
        .find(|k| k.name == grant_name)
        .ok_or_else(|| ConnectError::GrantNotFound {
            name: grant_name.to_string(),
            instance_guid: instance_guid.to_string(),
        })?;

    Credentials::from_payload(&key.credentials).map_err(|source| {
        ConnectError::MalformedCredentials {
            grant: grant_name.to_string(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ServiceKey;
    use crate::types::{CredentialGrant, ServiceInstance};
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct StaticKeys(Vec<ServiceKey>);

    #[async_trait]
    impl Platform for StaticKeys {
        async fn fetch_service_instance(&self, name: &str) -> Result<ServiceInstance, ConnectError> {
            Err(ConnectError::InstanceNotFound(name.to_string()))
        }

        async fn service_keys(&self, _: &str, _: &str) -> Result<Vec<ServiceKey>, ConnectError> {
            Ok(self.0.clone())
        }

        async fn create_service_key(&self, _: &CredentialGrant) -> Result<(), ConnectError> {
            Ok(())
        }

        async fn delete_service_key(&self, _: &CredentialGrant) -> Result<(), ConnectError> {
            Ok(())
        }
    }

    fn key(name: &str, credentials: Value) -> ServiceKey {
        ServiceKey {
            guid: format!("guid-{name}"),
            name: name.to_string(),
            credentials,
        }
    }

    #[tokio::test]
    async fn picks_the_exact_name_only() {
        let platform = StaticKeys(vec![
            key(
                "db-svc-connect-old",
                json!({"host": "wrong", "port": 1, "username": "u", "password": "p"}),
            ),
            key(
                "db-svc-connect",
                json!({"host": "right", "port": 2, "username": "u", "password": "p"}),
            ),
        ]);
        let creds = resolve_credentials(&platform, "si", "db-svc-connect")
            .await
            .unwrap();
        assert_eq!(creds.host, "right");
        assert_eq!(creds.port, 2);
    }

    #[tokio::test]
    async fn prefix_match_is_not_enough() {
        let platform = StaticKeys(vec![key("db-svc-connect-2", json!({}))]);
        let err = resolve_credentials(&platform, "si", "db-svc-connect")
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::GrantNotFound { .. }));
    }

    #[tokio::test]
    async fn malformed_payload_names_the_grant() {
        let platform = StaticKeys(vec![key("k", json!({"host": "h"}))]);
        let err = resolve_credentials(&platform, "si", "k").await.unwrap_err();
        match err {
            ConnectError::MalformedCredentials { grant, .. } => assert_eq!(grant, "k"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
