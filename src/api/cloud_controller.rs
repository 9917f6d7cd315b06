use crate::api::{Platform, ServiceKey};
use crate::config::Config;
use crate::error::ConnectError;
use crate::types::cloud_controller::{
    CreateServiceKeyRequest, Page, Resource, ServiceEntity, ServiceInstanceEntity,
    ServiceKeyEntity, ServicePlanEntity,
};
use crate::types::{CredentialGrant, ServiceInstance};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Longest response body excerpt carried in an error.
const ERROR_BODY_LIMIT: usize = 512;

/// Client for the Cloud Controller v2 API, scoped to one space.
pub struct CloudController {
    http: reqwest::Client,
    api: Url,
    space_guid: String,
}

impl CloudController {
    pub fn new(cfg: &Config) -> Result<Self, ConnectError> {
        let target = cfg.platform_target()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&target.authorization)
            .map_err(|_| ConnectError::Config("access token is not a valid header".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("svc-connect/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .default_headers(headers);
        if let Some(proxy_url) = cfg.proxy.as_ref() {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
        }
        if cfg.skip_ssl_validation {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            http: builder.build()?,
            api: target.api_endpoint,
            space_guid: target.space_guid,
        })
    }

    fn url(&self, path: &str) -> Result<Url, ConnectError> {
        Ok(self.api.join(path)?)
    }

    fn url_with_name_filter(&self, path: &str, name: &str) -> Result<Url, ConnectError> {
        let mut url = self.url(path)?;
        url.query_pairs_mut().append_pair("q", &format!("name:{name}"));
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<Response, ConnectError> {
        let path = url.path().to_string();
        debug!(%method, %path, "cloud controller request");
        let resp = build(self.http.request(method.clone(), url)).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let mut body = resp.text().await.unwrap_or_default();
        truncate_at_char_boundary(&mut body, ERROR_BODY_LIMIT);
        Err(ConnectError::PlatformStatus {
            method,
            path,
            status,
            body,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ConnectError> {
        let resp = self.send(Method::GET, url, |req| req).await?;
        Ok(resp.json::<T>().await?)
    }
}

#[async_trait]
impl Platform for CloudController {
    async fn fetch_service_instance(&self, name: &str) -> Result<ServiceInstance, ConnectError> {
        let mut url = self.url_with_name_filter(
            &format!("/v2/spaces/{}/service_instances", self.space_guid),
            name,
        )?;
        url.query_pairs_mut()
            .append_pair("return_user_provided_service_instances", "true");

        let page: Page<ServiceInstanceEntity> = self.get_json(url).await?;
        let instance = page
            .resources
            .into_iter()
            .find(|r| r.entity.name == name)
            .ok_or_else(|| ConnectError::InstanceNotFound(name.to_string()))?;

        let service = match instance.entity.service_url.as_deref() {
            Some(path) => {
                let svc: Resource<ServiceEntity> = self.get_json(self.url(path)?).await?;
                svc.entity.label
            }
            None => "user-provided".to_string(),
        };
        let plan = match instance.entity.service_plan_url.as_deref() {
            Some(path) => {
                let plan: Resource<ServicePlanEntity> = self.get_json(self.url(path)?).await?;
                plan.entity.name
            }
            None => String::new(),
        };

        info!(name, %service, %plan, guid = %instance.metadata.guid, "service instance found");
        Ok(ServiceInstance {
            name: instance.entity.name,
            service,
            plan,
            guid: instance.metadata.guid,
        })
    }

    async fn service_keys(
        &self,
        instance_guid: &str,
        name: &str,
    ) -> Result<Vec<ServiceKey>, ConnectError> {
        let url = self.url_with_name_filter(
            &format!("/v2/service_instances/{instance_guid}/service_keys"),
            name,
        )?;
        let page: Page<ServiceKeyEntity> = self.get_json(url).await?;
        Ok(page
            .resources
            .into_iter()
            .map(|r| ServiceKey {
                guid: r.metadata.guid,
                name: r.entity.name,
                credentials: r.entity.credentials,
            })
            .collect())
    }

    async fn create_service_key(&self, grant: &CredentialGrant) -> Result<(), ConnectError> {
        let body = CreateServiceKeyRequest {
            service_instance_guid: &grant.service_instance_guid,
            name: &grant.name,
        };
        self.send(Method::POST, self.url("/v2/service_keys")?, |req| req.json(&body))
            .await?;
        info!(grant = %grant.name, "service key created");
        Ok(())
    }

    async fn delete_service_key(&self, grant: &CredentialGrant) -> Result<(), ConnectError> {
        let keys = self
            .service_keys(&grant.service_instance_guid, &grant.name)
            .await?;
        for key in keys.into_iter().filter(|k| k.name == grant.name) {
            let url = self.url(&format!("/v2/service_keys/{}", key.guid))?;
            match self.send(Method::DELETE, url, |req| req).await {
                Ok(_) => info!(grant = %grant.name, guid = %key.guid, "service key deleted"),
                Err(ConnectError::PlatformStatus { status, .. })
                    if status == StatusCode::NOT_FOUND =>
                {
                    debug!(grant = %grant.name, "service key already gone")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn truncate_at_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}
