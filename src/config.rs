use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ConnectError;

pub const ENV_PREFIX: &str = "SVC_CONNECT_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cloud Controller API base URL, e.g. `https://api.example.com`.
    pub api_endpoint: Option<Url>,
    /// Bearer token; a leading `bearer ` is optional.
    pub access_token: Option<String>,
    /// GUID of the targeted space; service instances are looked up there.
    pub space_guid: Option<String>,
    pub skip_ssl_validation: bool,
    pub proxy: Option<Url>,
    pub loglevel: String,
    /// Binary providing `ssh -N -L` forwarding through an app instance.
    pub cf_binary: String,
    pub tunnel: TunnelConfig,
    pub clients: ClientBinaries,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    pub probe_attempts: usize,
    pub probe_interval_ms: u64,
}

/// Interactive client executables, by store kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientBinaries {
    pub mysql: String,
    pub psql: String,
    pub redis: String,
    pub mongo: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_endpoint: None,
            access_token: None,
            space_guid: None,
            skip_ssl_validation: false,
            proxy: None,
            loglevel: "warn".to_string(),
            cf_binary: "cf".to_string(),
            tunnel: TunnelConfig::default(),
            clients: ClientBinaries::default(),
        }
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            probe_attempts: 40,
            probe_interval_ms: 250,
        }
    }
}

impl TunnelConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

impl Default for ClientBinaries {
    fn default() -> Self {
        Self {
            mysql: "mysql".to_string(),
            psql: "psql".to_string(),
            redis: "redis-cli".to_string(),
            mongo: "mongo".to_string(),
        }
    }
}

/// Resolved coordinates of the platform API.
#[derive(Debug, Clone)]
pub struct PlatformTarget {
    pub api_endpoint: Url,
    pub authorization: String,
    pub space_guid: String,
}

impl Config {
    /// Defaults, then the cf CLI's own config file, then `SVC_CONNECT_*` env vars.
    pub fn load() -> Result<Self, ConnectError> {
        Ok(Self::figment()?.extract()?)
    }

    pub fn figment() -> Result<Figment, ConnectError> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = cf_config_path().filter(|p| p.is_file()) {
            let overlay = CfCliConfig::read(&path)?.into_overlay();
            figment = figment.merge(Serialized::defaults(overlay));
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// The API endpoint, token and space, or a config error naming what is missing.
    pub fn platform_target(&self) -> Result<PlatformTarget, ConnectError> {
        let api_endpoint = self.api_endpoint.clone().ok_or_else(|| {
            ConnectError::Config(format!(
                "no API endpoint; run `cf api` or set {ENV_PREFIX}API_ENDPOINT"
            ))
        })?;
        let token = self
            .access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ConnectError::Config(format!(
                    "not logged in; run `cf login` or set {ENV_PREFIX}ACCESS_TOKEN"
                ))
            })?;
        let space_guid = self
            .space_guid
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ConnectError::Config(format!(
                    "no space targeted; run `cf target -s <space>` or set {ENV_PREFIX}SPACE_GUID"
                ))
            })?;

        Ok(PlatformTarget {
            api_endpoint,
            authorization: bearer(token),
            space_guid,
        })
    }
}

fn bearer(token: &str) -> String {
    match token.split_once(' ') {
        Some((scheme, _)) if scheme.eq_ignore_ascii_case("bearer") => token.to_string(),
        _ => format!("bearer {token}"),
    }
}

/// `$CF_HOME/.cf/config.json`, falling back to `$HOME/.cf/config.json`.
fn cf_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("CF_HOME").or_else(|| std::env::var_os("HOME"))?;
    Some(Path::new(&home).join(".cf").join("config.json"))
}

/// The subset of the cf CLI's `config.json` written by `cf login` / `cf target`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CfCliConfig {
    #[serde(default)]
    target: String,
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    space_fields: CfSpaceFields,
    #[serde(default, rename = "SSLDisabled")]
    ssl_disabled: bool,
}

#[derive(Debug, Default, Deserialize)]
struct CfSpaceFields {
    #[serde(default, rename = "GUID")]
    guid: String,
}

#[derive(Debug, Serialize)]
struct CfOverlay {
    #[serde(skip_serializing_if = "Option::is_none")]
    api_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    space_guid: Option<String>,
    skip_ssl_validation: bool,
}

impl CfCliConfig {
    fn read(path: &Path) -> Result<Self, ConnectError> {
        Figment::from(Json::file(path))
            .extract()
            .map_err(|e| ConnectError::Config(format!("{}: {e}", path.display())))
    }

    fn into_overlay(self) -> CfOverlay {
        let non_empty = |s: String| (!s.is_empty()).then_some(s);
        CfOverlay {
            api_endpoint: non_empty(self.target),
            access_token: non_empty(self.access_token),
            space_guid: non_empty(self.space_fields.guid),
            skip_ssl_validation: self.ssl_disabled,
        }
    }
}
