use std::env;

use serde::{Deserialize, Serialize};

pub const DEFAULT_DEPLOYMENT_TYPE: &str = "serving-endpoint";

fn default_deployment_type() -> String {
    DEFAULT_DEPLOYMENT_TYPE.to_string()
}

/// One configured agent, i.e. one upstream serving endpoint a client can
/// address by id. Loaded once at startup and read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub endpoint_name: Option<String>,
    #[serde(default = "default_deployment_type")]
    pub deployment_type: String,
}

/// Connection settings for the model-serving workspace the gateway fronts.
/// `host` is normalized to carry an explicit https:// scheme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub host: String,
    pub token: String,
}

impl UpstreamConfig {
    /// Environment variables take precedence over the config file so the
    /// same file can be deployed across workspaces.
    pub fn resolve(file_value: Option<UpstreamConfig>) -> Option<UpstreamConfig> {
        let host = env::var("SERVEGATE_UPSTREAM_HOST")
            .ok()
            .or_else(|| file_value.as_ref().map(|u| u.host.clone()));
        let token = env::var("SERVEGATE_UPSTREAM_TOKEN")
            .ok()
            .or_else(|| file_value.as_ref().map(|u| u.token.clone()));

        match (host, token) {
            (Some(host), Some(token)) => Some(UpstreamConfig {
                host: normalize_host(&host),
                token,
            }),
            _ => None,
        }
    }
}

fn normalize_host(host: &str) -> String {
    if host.starts_with("https://") || host.starts_with("http://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", host.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub agents: Vec<AgentConfig>,
    pub upstream: Option<UpstreamConfig>,
}

impl Configuration {
    pub fn agent_by_id(&self, id: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|agent| agent.id == id)
    }
}
