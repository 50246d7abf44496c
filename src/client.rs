//! AiWen IP API client.
//!
//! Every operation is a single GET against `api.ipplus360.com`. The path is
//! chosen from the operation, the address family of the queried IP and, for
//! geolocation, the configured accuracy tier. Responses are returned as raw
//! JSON; business-level `code` fields are left for the caller to interpret.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::{Accuracy, Config};

pub const API_HOST: &str = "https://api.ipplus360.com";
pub const NETWORK_IP_URL: &str = "https://www.ipuu.net/ipuu/user/getIP";
pub const CHANNEL: &str = "rust_mcp";
pub const COORDSYS: &str = "WGS84";
pub const SCENE_LANG: &str = "cn";

/// IPv4 vs IPv6, decided by the presence of a colon only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn classify(ip: &str) -> Self {
        if ip.contains(':') {
            AddressFamily::V6
        } else {
            AddressFamily::V4
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Location,
    UsageScene,
    Whois,
    AsMapping,
    HostInfo,
    RiskPortrait,
    IdentityCheck,
    IndustryClassify,
}

impl Operation {
    fn path(self, family: AddressFamily, accuracy: Accuracy) -> &'static str {
        match self {
            Operation::Location => location_path(family, accuracy),
            Operation::UsageScene => match family {
                AddressFamily::V4 => "/ip/info/v1/scene/",
                AddressFamily::V6 => "/ip/info/v1/ipv6/scene/",
            },
            Operation::Whois => "/ip/info/v1/whois/",
            Operation::AsMapping => "/ip/info/v1/asMapping/",
            Operation::HostInfo => "/ip/info/v1/host/",
            Operation::RiskPortrait => "/ip/info/v1/riskPortrait/",
            Operation::IdentityCheck => "/ip/info/v1/identity/",
            Operation::IndustryClassify => "/ip/info/v1/industry/",
        }
    }

    fn extra_params(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Operation::Location => &[("coordsys", COORDSYS)],
            Operation::UsageScene => &[("lang", SCENE_LANG)],
            _ => &[],
        }
    }
}

/// Geolocation endpoint for each (family, accuracy) pair.
pub fn location_path(family: AddressFamily, accuracy: Accuracy) -> &'static str {
    match (family, accuracy) {
        (AddressFamily::V4, Accuracy::City) => "/ip/geo/v1/city/",
        (AddressFamily::V4, Accuracy::District) => "/ip/geo/v1/district/",
        (AddressFamily::V4, Accuracy::Street) => "/ip/geo/v1/street/",
        (AddressFamily::V6, Accuracy::City) => "/ip/geo/v1/ipv6/",
        (AddressFamily::V6, Accuracy::District) => "/ip/geo/v1/ipv6/district/",
        (AddressFamily::V6, Accuracy::Street) => "/ip/geo/v1/ipv6/street/",
    }
}

/// A fully resolved GET: absolute URL plus ordered query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteQuery {
    pub endpoint: String,
    pub params: Vec<(String, String)>,
}

#[cfg(test)]
impl RemoteQuery {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP {status} from {url}: {body}")]
    Status { url: String, status: u16, body: String },
    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get_json(&self, query: &RemoteQuery) -> Result<Value, TransportError>;
}

/// Production transport backed by a shared reqwest client.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("aiwen-geo-mcp/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get_json(&self, query: &RemoteQuery) -> Result<Value, TransportError> {
        let request_failed = |source: reqwest::Error| TransportError::Request {
            url: query.endpoint.clone(),
            source,
        };

        let response = self
            .client
            .get(&query.endpoint)
            .query(&query.params)
            .send()
            .await
            .map_err(request_failed)?;
        let status = response.status();
        let body = response.text().await.map_err(request_failed)?;

        classify_body(&query.endpoint, status, &body)
    }
}

/// A JSON body is returned whatever the status, so business payloads on
/// error statuses reach the caller. Non-JSON bodies are transport errors.
fn classify_body(url: &str, status: StatusCode, body: &str) -> Result<Value, TransportError> {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => Ok(value),
        Err(source) if status.is_success() => Err(TransportError::Decode {
            url: url.to_string(),
            source,
        }),
        Err(_) => Err(TransportError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body: truncate(body, 200),
        }),
    }
}

fn truncate(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        body.to_string()
    } else {
        let head: String = body.chars().take(max_chars).collect();
        format!("{head}...")
    }
}

pub struct AiwenClient {
    config: Config,
    base_url: String,
    transport: Arc<dyn HttpTransport>,
}

impl AiwenClient {
    pub fn new(config: Config, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config,
            base_url: API_HOST.to_string(),
            transport,
        }
    }

    fn accuracy_for(&self, family: AddressFamily) -> Accuracy {
        match family {
            AddressFamily::V4 => self.config.ipv4_accuracy,
            AddressFamily::V6 => self.config.ipv6_accuracy,
        }
    }

    pub fn build_query(&self, operation: Operation, ip: &str) -> RemoteQuery {
        let family = AddressFamily::classify(ip);
        let path = operation.path(family, self.accuracy_for(family));

        let mut params = vec![
            ("key".to_string(), self.config.api_key.clone()),
            ("channel".to_string(), CHANNEL.to_string()),
        ];
        params.extend(
            operation
                .extra_params()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        params.push(("ip".to_string(), ip.to_string()));

        RemoteQuery {
            endpoint: format!("{}{}", self.base_url, path),
            params,
        }
    }

    pub async fn query(&self, operation: Operation, ip: &str) -> Result<Value, TransportError> {
        let query = self.build_query(operation, ip);
        debug!("{:?} lookup for {} via {}", operation, ip, query.endpoint);
        self.transport.get_json(&query).await
    }

    /// Ask ipuu.net for the caller's public IP. Only the channel tag is sent.
    pub async fn current_network_ip(&self) -> Result<Value, TransportError> {
        let query = RemoteQuery {
            endpoint: NETWORK_IP_URL.to_string(),
            params: vec![("channel".to_string(), CHANNEL.to_string())],
        };
        debug!("Resolving current network IP via {}", query.endpoint);
        self.transport.get_json(&query).await
    }
}
