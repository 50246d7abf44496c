//! `user_network_ip`: resolve the caller's public IP, then locate it.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::client::{AiwenClient, Operation};
use crate::envelope::InvocationResult;
use crate::tools::ip_lookup::{failure_reason, IpLookup};
use crate::tools::ToolHandler;

pub struct NetworkIp {
    client: Arc<AiwenClient>,
    location: IpLookup,
}

impl NetworkIp {
    pub fn new(client: Arc<AiwenClient>) -> Self {
        let location = IpLookup::new(Operation::Location, client.clone());
        Self { client, location }
    }
}

// ipuu.net reports success as a numeric 200, unlike the ipplus360 endpoints.
fn is_success(code: &Value) -> bool {
    match code {
        Value::Number(n) => n.as_u64() == Some(200),
        Value::String(s) => s.trim() == "200",
        _ => false,
    }
}

#[async_trait]
impl ToolHandler for NetworkIp {
    async fn invoke(&self, _arguments: &Value) -> Result<InvocationResult> {
        let payload = self.client.current_network_ip().await?;

        if !is_success(&payload["code"]) {
            return Ok(InvocationResult::error(format!(
                "Failed to get current network IP: {}",
                failure_reason(&payload)
            )));
        }

        let ip = match payload["data"].as_str().map(str::trim) {
            Some(ip) if !ip.is_empty() => ip,
            _ => {
                return Ok(InvocationResult::error(
                    "Failed to get current network IP: response carried no IP address",
                ))
            }
        };

        info!("Current network IP: {}", ip);
        self.location.lookup(ip).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{config, FakeTransport};
    use crate::client::NETWORK_IP_URL;
    use crate::config::Accuracy;
    use serde_json::json;

    fn handler(transport: Arc<FakeTransport>) -> NetworkIp {
        let client = AiwenClient::new(config(Accuracy::City, Accuracy::City), transport);
        NetworkIp::new(Arc::new(client))
    }

    #[test]
    fn test_is_success() {
        assert!(is_success(&json!(200)));
        assert!(is_success(&json!("200")));
        assert!(!is_success(&json!("Success")));
        assert!(!is_success(&json!(500)));
        assert!(!is_success(&Value::Null));
    }

    #[tokio::test]
    async fn test_missing_ip_in_response() {
        let transport = Arc::new(
            FakeTransport::new().respond(NETWORK_IP_URL, json!({"code": 200, "data": ""})),
        );
        let result = handler(transport.clone()).invoke(&json!({})).await.unwrap();
        assert!(result.is_error);
        assert!(result.first_text().contains("no IP address"));
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_ipv6_network_ip_uses_ipv6_path() {
        let endpoint = "https://api.ipplus360.com/ip/geo/v1/ipv6/";
        let transport = Arc::new(
            FakeTransport::new()
                .respond(NETWORK_IP_URL, json!({"code": 200, "data": "240e::1"}))
                .respond(endpoint, json!({"code": "Success"})),
        );
        let result = handler(transport.clone()).invoke(&json!({})).await.unwrap();
        assert!(!result.is_error);
        assert_eq!(transport.calls()[1].endpoint, endpoint);
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let transport = Arc::new(FakeTransport::new().fail(NETWORK_IP_URL, 503));
        let err = handler(transport).invoke(&json!({})).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_location_failure_after_resolving_ip() {
        let city = "https://api.ipplus360.com/ip/geo/v1/city/";
        let transport = Arc::new(
            FakeTransport::new()
                .respond(NETWORK_IP_URL, json!({"code": 200, "data": "1.2.3.4"}))
                .respond(city, json!({"code": "Failed", "msg": "invalid key"})),
        );
        let result = handler(transport.clone()).invoke(&json!({})).await.unwrap();
        assert!(result.is_error);
        assert_eq!(result.first_text(), "IP address query failed: invalid key");
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_network_failure_reports_msg() {
        let payload = json!({"code": 500, "msg": "unavailable"});
        let transport = Arc::new(FakeTransport::new().respond(NETWORK_IP_URL, payload));
        let result = handler(transport).invoke(&json!({})).await.unwrap();
        assert!(result.is_error);
        assert_eq!(result.first_text(), "Failed to get current network IP: unavailable");
    }
}
