//! Single-IP lookups: location, usage scene, whois, AS mapping, host,
//! risk portrait, identity check and industry classification.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::client::{AiwenClient, Operation};
use crate::envelope::InvocationResult;
use crate::tools::ToolHandler;

/// Business success marker of the geolocation endpoints.
const LOCATION_SUCCESS: &str = "Success";

pub struct IpLookup {
    operation: Operation,
    client: Arc<AiwenClient>,
}

impl IpLookup {
    pub fn new(operation: Operation, client: Arc<AiwenClient>) -> Self {
        Self { operation, client }
    }

    /// Location payloads must carry `code: "Success"`; every other
    /// operation returns the remote payload as-is, business errors included.
    pub async fn lookup(&self, ip: &str) -> Result<InvocationResult> {
        let payload = self.client.query(self.operation, ip).await?;
        debug!("{:?} response for {}: {}", self.operation, ip, payload);

        if self.operation == Operation::Location && payload["code"] != LOCATION_SUCCESS {
            return Ok(InvocationResult::error(format!(
                "IP address query failed: {}",
                failure_reason(&payload)
            )));
        }

        InvocationResult::json(&payload)
    }
}

/// `msg` (or `message`) when present, otherwise the raw `code`.
pub(crate) fn failure_reason(payload: &Value) -> String {
    let message = ["msg", "message"]
        .iter()
        .filter_map(|key| payload[*key].as_str())
        .map(str::trim)
        .find(|msg| !msg.is_empty());

    match (message, &payload["code"]) {
        (Some(msg), _) => msg.to_string(),
        (None, Value::Null) => "unknown error".to_string(),
        (None, Value::String(code)) => code.clone(),
        (None, code) => code.to_string(),
    }
}

#[async_trait]
impl ToolHandler for IpLookup {
    async fn invoke(&self, arguments: &Value) -> Result<InvocationResult> {
        let ip = arguments["ip"]
            .as_str()
            .context("Missing required parameter: ip")?;
        self.lookup(ip).await
    }
}
