//! Tool catalog and dispatch.

pub mod ip_lookup;
pub mod network_ip;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::client::{AiwenClient, Operation};
use crate::envelope::InvocationResult;
use ip_lookup::IpLookup;
use network_ip::NetworkIp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    IpLocation,
    UserNetworkIp,
    UsageScene,
    WhoisInfo,
    AsMapping,
    HostInfo,
    RiskPortrait,
    IdentityCheck,
    IndustryClassify,
}

impl ToolName {
    /// Catalog order.
    pub const ALL: [ToolName; 9] = [
        ToolName::IpLocation,
        ToolName::UserNetworkIp,
        ToolName::UsageScene,
        ToolName::WhoisInfo,
        ToolName::AsMapping,
        ToolName::HostInfo,
        ToolName::RiskPortrait,
        ToolName::IdentityCheck,
        ToolName::IndustryClassify,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::IpLocation => "aiwen_ip_location",
            ToolName::UserNetworkIp => "user_network_ip",
            ToolName::UsageScene => "ip_usage_scene",
            ToolName::WhoisInfo => "ip_whois_info",
            ToolName::AsMapping => "ip_as_mapping",
            ToolName::HostInfo => "ip_host_info",
            ToolName::RiskPortrait => "ip_risk_portrait",
            ToolName::IdentityCheck => "ip_identity_check",
            ToolName::IndustryClassify => "ip_industry_classify",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }

    /// Remote operation behind the tool; `None` for `user_network_ip`,
    /// which resolves its IP first and then performs a location lookup.
    pub fn operation(self) -> Option<Operation> {
        match self {
            ToolName::IpLocation => Some(Operation::Location),
            ToolName::UserNetworkIp => None,
            ToolName::UsageScene => Some(Operation::UsageScene),
            ToolName::WhoisInfo => Some(Operation::Whois),
            ToolName::AsMapping => Some(Operation::AsMapping),
            ToolName::HostInfo => Some(Operation::HostInfo),
            ToolName::RiskPortrait => Some(Operation::RiskPortrait),
            ToolName::IdentityCheck => Some(Operation::IdentityCheck),
            ToolName::IndustryClassify => Some(Operation::IndustryClassify),
        }
    }

    fn description(self) -> &'static str {
        match self {
            ToolName::IpLocation => {
                "IP定位 根据IP地址获取IP位置(城市级)、使用者、运营商、经纬度等信息"
            }
            ToolName::UserNetworkIp => {
                "获取当前网络IP地址 根据当前网络IP地址获取位置信息"
            }
            ToolName::UsageScene => {
                "IP应用场景 根据IP地址获取IP的应用场景，如数据中心、家庭宽带、企业专线、移动网络等"
            }
            ToolName::WhoisInfo => {
                "IP WHOIS 根据IP地址获取IP的WHOIS注册信息，如所属网段、注册机构、联系方式等"
            }
            ToolName::AsMapping => {
                "IP AS映射 根据IP地址获取IP所属自治系统(AS)的编号、名称及运营机构"
            }
            ToolName::HostInfo => {
                "IP宿主信息 根据IP地址获取IP的宿主单位、运营商及网络类型"
            }
            ToolName::RiskPortrait => {
                "IP风险画像 根据IP地址获取IP的风险评分及风险标签(代理、VPN、秒拨、数据中心等)"
            }
            ToolName::IdentityCheck => {
                "IP真人识别 根据IP地址判断IP背后是真实用户还是机器流量"
            }
            ToolName::IndustryClassify => {
                "IP行业分类 根据IP地址获取IP使用者所属的行业类别"
            }
        }
    }

    fn input_schema(self) -> Value {
        let ip_description = match self {
            ToolName::UsageScene => "IP地址 IPv4或IPv6地址",
            _ => "IP地址 IPv4地址",
        };
        match self {
            ToolName::UserNetworkIp => json!({
                "type": "object",
                "properties": {}
            }),
            _ => json!({
                "type": "object",
                "properties": {
                    "ip": {
                        "type": "string",
                        "description": ip_description
                    }
                },
                "required": ["ip"]
            }),
        }
    }

    pub fn descriptor(self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.as_str(),
            description: self.description(),
            input_schema: self.input_schema(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// The static tool catalog, in `tools/list` order.
pub fn catalog() -> Vec<ToolDescriptor> {
    ToolName::ALL.into_iter().map(ToolName::descriptor).collect()
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Errors are turned into `Error: <message>` results by the dispatcher.
    async fn invoke(&self, arguments: &Value) -> Result<InvocationResult>;
}

pub struct Dispatcher {
    handlers: HashMap<ToolName, Box<dyn ToolHandler>>,
}

impl Dispatcher {
    pub fn new(client: Arc<AiwenClient>) -> Self {
        let mut dispatcher = Self {
            handlers: HashMap::new(),
        };

        for tool in ToolName::ALL {
            let handler: Box<dyn ToolHandler> = match tool.operation() {
                Some(operation) => Box::new(IpLookup::new(operation, client.clone())),
                None => Box::new(NetworkIp::new(client.clone())),
            };
            dispatcher.register(tool, handler);
        }

        info!("Registered {} tools", dispatcher.handlers.len());
        dispatcher
    }

    pub fn register(&mut self, tool: ToolName, handler: Box<dyn ToolHandler>) {
        self.handlers.insert(tool, handler);
    }

    pub async fn handle_invocation(&self, name: &str, arguments: &Value) -> InvocationResult {
        let Some(handler) = ToolName::from_name(name).and_then(|tool| self.handlers.get(&tool))
        else {
            warn!("Unknown tool requested: {}", name);
            return InvocationResult::error(format!("Unknown tool: {name}"));
        };

        info!("Calling tool: {}", name);
        match handler.invoke(arguments).await {
            Ok(result) => {
                if result.is_error {
                    warn!("Tool {} reported failure: {}", name, result.first_text());
                }
                result
            }
            Err(e) => {
                warn!("Tool {} failed: {:#}", name, e);
                InvocationResult::error(format!("Error: {e}"))
            }
        }
    }
}
