mod client;
mod config;
mod envelope;
mod mcp;
mod sse;
mod tools;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use client::{AiwenClient, ReqwestTransport};
use config::Config;
use mcp::McpServer;
use tools::Dispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportKind {
    Stdio,
    Sse,
}

#[derive(Debug, Parser)]
#[command(name = "aiwen-geo-mcp")]
#[command(about = "MCP server for AiWen IP geolocation and IP intelligence")]
struct Args {
    #[arg(long, value_enum, default_value_t = TransportKind::Stdio)]
    transport: TransportKind,
    /// Bind address for the SSE transport
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = 8000)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let client = AiwenClient::new(config, Arc::new(ReqwestTransport::new()));
    let server = McpServer::new(Dispatcher::new(Arc::new(client)));

    match args.transport {
        TransportKind::Stdio => {
            info!("AiWen geo MCP server running on stdio");
            server.run().await
        }
        TransportKind::Sse => {
            let addr: SocketAddr = format!("{}:{}", args.host, args.port)
                .parse()
                .with_context(|| format!("Invalid bind address {}:{}", args.host, args.port))?;
            sse::serve(Arc::new(server), addr).await
        }
    }
}
