//! MCP over HTTP with server-sent events.
//!
//! `GET /sse` opens a session. Its first event (`endpoint`) carries the URL
//! the client posts JSON-RPC messages to; every response is then pushed back
//! on the stream as a `message` event.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::mcp::McpServer;

pub const SSE_PATH: &str = "/sse";
pub const MESSAGES_PATH: &str = "/messages/";

const SESSION_BUFFER: usize = 32;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("unknown session: {0}")]
    UnknownSession(String),
    #[error("invalid message: {0:#}")]
    Malformed(anyhow::Error),
}

pub struct SseState {
    server: Arc<McpServer>,
    sessions: Mutex<HashMap<String, mpsc::Sender<String>>>,
}

impl SseState {
    pub fn new(server: Arc<McpServer>) -> Self {
        Self {
            server,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn open_session(&self) -> (String, mpsc::Receiver<String>) {
        let session_id = Uuid::new_v4().simple().to_string();
        let (tx, rx) = mpsc::channel(SESSION_BUFFER);
        self.sessions.lock().await.insert(session_id.clone(), tx);
        info!("SSE session opened: {}", session_id);
        (session_id, rx)
    }

    /// Run one posted message and queue its response on the session stream.
    pub async fn deliver(&self, session_id: &str, body: &str) -> Result<(), DeliveryError> {
        let sender = self
            .sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| DeliveryError::UnknownSession(session_id.to_string()))?;

        let response = self
            .server
            .handle_line(body.trim())
            .await
            .map_err(DeliveryError::Malformed)?;

        if let Some(response) = response {
            if sender.send(response).await.is_err() {
                self.sessions.lock().await.remove(session_id);
                info!("SSE session closed: {}", session_id);
                return Err(DeliveryError::UnknownSession(session_id.to_string()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    session_id: String,
}

pub fn router(server: Arc<McpServer>) -> Router {
    Router::new()
        .route(SSE_PATH, get(open_stream))
        .route(MESSAGES_PATH, post(post_message))
        .with_state(Arc::new(SseState::new(server)))
}

pub async fn serve(server: Arc<McpServer>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(
        "AiWen geo MCP server listening on http://{}{}",
        listener.local_addr()?,
        SSE_PATH
    );
    axum::serve(listener, router(server)).await?;
    Ok(())
}

async fn open_stream(
    State(state): State<Arc<SseState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (session_id, rx) = state.open_session().await;
    let endpoint = format!("{}?session_id={}", MESSAGES_PATH, session_id);

    let messages = ReceiverStream::new(rx)
        .map(|message| Ok(Event::default().event("message").data(message)));
    let stream = tokio_stream::once(Ok(Event::default().event("endpoint").data(endpoint)))
        .chain(messages);

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

async fn post_message(
    State(state): State<Arc<SseState>>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> StatusCode {
    debug!("Message for session {}", query.session_id);
    match state.deliver(&query.session_id, &body).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(e @ DeliveryError::UnknownSession(_)) => {
            warn!("{}", e);
            StatusCode::NOT_FOUND
        }
        Err(e @ DeliveryError::Malformed(_)) => {
            warn!("{} (body: {})", e, body);
            StatusCode::BAD_REQUEST
        }
    }
}
