//! JSON-RPC transports: HTTP POST and WebSocket.
//!
//! Both return the server's `result` object. Over WebSocket the response
//! envelope is flattened into the same shape, so callers never care which
//! transport answered.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::ledger::types::{LedgerError, LedgerResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One RPC endpoint.
pub enum Endpoint {
    Http(HttpEndpoint),
    WebSocket(WsEndpoint),
}

impl Endpoint {
    /// Pick the transport from the URL scheme.
    pub fn from_url(raw: &str, http: &reqwest::Client) -> LedgerResult<Self> {
        let url: Url = raw
            .parse()
            .map_err(|e| LedgerError::Transport(format!("Invalid RPC URL '{}': {}", raw, e)))?;

        match url.scheme() {
            "http" | "https" => Ok(Self::Http(HttpEndpoint {
                url,
                client: http.clone(),
            })),
            "ws" | "wss" => Ok(Self::WebSocket(WsEndpoint::new(url))),
            other => Err(LedgerError::Transport(format!(
                "Unsupported RPC scheme '{}' in '{}'",
                other, raw
            ))),
        }
    }

    pub fn url(&self) -> &Url {
        match self {
            Self::Http(e) => &e.url,
            Self::WebSocket(e) => &e.url,
        }
    }

    /// Send one request and return the `result` object.
    pub async fn call(&self, method: &str, params: Value) -> LedgerResult<Value> {
        match self {
            Self::Http(e) => e.call(method, params).await,
            Self::WebSocket(e) => e.call(method, params).await,
        }
    }
}

/// JSON-RPC over HTTP, `{"method": .., "params": [..]}`.
pub struct HttpEndpoint {
    url: Url,
    client: reqwest::Client,
}

impl HttpEndpoint {
    async fn call(&self, method: &str, params: Value) -> LedgerResult<Value> {
        let body = json!({ "method": method, "params": [params] });
        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    LedgerError::Connect(e.to_string())
                } else {
                    LedgerError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Transport(format!("HTTP status {}", status)));
        }

        let mut envelope: Value = response
            .json()
            .await
            .map_err(|e| LedgerError::MalformedResponse(e.to_string()))?;

        match envelope.get_mut("result") {
            Some(result) => Ok(result.take()),
            None => Err(LedgerError::MalformedResponse("response has no result".to_string())),
        }
    }
}

/// Request/response over a single WebSocket connection.
///
/// Requests are serialized on the connection; responses are matched by `id`
/// and unsolicited stream messages are skipped. The connection lock is held
/// for the whole send and receive, so concurrent callers (for example several
/// confirmation loops) queue behind the slowest outstanding request. Use an
/// HTTP endpoint when that head-of-line blocking matters.
pub struct WsEndpoint {
    url: Url,
    connection: Mutex<Option<WsStream>>,
    next_id: AtomicU64,
}

impl WsEndpoint {
    fn new(url: Url) -> Self {
        Self {
            url,
            connection: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    async fn call(&self, method: &str, params: Value) -> LedgerResult<Value> {
        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            let (stream, _) = connect_async(self.url.as_str())
                .await
                .map_err(|e| LedgerError::Connect(format!("WebSocket connect failed: {}", e)))?;
            tracing::debug!(url = %self.url, "WebSocket connected");
            *guard = Some(stream);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut request = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        request.insert("id".to_string(), json!(id));
        request.insert("command".to_string(), json!(method));

        let result = match guard.as_mut() {
            Some(stream) => exchange(stream, id, Value::Object(request)).await,
            None => Err(LedgerError::Connect("WebSocket not connected".to_string())),
        };

        // A broken connection is rebuilt on the next call.
        if matches!(result, Err(ref e) if e.is_transport()) {
            *guard = None;
        }
        result
    }
}

async fn exchange(stream: &mut WsStream, id: u64, request: Value) -> LedgerResult<Value> {
    stream
        .send(Message::text(request.to_string()))
        .await
        .map_err(|e| LedgerError::Transport(e.to_string()))?;

    while let Some(message) = stream.next().await {
        let message = message.map_err(|e| LedgerError::Transport(e.to_string()))?;
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let envelope: Value = serde_json::from_str(text.as_str())
            .map_err(|e| LedgerError::MalformedResponse(e.to_string()))?;
        if envelope.get("id").and_then(Value::as_u64) != Some(id) {
            continue;
        }
        return Ok(flatten_ws_envelope(envelope));
    }

    Err(LedgerError::Transport("WebSocket closed".to_string()))
}

/// WebSocket responses carry errors at the top level; move them into the
/// `result` shape the HTTP transport returns.
fn flatten_ws_envelope(mut envelope: Value) -> Value {
    if envelope.get("status").and_then(Value::as_str) == Some("error") {
        return json!({
            "status": "error",
            "error": envelope.get("error").cloned().unwrap_or(Value::Null),
            "error_message": envelope.get("error_message").cloned().unwrap_or(Value::Null),
        });
    }
    match envelope.get_mut("result") {
        Some(result) => result.take(),
        None => envelope,
    }
}
