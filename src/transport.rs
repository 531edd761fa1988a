//! WebSocket wire protocol layer (§4.2)
//!
//! Owns one WebSocket, frames outbound commands, ingests inbound frames,
//! and mirrors every event through the EventBus as `client.<type>` /
//! `server.<type>`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use http::Request;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::event_bus::EventBus;
use crate::utils::generate_event_id;
use crate::wire::ClientCommand;

/// `{url, apiKey, dangerouslyAllowAPIKeyInBrowser?, debug?}` (§6 client option surface).
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub url: String,
    pub api_key: Option<String>,
    pub dangerously_allow_api_key_in_browser: bool,
    pub debug: bool,
    /// Detection hook for a "browser-like" host environment (§9 API-key
    /// safety). The core has no DOM to inspect, so callers embedding this in
    /// a browser-like host supply `true`; native/headless hosts leave it `false`.
    pub browser_like_environment: bool,
}

impl TransportOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            dangerously_allow_api_key_in_browser: false,
            debug: false,
            browser_like_environment: false,
        }
    }
}

const SENSITIVE_KEYS: [&str; 3] = ["api_key", "authorization", "token"];

fn redact_for_log(command: &ClientCommand) -> Value {
    let mut value = serde_json::to_value(command).unwrap_or(Value::Null);
    redact_in_place(&mut value);
    value
}

/// Walks the whole payload, not just its top level: `session.update`'s
/// `session` field is an arbitrary nested `Value`, so a secret-bearing key
/// can appear at any depth.
fn redact_in_place(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if SENSITIVE_KEYS.contains(&key.as_str()) {
                    *v = Value::String("<redacted>".to_string());
                } else {
                    redact_in_place(v);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_in_place),
        _ => {}
    }
}

/// Owns the live WebSocket sink once connected; torn down on disconnect.
/// `alive` is flipped false by the reader task on a socket error or peer
/// close, since that task runs detached and can't clear `Transport.connection`
/// itself — `is_connected`/`send` check it so state reflects reality even
/// before `disconnect()` is called.
struct Connection {
    outbound: mpsc::UnboundedSender<Message>,
    alive: Arc<AtomicBool>,
    reader_task: tokio::task::JoinHandle<()>,
    writer_task: tokio::task::JoinHandle<()>,
}

pub struct Transport {
    options: TransportOptions,
    bus: EventBus,
    connection: Option<Connection>,
}

impl Transport {
    pub fn new(options: TransportOptions, bus: EventBus) -> Self {
        Self {
            options,
            bus,
            connection: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.alive.load(Ordering::SeqCst))
    }

    /// Build the subprotocol list per §4.2: `realtime`, an api-key token,
    /// and a beta marker, with the naming depending on provider mode. This
    /// core targets one provider (OpenAI-compatible), so the
    /// `openai-insecure-api-key.<key>` / `openai-beta.realtime-v1` forms are
    /// used.
    fn subprotocols(&self) -> Vec<String> {
        let mut protocols = vec!["realtime".to_string()];
        if let Some(key) = &self.options.api_key {
            protocols.push(format!("openai-insecure-api-key.{key}"));
        }
        protocols.push("openai-beta.realtime-v1".to_string());
        protocols
    }

    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if self.options.api_key.is_some()
            && self.options.browser_like_environment
            && !self.options.dangerously_allow_api_key_in_browser
        {
            return Err(TransportError::BrowserApiKeyRefused);
        }

        let mut builder = Request::builder().uri(&self.options.url);
        builder = builder.header("Sec-WebSocket-Protocol", self.subprotocols().join(", "));
        if let Some(key) = &self.options.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        let request = builder
            .body(())
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let alive = Arc::new(AtomicBool::new(true));

        let writer_task = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(err) = write.send(message).await {
                    error!(%err, "websocket write failed");
                    break;
                }
            }
        });

        let bus_for_reader = self.bus.clone();
        let alive_for_reader = alive.clone();
        let reader_task = tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => Self::handle_inbound_text(&bus_for_reader, &text),
                    Ok(Message::Close(_)) => {
                        info!("websocket closed by peer");
                        alive_for_reader.store(false, Ordering::SeqCst);
                        bus_for_reader.dispatch("client.disconnected", Value::Null);
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        error!(%err, "websocket read error");
                        alive_for_reader.store(false, Ordering::SeqCst);
                        bus_for_reader.dispatch(
                            "client.error",
                            serde_json::json!({ "error": err.to_string() }),
                        );
                        bus_for_reader.dispatch("client.disconnected", Value::Null);
                        break;
                    }
                }
            }
        });

        self.connection = Some(Connection {
            outbound: outbound_tx,
            alive,
            reader_task,
            writer_task,
        });

        self.bus.dispatch("client.connected", Value::Null);
        Ok(())
    }

    fn handle_inbound_text(bus: &EventBus, text: &str) {
        let parsed: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(err) => {
                warn!(%err, "dropping inbound frame: invalid JSON");
                return;
            }
        };

        let Some(event_type) = parsed.get("type").and_then(Value::as_str) else {
            warn!("dropping inbound frame: missing \"type\"");
            return;
        };

        bus.dispatch(&format!("server.{event_type}"), parsed.clone());
    }

    /// Send one outbound command. Returns `false` (never errors) if not
    /// connected, per §4.2: sends are dropped, not queued, while disconnected.
    pub fn send(&self, command: ClientCommand) -> Result<bool, TransportError> {
        let Some(connection) = self
            .connection
            .as_ref()
            .filter(|c| c.alive.load(Ordering::SeqCst))
        else {
            return Ok(false);
        };

        let event_id = generate_event_id();
        let mut payload = serde_json::to_value(&command)?;
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("event_id".to_string(), Value::String(event_id));
        }

        if self.options.debug {
            debug!(payload = %redact_for_log(&command), "outbound command");
        }

        let text = serde_json::to_string(&payload)?;
        connection
            .outbound
            .send(Message::Text(text))
            .map_err(|_| TransportError::NotConnected)?;

        self.bus
            .dispatch(&format!("client.{}", command.type_str()), payload);
        Ok(true)
    }

    pub async fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.reader_task.abort();
            connection.writer_task.abort();
        }
        self.bus.dispatch("client.disconnected", Value::Null);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_strips_nested_api_key_field() {
        let cmd = ClientCommand::SessionUpdate {
            session: serde_json::json!({
                "model": "x",
                "auth": {"api_key": "sk-secret", "authorization": "Bearer sk-secret"},
            }),
        };
        let redacted = redact_for_log(&cmd);
        assert_eq!(redacted["type"], "session.update");
        assert_eq!(redacted["session"]["auth"]["api_key"], "<redacted>");
        assert_eq!(redacted["session"]["auth"]["authorization"], "<redacted>");
        assert_eq!(redacted["session"]["model"], "x");
    }

    #[test]
    fn subprotocols_include_api_key_token() {
        let mut options = TransportOptions::new("wss://example.test");
        options.api_key = Some("abc123".to_string());
        let transport = Transport::new(options, EventBus::new());
        let protocols = transport.subprotocols();
        assert_eq!(protocols[0], "realtime");
        assert!(protocols.iter().any(|p| p == "openai-insecure-api-key.abc123"));
        assert_eq!(protocols.last().unwrap(), "openai-beta.realtime-v1");
    }

    #[tokio::test]
    async fn connect_refuses_api_key_in_browser_without_override() {
        let mut options = TransportOptions::new("wss://example.test");
        options.api_key = Some("abc123".to_string());
        options.browser_like_environment = true;
        let mut transport = Transport::new(options, EventBus::new());

        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::BrowserApiKeyRefused));
    }

    #[test]
    fn send_without_connection_returns_false() {
        let transport = Transport::new(TransportOptions::new("wss://example.test"), EventBus::new());
        let sent = transport.send(ClientCommand::ResponseCreate {}).unwrap();
        assert!(!sent);
    }

    #[tokio::test]
    async fn dead_connection_reports_disconnected_and_refuses_send() {
        let mut transport = Transport::new(TransportOptions::new("wss://example.test"), EventBus::new());
        let (outbound, _rx) = mpsc::unbounded_channel();
        transport.connection = Some(Connection {
            outbound,
            alive: Arc::new(AtomicBool::new(false)),
            reader_task: tokio::spawn(async {}),
            writer_task: tokio::spawn(async {}),
        });

        assert!(!transport.is_connected());
        let sent = transport.send(ClientCommand::ResponseCreate {}).unwrap();
        assert!(!sent);
    }

    #[test]
    fn handle_inbound_text_dispatches_server_prefixed_topic() {
        let bus = EventBus::new();
        let received = std::sync::Arc::new(parking_lot::Mutex::new(None));
        let received_clone = received.clone();
        bus.on(
            "server.session.created",
            std::sync::Arc::new(move |event: &Value| {
                *received_clone.lock() = Some(event.clone());
            }),
        );

        Transport::handle_inbound_text(&bus, r#"{"type":"session.created"}"#);
        assert!(received.lock().is_some());
    }

    #[test]
    fn handle_inbound_text_drops_missing_type_silently() {
        let bus = EventBus::new();
        Transport::handle_inbound_text(&bus, r#"{"foo": 1}"#);
    }

    #[test]
    fn handle_inbound_text_drops_invalid_json_silently() {
        let bus = EventBus::new();
        Transport::handle_inbound_text(&bus, "not json");
    }
}
