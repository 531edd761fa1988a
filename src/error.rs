//! Error taxonomy
//!
//! Each subsystem owns its own error enum; `RealtimeError` unifies them
//! behind the façade's public `Result` type.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("handler not found for \"{0}\"")]
    HandlerNotFound(String),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("API key refused in browser-like environment without dangerouslyAllowAPIKeyInBrowser")]
    BrowserApiKeyRefused,

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("not connected")]
    NotConnected,

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("failed to serialize outbound event: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("tool \"{0}\" is not registered")]
    NotFound(String),

    #[error("tool must have a non-empty name")]
    EmptyName,

    #[error("handler failed: {0}")]
    HandlerFailed(String),

    #[error("failed to parse arguments as JSON: {0}")]
    ArgumentsParse(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid config section: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("cannot cancel: no item with id \"{0}\"")]
    ItemNotFound(String),

    #[error("cannot cancel item \"{0}\": not an assistant message")]
    NotAssistantMessage(String),

    #[error("cannot cancel item \"{0}\": no audio content part")]
    NoAudioContent(String),

    #[error("tool registration requires a non-empty name")]
    EmptyToolName,
}

#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error(transparent)]
    EventBus(#[from] EventBusError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

pub type Result<T> = std::result::Result<T, RealtimeError>;
