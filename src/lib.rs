//! Realtime Client Core
//!
//! Core of a bidirectional realtime conversational-AI client: a full-duplex
//! protocol engine that maintains a long-lived WebSocket session with a
//! remote generative-model service, streams user text/audio/image inputs
//! into it, receives incremental assistant text/audio/tool-call streams,
//! reconstructs them into structured conversation items, and mediates tool
//! invocations back to the server.
//!
//! # Architecture
//!
//! Five components, leaves first:
//! - **Utils** — primitive codec helpers: PCM16↔base64, Int16 concatenation, ID generation.
//! - **EventBus** — name-keyed pub/sub with persistent/one-shot handlers and wildcard routing.
//! - **Transport** — owns the WebSocket, frames outbound commands, mirrors inbound events.
//! - **Conversation** — reconstructs ordered items from incremental deltas.
//! - **Client** — public façade wiring Transport ↔ Conversation ↔ Config ↔ Tools.

pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod event_bus;
pub mod item;
pub mod tool;
pub mod transport;
pub mod utils;
pub mod wire;

pub use client::{Client, UserContentPart};
pub use config::{Config, ConfigPatch};
pub use conversation::{Conversation, Delta};
pub use error::{RealtimeError, Result};
pub use event_bus::EventBus;
pub use item::{ContentPart, Item, ItemId, ItemKind, ItemStatus, Role};
pub use tool::{ToolDefinition, ToolRegistry};
pub use transport::{Transport, TransportOptions};
