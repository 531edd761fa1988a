//! Public façade (§4.4)
//!
//! Composes EventBus + Transport + Conversation + Config + Tools and binds
//! them with the three dispatch rules: event mirroring, conversation
//! routing, and the tool-call closure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock as SyncRwLock;
use serde_json::Value;
use tokio::sync::RwLock as AsyncRwLock;
use tracing::warn;

use crate::config::{Config, ConfigPatch};
use crate::conversation::{Conversation, Delta};
use crate::error::ClientError;
use crate::event_bus::{EventBus, Handler};
use crate::item::{ContentPart, Item, ItemStatus, ms_for_sample_count};
use crate::tool::{ToolDefinition, ToolHandler, ToolRegistry};
use crate::transport::{Transport, TransportOptions};
use crate::utils::i16_to_base64;
use crate::wire::{ClientCommand, NewItem, ServerEvent};

/// Ergonomic, caller-facing content parts for `send_user_message_content`.
/// Normalized into wire `ContentPart`s before sending: `Text`/`AudioPcm`
/// land on the `text`/`audio` wire tags, with raw PCM encoded to base64.
#[derive(Debug, Clone)]
pub enum UserContentPart {
    Text(String),
    AudioPcm(Vec<i16>),
    AudioBase64(String),
    Image { image_b64: String, caption: Option<String> },
}

impl UserContentPart {
    fn into_wire(self) -> ContentPart {
        match self {
            UserContentPart::Text(text) => ContentPart::Text { text },
            UserContentPart::AudioPcm(samples) => ContentPart::Audio {
                audio: Some(i16_to_base64(&samples)),
                transcript: None,
            },
            UserContentPart::AudioBase64(audio) => ContentPart::Audio {
                audio: Some(audio),
                transcript: None,
            },
            UserContentPart::Image { image_b64, caption } => ContentPart::Image {
                image: image_b64,
                caption,
            },
        }
    }
}

fn delta_value(delta: Option<Delta>) -> Value {
    delta
        .map(|d| serde_json::to_value(d).unwrap_or(Value::Null))
        .unwrap_or(Value::Null)
}

fn mirror_handler(bus: EventBus, source: &'static str) -> Handler {
    Arc::new(move |event: &Value| {
        let envelope = serde_json::json!({
            "time": chrono::Utc::now().to_rfc3339(),
            "source": source,
            "event": event,
            "type": "realtime.event",
        });
        bus.dispatch("realtime.event", envelope);
    })
}

async fn run_tool_closure(
    tools: Arc<SyncRwLock<ToolRegistry>>,
    transport: Arc<AsyncRwLock<Transport>>,
    call_id: String,
    name: String,
    arguments_raw: String,
) {
    let outcome: Result<Value, String> = match serde_json::from_str::<Value>(&arguments_raw) {
        Ok(args) => {
            let registry = tools.read().clone();
            registry.invoke(&name, args).await.map_err(|e| e.to_string())
        }
        Err(err) => Err(format!("failed to parse tool arguments: {err}")),
    };

    let output = match outcome {
        Ok(value) => serde_json::to_string(&value).unwrap_or_default(),
        Err(message) => serde_json::json!({ "error": message }).to_string(),
    };

    let transport = transport.read().await;
    if let Err(err) = transport.send(ClientCommand::ConversationItemCreate {
        item: NewItem::function_call_output(call_id, output),
    }) {
        warn!(%err, "failed to send function_call_output");
        return;
    }
    if let Err(err) = transport.send(ClientCommand::ResponseCreate {}) {
        warn!(%err, "failed to send response.create after tool closure");
    }
}

/// User-facing façade. Cheap to clone: every field is `Arc`-backed, the same
/// way `EventBus` is — there is exactly one logical client per session
/// (§9 global-state avoidance), but nothing stops sharing handles to it.
#[derive(Clone)]
pub struct Client {
    bus: EventBus,
    transport: Arc<AsyncRwLock<Transport>>,
    conversation: Arc<SyncRwLock<Conversation>>,
    config: Arc<SyncRwLock<Config>>,
    tools: Arc<SyncRwLock<ToolRegistry>>,
    input_audio: Arc<SyncRwLock<Vec<i16>>>,
    session_created: Arc<AtomicBool>,
}

impl Client {
    pub fn new(options: TransportOptions) -> Self {
        let bus = EventBus::new();
        let transport = Arc::new(AsyncRwLock::new(Transport::new(options, bus.clone())));

        let client = Self {
            bus,
            transport,
            conversation: Arc::new(SyncRwLock::new(Conversation::new())),
            config: Arc::new(SyncRwLock::new(Config::defaults())),
            tools: Arc::new(SyncRwLock::new(ToolRegistry::new())),
            input_audio: Arc::new(SyncRwLock::new(Vec::new())),
            session_created: Arc::new(AtomicBool::new(false)),
        };

        client.wire_rule1_mirroring();
        client.wire_rule2_and_rule3_routing();
        client
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    fn wire_rule1_mirroring(&self) {
        self.bus.on("client.*", mirror_handler(self.bus.clone(), "client"));
        self.bus.on("server.*", mirror_handler(self.bus.clone(), "server"));

        let flag = self.session_created.clone();
        self.bus.on(
            "server.session.created",
            Arc::new(move |_event: &Value| {
                flag.store(true, Ordering::SeqCst);
            }),
        );
    }

    fn wire_rule2_and_rule3_routing(&self) {
        let conversation = self.conversation.clone();
        let bus = self.bus.clone();
        let tools = self.tools.clone();
        let transport = self.transport.clone();
        let input_audio = self.input_audio.clone();

        self.bus.on(
            "server.*",
            Arc::new(move |raw: &Value| {
                let Some(event_type) = raw.get("type").and_then(Value::as_str) else {
                    return;
                };
                let event = ServerEvent::parse(event_type, raw);

                if let ServerEvent::Error(raw_error) = &event {
                    let error = raw_error.get("error").cloned().unwrap_or_else(|| raw_error.clone());
                    bus.dispatch("client.error", serde_json::json!({ "error": error }));
                }

                let pending_audio = matches!(event, ServerEvent::InputAudioBufferSpeechStopped(_))
                    .then(|| input_audio.read().clone());

                let (item, delta) = conversation
                    .write()
                    .process_event(&event, pending_audio.as_deref());

                if matches!(event, ServerEvent::InputAudioBufferSpeechStarted(_)) {
                    bus.dispatch("conversation.interrupted", Value::Null);
                }

                let Some(item) = item else {
                    return;
                };
                let item_value = serde_json::to_value(&item).unwrap_or(Value::Null);

                bus.dispatch(
                    "conversation.updated",
                    serde_json::json!({ "item": item_value, "delta": delta_value(delta) }),
                );

                if matches!(event, ServerEvent::ConversationItemCreated(_)) {
                    bus.dispatch("conversation.item.appended", item_value.clone());
                }

                if item.status == ItemStatus::Completed {
                    bus.dispatch("conversation.item.completed", item_value.clone());

                    if let Some(tool) = item.formatted.tool.clone() {
                        tokio::spawn(run_tool_closure(
                            tools.clone(),
                            transport.clone(),
                            tool.call_id,
                            tool.name,
                            tool.arguments,
                        ));
                    }
                }
            }),
        );
    }

    pub async fn connect(&self) -> Result<(), crate::error::RealtimeError> {
        self.transport.write().await.connect().await?;
        Ok(())
    }

    pub async fn disconnect(&self) {
        self.transport.write().await.disconnect().await;
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.read().await.is_connected()
    }

    pub fn has_session_created(&self) -> bool {
        self.session_created.load(Ordering::SeqCst)
    }

    async fn send_session_update(&self) -> Result<(), crate::error::RealtimeError> {
        if !self.is_connected().await {
            return Ok(());
        }
        let session = serde_json::to_value(&*self.config.read())
            .map_err(crate::error::TransportError::Serialize)?;
        self.transport
            .read()
            .await
            .send(ClientCommand::SessionUpdate { session })?;
        Ok(())
    }

    pub async fn update_config(&self, patch: ConfigPatch) -> Result<(), crate::error::RealtimeError> {
        self.config.write().merge(patch);
        self.send_session_update().await
    }

    pub async fn register_tool(
        &self,
        definition: ToolDefinition,
        handler: ToolHandler,
    ) -> Result<(), crate::error::RealtimeError> {
        if definition.name.trim().is_empty() {
            return Err(ClientError::EmptyToolName.into());
        }
        self.tools.write().register(definition, handler)?;
        self.sync_tools_into_config();
        self.send_session_update().await
    }

    pub async fn unregister_tool(&self, name: &str) -> Result<(), crate::error::RealtimeError> {
        self.tools.write().unregister(name);
        self.sync_tools_into_config();
        self.send_session_update().await
    }

    fn sync_tools_into_config(&self) {
        let wire_tools = self.tools.read().wire_tools();
        self.config.write().model.tools = Some(wire_tools);
    }

    pub fn get_tools(&self) -> Vec<ToolDefinition> {
        self.tools.read().definitions()
    }

    pub async fn reset(&self) -> Result<(), crate::error::RealtimeError> {
        self.tools.write().clear();
        *self.config.write() = Config::defaults();
        self.send_session_update().await
    }

    pub async fn send_user_message_content(
        &self,
        parts: Vec<UserContentPart>,
    ) -> Result<(), crate::error::RealtimeError> {
        let content: Vec<ContentPart> = parts.into_iter().map(UserContentPart::into_wire).collect();
        self.transport.read().await.send(ClientCommand::ConversationItemCreate {
            item: NewItem::user_message(content),
        })?;
        self.create_response().await
    }

    pub async fn append_input_audio(&self, samples: &[i16]) -> Result<(), crate::error::RealtimeError> {
        self.transport
            .read()
            .await
            .send(ClientCommand::InputAudioBufferAppend {
                audio: i16_to_base64(samples),
            })?;
        self.input_audio.write().extend_from_slice(samples);
        Ok(())
    }

    pub async fn create_response(&self) -> Result<(), crate::error::RealtimeError> {
        let no_turn_detection = self.config.read().hearing.has_no_turn_detection();
        let pending = if no_turn_detection {
            let mut buffer = self.input_audio.write();
            if buffer.is_empty() {
                None
            } else {
                Some(std::mem::take(&mut *buffer))
            }
        } else {
            None
        };

        if let Some(audio) = pending {
            self.transport
                .read()
                .await
                .send(ClientCommand::InputAudioBufferCommit {})?;
            self.conversation.write().queue_input_audio(audio);
        }

        self.transport.read().await.send(ClientCommand::ResponseCreate {})?;
        Ok(())
    }

    pub async fn cancel_response(
        &self,
        item_id: Option<&str>,
        sample_count: usize,
    ) -> Result<(), crate::error::RealtimeError> {
        let Some(item_id) = item_id else {
            self.transport
                .read()
                .await
                .send(ClientCommand::ResponseCancel { response_id: None })?;
            return Ok(());
        };

        let content_index = {
            let conversation = self.conversation.read();
            let item = conversation
                .get_item(item_id)
                .ok_or_else(|| ClientError::ItemNotFound(item_id.to_string()))?;
            require_cancelable(item)?
        };

        self.transport
            .read()
            .await
            .send(ClientCommand::ResponseCancel { response_id: None })?;
        self.transport
            .read()
            .await
            .send(ClientCommand::ConversationItemTruncate {
                item_id: item_id.to_string(),
                content_index,
                audio_end_ms: ms_for_sample_count(sample_count),
            })?;
        Ok(())
    }

    pub async fn delete_item(&self, item_id: &str) -> Result<(), crate::error::RealtimeError> {
        self.transport
            .read()
            .await
            .send(ClientCommand::ConversationItemDelete {
                item_id: item_id.to_string(),
            })?;
        Ok(())
    }

    pub async fn wait_for_next_item(&self) -> Option<Item> {
        let value = self.bus.wait_for_next("conversation.item.appended", None).await?;
        serde_json::from_value(value).ok()
    }

    pub async fn wait_for_next_completed_item(&self) -> Option<Item> {
        let value = self
            .bus
            .wait_for_next("conversation.item.completed", None)
            .await?;
        serde_json::from_value(value).ok()
    }

    pub fn get_turn_detection_type(&self) -> Option<&'static str> {
        self.config.read().hearing.turn_detection_type()
    }

    pub fn get_item(&self, item_id: &str) -> Option<Item> {
        self.conversation.read().get_item(item_id).cloned()
    }

    /// The accumulator Conversation is holding to attach to the next user
    /// message, if `create_response` has drained one (§3 Input audio accumulator).
    pub fn queued_input_audio(&self) -> Option<Vec<i16>> {
        self.conversation.read().queued_input_audio().map(|s| s.to_vec())
    }
}

fn require_cancelable(item: &Item) -> Result<usize, ClientError> {
    if !item.is_assistant_message() {
        return Err(ClientError::NotAssistantMessage(item.id.clone()));
    }
    item.audio_content_index()
        .ok_or_else(|| ClientError::NoAudioContent(item.id.clone()))
}
