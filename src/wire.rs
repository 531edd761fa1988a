//! Wire protocol types (§6)
//!
//! Outbound commands are plain tagged structs; inbound events are parsed
//! off a `type` string into a closed sum type with a string-keyed fallback
//! for forward compatibility, per §9's "dynamic event payloads -> tagged
//! variants" design note.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::item::{ContentPart, Item, Role};

/// Creation payload for `conversation.item.create`: a subset of `Item`'s
/// fields, since the server assigns `id`/`status` on arrival.
#[derive(Debug, Clone, Serialize)]
pub struct NewItem {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ContentPart>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl NewItem {
    pub fn user_message(content: Vec<ContentPart>) -> Self {
        Self {
            kind: "message",
            role: Some(Role::User),
            content: Some(content),
            call_id: None,
            output: None,
            name: None,
        }
    }

    pub fn function_call_output(call_id: String, output: String) -> Self {
        Self {
            kind: "function_call_output",
            role: None,
            content: None,
            call_id: Some(call_id),
            output: Some(output),
            name: None,
        }
    }
}

/// Outbound command set (§6). `event_id` is attached by `Transport::send`,
/// not carried on the variant itself.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientCommand {
    #[serde(rename = "session.update")]
    SessionUpdate { session: Value },

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: NewItem },

    #[serde(rename = "conversation.item.truncate")]
    ConversationItemTruncate {
        item_id: String,
        content_index: usize,
        audio_end_ms: u32,
    },

    #[serde(rename = "conversation.item.delete")]
    ConversationItemDelete { item_id: String },

    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },

    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit {},

    #[serde(rename = "response.create")]
    ResponseCreate {},

    #[serde(rename = "response.cancel")]
    ResponseCancel {
        #[serde(skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
    },
}

impl ClientCommand {
    /// The bare `type` string, used to build the `client.<type>` mirror topic.
    pub fn type_str(&self) -> &'static str {
        match self {
            ClientCommand::SessionUpdate { .. } => "session.update",
            ClientCommand::ConversationItemCreate { .. } => "conversation.item.create",
            ClientCommand::ConversationItemTruncate { .. } => "conversation.item.truncate",
            ClientCommand::ConversationItemDelete { .. } => "conversation.item.delete",
            ClientCommand::InputAudioBufferAppend { .. } => "input_audio_buffer.append",
            ClientCommand::InputAudioBufferCommit { .. } => "input_audio_buffer.commit",
            ClientCommand::ResponseCreate {} => "response.create",
            ClientCommand::ResponseCancel { .. } => "response.cancel",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemPayload {
    pub item: Item,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionCompletedPayload {
    pub item_id: String,
    pub content_index: usize,
    pub transcript: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioTranscriptDeltaPayload {
    pub item_id: String,
    pub delta: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioDeltaPayload {
    pub item_id: String,
    pub delta: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextDeltaPayload {
    pub item_id: String,
    pub content_index: usize,
    pub delta: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCallArgumentsDeltaPayload {
    pub item_id: String,
    pub delta: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechStartedPayload {
    pub item_id: String,
    pub audio_start_ms: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechStoppedPayload {
    pub item_id: String,
    pub audio_end_ms: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemIdPayload {
    pub item_id: String,
}

/// Inbound event set consumed by Conversation/Client (§4.3/§4.4), plus a
/// string-keyed `Unknown` fallback for every other `type`.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    SessionCreated,
    ResponseCreated(Value),
    ResponseOutputItemAdded(Value),
    ResponseContentPartAdded(Value),
    ConversationItemCreated(ItemPayload),
    ConversationItemTruncated(Value),
    ConversationItemDeleted(ItemIdPayload),
    ConversationItemInputAudioTranscriptionCompleted(TranscriptionCompletedPayload),
    ResponseAudioTranscriptDelta(AudioTranscriptDeltaPayload),
    ResponseAudioDelta(AudioDeltaPayload),
    ResponseTextDelta(TextDeltaPayload),
    ResponseFunctionCallArgumentsDelta(FunctionCallArgumentsDeltaPayload),
    InputAudioBufferSpeechStarted(SpeechStartedPayload),
    InputAudioBufferSpeechStopped(SpeechStoppedPayload),
    ResponseOutputItemDone(ItemPayload),
    ResponseDone(Value),
    Error(Value),
    Unknown { event_type: String, raw: Value },
}

impl ServerEvent {
    /// Parse a raw inbound frame (already JSON-decoded) keyed by its `type` field.
    /// Unrecognized types, and types that fail to deserialize into their
    /// expected shape, fall back to `Unknown` rather than erroring (§4.2/§7:
    /// protocol errors are logged and swallowed, never fatal).
    pub fn parse(event_type: &str, raw: &Value) -> Self {
        let parsed = match event_type {
            "session.created" => Some(ServerEvent::SessionCreated),
            "response.created" => Some(ServerEvent::ResponseCreated(raw.clone())),
            "response.output_item.added" => Some(ServerEvent::ResponseOutputItemAdded(raw.clone())),
            "response.content_part.added" => {
                Some(ServerEvent::ResponseContentPartAdded(raw.clone()))
            }
            "conversation.item.created" => serde_json::from_value(raw.clone())
                .ok()
                .map(ServerEvent::ConversationItemCreated),
            "conversation.item.truncated" => Some(ServerEvent::ConversationItemTruncated(raw.clone())),
            "conversation.item.deleted" => serde_json::from_value(raw.clone())
                .ok()
                .map(ServerEvent::ConversationItemDeleted),
            "conversation.item.input_audio_transcription.completed" => serde_json::from_value(raw.clone())
                .ok()
                .map(ServerEvent::ConversationItemInputAudioTranscriptionCompleted),
            "response.audio_transcript.delta" => serde_json::from_value(raw.clone())
                .ok()
                .map(ServerEvent::ResponseAudioTranscriptDelta),
            "response.audio.delta" => serde_json::from_value(raw.clone())
                .ok()
                .map(ServerEvent::ResponseAudioDelta),
            "response.text.delta" => serde_json::from_value(raw.clone())
                .ok()
                .map(ServerEvent::ResponseTextDelta),
            "response.function_call_arguments.delta" => serde_json::from_value(raw.clone())
                .ok()
                .map(ServerEvent::ResponseFunctionCallArgumentsDelta),
            "input_audio_buffer.speech_started" => serde_json::from_value(raw.clone())
                .ok()
                .map(ServerEvent::InputAudioBufferSpeechStarted),
            "input_audio_buffer.speech_stopped" => serde_json::from_value(raw.clone())
                .ok()
                .map(ServerEvent::InputAudioBufferSpeechStopped),
            "response.output_item.done" => serde_json::from_value(raw.clone())
                .ok()
                .map(ServerEvent::ResponseOutputItemDone),
            "response.done" => Some(ServerEvent::ResponseDone(raw.clone())),
            "error" => Some(ServerEvent::Error(raw.clone())),
            _ => None,
        };

        parsed.unwrap_or_else(|| ServerEvent::Unknown {
            event_type: event_type.to_string(),
            raw: raw.clone(),
        })
    }

    pub fn event_type(&self) -> &str {
        match self {
            ServerEvent::SessionCreated => "session.created",
            ServerEvent::ResponseCreated(_) => "response.created",
            ServerEvent::ResponseOutputItemAdded(_) => "response.output_item.added",
            ServerEvent::ResponseContentPartAdded(_) => "response.content_part.added",
            ServerEvent::ConversationItemCreated(_) => "conversation.item.created",
            ServerEvent::ConversationItemTruncated(_) => "conversation.item.truncated",
            ServerEvent::ConversationItemDeleted(_) => "conversation.item.deleted",
            ServerEvent::ConversationItemInputAudioTranscriptionCompleted(_) => {
                "conversation.item.input_audio_transcription.completed"
            }
            ServerEvent::ResponseAudioTranscriptDelta(_) => "response.audio_transcript.delta",
            ServerEvent::ResponseAudioDelta(_) => "response.audio.delta",
            ServerEvent::ResponseTextDelta(_) => "response.text.delta",
            ServerEvent::ResponseFunctionCallArgumentsDelta(_) => {
                "response.function_call_arguments.delta"
            }
            ServerEvent::InputAudioBufferSpeechStarted(_) => "input_audio_buffer.speech_started",
            ServerEvent::InputAudioBufferSpeechStopped(_) => "input_audio_buffer.speech_stopped",
            ServerEvent::ResponseOutputItemDone(_) => "response.output_item.done",
            ServerEvent::ResponseDone(_) => "response.done",
            ServerEvent::Error(_) => "error",
            ServerEvent::Unknown { event_type, .. } => event_type,
        }
    }
}
