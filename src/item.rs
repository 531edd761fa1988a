//! Conversation item data model (§3)
//!
//! An `Item` is the atomic unit of a conversation: a message, a function
//! call, or a function call's output. `Formatted` is the materialized,
//! delta-merged view kept alongside the raw `content` parts.

use serde::{Deserialize, Serialize};

pub type ItemId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Message,
    FunctionCall,
    FunctionCallOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    InProgress,
    Completed,
    Incomplete,
}

/// One content part. Exactly one variant per part, tagged by `type` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText {
        text: String,
    },
    Text {
        text: String,
    },
    InputAudio {
        #[serde(skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        transcript: Option<String>,
    },
    Audio {
        #[serde(skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        transcript: Option<String>,
    },
    Image {
        image: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
}

impl ContentPart {
    pub fn transcript_mut(&mut self) -> Option<&mut Option<String>> {
        match self {
            ContentPart::InputAudio { transcript, .. } | ContentPart::Audio { transcript, .. } => {
                Some(transcript)
            }
            _ => None,
        }
    }

    pub fn text_value(&self) -> Option<&str> {
        match self {
            ContentPart::InputText { text } | ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        }
    }
}

/// Materialized tool-call view on a `function_call` item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolFormatted {
    pub name: String,
    pub call_id: String,
    pub arguments: String,
}

/// Delta-merged, UI-ready view of an item. Never empty: `audio` defaults to
/// an empty Int16 array rather than being absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Formatted {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub audio: Vec<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolFormatted>,
    #[serde(default)]
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub kind: ItemKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub status: ItemStatus,
    #[serde(default)]
    pub content: Vec<ContentPart>,
    #[serde(default)]
    pub formatted: Formatted,

    /// `function_call` only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,

    /// `function_call_output` only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl Item {
    pub fn new_message(id: ItemId, role: Role, status: ItemStatus, content: Vec<ContentPart>) -> Self {
        Self {
            id,
            kind: ItemKind::Message,
            role: Some(role),
            status,
            content,
            formatted: Formatted::default(),
            name: None,
            call_id: None,
            arguments: None,
            output: None,
        }
    }

    pub fn is_assistant_message(&self) -> bool {
        self.kind == ItemKind::Message && self.role == Some(Role::Assistant)
    }

    pub fn has_audio_content(&self) -> bool {
        self.content
            .iter()
            .any(|p| matches!(p, ContentPart::Audio { .. }))
    }

    pub fn audio_content_index(&self) -> Option<usize> {
        self.content
            .iter()
            .position(|p| matches!(p, ContentPart::Audio { .. }))
    }
}

/// Cancellation/truncation offsets: §3 fixes the sampling rate at 24 kHz.
pub const SAMPLE_RATE_HZ: u32 = 24_000;

pub fn ms_for_sample_count(sample_count: usize) -> u32 {
    ((sample_count as f64 / SAMPLE_RATE_HZ as f64) * 1000.0).floor() as u32
}
