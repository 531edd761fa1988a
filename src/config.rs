//! Session configuration (§3 Config)
//!
//! Five mutable sections, each independently patchable. `updateConfig`
//! deep-merges a `ConfigPatch` into the live `Config`; the merged result is
//! what gets sent as `session.update{session}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn merge_option<T>(target: &mut Option<T>, patch: Option<T>) {
    if let Some(value) = patch {
        *target = Some(value);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolChoiceWire(pub Value);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_output_tokens: Option<Value>,
}

impl ModelConfig {
    fn merge(&mut self, patch: ModelConfig) {
        merge_option(&mut self.provider, patch.provider);
        merge_option(&mut self.name, patch.name);
        merge_option(&mut self.modalities, patch.modalities);
        merge_option(&mut self.instructions, patch.instructions);
        merge_option(&mut self.tools, patch.tools);
        merge_option(&mut self.tool_choice, patch.tool_choice);
        merge_option(&mut self.temperature, patch.temperature);
        merge_option(
            &mut self.max_response_output_tokens,
            patch.max_response_output_tokens,
        );
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_ratio: Option<f32>,
}

impl SpeechConfig {
    fn merge(&mut self, patch: SpeechConfig) {
        merge_option(&mut self.voice, patch.voice);
        merge_option(&mut self.output_audio_format, patch.output_audio_format);
        merge_option(&mut self.speed, patch.speed);
        merge_option(&mut self.volume, patch.volume);
        merge_option(&mut self.pitch_ratio, patch.pitch_ratio);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnDetection {
    ServerVad {
        threshold: f32,
        prefix_padding_ms: u32,
        silence_duration_ms: u32,
    },
    None,
}

impl TurnDetection {
    pub fn type_str(&self) -> &'static str {
        match self {
            TurnDetection::ServerVad { .. } => "server_vad",
            TurnDetection::None => "none",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HearingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<Value>,
    /// `Some(None)` on the patch means "explicitly clear turn detection";
    /// `None` on the patch means "leave as-is". Represented as a nested
    /// Option so `merge` can distinguish the two.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<Option<TurnDetection>>,
}

impl HearingConfig {
    fn merge(&mut self, patch: HearingConfig) {
        merge_option(&mut self.input_audio_format, patch.input_audio_format);
        merge_option(
            &mut self.input_audio_transcription,
            patch.input_audio_transcription,
        );
        merge_option(&mut self.turn_detection, patch.turn_detection);
    }

    /// `None` when turn detection is off or absent (§4.4 `getTurnDetectionType`).
    pub fn turn_detection_type(&self) -> Option<&'static str> {
        match self.turn_detection.as_ref().and_then(|t| t.as_ref()) {
            Some(td) => Some(td.type_str()),
            None => None,
        }
    }

    /// True when turn detection is unset or explicitly `None` (§4.4 `createResponse`).
    pub fn has_no_turn_detection(&self) -> bool {
        matches!(self.turn_detection, None | Some(None) | Some(Some(TurnDetection::None)))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identification: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_classes: Option<Vec<String>>,
}

impl VisionConfig {
    fn merge(&mut self, patch: VisionConfig) {
        merge_option(&mut self.face, patch.face);
        merge_option(&mut self.object, patch.object);
        merge_option(&mut self.identification, patch.identification);
        merge_option(&mut self.target_classes, patch.target_classes);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DialogueResponse {
    Message { text: String },
    FunctionRef { name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dialogue {
    pub prompts: Vec<String>,
    pub responses: Vec<DialogueResponse>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Script {
    pub name: String,
    #[serde(default)]
    pub dialogues: Vec<Dialogue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default)]
    pub scripts: Vec<Script>,
}

impl KnowledgeConfig {
    fn merge(&mut self, patch: KnowledgeConfig) {
        if !patch.scripts.is_empty() {
            self.scripts = patch.scripts;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub hearing: HearingConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
}

/// A partial update to `Config`, with the same shape repeated section by
/// section. Any section/field left `None` is left untouched by `merge`.
pub type ConfigPatch = Config;

impl Config {
    pub fn defaults() -> Self {
        Self {
            model: ModelConfig {
                provider: Some("openai".to_string()),
                name: Some("gpt-4o-realtime-preview".to_string()),
                modalities: Some(vec!["text".to_string(), "audio".to_string()]),
                instructions: Some(String::new()),
                tools: Some(Vec::new()),
                tool_choice: Some(Value::String("auto".to_string())),
                temperature: Some(0.8),
                max_response_output_tokens: Some(Value::String("inf".to_string())),
            },
            speech: SpeechConfig {
                voice: Some("alloy".to_string()),
                output_audio_format: Some("pcm16".to_string()),
                speed: Some(1.0),
                volume: Some(1.0),
                pitch_ratio: Some(1.0),
            },
            hearing: HearingConfig {
                input_audio_format: Some("pcm16".to_string()),
                input_audio_transcription: None,
                turn_detection: Some(Some(TurnDetection::ServerVad {
                    threshold: 0.5,
                    prefix_padding_ms: 300,
                    silence_duration_ms: 500,
                })),
            },
            vision: VisionConfig::default(),
            knowledge: KnowledgeConfig::default(),
        }
    }

    pub fn merge(&mut self, patch: ConfigPatch) {
        self.model.merge(patch.model);
        self.speech.merge(patch.speech);
        self.hearing.merge(patch.hearing);
        self.vision.merge(patch.vision);
        self.knowledge.merge(patch.knowledge);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_only_overwrites_present_fields() {
        let mut config = Config::defaults();
        let original_voice = config.speech.voice.clone();

        let mut patch = Config::default();
        patch.model.temperature = Some(0.2);
        config.merge(patch);

        assert_eq!(config.model.temperature, Some(0.2));
        assert_eq!(config.speech.voice, original_voice);
    }

    #[test]
    fn explicit_none_turn_detection_disables_it() {
        let mut config = Config::defaults();
        assert!(!config.hearing.has_no_turn_detection());

        let mut patch = Config::default();
        patch.hearing.turn_detection = Some(None);
        config.merge(patch);

        assert!(config.hearing.has_no_turn_detection());
        assert_eq!(config.hearing.turn_detection_type(), None);
    }

    #[test]
    fn reset_restores_defaults() {
        let mut config = Config::defaults();
        config.model.temperature = Some(0.1);
        config = Config::defaults();
        assert_eq!(config.model.temperature, Some(0.8));
    }
}
