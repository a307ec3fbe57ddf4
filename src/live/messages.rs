use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audio::EncodedChunk;

// ============================================================================
// Outbound
// ============================================================================

/// Inline media payload (base64 data + MIME type)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

impl From<EncodedChunk> for Blob {
    fn from(chunk: EncodedChunk) -> Self {
        Self {
            mime_type: chunk.mime_type,
            data: chunk.data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInstruction {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

/// Empty object enabling transcription in one direction
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AudioTranscriptionConfig {}

/// Connection-time configuration; fixed for the session's lifetime
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: SystemInstruction,
    pub input_audio_transcription: AudioTranscriptionConfig,
    pub output_audio_transcription: AudioTranscriptionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetupMessage {
    pub setup: Setup,
}

impl SetupMessage {
    /// Audio-in / audio-out setup with transcription in both directions
    pub fn new(model: &str, system_instruction: &str, voice: Option<&str>) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };

        Self {
            setup: Setup {
                model,
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: voice.map(|name| SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: name.to_string(),
                            },
                        },
                    }),
                },
                system_instruction: SystemInstruction {
                    parts: vec![TextPart {
                        text: system_instruction.to_string(),
                    }],
                },
                input_audio_transcription: AudioTranscriptionConfig::default(),
                output_audio_transcription: AudioTranscriptionConfig::default(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<Blob>,
}

/// Streamed microphone audio
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

/// Any message the bridge sends after the setup handshake
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ClientMessage {
    RealtimeInput(RealtimeInputMessage),
}

impl ClientMessage {
    pub fn audio(chunk: EncodedChunk) -> Self {
        ClientMessage::RealtimeInput(RealtimeInputMessage {
            realtime_input: RealtimeInput {
                media_chunks: vec![chunk.into()],
            },
        })
    }
}

// ============================================================================
// Inbound
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub inline_data: Option<Blob>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub turn_complete: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

/// Raw message from the live service
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
    #[serde(default)]
    pub error: Option<Value>,
}

/// One inbound event, as consumed by the session dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    SetupComplete,
    /// Partial transcript of what the person said
    InputTranscript(String),
    /// Partial transcript of what the interviewer said
    OutputTranscript(String),
    /// Synthesized speech chunk
    Audio(Blob),
    /// The person started talking over the interviewer
    Interrupted,
    TurnComplete,
    GoAway { time_left: Option<String> },
    Error(String),
}

impl ServerMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Flatten into events: transcripts, then audio, then interruption, then turn end
    pub fn into_events(self) -> Vec<ServerEvent> {
        let mut events = Vec::new();

        if self.setup_complete.is_some() {
            events.push(ServerEvent::SetupComplete);
        }

        if let Some(content) = self.server_content {
            if let Some(text) = content.output_transcription.and_then(|t| t.text) {
                if !text.is_empty() {
                    events.push(ServerEvent::OutputTranscript(text));
                }
            }

            if let Some(text) = content.input_transcription.and_then(|t| t.text) {
                if !text.is_empty() {
                    events.push(ServerEvent::InputTranscript(text));
                }
            }

            if let Some(turn) = content.model_turn {
                events.extend(
                    turn.parts
                        .into_iter()
                        .filter_map(|p| p.inline_data)
                        .filter(|blob| !blob.data.is_empty())
                        .map(ServerEvent::Audio),
                );
            }

            if content.interrupted {
                events.push(ServerEvent::Interrupted);
            }

            if content.turn_complete {
                events.push(ServerEvent::TurnComplete);
            }
        }

        if let Some(go_away) = self.go_away {
            events.push(ServerEvent::GoAway {
                time_left: go_away.time_left,
            });
        }

        if let Some(error) = self.error {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            events.push(ServerEvent::Error(message));
        }

        events
    }
}
