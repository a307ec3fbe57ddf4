use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::AudioBackendConfig;
use crate::live::{SetupMessage, INTERVIEW_INSTRUCTION};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";

/// Configuration for one interview session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "interview-<uuid>")
    pub session_id: String,

    /// Live model name (with or without the "models/" prefix)
    pub model: String,

    /// Prebuilt voice for the interviewer; `None` uses the service default
    pub voice: Option<String>,

    /// Behavioural instruction, fixed for the session's lifetime
    pub system_instruction: String,

    /// Rate of the audio sent to the service
    /// Default: 16000 Hz mono
    pub capture_sample_rate: u32,

    /// Rate of the synthesized speech received from the service
    /// Default: 24000 Hz mono
    pub playback_sample_rate: u32,

    /// Samples per transmitted frame
    pub frame_size: usize,

    /// Capture device name; `None` uses the host default
    pub input_device: Option<String>,

    /// Bound on connection establishment (socket + setup acknowledgement)
    pub connect_timeout: Duration,
}

/// Fresh "interview-<uuid>" identifier
pub fn new_session_id() -> String {
    format!("interview-{}", uuid::Uuid::new_v4())
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: new_session_id(),
            model: DEFAULT_MODEL.to_string(),
            voice: None,
            system_instruction: INTERVIEW_INSTRUCTION.to_string(),
            capture_sample_rate: 16000,
            playback_sample_rate: 24000,
            frame_size: 4096,
            input_device: None,
            connect_timeout: Duration::from_secs(15),
        }
    }
}

impl SessionConfig {
    /// Setup message sent as the first frame of the connection
    pub fn setup_message(&self) -> SetupMessage {
        SetupMessage::new(&self.model, &self.system_instruction, self.voice.as_deref())
    }

    /// Capture backend configuration for this session
    pub fn capture_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            target_sample_rate: self.capture_sample_rate,
            device_name: self.input_device.clone(),
            ..AudioBackendConfig::default()
        }
    }
}
