pub mod audio;
pub mod config;
pub mod error;
pub mod live;
pub mod session;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioDevices, AudioFile, AudioFrame, AudioSink,
    AudioSource, CpalDevices, PlaybackScheduler, PlaybackUnit,
};
pub use config::Config;
pub use error::{BridgeError, Result};
pub use live::{GeminiLiveConnector, LiveConnector};
pub use session::{
    BridgeCallbacks, ConversationLog, LiveAudioBridge, SessionConfig, SessionState, SessionStats, Speaker,
};
