//! Interview session management
//!
//! This module provides the `LiveAudioBridge` abstraction that manages:
//! - Microphone capture and streaming to the live service
//! - The bidirectional connection lifecycle
//! - Gapless playback of synthesized speech, with barge-in
//! - Per-speaker transcript aggregation and caller callbacks
//! - Session statistics and state management

mod bridge;
mod callbacks;
mod config;
mod stats;
mod transcript;

pub use bridge::LiveAudioBridge;
pub use callbacks::{BridgeCallbacks, ConversationEntry, ConversationLog};
pub use config::{new_session_id, SessionConfig, DEFAULT_MODEL};
pub use stats::{SessionState, SessionStats};
pub use transcript::{Speaker, TranscriptAggregator, TranscriptBuffer, TranscriptUpdate};
