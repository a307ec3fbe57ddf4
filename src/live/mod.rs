//! Streaming AI service plumbing
//!
//! - `messages`: wire types for the Gemini Live bidirectional protocol
//! - `client`: connector/sender traits and the WebSocket implementation
//! - `prompt`: the fixed interview instruction

pub mod client;
pub mod messages;
pub mod prompt;

pub use client::{GeminiLiveConnector, LiveChannel, LiveConnector, LiveInbound, LiveSender};
pub use messages::{Blob, ClientMessage, ServerEvent, ServerMessage, SetupMessage};
pub use prompt::INTERVIEW_INSTRUCTION;
