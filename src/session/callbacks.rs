use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::error;

use super::transcript::Speaker;

/// Notifications delivered to the caller (UI, CLI)
///
/// All methods are invoked from the session dispatcher, in event order.
pub trait BridgeCallbacks: Send + Sync {
    /// Accumulated text of the speaker's current turn
    fn on_transcript_update(&self, text: &str, is_final: bool, speaker: Speaker);

    /// The speaker's current turn is finished
    fn on_turn_complete(&self, speaker: Speaker);

    /// Human-readable failure; the session is being torn down
    fn on_error(&self, message: &str);

    /// Fired once when a session that was started ends
    fn on_close(&self);
}

/// One entry of the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub speaker: Speaker,
    pub text: String,
    pub is_final: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct LogState {
    entries: Vec<ConversationEntry>,
    errors: Vec<String>,
    closed: bool,
}

/// Conversation view built from bridge callbacks
///
/// Updates replace the speaker's latest non-final entry (or open a new one);
/// a turn completion marks that entry final.
#[derive(Debug, Default)]
pub struct ConversationLog {
    state: Mutex<LogState>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut LogState) -> T) -> Option<T> {
        match self.state.lock() {
            Ok(mut state) => Some(f(&mut state)),
            Err(_) => {
                error!("Conversation log lock poisoned");
                None
            }
        }
    }

    /// Every entry, final or not, in order of appearance
    pub fn entries(&self) -> Vec<ConversationEntry> {
        self.with_state(|s| s.entries.clone()).unwrap_or_default()
    }

    /// Finalized entries only
    pub fn finalized(&self) -> Vec<ConversationEntry> {
        self.entries().into_iter().filter(|e| e.is_final).collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.with_state(|s| s.errors.clone()).unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.with_state(|s| s.closed).unwrap_or(false)
    }

    /// Plain-text rendering, one "Speaker : text" line per finalized entry
    pub fn render(&self) -> String {
        self.finalized()
            .iter()
            .map(|e| format!("[{}] {} : {}", e.timestamp.format("%H:%M:%S"), e.speaker, e.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn latest_open_entry(entries: &mut [ConversationEntry], speaker: Speaker) -> Option<&mut ConversationEntry> {
    entries
        .iter_mut()
        .rev()
        .find(|e| e.speaker == speaker && !e.is_final)
}

impl BridgeCallbacks for ConversationLog {
    fn on_transcript_update(&self, text: &str, is_final: bool, speaker: Speaker) {
        self.with_state(|s| match latest_open_entry(&mut s.entries, speaker) {
            Some(entry) => {
                entry.text = text.to_string();
                entry.is_final = is_final;
            }
            None => s.entries.push(ConversationEntry {
                speaker,
                text: text.to_string(),
                is_final,
                timestamp: Utc::now(),
            }),
        });
    }

    fn on_turn_complete(&self, speaker: Speaker) {
        self.with_state(|s| {
            if let Some(entry) = latest_open_entry(&mut s.entries, speaker) {
                entry.is_final = true;
            }
        });
    }

    fn on_error(&self, message: &str) {
        self.with_state(|s| s.errors.push(message.to_string()));
    }

    fn on_close(&self) {
        self.with_state(|s| s.closed = true);
    }
}
