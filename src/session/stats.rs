use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one session
///
/// `Idle → Connecting → Open → Closing → Closed`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl SessionState {
    /// Whether a session currently holds devices or a connection
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Open | SessionState::Closing)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Statistics about an interview session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Session identifier
    pub session_id: String,

    /// Current lifecycle state
    pub state: SessionState,

    /// When the session was started
    pub started_at: DateTime<Utc>,

    /// Seconds from start until now (or until teardown)
    pub duration_secs: f64,

    /// Encoded capture frames handed to the connection
    pub frames_sent: usize,

    /// Capture frames discarded because the session was not open
    pub frames_dropped: usize,

    /// Synthesized speech units handed to the output
    pub audio_units_scheduled: usize,

    /// Barge-in signals received
    pub interruptions: usize,

    /// Finalize notifications emitted
    pub turns_finalized: usize,
}

impl SessionStats {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            state: SessionState::Idle,
            started_at: Utc::now(),
            duration_secs: 0.0,
            frames_sent: 0,
            frames_dropped: 0,
            audio_units_scheduled: 0,
            interruptions: 0,
            turns_finalized: 0,
        }
    }

    /// Refresh `duration_secs` from `started_at`
    pub fn touch(&mut self) {
        let elapsed = Utc::now() - self.started_at;
        self.duration_secs = elapsed.num_milliseconds().max(0) as f64 / 1000.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stats_are_idle_and_zeroed() {
        let stats = SessionStats::new("interview-1");
        assert_eq!(stats.state, SessionState::Idle);
        assert_eq!(stats.frames_sent + stats.frames_dropped, 0);
        assert!(!stats.state.is_active());
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&SessionState::Connecting).unwrap();
        assert_eq!(json, "\"connecting\"");
        assert_eq!(SessionState::Closing.to_string(), "closing");
    }
}
