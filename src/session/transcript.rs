//! Per-speaker transcript accumulation
//!
//! Partial transcript text is appended to the speaker's buffer and reported as
//! the running concatenation. A turn-complete signal finalizes every non-empty
//! buffer exactly once and clears it; empty buffers produce nothing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who is speaking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Speaker {
    /// The person giving the statement (input transcription)
    Victim,
    /// The AI interviewer (output transcription)
    Interviewer,
}

impl Speaker {
    pub const ALL: [Speaker; 2] = [Speaker::Victim, Speaker::Interviewer];

    /// Label shown in the conversation
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::Victim => "Victime",
            Speaker::Interviewer => "IA",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Growable text plus a finalized flag
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptBuffer {
    pub text: String,
    pub finalized: bool,
}

impl TranscriptBuffer {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Incremental update emitted for each partial transcript
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptUpdate {
    pub speaker: Speaker,
    /// Everything received for this speaker since the last turn completion
    pub text: String,
    pub is_final: bool,
}

#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    victim: TranscriptBuffer,
    interviewer: TranscriptBuffer,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffer_mut(&mut self, speaker: Speaker) -> &mut TranscriptBuffer {
        match speaker {
            Speaker::Victim => &mut self.victim,
            Speaker::Interviewer => &mut self.interviewer,
        }
    }

    pub fn buffer(&self, speaker: Speaker) -> &TranscriptBuffer {
        match speaker {
            Speaker::Victim => &self.victim,
            Speaker::Interviewer => &self.interviewer,
        }
    }

    pub fn text(&self, speaker: Speaker) -> &str {
        &self.buffer(speaker).text
    }

    /// Append partial text and return the accumulated (non-final) text
    pub fn push_partial(&mut self, speaker: Speaker, text: &str) -> TranscriptUpdate {
        let buffer = self.buffer_mut(speaker);
        if buffer.finalized {
            buffer.text.clear();
            buffer.finalized = false;
        }
        buffer.text.push_str(text);

        TranscriptUpdate {
            speaker,
            text: buffer.text.clone(),
            is_final: false,
        }
    }

    /// Finalize and clear every non-empty buffer; returns the finalized speakers
    pub fn complete_turn(&mut self) -> Vec<Speaker> {
        let mut finalized = Vec::new();

        for speaker in Speaker::ALL {
            let buffer = self.buffer_mut(speaker);
            if buffer.is_empty() {
                continue;
            }
            buffer.finalized = true;
            buffer.text.clear();
            finalized.push(speaker);
        }

        finalized
    }

    /// Drop everything (session teardown)
    pub fn reset(&mut self) {
        self.victim = TranscriptBuffer::default();
        self.interviewer = TranscriptBuffer::default();
    }
}
