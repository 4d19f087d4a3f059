//! Session state for one playthrough.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Transcript entries kept for history replay; oldest evicted beyond this.
pub const TRANSCRIPT_LIMIT: usize = 100;

/// Accumulated scoring for the session.
///
/// Invariant: `0 <= correct_count <= total_scored`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub correct_count: u32,
    pub total_scored: u32,
}

impl Score {
    pub fn is_perfect(&self) -> bool {
        self.total_scored > 0 && self.correct_count == self.total_scored
    }
}

/// One scored choice's outcome, in the order it happened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsequenceEntry {
    pub scene_label: String,
    pub choice_label: String,
    pub consequence_text: String,
    pub was_correct: bool,
}

/// One line of the dialogue transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub speaker: Option<String>,
    pub text: String,
}

/// Input-gating flags for the current moment of playback.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct SessionFlags {
    pub awaiting_choice: bool,
    pub awaiting_post_choice_advance: bool,
    /// Re-entrancy guard; a second trigger while set is dropped.
    pub advancing: bool,
    pub typing: bool,
}

/// Mutable record of one play session. Owned by the engine; never global.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NarrativeState {
    pub current_scene_id: String,
    pub step_cursor: usize,
    pub score: Score,
    pub consequence_log: Vec<ConsequenceEntry>,
    pub transcript: VecDeque<TranscriptLine>,
    /// Detour scenes push the origin here; `Return` pops it.
    pub navigation_stack: Vec<String>,
    pub flags: SessionFlags,
    pub hint_used_count: u32,
    pub skip_count: u32,
    pub autosave_counter: u32,
}

impl Default for NarrativeState {
    fn default() -> Self {
        Self::new()
    }
}

impl NarrativeState {
    pub fn new() -> Self {
        Self {
            current_scene_id: String::new(),
            step_cursor: 0,
            score: Score::default(),
            consequence_log: Vec::new(),
            transcript: VecDeque::with_capacity(TRANSCRIPT_LIMIT),
            navigation_stack: Vec::new(),
            flags: SessionFlags::default(),
            hint_used_count: 0,
            skip_count: 0,
            autosave_counter: 0,
        }
    }

    /// Full reset for "new game" / return-to-menu.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Appends a line to the transcript, evicting the oldest past the cap.
    pub fn push_transcript(&mut self, speaker: Option<&str>, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.transcript.len() >= TRANSCRIPT_LIMIT {
            self.transcript.pop_front();
        }
        self.transcript.push_back(TranscriptLine {
            speaker: speaker.map(str::to_string),
            text: text.to_string(),
        });
    }

    pub fn push_consequence(&mut self, entry: ConsequenceEntry) {
        self.consequence_log.push(entry);
    }

    pub fn is_perfect_run(&self) -> bool {
        self.score.is_perfect()
    }
}
