//! Versioned session save records, plus JSON export/import.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::state::{ConsequenceEntry, NarrativeState, TranscriptLine, TRANSCRIPT_LIMIT};
use crate::version::SAVE_FORMAT_VERSION;

/// Store key for manual saves.
pub const SAVE_KEY: &str = "save";
/// Rotating autosave slots; quota eviction removes the oldest first.
pub const AUTOSAVE_SLOTS: u32 = 3;

/// Snapshot of a session as persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaveRecord {
    pub format_version: u16,
    pub current_scene_id: String,
    pub correct_count: u32,
    pub total_scored: u32,
    pub consequence_log: Vec<ConsequenceEntry>,
    /// Last 100 transcript lines, oldest first.
    pub transcript: Vec<TranscriptLine>,
    pub timestamp_unix_ms: u64,
}

impl SaveRecord {
    pub fn from_state(state: &NarrativeState) -> Self {
        let skip = state.transcript.len().saturating_sub(TRANSCRIPT_LIMIT);
        Self {
            format_version: SAVE_FORMAT_VERSION,
            current_scene_id: state.current_scene_id.clone(),
            correct_count: state.score.correct_count,
            total_scored: state.score.total_scored,
            consequence_log: state.consequence_log.clone(),
            transcript: state.transcript.iter().skip(skip).cloned().collect(),
            timestamp_unix_ms: now_unix_ms(),
        }
    }

    /// Rebuilds session state from the record. Structurally invalid
    /// records are rejected so the caller can fall back to a fresh
    /// session.
    pub fn restore(&self) -> EngineResult<NarrativeState> {
        self.validate()?;
        let mut state = NarrativeState::new();
        state.current_scene_id = self.current_scene_id.clone();
        state.score.correct_count = self.correct_count;
        state.score.total_scored = self.total_scored;
        state.consequence_log = self.consequence_log.clone();
        state.transcript = self
            .transcript
            .iter()
            .rev()
            .take(TRANSCRIPT_LIMIT)
            .rev()
            .cloned()
            .collect::<VecDeque<_>>();
        Ok(state)
    }

    fn validate(&self) -> EngineResult<()> {
        if self.format_version != SAVE_FORMAT_VERSION {
            return Err(EngineError::InvalidImport(format!(
                "save format {} not supported (expected {SAVE_FORMAT_VERSION})",
                self.format_version
            )));
        }
        if self.current_scene_id.is_empty() {
            return Err(EngineError::InvalidImport("empty scene id".to_string()));
        }
        if self.correct_count > self.total_scored {
            return Err(EngineError::InvalidImport(format!(
                "correct count {} exceeds total {}",
                self.correct_count, self.total_scored
            )));
        }
        Ok(())
    }

    /// Export payload for sharing a session between devices.
    pub fn to_json(&self) -> EngineResult<String> {
        serde_json::to_string_pretty(self).map_err(|err| EngineError::Serialization {
            message: err.to_string(),
            src: String::new(),
            span: (0, 0).into(),
        })
    }

    /// Parses and validates an export payload. Invalid payloads are
    /// rejected without side effects.
    pub fn from_json(input: &str) -> EngineResult<Self> {
        let record: SaveRecord = serde_json::from_str(input)
            .map_err(|err| EngineError::InvalidImport(err.to_string()))?;
        record.validate()?;
        Ok(record)
    }
}

/// Key of the `slot`-th rotating autosave, 1-based.
pub fn autosave_key(slot: u32) -> String {
    format!("autosave_{slot:03}")
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
