//! Ending report data: the ordered record of every scored choice,
//! rendered by hosts as the standard ending.

use serde::{Deserialize, Serialize};

use crate::state::NarrativeState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndingReportRow {
    /// 1-based position in play order.
    pub position: usize,
    pub scene_label: String,
    pub choice_label: String,
    pub was_correct: bool,
    pub consequence_text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndingReport {
    /// Authored preamble of the report scene, if any.
    pub preamble: Option<String>,
    pub rows: Vec<EndingReportRow>,
    pub correct_count: u32,
    pub total_scored: u32,
}

impl EndingReport {
    pub fn build(state: &NarrativeState, preamble: Option<&str>) -> Self {
        let rows = state
            .consequence_log
            .iter()
            .enumerate()
            .map(|(index, entry)| EndingReportRow {
                position: index + 1,
                scene_label: entry.scene_label.clone(),
                choice_label: entry.choice_label.clone(),
                was_correct: entry.was_correct,
                consequence_text: entry.consequence_text.clone(),
            })
            .collect();
        Self {
            preamble: preamble.map(str::to_string),
            rows,
            correct_count: state.score.correct_count,
            total_scored: state.score.total_scored,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "You made {} of {} decisions in the spirit of the story.",
            self.correct_count, self.total_scored
        )
    }
}
