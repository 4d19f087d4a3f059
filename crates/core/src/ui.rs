//! UI projection helpers for hosts.
//!
//! Hosts render a [`UiView`] derived from the engine; nothing flows
//! back. The view is a pure function of engine state.

use crate::ending::EndingReport;
use crate::engine::{EnginePhase, SceneEngine};
use crate::stage::{EndingView, NarrativeLine};

/// What a host should currently show.
#[derive(Clone, Debug)]
pub enum UiView {
    Blank,
    Transitioning,
    Dialogue {
        location: String,
        speaker: Option<String>,
        text: String,
        complete: bool,
        continue_prompt: bool,
    },
    ChoicePrompt {
        location: String,
        speaker: Option<String>,
        prompt: String,
        options: Vec<String>,
        hint_available: bool,
    },
    Consequence {
        text: String,
    },
    EndingReport {
        report: EndingReport,
        options: Vec<String>,
    },
    EndingNarrative {
        lines: Vec<NarrativeLine>,
        options: Vec<String>,
    },
    FinalVideo {
        closing_text: Option<String>,
    },
}

impl UiView {
    pub fn project(engine: &SceneEngine) -> Self {
        let stage = engine.stage();
        match engine.phase() {
            EnginePhase::Transitioning => UiView::Transitioning,
            EnginePhase::EndingDisplay => {
                let options = stage
                    .choices
                    .as_ref()
                    .map(|panel| panel.options.clone())
                    .unwrap_or_default();
                match &stage.ending {
                    Some(EndingView::Report(report)) => UiView::EndingReport {
                        report: report.clone(),
                        options,
                    },
                    Some(EndingView::Narrative(lines)) => UiView::EndingNarrative {
                        lines: lines.clone(),
                        options,
                    },
                    Some(EndingView::FinalVideo { closing_text }) => UiView::FinalVideo {
                        closing_text: closing_text.clone(),
                    },
                    None => UiView::Blank,
                }
            }
            EnginePhase::AwaitingChoice => {
                let panel = stage.choices.as_ref();
                UiView::ChoicePrompt {
                    location: stage.location.clone(),
                    speaker: stage.speaker.clone(),
                    prompt: stage.text.visible_text().to_string(),
                    options: panel.map(|p| p.options.clone()).unwrap_or_default(),
                    hint_available: panel.map(|p| p.hint_available).unwrap_or(false),
                }
            }
            EnginePhase::AwaitingPostChoiceAdvance => UiView::Consequence {
                text: stage.text.full.clone(),
            },
            EnginePhase::PlayingLine | EnginePhase::LineComplete => UiView::Dialogue {
                location: stage.location.clone(),
                speaker: stage.speaker.clone(),
                text: stage.text.visible_text().to_string(),
                complete: stage.text.complete,
                continue_prompt: stage.continue_prompt,
            },
            EnginePhase::Idle => UiView::Blank,
        }
    }
}

/// Flattens authored markup (`**bold**` spans, inline tags) for plain
/// surfaces like terminals and logs.
pub fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
