//! Story content: raw authored records and the compiled runtime form.
//!
//! Authored content arrives as duck-typed JSON (optional fields decide
//! whether a record is a line or a directive, a static or an animated
//! sprite, a navigation or a scoring choice). `StoryRaw::compile`
//! resolves all of that once, at load time, into tagged unions the
//! engine can match on without re-probing fields.

mod compiled;
mod raw;

use std::sync::Arc;

pub use compiled::{
    Choice, ChoiceOutcome, MainSceneNumber, Scene, SceneKind, SpriteImage, SpritePosition,
    SpriteSpec, SpriteTrigger, Story, StoryStep, TriggerEffect,
};
pub use raw::{ChoiceRaw, SceneRaw, SpriteRaw, StoryLimits, StoryRaw, StoryStepRaw};

/// Shared string storage used by compiled content.
pub type SharedStr = Arc<str>;

/// Returns true when authored text carries inline rich markup and must be
/// shown instantly instead of revealed through the typewriter.
pub fn has_rich_markup(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.iter().enumerate().any(|(i, &b)| {
        b == b'<'
            && bytes
                .get(i + 1)
                .map(|next| next.is_ascii_alphabetic() || *next == b'/')
                .unwrap_or(false)
    })
}
