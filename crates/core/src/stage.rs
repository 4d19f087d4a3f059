//! Presentation state owned by the engine.
//!
//! The state machine is the single source of truth; hosts render the
//! stage and never feed anything back. Everything here is written by the
//! engine and read by projections.

use crate::content::{SharedStr, SpriteImage, SpritePosition};
use crate::ending::EndingReport;

/// One sprite instance on the stage.
#[derive(Clone, Debug)]
pub struct StageSprite {
    pub name: SharedStr,
    pub image: SpriteImage,
    pub position: SpritePosition,
    pub visible: bool,
    pub dimmed: bool,
    /// Current frame for animated sprites, 1-based.
    pub frame: u32,
}

/// The dialogue text box with its reveal progress.
#[derive(Clone, Debug, Default)]
pub struct TextBox {
    pub full: String,
    pub revealed_chars: usize,
    pub complete: bool,
    /// Rich-markup text is set instantly, bypassing the reveal.
    pub rich: bool,
}

impl TextBox {
    pub fn begin_reveal(&mut self, text: &str) {
        self.full = text.to_string();
        self.revealed_chars = 0;
        self.complete = text.is_empty();
        self.rich = false;
    }

    pub fn set_instant(&mut self, text: &str, rich: bool) {
        self.full = text.to_string();
        self.revealed_chars = self.full.chars().count();
        self.complete = true;
        self.rich = rich;
    }

    pub fn clear(&mut self) {
        *self = TextBox::default();
    }

    /// The revealed prefix, on a character boundary.
    pub fn visible_text(&self) -> &str {
        if self.complete {
            return &self.full;
        }
        match self.full.char_indices().nth(self.revealed_chars) {
            Some((byte_index, _)) => &self.full[..byte_index],
            None => &self.full,
        }
    }
}

/// The choice buttons currently offered.
#[derive(Clone, Debug)]
pub struct ChoicePanel {
    pub options: Vec<String>,
    /// Cleared the moment a choice is taken, before any other effect.
    pub enabled: bool,
    pub hint_available: bool,
}

/// Transition veil over the stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Veil {
    #[default]
    Clear,
    Covering,
    Revealing,
}

/// One paragraph of an ending narrative.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NarrativeLine {
    pub speaker: Option<String>,
    pub text: String,
}

/// Terminal-screen content for ending scenes.
#[derive(Clone, Debug)]
pub enum EndingView {
    Report(EndingReport),
    Narrative(Vec<NarrativeLine>),
    FinalVideo { closing_text: Option<String> },
}

#[derive(Clone, Debug, Default)]
pub struct Stage {
    pub location: String,
    pub background: Option<SharedStr>,
    pub sprites: Vec<StageSprite>,
    pub speaker: Option<String>,
    pub text: TextBox,
    pub choices: Option<ChoicePanel>,
    pub continue_prompt: bool,
    pub veil: Veil,
    pub ending: Option<EndingView>,
    /// `(current, total)` main-scene progress, when in a main scene.
    pub progress: Option<(u32, u32)>,
}

impl Stage {
    pub fn sprite_mut(&mut self, name: &str) -> Option<&mut StageSprite> {
        self.sprites.iter_mut().find(|s| s.name.as_ref() == name)
    }

    pub fn sprite(&self, name: &str) -> Option<&StageSprite> {
        self.sprites.iter().find(|s| s.name.as_ref() == name)
    }

    /// Dims every sprite except the named speaker. Narrator voices and a
    /// `None` speaker undim everyone.
    pub fn apply_speaker_emphasis(&mut self, speaker: Option<&str>, narrators: &[SharedStr]) {
        let emphasized = match speaker {
            Some(name) if !narrators.iter().any(|n| n.as_ref() == name) => Some(name),
            _ => None,
        };
        for sprite in &mut self.sprites {
            sprite.dimmed = match emphasized {
                Some(name) => sprite.name.as_ref() != name,
                None => false,
            };
        }
    }

    pub fn undim_all(&mut self) {
        for sprite in &mut self.sprites {
            sprite.dimmed = false;
        }
    }

    /// Per-scene teardown before new content lands.
    pub fn reset_for_scene(&mut self) {
        self.sprites.clear();
        self.speaker = None;
        self.text.clear();
        self.choices = None;
        self.continue_prompt = false;
        self.ending = None;
        self.progress = None;
    }
}
