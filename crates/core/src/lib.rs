//! Scene playback core for a branching visual-novel engine.
//!
//! The crate is pure logic: it owns the content model, the session
//! state, and the scene engine state machine. Hosts supply input events
//! and a clock, render projections of the engine's stage, and plug
//! device backends into the audio seam. Nothing here touches a screen
//! or a sound card.

mod achievements;
mod audio;
mod content;
mod ending;
mod engine;
mod error;
mod save;
mod settings;
mod sprite;
mod stage;
mod state;
mod storage;
mod typewriter;
mod ui;
mod version;

pub use achievements::{
    AchievementDef, AchievementKey, AchievementStatus, Achievements, AchievementsRecord,
    ACHIEVEMENTS_KEY, CATALOG, HINT_MASTER_THRESHOLD, SPEED_READER_THRESHOLD,
};
pub use audio::{
    AudioDirector, AudioEvent, AudioSink, BgmChannel, RecordingSink, SilentSink, MENU_CLICK_CUE,
    TRANSITION_CUE, TYPING_CUE, UI_CUES,
};
pub use content::{
    has_rich_markup, Choice, ChoiceOutcome, ChoiceRaw, MainSceneNumber, Scene, SceneKind,
    SceneRaw, SharedStr, SpriteImage, SpritePosition, SpriteRaw, SpriteSpec, SpriteTrigger, Story,
    StoryLimits, StoryRaw, StoryStep, StoryStepRaw, TriggerEffect,
};
pub use ending::{EndingReport, EndingReportRow};
pub use engine::{
    EnginePhase, Notice, SceneEngine, SessionStart, AUTOSAVE_CADENCE, DECISION_LABEL,
    OUTCOME_LABEL, RETURN_LABEL, SPEAKER_OVERRIDE_FRAMES, VEIL_COVER, VEIL_REVEAL,
};
pub use error::{EngineError, EngineResult};
pub use save::{autosave_key, SaveRecord, AUTOSAVE_SLOTS, SAVE_KEY};
pub use settings::{Settings, SETTINGS_KEY};
pub use sprite::{SpriteAnimator, FRAME_DELAY};
pub use stage::{ChoicePanel, EndingView, NarrativeLine, Stage, StageSprite, TextBox, Veil};
pub use state::{
    ConsequenceEntry, NarrativeState, Score, SessionFlags, TranscriptLine, TRANSCRIPT_LIMIT,
};
pub use storage::{
    DirBackend, MemoryBackend, PersistenceStore, StorageBackend, StorageError,
    AUTOSAVE_KEY_PREFIX,
};
pub use typewriter::{Typewriter, BASE_CHAR_DELAY};
pub use ui::{strip_markup, UiView};
pub use version::{
    COMPILED_FORMAT_VERSION, SAVE_FORMAT_VERSION, STORY_SCHEMA_VERSION, VALUE_FORMAT_VERSION,
};
