//! The scene playback engine.
//!
//! Walks a scene's step sequence, drives the typewriter reveal, hands
//! out choice prompts, applies chosen outcomes to the session state, and
//! picks the ending once the scripted scenes run out. The engine owns
//! all mutable session state; hosts feed it input events and ticks and
//! render projections of [`Stage`].
//!
//! Every user-triggered entry point honors the `advancing` re-entrancy
//! guard: a second trigger arriving while the first still mutates state
//! is dropped, never interleaved. A pending scene transition gates input
//! the same way.

use std::time::Duration;

use crate::achievements::{
    AchievementDef, AchievementKey, Achievements, HINT_MASTER_THRESHOLD, SPEED_READER_THRESHOLD,
};
use crate::audio::{AudioDirector, AudioSink, SilentSink};
use crate::content::{
    has_rich_markup, ChoiceOutcome, Scene, SceneKind, SpriteImage, Story, StoryStep, TriggerEffect,
};
use crate::ending::EndingReport;
use crate::save::{autosave_key, SaveRecord, AUTOSAVE_SLOTS, SAVE_KEY};
use crate::settings::Settings;
use crate::sprite::SpriteAnimator;
use crate::stage::{ChoicePanel, EndingView, NarrativeLine, Stage, StageSprite, Veil};
use crate::state::{ConsequenceEntry, NarrativeState, TranscriptLine};
use crate::storage::{PersistenceStore, AUTOSAVE_KEY_PREFIX};
use crate::typewriter::Typewriter;

/// Veil cover time before the scene content swaps.
pub const VEIL_COVER: Duration = Duration::from_millis(400);
/// Veil fade-out time after the swap.
pub const VEIL_REVEAL: Duration = Duration::from_millis(200);
/// Every Nth entry into a scored scene writes an autosave.
pub const AUTOSAVE_CADENCE: u32 = 3;
/// Frame count of per-line speaker animation overrides.
pub const SPEAKER_OVERRIDE_FRAMES: u32 = 6;

/// Fixed speaker label over a scored choice prompt.
pub const DECISION_LABEL: &str = "Decision";
/// Fixed speaker label over a detour scene's return prompt.
pub const RETURN_LABEL: &str = "Return";
/// Fixed speaker label over consequence text.
pub const OUTCOME_LABEL: &str = "Outcome";

/// Observable playback states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnginePhase {
    Idle,
    PlayingLine,
    LineComplete,
    AwaitingChoice,
    AwaitingPostChoiceAdvance,
    Transitioning,
    EndingDisplay,
}

/// How a session begins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStart {
    New,
    /// Resume the persisted save; falls back to a fresh session when the
    /// save is absent or unusable.
    Continue,
}

/// Transient user-visible notices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notice {
    GameSaved,
    SaveFailed,
}

impl Notice {
    pub fn message(&self) -> &'static str {
        match self {
            Notice::GameSaved => "Game saved!",
            Notice::SaveFailed => "Save failed!",
        }
    }
}

#[derive(Debug)]
struct PendingTransition {
    target: String,
    elapsed: Duration,
    swapped: bool,
}

pub struct SceneEngine {
    story: Story,
    state: NarrativeState,
    stage: Stage,
    typewriter: Typewriter,
    animator: SpriteAnimator,
    audio: AudioDirector,
    settings: Settings,
    achievements: Achievements,
    store: Option<PersistenceStore>,
    pending: Option<PendingTransition>,
    /// Hint text substituted into the detour scene's first line.
    hint_override: Option<String>,
    next_autosave_slot: u32,
    paused: bool,
    notices: Vec<Notice>,
}

impl std::fmt::Debug for SceneEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneEngine")
            .field("scene", &self.state.current_scene_id)
            .field("cursor", &self.state.step_cursor)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl SceneEngine {
    pub fn new(story: Story, settings: Settings) -> Self {
        let settings = settings.clamped();
        let mut audio = AudioDirector::new(Box::new(SilentSink));
        audio.apply_volumes(settings.bgm_volume, settings.sfx_volume);
        Self {
            story,
            state: NarrativeState::new(),
            stage: Stage::default(),
            typewriter: Typewriter::new(),
            animator: SpriteAnimator::new(),
            audio,
            settings,
            achievements: Achievements::new(),
            store: None,
            pending: None,
            hint_override: None,
            next_autosave_slot: 1,
            paused: false,
            notices: Vec::new(),
        }
    }

    /// Replaces the audio device seam.
    pub fn with_sink(mut self, sink: Box<dyn AudioSink>) -> Self {
        self.audio = AudioDirector::new(sink);
        self.audio
            .apply_volumes(self.settings.bgm_volume, self.settings.sfx_volume);
        self
    }

    /// Attaches persistence; achievements are loaded from it.
    pub fn with_store(mut self, store: PersistenceStore) -> Self {
        self.achievements = Achievements::load(&store);
        self.store = Some(store);
        self
    }

    // === session lifecycle ===

    pub fn start(&mut self, mode: SessionStart) {
        match mode {
            SessionStart::New => {
                if let Some(store) = &mut self.store {
                    store.remove(SAVE_KEY);
                }
                self.start_new();
            }
            SessionStart::Continue => {
                if let Some(record) = self.load_save_record() {
                    match record.restore() {
                        Ok(state) if self.story.contains(&state.current_scene_id) => {
                            self.state = state;
                            let id = self.state.current_scene_id.clone();
                            self.enter_scene(&id);
                            return;
                        }
                        Ok(state) => {
                            tracing::warn!(
                                scene = %state.current_scene_id,
                                "saved scene missing from story, starting fresh"
                            );
                        }
                        Err(err) => {
                            tracing::warn!(%err, "saved session unusable, starting fresh");
                        }
                    }
                }
                self.start_new();
            }
        }
    }

    fn start_new(&mut self) {
        self.state.reset();
        self.hint_override = None;
        let entry = if self.settings.skip_tutorial {
            self.story.tutorial_skip_entry.to_string()
        } else {
            self.story.entry_scene.to_string()
        };
        self.enter_scene(&entry);
    }

    /// Abandons the session and clears the stage.
    pub fn return_to_menu(&mut self) {
        self.animator.stop_all();
        self.typewriter.cancel();
        self.audio.stop_typing();
        self.audio.stop_bgm();
        self.pending = None;
        self.hint_override = None;
        self.paused = false;
        self.state.reset();
        self.stage = Stage::default();
    }

    // === user-triggered entry points ===

    /// Primary action: click/tap on the text region, space, or enter.
    pub fn advance(&mut self) {
        if self.paused || self.pending.is_some() {
            return;
        }
        self.audio.user_gesture();
        if self.typewriter.is_typing() {
            self.fast_forward();
            return;
        }
        if self.state.flags.advancing {
            return;
        }
        self.state.flags.advancing = true;
        self.advance_step();
        self.state.flags.advancing = false;
    }

    pub fn select_choice(&mut self, index: usize) {
        if self.paused || self.pending.is_some() {
            return;
        }
        if self.state.flags.advancing || !self.state.flags.awaiting_choice {
            return;
        }
        let scene_id = self.state.current_scene_id.clone();
        let Some(scene) = self.story.get(&scene_id).cloned() else {
            tracing::warn!(scene = %scene_id, "current scene vanished, ignoring choice");
            return;
        };
        let Some(choice) = scene.choices.get(index).cloned() else {
            tracing::warn!(scene = %scene_id, index, "choice index out of range");
            return;
        };

        self.audio.user_gesture();
        self.audio.menu_click();

        // Idempotency guard: the panel dies before any outcome runs, so
        // a duplicate click finds nothing to act on.
        self.state.flags.awaiting_choice = false;
        self.stage.choices = None;
        self.stage.continue_prompt = false;

        match choice.outcome {
            ChoiceOutcome::Navigate { target } => {
                self.enter_scene(&target);
            }
            ChoiceOutcome::Return => match self.state.navigation_stack.pop() {
                Some(origin) => self.enter_scene(&origin),
                None => {
                    tracing::warn!(scene = %scene_id, "return outcome with empty detour stack");
                }
            },
            ChoiceOutcome::Resolve {
                correct,
                consequence,
            } => {
                self.state.flags.advancing = true;
                self.stage.undim_all();
                self.state.score.total_scored += 1;
                if correct {
                    self.state.score.correct_count += 1;
                }
                self.state.push_consequence(ConsequenceEntry {
                    scene_label: scene.location.to_string(),
                    choice_label: choice.label.to_string(),
                    consequence_text: consequence.to_string(),
                    was_correct: correct,
                });
                self.unlock(AchievementKey::FirstChoice);
                self.typewriter.cancel();
                self.state.flags.typing = false;
                self.stage.speaker = Some(OUTCOME_LABEL.to_string());
                self.stage
                    .text
                    .set_instant(&consequence, has_rich_markup(&consequence));
                self.stage.continue_prompt = true;
                self.state.flags.awaiting_post_choice_advance = true;
                self.state.flags.advancing = false;
            }
        }
    }

    /// Detours into the hint scene; valid only while a choice with an
    /// authored hint is on screen.
    pub fn request_hint(&mut self) {
        if self.paused || self.pending.is_some() {
            return;
        }
        if self.state.flags.advancing || !self.state.flags.awaiting_choice {
            return;
        }
        let scene_id = self.state.current_scene_id.clone();
        let Some(scene) = self.story.get(&scene_id) else {
            return;
        };
        if !scene.kind.offers_hints() {
            return;
        }
        let Some(hint) = scene.hint_text.clone() else {
            return;
        };
        let hint_scene = self.story.hint_scene.to_string();
        if !self.story.contains(&hint_scene) {
            tracing::warn!(scene = %hint_scene, "hint scene missing from story");
            return;
        }

        self.audio.user_gesture();
        self.audio.menu_click();
        self.state.navigation_stack.push(scene_id);
        self.hint_override = Some(hint.to_string());
        self.state.hint_used_count += 1;
        if self.state.hint_used_count >= HINT_MASTER_THRESHOLD {
            self.unlock(AchievementKey::HintMaster);
        }
        self.enter_scene(&hint_scene);
    }

    /// Opens the history panel: returns the transcript, oldest first.
    pub fn open_history(&mut self) -> Vec<TranscriptLine> {
        if !self.state.transcript.is_empty() {
            self.unlock(AchievementKey::Storyteller);
        }
        self.state.transcript.iter().cloned().collect()
    }

    /// Any user gesture; retries audio playback a device refused.
    pub fn user_gesture(&mut self) {
        self.audio.user_gesture();
    }

    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            self.audio.pause_bgm();
        }
    }

    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.audio.resume_bgm();
        }
    }

    pub fn toggle_pause(&mut self) {
        if self.paused {
            self.resume();
        } else {
            self.pause();
        }
    }

    pub fn save_game(&mut self) {
        let record = SaveRecord::from_state(&self.state);
        match &mut self.store {
            Some(store) => match store.set(SAVE_KEY, &record) {
                Ok(()) => self.notices.push(Notice::GameSaved),
                Err(err) => {
                    tracing::warn!(%err, "manual save failed");
                    self.notices.push(Notice::SaveFailed);
                }
            },
            None => self.notices.push(Notice::SaveFailed),
        }
    }

    /// Serializes the running session for sharing between devices.
    pub fn export_session(&self) -> crate::error::EngineResult<String> {
        SaveRecord::from_state(&self.state).to_json()
    }

    /// Replaces the running session with an imported payload. Invalid
    /// payloads are rejected and nothing changes.
    pub fn import_session(&mut self, payload: &str) -> crate::error::EngineResult<()> {
        let record = SaveRecord::from_json(payload)?;
        let state = record.restore()?;
        if !self.story.contains(&state.current_scene_id) {
            return Err(crate::error::EngineError::SceneNotFound(
                state.current_scene_id,
            ));
        }
        self.state = state;
        let id = self.state.current_scene_id.clone();
        self.enter_scene(&id);
        Ok(())
    }

    pub fn has_save(&self) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        store.has(SAVE_KEY)
            || store
                .keys()
                .iter()
                .any(|key| key.starts_with(AUTOSAVE_KEY_PREFIX))
    }

    // === time ===

    /// Advances the cooperative clock: transition veil, typewriter
    /// cadence, sprite frames. Asset loads live elsewhere and never
    /// block this path.
    pub fn tick(&mut self, dt: Duration) {
        if self.paused {
            return;
        }
        self.tick_transition(dt);
        self.tick_typewriter(dt);
        self.animator.tick(dt, &mut self.stage);
    }

    fn tick_transition(&mut self, dt: Duration) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        pending.elapsed += dt;
        let swap_now = !pending.swapped && pending.elapsed >= VEIL_COVER;
        let done = pending.elapsed >= VEIL_COVER + VEIL_REVEAL;
        if swap_now {
            pending.swapped = true;
        }
        let target = pending.target.clone();
        if swap_now {
            self.stage.veil = Veil::Revealing;
            self.apply_scene_content(&target);
        }
        if done {
            self.pending = None;
            self.stage.veil = Veil::Clear;
        }
    }

    fn tick_typewriter(&mut self, dt: Duration) {
        if !self.typewriter.is_typing() {
            return;
        }
        let revealed = self.typewriter.tick(dt);
        if !revealed.is_empty() {
            self.stage.text.revealed_chars += revealed.len();
            if revealed.iter().any(|c| !c.is_whitespace()) {
                self.audio.typing_tick();
            }
        }
        if !self.typewriter.is_typing() {
            self.stage.text.complete = true;
            self.stage.continue_prompt = true;
            self.state.flags.typing = false;
            self.audio.stop_typing();
        }
    }

    // === projections ===

    pub fn phase(&self) -> EnginePhase {
        if self.pending.is_some() {
            return EnginePhase::Transitioning;
        }
        if self.stage.ending.is_some() {
            return EnginePhase::EndingDisplay;
        }
        if self.state.flags.awaiting_choice {
            return EnginePhase::AwaitingChoice;
        }
        if self.state.flags.awaiting_post_choice_advance {
            return EnginePhase::AwaitingPostChoiceAdvance;
        }
        if self.state.flags.typing {
            return EnginePhase::PlayingLine;
        }
        if !self.stage.text.full.is_empty() {
            return EnginePhase::LineComplete;
        }
        EnginePhase::Idle
    }

    pub fn story(&self) -> &Story {
        &self.story
    }

    pub fn state(&self) -> &NarrativeState {
        &self.state
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Applies new settings, propagating volumes and persisting them.
    pub fn update_settings(&mut self, settings: Settings) {
        self.settings = settings.clamped();
        self.audio
            .apply_volumes(self.settings.bgm_volume, self.settings.sfx_volume);
        if let Some(store) = &mut self.store {
            if let Err(err) = self.settings.save(store) {
                tracing::warn!(%err, "failed to persist settings");
            }
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn achievements(&self) -> &Achievements {
        &self.achievements
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn drain_achievement_notifications(&mut self) -> Vec<AchievementDef> {
        self.achievements.drain_notifications()
    }

    // === scene machinery ===

    fn enter_scene(&mut self, id: &str) {
        if self.state.flags.advancing {
            return;
        }
        let Some(scene) = self.story.get(id) else {
            tracing::warn!(scene = id, "scene not found, navigation ignored");
            return;
        };
        let same = self.state.current_scene_id == id;
        let entering_hint = scene.kind == SceneKind::Hint;
        if same && !entering_hint {
            // Re-render in place, no transition effect.
            self.apply_scene_content(id);
            return;
        }
        if !same {
            self.audio.transition();
        }
        self.stage.veil = Veil::Covering;
        self.pending = Some(PendingTransition {
            target: id.to_string(),
            elapsed: Duration::ZERO,
            swapped: false,
        });
    }

    fn apply_scene_content(&mut self, id: &str) {
        let Some(scene) = self.story.get(id).cloned() else {
            tracing::warn!(scene = id, "scene vanished before content swap");
            return;
        };

        self.animator.stop_all();
        self.typewriter.cancel();
        self.audio.stop_typing();
        self.state.flags.typing = false;

        let hint_scene = self.story.hint_scene.to_string();
        let returning_from_hint =
            self.state.current_scene_id == hint_scene && id != hint_scene;
        if returning_from_hint {
            self.hint_override = None;
        }

        self.state.current_scene_id = id.to_string();
        self.state.flags.awaiting_post_choice_advance = false;
        self.check_autosave(&scene);

        if let Some(bgm) = &scene.bgm {
            self.audio.play_bgm(bgm);
        }

        self.stage.reset_for_scene();
        self.stage.location = scene.location.to_string();
        self.stage.background = scene.background.clone();
        self.stage.progress = match scene.kind {
            SceneKind::Main(n) => Some((n, self.story.main_scene_count())),
            _ => None,
        };

        for spec in &scene.sprites {
            let hidden_until_trigger = spec
                .triggers
                .iter()
                .any(|t| matches!(t.effect, TriggerEffect::Show) && t.at_step > 0);
            self.stage.sprites.push(StageSprite {
                name: spec.name.clone(),
                image: spec.image.clone(),
                position: spec.position,
                visible: !hidden_until_trigger,
                dimmed: false,
                frame: 1,
            });
            if let SpriteImage::Animated { frames, .. } = spec.image {
                self.animator.start(spec.name.clone(), frames);
            }
        }

        if scene.kind.is_ending() {
            self.render_ending(&scene);
            return;
        }

        if scene.steps.is_empty() && !scene.choices.is_empty() {
            // Choice-only scene (menu style): straight to the buttons.
            self.state.step_cursor = 0;
            self.show_choices(&scene);
            return;
        }

        if returning_from_hint {
            // Restore the exact prompt/choice view the player left:
            // jump straight to the choice directive, no typewriter.
            if let Some(index) = scene.show_choices_index() {
                if let StoryStep::ShowChoices { prompt } = &scene.steps[index] {
                    self.state.step_cursor = index;
                    self.stage.speaker = Some(DECISION_LABEL.to_string());
                    self.stage
                        .text
                        .set_instant(prompt, has_rich_markup(prompt));
                    self.show_choices(&scene);
                    return;
                }
            }
        }

        self.state.step_cursor = 0;
        self.state.flags.awaiting_choice = false;
        self.state.flags.advancing = true;
        self.advance_step();
        self.state.flags.advancing = false;
    }

    fn advance_step(&mut self) {
        let scene_id = self.state.current_scene_id.clone();
        let Some(scene) = self.story.get(&scene_id).cloned() else {
            tracing::warn!(scene = %scene_id, "current scene missing, advance ignored");
            return;
        };

        if self.state.flags.awaiting_post_choice_advance {
            self.stage.undim_all();
            self.stage.speaker = None;
            self.state.flags.awaiting_post_choice_advance = false;
            let next_id = format!("scene{}", self.state.score.total_scored + 1);
            self.state.flags.advancing = false;
            if self.story.contains(&next_id) {
                self.enter_scene(&next_id);
            } else {
                self.evaluate_ending();
            }
            return;
        }

        if self.state.flags.awaiting_choice
            || scene.steps.is_empty()
            || self.state.step_cursor >= scene.steps.len()
        {
            // A hint scene stuck past its last step without a visible
            // prompt re-syncs to its return prompt.
            if scene.kind == SceneKind::Hint && !self.state.flags.awaiting_choice {
                if let Some(StoryStep::ShowChoices { prompt }) = scene.steps.last() {
                    let prompt = prompt.clone();
                    self.stage.speaker = Some(RETURN_LABEL.to_string());
                    self.stage
                        .text
                        .set_instant(&prompt, has_rich_markup(&prompt));
                    self.show_choices(&scene);
                }
            }
            return;
        }

        let step = scene.steps[self.state.step_cursor].clone();
        self.apply_sprite_triggers(&scene, self.state.step_cursor);

        match step {
            StoryStep::ShowChoices { prompt } => {
                self.stage.undim_all();
                let label = if scene.kind == SceneKind::Hint {
                    RETURN_LABEL
                } else {
                    DECISION_LABEL
                };
                self.stage.speaker = Some(label.to_string());
                self.reveal(&prompt);
                if !self.state.flags.awaiting_choice {
                    self.show_choices(&scene);
                }
            }
            StoryStep::Line {
                speaker,
                text,
                sprite_override,
                background_override,
            } => {
                if let Some(background) = background_override {
                    self.stage.background = Some(background);
                }
                let text: String = if scene.kind == SceneKind::Hint && self.state.step_cursor == 0 {
                    self.hint_override
                        .clone()
                        .unwrap_or_else(|| text.to_string())
                } else {
                    text.to_string()
                };
                self.state.push_transcript(speaker.as_deref(), &text);

                if let (Some(base), Some(name)) = (sprite_override, speaker.as_deref()) {
                    if let Some(sprite) = self.stage.sprite_mut(name) {
                        sprite.image = SpriteImage::Animated {
                            base,
                            frames: SPEAKER_OVERRIDE_FRAMES,
                        };
                        sprite.frame = 1;
                        let shared = sprite.name.clone();
                        self.animator.start(shared, SPEAKER_OVERRIDE_FRAMES);
                    }
                }

                self.stage.speaker = speaker.as_deref().map(str::to_string);
                self.stage
                    .apply_speaker_emphasis(speaker.as_deref(), &self.story.narrator_speakers);
                self.reveal(&text);
                self.state.step_cursor += 1;
            }
        }
    }

    /// Cancels the running reveal, jumping to the full text; the cursor
    /// does not move.
    fn fast_forward(&mut self) {
        let remaining = self.typewriter.skip();
        self.stage.text.revealed_chars += remaining.len();
        self.stage.text.complete = true;
        self.stage.continue_prompt = true;
        self.state.flags.typing = false;
        self.audio.stop_typing();
        self.state.skip_count += 1;
        if self.state.skip_count >= SPEED_READER_THRESHOLD {
            self.unlock(AchievementKey::SpeedReader);
        }
    }

    fn reveal(&mut self, text: &str) {
        self.audio.stop_typing();
        if text.is_empty() || has_rich_markup(text) {
            // Authoring escape hatch: marked-up text lands instantly.
            self.typewriter.cancel();
            self.state.flags.typing = false;
            self.stage.text.set_instant(text, has_rich_markup(text));
            self.stage.continue_prompt = true;
        } else {
            self.typewriter.start(text, self.settings.char_delay());
            self.state.flags.typing = true;
            self.stage.text.begin_reveal(text);
            self.stage.continue_prompt = false;
        }
    }

    fn show_choices(&mut self, scene: &Scene) {
        self.state.flags.awaiting_choice = true;
        let hint_available = scene.hint_text.is_some() && scene.kind.offers_hints();
        self.stage.choices = Some(ChoicePanel {
            options: scene
                .choices
                .iter()
                .map(|choice| choice.label.to_string())
                .collect(),
            enabled: true,
            hint_available,
        });
    }

    fn apply_sprite_triggers(&mut self, scene: &Scene, cursor: usize) {
        for spec in &scene.sprites {
            for trigger in &spec.triggers {
                if trigger.at_step != cursor {
                    continue;
                }
                let Some(sprite) = self.stage.sprite_mut(&spec.name) else {
                    continue;
                };
                match trigger.effect {
                    TriggerEffect::Show => sprite.visible = true,
                    TriggerEffect::Hide => sprite.visible = false,
                    TriggerEffect::MoveTo(position) => sprite.position = position,
                }
            }
        }
    }

    fn evaluate_ending(&mut self) {
        let target = if self.state.is_perfect_run() {
            self.unlock(AchievementKey::PerfectRun);
            self.story.secret_ending_scene.to_string()
        } else {
            self.story.report_ending_scene.to_string()
        };
        self.enter_scene(&target);
    }

    fn render_ending(&mut self, scene: &Scene) {
        self.unlock(AchievementKey::Completionist);
        self.state.flags.awaiting_choice = false;
        self.stage.undim_all();

        if let SceneKind::Ending { final_video: true } = scene.kind {
            // The closing video replaces the stage; music dies first.
            self.audio.stop_bgm();
            self.stage.ending = Some(EndingView::FinalVideo {
                closing_text: scene.ending_text.as_deref().map(str::to_string),
            });
            return;
        }

        let view = if scene.id.as_ref() == self.story.report_ending_scene.as_ref() {
            EndingView::Report(EndingReport::build(
                &self.state,
                scene.ending_text.as_deref(),
            ))
        } else if scene.steps.iter().any(|s| matches!(s, StoryStep::Line { .. })) {
            EndingView::Narrative(
                scene
                    .narrative_lines()
                    .map(|(speaker, text)| NarrativeLine {
                        speaker: speaker.map(str::to_string),
                        text: text.to_string(),
                    })
                    .collect(),
            )
        } else {
            EndingView::Narrative(vec![NarrativeLine {
                speaker: None,
                text: scene
                    .ending_text
                    .as_deref()
                    .unwrap_or_default()
                    .to_string(),
            }])
        };
        self.stage.ending = Some(view);
        if !scene.choices.is_empty() {
            self.show_choices(scene);
        }
    }

    fn check_autosave(&mut self, scene: &Scene) {
        if !matches!(scene.kind, SceneKind::Main(_)) {
            return;
        }
        self.state.autosave_counter += 1;
        if self.state.autosave_counter < AUTOSAVE_CADENCE {
            return;
        }
        self.state.autosave_counter = 0;
        let Some(store) = &mut self.store else {
            return;
        };
        let record = SaveRecord::from_state(&self.state);
        let slot = self.next_autosave_slot;
        match store.set(&autosave_key(slot), &record) {
            Ok(()) => tracing::debug!(slot, "autosaved"),
            Err(err) => tracing::warn!(%err, "autosave failed"),
        }
        self.next_autosave_slot = slot % AUTOSAVE_SLOTS + 1;
    }

    fn load_save_record(&self) -> Option<SaveRecord> {
        let store = self.store.as_ref()?;
        if let Some(record) = store.get::<SaveRecord>(SAVE_KEY) {
            return Some(record);
        }
        // Fall back to the freshest autosave slot.
        store
            .keys()
            .iter()
            .filter(|key| key.starts_with(AUTOSAVE_KEY_PREFIX))
            .filter_map(|key| store.get::<SaveRecord>(key))
            .max_by_key(|record| record.timestamp_unix_ms)
    }

    fn unlock(&mut self, key: AchievementKey) {
        if self.achievements.unlock(key) {
            if let Some(store) = &mut self.store {
                self.achievements.save(store);
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;
