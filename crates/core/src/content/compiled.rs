use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::version::{COMPILED_FORMAT_VERSION, STORY_BINARY_MAGIC};

use super::raw::{ChoiceRaw, SceneRaw, SpriteRaw, StoryRaw, StoryStepRaw};
use super::SharedStr;

/// Stock consequence shown when an incorrect resolution has no authored text.
const DEFAULT_CONSEQUENCE: &str =
    "The situation resolved itself without your decisive influence.";

/// Number in a `scene{N}` id; drives `scene{totalScored + 1}` progression.
pub type MainSceneNumber = u32;

/// Runtime-ready story with every scene normalized and validated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Story {
    scenes: BTreeMap<String, Scene>,
    pub entry_scene: SharedStr,
    pub tutorial_skip_entry: SharedStr,
    pub hint_scene: SharedStr,
    pub secret_ending_scene: SharedStr,
    pub report_ending_scene: SharedStr,
    pub narrator_speakers: Vec<SharedStr>,
    main_scene_count: u32,
}

/// One compiled scene.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scene {
    pub id: SharedStr,
    pub location: SharedStr,
    pub background: Option<SharedStr>,
    pub bgm: Option<SharedStr>,
    pub sprites: Vec<SpriteSpec>,
    pub steps: Vec<StoryStep>,
    pub choices: Vec<Choice>,
    pub hint_text: Option<SharedStr>,
    /// Preamble/closing text for ending scenes.
    pub ending_text: Option<SharedStr>,
    pub kind: SceneKind,
}

/// Scene classification resolved at compile time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SceneKind {
    Welcome,
    Tutorial,
    Main(MainSceneNumber),
    Hint,
    Ending { final_video: bool },
    Other,
}

impl SceneKind {
    pub fn is_ending(&self) -> bool {
        matches!(self, SceneKind::Ending { .. })
    }

    /// Scored scenes are the only ones offering hint detours.
    pub fn offers_hints(&self) -> bool {
        matches!(self, SceneKind::Main(_))
    }
}

/// One step of a scene script.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum StoryStep {
    Line {
        speaker: Option<SharedStr>,
        text: SharedStr,
        /// Animated frame-sequence override for the speaker's sprite.
        sprite_override: Option<SharedStr>,
        background_override: Option<SharedStr>,
    },
    ShowChoices {
        prompt: SharedStr,
    },
}

/// One compiled choice.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Choice {
    pub label: SharedStr,
    pub outcome: ChoiceOutcome,
}

/// What selecting a choice does.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ChoiceOutcome {
    /// Immediate scene jump, no scoring.
    Navigate { target: SharedStr },
    /// Pop the detour stack.
    Return,
    /// Score the scene and record a consequence.
    Resolve {
        correct: bool,
        consequence: SharedStr,
    },
}

/// A sprite placed on the scene stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpriteSpec {
    pub name: SharedStr,
    pub image: SpriteImage,
    pub position: SpritePosition,
    pub triggers: Vec<SpriteTrigger>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SpriteImage {
    Static(SharedStr),
    Animated { base: SharedStr, frames: u32 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpritePosition {
    Left,
    #[default]
    Center,
    Right,
}

/// Visibility/placement change fired when the cursor reaches `at_step`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpriteTrigger {
    pub at_step: usize,
    pub effect: TriggerEffect,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerEffect {
    Show,
    Hide,
    MoveTo(SpritePosition),
}

impl StoryRaw {
    /// Compiles the raw story into its runtime representation.
    ///
    /// Resolves duck-typed records into tagged unions, interns repeated
    /// strings, and validates the per-scene structural invariants.
    pub fn compile(&self) -> EngineResult<Story> {
        let mut pool = StringPool::default();
        let mut scenes = BTreeMap::new();
        let mut main_scene_count = 0u32;

        for (id, raw) in &self.scenes {
            let scene = compile_scene(id, raw, self, &mut pool)?;
            if matches!(scene.kind, SceneKind::Main(_)) {
                main_scene_count += 1;
            }
            scenes.insert(id.clone(), scene);
        }

        Ok(Story {
            scenes,
            entry_scene: pool.intern(&self.entry_scene),
            tutorial_skip_entry: pool.intern(&self.tutorial_skip_entry),
            hint_scene: pool.intern(&self.hint_scene),
            secret_ending_scene: pool.intern(&self.secret_ending_scene),
            report_ending_scene: pool.intern(&self.report_ending_scene),
            narrator_speakers: self
                .narrator_speakers
                .iter()
                .map(|name| pool.intern(name))
                .collect(),
            main_scene_count,
        })
    }
}

impl Story {
    pub fn get(&self, id: &str) -> Option<&Scene> {
        self.scenes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.scenes.contains_key(id)
    }

    pub fn scene_ids(&self) -> impl Iterator<Item = &str> {
        self.scenes.keys().map(String::as_str)
    }

    pub fn scenes(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.values()
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    /// How many `scene{N}` scenes the story carries; the progress
    /// indicator denominator.
    pub fn main_scene_count(&self) -> u32 {
        self.main_scene_count
    }

    /// Reports dangling references without failing the load: navigation
    /// targets, the hint scene when hints are authored, and the entry
    /// points. Runtime lookups fail soft either way; this feeds the CLI
    /// `validate` diagnostics.
    pub fn dangling_references(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for scene in self.scenes.values() {
            for choice in &scene.choices {
                if let ChoiceOutcome::Navigate { target } = &choice.outcome {
                    if !self.contains(target) {
                        problems.push(format!(
                            "scene '{}' choice '{}' navigates to unknown scene '{}'",
                            scene.id, choice.label, target
                        ));
                    }
                }
            }
            if scene.hint_text.is_some() && !self.contains(&self.hint_scene) {
                problems.push(format!(
                    "scene '{}' offers a hint but hint scene '{}' is missing",
                    scene.id, self.hint_scene
                ));
            }
        }
        for (role, id) in [
            ("entry scene", &self.entry_scene),
            ("tutorial skip entry", &self.tutorial_skip_entry),
        ] {
            if !self.contains(id) {
                problems.push(format!("{role} '{id}' is missing"));
            }
        }
        problems
    }

    /// Serializes the compiled story to the binary envelope.
    pub fn to_binary(&self) -> EngineResult<Vec<u8>> {
        let payload = postcard::to_allocvec(self)
            .map_err(|err| EngineError::BinaryFormat(err.to_string()))?;
        let checksum = crc32fast::hash(&payload);
        let payload_len = u32::try_from(payload.len()).map_err(|_| {
            EngineError::BinaryFormat("compiled story too large for binary format".to_string())
        })?;
        let mut output = Vec::with_capacity(4 + 2 + 4 + 4 + payload.len());
        output.extend_from_slice(&STORY_BINARY_MAGIC);
        output.extend_from_slice(&COMPILED_FORMAT_VERSION.to_le_bytes());
        output.extend_from_slice(&checksum.to_le_bytes());
        output.extend_from_slice(&payload_len.to_le_bytes());
        output.extend_from_slice(&payload);
        Ok(output)
    }

    /// Deserializes a compiled story, validating magic, version, and
    /// checksum.
    pub fn from_binary(input: &[u8]) -> EngineResult<Self> {
        if input.len() < 14 {
            return Err(EngineError::BinaryFormat("binary payload too small".into()));
        }
        if input[0..4] != STORY_BINARY_MAGIC {
            return Err(EngineError::BinaryFormat("missing story magic bytes".into()));
        }
        let version = u16::from_le_bytes([input[4], input[5]]);
        if version != COMPILED_FORMAT_VERSION {
            return Err(EngineError::BinaryFormat(format!(
                "unsupported story version {version}"
            )));
        }
        let checksum = u32::from_le_bytes([input[6], input[7], input[8], input[9]]);
        let payload_len = u32::from_le_bytes([input[10], input[11], input[12], input[13]]) as usize;
        let payload = input
            .get(14..)
            .ok_or_else(|| EngineError::BinaryFormat("missing payload".into()))?;
        if payload.len() != payload_len {
            return Err(EngineError::BinaryFormat("payload length mismatch".into()));
        }
        if crc32fast::hash(payload) != checksum {
            return Err(EngineError::BinaryFormat("payload checksum mismatch".into()));
        }
        postcard::from_bytes(payload).map_err(|err| EngineError::BinaryFormat(err.to_string()))
    }
}

impl Scene {
    /// Index of the scene's `ShowChoices` directive, if any.
    pub fn show_choices_index(&self) -> Option<usize> {
        self.steps
            .iter()
            .position(|step| matches!(step, StoryStep::ShowChoices { .. }))
    }

    /// Lines of an ending scene rendered as a narrative block.
    pub fn narrative_lines(&self) -> impl Iterator<Item = (Option<&str>, &str)> {
        self.steps.iter().filter_map(|step| match step {
            StoryStep::Line { speaker, text, .. } => {
                Some((speaker.as_deref(), text.as_ref()))
            }
            StoryStep::ShowChoices { .. } => None,
        })
    }
}

fn compile_scene(
    id: &str,
    raw: &SceneRaw,
    envelope: &StoryRaw,
    pool: &mut StringPool,
) -> EngineResult<Scene> {
    let kind = classify_scene(id, raw, envelope);

    let mut sprites = Vec::new();
    if let Some(single) = &raw.sprite {
        sprites.push(compile_sprite(id, single, pool)?);
    }
    for sprite in &raw.sprites {
        sprites.push(compile_sprite(id, sprite, pool)?);
    }

    let steps = raw
        .story
        .iter()
        .map(|step| compile_step(id, step, pool))
        .collect::<EngineResult<Vec<_>>>()?;
    validate_steps(id, &steps, kind)?;

    let choices = raw
        .choices
        .iter()
        .map(|choice| compile_choice(id, choice, pool))
        .collect::<EngineResult<Vec<_>>>()?;
    if steps.is_empty() && choices.is_empty() && !matches!(kind, SceneKind::Ending { final_video: true })
    {
        return Err(EngineError::InvalidStory(format!(
            "scene '{id}' has neither steps nor choices"
        )));
    }

    Ok(Scene {
        id: pool.intern(id),
        location: pool.intern(&raw.location),
        background: raw.background.as_deref().map(|b| pool.intern(strip_css_url(b))),
        bgm: raw.bgm.as_deref().map(|b| pool.intern(b)),
        sprites,
        steps,
        choices,
        hint_text: raw.hint.as_deref().map(|h| pool.intern(h)),
        ending_text: raw
            .text
            .as_deref()
            .or(raw.final_text.as_deref())
            .map(|t| pool.intern(t)),
        kind,
    })
}

fn classify_scene(id: &str, raw: &SceneRaw, envelope: &StoryRaw) -> SceneKind {
    if raw.is_hint || id == envelope.hint_scene {
        SceneKind::Hint
    } else if raw.is_ending {
        SceneKind::Ending {
            final_video: raw.is_final_video,
        }
    } else if let Some(number) = main_scene_number(id) {
        SceneKind::Main(number)
    } else if id.starts_with("tutorial") {
        SceneKind::Tutorial
    } else if id == envelope.entry_scene || id.starts_with("welcome") {
        SceneKind::Welcome
    } else {
        SceneKind::Other
    }
}

/// Parses `scene{N}` ids; anything else is not a main scene.
pub fn main_scene_number(id: &str) -> Option<MainSceneNumber> {
    let digits = id.strip_prefix("scene")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn compile_step(scene_id: &str, raw: &StoryStepRaw, pool: &mut StringPool) -> EngineResult<StoryStep> {
    match raw.action.as_deref() {
        None => Ok(StoryStep::Line {
            speaker: raw.speaker.as_deref().map(|s| pool.intern(s)),
            text: pool.intern(&raw.text),
            sprite_override: raw.sprite_src.as_deref().map(|s| pool.intern(s)),
            background_override: raw
                .change_background
                .as_deref()
                .map(|b| pool.intern(strip_css_url(b))),
        }),
        Some("show_choices") => Ok(StoryStep::ShowChoices {
            prompt: pool.intern(&raw.text),
        }),
        Some(other) => Err(EngineError::InvalidStory(format!(
            "scene '{scene_id}' uses unknown step action '{other}'"
        ))),
    }
}

fn validate_steps(scene_id: &str, steps: &[StoryStep], kind: SceneKind) -> EngineResult<()> {
    let directive_count = steps
        .iter()
        .filter(|step| matches!(step, StoryStep::ShowChoices { .. }))
        .count();
    if directive_count > 1 {
        return Err(EngineError::InvalidStory(format!(
            "scene '{scene_id}' has {directive_count} choice directives"
        )));
    }
    if directive_count == 1
        && !matches!(steps.last(), Some(StoryStep::ShowChoices { .. }))
    {
        return Err(EngineError::InvalidStory(format!(
            "scene '{scene_id}' must end with its choice directive"
        )));
    }
    // Ending scenes render their script as a narrative block and attach
    // choices directly, so the directive is optional there.
    if !steps.is_empty() && directive_count == 0 && !kind.is_ending() {
        return Err(EngineError::InvalidStory(format!(
            "scene '{scene_id}' has steps but no choice directive"
        )));
    }
    Ok(())
}

fn compile_choice(scene_id: &str, raw: &ChoiceRaw, pool: &mut StringPool) -> EngineResult<Choice> {
    let outcome = match (&raw.next_scene, raw.correct) {
        (Some(target), _) if target == "return" => ChoiceOutcome::Return,
        (Some(target), _) => ChoiceOutcome::Navigate {
            target: pool.intern(target),
        },
        (None, Some(correct)) => {
            let consequence = match (&raw.consequence, correct) {
                (Some(text), _) => pool.intern(text),
                (None, true) => pool.intern(""),
                (None, false) => pool.intern(DEFAULT_CONSEQUENCE),
            };
            ChoiceOutcome::Resolve {
                correct,
                consequence,
            }
        }
        (None, None) => {
            return Err(EngineError::InvalidStory(format!(
                "scene '{scene_id}' choice '{}' has neither nextScene nor correct",
                raw.text
            )))
        }
    };
    Ok(Choice {
        label: pool.intern(&raw.text),
        outcome,
    })
}

fn compile_sprite(scene_id: &str, raw: &SpriteRaw, pool: &mut StringPool) -> EngineResult<SpriteSpec> {
    let image = match (&raw.src, &raw.base_src) {
        (_, Some(base)) => SpriteImage::Animated {
            base: pool.intern(base),
            frames: raw.frames.unwrap_or(1).max(1),
        },
        (Some(src), None) => SpriteImage::Static(pool.intern(src)),
        (None, None) => {
            return Err(EngineError::InvalidStory(format!(
                "scene '{scene_id}' sprite '{}' has neither src nor baseSrc",
                raw.name
            )))
        }
    };
    let mut triggers = Vec::new();
    if let Some(step) = raw.show_on_dialogue {
        triggers.push(SpriteTrigger {
            at_step: step,
            effect: TriggerEffect::Show,
        });
    }
    if let Some(step) = raw.hide_on_dialogue {
        triggers.push(SpriteTrigger {
            at_step: step,
            effect: TriggerEffect::Hide,
        });
    }
    if let Some(step) = raw.show_again_on_dialogue {
        triggers.push(SpriteTrigger {
            at_step: step,
            effect: TriggerEffect::Show,
        });
    }
    if let Some(step) = raw.move_to_left {
        triggers.push(SpriteTrigger {
            at_step: step,
            effect: TriggerEffect::MoveTo(SpritePosition::Left),
        });
    }
    if let Some(step) = raw.move_to_right {
        triggers.push(SpriteTrigger {
            at_step: step,
            effect: TriggerEffect::MoveTo(SpritePosition::Right),
        });
    }
    Ok(SpriteSpec {
        name: pool.intern(&raw.name),
        image,
        position: parse_position(raw.position.as_deref()),
        triggers,
    })
}

fn parse_position(value: Option<&str>) -> SpritePosition {
    match value {
        Some("left") => SpritePosition::Left,
        Some("right") => SpritePosition::Right,
        _ => SpritePosition::Center,
    }
}

/// Backgrounds are authored as CSS `url(...)` wrappers; the engine keeps
/// bare references.
fn strip_css_url(value: &str) -> &str {
    value
        .strip_prefix("url(")
        .and_then(|rest| rest.strip_suffix(')'))
        .map(|inner| inner.trim_matches(|c| c == '\'' || c == '"'))
        .unwrap_or(value)
}

#[derive(Default)]
struct StringPool {
    cache: HashMap<String, SharedStr>,
}

impl StringPool {
    fn intern(&mut self, value: &str) -> SharedStr {
        if let Some(existing) = self.cache.get(value) {
            return existing.clone();
        }
        let shared: SharedStr = Arc::from(value);
        self.cache.insert(value.to_string(), shared.clone());
        shared
    }
}
