use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::version::STORY_SCHEMA_VERSION;

/// Size limits applied while parsing authored story JSON.
#[derive(Clone, Copy, Debug)]
pub struct StoryLimits {
    pub max_scenes: usize,
    pub max_steps_per_scene: usize,
    pub max_choices_per_scene: usize,
    pub max_story_bytes: usize,
}

impl Default for StoryLimits {
    fn default() -> Self {
        Self {
            max_scenes: 1_000,
            max_steps_per_scene: 500,
            max_choices_per_scene: 16,
            max_story_bytes: 2 * 1024 * 1024,
        }
    }
}

/// JSON-facing story envelope: a mapping from scene id to the authored
/// scene record, plus the content conventions the engine needs.
///
/// Field names follow the authored camelCase data.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoryRaw {
    #[serde(default)]
    pub story_schema_version: Option<String>,
    pub scenes: BTreeMap<String, SceneRaw>,
    #[serde(default = "default_entry_scene")]
    pub entry_scene: String,
    #[serde(default = "default_tutorial_skip_entry")]
    pub tutorial_skip_entry: String,
    #[serde(default = "default_hint_scene")]
    pub hint_scene: String,
    #[serde(default = "default_secret_ending_scene")]
    pub secret_ending_scene: String,
    #[serde(default = "default_report_ending_scene")]
    pub report_ending_scene: String,
    /// Speakers that never dim sprites (system voices, inner thoughts).
    #[serde(default)]
    pub narrator_speakers: Vec<String>,
}

fn default_entry_scene() -> String {
    "welcome_message".to_string()
}

fn default_tutorial_skip_entry() -> String {
    "scene1".to_string()
}

fn default_hint_scene() -> String {
    "hint".to_string()
}

fn default_secret_ending_scene() -> String {
    "ending_secret".to_string()
}

fn default_report_ending_scene() -> String {
    "ending_consequences".to_string()
}

/// One authored scene, duck-typed the way the content files write it.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SceneRaw {
    pub location: String,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub bgm: Option<String>,
    /// Single-sprite shorthand; merged in front of `sprites` on compile.
    #[serde(default)]
    pub sprite: Option<SpriteRaw>,
    #[serde(default)]
    pub sprites: Vec<SpriteRaw>,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub is_hint: bool,
    #[serde(default)]
    pub is_ending: bool,
    #[serde(default)]
    pub is_final_video: bool,
    /// Preamble text for report-style endings.
    #[serde(default)]
    pub text: Option<String>,
    /// Closing text for the final-video ending.
    #[serde(default)]
    pub final_text: Option<String>,
    #[serde(default)]
    pub story: Vec<StoryStepRaw>,
    #[serde(default)]
    pub choices: Vec<ChoiceRaw>,
}

/// One authored script step: a dialogue line, or a directive when
/// `action` is set.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoryStepRaw {
    #[serde(default)]
    pub speaker: Option<String>,
    pub text: String,
    #[serde(default)]
    pub action: Option<String>,
    /// Animated sprite override for the speaker while this line shows.
    #[serde(default)]
    pub sprite_src: Option<String>,
    #[serde(default)]
    pub change_background: Option<String>,
}

/// One authored choice. `nextScene` makes it a navigation (the literal
/// `"return"` pops the detour stack); a `correct` flag makes it a scored
/// resolution.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceRaw {
    pub text: String,
    #[serde(default)]
    pub next_scene: Option<String>,
    #[serde(default)]
    pub correct: Option<bool>,
    #[serde(default)]
    pub consequence: Option<String>,
}

/// One authored sprite. Either `src` (static) or `baseSrc` + `frames`
/// (animated frame sequence), plus optional step-indexed triggers.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpriteRaw {
    pub name: String,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub base_src: Option<String>,
    #[serde(default)]
    pub frames: Option<u32>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub show_on_dialogue: Option<usize>,
    #[serde(default)]
    pub hide_on_dialogue: Option<usize>,
    #[serde(default, rename = "showOnDialogue2")]
    pub show_again_on_dialogue: Option<usize>,
    #[serde(default)]
    pub move_to_left: Option<usize>,
    #[serde(default)]
    pub move_to_right: Option<usize>,
}

impl StoryRaw {
    /// Parses a JSON story with default limits.
    pub fn from_json(input: &str) -> EngineResult<Self> {
        Self::from_json_with_limits(input, StoryLimits::default())
    }

    /// Parses a JSON story, gating on schema version and size budgets.
    pub fn from_json_with_limits(input: &str, limits: StoryLimits) -> EngineResult<Self> {
        let story: StoryRaw =
            serde_json::from_str(input).map_err(|err| json_deserialize_error(input, &err))?;
        match story.story_schema_version.as_deref() {
            Some(version) if version != STORY_SCHEMA_VERSION => {
                return Err(EngineError::InvalidStory(format!(
                    "schema incompatible: found {version}, expected {STORY_SCHEMA_VERSION}"
                )));
            }
            // Legacy stories without a version are accepted.
            _ => {}
        }
        story.ensure_limits(limits)?;
        Ok(story)
    }

    /// JSON Schema of the authored story format, for editor tooling.
    pub fn json_schema_string() -> EngineResult<String> {
        let schema = schemars::schema_for!(StoryRaw);
        serde_json::to_string_pretty(&schema).map_err(|err| EngineError::Serialization {
            message: err.to_string(),
            src: String::new(),
            span: (0, 0).into(),
        })
    }

    /// Serializes the story to JSON with the current schema version.
    pub fn to_json(&self) -> EngineResult<String> {
        let mut versioned = self.clone();
        versioned.story_schema_version = Some(STORY_SCHEMA_VERSION.to_string());
        serde_json::to_string_pretty(&versioned).map_err(|err| EngineError::Serialization {
            message: err.to_string(),
            src: String::new(),
            span: (0, 0).into(),
        })
    }

    fn ensure_limits(&self, limits: StoryLimits) -> EngineResult<()> {
        if self.scenes.len() > limits.max_scenes {
            return Err(EngineError::InvalidStory(format!(
                "scene count {} exceeds limit {}",
                self.scenes.len(),
                limits.max_scenes
            )));
        }
        let mut total = 0usize;
        for (id, scene) in &self.scenes {
            if scene.story.len() > limits.max_steps_per_scene {
                return Err(EngineError::InvalidStory(format!(
                    "scene '{id}' has {} steps (limit {})",
                    scene.story.len(),
                    limits.max_steps_per_scene
                )));
            }
            if scene.choices.len() > limits.max_choices_per_scene {
                return Err(EngineError::InvalidStory(format!(
                    "scene '{id}' has {} choices (limit {})",
                    scene.choices.len(),
                    limits.max_choices_per_scene
                )));
            }
            total = total.saturating_add(scene.string_bytes()).saturating_add(id.len());
            if total > limits.max_story_bytes {
                return Err(EngineError::InvalidStory(
                    "story string budget exceeded".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl SceneRaw {
    fn string_bytes(&self) -> usize {
        let mut total = self.location.len();
        total += self.background.as_deref().map_or(0, str::len);
        total += self.bgm.as_deref().map_or(0, str::len);
        total += self.hint.as_deref().map_or(0, str::len);
        total += self.text.as_deref().map_or(0, str::len);
        total += self.final_text.as_deref().map_or(0, str::len);
        for step in &self.story {
            total += step.text.len();
            total += step.speaker.as_deref().map_or(0, str::len);
            total += step.sprite_src.as_deref().map_or(0, str::len);
            total += step.change_background.as_deref().map_or(0, str::len);
        }
        for choice in &self.choices {
            total += choice.text.len();
            total += choice.next_scene.as_deref().map_or(0, str::len);
            total += choice.consequence.as_deref().map_or(0, str::len);
        }
        total
    }
}

#[cold]
#[inline(never)]
fn json_deserialize_error(input: &str, err: &serde_json::Error) -> EngineError {
    let offset = json_error_offset(input, err);
    let (window, local_offset) = json_error_window(input, offset);
    EngineError::Serialization {
        message: err.to_string(),
        src: window,
        span: (local_offset, 1).into(),
    }
}

fn json_error_offset(input: &str, error: &serde_json::Error) -> usize {
    let (line, column) = (error.line(), error.column());
    if line == 0 {
        return 0;
    }
    let mut offset = 0usize;
    for (index, chunk) in input.split_inclusive('\n').enumerate() {
        if index + 1 == line {
            let column_index = column.saturating_sub(1);
            let byte_index = chunk
                .char_indices()
                .nth(column_index)
                .map(|(i, _)| i)
                .unwrap_or_else(|| chunk.len().saturating_sub(1));
            return offset + byte_index;
        }
        offset += chunk.len();
    }
    input.len().saturating_sub(1)
}

fn json_error_window(input: &str, offset: usize) -> (String, usize) {
    const CONTEXT: usize = 120;
    let mut start = offset.saturating_sub(CONTEXT);
    let mut end = (offset + CONTEXT).min(input.len());
    while start > 0 && !input.is_char_boundary(start) {
        start -= 1;
    }
    while end < input.len() && !input.is_char_boundary(end) {
        end += 1;
    }
    (input[start..end].to_string(), offset - start)
}
