//! Shared fixtures for integration tests.

use scene_novel_engine::{SceneEngine, SessionStart, Settings, Story, StoryRaw};
use std::time::Duration;

/// Builds a story with `main_scenes` scored scenes, a tutorial-free
/// welcome, a hint detour, and both endings. Choice index 1 is always
/// the correct one.
pub fn story_with_main_scenes(main_scenes: u32) -> Story {
    let mut scenes = serde_json::Map::new();

    scenes.insert(
        "welcome_message".to_string(),
        serde_json::json!({
            "location": "Welcome",
            "bgm": "sound/night.mp3",
            "story": [
                { "speaker": "System", "text": "Welcome to the beta test." },
                { "action": "show_choices", "text": "Ready?" }
            ],
            "choices": [ { "text": "Begin", "nextScene": "scene1" } ]
        }),
    );

    for n in 1..=main_scenes {
        scenes.insert(
            format!("scene{n}"),
            serde_json::json!({
                "location": format!("Situation {n}"),
                "bgm": "sound/main.mp3",
                "hint": format!("Advice for situation {n}."),
                "story": [
                    { "speaker": "Narrator", "text": format!("Scene {n} unfolds.") },
                    { "action": "show_choices", "text": format!("Decision {n}?") }
                ],
                "choices": [
                    { "text": format!("Wrong call {n}"), "correct": false,
                      "consequence": format!("Setback in situation {n}.") },
                    { "text": format!("Right call {n}"), "correct": true,
                      "consequence": format!("Progress in situation {n}.") }
                ]
            }),
        );
    }

    scenes.insert(
        "hint".to_string(),
        serde_json::json!({
            "location": "Walkway",
            "isHint": true,
            "bgm": "sound/hint.mp3",
            "story": [
                { "speaker": "Mentor", "text": "Placeholder advice." },
                { "action": "show_choices", "text": "Head back." }
            ],
            "choices": [ { "text": "Return", "nextScene": "return" } ]
        }),
    );

    scenes.insert(
        "ending_secret".to_string(),
        serde_json::json!({
            "location": "Secret Ending",
            "isEnding": true,
            "story": [
                { "speaker": "Mentor", "text": "A flawless run." },
                { "action": "show_choices", "text": "Learn more." }
            ],
            "choices": [ { "text": "Continue", "nextScene": "welcome_message" } ]
        }),
    );

    scenes.insert(
        "ending_consequences".to_string(),
        serde_json::json!({
            "location": "Consequence Report",
            "isEnding": true,
            "text": "The beta test is over. Here is what happened:",
            "choices": [ { "text": "Continue", "nextScene": "welcome_message" } ]
        }),
    );

    let story = serde_json::json!({
        "scenes": scenes,
        "narratorSpeakers": ["System", "Narrator"]
    });
    StoryRaw::from_json(&story.to_string())
        .expect("fixture parses")
        .compile()
        .expect("fixture compiles")
}

/// One scene holding `line_count` dialogue lines before its choice.
pub fn story_with_long_scene(line_count: usize) -> Story {
    let mut lines: Vec<serde_json::Value> = (0..line_count)
        .map(|i| serde_json::json!({ "speaker": "Narrator", "text": format!("Line number {i}.") }))
        .collect();
    lines.push(serde_json::json!({ "action": "show_choices", "text": "Done?" }));
    let story = serde_json::json!({
        "scenes": {
            "welcome_message": {
                "location": "Marathon",
                "story": lines,
                "choices": [ { "text": "Finish", "nextScene": "welcome_message" } ]
            }
        }
    });
    StoryRaw::from_json(&story.to_string())
        .expect("fixture parses")
        .compile()
        .expect("fixture compiles")
}

pub fn settle(engine: &mut SceneEngine) {
    engine.tick(Duration::from_secs(60));
}

pub fn new_session(story: Story) -> SceneEngine {
    let mut engine = SceneEngine::new(story, Settings::default());
    engine.start(SessionStart::New);
    settle(&mut engine);
    engine
}

/// Advances until a choice prompt is on screen.
pub fn advance_to_choices(engine: &mut SceneEngine) {
    for _ in 0..500 {
        if engine.stage().choices.is_some() {
            return;
        }
        engine.advance();
        settle(engine);
    }
    panic!("no choice prompt reached");
}

/// Picks a scored choice and advances past its consequence.
pub fn resolve_and_continue(engine: &mut SceneEngine, index: usize) {
    advance_to_choices(engine);
    engine.select_choice(index);
    engine.advance();
    settle(engine);
}
