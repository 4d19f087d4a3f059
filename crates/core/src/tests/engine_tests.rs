use std::time::Duration;

use super::*;
use crate::audio::{AudioEvent, RecordingSink};
use crate::content::StoryRaw;
use crate::state::ConsequenceEntry;
use crate::storage::{MemoryBackend, PersistenceStore};
use crate::{Settings, TRANSITION_CUE, TYPING_CUE};

const TEST_STORY: &str = r#"{
    "scenes": {
        "welcome_message": {
            "location": "Welcome",
            "bgm": "sound/night.mp3",
            "story": [
                { "speaker": "System", "text": "Welcome aboard." },
                { "speaker": "System", "text": "Glad you are here." },
                { "action": "show_choices", "text": "Ready to begin?" }
            ],
            "choices": [ { "text": "Begin", "nextScene": "scene1" } ]
        },
        "scene1": {
            "location": "Workshop Choice",
            "background": "url(images/bg/yard.jpg)",
            "bgm": "sound/scene1.mp3",
            "sprites": [
                { "name": "Friend", "src": "images/friend.png", "position": "left" },
                { "name": "You", "baseSrc": "images/sprites/you", "frames": 3, "position": "right", "hideOnDialogue": 1 },
                { "name": "Latecomer", "src": "images/late.png", "position": "center", "showOnDialogue": 1 }
            ],
            "hint": "Follow your own interest.",
            "story": [
                { "speaker": "Friend", "text": "Come sing with us!" },
                { "speaker": "You", "text": "I wanted to try fencing." },
                { "action": "show_choices", "text": "What will you do?" }
            ],
            "choices": [
                { "text": "Join the choir", "correct": false, "consequence": "You drift along." },
                { "text": "Pick fencing", "correct": true, "consequence": "You grow." }
            ]
        },
        "scene2": {
            "location": "Team Dispute",
            "bgm": "sound/scene1.mp3",
            "hint": "Talk it out first.",
            "story": [
                { "speaker": "Leader", "text": "They keep arguing." },
                { "action": "show_choices", "text": "How do you settle it?" }
            ],
            "choices": [
                { "text": "Kick them out", "correct": false },
                { "text": "Call a pause", "correct": true, "consequence": "The team regroups." }
            ]
        },
        "hint": {
            "location": "Walkway",
            "isHint": true,
            "bgm": "sound/hint.mp3",
            "sprites": [ { "name": "Mentor", "baseSrc": "images/sprites/mentor_1", "frames": 3, "position": "center" } ],
            "story": [
                { "speaker": "Mentor", "text": "Placeholder advice.", "spriteSrc": "images/sprites/mentor_2" },
                { "speaker": "Mentor", "text": "Choose what rings true." },
                { "action": "show_choices", "text": "Head back." }
            ],
            "choices": [ { "text": "Return to the decision", "nextScene": "return" } ]
        },
        "ending_secret": {
            "location": "Secret Ending",
            "isEnding": true,
            "story": [
                { "speaker": "Mentor", "text": "A flawless run." },
                { "action": "show_choices", "text": "Learn more." }
            ],
            "choices": [ { "text": "Continue", "nextScene": "welcome_message" } ]
        },
        "ending_consequences": {
            "location": "Consequence Report",
            "isEnding": true,
            "text": "The test is over. Here is what happened:",
            "choices": [ { "text": "Continue", "nextScene": "welcome_message" } ]
        }
    },
    "narratorSpeakers": ["System"]
}"#;

fn test_story() -> Story {
    StoryRaw::from_json(TEST_STORY)
        .expect("fixture parses")
        .compile()
        .expect("fixture compiles")
}

fn settle(engine: &mut SceneEngine) {
    // Long enough to finish any transition and any reveal.
    engine.tick(Duration::from_secs(30));
}

fn started_engine() -> SceneEngine {
    let mut engine = SceneEngine::new(test_story(), Settings::default());
    engine.start(SessionStart::New);
    settle(&mut engine);
    engine
}

fn advance_to_choices(engine: &mut SceneEngine) {
    for _ in 0..20 {
        if engine.phase() == EnginePhase::AwaitingChoice {
            return;
        }
        engine.advance();
        settle(engine);
    }
    panic!("never reached a choice prompt from {:?}", engine.phase());
}

fn goto_scene1_choices(engine: &mut SceneEngine) {
    advance_to_choices(engine);
    engine.select_choice(0); // Begin -> scene1
    settle(engine);
    advance_to_choices(engine);
}

#[test]
fn starting_a_session_plays_the_entry_scene() {
    let mut engine = SceneEngine::new(test_story(), Settings::default());
    engine.start(SessionStart::New);
    assert_eq!(engine.phase(), EnginePhase::Transitioning);
    settle(&mut engine);
    assert_eq!(engine.state().current_scene_id, "welcome_message");
    assert_eq!(engine.phase(), EnginePhase::LineComplete);
    assert_eq!(engine.stage().text.full, "Welcome aboard.");
    assert_eq!(engine.state().transcript.len(), 1);
}

#[test]
fn skip_tutorial_setting_enters_the_first_main_scene() {
    let settings = Settings {
        skip_tutorial: true,
        ..Default::default()
    };
    let mut engine = SceneEngine::new(test_story(), settings);
    engine.start(SessionStart::New);
    settle(&mut engine);
    assert_eq!(engine.state().current_scene_id, "scene1");
}

#[test]
fn lines_reveal_through_the_typewriter() {
    let mut engine = started_engine();
    engine.advance(); // starts the second line
    assert_eq!(engine.phase(), EnginePhase::PlayingLine);
    assert!(engine.state().flags.typing);

    engine.tick(Duration::from_millis(25));
    assert_eq!(engine.stage().text.visible_text(), "G");

    engine.tick(Duration::from_secs(5));
    assert_eq!(engine.phase(), EnginePhase::LineComplete);
    assert!(engine.stage().text.complete);
    assert!(engine.stage().continue_prompt);
}

#[test]
fn double_advance_moves_the_cursor_exactly_one_step() {
    let mut engine = started_engine();
    let cursor_before = engine.state().step_cursor;
    // First trigger starts the next line; the second lands mid-reveal
    // and only fast-forwards it.
    engine.advance();
    engine.advance();
    assert_eq!(engine.state().step_cursor, cursor_before + 1);
    assert!(!engine.state().flags.typing);
    assert!(engine.stage().text.complete);
    assert_eq!(engine.stage().text.visible_text(), "Glad you are here.");
}

#[test]
fn reentrant_advance_is_dropped_while_the_guard_is_held() {
    let mut engine = started_engine();
    let cursor_before = engine.state().step_cursor;
    engine.state.flags.advancing = true;
    engine.advance();
    assert_eq!(engine.state().step_cursor, cursor_before);
    engine.state.flags.advancing = false;
}

#[test]
fn fast_forward_twice_is_idempotent() {
    let mut engine = started_engine();
    engine.advance(); // typing
    engine.advance(); // cancel: full text lands
    let text_after_first = engine.stage().text.visible_text().to_string();
    assert_eq!(text_after_first, "Glad you are here.");
    assert_eq!(engine.stage().text.revealed_chars, text_after_first.chars().count());
    // Cancelling again through the public surface must not double-append.
    engine.advance(); // no longer typing: advances to the directive instead
    assert_eq!(engine.phase(), EnginePhase::AwaitingChoice);
}

#[test]
fn advancing_past_the_final_line_always_offers_choices() {
    let mut engine = started_engine();
    advance_to_choices(&mut engine);
    assert_eq!(engine.phase(), EnginePhase::AwaitingChoice);
    let panel = engine.stage().choices.as_ref().expect("choice panel");
    assert_eq!(panel.options, vec!["Begin".to_string()]);
    assert_eq!(engine.stage().speaker.as_deref(), Some(DECISION_LABEL));
    // Further advances are no-ops while awaiting the choice.
    let cursor = engine.state().step_cursor;
    engine.advance();
    assert_eq!(engine.state().step_cursor, cursor);
    assert_eq!(engine.phase(), EnginePhase::AwaitingChoice);
}

#[test]
fn navigation_choices_do_not_score() {
    let mut engine = started_engine();
    advance_to_choices(&mut engine);
    engine.select_choice(0);
    settle(&mut engine);
    assert_eq!(engine.state().current_scene_id, "scene1");
    assert_eq!(engine.state().score.total_scored, 0);
    assert!(engine.state().consequence_log.is_empty());
}

#[test]
fn resolve_choice_scores_and_waits_for_advance() {
    let mut engine = started_engine();
    goto_scene1_choices(&mut engine);

    engine.select_choice(1); // correct
    assert_eq!(engine.phase(), EnginePhase::AwaitingPostChoiceAdvance);
    assert_eq!(engine.state().score.total_scored, 1);
    assert_eq!(engine.state().score.correct_count, 1);
    assert_eq!(engine.stage().speaker.as_deref(), Some(OUTCOME_LABEL));
    assert_eq!(engine.stage().text.full, "You grow.");
    let entry = &engine.state().consequence_log[0];
    assert_eq!(entry.scene_label, "Workshop Choice");
    assert_eq!(entry.choice_label, "Pick fencing");
    assert!(entry.was_correct);
}

#[test]
fn second_click_on_a_resolved_choice_is_ignored() {
    let mut engine = started_engine();
    goto_scene1_choices(&mut engine);
    engine.select_choice(1);
    engine.select_choice(1);
    engine.select_choice(0);
    assert_eq!(engine.state().score.total_scored, 1);
    assert_eq!(engine.state().consequence_log.len(), 1);
}

#[test]
fn post_choice_advance_enters_the_next_scored_scene() {
    let mut engine = started_engine();
    goto_scene1_choices(&mut engine);
    engine.select_choice(0); // incorrect
    engine.advance();
    settle(&mut engine);
    // totalScored == 1, so scene2 is next.
    assert_eq!(engine.state().current_scene_id, "scene2");
}

#[test]
fn missing_next_scene_triggers_ending_evaluation() {
    // Same story minus scene2: one perfect choice ends the run.
    let trimmed: serde_json::Value = {
        let mut value: serde_json::Value = serde_json::from_str(TEST_STORY).expect("json");
        value["scenes"]
            .as_object_mut()
            .expect("scenes")
            .remove("scene2");
        value
    };
    let story = StoryRaw::from_json(&trimmed.to_string())
        .expect("parse")
        .compile()
        .expect("compile");
    let mut engine = SceneEngine::new(story, Settings::default());
    engine.start(SessionStart::New);
    settle(&mut engine);
    advance_to_choices(&mut engine);
    engine.select_choice(0);
    settle(&mut engine);
    advance_to_choices(&mut engine);
    engine.select_choice(1); // correct: 1 of 1
    engine.advance();
    settle(&mut engine);

    assert_eq!(engine.state().current_scene_id, "ending_secret");
    assert_eq!(engine.phase(), EnginePhase::EndingDisplay);
    assert!(matches!(
        engine.stage().ending,
        Some(EndingView::Narrative(_))
    ));
    assert!(engine
        .achievements()
        .is_unlocked(AchievementKey::PerfectRun));
    assert!(engine
        .achievements()
        .is_unlocked(AchievementKey::Completionist));
}

#[test]
fn imperfect_runs_get_the_consequence_report() {
    let mut engine = started_engine();
    engine.state.score.total_scored = 5;
    engine.state.score.correct_count = 3;
    for i in 0..5 {
        engine.state.push_consequence(ConsequenceEntry {
            scene_label: format!("Scene {i}"),
            choice_label: format!("Choice {i}"),
            consequence_text: format!("Outcome {i}"),
            was_correct: i % 2 == 0,
        });
    }
    engine.evaluate_ending();
    settle(&mut engine);

    assert_eq!(engine.state().current_scene_id, "ending_consequences");
    let Some(EndingView::Report(report)) = &engine.stage().ending else {
        panic!("expected report ending, got {:?}", engine.phase());
    };
    assert_eq!(report.rows.len(), 5);
    assert_eq!(report.rows[0].position, 1);
    assert_eq!(report.rows[4].scene_label, "Scene 4");
    assert_eq!(report.correct_count, 3);
    assert_eq!(report.total_scored, 5);
    assert!(!engine
        .achievements()
        .is_unlocked(AchievementKey::PerfectRun));
}

#[test]
fn perfect_scores_select_the_secret_ending() {
    let mut engine = started_engine();
    engine.state.score.total_scored = 5;
    engine.state.score.correct_count = 5;
    engine.evaluate_ending();
    settle(&mut engine);
    assert_eq!(engine.state().current_scene_id, "ending_secret");
}

#[test]
fn hint_round_trip_restores_the_exact_prompt() {
    let mut engine = started_engine();
    goto_scene1_choices(&mut engine);
    let prompt_before = engine.stage().text.full.clone();
    let options_before = engine.stage().choices.as_ref().expect("panel").options.clone();
    assert!(engine.stage().choices.as_ref().expect("panel").hint_available);

    engine.request_hint();
    settle(&mut engine);
    assert_eq!(engine.state().current_scene_id, "hint");
    assert_eq!(engine.state().hint_used_count, 1);
    // The detour's first line carries this scene's hint text.
    assert_eq!(engine.stage().text.full, "Follow your own interest.");

    advance_to_choices(&mut engine);
    assert_eq!(engine.stage().speaker.as_deref(), Some(RETURN_LABEL));
    engine.select_choice(0); // Return
    settle(&mut engine);

    assert_eq!(engine.state().current_scene_id, "scene1");
    assert_eq!(engine.phase(), EnginePhase::AwaitingChoice);
    assert_eq!(engine.stage().text.full, prompt_before);
    assert!(engine.stage().text.complete);
    let panel = engine.stage().choices.as_ref().expect("restored panel");
    assert_eq!(panel.options, options_before);
    assert_eq!(engine.stage().speaker.as_deref(), Some(DECISION_LABEL));
    assert!(engine.state().navigation_stack.is_empty());
}

#[test]
fn hint_is_rejected_outside_choice_prompts() {
    let mut engine = started_engine();
    engine.request_hint();
    assert_eq!(engine.state().current_scene_id, "welcome_message");
    assert_eq!(engine.state().hint_used_count, 0);
}

#[test]
fn hint_scene_speaker_animation_override_applies() {
    let mut engine = started_engine();
    goto_scene1_choices(&mut engine);
    engine.request_hint();
    settle(&mut engine);
    let sprite = engine.stage().sprite("Mentor").expect("mentor sprite");
    match &sprite.image {
        SpriteImage::Animated { base, frames } => {
            assert_eq!(base.as_ref(), "images/sprites/mentor_2");
            assert_eq!(*frames, 6);
        }
        other => panic!("expected animated override, got {other:?}"),
    }
}

#[test]
fn sprite_triggers_fire_at_their_step() {
    let mut engine = started_engine();
    advance_to_choices(&mut engine);
    engine.select_choice(0); // -> scene1
    settle(&mut engine);

    // Entry state: trigger targets are pending.
    assert!(engine.stage().sprite("You").expect("You").visible);
    assert!(!engine.stage().sprite("Latecomer").expect("Latecomer").visible);

    engine.advance(); // step 1 fires hide/show triggers
    settle(&mut engine);
    assert!(!engine.stage().sprite("You").expect("You").visible);
    assert!(engine.stage().sprite("Latecomer").expect("Latecomer").visible);
}

#[test]
fn speaker_emphasis_dims_non_speaking_sprites() {
    let mut engine = started_engine();
    advance_to_choices(&mut engine);
    engine.select_choice(0);
    settle(&mut engine);
    // Line 0 speaker is "Friend".
    assert!(!engine.stage().sprite("Friend").expect("Friend").dimmed);
    assert!(engine.stage().sprite("You").expect("You").dimmed);
}

#[test]
fn bgm_follows_scene_entries_without_restarting_duplicates() {
    let sink = RecordingSink::new();
    let mut engine =
        SceneEngine::new(test_story(), Settings::default()).with_sink(Box::new(sink.clone()));
    engine.start(SessionStart::New);
    settle(&mut engine);
    let starts = |sink: &RecordingSink| {
        sink.events()
            .iter()
            .filter(|e| matches!(e, AudioEvent::Bgm { .. }))
            .count()
    };
    assert_eq!(starts(&sink), 1);
    assert!(sink.sfx_count(TRANSITION_CUE) >= 1);

    // scene1 and scene2 share a track; only one extra start.
    advance_to_choices(&mut engine);
    engine.select_choice(0);
    settle(&mut engine);
    assert_eq!(starts(&sink), 2);
    advance_to_choices(&mut engine);
    engine.select_choice(1);
    engine.advance();
    settle(&mut engine);
    assert_eq!(engine.state().current_scene_id, "scene2");
    assert_eq!(starts(&sink), 2);
}

#[test]
fn typing_cues_fire_during_reveal_and_stop_at_completion() {
    let sink = RecordingSink::new();
    let mut engine =
        SceneEngine::new(test_story(), Settings::default()).with_sink(Box::new(sink.clone()));
    engine.start(SessionStart::New);
    settle(&mut engine);
    let before = sink.sfx_count(TYPING_CUE);
    engine.advance();
    engine.tick(Duration::from_millis(25));
    engine.tick(Duration::from_millis(25));
    assert!(sink.sfx_count(TYPING_CUE) >= before + 2);
    engine.tick(Duration::from_secs(5));
    assert!(sink
        .events()
        .iter()
        .any(|e| matches!(e, AudioEvent::SfxStopped(cue) if cue == TYPING_CUE)));
}

#[test]
fn blocked_bgm_retries_on_the_next_user_gesture() {
    let sink = RecordingSink::blocked();
    let mut engine =
        SceneEngine::new(test_story(), Settings::default()).with_sink(Box::new(sink.clone()));
    engine.start(SessionStart::New);
    settle(&mut engine);
    assert!(!sink
        .events()
        .iter()
        .any(|e| matches!(e, AudioEvent::Bgm { .. })));

    sink.set_allow_bgm(true);
    engine.advance();
    assert!(sink
        .events()
        .iter()
        .any(|e| matches!(e, AudioEvent::Bgm { source, .. } if source == "sound/night.mp3")));
}

#[test]
fn pause_gates_input_and_time() {
    let mut engine = started_engine();
    engine.advance(); // typing second line
    engine.pause();
    let revealed = engine.stage().text.revealed_chars;
    engine.tick(Duration::from_secs(5));
    assert_eq!(engine.stage().text.revealed_chars, revealed);
    let cursor = engine.state().step_cursor;
    engine.advance();
    assert_eq!(engine.state().step_cursor, cursor);
    engine.resume();
    engine.tick(Duration::from_secs(5));
    assert!(engine.stage().text.complete);
}

#[test]
fn autosave_writes_on_the_scored_scene_cadence() {
    let store = PersistenceStore::new(Box::new(MemoryBackend::new()));
    let mut engine = SceneEngine::new(test_story(), Settings::default()).with_store(store);
    // Three scored-scene entries trip the cadence.
    engine.apply_scene_content("scene1");
    engine.apply_scene_content("scene2");
    assert!(!engine.store.as_ref().expect("store").has("autosave_001"));
    engine.apply_scene_content("scene1");
    assert!(engine.store.as_ref().expect("store").has("autosave_001"));
}

#[test]
fn manual_save_and_continue_restore_the_session() {
    let store = PersistenceStore::new(Box::new(MemoryBackend::new()));
    let mut engine = SceneEngine::new(test_story(), Settings::default()).with_store(store);
    engine.start(SessionStart::New);
    settle(&mut engine);
    goto_scene1_choices(&mut engine);
    engine.select_choice(1);
    engine.advance();
    settle(&mut engine);
    assert_eq!(engine.state().current_scene_id, "scene2");

    engine.save_game();
    assert_eq!(engine.drain_notices(), vec![Notice::GameSaved]);
    assert!(engine.has_save());

    engine.return_to_menu();
    assert_eq!(engine.phase(), EnginePhase::Idle);
    engine.start(SessionStart::Continue);
    settle(&mut engine);
    assert_eq!(engine.state().current_scene_id, "scene2");
    assert_eq!(engine.state().score.total_scored, 1);
    assert_eq!(engine.state().score.correct_count, 1);
}

#[test]
fn continue_without_a_save_starts_fresh() {
    let store = PersistenceStore::new(Box::new(MemoryBackend::new()));
    let mut engine = SceneEngine::new(test_story(), Settings::default()).with_store(store);
    engine.start(SessionStart::Continue);
    settle(&mut engine);
    assert_eq!(engine.state().current_scene_id, "welcome_message");
}

#[test]
fn save_without_a_store_reports_failure() {
    let mut engine = started_engine();
    engine.save_game();
    assert_eq!(engine.drain_notices(), vec![Notice::SaveFailed]);
}

#[test]
fn first_choice_and_speed_reader_achievements() {
    let mut engine = started_engine();
    assert!(!engine
        .achievements()
        .is_unlocked(AchievementKey::FirstChoice));
    goto_scene1_choices(&mut engine);
    engine.select_choice(0);
    assert!(engine
        .achievements()
        .is_unlocked(AchievementKey::FirstChoice));

    engine.state.skip_count = SPEED_READER_THRESHOLD - 1;
    engine.advance(); // consequence -> scene2 transition
    settle(&mut engine);
    engine.advance(); // start a line, then cancel it
    engine.advance();
    assert!(engine
        .achievements()
        .is_unlocked(AchievementKey::SpeedReader));
}

#[test]
fn opening_history_unlocks_storyteller_once_lines_exist() {
    let mut engine = started_engine();
    let lines = engine.open_history();
    assert!(!lines.is_empty());
    assert!(engine
        .achievements()
        .is_unlocked(AchievementKey::Storyteller));
}

#[test]
fn navigating_to_an_unknown_scene_is_a_logged_no_op() {
    let mut engine = started_engine();
    let scene_before = engine.state().current_scene_id.clone();
    engine.enter_scene("no_such_scene");
    settle(&mut engine);
    assert_eq!(engine.state().current_scene_id, scene_before);
}

#[test]
fn transition_veil_covers_then_clears() {
    let mut engine = SceneEngine::new(test_story(), Settings::default());
    engine.start(SessionStart::New);
    assert_eq!(engine.stage().veil, Veil::Covering);
    engine.tick(VEIL_COVER);
    assert_eq!(engine.stage().veil, Veil::Revealing);
    assert_eq!(engine.state().current_scene_id, "welcome_message");
    engine.tick(VEIL_REVEAL);
    assert_eq!(engine.stage().veil, Veil::Clear);
    assert_ne!(engine.phase(), EnginePhase::Transitioning);
}

#[test]
fn rich_markup_text_lands_instantly() {
    let story_json = r#"{
        "scenes": {
            "welcome_message": {
                "location": "Welcome",
                "story": [
                    { "speaker": "System", "text": "A <span style=\"color: red\">marked</span> line." },
                    { "action": "show_choices", "text": "Go on?" }
                ],
                "choices": [ { "text": "Go", "nextScene": "welcome_message" } ]
            }
        }
    }"#;
    let story = StoryRaw::from_json(story_json)
        .expect("parse")
        .compile()
        .expect("compile");
    let mut engine = SceneEngine::new(story, Settings::default());
    engine.start(SessionStart::New);
    engine.tick(VEIL_COVER);
    // No reveal: the line is complete the moment it is set.
    assert!(engine.stage().text.rich);
    assert!(engine.stage().text.complete);
    assert_eq!(engine.phase(), EnginePhase::Transitioning);
    engine.tick(VEIL_REVEAL);
    assert_eq!(engine.phase(), EnginePhase::LineComplete);
}
