mod common;

use common::*;
use scene_novel_engine::{
    AchievementKey, EnginePhase, EndingView, TRANSCRIPT_LIMIT, UiView,
};

#[test]
fn perfect_run_reaches_the_secret_ending() {
    let mut engine = new_session(story_with_main_scenes(5));
    advance_to_choices(&mut engine);
    engine.select_choice(0); // Begin
    settle(&mut engine);

    for _ in 0..5 {
        resolve_and_continue(&mut engine, 1);
    }

    assert_eq!(engine.state().current_scene_id, "ending_secret");
    assert_eq!(engine.phase(), EnginePhase::EndingDisplay);
    assert_eq!(engine.state().score.total_scored, 5);
    assert_eq!(engine.state().score.correct_count, 5);
    assert!(engine.achievements().is_unlocked(AchievementKey::PerfectRun));
    match UiView::project(&engine) {
        UiView::EndingNarrative { lines, options } => {
            assert!(!lines.is_empty());
            assert_eq!(options, vec!["Continue".to_string()]);
        }
        other => panic!("expected narrative ending view, got {other:?}"),
    }
}

#[test]
fn mixed_run_renders_the_report_in_play_order() {
    let mut engine = new_session(story_with_main_scenes(5));
    advance_to_choices(&mut engine);
    engine.select_choice(0);
    settle(&mut engine);

    // Correct on scenes 1, 3, 5; wrong on 2 and 4.
    for n in 1..=5u32 {
        resolve_and_continue(&mut engine, if n % 2 == 1 { 1 } else { 0 });
    }

    assert_eq!(engine.state().current_scene_id, "ending_consequences");
    let Some(EndingView::Report(report)) = &engine.stage().ending else {
        panic!("expected consequence report");
    };
    assert_eq!(report.correct_count, 3);
    assert_eq!(report.total_scored, 5);
    assert_eq!(report.rows.len(), 5);
    for (index, row) in report.rows.iter().enumerate() {
        assert_eq!(row.position, index + 1);
        assert_eq!(row.scene_label, format!("Situation {}", index + 1));
        assert_eq!(row.was_correct, index % 2 == 0);
    }
    assert_eq!(
        report.summary(),
        "You made 3 of 5 decisions in the spirit of the story."
    );
    assert!(!engine.achievements().is_unlocked(AchievementKey::PerfectRun));
}

#[test]
fn scoring_happens_only_on_resolutions() {
    let mut engine = new_session(story_with_main_scenes(2));
    // Welcome navigation does not score.
    advance_to_choices(&mut engine);
    engine.select_choice(0);
    settle(&mut engine);
    assert_eq!(engine.state().score.total_scored, 0);

    // A hint detour (navigate + return) does not score either.
    advance_to_choices(&mut engine);
    engine.request_hint();
    settle(&mut engine);
    advance_to_choices(&mut engine);
    engine.select_choice(0); // Return
    settle(&mut engine);
    assert_eq!(engine.state().score.total_scored, 0);

    // The resolution does.
    engine.select_choice(1);
    assert_eq!(engine.state().score.total_scored, 1);
    assert_eq!(engine.state().score.correct_count, 1);
    assert!(engine.state().score.correct_count <= engine.state().score.total_scored);
}

#[test]
fn hint_round_trip_restores_the_prompt_mid_run() {
    let mut engine = new_session(story_with_main_scenes(3));
    advance_to_choices(&mut engine);
    engine.select_choice(0);
    settle(&mut engine);

    advance_to_choices(&mut engine);
    let prompt = engine.stage().text.full.clone();
    let options = engine.stage().choices.as_ref().unwrap().options.clone();

    engine.request_hint();
    settle(&mut engine);
    assert_eq!(engine.state().current_scene_id, "hint");
    assert_eq!(engine.stage().text.full, "Advice for situation 1.");

    advance_to_choices(&mut engine);
    engine.select_choice(0);
    settle(&mut engine);

    assert_eq!(engine.state().current_scene_id, "scene1");
    assert_eq!(engine.phase(), EnginePhase::AwaitingChoice);
    assert_eq!(engine.stage().text.full, prompt);
    assert_eq!(
        engine.stage().choices.as_ref().unwrap().options,
        options
    );

    // The run continues normally afterwards.
    engine.select_choice(1);
    assert_eq!(engine.state().score.total_scored, 1);
}

#[test]
fn transcript_keeps_only_the_most_recent_lines() {
    let mut engine = new_session(story_with_long_scene(150));
    advance_to_choices(&mut engine);

    let transcript = &engine.state().transcript;
    assert_eq!(transcript.len(), TRANSCRIPT_LIMIT);
    assert_eq!(transcript.front().unwrap().text, "Line number 50.");
    assert_eq!(transcript.back().unwrap().text, "Line number 149.");
}

#[test]
fn choice_prompt_projection_carries_options_and_hint_flag() {
    let mut engine = new_session(story_with_main_scenes(1));
    advance_to_choices(&mut engine);
    engine.select_choice(0);
    settle(&mut engine);
    advance_to_choices(&mut engine);

    match UiView::project(&engine) {
        UiView::ChoicePrompt {
            location,
            prompt,
            options,
            hint_available,
            ..
        } => {
            assert_eq!(location, "Situation 1");
            assert_eq!(prompt, "Decision 1?");
            assert_eq!(options.len(), 2);
            assert!(hint_available);
        }
        other => panic!("expected choice prompt, got {other:?}"),
    }
}

#[test]
fn consequence_projection_shows_the_outcome_text() {
    let mut engine = new_session(story_with_main_scenes(1));
    advance_to_choices(&mut engine);
    engine.select_choice(0);
    settle(&mut engine);
    advance_to_choices(&mut engine);
    engine.select_choice(0);

    match UiView::project(&engine) {
        UiView::Consequence { text } => {
            assert_eq!(text, "Setback in situation 1.");
        }
        other => panic!("expected consequence view, got {other:?}"),
    }
}
