use std::time::Duration;

use survey_client::SurveyCommand;

use super::{Script, Step};

const WALKTHROUGH: &str = r#"{
  "steps": [
    { "step": "personalia", "fields": [["name", "Anna"], ["nativelang", "nl"]] },
    { "step": "next" },
    { "step": "image_shown" },
    { "step": "pause", "ms": 250 },
    { "step": "fill", "target": "kat", "color": "red" },
    { "step": "previous" },
    { "step": "evaluation", "fields": [["remarks", "none"]] }
  ]
}"#;

#[test]
fn parses_every_step_kind() {
    let script = Script::parse(WALKTHROUGH).expect("script");
    assert_eq!(script.steps.len(), 7);
    assert_eq!(
        script.steps[4],
        Step::Fill {
            target: "kat".into(),
            color: "red".into()
        }
    );
    assert_eq!(script.evaluations(), 1);
}

#[test]
fn pauses_map_to_sleeps_not_commands() {
    let pause = Step::Pause { ms: 250 };
    assert!(pause.command().is_none());
    assert_eq!(pause.pause(), Some(Duration::from_millis(250)));

    let fill = Step::Fill {
        target: "kat".into(),
        color: "red".into(),
    };
    assert!(fill.pause().is_none());
    assert!(matches!(
        fill.command(),
        Some(SurveyCommand::ColorRegion { ref target, ref color }) if target == "kat" && color == "red"
    ));
}

#[test]
fn personalia_fields_keep_form_order() {
    let script = Script::parse(WALKTHROUGH).expect("script");
    let Some(SurveyCommand::SubmitPersonalia(fields)) = script.steps[0].command() else {
        panic!("expected personalia command");
    };
    assert_eq!(fields[0].0, "name");
    assert_eq!(fields[1], ("nativelang".to_string(), "nl".to_string()));
}

#[test]
fn empty_or_unknown_scripts_are_refused() {
    assert!(Script::parse(r#"{ "steps": [] }"#).is_err());
    assert!(Script::parse(r#"{ "steps": [{ "step": "dance" }] }"#).is_err());
    assert_eq!(
        Script::parse(r#"{ "steps": [{ "step": "next" }] }"#)
            .expect("script")
            .evaluations(),
        0
    );
}
