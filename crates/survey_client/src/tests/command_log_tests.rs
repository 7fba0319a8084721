use super::*;
use crate::tests_support::RecordingRenderer;

#[test]
fn empty_log_serializes_to_empty_sequence() {
    let log = CommandLog::new();
    assert!(log.serialize().is_empty());
    assert!(log.is_empty());
}

#[test]
fn fill_is_timestamped_relative_to_onset_and_painted_once() {
    let mut renderer = RecordingRenderer::default();
    let mut log = CommandLog::new();

    let command = log.fill("A", "#d01", 10_000, 11_200, &mut renderer);
    assert_eq!(command.time_ms(), 1200);
    assert_eq!(
        command.kind(),
        &CommandKind::Fill {
            target: "A".to_string(),
            color: "#d01".to_string(),
        }
    );

    assert_eq!(renderer.fills, vec![("A".to_string(), "#d01".to_string())]);
}

#[test]
fn serializes_k_commands_in_chain_order() {
    let mut renderer = RecordingRenderer::default();
    let mut log = CommandLog::new();
    log.fill("A", "#d01", 0, 100, &mut renderer);
    log.resume(0, 150);
    log.fill("B", "#f90", 0, 300, &mut renderer);

    assert_eq!(log.len(), 3);
    assert_eq!(
        log.serialize(),
        vec![
            CommandRecord::Fill {
                target: "A".to_string(),
                color: "#d01".to_string(),
                time: 100
            },
            CommandRecord::Resume { time: 150 },
            CommandRecord::Fill {
                target: "B".to_string(),
                color: "#f90".to_string(),
                time: 300
            },
        ]
    );
}

#[test]
fn resume_does_not_touch_the_renderer() {
    let mut renderer = RecordingRenderer::default();
    let mut log = CommandLog::new();
    log.resume(500, 400).apply(&mut renderer);

    assert!(renderer.fills.is_empty());
    assert_eq!(log.serialize(), vec![CommandRecord::Resume { time: 0 }]);
}
