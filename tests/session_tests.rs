mod common;

use std::sync::Arc;
use std::time::Instant;

use sightline::gateway::{IntentResult, TaskVerdict};
use sightline::outbound::ClientMessage;
use sightline::session::{Mode, VoiceIntent};
use sightline::task::{TaskBoard, TaskState};

use common::{plan_of, recv, start_session, voice_inquiry, MockGateway};

fn intent(name: &str) -> IntentResult {
    IntentResult {
        intent: name.to_string(),
        speech: "model speech".to_string(),
        ..Default::default()
    }
}

#[test]
fn test_voice_intent_parsing() {
    assert_eq!(VoiceIntent::parse("search"), VoiceIntent::Search);
    assert_eq!(VoiceIntent::parse("micro_nav"), VoiceIntent::MicroNav);
    assert_eq!(VoiceIntent::parse("task_done"), VoiceIntent::TaskDone);
    // Unknown task_* strings stay in the task-control family.
    assert_eq!(VoiceIntent::parse("task_pause"), VoiceIntent::TaskUnknown);
    // Anything else degrades to info.
    assert_eq!(VoiceIntent::parse("gibberish"), VoiceIntent::Info);
    assert_eq!(VoiceIntent::parse(""), VoiceIntent::Info);
}

#[tokio::test]
async fn test_search_intent_sets_goal_and_overrides_speech() {
    let gateway = MockGateway::new();
    gateway.set_intent(IntentResult {
        search_target: Some("door".to_string()),
        ..intent("search")
    });
    let (handle, mut rx) = start_session(Arc::clone(&gateway), Arc::new(TaskBoard::new()));

    assert!(handle.inquiry(voice_inquiry()).await);

    match recv(&mut rx).await {
        ClientMessage::InquiryResult { mode, current_goal, task_active, .. } => {
            assert_eq!(mode, Mode::Nav);
            assert_eq!(current_goal.as_deref(), Some("door"));
            assert!(!task_active);
        }
        other => panic!("expected inquiry_result, got {:?}", other),
    }
    match recv(&mut rx).await {
        ClientMessage::Speak { text } => assert_eq!(text, "Okay, searching for door."),
        other => panic!("expected speak, got {:?}", other),
    }

    handle.close().await;
}

#[tokio::test]
async fn test_info_intent_keeps_model_speech() {
    let gateway = MockGateway::new();
    gateway.set_intent(IntentResult {
        speech: "Your keys were on the desk.".to_string(),
        ..intent("info")
    });
    let (handle, mut rx) = start_session(Arc::clone(&gateway), Arc::new(TaskBoard::new()));

    handle.inquiry(voice_inquiry()).await;

    assert!(matches!(recv(&mut rx).await, ClientMessage::InquiryResult { .. }));
    match recv(&mut rx).await {
        ClientMessage::Speak { text } => assert_eq!(text, "Your keys were on the desk."),
        other => panic!("expected speak, got {:?}", other),
    }

    handle.close().await;
}

#[tokio::test]
async fn test_micro_nav_intent_switches_mode_and_routes_frames() {
    let gateway = MockGateway::new();
    gateway.set_intent(IntentResult {
        target: Some("elevator button".to_string()),
        ..intent("micro_nav")
    });
    let (handle, mut rx) = start_session(Arc::clone(&gateway), Arc::new(TaskBoard::new()));

    handle.inquiry(voice_inquiry()).await;
    match recv(&mut rx).await {
        ClientMessage::InquiryResult { mode, .. } => assert_eq!(mode, Mode::Micro),
        other => panic!("expected inquiry_result, got {:?}", other),
    }
    match recv(&mut rx).await {
        ClientMessage::Speak { text } => {
            assert_eq!(text, "Guiding you to the elevator button. Hold steady.");
        }
        other => panic!("expected speak, got {:?}", other),
    }

    // Frames now route to the micro handler.
    handle.submit_frame(vec![1, 2, 3], 0.0);
    assert!(matches!(recv(&mut rx).await, ClientMessage::MicroResult { .. }));

    handle.close().await;
}

#[tokio::test]
async fn test_task_intent_activates_plan_and_mirrors_board() {
    let gateway = MockGateway::new();
    gateway.set_plan(plan_of(&["find mug", "fill kettle"]));
    gateway.set_intent(IntentResult {
        task_name: Some("make tea".to_string()),
        ..intent("task")
    });
    let board = Arc::new(TaskBoard::new());
    let (handle, mut rx) = start_session(Arc::clone(&gateway), Arc::clone(&board));

    handle.inquiry(voice_inquiry()).await;

    match recv(&mut rx).await {
        ClientMessage::TaskUpdate { plan, current_step_index, .. } => {
            assert_eq!(plan.len(), 2);
            assert_eq!(current_step_index, 0);
        }
        other => panic!("expected task_update, got {:?}", other),
    }
    match recv(&mut rx).await {
        ClientMessage::InquiryResult { mode, task_active, .. } => {
            assert_eq!(mode, Mode::Task);
            assert!(task_active);
        }
        other => panic!("expected inquiry_result, got {:?}", other),
    }
    match recv(&mut rx).await {
        ClientMessage::Speak { text } => {
            assert_eq!(text, "Plan generated for make tea. First step: find mug");
        }
        other => panic!("expected speak, got {:?}", other),
    }

    // Activation is mirrored durably.
    let snapshot = board.snapshot();
    assert!(snapshot.active);
    assert_eq!(snapshot.task_name, "make tea");

    handle.close().await;
}

#[tokio::test]
async fn test_empty_plan_speaks_failure_without_mode_change() {
    let gateway = MockGateway::new();
    // No plan scripted: the planner returns an empty list.
    gateway.set_intent(IntentResult {
        task_name: Some("fly to the moon".to_string()),
        ..intent("task")
    });
    let (handle, mut rx) = start_session(Arc::clone(&gateway), Arc::new(TaskBoard::new()));

    handle.inquiry(voice_inquiry()).await;

    match recv(&mut rx).await {
        ClientMessage::InquiryResult { mode, task_active, .. } => {
            assert_eq!(mode, Mode::Nav, "a failed plan must not change mode");
            assert!(!task_active);
        }
        other => panic!("expected inquiry_result, got {:?}", other),
    }
    match recv(&mut rx).await {
        ClientMessage::Speak { text } => assert_eq!(text, "I couldn't generate a valid plan."),
        other => panic!("expected speak, got {:?}", other),
    }

    handle.close().await;
}

#[tokio::test]
async fn test_task_skip_through_last_step_returns_to_nav() {
    let gateway = MockGateway::new();
    gateway.set_plan(plan_of(&["find mug", "fill kettle"]));
    gateway.set_intent(IntentResult {
        task_name: Some("make tea".to_string()),
        ..intent("task")
    });
    let board = Arc::new(TaskBoard::new());
    let (handle, mut rx) = start_session(Arc::clone(&gateway), Arc::clone(&board));

    handle.inquiry(voice_inquiry()).await;
    for _ in 0..3 {
        recv(&mut rx).await; // task_update, inquiry_result, speak
    }

    // Skip the first step.
    gateway.set_intent(intent("task_skip"));
    handle.inquiry(voice_inquiry()).await;
    match recv(&mut rx).await {
        ClientMessage::TaskUpdate { current_step_index, .. } => assert_eq!(current_step_index, 1),
        other => panic!("expected task_update, got {:?}", other),
    }
    recv(&mut rx).await; // inquiry_result
    match recv(&mut rx).await {
        ClientMessage::Speak { text } => assert_eq!(text, "Done. Next: fill kettle"),
        other => panic!("expected speak, got {:?}", other),
    }

    // Skipping the last step deactivates the task and returns to navigation.
    handle.inquiry(voice_inquiry()).await;
    recv(&mut rx).await; // task_update
    match recv(&mut rx).await {
        ClientMessage::InquiryResult { mode, task_active, .. } => {
            assert_eq!(mode, Mode::Nav);
            assert!(!task_active);
        }
        other => panic!("expected inquiry_result, got {:?}", other),
    }
    match recv(&mut rx).await {
        ClientMessage::Speak { text } => assert_eq!(text, "Task completed."),
        other => panic!("expected speak, got {:?}", other),
    }

    assert!(!board.snapshot().active, "completion is mirrored durably");
    handle.close().await;
}

#[tokio::test]
async fn test_task_previous_at_start_reports_without_change() {
    let gateway = MockGateway::new();
    gateway.set_plan(plan_of(&["find mug", "fill kettle"]));
    gateway.set_intent(IntentResult {
        task_name: Some("make tea".to_string()),
        ..intent("task")
    });
    let (handle, mut rx) = start_session(Arc::clone(&gateway), Arc::new(TaskBoard::new()));

    handle.inquiry(voice_inquiry()).await;
    for _ in 0..3 {
        recv(&mut rx).await;
    }

    gateway.set_intent(intent("task_previous"));
    handle.inquiry(voice_inquiry()).await;
    match recv(&mut rx).await {
        ClientMessage::TaskUpdate { current_step_index, .. } => {
            assert_eq!(current_step_index, 0, "index unchanged at start");
        }
        other => panic!("expected task_update, got {:?}", other),
    }
    match recv(&mut rx).await {
        ClientMessage::InquiryResult { task_active, .. } => assert!(task_active),
        other => panic!("expected inquiry_result, got {:?}", other),
    }
    match recv(&mut rx).await {
        ClientMessage::Speak { text } => assert_eq!(text, "Already at start."),
        other => panic!("expected speak, got {:?}", other),
    }

    handle.close().await;
}

#[tokio::test]
async fn test_unknown_task_control_reports_unknown_command() {
    let gateway = MockGateway::new();
    gateway.set_plan(plan_of(&["find mug"]));
    gateway.set_intent(IntentResult {
        task_name: Some("make tea".to_string()),
        ..intent("task")
    });
    let (handle, mut rx) = start_session(Arc::clone(&gateway), Arc::new(TaskBoard::new()));

    handle.inquiry(voice_inquiry()).await;
    for _ in 0..3 {
        recv(&mut rx).await;
    }

    gateway.set_intent(intent("task_pause"));
    handle.inquiry(voice_inquiry()).await;
    recv(&mut rx).await; // task_update
    recv(&mut rx).await; // inquiry_result
    match recv(&mut rx).await {
        ClientMessage::Speak { text } => assert_eq!(text, "Unknown task command."),
        other => panic!("expected speak, got {:?}", other),
    }

    handle.close().await;
}

#[tokio::test]
async fn test_stop_intent_clears_everything() {
    let gateway = MockGateway::new();
    gateway.set_plan(plan_of(&["find mug"]));
    gateway.set_intent(IntentResult {
        task_name: Some("make tea".to_string()),
        ..intent("task")
    });
    let board = Arc::new(TaskBoard::new());
    let (handle, mut rx) = start_session(Arc::clone(&gateway), Arc::clone(&board));

    handle.inquiry(voice_inquiry()).await;
    for _ in 0..3 {
        recv(&mut rx).await;
    }
    assert!(board.snapshot().active);

    gateway.set_intent(intent("stop"));
    handle.inquiry(voice_inquiry()).await;
    match recv(&mut rx).await {
        ClientMessage::InquiryResult { mode, current_goal, task_active, .. } => {
            assert_eq!(mode, Mode::Nav);
            assert!(current_goal.is_none());
            assert!(!task_active);
        }
        other => panic!("expected inquiry_result, got {:?}", other),
    }
    match recv(&mut rx).await {
        ClientMessage::Speak { text } => assert_eq!(text, "Stopping all tasks and searches."),
        other => panic!("expected speak, got {:?}", other),
    }

    assert!(!board.snapshot().active, "durable task deactivated");
    handle.close().await;
}

#[tokio::test]
async fn test_new_session_adopts_fresh_durable_task() {
    let board = Arc::new(TaskBoard::new());
    board.sync_at(
        &TaskState::begin(plan_of(&["find mug", "fill kettle"])),
        Some("make tea"),
        Instant::now(),
    );

    let gateway = MockGateway::new();
    let (handle, mut rx) = start_session(gateway, Arc::clone(&board));

    match recv(&mut rx).await {
        ClientMessage::TaskUpdate { plan, current_step_index, restored, .. } => {
            assert_eq!(plan.len(), 2);
            assert_eq!(current_step_index, 0);
            assert_eq!(restored, Some(true));
        }
        other => panic!("expected task_update, got {:?}", other),
    }
    match recv(&mut rx).await {
        ClientMessage::Speak { text } => assert_eq!(text, "Resuming. Step: find mug"),
        other => panic!("expected speak, got {:?}", other),
    }

    handle.close().await;
}

#[tokio::test]
async fn test_session_flushes_task_on_close() {
    let gateway = MockGateway::new();
    gateway.set_plan(plan_of(&["find mug"]));
    gateway.set_intent(IntentResult {
        task_name: Some("make tea".to_string()),
        ..intent("task")
    });
    let board = Arc::new(TaskBoard::new());
    let (handle, mut rx) = start_session(Arc::clone(&gateway), Arc::clone(&board));

    handle.inquiry(voice_inquiry()).await;
    for _ in 0..3 {
        recv(&mut rx).await;
    }

    handle.close().await;
    let snapshot = board.snapshot();
    assert!(snapshot.active, "active task survives the session teardown");
    assert_eq!(snapshot.task_name, "make tea");
}

#[tokio::test]
async fn test_task_frame_advances_on_positive_verdict() {
    let gateway = MockGateway::new();
    gateway.set_plan(plan_of(&["find mug", "fill kettle"]));
    gateway.set_intent(IntentResult {
        task_name: Some("make tea".to_string()),
        ..intent("task")
    });
    let board = Arc::new(TaskBoard::new());
    let (handle, mut rx) = start_session(Arc::clone(&gateway), Arc::clone(&board));

    handle.inquiry(voice_inquiry()).await;
    for _ in 0..3 {
        recv(&mut rx).await;
    }

    gateway.set_verdict(TaskVerdict {
        step_completed: true,
        speech: String::new(),
        visual_feedback: "mug in hand".to_string(),
    });
    handle.submit_frame(vec![1], 0.0);

    match recv(&mut rx).await {
        ClientMessage::Speak { text } => assert_eq!(text, "Step done. Next: fill kettle"),
        other => panic!("expected speak, got {:?}", other),
    }
    match recv(&mut rx).await {
        ClientMessage::TaskUpdate { current_step_index, visual_feedback, .. } => {
            assert_eq!(current_step_index, 1);
            assert_eq!(visual_feedback.as_deref(), Some("mug in hand"));
        }
        other => panic!("expected task_update, got {:?}", other),
    }
    assert_eq!(board.snapshot().current_step_index, 1);

    // Completing the final step ends the task.
    handle.submit_frame(vec![1], 0.0);
    match recv(&mut rx).await {
        ClientMessage::Speak { text } => assert_eq!(text, "Task completed! Great job."),
        other => panic!("expected speak, got {:?}", other),
    }
    match recv(&mut rx).await {
        ClientMessage::TaskUpdate { .. } => {}
        other => panic!("expected task_update, got {:?}", other),
    }
    assert!(!board.snapshot().active);

    handle.close().await;
}

#[tokio::test]
async fn test_task_frame_guidance_is_gated() {
    let gateway = MockGateway::new();
    gateway.set_plan(plan_of(&["find mug"]));
    gateway.set_intent(IntentResult {
        task_name: Some("make tea".to_string()),
        ..intent("task")
    });
    let (handle, mut rx) = start_session(Arc::clone(&gateway), Arc::new(TaskBoard::new()));

    handle.inquiry(voice_inquiry()).await;
    for _ in 0..3 {
        recv(&mut rx).await;
    }

    gateway.set_verdict(TaskVerdict {
        step_completed: false,
        speech: "I see the mug, now pick it up".to_string(),
        visual_feedback: "searching".to_string(),
    });

    // First guidance goes through the gate and is spoken.
    handle.submit_frame(vec![1], 0.0);
    match recv(&mut rx).await {
        ClientMessage::Speak { text } => assert_eq!(text, "I see the mug, now pick it up"),
        other => panic!("expected speak, got {:?}", other),
    }
    assert!(matches!(recv(&mut rx).await, ClientMessage::TaskUpdate { .. }));

    // An immediate identical guidance is debounced: only the task_update
    // arrives for the second frame.
    handle.submit_frame(vec![1], 0.0);
    match recv(&mut rx).await {
        ClientMessage::TaskUpdate { .. } => {}
        ClientMessage::Speak { text } => panic!("guidance should be debounced, spoke {:?}", text),
        other => panic!("expected task_update, got {:?}", other),
    }

    handle.close().await;
}
