//! Stop and timeout flows: both cancel the session's token and run the
//! same aborted terminal path, which posts exactly one fixed stop
//! acknowledgment.

use agent_dispatch::adapter::{AdapterEvent, ExecutionOutcome};
use agent_dispatch::orchestrator::STOP_ACKNOWLEDGMENT;

use super::test_helpers::{
    harness, harness_with_timeouts, question_event, stop_event, wait_for_pending_question,
    wait_for_register, wait_for_unregister, Step,
};

#[tokio::test]
async fn stop_event_aborts_and_acknowledges_exactly_once() {
    let h = harness(vec![Step::HangUntilCancelled]).await;

    h.orchestrator
        .handle_event(question_event("d-1", "s-stop", "T-1", "long task"))
        .await;
    wait_for_register(&h.registry, "s-stop").await;

    h.orchestrator
        .handle_event(stop_event("d-2", "s-stop", "T-1"))
        .await;
    wait_for_unregister(&h.registry, "s-stop").await;

    let acks: Vec<_> = h
        .tracker
        .activities("s-stop")
        .into_iter()
        .filter(|(kind, body)| kind == "response" && body == STOP_ACKNOWLEDGMENT)
        .collect();
    assert_eq!(acks.len(), 1, "exactly one stop acknowledgment");
    assert_eq!(h.tracker.statuses("s-stop"), vec!["started", "stopped"]);
}

#[tokio::test]
async fn stop_cancels_the_session_token() {
    let h = harness(vec![Step::HangUntilCancelled]).await;

    h.orchestrator
        .handle_event(question_event("d-1", "s-tok", "T-2", "hold"))
        .await;
    wait_for_register(&h.registry, "s-tok").await;

    let cancel = h
        .registry
        .cancellation("s-tok")
        .await
        .expect("live session has a token");
    assert!(!cancel.is_cancelled());

    h.orchestrator.stop_session("s-tok").await;
    assert!(cancel.is_cancelled(), "stop must cancel the session token");
    wait_for_unregister(&h.registry, "s-tok").await;
}

#[tokio::test]
async fn duplicate_stop_deliveries_produce_one_acknowledgment() {
    let h = harness(vec![Step::HangUntilCancelled]).await;

    h.orchestrator
        .handle_event(question_event("d-1", "s-dup-stop", "T-3", "hold"))
        .await;
    wait_for_register(&h.registry, "s-dup-stop").await;

    // Two distinct deliveries; the second lands after the session is gone
    // and is a no-op.
    h.orchestrator
        .handle_event(stop_event("d-2", "s-dup-stop", "T-3"))
        .await;
    wait_for_unregister(&h.registry, "s-dup-stop").await;
    h.orchestrator
        .handle_event(stop_event("d-3", "s-dup-stop", "T-3"))
        .await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let acks: Vec<_> = h
        .tracker
        .activities("s-dup-stop")
        .into_iter()
        .filter(|(kind, body)| kind == "response" && body == STOP_ACKNOWLEDGMENT)
        .collect();
    assert_eq!(acks.len(), 1);
}

#[tokio::test]
async fn session_timeout_runs_the_same_aborted_path() {
    // 2s session window; the adapter never completes.
    let h = harness_with_timeouts(vec![Step::HangUntilCancelled], 2, 1).await;

    h.orchestrator
        .handle_event(question_event("d-1", "s-timeout", "T-4", "never finishes"))
        .await;
    wait_for_register(&h.registry, "s-timeout").await;

    wait_for_unregister(&h.registry, "s-timeout").await;

    let activities = h.tracker.activities("s-timeout");
    assert!(
        activities
            .iter()
            .any(|(kind, body)| kind == "response" && body == STOP_ACKNOWLEDGMENT),
        "timeout must acknowledge like a stop, got {activities:?}"
    );
    assert_eq!(h.tracker.statuses("s-timeout"), vec!["started", "stopped"]);
}

#[tokio::test]
async fn elicitation_window_times_out_a_parked_session() {
    // Short elicitation window; the question is never answered.
    let h = harness_with_timeouts(
        vec![
            Step::Emit(AdapterEvent::Question {
                id: "q-1".into(),
                text: "still there?".into(),
            }),
            Step::AwaitInput,
            Step::Emit(AdapterEvent::Completed {
                outcome: ExecutionOutcome::Success { summary: "unreached".into() },
            }),
        ],
        30,
        1,
    )
    .await;

    h.orchestrator
        .handle_event(question_event("d-1", "s-elicit", "T-5", "start"))
        .await;
    wait_for_pending_question(&h.registry, "s-elicit").await;

    // The re-armed 1s elicitation window expires and aborts the session.
    wait_for_unregister(&h.registry, "s-elicit").await;
    assert_eq!(h.tracker.statuses("s-elicit"), vec!["started", "stopped"]);
}

#[tokio::test]
async fn abort_all_stops_every_live_session() {
    let h = harness(vec![Step::HangUntilCancelled, Step::HangUntilCancelled]).await;

    h.orchestrator
        .handle_event(question_event("d-1", "s-a", "T-6", "one"))
        .await;
    wait_for_register(&h.registry, "s-a").await;

    h.orchestrator.abort_all().await;
    wait_for_unregister(&h.registry, "s-a").await;
    assert!(h.registry.snapshots().await.is_empty());
}

#[tokio::test]
async fn drain_waits_for_every_terminal_path() {
    let h = harness(vec![Step::HangUntilCancelled]).await;

    h.orchestrator
        .handle_event(question_event("d-1", "s-drain", "T-7", "hold"))
        .await;
    wait_for_register(&h.registry, "s-drain").await;

    // Shutdown sequence: abort everything, then wait for the session
    // tasks. No polling afterwards — drain itself must guarantee the
    // terminal effects have landed.
    h.orchestrator.abort_all().await;
    h.orchestrator.drain().await;

    assert!(
        h.registry.snapshots().await.is_empty(),
        "drained sessions must be unregistered"
    );
    assert_eq!(h.tracker.statuses("s-drain"), vec!["started", "stopped"]);
    let acks: Vec<_> = h
        .tracker
        .activities("s-drain")
        .into_iter()
        .filter(|(kind, body)| kind == "response" && body == STOP_ACKNOWLEDGMENT)
        .collect();
    assert_eq!(acks.len(), 1, "stop acknowledgment must land before drain returns");
}
