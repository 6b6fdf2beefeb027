use std::sync::Arc;

use homerelay::{
    application::{config::RuntimeConfig, snapshots::SnapshotScheduler, state::SharedState},
    domain::models::InboundEvent,
    interfaces::{chat::ChatSessions, media::MediaTransformer},
};

use super::support::{GatewayCall, RecordingGateway, camera};

struct Harness {
    state: SharedState,
    gateway: Arc<RecordingGateway>,
    scheduler: Arc<SnapshotScheduler>,
    sessions: ChatSessions,
    _temp: tempfile::TempDir,
}

async fn harness() -> Harness {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let config = RuntimeConfig::for_test(
        temp.path().join("relay.db"),
        temp.path().to_path_buf(),
        vec![camera(
            "door",
            "Front door",
            Some("http://127.0.0.1:1/unreachable.jpg".to_owned()),
        )],
    );

    let state = SharedState::new(config).await.expect("state should build");
    let gateway = Arc::new(RecordingGateway::default());
    let scheduler = Arc::new(SnapshotScheduler::new(
        gateway.clone(),
        state.http().clone(),
        state.cameras().clone(),
    ));
    let sessions = ChatSessions::new(
        state.clone(),
        gateway.clone(),
        scheduler.clone(),
        Arc::new(MediaTransformer::new(None, None, 1280)),
    );

    Harness {
        state,
        gateway,
        scheduler,
        sessions,
        _temp: temp,
    }
}

fn text_event(chat_id: i64, text: &str) -> InboundEvent {
    InboundEvent::Text {
        chat_id,
        text: text.to_owned(),
    }
}

#[tokio::test]
async fn interval_commands_persist_and_schedule() {
    let harness = harness().await;

    harness
        .sessions
        .dispatch(text_event(42, "/snapshot interval 15"))
        .await;
    harness.sessions.close_all().await;

    assert_eq!(
        harness
            .state
            .store()
            .snapshot_interval(42)
            .await
            .expect("interval should be readable"),
        Some(15)
    );
    // Session close removed the chat's job again.
    assert_eq!(harness.scheduler.active_jobs().await, 0);

    let calls = harness.gateway.calls().await;
    assert!(
        calls
            .iter()
            .any(|call| matches!(call, GatewayCall::Text { chat_id: 42, text } if text.contains("15 seconds")))
    );
}

#[tokio::test]
async fn disabling_the_interval_persists_zero_and_clears_jobs() {
    let harness = harness().await;

    harness
        .sessions
        .dispatch(text_event(42, "/snapshot interval 30"))
        .await;
    harness
        .sessions
        .dispatch(text_event(42, "/snapshot interval 0"))
        .await;
    harness.sessions.close_all().await;

    assert_eq!(
        harness
            .state
            .store()
            .snapshot_interval(42)
            .await
            .expect("interval should be readable"),
        Some(0)
    );
    assert_eq!(harness.scheduler.active_jobs().await, 0);
}

#[tokio::test]
async fn unauthorized_chats_are_dropped_entirely() {
    let harness = harness().await;

    harness
        .sessions
        .dispatch(text_event(7, "/snapshot interval 15"))
        .await;
    harness.sessions.close_all().await;

    assert!(harness.gateway.calls().await.is_empty());
    assert_eq!(
        harness
            .state
            .store()
            .snapshot_interval(7)
            .await
            .expect("interval should be readable"),
        None
    );
}

#[tokio::test]
async fn sessions_reinstall_scheduled_jobs_from_persisted_settings() {
    let harness = harness().await;

    // A previous run stored an interval for this chat.
    harness
        .state
        .store()
        .set_snapshot_interval(42, 120)
        .await
        .expect("interval should persist");

    harness.sessions.dispatch(text_event(42, "/help")).await;
    // The session opened and installed its job from the stored value.
    // Poll briefly: dispatch only enqueues the event.
    for _ in 0..50 {
        if harness.scheduler.has_job(42).await {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(harness.scheduler.has_job(42).await);

    harness.sessions.close_all().await;
    assert_eq!(harness.scheduler.active_jobs().await, 0);
}
