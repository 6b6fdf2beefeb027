use std::{sync::Arc, time::Duration};

use homerelay::{application::snapshots::SnapshotScheduler, domain::models::CameraRegistry};

use super::support::{GatewayCall, RecordingGateway, camera, spawn_snapshot_server};

#[tokio::test]
async fn scheduled_jobs_tick_and_deliver() {
    let server = spawn_snapshot_server(true, b"\xFF\xD8\xFF\xE0bytes").await;
    let registry = CameraRegistry::new(vec![camera("door", "Front door", Some(server.url()))]);
    let gateway = Arc::new(RecordingGateway::default());
    let scheduler = SnapshotScheduler::new(gateway.clone(), reqwest::Client::new(), registry);

    scheduler.schedule(42, 1, &["door".to_owned()]).await;
    tokio::time::sleep(Duration::from_millis(2_300)).await;
    scheduler.cancel(42).await;

    let photos = gateway
        .calls()
        .await
        .into_iter()
        .filter(|call| matches!(call, GatewayCall::Photo { chat_id: 42, .. }))
        .count();
    assert!(photos >= 1, "at least one tick should have delivered");
    assert_eq!(scheduler.active_jobs().await, 0);

    server.stop();
}

#[tokio::test]
async fn replacing_and_clearing_jobs_upholds_the_one_job_invariant() {
    let registry = CameraRegistry::new(vec![camera(
        "door",
        "Front door",
        Some("http://127.0.0.1:1/unreachable.jpg".to_owned()),
    )]);
    let gateway = Arc::new(RecordingGateway::default());
    let scheduler = SnapshotScheduler::new(gateway, reqwest::Client::new(), registry);
    let ids = vec!["door".to_owned()];

    for interval in [30, 60, 90] {
        scheduler.schedule(42, interval, &ids).await;
        assert_eq!(scheduler.active_jobs().await, 1);
    }

    scheduler.schedule(42, 0, &ids).await;
    assert_eq!(scheduler.active_jobs().await, 0);
    assert!(!scheduler.has_job(42).await);
}
