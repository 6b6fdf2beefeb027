use homerelay::{
    application::snapshots::{deliver_snapshots, fetch_snapshot},
    domain::models::Camera,
};

use super::support::{GatewayCall, RecordingGateway, camera, spawn_snapshot_server};

const JPEG_STUB: &[u8] = b"\xFF\xD8\xFF\xE0stub-jpeg-bytes";

#[tokio::test]
async fn partial_failures_do_not_abort_the_batch() {
    let yard = spawn_snapshot_server(true, JPEG_STUB).await;
    let hallway = spawn_snapshot_server(false, b"").await;
    let door = spawn_snapshot_server(true, JPEG_STUB).await;

    let cameras = vec![
        camera("yard", "Back yard", Some(yard.url())),
        camera("hallway", "Hallway", Some(hallway.url())),
        camera("door", "Front door", Some(door.url())),
    ];

    let gateway = RecordingGateway::default();
    deliver_snapshots(&gateway, &reqwest::Client::new(), &cameras, 42).await;

    let calls = gateway.calls().await;
    assert_eq!(calls.len(), 3, "all three cameras are attempted in order");
    assert!(matches!(calls[0], GatewayCall::Photo { chat_id: 42, .. }));
    assert!(
        matches!(&calls[1], GatewayCall::Text { chat_id: 42, text } if text.contains("Hallway")),
        "the failing camera is reported by name"
    );
    assert!(matches!(calls[2], GatewayCall::Photo { chat_id: 42, .. }));

    yard.stop();
    hallway.stop();
    door.stop();
}

#[tokio::test]
async fn cameras_without_an_endpoint_are_reported_as_failures() {
    let gateway = RecordingGateway::default();
    let cameras = vec![camera("attic", "Attic", None)];

    deliver_snapshots(&gateway, &reqwest::Client::new(), &cameras, 42).await;

    let calls = gateway.calls().await;
    assert_eq!(calls.len(), 1);
    assert!(matches!(&calls[0], GatewayCall::Text { text, .. } if text.contains("Attic")));
}

#[tokio::test]
async fn fetches_send_basic_auth_when_credentials_are_present() {
    let server = spawn_snapshot_server(true, JPEG_STUB).await;
    let camera = Camera {
        id: "door".to_owned(),
        name: "Front door".to_owned(),
        snapshot_url: Some(server.url()),
        username: Some("viewer".to_owned()),
        password: Some("secret".to_owned()),
    };

    let path = fetch_snapshot(&reqwest::Client::new(), &camera)
        .await
        .expect("snapshot fetch should succeed");
    let bytes = tokio::fs::read(&path).await.expect("snapshot should be readable");
    assert_eq!(bytes, JPEG_STUB);
    tokio::fs::remove_file(&path)
        .await
        .expect("snapshot temp file should be removable");

    let requests = server.requests.lock().await.clone();
    assert!(
        requests
            .iter()
            .any(|head| head.to_ascii_lowercase().contains("authorization: basic")),
        "basic auth header should be sent"
    );
    server.stop();
}
