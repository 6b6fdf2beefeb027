use std::{
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use homerelay::{
    domain::{error::RelayError, models::Camera},
    interfaces::gateway::{ChatAction, Gateway, KeyboardButton},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::Mutex,
    task::JoinHandle,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum GatewayCall {
    Text { chat_id: i64, text: String },
    Photo { chat_id: i64, caption: String },
    Video { chat_id: i64, caption: String },
    Action { chat_id: i64 },
    Callback { query_id: String },
    Keyboard { chat_id: i64 },
}

/// Records outbound gateway traffic for assertions.
#[derive(Default)]
pub(crate) struct RecordingGateway {
    calls: Mutex<Vec<GatewayCall>>,
}

impl RecordingGateway {
    pub(crate) async fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: GatewayCall) {
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl Gateway for RecordingGateway {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), RelayError> {
        self.record(GatewayCall::Text {
            chat_id,
            text: text.to_owned(),
        })
        .await;
        Ok(())
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        _path: &Path,
        caption: &str,
    ) -> Result<(), RelayError> {
        self.record(GatewayCall::Photo {
            chat_id,
            caption: caption.to_owned(),
        })
        .await;
        Ok(())
    }

    async fn send_video(
        &self,
        chat_id: i64,
        _path: &Path,
        caption: &str,
    ) -> Result<(), RelayError> {
        self.record(GatewayCall::Video {
            chat_id,
            caption: caption.to_owned(),
        })
        .await;
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: i64, _action: ChatAction) -> Result<(), RelayError> {
        self.record(GatewayCall::Action { chat_id }).await;
        Ok(())
    }

    async fn answer_callback(&self, query_id: &str, _text: Option<&str>) -> Result<(), RelayError> {
        self.record(GatewayCall::Callback {
            query_id: query_id.to_owned(),
        })
        .await;
        Ok(())
    }

    async fn send_keyboard(
        &self,
        chat_id: i64,
        _text: &str,
        _rows: &[Vec<KeyboardButton>],
    ) -> Result<(), RelayError> {
        self.record(GatewayCall::Keyboard { chat_id }).await;
        Ok(())
    }

    async fn fetch_file(&self, file_id: &str) -> Result<PathBuf, RelayError> {
        let path = std::env::temp_dir().join(format!("integration-fetch-{file_id}.bin"));
        tokio::fs::write(&path, b"voice")
            .await
            .map_err(|error| RelayError::Fetch(error.to_string()))?;
        Ok(path)
    }
}

pub(crate) struct SnapshotServer {
    pub(crate) addr: SocketAddr,
    pub(crate) requests: Arc<Mutex<Vec<String>>>,
    join: JoinHandle<()>,
}

impl SnapshotServer {
    pub(crate) fn url(&self) -> String {
        format!("http://{}/snapshot.jpg", self.addr)
    }

    pub(crate) fn stop(self) {
        self.join.abort();
    }
}

/// Minimal HTTP endpoint standing in for a camera: answers every GET
/// with the given status and body, recording each request head.
pub(crate) async fn spawn_snapshot_server(ok: bool, body: &'static [u8]) -> SnapshotServer {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("listener should expose local addr");
    let requests = Arc::new(Mutex::new(Vec::new()));

    let seen = requests.clone();
    let join = tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let seen = seen.clone();
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0_u8; 512];
                while !head.windows(4).any(|window| window == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                seen.lock()
                    .await
                    .push(String::from_utf8_lossy(&head).into_owned());

                let response = if ok {
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    )
                } else {
                    "HTTP/1.1 500 Internal Server Error\r\n\
                     Content-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_owned()
                };
                let _ = socket.write_all(response.as_bytes()).await;
                if ok {
                    let _ = socket.write_all(body).await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    SnapshotServer {
        addr,
        requests,
        join,
    }
}

pub(crate) fn camera(id: &str, name: &str, url: Option<String>) -> Camera {
    Camera {
        id: id.to_owned(),
        name: name.to_owned(),
        snapshot_url: url,
        username: None,
        password: None,
    }
}
