use std::path::PathBuf;

use serde::Deserialize;

/// A camera as declared in the config file. Immutable after load.
#[derive(Debug, Clone, Deserialize)]
pub struct Camera {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub snapshot_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Cameras in config order. Lookups by a stale id return `None` and the
/// caller logs and skips.
#[derive(Debug, Clone, Default)]
pub struct CameraRegistry {
    cameras: Vec<Camera>,
}

impl CameraRegistry {
    #[must_use]
    pub fn new(cameras: Vec<Camera>) -> Self {
        Self { cameras }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Camera> {
        self.cameras.iter().find(|camera| camera.id == id)
    }

    #[must_use]
    pub fn all(&self) -> &[Camera] {
        &self.cameras
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}

/// Per-chat persisted settings row. `snapshot_interval_secs` is `None`
/// until the user configures an interval for the first time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSettings {
    pub chat_id: i64,
    pub snapshot_interval_secs: Option<i64>,
    pub updated_at_ms: u64,
}

/// The one filesystem event kind the dispatcher acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created { path: PathBuf, is_directory: bool },
}

/// Inbound chat events after gateway-level decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Text {
        chat_id: i64,
        text: String,
    },
    Voice {
        chat_id: i64,
        file_id: String,
    },
    Callback {
        chat_id: i64,
        query_id: String,
        data: String,
    },
    /// Content the relay has no handler for (stickers, documents, ...).
    Unsupported {
        chat_id: i64,
        kind: String,
    },
}

impl InboundEvent {
    #[must_use]
    pub fn chat_id(&self) -> i64 {
        match self {
            Self::Text { chat_id, .. }
            | Self::Voice { chat_id, .. }
            | Self::Callback { chat_id, .. }
            | Self::Unsupported { chat_id, .. } => *chat_id,
        }
    }
}
