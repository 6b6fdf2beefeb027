use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use notify::{Event, EventKind, RecursiveMode, Watcher, event::CreateKind};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, warn};

use crate::{
    application::{snapshots::timestamp_caption, state::SharedState},
    domain::{error::RelayError, models::WatchEvent},
    interfaces::{
        gateway::Gateway,
        media::{MediaTransformer, VIDEO_TARGET_WIDTH},
    },
};

const IMAGE_EXTENSIONS: [&str; 2] = ["jpg", "png"];
const VIDEO_EXTENSIONS: [&str; 6] = ["avi", "mp4", "mkv", "m4v", "mov", "mpg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    Other,
}

#[must_use]
pub fn classify(path: &Path) -> MediaKind {
    let Some(extension) = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
    else {
        return MediaKind::Other;
    };

    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        MediaKind::Photo
    } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
        MediaKind::Video
    } else {
        MediaKind::Other
    }
}

/// Consumes created-file events from the watch source, classifies them,
/// and routes media to the transformer and gateway under alert-state
/// gating. Every per-file failure is contained here; the dispatcher
/// never dies with an event.
pub struct FileWatchDispatcher {
    state: SharedState,
    gateway: Arc<dyn Gateway>,
    transformer: Arc<MediaTransformer>,
    workers: TaskTracker,
    seen: HashSet<PathBuf>,
}

impl FileWatchDispatcher {
    #[must_use]
    pub fn new(
        state: SharedState,
        gateway: Arc<dyn Gateway>,
        transformer: Arc<MediaTransformer>,
    ) -> Self {
        Self {
            state,
            gateway,
            transformer,
            workers: TaskTracker::new(),
            seen: HashSet::new(),
        }
    }

    pub async fn handle(&mut self, event: WatchEvent) {
        let WatchEvent::Created { path, is_directory } = event;
        if is_directory {
            return;
        }
        if !self.seen.insert(path.clone()) {
            // Only the first created transition on a path is acted on.
            return;
        }

        match classify(&path) {
            MediaKind::Photo => self.handle_photo(path).await,
            MediaKind::Video => self.handle_video(path),
            MediaKind::Other => {
                debug!("ignoring file with unrecognized extension: {}", path.display());
            }
        }
    }

    async fn handle_photo(&self, path: PathBuf) {
        if !(self.state.alert().is_enabled() && self.state.config().send_photos) {
            discard(&path, "photo delivery is disabled").await;
            return;
        }

        debug!("new photo file detected: {}", path.display());
        let delivery_path = match self.transformer.resize_photo(&path).await {
            Ok(delivery_path) => delivery_path,
            Err(error) => {
                warn!("photo {} dropped: {error}", path.display());
                discard(&path, "photo could not be prepared").await;
                return;
            }
        };

        let caption = timestamp_caption();
        for user in &self.state.config().authorized_users {
            if let Err(error) = self.gateway.send_photo(*user, &delivery_path, &caption).await {
                warn!("photo delivery to {user} failed: {error}");
            }
        }

        if let Err(error) = tokio::fs::remove_file(&delivery_path).await {
            warn!("failed to remove {}: {error}", delivery_path.display());
        }
    }

    /// Each video gets its own worker so a slow transcode never blocks
    /// detection of subsequent files.
    fn handle_video(&self, path: PathBuf) {
        if !(self.state.alert().is_enabled()
            && self.state.config().send_videos
            && self.transformer.ffmpeg_configured())
        {
            self.workers.spawn(async move {
                discard(&path, "video delivery is disabled").await;
            });
            return;
        }

        debug!("new video file detected: {}", path.display());
        let gateway = self.gateway.clone();
        let transformer = self.transformer.clone();
        let users = self.state.config().authorized_users.clone();

        self.workers.spawn(async move {
            let result = async {
                MediaTransformer::wait_for_stable(&path).await?;
                transformer.transcode_video(&path, VIDEO_TARGET_WIDTH).await
            }
            .await;

            match result {
                Ok(output) => {
                    let file_name = path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .unwrap_or("video")
                        .to_owned();
                    let caption = format!("{file_name} ({})", timestamp_caption());
                    for user in &users {
                        if let Err(error) = gateway.send_video(*user, &output, &caption).await {
                            warn!("video delivery to {user} failed: {error}");
                        }
                    }
                    if let Err(error) = tokio::fs::remove_file(&output).await {
                        warn!("failed to remove {}: {error}", output.display());
                    }
                }
                Err(error) => {
                    warn!("video {} dropped: {error}", path.display());
                }
            }

            discard(&path, "video source handled").await;
        });
    }

    /// Waits for all in-flight video workers before returning.
    pub async fn close(&self) {
        self.workers.close();
        self.workers.wait().await;
    }
}

async fn discard(path: &Path, reason: &str) {
    debug!("discarding {}: {reason}", path.display());
    if let Err(error) = tokio::fs::remove_file(path).await {
        warn!("failed to remove {}: {error}", path.display());
    }
}

/// Registers a recursive watcher on the configured image folder and
/// spawns the dispatcher task that drains its events until cancelled.
pub fn spawn(
    state: SharedState,
    gateway: Arc<dyn Gateway>,
    transformer: Arc<MediaTransformer>,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>, RelayError> {
    let (tx, mut rx) = mpsc::channel::<WatchEvent>(256);

    let mut watcher = notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
        match result {
            Ok(event) => {
                if let EventKind::Create(kind) = event.kind {
                    let is_directory = matches!(kind, CreateKind::Folder);
                    for path in event.paths {
                        let _ = tx.blocking_send(WatchEvent::Created { path, is_directory });
                    }
                }
            }
            Err(error) => warn!("watch backend error: {error}"),
        }
    })
    .map_err(|error| RelayError::Config(format!("failed to create file watcher: {error}")))?;

    let folder = state.config().image_folder.clone();
    watcher
        .watch(&folder, RecursiveMode::Recursive)
        .map_err(|error| {
            RelayError::Config(format!("failed to watch {}: {error}", folder.display()))
        })?;

    let mut dispatcher = FileWatchDispatcher::new(state, gateway, transformer);
    Ok(tokio::spawn(async move {
        // The watcher's registration lives and dies with this task.
        let _watcher = watcher;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => dispatcher.handle(event).await,
                    None => break,
                },
            }
        }
        dispatcher.close().await;
    }))
}
