use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    domain::{
        error::RelayError,
        models::{Camera, CameraRegistry},
    },
    interfaces::gateway::Gateway,
};

/// Caption attached to delivered media.
#[must_use]
pub fn timestamp_caption() -> String {
    chrono::Local::now().format("%d.%m.%Y %H:%M:%S").to_string()
}

/// Pulls one snapshot into a temp file owned by the caller.
pub async fn fetch_snapshot(
    http: &reqwest::Client,
    camera: &Camera,
) -> Result<PathBuf, RelayError> {
    let url = camera.snapshot_url.as_deref().ok_or_else(|| {
        RelayError::Fetch(format!("camera '{}' has no snapshot endpoint", camera.id))
    })?;

    let mut request = http.get(url);
    if let Some(username) = &camera.username {
        request = request.basic_auth(username, camera.password.as_deref());
    }

    let response = request
        .send()
        .await
        .map_err(|error| RelayError::Fetch(error.to_string()))?;
    if !response.status().is_success() {
        return Err(RelayError::Fetch(format!(
            "{url} returned {}",
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|error| RelayError::Fetch(error.to_string()))?;

    let path = std::env::temp_dir().join(format!("snapshot-{}.jpg", uuid::Uuid::new_v4()));
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|error| RelayError::Fetch(format!("failed to write {}: {error}", path.display())))?;

    Ok(path)
}

/// Fetches and delivers a batch of snapshots in camera order. A failed
/// camera is reported to the chat as text and the batch continues;
/// delivery failures of the photo itself are only logged.
pub async fn deliver_snapshots(
    gateway: &dyn Gateway,
    http: &reqwest::Client,
    cameras: &[Camera],
    chat_id: i64,
) {
    for camera in cameras {
        match fetch_snapshot(http, camera).await {
            Ok(path) => {
                if let Err(error) = gateway
                    .send_photo(chat_id, &path, &timestamp_caption())
                    .await
                {
                    warn!("snapshot delivery to {chat_id} failed: {error}");
                }
                let _ = tokio::fs::remove_file(&path).await;
            }
            Err(error) => {
                let notice =
                    format!("Fetching a snapshot from '{}' failed: {error}", camera.name);
                if let Err(error) = gateway.send_text(chat_id, &notice).await {
                    warn!("snapshot failure notice to {chat_id} failed: {error}");
                }
            }
        }
    }
}

struct ScheduledJob {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Periodic-snapshot facility shared by all chats: at most one live job
/// per chat id. Replacing a job fully removes the old one (cancel and
/// join) before the new one is installed, so a replacement is atomic
/// from the chat's perspective.
pub struct SnapshotScheduler {
    gateway: Arc<dyn Gateway>,
    http: reqwest::Client,
    cameras: CameraRegistry,
    jobs: Mutex<HashMap<i64, ScheduledJob>>,
}

impl SnapshotScheduler {
    #[must_use]
    pub fn new(gateway: Arc<dyn Gateway>, http: reqwest::Client, cameras: CameraRegistry) -> Self {
        Self {
            gateway,
            http,
            cameras,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Installs (or removes, when `interval_secs` is 0) the periodic job
    /// for a chat. Unknown camera ids are skipped with a log line.
    pub async fn schedule(&self, chat_id: i64, interval_secs: u64, camera_ids: &[String]) {
        let mut jobs = self.jobs.lock().await;
        remove_job(&mut jobs, chat_id).await;

        if interval_secs == 0 {
            return;
        }

        let cameras = camera_ids
            .iter()
            .filter_map(|id| match self.cameras.get(id) {
                Some(camera) => Some(camera.clone()),
                None => {
                    warn!("skipping unknown camera id '{id}' for chat {chat_id}");
                    None
                }
            })
            .collect::<Vec<_>>();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_job(
            self.gateway.clone(),
            self.http.clone(),
            cameras,
            chat_id,
            interval_secs,
            cancel.clone(),
        ));

        jobs.insert(chat_id, ScheduledJob { cancel, task });
    }

    /// Removes the chat's job. A no-op when none exists.
    pub async fn cancel(&self, chat_id: i64) {
        let mut jobs = self.jobs.lock().await;
        remove_job(&mut jobs, chat_id).await;
    }

    pub async fn shutdown(&self) {
        let mut jobs = self.jobs.lock().await;
        let drained = jobs.drain().collect::<Vec<_>>();
        drop(jobs);

        for (chat_id, job) in drained {
            job.cancel.cancel();
            if let Err(error) = job.task.await {
                warn!("scheduled job for chat {chat_id} ended abnormally: {error}");
            }
        }
    }

    pub async fn has_job(&self, chat_id: i64) -> bool {
        self.jobs.lock().await.contains_key(&chat_id)
    }

    pub async fn active_jobs(&self) -> usize {
        self.jobs.lock().await.len()
    }
}

async fn remove_job(jobs: &mut HashMap<i64, ScheduledJob>, chat_id: i64) {
    if let Some(job) = jobs.remove(&chat_id) {
        job.cancel.cancel();
        if let Err(error) = job.task.await {
            warn!("scheduled job for chat {chat_id} ended abnormally: {error}");
        }
    }
}

async fn run_job(
    gateway: Arc<dyn Gateway>,
    http: reqwest::Client,
    cameras: Vec<Camera>,
    chat_id: i64,
    interval_secs: u64,
    cancel: CancellationToken,
) {
    let period = Duration::from_secs(interval_secs);
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                deliver_snapshots(gateway.as_ref(), &http, &cameras, chat_id).await;
            }
        }
    }
}
