use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, mpsc};
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::{
    application::{
        config::CommandMatch,
        snapshots::{self, SnapshotScheduler},
        state::SharedState,
    },
    domain::models::{Camera, InboundEvent},
    interfaces::{
        gateway::{ChatAction, Gateway, KeyboardButton},
        media::MediaTransformer,
    },
};

const IDLE_MESSAGES: [&str; 8] = [
    "Toodle-oo ...",
    "*yawn*",
    "I'm bored.",
    "Relax! Everything is fine here.",
    "All quiet on this end.",
    "Nothing happening ...",
    "Seems like nobody is home.",
    "Hello-o!!!",
];

const GREETING: &str = "Hello, I'm your home monitoring bot! \u{1F916}\n\n\
I notify you when your webcams detect motion or loud noises \
and send you a video of the incident.";

const HELP_TEXT: &str = "Available commands:\n\n\
/help show this message\n\
/enable /disable /toggle turn alerts on or off\n\
/snapshot list the cameras that can deliver snapshots\n\
/snapshot interval show the interval (secs) at which snapshots are fetched and delivered\n\
/snapshot interval <secs> set the snapshot interval to <secs> seconds (0 to turn off)\n\
/start (re)start the bot";

/// Registry of per-chat sessions. Every chat gets one long-lived task
/// handling its events in arrival order; sessions are opened lazily on
/// the first inbound event and die on idle timeout or shutdown.
pub struct ChatSessions {
    state: SharedState,
    gateway: Arc<dyn Gateway>,
    scheduler: Arc<SnapshotScheduler>,
    transformer: Arc<MediaTransformer>,
    sessions: Mutex<HashMap<i64, mpsc::Sender<InboundEvent>>>,
    session_tasks: TaskTracker,
}

impl ChatSessions {
    #[must_use]
    pub fn new(
        state: SharedState,
        gateway: Arc<dyn Gateway>,
        scheduler: Arc<SnapshotScheduler>,
        transformer: Arc<MediaTransformer>,
    ) -> Self {
        Self {
            state,
            gateway,
            scheduler,
            transformer,
            sessions: Mutex::new(HashMap::new()),
            session_tasks: TaskTracker::new(),
        }
    }

    pub async fn dispatch(&self, event: InboundEvent) {
        let chat_id = event.chat_id();
        if !self.state.is_authorized(chat_id) {
            warn!("dropping event from unauthorized chat {chat_id}");
            return;
        }

        let mut event = event;
        // An idle-closed session leaves a dead inbox behind; replace it
        // once and retry.
        for _ in 0..2 {
            let inbox = self.session_inbox(chat_id).await;
            match inbox.send(event).await {
                Ok(()) => return,
                Err(failed) => {
                    event = failed.0;
                    self.sessions.lock().await.remove(&chat_id);
                }
            }
        }
        warn!("session inbox for chat {chat_id} is unavailable, event dropped");
    }

    async fn session_inbox(&self, chat_id: i64) -> mpsc::Sender<InboundEvent> {
        let mut sessions = self.sessions.lock().await;
        if let Some(inbox) = sessions.get(&chat_id) {
            return inbox.clone();
        }

        let (tx, rx) = mpsc::channel(32);
        let session = Session {
            chat_id,
            state: self.state.clone(),
            gateway: self.gateway.clone(),
            scheduler: self.scheduler.clone(),
            transformer: self.transformer.clone(),
            workers: TaskTracker::new(),
        };
        self.session_tasks.spawn(session.run(rx));
        sessions.insert(chat_id, tx.clone());
        tx
    }

    /// Drops every inbox and waits for all session loops (and their
    /// background workers) to finish.
    pub async fn close_all(&self) {
        self.sessions.lock().await.clear();
        self.session_tasks.close();
        self.session_tasks.wait().await;
    }
}

struct Session {
    chat_id: i64,
    state: SharedState,
    gateway: Arc<dyn Gateway>,
    scheduler: Arc<SnapshotScheduler>,
    transformer: Arc<MediaTransformer>,
    workers: TaskTracker,
}

impl Session {
    async fn run(self, mut rx: mpsc::Receiver<InboundEvent>) {
        self.open().await;
        loop {
            match tokio::time::timeout(self.state.config().idle_timeout, rx.recv()).await {
                Ok(Some(event)) => self.handle_event(event).await,
                Ok(None) => break,
                Err(_) => {
                    self.on_idle().await;
                    break;
                }
            }
        }
        rx.close();
        self.close().await;
    }

    /// Reinstalls the chat's periodic snapshot job from persisted
    /// settings, seeding the settings row on first contact.
    async fn open(&self) {
        match self.state.store().ensure_chat_settings(self.chat_id).await {
            Ok(settings) => {
                let interval = settings.snapshot_interval_secs.unwrap_or(0);
                if interval > 0 {
                    self.scheduler
                        .schedule(self.chat_id, interval.unsigned_abs(), &self.camera_ids())
                        .await;
                }
            }
            Err(error) => {
                warn!("failed to load settings for chat {}: {error}", self.chat_id);
            }
        }
    }

    async fn handle_event(&self, event: InboundEvent) {
        match event {
            InboundEvent::Text { text, .. } => self.handle_text(&text).await,
            InboundEvent::Voice { file_id, .. } => self.handle_voice(file_id),
            InboundEvent::Callback { query_id, data, .. } => {
                self.handle_callback(&query_id, &data).await;
            }
            InboundEvent::Unsupported { kind, .. } => {
                self.send_text(&format!("Your '{kind}' landed in nirvana ..."))
                    .await;
            }
        }
    }

    async fn handle_text(&self, text: &str) {
        if text.starts_with("/start") {
            self.send_text(GREETING).await;
            self.send_main_menu().await;
        } else if text.starts_with("/enable") {
            self.state.alert().set_enabled(true);
            self.send_text("Alerts are now on.").await;
        } else if text.starts_with("/disable") {
            self.state.alert().set_enabled(false);
            self.send_text("Alerts are now off.").await;
        } else if text.starts_with("/toggle") {
            let enabled = self.state.alert().toggle();
            self.send_text(if enabled {
                "Alerts are now on."
            } else {
                "Alerts are now off."
            })
            .await;
        } else if text.starts_with("/snapshot") {
            self.handle_snapshot_command(text).await;
        } else if text.starts_with("/help") {
            self.send_text(HELP_TEXT).await;
        } else if text.starts_with('/') {
            self.send_text("Unknown command. Type /help for more info.")
                .await;
        } else {
            self.handle_free_text(text).await;
        }
    }

    async fn handle_snapshot_command(&self, text: &str) {
        let args = text.split_whitespace().skip(1).collect::<Vec<_>>();
        match args.as_slice() {
            [] => show_snapshot_menu(self.gateway.as_ref(), &self.state, self.chat_id).await,
            ["interval"] => match self.state.store().snapshot_interval(self.chat_id).await {
                Ok(None) => {
                    self.send_text("The snapshot interval has not been configured yet.")
                        .await;
                }
                Ok(Some(interval)) => {
                    self.send_text(&format!(
                        "The snapshot interval is currently {interval} seconds."
                    ))
                    .await;
                }
                Err(error) => {
                    warn!("failed to read interval for chat {}: {error}", self.chat_id);
                    self.send_text("Reading the snapshot interval failed.").await;
                }
            },
            ["interval", value, ..] => self.set_snapshot_interval(value).await,
            _ => {
                self.send_text("Unknown /snapshot option. Type /help for more info.")
                    .await;
            }
        }
    }

    async fn set_snapshot_interval(&self, value: &str) {
        let Ok(interval) = value.parse::<i64>() else {
            self.send_text("The interval must be a number of seconds.")
                .await;
            return;
        };
        if interval < 0 {
            self.send_text("The interval must not be negative.").await;
            return;
        }

        if let Err(error) = self
            .state
            .store()
            .set_snapshot_interval(self.chat_id, interval)
            .await
        {
            warn!("failed to persist interval for chat {}: {error}", self.chat_id);
            self.send_text("Saving the snapshot interval failed.").await;
            return;
        }

        if interval > 0 {
            self.scheduler
                .schedule(self.chat_id, interval.unsigned_abs(), &self.camera_ids())
                .await;
            self.send_text(&format!("The snapshot interval is set to {interval} seconds."))
                .await;
        } else {
            self.scheduler.cancel(self.chat_id).await;
            self.send_text("Scheduled snapshots are disabled.").await;
        }
    }

    async fn handle_free_text(&self, text: &str) {
        if self.state.config().command_match == CommandMatch::Loose {
            if contains_keyword(text, "off") {
                self.state.alert().set_enabled(false);
                self.send_text("Alerts are now off.").await;
                return;
            }
            if contains_keyword(text, "on") {
                self.state.alert().set_enabled(true);
                self.send_text("Alerts are now on.").await;
                return;
            }
        }
        self.send_text("I'm not very chatty. Type /help for more info.")
            .await;
    }

    async fn handle_callback(&self, query_id: &str, data: &str) {
        if let Some(camera) = self.state.cameras().get(data) {
            let notice = format!("Snapshot from your camera '{}'", camera.name);
            self.answer_callback(query_id, Some(&notice)).await;
            self.spawn_snapshot_worker(camera.clone());
            return;
        }

        match data {
            "enable" => {
                self.state.alert().set_enabled(true);
                self.answer_callback(query_id, Some("Alerts are now on.")).await;
                self.send_main_menu().await;
            }
            "disable" => {
                self.state.alert().set_enabled(false);
                self.answer_callback(query_id, Some("Alerts are now off.")).await;
                self.send_main_menu().await;
            }
            "snapshot" => {
                self.answer_callback(query_id, None).await;
                show_snapshot_menu(self.gateway.as_ref(), &self.state, self.chat_id).await;
            }
            stale => {
                // A stored menu can reference a camera that has since
                // left the config.
                self.answer_callback(query_id, None).await;
                debug!("callback for unknown camera '{stale}' ignored");
            }
        }
    }

    /// On-demand one-camera snapshot, tracked so session close can join
    /// it. Re-shows the camera menu once delivery finished.
    fn spawn_snapshot_worker(&self, camera: Camera) {
        let gateway = self.gateway.clone();
        let state = self.state.clone();
        let chat_id = self.chat_id;

        self.workers.spawn(async move {
            if let Err(error) = gateway.send_chat_action(chat_id, ChatAction::UploadPhoto).await {
                warn!("chat action for {chat_id} failed: {error}");
            }
            snapshots::deliver_snapshots(
                gateway.as_ref(),
                state.http(),
                std::slice::from_ref(&camera),
                chat_id,
            )
            .await;
            show_snapshot_menu(gateway.as_ref(), &state, chat_id).await;
        });
    }

    fn handle_voice(&self, file_id: String) {
        if !self.transformer.ffmpeg_configured() {
            debug!("voice note ignored: transcoder not configured");
            return;
        }

        let gateway = self.gateway.clone();
        let transformer = self.transformer.clone();
        self.workers.spawn(async move {
            let source = match gateway.fetch_file(&file_id).await {
                Ok(source) => source,
                Err(error) => {
                    warn!("voice note download failed: {error}");
                    return;
                }
            };

            match transformer.transcode_voice(&source).await {
                Ok(converted) => {
                    transformer.play_chime(&converted).await;
                    let _ = tokio::fs::remove_file(&converted).await;
                }
                Err(error) => warn!("voice note dropped: {error}"),
            }
            let _ = tokio::fs::remove_file(&source).await;
        });
    }

    /// Purely cosmetic: a random filler line when the chat went quiet,
    /// and only while alerting is enabled.
    async fn on_idle(&self) {
        if !self.state.alert().is_enabled() {
            return;
        }
        let index = rand::random_range(0..IDLE_MESSAGES.len());
        self.send_text(IDLE_MESSAGES[index]).await;
    }

    /// Removes the chat's scheduled job and joins every in-flight
    /// background worker before the session's resources are released.
    async fn close(&self) {
        self.scheduler.cancel(self.chat_id).await;
        self.workers.close();
        self.workers.wait().await;
        debug!("session for chat {} closed", self.chat_id);
    }

    async fn send_main_menu(&self) {
        let alerting = self.state.alert().is_enabled();
        let alert_button = if alerting {
            KeyboardButton::new("\u{23F9} Alerts off", "disable")
        } else {
            KeyboardButton::new("\u{25B6}\u{FE0F} Alerts on", "enable")
        };
        let rows = [vec![
            KeyboardButton::new("\u{1F4F7} Snapshot", "snapshot"),
            alert_button,
        ]];

        if let Err(error) = self
            .gateway
            .send_keyboard(self.chat_id, "Choose an action:", &rows)
            .await
        {
            warn!("menu delivery to {} failed: {error}", self.chat_id);
        }
    }

    async fn send_text(&self, text: &str) {
        if let Err(error) = self.gateway.send_text(self.chat_id, text).await {
            warn!("text delivery to {} failed: {error}", self.chat_id);
        }
    }

    async fn answer_callback(&self, query_id: &str, text: Option<&str>) {
        if let Err(error) = self.gateway.answer_callback(query_id, text).await {
            warn!("callback answer for {} failed: {error}", self.chat_id);
        }
    }

    fn camera_ids(&self) -> Vec<String> {
        self.state
            .cameras()
            .all()
            .iter()
            .map(|camera| camera.id.clone())
            .collect()
    }
}

async fn show_snapshot_menu(gateway: &dyn Gateway, state: &SharedState, chat_id: i64) {
    let row = state
        .cameras()
        .all()
        .iter()
        .map(|camera| KeyboardButton::new(camera.name.clone(), camera.id.clone()))
        .collect::<Vec<_>>();

    if row.is_empty() {
        if let Err(error) = gateway.send_text(chat_id, "No cameras are configured.").await {
            warn!("menu delivery to {chat_id} failed: {error}");
        }
        return;
    }

    if let Err(error) = gateway
        .send_keyboard(chat_id, "Show a snapshot from:", &[row])
        .await
    {
        warn!("menu delivery to {chat_id} failed: {error}");
    }
}

fn contains_keyword(text: &str, keyword: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|word| word.eq_ignore_ascii_case(keyword))
}
