use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    domain::{error::RelayError, models::InboundEvent},
    interfaces::gateway::{ChatAction, Gateway, KeyboardButton},
};

const POLL_TIMEOUT_SECS: u64 = 50;
const POLL_RETRY_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub voice: Option<VoiceNote>,
    #[serde(default)]
    pub photo: Option<Value>,
    #[serde(default)]
    pub video: Option<Value>,
    #[serde(default)]
    pub document: Option<Value>,
    #[serde(default)]
    pub sticker: Option<Value>,
    #[serde(default)]
    pub audio: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct VoiceNote {
    pub file_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub data: Option<String>,
}

impl Message {
    fn content_kind(&self) -> &'static str {
        if self.photo.is_some() {
            "photo"
        } else if self.video.is_some() {
            "video"
        } else if self.document.is_some() {
            "document"
        } else if self.sticker.is_some() {
            "sticker"
        } else if self.audio.is_some() {
            "audio"
        } else {
            "message"
        }
    }
}

/// Maps one Bot API update onto the relay's inbound event model.
/// Updates with nothing actionable (no message, empty callback data)
/// yield `None`.
pub fn classify_update(update: Update) -> Option<InboundEvent> {
    if let Some(query) = update.callback_query {
        let data = query.data?;
        return Some(InboundEvent::Callback {
            chat_id: query.from.id,
            query_id: query.id,
            data,
        });
    }

    let message = update.message?;
    let chat_id = message.chat.id;

    if let Some(text) = &message.text {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        return Some(InboundEvent::Text {
            chat_id,
            text: text.to_owned(),
        });
    }

    if let Some(voice) = &message.voice {
        return Some(InboundEvent::Voice {
            chat_id,
            file_id: voice.file_id.clone(),
        });
    }

    Some(InboundEvent::Unsupported {
        chat_id,
        kind: message.content_kind().to_owned(),
    })
}

/// Bot API client. The one component allowed to talk to the messaging
/// transport.
pub struct TelegramGateway {
    http: reqwest::Client,
    base_url: String,
    bot_token: String,
}

impl TelegramGateway {
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, bot_token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            bot_token: bot_token.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.bot_token)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{file_path}", self.base_url, self.bot_token)
    }

    async fn call_json(&self, method: &str, body: &Value) -> Result<Value, String> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|error| format!("{method} request failed: {error}"))?;

        Self::decode_response(method, response).await
    }

    async fn call_multipart(
        &self,
        method: &str,
        form: reqwest::multipart::Form,
    ) -> Result<Value, String> {
        let response = self
            .http
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(|error| format!("{method} request failed: {error}"))?;

        Self::decode_response(method, response).await
    }

    async fn decode_response(method: &str, response: reqwest::Response) -> Result<Value, String> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{method} failed with {status}: {body}"));
        }

        let payload = response
            .json::<Value>()
            .await
            .map_err(|error| format!("{method} response decode failed: {error}"))?;

        if !payload.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            return Err(format!("{method} returned failure payload: {payload}"));
        }

        Ok(payload)
    }

    async fn media_part(path: &Path) -> Result<reqwest::multipart::Part, String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|error| format!("failed to read {}: {error}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_owned();
        Ok(reqwest::multipart::Part::bytes(bytes).file_name(file_name))
    }
}

#[async_trait]
impl Gateway for TelegramGateway {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), RelayError> {
        self.call_json("sendMessage", &json!({ "chat_id": chat_id, "text": text }))
            .await
            .map(|_| ())
            .map_err(RelayError::Delivery)
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        path: &Path,
        caption: &str,
    ) -> Result<(), RelayError> {
        let part = Self::media_part(path).await.map_err(RelayError::Delivery)?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_owned())
            .part("photo", part);

        self.call_multipart("sendPhoto", form)
            .await
            .map(|_| ())
            .map_err(RelayError::Delivery)
    }

    async fn send_video(
        &self,
        chat_id: i64,
        path: &Path,
        caption: &str,
    ) -> Result<(), RelayError> {
        let part = Self::media_part(path).await.map_err(RelayError::Delivery)?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_owned())
            .part("video", part);

        self.call_multipart("sendVideo", form)
            .await
            .map(|_| ())
            .map_err(RelayError::Delivery)
    }

    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> Result<(), RelayError> {
        self.call_json(
            "sendChatAction",
            &json!({ "chat_id": chat_id, "action": action.as_str() }),
        )
        .await
        .map(|_| ())
        .map_err(RelayError::Delivery)
    }

    async fn answer_callback(
        &self,
        query_id: &str,
        text: Option<&str>,
    ) -> Result<(), RelayError> {
        let mut body = json!({ "callback_query_id": query_id });
        if let Some(text) = text {
            body["text"] = Value::String(text.to_owned());
        }

        self.call_json("answerCallbackQuery", &body)
            .await
            .map(|_| ())
            .map_err(RelayError::Delivery)
    }

    async fn send_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        rows: &[Vec<KeyboardButton>],
    ) -> Result<(), RelayError> {
        let keyboard = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|button| json!({ "text": button.label, "callback_data": button.data }))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        self.call_json(
            "sendMessage",
            &json!({
                "chat_id": chat_id,
                "text": text,
                "reply_markup": { "inline_keyboard": keyboard },
            }),
        )
        .await
        .map(|_| ())
        .map_err(RelayError::Delivery)
    }

    async fn fetch_file(&self, file_id: &str) -> Result<PathBuf, RelayError> {
        let payload = self
            .call_json("getFile", &json!({ "file_id": file_id }))
            .await
            .map_err(RelayError::Fetch)?;

        let file_path = payload
            .pointer("/result/file_path")
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::Fetch("getFile response lacks file_path".to_owned()))?;

        let response = self
            .http
            .get(self.file_url(file_path))
            .send()
            .await
            .map_err(|error| RelayError::Fetch(format!("file download failed: {error}")))?;
        if !response.status().is_success() {
            return Err(RelayError::Fetch(format!(
                "file download failed with {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|error| RelayError::Fetch(format!("file download failed: {error}")))?;

        let extension = Path::new(file_path)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("bin");
        let local = std::env::temp_dir().join(format!("voice-{}.{extension}", uuid::Uuid::new_v4()));
        tokio::fs::write(&local, &bytes)
            .await
            .map_err(|error| RelayError::Fetch(format!("failed to write {}: {error}", local.display())))?;

        Ok(local)
    }
}

/// Long-poll loop that feeds decoded inbound events into the session
/// layer. Failed polls are logged and retried after a short delay; the
/// loop only ends on cancellation.
pub struct UpdatePoller {
    base_url: String,
    bot_token: String,
    http: reqwest::Client,
    tx: mpsc::Sender<InboundEvent>,
}

impl UpdatePoller {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        bot_token: impl Into<String>,
        tx: mpsc::Sender<InboundEvent>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            bot_token: bot_token.into(),
            http,
            tx,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut offset = 0_i64;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                result = self.poll_once(offset) => match result {
                    Ok((events, next_offset)) => {
                        offset = next_offset;
                        for event in events {
                            if self.tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(error) => {
                        warn!("update poll failed: {error}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                    }
                },
            }
        }
    }

    async fn poll_once(&self, offset: i64) -> Result<(Vec<InboundEvent>, i64), RelayError> {
        let url = format!("{}/bot{}/getUpdates", self.base_url, self.bot_token);
        let body = json!({
            "offset": offset,
            "timeout": POLL_TIMEOUT_SECS,
            "allowed_updates": ["message", "callback_query"],
        });

        let response = self
            .http
            .post(url)
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .json(&body)
            .send()
            .await
            .map_err(|error| RelayError::Fetch(format!("getUpdates request failed: {error}")))?;

        let payload = TelegramGateway::decode_response("getUpdates", response)
            .await
            .map_err(RelayError::Fetch)?;

        let updates = payload
            .get("result")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        let updates = serde_json::from_value::<Vec<Update>>(updates)
            .map_err(|error| RelayError::Fetch(format!("invalid getUpdates payload: {error}")))?;

        let mut next_offset = offset;
        let mut events = Vec::new();
        for update in updates {
            next_offset = next_offset.max(update.update_id + 1);
            match classify_update(update) {
                Some(event) => events.push(event),
                None => debug!("ignoring update with no actionable content"),
            }
        }

        Ok((events, next_offset))
    }
}
