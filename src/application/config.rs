use std::{path::PathBuf, time::Duration};

use clap::Parser;
use serde::Deserialize;

use crate::domain::models::Camera;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "homerelay",
    version,
    about = "Home monitoring relay: watched-folder media delivery and chat-controlled alerting"
)]
pub struct Args {
    #[arg(long, env = "HOMERELAY_CONFIG", default_value = "homerelay.toml")]
    pub config: PathBuf,

    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,

    #[arg(long, env = "HOMERELAY_JSON_LOGS", default_value_t = false)]
    pub json_logs: bool,
}

/// How free-text messages interact with the alert flag. `Exact` matches
/// command prefixes only; `Loose` additionally flips alerting when a
/// plain message contains the standalone word "on" or "off".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandMatch {
    #[default]
    Exact,
    Loose,
}

/// Raw shape of the TOML config file before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub bot_token: Option<String>,
    #[serde(default)]
    pub authorized_users: Vec<i64>,
    pub image_folder: Option<PathBuf>,
    pub path_to_ffmpeg: Option<PathBuf>,
    pub max_photo_size: Option<u32>,
    pub send_photos: Option<bool>,
    pub send_videos: Option<bool>,
    pub idle_timeout_secs: Option<u64>,
    #[serde(default)]
    pub command_match: CommandMatch,
    pub audio_player: Option<String>,
    pub db_path: Option<PathBuf>,
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub cameras: Vec<Camera>,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bot_token: String,
    pub authorized_users: Vec<i64>,
    pub image_folder: PathBuf,
    pub path_to_ffmpeg: Option<PathBuf>,
    pub max_photo_size: u32,
    pub send_photos: bool,
    pub send_videos: bool,
    pub idle_timeout: Duration,
    pub command_match: CommandMatch,
    pub audio_player: Option<String>,
    pub db_path: PathBuf,
    pub api_base_url: String,
    pub cameras: Vec<Camera>,
    pub log_filter: String,
    pub json_logs: bool,
}

impl RuntimeConfig {
    pub fn load(args: &Args) -> Result<Self, String> {
        let raw = std::fs::read_to_string(&args.config)
            .map_err(|error| format!("failed to read {}: {error}", args.config.display()))?;
        let file = toml::from_str::<ConfigFile>(&raw)
            .map_err(|error| format!("invalid config file {}: {error}", args.config.display()))?;
        Self::from_file(args, file)
    }

    pub fn from_file(args: &Args, file: ConfigFile) -> Result<Self, String> {
        let bot_token = file
            .bot_token
            .map(|token| token.trim().to_owned())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| "config file doesn't provide a bot_token".to_owned())?;

        if file.authorized_users.is_empty() {
            return Err("config file doesn't provide an authorized_users list".to_owned());
        }

        let max_photo_size = file.max_photo_size.unwrap_or(1280);
        if max_photo_size == 0 {
            return Err("max_photo_size must be greater than 0".to_owned());
        }

        let idle_timeout_secs = file.idle_timeout_secs.unwrap_or(600);
        if idle_timeout_secs == 0 {
            return Err("idle_timeout_secs must be greater than 0".to_owned());
        }

        Ok(Self {
            bot_token,
            authorized_users: file.authorized_users,
            image_folder: file
                .image_folder
                .unwrap_or_else(|| PathBuf::from("/home/ftp-upload")),
            path_to_ffmpeg: file.path_to_ffmpeg,
            max_photo_size,
            send_photos: file.send_photos.unwrap_or(true),
            send_videos: file.send_videos.unwrap_or(true),
            idle_timeout: Duration::from_secs(idle_timeout_secs),
            command_match: file.command_match,
            audio_player: file.audio_player,
            db_path: file
                .db_path
                .unwrap_or_else(|| PathBuf::from("./.homerelay/homerelay.db")),
            api_base_url: file
                .api_base_url
                .map(|url| url.trim_end_matches('/').to_owned())
                .unwrap_or_else(|| "https://api.telegram.org".to_owned()),
            cameras: file.cameras,
            log_filter: args.log_filter.clone(),
            json_logs: args.json_logs,
        })
    }

    #[must_use]
    pub fn for_test(db_path: PathBuf, image_folder: PathBuf, cameras: Vec<Camera>) -> Self {
        Self {
            bot_token: "test-token".to_owned(),
            authorized_users: vec![42],
            image_folder,
            path_to_ffmpeg: None,
            max_photo_size: 1280,
            send_photos: true,
            send_videos: true,
            idle_timeout: Duration::from_secs(600),
            command_match: CommandMatch::Exact,
            audio_player: None,
            db_path,
            api_base_url: "http://127.0.0.1:1".to_owned(),
            cameras,
            log_filter: "warn".to_owned(),
            json_logs: false,
        }
    }
}
