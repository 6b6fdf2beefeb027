use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use image::{codecs::jpeg::JpegEncoder, imageops::FilterType};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{application::config::RuntimeConfig, domain::error::RelayError};

pub const VIDEO_TARGET_WIDTH: u32 = 480;
pub const JPEG_QUALITY: u8 = 87;

const STABILIZE_ATTEMPTS: u32 = 50;
const STABILIZE_DELAY: Duration = Duration::from_millis(100);

/// Stateless media transformations. Each operation owns its temp files
/// and removes them on every failure path; callers own the input files.
pub struct MediaTransformer {
    ffmpeg: Option<PathBuf>,
    audio_player: Option<String>,
    max_photo_size: u32,
}

impl MediaTransformer {
    #[must_use]
    pub fn new(ffmpeg: Option<PathBuf>, audio_player: Option<String>, max_photo_size: u32) -> Self {
        Self {
            ffmpeg,
            audio_player,
            max_photo_size,
        }
    }

    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(
            config.path_to_ffmpeg.clone(),
            config.audio_player.clone(),
            config.max_photo_size,
        )
    }

    #[must_use]
    pub fn ffmpeg_configured(&self) -> bool {
        self.ffmpeg.is_some()
    }

    /// Best-effort guard against reading a file that is still being
    /// written: polls until the size is non-zero or the retry budget is
    /// exhausted.
    pub async fn wait_for_stable(path: &Path) -> Result<(), RelayError> {
        stabilize(path, STABILIZE_ATTEMPTS, STABILIZE_DELAY).await
    }

    /// Downsamples a photo whose larger dimension exceeds the configured
    /// maximum, re-encoding as JPEG into a fresh temp file and removing
    /// the original. Photos already within bounds pass through
    /// unchanged.
    pub async fn resize_photo(&self, path: &Path) -> Result<PathBuf, RelayError> {
        Self::wait_for_stable(path).await?;

        let src = path.to_path_buf();
        let max = self.max_photo_size;
        let resized = tokio::task::spawn_blocking(move || resize_blocking(&src, max))
            .await
            .map_err(|error| RelayError::Transcode(format!("resize worker failed: {error}")))??;

        Ok(resized.unwrap_or_else(|| path.to_path_buf()))
    }

    /// Re-encodes a video for web streaming: proportional scale to
    /// `target_width`, faststart container flags, x264 with a fast
    /// preset. The caller owns (and discards) the input.
    pub async fn transcode_video(
        &self,
        path: &Path,
        target_width: u32,
    ) -> Result<PathBuf, RelayError> {
        let Some(ffmpeg) = &self.ffmpeg else {
            return Err(RelayError::Transcode(
                "transcoder is not configured".to_owned(),
            ));
        };

        let output = temp_media_path("video", "mp4");
        let result = Command::new(ffmpeg)
            .arg("-y")
            .args(["-loglevel", "error"])
            .arg("-i")
            .arg(path)
            .args(["-vf", &format!("scale={target_width}:-2")])
            .args(["-movflags", "+faststart"])
            .args(["-c:v", "libx264"])
            .args(["-preset", "fast"])
            .arg(&output)
            .output()
            .await;

        let result = match result {
            Ok(result) => result,
            Err(error) => {
                let _ = tokio::fs::remove_file(&output).await;
                return Err(RelayError::Transcode(format!(
                    "failed to run transcoder: {error}"
                )));
            }
        };

        if !result.status.success() || tokio::fs::metadata(&output).await.is_err() {
            let _ = tokio::fs::remove_file(&output).await;
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_owned();
            return Err(RelayError::Transcode(format!(
                "transcoder exited with {}: {stderr}",
                result
                    .status
                    .code()
                    .map_or_else(|| "signal".to_owned(), |code| code.to_string()),
            )));
        }

        Ok(output)
    }

    /// Converts a voice note into a playable mp3. The caller owns both
    /// the input and the returned file.
    pub async fn transcode_voice(&self, path: &Path) -> Result<PathBuf, RelayError> {
        let Some(ffmpeg) = &self.ffmpeg else {
            return Err(RelayError::Transcode(
                "transcoder is not configured".to_owned(),
            ));
        };

        let output = temp_media_path("voice", "mp3");
        let result = Command::new(ffmpeg)
            .arg("-y")
            .args(["-loglevel", "error"])
            .arg("-i")
            .arg(path)
            .arg(&output)
            .output()
            .await;

        let result = match result {
            Ok(result) => result,
            Err(error) => {
                let _ = tokio::fs::remove_file(&output).await;
                return Err(RelayError::Transcode(format!(
                    "failed to run transcoder: {error}"
                )));
            }
        };

        if !result.status.success() || tokio::fs::metadata(&output).await.is_err() {
            let _ = tokio::fs::remove_file(&output).await;
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_owned();
            return Err(RelayError::Transcode(format!(
                "voice transcode failed: {stderr}"
            )));
        }

        Ok(output)
    }

    /// Plays a converted voice note on the local speaker when an audio
    /// player is configured; skipped silently otherwise. Playback
    /// failures are logged, never propagated.
    pub async fn play_chime(&self, path: &Path) {
        let Some(player) = &self.audio_player else {
            debug!("no audio player configured, skipping local playback");
            return;
        };

        let mut parts = player.split_whitespace();
        let Some(program) = parts.next() else {
            return;
        };

        match Command::new(program)
            .args(parts)
            .arg(path)
            .output()
            .await
        {
            Ok(result) if !result.status.success() => {
                warn!("audio player exited with {}", result.status);
            }
            Ok(_) => {}
            Err(error) => warn!("audio player failed to start: {error}"),
        }
    }
}

async fn stabilize(path: &Path, attempts: u32, delay: Duration) -> Result<(), RelayError> {
    for _ in 0..attempts {
        if let Ok(metadata) = tokio::fs::metadata(path).await
            && metadata.len() > 0
        {
            return Ok(());
        }
        tokio::time::sleep(delay).await;
    }

    Err(RelayError::FileNotStable(path.display().to_string()))
}

fn resize_blocking(src: &Path, max: u32) -> Result<Option<PathBuf>, RelayError> {
    let img = image::open(src).map_err(|error| {
        RelayError::Transcode(format!("photo decode failed for {}: {error}", src.display()))
    })?;

    if img.width() <= max && img.height() <= max {
        return Ok(None);
    }

    let resized = img.resize(max, max, FilterType::Triangle);
    let dst = temp_media_path("photo", "jpg");

    let encoded = std::fs::File::create(&dst)
        .map_err(|error| format!("failed to create {}: {error}", dst.display()))
        .and_then(|mut file| {
            let encoder = JpegEncoder::new_with_quality(&mut file, JPEG_QUALITY);
            resized
                .to_rgb8()
                .write_with_encoder(encoder)
                .map_err(|error| format!("photo encode failed: {error}"))
        });

    if let Err(error) = encoded {
        let _ = std::fs::remove_file(&dst);
        return Err(RelayError::Transcode(error));
    }

    if let Err(error) = std::fs::remove_file(src) {
        warn!("failed to remove resized original {}: {error}", src.display());
    }

    Ok(Some(dst))
}

fn temp_media_path(prefix: &str, extension: &str) -> PathBuf {
    std::env::temp_dir().join(format!("homerelay-{prefix}-{}.{extension}", uuid::Uuid::new_v4()))
}
