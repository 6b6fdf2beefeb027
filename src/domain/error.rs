use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("camera not found: {0}")]
    CameraNotFound(String),
    #[error("snapshot fetch failed: {0}")]
    Fetch(String),
    #[error("transcode failed: {0}")]
    Transcode(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("file did not stabilize: {0}")]
    FileNotStable(String),
    #[error("storage error: {0}")]
    Storage(String),
}
