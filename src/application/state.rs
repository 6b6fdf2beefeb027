use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use crate::{
    application::config::RuntimeConfig,
    domain::{error::RelayError, models::CameraRegistry},
    storage::SqliteStore,
};

/// Process-wide alerting flag. A single scalar with no multi-field
/// invariant, so atomic reads/writes suffice.
#[derive(Debug)]
pub struct AlertState {
    enabled: AtomicBool,
}

impl AlertState {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Flips the flag and returns the new value.
    pub fn toggle(&self) -> bool {
        !self.enabled.fetch_xor(true, Ordering::Relaxed)
    }
}

impl Default for AlertState {
    fn default() -> Self {
        Self::new(true)
    }
}

#[derive(Clone)]
pub struct SharedState {
    inner: Arc<InnerState>,
}

struct InnerState {
    config: RuntimeConfig,
    cameras: CameraRegistry,
    alert: AlertState,
    store: SqliteStore,
    http: reqwest::Client,
}

impl SharedState {
    pub async fn new(config: RuntimeConfig) -> Result<Self, RelayError> {
        let store = SqliteStore::connect(&config.db_path).await?;
        let cameras = CameraRegistry::new(config.cameras.clone());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|error| RelayError::Config(format!("failed to build http client: {error}")))?;

        Ok(Self {
            inner: Arc::new(InnerState {
                cameras,
                alert: AlertState::default(),
                store,
                http,
                config,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn cameras(&self) -> &CameraRegistry {
        &self.inner.cameras
    }

    #[must_use]
    pub fn alert(&self) -> &AlertState {
        &self.inner.alert
    }

    #[must_use]
    pub fn store(&self) -> &SqliteStore {
        &self.inner.store
    }

    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    #[must_use]
    pub fn is_authorized(&self, chat_id: i64) -> bool {
        self.inner.config.authorized_users.contains(&chat_id)
    }
}
