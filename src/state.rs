use crate::clock::TimeSource;
use crate::config::Config;
use crate::errors::ConfigError;
use crate::limiter::RateLimiter;
use crate::models::StatsData;
use crate::sessions::SessionTracker;
use crate::storage::persist_data;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub data: Arc<Mutex<StatsData>>,
    pub sessions: Arc<Mutex<SessionTracker>>,
    pub limiter: Arc<Mutex<RateLimiter>>,
    pub clock: TimeSource,
    dirty: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(config: Config, data: StatsData) -> Result<Self, ConfigError> {
        let clock = match &config.clock_url {
            Some(url) => TimeSource::remote(url.clone(), config.clock_timeout)?,
            None => TimeSource::local(),
        };
        Ok(Self {
            sessions: Arc::new(Mutex::new(SessionTracker::new(config.session_timeout))),
            limiter: Arc::new(Mutex::new(RateLimiter::new(
                config.visit_window,
                config.visit_window_limit,
                config.limiter_capacity,
            ))),
            data: Arc::new(Mutex::new(data)),
            config: Arc::new(config),
            clock,
            dirty: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Writes `data` to disk. Callers hold the data lock so writes land in
    /// mutation order. On failure the state is left dirty for the next flush.
    pub async fn save(&self, data: &StatsData) {
        match persist_data(&self.config.data_path, data).await {
            Ok(()) => self.dirty.store(false, Ordering::SeqCst),
            Err(err) => {
                error!("{err}; will retry on next flush");
                self.dirty.store(true, Ordering::SeqCst);
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Persists unconditionally; used on shutdown.
    pub async fn flush(&self) {
        let data = self.data.lock().await;
        self.save(&data).await;
    }

    pub async fn flush_if_dirty(&self) {
        if self.is_dirty() {
            self.flush().await;
        }
    }
}
