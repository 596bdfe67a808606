use crate::state::AppState;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::debug;

/// Periodically drops sessions that stopped heartbeating.
pub fn spawn_session_sweeper(state: AppState) -> JoinHandle<()> {
    let period = state.config.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let mut sessions = state.sessions.lock().await;
            let removed = sessions.sweep(Instant::now().into_std());
            if removed > 0 {
                debug!("sweeper removed {removed} sessions");
            }
        }
    })
}

/// Retries saves that failed on the request path.
pub fn spawn_flusher(state: AppState) -> JoinHandle<()> {
    let period = state.config.flush_interval;
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            state.flush_if_dirty().await;
        }
    })
}
