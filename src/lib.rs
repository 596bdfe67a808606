pub mod app;
pub mod client_ip;
pub mod clock;
pub mod config;
pub mod counter;
pub mod dedup;
pub mod downloads;
pub mod errors;
pub mod handlers;
pub mod limiter;
pub mod models;
pub mod reconcile;
pub mod sessions;
pub mod state;
pub mod stats;
pub mod storage;
pub mod tasks;

pub use app::router;
pub use config::Config;
pub use state::AppState;
pub use storage::{load_data, persist_data};
