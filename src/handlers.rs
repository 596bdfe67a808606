use crate::client_ip::client_identity;
use crate::clock::{day_key, local_date};
use crate::counter::{
    VisitMeta, VisitOutcome, compact_history, prune_history, record_visit_at, reset_counters,
    set_visitor_count, snapshot,
};
use crate::downloads::{download_snapshot, merge_client_downloads, record_download};
use crate::errors::AppError;
use crate::models::{
    AnalyticsResponse, CleanHistoryResponse, CounterSnapshot, DownloadSnapshot, HeartbeatRequest,
    HeartbeatResponse, ReconcileRequest, ReconcileResponse, SetCountRequest,
    SyncDownloadsRequest, VisitRecord, VisitRequest,
};
use crate::reconcile::reconcile;
use crate::sessions::{SessionKey, redact};
use crate::state::AppState;
use crate::stats::build_analytics_at;
use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::HeaderMap,
};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, info};

pub async fn get_stats(State(state): State<AppState>) -> Json<CounterSnapshot> {
    let now = state.clock.now().await;
    let connected = current_connected(&state).await;
    let data = state.data.lock().await;
    Json(snapshot(&data, &day_key(now, state.config.timezone), connected))
}

pub async fn record_visit(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Option<Json<VisitRequest>>,
) -> Result<Json<CounterSnapshot>, AppError> {
    let Json(payload) = payload.unwrap_or_default();
    let identity = client_identity(
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
        state.config.trust_forwarded_headers,
    );
    let now = state.clock.now().await;
    let instant = Instant::now();
    let today = day_key(now, state.config.timezone);

    let token = payload
        .fingerprint
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = token {
        let mut sessions = state.sessions.lock().await;
        sessions.heartbeat(SessionKey::new(identity.clone(), token), instant);
    }
    let connected = current_connected(&state).await;

    let allowed = state.limiter.lock().await.check(&identity, instant);
    let mut data = state.data.lock().await;
    if !allowed {
        debug!("visit from {} inside rate window, not processed", redact(&identity));
        return Ok(Json(snapshot(&data, &today, connected)));
    }

    let meta = VisitMeta {
        page: payload.page,
        source: payload.source,
    };
    let outcome = record_visit_at(&mut data, &identity, meta, now, state.config.timezone)?;
    match outcome {
        VisitOutcome::Counted => {
            prune_history(&mut data, now, state.config.history_retention());
            info!(
                "new visitor {}: total {} | history {}",
                redact(&identity),
                data.total_visitors,
                data.visit_history.len()
            );
            state.save(&data).await;
        }
        VisitOutcome::AlreadySeenToday => {
            debug!("{} already counted today", redact(&identity));
        }
    }

    Ok(Json(snapshot(&data, &today, connected)))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(payload): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>, AppError> {
    let token = payload.fingerprint.trim();
    if token.is_empty() {
        return Err(AppError::bad_request("fingerprint is required"));
    }
    let address = client_identity(
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
        state.config.trust_forwarded_headers,
    );

    let now = Instant::now();
    let mut sessions = state.sessions.lock().await;
    sessions.heartbeat(SessionKey::new(address, token), now);
    let connected = sessions.connected(now);

    Ok(Json(HeartbeatResponse {
        current_connected: state.config.display_connected(connected),
    }))
}

pub async fn record_cv_download(State(state): State<AppState>) -> Json<DownloadSnapshot> {
    let today = today(&state).await;
    let mut data = state.data.lock().await;
    record_download(&mut data, &today);
    state.save(&data).await;
    Json(download_snapshot(&data, &today))
}

pub async fn get_cv_downloads(State(state): State<AppState>) -> Json<DownloadSnapshot> {
    let today = today(&state).await;
    let data = state.data.lock().await;
    Json(download_snapshot(&data, &today))
}

pub async fn sync_cv_downloads(
    State(state): State<AppState>,
    Json(payload): Json<SyncDownloadsRequest>,
) -> Json<DownloadSnapshot> {
    let today = today(&state).await;
    let mut data = state.data.lock().await;
    if merge_client_downloads(&mut data, &payload.downloads) {
        info!("cv downloads merged from client: {} total", data.total_downloads);
        state.save(&data).await;
    }
    Json(download_snapshot(&data, &today))
}

pub async fn reconcile_history(
    State(state): State<AppState>,
    Json(payload): Json<ReconcileRequest>,
) -> Json<ReconcileResponse> {
    let today = today(&state).await;
    let connected = current_connected(&state).await;
    let mut data = state.data.lock().await;

    let outcome = reconcile(&mut data, payload.visit_history, state.config.timezone);
    if outcome.changed {
        state.save(&data).await;
    }

    Json(ReconcileResponse {
        stats: snapshot(&data, &today, connected),
        merged_from_client: outcome.merged_from_client,
        discarded: outcome.discarded,
        invalid: outcome.invalid.iter().map(ToString::to_string).collect(),
        unexplained_gap: outcome.unexplained_gap,
        unreadable_server_rows: outcome
            .unreadable_server_rows
            .iter()
            .map(ToString::to_string)
            .collect(),
        changed: outcome.changed,
        visit_history: data.visit_history.clone(),
    })
}

pub async fn get_visit_history(State(state): State<AppState>) -> Json<Vec<VisitRecord>> {
    let data = state.data.lock().await;
    Json(data.visit_history.clone())
}

pub async fn get_analytics(State(state): State<AppState>) -> Json<AnalyticsResponse> {
    let now = state.clock.now().await;
    let zone = state.config.timezone;
    let data = state.data.lock().await;
    Json(build_analytics_at(local_date(now, zone), &data, zone))
}

pub async fn reset_stats(State(state): State<AppState>) -> Json<CounterSnapshot> {
    let now = state.clock.now().await;
    let connected = current_connected(&state).await;
    let mut data = state.data.lock().await;
    reset_counters(&mut data, now, state.config.timezone);
    state.save(&data).await;
    Json(snapshot(&data, &day_key(now, state.config.timezone), connected))
}

pub async fn set_visitor_count_manually(
    State(state): State<AppState>,
    Json(payload): Json<SetCountRequest>,
) -> Json<CounterSnapshot> {
    let now = state.clock.now().await;
    let connected = current_connected(&state).await;
    let mut data = state.data.lock().await;
    set_visitor_count(&mut data, payload.count, now);
    state.save(&data).await;
    Json(snapshot(&data, &day_key(now, state.config.timezone), connected))
}

pub async fn clear_connected(State(state): State<AppState>) -> Json<HeartbeatResponse> {
    state.sessions.lock().await.clear();
    info!("connected sessions cleared");
    Json(HeartbeatResponse {
        current_connected: 0,
    })
}

pub async fn clean_history(State(state): State<AppState>) -> Json<CleanHistoryResponse> {
    let mut data = state.data.lock().await;
    let report = compact_history(&mut data, state.config.timezone);
    state.save(&data).await;
    Json(report)
}

async fn current_connected(state: &AppState) -> usize {
    let connected = state.sessions.lock().await.connected(Instant::now());
    state.config.display_connected(connected)
}

async fn today(state: &AppState) -> String {
    day_key(state.clock.now().await, state.config.timezone)
}
