//! Charger state and manual refresh

use axum::{extract::State, Json};
use tracing::info;

use crate::application::commands::{RefreshReport, SharedRefreshService};
use crate::application::state::{SharedStateStore, StateSnapshot};

#[derive(Clone)]
pub struct ChargerState {
    pub state: SharedStateStore,
    pub refresh: SharedRefreshService,
}

/// `GET /api/v1/state`
pub async fn get_state(State(s): State<ChargerState>) -> Json<StateSnapshot> {
    Json(s.state.snapshot())
}

/// `POST /api/v1/refresh` - waits for all refresh steps. A report with
/// `skipped = true` means no charger was connected.
pub async fn post_refresh(State(s): State<ChargerState>) -> Json<RefreshReport> {
    info!("Manual refresh requested over HTTP");
    Json(s.refresh.refresh().await)
}
