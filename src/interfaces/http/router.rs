//! Admin API router

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{charger, health, metrics, ChargerState, HealthState, MetricsState};
use crate::application::commands::SharedRefreshService;
use crate::application::session::SharedSessionRegistry;
use crate::application::state::SharedStateStore;
use crate::interfaces::ws::{ws_notifications_handler, NotificationState};

/// Everything the admin routes read. Handlers extract their own slice via
/// `FromRef`.
#[derive(Clone)]
pub struct ApiState {
    pub state: SharedStateStore,
    pub session_registry: SharedSessionRegistry,
    pub refresh: SharedRefreshService,
    pub prometheus: PrometheusHandle,
    pub started_at: Arc<Instant>,
}

impl FromRef<ApiState> for HealthState {
    fn from_ref(s: &ApiState) -> Self {
        HealthState {
            session_registry: s.session_registry.clone(),
            started_at: s.started_at.clone(),
        }
    }
}

impl FromRef<ApiState> for ChargerState {
    fn from_ref(s: &ApiState) -> Self {
        ChargerState {
            state: s.state.clone(),
            refresh: s.refresh.clone(),
        }
    }
}

impl FromRef<ApiState> for MetricsState {
    fn from_ref(s: &ApiState) -> Self {
        MetricsState {
            handle: s.prometheus.clone(),
        }
    }
}

impl FromRef<ApiState> for NotificationState {
    fn from_ref(s: &ApiState) -> Self {
        NotificationState {
            state: s.state.clone(),
        }
    }
}

pub fn create_api_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/state", get(charger::get_state))
        .route("/refresh", post(charger::post_refresh))
        .route("/events/ws", get(ws_notifications_handler));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::prometheus_metrics))
        .nest("/api/v1", api_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::application::commands::{create_command_sender, RefreshService};
    use crate::application::events::create_event_bus;
    use crate::application::session::SessionRegistry;
    use crate::application::state::StateStore;

    fn app() -> (Router, SharedStateStore) {
        let registry = SessionRegistry::shared(1);
        let sender = create_command_sender(registry.clone(), Duration::from_secs(1));
        let state = Arc::new(StateStore::new(create_event_bus()));
        let refresh = Arc::new(RefreshService::new(registry.clone(), sender, state.clone()));

        let router = create_api_router(ApiState {
            state: state.clone(),
            session_registry: registry,
            refresh,
            prometheus: PrometheusBuilder::new().build_recorder().handle(),
            started_at: Arc::new(Instant::now()),
        });
        (router, state)
    }

    async fn json(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_reports_no_charger() {
        let (router, _) = app();
        let (status, body) = json(router, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connected_charge_points"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn state_returns_snapshot() {
        let (router, state) = app();
        state.apply(|s| s.apply_status("Charging", None));

        let (status, body) = json(router, Request::get("/api/v1/state").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Charging");
        assert_eq!(body["connected"], false);
    }

    #[tokio::test]
    async fn refresh_without_charger_is_skipped() {
        let (router, _) = app();
        let (status, body) = json(
            router,
            Request::post("/api/v1/refresh").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["skipped"], true);
    }

    #[tokio::test]
    async fn metrics_are_plain_text() {
        let (router, _) = app();
        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
    }
}
