//! HTTP/JSON API gateway (spec §4.G). Grounded in the teacher's
//! `routes::power_routes::api_routes` / `controllers::power_controller`
//! split: a thin router-builder module plus a handlers module of
//! `#[utoipa::path]`-annotated functions, generalized from a single
//! `AppState` to a dual `Arc<CampusShared>` / `Arc<SessionStore>` state
//! extracted via `FromRef`, the same pattern the teacher used for its
//! `SharedState { app, config }` pair.

pub mod auth;
pub mod docs;
pub mod handlers;

use std::sync::Arc;

use axum::extract::FromRef;
use axum::routing::{get, post};
use axum::Router;

use crate::api::auth::SessionStore;
use crate::campus::CampusShared;

#[derive(Clone)]
pub struct ApiState {
    pub campus: Arc<CampusShared>,
    pub sessions: Arc<SessionStore>,
}

impl FromRef<ApiState> for Arc<CampusShared> {
    fn from_ref(state: &ApiState) -> Self {
        state.campus.clone()
    }
}

impl FromRef<ApiState> for Arc<SessionStore> {
    fn from_ref(state: &ApiState) -> Self {
        state.sessions.clone()
    }
}

/// Build the `/api/*` sub-router plus the top-level `/login`/`/logout`
/// routes (spec §4.G endpoint list).
pub fn build_router(campus: Arc<CampusShared>) -> Router {
    let state = ApiState { campus, sessions: Arc::new(SessionStore::new()) };

    let api = Router::new()
        .route("/status", get(handlers::get_status))
        .route("/plant", get(handlers::get_plant))
        .route("/electrical", get(handlers::get_electrical))
        .route("/buildings", get(handlers::get_buildings))
        .route("/building/{id}", get(handlers::get_building))
        .route("/datacenter", get(handlers::get_datacenter))
        .route("/wastewater", get(handlers::get_wastewater))
        .route("/overrides", get(handlers::get_overrides))
        .route("/override/set", post(handlers::post_override_set))
        .route("/override/release", post(handlers::post_override_release))
        .route("/admin/parameters", get(handlers::get_parameters).post(handlers::post_parameters))
        .route("/admin/scenario", post(handlers::post_scenario))
        .route("/admin/unit-system", post(handlers::post_unit_system));

    Router::new()
        .nest("/api", api)
        .route("/login", post(handlers::post_login))
        .route("/logout", post(handlers::post_logout))
        .route("/metrics", get(handlers::get_metrics))
        .with_state(state)
}
