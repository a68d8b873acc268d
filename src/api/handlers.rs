use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::auth::{RequireAdmin, SessionStore, SESSION_COOKIE};
use crate::campus::CampusShared;
use crate::config::{CampusSize, PhysicsParameters, Scenario, UnitSystem};
use crate::error::BasimError;
use crate::registry::{OverrideSlot, Reading, Snapshot, Value};
use crate::weather::WeatherSample;

/// Filter a cross-point-consistent snapshot down to one subtree, for
/// handlers that report a single equipment group (spec §4.F: the snapshot
/// itself, not this filtering, is what gives atomicity — filtering a
/// consistent whole still leaves a consistent part).
fn filter_snapshot(snapshot: &Snapshot, prefix: &str) -> Snapshot {
    snapshot.iter().filter(|(path, _)| path.starts_with(prefix)).map(|(path, reading)| (path.clone(), reading.clone())).collect()
}

/// Request/response-layer mirror of [`crate::registry::Value`] — kept
/// separate so the registry's own type doesn't have to carry an
/// OpenAPI-schema derive it otherwise has no use for.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(untagged)]
pub enum PointValue {
    Analog(f64),
    Binary(bool),
    MultiState(u32),
    Text(String),
}

impl From<PointValue> for Value {
    fn from(v: PointValue) -> Self {
        match v {
            PointValue::Analog(a) => Value::Analog(a),
            PointValue::Binary(b) => Value::Binary(b),
            PointValue::MultiState(m) => Value::MultiState(m),
            PointValue::Text(t) => Value::Text(t),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub device_id: u32,
    pub campus_size: CampusSize,
    pub unit_system: UnitSystem,
    pub scenario: Scenario,
    pub sim_time_s: f64,
    pub speed: f64,
    pub point_count: usize,
    pub weather: WeatherSample,
}

/// GET /api/status
#[utoipa::path(get, path = "/api/status",
    responses((status = 200, description = "Top-level campus status", body = StatusResponse)))]
pub async fn get_status(State(shared): State<Arc<CampusShared>>) -> impl IntoResponse {
    let now = shared.clock.sim_now();
    Json(StatusResponse {
        device_id: shared.device_id,
        campus_size: shared.campus_size,
        unit_system: shared.unit_system(),
        scenario: shared.weather.scenario(),
        sim_time_s: now,
        speed: shared.clock.speed(),
        point_count: shared.registry.len(),
        weather: shared.weather.advance(now),
    })
}

/// GET /api/plant
#[utoipa::path(get, path = "/api/plant",
    responses((status = 200, description = "Central plant points", body = std::collections::HashMap<String, Reading>)))]
pub async fn get_plant(State(shared): State<Arc<CampusShared>>) -> impl IntoResponse {
    Json(filter_snapshot(&shared.published_snapshot(), "CentralPlant"))
}

/// GET /api/electrical
#[utoipa::path(get, path = "/api/electrical",
    responses((status = 200, description = "Electrical system points", body = std::collections::HashMap<String, Reading>)))]
pub async fn get_electrical(State(shared): State<Arc<CampusShared>>) -> impl IntoResponse {
    Json(filter_snapshot(&shared.published_snapshot(), "Electrical"))
}

/// GET /api/buildings — the list of building identifiers this campus was
/// assembled with (spec §4.E `campus_size.building_count`).
#[utoipa::path(get, path = "/api/buildings",
    responses((status = 200, description = "Building identifiers", body = Vec<String>)))]
pub async fn get_buildings(State(shared): State<Arc<CampusShared>>) -> impl IntoResponse {
    let names: Vec<String> = (1..=shared.campus_size.building_count()).map(|n| format!("Building_{n}")).collect();
    Json(names)
}

/// GET /api/building/{id}
#[utoipa::path(get, path = "/api/building/{id}",
    params(("id" = String, Path, description = "Building identifier, e.g. \"1\"")),
    responses(
        (status = 200, description = "One building's points", body = std::collections::HashMap<String, Reading>),
        (status = 404, description = "No such building")
    ))]
pub async fn get_building(Path(id): Path<String>, State(shared): State<Arc<CampusShared>>) -> Result<impl IntoResponse, BasimError> {
    let prefix = format!("Building_{id}");
    let snapshot = filter_snapshot(&shared.published_snapshot(), &prefix);
    if snapshot.is_empty() {
        return Err(BasimError::UnknownPoint(prefix));
    }
    Ok(Json(snapshot))
}

/// GET /api/datacenter
#[utoipa::path(get, path = "/api/datacenter",
    responses((status = 200, description = "Data center points", body = std::collections::HashMap<String, Reading>)))]
pub async fn get_datacenter(State(shared): State<Arc<CampusShared>>) -> impl IntoResponse {
    Json(filter_snapshot(&shared.published_snapshot(), "DataCenter"))
}

/// GET /api/wastewater
#[utoipa::path(get, path = "/api/wastewater",
    responses((status = 200, description = "Wastewater plant points", body = std::collections::HashMap<String, Reading>)))]
pub async fn get_wastewater(State(shared): State<Arc<CampusShared>>) -> impl IntoResponse {
    Json(filter_snapshot(&shared.published_snapshot(), "Wastewater"))
}

/// GET /metrics — Prometheus text format, one gauge per analog/binary point.
/// **(ambient)**: not a historian, just a scrape-once dump of the current
/// snapshot, the same shape as the teacher's `prometheus_metrics`.
#[utoipa::path(get, path = "/metrics", responses((status = 200, description = "Prometheus gauge dump")))]
pub async fn get_metrics(State(shared): State<Arc<CampusShared>>) -> impl IntoResponse {
    let snapshot = shared.published_snapshot();
    let mut out = String::with_capacity(snapshot.len() * 64);

    out.push_str("# HELP basim_point Current effective value of a simulated point\n");
    out.push_str("# TYPE basim_point gauge\n");
    for (path, reading) in snapshot.iter() {
        let v = match &reading.effective_value {
            Value::Analog(a) => *a,
            Value::Binary(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::MultiState(m) => *m as f64,
            Value::Text(_) => continue,
        };
        out.push_str(&format!("basim_point{{path=\"{path}\"}} {v}\n"));
    }

    out.push_str("# HELP basim_point_count Total registered points\n");
    out.push_str("# TYPE basim_point_count gauge\n");
    out.push_str(&format!("basim_point_count {}\n", shared.registry.len()));

    out.push_str("# HELP basim_sim_time_seconds Current simulated time\n");
    out.push_str("# TYPE basim_sim_time_seconds gauge\n");
    out.push_str(&format!("basim_sim_time_seconds {}\n", shared.clock.sim_now()));

    ([("content-type", "text/plain; version=0.0.4")], out)
}

/// GET /api/overrides
#[utoipa::path(get, path = "/api/overrides",
    responses((status = 200, description = "Every currently-overridden point", body = std::collections::HashMap<String, Vec<OverrideSlot>>)))]
pub async fn get_overrides(State(shared): State<Arc<CampusShared>>) -> impl IntoResponse {
    Json(shared.registry.all_overrides())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OverrideSetRequest {
    pub path: String,
    pub value: PointValue,
    pub priority: u8,
    pub source: Option<String>,
    pub duration_s: Option<f64>,
}

/// POST /api/override/set — `override(path, v, priority, source)` (spec
/// §4.C), the same semantic every protocol gateway's write maps to.
#[utoipa::path(post, path = "/api/override/set",
    responses((status = 200, description = "Override applied"), (status = 400, description = "Bad point/priority/value"), (status = 401, description = "Not authenticated")))]
pub async fn post_override_set(
    _admin: RequireAdmin,
    State(shared): State<Arc<CampusShared>>,
    Json(body): Json<OverrideSetRequest>,
) -> Result<impl IntoResponse, BasimError> {
    let now = shared.clock.sim_now();
    let source = body.source.unwrap_or_else(|| "http".to_string());
    shared
        .registry
        .override_point(&body.path, body.value.into(), body.priority, source, now, body.duration_s)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OverrideReleaseRequest {
    pub path: String,
    pub priority: Option<u8>,
}

/// POST /api/override/release
#[utoipa::path(post, path = "/api/override/release",
    responses((status = 200, description = "Override released"), (status = 400, description = "Bad point/priority"), (status = 401, description = "Not authenticated")))]
pub async fn post_override_release(
    _admin: RequireAdmin,
    State(shared): State<Arc<CampusShared>>,
    Json(body): Json<OverrideReleaseRequest>,
) -> Result<impl IntoResponse, BasimError> {
    shared.registry.release(&body.path, body.priority)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// GET /api/admin/parameters
#[utoipa::path(get, path = "/api/admin/parameters",
    responses((status = 200, description = "Current physics tuning parameters", body = PhysicsParameters), (status = 401, description = "Not authenticated")))]
pub async fn get_parameters(_admin: RequireAdmin, State(shared): State<Arc<CampusShared>>) -> impl IntoResponse {
    Json(shared.parameters())
}

/// POST /api/admin/parameters
#[utoipa::path(post, path = "/api/admin/parameters",
    responses((status = 200, description = "Parameters updated"), (status = 401, description = "Not authenticated")))]
pub async fn post_parameters(
    _admin: RequireAdmin,
    State(shared): State<Arc<CampusShared>>,
    Json(params): Json<PhysicsParameters>,
) -> impl IntoResponse {
    shared.set_parameters(params);
    Json(serde_json::json!({ "ok": true }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ScenarioRequest {
    pub scenario: Scenario,
}

/// POST /api/admin/scenario
#[utoipa::path(post, path = "/api/admin/scenario",
    responses((status = 200, description = "Scenario updated"), (status = 401, description = "Not authenticated")))]
pub async fn post_scenario(
    _admin: RequireAdmin,
    State(shared): State<Arc<CampusShared>>,
    Json(body): Json<ScenarioRequest>,
) -> impl IntoResponse {
    shared.weather.set_scenario(body.scenario);
    Json(serde_json::json!({ "ok": true }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UnitSystemRequest {
    pub unit_system: UnitSystem,
}

/// POST /api/admin/unit-system
#[utoipa::path(post, path = "/api/admin/unit-system",
    responses((status = 200, description = "Unit system updated"), (status = 401, description = "Not authenticated")))]
pub async fn post_unit_system(
    _admin: RequireAdmin,
    State(shared): State<Arc<CampusShared>>,
    Json(body): Json<UnitSystemRequest>,
) -> impl IntoResponse {
    shared.set_unit_system(body.unit_system);
    Json(serde_json::json!({ "ok": true }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// POST /login
#[utoipa::path(post, path = "/login",
    responses((status = 200, description = "Session cookie issued"), (status = 401, description = "Bad credentials")))]
pub async fn post_login(
    State(shared): State<Arc<CampusShared>>,
    State(sessions): State<Arc<SessionStore>>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, BasimError> {
    if body.username != shared.admin_user || body.password != shared.admin_password {
        return Err(BasimError::NotAuthenticated);
    }
    let token = sessions.issue_admin();
    let cookie = Cookie::build((SESSION_COOKIE, token)).http_only(true).same_site(SameSite::Strict).path("/").build();
    let jar = CookieJar::new().add(cookie);
    Ok((jar, Json(serde_json::json!({ "ok": true }))))
}

/// POST /logout
#[utoipa::path(post, path = "/logout", responses((status = 200, description = "Session ended")))]
pub async fn post_logout(State(sessions): State<Arc<SessionStore>>, jar: CookieJar) -> impl IntoResponse {
    if let Some(c) = jar.get(SESSION_COOKIE) {
        sessions.revoke(c.value());
    }
    let jar = jar.remove(Cookie::from(SESSION_COOKIE));
    (jar, Json(serde_json::json!({ "ok": true })))
}
