use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_scalar::Scalar;

use basim::api::docs::ApiDoc;
use basim::campus::{Campus, CampusShared};
use basim::config::Config;
use basim::{api, bacnet, modbus_server};

const TICK_DRIVER_PERIOD: Duration = Duration::from_millis(250);
const MAX_CATCHUP_TICKS: u32 = 300;

async fn bacnet_sc_handler(ws: WebSocketUpgrade, State(shared): State<Arc<CampusShared>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| bacnet::sc::run_session(socket, shared))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(%e, "failed to load configuration");
            return;
        }
    };
    tracing::info!(campus_size = ?config.campus_size, scenario = ?config.scenario, "configuration loaded");

    let mut campus = match Campus::assemble(&config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(%e, "failed to assemble campus topology");
            return;
        }
    };
    let shared = campus.shared();
    tracing::info!(points = shared.registry.len(), "campus assembled");

    // Tick driver (spec §4.F): a single task owns the tick-exclusive
    // equipment fleet, periodically catching simulated time up to wall
    // clock. Every protocol gateway only ever touches `CampusShared`.
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_DRIVER_PERIOD);
        loop {
            interval.tick().await;
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| campus.catch_up(MAX_CATCHUP_TICKS))) {
                tracing::error!(?e, "tick panicked; skipping this interval");
            }
        }
    });

    // Modbus/TCP gateway (spec §4.H).
    let modbus_addr = SocketAddr::from(([0, 0, 0, 0], config.modbus_port));
    let register_map = modbus_server::build_register_map(&shared.registry);
    let modbus_shared = shared.clone();
    tokio::spawn(async move {
        if let Err(e) = modbus_server::run_server(modbus_addr, modbus_shared, register_map).await {
            tracing::error!(?e, "modbus/tcp gateway exited");
        }
    });

    // BACnet/IP gateway (spec §4.I).
    let bacnet_ip_addr = SocketAddr::from(([0, 0, 0, 0], config.bacnet_port));
    let bacnet_ip_shared = shared.clone();
    tokio::spawn(async move {
        if let Err(e) = bacnet::ip::run_server(bacnet_ip_addr, bacnet_ip_shared).await {
            tracing::error!(?e, "bacnet/ip gateway exited");
        }
    });

    // HTTP/JSON API (spec §4.G) plus the BACnet/SC WebSocket endpoint
    // (spec §4.J) — same process, same `CampusShared` handle.
    let bacnet_sc_router = Router::new().route("/bacnet-sc", get(bacnet_sc_handler)).with_state(shared.clone());

    let app = Router::new()
        .merge(api::build_router(shared.clone()))
        .merge(bacnet_sc_router)
        .route("/scalar", get(|| async { Html(Scalar::new(ApiDoc::openapi()).to_html()) }))
        .fallback_service(ServeDir::new("static"))
        .layer(TraceLayer::new_for_http());

    let http_addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    tracing::info!(%http_addr, %modbus_addr, %bacnet_ip_addr, "basim listening (BACnet/SC served at /bacnet-sc on http_addr)");

    axum_server::bind(http_addr).serve(app.into_make_service()).await.unwrap();
}
