//! OpenAPI document for the HTTP/JSON API, mirroring the teacher's
//! `api_docs::ApiDoc`.

use utoipa::OpenApi;

use crate::api::handlers::{
    LoginRequest, OverrideReleaseRequest, OverrideSetRequest, PointValue, ScenarioRequest, StatusResponse,
    UnitSystemRequest,
};
use crate::config::{CampusSize, PhysicsParameters, Scenario, UnitSystem};
use crate::registry::{OverrideSlot, PointKind, Reading, Value as RegistryValue};
use crate::weather::WeatherSample;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::get_status,
        crate::api::handlers::get_plant,
        crate::api::handlers::get_electrical,
        crate::api::handlers::get_buildings,
        crate::api::handlers::get_building,
        crate::api::handlers::get_datacenter,
        crate::api::handlers::get_wastewater,
        crate::api::handlers::get_overrides,
        crate::api::handlers::post_override_set,
        crate::api::handlers::post_override_release,
        crate::api::handlers::get_parameters,
        crate::api::handlers::post_parameters,
        crate::api::handlers::post_scenario,
        crate::api::handlers::post_unit_system,
        crate::api::handlers::post_login,
        crate::api::handlers::post_logout,
        crate::api::handlers::get_metrics,
    ),
    components(schemas(
        StatusResponse,
        WeatherSample,
        Reading,
        OverrideSlot,
        RegistryValue,
        PointKind,
        PointValue,
        OverrideSetRequest,
        OverrideReleaseRequest,
        ScenarioRequest,
        UnitSystemRequest,
        LoginRequest,
        CampusSize,
        UnitSystem,
        Scenario,
        PhysicsParameters,
    ))
)]
pub struct ApiDoc;
