use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Size profile driving the campus assembler (spec §3, `campus_size`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CampusSize {
    Small,
    Medium,
    Large,
}

impl CampusSize {
    fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "large" => CampusSize::Large,
            "small" => CampusSize::Small,
            _ => CampusSize::Medium,
        }
    }

    /// Number of buildings for this profile.
    pub fn building_count(&self) -> usize {
        match self {
            CampusSize::Small => 1,
            CampusSize::Medium => 5,
            CampusSize::Large => 20,
        }
    }

    /// AHUs per building.
    pub fn ahus_per_building(&self) -> usize {
        match self {
            CampusSize::Small => 1,
            CampusSize::Medium => 2,
            CampusSize::Large => 3,
        }
    }

    /// VAV boxes per AHU.
    pub fn vavs_per_ahu(&self) -> usize {
        match self {
            CampusSize::Small => 3,
            CampusSize::Medium => 4,
            CampusSize::Large => 6,
        }
    }

    pub fn chiller_count(&self) -> usize {
        match self {
            CampusSize::Small => 1,
            CampusSize::Medium => 2,
            CampusSize::Large => 3,
        }
    }

    pub fn boiler_count(&self) -> usize {
        match self {
            CampusSize::Small => 1,
            CampusSize::Medium => 2,
            CampusSize::Large => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum UnitSystem {
    US,
    Metric,
}

impl UnitSystem {
    fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "metric" => UnitSystem::Metric,
            _ => UnitSystem::US,
        }
    }
}

/// Weather scenario (spec §3, §4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub enum Scenario {
    Normal,
    Snow,
    Rainstorm,
    Windstorm,
    Thunderstorm,
    Heatwave,
}

impl Scenario {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.to_ascii_lowercase().as_str() {
            "normal" => Scenario::Normal,
            "snow" => Scenario::Snow,
            "rainstorm" => Scenario::Rainstorm,
            "windstorm" => Scenario::Windstorm,
            "thunderstorm" => Scenario::Thunderstorm,
            "heatwave" => Scenario::Heatwave,
            _ => return None,
        })
    }
}

/// Physics tuning multipliers (spec §3, §9) — the only tuning knobs that exist.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct PhysicsParameters {
    pub thermal_mass: f64,
    pub envelope_ua: f64,
    pub internal_gains: f64,
    pub solar_gain: f64,
    pub vav_gains: f64,
    pub equipment_efficiency: f64,
}

impl Default for PhysicsParameters {
    fn default() -> Self {
        Self {
            thermal_mass: 1.0,
            envelope_ua: 1.0,
            internal_gains: 1.0,
            solar_gain: 1.0,
            vav_gains: 1.0,
            equipment_efficiency: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub campus_size: CampusSize,
    pub simulation_speed: f64,
    pub geo_lat: f64,
    pub unit_system: UnitSystem,
    pub scenario: Scenario,
    pub device_id: u32,
    pub http_port: u16,
    pub modbus_port: u16,
    pub bacnet_port: u16,
    pub admin_user: String,
    pub admin_password: String,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Re-seed configuration from the environment. Mirrors the teacher's
    /// `Config::load` constructor, but sources from env vars per spec §6
    /// instead of a `config.json` file — the world is always rebuilt from
    /// scratch on process start (spec §1, "Persistence: ... in-memory").
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let campus_size = CampusSize::parse(&env_or("CAMPUS_SIZE", "Medium"));
        let simulation_speed: f64 = env_or("SIMULATION_SPEED", "1.0").parse()?;
        let geo_lat: f64 = env_or("GEO_LAT", "39.95").parse()?;
        let unit_system = UnitSystem::parse(&env_or("UNIT_SYSTEM", "US"));
        let scenario =
            Scenario::parse(&env_or("SCENARIO", "Normal")).ok_or("invalid SCENARIO")?;
        let device_id: u32 = env_or("DEVICE_ID", "389999").parse()?;
        let http_port: u16 = env_or("HTTP_PORT", "8080").parse()?;
        let modbus_port: u16 = env_or("MODBUS_PORT", "5020").parse()?;
        let bacnet_port: u16 = env_or("BACNET_PORT", "47808").parse()?;
        let admin_user = env_or("ADMIN_USER", "admin");
        let admin_password = env_or("ADMIN_PASSWORD", "admin");

        if simulation_speed <= 0.0 {
            return Err("SIMULATION_SPEED must be positive".into());
        }

        Ok(Self {
            campus_size,
            simulation_speed,
            geo_lat,
            unit_system,
            scenario,
            device_id,
            http_port,
            modbus_port,
            bacnet_port,
            admin_user,
            admin_password,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            campus_size: CampusSize::Medium,
            simulation_speed: 1.0,
            geo_lat: 39.95,
            unit_system: UnitSystem::US,
            scenario: Scenario::Normal,
            device_id: 389_999,
            http_port: 8080,
            modbus_port: 5020,
            bacnet_port: 47808,
            admin_user: "admin".to_string(),
            admin_password: "admin".to_string(),
        }
    }
}
