//! Equipment models (spec §4.D). Each model is a plain struct implementing
//! [`Advance`] — a single-operation capability, not a class hierarchy (spec
//! §9: "do NOT use deep inheritance"). The tagged-variant/dispatch idiom is
//! the generalization of the teacher's `match` over `VariableType` in
//! `modbus_server.rs`'s register resolver.

pub mod ahu;
pub mod boiler;
pub mod chiller;
pub mod datacenter;
pub mod electrical;
pub mod pump;
pub mod tower;
pub mod vavzone;
pub mod wastewater;

use crate::config::PhysicsParameters;
use crate::registry::Registry;
use crate::weather::WeatherSample;

/// Everything an equipment model needs to advance one tick, without
/// reaching through any ambient global (spec §9: "Pass a handle
/// explicitly to each equipment model — no ambient globals").
pub struct TickContext<'a> {
    pub registry: &'a Registry,
    pub weather: &'a WeatherSample,
    pub params: &'a PhysicsParameters,
    pub now: f64,
    pub dt: f64,
    pub calendar: chrono::DateTime<chrono::Utc>,
}

/// Bounded first-order response: `x <- x + (target - x) * min(1, dt/tau)`
/// (spec §4.D).
pub fn first_order(x: f64, target: f64, dt: f64, tau: f64) -> f64 {
    let alpha = (dt / tau.max(1e-6)).min(1.0);
    x + (target - x) * alpha
}

pub trait Advance {
    fn advance(&mut self, ctx: &TickContext);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum OccupancyMode {
    Occupied,
    Unoccupied,
    Warmup,
    Cooldown,
    Auto,
}

impl OccupancyMode {
    /// Setpoint offset in °F applied on top of the occupied setpoints
    /// (spec §4.D: "each offsetting setpoints"). Implementer-defined
    /// thresholds per spec §9 open questions.
    pub fn setpoint_offset(&self, heating: bool) -> f64 {
        match self {
            OccupancyMode::Occupied | OccupancyMode::Auto => 0.0,
            OccupancyMode::Unoccupied => {
                if heating {
                    -5.0
                } else {
                    5.0
                }
            }
            OccupancyMode::Warmup => 2.0,
            OccupancyMode::Cooldown => -2.0,
        }
    }

    /// Derive occupancy from day-of-week/hour-of-day, per spec §9 open
    /// questions ("exact schedule boundaries ... implementation-defined").
    /// Weekday 07:00-18:00 is occupied; the hour before/after is
    /// warmup/cooldown; everything else unoccupied.
    pub fn from_schedule(weekday: chrono::Weekday, hour: f64) -> Self {
        use chrono::Weekday::*;
        let is_weekday = !matches!(weekday, Sat | Sun);
        if !is_weekday {
            return OccupancyMode::Unoccupied;
        }
        if (6.0..7.0).contains(&hour) {
            OccupancyMode::Warmup
        } else if (7.0..18.0).contains(&hour) {
            OccupancyMode::Occupied
        } else if (18.0..19.0).contains(&hour) {
            OccupancyMode::Cooldown
        } else {
            OccupancyMode::Unoccupied
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_order_converges_within_several_time_constants() {
        let mut x = 0.0;
        for _ in 0..20 {
            x = first_order(x, 100.0, 1.0, 5.0);
        }
        assert!((x - 100.0).abs() < 0.1);
    }

    #[test]
    fn first_order_never_overshoots_in_one_step_when_dt_le_tau() {
        let x = first_order(0.0, 100.0, 1.0, 5.0);
        assert!(x < 100.0 && x > 0.0);
    }
}
