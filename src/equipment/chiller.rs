//! Chiller model (spec §4.D), including the `Off -> Starting -> Running ->
//! Unloading -> Off` state machine with minimum on/off time.

use crate::equipment::{first_order, Advance, TickContext};
use crate::registry::{EquipmentId, PointId, PointKind, Registry, Value};

const MIN_ON_TIME_S: f64 = 300.0;
const MIN_OFF_TIME_S: f64 = 180.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChillerState {
    Off,
    Starting,
    Running,
    Unloading,
}

impl ChillerState {
    fn code(self) -> u32 {
        match self {
            ChillerState::Off => 0,
            ChillerState::Starting => 1,
            ChillerState::Running => 2,
            ChillerState::Unloading => 3,
        }
    }
}

pub struct Chiller {
    pub id: EquipmentId,
    pub path: String,
    pub rank: u32,
    pub capacity_tons: f64,

    pid_status: PointId,
    pid_load_percent: PointId,
    pid_kw: PointId,
    pid_chw_supply_temp: PointId,
    pid_chw_setpoint: PointId,
    pid_capacity_tons: PointId,
    pid_fault: PointId,

    state: ChillerState,
    time_in_state: f64,
    pub time_above_90: f64,
    load_percent: f64,
    chw_supply_temp_f: f64,
}

impl Chiller {
    pub fn new(registry: &mut Registry, id: EquipmentId, path: String, rank: u32, capacity_tons: f64) -> Self {
        let pid_status = registry.register(
            format!("{path}.status"),
            PointKind::MultiState,
            "",
            true,
            id,
            Value::MultiState(ChillerState::Off.code()),
        );
        let pid_load_percent = registry.register(
            format!("{path}.load_percent"),
            PointKind::Analog,
            "%",
            false,
            id,
            Value::Analog(0.0),
        );
        let pid_kw = registry.register(format!("{path}.kw"), PointKind::Analog, "kW", false, id, Value::Analog(0.0));
        let pid_chw_supply_temp = registry.register(
            format!("{path}.chw_supply_temp"),
            PointKind::Analog,
            "°F",
            false,
            id,
            Value::Analog(44.0),
        );
        let pid_chw_setpoint = registry.register(
            format!("{path}.chw_supply_temp_setpoint"),
            PointKind::Analog,
            "°F",
            true,
            id,
            Value::Analog(44.0),
        );
        let pid_capacity_tons = registry.register(
            format!("{path}.capacity_tons"),
            PointKind::Analog,
            "tons",
            false,
            id,
            Value::Analog(capacity_tons),
        );
        let pid_fault = registry.register(
            format!("{path}.fault"),
            PointKind::Binary,
            "",
            false,
            id,
            Value::Binary(false),
        );

        Self {
            id,
            path,
            rank,
            capacity_tons,
            pid_status,
            pid_load_percent,
            pid_kw,
            pid_chw_supply_temp,
            pid_chw_setpoint,
            pid_capacity_tons,
            pid_fault,
            state: ChillerState::Off,
            time_in_state: 0.0,
            time_above_90: 0.0,
            load_percent: 0.0,
            chw_supply_temp_f: 44.0,
        }
    }

    pub fn load_percent(&self) -> f64 {
        self.load_percent
    }

    pub fn is_enabled_effective(&self, registry: &Registry) -> bool {
        let status = registry
            .read_by_id(self.pid_status)
            .effective_value;
        !matches!(status, Value::MultiState(0))
    }

    /// True if an operator override is holding `status` at 0 (off)
    /// regardless of what the plant sequencer commands — the lead-chiller
    /// unavailability the staging sequencer must react to immediately,
    /// as opposed to an ordinary stage-down decision.
    pub fn forced_off(&self, registry: &Registry) -> bool {
        registry
            .overrides(&format!("{}.status", self.path))
            .unwrap_or_default()
            .iter()
            .any(|slot| slot.value == Value::MultiState(0))
    }

    /// Advance one tick given whether the plant sequencer wants this unit
    /// running and its requested share of cooling demand (tons).
    pub fn advance_with_demand(&mut self, ctx: &TickContext, commanded_on: bool, requested_tons: f64) {
        let registry = ctx.registry;
        let dt = ctx.dt;

        // `status` is writable; an override forces the chiller to actually
        // stop (or report) regardless of internal state (spec §4.D).
        let status_override_off = matches!(
            registry.read_by_id(self.pid_status).effective_value,
            Value::MultiState(0)
        ) && commanded_on;

        self.time_in_state += dt;
        let want_on = commanded_on && !status_override_off;

        self.state = match self.state {
            ChillerState::Off if want_on && self.time_in_state >= MIN_OFF_TIME_S => {
                self.time_in_state = 0.0;
                ChillerState::Starting
            }
            ChillerState::Starting if self.time_in_state >= 30.0 => {
                self.time_in_state = 0.0;
                ChillerState::Running
            }
            ChillerState::Running if !want_on && self.time_in_state >= MIN_ON_TIME_S => {
                self.time_in_state = 0.0;
                ChillerState::Unloading
            }
            ChillerState::Unloading if self.time_in_state >= 30.0 => {
                self.time_in_state = 0.0;
                ChillerState::Off
            }
            other => other,
        };

        let running = matches!(self.state, ChillerState::Running | ChillerState::Starting);
        let load_target = if running && !status_override_off {
            (requested_tons / self.capacity_tons.max(1.0) * 100.0).clamp(0.0, 120.0)
        } else {
            0.0
        };
        self.load_percent = first_order(self.load_percent, load_target, dt, 60.0);

        if self.load_percent >= 90.0 {
            self.time_above_90 += dt;
        } else {
            self.time_above_90 = 0.0;
        }

        let setpoint = registry
            .read_by_id(self.pid_chw_setpoint)
            .effective_value
            .as_f64()
            .unwrap_or(44.0);
        let overload = (self.load_percent - 100.0).max(0.0);
        let supply_target = if self.load_percent > 0.0 {
            setpoint + overload * 0.1 * (1.0 / ctx.params.equipment_efficiency.max(0.1))
        } else {
            setpoint + 8.0 // idle chiller drifts toward condenser water temp
        };
        self.chw_supply_temp_f = first_order(self.chw_supply_temp_f, supply_target, dt, 90.0);

        let kw = if self.load_percent > 0.0 {
            let cop_derate = 1.0 + (ctx.weather.oat_f - 75.0).max(0.0) * 0.004;
            let kw_per_ton = 0.65 * cop_derate / ctx.params.equipment_efficiency.max(0.1);
            self.load_percent / 100.0 * self.capacity_tons * kw_per_ton
        } else {
            0.0
        };

        let fault = !self.chw_supply_temp_f.is_finite() || !kw.is_finite();

        registry
            .write_present(self.pid_status, self.id, Value::MultiState(self.state.code()))
            .ok();
        registry
            .write_present(self.pid_load_percent, self.id, Value::Analog(self.load_percent))
            .ok();
        registry.write_present(self.pid_kw, self.id, Value::Analog(kw)).ok();
        registry
            .write_present(self.pid_chw_supply_temp, self.id, Value::Analog(self.chw_supply_temp_f))
            .ok();
        registry
            .write_present(self.pid_capacity_tons, self.id, Value::Analog(self.capacity_tons))
            .ok();
        registry.write_present(self.pid_fault, self.id, Value::Binary(fault)).ok();
    }
}

impl Advance for Chiller {
    fn advance(&mut self, ctx: &TickContext) {
        // Standalone single-chiller advance (used by tests); a real campus
        // advances chillers through `CentralPlant`, which supplies demand.
        self.advance_with_demand(ctx, true, self.capacity_tons * 0.5);
    }
}
