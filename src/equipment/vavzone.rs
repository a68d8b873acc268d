//! Combined Zone/VAV model (spec §4.D). The spec treats the zone and its
//! VAV box as one bullet ("room_temp responds to supply air flow...
//! damper and reheat follow a PI... occupancy toggles between modes") so
//! this is one struct, owning both the thermal zone and its terminal box.

use chrono::{Datelike, Timelike};

use crate::equipment::{first_order, Advance, OccupancyMode, TickContext};
use crate::registry::{EquipmentId, PointId, PointKind, Registry, Value};

pub struct VavZone {
    pub id: EquipmentId,
    pub path: String,
    pub ahu_path: String,
    pub max_flow_cfm: f64,

    pid_room_temp: PointId,
    pid_cooling_sp: PointId,
    pid_heating_sp: PointId,
    pid_damper: PointId,
    pid_reheat: PointId,
    pid_occupancy: PointId,
    pid_fault: PointId,

    room_temp_f: f64,
    damper_present: f64,
    reheat_present: f64,
    integral_cool: f64,
    integral_heat: f64,
}

fn occ_to_code(m: OccupancyMode) -> u32 {
    match m {
        OccupancyMode::Occupied => 0,
        OccupancyMode::Unoccupied => 1,
        OccupancyMode::Warmup => 2,
        OccupancyMode::Cooldown => 3,
        OccupancyMode::Auto => 4,
    }
}

fn code_to_occ(c: u32) -> OccupancyMode {
    match c {
        0 => OccupancyMode::Occupied,
        1 => OccupancyMode::Unoccupied,
        2 => OccupancyMode::Warmup,
        3 => OccupancyMode::Cooldown,
        _ => OccupancyMode::Auto,
    }
}

impl VavZone {
    pub fn new(
        registry: &mut Registry,
        id: EquipmentId,
        path: String,
        ahu_path: String,
        max_flow_cfm: f64,
    ) -> Self {
        let pid_room_temp = registry.register(
            format!("{path}.room_temp"),
            PointKind::Analog,
            "°F",
            false,
            id,
            Value::Analog(72.0),
        );
        let pid_cooling_sp = registry.register(
            format!("{path}.cooling_setpoint"),
            PointKind::Analog,
            "°F",
            true,
            id,
            Value::Analog(75.0),
        );
        let pid_heating_sp = registry.register(
            format!("{path}.heating_setpoint"),
            PointKind::Analog,
            "°F",
            true,
            id,
            Value::Analog(70.0),
        );
        let pid_damper = registry.register(
            format!("{path}.damper_position"),
            PointKind::Analog,
            "%",
            true,
            id,
            Value::Analog(20.0),
        );
        let pid_reheat = registry.register(
            format!("{path}.reheat_valve"),
            PointKind::Analog,
            "%",
            true,
            id,
            Value::Analog(0.0),
        );
        let pid_occupancy = registry.register(
            format!("{path}.occupancy_mode"),
            PointKind::MultiState,
            "",
            true,
            id,
            Value::MultiState(occ_to_code(OccupancyMode::Auto) as u32),
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
            ahu_path,
            max_flow_cfm,
            pid_room_temp,
            pid_cooling_sp,
            pid_heating_sp,
            pid_damper,
            pid_reheat,
            pid_occupancy,
            pid_fault,
            room_temp_f: 72.0,
            damper_present: 20.0,
            reheat_present: 0.0,
            integral_cool: 0.0,
            integral_heat: 0.0,
        }
    }

    fn effective_occupancy(&self, registry: &Registry, now: chrono::DateTime<chrono::Utc>) -> OccupancyMode {
        let reading = registry.read_by_id(self.pid_occupancy);
        let code = match reading.effective_value {
            Value::MultiState(c) => c,
            _ => 4,
        };
        let mode = code_to_occ(code);
        if mode == OccupancyMode::Auto {
            OccupancyMode::from_schedule(now.weekday(), now.hour() as f64 + now.minute() as f64 / 60.0)
        } else {
            mode
        }
    }
}

impl Advance for VavZone {
    fn advance(&mut self, ctx: &TickContext) {
        let registry = ctx.registry;
        let dt = ctx.dt;

        let occ = self.effective_occupancy(registry, ctx.calendar);

        let cooling_sp = registry
            .read_by_id(self.pid_cooling_sp)
            .effective_value
            .as_f64()
            .unwrap_or(75.0)
            + occ.setpoint_offset(false);
        let heating_sp = registry
            .read_by_id(self.pid_heating_sp)
            .effective_value
            .as_f64()
            .unwrap_or(70.0)
            + occ.setpoint_offset(true);

        let cool_error = (self.room_temp_f - cooling_sp).max(0.0);
        let heat_error = (heating_sp - self.room_temp_f).max(0.0);

        let kp = 12.0 * ctx.params.vav_gains;
        let ki = 0.5 * ctx.params.vav_gains;
        self.integral_cool = (self.integral_cool + cool_error * ki * dt / 60.0).clamp(0.0, 40.0);
        self.integral_heat = (self.integral_heat + heat_error * ki * dt / 60.0).clamp(0.0, 40.0);

        let min_position = if occ == OccupancyMode::Unoccupied { 0.0 } else { 20.0 };
        let damper_target = (cool_error * kp + self.integral_cool).clamp(min_position, 100.0);
        let reheat_target = (heat_error * kp + self.integral_heat).clamp(0.0, 100.0);

        self.damper_present = first_order(self.damper_present, damper_target, dt, 30.0);
        self.reheat_present = first_order(self.reheat_present, reheat_target, dt, 20.0);

        registry
            .write_present(self.pid_damper, self.id, Value::Analog(self.damper_present))
            .ok();
        registry
            .write_present(self.pid_reheat, self.id, Value::Analog(self.reheat_present))
            .ok();

        let effective_damper = registry
            .read_by_id(self.pid_damper)
            .effective_value
            .as_f64()
            .unwrap_or(self.damper_present)
            .clamp(0.0, 100.0);
        let effective_reheat = registry
            .read_by_id(self.pid_reheat)
            .effective_value
            .as_f64()
            .unwrap_or(self.reheat_present)
            .clamp(0.0, 100.0);

        let ahu_supply_temp = registry
            .read(&format!("{}.supply_temp", self.ahu_path))
            .ok()
            .and_then(|r| r.effective_value.as_f64())
            .unwrap_or(55.0);

        let supply_effective = ahu_supply_temp + effective_reheat / 100.0 * 40.0 * ctx.params.vav_gains;
        let flow_fraction = effective_damper / 100.0;

        let k_supply = flow_fraction * 0.6;
        let k_env = 0.05 * ctx.params.envelope_ua;
        let internal_gain_f = 2.0 * ctx.params.internal_gains;
        let solar_gain_f = ctx.params.solar_gain * (ctx.weather.solar_irradiance_w_m2 / 1000.0).clamp(0.0, 1.2) * 3.0;

        let denom = (k_supply + k_env).max(1e-3);
        let target_temp =
            (k_supply * supply_effective + k_env * ctx.weather.oat_f + internal_gain_f + solar_gain_f) / denom;

        let tau = 900.0 * ctx.params.thermal_mass;
        let mut new_room_temp = first_order(self.room_temp_f, target_temp, dt, tau);

        let mut fault = false;
        if !new_room_temp.is_finite() {
            new_room_temp = 72.0;
            fault = true;
        }
        new_room_temp = new_room_temp.clamp(40.0, 110.0);
        self.room_temp_f = new_room_temp;

        registry
            .write_present(self.pid_room_temp, self.id, Value::Analog(self.room_temp_f))
            .ok();
        registry.write_present(self.pid_fault, self.id, Value::Binary(fault)).ok();
    }
}
