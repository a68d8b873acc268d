//! Cooling tower model (spec §4.D).

use crate::equipment::{first_order, Advance, TickContext};
use crate::registry::{EquipmentId, PointId, PointKind, Registry, Value};

pub struct CoolingTower {
    pub id: EquipmentId,
    pub path: String,
    pub capacity_tons: f64,

    pid_cw_supply_temp: PointId,
    pid_cw_setpoint: PointId,
    pid_fan_speed: PointId,
    pid_fault: PointId,

    cw_supply_temp_f: f64,
    fan_speed_pct: f64,
}

/// Tower approach (°F above wet-bulb) as a function of loading — a heavily
/// loaded, low-fan-speed tower approaches the wet-bulb less closely.
fn approach(load_frac: f64, fan_speed_pct: f64) -> f64 {
    let base = 7.0 + load_frac * 5.0;
    (base - fan_speed_pct / 100.0 * 4.0).max(2.0)
}

impl CoolingTower {
    pub fn new(registry: &mut Registry, id: EquipmentId, path: String, capacity_tons: f64) -> Self {
        let pid_cw_supply_temp = registry.register(
            format!("{path}.cw_supply_temp"),
            PointKind::Analog,
            "°F",
            false,
            id,
            Value::Analog(85.0),
        );
        let pid_cw_setpoint = registry.register(
            format!("{path}.cw_supply_temp_setpoint"),
            PointKind::Analog,
            "°F",
            true,
            id,
            Value::Analog(85.0),
        );
        let pid_fan_speed = registry.register(
            format!("{path}.fan_speed"),
            PointKind::Analog,
            "%",
            false,
            id,
            Value::Analog(0.0),
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
            capacity_tons,
            pid_cw_supply_temp,
            pid_cw_setpoint,
            pid_fan_speed,
            pid_fault,
            cw_supply_temp_f: 85.0,
            fan_speed_pct: 0.0,
        }
    }

    pub fn advance_with_load(&mut self, ctx: &TickContext, load_tons: f64) {
        let registry = ctx.registry;
        let dt = ctx.dt;
        let load_frac = (load_tons / self.capacity_tons.max(1.0)).clamp(0.0, 1.2);

        let setpoint = registry
            .read_by_id(self.pid_cw_setpoint)
            .effective_value
            .as_f64()
            .unwrap_or(85.0);

        // Fan sequences to hold the cw_supply_temp setpoint.
        let error = self.cw_supply_temp_f - setpoint;
        let fan_target = if load_frac > 0.01 {
            (error * 15.0).clamp(0.0, 100.0)
        } else {
            0.0
        };
        self.fan_speed_pct = first_order(self.fan_speed_pct, fan_target, dt, 20.0);

        let target_supply = ctx.weather.wet_bulb_f + approach(load_frac, self.fan_speed_pct);
        self.cw_supply_temp_f = first_order(self.cw_supply_temp_f, target_supply, dt, 60.0);

        let fault = !self.cw_supply_temp_f.is_finite();
        registry
            .write_present(self.pid_cw_supply_temp, self.id, Value::Analog(self.cw_supply_temp_f))
            .ok();
        registry
            .write_present(self.pid_fan_speed, self.id, Value::Analog(self.fan_speed_pct))
            .ok();
        registry.write_present(self.pid_fault, self.id, Value::Binary(fault)).ok();
    }
}

impl Advance for CoolingTower {
    fn advance(&mut self, ctx: &TickContext) {
        self.advance_with_load(ctx, self.capacity_tons * 0.5);
    }
}
