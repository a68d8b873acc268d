//! Boiler model (spec §4.D) — symmetric to the chiller on the heating side.

use crate::equipment::{first_order, Advance, TickContext};
use crate::registry::{EquipmentId, PointId, PointKind, Registry, Value};

const LHV_BTU_PER_CF: f64 = 1020.0; // natural gas lower heating value

pub struct Boiler {
    pub id: EquipmentId,
    pub path: String,
    pub capacity_mbh: f64,

    pid_status: PointId,
    pid_firing_rate: PointId,
    pid_hw_supply_temp: PointId,
    pid_hw_setpoint: PointId,
    pid_gas_flow_cfh: PointId,
    pid_fault: PointId,

    firing_rate_pct: f64,
    hw_supply_temp_f: f64,
}

impl Boiler {
    pub fn new(registry: &mut Registry, id: EquipmentId, path: String, capacity_mbh: f64) -> Self {
        let pid_status = registry.register(
            format!("{path}.status"),
            PointKind::Binary,
            "",
            true,
            id,
            Value::Binary(false),
        );
        let pid_firing_rate = registry.register(
            format!("{path}.firing_rate"),
            PointKind::Analog,
            "%",
            false,
            id,
            Value::Analog(0.0),
        );
        let pid_hw_supply_temp = registry.register(
            format!("{path}.hw_supply_temp"),
            PointKind::Analog,
            "°F",
            false,
            id,
            Value::Analog(160.0),
        );
        let pid_hw_setpoint = registry.register(
            format!("{path}.hw_supply_temp_setpoint"),
            PointKind::Analog,
            "°F",
            true,
            id,
            Value::Analog(160.0),
        );
        let pid_gas_flow_cfh = registry.register(
            format!("{path}.gas_flow_cfh"),
            PointKind::Analog,
            "cfh",
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
            capacity_mbh,
            pid_status,
            pid_firing_rate,
            pid_hw_supply_temp,
            pid_hw_setpoint,
            pid_gas_flow_cfh,
            pid_fault,
            firing_rate_pct: 0.0,
            hw_supply_temp_f: 160.0,
        }
    }

    pub fn firing_rate(&self) -> f64 {
        self.firing_rate_pct
    }

    pub fn advance_with_demand(&mut self, ctx: &TickContext, requested_mbh: f64) {
        let registry = ctx.registry;
        let dt = ctx.dt;

        let enabled = matches!(registry.read_by_id(self.pid_status).effective_value, Value::Binary(true));
        let setpoint = registry
            .read_by_id(self.pid_hw_setpoint)
            .effective_value
            .as_f64()
            .unwrap_or(160.0);

        let firing_target = if enabled {
            (requested_mbh / self.capacity_mbh.max(1.0) * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };
        self.firing_rate_pct = first_order(self.firing_rate_pct, firing_target, dt, 45.0);

        let supply_target = if self.firing_rate_pct > 0.0 {
            setpoint - (100.0 - self.firing_rate_pct) * 0.02
        } else {
            setpoint - 20.0 // idle boiler drifts cold
        };
        self.hw_supply_temp_f = first_order(self.hw_supply_temp_f, supply_target, dt, 90.0);

        let efficiency = 0.85 * ctx.params.equipment_efficiency;
        let gas_flow_cfh = if self.firing_rate_pct > 0.0 {
            self.firing_rate_pct / 100.0 * self.capacity_mbh * 1000.0 / LHV_BTU_PER_CF / efficiency.max(0.1)
        } else {
            0.0
        };

        let fault = !self.hw_supply_temp_f.is_finite() || !gas_flow_cfh.is_finite();

        registry
            .write_present(self.pid_firing_rate, self.id, Value::Analog(self.firing_rate_pct))
            .ok();
        registry
            .write_present(self.pid_hw_supply_temp, self.id, Value::Analog(self.hw_supply_temp_f))
            .ok();
        registry
            .write_present(self.pid_gas_flow_cfh, self.id, Value::Analog(gas_flow_cfh))
            .ok();
        registry.write_present(self.pid_fault, self.id, Value::Binary(fault)).ok();
    }
}

impl Advance for Boiler {
    fn advance(&mut self, ctx: &TickContext) {
        self.advance_with_demand(ctx, self.capacity_mbh * 0.3);
    }
}
