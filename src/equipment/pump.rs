//! Pump model (spec §4.D) — speed command honored, flow from a curve,
//! head from downstream demand, kW from the fan/pump affinity laws.

use crate::equipment::{first_order, Advance, TickContext};
use crate::registry::{EquipmentId, PointId, PointKind, Registry, Value};

pub struct Pump {
    pub id: EquipmentId,
    pub path: String,
    pub loop_name: String,
    pub rated_gpm: f64,
    pub rated_head_ft: f64,
    pub rated_kw: f64,

    pid_speed_command: PointId,
    pid_speed: PointId,
    pid_flow_gpm: PointId,
    pid_head_ft: PointId,
    pid_kw: PointId,

    speed_pct: f64,
}

impl Pump {
    pub fn new(
        registry: &mut Registry,
        id: EquipmentId,
        path: String,
        loop_name: String,
        rated_gpm: f64,
        rated_head_ft: f64,
        rated_kw: f64,
    ) -> Self {
        let pid_speed_command = registry.register(
            format!("{path}.speed_command"),
            PointKind::Analog,
            "%",
            true,
            id,
            Value::Analog(0.0),
        );
        let pid_speed = registry.register(
            format!("{path}.speed"),
            PointKind::Analog,
            "%",
            false,
            id,
            Value::Analog(0.0),
        );
        let pid_flow_gpm = registry.register(
            format!("{path}.flow_gpm"),
            PointKind::Analog,
            "GPM",
            false,
            id,
            Value::Analog(0.0),
        );
        let pid_head_ft = registry.register(
            format!("{path}.head_ft"),
            PointKind::Analog,
            "ft",
            false,
            id,
            Value::Analog(0.0),
        );
        let pid_kw = registry.register(format!("{path}.kw"), PointKind::Analog, "kW", false, id, Value::Analog(0.0));

        Self {
            id,
            path,
            loop_name,
            rated_gpm,
            rated_head_ft,
            rated_kw,
            pid_speed_command,
            pid_speed,
            pid_flow_gpm,
            pid_head_ft,
            pid_kw,
            speed_pct: 0.0,
        }
    }

    /// `demand_frac` is the downstream loop's fraction of design flow
    /// (e.g. a chiller's load fraction), used to back out head. Writes its
    /// own auto-sequenced command first so an operator override on
    /// `speed_command` takes effect on reread, same as every other model.
    pub fn advance_with_demand(&mut self, ctx: &TickContext, demand_frac: f64) {
        let registry = ctx.registry;
        let dt = ctx.dt;

        let auto_speed = (demand_frac * 100.0).clamp(0.0, 100.0);
        registry.write_present(self.pid_speed_command, self.id, Value::Analog(auto_speed)).ok();

        let speed_command = registry
            .read_by_id(self.pid_speed_command)
            .effective_value
            .as_f64()
            .unwrap_or(auto_speed)
            .clamp(0.0, 100.0);

        self.speed_pct = first_order(self.speed_pct, speed_command, dt, 10.0);
        let speed_frac = self.speed_pct / 100.0;

        // Pump affinity laws: flow ~ speed, head ~ speed^2, kW ~ speed^3.
        let flow_gpm = self.rated_gpm * speed_frac * demand_frac.clamp(0.0, 1.2);
        let head_ft = self.rated_head_ft * speed_frac.powi(2);
        let kw = self.rated_kw * speed_frac.powi(3) * ctx.params.equipment_efficiency.recip().max(0.5);

        registry.write_present(self.pid_speed, self.id, Value::Analog(self.speed_pct)).ok();
        registry.write_present(self.pid_flow_gpm, self.id, Value::Analog(flow_gpm)).ok();
        registry.write_present(self.pid_head_ft, self.id, Value::Analog(head_ft)).ok();
        registry.write_present(self.pid_kw, self.id, Value::Analog(kw)).ok();
    }
}

impl Advance for Pump {
    fn advance(&mut self, ctx: &TickContext) {
        self.advance_with_demand(ctx, 1.0);
    }
}
