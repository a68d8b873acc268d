//! Data center model (spec §4.D): server racks plus CRAC units, an
//! inlet/outlet temperature loop, and a PUE rollup. Grounded in the same
//! first-order thermal response used by the zone/VAV model, applied to a
//! hot-aisle/cold-aisle pair instead of a room.

use crate::equipment::{first_order, Advance, TickContext};
use crate::registry::{EquipmentId, PointId, PointKind, Registry, Value};

pub struct Rack {
    pub id: EquipmentId,
    pub path: String,
    pub capacity_kw: f64,

    pid_load_pct: PointId,
    pid_power_kw: PointId,
    pid_inlet_temp: PointId,
    pid_outlet_temp: PointId,

    power_kw: f64,
    outlet_temp_f: f64,
}

impl Rack {
    pub fn new(registry: &mut Registry, id: EquipmentId, path: String, capacity_kw: f64) -> Self {
        let pid_load_pct = registry.register(
            format!("{path}.load_pct"),
            PointKind::Analog,
            "%",
            true,
            id,
            Value::Analog(40.0),
        );
        let pid_power_kw = registry.register(
            format!("{path}.power_kw"),
            PointKind::Analog,
            "kW",
            false,
            id,
            Value::Analog(0.0),
        );
        let pid_inlet_temp = registry.register(
            format!("{path}.inlet_temp"),
            PointKind::Analog,
            "°F",
            false,
            id,
            Value::Analog(68.0),
        );
        let pid_outlet_temp = registry.register(
            format!("{path}.outlet_temp"),
            PointKind::Analog,
            "°F",
            false,
            id,
            Value::Analog(68.0),
        );

        Self {
            id,
            path,
            capacity_kw,
            pid_load_pct,
            pid_power_kw,
            pid_inlet_temp,
            pid_outlet_temp,
            power_kw: 0.0,
            outlet_temp_f: 68.0,
        }
    }

    pub fn power_kw(&self) -> f64 {
        self.power_kw
    }

    /// Servers draw a non-zero idle floor even at 0% workload (spec §4.D
    /// "server power follows a workload curve, not a linear one").
    pub fn advance(&mut self, ctx: &TickContext, supply_air_temp_f: f64) {
        let registry = ctx.registry;

        let load_pct = registry
            .read_by_id(self.pid_load_pct)
            .effective_value
            .as_f64()
            .unwrap_or(40.0)
            .clamp(0.0, 100.0);

        let target_power = self.capacity_kw * (0.3 + 0.7 * load_pct / 100.0);
        self.power_kw = first_order(self.power_kw, target_power, ctx.dt, 15.0);

        let delta_t_f = self.power_kw / self.capacity_kw.max(0.1) * 25.0;
        let target_outlet = supply_air_temp_f + delta_t_f;
        self.outlet_temp_f = first_order(self.outlet_temp_f, target_outlet, ctx.dt, 30.0);

        registry.write_present(self.pid_power_kw, self.id, Value::Analog(self.power_kw)).ok();
        registry
            .write_present(self.pid_inlet_temp, self.id, Value::Analog(supply_air_temp_f))
            .ok();
        registry
            .write_present(self.pid_outlet_temp, self.id, Value::Analog(self.outlet_temp_f))
            .ok();
    }
}

pub struct Crac {
    pub id: EquipmentId,
    pub path: String,
    pub capacity_tons: f64,

    pid_supply_setpoint: PointId,
    pid_supply_temp: PointId,
    pid_return_temp: PointId,
    pid_cooling_kw: PointId,
    pid_fan_speed: PointId,

    supply_temp_f: f64,
    fan_speed_pct: f64,
}

impl Crac {
    pub fn new(registry: &mut Registry, id: EquipmentId, path: String, capacity_tons: f64) -> Self {
        let pid_supply_setpoint = registry.register(
            format!("{path}.supply_temp_setpoint"),
            PointKind::Analog,
            "°F",
            true,
            id,
            Value::Analog(68.0),
        );
        let pid_supply_temp = registry.register(
            format!("{path}.supply_temp"),
            PointKind::Analog,
            "°F",
            false,
            id,
            Value::Analog(68.0),
        );
        let pid_return_temp = registry.register(
            format!("{path}.return_temp"),
            PointKind::Analog,
            "°F",
            false,
            id,
            Value::Analog(85.0),
        );
        let pid_cooling_kw = registry.register(
            format!("{path}.cooling_kw"),
            PointKind::Analog,
            "kW",
            false,
            id,
            Value::Analog(0.0),
        );
        let pid_fan_speed = registry.register(
            format!("{path}.fan_speed"),
            PointKind::Analog,
            "%",
            false,
            id,
            Value::Analog(50.0),
        );

        Self {
            id,
            path,
            capacity_tons,
            pid_supply_setpoint,
            pid_supply_temp,
            pid_return_temp,
            pid_cooling_kw,
            pid_fan_speed,
            supply_temp_f: 68.0,
            fan_speed_pct: 50.0,
        }
    }

    pub fn supply_temp_f(&self) -> f64 {
        self.supply_temp_f
    }

    pub fn advance(&mut self, ctx: &TickContext, return_air_temp_f: f64, heat_load_kw: f64) {
        let registry = ctx.registry;

        let setpoint = registry
            .read_by_id(self.pid_supply_setpoint)
            .effective_value
            .as_f64()
            .unwrap_or(68.0);

        self.supply_temp_f = first_order(self.supply_temp_f, setpoint, ctx.dt, 20.0);

        let cooling_tons = heat_load_kw * 0.284; // 1 kW ≈ 0.284 tons
        let fan_target = (cooling_tons / self.capacity_tons.max(0.1) * 100.0).clamp(20.0, 100.0);
        self.fan_speed_pct = first_order(self.fan_speed_pct, fan_target, ctx.dt, 15.0);

        let cooling_kw = heat_load_kw * 0.4 / ctx.params.equipment_efficiency.max(0.1); // CRAC compressor + fan draw

        registry
            .write_present(self.pid_supply_temp, self.id, Value::Analog(self.supply_temp_f))
            .ok();
        registry
            .write_present(self.pid_return_temp, self.id, Value::Analog(return_air_temp_f))
            .ok();
        registry.write_present(self.pid_cooling_kw, self.id, Value::Analog(cooling_kw)).ok();
        registry.write_present(self.pid_fan_speed, self.id, Value::Analog(self.fan_speed_pct)).ok();
    }
}

/// Aggregate rollup: `racks` draw IT load, `cracs` reject that heat, and
/// `DataCenter.pue` exposes `(it_kw + cooling_kw) / it_kw` (spec §4.D).
pub struct DataCenter {
    pub path: String,
    pub racks: Vec<Rack>,
    pub cracs: Vec<Crac>,
    id: EquipmentId,

    pid_it_kw: PointId,
    pid_facility_kw: PointId,
    pid_pue: PointId,
}

impl DataCenter {
    pub fn new(registry: &mut Registry, id: EquipmentId, path: String, racks: Vec<Rack>, cracs: Vec<Crac>) -> Self {
        let pid_it_kw = registry.register(format!("{path}.it_kw"), PointKind::Analog, "kW", false, id, Value::Analog(0.0));
        let pid_facility_kw = registry.register(
            format!("{path}.facility_kw"),
            PointKind::Analog,
            "kW",
            false,
            id,
            Value::Analog(0.0),
        );
        let pid_pue = registry.register(format!("{path}.pue"), PointKind::Analog, "", false, id, Value::Analog(1.0));

        Self {
            path,
            racks,
            cracs,
            id,
            pid_it_kw,
            pid_facility_kw,
            pid_pue,
        }
    }

    /// Returns the total facility draw (kW) so the caller can fold it into
    /// the campus electrical load.
    pub fn advance(&mut self, ctx: &TickContext) -> f64 {
        let supply_temp_f = self.cracs.first().map_or(68.0, Crac::supply_temp_f);

        for rack in &mut self.racks {
            rack.advance(ctx, supply_temp_f);
        }

        let it_kw: f64 = self.racks.iter().map(Rack::power_kw).sum();
        let return_air_temp_f = if self.racks.is_empty() {
            supply_temp_f + 15.0
        } else {
            self.racks.iter().map(|r| r.outlet_temp_f).sum::<f64>() / self.racks.len() as f64
        };

        let load_per_crac = it_kw / self.cracs.len().max(1) as f64;
        for crac in &mut self.cracs {
            crac.advance(ctx, return_air_temp_f, load_per_crac);
        }

        let facility_cooling_kw = load_per_crac * 0.4 / ctx.params.equipment_efficiency.max(0.1) * self.cracs.len() as f64;
        let facility_kw = it_kw + facility_cooling_kw;
        let pue = if it_kw > 0.01 { facility_kw / it_kw } else { 1.0 };

        ctx.registry.write_present(self.pid_it_kw, self.id, Value::Analog(it_kw)).ok();
        ctx.registry
            .write_present(self.pid_facility_kw, self.id, Value::Analog(facility_kw))
            .ok();
        ctx.registry.write_present(self.pid_pue, self.id, Value::Analog(pue)).ok();

        facility_kw
    }
}

impl Advance for DataCenter {
    fn advance(&mut self, ctx: &TickContext) {
        DataCenter::advance(self, ctx);
    }
}
