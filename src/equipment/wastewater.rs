//! Wastewater system (spec §4.D): lift station, blowers, clarifier and a
//! UV disinfection stage interlocked on effluent flow.

use crate::equipment::{first_order, Advance, TickContext};
use crate::registry::{EquipmentId, PointId, PointKind, Registry, Value};

pub struct LiftStation {
    pub id: EquipmentId,
    pub path: String,
    pub wet_well_capacity_gal: f64,
    pub pump_capacity_gpm: f64,

    pid_wet_well_level: PointId,
    pid_inflow_gpm: PointId,
    pid_pump_status: PointId,
    pid_discharge_gpm: PointId,

    wet_well_level_pct: f64,
    pump_on: bool,
}

const LIFT_STATION_ON_LEVEL: f64 = 75.0;
const LIFT_STATION_OFF_LEVEL: f64 = 25.0;

impl LiftStation {
    pub fn new(registry: &mut Registry, id: EquipmentId, path: String, wet_well_capacity_gal: f64, pump_capacity_gpm: f64) -> Self {
        let pid_wet_well_level = registry.register(
            format!("{path}.wet_well_level"),
            PointKind::Analog,
            "%",
            false,
            id,
            Value::Analog(40.0),
        );
        let pid_inflow_gpm = registry.register(
            format!("{path}.inflow_gpm"),
            PointKind::Analog,
            "GPM",
            false,
            id,
            Value::Analog(0.0),
        );
        let pid_pump_status = registry.register(
            format!("{path}.pump_status"),
            PointKind::Binary,
            "",
            false,
            id,
            Value::Binary(false),
        );
        let pid_discharge_gpm = registry.register(
            format!("{path}.discharge_gpm"),
            PointKind::Analog,
            "GPM",
            false,
            id,
            Value::Analog(0.0),
        );

        Self {
            id,
            path,
            wet_well_capacity_gal,
            pump_capacity_gpm,
            pid_wet_well_level,
            pid_inflow_gpm,
            pid_pump_status,
            pid_discharge_gpm,
            wet_well_level_pct: 40.0,
            pump_on: false,
        }
    }

    pub fn discharge_gpm(&self) -> f64 {
        if self.pump_on { self.pump_capacity_gpm } else { 0.0 }
    }

    /// `inflow_gpm` is the campus's current wastewater generation rate,
    /// driven by occupancy (higher during occupied building hours).
    pub fn advance(&mut self, ctx: &TickContext, inflow_gpm: f64) {
        self.pump_on = if self.wet_well_level_pct >= LIFT_STATION_ON_LEVEL {
            true
        } else if self.wet_well_level_pct <= LIFT_STATION_OFF_LEVEL {
            false
        } else {
            self.pump_on
        };

        let discharge_gpm = self.discharge_gpm();
        let net_gpm = inflow_gpm - discharge_gpm;
        let level_change_pct = net_gpm * ctx.dt / 60.0 / self.wet_well_capacity_gal.max(1.0) * 100.0;
        self.wet_well_level_pct = (self.wet_well_level_pct + level_change_pct).clamp(0.0, 100.0);

        let registry = ctx.registry;
        registry
            .write_present(self.pid_wet_well_level, self.id, Value::Analog(self.wet_well_level_pct))
            .ok();
        registry.write_present(self.pid_inflow_gpm, self.id, Value::Analog(inflow_gpm)).ok();
        registry.write_present(self.pid_pump_status, self.id, Value::Binary(self.pump_on)).ok();
        registry
            .write_present(self.pid_discharge_gpm, self.id, Value::Analog(discharge_gpm))
            .ok();
    }
}

pub struct Blower {
    pub id: EquipmentId,
    pub path: String,
    pub capacity_scfm: f64,

    pid_do_setpoint: PointId,
    pid_dissolved_oxygen: PointId,
    pid_blower_speed: PointId,
    pid_air_flow: PointId,

    dissolved_oxygen_mg_l: f64,
    blower_speed_pct: f64,
}

impl Blower {
    pub fn new(registry: &mut Registry, id: EquipmentId, path: String, capacity_scfm: f64) -> Self {
        let pid_do_setpoint = registry.register(
            format!("{path}.do_setpoint"),
            PointKind::Analog,
            "mg/L",
            true,
            id,
            Value::Analog(2.0),
        );
        let pid_dissolved_oxygen = registry.register(
            format!("{path}.dissolved_oxygen"),
            PointKind::Analog,
            "mg/L",
            false,
            id,
            Value::Analog(2.0),
        );
        let pid_blower_speed = registry.register(
            format!("{path}.blower_speed"),
            PointKind::Analog,
            "%",
            false,
            id,
            Value::Analog(50.0),
        );
        let pid_air_flow = registry.register(
            format!("{path}.air_flow_scfm"),
            PointKind::Analog,
            "scfm",
            false,
            id,
            Value::Analog(0.0),
        );

        Self {
            id,
            path,
            capacity_scfm,
            pid_do_setpoint,
            pid_dissolved_oxygen,
            pid_blower_speed,
            pid_air_flow,
            dissolved_oxygen_mg_l: 2.0,
            blower_speed_pct: 50.0,
        }
    }

    pub fn advance(&mut self, ctx: &TickContext, loading_frac: f64) {
        let registry = ctx.registry;

        let setpoint = registry
            .read_by_id(self.pid_do_setpoint)
            .effective_value
            .as_f64()
            .unwrap_or(2.0);

        let error = setpoint - self.dissolved_oxygen_mg_l;
        let speed_target = (50.0 + error * 30.0 + loading_frac * 20.0).clamp(20.0, 100.0);
        self.blower_speed_pct = first_order(self.blower_speed_pct, speed_target, ctx.dt, 20.0);

        let do_target = setpoint * (self.blower_speed_pct / speed_target.max(1.0)).clamp(0.5, 1.2) - loading_frac * 0.5;
        self.dissolved_oxygen_mg_l = first_order(self.dissolved_oxygen_mg_l, do_target.max(0.0), ctx.dt, 90.0);

        let air_flow_scfm = self.capacity_scfm * self.blower_speed_pct / 100.0;

        registry
            .write_present(self.pid_dissolved_oxygen, self.id, Value::Analog(self.dissolved_oxygen_mg_l))
            .ok();
        registry
            .write_present(self.pid_blower_speed, self.id, Value::Analog(self.blower_speed_pct))
            .ok();
        registry.write_present(self.pid_air_flow, self.id, Value::Analog(air_flow_scfm)).ok();
    }
}

pub struct Clarifier {
    pub id: EquipmentId,
    pub path: String,
    pub capacity_gpm: f64,

    pid_influent_flow: PointId,
    pid_sludge_blanket: PointId,
    pid_effluent_turbidity: PointId,

    sludge_blanket_ft: f64,
}

impl Clarifier {
    pub fn new(registry: &mut Registry, id: EquipmentId, path: String, capacity_gpm: f64) -> Self {
        let pid_influent_flow = registry.register(
            format!("{path}.influent_flow_gpm"),
            PointKind::Analog,
            "GPM",
            false,
            id,
            Value::Analog(0.0),
        );
        let pid_sludge_blanket = registry.register(
            format!("{path}.sludge_blanket_ft"),
            PointKind::Analog,
            "ft",
            false,
            id,
            Value::Analog(1.0),
        );
        let pid_effluent_turbidity = registry.register(
            format!("{path}.effluent_turbidity"),
            PointKind::Analog,
            "NTU",
            false,
            id,
            Value::Analog(2.0),
        );

        Self {
            id,
            path,
            capacity_gpm,
            pid_influent_flow,
            pid_sludge_blanket,
            pid_effluent_turbidity,
            sludge_blanket_ft: 1.0,
        }
    }

    /// Sludge blanket integrates loading minus a fixed wasting rate; heavy
    /// loading (over design flow) raises blanket depth and turbidity.
    pub fn advance(&mut self, ctx: &TickContext, influent_gpm: f64) -> f64 {
        let loading_frac = (influent_gpm / self.capacity_gpm.max(1.0)).clamp(0.0, 2.0);
        let wasting_rate_ft_per_hr = 0.3;
        let accumulation_ft_per_hr = loading_frac * 0.4;
        self.sludge_blanket_ft =
            (self.sludge_blanket_ft + (accumulation_ft_per_hr - wasting_rate_ft_per_hr) * ctx.dt / 3600.0).clamp(0.5, 8.0);

        let turbidity = 1.5 + (self.sludge_blanket_ft - 2.0).max(0.0) * 3.0 + (loading_frac - 1.0).max(0.0) * 5.0;

        let registry = ctx.registry;
        registry
            .write_present(self.pid_influent_flow, self.id, Value::Analog(influent_gpm))
            .ok();
        registry
            .write_present(self.pid_sludge_blanket, self.id, Value::Analog(self.sludge_blanket_ft))
            .ok();
        registry
            .write_present(self.pid_effluent_turbidity, self.id, Value::Analog(turbidity))
            .ok();

        loading_frac
    }
}

const UV_MIN_FLOW_GPM: f64 = 10.0;

pub struct UvSystem {
    pub id: EquipmentId,
    pub path: String,

    pid_status: PointId,
    pid_dose: PointId,
    pid_lamp_hours: PointId,

    lamp_hours: f64,
}

impl UvSystem {
    pub fn new(registry: &mut Registry, id: EquipmentId, path: String) -> Self {
        let pid_status = registry.register(
            format!("{path}.status"),
            PointKind::Binary,
            "",
            false,
            id,
            Value::Binary(false),
        );
        let pid_dose = registry.register(
            format!("{path}.dose_mj_cm2"),
            PointKind::Analog,
            "mJ/cm2",
            false,
            id,
            Value::Analog(0.0),
        );
        let pid_lamp_hours = registry.register(
            format!("{path}.lamp_hours"),
            PointKind::Analog,
            "hr",
            false,
            id,
            Value::Analog(0.0),
        );

        Self { id, path, pid_status, pid_dose, pid_lamp_hours, lamp_hours: 0.0 }
    }

    /// Runs only while effluent flow clears the minimum (spec §4.D: "UV
    /// status interlocked with effluent flow" — no flow, no disinfection,
    /// regardless of any override attempting to force it on since this
    /// point is not writable).
    pub fn advance(&mut self, ctx: &TickContext, effluent_gpm: f64) {
        let running = effluent_gpm >= UV_MIN_FLOW_GPM;
        if running {
            self.lamp_hours += ctx.dt / 3600.0;
        }
        let dose = if running { 30.0 } else { 0.0 };

        let registry = ctx.registry;
        registry.write_present(self.pid_status, self.id, Value::Binary(running)).ok();
        registry.write_present(self.pid_dose, self.id, Value::Analog(dose)).ok();
        registry
            .write_present(self.pid_lamp_hours, self.id, Value::Analog(self.lamp_hours))
            .ok();
    }
}

pub struct WastewaterPlant {
    pub lift_station: LiftStation,
    pub blowers: Vec<Blower>,
    pub clarifier: Clarifier,
    pub uv: UvSystem,

    id: EquipmentId,
    pid_total_kw: PointId,
    total_kw: f64,
}

impl WastewaterPlant {
    pub fn new(
        registry: &mut Registry,
        id: EquipmentId,
        lift_station: LiftStation,
        blowers: Vec<Blower>,
        clarifier: Clarifier,
        uv: UvSystem,
    ) -> Self {
        let pid_total_kw = registry.register(
            "Wastewater.total_kw".to_string(),
            PointKind::Analog,
            "kW",
            false,
            id,
            Value::Analog(0.0),
        );
        Self { lift_station, blowers, clarifier, uv, id, pid_total_kw, total_kw: 0.0 }
    }

    /// Returns the plant's electrical draw (kW) for the campus rollup
    /// (spec §4.D Electrical: "main meter sums downstream draws ... +
    /// wastewater").
    pub fn advance(&mut self, ctx: &TickContext, inflow_gpm: f64) -> f64 {
        self.lift_station.advance(ctx, inflow_gpm);
        let discharge_gpm = self.lift_station.discharge_gpm();

        let loading_frac = self.clarifier.advance(ctx, discharge_gpm);
        for blower in &mut self.blowers {
            blower.advance(ctx, loading_frac);
        }

        self.uv.advance(ctx, discharge_gpm);

        let pump_kw = if self.lift_station.discharge_gpm() > 0.0 { self.lift_station.pump_capacity_gpm * 0.03 } else { 0.0 };
        let blower_kw: f64 = self.blowers.iter().map(|b| b.capacity_scfm * 0.0002).sum();
        self.total_kw = pump_kw + blower_kw;
        ctx.registry.write_present(self.pid_total_kw, self.id, Value::Analog(self.total_kw)).ok();
        self.total_kw
    }
}

impl Advance for WastewaterPlant {
    fn advance(&mut self, ctx: &TickContext) {
        WastewaterPlant::advance(self, ctx, self.lift_station.pump_capacity_gpm * 0.4);
    }
}
