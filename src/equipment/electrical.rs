//! Electrical system: main meter, solar array, UPS, generator and a
//! distribution transformer (spec §4.D). Grounded in the teacher's
//! `AppState::set_data` formulas for power factor / reactive power /
//! voltage synthesis and the `solar_algorithm` temperature-derate curve,
//! generalized from one inverter to a campus meter plus a PV array.

use crate::equipment::{first_order, Advance, TickContext};
use crate::registry::{EquipmentId, PointId, PointKind, Registry, Value};

// ─── Solar array ──────────────────────────────────────────────────────────

pub struct SolarArray {
    pub id: EquipmentId,
    pub path: String,
    pub capacity_kw: f64,
    pid_output_kw: PointId,
    pid_panel_temp: PointId,
    output_kw: f64,
    panel_temp_f: f64,
}

fn temp_derate(panel_temp_f: f64) -> f64 {
    // ~0.4%/°C above 25°C (77°F) STC, a standard crystalline-silicon derate.
    let over_f = (panel_temp_f - 77.0).max(0.0);
    (1.0 - over_f * (0.4 / 1.8) / 100.0).clamp(0.6, 1.0)
}

impl SolarArray {
    pub fn new(registry: &mut Registry, id: EquipmentId, path: String, capacity_kw: f64) -> Self {
        let pid_output_kw = registry.register(
            format!("{path}.output_kw"),
            PointKind::Analog,
            "kW",
            false,
            id,
            Value::Analog(0.0),
        );
        let pid_panel_temp = registry.register(
            format!("{path}.panel_temp"),
            PointKind::Analog,
            "°F",
            false,
            id,
            Value::Analog(77.0),
        );
        Self {
            id,
            path,
            capacity_kw,
            pid_output_kw,
            pid_panel_temp,
            output_kw: 0.0,
            panel_temp_f: 77.0,
        }
    }

    pub fn advance(&mut self, ctx: &TickContext) -> f64 {
        let target_panel_temp = ctx.weather.oat_f + ctx.weather.solar_irradiance_w_m2 / 1000.0 * 35.0;
        self.panel_temp_f = first_order(self.panel_temp_f, target_panel_temp, ctx.dt, 120.0);

        let irr_frac = (ctx.weather.solar_irradiance_w_m2 / 1000.0).clamp(0.0, 1.0);
        let target_output = self.capacity_kw * irr_frac * temp_derate(self.panel_temp_f);
        self.output_kw = first_order(self.output_kw, target_output, ctx.dt, 10.0);

        ctx.registry
            .write_present(self.pid_output_kw, self.id, Value::Analog(self.output_kw))
            .ok();
        ctx.registry
            .write_present(self.pid_panel_temp, self.id, Value::Analog(self.panel_temp_f))
            .ok();
        self.output_kw
    }
}

// ─── UPS ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsState {
    Online,
    OnBattery,
    Depleted,
}

impl UpsState {
    fn code(self) -> u32 {
        match self {
            UpsState::Online => 0,
            UpsState::OnBattery => 1,
            UpsState::Depleted => 2,
        }
    }
}

pub struct Ups {
    pub id: EquipmentId,
    pub path: String,
    pub capacity_kwh: f64,
    pid_status: PointId,
    pid_battery_pct: PointId,
    pid_load_kw: PointId,
    state: UpsState,
    battery_pct: f64,
}

impl Ups {
    pub fn new(registry: &mut Registry, id: EquipmentId, path: String, capacity_kwh: f64) -> Self {
        let pid_status = registry.register(
            format!("{path}.status"),
            PointKind::MultiState,
            "",
            false,
            id,
            Value::MultiState(UpsState::Online.code()),
        );
        let pid_battery_pct = registry.register(
            format!("{path}.battery_pct"),
            PointKind::Analog,
            "%",
            false,
            id,
            Value::Analog(100.0),
        );
        let pid_load_kw = registry.register(
            format!("{path}.load_kw"),
            PointKind::Analog,
            "kW",
            false,
            id,
            Value::Analog(0.0),
        );
        Self {
            id,
            path,
            capacity_kwh,
            pid_status,
            pid_battery_pct,
            pid_load_kw,
            state: UpsState::Online,
            battery_pct: 100.0,
        }
    }

    pub fn state(&self) -> UpsState {
        self.state
    }

    pub fn advance(&mut self, ctx: &TickContext, grid_up: bool, critical_load_kw: f64) {
        self.state = match self.state {
            UpsState::Online if !grid_up => UpsState::OnBattery,
            UpsState::OnBattery if grid_up => UpsState::Online,
            UpsState::OnBattery if self.battery_pct <= 0.0 => UpsState::Depleted,
            UpsState::Depleted if grid_up => UpsState::Online,
            other => other,
        };

        match self.state {
            UpsState::OnBattery => {
                let drain_pct = critical_load_kw / self.capacity_kwh.max(0.1) / 3600.0 * ctx.dt * 100.0;
                self.battery_pct = (self.battery_pct - drain_pct).max(0.0);
            }
            UpsState::Online => {
                let charge_pct = 0.05 * ctx.dt; // slow trickle recharge
                self.battery_pct = (self.battery_pct + charge_pct).min(100.0);
            }
            UpsState::Depleted => {}
        }

        let load_kw = if matches!(self.state, UpsState::OnBattery) { critical_load_kw } else { 0.0 };

        ctx.registry
            .write_present(self.pid_status, self.id, Value::MultiState(self.state.code()))
            .ok();
        ctx.registry
            .write_present(self.pid_battery_pct, self.id, Value::Analog(self.battery_pct))
            .ok();
        ctx.registry.write_present(self.pid_load_kw, self.id, Value::Analog(load_kw)).ok();
    }
}

// ─── Generator ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Off,
    Starting,
    Running,
    Cooldown,
}

impl GeneratorState {
    fn code(self) -> u32 {
        match self {
            GeneratorState::Off => 0,
            GeneratorState::Starting => 1,
            GeneratorState::Running => 2,
            GeneratorState::Cooldown => 3,
        }
    }
}

const GENERATOR_MIN_RUNTIME_S: f64 = 60.0;
const GRID_LOSS_START_DELAY_S: f64 = 10.0;

pub struct Generator {
    pub id: EquipmentId,
    pub path: String,
    pub capacity_kw: f64,
    pid_status: PointId,
    pid_output_kw: PointId,
    pid_fuel_pct: PointId,
    state: GeneratorState,
    time_in_state: f64,
    grid_loss_duration: f64,
    output_kw: f64,
    fuel_pct: f64,
}

impl Generator {
    pub fn new(registry: &mut Registry, id: EquipmentId, path: String, capacity_kw: f64) -> Self {
        let pid_status = registry.register(
            format!("{path}.status"),
            PointKind::MultiState,
            "",
            false,
            id,
            Value::MultiState(GeneratorState::Off.code()),
        );
        let pid_output_kw = registry.register(
            format!("{path}.output_kw"),
            PointKind::Analog,
            "kW",
            false,
            id,
            Value::Analog(0.0),
        );
        let pid_fuel_pct = registry.register(
            format!("{path}.fuel_level_pct"),
            PointKind::Analog,
            "%",
            false,
            id,
            Value::Analog(100.0),
        );
        Self {
            id,
            path,
            capacity_kw,
            pid_status,
            pid_output_kw,
            pid_fuel_pct,
            state: GeneratorState::Off,
            time_in_state: 0.0,
            grid_loss_duration: 0.0,
            output_kw: 0.0,
            fuel_pct: 100.0,
        }
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    pub fn output_kw(&self) -> f64 {
        self.output_kw
    }

    pub fn advance(&mut self, ctx: &TickContext, grid_up: bool, demand_kw: f64) {
        let dt = ctx.dt;
        self.grid_loss_duration = if grid_up { 0.0 } else { self.grid_loss_duration + dt };
        self.time_in_state += dt;

        // Cranking starts the instant the grid drops, and `grid_loss_duration`
        // (not `time_in_state`, which is reserved for post-start state
        // durations below) is the crank clock: the 10s crank time is the
        // grid-loss-to-running threshold itself (spec §4.D), not an extra
        // delay layered on top of it.
        self.state = match self.state {
            GeneratorState::Off if !grid_up => GeneratorState::Starting,
            GeneratorState::Starting if grid_up => GeneratorState::Off,
            GeneratorState::Starting if self.grid_loss_duration >= GRID_LOSS_START_DELAY_S => {
                self.time_in_state = 0.0;
                GeneratorState::Running
            }
            GeneratorState::Running if grid_up && self.time_in_state >= GENERATOR_MIN_RUNTIME_S => {
                self.time_in_state = 0.0;
                GeneratorState::Cooldown
            }
            GeneratorState::Cooldown if self.time_in_state >= GENERATOR_MIN_RUNTIME_S => {
                self.time_in_state = 0.0;
                GeneratorState::Off
            }
            other => other,
        };

        let target_output = match self.state {
            GeneratorState::Running => demand_kw.min(self.capacity_kw),
            _ => 0.0,
        };
        self.output_kw = first_order(self.output_kw, target_output, dt, 4.0);

        if self.output_kw > 0.1 {
            let fuel_burn_pct = self.output_kw / self.capacity_kw.max(0.1) * dt / 3600.0 * 8.0;
            self.fuel_pct = (self.fuel_pct - fuel_burn_pct).max(0.0);
        }

        ctx.registry
            .write_present(self.pid_status, self.id, Value::MultiState(self.state.code()))
            .ok();
        ctx.registry
            .write_present(self.pid_output_kw, self.id, Value::Analog(self.output_kw))
            .ok();
        ctx.registry
            .write_present(self.pid_fuel_pct, self.id, Value::Analog(self.fuel_pct))
            .ok();
    }
}

// ─── Distribution transformer ───────────────────────────────────────────────

pub struct Transformer {
    pub id: EquipmentId,
    pub path: String,
    pub rating_kva: f64,
    pid_load_pct: PointId,
    pid_losses_kw: PointId,
}

impl Transformer {
    pub fn new(registry: &mut Registry, id: EquipmentId, path: String, rating_kva: f64) -> Self {
        let pid_load_pct = registry.register(
            format!("{path}.load_pct"),
            PointKind::Analog,
            "%",
            false,
            id,
            Value::Analog(0.0),
        );
        let pid_losses_kw = registry.register(
            format!("{path}.losses_kw"),
            PointKind::Analog,
            "kW",
            false,
            id,
            Value::Analog(0.0),
        );
        Self { id, path, rating_kva, pid_load_pct, pid_losses_kw }
    }

    pub fn advance(&mut self, registry: &Registry, through_kw: f64) {
        let load_pct = (through_kw / self.rating_kva.max(1.0) * 100.0).clamp(0.0, 150.0);
        let core_loss_kw = self.rating_kva * 0.003;
        let copper_loss_kw = self.rating_kva * 0.01 * (load_pct / 100.0).powi(2);
        registry.write_present(self.pid_load_pct, self.id, Value::Analog(load_pct)).ok();
        registry
            .write_present(self.pid_losses_kw, self.id, Value::Analog(core_loss_kw + copper_loss_kw))
            .ok();
    }
}

// ─── Main meter ───────────────────────────────────────────────────────────

pub struct MainMeter {
    pub id: EquipmentId,
    pub path: String,
    pid_grid_connected: PointId,
    pid_kw: PointId,
    pid_kva: PointId,
    pid_pf: PointId,
    pid_voltage_a: PointId,
    pid_voltage_b: PointId,
    pid_voltage_c: PointId,
    pid_freq: PointId,
    pid_kwh_total: PointId,
    kwh_total: f64,
}

impl MainMeter {
    pub fn new(registry: &mut Registry, id: EquipmentId, path: String) -> Self {
        let pid_grid_connected = registry.register(
            format!("{path}.grid_connected"),
            PointKind::Binary,
            "",
            true,
            id,
            Value::Binary(true),
        );
        let pid_kw = registry.register(format!("{path}.kw"), PointKind::Analog, "kW", false, id, Value::Analog(0.0));
        let pid_kva = registry.register(format!("{path}.kva"), PointKind::Analog, "kVA", false, id, Value::Analog(0.0));
        let pid_pf = registry.register(format!("{path}.pf"), PointKind::Analog, "", false, id, Value::Analog(0.98));
        let pid_voltage_a = registry.register(
            format!("{path}.voltage_a"),
            PointKind::Analog,
            "V",
            false,
            id,
            Value::Analog(277.0),
        );
        let pid_voltage_b = registry.register(
            format!("{path}.voltage_b"),
            PointKind::Analog,
            "V",
            false,
            id,
            Value::Analog(277.0),
        );
        let pid_voltage_c = registry.register(
            format!("{path}.voltage_c"),
            PointKind::Analog,
            "V",
            false,
            id,
            Value::Analog(277.0),
        );
        let pid_freq = registry.register(format!("{path}.freq"), PointKind::Analog, "Hz", false, id, Value::Analog(60.0));
        let pid_kwh_total = registry.register(
            format!("{path}.kwh_total"),
            PointKind::Analog,
            "kWh",
            false,
            id,
            Value::Analog(0.0),
        );

        Self {
            id,
            path,
            pid_grid_connected,
            pid_kw,
            pid_kva,
            pid_pf,
            pid_voltage_a,
            pid_voltage_b,
            pid_voltage_c,
            pid_freq,
            pid_kwh_total,
            kwh_total: 0.0,
        }
    }

    pub fn grid_up(&self, registry: &Registry) -> bool {
        matches!(registry.read_by_id(self.pid_grid_connected).effective_value, Value::Binary(true))
    }

    pub fn advance(&mut self, ctx: &TickContext, grid_up: bool, import_kw: f64) {
        let registry = ctx.registry;
        let pf = 0.95 + 0.03 * (1.0 - (-import_kw / 500.0).exp()).min(1.0);
        let kva = if pf > 0.0 { import_kw / pf } else { import_kw };
        let noise = (import_kw * 0.013).sin() * 1.2;
        let freq_noise = if ctx.weather.brownout { -0.4 } else { 0.0 };

        self.kwh_total += import_kw.max(0.0) * ctx.dt / 3600.0;

        registry.write_present(self.pid_grid_connected, self.id, Value::Binary(true)).ok();
        registry.write_present(self.pid_kw, self.id, Value::Analog(import_kw)).ok();
        registry.write_present(self.pid_kva, self.id, Value::Analog(kva)).ok();
        registry.write_present(self.pid_pf, self.id, Value::Analog(pf)).ok();
        registry
            .write_present(self.pid_voltage_a, self.id, Value::Analog(if grid_up { 277.0 + noise } else { 0.0 }))
            .ok();
        registry
            .write_present(self.pid_voltage_b, self.id, Value::Analog(if grid_up { 277.0 - noise } else { 0.0 }))
            .ok();
        registry
            .write_present(self.pid_voltage_c, self.id, Value::Analog(if grid_up { 277.0 + noise * 0.5 } else { 0.0 }))
            .ok();
        registry
            .write_present(self.pid_freq, self.id, Value::Analog(if grid_up { 60.0 + freq_noise } else { 0.0 }))
            .ok();
        registry
            .write_present(self.pid_kwh_total, self.id, Value::Analog(self.kwh_total))
            .ok();
    }
}

// ─── Aggregate system ───────────────────────────────────────────────────────

pub struct ElectricalSystem {
    pub solar: SolarArray,
    pub ups: Ups,
    pub generator: Generator,
    pub transformer: Transformer,
    pub meter: MainMeter,
    last_total_kw: f64,
}

impl ElectricalSystem {
    pub fn new(registry: &mut Registry, ids: [EquipmentId; 5], path_prefix: &str, solar_kw: f64, ups_kwh: f64, gen_kw: f64, xfmr_kva: f64) -> Self {
        Self {
            solar: SolarArray::new(registry, ids[0], format!("{path_prefix}.Solar"), solar_kw),
            ups: Ups::new(registry, ids[1], format!("{path_prefix}.UPS"), ups_kwh),
            generator: Generator::new(registry, ids[2], format!("{path_prefix}.Generator"), gen_kw),
            transformer: Transformer::new(registry, ids[3], format!("{path_prefix}.Transformer"), xfmr_kva),
            meter: MainMeter::new(registry, ids[4], format!("{path_prefix}.MainMeter")),
            last_total_kw: 0.0,
        }
    }

    /// Advance every electrical sub-component, given the aggregate
    /// downstream draw for this tick (spec §4.D Electrical: "main meter
    /// sums downstream draws ... minus solar_output").
    pub fn advance_with_total(&mut self, ctx: &TickContext, total_draw_kw: f64) {
        let grid_up = self.meter.grid_up(ctx.registry);
        let solar_kw = self.solar.advance(ctx);

        let critical_load_kw = total_draw_kw * 0.2;
        self.ups.advance(ctx, grid_up, critical_load_kw);
        self.generator.advance(ctx, grid_up, self.last_total_kw);

        let served_by_generator = self.generator.output_kw();
        let import_kw = if grid_up {
            (total_draw_kw - solar_kw).max(0.0)
        } else {
            (total_draw_kw - solar_kw - served_by_generator).max(0.0)
        };

        self.meter.advance(ctx, grid_up, import_kw);
        self.transformer.advance(ctx.registry, total_draw_kw);
        self.last_total_kw = total_draw_kw;
    }
}

impl Advance for ElectricalSystem {
    fn advance(&mut self, ctx: &TickContext) {
        // Standalone single-system advance (used by tests); a real campus
        // advances electrical through `Campus`, which supplies the actual
        // aggregate downstream draw.
        self.advance_with_total(ctx, self.last_total_kw.max(50.0));
    }
}
