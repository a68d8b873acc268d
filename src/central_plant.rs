//! Central Plant (spec §3 "Topology", §4.D "Chiller"): chillers, boilers,
//! cooling towers and the named CHW/HW/CW pump loops, plus the chiller
//! staging sequencer the individual `Chiller` model defers to its owner for
//! (spec §4.D: "(E) assigns a rank; the plant staging rule enables chiller
//! N+1 when N at ≥90% for ≥5 minutes of sim time, disables N when total
//! load ≤ (N−1)×80%").

use crate::equipment::boiler::Boiler;
use crate::equipment::chiller::Chiller;
use crate::equipment::pump::Pump;
use crate::equipment::tower::CoolingTower;
use crate::equipment::TickContext;
use crate::registry::{EquipmentId, PointId, PointKind, Registry, Value};

const STAGE_UP_LOAD_PCT: f64 = 90.0;
const STAGE_UP_HOLD_S: f64 = 300.0;
const STAGE_DOWN_FRACTION: f64 = 0.8;

pub struct CentralPlant {
    pub chillers: Vec<Chiller>,
    pub boilers: Vec<Boiler>,
    pub towers: Vec<CoolingTower>,
    pub chw_pump: Pump,
    pub hw_pump: Pump,
    pub cw_pump: Pump,

    id: EquipmentId,
    pid_chw_supply_temp: PointId,
    pid_plant_kw: PointId,
    pid_total_tons: PointId,
    pid_total_mbh: PointId,

    enabled_chillers: usize,
}

impl CentralPlant {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: &mut Registry,
        id: EquipmentId,
        chillers: Vec<Chiller>,
        boilers: Vec<Boiler>,
        towers: Vec<CoolingTower>,
        chw_pump: Pump,
        hw_pump: Pump,
        cw_pump: Pump,
    ) -> Self {
        let pid_chw_supply_temp = registry.register(
            "CentralPlant.CHW_supply_temp".to_string(),
            PointKind::Analog,
            "°F",
            false,
            id,
            Value::Analog(44.0),
        );
        let pid_plant_kw = registry.register(
            "CentralPlant.plant_kw".to_string(),
            PointKind::Analog,
            "kW",
            false,
            id,
            Value::Analog(0.0),
        );
        let pid_total_tons = registry.register(
            "CentralPlant.total_tons".to_string(),
            PointKind::Analog,
            "tons",
            false,
            id,
            Value::Analog(0.0),
        );
        let pid_total_mbh = registry.register(
            "CentralPlant.total_mbh".to_string(),
            PointKind::Analog,
            "MBH",
            false,
            id,
            Value::Analog(0.0),
        );

        Self {
            chillers,
            boilers,
            towers,
            chw_pump,
            hw_pump,
            cw_pump,
            id,
            pid_chw_supply_temp,
            pid_plant_kw,
            pid_total_tons,
            pid_total_mbh,
            enabled_chillers: 1,
        }
    }

    /// `demand_tons`/`demand_mbh` are the campus's current cooling/heating
    /// requirements, aggregated from the building layer. Returns the
    /// plant's total electrical draw (kW) for the electrical rollup.
    pub fn advance(&mut self, ctx: &TickContext, demand_tons: f64, demand_mbh: f64) -> f64 {
        self.stage_chillers(ctx.registry, demand_tons);

        let n = self.enabled_chillers.min(self.chillers.len()).max(1);
        let available = self.chillers[..n].iter().filter(|c| !c.forced_off(ctx.registry)).count().max(1);
        let per_unit_tons = demand_tons / available as f64;

        for (i, chiller) in self.chillers.iter_mut().enumerate() {
            let commanded_on = i < n && demand_tons > 0.01;
            let requested = if commanded_on && !chiller.forced_off(ctx.registry) { per_unit_tons } else { 0.0 };
            chiller.advance_with_demand(ctx, commanded_on, requested);
        }

        let active_boilers = self.boilers.len().max(1);
        let per_boiler_mbh = demand_mbh / active_boilers as f64;
        for boiler in &mut self.boilers {
            boiler.advance_with_demand(ctx, per_boiler_mbh);
        }

        for (i, tower) in self.towers.iter_mut().enumerate() {
            let chiller_load_tons = self
                .chillers
                .get(i)
                .map(|c| c.load_percent() / 100.0 * c.capacity_tons)
                .unwrap_or(0.0);
            tower.advance_with_load(ctx, chiller_load_tons);
        }

        let total_load_frac = (demand_tons / self.total_chiller_capacity().max(1.0)).clamp(0.0, 1.2);
        self.chw_pump.advance_with_demand(ctx, total_load_frac);

        let heat_load_frac = (demand_mbh / self.total_boiler_capacity().max(1.0)).clamp(0.0, 1.2);
        self.hw_pump.advance_with_demand(ctx, heat_load_frac);
        self.cw_pump.advance_with_demand(ctx, total_load_frac);

        let chw_supply_avg = if n == 0 {
            44.0
        } else {
            self.chillers[..n].iter().map(|c| ctx.registry.read(&format!("{}.chw_supply_temp", c.path)))
                .filter_map(|r| r.ok().and_then(|r| r.effective_value.as_f64()))
                .sum::<f64>()
                / n as f64
        };
        let plant_kw: f64 = self
            .chillers
            .iter()
            .filter_map(|c| ctx.registry.read(&format!("{}.kw", c.path)).ok().and_then(|r| r.effective_value.as_f64()))
            .sum::<f64>()
            + ctx.registry.read(&format!("{}.kw", self.chw_pump.path)).ok().and_then(|r| r.effective_value.as_f64()).unwrap_or(0.0)
            + ctx.registry.read(&format!("{}.kw", self.hw_pump.path)).ok().and_then(|r| r.effective_value.as_f64()).unwrap_or(0.0)
            + ctx.registry.read(&format!("{}.kw", self.cw_pump.path)).ok().and_then(|r| r.effective_value.as_f64()).unwrap_or(0.0);

        ctx.registry
            .write_present(self.pid_chw_supply_temp, self.id, Value::Analog(chw_supply_avg))
            .ok();
        ctx.registry.write_present(self.pid_plant_kw, self.id, Value::Analog(plant_kw)).ok();
        ctx.registry
            .write_present(self.pid_total_tons, self.id, Value::Analog(demand_tons))
            .ok();
        ctx.registry.write_present(self.pid_total_mbh, self.id, Value::Analog(demand_mbh)).ok();

        plant_kw
    }

    fn total_chiller_capacity(&self) -> f64 {
        self.chillers.iter().map(|c| c.capacity_tons).sum()
    }

    fn total_boiler_capacity(&self) -> f64 {
        self.boilers.iter().map(|b| b.capacity_mbh).sum()
    }

    fn stage_chillers(&mut self, registry: &Registry, demand_tons: f64) {
        let n = self.enabled_chillers.min(self.chillers.len()).max(1);

        if n < self.chillers.len() {
            // Promote the backup immediately if any already-enabled chiller
            // is held off by an operator/protocol override (e.g. a trip) —
            // an unavailable lead never reaches the overload threshold
            // below, since its own demand share collapses to zero.
            let lead_unavailable = self.chillers[..n].iter().any(|c| c.forced_off(registry));
            let lead_overloaded = self.chillers.get(n - 1).is_some_and(|c| c.time_above_90 >= STAGE_UP_HOLD_S);
            if lead_unavailable || lead_overloaded {
                self.enabled_chillers = n + 1;
                return;
            }
        }

        if n > 1 {
            let lower_capacity: f64 = self.chillers[..n - 1].iter().map(|c| c.capacity_tons).sum();
            if demand_tons <= lower_capacity * STAGE_DOWN_FRACTION {
                self.enabled_chillers = n - 1;
            }
        }
    }
}
