//! Campus assembler and tick orchestrator (spec §4.E, §4.F). Builds the
//! whole equipment topology from a [`CampusSize`] profile, registers every
//! point, and drives the dependency-ordered per-tick advance.

use std::sync::{Arc, RwLock};

use chrono::{Datelike, Timelike};

use crate::central_plant::CentralPlant;
use crate::clock::Clock;
use crate::config::{CampusSize, Config, PhysicsParameters, UnitSystem};
use crate::equipment::ahu::Ahu;
use crate::equipment::boiler::Boiler;
use crate::equipment::chiller::Chiller;
use crate::equipment::datacenter::{Crac, DataCenter, Rack};
use crate::equipment::electrical::ElectricalSystem;
use crate::equipment::pump::Pump;
use crate::equipment::tower::CoolingTower;
use crate::equipment::vavzone::VavZone;
use crate::equipment::wastewater::{Blower, Clarifier, LiftStation, UvSystem, WastewaterPlant};
use crate::equipment::{Advance, TickContext};
use crate::error::{BasimError, BasimResult};
use crate::registry::{EquipmentId, Registry, SharedRegistry, Snapshot};
use crate::weather::Weather;

const VAV_REHEAT_RATED_KW: f64 = 5.0;
const LIGHTING_BASELINE_KW_PER_BUILDING: f64 = 8.0;
const WASTEWATER_GPM_PER_BUILDING: f64 = 6.0;

pub struct Building {
    pub name: String,
    pub path: String,
    pub ahus: Vec<Ahu>,
    pub vavs: Vec<VavZone>,
}

/// Monotonic equipment-id allocator used only during assembly.
struct IdGen(u32);

impl IdGen {
    fn next(&mut self) -> EquipmentId {
        let id = EquipmentId(self.0);
        self.0 += 1;
        id
    }
}

/// Everything a protocol gateway needs without exclusive access to the
/// tick-owned equipment fleet: the registry, weather/clock singletons, the
/// physics knobs, and the handful of config values the HTTP admin surface
/// can change at runtime (spec §4.G `/api/admin/*`, §9 "pass a handle
/// explicitly ... no ambient globals"). Cloned (as an `Arc`) into every
/// protocol server task; the tick driver holds the same `Arc` inside
/// [`Campus`].
pub struct CampusShared {
    pub registry: SharedRegistry,
    pub clock: Clock,
    pub weather: Weather,
    pub params: RwLock<PhysicsParameters>,
    unit_system: RwLock<UnitSystem>,
    pub device_id: u32,
    pub campus_size: CampusSize,
    pub admin_user: String,
    pub admin_password: String,

    /// The campus-wide cross-point-consistent view (spec §4.F): a full
    /// registry snapshot built off to the side and swapped in behind this
    /// lock once per completed tick, never mutated in place. A gateway that
    /// reads several points out of this `Arc` sees either every point as it
    /// stood before the tick that's currently running, or every point as it
    /// stood after the last one that finished — never a mix of the two.
    published: RwLock<Arc<Snapshot>>,
}

impl CampusShared {
    pub fn unit_system(&self) -> UnitSystem {
        *self.unit_system.read().unwrap()
    }

    pub fn set_unit_system(&self, unit_system: UnitSystem) {
        *self.unit_system.write().unwrap() = unit_system;
    }

    pub fn parameters(&self) -> PhysicsParameters {
        *self.params.read().unwrap()
    }

    pub fn set_parameters(&self, params: PhysicsParameters) {
        *self.params.write().unwrap() = params;
    }

    /// The most recently published cross-point-consistent snapshot.
    pub fn published_snapshot(&self) -> Arc<Snapshot> {
        self.published.read().unwrap().clone()
    }
}

pub struct Campus {
    pub shared: Arc<CampusShared>,
    pub plant: CentralPlant,
    pub electrical: ElectricalSystem,
    pub buildings: Vec<Building>,
    pub datacenter: Option<DataCenter>,
    pub wastewater: Option<WastewaterPlant>,
    last_tick: f64,
}

impl Campus {
    /// Build the whole topology from `config.campus_size` (spec §4.E).
    pub fn assemble(config: &Config) -> BasimResult<Self> {
        let mut registry = Registry::new();
        let mut ids = IdGen(1);
        let size = config.campus_size;

        let buildings = Self::build_buildings(&mut registry, &mut ids, size);
        let plant = Self::build_plant(&mut registry, &mut ids, size);
        let electrical = ElectricalSystem::new(
            &mut registry,
            [ids.next(), ids.next(), ids.next(), ids.next(), ids.next()],
            "Electrical",
            200.0,
            500.0,
            750.0,
            2500.0,
        );

        let datacenter = matches!(size, CampusSize::Medium | CampusSize::Large)
            .then(|| Self::build_datacenter(&mut registry, &mut ids, size));
        let wastewater =
            matches!(size, CampusSize::Large).then(|| Self::build_wastewater(&mut registry, &mut ids));

        Self::validate_topology(&buildings, &plant)?;

        let registry = Arc::new(registry);
        let initial_snapshot = Arc::new(registry.snapshot(None));
        let shared = Arc::new(CampusShared {
            registry,
            clock: Clock::new(config.simulation_speed),
            weather: Weather::new(config.geo_lat, config.scenario),
            params: RwLock::new(PhysicsParameters::default()),
            unit_system: RwLock::new(config.unit_system),
            device_id: config.device_id,
            campus_size: size,
            admin_user: config.admin_user.clone(),
            admin_password: config.admin_password.clone(),
            published: RwLock::new(initial_snapshot),
        });

        Ok(Self { shared, plant, electrical, buildings, datacenter, wastewater, last_tick: 0.0 })
    }

    pub fn shared(&self) -> Arc<CampusShared> {
        self.shared.clone()
    }

    fn build_buildings(registry: &mut Registry, ids: &mut IdGen, size: CampusSize) -> Vec<Building> {
        let mut buildings = Vec::with_capacity(size.building_count());
        for b in 1..=size.building_count() {
            let building_path = format!("Building_{b}");
            let mut ahus = Vec::with_capacity(size.ahus_per_building());
            let mut vavs = Vec::new();

            for a in 1..=size.ahus_per_building() {
                let ahu_path = format!("{building_path}.AHU_{a}");
                let mut vav_paths = Vec::with_capacity(size.vavs_per_ahu());
                for v in 1..=size.vavs_per_ahu() {
                    let vav_path = format!("{ahu_path}.VAV_{}", a * 100 + v);
                    let vav = VavZone::new(registry, ids.next(), vav_path.clone(), ahu_path.clone(), 1200.0);
                    vav_paths.push(vav_path);
                    vavs.push(vav);
                }
                let ahu = Ahu::new(registry, ids.next(), ahu_path, vav_paths, false, 15.0, 20.0, 240.0);
                ahus.push(ahu);
            }

            buildings.push(Building { name: format!("Building {b}"), path: building_path, ahus, vavs });
        }
        buildings
    }

    fn build_plant(registry: &mut Registry, ids: &mut IdGen, size: CampusSize) -> CentralPlant {
        let mut chillers = Vec::with_capacity(size.chiller_count());
        let mut towers = Vec::with_capacity(size.chiller_count());
        for i in 1..=size.chiller_count() {
            chillers.push(Chiller::new(registry, ids.next(), format!("CentralPlant.Chiller_{i}"), i as u32, 400.0));
            towers.push(CoolingTower::new(registry, ids.next(), format!("CentralPlant.Tower_{i}"), 450.0));
        }

        let mut boilers = Vec::with_capacity(size.boiler_count());
        for i in 1..=size.boiler_count() {
            boilers.push(Boiler::new(registry, ids.next(), format!("CentralPlant.Boiler_{i}"), 3000.0));
        }

        let chw_pump = Pump::new(registry, ids.next(), "CentralPlant.Pump_CHW_1".to_string(), "CHW".to_string(), 1500.0, 80.0, 40.0);
        let hw_pump = Pump::new(registry, ids.next(), "CentralPlant.Pump_HW_1".to_string(), "HW".to_string(), 800.0, 60.0, 20.0);
        let cw_pump = Pump::new(registry, ids.next(), "CentralPlant.Pump_CW_1".to_string(), "CW".to_string(), 2000.0, 70.0, 50.0);

        CentralPlant::new(registry, ids.next(), chillers, boilers, towers, chw_pump, hw_pump, cw_pump)
    }

    fn build_datacenter(registry: &mut Registry, ids: &mut IdGen, size: CampusSize) -> DataCenter {
        let rack_count = if matches!(size, CampusSize::Large) { 20 } else { 8 };
        let racks = (1..=rack_count)
            .map(|r| Rack::new(registry, ids.next(), format!("DataCenter.Rack_{r}"), 8.0))
            .collect();
        let cracs = (1..=2).map(|c| Crac::new(registry, ids.next(), format!("DataCenter.CRAC_{c}"), 30.0)).collect();
        DataCenter::new(registry, ids.next(), "DataCenter".to_string(), racks, cracs)
    }

    fn build_wastewater(registry: &mut Registry, ids: &mut IdGen) -> WastewaterPlant {
        let lift_station = LiftStation::new(registry, ids.next(), "Wastewater.LiftStation".to_string(), 5000.0, 400.0);
        let blowers = vec![
            Blower::new(registry, ids.next(), "Wastewater.Blower_1".to_string(), 500.0),
            Blower::new(registry, ids.next(), "Wastewater.Blower_2".to_string(), 500.0),
        ];
        let clarifier = Clarifier::new(registry, ids.next(), "Wastewater.Clarifier".to_string(), 600.0);
        let uv = UvSystem::new(registry, ids.next(), "Wastewater.UV".to_string());
        WastewaterPlant::new(registry, ids.next(), lift_station, blowers, clarifier, uv)
    }

    /// Spec §4.E: "every AHU has ≥1 VAV or is 100%OA; every chiller has a
    /// condenser-side tower; every pump belongs to a named loop."
    fn validate_topology(buildings: &[Building], plant: &CentralPlant) -> BasimResult<()> {
        for building in buildings {
            for ahu in &building.ahus {
                if ahu.vav_paths.is_empty() && !ahu.all_outside_air {
                    return Err(BasimError::BadTopology(format!("{} has no VAV boxes and is not 100% OA", ahu.path)));
                }
            }
        }
        if plant.chillers.len() != plant.towers.len() {
            return Err(BasimError::BadTopology("every chiller requires a condenser-side tower".to_string()));
        }
        for pump in [&plant.chw_pump, &plant.hw_pump, &plant.cw_pump] {
            if pump.loop_name.is_empty() {
                return Err(BasimError::BadTopology(format!("{} does not belong to a named loop", pump.path)));
            }
        }
        Ok(())
    }

    /// Run one deterministic pass at simulated time `now`, given the
    /// elapsed `dt` since the previous tick (spec §4.F).
    pub fn tick(&mut self, now: f64, dt: f64) {
        self.shared.registry.expire(now);
        let sample = self.shared.weather.advance(now);
        let calendar = self.shared.weather.calendar_time(now);
        let params = self.shared.parameters();

        let ctx = TickContext { registry: self.shared.registry.as_ref(), weather: &sample, params: &params, now, dt, calendar };

        for building in &mut self.buildings {
            for vav in &mut building.vavs {
                vav.advance(&ctx);
            }
        }
        for building in &mut self.buildings {
            for ahu in &mut building.ahus {
                ahu.advance(&ctx);
            }
        }

        let (demand_tons, demand_mbh) = self.aggregate_plant_demand();
        let plant_kw = self.plant.advance(&ctx, demand_tons, demand_mbh);

        let ahu_fan_kw = self.aggregate_fan_kw();
        let vav_reheat_kw = self.aggregate_reheat_kw();
        let lighting_kw = self.aggregate_lighting_kw(calendar);

        let datacenter_kw = self.datacenter.as_mut().map(|dc| dc.advance(&ctx)).unwrap_or(0.0);

        let occupied_buildings = self.buildings.len() as f64;
        let inflow_gpm = occupied_buildings * WASTEWATER_GPM_PER_BUILDING;
        let wastewater_kw = self.wastewater.as_mut().map(|w| w.advance(&ctx, inflow_gpm)).unwrap_or(0.0);

        let total_draw_kw = plant_kw + ahu_fan_kw + vav_reheat_kw + lighting_kw + datacenter_kw + wastewater_kw;
        self.electrical.advance_with_total(&ctx, total_draw_kw);

        self.last_tick = now;

        // Build the shadow buffer and flip the published pointer only once
        // every equipment model has finished writing this tick — the
        // atomicity boundary spec §4.F requires of concurrent readers.
        let snapshot = Arc::new(self.shared.registry.snapshot(None));
        *self.shared.published.write().unwrap() = snapshot;
    }

    /// Drives `tick()` to catch up `sim_now()` to `last_tick`, capped at
    /// `max_catchup` ticks to avoid a runaway loop after a long stall
    /// (spec §4.F).
    pub fn catch_up(&mut self, max_catchup: u32) {
        let tick_quantum = 1.0;
        let sim_now = self.shared.clock.sim_now();
        let mut ran = 0;
        while sim_now - self.last_tick >= tick_quantum && ran < max_catchup {
            let now = self.last_tick + tick_quantum;
            self.tick(now, tick_quantum);
            ran += 1;
        }
        if ran == max_catchup {
            tracing::warn!(max_catchup, "tick driver hit catch-up cap; simulation is falling behind wall clock");
        }
    }

    fn aggregate_plant_demand(&self) -> (f64, f64) {
        let mut tons = 0.0;
        let mut mbh = 0.0;
        for building in &self.buildings {
            for ahu in &building.ahus {
                let cooling_pct = self
                    .shared
                    .registry
                    .read(&format!("{}.cooling_valve", ahu.path))
                    .ok()
                    .and_then(|r| r.effective_value.as_f64())
                    .unwrap_or(0.0);
                let heating_pct = self
                    .shared
                    .registry
                    .read(&format!("{}.heating_valve", ahu.path))
                    .ok()
                    .and_then(|r| r.effective_value.as_f64())
                    .unwrap_or(0.0);
                tons += cooling_pct / 100.0 * ahu.cooling_capacity_tons;
                mbh += heating_pct / 100.0 * ahu.heating_capacity_mbh;
            }
        }
        (tons, mbh)
    }

    fn aggregate_fan_kw(&self) -> f64 {
        self.buildings.iter().flat_map(|b| &b.ahus).map(Ahu::fan_kw).sum()
    }

    fn aggregate_reheat_kw(&self) -> f64 {
        self.buildings
            .iter()
            .flat_map(|b| &b.vavs)
            .map(|vav| {
                self.shared
                    .registry
                    .read(&format!("{}.reheat_valve", vav.path))
                    .ok()
                    .and_then(|r| r.effective_value.as_f64())
                    .unwrap_or(0.0)
                    / 100.0
                    * VAV_REHEAT_RATED_KW
            })
            .sum()
    }

    fn aggregate_lighting_kw(&self, calendar: chrono::DateTime<chrono::Utc>) -> f64 {
        let is_weekday = !matches!(calendar.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun);
        let hour = calendar.hour() as f64;
        let occupied = is_weekday && (6.0..19.0).contains(&hour);
        let factor = if occupied { 1.0 } else { 0.2 };
        self.buildings.len() as f64 * LIGHTING_BASELINE_KW_PER_BUILDING * factor
    }
}
