//! Air Handling Unit model (spec §4.D).

use crate::equipment::{first_order, Advance, TickContext};
use crate::registry::{EquipmentId, PointId, PointKind, Registry, Value};
use crate::weather::enthalpy_btu_lb_from_f;

const ECONOMIZER_HIGH_LIMIT_F: f64 = 70.0;
const ASSUMED_RETURN_TEMP_F: f64 = 75.0;
const ASSUMED_RETURN_RH_PCT: f64 = 50.0;
const MIN_OA_FRACTION_PCT: f64 = 20.0;

pub struct Ahu {
    pub id: EquipmentId,
    pub path: String,
    pub vav_paths: Vec<String>,
    pub all_outside_air: bool,
    pub fan_rated_kw: f64,
    pub cooling_capacity_tons: f64,
    pub heating_capacity_mbh: f64,

    pid_supply_temp: PointId,
    pid_supply_setpoint: PointId,
    pid_mixed_air_temp: PointId,
    pid_oa_damper: PointId,
    pid_fan_speed: PointId,
    pid_fan_kw: PointId,
    pid_filter_dp: PointId,
    pid_cooling_valve: PointId,
    pid_heating_valve: PointId,
    pid_economizer_active: PointId,
    pid_fault: PointId,

    supply_temp_f: f64,
    fan_speed_pct: f64,
    fan_kw: f64,
    filter_dp_in_wc: f64,
    cooling_valve_pct: f64,
    heating_valve_pct: f64,
    oa_damper_pct: f64,
}

impl Ahu {
    pub fn new(
        registry: &mut Registry,
        id: EquipmentId,
        path: String,
        vav_paths: Vec<String>,
        all_outside_air: bool,
        fan_rated_kw: f64,
        cooling_capacity_tons: f64,
        heating_capacity_mbh: f64,
    ) -> Self {
        let pid_supply_temp = registry.register(
            format!("{path}.supply_temp"),
            PointKind::Analog,
            "°F",
            false,
            id,
            Value::Analog(55.0),
        );
        let pid_supply_setpoint = registry.register(
            format!("{path}.supply_temp_setpoint"),
            PointKind::Analog,
            "°F",
            true,
            id,
            Value::Analog(55.0),
        );
        let pid_mixed_air_temp = registry.register(
            format!("{path}.mixed_air_temp"),
            PointKind::Analog,
            "°F",
            false,
            id,
            Value::Analog(65.0),
        );
        let pid_oa_damper = registry.register(
            format!("{path}.outside_air_damper"),
            PointKind::Analog,
            "%",
            true,
            id,
            Value::Analog(MIN_OA_FRACTION_PCT),
        );
        let pid_fan_speed = registry.register(
            format!("{path}.fan_speed"),
            PointKind::Analog,
            "%",
            false,
            id,
            Value::Analog(20.0),
        );
        let pid_fan_kw = registry.register(format!("{path}.fan_kw"), PointKind::Analog, "kW", false, id, Value::Analog(0.0));
        let pid_filter_dp = registry.register(
            format!("{path}.filter_dp"),
            PointKind::Analog,
            "in_wc",
            false,
            id,
            Value::Analog(0.1),
        );
        let pid_cooling_valve = registry.register(
            format!("{path}.cooling_valve"),
            PointKind::Analog,
            "%",
            true,
            id,
            Value::Analog(0.0),
        );
        let pid_heating_valve = registry.register(
            format!("{path}.heating_valve"),
            PointKind::Analog,
            "%",
            true,
            id,
            Value::Analog(0.0),
        );
        let pid_economizer_active = registry.register(
            format!("{path}.economizer_active"),
            PointKind::Binary,
            "",
            false,
            id,
            Value::Binary(false),
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
            vav_paths,
            all_outside_air,
            fan_rated_kw,
            cooling_capacity_tons,
            heating_capacity_mbh,
            pid_supply_temp,
            pid_supply_setpoint,
            pid_mixed_air_temp,
            pid_oa_damper,
            pid_fan_speed,
            pid_fan_kw,
            pid_filter_dp,
            pid_cooling_valve,
            pid_heating_valve,
            pid_economizer_active,
            pid_fault,
            supply_temp_f: 55.0,
            fan_speed_pct: 20.0,
            fan_kw: 0.0,
            filter_dp_in_wc: 0.1,
            cooling_valve_pct: 0.0,
            heating_valve_pct: 0.0,
            oa_damper_pct: MIN_OA_FRACTION_PCT,
        }
    }

    pub fn fan_kw(&self) -> f64 {
        self.fan_kw
    }
}

impl Advance for Ahu {
    fn advance(&mut self, ctx: &TickContext) {
        let registry = ctx.registry;
        let dt = ctx.dt;

        let setpoint = registry
            .read_by_id(self.pid_supply_setpoint)
            .effective_value
            .as_f64()
            .unwrap_or(55.0);

        let outside_enthalpy = ctx.weather.enthalpy_btu_lb;
        let return_enthalpy = enthalpy_btu_lb_from_f(ASSUMED_RETURN_TEMP_F, ASSUMED_RETURN_RH_PCT);
        let economizer_eligible =
            ctx.weather.oat_f < ECONOMIZER_HIGH_LIMIT_F && outside_enthalpy < return_enthalpy;

        let oa_target = if self.all_outside_air {
            100.0
        } else if economizer_eligible {
            let denom = ASSUMED_RETURN_TEMP_F - ctx.weather.oat_f;
            if denom.abs() > 0.5 {
                (((ASSUMED_RETURN_TEMP_F - setpoint) / denom) * 100.0).clamp(MIN_OA_FRACTION_PCT, 100.0)
            } else {
                MIN_OA_FRACTION_PCT
            }
        } else {
            MIN_OA_FRACTION_PCT
        };

        self.oa_damper_pct = first_order(self.oa_damper_pct, oa_target, dt, 60.0);
        registry
            .write_present(self.pid_oa_damper, self.id, Value::Analog(self.oa_damper_pct))
            .ok();
        registry
            .write_present(self.pid_economizer_active, self.id, Value::Binary(economizer_eligible))
            .ok();

        let oa_eff = registry
            .read_by_id(self.pid_oa_damper)
            .effective_value
            .as_f64()
            .unwrap_or(self.oa_damper_pct)
            .clamp(0.0, 100.0);
        let oa_frac = oa_eff / 100.0;
        let mixed_air_temp = ASSUMED_RETURN_TEMP_F * (1.0 - oa_frac) + ctx.weather.oat_f * oa_frac;
        registry
            .write_present(self.pid_mixed_air_temp, self.id, Value::Analog(mixed_air_temp))
            .ok();

        let error = mixed_air_temp - setpoint;
        let kp = 8.0 * ctx.params.equipment_efficiency.max(0.1);
        let (cooling_target, heating_target) = if error > 0.0 {
            ((error * kp).clamp(0.0, 100.0), 0.0)
        } else {
            (0.0, ((-error) * kp).clamp(0.0, 100.0))
        };
        self.cooling_valve_pct = first_order(self.cooling_valve_pct, cooling_target, dt, 30.0);
        self.heating_valve_pct = first_order(self.heating_valve_pct, heating_target, dt, 30.0);
        registry
            .write_present(self.pid_cooling_valve, self.id, Value::Analog(self.cooling_valve_pct))
            .ok();
        registry
            .write_present(self.pid_heating_valve, self.id, Value::Analog(self.heating_valve_pct))
            .ok();

        let cooling_eff = registry
            .read_by_id(self.pid_cooling_valve)
            .effective_value
            .as_f64()
            .unwrap_or(self.cooling_valve_pct);
        let heating_eff = registry
            .read_by_id(self.pid_heating_valve)
            .effective_value
            .as_f64()
            .unwrap_or(self.heating_valve_pct);

        let supply_target = mixed_air_temp - cooling_eff / 100.0 * 40.0 + heating_eff / 100.0 * 60.0;
        self.supply_temp_f = first_order(self.supply_temp_f, supply_target, dt, 120.0);
        registry
            .write_present(self.pid_supply_temp, self.id, Value::Analog(self.supply_temp_f))
            .ok();

        let worst_case_damper = self
            .vav_paths
            .iter()
            .filter_map(|p| {
                registry
                    .read(&format!("{p}.damper_position"))
                    .ok()
                    .and_then(|r| r.effective_value.as_f64())
            })
            .fold(20.0_f64, f64::max);
        self.fan_speed_pct = first_order(self.fan_speed_pct, worst_case_damper, dt, 15.0);
        registry
            .write_present(self.pid_fan_speed, self.id, Value::Analog(self.fan_speed_pct))
            .ok();

        // Fan affinity law: kW ~ speed^3.
        self.fan_kw = self.fan_rated_kw * (self.fan_speed_pct / 100.0).powi(3);
        registry.write_present(self.pid_fan_kw, self.id, Value::Analog(self.fan_kw)).ok();

        self.filter_dp_in_wc += (self.fan_speed_pct / 100.0) * dt * 1e-5;
        registry
            .write_present(self.pid_filter_dp, self.id, Value::Analog(self.filter_dp_in_wc))
            .ok();

        let fault = !self.supply_temp_f.is_finite() || !mixed_air_temp.is_finite();
        registry.write_present(self.pid_fault, self.id, Value::Binary(fault)).ok();
    }
}
