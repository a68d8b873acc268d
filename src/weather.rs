//! Weather model (spec §4.B).
//!
//! Produces `oat`, `humidity`, `wet_bulb`, `dew_point`, `enthalpy`,
//! `solar_irradiance`, `wind_speed`, `cloud_cover` from sim time, latitude
//! and the active scenario. The solar-geometry baseline (time decomposition
//! → declination → hour angle → elevation) follows the same pipeline shape
//! as `solar_algorithm::estimate` in the teacher, scaled down to what a
//! weather baseline needs rather than a panel-yield estimate.

use std::f64::consts::PI;
use std::sync::RwLock;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

use crate::config::Scenario;

const DEG: f64 = PI / 180.0;
const SOLAR_CONSTANT_W_M2: f64 = 1361.0;

fn c_to_f(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

#[derive(Debug, Clone, Copy, serde::Serialize, utoipa::ToSchema)]
pub struct WeatherSample {
    pub oat_f: f64,
    pub humidity_pct: f64,
    pub wet_bulb_f: f64,
    pub dew_point_f: f64,
    pub enthalpy_btu_lb: f64,
    pub solar_irradiance_w_m2: f64,
    pub wind_speed_mph: f64,
    pub cloud_cover_pct: f64,
    pub brownout: bool,
}

pub struct Weather {
    base_time: DateTime<Utc>,
    geo_lat: f64,
    scenario: RwLock<Scenario>,
}

impl Weather {
    pub fn new(geo_lat: f64, scenario: Scenario) -> Self {
        Self {
            // Calendar time is derived from sim time against a fixed epoch,
            // not wall-clock process start: the model is a pure function of
            // (sim_time, geo_lat, scenario), spec §4.B.
            base_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            geo_lat,
            scenario: RwLock::new(scenario),
        }
    }

    pub fn scenario(&self) -> Scenario {
        *self.scenario.read().unwrap()
    }

    pub fn set_scenario(&self, scenario: Scenario) {
        *self.scenario.write().unwrap() = scenario;
    }

    /// Wall-clock calendar time corresponding to simulated second `sim_now`,
    /// used by schedule-driven equipment (occupancy modes) to read
    /// weekday/hour without equipment models reaching for an ambient clock.
    pub fn calendar_time(&self, sim_now: f64) -> DateTime<Utc> {
        self.base_time + chrono::Duration::milliseconds((sim_now * 1000.0) as i64)
    }

    /// Advance the weather model to simulated time `sim_now` (seconds since
    /// campus assembly) and return the derived sample. A pure function of
    /// `(sim_now, geo_lat, scenario)`, including the scenario-specific
    /// bounded events (e.g. thunderstorm brownouts), which are a
    /// deterministic function of `sim_now` rather than sampled noise.
    pub fn advance(&self, sim_now: f64) -> WeatherSample {
        let utc_now = self.base_time + chrono::Duration::milliseconds((sim_now * 1000.0) as i64);
        let scenario = self.scenario();

        let doy = utc_now.ordinal() as f64;
        let hour = utc_now.hour() as f64 + utc_now.minute() as f64 / 60.0;

        let (mut oat_c, mut humidity, mut cloud_cover, mut wind_speed_ms) =
            self.baseline(doy, hour);

        let elevation_deg = self.solar_elevation_deg(doy, hour);
        let mut irradiance = Self::clear_sky_irradiance(elevation_deg, doy) * (1.0 - cloud_cover / 100.0 * 0.75);

        let mut brownout = false;
        match scenario {
            Scenario::Normal => {}
            Scenario::Snow => {
                oat_c = oat_c.clamp(Self::f_to_c(20.0), Self::f_to_c(30.0));
                humidity = humidity.max(80.0);
                cloud_cover = cloud_cover.max(90.0);
                irradiance *= 0.3;
            }
            Scenario::Rainstorm => {
                oat_c -= 2.8; // ~5°F
                humidity = (humidity + 30.0).min(100.0);
                cloud_cover = 100.0;
                wind_speed_ms += 4.0;
                irradiance *= 0.2;
            }
            Scenario::Windstorm => {
                wind_speed_ms *= 3.0;
                cloud_cover = (cloud_cover + 40.0).min(100.0);
                irradiance *= 0.6;
            }
            Scenario::Thunderstorm => {
                cloud_cover = 100.0;
                humidity = (humidity + 20.0).min(100.0);
                irradiance *= 0.15;
                // Brief, periodic, deterministic: brownouts are a rare,
                // short event, not a persistent state.
                let phase = (sim_now / 37.0).sin();
                brownout = phase > 0.97;
            }
            Scenario::Heatwave => {
                oat_c += 8.3; // ~15°F
                humidity = (humidity - 10.0).max(5.0);
                cloud_cover = (cloud_cover * 0.3).max(0.0);
            }
        }

        let humidity = humidity.clamp(0.0, 100.0);
        let dew_point_c = Self::dew_point_c(oat_c, humidity);
        let wet_bulb_c = Self::wet_bulb_c(oat_c, humidity);
        let enthalpy_kj_kg = Self::enthalpy_kj_per_kg(oat_c, humidity);

        WeatherSample {
            oat_f: c_to_f(oat_c),
            humidity_pct: humidity,
            wet_bulb_f: c_to_f(wet_bulb_c),
            dew_point_f: c_to_f(dew_point_c),
            enthalpy_btu_lb: enthalpy_kj_kg * 0.4299,
            solar_irradiance_w_m2: irradiance.max(0.0),
            wind_speed_mph: wind_speed_ms * 2.23694,
            cloud_cover_pct: cloud_cover.clamp(0.0, 100.0),
            brownout,
        }
    }

    fn f_to_c(f: f64) -> f64 {
        (f - 32.0) * 5.0 / 9.0
    }

    /// `annual_seasonal(lat, day_of_year) + daily_diurnal(hour)`, in °C.
    fn baseline(&self, doy: f64, hour: f64) -> (f64, f64, f64, f64) {
        let lat_factor = (self.geo_lat.abs() / 90.0).clamp(0.0, 1.0);
        let mean_annual_c = 22.0 - 30.0 * lat_factor;
        let seasonal_phase = if self.geo_lat >= 0.0 { 172.0 } else { 355.0 }; // summer solstice
        let seasonal_amp_c = 12.0 + 8.0 * lat_factor;
        let seasonal = seasonal_amp_c * (2.0 * PI * (doy - seasonal_phase) / 365.25).cos();
        let diurnal = 5.0 * (2.0 * PI * (hour - 15.0) / 24.0).cos();
        let oat_c = mean_annual_c + seasonal + diurnal;

        let humidity = 55.0 - 10.0 * (2.0 * PI * (hour - 4.0) / 24.0).cos();
        let cloud_cover = 25.0;
        let wind_speed_ms = 3.5;
        (oat_c, humidity, cloud_cover, wind_speed_ms)
    }

    fn solar_elevation_deg(&self, doy: f64, hour_utc: f64) -> f64 {
        let b = 2.0 * PI * (doy - 1.0) / 365.0;
        let decl_deg = 23.45 * (2.0 * PI * (doy + 284.0) / 365.0).sin();
        let decl = decl_deg * DEG;
        let lat = self.geo_lat * DEG;
        let hour_angle_deg = 15.0 * (hour_utc - 12.0) + self.geo_lat.signum() * 0.0 + b * 0.0;
        let omega = hour_angle_deg * DEG;
        let sin_alpha = lat.sin() * decl.sin() + lat.cos() * decl.cos() * omega.cos();
        sin_alpha.clamp(-1.0, 1.0).asin() / DEG
    }

    fn clear_sky_irradiance(elevation_deg: f64, doy: f64) -> f64 {
        if elevation_deg <= 0.1 {
            return 0.0;
        }
        let b = 2.0 * PI * (doy - 1.0) / 365.0;
        let eccentricity = 1.00011 + 0.034221 * b.cos() + 0.00128 * b.sin();
        let e0 = SOLAR_CONSTANT_W_M2 * eccentricity;
        let air_mass = 1.0 / (elevation_deg * DEG).sin();
        e0 * (elevation_deg * DEG).sin() * 0.7_f64.powf(air_mass.powf(0.678))
    }

    /// Magnus-formula dew point, `T` and output in °C.
    fn dew_point_c(t_c: f64, rh_pct: f64) -> f64 {
        let (b, c) = (17.62, 243.12);
        let rh = rh_pct.max(0.1) / 100.0;
        let gamma = rh.ln() + (b * t_c) / (c + t_c);
        c * gamma / (b - gamma)
    }

    /// Stull (2011) empirical wet-bulb approximation, `T` in °C, `RH` in %.
    fn wet_bulb_c(t_c: f64, rh_pct: f64) -> f64 {
        let rh = rh_pct.clamp(1.0, 100.0);
        t_c * (0.151_977 * (rh + 8.313_659).sqrt()).atan()
            + (t_c + rh).atan()
            - (rh - 1.676_331).atan()
            + 0.003_918_38 * rh.powf(1.5) * (0.023_101 * rh).atan()
            - 4.686_035
    }

    /// Moist-air enthalpy (kJ/kg dry air) from the standard psychrometric
    /// closed form at sea-level pressure (101.325 kPa).
    fn enthalpy_kj_per_kg(t_c: f64, rh_pct: f64) -> f64 {
        let p_ws = 0.6108 * (17.27 * t_c / (t_c + 237.3)).exp();
        let p_w = rh_pct / 100.0 * p_ws;
        let pressure_kpa = 101.325;
        let w = 0.622 * p_w / (pressure_kpa - p_w).max(0.01);
        1.006 * t_c + w * (2501.0 + 1.86 * t_c)
    }
}

/// Moist-air enthalpy (BTU/lb) from dry-bulb °F and relative humidity %.
/// Exposed for equipment models (the AHU economizer) that need to compare
/// enthalpy of two air streams without owning their own psychrometric math.
pub fn enthalpy_btu_lb_from_f(t_f: f64, rh_pct: f64) -> f64 {
    let t_c = (t_f - 32.0) * 5.0 / 9.0;
    Weather::enthalpy_kj_per_kg(t_c, rh_pct) * 0.4299
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snow_scenario_clamps_oat_and_humidity() {
        let w = Weather::new(40.0, Scenario::Snow);
        let sample = w.advance(0.0);
        assert!(sample.oat_f >= 20.0 && sample.oat_f <= 30.0);
        assert!(sample.humidity_pct >= 80.0);
    }

    #[test]
    fn heatwave_raises_oat_relative_to_normal() {
        let normal = Weather::new(35.0, Scenario::Normal).advance(3600.0 * 12.0);
        let heat = Weather::new(35.0, Scenario::Heatwave).advance(3600.0 * 12.0);
        assert!(heat.oat_f > normal.oat_f);
    }

    #[test]
    fn dew_point_never_exceeds_dry_bulb() {
        let w = Weather::new(10.0, Scenario::Normal);
        let sample = w.advance(3600.0 * 10.0);
        assert!(sample.dew_point_f <= sample.oat_f + 0.01);
    }
}
