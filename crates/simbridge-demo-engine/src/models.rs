use simbridge_sys::{
    CrashInput, CrashOutput, DistanceInput, DistanceOutput, TelemetryInput, TelemetryOutput,
};

use crate::Model;

const GRAVITY: f64 = 9.81;
const SECONDS_PER_HOUR: f64 = 3600.0;
const IMPACT_AY: f64 = 6.0;
const ERRATIC_ENTROPY: f64 = 0.8;

/// Elapsed time since the previous update, zero on the first one and when
/// time does not move forward.
#[derive(Debug, Default, Clone, Copy)]
struct Clock {
    last_time_s: Option<f64>,
}

impl Clock {
    fn tick(&mut self, time_s: f64) -> f64 {
        let dt = match self.last_time_s {
            Some(last) if time_s > last => time_s - last,
            _ => 0.0,
        };
        self.last_time_s = Some(time_s);
        dt
    }
}

/// Integrates speed over elapsed time.
#[derive(Debug, Default)]
pub struct DistanceModel {
    clock: Clock,
    distance: f64,
}

impl Model for DistanceModel {
    type Input = DistanceInput;
    type Output = DistanceOutput;

    fn update(&mut self, time_s: f64, input: &DistanceInput) -> DistanceOutput {
        let dt = self.clock.tick(time_s);
        self.distance += input.speed * dt;
        DistanceOutput {
            distance: self.distance,
        }
    }
}

/// Flags a crash on a hard lateral impulse at speed, or a sharp jump in
/// signal entropy while moving. The flag latches once raised.
#[derive(Debug, Default)]
pub struct CrashModel {
    crashed: bool,
}

impl Model for CrashModel {
    type Input = CrashInput;
    type Output = CrashOutput;

    fn update(&mut self, _time_s: f64, input: &CrashInput) -> CrashOutput {
        let moving = input.speed > 5.0;
        let impact = input.ay.abs() > IMPACT_AY;
        let erratic = input.entropy_diff > ERRATIC_ENTROPY;
        if moving && (impact || erratic) {
            self.crashed = true;
        }
        CrashOutput {
            crash_flag: if self.crashed { 1.0 } else { 0.0 },
        }
    }
}

/// Ride statistics derived from the vehicle bus.
#[derive(Debug, Default)]
pub struct TelemetryModel {
    clock: Clock,
    max_speed: f64,
    distance_km: f64,
    duration_s: f64,
    energy_kwh: f64,
    ampere_hour: f64,
    time_to_60_s: Option<f64>,
    accelerating_since_s: Option<f64>,
}

/// Nominal pack capacity and consumption used for range estimates.
const PACK_KWH: f64 = 4.0;
const ECO_WH_PER_KM: f64 = 25.0;
const CHARGER_KW: f64 = 0.8;
const GRID_CO2_KG_PER_KWH: f64 = 0.7;

impl TelemetryModel {
    fn range_at(soc_pct: f64) -> f64 {
        PACK_KWH * soc_pct.clamp(0.0, 100.0) / 100.0 * 1000.0 / ECO_WH_PER_KM
    }

    fn charge_time_h(from_soc: f64, to_soc: f64) -> f64 {
        let missing = (to_soc - from_soc.clamp(0.0, 100.0)).max(0.0) / 100.0;
        PACK_KWH * missing / CHARGER_KW
    }

    fn track_zero_to_sixty(&mut self, time_s: f64, speed: f64) {
        if speed <= 1.0 {
            self.accelerating_since_s = Some(time_s);
        } else if speed >= 60.0 {
            if let Some(start) = self.accelerating_since_s.take() {
                let elapsed = time_s - start;
                self.time_to_60_s = Some(match self.time_to_60_s {
                    Some(best) => best.min(elapsed),
                    None => elapsed,
                });
            }
        }
    }
}

impl Model for TelemetryModel {
    type Input = TelemetryInput;
    type Output = TelemetryOutput;

    fn update(&mut self, time_s: f64, input: &TelemetryInput) -> TelemetryOutput {
        let dt = self.clock.tick(time_s);
        let dt_h = dt / SECONDS_PER_HOUR;
        let power = input.voltage * input.current;

        self.max_speed = self.max_speed.max(input.speed);
        self.distance_km += input.speed * dt_h;
        self.duration_s += dt;
        self.energy_kwh += power / 1000.0 * dt_h;
        self.ampere_hour += input.current * dt_h;
        self.track_zero_to_sixty(time_s, input.speed);

        let avg_speed = if self.duration_s > 0.0 {
            self.distance_km / (self.duration_s / SECONDS_PER_HOUR)
        } else {
            input.speed
        };
        let efficiency = if self.distance_km > 0.0 {
            self.energy_kwh * 1000.0 / self.distance_km
        } else {
            0.0
        };
        let g_force =
            (input.ax * input.ax + input.ay * input.ay + input.az * input.az).sqrt() / GRAVITY;
        let lean_angle = input.ay.atan2(input.az).to_degrees();
        let pitch_angle = input.ax.atan2(input.az).to_degrees();
        let fallen = lean_angle.abs() > 60.0;
        let suggested_gear = match input.rpm {
            rpm if rpm > 6000.0 => (input.current_gear + 1.0).min(6.0),
            rpm if rpm < 2000.0 && input.current_gear > 1.0 => input.current_gear - 1.0,
            _ => input.current_gear,
        };

        TelemetryOutput {
            current_max_speed: self.max_speed,
            current_avg_speed: avg_speed,
            current_distance_travelled_raw: self.distance_km,
            current_min_time_0_to_60_kmph: self.time_to_60_s.unwrap_or(0.0),
            current_ride_duration: self.duration_s,
            co2_cons_current: self.energy_kwh * GRID_CO2_KG_PER_KWH,
            current_energy_kwh: self.energy_kwh,
            current_ride_eff_wh_km: efficiency,
            ampere_hour: self.ampere_hour,
            fall_detect_stationary: if fallen && input.speed <= 1.0 { 1.0 } else { 0.0 },
            fall_detect_motion: if fallen && input.speed > 1.0 { 1.0 } else { 0.0 },
            g_force,
            lean_angle,
            left_gauge_eff: if efficiency > 0.0 {
                (ECO_WH_PER_KM / efficiency * 100.0).min(100.0)
            } else {
                100.0
            },
            power,
            range: Self::range_at(input.soc),
            charge_time_full: Self::charge_time_h(input.soc, 100.0),
            full_charge_eco_range: Self::range_at(100.0),
            charge_time_25_pct: Self::charge_time_h(input.soc, 25.0),
            charge_time_50_pct: Self::charge_time_h(input.soc, 50.0),
            charge_time_75_pct: Self::charge_time_h(input.soc, 75.0),
            eco_range_25_pct: Self::range_at(25.0),
            eco_range_50_pct: Self::range_at(50.0),
            eco_range_75_pct: Self::range_at(75.0),
            suggested_gear,
            right_indicator_flag: if input.right_indicator != 0.0 { 1.0 } else { 0.0 },
            pitch_angle,
        }
    }
}
