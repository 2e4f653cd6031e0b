//! Raw ABI shared between simbridge hosts and native simulation engines.
//!
//! A native engine exports three C entry points built from a common symbol
//! prefix (`app_interface` unless configured otherwise):
//!
//! ```c
//! AppInterface *app_interface_new(void);
//! void app_interface_free(AppInterface *app);
//! AppDataOutput app_interface_update(AppInterface *app, double app_time_s, AppDataInput *input_data);
//! ```
//!
//! `AppDataInput` and `AppDataOutput` differ per model variant. Every field is
//! an `f64` and the declaration order below is the C field order.

#![cfg_attr(not(test), no_std)]

use core::fmt::Debug;
use core::marker::{PhantomData, PhantomPinned};

/// Opaque engine state. Only ever handled behind a pointer.
#[repr(C)]
pub struct AppInterface {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

pub type AppInterfaceNewFn = unsafe extern "C" fn() -> *mut AppInterface;
pub type AppInterfaceFreeFn = unsafe extern "C" fn(app: *mut AppInterface);
pub type AppInterfaceUpdateFn<I, O> =
    unsafe extern "C" fn(app: *mut AppInterface, app_time_s: f64, input_data: *mut I) -> O;

/// Symbol prefix used by engines that do not export a custom one.
pub const DEFAULT_SYMBOL_PREFIX: &str = "app_interface";
pub const NEW_SUFFIX: &str = "_new";
pub const FREE_SUFFIX: &str = "_free";
pub const UPDATE_SUFFIX: &str = "_update";

/// Fixed-shape record of `f64` fields exchanged with the engine.
pub trait Sample: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    /// Field names in C declaration order.
    const FIELDS: &'static [&'static str];

    /// Reads the field at `index`, `None` when out of range.
    fn get(&self, index: usize) -> Option<f64>;

    /// Writes the field at `index`. Returns `false` when out of range.
    fn set(&mut self, index: usize, value: f64) -> bool;
}

/// A pairing of input and output sample layouts understood by one engine build.
///
/// Hosts are generic over the variant, so feeding one variant's input to an
/// engine built for another does not type-check.
pub trait ModelVariant: Send + Sync + 'static {
    const NAME: &'static str;
    type Input: Sample;
    type Output: Sample;
}

macro_rules! sample {
    ($(#[$meta:meta])* $name:ident { $($(#[$field_meta:meta])* $field:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[repr(C)]
        #[derive(Clone, Copy, Debug, Default, PartialEq)]
        pub struct $name {
            $($(#[$field_meta])* pub $field: f64,)+
        }

        impl Sample for $name {
            const FIELDS: &'static [&'static str] = &[$(stringify!($field)),+];

            #[inline]
            fn get(&self, index: usize) -> Option<f64> {
                let values = [$(self.$field),+];
                values.get(index).copied()
            }

            #[inline]
            fn set(&mut self, index: usize, value: f64) -> bool {
                let mut slots = [$(&mut self.$field),+];
                match slots.get_mut(index) {
                    Some(slot) => {
                        **slot = value;
                        true
                    }
                    None => false,
                }
            }
        }

        const _: () = assert!(
            core::mem::size_of::<$name>()
                == <$name as Sample>::FIELDS.len() * core::mem::size_of::<f64>()
        );
    };
}

macro_rules! variant {
    ($(#[$meta:meta])* $name:ident, $label:literal, $input:ty, $output:ty) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
        pub struct $name;

        impl ModelVariant for $name {
            const NAME: &'static str = $label;
            type Input = $input;
            type Output = $output;
        }
    };
}

sample!(
    /// Input of the distance model.
    DistanceInput {
        /// Vehicle speed.
        speed,
    }
);

sample!(
    /// Output of the distance model.
    DistanceOutput {
        /// Accumulated distance as computed by the engine.
        distance,
    }
);

sample!(
    /// Input of the crash detection model.
    CrashInput {
        speed,
        curr,
        /// Lateral acceleration.
        ay,
        entropy_diff,
    }
);

sample!(
    /// Output of the crash detection model.
    CrashOutput {
        /// `1.0` when the engine flags a crash, `0.0` otherwise.
        crash_flag,
    }
);

sample!(
    /// Input of the ride telemetry model.
    TelemetryInput {
        voltage,
        current,
        speed,
        vehicle_mode,
        /// State of charge in percent.
        soc,
        bms_rem_cap,
        sub_ride_mode,
        rpm,
        current_gear,
        clutch_status,
        torque,
        de_acc,
        ax,
        ay,
        az,
        motor_switch_status,
        vic_flag,
        vacation_mode_off,
        right_indicator,
    }
);

sample!(
    /// Output of the ride telemetry model.
    TelemetryOutput {
        current_max_speed,
        current_avg_speed,
        current_distance_travelled_raw,
        current_min_time_0_to_60_kmph,
        current_ride_duration,
        co2_cons_current,
        current_energy_kwh,
        current_ride_eff_wh_km,
        ampere_hour,
        fall_detect_stationary,
        fall_detect_motion,
        g_force,
        lean_angle,
        left_gauge_eff,
        power,
        range,
        charge_time_full,
        full_charge_eco_range,
        charge_time_25_pct,
        charge_time_50_pct,
        charge_time_75_pct,
        eco_range_25_pct,
        eco_range_50_pct,
        eco_range_75_pct,
        suggested_gear,
        right_indicator_flag,
        pitch_angle,
    }
);

variant!(
    /// Single input speed, single output distance.
    Distance,
    "distance",
    DistanceInput,
    DistanceOutput
);

variant!(
    /// Four inputs, single crash flag output.
    Crash,
    "crash",
    CrashInput,
    CrashOutput
);

variant!(
    /// Full ride telemetry pipeline.
    Telemetry,
    "telemetry",
    TelemetryInput,
    TelemetryOutput
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crash_fields_follow_c_order() {
        assert_eq!(CrashInput::FIELDS, &["speed", "curr", "ay", "entropy_diff"]);
        let input = CrashInput {
            speed: 1.0,
            curr: 2.0,
            ay: 3.0,
            entropy_diff: 4.0,
        };
        assert_eq!(input.get(0), Some(1.0));
        assert_eq!(input.get(3), Some(4.0));
        assert_eq!(input.get(4), None);
    }

    #[test]
    fn set_writes_matching_field() {
        let mut input = TelemetryInput::default();
        assert!(input.set(2, 42.0));
        assert_eq!(input.speed, 42.0);
        assert!(!input.set(TelemetryInput::FIELDS.len(), 1.0));
    }

    #[test]
    fn layouts_are_packed_doubles() {
        assert_eq!(core::mem::size_of::<TelemetryInput>(), 19 * 8);
        assert_eq!(core::mem::size_of::<TelemetryOutput>(), 27 * 8);
        assert_eq!(core::mem::align_of::<DistanceInput>(), core::mem::align_of::<f64>());
    }

    #[test]
    fn nan_bit_patterns_survive_set_and_get() {
        let payload = f64::from_bits(0x7ff8_0000_dead_beef);
        let mut output = DistanceOutput::default();
        output.set(0, payload);
        assert_eq!(output.get(0).map(f64::to_bits), Some(payload.to_bits()));
    }
}
