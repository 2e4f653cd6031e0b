//! Reference engine for exercising simbridge hosts end to end.
//!
//! Exports three engines from one shared library:
//!
//! | prefix                | variant   |
//! |-----------------------|-----------|
//! | `app_interface`       | distance  |
//! | `crash_interface`     | crash     |
//! | `telemetry_interface` | telemetry |
//!
//! The models are illustrative, not calibrated.

#[macro_use]
mod export;
mod models;

pub use models::{CrashModel, DistanceModel, TelemetryModel};

use simbridge_sys::Sample;

/// Stateful engine behind one exported handle.
pub trait Model: Default {
    type Input: Sample;
    type Output: Sample;

    fn update(&mut self, time_s: f64, input: &Self::Input) -> Self::Output;
}

export_engine!(
    DistanceModel,
    app_interface_new,
    app_interface_free,
    app_interface_update
);

export_engine!(
    CrashModel,
    crash_interface_new,
    crash_interface_free,
    crash_interface_update
);

export_engine!(
    TelemetryModel,
    telemetry_interface_new,
    telemetry_interface_free,
    telemetry_interface_update
);
