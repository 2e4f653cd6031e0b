use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use simbridge_sys::{
    Crash, CrashInput, CrashOutput, Distance, DistanceInput, DistanceOutput, ModelVariant,
    Sample, Telemetry, TelemetryInput, TelemetryOutput, DEFAULT_SYMBOL_PREFIX,
};

use crate::error::ConfigError;
use crate::input::{check_range, DEFAULT_RANGE};
use crate::pacing::{Pacing, RunLimit};

pub const ENV_RUN_PATH: &str = "SIMBRIDGE_RUN_PATH";
pub const ENV_DATA_LOG_RATE_HZ: &str = "SIMBRIDGE_DATA_LOG_RATE_HZ";
pub const ENV_SYMBOL_PREFIX: &str = "SIMBRIDGE_SYMBOL_PREFIX";

/// Recording file name used when none is configured.
pub const DEFAULT_RECORD_FILE: &str = "simbridge_output.csv";
/// Error dump written by the CLI panic hook.
pub const ERROR_DUMP_FILE: &str = "simbridge_errors.json";

/// Model variant selected at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    #[default]
    Distance,
    Crash,
    Telemetry,
}

impl VariantKind {
    pub const ALL: [VariantKind; 3] = [
        VariantKind::Distance,
        VariantKind::Crash,
        VariantKind::Telemetry,
    ];

    pub fn name(self) -> &'static str {
        match self {
            VariantKind::Distance => Distance::NAME,
            VariantKind::Crash => Crash::NAME,
            VariantKind::Telemetry => Telemetry::NAME,
        }
    }

    pub fn input_fields(self) -> &'static [&'static str] {
        match self {
            VariantKind::Distance => DistanceInput::FIELDS,
            VariantKind::Crash => CrashInput::FIELDS,
            VariantKind::Telemetry => TelemetryInput::FIELDS,
        }
    }

    pub fn output_fields(self) -> &'static [&'static str] {
        match self {
            VariantKind::Distance => DistanceOutput::FIELDS,
            VariantKind::Crash => CrashOutput::FIELDS,
            VariantKind::Telemetry => TelemetryOutput::FIELDS,
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VariantKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        VariantKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(value))
            .ok_or_else(|| ConfigError::UnknownVariant(value.to_string()))
    }
}

/// Timing of the update loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Simulated seconds added after every step.
    #[serde(default = "default_timestep")]
    pub timestep_s: f64,
    /// Wall-clock pause between steps.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Stop once simulated time passes this value. Absent runs until cancelled.
    #[serde(default)]
    pub max_time_s: Option<f64>,
    #[serde(default)]
    pub pacing: Pacing,
    #[serde(default)]
    pub start_time_s: f64,
    /// Count non-finite engine outputs as failed steps.
    #[serde(default)]
    pub reject_non_finite: bool,
}

fn default_timestep() -> f64 {
    0.1
}

fn default_interval_ms() -> u64 {
    100
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            timestep_s: default_timestep(),
            interval_ms: default_interval_ms(),
            max_time_s: None,
            pacing: Pacing::default(),
            start_time_s: 0.0,
            reject_non_finite: false,
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.timestep_s.is_finite() || self.timestep_s <= 0.0 {
            return Err(ConfigError::Timestep(self.timestep_s));
        }
        if !self.start_time_s.is_finite() || self.start_time_s < 0.0 {
            return Err(ConfigError::StartTime(self.start_time_s));
        }
        if let Some(limit) = self.max_time_s {
            if !limit.is_finite() || limit < 0.0 {
                return Err(ConfigError::MaxTime(limit));
            }
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn run_limit(&self) -> RunLimit {
        RunLimit::from_seconds(self.max_time_s)
    }
}

/// Where step inputs come from when the host is driven from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputConfig {
    /// Uniform random values. `range` applies to every field not listed in
    /// `fields`.
    Random {
        #[serde(default = "default_range")]
        range: [f64; 2],
        #[serde(default)]
        fields: BTreeMap<String, [f64; 2]>,
    },
    /// Fixed values by field name. Missing fields are zero.
    Constant {
        #[serde(default)]
        values: BTreeMap<String, f64>,
    },
}

fn default_range() -> [f64; 2] {
    [DEFAULT_RANGE.0, DEFAULT_RANGE.1]
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig::Random {
            range: default_range(),
            fields: BTreeMap::new(),
        }
    }
}

/// Everything needed to start a simulation from the command line or a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub library: Option<PathBuf>,
    #[serde(default)]
    pub variant: VariantKind,
    #[serde(default = "default_symbol_prefix")]
    pub symbol_prefix: String,
    #[serde(default, rename = "loop")]
    pub loop_config: LoopConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Directory for recordings and error dumps. Empty means the working
    /// directory.
    #[serde(default)]
    pub run_path: PathBuf,
    /// Recording file; relative paths resolve against `run_path`.
    #[serde(default)]
    pub record: Option<PathBuf>,
    /// Rows per second written to the recording. Zero records every step.
    #[serde(default)]
    pub record_rate_hz: f64,
}

fn default_symbol_prefix() -> String {
    DEFAULT_SYMBOL_PREFIX.to_string()
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            library: None,
            variant: VariantKind::default(),
            symbol_prefix: default_symbol_prefix(),
            loop_config: LoopConfig::default(),
            input: InputConfig::default(),
            seed: None,
            run_path: PathBuf::new(),
            record: None,
            record_rate_hz: 0.0,
        }
    }
}

impl HostConfig {
    /// Reads a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path.as_ref())?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let config: HostConfig = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `SIMBRIDGE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(std::env::vars())
    }

    /// Applies `SIMBRIDGE_*` overrides from `vars`. Unrelated keys are ignored.
    pub fn apply_vars<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let value = value.as_ref();
            match key.as_ref() {
                ENV_RUN_PATH => self.run_path = PathBuf::from(value),
                ENV_SYMBOL_PREFIX if !value.trim().is_empty() => {
                    self.symbol_prefix = value.trim().to_string();
                }
                ENV_DATA_LOG_RATE_HZ => {
                    self.record_rate_hz =
                        value.trim().parse().map_err(|_| ConfigError::Env {
                            key: ENV_DATA_LOG_RATE_HZ,
                            value: value.to_string(),
                        })?;
                }
                _ => {}
            }
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.loop_config.validate()?;
        if !self.record_rate_hz.is_finite() || self.record_rate_hz < 0.0 {
            return Err(ConfigError::RecordRate(self.record_rate_hz));
        }
        if let InputConfig::Random { range, fields } = &self.input {
            check_range("*", range[0], range[1])?;
            for (field, [low, high]) in fields {
                check_range(field, *low, *high)?;
            }
        }
        Ok(())
    }

    /// Resolved recording path, if recording is enabled.
    pub fn record_path(&self) -> Option<PathBuf> {
        self.record.as_ref().map(|path| self.run_path.join(path))
    }

    pub fn error_dump_path(&self) -> PathBuf {
        self.run_path.join(ERROR_DUMP_FILE)
    }
}
