//! File- and environment-backed configuration.
//!
//! Hosts describe a scenario in TOML (plus `PVD__`-prefixed environment
//! overrides) and convert it into the typed records the engine consumes.
//! The engine itself never reads files; everything is validated here and
//! passed in explicitly.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::Validate;

use crate::domain::battery::BatterySpec;
use crate::domain::grid::GridLimits;
use crate::domain::series::TimeStep;
use crate::domain::tariff::{PeakHours, PowerBracket, PowerTariff, TariffConfig};
use crate::driver::HorizonMode;
use crate::error::DispatchError;

/// Top-level scenario configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ScenarioConfig {
    #[validate(nested)]
    pub battery: BatteryConfig,

    #[validate(nested)]
    pub tariff: TariffFileConfig,

    #[validate(nested)]
    pub grid: GridConfig,

    #[validate(nested)]
    pub simulation: SimulationConfig,
}

/// Battery section.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[validate(schema(function = "validate_battery_section"))]
pub struct BatteryConfig {
    #[validate(range(min = 0.0, max = 10000.0))]
    pub capacity_kwh: f64,

    #[validate(range(min = 0.0, max = 1000.0))]
    pub max_power_kw: f64,

    #[validate(range(min = 0.5, max = 1.0))]
    pub round_trip_efficiency: f64,

    #[serde(default = "default_soc_min")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub soc_min: f64,

    #[serde(default = "default_soc_max")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub soc_max: f64,

    #[serde(default = "default_initial_soc")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub initial_soc_fraction: f64,

    #[serde(default)]
    #[validate(range(min = 0.0, max = 100000.0))]
    pub wear_cost_nok_per_kwh: f64,

    #[serde(default = "default_eol_degradation")]
    #[validate(range(min = 0.01, max = 1.0))]
    pub eol_degradation: f64,

    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub degradation_per_cycle: f64,
}

fn validate_battery_section(config: &BatteryConfig) -> Result<(), validator::ValidationError> {
    if config.soc_min >= config.soc_max {
        return Err(validator::ValidationError::new(
            "soc_min must be less than soc_max",
        ));
    }
    if config.initial_soc_fraction < config.soc_min || config.initial_soc_fraction > config.soc_max
    {
        return Err(validator::ValidationError::new(
            "initial_soc_fraction must be between soc_min and soc_max",
        ));
    }
    Ok(())
}

/// One power-tariff bracket as written in the file. Omitting `upper_kw`
/// marks the open-ended top bracket.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BracketConfig {
    #[serde(default)]
    pub upper_kw: Option<f64>,
    pub fee_nok: f64,
}

/// Tariff section.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TariffFileConfig {
    #[validate(range(min = 0.0))]
    pub energy_rate_peak_nok_per_kwh: f64,

    #[validate(range(min = 0.0))]
    pub energy_rate_offpeak_nok_per_kwh: f64,

    #[serde(default = "default_peak_start")]
    #[validate(range(min = 0, max = 23))]
    pub peak_start_hour: u8,

    #[serde(default = "default_peak_end")]
    #[validate(range(min = 1, max = 24))]
    pub peak_end_hour: u8,

    #[serde(default)]
    pub peak_includes_weekends: bool,

    /// Twelve entries, January first.
    #[validate(length(min = 12, max = 12))]
    pub consumption_tax_nok_per_kwh: Vec<f64>,

    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub supplier_markup_nok_per_kwh: f64,

    #[serde(default = "default_vat")]
    #[validate(range(min = 1.0, max = 2.0))]
    pub vat_multiplier: f64,

    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub feed_in_premium_nok_per_kwh: f64,

    #[validate(length(min = 1))]
    pub power_brackets: Vec<BracketConfig>,
}

/// Grid section.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct GridConfig {
    #[validate(range(min = 0.1, max = 100000.0))]
    pub import_limit_kw: f64,

    #[validate(range(min = 0.1, max = 100000.0))]
    pub export_limit_kw: f64,
}

/// Simulation section.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SimulationConfig {
    #[serde(default = "default_mode")]
    pub mode: ModeConfig,

    #[serde(default = "default_horizon_hours")]
    #[validate(range(min = 1, max = 8760))]
    pub horizon_hours: u32,

    #[serde(default = "default_update_frequency_hours")]
    #[validate(range(min = 1, max = 168))]
    pub update_frequency_hours: u32,

    #[serde(default = "default_time_step_minutes")]
    pub time_step_minutes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeConfig {
    Weekly,
    Monthly,
    Mpc,
}

fn default_soc_min() -> f64 {
    0.05
}
fn default_soc_max() -> f64 {
    0.95
}
fn default_initial_soc() -> f64 {
    0.5
}
fn default_eol_degradation() -> f64 {
    0.20
}
fn default_peak_start() -> u8 {
    6
}
fn default_peak_end() -> u8 {
    22
}
fn default_vat() -> f64 {
    1.25
}
fn default_mode() -> ModeConfig {
    ModeConfig::Weekly
}
fn default_horizon_hours() -> u32 {
    48
}
fn default_update_frequency_hours() -> u32 {
    24
}
fn default_time_step_minutes() -> u32 {
    60
}

impl ScenarioConfig {
    /// Load from a TOML file merged with `PVD__`-prefixed environment
    /// variables (`PVD__BATTERY__CAPACITY_KWH` -> `battery.capacity_kwh`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DispatchError> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PVD__").split("__"))
            .extract()
            .map_err(|e| DispatchError::Config(e.to_string()))?;
        config
            .validate()
            .map_err(|e| DispatchError::Config(e.to_string()))?;
        Ok(config)
    }

    pub fn battery_spec(&self) -> Result<BatterySpec, DispatchError> {
        let spec = BatterySpec {
            capacity_kwh: self.battery.capacity_kwh,
            max_power_kw: self.battery.max_power_kw,
            round_trip_efficiency: self.battery.round_trip_efficiency,
            soc_min: self.battery.soc_min,
            soc_max: self.battery.soc_max,
            wear_cost_nok_per_kwh: self.battery.wear_cost_nok_per_kwh,
            eol_degradation: self.battery.eol_degradation,
            degradation_per_cycle: self.battery.degradation_per_cycle,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn tariff(&self) -> Result<TariffConfig, DispatchError> {
        let t = &self.tariff;
        if t.consumption_tax_nok_per_kwh.len() != 12 {
            return Err(DispatchError::Config(format!(
                "consumption tax table needs 12 entries, got {}",
                t.consumption_tax_nok_per_kwh.len()
            )));
        }
        let mut tax = [0.0; 12];
        tax.copy_from_slice(&t.consumption_tax_nok_per_kwh);
        let brackets = t
            .power_brackets
            .iter()
            .map(|b| PowerBracket {
                upper_kw: b.upper_kw.unwrap_or(f64::INFINITY),
                fee_nok: b.fee_nok,
            })
            .collect();
        let tariff = TariffConfig {
            energy_rate_peak_nok_per_kwh: t.energy_rate_peak_nok_per_kwh,
            energy_rate_offpeak_nok_per_kwh: t.energy_rate_offpeak_nok_per_kwh,
            peak_hours: PeakHours {
                start_hour: t.peak_start_hour,
                end_hour: t.peak_end_hour,
                include_weekends: t.peak_includes_weekends,
            },
            consumption_tax_nok_per_kwh: tax,
            supplier_markup_nok_per_kwh: t.supplier_markup_nok_per_kwh,
            vat_multiplier: t.vat_multiplier,
            feed_in_premium_nok_per_kwh: t.feed_in_premium_nok_per_kwh,
            power_tariff: PowerTariff::new(brackets)?,
        };
        tariff.validate()?;
        Ok(tariff)
    }

    pub fn grid_limits(&self) -> Result<GridLimits, DispatchError> {
        let limits = GridLimits {
            import_limit_kw: self.grid.import_limit_kw,
            export_limit_kw: self.grid.export_limit_kw,
        };
        limits.validate()?;
        Ok(limits)
    }

    pub fn horizon_mode(&self) -> Result<HorizonMode, DispatchError> {
        let mode = match self.simulation.mode {
            ModeConfig::Weekly => HorizonMode::WeeklyCommitAll,
            ModeConfig::Monthly => HorizonMode::MonthlyCommitAll,
            ModeConfig::Mpc => HorizonMode::Mpc {
                horizon_hours: self.simulation.horizon_hours,
                update_frequency_hours: self.simulation.update_frequency_hours,
            },
        };
        mode.validate()?;
        Ok(mode)
    }

    pub fn time_step(&self) -> Result<TimeStep, DispatchError> {
        TimeStep::from_minutes(self.simulation.time_step_minutes)
    }
}
