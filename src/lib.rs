//! Battery dispatch optimisation for behind-the-meter PV installations.
//!
//! Given exogenous series of spot prices, PV production and on-site load,
//! the engine computes a charge/discharge/import/export/curtailment
//! schedule minimising net electricity cost under a Norwegian-style
//! commercial tariff: time-of-use energy rates, consumption tax, VAT and a
//! progressive step-function monthly power fee on peak import.
//!
//! The core pieces:
//!
//! - [`optimizer::solve_window`]: a single-window LP over a finite horizon,
//!   pricing the monthly peak through a conservative piecewise-linear
//!   surrogate of the step fee.
//! - [`driver::DispatchDriver`]: the rolling-horizon loop chaining windows
//!   across up to a year, carrying SOC and per-calendar-month peak across
//!   window and month boundaries.
//! - [`driver::post`]: exact step-tariff post-processing of the realised
//!   monthly peaks; the LP surrogate never appears in the reported total.
//!
//! The engine is library-shaped, synchronous and stateless across runs.
//! Price/weather acquisition, persistence and presentation are host
//! concerns.

pub mod config;
pub mod domain;
pub mod driver;
pub mod error;
pub mod optimizer;
pub mod telemetry;

pub use domain::{
    BatterySpec, BatterySystemState, ExogenousSeries, GridLimits, MonthKey, PeakHours,
    PowerBracket, PowerTariff, SeriesWindow, TariffConfig, TimeStep,
};
pub use driver::{CostSummary, DispatchDriver, DispatchRun, DispatchTrajectory, HorizonMode};
pub use error::DispatchError;
pub use optimizer::{
    solve_window, CostBreakdown, MonthlyPeak, OptimizationResult, WindowId, WindowSolution,
};
