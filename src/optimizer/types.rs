use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::domain::series::MonthKey;

/// Identifies one optimisation window: start timestamp plus horizon length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowId {
    pub start: DateTime<FixedOffset>,
    pub steps: usize,
}

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (+{} steps)", self.start, self.steps)
    }
}

/// Scalar cost breakdown of one solved window, all in NOK.
///
/// `power_fee_surrogate_nok` is the LP's piecewise-linear fee contribution;
/// the exact step fee is recomputed in post-processing and this value is
/// kept as a diagnostic only.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub import_cost_nok: f64,
    pub export_revenue_nok: f64,
    pub power_fee_surrogate_nok: f64,
    pub degradation_cost_nok: f64,
    pub objective_nok: f64,
}

/// Realised peak of one calendar month touched by a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPeak {
    pub month: MonthKey,
    pub peak_kw: f64,
}

/// All decision trajectories of a solved window, indexed by step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSolution {
    pub window: WindowId,
    pub charge_kw: Vec<f64>,
    pub discharge_kw: Vec<f64>,
    pub grid_import_kw: Vec<f64>,
    pub grid_export_kw: Vec<f64>,
    pub curtail_kw: Vec<f64>,
    /// SOC at the end of each step.
    pub soc_kwh: Vec<f64>,
    pub terminal_soc_kwh: f64,
    /// Maximum grid-import power over the window.
    pub window_peak_kw: f64,
    /// Per-month peak variables, including any carried-in peak for the
    /// month in progress at window start.
    pub monthly_peaks: Vec<MonthlyPeak>,
    pub costs: CostBreakdown,
}

/// Outcome of one window solve.
///
/// A non-`Solved` outcome is data, not a bug: the driver escalates it with
/// the window identified, and never substitutes zero dispatch for a failed
/// solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OptimizationResult {
    Solved(WindowSolution),
    Infeasible { window: WindowId, reason: String },
    SolverError { window: WindowId, detail: String },
}

impl OptimizationResult {
    pub fn is_solved(&self) -> bool {
        matches!(self, Self::Solved(_))
    }
}
