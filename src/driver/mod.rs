//! Rolling-horizon driver.
//!
//! Chains window solves across the simulation period, committing each
//! window's prefix into the annual trajectory and carrying battery state
//! (SOC, monthly peak) across windows and month boundaries. The driver is
//! synchronous and owns its state; parallelism across scenarios is the
//! host's concern.

pub mod post;
pub mod windows;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::battery::{BatterySpec, BatterySystemState};
use crate::domain::grid::GridLimits;
use crate::domain::series::{ExogenousSeries, SeriesWindow, TimeStep};
use crate::domain::tariff::TariffConfig;
use crate::error::DispatchError;
use crate::optimizer::{solve_window, OptimizationResult, WindowSolution};

pub use post::CostSummary;
pub use windows::{plan_windows, WindowPlan};

/// Window scheduling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizonMode {
    /// 168 h windows, each solved once and committed in full.
    WeeklyCommitAll,
    /// Calendar-month windows, committed in full; 12 solves per year.
    MonthlyCommitAll,
    /// Sliding horizon: solve `horizon_hours`, commit the first
    /// `update_frequency_hours`, slide, repeat.
    Mpc {
        horizon_hours: u32,
        update_frequency_hours: u32,
    },
}

impl HorizonMode {
    pub fn validate(&self) -> Result<(), DispatchError> {
        if let Self::Mpc {
            horizon_hours,
            update_frequency_hours,
        } = self
        {
            if *update_frequency_hours == 0 || *horizon_hours == 0 {
                return Err(DispatchError::Config(
                    "MPC horizon and update frequency must be positive".into(),
                ));
            }
            if update_frequency_hours > horizon_hours {
                return Err(DispatchError::Config(format!(
                    "MPC update frequency ({update_frequency_hours} h) exceeds horizon \
                     ({horizon_hours} h)"
                )));
            }
        }
        Ok(())
    }
}

/// Stitched per-step dispatch over the whole simulation period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchTrajectory {
    pub timestamps: Vec<DateTime<FixedOffset>>,
    pub charge_kw: Vec<f64>,
    pub discharge_kw: Vec<f64>,
    pub grid_import_kw: Vec<f64>,
    pub grid_export_kw: Vec<f64>,
    pub curtail_kw: Vec<f64>,
    pub soc_kwh: Vec<f64>,
    pub step: TimeStep,
}

impl DispatchTrajectory {
    fn with_capacity(n: usize, step: TimeStep) -> Self {
        Self {
            timestamps: Vec::with_capacity(n),
            charge_kw: Vec::with_capacity(n),
            discharge_kw: Vec::with_capacity(n),
            grid_import_kw: Vec::with_capacity(n),
            grid_export_kw: Vec::with_capacity(n),
            curtail_kw: Vec::with_capacity(n),
            soc_kwh: Vec::with_capacity(n),
            step,
        }
    }

    fn commit(&mut self, solution: &WindowSolution, window: &SeriesWindow<'_>, commit: usize) {
        self.timestamps.extend_from_slice(&window.timestamps[..commit]);
        self.charge_kw.extend_from_slice(&solution.charge_kw[..commit]);
        self.discharge_kw
            .extend_from_slice(&solution.discharge_kw[..commit]);
        self.grid_import_kw
            .extend_from_slice(&solution.grid_import_kw[..commit]);
        self.grid_export_kw
            .extend_from_slice(&solution.grid_export_kw[..commit]);
        self.curtail_kw.extend_from_slice(&solution.curtail_kw[..commit]);
        self.soc_kwh.extend_from_slice(&solution.soc_kwh[..commit]);
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// A completed simulation: the stitched trajectory plus its exact-tariff
/// cost summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRun {
    pub trajectory: DispatchTrajectory,
    pub summary: CostSummary,
}

/// Rolling-horizon dispatch driver. One instance per scenario; instances
/// share nothing.
#[derive(Debug, Clone)]
pub struct DispatchDriver {
    spec: BatterySpec,
    tariff: TariffConfig,
    grid: GridLimits,
    mode: HorizonMode,
}

impl DispatchDriver {
    /// Validates all configuration up front; construction is the only place
    /// configuration errors can surface.
    pub fn new(
        spec: BatterySpec,
        tariff: TariffConfig,
        grid: GridLimits,
        mode: HorizonMode,
    ) -> Result<Self, DispatchError> {
        spec.validate()?;
        tariff.validate()?;
        grid.validate()?;
        mode.validate()?;
        Ok(Self {
            spec,
            tariff,
            grid,
            mode,
        })
    }

    pub fn mode(&self) -> HorizonMode {
        self.mode
    }

    /// Run the full simulation. An infeasible or failed window aborts the
    /// run with the offending window identified; all earlier windows were
    /// already committed into driver state at that point.
    pub fn run(
        &self,
        series: &ExogenousSeries,
        initial_soc_fraction: f64,
    ) -> Result<DispatchRun, DispatchError> {
        if !(self.spec.soc_min..=self.spec.soc_max).contains(&initial_soc_fraction) {
            return Err(DispatchError::Config(format!(
                "initial SOC fraction {initial_soc_fraction} outside [{}, {}]",
                self.spec.soc_min, self.spec.soc_max
            )));
        }
        let plans = plan_windows(series, &self.mode)?;
        let mut state =
            BatterySystemState::new(&self.spec, initial_soc_fraction, series.timestamps()[0]);
        let mut trajectory = DispatchTrajectory::with_capacity(series.len(), series.step());

        for plan in &plans {
            let window = series.slice(plan.start..plan.end);
            debug!(
                start = %window.start(),
                steps = window.len(),
                commit = plan.commit,
                soc_kwh = state.soc_kwh,
                monthly_peak_kw = state.monthly_peak_kw,
                "solving window"
            );
            match solve_window(&state, &window, &self.spec, &self.tariff, &self.grid)? {
                OptimizationResult::Solved(solution) => {
                    trajectory.commit(&solution, &window, plan.commit);
                    state.update_from_result(
                        &self.spec,
                        &solution,
                        window.timestamps,
                        series.step(),
                        plan.commit,
                    );
                    state.assert_invariants(&self.spec);
                }
                OptimizationResult::Infeasible { window, reason } => {
                    warn!(window = %window, %reason, "window infeasible, aborting run");
                    return Err(DispatchError::Infeasible {
                        start: window.start,
                        steps: window.steps,
                        reason,
                    });
                }
                OptimizationResult::SolverError { window, detail } => {
                    warn!(window = %window, %detail, "solver failure, aborting run");
                    return Err(DispatchError::Solver {
                        start: window.start,
                        steps: window.steps,
                        detail,
                    });
                }
            }
        }

        let summary = post::summarize(&trajectory, series, &self.tariff, &self.spec);
        info!(
            windows = plans.len(),
            total_cost_nok = summary.total_cost_nok,
            power_fee_exact_nok = summary.power_fee_exact_nok,
            "dispatch run complete"
        );
        Ok(DispatchRun {
            trajectory,
            summary,
        })
    }
}
