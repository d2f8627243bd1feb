//! Single-window dispatch LP.
//!
//! Builds and solves the linear program for one horizon window: power
//! balance per step, SOC recursion, grid caps, per-calendar-month peak
//! linkage and the piecewise-linear power-fee surrogate. Charge/discharge
//! mutual exclusion is not enforced explicitly; with a positive wear cost
//! and efficiency loss, simultaneous charge and discharge is economically
//! dominated and collapses on its own.

use good_lp::{
    constraint, default_solver, variable, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel, Variable,
};
use ordered_float::OrderedFloat;

use crate::domain::battery::{BatterySpec, BatterySystemState};
use crate::domain::grid::GridLimits;
use crate::domain::series::{month_spans, MonthKey, SeriesWindow};
use crate::domain::tariff::TariffConfig;
use crate::error::DispatchError;
use crate::optimizer::types::{
    CostBreakdown, MonthlyPeak, OptimizationResult, WindowId, WindowSolution,
};

/// Relative tolerance for post-solve sanity checks.
const CHECK_TOL: f64 = 1e-6;

/// Solve one horizon window given the carried-in battery state.
///
/// Returns `Ok` with a tagged [`OptimizationResult`]; an `Err` means the
/// inputs themselves were unusable, not that the LP failed.
pub fn solve_window(
    state: &BatterySystemState,
    window: &SeriesWindow<'_>,
    spec: &BatterySpec,
    tariff: &TariffConfig,
    grid: &GridLimits,
) -> Result<OptimizationResult, DispatchError> {
    let n = window.len();
    if n == 0 {
        return Err(DispatchError::Input("window has no steps".into()));
    }
    let id = WindowId {
        start: window.start(),
        steps: n,
    };
    let dt = window.step.hours();
    let c_imp = tariff.import_prices(window);
    let c_exp = tariff.export_prices(window);

    let (soc_lo, soc_hi) = spec.soc_bounds_kwh();
    let p_max = spec.effective_power_kw();
    let sqrt_eta = spec.one_way_efficiency();
    let wear = spec.wear_cost_per_kwh_throughput();
    // solver noise from the previous window must not make soc_0 infeasible
    let soc_0 = state.soc_kwh.clamp(soc_lo, soc_hi);

    let months = month_spans(window.timestamps);
    let carry_month = MonthKey::of(&state.month_start);
    let ceiling = grid.import_limit_kw.max(state.monthly_peak_kw);
    let segments = tariff.power_tariff.segments(ceiling);

    let mut vars = ProblemVariables::new();
    let charge = vars.add_vector(variable().min(0.0).max(p_max), n);
    let discharge = vars.add_vector(variable().min(0.0).max(p_max), n);
    let import = vars.add_vector(variable().min(0.0).max(grid.import_limit_kw), n);
    let export = vars.add_vector(variable().min(0.0).max(grid.export_limit_kw), n);
    let curtail: Vec<Variable> = window
        .pv_kw
        .iter()
        .map(|pv| vars.add(variable().min(0.0).max(*pv)))
        .collect();
    // soc[t + 1] is the state of charge at the end of step t
    let soc = vars.add_vector(variable().min(soc_lo).max(soc_hi), n + 1);
    let peak = vars.add_vector(variable().min(0.0), months.len());
    let fill: Vec<Vec<Variable>> = (0..months.len())
        .map(|_| vars.add_vector(variable().min(0.0).max(1.0), segments.len()))
        .collect();

    let energy_cost = (0..n)
        .map(|t| (dt * c_imp[t]) * import[t] - (dt * c_exp[t]) * export[t])
        .sum::<Expression>();
    let fee_surrogate = fill
        .iter()
        .map(|zs| {
            zs.iter()
                .zip(&segments)
                .map(|(z, seg)| seg.fee_increment_nok * *z)
                .sum::<Expression>()
        })
        .sum::<Expression>();
    let wear_cost = (0..n)
        .map(|t| (wear * dt) * (charge[t] + discharge[t]))
        .sum::<Expression>();
    let objective = energy_cost + fee_surrogate + wear_cost;

    let mut model = vars.minimise(objective).using(default_solver);

    model = model.with(constraint!(soc[0] == soc_0));
    for t in 0..n {
        // SOC recursion with the symmetric sqrt(eta) split
        let soc_delta = (dt * sqrt_eta) * charge[t] - (dt / sqrt_eta) * discharge[t];
        model = model.with(constraint!(soc[t + 1] == soc[t] + soc_delta));

        // node power balance: pv - curtail + import + discharge = load + export + charge
        model = model.with(constraint!(
            import[t] + discharge[t] - curtail[t] - export[t] - charge[t]
                == window.load_kw[t] - window.pv_kw[t]
        ));
    }

    for (mi, (key, span)) in months.iter().enumerate() {
        for t in span.clone() {
            model = model.with(constraint!(peak[mi] >= import[t]));
        }
        // a window starting mid-month cannot pretend the month began fresh
        if *key == carry_month && state.monthly_peak_kw > 0.0 {
            model = model.with(constraint!(peak[mi] >= state.monthly_peak_kw));
        }
        let filled = segments
            .iter()
            .enumerate()
            .map(|(i, seg)| seg.width_kw * fill[mi][i])
            .sum::<Expression>();
        model = model.with(constraint!(peak[mi] == filled));
        for i in 0..segments.len().saturating_sub(1) {
            // ordered filling: a bracket opens only when the previous is full
            model = model.with(constraint!(fill[mi][i] >= fill[mi][i + 1]));
        }
    }

    let solution = match model.solve() {
        Ok(solution) => solution,
        Err(ResolutionError::Infeasible) => {
            return Ok(OptimizationResult::Infeasible {
                window: id,
                reason: "no dispatch satisfies power balance within grid and SOC limits".into(),
            })
        }
        Err(other) => {
            return Ok(OptimizationResult::SolverError {
                window: id,
                detail: other.to_string(),
            })
        }
    };

    let read = |vs: &[Variable]| -> Vec<f64> { vs.iter().map(|v| solution.value(*v)).collect() };
    let charge_kw = read(&charge);
    let discharge_kw = read(&discharge);
    let grid_import_kw = read(&import);
    let grid_export_kw = read(&export);
    let curtail_kw = read(&curtail);
    let soc_kwh: Vec<f64> = soc[1..].iter().map(|v| solution.value(*v)).collect();

    verify_solution(
        window,
        spec,
        grid,
        &id,
        &charge_kw,
        &discharge_kw,
        &grid_import_kw,
        &grid_export_kw,
        &curtail_kw,
        &soc_kwh,
    )?;

    let import_cost_nok: f64 = (0..n).map(|t| dt * c_imp[t] * grid_import_kw[t]).sum();
    let export_revenue_nok: f64 = (0..n).map(|t| dt * c_exp[t] * grid_export_kw[t]).sum();
    let power_fee_surrogate_nok: f64 = fill
        .iter()
        .map(|zs| {
            zs.iter()
                .zip(&segments)
                .map(|(z, seg)| seg.fee_increment_nok * solution.value(*z))
                .sum::<f64>()
        })
        .sum();
    let degradation_cost_nok: f64 = (0..n)
        .map(|t| wear * dt * (charge_kw[t] + discharge_kw[t]))
        .sum();

    let monthly_peaks = months
        .iter()
        .enumerate()
        .map(|(mi, (key, _))| MonthlyPeak {
            month: *key,
            peak_kw: solution.value(peak[mi]),
        })
        .collect();
    let window_peak_kw = grid_import_kw
        .iter()
        .copied()
        .map(OrderedFloat)
        .max()
        .map(|p| p.0)
        .unwrap_or(0.0);
    let terminal_soc_kwh = *soc_kwh.last().expect("non-empty window");

    Ok(OptimizationResult::Solved(WindowSolution {
        window: id,
        charge_kw,
        discharge_kw,
        grid_import_kw,
        grid_export_kw,
        curtail_kw,
        soc_kwh,
        terminal_soc_kwh,
        window_peak_kw,
        monthly_peaks,
        costs: CostBreakdown {
            import_cost_nok,
            export_revenue_nok,
            power_fee_surrogate_nok,
            degradation_cost_nok,
            objective_nok: import_cost_nok - export_revenue_nok
                + power_fee_surrogate_nok
                + degradation_cost_nok,
        },
    }))
}

/// Post-solve sanity checks. A violation indicates a bug in the model
/// assembly or the solver, never a data problem, and is fatal.
#[allow(clippy::too_many_arguments)]
fn verify_solution(
    window: &SeriesWindow<'_>,
    spec: &BatterySpec,
    grid: &GridLimits,
    id: &WindowId,
    charge: &[f64],
    discharge: &[f64],
    import: &[f64],
    export: &[f64],
    curtail: &[f64],
    soc: &[f64],
) -> Result<(), DispatchError> {
    let (soc_lo, soc_hi) = spec.soc_bounds_kwh();
    let soc_tol = CHECK_TOL * (1.0 + soc_hi.abs());
    for t in 0..window.len() {
        let supply = window.pv_kw[t] - curtail[t] + import[t] + discharge[t];
        let demand = window.load_kw[t] + export[t] + charge[t];
        let scale = 1.0 + supply.abs() + demand.abs();
        if (supply - demand).abs() > CHECK_TOL * scale {
            return Err(DispatchError::Invariant(format!(
                "window {id}: power balance residual {} at step {t}",
                supply - demand
            )));
        }
        if soc[t] < soc_lo - soc_tol || soc[t] > soc_hi + soc_tol {
            return Err(DispatchError::Invariant(format!(
                "window {id}: SOC {} outside [{soc_lo}, {soc_hi}] at step {t}",
                soc[t]
            )));
        }
        let cap_tol = CHECK_TOL * (1.0 + grid.import_limit_kw);
        if import[t] > grid.import_limit_kw + cap_tol
            || export[t] > grid.export_limit_kw + cap_tol
            || curtail[t] > window.pv_kw[t] + cap_tol
        {
            return Err(DispatchError::Invariant(format!(
                "window {id}: grid or curtailment cap exceeded at step {t}"
            )));
        }
    }
    Ok(())
}
