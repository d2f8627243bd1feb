//! Exact tariff post-processing.
//!
//! The LP prices the monthly peak through a continuous surrogate that
//! underestimates the true step fee between bracket bounds. The reported
//! annual cost therefore recomputes the step function on the realised
//! per-month peak import power; the surrogate total is kept as a
//! diagnostic only.

use itertools::izip;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::domain::battery::BatterySpec;
use crate::domain::series::{month_spans, ExogenousSeries};
use crate::domain::tariff::TariffConfig;
use crate::driver::DispatchTrajectory;
use crate::optimizer::MonthlyPeak;

/// Annual cost summary over a committed trajectory, all in NOK.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostSummary {
    pub energy_import_cost_nok: f64,
    pub export_revenue_nok: f64,
    /// Exact step-function power fee summed over calendar months.
    pub power_fee_exact_nok: f64,
    /// What the LP surrogate would have charged for the same peaks.
    pub power_fee_surrogate_nok: f64,
    pub degradation_cost_nok: f64,
    pub total_cost_nok: f64,
    pub monthly_peaks: Vec<MonthlyPeak>,
}

/// Recompute the economics of a committed trajectory from first principles.
pub fn summarize(
    trajectory: &DispatchTrajectory,
    series: &ExogenousSeries,
    tariff: &TariffConfig,
    spec: &BatterySpec,
) -> CostSummary {
    debug_assert_eq!(trajectory.len(), series.len());
    let dt = trajectory.step.hours();

    let mut energy_import_cost_nok = 0.0;
    let mut export_revenue_nok = 0.0;
    for (ts, spot, import, export) in izip!(
        &trajectory.timestamps,
        series.spot_nok_per_kwh(),
        &trajectory.grid_import_kw,
        &trajectory.grid_export_kw
    ) {
        energy_import_cost_nok += dt * tariff.import_price(ts, *spot) * import;
        export_revenue_nok += dt * tariff.export_price(*spot) * export;
    }

    let monthly_peaks: Vec<MonthlyPeak> = month_spans(&trajectory.timestamps)
        .into_iter()
        .map(|(month, span)| MonthlyPeak {
            month,
            peak_kw: trajectory.grid_import_kw[span]
                .iter()
                .copied()
                .map(OrderedFloat)
                .max()
                .map(|p| p.0)
                .unwrap_or(0.0),
        })
        .collect();

    let power_fee_exact_nok: f64 = monthly_peaks
        .iter()
        .map(|p| tariff.power_tariff.step_fee(p.peak_kw))
        .sum();
    let power_fee_surrogate_nok: f64 = monthly_peaks
        .iter()
        .map(|p| tariff.power_tariff.piecewise_fee(p.peak_kw))
        .sum();

    let wear = spec.wear_cost_per_kwh_throughput();
    let degradation_cost_nok: f64 = izip!(&trajectory.charge_kw, &trajectory.discharge_kw)
        .map(|(c, d)| wear * dt * (c + d))
        .sum();

    CostSummary {
        energy_import_cost_nok,
        export_revenue_nok,
        power_fee_exact_nok,
        power_fee_surrogate_nok,
        degradation_cost_nok,
        total_cost_nok: energy_import_cost_nok - export_revenue_nok
            + power_fee_exact_nok
            + degradation_cost_nok,
        monthly_peaks,
    }
}
