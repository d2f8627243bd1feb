use chrono::{DateTime, FixedOffset};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::domain::series::{month_start, MonthKey, TimeStep};
use crate::error::DispatchError;
use crate::optimizer::WindowSolution;

/// Physical and economic parameters of the battery system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatterySpec {
    pub capacity_kwh: f64,
    pub max_power_kw: f64,
    /// Round-trip efficiency, split symmetrically as sqrt per leg.
    pub round_trip_efficiency: f64,
    /// SOC bounds as fractions of capacity.
    pub soc_min: f64,
    pub soc_max: f64,
    /// Battery cost per kWh of capacity; 0 disables the wear term.
    pub wear_cost_nok_per_kwh: f64,
    /// End-of-life degradation fraction (0.20 = retire at 80% state of health).
    pub eol_degradation: f64,
    /// State-of-health fraction lost per equivalent full cycle; 0 disables
    /// degradation tracking.
    pub degradation_per_cycle: f64,
}

impl Default for BatterySpec {
    fn default() -> Self {
        Self {
            capacity_kwh: 100.0,
            max_power_kw: 50.0,
            round_trip_efficiency: 0.90,
            soc_min: 0.05,
            soc_max: 0.95,
            wear_cost_nok_per_kwh: 0.0,
            eol_degradation: 0.20,
            degradation_per_cycle: 0.0,
        }
    }
}

impl BatterySpec {
    pub fn validate(&self) -> Result<(), DispatchError> {
        if !self.capacity_kwh.is_finite() || self.capacity_kwh < 0.0 {
            return Err(DispatchError::Config(format!(
                "capacity_kwh must be finite and non-negative, got {}",
                self.capacity_kwh
            )));
        }
        if !self.max_power_kw.is_finite() || self.max_power_kw < 0.0 {
            return Err(DispatchError::Config(format!(
                "max_power_kw must be finite and non-negative, got {}",
                self.max_power_kw
            )));
        }
        if !(self.round_trip_efficiency > 0.0 && self.round_trip_efficiency <= 1.0) {
            return Err(DispatchError::Config(format!(
                "round_trip_efficiency must be in (0, 1], got {}",
                self.round_trip_efficiency
            )));
        }
        if !(0.0..=1.0).contains(&self.soc_min)
            || !(0.0..=1.0).contains(&self.soc_max)
            || self.soc_min >= self.soc_max
        {
            return Err(DispatchError::Config(format!(
                "SOC bounds must satisfy 0 <= soc_min < soc_max <= 1, got {}..{}",
                self.soc_min, self.soc_max
            )));
        }
        if !self.wear_cost_nok_per_kwh.is_finite() || self.wear_cost_nok_per_kwh < 0.0 {
            return Err(DispatchError::Config(format!(
                "wear_cost_nok_per_kwh must be finite and non-negative, got {}",
                self.wear_cost_nok_per_kwh
            )));
        }
        if !(self.eol_degradation > 0.0 && self.eol_degradation <= 1.0) {
            return Err(DispatchError::Config(format!(
                "eol_degradation must be in (0, 1], got {}",
                self.eol_degradation
            )));
        }
        if !self.degradation_per_cycle.is_finite()
            || !(0.0..=1.0).contains(&self.degradation_per_cycle)
        {
            return Err(DispatchError::Config(format!(
                "degradation_per_cycle must be in [0, 1], got {}",
                self.degradation_per_cycle
            )));
        }
        Ok(())
    }

    /// Per-leg efficiency: sqrt of the round-trip value.
    pub fn one_way_efficiency(&self) -> f64 {
        self.round_trip_efficiency.sqrt()
    }

    /// SOC bounds in kWh.
    pub fn soc_bounds_kwh(&self) -> (f64, f64) {
        (
            self.soc_min * self.capacity_kwh,
            self.soc_max * self.capacity_kwh,
        )
    }

    /// Charge/discharge power bound. A zero-capacity battery cannot move
    /// power regardless of its rating.
    pub fn effective_power_kw(&self) -> f64 {
        if self.capacity_kwh == 0.0 {
            0.0
        } else {
            self.max_power_kw
        }
    }

    /// Wear cost per kWh of charge or discharge throughput. The divisor is
    /// the usable degradation window d_eol, not full degradation: the
    /// battery is replaced once d_eol of health is gone.
    pub fn wear_cost_per_kwh_throughput(&self) -> f64 {
        if self.wear_cost_nok_per_kwh == 0.0 {
            0.0
        } else {
            self.wear_cost_nok_per_kwh / self.eol_degradation
        }
    }
}

/// Mutable battery system state threaded through the rolling-horizon driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatterySystemState {
    pub soc_kwh: f64,
    /// First instant of the calendar month currently being accumulated.
    pub month_start: DateTime<FixedOffset>,
    /// Running maximum grid-import power since `month_start`.
    pub monthly_peak_kw: f64,
    /// Cumulative state-of-health loss, capped at the spec's d_eol.
    pub cumulative_degradation: f64,
}

impl BatterySystemState {
    pub fn new(
        spec: &BatterySpec,
        initial_soc_fraction: f64,
        first_timestamp: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            soc_kwh: initial_soc_fraction * spec.capacity_kwh,
            month_start: month_start(&first_timestamp),
            monthly_peak_kw: 0.0,
            cumulative_degradation: 0.0,
        }
    }

    pub fn current_month(&self) -> MonthKey {
        MonthKey::of(&self.month_start)
    }

    /// Advance state over the committed prefix of a window solution.
    ///
    /// Scans grid-import samples in timestamp order, accumulating the
    /// monthly peak. Crossing into a new calendar month resets the peak to
    /// zero and advances `month_start` before the scan continues.
    pub fn update_from_result(
        &mut self,
        spec: &BatterySpec,
        result: &WindowSolution,
        timestamps: &[DateTime<FixedOffset>],
        step: TimeStep,
        commit_len: usize,
    ) {
        debug_assert!(commit_len > 0 && commit_len <= timestamps.len());
        for (ts, import) in timestamps
            .iter()
            .zip(&result.grid_import_kw)
            .take(commit_len)
        {
            if MonthKey::of(ts) != MonthKey::of(&self.month_start) {
                self.monthly_peak_kw = 0.0;
                self.month_start = month_start(ts);
            }
            self.monthly_peak_kw = *OrderedFloat(self.monthly_peak_kw).max(OrderedFloat(*import));
        }

        self.soc_kwh = result.soc_kwh[commit_len - 1];

        if spec.degradation_per_cycle > 0.0 && spec.capacity_kwh > 0.0 {
            let throughput_kwh: f64 = result
                .charge_kw
                .iter()
                .zip(&result.discharge_kw)
                .take(commit_len)
                .map(|(c, d)| (c + d) * step.hours())
                .sum();
            // one equivalent full cycle = capacity charged plus capacity discharged
            let cycles = throughput_kwh / (2.0 * spec.capacity_kwh);
            self.cumulative_degradation = (self.cumulative_degradation
                + cycles * spec.degradation_per_cycle)
                .min(spec.eol_degradation);
        }
    }

    /// Debug-build sanity check of the state invariants.
    pub fn assert_invariants(&self, spec: &BatterySpec) {
        let (lo, hi) = spec.soc_bounds_kwh();
        debug_assert!(
            self.soc_kwh >= lo - 1e-6 && self.soc_kwh <= hi + 1e-6,
            "SOC {} outside [{lo}, {hi}]",
            self.soc_kwh
        );
        debug_assert!(
            self.monthly_peak_kw >= 0.0,
            "negative monthly peak {}",
            self.monthly_peak_kw
        );
        debug_assert!(
            self.cumulative_degradation >= 0.0
                && self.cumulative_degradation <= spec.eol_degradation + 1e-12,
            "cumulative degradation {} outside [0, {}]",
            self.cumulative_degradation,
            spec.eol_degradation
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::{CostBreakdown, WindowId};
    use chrono::TimeZone;

    fn hourly(from: DateTime<FixedOffset>, n: usize) -> Vec<DateTime<FixedOffset>> {
        (0..n as i64)
            .map(|i| from + chrono::Duration::hours(i))
            .collect()
    }

    fn solution(import: Vec<f64>, soc: Vec<f64>, start: DateTime<FixedOffset>) -> WindowSolution {
        let n = import.len();
        WindowSolution {
            window: WindowId { start, steps: n },
            charge_kw: vec![0.0; n],
            discharge_kw: vec![0.0; n],
            grid_import_kw: import,
            grid_export_kw: vec![0.0; n],
            curtail_kw: vec![0.0; n],
            soc_kwh: soc,
            terminal_soc_kwh: 0.0,
            window_peak_kw: 0.0,
            monthly_peaks: vec![],
            costs: CostBreakdown::default(),
        }
    }

    #[test]
    fn peak_accumulates_within_month() {
        let spec = BatterySpec::default();
        let start = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 10, 0, 0, 0)
            .unwrap();
        let mut state = BatterySystemState::new(&spec, 0.5, start);
        let ts = hourly(start, 3);
        let sol = solution(vec![10.0, 40.0, 25.0], vec![50.0, 50.0, 50.0], start);

        state.update_from_result(&spec, &sol, &ts, TimeStep::Hour, 3);
        assert_eq!(state.monthly_peak_kw, 40.0);
        assert_eq!(state.soc_kwh, 50.0);

        // a later, lower window must not lower the peak
        let ts2 = hourly(start + chrono::Duration::hours(3), 2);
        let sol2 = solution(vec![5.0, 12.0], vec![50.0, 50.0], ts2[0]);
        state.update_from_result(&spec, &sol2, &ts2, TimeStep::Hour, 2);
        assert_eq!(state.monthly_peak_kw, 40.0);
    }

    #[test]
    fn month_boundary_resets_peak_mid_scan() {
        let spec = BatterySpec::default();
        let offset = FixedOffset::east_opt(3600).unwrap();
        // last two hours of May, first two of June
        let start = offset.with_ymd_and_hms(2024, 5, 31, 22, 0, 0).unwrap();
        let mut state = BatterySystemState::new(&spec, 0.5, start);
        let ts = hourly(start, 4);
        let sol = solution(vec![60.0, 55.0, 8.0, 12.0], vec![50.0; 4], start);

        state.update_from_result(&spec, &sol, &ts, TimeStep::Hour, 4);
        assert_eq!(state.monthly_peak_kw, 12.0);
        assert_eq!(state.current_month(), MonthKey { year: 2024, month: 6 });
        assert_eq!(
            state.month_start,
            offset.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn commit_prefix_ignores_uncommitted_tail() {
        let spec = BatterySpec::default();
        let start = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 1, 0, 0, 0)
            .unwrap();
        let mut state = BatterySystemState::new(&spec, 0.5, start);
        let ts = hourly(start, 4);
        let sol = solution(
            vec![10.0, 20.0, 90.0, 90.0],
            vec![40.0, 45.0, 50.0, 55.0],
            start,
        );

        state.update_from_result(&spec, &sol, &ts, TimeStep::Hour, 2);
        assert_eq!(state.monthly_peak_kw, 20.0);
        assert_eq!(state.soc_kwh, 45.0);
    }

    #[test]
    fn degradation_accumulates_and_caps() {
        let spec = BatterySpec {
            capacity_kwh: 10.0,
            degradation_per_cycle: 0.1,
            eol_degradation: 0.2,
            ..BatterySpec::default()
        };
        let start = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 1, 0, 0, 0)
            .unwrap();
        let mut state = BatterySystemState::new(&spec, 0.5, start);
        let ts = hourly(start, 2);
        let mut sol = solution(vec![0.0, 0.0], vec![5.0, 5.0], start);
        sol.charge_kw = vec![10.0, 10.0];
        sol.discharge_kw = vec![10.0, 10.0];

        // 40 kWh throughput over a 10 kWh battery = 2 equivalent cycles
        state.update_from_result(&spec, &sol, &ts, TimeStep::Hour, 2);
        assert!((state.cumulative_degradation - 0.2).abs() < 1e-12);

        // further cycling stays capped at d_eol
        state.update_from_result(&spec, &sol, &ts, TimeStep::Hour, 2);
        assert!((state.cumulative_degradation - 0.2).abs() < 1e-12);
    }

    #[test]
    fn validate_rejects_inverted_soc_bounds() {
        let spec = BatterySpec {
            soc_min: 0.9,
            soc_max: 0.2,
            ..BatterySpec::default()
        };
        assert!(matches!(spec.validate(), Err(DispatchError::Config(_))));
    }

    #[test]
    fn zero_capacity_disables_power() {
        let spec = BatterySpec {
            capacity_kwh: 0.0,
            soc_min: 0.0,
            ..BatterySpec::default()
        };
        assert!(spec.validate().is_ok());
        assert_eq!(spec.effective_power_kw(), 0.0);
        assert_eq!(spec.soc_bounds_kwh(), (0.0, 0.0));
    }
}
