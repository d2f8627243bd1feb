//! Driver-level scenario tests: reference cases with analytically known
//! outcomes, peak carry-over, month-boundary handling and failure paths.

use chrono::{DateTime, FixedOffset, TimeZone};
use pv_battery_dispatch::{
    BatterySpec, DispatchDriver, DispatchError, ExogenousSeries, GridLimits, HorizonMode,
    PowerBracket, PowerTariff, TariffConfig, TimeStep,
};

fn start_of(year: i32, month: u32, day: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(3600)
        .unwrap()
        .with_ymd_and_hms(year, month, day, 0, 0, 0)
        .unwrap()
}

fn hourly_series(
    start: DateTime<FixedOffset>,
    spot: Vec<f64>,
    pv: Vec<f64>,
    load: Vec<f64>,
) -> ExogenousSeries {
    ExogenousSeries::from_start(start, spot, pv, load, TimeStep::Hour).unwrap()
}

fn no_battery() -> BatterySpec {
    BatterySpec {
        capacity_kwh: 0.0,
        soc_min: 0.0,
        ..BatterySpec::default()
    }
}

#[test]
fn zero_battery_matches_analytic_reference() {
    // five days, load always above PV: import is exactly load - pv and the
    // whole cost is computable by hand from the tariff
    let n = 120;
    let start = start_of(2024, 5, 6);
    let spot: Vec<f64> = (0..n).map(|t| 0.5 + 0.3 * ((t % 24) as f64 / 24.0)).collect();
    let pv: Vec<f64> = (0..n)
        .map(|t| if (8..16).contains(&(t % 24)) { 4.0 } else { 0.0 })
        .collect();
    let load: Vec<f64> = (0..n).map(|t| 10.0 + 3.0 * ((t % 24) as f64 / 23.0)).collect();
    let series = hourly_series(start, spot.clone(), pv.clone(), load.clone());

    let tariff = TariffConfig::default_no();
    let driver = DispatchDriver::new(
        no_battery(),
        tariff.clone(),
        GridLimits::symmetric(100.0),
        HorizonMode::WeeklyCommitAll,
    )
    .unwrap();
    let run = driver.run(&series, 0.0).unwrap();

    let mut expected_energy = 0.0;
    let mut expected_peak: f64 = 0.0;
    for t in 0..n {
        let net = load[t] - pv[t];
        expected_energy += tariff.import_price(&series.timestamps()[t], spot[t]) * net;
        expected_peak = expected_peak.max(net);
    }
    let expected_fee = tariff.power_tariff.step_fee(expected_peak);

    for t in 0..n {
        assert!(run.trajectory.charge_kw[t].abs() < 1e-6);
        assert!(run.trajectory.discharge_kw[t].abs() < 1e-6);
        assert!(run.trajectory.curtail_kw[t].abs() < 1e-6);
        assert!(run.trajectory.grid_export_kw[t].abs() < 1e-6);
        assert!((run.trajectory.grid_import_kw[t] - (load[t] - pv[t])).abs() < 1e-6);
    }
    assert!((run.summary.energy_import_cost_nok - expected_energy).abs() < 1e-4);
    assert_eq!(run.summary.monthly_peaks.len(), 1);
    assert!((run.summary.monthly_peaks[0].peak_kw - expected_peak).abs() < 1e-6);
    assert_eq!(run.summary.power_fee_exact_nok, expected_fee);
    assert!(
        (run.summary.total_cost_nok - (expected_energy + expected_fee)).abs() < 1e-4
    );
}

#[test]
fn monthly_peak_carries_across_windows() {
    // two 12 h windows inside one month: the second window must keep paying
    // for the 40 kW peak committed by the first
    let start = start_of(2024, 5, 6);
    let mut load = vec![40.0; 12];
    load.extend(vec![30.0; 12]);
    let series = hourly_series(start, vec![1.0; 24], vec![0.0; 24], load);

    let mut tariff = TariffConfig::flat();
    tariff.power_tariff = PowerTariff::new(vec![
        PowerBracket { upper_kw: 25.0, fee_nok: 500.0 },
        PowerBracket { upper_kw: 50.0, fee_nok: 1000.0 },
        PowerBracket { upper_kw: f64::INFINITY, fee_nok: 2000.0 },
    ])
    .unwrap();
    let driver = DispatchDriver::new(
        no_battery(),
        tariff.clone(),
        GridLimits::symmetric(100.0),
        HorizonMode::Mpc {
            horizon_hours: 12,
            update_frequency_hours: 12,
        },
    )
    .unwrap();
    let run = driver.run(&series, 0.0).unwrap();

    assert_eq!(run.summary.monthly_peaks.len(), 1);
    assert!((run.summary.monthly_peaks[0].peak_kw - 40.0).abs() < 1e-6);
    assert_eq!(
        run.summary.power_fee_exact_nok,
        tariff.power_tariff.step_fee(40.0)
    );
}

#[test]
fn month_boundary_resets_peak_and_fee() {
    // 31 days of May plus six hours of June: a large spike in the last hour
    // of May and a quiet June must be billed independently
    let start = start_of(2024, 5, 1);
    let n = 31 * 24 + 6;
    let mut load = vec![10.0; n];
    load[31 * 24 - 1] = 45.0;
    for slot in load.iter_mut().skip(31 * 24) {
        *slot = 5.0;
    }
    let series = hourly_series(start, vec![0.8; n], vec![0.0; n], load);

    let tariff = TariffConfig::default_no();
    let driver = DispatchDriver::new(
        no_battery(),
        tariff.clone(),
        GridLimits::symmetric(100.0),
        HorizonMode::WeeklyCommitAll,
    )
    .unwrap();
    let run = driver.run(&series, 0.0).unwrap();

    assert_eq!(run.summary.monthly_peaks.len(), 2);
    assert!((run.summary.monthly_peaks[0].peak_kw - 45.0).abs() < 1e-6);
    assert!((run.summary.monthly_peaks[1].peak_kw - 5.0).abs() < 1e-6);
    assert_eq!(
        run.summary.power_fee_exact_nok,
        tariff.power_tariff.step_fee(45.0) + tariff.power_tariff.step_fee(5.0)
    );
}

#[test]
fn bracket_boundary_fee_is_corrected_in_post() {
    // realised peak exactly on a bracket bound: the LP surrogate pays the
    // closed bracket, post-processing must charge the next one
    let start = start_of(2024, 5, 6);
    let series = hourly_series(start, vec![1.0; 24], vec![0.0; 24], vec![25.0; 24]);

    let mut tariff = TariffConfig::flat();
    tariff.power_tariff = PowerTariff::new(vec![
        PowerBracket { upper_kw: 25.0, fee_nok: 500.0 },
        PowerBracket { upper_kw: f64::INFINITY, fee_nok: 1500.0 },
    ])
    .unwrap();
    let driver = DispatchDriver::new(
        no_battery(),
        tariff,
        GridLimits::symmetric(100.0),
        HorizonMode::WeeklyCommitAll,
    )
    .unwrap();
    let run = driver.run(&series, 0.0).unwrap();

    assert_eq!(run.summary.power_fee_exact_nok, 1500.0);
    assert!((run.summary.power_fee_surrogate_nok - 500.0).abs() < 1e-6);
    assert!(run.summary.power_fee_surrogate_nok < run.summary.power_fee_exact_nok);
}

#[test]
fn battery_beats_no_battery_on_two_tier_prices() {
    let start = start_of(2024, 5, 6);
    let n = 72;
    let spot: Vec<f64> = (0..n)
        .map(|t| if (t % 24) < 6 { 0.2 } else { 1.2 })
        .collect();
    let load = vec![8.0; n];
    let series = hourly_series(start, spot, vec![0.0; n], load);
    let tariff = TariffConfig::default_no();
    let grid = GridLimits::symmetric(100.0);

    let with_battery = DispatchDriver::new(
        BatterySpec {
            capacity_kwh: 40.0,
            max_power_kw: 10.0,
            round_trip_efficiency: 0.92,
            soc_min: 0.05,
            soc_max: 0.95,
            ..BatterySpec::default()
        },
        tariff.clone(),
        grid,
        HorizonMode::WeeklyCommitAll,
    )
    .unwrap()
    .run(&series, 0.5)
    .unwrap();

    let without_battery = DispatchDriver::new(
        no_battery(),
        tariff,
        grid,
        HorizonMode::WeeklyCommitAll,
    )
    .unwrap()
    .run(&series, 0.0)
    .unwrap();

    assert!(
        with_battery.summary.total_cost_nok < without_battery.summary.total_cost_nok,
        "arbitrage and peak shaving should pay: {} vs {}",
        with_battery.summary.total_cost_nok,
        without_battery.summary.total_cost_nok
    );
}

#[test]
fn infeasible_window_identifies_itself() {
    // week 1 is fine, week 2 has an hour of load far beyond the connection
    let start = start_of(2024, 5, 6);
    let n = 336;
    let mut load = vec![10.0; n];
    load[200] = 200.0;
    let series = hourly_series(start, vec![1.0; n], vec![0.0; n], load);

    let driver = DispatchDriver::new(
        no_battery(),
        TariffConfig::default_no(),
        GridLimits::symmetric(50.0),
        HorizonMode::WeeklyCommitAll,
    )
    .unwrap();
    let err = driver.run(&series, 0.0).unwrap_err();

    match err {
        DispatchError::Infeasible { start: w_start, steps, .. } => {
            assert_eq!(w_start, start + chrono::Duration::hours(168));
            assert_eq!(steps, 168);
        }
        other => panic!("expected infeasible window, got {other:?}"),
    }
}
