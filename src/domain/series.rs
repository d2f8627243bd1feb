use std::ops::Range;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Uniform step duration of a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeStep {
    /// 15-minute resolution.
    Quarter,
    /// Hourly resolution.
    Hour,
}

impl TimeStep {
    pub fn from_minutes(minutes: u32) -> Result<Self, DispatchError> {
        match minutes {
            15 => Ok(Self::Quarter),
            60 => Ok(Self::Hour),
            other => Err(DispatchError::Config(format!(
                "unsupported time step: {other} minutes (expected 15 or 60)"
            ))),
        }
    }

    pub fn hours(self) -> f64 {
        match self {
            Self::Quarter => 0.25,
            Self::Hour => 1.0,
        }
    }

    pub fn duration(self) -> chrono::Duration {
        match self {
            Self::Quarter => chrono::Duration::minutes(15),
            Self::Hour => chrono::Duration::hours(1),
        }
    }

    pub fn steps_per_hour(self) -> usize {
        match self {
            Self::Quarter => 4,
            Self::Hour => 1,
        }
    }
}

/// Calendar month identifier in the local timezone of the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn of(ts: &DateTime<FixedOffset>) -> Self {
        Self {
            year: ts.year(),
            month: ts.month(),
        }
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Truncate a timestamp to the first instant of its calendar month,
/// keeping the timestamp's own UTC offset.
pub fn month_start(ts: &DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let first = NaiveDate::from_ymd_opt(ts.year(), ts.month(), 1)
        .expect("month start of a valid date")
        .and_hms_opt(0, 0, 0)
        .expect("midnight");
    match first.and_local_timezone(*ts.offset()) {
        chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => dt,
        chrono::LocalResult::None => DateTime::from_naive_utc_and_offset(first, *ts.offset()),
    }
}

/// Contiguous index spans of a timestamp slice grouped by calendar month.
pub fn month_spans(timestamps: &[DateTime<FixedOffset>]) -> Vec<(MonthKey, Range<usize>)> {
    timestamps
        .iter()
        .enumerate()
        .chunk_by(|(_, ts)| MonthKey::of(ts))
        .into_iter()
        .map(|(key, mut group)| {
            let first = group.next().map(|(i, _)| i).unwrap_or(0);
            let last = group.last().map(|(i, _)| i).unwrap_or(first);
            (key, first..last + 1)
        })
        .collect()
}

/// Aligned exogenous inputs over the simulation period.
///
/// Immutable once built; the driver slices it into windows. Spot prices may
/// be negative, PV and load may not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExogenousSeries {
    timestamps: Vec<DateTime<FixedOffset>>,
    spot_nok_per_kwh: Vec<f64>,
    pv_kw: Vec<f64>,
    load_kw: Vec<f64>,
    step: TimeStep,
}

impl ExogenousSeries {
    pub fn new(
        timestamps: Vec<DateTime<FixedOffset>>,
        spot_nok_per_kwh: Vec<f64>,
        pv_kw: Vec<f64>,
        load_kw: Vec<f64>,
        step: TimeStep,
    ) -> Result<Self, DispatchError> {
        let n = timestamps.len();
        if n == 0 {
            return Err(DispatchError::Input("series is empty".into()));
        }
        if spot_nok_per_kwh.len() != n || pv_kw.len() != n || load_kw.len() != n {
            return Err(DispatchError::Input(format!(
                "series length mismatch: {} timestamps, {} prices, {} pv, {} load",
                n,
                spot_nok_per_kwh.len(),
                pv_kw.len(),
                load_kw.len()
            )));
        }
        let dt = step.duration();
        for (i, pair) in timestamps.windows(2).enumerate() {
            if pair[1] - pair[0] != dt {
                return Err(DispatchError::Input(format!(
                    "non-uniform timestamps at index {}: {} -> {}",
                    i, pair[0], pair[1]
                )));
            }
        }
        for (i, s) in spot_nok_per_kwh.iter().enumerate() {
            if !s.is_finite() {
                return Err(DispatchError::Input(format!(
                    "spot price at index {i} is not finite: {s}"
                )));
            }
        }
        for (name, values) in [("pv", &pv_kw), ("load", &load_kw)] {
            for (i, v) in values.iter().enumerate() {
                if !v.is_finite() || *v < 0.0 {
                    return Err(DispatchError::Input(format!(
                        "{name} at index {i} must be finite and non-negative, got {v}"
                    )));
                }
            }
        }
        Ok(Self {
            timestamps,
            spot_nok_per_kwh,
            pv_kw,
            load_kw,
            step,
        })
    }

    /// Convenience constructor generating uniform timestamps from a start.
    pub fn from_start(
        start: DateTime<FixedOffset>,
        spot_nok_per_kwh: Vec<f64>,
        pv_kw: Vec<f64>,
        load_kw: Vec<f64>,
        step: TimeStep,
    ) -> Result<Self, DispatchError> {
        let timestamps = (0..spot_nok_per_kwh.len() as i64)
            .map(|i| start + step.duration() * i as i32)
            .collect();
        Self::new(timestamps, spot_nok_per_kwh, pv_kw, load_kw, step)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn step(&self) -> TimeStep {
        self.step
    }

    pub fn timestamps(&self) -> &[DateTime<FixedOffset>] {
        &self.timestamps
    }

    pub fn spot_nok_per_kwh(&self) -> &[f64] {
        &self.spot_nok_per_kwh
    }

    pub fn pv_kw(&self) -> &[f64] {
        &self.pv_kw
    }

    pub fn load_kw(&self) -> &[f64] {
        &self.load_kw
    }

    /// Borrow a horizon slice for one optimiser window.
    pub fn slice(&self, range: Range<usize>) -> SeriesWindow<'_> {
        SeriesWindow {
            timestamps: &self.timestamps[range.clone()],
            spot_nok_per_kwh: &self.spot_nok_per_kwh[range.clone()],
            pv_kw: &self.pv_kw[range.clone()],
            load_kw: &self.load_kw[range],
            step: self.step,
        }
    }
}

/// Borrowed view of one optimisation window.
#[derive(Debug, Clone, Copy)]
pub struct SeriesWindow<'a> {
    pub timestamps: &'a [DateTime<FixedOffset>],
    pub spot_nok_per_kwh: &'a [f64],
    pub pv_kw: &'a [f64],
    pub load_kw: &'a [f64],
    pub step: TimeStep,
}

impl SeriesWindow<'_> {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn start(&self) -> DateTime<FixedOffset> {
        self.timestamps[0]
    }
}
