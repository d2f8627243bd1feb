//! Tariff and cost model.
//!
//! Pure functions over [`TariffConfig`]: per-step import/export unit prices,
//! the exact step-function monthly power fee, and the continuous
//! piecewise-linear decomposition of that fee used inside the LP.

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::domain::series::SeriesWindow;
use crate::error::DispatchError;

/// Weekday-and-hour predicate selecting the peak energy rate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PeakHours {
    pub start_hour: u8,
    pub end_hour: u8,
    /// When false, Saturday and Sunday are always off-peak.
    pub include_weekends: bool,
}

impl Default for PeakHours {
    fn default() -> Self {
        // Mon-Fri 06:00-22:00 local, the common Norwegian grid-company window
        Self {
            start_hour: 6,
            end_hour: 22,
            include_weekends: false,
        }
    }
}

impl PeakHours {
    pub fn contains(&self, weekday: Weekday, hour: u32) -> bool {
        let weekend = matches!(weekday, Weekday::Sat | Weekday::Sun);
        if weekend && !self.include_weekends {
            return false;
        }
        hour >= u32::from(self.start_hour) && hour < u32::from(self.end_hour)
    }
}

/// One bracket of the progressive power tariff. `upper_kw` may be
/// `f64::INFINITY` for the open-ended top bracket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PowerBracket {
    pub upper_kw: f64,
    pub fee_nok: f64,
}

/// One segment of the piecewise-linear fee surrogate.
///
/// The fee coefficient is the *increment* over the previous bracket, so a
/// fully filled prefix of segments reproduces the bracket fee exactly and
/// the surrogate never exceeds the step function.
#[derive(Debug, Clone, Copy)]
pub struct FeeSegment {
    pub width_kw: f64,
    pub fee_increment_nok: f64,
}

/// Ordered bracket table defining the step-function monthly power fee.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<PowerBracket>", into = "Vec<PowerBracket>")]
pub struct PowerTariff {
    brackets: Vec<PowerBracket>,
}

impl TryFrom<Vec<PowerBracket>> for PowerTariff {
    type Error = DispatchError;

    fn try_from(brackets: Vec<PowerBracket>) -> Result<Self, Self::Error> {
        Self::new(brackets)
    }
}

impl From<PowerTariff> for Vec<PowerBracket> {
    fn from(tariff: PowerTariff) -> Self {
        tariff.brackets
    }
}

impl PowerTariff {
    /// Validates the bracket table: non-empty, strictly increasing positive
    /// upper bounds, non-negative and non-decreasing fees. Non-decreasing
    /// fees keep every surrogate increment non-negative.
    pub fn new(brackets: Vec<PowerBracket>) -> Result<Self, DispatchError> {
        if brackets.is_empty() {
            return Err(DispatchError::Config("power tariff table is empty".into()));
        }
        let mut prev_upper = 0.0;
        let mut prev_fee = 0.0;
        for (i, b) in brackets.iter().enumerate() {
            if b.upper_kw.is_nan() || b.upper_kw <= prev_upper {
                return Err(DispatchError::Config(format!(
                    "power bracket {i} upper bound {} is not above previous bound {prev_upper}",
                    b.upper_kw
                )));
            }
            if !b.fee_nok.is_finite() || b.fee_nok < prev_fee {
                return Err(DispatchError::Config(format!(
                    "power bracket {i} fee {} must be finite and not below previous fee {prev_fee}",
                    b.fee_nok
                )));
            }
            prev_upper = b.upper_kw;
            prev_fee = b.fee_nok;
        }
        Ok(Self { brackets })
    }

    pub fn brackets(&self) -> &[PowerBracket] {
        &self.brackets
    }

    /// Exact monthly fee for a realised peak. Right-continuous at bracket
    /// upper bounds; peaks beyond the last finite bound land in the top
    /// bracket.
    pub fn step_fee(&self, peak_kw: f64) -> f64 {
        let peak = peak_kw.max(0.0);
        for b in &self.brackets {
            if peak < b.upper_kw {
                return b.fee_nok;
            }
        }
        self.brackets.last().map(|b| b.fee_nok).unwrap_or(0.0)
    }

    /// Segment decomposition for the LP surrogate. The open top bracket is
    /// clamped at `ceiling_kw`; segments above the ceiling are dropped, so
    /// the caller must pick a ceiling at least as large as any reachable
    /// peak (grid import limit, carried-in monthly peak).
    pub fn segments(&self, ceiling_kw: f64) -> Vec<FeeSegment> {
        let mut segments = Vec::with_capacity(self.brackets.len());
        let mut prev_upper = 0.0;
        let mut prev_fee = 0.0;
        for b in &self.brackets {
            if prev_upper >= ceiling_kw {
                break;
            }
            let upper = b.upper_kw.min(ceiling_kw);
            segments.push(FeeSegment {
                width_kw: upper - prev_upper,
                fee_increment_nok: b.fee_nok - prev_fee,
            });
            prev_upper = upper;
            prev_fee = b.fee_nok;
        }
        segments
    }

    /// The continuous surrogate evaluated directly, for diagnostics and
    /// tests. Underestimates `step_fee` everywhere, with equality at bracket
    /// upper bounds.
    pub fn piecewise_fee(&self, peak_kw: f64) -> f64 {
        let ceiling = peak_kw.max(
            self.brackets
                .iter()
                .filter(|b| b.upper_kw.is_finite())
                .map(|b| b.upper_kw)
                .fold(1.0, f64::max),
        );
        let mut fee = 0.0;
        let mut prev_upper = 0.0;
        for seg in self.segments(ceiling) {
            let fill = ((peak_kw - prev_upper) / seg.width_kw).clamp(0.0, 1.0);
            fee += seg.fee_increment_nok * fill;
            prev_upper += seg.width_kw;
        }
        fee
    }
}

/// Full commercial tariff: time-of-use energy rates, monthly consumption
/// tax, supplier markup, VAT, feed-in premium, and the power-fee brackets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TariffConfig {
    pub energy_rate_peak_nok_per_kwh: f64,
    pub energy_rate_offpeak_nok_per_kwh: f64,
    pub peak_hours: PeakHours,
    /// Consumption tax per calendar month, index 0 = January.
    pub consumption_tax_nok_per_kwh: [f64; 12],
    pub supplier_markup_nok_per_kwh: f64,
    pub vat_multiplier: f64,
    pub feed_in_premium_nok_per_kwh: f64,
    pub power_tariff: PowerTariff,
}

impl TariffConfig {
    /// A representative Norwegian commercial tariff. Convenience default for
    /// tests and demos; real runs load their own table.
    pub fn default_no() -> Self {
        let brackets = vec![
            PowerBracket { upper_kw: 2.0, fee_nok: 136.0 },
            PowerBracket { upper_kw: 5.0, fee_nok: 232.0 },
            PowerBracket { upper_kw: 10.0, fee_nok: 372.0 },
            PowerBracket { upper_kw: 15.0, fee_nok: 572.0 },
            PowerBracket { upper_kw: 20.0, fee_nok: 772.0 },
            PowerBracket { upper_kw: 25.0, fee_nok: 972.0 },
            PowerBracket { upper_kw: 50.0, fee_nok: 1772.0 },
            PowerBracket { upper_kw: 75.0, fee_nok: 2572.0 },
            PowerBracket { upper_kw: 100.0, fee_nok: 3372.0 },
            PowerBracket { upper_kw: f64::INFINITY, fee_nok: 5600.0 },
        ];
        // Reduced electricity tax Jan-Mar, standard rate the rest of the year
        let mut tax = [0.1644; 12];
        tax[0] = 0.0951;
        tax[1] = 0.0951;
        tax[2] = 0.0951;
        Self {
            energy_rate_peak_nok_per_kwh: 0.296,
            energy_rate_offpeak_nok_per_kwh: 0.176,
            peak_hours: PeakHours::default(),
            consumption_tax_nok_per_kwh: tax,
            supplier_markup_nok_per_kwh: 0.05,
            vat_multiplier: 1.25,
            feed_in_premium_nok_per_kwh: 0.04,
            power_tariff: PowerTariff::new(brackets).expect("static bracket table"),
        }
    }

    /// A flat tariff with no fees, taxes or power brackets beyond a single
    /// open bracket. Import price equals spot, export price equals spot.
    pub fn flat() -> Self {
        Self {
            energy_rate_peak_nok_per_kwh: 0.0,
            energy_rate_offpeak_nok_per_kwh: 0.0,
            peak_hours: PeakHours::default(),
            consumption_tax_nok_per_kwh: [0.0; 12],
            supplier_markup_nok_per_kwh: 0.0,
            vat_multiplier: 1.0,
            feed_in_premium_nok_per_kwh: 0.0,
            power_tariff: PowerTariff::new(vec![PowerBracket {
                upper_kw: f64::INFINITY,
                fee_nok: 0.0,
            }])
            .expect("single open bracket"),
        }
    }

    pub fn validate(&self) -> Result<(), DispatchError> {
        for (name, v) in [
            ("energy_rate_peak", self.energy_rate_peak_nok_per_kwh),
            ("energy_rate_offpeak", self.energy_rate_offpeak_nok_per_kwh),
            ("supplier_markup", self.supplier_markup_nok_per_kwh),
            ("feed_in_premium", self.feed_in_premium_nok_per_kwh),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(DispatchError::Config(format!(
                    "{name} must be finite and non-negative, got {v}"
                )));
            }
        }
        if !self.vat_multiplier.is_finite() || self.vat_multiplier < 1.0 {
            return Err(DispatchError::Config(format!(
                "vat_multiplier must be >= 1, got {}",
                self.vat_multiplier
            )));
        }
        for (i, t) in self.consumption_tax_nok_per_kwh.iter().enumerate() {
            if !t.is_finite() || *t < 0.0 {
                return Err(DispatchError::Config(format!(
                    "consumption tax for month {} must be finite and non-negative, got {t}",
                    i + 1
                )));
            }
        }
        if self.peak_hours.start_hour >= self.peak_hours.end_hour
            || self.peak_hours.end_hour > 24
        {
            return Err(DispatchError::Config(format!(
                "peak hours {}..{} are not a valid hour range",
                self.peak_hours.start_hour, self.peak_hours.end_hour
            )));
        }
        Ok(())
    }

    fn energy_rate(&self, ts: &DateTime<FixedOffset>) -> f64 {
        if self.peak_hours.contains(ts.weekday(), ts.hour()) {
            self.energy_rate_peak_nok_per_kwh
        } else {
            self.energy_rate_offpeak_nok_per_kwh
        }
    }

    fn consumption_tax(&self, ts: &DateTime<FixedOffset>) -> f64 {
        self.consumption_tax_nok_per_kwh[ts.month0() as usize]
    }

    /// Import unit price: (spot + energy rate + tax + markup) * VAT.
    pub fn import_price(&self, ts: &DateTime<FixedOffset>, spot_nok_per_kwh: f64) -> f64 {
        (spot_nok_per_kwh
            + self.energy_rate(ts)
            + self.consumption_tax(ts)
            + self.supplier_markup_nok_per_kwh)
            * self.vat_multiplier
    }

    /// Export unit price: spot + feed-in premium, no VAT.
    pub fn export_price(&self, spot_nok_per_kwh: f64) -> f64 {
        spot_nok_per_kwh + self.feed_in_premium_nok_per_kwh
    }

    pub fn import_prices(&self, window: &SeriesWindow<'_>) -> Vec<f64> {
        window
            .timestamps
            .iter()
            .zip(window.spot_nok_per_kwh)
            .map(|(ts, spot)| self.import_price(ts, *spot))
            .collect()
    }

    pub fn export_prices(&self, window: &SeriesWindow<'_>) -> Vec<f64> {
        window
            .spot_nok_per_kwh
            .iter()
            .map(|spot| self.export_price(*spot))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rstest::rstest;

    fn bracket_table() -> PowerTariff {
        PowerTariff::new(vec![
            PowerBracket { upper_kw: 5.0, fee_nok: 100.0 },
            PowerBracket { upper_kw: 10.0, fee_nok: 250.0 },
            PowerBracket { upper_kw: 25.0, fee_nok: 600.0 },
            PowerBracket { upper_kw: f64::INFINITY, fee_nok: 1400.0 },
        ])
        .unwrap()
    }

    #[rstest]
    #[case(0.0, 100.0)]
    #[case(4.99, 100.0)]
    #[case(5.0, 250.0)] // right-continuous at the bound
    #[case(24.0, 600.0)]
    #[case(25.0, 1400.0)]
    #[case(500.0, 1400.0)]
    fn step_fee_brackets(#[case] peak: f64, #[case] expected: f64) {
        assert_eq!(bracket_table().step_fee(peak), expected);
    }

    #[test]
    fn rejects_non_monotone_uppers() {
        let err = PowerTariff::new(vec![
            PowerBracket { upper_kw: 10.0, fee_nok: 100.0 },
            PowerBracket { upper_kw: 5.0, fee_nok: 200.0 },
        ]);
        assert!(matches!(err, Err(DispatchError::Config(_))));
    }

    #[test]
    fn rejects_decreasing_fees() {
        let err = PowerTariff::new(vec![
            PowerBracket { upper_kw: 5.0, fee_nok: 300.0 },
            PowerBracket { upper_kw: 10.0, fee_nok: 100.0 },
        ]);
        assert!(matches!(err, Err(DispatchError::Config(_))));
    }

    #[test]
    fn rejects_empty_table() {
        assert!(matches!(
            PowerTariff::new(vec![]),
            Err(DispatchError::Config(_))
        ));
    }

    #[test]
    fn segments_clamp_open_bracket() {
        let segments = bracket_table().segments(40.0);
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0].width_kw, 5.0);
        assert_eq!(segments[0].fee_increment_nok, 100.0);
        assert_eq!(segments[1].width_kw, 5.0);
        assert_eq!(segments[1].fee_increment_nok, 150.0);
        assert_eq!(segments[3].width_kw, 15.0);
        assert_eq!(segments[3].fee_increment_nok, 800.0);
    }

    #[test]
    fn piecewise_fee_matches_bracket_fee_at_upper_bounds() {
        let tariff = bracket_table();
        assert!((tariff.piecewise_fee(5.0) - 100.0).abs() < 1e-9);
        assert!((tariff.piecewise_fee(10.0) - 250.0).abs() < 1e-9);
        assert!((tariff.piecewise_fee(25.0) - 600.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn piecewise_fee_never_exceeds_step_fee(peak in 0.0f64..200.0) {
            let tariff = bracket_table();
            prop_assert!(tariff.piecewise_fee(peak) <= tariff.step_fee(peak) + 1e-9);
        }
    }

    fn at(month: u32, day: u32, hour: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, month, day, hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn peak_predicate_weekday_hours() {
        let hours = PeakHours::default();
        // 2024-06-03 is a Monday
        assert!(hours.contains(at(6, 3, 6).weekday(), 6));
        assert!(hours.contains(at(6, 3, 21).weekday(), 21));
        assert!(!hours.contains(at(6, 3, 22).weekday(), 22));
        assert!(!hours.contains(at(6, 3, 5).weekday(), 5));
        // 2024-06-08 is a Saturday
        assert!(!hours.contains(at(6, 8, 12).weekday(), 12));
    }

    #[test]
    fn import_price_composition() {
        let tariff = TariffConfig::default_no();
        // Monday noon in June: peak rate, standard tax
        let ts = at(6, 3, 12);
        let expected = (1.0 + 0.296 + 0.1644 + 0.05) * 1.25;
        assert!((tariff.import_price(&ts, 1.0) - expected).abs() < 1e-12);
        // Night in February: off-peak rate, reduced tax
        let ts = at(2, 6, 3);
        let expected = (1.0 + 0.176 + 0.0951 + 0.05) * 1.25;
        assert!((tariff.import_price(&ts, 1.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn export_price_has_no_vat() {
        let tariff = TariffConfig::default_no();
        assert!((tariff.export_price(1.0) - 1.04).abs() < 1e-12);
        // Negative spot passes through
        assert!((tariff.export_price(-0.5) - (-0.46)).abs() < 1e-12);
    }
}
