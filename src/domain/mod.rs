pub mod battery;
pub mod grid;
pub mod series;
pub mod tariff;

pub use battery::{BatterySpec, BatterySystemState};
pub use grid::GridLimits;
pub use series::{month_spans, month_start, ExogenousSeries, MonthKey, SeriesWindow, TimeStep};
pub use tariff::{FeeSegment, PeakHours, PowerBracket, PowerTariff, TariffConfig};
