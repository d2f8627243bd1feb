pub mod lp;
pub mod types;

pub use lp::solve_window;
pub use types::{CostBreakdown, MonthlyPeak, OptimizationResult, WindowId, WindowSolution};
