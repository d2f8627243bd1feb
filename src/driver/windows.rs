use crate::domain::series::{month_spans, ExogenousSeries};
use crate::driver::HorizonMode;
use crate::error::DispatchError;

/// One planned optimisation window: series index range plus the number of
/// leading steps the driver commits into the annual trajectory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPlan {
    pub start: usize,
    pub end: usize,
    pub commit: usize,
}

/// Plan the window sequence for a simulation. Windows are strictly in time
/// order and their committed prefixes tile the series exactly once.
pub fn plan_windows(
    series: &ExogenousSeries,
    mode: &HorizonMode,
) -> Result<Vec<WindowPlan>, DispatchError> {
    mode.validate()?;
    let n = series.len();
    let per_hour = series.step().steps_per_hour();
    let plans = match mode {
        HorizonMode::WeeklyCommitAll => chunked(n, 168 * per_hour),
        HorizonMode::MonthlyCommitAll => month_spans(series.timestamps())
            .into_iter()
            .map(|(_, span)| WindowPlan {
                start: span.start,
                end: span.end,
                commit: span.end - span.start,
            })
            .collect(),
        HorizonMode::Mpc {
            horizon_hours,
            update_frequency_hours,
        } => {
            let horizon = *horizon_hours as usize * per_hour;
            let update = *update_frequency_hours as usize * per_hour;
            let mut plans = Vec::with_capacity(n.div_ceil(update));
            let mut start = 0;
            while start < n {
                let end = (start + horizon).min(n);
                plans.push(WindowPlan {
                    start,
                    end,
                    commit: update.min(n - start),
                });
                start += update;
            }
            plans
        }
    };
    Ok(plans)
}

fn chunked(n: usize, size: usize) -> Vec<WindowPlan> {
    (0..n)
        .step_by(size)
        .map(|start| {
            let end = (start + size).min(n);
            WindowPlan {
                start,
                end,
                commit: end - start,
            }
        })
        .collect()
}
