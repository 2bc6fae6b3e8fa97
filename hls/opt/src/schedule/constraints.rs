use super::ScheduleProfiler;
use serde::{Deserialize, Serialize};

/// Window and heuristics handed to a scheduling algorithm.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConstraints {
    /// First c-step the algorithm may use.
    pub start_time: i64,
    /// Exclusive upper bound of the window. When set before scheduling it is a
    /// hard bound; afterwards it holds the first c-step after the last
    /// completion.
    pub end_time: Option<i64>,
    /// Slack multiplier applied to the critical path when deriving latest
    /// start times without a hard bound.
    pub sched_scale: f64,
    pub profilers: Vec<ScheduleProfiler>,
    /// Prefer fewer functional units over a shorter schedule.
    pub minimize_fus: bool,
}

impl Default for SchedulingConstraints {
    fn default() -> Self {
        Self {
            start_time: 0,
            end_time: None,
            sched_scale: 1.1,
            profilers: Vec::new(),
            minimize_fus: false,
        }
    }
}

impl SchedulingConstraints {
    /// Window `[start, end)`.
    pub fn window(start_time: i64, end_time: i64) -> Self {
        Self {
            start_time,
            end_time: Some(end_time),
            ..Default::default()
        }
    }

    /// Constraints for a nested run starting at `start_time` with no bound.
    pub fn starting_at(&self, start_time: i64) -> Self {
        Self {
            start_time,
            end_time: None,
            profilers: Vec::new(),
            ..self.clone()
        }
    }

    /// Stretches the critical path ending at `asap_end` by the scale factor.
    pub fn scaled_end(&self, asap_end: i64) -> i64 {
        let length = (asap_end - self.start_time).max(0) as f64;
        self.start_time + (length * self.sched_scale.max(1.0)).ceil() as i64
    }
}
