//! Stride mode: scrub toward a full bar a few minutes at a time.
//!
//! Each step widens the window of minute rows folded into the bar being
//! built. Until the target is reached the bar is provisional and replaces
//! the store's last bar; the final step stamps it for good and clears the
//! state so the next step starts a new period.

use charter_config::ReplayConfig;
use charter_core::{Bar, Resolution};

use super::step::{build_partial, StepPlan};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrideBar {
    /// Partial bar; a later step will replace it.
    Provisional(Bar),
    Finalized(Bar),
}

impl StrideBar {
    pub fn bar(&self) -> Bar {
        match self {
            StrideBar::Provisional(bar) | StrideBar::Finalized(bar) => *bar,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, StrideBar::Finalized(_))
    }

    /// The same bar restamped `secs` later.
    pub fn shifted(self, secs: i64) -> Self {
        match self {
            StrideBar::Provisional(bar) => StrideBar::Provisional(bar.with_time(bar.time + secs)),
            StrideBar::Finalized(bar) => StrideBar::Finalized(bar.with_time(bar.time + secs)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StrideState {
    target_minutes: u32,
    step_minutes: u32,
    accumulated: u32,
    period: Option<StepPlan>,
    /// Minute rows of the period being built.
    cached: Vec<Bar>,
}

impl StrideState {
    /// `target` is clamped to the width of one `resolution` bar.
    pub fn new(target_minutes: u32, step_minutes: u32, resolution: Resolution) -> Self {
        Self {
            target_minutes: target_minutes.clamp(1, resolution.minutes()),
            step_minutes: step_minutes.max(1),
            accumulated: 0,
            period: None,
            cached: Vec::new(),
        }
    }

    pub fn from_config(config: &ReplayConfig, resolution: Resolution) -> Self {
        Self::new(config.stride_target_minutes, config.stride_step_minutes, resolution)
    }

    pub fn target_minutes(&self) -> u32 {
        self.target_minutes
    }

    pub fn accumulated(&self) -> u32 {
        self.accumulated
    }

    pub fn period(&self) -> Option<&StepPlan> {
        self.period.as_ref()
    }

    /// Whether the next step must start a new period first.
    pub fn needs_period(&self) -> bool {
        self.period.is_none()
    }

    /// Start building `plan` from its minute rows.
    pub fn begin(&mut self, plan: StepPlan, minutes: Vec<Bar>) {
        self.period = Some(plan);
        self.cached = minutes;
        self.accumulated = 0;
    }

    /// Add one step of minutes.
    ///
    /// Returns `None` when no minute rows fall inside the window so far. An
    /// empty period still ends once the target is reached.
    pub fn advance(&mut self) -> Option<StrideBar> {
        let plan = self.period?;
        self.accumulated = (self.accumulated + self.step_minutes).min(self.target_minutes);
        let bar = build_partial(&self.cached, &plan.bucket, plan.resolution, self.accumulated);

        if self.accumulated >= self.target_minutes {
            log::debug!("Stride period {} complete", plan.bucket.stamp);
            self.reset();
            return bar.map(StrideBar::Finalized);
        }
        bar.map(StrideBar::Provisional)
    }

    pub fn reset(&mut self) {
        self.period = None;
        self.cached.clear();
        self.accumulated = 0;
    }
}
