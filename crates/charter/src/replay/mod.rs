//! Stepping through time: single-step advance, stride and playback.

mod playback;
mod step;
mod stride;

pub use playback::{CancelFlag, ChartDelta, PlaybackSession, PlaybackState};
pub use step::{accept_next_bar, build_partial, plan_next_bar, StaleBar, StepPlan, MAX_EMPTY_BUCKETS};
pub use stride::{StrideBar, StrideState};
