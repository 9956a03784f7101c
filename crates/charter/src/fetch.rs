//! Fetch & merge control: when to load more bars and which window to ask for.
//!
//! The controller itself never awaits. A load is split into
//! [`FetchController::begin`], which hands out a [`FetchTicket`] tagged with
//! the current generation, and [`FetchController::finish`], which says whether
//! the response still belongs to the live session. Only one ticket is out at
//! a time; a second `begin` while loading is dropped, not queued.

use std::time::{Duration, Instant};

use charter_config::FetchConfig;
use charter_core::calendar::{self, SECONDS_PER_DAY};
use chrono::{Duration as Days, NaiveDate};

use crate::widget::TimeRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Earlier,
    Later,
}

impl Direction {
    pub fn name(&self) -> &'static str {
        match self {
            Direction::Earlier => "earlier",
            Direction::Later => "later",
        }
    }
}

/// Result of comparing the viewport with the loaded data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewportNeed {
    pub earlier: bool,
    pub later: bool,
    /// Later data would be wanted but the end date forbids it.
    pub blocked_by_end_date: bool,
}

impl ViewportNeed {
    pub fn any(&self) -> bool {
        self.earlier || self.later
    }
}

/// Compare the visible range against the store bounds.
///
/// Needs-earlier when `visible.from < earliest + buffer`, needs-later when
/// `visible.to > latest - buffer`. With an end date set, a later need whose
/// next window would start after that date is suppressed and flagged.
/// `stamp_offset_secs` is the shift carried by the stored bar stamps.
pub fn check_viewport_need(
    visible: TimeRange,
    bounds: (i64, i64),
    buffer_days: i64,
    end_date: Option<NaiveDate>,
    stamp_offset_secs: i64,
) -> ViewportNeed {
    let buffer = buffer_days * SECONDS_PER_DAY;
    let (earliest, latest) = bounds;

    let earlier = visible.from < earliest + buffer;
    let mut later = visible.to > latest - buffer;
    let mut blocked_by_end_date = false;

    if later {
        if let (Some(end), Some(latest_date)) = (end_date, calendar::bar_date(latest, stamp_offset_secs)) {
            if latest_date >= end {
                later = false;
                blocked_by_end_date = true;
            }
        }
    }

    ViewportNeed {
        earlier,
        later,
        blocked_by_end_date,
    }
}

/// Limits applied to every request window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub window_days: i64,
    /// Nothing before this date is requested.
    pub earliest: NaiveDate,
    /// Nothing after this date is requested.
    pub today: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

/// Inclusive date window of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub direction: Direction,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Window adjacent to `boundary` (the date of the edge bar), or `None` when
/// the policy leaves nothing to ask for.
pub fn plan_window(direction: Direction, boundary: NaiveDate, policy: &WindowPolicy) -> Option<FetchWindow> {
    let (start, end) = match direction {
        Direction::Earlier => {
            let end = boundary - Days::days(1);
            let start = (end - Days::days(policy.window_days)).max(policy.earliest);
            (start, end)
        }
        Direction::Later => {
            let start = boundary + Days::days(1);
            let mut end = (start + Days::days(policy.window_days)).min(policy.today);
            if let Some(ceiling) = policy.end_date {
                end = end.min(ceiling);
            }
            (start, end)
        }
    };

    (start <= end).then_some(FetchWindow {
        direction,
        start,
        end,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchState {
    #[default]
    Idle,
    Loading {
        generation: u64,
        direction: Direction,
    },
    /// A merge landed; the widget has not re-rendered yet.
    Settling,
}

/// Proof of an in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub direction: Direction,
}

#[derive(Debug)]
pub struct FetchController {
    state: FetchState,
    generation: u64,
    depth: u32,
    max_depth: u32,
    blocked_by_end_date: bool,
}

impl FetchController {
    pub fn new(max_depth: u32) -> Self {
        Self {
            state: FetchState::Idle,
            generation: 0,
            depth: 0,
            max_depth,
            blocked_by_end_date: false,
        }
    }

    pub fn state(&self) -> FetchState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, FetchState::Loading { .. })
    }

    pub fn blocked_by_end_date(&self) -> bool {
        self.blocked_by_end_date
    }

    pub fn set_blocked_by_end_date(&mut self, blocked: bool) {
        if blocked && !self.blocked_by_end_date {
            log::info!("Later data blocked by end date");
        }
        self.blocked_by_end_date = blocked;
    }

    /// Start a request. Returns `None` while another one is in flight.
    pub fn begin(&mut self, direction: Direction) -> Option<FetchTicket> {
        if self.is_loading() {
            log::debug!("Already loading, dropping {} request", direction.name());
            return None;
        }
        self.state = FetchState::Loading {
            generation: self.generation,
            direction,
        };
        Some(FetchTicket {
            generation: self.generation,
            direction,
        })
    }

    /// Close out a request. Returns whether its response should be applied.
    ///
    /// A ticket from before the last [`reset`](Self::reset) is stale: its
    /// response is discarded and the current state is left alone.
    pub fn finish(&mut self, ticket: FetchTicket) -> bool {
        if ticket.generation != self.generation {
            log::debug!(
                "Discarding stale {} response (generation {} != {})",
                ticket.direction.name(),
                ticket.generation,
                self.generation
            );
            return false;
        }
        self.state = FetchState::Settling;
        true
    }

    /// The widget has caught up with the last merge.
    pub fn settled(&mut self) {
        if self.state == FetchState::Settling {
            self.state = FetchState::Idle;
        }
    }

    /// Invalidate in-flight requests and return to idle.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.state = FetchState::Idle;
        self.depth = 0;
        self.blocked_by_end_date = false;
    }

    /// Count one chained data check. Returns `false` once the chain is too
    /// deep; the counter then resets.
    pub fn enter_check(&mut self) -> bool {
        self.depth += 1;
        if self.depth > self.max_depth {
            log::warn!(
                "Data check chained {} times, stopping (limit {})",
                self.depth,
                self.max_depth
            );
            self.depth = 0;
            return false;
        }
        true
    }

    /// The chain of checks ended normally.
    pub fn end_chain(&mut self) {
        self.depth = 0;
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }
}

impl Default for FetchController {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Throttles viewport-change checks.
///
/// A range change passes when the previous accepted one is older than the
/// debounce interval (short while zooming, long while panning). The accepted
/// check then waits a settle delay before running.
#[derive(Debug, Clone)]
pub struct CheckDebouncer {
    zoom_debounce: Duration,
    pan_debounce: Duration,
    zoom_settle: Duration,
    pan_settle: Duration,
    zoom_hold: Duration,
    last_check: Option<Instant>,
    zooming_until: Option<Instant>,
}

impl CheckDebouncer {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            zoom_debounce: config.debounce(true),
            pan_debounce: config.debounce(false),
            zoom_settle: config.settle(true),
            pan_settle: config.settle(false),
            zoom_hold: config.zoom_hold(),
            last_check: None,
            zooming_until: None,
        }
    }

    /// A wheel or keyboard zoom happened.
    pub fn on_zoom(&mut self, now: Instant) {
        self.zooming_until = Some(now + self.zoom_hold);
    }

    pub fn is_zooming(&self, now: Instant) -> bool {
        self.zooming_until.is_some_and(|until| now < until)
    }

    /// A range change arrived. Returns the settle delay if a check should run.
    pub fn on_range_change(&mut self, now: Instant) -> Option<Duration> {
        let zooming = self.is_zooming(now);
        let debounce = if zooming { self.zoom_debounce } else { self.pan_debounce };
        if let Some(last) = self.last_check {
            if now.saturating_duration_since(last) <= debounce {
                return None;
            }
        }
        self.last_check = Some(now);
        Some(if zooming { self.zoom_settle } else { self.pan_settle })
    }

    pub fn reset(&mut self) {
        self.last_check = None;
        self.zooming_until = None;
    }
}
