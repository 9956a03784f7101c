//! Animated playback of a 1-minute feed.
//!
//! [`PlaybackSession::tick`] is a pure transition: feed it the next minute
//! bar and it returns what the chart should show. Timers, fetching the next
//! day and cancellation belong to the driver in [`crate::session`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use charter_config::ReplayConfig;
use charter_core::{calendar, Bar, BarBuilder, Resolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Chart changes produced by one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChartDelta {
    /// Completed bar to append to the store.
    pub finalized: Option<Bar>,
    /// In-progress bar shown on the chart only.
    pub live: Option<Bar>,
}

impl ChartDelta {
    pub fn is_empty(&self) -> bool {
        self.finalized.is_none() && self.live.is_none()
    }
}

/// Shared flag that asks a running playback loop to stop scheduling ticks.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Feed, cursor and bucket builder of one playback run.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    state: PlaybackState,
    feed: Vec<Bar>,
    cursor: usize,
    builder: BarBuilder,
    speed: f64,
    generation: u64,
}

impl PlaybackSession {
    pub fn new(resolution: Resolution, speed: f64, generation: u64) -> Self {
        Self {
            state: PlaybackState::Stopped,
            feed: Vec::new(),
            cursor: 0,
            builder: BarBuilder::new(resolution),
            speed,
            generation,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn resolution(&self) -> Resolution {
        self.builder.resolution()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
    }

    pub fn interval(&self, config: &ReplayConfig) -> Duration {
        config.interval(self.speed)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn feed_len(&self) -> usize {
        self.feed.len()
    }

    pub fn building(&self) -> Option<&Bar> {
        self.builder.building()
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.feed.len()
    }

    /// Trading date of the last fed minute, for fetching the following day.
    pub fn last_feed_date(&self) -> Option<NaiveDate> {
        self.feed.last().and_then(|bar| calendar::date_of(bar.time))
    }

    /// Replace the feed with `minutes`, keeping the bar being built.
    ///
    /// Minutes at or before the last played one are skipped.
    pub fn load_feed(&mut self, minutes: Vec<Bar>) {
        let played = self.cursor.checked_sub(1).and_then(|i| self.feed.get(i)).map(|b| b.time);
        self.feed = match played {
            Some(last) => minutes.into_iter().filter(|b| b.time > last).collect(),
            None => minutes,
        };
        self.cursor = 0;
    }

    pub fn play(&mut self) {
        self.state = PlaybackState::Playing;
    }

    /// Stop ticking; the partially built bar survives.
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        self.builder.reset();
        self.feed.clear();
        self.cursor = 0;
    }

    /// Route one minute bar into the target resolution.
    pub fn tick(&mut self, minute: &Bar) -> ChartDelta {
        let step = self.builder.push(minute);
        ChartDelta {
            finalized: step.finalized,
            live: step.live,
        }
    }

    /// Play the next minute of the feed, or `None` when exhausted.
    pub fn advance(&mut self) -> Option<ChartDelta> {
        let minute = *self.feed.get(self.cursor)?;
        self.cursor += 1;
        Some(self.tick(&minute))
    }

    /// Finalize the bar still being built.
    pub fn flush(&mut self) -> Option<Bar> {
        self.builder.flush()
    }
}
