//! One chart: a symbol at a resolution, its data, its viewport and its drawings.
//!
//! [`ChartSession`] owns every piece of mutable state the chart needs, so
//! nothing lives in globals. All methods run on one task; async methods hold
//! `&mut self` across their awaits, which is what keeps at most one fetch in
//! flight per session.

use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};
use serde_json::json;
use thiserror::Error;

use charter_config::Config;
use charter_core::{calendar, Bar, Resolution};
use charter_data::{parse_rows, BarQuery, DataSource, ParseOptions, RawRow, SourceError};

use crate::coords::ScreenPos;
use crate::drawing::{BuildError, ClickOutcome, DrawContext, DrawingManager, ToolKind};
use crate::events::{ChartEvent, Command, EventBus, Notice};
use crate::fetch::{
    check_viewport_need, plan_window, CheckDebouncer, Direction, FetchController, FetchState, FetchTicket,
    FetchWindow, ViewportNeed, WindowPolicy,
};
use crate::indicators::{volume_bars, IndicatorOverlays};
use crate::log_ring::{LogLevel, LogRing};
use crate::replay::{
    accept_next_bar, plan_next_bar, CancelFlag, ChartDelta, PlaybackSession, PlaybackState, StepPlan, StrideBar,
    StrideState, MAX_EMPTY_BUCKETS,
};
use crate::store::BarStore;
use crate::viewport::ViewportTracker;
use crate::widget::ChartWidget;

/// Calendar days of minute rows requested per playback fetch.
const PLAYBACK_FETCH_DAYS: u64 = 14;

/// Errors surfaced to whoever started a foreground load.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoadError {
    #[error("symbol is empty")]
    EmptySymbol,
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// A background load that has been planned and admitted.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingLoad {
    pub ticket: FetchTicket,
    pub window: FetchWindow,
    pub query: BarQuery,
}

/// Why a playback loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackExit {
    /// The cancel flag was raised; the building bar is kept.
    Paused,
    /// The minute feed ran out.
    Finished,
    /// Playback was stopped or superseded by a reload.
    Stopped,
}

pub struct ChartSession<S, W> {
    config: Config,
    source: S,
    widget: W,
    symbol: String,
    resolution: Resolution,
    end_date: Option<NaiveDate>,
    today: Option<NaiveDate>,

    store: BarStore,
    tracker: ViewportTracker,
    fetch: FetchController,
    debouncer: CheckDebouncer,
    bus: EventBus,
    log: LogRing,
    notices: Vec<Notice>,

    overlays: IndicatorOverlays,
    drawing: DrawingManager,
    stride: StrideState,
    playback: Option<PlaybackSession>,
    playback_cancel: CancelFlag,
}

impl<S: DataSource, W: ChartWidget> ChartSession<S, W> {
    pub fn new(config: Config, source: S, widget: W) -> Self {
        let general = config.general.clone();
        Self {
            symbol: general.symbol,
            resolution: general.resolution,
            end_date: general.end_date,
            today: None,
            store: BarStore::new(config.fetch.max_bars),
            tracker: ViewportTracker::new(),
            fetch: FetchController::new(config.fetch.max_check_depth),
            debouncer: CheckDebouncer::new(&config.fetch),
            bus: EventBus::new(),
            log: LogRing::new(config.logging.ring_capacity),
            notices: Vec::new(),
            overlays: IndicatorOverlays::new(&config.indicators.ma_windows),
            drawing: DrawingManager::new(&config.drawing),
            stride: StrideState::from_config(&config.replay, general.resolution),
            playback: None,
            playback_cancel: CancelFlag::new(),
            config,
            source,
            widget,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn widget(&self) -> &W {
        &self.widget
    }

    pub fn widget_mut(&mut self) -> &mut W {
        &mut self.widget
    }

    pub fn store(&self) -> &BarStore {
        &self.store
    }

    pub fn drawing(&self) -> &DrawingManager {
        &self.drawing
    }

    pub fn overlays(&self) -> &IndicatorOverlays {
        &self.overlays
    }

    pub fn log(&self) -> &LogRing {
        &self.log
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }

    pub fn fetch_state(&self) -> FetchState {
        self.fetch.state()
    }

    pub fn blocked_by_end_date(&self) -> bool {
        self.fetch.blocked_by_end_date()
    }

    pub fn stride(&self) -> &StrideState {
        &self.stride
    }

    pub fn playback(&self) -> Option<&PlaybackSession> {
        self.playback.as_ref()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback.as_ref().map_or(PlaybackState::Stopped, PlaybackSession::state)
    }

    /// Handle that pauses a running [`run_playback`](Self::run_playback).
    pub fn playback_cancel(&self) -> CancelFlag {
        self.playback_cancel.clone()
    }

    /// Pin "today" for window planning; `None` uses the local clock.
    pub fn set_today(&mut self, today: Option<NaiveDate>) {
        self.today = today;
    }

    /// Notices raised since the last call.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn export_logs(&self) -> String {
        self.log.export_text()
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            daily_utc_offset_secs: self.config.data.daily_utc_offset_secs,
        }
    }

    /// Shift carried by bar stamps at the current resolution.
    fn stamp_offset(&self) -> i64 {
        if self.resolution.is_daily() {
            self.config.data.daily_utc_offset_secs
        } else {
            0
        }
    }

    /// Trading date of a stored bar stamp.
    fn bar_date(&self, time: i64) -> Option<NaiveDate> {
        calendar::bar_date(time, self.stamp_offset())
    }

    /// Restamp a bar built on calendar buckets the way fetched bars are.
    fn stamped(&self, bar: Bar) -> Bar {
        bar.with_time(bar.time + self.stamp_offset())
    }

    fn notify(&mut self, notice: Notice) {
        self.log.warn(notice.to_string());
        self.notices.push(notice);
    }

    fn parse(&mut self, rows: &[RawRow], resolution: Resolution) -> Vec<Bar> {
        let parsed = parse_rows(rows, resolution, self.parse_options());
        if !parsed.rejected.is_empty() {
            let rejected: Vec<_> = parsed
                .rejected
                .iter()
                .map(|(index, err)| json!({ "row": index, "reason": err.to_string() }))
                .collect();
            self.log.record(
                LogLevel::Warn,
                format!("Dropped {} invalid rows", parsed.rejected.len()),
                Some(json!(rejected)),
            );
        }
        parsed.bars
    }

    async fn fetch_bars(&mut self, query: &BarQuery) -> Result<Vec<Bar>, SourceError> {
        let rows = self.source.query(query).await?;
        Ok(self.parse(&rows, query.resolution))
    }

    async fn fetch_minutes(&mut self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Bar>, SourceError> {
        let query = BarQuery::new(self.symbol.clone(), Resolution::Min1, self.config.replay.minute_row_limit)
            .with_start(from)
            .with_end(to);
        self.fetch_bars(&query).await
    }

    // ---- widget synchronisation ----

    fn apply_commands(&mut self) {
        let commands: Vec<Command> = self.bus.drain_commands().collect();
        for command in commands {
            match command {
                Command::SyncSeries => {
                    self.widget.set_all(self.store.bars());
                    self.widget.set_volume(&volume_bars(self.store.bars()));
                }
                Command::RefreshIndicators => {
                    self.overlays.refresh(self.store.bars(), &mut self.widget);
                    self.drawing.sync_extent(&mut self.widget, self.store.bars());
                }
                Command::RestoreViewport => {
                    if self.fetch.blocked_by_end_date() || self.drawing.suppresses_restore() {
                        log::debug!("Viewport restore suppressed");
                        self.tracker.discard();
                    } else {
                        self.tracker.restore(&mut self.widget, &self.store);
                    }
                }
                Command::FitContent => self.widget.fit_content(),
            }
        }
    }

    fn check_cap(&mut self) {
        if let Some(dropped) = self.store.take_cap_warning() {
            let max_bars = self.store.max_bars();
            self.notify(Notice::CapExceeded { dropped, max_bars });
        }
    }

    /// Append one bar at the end of the series.
    fn append_bar(&mut self, bar: Bar) {
        if let Err(err) = self.store.push_or_replace_last(bar) {
            log::warn!("Bar {} arrived after {}, ignored", err.time, err.last_time);
            return;
        }
        self.widget.append_or_update(bar);
        self.widget.set_volume(&volume_bars(self.store.bars()));
        self.bus.dispatch(Command::RefreshIndicators);
        self.apply_commands();
        self.check_cap();
    }

    /// Drop everything tied to the current symbol and resolution.
    fn reset_view_state(&mut self) {
        self.fetch.reset();
        self.tracker.discard();
        self.debouncer.reset();
        self.bus.clear();
        self.drawing.reset_preview(&mut self.widget);
        self.stride = StrideState::from_config(&self.config.replay, self.resolution);
        self.playback_cancel.cancel();
        if let Some(mut playback) = self.playback.take() {
            playback.stop();
        }
    }

    // ---- foreground loads ----

    /// Load the chart from scratch and fit it to the data.
    ///
    /// Errors are surfaced as a [`Notice`] and returned to the caller.
    pub async fn initial_load(&mut self) -> Result<usize, LoadError> {
        let symbol = self.symbol.trim().to_string();
        if symbol.is_empty() {
            self.log.record(LogLevel::Error, "Symbol is empty", None);
            self.notify(Notice::LoadFailed(LoadError::EmptySymbol.to_string()));
            return Err(LoadError::EmptySymbol);
        }

        self.reset_view_state();
        let mut query = BarQuery::new(symbol, self.resolution, self.config.general.row_limit);
        if let Some(end) = self.end_date {
            query = query.with_end(end);
        }
        self.log.record(
            LogLevel::Info,
            "Loading chart",
            Some(json!({
                "symbol": query.symbol,
                "resolution": self.resolution.label(),
                "limit": query.row_limit,
                "end_date": self.end_date.map(|d| d.to_string()),
            })),
        );

        let bars = match self.fetch_bars(&query).await {
            Ok(bars) => bars,
            Err(err) => {
                self.log.record(LogLevel::Error, format!("Initial load failed: {err}"), None);
                self.notify(Notice::LoadFailed(err.to_string()));
                return Err(err.into());
            }
        };

        if bars.is_empty() {
            self.log.warn("Data source returned no bars");
        }
        self.store.replace_all(bars);
        self.check_cap();
        self.bus.emit(ChartEvent::StoreReplaced);
        self.bus.dispatch_all([Command::SyncSeries, Command::RefreshIndicators, Command::FitContent]);
        self.apply_commands();
        self.bus.clear();

        self.log.info(format!("Loaded {} bars", self.store.len()));
        Ok(self.store.len())
    }

    pub async fn set_symbol(&mut self, symbol: impl Into<String>) -> Result<usize, LoadError> {
        self.symbol = symbol.into();
        self.initial_load().await
    }

    pub async fn set_resolution(&mut self, resolution: Resolution) -> Result<usize, LoadError> {
        self.resolution = resolution;
        self.initial_load().await
    }

    pub async fn set_end_date(&mut self, end_date: Option<NaiveDate>) -> Result<usize, LoadError> {
        self.end_date = end_date;
        self.initial_load().await
    }

    // ---- background loads ----

    fn window_policy(&self) -> WindowPolicy {
        WindowPolicy {
            window_days: self.config.fetch.window_days(self.resolution),
            earliest: self.config.fetch.earliest_date,
            today: self.today(),
            end_date: self.end_date,
        }
    }

    /// Does the visible range run close to either edge of the data?
    pub fn viewport_need(&mut self) -> Option<ViewportNeed> {
        let visible = self.widget.visible_range()?;
        let bounds = self.store.bounds()?;
        let need = check_viewport_need(
            visible,
            bounds,
            self.config.fetch.buffer_days,
            self.end_date,
            self.stamp_offset(),
        );
        self.fetch.set_blocked_by_end_date(need.blocked_by_end_date);
        Some(need)
    }

    /// Plan a request next to the data edge and claim the loading slot.
    ///
    /// Records the viewport reference that the merge will restore. `None`
    /// when a request is already in flight or the window is empty.
    pub fn begin_load(&mut self, direction: Direction) -> Option<PendingLoad> {
        let (earliest, latest) = self.store.bounds()?;
        let edge = match direction {
            Direction::Earlier => earliest,
            Direction::Later => latest,
        };
        let boundary = self.bar_date(edge)?;
        let Some(window) = plan_window(direction, boundary, &self.window_policy()) else {
            log::debug!("No {} window left to request", direction.name());
            return None;
        };
        let ticket = self.fetch.begin(direction)?;

        self.tracker.record(&self.widget, &self.store);
        let query = BarQuery::new(self.symbol.clone(), self.resolution, self.config.general.row_limit)
            .with_start(window.start)
            .with_end(window.end);
        self.log.record(
            LogLevel::Info,
            format!("Loading {} data", direction.name()),
            Some(json!({ "start": window.start.to_string(), "end": window.end.to_string() })),
        );
        Some(PendingLoad { ticket, window, query })
    }

    /// Merge the response of `pending`. Returns the number of bars added.
    ///
    /// Responses from before a reset are dropped. Errors and empty
    /// responses are logged only.
    pub fn complete_load(&mut self, pending: PendingLoad, response: Result<Vec<RawRow>, SourceError>) -> usize {
        if !self.fetch.finish(pending.ticket) {
            return 0;
        }
        let direction = pending.ticket.direction;

        let added = match response {
            Err(err) => {
                self.log.record(
                    LogLevel::Warn,
                    format!("Loading {} data failed: {err}", direction.name()),
                    Some(json!({ "transient": err.is_transient() })),
                );
                0
            }
            Ok(rows) => {
                let bars = self.parse(&rows, pending.query.resolution);
                if bars.is_empty() {
                    self.log.info(format!("No more {} data", direction.name()));
                    0
                } else {
                    let outcome = self.store.merge(bars);
                    self.check_cap();
                    if outcome.added > 0 {
                        self.bus.emit(ChartEvent::DataMerged {
                            direction,
                            added: outcome.added,
                        });
                        self.bus.dispatch_all([Command::SyncSeries, Command::RefreshIndicators, Command::RestoreViewport]);
                        self.apply_commands();
                        self.log.info(format!(
                            "Merged {} {} bars, {} total",
                            outcome.added,
                            direction.name(),
                            self.store.len()
                        ));
                    } else {
                        self.log.info("No new unique bars to merge");
                    }
                    outcome.added
                }
            }
        };

        if added == 0 {
            self.tracker.discard();
        }
        self.fetch.settled();
        added
    }

    /// Fetch and merge one window in `direction`.
    pub async fn load_more(&mut self, direction: Direction) -> usize {
        let Some(pending) = self.begin_load(direction) else {
            return 0;
        };
        let response = self.source.query(&pending.query).await;
        self.complete_load(pending, response)
    }

    /// Load data until the viewport no longer runs into an edge.
    ///
    /// Each merge queues a follow-up check; pending checks coalesce, and a
    /// chain longer than the configured depth is cut off with a warning.
    pub async fn check_and_load(&mut self) -> usize {
        self.bus.emit(ChartEvent::CheckData);
        let mut added = 0;

        while let Some(event) = self.bus.next_event() {
            match event {
                ChartEvent::CheckData => {
                    if !self.fetch.enter_check() {
                        self.log.warn("Data check chain too deep, stopping");
                        self.bus.clear();
                        return added;
                    }
                    let Some(need) = self.viewport_need() else {
                        continue;
                    };
                    if need.blocked_by_end_date {
                        self.tracker.discard();
                    }
                    if need.earlier {
                        added += self.load_more(Direction::Earlier).await;
                    }
                    if need.later {
                        added += self.load_more(Direction::Later).await;
                    }
                }
                ChartEvent::DataMerged { .. } => {
                    self.bus.emit(ChartEvent::CheckData);
                }
                ChartEvent::StoreReplaced => {}
            }
        }

        self.fetch.end_chain();
        added
    }

    /// A wheel or keyboard zoom changed the scale.
    pub fn on_zoom(&mut self, now: Instant) {
        self.debouncer.on_zoom(now);
    }

    /// The visible range changed. Returns how long to wait before checking.
    pub fn on_visible_range_changed(&mut self, now: Instant) -> Option<Duration> {
        self.debouncer.on_range_change(now)
    }

    /// Debounce, let the widget settle, then check for missing data.
    pub async fn handle_range_change(&mut self, now: Instant) -> usize {
        let Some(delay) = self.on_visible_range_changed(now) else {
            return 0;
        };
        tokio::time::sleep(delay).await;
        self.check_and_load().await
    }

    // ---- drawing ----

    pub fn start_tool(&mut self, tool: ToolKind) {
        self.drawing.start(tool, &mut self.widget);
    }

    pub fn start_delete_mode(&mut self) {
        self.drawing.start_delete(&mut self.widget);
    }

    pub fn cancel_tool(&mut self) {
        self.drawing.cancel(&mut self.widget);
    }

    pub fn clear_annotations(&mut self) {
        self.drawing.clear_all(&mut self.widget);
    }

    pub fn pointer_move(&mut self, pointer: ScreenPos, now: Instant) {
        let mut ctx = DrawContext::new(&mut self.widget, self.store.bars(), now);
        self.drawing.on_pointer_move(&mut ctx, pointer);
    }

    pub fn pointer_click(&mut self, pointer: ScreenPos, now: Instant) -> ClickOutcome {
        let mut ctx = DrawContext::new(&mut self.widget, self.store.bars(), now);
        let outcome = self.drawing.on_pointer_click(&mut ctx, pointer);
        if outcome == ClickOutcome::Rejected(BuildError::RayDirection) {
            self.notify(Notice::RayRejected);
        }
        outcome
    }

    /// Keyboard zoom; ignored unless a tool or delete mode is active.
    pub fn key_zoom(&mut self, zoom_in: bool, now: Instant) -> bool {
        let zoomed = self.drawing.on_key_zoom(zoom_in, &mut self.widget);
        if zoomed {
            self.debouncer.on_zoom(now);
        }
        zoomed
    }

    // ---- stepping ----

    /// First bucket after the last bar that has minute rows.
    ///
    /// Empty buckets (halts, holidays) are skipped up to a limit and nothing
    /// after today is requested. Returns the plan, its minute rows and the
    /// full bar they build, stamped on the calendar.
    async fn next_filled_plan(&mut self) -> Result<Option<(StepPlan, Vec<Bar>, Bar)>, LoadError> {
        let Some(last) = self.store.last().copied() else {
            return Ok(None);
        };
        let Some(mut plan) = plan_next_bar(last.time.saturating_sub(self.stamp_offset()), self.resolution) else {
            return Ok(None);
        };

        let today = self.today();
        let mut cached: Option<(NaiveDate, Vec<Bar>)> = None;
        for _ in 0..=MAX_EMPTY_BUCKETS {
            if plan.date > today {
                break;
            }
            let minutes = match cached.take() {
                Some((date, rows)) if date == plan.date => rows,
                _ => self.fetch_minutes(plan.date, plan.date).await?,
            };

            if let Some(bar) = plan.build(&minutes) {
                return Ok(Some((plan, minutes, bar)));
            }

            log::debug!("Bucket {} is empty, skipping", plan.bucket.stamp);
            cached = Some((plan.date, minutes));
            plan = match plan.following() {
                Some(next) => next,
                None => break,
            };
        }
        Ok(None)
    }

    /// Append the bar after the last one, built from 1-minute rows.
    ///
    /// Returns `None` when nothing newer is available.
    pub async fn step_next_bar(&mut self) -> Result<Option<Bar>, LoadError> {
        let Some((_, _, bar)) = self.next_filled_plan().await? else {
            self.log.info("No next bar available");
            return Ok(None);
        };

        match accept_next_bar(self.store.last(), self.stamped(bar)) {
            Ok(bar) => {
                self.append_bar(bar);
                Ok(Some(bar))
            }
            Err(stale) => {
                self.log.warn(stale.to_string());
                Ok(None)
            }
        }
    }

    /// Add one stride step to the bar being scrubbed.
    pub async fn stride_step(&mut self) -> Result<Option<StrideBar>, LoadError> {
        if self.stride.needs_period() {
            let Some((plan, minutes, _)) = self.next_filled_plan().await? else {
                self.log.info("No next bar available");
                return Ok(None);
            };
            self.stride.begin(plan, minutes);
        }

        let Some(produced) = self.stride.advance() else {
            return Ok(None);
        };
        let produced = produced.shifted(self.stamp_offset());
        self.append_bar(produced.bar());
        Ok(Some(produced))
    }

    // ---- playback ----

    /// Fetch the minute feed after the end date and start from an empty chart.
    ///
    /// Returns `false` when there is no minute data to play.
    pub async fn start_playback(&mut self) -> Result<bool, LoadError> {
        let anchor = self
            .end_date
            .or_else(|| self.store.last().and_then(|bar| self.bar_date(bar.time)))
            .unwrap_or_else(|| self.today());
        let start = calendar::next_trading_day(anchor);
        let minutes = self
            .fetch_minutes(start, start + Days::new(PLAYBACK_FETCH_DAYS))
            .await?;
        if minutes.is_empty() {
            self.notify(Notice::PlaybackFinished);
            return Ok(false);
        }

        self.reset_view_state();
        self.store.clear();
        self.bus.dispatch_all([Command::SyncSeries, Command::RefreshIndicators]);
        self.apply_commands();

        let mut playback = PlaybackSession::new(self.resolution, self.config.replay.speed, self.fetch.generation());
        self.log.info(format!("Playback from {start}: {} minutes", minutes.len()));
        playback.load_feed(minutes);
        playback.play();
        self.playback = Some(playback);
        self.playback_cancel.clear();
        Ok(true)
    }

    pub fn set_playback_speed(&mut self, speed: f64) {
        if let Some(playback) = self.playback.as_mut() {
            playback.set_speed(speed);
        }
    }

    pub fn pause_playback(&mut self) {
        self.playback_cancel.cancel();
        if let Some(playback) = self.playback.as_mut() {
            playback.pause();
        }
    }

    pub fn resume_playback(&mut self) {
        if let Some(playback) = self.playback.as_mut() {
            self.playback_cancel.clear();
            playback.play();
        }
    }

    /// Discard replay state and reload the bounded view.
    pub async fn stop_playback(&mut self) -> Result<usize, LoadError> {
        self.playback_cancel.cancel();
        if let Some(mut playback) = self.playback.take() {
            playback.stop();
        }
        self.initial_load().await
    }

    fn apply_delta(&mut self, delta: ChartDelta) {
        if let Some(bar) = delta.finalized {
            self.append_bar(self.stamped(bar));
        }
        if let Some(live) = delta.live {
            let live = self.stamped(live);
            self.widget.append_or_update(live);
        }
    }

    fn finish_playback(&mut self) {
        let tail = self.playback.as_mut().and_then(|playback| {
            let tail = playback.flush();
            playback.stop();
            tail
        });
        if let Some(bar) = tail {
            self.append_bar(self.stamped(bar));
        }
        self.notify(Notice::PlaybackFinished);
    }

    /// Play one minute. Returns whether playback should keep going.
    pub async fn playback_tick(&mut self) -> bool {
        let Some(playback) = self.playback.as_ref() else {
            return false;
        };
        if playback.generation() != self.fetch.generation() {
            log::debug!("Dropping playback from an older generation");
            self.playback = None;
            return false;
        }
        if playback.state() != PlaybackState::Playing {
            return false;
        }

        if playback.is_exhausted() {
            let next_day = playback.last_feed_date().map(calendar::next_trading_day);
            let minutes = match next_day {
                Some(day) => match self.fetch_minutes(day, day + Days::new(PLAYBACK_FETCH_DAYS)).await {
                    Ok(minutes) => minutes,
                    Err(err) => {
                        self.log.warn(format!("Fetching next playback day failed: {err}"));
                        Vec::new()
                    }
                },
                None => Vec::new(),
            };
            if minutes.is_empty() {
                self.finish_playback();
                return false;
            }
            if let Some(playback) = self.playback.as_mut() {
                playback.load_feed(minutes);
            }
        }

        if let Some(delta) = self.playback.as_mut().and_then(PlaybackSession::advance) {
            self.apply_delta(delta);
        }
        true
    }

    /// Tick until the feed runs out or the cancel flag is raised.
    pub async fn run_playback(&mut self) -> PlaybackExit {
        let cancel = self.playback_cancel.clone();
        loop {
            if cancel.is_cancelled() {
                return match self.playback.as_mut() {
                    Some(playback) => {
                        playback.pause();
                        PlaybackExit::Paused
                    }
                    None => PlaybackExit::Stopped,
                };
            }
            if !self.playback_tick().await {
                return match self.playback_state() {
                    PlaybackState::Stopped if self.playback.is_some() => PlaybackExit::Finished,
                    PlaybackState::Paused => PlaybackExit::Paused,
                    _ => PlaybackExit::Stopped,
                };
            }
            let Some(interval) = self.playback.as_ref().map(|p| p.interval(&self.config.replay)) else {
                return PlaybackExit::Stopped;
            };
            tokio::time::sleep(interval).await;
        }
    }
}
