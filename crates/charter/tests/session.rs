use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::Instant;

use chrono::{Days, NaiveDate};

use charter::drawing::{BuildError, ClickOutcome, ToolKind};
use charter::events::Notice;
use charter::fetch::{Direction, FetchState};
use charter::replay::PlaybackState;
use charter::{ChartSession, ChartWidget, HeadlessChart, LoadError, PlaybackExit};
use charter_config::Config;
use charter_core::calendar::{self, wall_minute, SESSION_MINUTES};
use charter_core::Resolution;
use charter_data::{BarQuery, DataSource, RawRow, SourceError};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Exchange simulator: daily rows for every weekday since 2023, minute rows
/// on demand, both cut off at `available_until`.
struct MarketSource {
    available_until: Cell<NaiveDate>,
    holidays: RefCell<Vec<NaiveDate>>,
    failures: RefCell<VecDeque<SourceError>>,
    queries: RefCell<Vec<BarQuery>>,
}

impl MarketSource {
    fn new(available_until: NaiveDate) -> Self {
        Self {
            available_until: Cell::new(available_until),
            holidays: RefCell::new(Vec::new()),
            failures: RefCell::new(VecDeque::new()),
            queries: RefCell::new(Vec::new()),
        }
    }

    fn trading_days(&self, query: &BarQuery) -> Vec<NaiveDate> {
        let first = query.start_date.unwrap_or(date(2023, 1, 2)).max(date(2023, 1, 2));
        let last = query
            .end_date
            .unwrap_or(self.available_until.get())
            .min(self.available_until.get());
        let holidays = self.holidays.borrow();
        first
            .iter_days()
            .take_while(|d| *d <= last)
            .filter(|d| calendar::is_trading_day(*d) && !holidays.contains(d))
            .collect()
    }

    fn daily_rows(days: &[NaiveDate]) -> Vec<RawRow> {
        days.iter()
            .map(|d| {
                let base = 10.0 + (*d - date(2023, 1, 2)).num_days() as f64 * 0.01;
                RawRow::new(d.format("%Y-%m-%d").to_string(), base, base + 0.2, base - 0.2, base + 0.1, 1000.0)
            })
            .collect()
    }

    fn minute_rows(days: &[NaiveDate]) -> Vec<RawRow> {
        let mut rows = Vec::new();
        for d in days {
            for index in 1..=SESSION_MINUTES {
                let minute = wall_minute(index);
                let price = 20.0 + f64::from(index) * 0.01;
                rows.push(RawRow::new(
                    format!("{} {:02}:{:02}:00", d.format("%Y-%m-%d"), minute / 60, minute % 60),
                    price,
                    price + 0.05,
                    price - 0.05,
                    price + 0.01,
                    1.0,
                ));
            }
        }
        rows
    }

    fn queries_for(&self, resolution: Resolution) -> Vec<BarQuery> {
        self.queries
            .borrow()
            .iter()
            .filter(|q| q.resolution == resolution)
            .cloned()
            .collect()
    }
}

impl DataSource for MarketSource {
    async fn query(&self, query: &BarQuery) -> Result<Vec<RawRow>, SourceError> {
        self.queries.borrow_mut().push(query.clone());
        if let Some(err) = self.failures.borrow_mut().pop_front() {
            return Err(err);
        }
        let days = self.trading_days(query);
        let rows = match query.resolution {
            Resolution::Daily => Self::daily_rows(&days),
            Resolution::Min1 => Self::minute_rows(&days),
            other => return Err(SourceError::Semantic(format!("unsupported period {other}"))),
        };
        let skip = rows.len().saturating_sub(query.row_limit);
        Ok(rows.into_iter().skip(skip).collect())
    }
}

fn config(end_date: Option<NaiveDate>) -> Config {
    let mut config = Config::default();
    config.general.row_limit = 100;
    config.general.end_date = end_date;
    config
}

fn session(config: Config, source: MarketSource) -> ChartSession<MarketSource, HeadlessChart> {
    let mut session = ChartSession::new(config, source, HeadlessChart::default());
    session.set_today(Some(date(2024, 6, 28)));
    session
}

fn date_of(time: i64) -> NaiveDate {
    calendar::date_of(time).unwrap()
}

fn assert_strictly_ordered(session: &ChartSession<MarketSource, HeadlessChart>) {
    let bars = session.store().bars();
    assert!(bars.windows(2).all(|w| w[0].time < w[1].time));
}

#[tokio::test]
async fn test_initial_load_honors_end_date_and_limit() {
    let mut session = session(config(Some(date(2024, 3, 29))), MarketSource::new(date(2024, 6, 28)));

    assert_eq!(session.initial_load().await, Ok(100));
    assert_eq!(date_of(session.store().last().unwrap().time), date(2024, 3, 29));
    assert_eq!(session.widget().bars().len(), 100);

    let queries = session.source().queries.borrow();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].row_limit, 100);
    assert_eq!(queries[0].end_date, Some(date(2024, 3, 29)));
}

#[tokio::test]
async fn test_initial_load_failure_is_surfaced() {
    let source = MarketSource::new(date(2024, 6, 28));
    source
        .failures
        .borrow_mut()
        .push_back(SourceError::Semantic("unknown symbol".to_string()));
    let mut session = session(config(None), source);

    let err = session.initial_load().await.unwrap_err();
    assert_eq!(err, LoadError::Source(SourceError::Semantic("unknown symbol".to_string())));
    assert!(session.store().is_empty());
    let notices = session.take_notices();
    assert!(matches!(&notices[..], [Notice::LoadFailed(msg)] if msg.contains("unknown symbol")));
}

#[tokio::test]
async fn test_scroll_loads_both_directions_and_keeps_anchor() {
    let mut session = session(config(None), MarketSource::new(date(2024, 3, 29)));
    session.initial_load().await.unwrap();
    let first_date = date_of(session.store().first().unwrap().time);

    // New sessions became available since the initial load.
    session.source().available_until.set(date(2024, 6, 28));

    let visible = session.widget().visible_range().unwrap();
    let anchor = session.store().closest_to(visible.midpoint()).unwrap();
    let anchor_time = session.store().bars()[anchor].time;
    let x_before = session.widget().time_to_x(anchor_time).unwrap();

    let added = session.check_and_load().await;
    assert!(added > 60);
    assert_eq!(session.store().len(), 100 + added);
    assert_strictly_ordered(&session);

    let queries = session.source().queries_for(Resolution::Daily);
    assert_eq!(queries.len(), 3);
    assert_eq!(queries[1].end_date, Some(first_date - Days::new(1)));
    assert_eq!(queries[1].start_date, Some(first_date - Days::new(61)));
    assert_eq!(queries[2].start_date, Some(date(2024, 3, 30)));
    assert_eq!(queries[2].end_date, Some(date(2024, 5, 29)));

    let x_after = session.widget().time_to_x(anchor_time).unwrap();
    assert!((x_before - x_after).abs() < 1.0, "{x_before} vs {x_after}");
    assert_eq!(session.widget().bars().len(), session.store().len());
    assert_eq!(session.fetch_state(), FetchState::Idle);
}

#[tokio::test]
async fn test_later_window_stops_at_today() {
    let mut session = session(config(None), MarketSource::new(date(2024, 6, 28)));
    session.initial_load().await.unwrap();

    assert!(session.begin_load(Direction::Later).is_none());
    assert_eq!(session.source().queries.borrow().len(), 1);
}

#[tokio::test]
async fn test_end_date_blocks_later_loading() {
    let end = date(2024, 3, 29);
    let mut session = session(config(Some(end)), MarketSource::new(date(2024, 6, 28)));
    session.initial_load().await.unwrap();
    let first = session.store().first().unwrap().time;

    session.check_and_load().await;

    assert!(session.blocked_by_end_date());
    assert_eq!(date_of(session.store().last().unwrap().time), end);
    assert!(session.store().first().unwrap().time < first);
    let queries = session.source().queries.borrow();
    assert!(queries[1..].iter().all(|q| q.end_date.is_some_and(|d| d < date_of(first))));
    assert_strictly_ordered(&session);
}

#[tokio::test]
async fn test_overlapping_response_adds_only_new_bars() {
    let mut session = session(config(None), MarketSource::new(date(2024, 6, 28)));
    session.initial_load().await.unwrap();

    let pending = session.begin_load(Direction::Earlier).unwrap();
    assert!(matches!(session.fetch_state(), FetchState::Loading { .. }));

    let fresh = MarketSource::daily_rows(&session.source().trading_days(&pending.query));
    let fresh_count = fresh.len();
    // The response overlaps the first 30 loaded bars.
    let mut rows = fresh;
    let overlap: Vec<NaiveDate> = session.store().bars()[..30].iter().map(|b| date_of(b.time)).collect();
    rows.extend(MarketSource::daily_rows(&overlap));

    let added = session.complete_load(pending, Ok(rows));
    assert_eq!(added, fresh_count);
    assert_eq!(session.store().len(), 100 + fresh_count);
    assert_strictly_ordered(&session);
    assert_eq!(session.fetch_state(), FetchState::Idle);
}

#[tokio::test]
async fn test_response_after_reload_is_discarded() {
    let mut session = session(config(None), MarketSource::new(date(2024, 6, 28)));
    session.initial_load().await.unwrap();

    let pending = session.begin_load(Direction::Earlier).unwrap();
    let rows = MarketSource::daily_rows(&session.source().trading_days(&pending.query));
    session.set_symbol("600000").await.unwrap();

    assert_eq!(session.complete_load(pending, Ok(rows)), 0);
    assert_eq!(session.store().len(), 100);
    assert_eq!(session.fetch_state(), FetchState::Idle);
}

#[tokio::test]
async fn test_background_failure_is_only_logged() {
    let mut session = session(config(None), MarketSource::new(date(2024, 6, 28)));
    session.initial_load().await.unwrap();
    session
        .source()
        .failures
        .borrow_mut()
        .push_back(SourceError::Transport("connection reset".to_string()));

    assert_eq!(session.load_more(Direction::Earlier).await, 0);
    assert_eq!(session.store().len(), 100);
    assert!(session.take_notices().is_empty());
    assert!(session.export_logs().contains("connection reset"));
    assert_eq!(session.fetch_state(), FetchState::Idle);

    // The next trigger retries.
    assert!(session.load_more(Direction::Earlier).await > 0);
}

#[tokio::test]
async fn test_bar_cap_keeps_latest_and_warns_once() {
    let mut cfg = config(None);
    cfg.fetch.max_bars = 120;
    let mut session = session(cfg, MarketSource::new(date(2024, 6, 28)));
    session.initial_load().await.unwrap();
    let last = session.store().last().unwrap().time;

    session.load_more(Direction::Earlier).await;
    assert_eq!(session.store().len(), 120);
    assert_eq!(session.store().last().unwrap().time, last);
    let notices = session.take_notices();
    assert!(matches!(notices[..], [Notice::CapExceeded { max_bars: 120, .. }]));

    session.load_more(Direction::Earlier).await;
    assert!(session.take_notices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_range_changes_are_debounced() {
    let mut session = session(config(None), MarketSource::new(date(2024, 6, 28)));
    session.initial_load().await.unwrap();

    let now = Instant::now();
    assert!(session.handle_range_change(now).await > 0);
    let queries = session.source().queries.borrow().len();

    assert_eq!(session.handle_range_change(now).await, 0);
    assert_eq!(session.source().queries.borrow().len(), queries);
}

#[tokio::test]
async fn test_ray_drawn_leftwards_is_rejected() {
    let mut session = session(config(None), MarketSource::new(date(2024, 6, 28)));
    session.initial_load().await.unwrap();
    let bars = session.store().bars().to_vec();
    let at = |session: &ChartSession<MarketSource, HeadlessChart>, index: usize| {
        session.widget().to_screen(bars[index].time, bars[index].close).unwrap()
    };

    session.start_tool(ToolKind::TrendRay);
    let now = Instant::now();
    let first = at(&session, 60);
    let second = at(&session, 40);

    assert_eq!(session.pointer_click(first, now), ClickOutcome::AnchorPlaced);
    assert_eq!(
        session.pointer_click(second, now),
        ClickOutcome::Rejected(BuildError::RayDirection)
    );
    assert!(session.drawing().is_empty());
    assert_eq!(session.take_notices(), vec![Notice::RayRejected]);
}

#[tokio::test]
async fn test_step_builds_next_daily_bar_from_minutes() {
    let source = MarketSource::new(date(2024, 6, 28));
    source.holidays.borrow_mut().push(date(2024, 4, 1));
    let mut session = session(config(Some(date(2024, 3, 29))), source);
    session.initial_load().await.unwrap();

    let bar = session.step_next_bar().await.unwrap().unwrap();
    assert_eq!(date_of(bar.time), date(2024, 4, 2));
    assert_eq!(bar.volume, f64::from(SESSION_MINUTES));
    assert!((bar.open - 20.01).abs() < 1e-9);
    assert_eq!(session.store().len(), 101);
    assert_eq!(session.store().last(), Some(&bar));
    // One empty day was skipped.
    assert_eq!(session.source().queries_for(Resolution::Min1).len(), 2);
}

#[tokio::test]
async fn test_stride_accumulates_into_one_bar() {
    let mut session = session(config(Some(date(2024, 3, 29))), MarketSource::new(date(2024, 6, 28)));
    session.initial_load().await.unwrap();

    let mut produced = Vec::new();
    for _ in 0..4 {
        produced.push(session.stride_step().await.unwrap().unwrap());
    }
    assert!(produced[..3].iter().all(|b| !b.is_final()));
    assert!(produced[3].is_final());
    assert_eq!(session.store().len(), 101);

    let last = session.store().last().unwrap();
    assert_eq!(date_of(last.time), date(2024, 4, 1));
    assert_eq!(last.volume, f64::from(SESSION_MINUTES));
    assert_eq!(session.stride().accumulated(), 0);
}

#[tokio::test]
async fn test_stride_skips_a_holiday_period() {
    let source = MarketSource::new(date(2024, 6, 28));
    source.holidays.borrow_mut().push(date(2024, 4, 1));
    let mut session = session(config(Some(date(2024, 3, 29))), source);
    session.initial_load().await.unwrap();

    let mut produced = Vec::new();
    for _ in 0..4 {
        produced.push(session.stride_step().await.unwrap().unwrap());
    }
    assert!(produced[3].is_final());
    assert!(produced.iter().all(|b| date_of(b.bar().time) == date(2024, 4, 2)));
    assert_eq!(session.store().len(), 101);
    assert_eq!(date_of(session.store().last().unwrap().time), date(2024, 4, 2));
    // The holiday and the traded day are each fetched once.
    assert_eq!(session.source().queries_for(Resolution::Min1).len(), 2);
}

#[tokio::test]
async fn test_daily_offset_stamps_stay_on_their_trading_day() {
    let offset = -8 * 3600;
    let end = date(2024, 3, 29);
    let mut cfg = config(Some(end));
    cfg.data.daily_utc_offset_secs = offset;
    let mut session = session(cfg, MarketSource::new(date(2024, 6, 28)));
    session.initial_load().await.unwrap();

    let bar_date = |time: i64| calendar::bar_date(time, offset).unwrap();
    let last = *session.store().last().unwrap();
    assert_eq!(last.time, calendar::day_start(end) + offset);
    assert_eq!(bar_date(last.time), end);

    session.check_and_load().await;
    assert!(session.blocked_by_end_date());
    let queries = session.source().queries_for(Resolution::Daily);
    // Only earlier windows; nothing reaches back into the end-date session.
    assert!(queries.len() > 1);
    assert!(queries[1..].iter().all(|q| q.end_date.is_some_and(|d| d < end)));

    let stepped = session.step_next_bar().await.unwrap().unwrap();
    assert_eq!(stepped.time, calendar::day_start(date(2024, 4, 1)) + offset);

    let before = session.store().len();
    for _ in 0..4 {
        session.stride_step().await.unwrap().unwrap();
    }
    assert_eq!(session.store().len(), before + 1);
    let strided = session.store().last().unwrap();
    assert_eq!(strided.time, calendar::day_start(date(2024, 4, 2)) + offset);

    let dates: Vec<NaiveDate> = session.store().bars().iter().map(|b| bar_date(b.time)).collect();
    assert!(dates.windows(2).all(|w| w[0] < w[1]));
    assert_strictly_ordered(&session);
}

#[tokio::test]
async fn test_daily_offset_later_window_starts_after_last_day() {
    let mut cfg = config(None);
    cfg.data.daily_utc_offset_secs = -8 * 3600;
    let mut session = session(cfg, MarketSource::new(date(2024, 3, 29)));
    session.initial_load().await.unwrap();

    let pending = session.begin_load(Direction::Later).unwrap();
    assert_eq!(pending.window.start, date(2024, 3, 30));
    assert_eq!(pending.query.start_date, Some(date(2024, 3, 30)));
}

#[tokio::test(start_paused = true)]
async fn test_playback_runs_to_the_end_of_minute_data() {
    let source = MarketSource::new(date(2024, 4, 1));
    let mut session = session(config(Some(date(2024, 3, 29))), source);

    assert_eq!(session.start_playback().await, Ok(true));
    assert!(session.store().is_empty());
    assert_eq!(session.playback_state(), PlaybackState::Playing);

    session.playback_cancel().cancel();
    assert_eq!(session.run_playback().await, PlaybackExit::Paused);
    assert_eq!(session.playback_state(), PlaybackState::Paused);

    session.resume_playback();
    assert_eq!(session.run_playback().await, PlaybackExit::Finished);

    let bars = session.store().bars();
    assert_eq!(bars.len(), 1);
    assert_eq!(date_of(bars[0].time), date(2024, 4, 1));
    assert_eq!(bars[0].volume, f64::from(SESSION_MINUTES));
    assert!(session.take_notices().contains(&Notice::PlaybackFinished));

    assert_eq!(session.stop_playback().await, Ok(100));
    assert!(session.playback().is_none());
}
