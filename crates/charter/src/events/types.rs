//! Event and command type definitions.
//!
//! - [`ChartEvent`] - Semantic events raised while handling input and data
//! - [`Command`] - Widget-facing mutations derived from events
//! - [`Notice`] - Messages meant for the user rather than the log

use crate::fetch::Direction;

#[derive(Debug, Clone, PartialEq)]
pub enum ChartEvent {
    /// The viewport may need more data. Pending duplicates coalesce.
    CheckData,
    /// A fetch merged new bars into the store.
    DataMerged { direction: Direction, added: usize },
    /// The store was replaced wholesale (initial load, symbol or resolution switch).
    StoreReplaced,
}

impl ChartEvent {
    /// Whether a pending copy of this event makes a new one redundant.
    #[must_use]
    pub fn coalesces(&self) -> bool {
        matches!(self, ChartEvent::CheckData | ChartEvent::StoreReplaced)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Push the store to the main and volume series.
    SyncSeries,
    /// Recompute moving-average overlays.
    RefreshIndicators,
    /// Restore the recorded viewport reference.
    RestoreViewport,
    FitContent,
}

/// Something the user should see.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// The bar cap was hit and older bars were dropped.
    CapExceeded { dropped: usize, max_bars: usize },
    /// A foreground load failed.
    LoadFailed(String),
    /// A trend ray was placed right-to-left.
    RayRejected,
    /// Playback ran out of minute data.
    PlaybackFinished,
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::CapExceeded { dropped, max_bars } => write!(
                f,
                "Too much data: kept the latest {max_bars} bars, dropped {dropped}"
            ),
            Notice::LoadFailed(msg) => write!(f, "Failed to load data: {msg}"),
            Notice::RayRejected => write!(
                f,
                "A ray must point right: place the second point later than the first"
            ),
            Notice::PlaybackFinished => write!(f, "Playback finished: no more minute data"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalescing_events() {
        assert!(ChartEvent::CheckData.coalesces());
        assert!(!ChartEvent::DataMerged {
            direction: Direction::Earlier,
            added: 1
        }
        .coalesces());
    }

    #[test]
    fn test_notice_text() {
        let notice = Notice::CapExceeded {
            dropped: 5,
            max_bars: 10_000,
        };
        assert!(notice.to_string().contains("10000"));
    }
}
