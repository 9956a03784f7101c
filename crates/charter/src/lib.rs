//! Charter - candlestick chart session core.
//!
//! Everything a chart needs apart from pixels: the bar store, background
//! history loading, viewport anchoring across merges, moving-average overlays,
//! drawing tools, bar stepping and minute playback. The rendering widget is
//! abstracted behind [`widget::ChartWidget`]; [`widget::HeadlessChart`] is an
//! in-memory implementation used by the binary and the tests.

pub mod coords;
pub mod drawing;
pub mod events;
pub mod fetch;
pub mod indicators;
pub mod log_ring;
pub mod replay;
pub mod session;
pub mod store;
pub mod viewport;
pub mod widget;

pub use session::{ChartSession, LoadError, PendingLoad, PlaybackExit};
pub use store::{BarStore, MergeOutcome};
pub use widget::{ChartWidget, HeadlessChart};
