//! Event queueing between input handling, fetching and the widget.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{ChartEvent, Command, Notice};
