//! Event bus for queuing events and commands.
//!
//! Re-entrant triggers (a merge re-renders the chart, which moves the
//! viewport, which asks for another data check) land here instead of
//! recursing. Events that [coalesce](ChartEvent::coalesces) are dropped when
//! an identical one is already pending, and duplicate commands collapse, so a
//! burst of triggers costs one check and one widget sync.

use std::collections::VecDeque;

use super::types::{ChartEvent, Command};

#[derive(Debug, Default)]
pub struct EventBus {
    events: VecDeque<ChartEvent>,
    commands: VecDeque<Command>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event. Returns `false` if it coalesced into a pending one.
    pub fn emit(&mut self, event: ChartEvent) -> bool {
        if event.coalesces() && self.events.contains(&event) {
            return false;
        }
        self.events.push_back(event);
        true
    }

    /// Queue a command unless the same command is already pending.
    pub fn dispatch(&mut self, cmd: Command) {
        if !self.commands.contains(&cmd) {
            self.commands.push_back(cmd);
        }
    }

    pub fn dispatch_all(&mut self, commands: impl IntoIterator<Item = Command>) {
        for cmd in commands {
            self.dispatch(cmd);
        }
    }

    /// Take the oldest pending event.
    pub fn next_event(&mut self) -> Option<ChartEvent> {
        self.events.pop_front()
    }

    pub fn drain_commands(&mut self) -> impl Iterator<Item = Command> + '_ {
        self.commands.drain(..)
    }

    #[must_use]
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    #[must_use]
    pub fn has_commands(&self) -> bool {
        !self.commands.is_empty()
    }

    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.commands.clear();
    }
}
