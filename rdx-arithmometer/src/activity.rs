//! Tracks whether any animation in the machine is still in flight.

use std::cell::Cell;
use std::rc::Rc;

/// A shared count of queued animation legs.
///
/// The engine owns one tracker and hands a clone to every
/// [`ScalarAnimation`](crate::components::animation::ScalarAnimation) it
/// builds. Animations report into it as legs are queued, completed or
/// flushed; the engine reads it to decide whether the machine is busy.
#[derive(Debug, Clone, Default)]
pub struct ActivityTracker {
    in_flight: Rc<Cell<usize>>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of legs queued across every reporting animation.
    pub fn in_flight(&self) -> usize {
        self.in_flight.get()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.get() > 0
    }

    pub(crate) fn leg_queued(&self) {
        self.in_flight.set(self.in_flight.get() + 1);
    }

    pub(crate) fn legs_finished(&self, count: usize) {
        self.in_flight.set(self.in_flight.get().saturating_sub(count));
    }
}
