//! Performance measurement tools.

use std::{
    cell::{Cell, RefCell},
    fmt,
    time::{Duration, Instant},
};

const MAX_DURATIONS: usize = 250;

/// A timer that can measure and average the time an operation takes.
///
/// Collected timings are averaged and reset when the timer is displayed using `{}`
/// ([`std::fmt::Display`]).
pub struct Timer {
    name: &'static str,
    durations: RefCell<Vec<Duration>>,
    forgotten: Cell<bool>,
}

impl Timer {
    /// Creates a new timer.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            durations: Default::default(),
            forgotten: Cell::new(false),
        }
    }

    /// Invokes a closure, measuring and recording the time it takes.
    pub fn time<T>(&mut self, timee: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = timee();
        self.stop(start);
        result
    }

    fn stop(&mut self, start: Instant) {
        if self.forgotten.get() {
            return;
        }

        let duration = start.elapsed();
        let durations = self.durations.get_mut();
        if durations.len() < MAX_DURATIONS {
            durations.push(duration);
        } else {
            // Nobody is displaying (and thus draining) this timer, stop collecting.
            self.forgotten.set(true);
            durations.clear();
        }
    }
}

/// Displays the average recorded time and resets it.
impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.forgotten.get() {
            write!(f, "{}: <forgotten>", self.name)
        } else {
            let mut durations = self.durations.borrow_mut();
            let len = durations.len();
            let num = durations.len() as f32;
            let avg_ms = durations
                .iter()
                .fold(0.0, |prev, new| prev + new.as_secs_f32() * 1000.0 / num);
            durations.clear();

            write!(f, "{}: {len}x{avg_ms:.01}ms", self.name)
        }
    }
}
