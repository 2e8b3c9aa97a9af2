//! Wall-clock timing for long-running solves.
//!
//! `Timer` measures elapsed time; `Deadline` turns an optional caller budget
//! into a cheap "are we out of time" check between solver iterations.

use std::time::{Duration, Instant};

/// A simple timer that measures elapsed time.
#[derive(Clone, Copy, Debug)]
pub struct Timer {
    label: &'static str,
    start: Instant,
}

impl Timer {
    /// Create and start a new timer with the given label.
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Elapsed time in seconds.
    pub fn elapsed_s(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Optional wall-clock budget.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    start: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    pub fn new(budget_s: Option<f64>) -> Self {
        Self {
            start: Instant::now(),
            budget: budget_s
                .filter(|b| b.is_finite() && *b >= 0.0)
                .map(Duration::from_secs_f64),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    pub fn expired(&self) -> bool {
        self.budget
            .is_some_and(|budget| self.start.elapsed() >= budget)
    }

    pub fn elapsed_s(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}
