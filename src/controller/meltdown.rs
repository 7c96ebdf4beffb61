//! Per-resource meltdown window.
//!
//! After every reconcile the resource's `lastReconcile` timestamp is updated,
//! which itself produces a watch event. The meltdown window absorbs that self
//! echo: while "now" lies inside `[lastReconcile, lastReconcile + duration)`
//! the reconciler defers without doing work.

use chrono::{DateTime, Duration, Utc};

/// The cooling-off window after a reconcile.
#[derive(Debug, Clone, Copy)]
pub struct Window {
    start: Option<DateTime<Utc>>,
    duration: Duration,
}

impl Window {
    pub fn new(duration: Duration, last_reconcile: Option<DateTime<Utc>>) -> Self {
        Window {
            start: last_reconcile,
            duration,
        }
    }

    /// Whether `now` falls inside the window. A resource that was never
    /// reconciled has no window.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        match self.start {
            Some(start) => now >= start && now < start + self.duration,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_last_reconcile_means_no_window() {
        let window = Window::new(Duration::seconds(60), None);
        assert!(!window.contains(Utc::now()));
    }

    #[test]
    fn window_boundaries_are_half_open() {
        let start = Utc::now();
        let window = Window::new(Duration::seconds(60), Some(start));

        assert!(window.contains(start));
        assert!(window.contains(start + Duration::seconds(59)));
        assert!(!window.contains(start + Duration::seconds(60)));
        assert!(!window.contains(start - Duration::seconds(1)));
    }
}
