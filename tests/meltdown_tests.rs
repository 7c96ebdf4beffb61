//! Meltdown window tests.
//!
//! The window is the single authority for back-pressure against
//! self-triggered reconcile cascades: a status update produces a watch event,
//! and the follow-up reconcile has to land inside the window and defer.

use chrono::{Duration, Utc};

use quarks_secret_controller::controller::meltdown::Window;

#[test]
fn fresh_resources_are_never_in_meltdown() {
    let window = Window::new(Duration::seconds(60), None);
    assert!(!window.contains(Utc::now()));
}

#[test]
fn reconcile_directly_after_a_status_update_is_deferred() {
    let last_reconcile = Utc::now();
    let window = Window::new(Duration::seconds(60), Some(last_reconcile));

    // The self-echo of the status update arrives within milliseconds.
    assert!(window.contains(last_reconcile + Duration::milliseconds(50)));
}

#[test]
fn reconcile_after_the_window_proceeds() {
    let last_reconcile = Utc::now() - Duration::seconds(61);
    let window = Window::new(Duration::seconds(60), Some(last_reconcile));
    assert!(!window.contains(Utc::now()));
}

#[test]
fn window_is_half_open() {
    let start = Utc::now();
    let window = Window::new(Duration::seconds(10), Some(start));

    assert!(window.contains(start));
    assert!(!window.contains(start + Duration::seconds(10)));
}

#[test]
fn zero_duration_disables_the_window() {
    let start = Utc::now();
    let window = Window::new(Duration::seconds(0), Some(start));
    assert!(!window.contains(start));
}
