//! Up/down transitions and the first-up anchor.

use chrono::{DateTime, Utc};

/// Reachability decision for a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UptimeState {
    Up,
    Down,
}

impl UptimeState {
    /// State implied by a stored last status.
    pub fn from_last_status(status: u16) -> Self {
        if status == 200 {
            UptimeState::Up
        } else {
            UptimeState::Down
        }
    }

    pub fn from_up(is_up: bool) -> Self {
        if is_up {
            UptimeState::Up
        } else {
            UptimeState::Down
        }
    }
}

/// First-up anchor after moving from `previous` to `next` at `now`.
///
/// Down to Up starts a fresh anchor, Up to Down clears it, anything else
/// leaves `first_up` untouched.
pub fn next_first_up(
    previous: UptimeState,
    next: UptimeState,
    first_up: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match (previous, next) {
        (UptimeState::Down, UptimeState::Up) => Some(now),
        (UptimeState::Up, UptimeState::Down) => None,
        _ => first_up,
    }
}
