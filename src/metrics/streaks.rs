//! Streak tracking
//!
//! Two streaks exist: the usage streak kept on `UserMetrics` (consecutive
//! active days) and the daily-challenge streak computed from a day's
//! challenge completions.

use chrono::NaiveDate;

use super::UserMetrics;

/// What recording an active day did to the usage streak
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakChange {
    /// First activity ever, or first activity after a gap
    Started,
    /// Previous active day was yesterday; carries the new length
    Extended(u64),
    /// Day already counted
    Unchanged,
}

/// Record activity on `day` against the usage streak.
///
/// Yesterday extends, today keeps, anything older restarts at 1. A day older
/// than the last active day (late event) leaves the streak alone.
pub fn record_activity_day(metrics: &mut UserMetrics, day: NaiveDate) -> StreakChange {
    let change = match metrics.last_active_day {
        None => {
            metrics.current_streak = 1;
            StreakChange::Started
        }
        Some(last) if day <= last => return StreakChange::Unchanged,
        Some(last) if (day - last).num_days() == 1 => {
            metrics.current_streak += 1;
            StreakChange::Extended(metrics.current_streak)
        }
        Some(_) => {
            metrics.current_streak = 1;
            StreakChange::Started
        }
    };

    metrics.last_active_day = Some(day);
    metrics.longest_streak = metrics.longest_streak.max(metrics.current_streak);
    change
}

/// Daily-challenge streak after a day with `completed` of `total` challenges.
///
/// All done extends the streak, none breaks it, and a partial day keeps it
/// where it was.
pub fn challenge_streak(previous: u32, completed: u32, total: u32) -> u32 {
    if total == 0 {
        return previous;
    }
    if completed >= total {
        previous + 1
    } else if completed == 0 {
        0
    } else {
        previous
    }
}
