//! Monthly retry schedule for titles that keep failing during periodic scans
//!
//! Between retry windows, old folders without a poster are skipped and old
//! folders with a poster but no backdrop only skip the backdrop. New folders
//! are always attempted.

use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::debug;

const MONTH: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Whether `this_month` still falls inside the window opened at `last_month`
///
/// Months are 1-12. When the calendar wrapped since the last retry, the
/// current month is shifted by twelve before comparing.
pub fn is_retry_window_open(last_month: i32, frequency: u32, this_month: i32) -> bool {
    let this = if this_month < last_month { this_month + 12 } else { this_month };
    this < last_month + frequency as i32
}

/// What the policy allows for one item this cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryDecision {
    pub skip_item: bool,
    pub block_backdrop: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub frequency: u32,
    pub newer_than_months: u32,
    pub last_retry_month: i32,
}

impl RetryPolicy {
    pub fn is_active(&self) -> bool {
        self.frequency > 0
    }

    /// Suppression applies only once a retry month is recorded and the window has closed
    pub fn suppresses(&self, this_month: i32) -> bool {
        self.is_active()
            && self.last_retry_month != -1
            && !is_retry_window_open(self.last_retry_month, self.frequency, this_month)
    }

    pub fn evaluate(
        &self,
        folder: &Path,
        poster_exists: bool,
        backdrop_missing: bool,
        this_month: i32,
        now: SystemTime,
    ) -> RetryDecision {
        if !self.suppresses(this_month) {
            return RetryDecision::default();
        }
        let Some(created) = folder_created(folder) else {
            return RetryDecision::default();
        };
        let age = now.duration_since(created).unwrap_or_default();
        if age <= MONTH * self.newer_than_months {
            return RetryDecision::default();
        }

        let decision = if !poster_exists {
            RetryDecision {
                skip_item: true,
                block_backdrop: false,
            }
        } else if backdrop_missing {
            RetryDecision {
                skip_item: false,
                block_backdrop: true,
            }
        } else {
            RetryDecision::default()
        };
        debug!(folder = %folder.display(), ?decision, "Retry window closed");
        decision
    }
}

/// Creation time where the platform reports one, else the modification time
fn folder_created(folder: &Path) -> Option<SystemTime> {
    let meta = std::fs::metadata(folder).ok()?;
    meta.created().or_else(|_| meta.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_boundaries() {
        assert!(!is_retry_window_open(3, 2, 5));
        assert!(is_retry_window_open(3, 2, 4));
        assert!(is_retry_window_open(3, 2, 3));
    }

    #[test]
    fn test_window_year_wraparound() {
        // 1 + 12 = 13 is not below 11 + 2
        assert!(!is_retry_window_open(11, 2, 1));
        assert!(is_retry_window_open(11, 3, 1));
        assert!(is_retry_window_open(12, 1, 12));
        assert!(!is_retry_window_open(12, 1, 1));
    }

    #[test]
    fn test_unset_month_never_suppresses() {
        let policy = RetryPolicy {
            frequency: 1,
            newer_than_months: 0,
            last_retry_month: -1,
        };
        assert!(!policy.suppresses(7));
    }

    #[test]
    fn test_zero_frequency_disables() {
        let policy = RetryPolicy {
            frequency: 0,
            newer_than_months: 0,
            last_retry_month: 3,
        };
        assert!(!policy.suppresses(9));
    }

    #[test]
    fn test_old_folder_decisions() {
        let dir = tempfile::tempdir().unwrap();
        let policy = RetryPolicy {
            frequency: 2,
            newer_than_months: 6,
            last_retry_month: 3,
        };
        let later = SystemTime::now() + MONTH * 12;

        let missing_poster = policy.evaluate(dir.path(), false, true, 5, later);
        assert!(missing_poster.skip_item);

        let missing_backdrop = policy.evaluate(dir.path(), true, true, 5, later);
        assert_eq!(
            missing_backdrop,
            RetryDecision {
                skip_item: false,
                block_backdrop: true
            }
        );

        let complete = policy.evaluate(dir.path(), true, false, 5, later);
        assert_eq!(complete, RetryDecision::default());

        let open_window = policy.evaluate(dir.path(), false, true, 4, later);
        assert_eq!(open_window, RetryDecision::default());
    }

    #[test]
    fn test_new_folder_is_always_attempted() {
        let dir = tempfile::tempdir().unwrap();
        let policy = RetryPolicy {
            frequency: 2,
            newer_than_months: 6,
            last_retry_month: 3,
        };
        let decision = policy.evaluate(dir.path(), false, true, 5, SystemTime::now());
        assert_eq!(decision, RetryDecision::default());
    }
}
