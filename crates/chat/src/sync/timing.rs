//! Refresh timing

use chrono::{DateTime, Utc};

/// Whether at least `cooldown_secs` have passed since `last_refresh_at`
///
/// Never having refreshed counts as elapsed.
pub fn cooldown_elapsed(last_refresh_at: Option<DateTime<Utc>>, cooldown_secs: u64, now: DateTime<Utc>) -> bool {
    match last_refresh_at {
        Some(last) => (now - last).num_seconds() >= cooldown_secs as i64,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_never_refreshed() {
        let now = Utc::now();
        assert!(cooldown_elapsed(None, 30, now));
        assert!(cooldown_elapsed(None, 0, now));
    }

    #[test]
    fn test_within_cooldown() {
        let now = Utc::now();
        assert!(!cooldown_elapsed(Some(now - Duration::seconds(10)), 30, now));
        assert!(!cooldown_elapsed(Some(now - Duration::seconds(1)), 30, now));
    }

    #[test]
    fn test_at_and_past_boundary() {
        let now = Utc::now();
        assert!(cooldown_elapsed(Some(now - Duration::seconds(30)), 30, now));
        assert!(cooldown_elapsed(Some(now - Duration::hours(24)), 60, now));
        assert!(cooldown_elapsed(Some(now), 0, now));
    }

    #[test]
    fn test_clock_moved_backwards() {
        let now = Utc::now();
        assert!(!cooldown_elapsed(Some(now + Duration::seconds(5)), 30, now));
    }
}
