//! Time utilities for session timers

use std::time::Duration;
use tokio::time::Instant;

/// Controller start time for uptime tracking
static SERVER_START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();

/// Initialize controller start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(std::time::Instant::now);
}

/// Get controller uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Whole seconds left until `deadline`, zero once it has passed
pub fn secs_until(deadline: Instant, now: Instant) -> u64 {
    deadline.saturating_duration_since(now).as_secs()
}

/// Minutes left until `deadline`, rounded up so a blocked player never reads "0 minutes"
pub fn minutes_until(deadline: Instant, now: Instant) -> u64 {
    secs_until(deadline, now) / 60 + 1
}

/// Parse a whole number of seconds from a config value
pub fn parse_secs(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secs_until_saturates() {
        let now = Instant::now();
        assert_eq!(secs_until(now + Duration::from_secs(7), now), 7);
        assert_eq!(secs_until(now, now + Duration::from_secs(3)), 0);
    }

    #[test]
    fn test_minutes_until_rounds_up() {
        let now = Instant::now();
        assert_eq!(minutes_until(now + Duration::from_secs(30), now), 1);
        assert_eq!(minutes_until(now + Duration::from_secs(150), now), 3);
    }

    #[test]
    fn test_parse_secs() {
        assert_eq!(parse_secs(" 40 "), Some(Duration::from_secs(40)));
        assert_eq!(parse_secs("forty"), None);
    }
}
