//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::collections::HashMap;
use std::num::NonZeroU32;

use crate::game::PlayerKey;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Limiter {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    RateLimiter::direct(quota)
}

/// Chat command rate limit (per player)
pub const CHAT_COMMAND_RATE_LIMIT: u32 = 4; // Max 4 commands per second

/// Per-player chat command limiter
///
/// Limiters are keyed by roster generation, so a player reusing a numeric id
/// starts with a fresh budget.
pub struct CommandRateLimiter {
    per_second: u32,
    limiters: HashMap<PlayerKey, Limiter>,
}

impl CommandRateLimiter {
    pub fn new(per_second: u32) -> Self {
        Self {
            per_second,
            limiters: HashMap::new(),
        }
    }

    /// Check if a chat command is allowed (returns true if allowed)
    pub fn check(&mut self, key: PlayerKey) -> bool {
        let per_second = self.per_second;
        self.limiters
            .entry(key)
            .or_insert_with(|| create_limiter(per_second))
            .check()
            .is_ok()
    }

    /// Drop the limiter of a player who left
    pub fn forget(&mut self, key: PlayerKey) {
        self.limiters.remove(&key);
    }
}

impl Default for CommandRateLimiter {
    fn default() -> Self {
        Self::new(CHAT_COMMAND_RATE_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_is_limited() {
        let mut limiter = CommandRateLimiter::new(2);
        let key = PlayerKey { id: 1, generation: 1 };

        assert!(limiter.check(key));
        assert!(limiter.check(key));
        assert!(!limiter.check(key));
    }

    #[test]
    fn test_new_generation_has_own_budget() {
        let mut limiter = CommandRateLimiter::new(1);
        let old = PlayerKey { id: 1, generation: 1 };
        let new = PlayerKey { id: 1, generation: 2 };

        assert!(limiter.check(old));
        assert!(!limiter.check(old));
        assert!(limiter.check(new));

        limiter.forget(old);
        assert!(limiter.check(old));
    }
}
