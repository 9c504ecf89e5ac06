//! Sliding-window limiter for the scenario and recommendation entry points.
//!
//! The window is read from `behavior_events`, so limits hold across
//! processes sharing one database and need no in-memory state.

use crate::core::config::RateLimitConfig;
use crate::core::error::EngineError;
use crate::plugins::achievements::SCENARIO_APPLIED_EVENT;
use crate::plugins::scenario::SCENARIO_PREVIEWED_EVENT;
use crate::plugins::stats;
use rusqlite::Connection;

pub const MISSIONS_RECOMMENDED_EVENT: &str = "missions_recommended";

/// Event kinds that count against the limit.
pub const LIMITED_EVENTS: &[&str] = &[
    SCENARIO_PREVIEWED_EVENT,
    SCENARIO_APPLIED_EVENT,
    MISSIONS_RECOMMENDED_EVENT,
];

/// Fails with `RateLimitExceeded` when the user already used the window.
pub fn check(conn: &Connection, user_id: &str, config: &RateLimitConfig, now_secs: u64) -> Result<(), EngineError> {
    if config.max_requests == 0 {
        return Err(EngineError::RateLimitExceeded {
            retry_after_secs: config.window_secs,
        });
    }
    let since = now_secs.saturating_sub(config.window_secs);
    let (count, oldest) = stats::events_in_window(conn, user_id, LIMITED_EVENTS, since)?;
    if count < i64::from(config.max_requests) {
        return Ok(());
    }
    let retry_after_secs = oldest
        .map(|ts| (ts + config.window_secs).saturating_sub(now_secs).max(1))
        .unwrap_or(config.window_secs);
    Err(EngineError::RateLimitExceeded { retry_after_secs })
}
