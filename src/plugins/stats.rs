//! User stat rows, the caller principal, and the behavior event log.
//!
//! Stat rows are only written through `store_stats`, a compare-and-set on the
//! `version` column. A lost CAS is reported as `Conflict`, never retried.

use crate::core::error::EngineError;
use crate::core::time;
use crate::plugins::progression;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::OnceLock;

pub const LIFESCORE_MIN: i64 = 0;
pub const LIFESCORE_MAX: i64 = 100;

/// Identity of the caller, passed first to every engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub session_id: Option<String>,
}

impl Principal {
    pub fn new(user_id: impl Into<String>) -> Result<Self, EngineError> {
        let user_id = user_id.into();
        validate_user_id(&user_id)?;
        Ok(Self {
            user_id,
            session_id: None,
        })
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Intent reference recorded in the audit log for one operation.
    pub fn intent_ref(&self, op: &str) -> String {
        match &self.session_id {
            Some(s) => format!("intent:{}:{}:{}", op, s, time::new_event_id()),
            None => format!("intent:{}:{}", op, time::new_event_id()),
        }
    }
}

fn user_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.:@-]{1,64}$").expect("static regex"))
}

pub fn validate_user_id(user_id: &str) -> Result<(), EngineError> {
    if user_id_pattern().is_match(user_id) {
        Ok(())
    } else {
        Err(EngineError::ValidationError(format!(
            "Invalid user id '{}': expected 1-64 chars of [A-Za-z0-9_.:@-]",
            user_id
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: String,
    pub lifescore: i64,
    pub xp: i64,
    pub level: i64,
    pub coins: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub days_active: i64,
    pub last_active_day: Option<i64>,
    pub version: i64,
}

/// Public view returned by `get_stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsView {
    pub user_id: String,
    pub lifescore: i64,
    pub xp: i64,
    pub level: i64,
    pub xp_to_next_level: i64,
    pub coins: i64,
    pub streak: i64,
    pub longest_streak: i64,
    pub days_active: i64,
}

impl From<&UserStats> for StatsView {
    fn from(s: &UserStats) -> Self {
        Self {
            user_id: s.user_id.clone(),
            lifescore: s.lifescore,
            xp: s.xp,
            level: s.level,
            xp_to_next_level: progression::xp_to_next_level(s.xp),
            coins: s.coins,
            streak: s.current_streak,
            longest_streak: s.longest_streak,
            days_active: s.days_active,
        }
    }
}

impl UserStats {
    /// Count today as an engagement day and advance the streak.
    pub fn record_engagement_day(&mut self, today: i64) {
        match self.last_active_day {
            Some(last) if last == today => {
                if self.current_streak == 0 {
                    self.current_streak = 1;
                }
            }
            Some(last) if last + 1 == today => {
                self.current_streak += 1;
                self.days_active += 1;
            }
            _ => {
                self.current_streak = 1;
                self.days_active += 1;
            }
        }
        self.last_active_day = Some(today);
        self.longest_streak = self.longest_streak.max(self.current_streak);
    }
}

const STATS_COLUMNS: &str = "user_id, lifescore, xp, level, coins, current_streak, longest_streak, days_active, last_active_day, version";

fn row_to_stats(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserStats> {
    Ok(UserStats {
        user_id: row.get(0)?,
        lifescore: row.get(1)?,
        xp: row.get(2)?,
        level: row.get(3)?,
        coins: row.get(4)?,
        current_streak: row.get(5)?,
        longest_streak: row.get(6)?,
        days_active: row.get(7)?,
        last_active_day: row.get(8)?,
        version: row.get(9)?,
    })
}

pub fn register_user(
    conn: &Connection,
    user_id: &str,
    starting_lifescore: i64,
    now_z: &str,
) -> Result<UserStats, EngineError> {
    validate_user_id(user_id)?;
    let lifescore = starting_lifescore.clamp(LIFESCORE_MIN, LIFESCORE_MAX);
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO user_stats(user_id, lifescore, xp, level, coins, current_streak, longest_streak, days_active, last_active_day, version, created_at, updated_at)
         VALUES(?1, ?2, 0, 1, 0, 0, 0, 0, NULL, 0, ?3, ?3)",
        params![user_id, lifescore, now_z],
    )?;
    if inserted == 0 {
        return Err(EngineError::Conflict(format!("User '{}' is already registered", user_id)));
    }
    require_stats(conn, user_id)
}

pub fn load_stats(conn: &Connection, user_id: &str) -> Result<Option<UserStats>, EngineError> {
    let sql = format!("SELECT {} FROM user_stats WHERE user_id = ?1", STATS_COLUMNS);
    Ok(conn.query_row(&sql, params![user_id], row_to_stats).optional()?)
}

pub fn require_stats(conn: &Connection, user_id: &str) -> Result<UserStats, EngineError> {
    load_stats(conn, user_id)?
        .ok_or_else(|| EngineError::NotFound(format!("User '{}' not found", user_id)))
}

/// Compare-and-set write of a stat row. `prev` must be the row as read in
/// this transaction; the write only lands if its version is still current.
pub fn store_stats(
    conn: &Connection,
    prev: &UserStats,
    next: &UserStats,
    now_z: &str,
) -> Result<UserStats, EngineError> {
    if !(LIFESCORE_MIN..=LIFESCORE_MAX).contains(&next.lifescore) {
        return Err(EngineError::ValidationError(format!(
            "lifescore {} outside [0,100]",
            next.lifescore
        )));
    }
    if next.coins < 0 {
        return Err(EngineError::ValidationError("coin balance cannot go below 0".to_string()));
    }
    if next.xp < prev.xp {
        return Err(EngineError::ValidationError("xp is monotonic and cannot decrease".to_string()));
    }

    let level = progression::level_from_xp(next.xp);
    let changed = conn.execute(
        "UPDATE user_stats
         SET lifescore = ?1, xp = ?2, level = ?3, coins = ?4, current_streak = ?5,
             longest_streak = ?6, days_active = ?7, last_active_day = ?8,
             version = version + 1, updated_at = ?9
         WHERE user_id = ?10 AND version = ?11",
        params![
            next.lifescore,
            next.xp,
            level,
            next.coins,
            next.current_streak,
            next.longest_streak,
            next.days_active,
            next.last_active_day,
            now_z,
            prev.user_id,
            prev.version
        ],
    )?;
    if changed == 0 {
        return Err(EngineError::Conflict(format!(
            "Stats for '{}' changed concurrently (version {})",
            prev.user_id, prev.version
        )));
    }
    Ok(UserStats {
        level,
        version: prev.version + 1,
        ..next.clone()
    })
}

/// Add xp (level follows automatically). Returns the updated row.
pub fn grant_xp(conn: &Connection, user_id: &str, amount: i64, now_z: &str) -> Result<UserStats, EngineError> {
    if amount < 0 {
        return Err(EngineError::ValidationError(format!(
            "xp grant must be non-negative, got {}",
            amount
        )));
    }
    let prev = require_stats(conn, user_id)?;
    if amount == 0 {
        return Ok(prev);
    }
    let next = UserStats {
        xp: prev.xp + amount,
        ..prev.clone()
    };
    store_stats(conn, &prev, &next, now_z)
}

pub fn append_behavior_event(
    conn: &Connection,
    user_id: &str,
    event_type: &str,
    payload: &JsonValue,
    lifescore_before: Option<i64>,
    lifescore_after: Option<i64>,
    now_secs: u64,
) -> Result<String, EngineError> {
    let event_id = time::new_event_id();
    conn.execute(
        "INSERT INTO behavior_events(event_id, user_id, event_type, payload, lifescore_before, lifescore_after, ts, ts_secs)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            event_id,
            user_id,
            event_type,
            serde_json::to_string(payload)?,
            lifescore_before,
            lifescore_after,
            time::epoch_z(now_secs),
            now_secs as i64
        ],
    )?;
    Ok(event_id)
}

pub fn count_events(conn: &Connection, user_id: &str, event_type: &str) -> Result<i64, EngineError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM behavior_events WHERE user_id = ?1 AND event_type = ?2",
        params![user_id, event_type],
        |row| row.get(0),
    )?)
}

/// Count and oldest timestamp of the given event kinds at or after `since_secs`.
pub fn events_in_window(
    conn: &Connection,
    user_id: &str,
    event_types: &[&str],
    since_secs: u64,
) -> Result<(i64, Option<u64>), EngineError> {
    let mut count = 0i64;
    let mut oldest: Option<u64> = None;
    for event_type in event_types {
        let (n, min_ts): (i64, Option<i64>) = conn.query_row(
            "SELECT COUNT(*), MIN(ts_secs) FROM behavior_events
             WHERE user_id = ?1 AND event_type = ?2 AND ts_secs >= ?3",
            params![user_id, event_type, since_secs as i64],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        count += n;
        if let Some(ts) = min_ts {
            let ts = ts as u64;
            oldest = Some(oldest.map_or(ts, |o| o.min(ts)));
        }
    }
    Ok((count, oldest))
}
