//! LifeScore ledger.
//!
//! The score is bounded to [0,100] and saturates at the bounds. Every call
//! writes exactly one history row holding the *effective* change, so
//! `old + delta = new` holds for every row.

use crate::core::error::EngineError;
use crate::core::time;
use crate::plugins::stats::{self, LIFESCORE_MAX, LIFESCORE_MIN};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest magnitude a single change may request or record.
pub const MAX_DELTA_MAGNITUDE: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifeScoreReason {
    MissionComplete,
    AchievementUnlock,
    StreakBonus,
    ScenarioPenalty,
}

impl LifeScoreReason {
    pub const ALL: [LifeScoreReason; 4] = [
        Self::MissionComplete,
        Self::AchievementUnlock,
        Self::StreakBonus,
        Self::ScenarioPenalty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissionComplete => "mission_complete",
            Self::AchievementUnlock => "achievement_unlock",
            Self::StreakBonus => "streak_bonus",
            Self::ScenarioPenalty => "scenario_penalty",
        }
    }
}

impl fmt::Display for LifeScoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifeScoreReason {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| {
                EngineError::ValidationError(format!(
                    "Unknown lifescore reason '{}'. Expected one of: {}",
                    s,
                    Self::ALL.map(|r| r.as_str()).join(", ")
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifeScoreChange {
    pub old_score: i64,
    pub new_score: i64,
    pub requested_delta: i64,
    pub applied_delta: i64,
    pub reason: LifeScoreReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifeScoreHistoryEntry {
    pub id: String,
    pub user_id: String,
    pub old_score: i64,
    pub new_score: i64,
    pub delta: i64,
    pub reason: String,
    pub ts: String,
}

pub fn clamp_score(score: i64) -> i64 {
    score.clamp(LIFESCORE_MIN, LIFESCORE_MAX)
}

/// Apply a delta to the user's score within the caller's transaction.
pub fn apply_delta(
    conn: &Connection,
    user_id: &str,
    delta: i64,
    reason: &str,
    now_z: &str,
) -> Result<LifeScoreChange, EngineError> {
    let reason: LifeScoreReason = reason.parse()?;
    if delta.abs() > MAX_DELTA_MAGNITUDE {
        return Err(EngineError::ValidationError(format!(
            "lifescore delta {} exceeds magnitude limit {}",
            delta, MAX_DELTA_MAGNITUDE
        )));
    }

    let prev = stats::require_stats(conn, user_id)?;
    let new_score = clamp_score(prev.lifescore + delta);
    let applied = new_score - prev.lifescore;

    if applied != 0 {
        let next = stats::UserStats {
            lifescore: new_score,
            ..prev.clone()
        };
        stats::store_stats(conn, &prev, &next, now_z)?;
    }

    conn.execute(
        "INSERT INTO lifescore_history(id, user_id, old_score, new_score, delta, reason, ts)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            time::new_event_id(),
            user_id,
            prev.lifescore,
            new_score,
            applied,
            reason.as_str(),
            now_z
        ],
    )?;

    Ok(LifeScoreChange {
        old_score: prev.lifescore,
        new_score,
        requested_delta: delta,
        applied_delta: applied,
        reason,
    })
}

/// Most recent history rows first.
pub fn history(conn: &Connection, user_id: &str, limit: usize) -> Result<Vec<LifeScoreHistoryEntry>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, old_score, new_score, delta, reason, ts
         FROM lifescore_history WHERE user_id = ?1
         ORDER BY rowid DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id, limit as i64], |row| {
        Ok(LifeScoreHistoryEntry {
            id: row.get(0)?,
            user_id: row.get(1)?,
            old_score: row.get(2)?,
            new_score: row.get(3)?,
            delta: row.get(4)?,
            reason: row.get(5)?,
            ts: row.get(6)?,
        })
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}
