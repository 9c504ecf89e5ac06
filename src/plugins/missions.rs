//! Mission lifecycle: `available -> active -> {completed | failed}`.
//!
//! One record per (user, mission, recurrence instance). State transitions are
//! conditional updates on the prior status; losing that race is a `Conflict`.
//! At most one record per user is `active`, backed by a partial unique index.

use crate::core::error::EngineError;
use crate::core::time::{self, Clock};
use crate::plugins::achievements::{self, UnlockedAchievement};
use crate::plugins::catalog::{self, Mission};
use crate::plugins::lifescore::{self, LifeScoreReason};
use crate::plugins::rewards;
use crate::plugins::stats::{self, StatsView};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Available,
    Active,
    Completed,
    Failed,
    Locked,
}

impl MissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Locked => "locked",
        }
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissionStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "locked" => Ok(Self::Locked),
            other => Err(EngineError::ValidationError(format!(
                "Unknown mission status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMission {
    pub id: String,
    pub user_id: String,
    pub mission_id: String,
    pub instance_key: String,
    pub status: MissionStatus,
    pub progress: i64,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub xp_earned: i64,
    pub coins_earned: i64,
    pub lifescore_change: i64,
    pub updated_at: String,
}

/// Outcome of `start`; `already_started` marks an idempotent retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionStart {
    pub record: UserMission,
    pub already_started: bool,
}

/// Reward breakdown for one completed mission instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardResult {
    pub record: UserMission,
    pub xp_earned: i64,
    pub coins_earned: i64,
    pub lifescore_requested: i64,
    pub lifescore_change: i64,
    pub streak: i64,
    pub unlocked_achievements: Vec<UnlockedAchievement>,
    pub stats: StatsView,
}

/// Catalog entry annotated with the caller's state for the current instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionView {
    pub mission: Mission,
    pub status: MissionStatus,
    pub progress: i64,
    pub coin_reward: i64,
    pub instance_key: String,
}

const USER_MISSION_COLUMNS: &str = "id, user_id, mission_id, instance_key, status, progress, started_at, completed_at, xp_earned, coins_earned, lifescore_change, updated_at";

fn row_to_user_mission(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserMission> {
    Ok(UserMission {
        id: row.get(0)?,
        user_id: row.get(1)?,
        mission_id: row.get(2)?,
        instance_key: row.get(3)?,
        status: catalog::parse_col(4, row.get(4)?)?,
        progress: row.get(5)?,
        started_at: row.get(6)?,
        completed_at: row.get(7)?,
        xp_earned: row.get(8)?,
        coins_earned: row.get(9)?,
        lifescore_change: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn get_by_id(conn: &Connection, id: &str) -> Result<UserMission, EngineError> {
    let sql = format!("SELECT {} FROM user_missions WHERE id = ?1", USER_MISSION_COLUMNS);
    conn.query_row(&sql, params![id], row_to_user_mission)
        .optional()?
        .ok_or_else(|| EngineError::NotFound(format!("Mission record '{}' not found", id)))
}

fn get_instance(
    conn: &Connection,
    user_id: &str,
    mission_id: &str,
    instance_key: &str,
) -> Result<Option<UserMission>, EngineError> {
    let sql = format!(
        "SELECT {} FROM user_missions WHERE user_id = ?1 AND mission_id = ?2 AND instance_key = ?3",
        USER_MISSION_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![user_id, mission_id, instance_key], row_to_user_mission)
        .optional()?)
}

/// The user's single active record, if any.
pub fn active_mission(conn: &Connection, user_id: &str) -> Result<Option<UserMission>, EngineError> {
    let sql = format!(
        "SELECT {} FROM user_missions WHERE user_id = ?1 AND status = 'active'",
        USER_MISSION_COLUMNS
    );
    Ok(conn.query_row(&sql, params![user_id], row_to_user_mission).optional()?)
}

fn active_for_mission(conn: &Connection, user_id: &str, mission_id: &str) -> Result<UserMission, EngineError> {
    if catalog::get_mission(conn, mission_id)?.is_none() {
        return Err(EngineError::NotFound(format!("Mission '{}' not found", mission_id)));
    }
    match active_mission(conn, user_id)? {
        Some(m) if m.mission_id == mission_id => Ok(m),
        _ => Err(EngineError::Conflict(format!(
            "Mission '{}' is not active for '{}'",
            mission_id, user_id
        ))),
    }
}

/// Start a mission instance, or return the already-active one on retry.
pub fn start(
    conn: &Connection,
    user_id: &str,
    mission_id: &str,
    clock: &dyn Clock,
) -> Result<MissionStart, EngineError> {
    let mission = catalog::require_active_mission(conn, mission_id)?;
    let user = stats::require_stats(conn, user_id)?;
    let instance_key = mission.recurrence.instance_key(clock.today());

    if let Some(existing) = get_instance(conn, user_id, mission_id, &instance_key)? {
        return match existing.status {
            MissionStatus::Active => Ok(MissionStart {
                record: existing,
                already_started: true,
            }),
            status => Err(EngineError::Conflict(format!(
                "Mission '{}' is already {} for this period",
                mission_id, status
            ))),
        };
    }

    if let Some(other) = active_mission(conn, user_id)? {
        return Err(EngineError::Conflict(format!(
            "Mission '{}' is already active; finish it before starting '{}'",
            other.mission_id, mission_id
        )));
    }

    if mission.required_level > user.level {
        return Err(EngineError::Conflict(format!(
            "Mission '{}' is locked until level {} (current level {})",
            mission_id, mission.required_level, user.level
        )));
    }

    let now_z = clock.now_z();
    let id = time::new_event_id();
    let res = conn.execute(
        "INSERT INTO user_missions(id, user_id, mission_id, instance_key, status, progress, started_at, updated_at)
         VALUES(?1, ?2, ?3, ?4, 'active', 0, ?5, ?5)",
        params![id, user_id, mission_id, instance_key, now_z],
    );
    match res.map_err(EngineError::from) {
        Ok(_) => {}
        Err(e) if e.is_constraint_violation() => {
            return match get_instance(conn, user_id, mission_id, &instance_key)? {
                Some(existing) if existing.status == MissionStatus::Active => Ok(MissionStart {
                    record: existing,
                    already_started: true,
                }),
                _ => Err(EngineError::Conflict(format!(
                    "Mission '{}' could not be started: another mission is active",
                    mission_id
                ))),
            };
        }
        Err(e) => return Err(e),
    }

    stats::append_behavior_event(
        conn,
        user_id,
        "mission_started",
        &serde_json::json!({ "mission_id": mission_id, "instance_key": instance_key }),
        Some(user.lifescore),
        Some(user.lifescore),
        clock.now_secs(),
    )?;

    Ok(MissionStart {
        record: get_by_id(conn, &id)?,
        already_started: false,
    })
}

/// Complete the active instance of `mission_id` and pay out its rewards.
pub fn complete(
    conn: &Connection,
    user_id: &str,
    mission_id: &str,
    clock: &dyn Clock,
) -> Result<RewardResult, EngineError> {
    let record = active_for_mission(conn, user_id, mission_id)?;
    let mission = catalog::get_mission(conn, mission_id)?
        .ok_or_else(|| EngineError::NotFound(format!("Mission '{}' not found", mission_id)))?;
    let now_z = clock.now_z();

    let claimed = conn.execute(
        "UPDATE user_missions SET status = 'completed', progress = 100, completed_at = ?1, updated_at = ?1
         WHERE id = ?2 AND status = 'active'",
        params![now_z, record.id],
    )?;
    if claimed == 0 {
        return Err(EngineError::Conflict(format!(
            "Mission '{}' was completed concurrently",
            mission_id
        )));
    }

    let before = stats::require_stats(conn, user_id)?;
    stats::grant_xp(conn, user_id, mission.xp_reward, &now_z)?;
    let change = lifescore::apply_delta(
        conn,
        user_id,
        mission.lifescore_impact,
        LifeScoreReason::MissionComplete.as_str(),
        &now_z,
    )?;
    let coins = mission.resolved_coin_reward();
    rewards::credit(conn, user_id, coins, &format!("mission:{}", mission.id), &now_z)?;

    let prev = stats::require_stats(conn, user_id)?;
    let mut next = prev.clone();
    next.record_engagement_day(clock.today());
    let after = stats::store_stats(conn, &prev, &next, &now_z)?;

    conn.execute(
        "UPDATE user_missions SET xp_earned = ?1, coins_earned = ?2, lifescore_change = ?3 WHERE id = ?4",
        params![mission.xp_reward, coins, change.applied_delta, record.id],
    )?;
    stats::append_behavior_event(
        conn,
        user_id,
        "mission_completed",
        &serde_json::json!({
            "mission_id": mission.id,
            "instance_key": record.instance_key,
            "xp": mission.xp_reward,
            "coins": coins,
            "lifescore_change": change.applied_delta,
        }),
        Some(before.lifescore),
        Some(after.lifescore),
        clock.now_secs(),
    )?;

    let unlocked = achievements::evaluate(conn, user_id, &now_z)?;
    let final_stats = stats::require_stats(conn, user_id)?;

    Ok(RewardResult {
        record: get_by_id(conn, &record.id)?,
        xp_earned: mission.xp_reward,
        coins_earned: coins,
        lifescore_requested: mission.lifescore_impact,
        lifescore_change: change.applied_delta,
        streak: after.current_streak,
        unlocked_achievements: unlocked,
        stats: StatsView::from(&final_stats),
    })
}

/// Abandon the active instance. No reward; the current streak resets.
pub fn fail(
    conn: &Connection,
    user_id: &str,
    mission_id: &str,
    clock: &dyn Clock,
) -> Result<UserMission, EngineError> {
    let record = active_for_mission(conn, user_id, mission_id)?;
    let now_z = clock.now_z();
    let changed = conn.execute(
        "UPDATE user_missions SET status = 'failed', completed_at = ?1, updated_at = ?1
         WHERE id = ?2 AND status = 'active'",
        params![now_z, record.id],
    )?;
    if changed == 0 {
        return Err(EngineError::Conflict(format!(
            "Mission '{}' changed state concurrently",
            mission_id
        )));
    }

    let prev = stats::require_stats(conn, user_id)?;
    if prev.current_streak != 0 {
        let next = stats::UserStats {
            current_streak: 0,
            ..prev.clone()
        };
        stats::store_stats(conn, &prev, &next, &now_z)?;
    }
    stats::append_behavior_event(
        conn,
        user_id,
        "mission_failed",
        &serde_json::json!({ "mission_id": mission_id, "instance_key": record.instance_key }),
        Some(prev.lifescore),
        Some(prev.lifescore),
        clock.now_secs(),
    )?;

    get_by_id(conn, &record.id)
}

pub fn update_progress(
    conn: &Connection,
    user_id: &str,
    mission_id: &str,
    progress: i64,
    clock: &dyn Clock,
) -> Result<UserMission, EngineError> {
    if !(0..=100).contains(&progress) {
        return Err(EngineError::ValidationError(format!(
            "progress must be within 0..=100, got {}",
            progress
        )));
    }
    let record = active_for_mission(conn, user_id, mission_id)?;
    let changed = conn.execute(
        "UPDATE user_missions SET progress = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'active'",
        params![progress, clock.now_z(), record.id],
    )?;
    if changed == 0 {
        return Err(EngineError::Conflict(format!(
            "Mission '{}' changed state concurrently",
            mission_id
        )));
    }
    get_by_id(conn, &record.id)
}

/// Active catalog with the caller's status for each mission's current instance.
pub fn list_for_user(conn: &Connection, user_id: &str, clock: &dyn Clock) -> Result<Vec<MissionView>, EngineError> {
    let user = stats::require_stats(conn, user_id)?;
    let active = active_mission(conn, user_id)?;
    let today = clock.today();

    let mut out = Vec::new();
    for mission in catalog::list_missions(conn, false)? {
        let instance_key = mission.recurrence.instance_key(today);
        let (status, progress) = match &active {
            Some(a) if a.mission_id == mission.id => (MissionStatus::Active, a.progress),
            _ => match get_instance(conn, user_id, &mission.id, &instance_key)? {
                Some(rec) => (rec.status, rec.progress),
                None if mission.required_level > user.level => (MissionStatus::Locked, 0),
                None => (MissionStatus::Available, 0),
            },
        };
        out.push(MissionView {
            coin_reward: mission.resolved_coin_reward(),
            mission,
            status,
            progress,
            instance_key,
        });
    }
    Ok(out)
}

/// Every instance the user has ever started, newest first.
pub fn history(conn: &Connection, user_id: &str) -> Result<Vec<UserMission>, EngineError> {
    let sql = format!(
        "SELECT {} FROM user_missions WHERE user_id = ?1 ORDER BY rowid DESC",
        USER_MISSION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id], row_to_user_mission)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}
