//! Achievement evaluator.
//!
//! Counters are aggregated once per evaluation; every catalog entry is then
//! checked in catalog order against the same snapshot. Rewards granted by an
//! unlock land in the ledgers but are not re-evaluated in the same pass.

use crate::core::error::EngineError;
use crate::core::time;
use crate::plugins::catalog::{self, Achievement, ConditionType};
use crate::plugins::lifescore::{self, LifeScoreReason};
use crate::plugins::rewards;
use crate::plugins::stats;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Event type recorded when a scenario is applied to live stats.
pub const SCENARIO_APPLIED_EVENT: &str = "scenario_applied";

/// Aggregated per-user counters the conditions are checked against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCounters {
    pub lifescore: i64,
    pub streak: i64,
    pub missions_completed: i64,
    pub xp: i64,
    pub coins_earned: i64,
    pub days_active: i64,
    pub scenarios_completed: i64,
    pub rewards_redeemed: i64,
}

type CounterFn = fn(&UserCounters) -> i64;

const CONDITION_TABLE: &[(ConditionType, CounterFn)] = &[
    (ConditionType::LifescoreMilestone, |c| c.lifescore),
    (ConditionType::StreakCount, |c| c.streak),
    (ConditionType::MissionsCompleted, |c| c.missions_completed),
    (ConditionType::XpMilestone, |c| c.xp),
    (ConditionType::CoinsEarned, |c| c.coins_earned),
    (ConditionType::DaysActive, |c| c.days_active),
    (ConditionType::ScenariosCompleted, |c| c.scenarios_completed),
    (ConditionType::RewardsRedeemed, |c| c.rewards_redeemed),
];

/// Current value of the counter a condition type reads.
pub fn counter_value(condition: ConditionType, counters: &UserCounters) -> i64 {
    CONDITION_TABLE
        .iter()
        .find(|(ct, _)| *ct == condition)
        .map(|(_, f)| f(counters))
        .unwrap_or(0)
}

pub fn is_met(achievement: &Achievement, counters: &UserCounters) -> bool {
    counter_value(achievement.condition_type, counters) >= achievement.condition_value
}

pub fn aggregate_counters(conn: &Connection, user_id: &str) -> Result<UserCounters, EngineError> {
    let s = stats::require_stats(conn, user_id)?;
    let missions_completed: i64 = conn.query_row(
        "SELECT COUNT(*) FROM user_missions WHERE user_id = ?1 AND status = 'completed'",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(UserCounters {
        lifescore: s.lifescore,
        streak: s.current_streak,
        missions_completed,
        xp: s.xp,
        coins_earned: rewards::coins_earned_total(conn, user_id)?,
        days_active: s.days_active,
        scenarios_completed: stats::count_events(conn, user_id, SCENARIO_APPLIED_EVENT)?,
        rewards_redeemed: rewards::redemption_count(conn, user_id)?,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockedAchievement {
    pub achievement_id: String,
    pub title: String,
    pub xp_reward: i64,
    pub coin_reward: i64,
    pub lifescore_change: i64,
    pub unlocked_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementStatus {
    pub achievement: Achievement,
    pub unlocked: bool,
    pub progress: i64,
}

pub fn held_achievement_ids(conn: &Connection, user_id: &str) -> Result<HashSet<String>, EngineError> {
    let mut stmt = conn.prepare("SELECT achievement_id FROM user_achievements WHERE user_id = ?1")?;
    let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
    let mut out = HashSet::new();
    for r in rows {
        out.insert(r?);
    }
    Ok(out)
}

/// Award every newly met achievement exactly once, within the caller's transaction.
pub fn evaluate(conn: &Connection, user_id: &str, now_z: &str) -> Result<Vec<UnlockedAchievement>, EngineError> {
    let counters = aggregate_counters(conn, user_id)?;
    let held = held_achievement_ids(conn, user_id)?;
    let mut unlocked = Vec::new();

    for achievement in catalog::list_achievements(conn)? {
        if held.contains(&achievement.id) || !is_met(&achievement, &counters) {
            continue;
        }
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO user_achievements(id, user_id, achievement_id, unlocked_at)
             VALUES(?1, ?2, ?3, ?4)",
            params![time::new_event_id(), user_id, achievement.id, now_z],
        )?;
        if inserted == 0 {
            continue;
        }
        unlocked.push(grant_rewards(conn, user_id, &achievement, now_z)?);
    }

    Ok(unlocked)
}

fn grant_rewards(
    conn: &Connection,
    user_id: &str,
    achievement: &Achievement,
    now_z: &str,
) -> Result<UnlockedAchievement, EngineError> {
    stats::grant_xp(conn, user_id, achievement.xp_reward, now_z)?;
    if achievement.coin_reward > 0 {
        rewards::credit(
            conn,
            user_id,
            achievement.coin_reward,
            &format!("achievement:{}", achievement.id),
            now_z,
        )?;
    }
    let lifescore_change = if achievement.lifescore_reward != 0 {
        lifescore::apply_delta(
            conn,
            user_id,
            achievement.lifescore_reward,
            LifeScoreReason::AchievementUnlock.as_str(),
            now_z,
        )?
        .applied_delta
    } else {
        0
    };

    Ok(UnlockedAchievement {
        achievement_id: achievement.id.clone(),
        title: achievement.title.clone(),
        xp_reward: achievement.xp_reward,
        coin_reward: achievement.coin_reward,
        lifescore_change,
        unlocked_at: now_z.to_string(),
    })
}

/// Catalog with the user's unlock state and current counter value.
pub fn statuses(conn: &Connection, user_id: &str) -> Result<Vec<AchievementStatus>, EngineError> {
    let counters = aggregate_counters(conn, user_id)?;
    let held = held_achievement_ids(conn, user_id)?;
    Ok(catalog::list_achievements(conn)?
        .into_iter()
        .map(|a| AchievementStatus {
            unlocked: held.contains(&a.id),
            progress: counter_value(a.condition_type, &counters),
            achievement: a,
        })
        .collect())
}
