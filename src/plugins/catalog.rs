//! Catalog entries: missions, achievements and rewards.
//!
//! Catalog rows are immutable once written. Defaults are seeded with
//! `INSERT OR IGNORE` so re-initialization never clobbers edits.

use crate::core::error::EngineError;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! string_enum {
    ($name:ident, $what:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = EngineError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($name::$variant),)+
                    other => Err(EngineError::ValidationError(format!(
                        "Unknown {} '{}'", $what, other
                    ))),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

string_enum!(Difficulty, "difficulty", {
    Easy => "easy",
    Medium => "medium",
    Hard => "hard",
    Expert => "expert",
});

impl Difficulty {
    /// Coin payout when a mission carries no explicit coin reward.
    pub fn default_coin_reward(&self) -> i64 {
        match self {
            Self::Easy => 10,
            Self::Medium => 20,
            Self::Hard | Self::Expert => 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    OneTime,
    Daily,
    Weekly,
}

string_enum!(Recurrence, "recurrence", {
    OneTime => "one_time",
    Daily => "daily",
    Weekly => "weekly",
});

impl Recurrence {
    /// Key of the recurrence instance that contains `day`.
    pub fn instance_key(&self, day: i64) -> String {
        match self {
            Self::OneTime => "once".to_string(),
            Self::Daily => format!("d{}", day),
            Self::Weekly => format!("w{}", day.div_euclid(7)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub difficulty: Difficulty,
    pub xp_reward: i64,
    pub lifescore_impact: i64,
    pub coin_reward: Option<i64>,
    pub recurrence: Recurrence,
    pub required_level: i64,
    pub active: bool,
}

impl Mission {
    /// Explicit coin reward if set, otherwise the difficulty table.
    pub fn resolved_coin_reward(&self) -> i64 {
        self.coin_reward
            .unwrap_or_else(|| self.difficulty.default_coin_reward())
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        validate_catalog_id(&self.id)?;
        if self.title.trim().is_empty() {
            return Err(EngineError::ValidationError("mission title is required".into()));
        }
        if self.xp_reward <= 0 {
            return Err(EngineError::ValidationError(format!(
                "mission xp_reward must be > 0, got {}",
                self.xp_reward
            )));
        }
        if !(-50..=50).contains(&self.lifescore_impact) {
            return Err(EngineError::ValidationError(format!(
                "mission lifescore_impact must be within -50..=50, got {}",
                self.lifescore_impact
            )));
        }
        if self.coin_reward.is_some_and(|c| c < 0) {
            return Err(EngineError::ValidationError("mission coin_reward must be >= 0".into()));
        }
        if self.required_level < 1 {
            return Err(EngineError::ValidationError("mission required_level must be >= 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    LifescoreMilestone,
    StreakCount,
    MissionsCompleted,
    XpMilestone,
    CoinsEarned,
    DaysActive,
    ScenariosCompleted,
    RewardsRedeemed,
}

string_enum!(ConditionType, "condition type", {
    LifescoreMilestone => "lifescore_milestone",
    StreakCount => "streak_count",
    MissionsCompleted => "missions_completed",
    XpMilestone => "xp_milestone",
    CoinsEarned => "coins_earned",
    DaysActive => "days_active",
    ScenariosCompleted => "scenarios_completed",
    RewardsRedeemed => "rewards_redeemed",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub title: String,
    pub description: String,
    pub condition_type: ConditionType,
    pub condition_value: i64,
    pub xp_reward: i64,
    pub coin_reward: i64,
    pub lifescore_reward: i64,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardCategory {
    Badge,
    CoinBoost,
    PartnerOffer,
    Discount,
}

string_enum!(RewardCategory, "reward category", {
    Badge => "badge",
    CoinBoost => "coin_boost",
    PartnerOffer => "partner_offer",
    Discount => "discount",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: RewardCategory,
    pub coins_cost: i64,
    pub award_once: bool,
    pub active: bool,
}

impl Reward {
    /// Badges are always award-once; other categories opt in.
    pub fn is_award_once(&self) -> bool {
        self.award_once || self.category == RewardCategory::Badge
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        validate_catalog_id(&self.id)?;
        if self.title.trim().is_empty() {
            return Err(EngineError::ValidationError("reward title is required".into()));
        }
        if self.coins_cost < 0 {
            return Err(EngineError::ValidationError(format!(
                "reward coins_cost must be >= 0, got {}",
                self.coins_cost
            )));
        }
        Ok(())
    }
}

pub fn validate_catalog_id(id: &str) -> Result<(), EngineError> {
    let ok = !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(EngineError::ValidationError(format!(
            "Invalid catalog id '{}': expected 1-64 chars of [a-z0-9_]",
            id
        )))
    }
}

pub(crate) fn parse_col<T: FromStr<Err = EngineError>>(idx: usize, raw: String) -> rusqlite::Result<T> {
    raw.parse().map_err(|e: EngineError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

// --- Missions ---

const MISSION_COLUMNS: &str = "id, title, description, category, difficulty, xp_reward, lifescore_impact, coin_reward, recurrence, required_level, active";

fn row_to_mission(row: &rusqlite::Row<'_>) -> rusqlite::Result<Mission> {
    Ok(Mission {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        difficulty: parse_col(4, row.get(4)?)?,
        xp_reward: row.get(5)?,
        lifescore_impact: row.get(6)?,
        coin_reward: row.get(7)?,
        recurrence: parse_col(8, row.get(8)?)?,
        required_level: row.get(9)?,
        active: row.get::<_, i64>(10)? != 0,
    })
}

pub fn insert_mission(conn: &Connection, mission: &Mission, now_z: &str) -> Result<bool, EngineError> {
    mission.validate()?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO missions(id, title, description, category, difficulty, xp_reward, lifescore_impact, coin_reward, recurrence, required_level, active, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            mission.id,
            mission.title,
            mission.description,
            mission.category,
            mission.difficulty.as_str(),
            mission.xp_reward,
            mission.lifescore_impact,
            mission.coin_reward,
            mission.recurrence.as_str(),
            mission.required_level,
            mission.active as i64,
            now_z
        ],
    )?;
    Ok(inserted > 0)
}

pub fn get_mission(conn: &Connection, id: &str) -> Result<Option<Mission>, EngineError> {
    let sql = format!("SELECT {} FROM missions WHERE id = ?1", MISSION_COLUMNS);
    Ok(conn.query_row(&sql, params![id], row_to_mission).optional()?)
}

/// Active mission or `NotFound` (inactive missions are invisible to users).
pub fn require_active_mission(conn: &Connection, id: &str) -> Result<Mission, EngineError> {
    match get_mission(conn, id)? {
        Some(m) if m.active => Ok(m),
        Some(_) => Err(EngineError::NotFound(format!("Mission '{}' is not active", id))),
        None => Err(EngineError::NotFound(format!("Mission '{}' not found", id))),
    }
}

pub fn list_missions(conn: &Connection, include_inactive: bool) -> Result<Vec<Mission>, EngineError> {
    let sql = format!(
        "SELECT {} FROM missions {} ORDER BY required_level ASC, id ASC",
        MISSION_COLUMNS,
        if include_inactive { "" } else { "WHERE active = 1" }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], row_to_mission)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn set_mission_active(conn: &Connection, id: &str, active: bool) -> Result<(), EngineError> {
    let changed = conn.execute(
        "UPDATE missions SET active = ?1 WHERE id = ?2",
        params![active as i64, id],
    )?;
    if changed == 0 {
        return Err(EngineError::NotFound(format!("Mission '{}' not found", id)));
    }
    Ok(())
}

// --- Achievements ---

const ACHIEVEMENT_COLUMNS: &str = "id, title, description, condition_type, condition_value, xp_reward, coin_reward, lifescore_reward, sort_order";

fn row_to_achievement(row: &rusqlite::Row<'_>) -> rusqlite::Result<Achievement> {
    Ok(Achievement {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        condition_type: parse_col(3, row.get(3)?)?,
        condition_value: row.get(4)?,
        xp_reward: row.get(5)?,
        coin_reward: row.get(6)?,
        lifescore_reward: row.get(7)?,
        sort_order: row.get(8)?,
    })
}

pub fn insert_achievement(conn: &Connection, a: &Achievement, now_z: &str) -> Result<bool, EngineError> {
    validate_catalog_id(&a.id)?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO achievements(id, title, description, condition_type, condition_value, xp_reward, coin_reward, lifescore_reward, sort_order, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            a.id,
            a.title,
            a.description,
            a.condition_type.as_str(),
            a.condition_value,
            a.xp_reward,
            a.coin_reward,
            a.lifescore_reward,
            a.sort_order,
            now_z
        ],
    )?;
    Ok(inserted > 0)
}

/// Catalog in evaluation order.
pub fn list_achievements(conn: &Connection) -> Result<Vec<Achievement>, EngineError> {
    let sql = format!(
        "SELECT {} FROM achievements ORDER BY sort_order ASC, id ASC",
        ACHIEVEMENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], row_to_achievement)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

// --- Rewards ---

const REWARD_COLUMNS: &str = "id, title, description, category, coins_cost, award_once, active";

fn row_to_reward(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reward> {
    Ok(Reward {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: parse_col(3, row.get(3)?)?,
        coins_cost: row.get(4)?,
        award_once: row.get::<_, i64>(5)? != 0,
        active: row.get::<_, i64>(6)? != 0,
    })
}

pub fn insert_reward(conn: &Connection, reward: &Reward, now_z: &str) -> Result<bool, EngineError> {
    reward.validate()?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO rewards(id, title, description, category, coins_cost, award_once, active, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            reward.id,
            reward.title,
            reward.description,
            reward.category.as_str(),
            reward.coins_cost,
            reward.is_award_once() as i64,
            reward.active as i64,
            now_z
        ],
    )?;
    Ok(inserted > 0)
}

pub fn get_reward(conn: &Connection, id: &str) -> Result<Option<Reward>, EngineError> {
    let sql = format!("SELECT {} FROM rewards WHERE id = ?1", REWARD_COLUMNS);
    Ok(conn.query_row(&sql, params![id], row_to_reward).optional()?)
}

pub fn list_rewards(conn: &Connection) -> Result<Vec<Reward>, EngineError> {
    let sql = format!(
        "SELECT {} FROM rewards WHERE active = 1 ORDER BY coins_cost ASC, id ASC",
        REWARD_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], row_to_reward)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

// --- Default catalog ---

#[allow(clippy::too_many_arguments)]
fn mission(
    id: &str,
    title: &str,
    description: &str,
    category: &str,
    difficulty: Difficulty,
    xp_reward: i64,
    lifescore_impact: i64,
    recurrence: Recurrence,
    required_level: i64,
) -> Mission {
    Mission {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        category: category.to_string(),
        difficulty,
        xp_reward,
        lifescore_impact,
        coin_reward: None,
        recurrence,
        required_level,
        active: true,
    }
}

pub fn default_missions() -> Vec<Mission> {
    use Difficulty::*;
    use Recurrence::*;
    vec![
        mission("daily_walk", "Take a 30-minute walk", "Walk briskly for at least 30 minutes today.", "fitness", Easy, 30, 3, Daily, 1),
        mission("meal_planning", "Plan a week of meals", "Plan balanced meals for the next seven days.", "nutrition", Medium, 50, 5, Weekly, 1),
        mission("seatbelt_habit", "Buckle up every trip", "Wear your seatbelt on every trip for a week.", "safety", Medium, 50, 6, Weekly, 1),
        mission("annual_checkup", "Book an annual checkup", "Schedule and attend a preventive health checkup.", "health", Hard, 120, 10, OneTime, 1),
        mission("hydration", "Drink eight glasses of water", "Stay hydrated throughout the day.", "nutrition", Easy, 20, 2, Daily, 1),
        mission("sleep_routine", "Keep a sleep routine", "Go to bed at the same time for a week.", "wellbeing", Medium, 60, 5, Weekly, 2),
        mission("safe_commute", "Plan a safer commute", "Cut driving time by car-pooling or public transport.", "safety", Hard, 90, 8, Weekly, 2),
        mission("mindful_minutes", "Ten mindful minutes", "Spend ten minutes on breathing or meditation.", "wellbeing", Easy, 25, 2, Daily, 1),
        mission("marathon_prep", "Finish a 10k training block", "Complete a structured four-week running plan.", "fitness", Expert, 300, 15, OneTime, 4),
    ]
}

fn achievement(
    sort_order: i64,
    id: &str,
    title: &str,
    condition_type: ConditionType,
    condition_value: i64,
    rewards: (i64, i64, i64),
) -> Achievement {
    Achievement {
        id: id.to_string(),
        title: title.to_string(),
        description: format!("Reach {} {}", condition_value, condition_type.as_str().replace('_', " ")),
        condition_type,
        condition_value,
        xp_reward: rewards.0,
        coin_reward: rewards.1,
        lifescore_reward: rewards.2,
        sort_order,
    }
}

pub fn default_achievements() -> Vec<Achievement> {
    use ConditionType::*;
    vec![
        achievement(10, "first_mission", "First Steps", MissionsCompleted, 1, (25, 5, 1)),
        achievement(20, "mission_regular", "Mission Regular", MissionsCompleted, 10, (100, 25, 2)),
        achievement(30, "streak_3", "On a Roll", StreakCount, 3, (30, 10, 1)),
        achievement(40, "streak_7", "Week Warrior", StreakCount, 7, (75, 25, 2)),
        achievement(50, "xp_500", "Experienced", XpMilestone, 500, (0, 20, 0)),
        achievement(60, "lifescore_80", "Thriving", LifescoreMilestone, 80, (50, 15, 0)),
        achievement(70, "lifescore_95", "Peak Form", LifescoreMilestone, 95, (100, 30, 0)),
        achievement(80, "coins_100", "Saver", CoinsEarned, 100, (40, 0, 0)),
        achievement(90, "active_5_days", "Showing Up", DaysActive, 5, (40, 10, 1)),
        achievement(100, "scenario_explorer", "What-If Explorer", ScenariosCompleted, 3, (30, 10, 0)),
        achievement(110, "first_redemption", "Treat Yourself", RewardsRedeemed, 1, (20, 0, 0)),
    ]
}

fn reward(id: &str, title: &str, category: RewardCategory, coins_cost: i64, award_once: bool) -> Reward {
    Reward {
        id: id.to_string(),
        title: title.to_string(),
        description: String::new(),
        category,
        coins_cost,
        award_once,
        active: true,
    }
}

pub fn default_rewards() -> Vec<Reward> {
    use RewardCategory::*;
    vec![
        reward("safe_driver_badge", "Safe Driver Badge", Badge, 50, true),
        reward("wellness_badge", "Wellness Champion Badge", Badge, 100, true),
        reward("coin_boost_small", "Coin Boost", CoinBoost, 30, false),
        reward("gym_partner_offer", "Partner Gym Day Pass", PartnerOffer, 150, false),
        reward("premium_discount_5", "5% Premium Discount Voucher", Discount, 500, false),
    ]
}

/// Seed the default catalog. Safe to run on every start.
pub fn seed_default_catalog(conn: &Connection, now_z: &str) -> Result<usize, EngineError> {
    let mut inserted = 0;
    for m in default_missions() {
        inserted += insert_mission(conn, &m, now_z)? as usize;
    }
    for a in default_achievements() {
        inserted += insert_achievement(conn, &a, now_z)? as usize;
    }
    for r in default_rewards() {
        inserted += insert_reward(conn, &r, now_z)? as usize;
    }
    Ok(inserted)
}
