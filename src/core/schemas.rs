//! Centralized database schema definitions for the engine.
//!
//! All state lives in a single SQLite database (`lifescore.db`):
//! 1. Catalogs: missions, achievements, rewards (seeded, effectively immutable).
//! 2. Per-user state: user_stats, user_missions, user_achievements, user_rewards.
//! 3. Append-only logs: lifescore_history, coin_transactions, behavior_events.
//!
//! Uniqueness constraints here are the last line of defence for the
//! award-once / single-active / one-instance rules; the plugins translate
//! violations into `Conflict`.

pub const ENGINE_DB_NAME: &str = "lifescore.db";
pub const AUDIT_LOG_NAME: &str = "broker.events.jsonl";
pub const CONFIG_FILE_NAME: &str = "lifescore.toml";
pub const ENGINE_SCHEMA_VERSION: u32 = 1;

pub const SCHEMA_META: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

// --- Per-user stats ---

pub const SCHEMA_USER_STATS: &str = "
    CREATE TABLE IF NOT EXISTS user_stats (
        user_id TEXT PRIMARY KEY,
        lifescore INTEGER NOT NULL CHECK (lifescore BETWEEN 0 AND 100),
        xp INTEGER NOT NULL DEFAULT 0 CHECK (xp >= 0),
        level INTEGER NOT NULL DEFAULT 1 CHECK (level >= 1),
        coins INTEGER NOT NULL DEFAULT 0 CHECK (coins >= 0),
        current_streak INTEGER NOT NULL DEFAULT 0 CHECK (current_streak >= 0),
        longest_streak INTEGER NOT NULL DEFAULT 0 CHECK (longest_streak >= 0),
        days_active INTEGER NOT NULL DEFAULT 0 CHECK (days_active >= 0),
        last_active_day INTEGER,
        version INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
";

// --- Missions ---

pub const SCHEMA_MISSIONS: &str = "
    CREATE TABLE IF NOT EXISTS missions (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        category TEXT NOT NULL,
        difficulty TEXT NOT NULL CHECK (difficulty IN ('easy', 'medium', 'hard', 'expert')),
        xp_reward INTEGER NOT NULL CHECK (xp_reward > 0),
        lifescore_impact INTEGER NOT NULL CHECK (lifescore_impact BETWEEN -50 AND 50),
        coin_reward INTEGER CHECK (coin_reward IS NULL OR coin_reward >= 0),
        recurrence TEXT NOT NULL CHECK (recurrence IN ('one_time', 'daily', 'weekly')),
        required_level INTEGER NOT NULL DEFAULT 1 CHECK (required_level >= 1),
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    )
";

pub const SCHEMA_USER_MISSIONS: &str = "
    CREATE TABLE IF NOT EXISTS user_missions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        mission_id TEXT NOT NULL,
        instance_key TEXT NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('available', 'active', 'completed', 'failed', 'locked')),
        progress INTEGER NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
        started_at TEXT NOT NULL,
        completed_at TEXT,
        xp_earned INTEGER NOT NULL DEFAULT 0,
        coins_earned INTEGER NOT NULL DEFAULT 0,
        lifescore_change INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL,
        UNIQUE(user_id, mission_id, instance_key),
        FOREIGN KEY(user_id) REFERENCES user_stats(user_id),
        FOREIGN KEY(mission_id) REFERENCES missions(id)
    )
";
pub const SCHEMA_USER_MISSIONS_SINGLE_ACTIVE: &str = "CREATE UNIQUE INDEX IF NOT EXISTS idx_user_missions_single_active
     ON user_missions(user_id) WHERE status = 'active'";
pub const SCHEMA_USER_MISSIONS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_user_missions_user_status ON user_missions(user_id, status)";

// --- Achievements ---

pub const SCHEMA_ACHIEVEMENTS: &str = "
    CREATE TABLE IF NOT EXISTS achievements (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        condition_type TEXT NOT NULL,
        condition_value INTEGER NOT NULL CHECK (condition_value >= 0),
        xp_reward INTEGER NOT NULL DEFAULT 0 CHECK (xp_reward >= 0),
        coin_reward INTEGER NOT NULL DEFAULT 0 CHECK (coin_reward >= 0),
        lifescore_reward INTEGER NOT NULL DEFAULT 0 CHECK (lifescore_reward BETWEEN -50 AND 50),
        sort_order INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )
";

pub const SCHEMA_USER_ACHIEVEMENTS: &str = "
    CREATE TABLE IF NOT EXISTS user_achievements (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        achievement_id TEXT NOT NULL,
        unlocked_at TEXT NOT NULL,
        UNIQUE(user_id, achievement_id),
        FOREIGN KEY(user_id) REFERENCES user_stats(user_id),
        FOREIGN KEY(achievement_id) REFERENCES achievements(id)
    )
";

// --- Rewards ---

pub const SCHEMA_REWARDS: &str = "
    CREATE TABLE IF NOT EXISTS rewards (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        category TEXT NOT NULL,
        coins_cost INTEGER NOT NULL CHECK (coins_cost >= 0),
        award_once INTEGER NOT NULL DEFAULT 0,
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    )
";

pub const SCHEMA_USER_REWARDS: &str = "
    CREATE TABLE IF NOT EXISTS user_rewards (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        reward_id TEXT NOT NULL,
        coins_spent INTEGER NOT NULL CHECK (coins_spent >= 0),
        redemption_token TEXT NOT NULL UNIQUE,
        award_once INTEGER NOT NULL DEFAULT 0,
        redeemed_at TEXT NOT NULL,
        FOREIGN KEY(user_id) REFERENCES user_stats(user_id),
        FOREIGN KEY(reward_id) REFERENCES rewards(id)
    )
";
pub const SCHEMA_USER_REWARDS_AWARD_ONCE: &str = "CREATE UNIQUE INDEX IF NOT EXISTS idx_user_rewards_award_once
     ON user_rewards(user_id, reward_id) WHERE award_once = 1";

// --- Append-only logs ---

pub const SCHEMA_COIN_TRANSACTIONS: &str = "
    CREATE TABLE IF NOT EXISTS coin_transactions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        amount INTEGER NOT NULL,
        reason TEXT NOT NULL,
        balance_after INTEGER NOT NULL CHECK (balance_after >= 0),
        ts TEXT NOT NULL,
        FOREIGN KEY(user_id) REFERENCES user_stats(user_id)
    )
";

pub const SCHEMA_LIFESCORE_HISTORY: &str = "
    CREATE TABLE IF NOT EXISTS lifescore_history (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        old_score INTEGER NOT NULL CHECK (old_score BETWEEN 0 AND 100),
        new_score INTEGER NOT NULL CHECK (new_score BETWEEN 0 AND 100),
        delta INTEGER NOT NULL,
        reason TEXT NOT NULL,
        ts TEXT NOT NULL,
        CHECK (old_score + delta = new_score),
        CHECK (ABS(new_score - old_score) <= 50),
        FOREIGN KEY(user_id) REFERENCES user_stats(user_id)
    )
";

pub const SCHEMA_BEHAVIOR_EVENTS: &str = "
    CREATE TABLE IF NOT EXISTS behavior_events (
        event_id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        payload TEXT NOT NULL,
        lifescore_before INTEGER,
        lifescore_after INTEGER,
        ts TEXT NOT NULL,
        ts_secs INTEGER NOT NULL
    )
";
pub const SCHEMA_BEHAVIOR_EVENTS_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_behavior_events_user_type
     ON behavior_events(user_id, event_type, ts_secs)";

/// Append-only triggers: history, ledger and event rows are immutable once written.
pub const SCHEMA_APPEND_ONLY_TRIGGERS: &str = "
    CREATE TRIGGER IF NOT EXISTS lifescore_history_no_update
    BEFORE UPDATE ON lifescore_history
    BEGIN SELECT RAISE(ABORT, 'lifescore_history is append-only'); END;
    CREATE TRIGGER IF NOT EXISTS lifescore_history_no_delete
    BEFORE DELETE ON lifescore_history
    BEGIN SELECT RAISE(ABORT, 'lifescore_history is append-only'); END;
    CREATE TRIGGER IF NOT EXISTS coin_transactions_no_update
    BEFORE UPDATE ON coin_transactions
    BEGIN SELECT RAISE(ABORT, 'coin_transactions is append-only'); END;
    CREATE TRIGGER IF NOT EXISTS coin_transactions_no_delete
    BEFORE DELETE ON coin_transactions
    BEGIN SELECT RAISE(ABORT, 'coin_transactions is append-only'); END;
    CREATE TRIGGER IF NOT EXISTS behavior_events_no_update
    BEFORE UPDATE ON behavior_events
    BEGIN SELECT RAISE(ABORT, 'behavior_events is append-only'); END;
    CREATE TRIGGER IF NOT EXISTS behavior_events_no_delete
    BEFORE DELETE ON behavior_events
    BEGIN SELECT RAISE(ABORT, 'behavior_events is append-only'); END;
    CREATE TRIGGER IF NOT EXISTS user_achievements_no_delete
    BEFORE DELETE ON user_achievements
    BEGIN SELECT RAISE(ABORT, 'user_achievements are never deleted'); END;
";

/// Ordered statement list applied by `db::initialize_engine_db`.
pub const ENGINE_SCHEMA: &[&str] = &[
    SCHEMA_META,
    SCHEMA_USER_STATS,
    SCHEMA_MISSIONS,
    SCHEMA_USER_MISSIONS,
    SCHEMA_USER_MISSIONS_SINGLE_ACTIVE,
    SCHEMA_USER_MISSIONS_INDEX,
    SCHEMA_ACHIEVEMENTS,
    SCHEMA_USER_ACHIEVEMENTS,
    SCHEMA_REWARDS,
    SCHEMA_USER_REWARDS,
    SCHEMA_USER_REWARDS_AWARD_ONCE,
    SCHEMA_COIN_TRANSACTIONS,
    SCHEMA_LIFESCORE_HISTORY,
    SCHEMA_BEHAVIOR_EVENTS,
    SCHEMA_BEHAVIOR_EVENTS_INDEX,
];
