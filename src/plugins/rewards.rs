//! Reward ledger: coin balance primitives and redemptions.
//!
//! `credit` and `debit` are the only functions that touch `user_stats.coins`.
//! Each writes one `coin_transactions` row with the resulting balance.

use crate::core::error::EngineError;
use crate::core::time;
use crate::plugins::catalog::{self, Reward, RewardCategory};
use crate::plugins::stats;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinMovement {
    pub amount: i64,
    pub balance_after: i64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub id: String,
    pub user_id: String,
    pub reward_id: String,
    pub category: RewardCategory,
    pub coins_spent: i64,
    pub redemption_token: String,
    pub redeemed_at: String,
}

fn validate_reason(reason: &str) -> Result<(), EngineError> {
    if reason.trim().is_empty() {
        return Err(EngineError::ValidationError("coin movement reason is required".into()));
    }
    Ok(())
}

fn record_movement(
    conn: &Connection,
    user_id: &str,
    amount: i64,
    reason: &str,
    balance_after: i64,
    now_z: &str,
) -> Result<(), EngineError> {
    conn.execute(
        "INSERT INTO coin_transactions(id, user_id, amount, reason, balance_after, ts)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
        params![time::new_event_id(), user_id, amount, reason, balance_after, now_z],
    )?;
    Ok(())
}

pub fn credit(
    conn: &Connection,
    user_id: &str,
    amount: i64,
    reason: &str,
    now_z: &str,
) -> Result<CoinMovement, EngineError> {
    if amount < 0 {
        return Err(EngineError::ValidationError(format!(
            "credit amount must be non-negative, got {}",
            amount
        )));
    }
    validate_reason(reason)?;
    let prev = stats::require_stats(conn, user_id)?;
    let next = stats::UserStats {
        coins: prev.coins + amount,
        ..prev.clone()
    };
    let stored = if amount > 0 {
        stats::store_stats(conn, &prev, &next, now_z)?
    } else {
        prev
    };
    record_movement(conn, user_id, amount, reason, stored.coins, now_z)?;
    Ok(CoinMovement {
        amount,
        balance_after: stored.coins,
        reason: reason.to_string(),
    })
}

pub fn debit(
    conn: &Connection,
    user_id: &str,
    amount: i64,
    reason: &str,
    now_z: &str,
) -> Result<CoinMovement, EngineError> {
    if amount < 0 {
        return Err(EngineError::ValidationError(format!(
            "debit amount must be non-negative, got {}",
            amount
        )));
    }
    validate_reason(reason)?;
    let prev = stats::require_stats(conn, user_id)?;
    if amount > prev.coins {
        return Err(EngineError::InsufficientBalance {
            required: amount,
            available: prev.coins,
        });
    }
    let next = stats::UserStats {
        coins: prev.coins - amount,
        ..prev.clone()
    };
    let stored = if amount > 0 {
        stats::store_stats(conn, &prev, &next, now_z)?
    } else {
        prev
    };
    record_movement(conn, user_id, -amount, reason, stored.coins, now_z)?;
    Ok(CoinMovement {
        amount: -amount,
        balance_after: stored.coins,
        reason: reason.to_string(),
    })
}

/// Opaque token handed to the user; unique per redemption.
pub fn generate_redemption_token(category: RewardCategory) -> String {
    let prefix = match category {
        RewardCategory::Badge => "BDG",
        RewardCategory::CoinBoost => "BST",
        RewardCategory::PartnerOffer => "OFR",
        RewardCategory::Discount => "DSC",
    };
    format!("{}-{}", prefix, ulid::Ulid::new())
}

/// Debit the cost and record the redemption, all within the caller's transaction.
pub fn redeem(
    conn: &Connection,
    user_id: &str,
    reward_id: &str,
    now_z: &str,
) -> Result<Redemption, EngineError> {
    stats::require_stats(conn, user_id)?;
    let reward: Reward = match catalog::get_reward(conn, reward_id)? {
        Some(r) if r.active => r,
        _ => return Err(EngineError::NotFound(format!("Reward '{}' not found", reward_id))),
    };

    let award_once = reward.is_award_once();
    if award_once && has_redeemed(conn, user_id, reward_id)? {
        return Err(EngineError::Conflict(format!(
            "Reward '{}' was already redeemed by '{}'",
            reward_id, user_id
        )));
    }

    debit(conn, user_id, reward.coins_cost, &format!("redeem:{}", reward.id), now_z)?;

    let redemption = Redemption {
        id: time::new_event_id(),
        user_id: user_id.to_string(),
        reward_id: reward.id.clone(),
        category: reward.category,
        coins_spent: reward.coins_cost,
        redemption_token: generate_redemption_token(reward.category),
        redeemed_at: now_z.to_string(),
    };
    let res = conn.execute(
        "INSERT INTO user_rewards(id, user_id, reward_id, coins_spent, redemption_token, award_once, redeemed_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            redemption.id,
            redemption.user_id,
            redemption.reward_id,
            redemption.coins_spent,
            redemption.redemption_token,
            award_once as i64,
            redemption.redeemed_at
        ],
    );
    match res.map_err(EngineError::from) {
        Ok(_) => Ok(redemption),
        Err(e) if e.is_constraint_violation() => Err(EngineError::Conflict(format!(
            "Reward '{}' was already redeemed by '{}'",
            reward_id, user_id
        ))),
        Err(e) => Err(e),
    }
}

pub fn has_redeemed(conn: &Connection, user_id: &str, reward_id: &str) -> Result<bool, EngineError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM user_rewards WHERE user_id = ?1 AND reward_id = ?2",
        params![user_id, reward_id],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

pub fn redemption_count(conn: &Connection, user_id: &str) -> Result<i64, EngineError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM user_rewards WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?)
}

/// Lifetime coins credited (redemptions do not reduce it).
pub fn coins_earned_total(conn: &Connection, user_id: &str) -> Result<i64, EngineError> {
    Ok(conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM coin_transactions WHERE user_id = ?1 AND amount > 0",
        params![user_id],
        |row| row.get(0),
    )?)
}

pub fn list_redemptions(conn: &Connection, user_id: &str) -> Result<Vec<Redemption>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT ur.id, ur.user_id, ur.reward_id, r.category, ur.coins_spent, ur.redemption_token, ur.redeemed_at
         FROM user_rewards ur JOIN rewards r ON r.id = ur.reward_id
         WHERE ur.user_id = ?1 ORDER BY ur.rowid ASC",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        let category: String = row.get(3)?;
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            category,
            row.get::<_, i64>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;
    let mut out = Vec::new();
    for r in rows {
        let (id, user_id, reward_id, category, coins_spent, redemption_token, redeemed_at) = r?;
        out.push(Redemption {
            id,
            user_id,
            reward_id,
            category: category.parse()?,
            coins_spent,
            redemption_token,
            redeemed_at,
        });
    }
    Ok(out)
}
