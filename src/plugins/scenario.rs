//! Scenario predictor.
//!
//! `predict` is pure arithmetic over `NormalizedInputs`: no clock, no
//! randomness, no provider. Raw request fields are normalized first so that
//! scoring never sees an optional or out-of-range value.

use crate::core::error::EngineError;
use crate::core::time::Clock;
use crate::plugins::achievements::{self, SCENARIO_APPLIED_EVENT, UnlockedAchievement};
use crate::plugins::lifescore::{self, LifeScoreChange, LifeScoreReason};
use crate::plugins::stats::{self, StatsView};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub const SCENARIO_PREVIEWED_EVENT: &str = "scenario_previewed";

const DELTA_MIN: i64 = 1;
const DELTA_MAX: i64 = 20;
const XP_MIN: i64 = 10;
const XP_MAX: i64 = 100;

/// Raw what-if request as received from the boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioInputs {
    #[serde(default)]
    pub walk_minutes: Option<i64>,
    #[serde(default)]
    pub diet_quality: Option<String>,
    #[serde(default)]
    pub commute_distance: Option<f64>,
    #[serde(default)]
    pub driving_hours: Option<f64>,
    #[serde(default)]
    pub seatbelt_usage: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DietQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl DietQuality {
    /// Unrecognized or missing labels score like `fair`.
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("excellent") => Self::Excellent,
            Some("good") => Self::Good,
            Some("poor") => Self::Poor,
            _ => Self::Fair,
        }
    }

    fn score(&self) -> i64 {
        match self {
            Self::Excellent => 8,
            Self::Good => 5,
            Self::Fair => 2,
            Self::Poor => -4,
        }
    }

    fn is_healthy(&self) -> bool {
        matches!(self, Self::Excellent | Self::Good)
    }
}

impl fmt::Display for DietQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatbeltUsage {
    Always,
    Often,
    Rarely,
}

impl SeatbeltUsage {
    /// Missing means `often`; anything else unrecognized is rejected.
    pub fn normalize(raw: Option<&str>) -> Result<Self, EngineError> {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("often") => Ok(Self::Often),
            Some("always") => Ok(Self::Always),
            Some("rarely") => Ok(Self::Rarely),
            Some(other) => Err(EngineError::ValidationError(format!(
                "Unknown seatbelt_usage '{}'. Expected one of: always, often, rarely",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedInputs {
    pub walk_minutes: i64,
    pub diet_quality: DietQuality,
    pub commute_distance: f64,
    pub driving_hours: f64,
    pub seatbelt_usage: SeatbeltUsage,
}

fn non_negative(name: &str, value: Option<f64>) -> Result<f64, EngineError> {
    let v = value.unwrap_or(0.0);
    if !v.is_finite() || v < 0.0 {
        return Err(EngineError::ValidationError(format!(
            "{} must be a non-negative number, got {}",
            name, v
        )));
    }
    Ok(v)
}

impl ScenarioInputs {
    pub fn normalize(&self) -> Result<NormalizedInputs, EngineError> {
        let walk_minutes = self.walk_minutes.unwrap_or(0);
        if walk_minutes < 0 {
            return Err(EngineError::ValidationError(format!(
                "walk_minutes must be non-negative, got {}",
                walk_minutes
            )));
        }
        Ok(NormalizedInputs {
            walk_minutes,
            diet_quality: DietQuality::normalize(self.diet_quality.as_deref()),
            commute_distance: non_negative("commute_distance", self.commute_distance)?,
            driving_hours: non_negative("driving_hours", self.driving_hours)?,
            seatbelt_usage: SeatbeltUsage::normalize(self.seatbelt_usage.as_deref())?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    fn from_score(score: i64) -> Self {
        match score {
            s if s <= 0 => Self::Low,
            1 => Self::Medium,
            _ => Self::High,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioPrediction {
    pub lifescore_delta: i64,
    pub xp_reward: i64,
    pub risk_level: RiskLevel,
    pub risk_score: i64,
    pub narrative: String,
    pub narrative_lines: Vec<String>,
    pub suggested_missions: Vec<String>,
}

impl ScenarioPrediction {
    /// SHA-256 over the canonical JSON form.
    pub fn fingerprint(&self) -> Result<String, EngineError> {
        let canonical = serde_json::to_vec(self)?;
        let digest = Sha256::digest(&canonical);
        Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }
}

fn movement_points(inputs: &NormalizedInputs) -> i64 {
    (inputs.walk_minutes / 10).min(10)
}

fn heavy_commute(inputs: &NormalizedInputs) -> bool {
    inputs.commute_distance > 30.0 || inputs.driving_hours > 2.0
}

fn seatbelt_points(inputs: &NormalizedInputs) -> i64 {
    match inputs.seatbelt_usage {
        SeatbeltUsage::Always => 3,
        SeatbeltUsage::Often => 0,
        SeatbeltUsage::Rarely => -4,
    }
}

pub fn lifescore_delta(inputs: &NormalizedInputs) -> i64 {
    let mut delta = movement_points(inputs) + inputs.diet_quality.score() + seatbelt_points(inputs);
    if heavy_commute(inputs) {
        delta -= 3;
    }
    delta.clamp(DELTA_MIN, DELTA_MAX)
}

pub fn xp_reward(inputs: &NormalizedInputs, delta: i64) -> i64 {
    let penalty = if inputs.seatbelt_usage == SeatbeltUsage::Rarely { 5 } else { 0 };
    (20 + 3 * delta - penalty).clamp(XP_MIN, XP_MAX)
}

pub fn risk_score(inputs: &NormalizedInputs) -> i64 {
    let mut risk = 0;
    if inputs.commute_distance > 25.0 {
        risk += 1;
    }
    if inputs.driving_hours > 2.0 {
        risk += 1;
    }
    if inputs.seatbelt_usage != SeatbeltUsage::Always {
        risk += 1;
    }
    if inputs.walk_minutes >= 30 && inputs.diet_quality.is_healthy() {
        risk -= 1;
    }
    risk
}

pub fn suggested_missions(inputs: &NormalizedInputs) -> Vec<String> {
    let mut out = Vec::new();
    if inputs.walk_minutes < 30 {
        out.push("daily_walk");
    }
    if inputs.diet_quality != DietQuality::Excellent {
        out.push("meal_planning");
    }
    if inputs.seatbelt_usage != SeatbeltUsage::Always {
        out.push("seatbelt_habit");
    }
    if heavy_commute(inputs) {
        out.push("safe_commute");
    }
    if out.is_empty() {
        out.push("annual_checkup");
    }
    out.into_iter().map(String::from).collect()
}

fn narrative_lines(inputs: &NormalizedInputs, delta: i64, xp: i64, risk: RiskLevel) -> Vec<String> {
    let mut lines = Vec::new();
    let movement = movement_points(inputs);
    if movement > 0 {
        lines.push(format!(
            "Walking {} minutes a day adds {} points",
            inputs.walk_minutes, movement
        ));
    } else {
        lines.push("Adding a daily walk is the quickest way to raise your score".to_string());
    }
    let diet = inputs.diet_quality.score();
    if diet >= 0 {
        lines.push(format!("A {} diet adds {} points", inputs.diet_quality, diet));
    } else {
        lines.push(format!("A {} diet costs {} points", inputs.diet_quality, -diet));
    }
    if heavy_commute(inputs) {
        lines.push("A long commute or more than 2 hours of driving costs 3 points".to_string());
    }
    match inputs.seatbelt_usage {
        SeatbeltUsage::Always => lines.push("Always buckling up adds 3 points".to_string()),
        SeatbeltUsage::Often => lines.push("Buckling up on every trip would add 3 points".to_string()),
        SeatbeltUsage::Rarely => lines.push("Rarely wearing a seatbelt costs 4 points".to_string()),
    }
    lines.push(format!(
        "Projected LifeScore change is +{} with {} XP and {} risk",
        delta, xp, risk
    ));
    lines
}

/// Deterministic projection; identical inputs give byte-identical output.
pub fn predict(inputs: &NormalizedInputs) -> ScenarioPrediction {
    let delta = lifescore_delta(inputs);
    let xp = xp_reward(inputs, delta);
    let risk_score = risk_score(inputs);
    let risk_level = RiskLevel::from_score(risk_score);
    let lines = narrative_lines(inputs, delta, xp, risk_level);
    let narrative = lines
        .iter()
        .map(|l| format!("{}.", l))
        .collect::<Vec<_>>()
        .join(" ");

    ScenarioPrediction {
        lifescore_delta: delta,
        xp_reward: xp,
        risk_level,
        risk_score,
        narrative,
        narrative_lines: lines,
        suggested_missions: suggested_missions(inputs),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioApplication {
    pub lifescore: LifeScoreChange,
    pub xp_granted: i64,
    pub unlocked_achievements: Vec<UnlockedAchievement>,
    pub stats: StatsView,
}

/// Record a preview run. Stats are untouched.
pub fn record_preview(
    conn: &Connection,
    user_id: &str,
    prediction: &ScenarioPrediction,
    clock: &dyn Clock,
) -> Result<(), EngineError> {
    let s = stats::require_stats(conn, user_id)?;
    stats::append_behavior_event(
        conn,
        user_id,
        SCENARIO_PREVIEWED_EVENT,
        &serde_json::json!({
            "lifescore_delta": prediction.lifescore_delta,
            "xp_reward": prediction.xp_reward,
            "risk_level": prediction.risk_level,
        }),
        Some(s.lifescore),
        Some(s.lifescore),
        clock.now_secs(),
    )?;
    Ok(())
}

/// Feed a prediction into the ledgers the way a mission completion would.
pub fn apply(
    conn: &Connection,
    user_id: &str,
    prediction: &ScenarioPrediction,
    clock: &dyn Clock,
) -> Result<ScenarioApplication, EngineError> {
    let now_z = clock.now_z();
    let reason = if prediction.lifescore_delta >= 0 {
        LifeScoreReason::StreakBonus
    } else {
        LifeScoreReason::ScenarioPenalty
    };
    let change = lifescore::apply_delta(conn, user_id, prediction.lifescore_delta, reason.as_str(), &now_z)?;
    stats::grant_xp(conn, user_id, prediction.xp_reward, &now_z)?;
    stats::append_behavior_event(
        conn,
        user_id,
        SCENARIO_APPLIED_EVENT,
        &serde_json::json!({
            "lifescore_delta": change.applied_delta,
            "xp_reward": prediction.xp_reward,
            "risk_level": prediction.risk_level,
        }),
        Some(change.old_score),
        Some(change.new_score),
        clock.now_secs(),
    )?;

    let unlocked = achievements::evaluate(conn, user_id, &now_z)?;
    let after = stats::require_stats(conn, user_id)?;
    Ok(ScenarioApplication {
        lifescore: change,
        xp_granted: prediction.xp_reward,
        unlocked_achievements: unlocked,
        stats: StatsView::from(&after),
    })
}
