//! Gamification orchestrator.
//!
//! Composes the ledgers, the mission lifecycle, the evaluator and the
//! predictor. Every call takes the caller's `Principal` first and runs as one
//! broker transaction, so a failed operation leaves no partial state.
//! Provider calls happen after the transaction commits and never fail an
//! operation: their errors are absorbed by the deterministic text.

use crate::core::broker::{BrokerEvent, DbBroker};
use crate::core::config::{self, EngineConfig};
use crate::core::error::EngineError;
use crate::core::provider::{self, ProviderKind, TextCompletionProvider};
use crate::core::store::Store;
use crate::core::time::{Clock, SystemClock};
use crate::plugins::achievements::{self, AchievementStatus, UnlockedAchievement};
use crate::plugins::catalog::{self, Mission, Reward};
use crate::plugins::lifescore::{self, LifeScoreHistoryEntry};
use crate::plugins::missions::{self, MissionStart, MissionView, RewardResult, UserMission};
use crate::plugins::ratelimit::{self, MISSIONS_RECOMMENDED_EVENT};
use crate::plugins::rewards::{self, Redemption};
use crate::plugins::scenario::{self, ScenarioApplication, ScenarioInputs, ScenarioPrediction};
use crate::plugins::stats::{self, Principal, StatsView};
use crate::subsystems;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const CATALOG_ACTOR: &str = "catalog";
const NARRATIVE_INSTRUCTION: &str =
    "Rewrite these projection notes as two encouraging sentences for the member.";
const PITCH_INSTRUCTION: &str = "Write one short sentence inviting the member to try this mission.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionResult {
    pub redemption: Redemption,
    pub balance_after: i64,
    pub unlocked_achievements: Vec<UnlockedAchievement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub prediction: ScenarioPrediction,
    pub fingerprint: String,
    pub applied: Option<ScenarioApplication>,
    pub coach_message: String,
    pub provider: ProviderKind,
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionRecommendation {
    pub mission: Mission,
    pub pitch: String,
    pub degraded: bool,
}

pub struct GamificationEngine {
    broker: DbBroker,
    provider: Box<dyn TextCompletionProvider>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl GamificationEngine {
    /// Assemble an engine from explicit collaborators. The store behind
    /// `broker` must already be initialized.
    pub fn new(
        broker: DbBroker,
        provider: Box<dyn TextCompletionProvider>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            broker,
            provider,
            clock,
            config,
        }
    }

    /// Initialize the store, load its config and wire the configured provider.
    pub fn open(store: &Store) -> Result<Self, EngineError> {
        let config = config::load_config(store)?;
        let (provider, warning) = provider::build_provider(&config.provider);
        Self::open_with(store, config, provider, Arc::new(SystemClock), warning)
    }

    pub fn open_with(
        store: &Store,
        config: EngineConfig,
        provider: Box<dyn TextCompletionProvider>,
        clock: Arc<dyn Clock>,
        provider_warning: Option<String>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        subsystems::initialize_all(&store.root)?;
        let broker = DbBroker::new(store);
        if let Some(warning) = provider_warning {
            broker.log_event_best_effort("engine", None, "provider.init", "degraded", Some(warning));
        }
        Ok(Self::new(broker, provider, clock, config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    fn user_tx<F, R>(&self, principal: &Principal, op: &str, f: F) -> Result<R, EngineError>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<R, EngineError>,
    {
        let intent = principal.intent_ref(op);
        self.broker
            .with_user_tx(&principal.user_id, Some(&intent), op, f)
    }

    /// Ask the provider for copy; on any error log `degraded` and use `fallback`.
    fn narrate(
        &self,
        principal: &Principal,
        op: &str,
        instruction: &str,
        context: &[String],
        fallback: String,
    ) -> (String, bool) {
        let prompt = provider::build_prompt(instruction, context);
        match self.provider.complete(
            &prompt,
            self.config.provider.max_tokens,
            self.config.provider.temperature,
        ) {
            Ok(text) => (text, false),
            Err(e) => {
                let intent = principal.intent_ref(op);
                self.broker.log_event_best_effort(
                    &principal.user_id,
                    Some(&intent),
                    op,
                    "degraded",
                    Some(format!("{}: {}", e.kind(), e)),
                );
                (fallback, true)
            }
        }
    }

    // --- Users ---

    pub fn register_user(&self, principal: &Principal) -> Result<StatsView, EngineError> {
        let now_z = self.clock.now_z();
        let starting = self.config.starting_lifescore;
        self.user_tx(principal, "user.register", |conn| {
            let s = stats::register_user(conn, &principal.user_id, starting, &now_z)?;
            Ok(StatsView::from(&s))
        })
    }

    pub fn get_stats(&self, principal: &Principal) -> Result<StatsView, EngineError> {
        self.broker.with_read(&principal.user_id, "stats.get", |conn| {
            Ok(StatsView::from(&stats::require_stats(conn, &principal.user_id)?))
        })
    }

    // --- Missions ---

    pub fn start_mission(&self, principal: &Principal, mission_id: &str) -> Result<MissionStart, EngineError> {
        let clock = self.clock.as_ref();
        self.user_tx(principal, "mission.start", |conn| {
            missions::start(conn, &principal.user_id, mission_id, clock)
        })
    }

    pub fn complete_mission(&self, principal: &Principal, mission_id: &str) -> Result<RewardResult, EngineError> {
        let clock = self.clock.as_ref();
        self.user_tx(principal, "mission.complete", |conn| {
            missions::complete(conn, &principal.user_id, mission_id, clock)
        })
    }

    pub fn fail_mission(&self, principal: &Principal, mission_id: &str) -> Result<UserMission, EngineError> {
        let clock = self.clock.as_ref();
        self.user_tx(principal, "mission.fail", |conn| {
            missions::fail(conn, &principal.user_id, mission_id, clock)
        })
    }

    pub fn update_progress(
        &self,
        principal: &Principal,
        mission_id: &str,
        progress: i64,
    ) -> Result<UserMission, EngineError> {
        let clock = self.clock.as_ref();
        self.user_tx(principal, "mission.progress", |conn| {
            missions::update_progress(conn, &principal.user_id, mission_id, progress, clock)
        })
    }

    pub fn list_missions(&self, principal: &Principal) -> Result<Vec<MissionView>, EngineError> {
        let clock = self.clock.as_ref();
        self.broker.with_read(&principal.user_id, "mission.list", |conn| {
            missions::list_for_user(conn, &principal.user_id, clock)
        })
    }

    pub fn mission_history(&self, principal: &Principal) -> Result<Vec<UserMission>, EngineError> {
        self.broker.with_read(&principal.user_id, "mission.history", |conn| {
            stats::require_stats(conn, &principal.user_id)?;
            missions::history(conn, &principal.user_id)
        })
    }

    // --- Rewards ---

    pub fn redeem_reward(&self, principal: &Principal, reward_id: &str) -> Result<RedemptionResult, EngineError> {
        let now_z = self.clock.now_z();
        self.user_tx(principal, "reward.redeem", |conn| {
            let redemption = rewards::redeem(conn, &principal.user_id, reward_id, &now_z)?;
            stats::append_behavior_event(
                conn,
                &principal.user_id,
                "reward_redeemed",
                &serde_json::json!({ "reward_id": redemption.reward_id, "coins_spent": redemption.coins_spent }),
                None,
                None,
                self.clock.now_secs(),
            )?;
            let unlocked = achievements::evaluate(conn, &principal.user_id, &now_z)?;
            let balance_after = stats::require_stats(conn, &principal.user_id)?.coins;
            Ok(RedemptionResult {
                redemption,
                balance_after,
                unlocked_achievements: unlocked,
            })
        })
    }

    pub fn list_rewards(&self) -> Result<Vec<Reward>, EngineError> {
        self.broker
            .with_read(CATALOG_ACTOR, "reward.list", catalog::list_rewards)
    }

    pub fn redemptions(&self, principal: &Principal) -> Result<Vec<Redemption>, EngineError> {
        self.broker.with_read(&principal.user_id, "reward.redemptions", |conn| {
            stats::require_stats(conn, &principal.user_id)?;
            rewards::list_redemptions(conn, &principal.user_id)
        })
    }

    // --- Achievements & history ---

    pub fn evaluate_achievements(&self, principal: &Principal) -> Result<Vec<UnlockedAchievement>, EngineError> {
        let now_z = self.clock.now_z();
        self.user_tx(principal, "achievement.evaluate", |conn| {
            achievements::evaluate(conn, &principal.user_id, &now_z)
        })
    }

    pub fn list_achievements(&self, principal: &Principal) -> Result<Vec<AchievementStatus>, EngineError> {
        self.broker.with_read(&principal.user_id, "achievement.list", |conn| {
            achievements::statuses(conn, &principal.user_id)
        })
    }

    pub fn lifescore_history(
        &self,
        principal: &Principal,
        limit: usize,
    ) -> Result<Vec<LifeScoreHistoryEntry>, EngineError> {
        self.broker.with_read(&principal.user_id, "lifescore.history", |conn| {
            stats::require_stats(conn, &principal.user_id)?;
            lifescore::history(conn, &principal.user_id, limit)
        })
    }

    // --- Scenarios ---

    /// Predict, record the run and (when `apply`) feed it into the ledgers.
    pub fn simulate_scenario(
        &self,
        principal: &Principal,
        inputs: &ScenarioInputs,
        apply: bool,
    ) -> Result<ScenarioOutcome, EngineError> {
        let normalized = inputs.normalize()?;
        let prediction = scenario::predict(&normalized);
        let fingerprint = prediction.fingerprint()?;
        let clock = self.clock.as_ref();
        let limits = &self.config.rate_limit;

        let op = if apply { "scenario.apply" } else { "scenario.preview" };
        let applied = self.user_tx(principal, op, |conn| {
            stats::require_stats(conn, &principal.user_id)?;
            ratelimit::check(conn, &principal.user_id, limits, clock.now_secs())?;
            if apply {
                scenario::apply(conn, &principal.user_id, &prediction, clock).map(Some)
            } else {
                scenario::record_preview(conn, &principal.user_id, &prediction, clock).map(|_| None)
            }
        })?;

        let (coach_message, degraded) = self.narrate(
            principal,
            "scenario.narrate",
            NARRATIVE_INSTRUCTION,
            &prediction.narrative_lines,
            prediction.narrative.clone(),
        );

        Ok(ScenarioOutcome {
            prediction,
            fingerprint,
            applied,
            coach_message,
            provider: self.provider.kind(),
            degraded,
        })
    }

    /// Catalog missions matching the predictor's suggestions, each with a pitch.
    pub fn recommend_missions(
        &self,
        principal: &Principal,
        inputs: &ScenarioInputs,
    ) -> Result<Vec<MissionRecommendation>, EngineError> {
        let normalized = inputs.normalize()?;
        let suggested = scenario::suggested_missions(&normalized);
        let clock = self.clock.as_ref();
        let limits = &self.config.rate_limit;

        let picked = self.user_tx(principal, "mission.recommend", |conn| {
            let s = stats::require_stats(conn, &principal.user_id)?;
            ratelimit::check(conn, &principal.user_id, limits, clock.now_secs())?;
            let mut picked = Vec::new();
            for id in &suggested {
                if let Some(m) = catalog::get_mission(conn, id)?.filter(|m| m.active) {
                    picked.push(m);
                }
            }
            stats::append_behavior_event(
                conn,
                &principal.user_id,
                MISSIONS_RECOMMENDED_EVENT,
                &serde_json::json!({ "missions": picked.iter().map(|m| m.id.as_str()).collect::<Vec<_>>() }),
                Some(s.lifescore),
                Some(s.lifescore),
                clock.now_secs(),
            )?;
            Ok(picked)
        })?;

        let mut out = Vec::with_capacity(picked.len());
        for mission in picked {
            let context = vec![
                mission.title.clone(),
                mission.description.clone(),
                format!(
                    "Earn {} XP and {} coins",
                    mission.xp_reward,
                    mission.resolved_coin_reward()
                ),
            ];
            let fallback = format!("{}. {}", mission.title, mission.description);
            let (pitch, degraded) =
                self.narrate(principal, "mission.pitch", PITCH_INSTRUCTION, &context, fallback);
            out.push(MissionRecommendation {
                mission,
                pitch,
                degraded,
            });
        }
        Ok(out)
    }

    // --- Catalog administration ---

    pub fn add_mission(&self, mission: &Mission) -> Result<Mission, EngineError> {
        let now_z = self.clock.now_z();
        self.broker.with_catalog_tx(CATALOG_ACTOR, "catalog.add_mission", |conn| {
            if !catalog::insert_mission(conn, mission, &now_z)? {
                return Err(EngineError::Conflict(format!("Mission '{}' already exists", mission.id)));
            }
            catalog::get_mission(conn, &mission.id)?
                .ok_or_else(|| EngineError::NotFound(format!("Mission '{}' not found", mission.id)))
        })
    }

    pub fn add_reward(&self, reward: &Reward) -> Result<Reward, EngineError> {
        let now_z = self.clock.now_z();
        self.broker.with_catalog_tx(CATALOG_ACTOR, "catalog.add_reward", |conn| {
            if !catalog::insert_reward(conn, reward, &now_z)? {
                return Err(EngineError::Conflict(format!("Reward '{}' already exists", reward.id)));
            }
            catalog::get_reward(conn, &reward.id)?
                .ok_or_else(|| EngineError::NotFound(format!("Reward '{}' not found", reward.id)))
        })
    }

    pub fn set_mission_active(&self, mission_id: &str, active: bool) -> Result<(), EngineError> {
        self.broker.with_catalog_tx(CATALOG_ACTOR, "catalog.set_mission_active", |conn| {
            catalog::set_mission_active(conn, mission_id, active)
        })
    }

    // --- Audit ---

    pub fn audit(&self, user_id: Option<&str>) -> Result<Vec<BrokerEvent>, EngineError> {
        self.broker.read_audit(user_id)
    }
}
