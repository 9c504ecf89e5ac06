use lifescore::core::config::{EngineConfig, RateLimitConfig};
use lifescore::core::error::EngineError;
use lifescore::core::provider::{LocalDeterministicProvider, ProviderKind, TextCompletionProvider};
use lifescore::core::store::Store;
use lifescore::core::time::{FixedClock, SECS_PER_DAY};
use lifescore::plugins::scenario::{RiskLevel, ScenarioInputs};
use lifescore::{GamificationEngine, Principal};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::tempdir;

const DAY0: u64 = 20_000 * SECS_PER_DAY + 3_600;

/// Provider that is always down.
struct OfflineProvider;

impl TextCompletionProvider for OfflineProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ExternalLlm
    }

    fn complete(&self, _prompt: &str, _max_tokens: u16, _temperature: f32) -> Result<String, EngineError> {
        Err(EngineError::ExternalProvider("connection refused".to_string()))
    }
}

/// Provider that fails after making the audit log unwritable.
struct AuditBreakingProvider {
    audit_path: PathBuf,
}

impl TextCompletionProvider for AuditBreakingProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ExternalLlm
    }

    fn complete(&self, _prompt: &str, _max_tokens: u16, _temperature: f32) -> Result<String, EngineError> {
        let _ = fs::remove_file(&self.audit_path);
        let _ = fs::create_dir_all(&self.audit_path);
        Err(EngineError::ExternalProvider("timed out".to_string()))
    }
}

fn engine_with(
    root: &Path,
    config: EngineConfig,
    provider: Box<dyn TextCompletionProvider>,
    clock: Arc<FixedClock>,
) -> GamificationEngine {
    GamificationEngine::open_with(&Store::new(root), config, provider, clock, None).unwrap()
}

fn local_engine(root: &Path) -> GamificationEngine {
    engine_with(
        root,
        EngineConfig::default(),
        Box::new(LocalDeterministicProvider),
        Arc::new(FixedClock::at(DAY0)),
    )
}

fn registered(engine: &GamificationEngine, user: &str) -> Principal {
    let p = Principal::new(user).unwrap();
    engine.register_user(&p).unwrap();
    p
}

fn inputs(walk: i64, diet: &str, commute: f64, driving: f64, belt: &str) -> ScenarioInputs {
    ScenarioInputs {
        walk_minutes: Some(walk),
        diet_quality: Some(diet.to_string()),
        commute_distance: Some(commute),
        driving_hours: Some(driving),
        seatbelt_usage: Some(belt.to_string()),
    }
}

#[test]
fn test_preview_leaves_stats_untouched() {
    let tmp = tempdir().unwrap();
    let engine = local_engine(tmp.path());
    let alice = registered(&engine, "alice");
    let before = engine.get_stats(&alice).unwrap();

    let out = engine
        .simulate_scenario(&alice, &inputs(30, "good", 10.0, 0.0, "always"), false)
        .unwrap();
    assert_eq!(out.prediction.lifescore_delta, 11);
    assert_eq!(out.prediction.xp_reward, 53);
    assert_eq!(out.prediction.risk_level, RiskLevel::Low);
    assert!(out.applied.is_none());
    assert!(!out.degraded);
    assert_eq!(out.provider, ProviderKind::LocalDeterministic);
    assert_eq!(out.coach_message, out.prediction.narrative);

    assert_eq!(engine.get_stats(&alice).unwrap(), before);
    assert!(engine.lifescore_history(&alice, 10).unwrap().is_empty());
}

#[test]
fn test_apply_moves_score_and_xp() {
    let tmp = tempdir().unwrap();
    let engine = local_engine(tmp.path());
    let alice = registered(&engine, "alice");

    let out = engine
        .simulate_scenario(&alice, &inputs(30, "good", 10.0, 0.0, "always"), true)
        .unwrap();
    let applied = out.applied.unwrap();
    assert_eq!(applied.lifescore.old_score, 50);
    assert_eq!(applied.lifescore.new_score, 61);
    assert_eq!(applied.xp_granted, 53);
    assert_eq!(applied.stats.xp, 53);
    assert_eq!(applied.stats.lifescore, 61);
    // Scenario runs are not engagement days.
    assert_eq!(applied.stats.streak, 0);

    let history = engine.lifescore_history(&alice, 1).unwrap();
    assert_eq!(history[0].reason, "streak_bonus");
    assert_eq!(history[0].delta, 11);
}

#[test]
fn test_same_inputs_same_prediction() {
    let tmp = tempdir().unwrap();
    let engine = local_engine(tmp.path());
    let alice = registered(&engine, "alice");
    let bob = registered(&engine, "bob");
    let risky = inputs(5, "poor", 45.0, 3.0, "rarely");

    let a = engine.simulate_scenario(&alice, &risky, false).unwrap();
    let b = engine.simulate_scenario(&bob, &risky, false).unwrap();
    assert_eq!(a.prediction, b.prediction);
    assert_eq!(a.fingerprint, b.fingerprint);
    assert_eq!(a.coach_message, b.coach_message);
    assert_eq!(a.prediction.risk_level, RiskLevel::High);

    let other = engine
        .simulate_scenario(&alice, &inputs(40, "excellent", 5.0, 0.5, "always"), false)
        .unwrap();
    assert_ne!(a.fingerprint, other.fingerprint);
}

#[test]
fn test_invalid_inputs_are_rejected_before_any_write() {
    let tmp = tempdir().unwrap();
    let engine = local_engine(tmp.path());
    let alice = registered(&engine, "alice");

    let err = engine
        .simulate_scenario(&alice, &inputs(30, "good", 10.0, 0.0, "sometimes"), true)
        .unwrap_err();
    assert!(matches!(err, EngineError::ValidationError(_)), "{err:?}");

    let err = engine
        .simulate_scenario(&alice, &inputs(-5, "good", 10.0, 0.0, "always"), true)
        .unwrap_err();
    assert!(matches!(err, EngineError::ValidationError(_)), "{err:?}");

    let stats = engine.get_stats(&alice).unwrap();
    assert_eq!(stats.lifescore, 50);
    assert_eq!(stats.xp, 0);
}

#[test]
fn test_missing_fields_use_neutral_defaults() {
    let tmp = tempdir().unwrap();
    let engine = local_engine(tmp.path());
    let alice = registered(&engine, "alice");

    let out = engine
        .simulate_scenario(&alice, &ScenarioInputs::default(), false)
        .unwrap();
    assert!(out.prediction.lifescore_delta >= 1);
    assert!(
        out.prediction
            .suggested_missions
            .contains(&"daily_walk".to_string())
    );
}

#[test]
fn test_unregistered_user_cannot_simulate() {
    let tmp = tempdir().unwrap();
    let engine = local_engine(tmp.path());
    let ghost = Principal::new("ghost").unwrap();
    let err = engine
        .simulate_scenario(&ghost, &inputs(30, "good", 10.0, 0.0, "always"), false)
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)), "{err:?}");
}

#[test]
fn test_rate_limit_window() {
    let tmp = tempdir().unwrap();
    let clock = Arc::new(FixedClock::at(DAY0));
    let config = EngineConfig {
        rate_limit: RateLimitConfig {
            window_secs: 60,
            max_requests: 2,
        },
        ..EngineConfig::default()
    };
    let engine = engine_with(tmp.path(), config, Box::new(LocalDeterministicProvider), clock.clone());
    let alice = registered(&engine, "alice");
    let bob = registered(&engine, "bob");
    let req = inputs(30, "good", 10.0, 0.0, "always");

    engine.simulate_scenario(&alice, &req, false).unwrap();
    clock.advance(10);
    engine.recommend_missions(&alice, &req).unwrap();
    clock.advance(10);

    match engine.simulate_scenario(&alice, &req, true).unwrap_err() {
        EngineError::RateLimitExceeded { retry_after_secs } => assert_eq!(retry_after_secs, 40),
        other => panic!("unexpected {other:?}"),
    }
    // The rejected apply left no trace.
    assert_eq!(engine.get_stats(&alice).unwrap().xp, 0);
    // Limits are per user.
    engine.simulate_scenario(&bob, &req, false).unwrap();

    clock.advance(41);
    engine.simulate_scenario(&alice, &req, true).unwrap();
}

#[test]
fn test_provider_outage_degrades_to_local_text() {
    let tmp = tempdir().unwrap();
    let engine = engine_with(
        tmp.path(),
        EngineConfig::default(),
        Box::new(OfflineProvider),
        Arc::new(FixedClock::at(DAY0)),
    );
    let alice = registered(&engine, "alice");

    let out = engine
        .simulate_scenario(&alice, &inputs(30, "good", 10.0, 0.0, "always"), true)
        .unwrap();
    assert!(out.degraded);
    assert_eq!(out.provider, ProviderKind::ExternalLlm);
    assert_eq!(out.coach_message, out.prediction.narrative);
    assert_eq!(out.applied.unwrap().stats.lifescore, 61);

    let recs = engine
        .recommend_missions(&alice, &inputs(0, "fair", 10.0, 0.0, "always"))
        .unwrap();
    assert!(recs.iter().all(|r| r.degraded && !r.pitch.is_empty()));

    let audit = engine.audit(Some("alice")).unwrap();
    let degraded: Vec<_> = audit.iter().filter(|e| e.status == "degraded").collect();
    assert!(degraded.iter().any(|e| e.op == "scenario.narrate"));
    assert!(degraded.iter().any(|e| e.op == "mission.pitch"));
    assert!(
        degraded
            .iter()
            .all(|e| e.detail.as_deref().unwrap_or("").contains("connection refused"))
    );
}

#[test]
fn test_recommendations_follow_suggestions() {
    let tmp = tempdir().unwrap();
    let engine = local_engine(tmp.path());
    let alice = registered(&engine, "alice");

    let recs = engine
        .recommend_missions(&alice, &inputs(0, "fair", 40.0, 3.0, "often"))
        .unwrap();
    let ids: Vec<&str> = recs.iter().map(|r| r.mission.id.as_str()).collect();
    assert_eq!(ids, vec!["daily_walk", "meal_planning", "seatbelt_habit", "safe_commute"]);
    assert!(recs.iter().all(|r| !r.degraded));
    assert!(recs[0].pitch.contains("Take a 30-minute walk"));

    engine.set_mission_active("safe_commute", false).unwrap();
    let recs = engine
        .recommend_missions(&alice, &inputs(0, "fair", 40.0, 3.0, "often"))
        .unwrap();
    assert!(recs.iter().all(|r| r.mission.id != "safe_commute"));
}

#[test]
fn test_degraded_audit_failure_keeps_applied_result() {
    let tmp = tempdir().unwrap();
    let store = Store::new(tmp.path());
    let engine = engine_with(
        tmp.path(),
        EngineConfig::default(),
        Box::new(AuditBreakingProvider {
            audit_path: store.audit_log_path(),
        }),
        Arc::new(FixedClock::at(DAY0)),
    );
    let alice = registered(&engine, "alice");

    let out = engine
        .simulate_scenario(&alice, &inputs(30, "good", 10.0, 0.0, "always"), true)
        .unwrap();
    assert!(out.degraded);
    assert_eq!(out.coach_message, out.prediction.narrative);
    assert_eq!(out.applied.unwrap().stats.lifescore, 61);

    let stats = engine.get_stats(&alice).unwrap();
    assert_eq!(stats.lifescore, 61);
    assert_eq!(stats.xp, 53);
}
