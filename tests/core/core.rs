use lifescore::core::config::EngineConfig;
use lifescore::core::error::EngineError;
use lifescore::core::provider::{LocalDeterministicProvider, ProviderKind};
use lifescore::core::schemas;
use lifescore::core::store::Store;
use lifescore::core::time::{FixedClock, SECS_PER_DAY};
use lifescore::plugins::catalog::{Difficulty, Mission, Recurrence};
use lifescore::{GamificationEngine, Principal};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tempfile::tempdir;

const DAY0: u64 = 20_000 * SECS_PER_DAY + 3_600;

fn engine_at(root: &Path, clock: Arc<FixedClock>) -> GamificationEngine {
    GamificationEngine::open_with(
        &Store::new(root),
        EngineConfig::default(),
        Box::new(LocalDeterministicProvider),
        clock,
        None,
    )
    .unwrap()
}

fn big_swing() -> Mission {
    Mission {
        id: "big_swing".to_string(),
        title: "Big swing".to_string(),
        description: String::new(),
        category: "test".to_string(),
        difficulty: Difficulty::Hard,
        xp_reward: 10,
        lifescore_impact: 50,
        coin_reward: None,
        recurrence: Recurrence::Daily,
        required_level: 1,
        active: true,
    }
}

fn lifescore_cmd(root: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_lifescore"))
        .arg("--root")
        .arg(root)
        .args(args)
        .env_remove("LIFESCORE_ROOT")
        .env_remove("LIFESCORE_LLM_API_KEY")
        .output()
        .unwrap()
}

#[test]
fn test_open_initializes_store() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("store");
    let engine = GamificationEngine::open(&Store::new(&root)).unwrap();
    assert!(root.join(schemas::ENGINE_DB_NAME).exists());
    assert_eq!(engine.provider_kind(), ProviderKind::LocalDeterministic);
    assert_eq!(engine.list_rewards().unwrap().len(), 5);

    // Re-opening is idempotent and keeps user state.
    let alice = Principal::new("alice").unwrap();
    engine.register_user(&alice).unwrap();
    drop(engine);
    let engine = GamificationEngine::open(&Store::new(&root)).unwrap();
    assert_eq!(engine.get_stats(&alice).unwrap().lifescore, 50);
    assert_eq!(engine.list_rewards().unwrap().len(), 5);
}

#[test]
fn test_config_file_sets_starting_score() {
    let tmp = tempdir().unwrap();
    fs::write(
        tmp.path().join(schemas::CONFIG_FILE_NAME),
        "starting_lifescore = 70\n\n[rate_limit]\nmax_requests = 3\n",
    )
    .unwrap();
    let engine = GamificationEngine::open(&Store::new(tmp.path())).unwrap();
    assert_eq!(engine.config().starting_lifescore, 70);
    assert_eq!(engine.config().rate_limit.max_requests, 3);

    let stats = engine.register_user(&Principal::new("alice").unwrap()).unwrap();
    assert_eq!(stats.lifescore, 70);
    assert_eq!(stats.level, 1);
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join(schemas::CONFIG_FILE_NAME), "starting_lifescore = 150\n").unwrap();
    let err = GamificationEngine::open(&Store::new(tmp.path())).err().unwrap();
    assert!(matches!(err, EngineError::ValidationError(_)), "{err:?}");
}

#[test]
fn test_registration_rules() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path(), Arc::new(FixedClock::at(DAY0)));
    let alice = Principal::new("alice").unwrap();

    let stats = engine.register_user(&alice).unwrap();
    assert_eq!(stats.xp, 0);
    assert_eq!(stats.coins, 0);
    assert_eq!(stats.streak, 0);

    let err = engine.register_user(&alice).unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "{err:?}");

    let err = Principal::new("not a user!").unwrap_err();
    assert!(matches!(err, EngineError::ValidationError(_)), "{err:?}");
}

#[test]
fn test_lifescore_stays_within_bounds() {
    let tmp = tempdir().unwrap();
    let clock = Arc::new(FixedClock::at(DAY0));
    let engine = engine_at(tmp.path(), clock.clone());
    engine.add_mission(&big_swing()).unwrap();
    let alice = Principal::new("alice").unwrap();
    engine.register_user(&alice).unwrap();

    engine.start_mission(&alice, "big_swing").unwrap();
    let res = engine.complete_mission(&alice, "big_swing").unwrap();
    assert_eq!(res.lifescore_change, 50);
    assert_eq!(res.stats.lifescore, 100);

    clock.advance_days(1);
    engine.start_mission(&alice, "big_swing").unwrap();
    let res = engine.complete_mission(&alice, "big_swing").unwrap();
    assert_eq!(res.lifescore_change, 0);
    assert_eq!(res.stats.lifescore, 100);

    for entry in engine.lifescore_history(&alice, 50).unwrap() {
        assert!((0..=100).contains(&entry.new_score));
        assert_eq!(entry.new_score - entry.old_score, entry.delta);
    }
}

#[test]
fn test_completion_near_the_ceiling_clamps() {
    let tmp = tempdir().unwrap();
    let config = EngineConfig {
        starting_lifescore: 92,
        ..EngineConfig::default()
    };
    let engine = GamificationEngine::open_with(
        &Store::new(tmp.path()),
        config,
        Box::new(LocalDeterministicProvider),
        Arc::new(FixedClock::at(DAY0)),
        None,
    )
    .unwrap();
    let mut steady = big_swing();
    steady.id = "steady".to_string();
    steady.difficulty = Difficulty::Medium;
    steady.xp_reward = 50;
    steady.lifescore_impact = 10;
    engine.add_mission(&steady).unwrap();

    let alice = Principal::new("alice").unwrap();
    engine.register_user(&alice).unwrap();
    engine.start_mission(&alice, "steady").unwrap();
    let res = engine.complete_mission(&alice, "steady").unwrap();
    assert_eq!(res.xp_earned, 50);
    assert_eq!(res.coins_earned, 20);
    assert_eq!(res.lifescore_requested, 10);
    assert_eq!(res.lifescore_change, 8);
    assert_eq!(res.stats.lifescore, 100);
}

#[test]
fn test_catalog_admin_validates_and_deactivates() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path(), Arc::new(FixedClock::at(DAY0)));
    let alice = Principal::new("alice").unwrap();
    engine.register_user(&alice).unwrap();

    let mut bad = big_swing();
    bad.lifescore_impact = 80;
    let err = engine.add_mission(&bad).unwrap_err();
    assert!(matches!(err, EngineError::ValidationError(_)), "{err:?}");

    let err = engine.add_mission(&lifescore::plugins::catalog::default_missions()[0]).unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "{err:?}");

    engine.set_mission_active("hydration", false).unwrap();
    let err = engine.start_mission(&alice, "hydration").unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)), "{err:?}");
    assert!(
        engine
            .list_missions(&alice)
            .unwrap()
            .iter()
            .all(|v| v.mission.id != "hydration")
    );
}

#[test]
fn test_failed_operations_roll_back_and_are_audited() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path(), Arc::new(FixedClock::at(DAY0)));
    let alice = Principal::new("alice").unwrap().with_session("s-42");
    engine.register_user(&alice).unwrap();
    let before = engine.get_stats(&alice).unwrap();

    engine.redeem_reward(&alice, "premium_discount_5").unwrap_err();
    assert_eq!(engine.get_stats(&alice).unwrap(), before);

    let audit = engine.audit(Some("alice")).unwrap();
    let redeem = audit.iter().find(|e| e.op == "reward.redeem").unwrap();
    assert_eq!(redeem.status, "error");
    assert!(redeem.detail.as_deref().unwrap().starts_with("insufficient_balance"));
    assert!(redeem.intent_ref.as_deref().unwrap().contains("s-42"));

    let register = audit.iter().find(|e| e.op == "user.register").unwrap();
    assert_eq!(register.status, "success");
}

#[test]
fn test_unwritable_audit_log_keeps_committed_completion() {
    let tmp = tempdir().unwrap();
    let store = Store::new(tmp.path());
    let engine = engine_at(tmp.path(), Arc::new(FixedClock::at(DAY0)));
    let alice = Principal::new("alice").unwrap();
    engine.register_user(&alice).unwrap();
    engine.start_mission(&alice, "daily_walk").unwrap();

    let audit_path = store.audit_log_path();
    fs::remove_file(&audit_path).unwrap();
    fs::create_dir(&audit_path).unwrap();

    let res = engine.complete_mission(&alice, "daily_walk").unwrap();
    assert_eq!(res.stats.xp, 55);
    assert_eq!(res.stats.coins, 15);

    // Applied exactly once: the same instance cannot be completed again.
    let err = engine.complete_mission(&alice, "daily_walk").unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "{err:?}");
    let stats = engine.get_stats(&alice).unwrap();
    assert_eq!(stats.xp, 55);
    assert_eq!(stats.coins, 15);
}

#[test]
fn test_cli_json_envelope() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();

    let out = lifescore_cmd(root, &["user", "register", "--user", "alice", "--format", "json"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let env: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(env["cmd"], "user.register");
    assert_eq!(env["status"], "ok");
    assert_eq!(env["result"]["lifescore"], 50);

    let out = lifescore_cmd(
        root,
        &["scenario", "--user", "alice", "--walk-minutes", "30", "--diet", "good", "--seatbelt", "always", "--format", "json"],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let env: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(env["cmd"], "scenario.preview");
    assert_eq!(env["result"]["prediction"]["lifescore_delta"], 11);
    assert_eq!(env["result"]["prediction"]["risk_level"], "low");
}

#[test]
fn test_cli_reports_errors_with_kind() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    lifescore_cmd(root, &["user", "register", "--user", "alice"]);

    let out = lifescore_cmd(
        root,
        &["reward", "redeem", "--user", "alice", "--reward", "coin_boost_small", "--format", "json"],
    );
    assert!(!out.status.success());
    let env: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(env["status"], "error");
    assert_eq!(env["error"]["kind"], "insufficient_balance");

    let out = lifescore_cmd(root, &["mission", "list", "--user", "alice"]);
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("daily_walk"));
}
