use lifescore::core::config::EngineConfig;
use lifescore::core::error::EngineError;
use lifescore::core::provider::LocalDeterministicProvider;
use lifescore::core::store::Store;
use lifescore::core::time::{FixedClock, SECS_PER_DAY};
use lifescore::plugins::missions::MissionStatus;
use lifescore::{GamificationEngine, Principal};
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
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

fn registered(engine: &GamificationEngine, user: &str) -> Principal {
    let p = Principal::new(user).unwrap();
    engine.register_user(&p).unwrap();
    p
}

#[test]
fn test_complete_pays_rewards_and_first_achievement() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path(), Arc::new(FixedClock::at(DAY0)));
    let alice = registered(&engine, "alice");

    let started = engine.start_mission(&alice, "daily_walk").unwrap();
    assert!(!started.already_started);
    assert_eq!(started.record.status, MissionStatus::Active);

    let res = engine.complete_mission(&alice, "daily_walk").unwrap();
    assert_eq!(res.xp_earned, 30);
    assert_eq!(res.coins_earned, 10);
    assert_eq!(res.lifescore_change, 3);
    assert_eq!(res.streak, 1);
    assert_eq!(res.record.status, MissionStatus::Completed);
    assert_eq!(res.record.progress, 100);

    let ids: Vec<&str> = res
        .unlocked_achievements
        .iter()
        .map(|u| u.achievement_id.as_str())
        .collect();
    assert_eq!(ids, vec!["first_mission"]);

    // mission payout plus first_mission (25 xp, 5 coins, +1 score)
    assert_eq!(res.stats.xp, 55);
    assert_eq!(res.stats.coins, 15);
    assert_eq!(res.stats.lifescore, 54);
    assert_eq!(engine.get_stats(&alice).unwrap(), res.stats);
}

#[test]
fn test_start_retry_returns_active_record() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path(), Arc::new(FixedClock::at(DAY0)));
    let alice = registered(&engine, "alice");

    let first = engine.start_mission(&alice, "hydration").unwrap();
    let again = engine.start_mission(&alice, "hydration").unwrap();
    assert!(again.already_started);
    assert_eq!(first.record.id, again.record.id);
    assert_eq!(engine.mission_history(&alice).unwrap().len(), 1);
}

#[test]
fn test_only_one_mission_active_at_a_time() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path(), Arc::new(FixedClock::at(DAY0)));
    let alice = registered(&engine, "alice");

    engine.start_mission(&alice, "daily_walk").unwrap();
    let err = engine.start_mission(&alice, "hydration").unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "{err:?}");

    engine.complete_mission(&alice, "daily_walk").unwrap();
    engine.start_mission(&alice, "hydration").unwrap();
}

#[test]
fn test_finishing_requires_the_active_instance() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path(), Arc::new(FixedClock::at(DAY0)));
    let alice = registered(&engine, "alice");

    let err = engine.complete_mission(&alice, "daily_walk").unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "{err:?}");

    let err = engine.start_mission(&alice, "no_such_mission").unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)), "{err:?}");

    engine.start_mission(&alice, "daily_walk").unwrap();
    engine.complete_mission(&alice, "daily_walk").unwrap();
    let xp = engine.get_stats(&alice).unwrap().xp;

    let err = engine.complete_mission(&alice, "daily_walk").unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "{err:?}");
    assert_eq!(engine.get_stats(&alice).unwrap().xp, xp);
}

#[test]
fn test_unknown_user_is_not_found() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path(), Arc::new(FixedClock::at(DAY0)));
    let ghost = Principal::new("ghost").unwrap();

    assert!(matches!(engine.get_stats(&ghost), Err(EngineError::NotFound(_))));
    assert!(matches!(
        engine.start_mission(&ghost, "daily_walk"),
        Err(EngineError::NotFound(_))
    ));
}

#[test]
fn test_daily_recurrence_and_streak() {
    let tmp = tempdir().unwrap();
    let clock = Arc::new(FixedClock::at(DAY0));
    let engine = engine_at(tmp.path(), clock.clone());
    let alice = registered(&engine, "alice");

    engine.start_mission(&alice, "daily_walk").unwrap();
    engine.complete_mission(&alice, "daily_walk").unwrap();

    // Same period: the instance is already completed.
    let err = engine.start_mission(&alice, "daily_walk").unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "{err:?}");

    clock.advance_days(1);
    let next = engine.start_mission(&alice, "daily_walk").unwrap();
    assert!(!next.already_started);
    let res = engine.complete_mission(&alice, "daily_walk").unwrap();
    assert_eq!(res.streak, 2);
    assert_eq!(res.stats.days_active, 2);

    clock.advance_days(2);
    engine.start_mission(&alice, "daily_walk").unwrap();
    let res = engine.complete_mission(&alice, "daily_walk").unwrap();
    assert_eq!(res.streak, 1);
    assert_eq!(res.stats.longest_streak, 2);
    assert_eq!(res.stats.days_active, 3);
}

#[test]
fn test_fail_resets_streak_and_closes_instance() {
    let tmp = tempdir().unwrap();
    let clock = Arc::new(FixedClock::at(DAY0));
    let engine = engine_at(tmp.path(), clock.clone());
    let alice = registered(&engine, "alice");

    engine.start_mission(&alice, "daily_walk").unwrap();
    engine.complete_mission(&alice, "daily_walk").unwrap();
    assert_eq!(engine.get_stats(&alice).unwrap().streak, 1);

    clock.advance_days(1);
    engine.start_mission(&alice, "hydration").unwrap();
    let before = engine.get_stats(&alice).unwrap();
    let failed = engine.fail_mission(&alice, "hydration").unwrap();
    assert_eq!(failed.status, MissionStatus::Failed);

    let after = engine.get_stats(&alice).unwrap();
    assert_eq!(after.streak, 0);
    assert_eq!(after.xp, before.xp);
    assert_eq!(after.coins, before.coins);
    assert_eq!(after.lifescore, before.lifescore);

    let err = engine.start_mission(&alice, "hydration").unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "{err:?}");
    // Nothing is active any more, so another mission can start.
    engine.start_mission(&alice, "mindful_minutes").unwrap();
}

#[test]
fn test_level_locked_missions() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path(), Arc::new(FixedClock::at(DAY0)));
    let alice = registered(&engine, "alice");

    let err = engine.start_mission(&alice, "sleep_routine").unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "{err:?}");

    let views = engine.list_missions(&alice).unwrap();
    let status_of = |id: &str| views.iter().find(|v| v.mission.id == id).unwrap().status;
    assert_eq!(status_of("sleep_routine"), MissionStatus::Locked);
    assert_eq!(status_of("daily_walk"), MissionStatus::Available);
}

#[test]
fn test_progress_bounds() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path(), Arc::new(FixedClock::at(DAY0)));
    let alice = registered(&engine, "alice");
    engine.start_mission(&alice, "meal_planning").unwrap();

    let err = engine.update_progress(&alice, "meal_planning", 101).unwrap_err();
    assert!(matches!(err, EngineError::ValidationError(_)), "{err:?}");

    let rec = engine.update_progress(&alice, "meal_planning", 40).unwrap();
    assert_eq!(rec.progress, 40);

    let views = engine.list_missions(&alice).unwrap();
    let view = views.iter().find(|v| v.mission.id == "meal_planning").unwrap();
    assert_eq!(view.status, MissionStatus::Active);
    assert_eq!(view.progress, 40);
}

#[test]
fn test_concurrent_completion_pays_once() {
    let tmp = tempdir().unwrap();
    let engine = Arc::new(engine_at(tmp.path(), Arc::new(FixedClock::at(DAY0))));
    let alice = registered(&engine, "alice");
    engine.start_mission(&alice, "daily_walk").unwrap();

    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            let alice = alice.clone();
            thread::spawn(move || {
                barrier.wait();
                engine.complete_mission(&alice, "daily_walk")
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let ok = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 1);
    for r in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(r, EngineError::Conflict(_)), "{r:?}");
    }

    let stats = engine.get_stats(&alice).unwrap();
    assert_eq!(stats.xp, 55);
    assert_eq!(stats.coins, 15);
}
