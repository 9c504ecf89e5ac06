use lifescore::core::config::EngineConfig;
use lifescore::core::db;
use lifescore::core::provider::LocalDeterministicProvider;
use lifescore::core::store::Store;
use lifescore::core::time::{FixedClock, SECS_PER_DAY};
use lifescore::plugins::catalog::{self, Achievement, ConditionType};
use lifescore::plugins::scenario::ScenarioInputs;
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

fn healthy_inputs() -> ScenarioInputs {
    ScenarioInputs {
        walk_minutes: Some(30),
        diet_quality: Some("good".to_string()),
        commute_distance: Some(10.0),
        driving_hours: Some(0.0),
        seatbelt_usage: Some("always".to_string()),
    }
}

#[test]
fn test_catalog_listing_starts_locked() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path(), Arc::new(FixedClock::at(DAY0)));
    let alice = registered(&engine, "alice");

    let all = engine.list_achievements(&alice).unwrap();
    assert_eq!(all.len(), 11);
    assert!(all.iter().all(|s| !s.unlocked));
    let lifescore_80 = all.iter().find(|s| s.achievement.id == "lifescore_80").unwrap();
    assert_eq!(lifescore_80.progress, 50);
    assert!(engine.evaluate_achievements(&alice).unwrap().is_empty());
}

#[test]
fn test_streak_achievement_after_three_days() {
    let tmp = tempdir().unwrap();
    let clock = Arc::new(FixedClock::at(DAY0));
    let engine = engine_at(tmp.path(), clock.clone());
    let alice = registered(&engine, "alice");

    let mut unlocked_per_day = Vec::new();
    for day in 0..3 {
        if day > 0 {
            clock.advance_days(1);
        }
        engine.start_mission(&alice, "daily_walk").unwrap();
        let res = engine.complete_mission(&alice, "daily_walk").unwrap();
        unlocked_per_day.push(
            res.unlocked_achievements
                .into_iter()
                .map(|u| u.achievement_id)
                .collect::<Vec<_>>(),
        );
    }
    assert_eq!(unlocked_per_day[0], vec!["first_mission".to_string()]);
    assert!(unlocked_per_day[1].is_empty());
    assert_eq!(unlocked_per_day[2], vec!["streak_3".to_string()]);
}

#[test]
fn test_each_achievement_is_awarded_once() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path(), Arc::new(FixedClock::at(DAY0)));
    let alice = registered(&engine, "alice");

    engine.start_mission(&alice, "daily_walk").unwrap();
    engine.complete_mission(&alice, "daily_walk").unwrap();
    let stats = engine.get_stats(&alice).unwrap();

    assert!(engine.evaluate_achievements(&alice).unwrap().is_empty());
    assert!(engine.evaluate_achievements(&alice).unwrap().is_empty());
    assert_eq!(engine.get_stats(&alice).unwrap(), stats);

    let unlocked: Vec<_> = engine
        .list_achievements(&alice)
        .unwrap()
        .into_iter()
        .filter(|s| s.unlocked)
        .map(|s| s.achievement.id)
        .collect();
    assert_eq!(unlocked, vec!["first_mission".to_string()]);
}

#[test]
fn test_applied_scenarios_count_toward_explorer() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path(), Arc::new(FixedClock::at(DAY0)));
    let alice = registered(&engine, "alice");
    let inputs = healthy_inputs();

    for _ in 0..2 {
        let out = engine.simulate_scenario(&alice, &inputs, true).unwrap();
        assert!(out.applied.unwrap().unlocked_achievements.is_empty());
    }
    // Previews never count.
    engine.simulate_scenario(&alice, &inputs, false).unwrap();
    let explorer = engine
        .list_achievements(&alice)
        .unwrap()
        .into_iter()
        .find(|s| s.achievement.id == "scenario_explorer")
        .unwrap();
    assert!(!explorer.unlocked);
    assert_eq!(explorer.progress, 2);

    let third = engine.simulate_scenario(&alice, &inputs, true).unwrap();
    let ids: Vec<String> = third
        .applied
        .unwrap()
        .unlocked_achievements
        .into_iter()
        .map(|u| u.achievement_id)
        .collect();
    // 50 + 3 * 11 = 83 also crosses the lifescore milestone.
    assert_eq!(ids, vec!["lifescore_80".to_string(), "scenario_explorer".to_string()]);
}

#[test]
fn test_unlock_rewards_show_in_history() {
    let tmp = tempdir().unwrap();
    let engine = engine_at(tmp.path(), Arc::new(FixedClock::at(DAY0)));
    let alice = registered(&engine, "alice");

    engine.start_mission(&alice, "daily_walk").unwrap();
    engine.complete_mission(&alice, "daily_walk").unwrap();

    let history = engine.lifescore_history(&alice, 10).unwrap();
    let reasons: Vec<&str> = history.iter().map(|h| h.reason.as_str()).collect();
    assert_eq!(reasons, vec!["achievement_unlock", "mission_complete"]);
    assert_eq!(history[0].old_score, 53);
    assert_eq!(history[0].new_score, 54);
}

#[test]
fn test_concurrent_evaluation_awards_once() {
    let tmp = tempdir().unwrap();
    let engine = Arc::new(engine_at(tmp.path(), Arc::new(FixedClock::at(DAY0))));
    let alice = registered(&engine, "alice");
    engine.start_mission(&alice, "daily_walk").unwrap();
    engine.complete_mission(&alice, "daily_walk").unwrap();

    // Added after the completion, so it is met but not yet held.
    let conn = db::initialize_engine_db(tmp.path()).unwrap();
    let late = Achievement {
        id: "late_starter".to_string(),
        title: "Late Starter".to_string(),
        description: String::new(),
        condition_type: ConditionType::MissionsCompleted,
        condition_value: 1,
        xp_reward: 10,
        coin_reward: 3,
        lifescore_reward: 0,
        sort_order: 200,
    };
    assert!(catalog::insert_achievement(&conn, &late, "0Z").unwrap());
    drop(conn);

    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            let alice = alice.clone();
            thread::spawn(move || {
                barrier.wait();
                engine.evaluate_achievements(&alice)
            })
        })
        .collect();

    let unlocked: Vec<String> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap().unwrap())
        .map(|u| u.achievement_id)
        .collect();
    assert_eq!(unlocked, vec!["late_starter".to_string()]);

    let stats = engine.get_stats(&alice).unwrap();
    assert_eq!(stats.xp, 65);
    assert_eq!(stats.coins, 18);
    let held = engine
        .list_achievements(&alice)
        .unwrap()
        .into_iter()
        .filter(|s| s.unlocked)
        .count();
    assert_eq!(held, 2);
}
