//! LifeScore: a gamification engine for insurance engagement.
//!
//! Users earn a bounded **LifeScore** (0-100), experience points, levels,
//! coins and streaks by completing missions, unlock achievements, redeem
//! coins for rewards, and preview deterministic what-if scenarios that can
//! optionally be applied to their live stats.
//!
//! # Architecture
//!
//! ## The Thin Waist
//!
//! All state access routes through `DbBroker` for:
//! - Per-user serialization (in-process lock + `BEGIN IMMEDIATE`)
//! - All-or-nothing operations (one transaction per call)
//! - Audit logging (`broker.events.jsonl`)
//!
//! ## Components (Plugins)
//!
//! - `lifescore`: bounded score ledger with append-only history
//! - `progression`: xp to level
//! - `missions`: per-user mission state machine
//! - `rewards`: coin balance primitives and redemptions
//! - `achievements`: single-pass condition evaluator
//! - `scenario`: pure what-if predictor
//! - `engine`: the orchestrator every caller goes through
//!
//! # Examples
//!
//! ```bash
//! lifescore user register --user alice
//! lifescore mission start --user alice --mission daily_walk
//! lifescore mission complete --user alice --mission daily_walk
//! lifescore scenario --user alice --walk-minutes 30 --diet good --seatbelt always
//! lifescore reward redeem --user alice --reward safe_driver_badge --format json
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: storage, broker, config, clock and text providers
//! - [`plugins`]: engine components and the orchestrator

pub mod core;
pub mod plugins;

mod cli;
mod subsystems;

pub use core::error::EngineError;
pub use plugins::engine::GamificationEngine;
pub use plugins::stats::Principal;

use cli::{
    AchievementCommand, Cli, Command, DataCommand, LifescoreCommand, MissionCommand, OutputFormat,
    RewardCommand, UserCommand,
};
use core::{error, output, store::Store, time};
use plugins::scenario::ScenarioInputs;

use clap::Parser;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// A rendered command result: machine payload plus text lines.
struct Reply {
    cmd: &'static str,
    payload: JsonValue,
    text: Vec<String>,
}

impl Reply {
    fn new<T: Serialize>(cmd: &'static str, value: &T, text: Vec<String>) -> Result<Self, error::EngineError> {
        Ok(Self {
            cmd,
            payload: serde_json::to_value(value)?,
            text,
        })
    }
}

fn principal(user: &str, session: Option<&str>) -> Result<Principal, error::EngineError> {
    let p = Principal::new(user)?;
    Ok(match session {
        Some(s) => p.with_session(s),
        None => p,
    })
}

fn unlocked_lines(unlocked: &[plugins::achievements::UnlockedAchievement]) -> Vec<String> {
    unlocked
        .iter()
        .map(|u| {
            format!(
                "  {} {} ({} XP, {} coins, LifeScore {})",
                "★ Unlocked".bright_yellow().bold(),
                u.title.bright_white(),
                output::signed(u.xp_reward),
                output::signed(u.coin_reward),
                output::signed(u.lifescore_change)
            )
        })
        .collect()
}

fn stats_lines(s: &plugins::stats::StatsView) -> Vec<String> {
    vec![
        format!(
            "{}  LifeScore {} {}",
            s.user_id.bright_white().bold(),
            s.lifescore.to_string().bright_green().bold(),
            output::score_bar(s.lifescore)
        ),
        format!(
            "  Level {} ({} XP to next)  XP {}  Coins {}",
            s.level, s.xp_to_next_level, s.xp, s.coins
        ),
        format!(
            "  Streak {} (best {})  Days active {}",
            s.streak,
            s.longest_streak,
            s.days_active
        ),
    ]
}

fn dispatch(
    engine: &GamificationEngine,
    command: Command,
    session: Option<&str>,
) -> Result<Reply, error::EngineError> {
    match command {
        Command::Version => Reply::new(
            "version",
            &serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }),
            vec![format!("v{}", env!("CARGO_PKG_VERSION"))],
        ),
        Command::User(user_cli) => match user_cli.command {
            UserCommand::Register(arg) => {
                let stats = engine.register_user(&principal(&arg.user, session)?)?;
                let mut text = vec![format!("{} {}", "Registered".bright_green().bold(), arg.user)];
                text.extend(stats_lines(&stats));
                Reply::new("user.register", &stats, text)
            }
            UserCommand::Stats(arg) => {
                let stats = engine.get_stats(&principal(&arg.user, session)?)?;
                let text = stats_lines(&stats);
                Reply::new("user.stats", &stats, text)
            }
        },
        Command::Mission(mission_cli) => match mission_cli.command {
            MissionCommand::List(arg) => {
                let views = engine.list_missions(&principal(&arg.user, session)?)?;
                let text = views
                    .iter()
                    .map(|v| {
                        let status = match v.status {
                            plugins::missions::MissionStatus::Active => v.status.as_str().bright_cyan().bold(),
                            plugins::missions::MissionStatus::Completed => v.status.as_str().bright_green(),
                            plugins::missions::MissionStatus::Locked => v.status.as_str().dimmed(),
                            _ => v.status.as_str().normal(),
                        };
                        format!(
                            "  [{:<9}] {:<16} {} ({} XP, {} coins, LifeScore {}, {})",
                            status,
                            v.mission.id,
                            v.mission.title,
                            v.mission.xp_reward,
                            v.coin_reward,
                            output::signed(v.mission.lifescore_impact),
                            v.mission.recurrence
                        )
                    })
                    .collect();
                Reply::new("mission.list", &views, text)
            }
            MissionCommand::Start(t) => {
                let started = engine.start_mission(&principal(&t.user, session)?, &t.mission)?;
                let verb = if started.already_started {
                    "Already active".bright_yellow().bold()
                } else {
                    "Started".bright_green().bold()
                };
                let text = vec![format!("{} {} ({})", verb, t.mission, started.record.instance_key)];
                Reply::new("mission.start", &started, text)
            }
            MissionCommand::Complete(t) => {
                let result = engine.complete_mission(&principal(&t.user, session)?, &t.mission)?;
                let mut text = vec![format!(
                    "{} {}: {} XP, {} coins, LifeScore {} (streak {})",
                    "Completed".bright_green().bold(),
                    t.mission,
                    output::signed(result.xp_earned),
                    output::signed(result.coins_earned),
                    output::signed(result.lifescore_change),
                    result.streak
                )];
                text.extend(unlocked_lines(&result.unlocked_achievements));
                text.extend(stats_lines(&result.stats));
                Reply::new("mission.complete", &result, text)
            }
            MissionCommand::Fail(t) => {
                let record = engine.fail_mission(&principal(&t.user, session)?, &t.mission)?;
                let text = vec![format!("{} {} (streak reset)", "Failed".bright_red().bold(), t.mission)];
                Reply::new("mission.fail", &record, text)
            }
            MissionCommand::Progress { target, progress } => {
                let record = engine.update_progress(&principal(&target.user, session)?, &target.mission, progress)?;
                let text = vec![format!("{} at {}%", target.mission, record.progress)];
                Reply::new("mission.progress", &record, text)
            }
            MissionCommand::History(arg) => {
                let records = engine.mission_history(&principal(&arg.user, session)?)?;
                let text = records
                    .iter()
                    .map(|r| {
                        format!(
                            "  {} {:<16} {:<9} {}%  {} XP  {} coins",
                            r.started_at, r.mission_id, r.status, r.progress, r.xp_earned, r.coins_earned
                        )
                    })
                    .collect();
                Reply::new("mission.history", &records, text)
            }
            MissionCommand::Recommend { user, inputs } => {
                let inputs: ScenarioInputs = inputs.into();
                let recs = engine.recommend_missions(&principal(&user.user, session)?, &inputs)?;
                let text = recs
                    .iter()
                    .map(|r| format!("  {} {}", r.mission.id.bright_cyan().bold(), output::compact_line(&r.pitch, 160)))
                    .collect();
                Reply::new("mission.recommend", &recs, text)
            }
            MissionCommand::Add(args) => {
                let mission = engine.add_mission(&args.into_mission())?;
                let text = vec![format!("{} mission {}", "Added".bright_green().bold(), mission.id)];
                Reply::new("mission.add", &mission, text)
            }
            MissionCommand::Deactivate { mission } => {
                engine.set_mission_active(&mission, false)?;
                let text = vec![format!("Deactivated mission {}", mission)];
                Reply::new("mission.deactivate", &serde_json::json!({ "mission": mission }), text)
            }
        },
        Command::Reward(reward_cli) => match reward_cli.command {
            RewardCommand::List => {
                let rewards = engine.list_rewards()?;
                let text = rewards
                    .iter()
                    .map(|r| {
                        format!(
                            "  {:<20} {:>5} coins  {:<13} {}{}",
                            r.id,
                            r.coins_cost,
                            r.category,
                            r.title,
                            if r.is_award_once() { " (once)" } else { "" }
                        )
                    })
                    .collect();
                Reply::new("reward.list", &rewards, text)
            }
            RewardCommand::Redeem { user, reward } => {
                let result = engine.redeem_reward(&principal(&user, session)?, &reward)?;
                let mut text = vec![
                    format!(
                        "{} {} for {} coins (balance {})",
                        "Redeemed".bright_green().bold(),
                        reward,
                        result.redemption.coins_spent,
                        result.balance_after
                    ),
                    format!("  Token: {}", result.redemption.redemption_token.bright_white().bold()),
                ];
                text.extend(unlocked_lines(&result.unlocked_achievements));
                Reply::new("reward.redeem", &result, text)
            }
            RewardCommand::History(arg) => {
                let items = engine.redemptions(&principal(&arg.user, session)?)?;
                let text = items
                    .iter()
                    .map(|r| format!("  {} {:<20} {} coins  {}", r.redeemed_at, r.reward_id, r.coins_spent, r.redemption_token))
                    .collect();
                Reply::new("reward.history", &items, text)
            }
            RewardCommand::Add {
                id,
                title,
                description,
                category,
                cost,
                award_once,
            } => {
                let reward = engine.add_reward(&cli::reward_from_args(id, title, description, category, cost, award_once))?;
                let text = vec![format!("{} reward {}", "Added".bright_green().bold(), reward.id)];
                Reply::new("reward.add", &reward, text)
            }
        },
        Command::Achievement(ach_cli) => match ach_cli.command {
            AchievementCommand::List(arg) => {
                let items = engine.list_achievements(&principal(&arg.user, session)?)?;
                let text = items
                    .iter()
                    .map(|s| {
                        let mark = if s.unlocked { "[x]".bright_green() } else { "[ ]".normal() };
                        format!(
                            "  {} {:<18} {} ({}/{})",
                            mark,
                            s.achievement.id,
                            s.achievement.title,
                            s.progress.min(s.achievement.condition_value),
                            s.achievement.condition_value
                        )
                    })
                    .collect();
                Reply::new("achievement.list", &items, text)
            }
            AchievementCommand::Evaluate(arg) => {
                let unlocked = engine.evaluate_achievements(&principal(&arg.user, session)?)?;
                let text = if unlocked.is_empty() {
                    vec!["No new achievements".to_string()]
                } else {
                    unlocked_lines(&unlocked)
                };
                Reply::new("achievement.evaluate", &unlocked, text)
            }
        },
        Command::Scenario(sc) => {
            let inputs: ScenarioInputs = sc.inputs.into();
            let outcome = engine.simulate_scenario(&principal(&sc.user, session)?, &inputs, sc.apply)?;
            let p = &outcome.prediction;
            let mut text = vec![
                format!(
                    "{} LifeScore {}  XP {}  Risk {}",
                    if sc.apply { "Applied:".bright_green().bold() } else { "Preview:".bright_cyan().bold() },
                    output::signed(p.lifescore_delta),
                    p.xp_reward,
                    p.risk_level
                ),
                format!("  {}", output::compact_line(&outcome.coach_message, 400)),
                format!("  Suggested: {}", output::preview_messages(&p.suggested_missions, 4, 32)),
            ];
            if let Some(applied) = &outcome.applied {
                text.extend(unlocked_lines(&applied.unlocked_achievements));
                text.extend(stats_lines(&applied.stats));
            }
            if outcome.degraded {
                text.push(format!("  {}", "(provider unavailable, deterministic narrative used)".dimmed()));
            }
            Reply::new(if sc.apply { "scenario.apply" } else { "scenario.preview" }, &outcome, text)
        }
        Command::Lifescore(ls_cli) => match ls_cli.command {
            LifescoreCommand::History { user, limit } => {
                let rows = engine.lifescore_history(&principal(&user, session)?, limit)?;
                let text = rows
                    .iter()
                    .map(|r| format!("  {} {:>3} -> {:>3} ({}) {}", r.ts, r.old_score, r.new_score, output::signed(r.delta), r.reason))
                    .collect();
                Reply::new("lifescore.history", &rows, text)
            }
        },
        Command::Data(data_cli) => match data_cli.command {
            DataCommand::Audit { user } => {
                let events = engine.audit(user.as_deref())?;
                let text = events
                    .iter()
                    .map(|e| {
                        format!(
                            "  {} {:<16} {:<22} {}{}",
                            e.ts,
                            e.actor,
                            e.op,
                            e.status,
                            e.detail.as_deref().map(|d| format!("  {}", output::compact_line(d, 120))).unwrap_or_default()
                        )
                    })
                    .collect();
                Reply::new("data.audit", &events, text)
            }
        },
    }
}

pub fn run() -> Result<(), error::EngineError> {
    let cli = Cli::parse();
    let format = cli.format;

    if let Command::Version = cli.command {
        println!("v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let store = Store::resolve(cli.root.as_deref());
    let outcome = GamificationEngine::open(&store)
        .and_then(|engine| dispatch(&engine, cli.command, cli.session.as_deref()));

    match (outcome, format) {
        (Ok(reply), OutputFormat::Json) => {
            let env = time::command_envelope(reply.cmd, "ok", serde_json::json!({ "result": reply.payload }));
            println!("{}", serde_json::to_string_pretty(&env)?);
            Ok(())
        }
        (Ok(reply), OutputFormat::Text) => {
            for line in reply.text {
                println!("{}", line);
            }
            Ok(())
        }
        (Err(e), OutputFormat::Json) => {
            let mut extra = serde_json::json!({
                "error": { "kind": e.kind(), "message": e.to_string() }
            });
            if let error::EngineError::RateLimitExceeded { retry_after_secs } = &e {
                extra["error"]["retry_after_secs"] = serde_json::json!(retry_after_secs);
            }
            let env = time::command_envelope("error", "error", extra);
            println!("{}", serde_json::to_string_pretty(&env)?);
            Err(e)
        }
        (Err(e), OutputFormat::Text) => Err(e),
    }
}
