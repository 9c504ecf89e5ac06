//! CLI struct definitions for the lifescore command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `lib.rs`.

use crate::plugins::catalog::{Difficulty, Mission, Recurrence, Reward, RewardCategory};
use crate::plugins::scenario::ScenarioInputs;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "lifescore",
    version = env!("CARGO_PKG_VERSION"),
    about = "LifeScore gamification engine: missions, rewards, achievements and what-if scenarios."
)]
pub(crate) struct Cli {
    /// Store root (defaults to $LIFESCORE_ROOT, then ./.lifescore).
    #[clap(long, global = true)]
    pub root: Option<PathBuf>,
    /// Output format.
    #[clap(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,
    /// Session id recorded in audit intent refs.
    #[clap(long, global = true)]
    pub session: Option<String>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Register users and read their stats
    User(UserCli),
    /// Browse, start, progress and finish missions
    Mission(MissionCli),
    /// Browse and redeem rewards
    Reward(RewardCli),
    /// Achievement catalog and evaluation
    Achievement(AchievementCli),
    /// Project (and optionally apply) a what-if lifestyle scenario
    Scenario(ScenarioCli),
    /// LifeScore change history
    Lifescore(LifescoreCli),
    /// Store-level data access
    Data(DataCli),
    /// Print the engine version
    Version,
}

#[derive(clap::Args, Debug)]
pub(crate) struct UserArg {
    /// User id (1-64 chars of [A-Za-z0-9_.:@-])
    #[clap(long)]
    pub user: String,
}

#[derive(clap::Args, Debug)]
pub(crate) struct UserCli {
    #[clap(subcommand)]
    pub command: UserCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum UserCommand {
    /// Create a user's stat row
    Register(UserArg),
    /// Show lifescore, xp, level, coins and streak
    Stats(UserArg),
}

#[derive(clap::Args, Debug)]
pub(crate) struct MissionCli {
    #[clap(subcommand)]
    pub command: MissionCommand,
}

#[derive(clap::Args, Debug)]
pub(crate) struct MissionTarget {
    #[clap(long)]
    pub user: String,
    #[clap(long)]
    pub mission: String,
}

#[derive(Subcommand, Debug)]
pub(crate) enum MissionCommand {
    /// List active missions with the user's status
    List(UserArg),
    /// Start a mission (retries return the active record)
    Start(MissionTarget),
    /// Complete the active mission and collect rewards
    Complete(MissionTarget),
    /// Abandon the active mission
    Fail(MissionTarget),
    /// Record progress (0-100) on the active mission
    Progress {
        #[clap(flatten)]
        target: MissionTarget,
        #[clap(long)]
        progress: i64,
    },
    /// Every mission instance the user has started
    History(UserArg),
    /// Suggest catalog missions for a lifestyle profile
    Recommend {
        #[clap(flatten)]
        user: UserArg,
        #[clap(flatten)]
        inputs: ScenarioArgs,
    },
    /// Add a mission to the catalog
    Add(MissionAddArgs),
    /// Hide a mission from users
    Deactivate {
        #[clap(long)]
        mission: String,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct MissionAddArgs {
    #[clap(long)]
    pub id: String,
    #[clap(long)]
    pub title: String,
    #[clap(long, default_value = "")]
    pub description: String,
    #[clap(long, default_value = "general")]
    pub category: String,
    #[clap(long, value_enum)]
    pub difficulty: DifficultyArg,
    #[clap(long)]
    pub xp: i64,
    #[clap(long, allow_hyphen_values = true)]
    pub impact: i64,
    /// Explicit coin reward (defaults to the difficulty table)
    #[clap(long)]
    pub coins: Option<i64>,
    #[clap(long, value_enum, default_value_t = RecurrenceArg::OneTime)]
    pub recurrence: RecurrenceArg,
    #[clap(long, default_value_t = 1)]
    pub required_level: i64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum DifficultyArg {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl From<DifficultyArg> for Difficulty {
    fn from(d: DifficultyArg) -> Self {
        match d {
            DifficultyArg::Easy => Difficulty::Easy,
            DifficultyArg::Medium => Difficulty::Medium,
            DifficultyArg::Hard => Difficulty::Hard,
            DifficultyArg::Expert => Difficulty::Expert,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum RecurrenceArg {
    OneTime,
    Daily,
    Weekly,
}

impl From<RecurrenceArg> for Recurrence {
    fn from(r: RecurrenceArg) -> Self {
        match r {
            RecurrenceArg::OneTime => Recurrence::OneTime,
            RecurrenceArg::Daily => Recurrence::Daily,
            RecurrenceArg::Weekly => Recurrence::Weekly,
        }
    }
}

impl MissionAddArgs {
    pub fn into_mission(self) -> Mission {
        Mission {
            id: self.id,
            title: self.title,
            description: self.description,
            category: self.category,
            difficulty: self.difficulty.into(),
            xp_reward: self.xp,
            lifescore_impact: self.impact,
            coin_reward: self.coins,
            recurrence: self.recurrence.into(),
            required_level: self.required_level,
            active: true,
        }
    }
}

#[derive(clap::Args, Debug)]
pub(crate) struct RewardCli {
    #[clap(subcommand)]
    pub command: RewardCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum RewardCommand {
    /// List redeemable rewards
    List,
    /// Spend coins on a reward
    Redeem {
        #[clap(long)]
        user: String,
        #[clap(long)]
        reward: String,
    },
    /// The user's past redemptions
    History(UserArg),
    /// Add a reward to the catalog
    Add {
        #[clap(long)]
        id: String,
        #[clap(long)]
        title: String,
        #[clap(long, default_value = "")]
        description: String,
        #[clap(long, value_enum)]
        category: RewardCategoryArg,
        #[clap(long)]
        cost: i64,
        /// Allow one redemption per user (always true for badges)
        #[clap(long)]
        award_once: bool,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum RewardCategoryArg {
    Badge,
    CoinBoost,
    PartnerOffer,
    Discount,
}

impl From<RewardCategoryArg> for RewardCategory {
    fn from(c: RewardCategoryArg) -> Self {
        match c {
            RewardCategoryArg::Badge => RewardCategory::Badge,
            RewardCategoryArg::CoinBoost => RewardCategory::CoinBoost,
            RewardCategoryArg::PartnerOffer => RewardCategory::PartnerOffer,
            RewardCategoryArg::Discount => RewardCategory::Discount,
        }
    }
}

pub(crate) fn reward_from_args(
    id: String,
    title: String,
    description: String,
    category: RewardCategoryArg,
    cost: i64,
    award_once: bool,
) -> Reward {
    Reward {
        id,
        title,
        description,
        category: category.into(),
        coins_cost: cost,
        award_once,
        active: true,
    }
}

#[derive(clap::Args, Debug)]
pub(crate) struct AchievementCli {
    #[clap(subcommand)]
    pub command: AchievementCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum AchievementCommand {
    /// Catalog with unlock state and progress
    List(UserArg),
    /// Award any newly met achievements
    Evaluate(UserArg),
}

#[derive(clap::Args, Debug, Clone, Default)]
pub(crate) struct ScenarioArgs {
    #[clap(long)]
    pub walk_minutes: Option<i64>,
    /// excellent | good | fair | poor
    #[clap(long)]
    pub diet: Option<String>,
    /// One-way commute distance
    #[clap(long)]
    pub commute: Option<f64>,
    /// Daily driving hours
    #[clap(long)]
    pub driving: Option<f64>,
    /// always | often | rarely
    #[clap(long)]
    pub seatbelt: Option<String>,
}

impl From<ScenarioArgs> for ScenarioInputs {
    fn from(a: ScenarioArgs) -> Self {
        ScenarioInputs {
            walk_minutes: a.walk_minutes,
            diet_quality: a.diet,
            commute_distance: a.commute,
            driving_hours: a.driving,
            seatbelt_usage: a.seatbelt,
        }
    }
}

#[derive(clap::Args, Debug)]
pub(crate) struct ScenarioCli {
    #[clap(long)]
    pub user: String,
    #[clap(flatten)]
    pub inputs: ScenarioArgs,
    /// Apply the projection to live stats instead of previewing it
    #[clap(long)]
    pub apply: bool,
}

#[derive(clap::Args, Debug)]
pub(crate) struct LifescoreCli {
    #[clap(subcommand)]
    pub command: LifescoreCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum LifescoreCommand {
    /// Most recent score changes first
    History {
        #[clap(long)]
        user: String,
        #[clap(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct DataCli {
    #[clap(subcommand)]
    pub command: DataCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum DataCommand {
    /// Print the broker audit log
    Audit {
        /// Only events for this actor
        #[clap(long)]
        user: Option<String>,
    },
}
