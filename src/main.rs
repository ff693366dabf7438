use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "lexiquest")]
#[command(about = "LexiQuest gamification engine - points, rewards, achievements, missions and leaderboards")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.lexiquest/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database (overrides [database] path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and create the database
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,

        /// Also install the starter catalog
        #[arg(long)]
        seed: bool,
    },

    /// Install the starter rewards, achievements and mission templates
    Seed,

    /// Show a user's profile
    Profile { user: String },

    /// Grant points to a user
    AwardPoints {
        user: String,
        points: u64,

        /// Activity log kind
        #[arg(long, default_value = "manual")]
        kind: String,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Administrative correction (may be negative)
    AdjustPoints {
        user: String,

        #[arg(allow_hyphen_values = true)]
        delta: i64,

        #[arg(short, long)]
        reason: String,
    },

    /// Record a learning activity (lesson, exercise or collaboration)
    Activity {
        user: String,
        kind: String,

        /// Correct answers
        #[arg(long, requires = "total")]
        score: Option<u32>,

        /// Number of questions
        #[arg(long)]
        total: Option<u32>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Grant a catalog reward to a user
    AwardReward { user: String, reward: String },

    /// Consume a user's reward
    ConsumeReward { user: String, reward: String },

    /// Show reward status (all of the user's rewards when no reward is given)
    RewardStatus { user: String, reward: Option<String> },

    /// Persist EXPIRED for lapsed rewards
    SweepRewards,

    /// Evaluate achievements (all criteria, or one criteria with a value)
    Evaluate {
        user: String,

        /// Criteria key, e.g. LESSONS_COMPLETED
        #[arg(long, requires = "value")]
        criteria: Option<String>,

        #[arg(long)]
        value: Option<u64>,
    },

    /// Report mission progress, or list it when no type is given
    MissionProgress {
        user: String,

        /// Mission type, e.g. COMPLETE_LESSONS
        #[arg(long = "type", requires = "value")]
        mission_type: Option<String>,

        #[arg(long)]
        value: Option<u64>,
    },

    /// Generate missions for the current windows
    GenerateMissions,

    /// Recompute leaderboards (all units unless window and category are given)
    Recompute {
        #[arg(long, requires = "category")]
        window: Option<String>,

        #[arg(long)]
        category: Option<String>,
    },

    /// Show a leaderboard snapshot
    Leaderboard {
        window: String,
        category: String,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show a user's rank
    Rank {
        user: String,
        window: String,
        category: String,
    },

    /// Run mission generation and leaderboard recomputation until Ctrl-C
    RunScheduler,

    /// Delete all user progress, keeping the catalogs
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = cli::GlobalOptions {
        config: cli.config,
        db: cli.db,
    };

    match cli.command {
        Commands::Init { force, seed } => {
            cli::init::init_command(&options, force, seed)?;
        }
        Commands::Seed => {
            cli::admin::seed_command(&options)?;
        }
        Commands::Profile { user } => {
            cli::profile::profile_command(&options, &user)?;
        }
        Commands::AwardPoints {
            user,
            points,
            kind,
            description,
        } => {
            cli::profile::award_points_command(&options, &user, points, &kind, &description)?;
        }
        Commands::AdjustPoints {
            user,
            delta,
            reason,
        } => {
            cli::profile::adjust_points_command(&options, &user, delta, &reason)?;
        }
        Commands::Activity {
            user,
            kind,
            score,
            total,
            description,
        } => {
            cli::profile::activity_command(&options, &user, &kind, score, total, description)?;
        }
        Commands::AwardReward { user, reward } => {
            cli::rewards::award_command(&options, &user, &reward)?;
        }
        Commands::ConsumeReward { user, reward } => {
            cli::rewards::consume_command(&options, &user, &reward)?;
        }
        Commands::RewardStatus { user, reward } => {
            cli::rewards::status_command(&options, &user, reward.as_deref())?;
        }
        Commands::SweepRewards => {
            cli::rewards::sweep_command(&options)?;
        }
        Commands::Evaluate {
            user,
            criteria,
            value,
        } => {
            cli::achievements::evaluate_command(&options, &user, criteria.as_deref(), value)?;
        }
        Commands::MissionProgress {
            user,
            mission_type,
            value,
        } => {
            cli::missions::progress_command(&options, &user, mission_type.as_deref(), value)?;
        }
        Commands::GenerateMissions => {
            cli::missions::generate_command(&options)?;
        }
        Commands::Recompute { window, category } => {
            cli::leaderboard::recompute_command(&options, window.as_deref(), category.as_deref())?;
        }
        Commands::Leaderboard {
            window,
            category,
            limit,
        } => {
            cli::leaderboard::leaderboard_command(&options, &window, &category, limit)?;
        }
        Commands::Rank {
            user,
            window,
            category,
        } => {
            cli::leaderboard::rank_command(&options, &user, &window, &category)?;
        }
        Commands::RunScheduler => {
            cli::admin::run_scheduler_command(&options).await?;
        }
        Commands::Reset { yes } => {
            cli::admin::reset_command(&options, yes)?;
        }
    }

    Ok(())
}
