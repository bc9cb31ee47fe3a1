use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use streak_core::TrendMode;
use streak_service::{AnalyticsConfig, AnalyticsService};
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub roots: Vec<PathBuf>,
    pub analytics: AnalyticsConfig,
}

impl AppConfig {
    /// Roots come from `STREAK_ROOT` and the path list in `STREAK_ROOTS`. Analytics
    /// settings load from `STREAK_CONFIG` when set, then `STREAK_*` overrides apply.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(root) = std::env::var("STREAK_ROOT") {
            config.push_root(PathBuf::from(root));
        }
        if let Ok(list) = std::env::var("STREAK_ROOTS") {
            for path in std::env::split_paths(&list) {
                config.push_root(path);
            }
        }
        config.analytics = match std::env::var("STREAK_CONFIG") {
            Ok(path) => AnalyticsConfig::from_json_file(path)?.apply_env(),
            Err(_) => AnalyticsConfig::from_env()?,
        };
        Ok(config)
    }

    pub(crate) fn push_root(&mut self, path: PathBuf) {
        if !path.as_os_str().is_empty() && !self.roots.contains(&path) {
            self.roots.push(path);
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "streakboard", about = "Streaks, scores and trends for habit logs")]
pub struct Cli {
    /// Directory or file holding habit logs (repeatable)
    #[arg(long = "root", global = true)]
    pub roots: Vec<PathBuf>,
    /// Evaluate as of this day (YYYY-MM-DD), defaults to today
    #[arg(long, global = true)]
    pub as_of: Option<NaiveDate>,
    #[arg(long, global = true, default_value = "default")]
    pub workspace: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Streaks, consistency and momentum for one habit
    Habit { id: String },
    /// Rank the workspace's active habits
    Leaderboard,
    /// Completion trend for the workspace or one habit
    Trend {
        /// daily, weekly or dow[:first-day]
        #[arg(long)]
        mode: Option<TrendMode>,
        #[arg(long)]
        lookback_days: Option<u32>,
        #[arg(long)]
        habit: Option<String>,
    },
    /// Every view for the workspace at once
    Dashboard,
}

pub fn run(mut config: AppConfig, cli: Cli) -> Result<()> {
    for root in &cli.roots {
        config.push_root(root.clone());
    }
    if config.roots.is_empty() {
        return Err(anyhow!("no habit log roots, pass --root or set STREAK_ROOT"));
    }
    let as_of = cli.as_of.unwrap_or_else(|| Local::now().date_naive());
    info!(roots = config.roots.len(), %as_of, "loading habit logs");

    let service = config
        .roots
        .iter()
        .fold(AnalyticsService::builder(), |builder, root| builder.add_root(root))
        .with_config(config.analytics.clone())
        .build()?;

    let workspace = cli.workspace.as_str();
    let output = match cli.command {
        Command::Habit { id } => serde_json::to_value(service.habit_report(&id, as_of)?)?,
        Command::Leaderboard => serde_json::to_value(service.leaderboard(workspace, as_of)?)?,
        Command::Trend {
            mode,
            lookback_days,
            habit,
        } => serde_json::to_value(service.trend(
            workspace,
            habit.as_deref(),
            mode.unwrap_or(config.analytics.trend_mode),
            lookback_days.unwrap_or(config.analytics.trend_lookback_days),
            as_of,
        )?)?,
        Command::Dashboard => serde_json::to_value(service.dashboard(workspace, as_of)?)?,
    };
    let rendered = serde_json::to_string_pretty(&output).context("rendering report")?;
    println!("{rendered}");
    Ok(())
}
