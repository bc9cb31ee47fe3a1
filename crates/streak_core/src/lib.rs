pub mod cadence;
pub mod error;
pub mod habit;
pub mod leaderboard;
pub mod score;
pub mod streak;
pub mod trend;

pub use crate::error::{AnalyticsError, Result};
pub use crate::habit::{Cadence, CadenceChange, EntryStatus, Frequency, Habit, HabitEntry};
pub use crate::leaderboard::{
    rank_leaderboard, rank_leaderboard_at, rank_leaderboard_with, LeaderboardEntry,
    RankingPolicy, ScoredHabit,
};
pub use crate::score::{
    compute_consistency, compute_momentum, consistency_report, momentum_report,
    ConsistencyReport, MomentumDirection, MomentumReport, ScoreResult, ScoreWindow,
};
pub use crate::streak::{compute_habit_streaks, compute_streaks, BreakReason, StreakRun, StreakSummary};
pub use crate::trend::{compute_trend, TrendMode, TrendPoint};
