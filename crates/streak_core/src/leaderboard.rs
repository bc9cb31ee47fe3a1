use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::habit::Habit;
use crate::score::ConsistencyReport;
use crate::streak::StreakSummary;

/// A habit together with its streak summary and 30-day consistency report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredHabit {
    pub habit: Habit,
    pub streaks: StreakSummary,
    pub consistency: ConsistencyReport,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardEntry {
    pub habit: Habit,
    pub rank: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RankingPolicy {
    /// Every habit gets its own rank; ties fall back to the habit id.
    #[default]
    Strict,
    /// Habits tied on streak and completion rate share a rank (1, 1, 3).
    Shared,
}

pub fn rank_leaderboard(habits: &[ScoredHabit]) -> Vec<LeaderboardEntry> {
    rank_leaderboard_with(habits, RankingPolicy::Strict)
}

/// Rank active habits by current streak, then completion rate, then id.
pub fn rank_leaderboard_with(
    habits: &[ScoredHabit],
    policy: RankingPolicy,
) -> Vec<LeaderboardEntry> {
    rank(habits, policy, |habit| !habit.is_archived())
}

/// Rank the habits that were still active on `as_of`. A habit archived later keeps its place.
pub fn rank_leaderboard_at(
    habits: &[ScoredHabit],
    policy: RankingPolicy,
    as_of: NaiveDate,
) -> Vec<LeaderboardEntry> {
    rank(habits, policy, |habit| habit.archived_by(as_of).is_none())
}

fn rank(
    habits: &[ScoredHabit],
    policy: RankingPolicy,
    active: impl Fn(&Habit) -> bool,
) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = habits
        .iter()
        .filter(|scored| active(&scored.habit))
        .map(|scored| LeaderboardEntry {
            habit: scored.habit.clone(),
            rank: 0,
            current_streak: scored.streaks.current_streak,
            longest_streak: scored.streaks.longest_streak,
            completion_rate: scored.consistency.completion_rate,
        })
        .collect();

    entries.sort_by(|a, b| {
        standing(
            (a.current_streak, a.completion_rate, a.habit.id.as_str()),
            (b.current_streak, b.completion_rate, b.habit.id.as_str()),
        )
    });

    for idx in 0..entries.len() {
        let position = idx as u32 + 1;
        let rank = match policy {
            RankingPolicy::Strict => position,
            RankingPolicy::Shared if idx > 0 && ties(&entries[idx - 1], &entries[idx]) => {
                entries[idx - 1].rank
            }
            RankingPolicy::Shared => position,
        };
        entries[idx].rank = rank;
    }

    entries
}

fn standing(a: (u32, f64, &str), b: (u32, f64, &str)) -> Ordering {
    b.0.cmp(&a.0)
        .then_with(|| b.1.total_cmp(&a.1))
        .then_with(|| a.2.cmp(b.2))
}

fn ties(a: &LeaderboardEntry, b: &LeaderboardEntry) -> bool {
    a.current_streak == b.current_streak
        && a.completion_rate.total_cmp(&b.completion_rate).is_eq()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::habit::Frequency;
    use crate::score::ScoreResult;

    fn scored(id: &str, current: u32, rate: f64) -> ScoredHabit {
        ScoredHabit {
            habit: Habit::new(id, Frequency::Daily),
            streaks: StreakSummary {
                current_streak: current,
                longest_streak: current + 2,
                ..StreakSummary::default()
            },
            consistency: ConsistencyReport {
                score: ScoreResult {
                    value: rate as u8,
                    window_days: 30,
                    sample_size: 30,
                },
                completion_rate: rate,
                stability: 1.0,
                required_periods: 30,
                satisfied_periods: (rate * 0.3) as u32,
            },
        }
    }

    fn ids(entries: &[LeaderboardEntry]) -> Vec<&str> {
        entries.iter().map(|entry| entry.habit.id.as_str()).collect()
    }

    #[test]
    fn streak_ties_fall_back_to_completion_rate() {
        let board = rank_leaderboard(&[
            scored("A", 10, 80.0),
            scored("B", 10, 90.0),
            scored("C", 5, 100.0),
        ]);
        assert_eq!(ids(&board), ["B", "A", "C"]);
        let ranks: Vec<u32> = board.iter().map(|entry| entry.rank).collect();
        assert_eq!(ranks, [1, 2, 3]);
        assert_eq!(board[0].longest_streak, 12);
    }

    #[test]
    fn exact_ties_are_ordered_by_id() {
        let board = rank_leaderboard(&[scored("walk", 3, 50.0), scored("read", 3, 50.0)]);
        assert_eq!(ids(&board), ["read", "walk"]);
        assert_eq!(board[1].rank, 2);
    }

    #[test]
    fn shared_policy_gives_competition_ranks() {
        let board = rank_leaderboard_with(
            &[
                scored("a", 4, 70.0),
                scored("b", 4, 70.0),
                scored("c", 1, 20.0),
            ],
            RankingPolicy::Shared,
        );
        let ranks: Vec<u32> = board.iter().map(|entry| entry.rank).collect();
        assert_eq!(ranks, [1, 1, 3]);
    }

    #[test]
    fn archived_habits_are_excluded() {
        let mut archived = scored("old", 50, 100.0);
        archived.habit.archived_at = NaiveDate::from_ymd_opt(2025, 1, 1);
        let board = rank_leaderboard(&[archived, scored("new", 1, 10.0)]);
        assert_eq!(ids(&board), ["new"]);
        assert_eq!(board[0].rank, 1);
    }

    #[test]
    fn historical_board_keeps_habits_archived_later() {
        let mut retired = scored("old", 7, 60.0);
        retired.habit.archived_at = NaiveDate::from_ymd_opt(2025, 3, 10);
        let habits = [retired, scored("new", 2, 10.0)];

        let before = rank_leaderboard_at(
            &habits,
            RankingPolicy::Strict,
            NaiveDate::from_ymd_opt(2025, 3, 9).unwrap(),
        );
        assert_eq!(ids(&before), ["old", "new"]);

        let after = rank_leaderboard_at(
            &habits,
            RankingPolicy::Strict,
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
        );
        assert_eq!(ids(&after), ["new"]);
    }

    #[test]
    fn empty_input_gives_empty_board() {
        assert!(rank_leaderboard(&[]).is_empty());
    }
}
