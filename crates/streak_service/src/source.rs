use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use streak_core::{Habit, HabitEntry};

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    /// Everything logged up to and including `to`.
    pub fn through(to: NaiveDate) -> Self {
        Self {
            from: NaiveDate::MIN,
            to,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }
}

/// Entry stores implement this trait; entries come back sorted by date with at
/// most one entry per day.
pub trait EntrySource: Send + Sync {
    fn entries(&self, habit_id: &str, range: DateRange) -> Result<Vec<HabitEntry>>;

    /// Changes whenever stored entries change. Memoized results keyed on an older
    /// generation are stale.
    fn generation(&self) -> u64 {
        0
    }
}

pub trait HabitCatalog: Send + Sync {
    /// Habits of one workspace, archived ones included, ordered by id.
    fn habits(&self, workspace_id: &str) -> Result<Vec<Habit>>;
    fn habit(&self, habit_id: &str) -> Result<Option<Habit>>;
}
