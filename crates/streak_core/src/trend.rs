use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::cadence::{trailing_start, week_start};
use crate::error::{AnalyticsError, Result};
use crate::habit::{EntryStatus, HabitEntry};

pub const LOOKBACK_WEEK: u32 = 7;
pub const LOOKBACK_MONTH: u32 = 30;
pub const LOOKBACK_QUARTER: u32 = 90;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrendMode {
    #[default]
    Daily,
    Weekly,
    DayOfWeek { first_day: Weekday },
}

impl FromStr for TrendMode {
    type Err = String;

    /// Accepts `daily`, `weekly`, `dow` / `day-of-week`, optionally with a first day (`dow:mon`).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let (mode, first_day) = match normalized.split_once(':') {
            Some((mode, day)) => (mode.to_string(), Some(day.to_string())),
            None => (normalized.clone(), None),
        };
        match mode.as_str() {
            "daily" | "day" => Ok(TrendMode::Daily),
            "weekly" | "week" => Ok(TrendMode::Weekly),
            "dow" | "day-of-week" | "weekday" => {
                let first_day = match first_day {
                    Some(day) => day
                        .parse::<Weekday>()
                        .map_err(|_| format!("unknown weekday `{day}`"))?,
                    None => Weekday::Sun,
                };
                Ok(TrendMode::DayOfWeek { first_day })
            }
            other => Err(format!("unknown trend mode `{other}`")),
        }
    }
}

impl fmt::Display for TrendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendMode::Daily => f.write_str("daily"),
            TrendMode::Weekly => f.write_str("weekly"),
            TrendMode::DayOfWeek { first_day } => {
                write!(f, "dow:{}", first_day.to_string().to_ascii_lowercase())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendPoint {
    pub period_label: String,
    /// Completed share of observed entries, 0–100. `None` when nothing was logged.
    pub completion_rate: Option<f64>,
    pub streak_value: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_mood: Option<f64>,
    pub completed: u32,
    pub observed: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    completed: u32,
    skipped: u32,
    observed: u32,
    mood_sum: u32,
    mood_count: u32,
}

impl Tally {
    fn record(&mut self, entry: &HabitEntry) {
        self.observed += 1;
        match entry.status {
            EntryStatus::Completed => self.completed += 1,
            EntryStatus::Skipped => self.skipped += 1,
            EntryStatus::Missed => {}
        }
        if let Some(mood) = entry.mood {
            self.mood_sum += u32::from(mood);
            self.mood_count += 1;
        }
    }

    fn merge(&mut self, other: &Tally) {
        self.completed += other.completed;
        self.skipped += other.skipped;
        self.observed += other.observed;
        self.mood_sum += other.mood_sum;
        self.mood_count += other.mood_count;
    }

    fn only_skipped(&self) -> bool {
        self.observed > 0 && self.skipped == self.observed
    }

    fn point(&self, label: String, streak_value: u32) -> TrendPoint {
        TrendPoint {
            period_label: label,
            completion_rate: (self.observed > 0)
                .then(|| f64::from(self.completed) / f64::from(self.observed) * 100.0),
            streak_value,
            average_mood: (self.mood_count > 0)
                .then(|| f64::from(self.mood_sum) / f64::from(self.mood_count)),
            completed: self.completed,
            observed: self.observed,
        }
    }
}

/// Bucket entries over the `lookback_days` ending on `as_of` into chart series.
///
/// Entries may span several habits; every bucket reports completed over observed
/// entries. Daily and weekly buckets are chronological, day-of-week buckets follow
/// the week order starting at the mode's first day.
pub fn compute_trend(
    entries: &[HabitEntry],
    mode: TrendMode,
    lookback_days: u32,
    as_of: NaiveDate,
) -> Result<Vec<TrendPoint>> {
    if lookback_days == 0 {
        return Err(AnalyticsError::zero_window("trend lookback"));
    }
    let start = trailing_start(as_of, lookback_days)
        .ok_or_else(|| AnalyticsError::window_too_long("trend lookback", lookback_days))?;

    let mut days: BTreeMap<NaiveDate, Tally> = BTreeMap::new();
    for entry in entries.iter().filter(|entry| entry.date <= as_of) {
        days.entry(entry.date).or_default().record(entry);
    }
    let streaks = activity_streaks(&days, start, as_of);

    let points = match mode {
        TrendMode::Daily => dates(start, as_of)
            .map(|date| {
                let tally = days.get(&date).copied().unwrap_or_default();
                tally.point(date.format("%Y-%m-%d").to_string(), streaks[&date])
            })
            .collect(),
        TrendMode::Weekly => {
            let mut points = Vec::new();
            let mut monday = week_start(start);
            while monday <= as_of {
                let from = monday.max(start);
                let to = (monday + Duration::days(6)).min(as_of);
                let mut tally = Tally::default();
                for (_, day) in days.range(from..=to) {
                    tally.merge(day);
                }
                let week = monday.iso_week();
                let label = format!("{}-W{:02}", week.year(), week.week());
                points.push(tally.point(label, streaks[&to]));
                monday += Duration::days(7);
            }
            points
        }
        TrendMode::DayOfWeek { first_day } => {
            let mut weekday = first_day;
            let mut points = Vec::with_capacity(7);
            for _ in 0..7 {
                let occurrences: Vec<NaiveDate> = dates(start, as_of)
                    .filter(|date| date.weekday() == weekday)
                    .collect();
                let mut tally = Tally::default();
                for date in &occurrences {
                    if let Some(day) = days.get(date) {
                        tally.merge(day);
                    }
                }
                let streak = weekday_streak(&days, &occurrences, as_of);
                points.push(tally.point(weekday.to_string(), streak));
                weekday = weekday.succ();
            }
            points
        }
    };

    Ok(points)
}

fn dates(from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    from.iter_days().take_while(move |date| *date <= to)
}

/// Running count of consecutive active days, for every day in `[start, as_of]`.
///
/// A day with a completion extends the streak, a skipped-only day leaves it
/// unchanged, and any other day resets it. An unlogged `as_of` is still in progress.
fn activity_streaks(
    days: &BTreeMap<NaiveDate, Tally>,
    start: NaiveDate,
    as_of: NaiveDate,
) -> BTreeMap<NaiveDate, u32> {
    let origin = days
        .keys()
        .next()
        .map_or(start, |first| (*first).min(start));
    let mut streak = 0u32;
    let mut values = BTreeMap::new();
    for date in dates(origin, as_of) {
        match days.get(&date) {
            Some(tally) if tally.completed > 0 => streak += 1,
            Some(tally) if tally.only_skipped() => {}
            None if date == as_of => {}
            _ => streak = 0,
        }
        if date >= start {
            values.insert(date, streak);
        }
    }
    values
}

/// Consecutive most recent occurrences of a weekday that include a completion.
fn weekday_streak(
    days: &BTreeMap<NaiveDate, Tally>,
    occurrences: &[NaiveDate],
    as_of: NaiveDate,
) -> u32 {
    let mut streak = 0;
    for date in occurrences.iter().rev() {
        match days.get(date) {
            Some(tally) if tally.completed > 0 => streak += 1,
            Some(tally) if tally.only_skipped() => {}
            None if *date == as_of => {}
            _ => break,
        }
    }
    streak
}
