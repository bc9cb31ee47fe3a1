use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Completed,
    Skipped,
    Missed,
}

pub const MOOD_RANGE: RangeInclusive<u8> = 1..=5;
pub const ENERGY_RANGE: RangeInclusive<u8> = 1..=10;

/// One check-in for one habit on one calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HabitEntry {
    pub habit_id: String,
    pub date: NaiveDate,
    pub status: EntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl HabitEntry {
    pub fn new(habit_id: impl Into<String>, date: NaiveDate, status: EntryStatus) -> Self {
        Self {
            habit_id: habit_id.into(),
            date,
            status,
            duration_minutes: None,
            mood: None,
            energy_level: None,
            notes: None,
        }
    }

    pub fn with_mood(mut self, mood: u8) -> Self {
        self.mood = Some(mood.clamp(*MOOD_RANGE.start(), *MOOD_RANGE.end()));
        self
    }

    /// Pull `mood` and `energy_level` into their rating scales. Returns whether anything changed.
    pub fn clamp_ratings(&mut self) -> bool {
        let before = (self.mood, self.energy_level);
        self.mood = self
            .mood
            .map(|mood| mood.clamp(*MOOD_RANGE.start(), *MOOD_RANGE.end()));
        self.energy_level = self
            .energy_level
            .map(|energy| energy.clamp(*ENERGY_RANGE.start(), *ENERGY_RANGE.end()));
        before != (self.mood, self.energy_level)
    }

    pub fn is_completed(&self) -> bool {
        self.status == EntryStatus::Completed
    }
}

/// Set of weekdays stored as a bitmask, Monday in the lowest bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Weekday>", into = "Vec<Weekday>")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_monday();
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        MONDAY_FIRST
            .iter()
            .copied()
            .filter(move |day| self.contains(*day))
    }
}

const MONDAY_FIRST: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = Self::empty();
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl From<Vec<Weekday>> for WeekdaySet {
    fn from(days: Vec<Weekday>) -> Self {
        days.into_iter().collect()
    }
}

impl From<WeekdaySet> for Vec<Weekday> {
    fn from(set: WeekdaySet) -> Self {
        set.iter().collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Custom(WeekdaySet),
}

impl Frequency {
    pub fn custom(days: impl IntoIterator<Item = Weekday>) -> Result<Self> {
        let set: WeekdaySet = days.into_iter().collect();
        let frequency = Frequency::Custom(set);
        frequency.validate()?;
        Ok(frequency)
    }

    /// A custom cadence with no weekdays can never be satisfied.
    pub fn validate(&self) -> Result<()> {
        match self {
            Frequency::Custom(days) if days.is_empty() => Err(AnalyticsError::malformed(
                self.to_string(),
                "custom cadence needs at least one weekday",
            )),
            _ => Ok(()),
        }
    }

    /// Parse tokens such as `daily`, `+1d`, `weekly`, `1w` or `custom:mon,wed,fri`.
    pub fn from_token(token: &str) -> Result<Self> {
        let normalized = token.trim().to_ascii_lowercase();
        if let Some(list) = normalized.strip_prefix("custom:") {
            let mut days = WeekdaySet::empty();
            for part in list.split(',').map(str::trim).filter(|part| !part.is_empty()) {
                let day = part
                    .parse::<Weekday>()
                    .map_err(|_| AnalyticsError::malformed(token, "unknown weekday"))?;
                days.insert(day);
            }
            let frequency = Frequency::Custom(days);
            frequency
                .validate()
                .map_err(|_| AnalyticsError::malformed(token, "custom cadence needs at least one weekday"))?;
            return Ok(frequency);
        }

        match normalized.trim_start_matches('+').trim_start_matches('.') {
            "daily" | "1d" | "d" => Ok(Frequency::Daily),
            "weekly" | "1w" | "w" => Ok(Frequency::Weekly),
            _ => Err(AnalyticsError::malformed(token, "unsupported frequency")),
        }
    }
}

impl FromStr for Frequency {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_token(s)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Daily => f.write_str("daily"),
            Frequency::Weekly => f.write_str("weekly"),
            Frequency::Custom(days) => {
                let names: Vec<String> = days
                    .iter()
                    .map(|day| day.to_string().to_ascii_lowercase())
                    .collect();
                write!(f, "custom:{}", names.join(","))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CadenceChange {
    pub effective_from: NaiveDate,
    pub frequency: Frequency,
}

/// The frequency a habit followed over time: an initial frequency and dated changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cadence {
    initial: Frequency,
    changes: Vec<CadenceChange>,
}

impl Cadence {
    pub fn new(initial: Frequency, mut changes: Vec<CadenceChange>) -> Self {
        changes.sort_by_key(|change| change.effective_from);
        changes.dedup_by_key(|change| change.effective_from);
        Self { initial, changes }
    }

    pub fn validate(&self) -> Result<()> {
        self.initial.validate()?;
        for change in &self.changes {
            change.frequency.validate()?;
        }
        Ok(())
    }

    /// Index of the cadence segment in effect on `date`. Segment 0 is the initial frequency.
    pub fn segment_at(&self, date: NaiveDate) -> usize {
        self.changes
            .iter()
            .take_while(|change| change.effective_from <= date)
            .count()
    }

    pub fn frequency_of_segment(&self, segment: usize) -> Frequency {
        match segment {
            0 => self.initial,
            n => self.changes[n - 1].frequency,
        }
    }

    pub fn frequency_on(&self, date: NaiveDate) -> Frequency {
        self.frequency_of_segment(self.segment_at(date))
    }

    /// First day of `segment`, `None` for the open-ended initial segment.
    pub fn segment_start(&self, segment: usize) -> Option<NaiveDate> {
        segment
            .checked_sub(1)
            .map(|idx| self.changes[idx].effective_from)
    }

    /// Last day of `segment`, `None` for the segment still in effect.
    pub fn segment_end(&self, segment: usize) -> Option<NaiveDate> {
        self.changes
            .get(segment)
            .and_then(|change| change.effective_from.pred_opt())
    }
}

impl From<Frequency> for Cadence {
    fn from(frequency: Frequency) -> Self {
        Self::new(frequency, Vec::new())
    }
}

fn default_workspace() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Habit {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_workspace")]
    pub workspace_id: String,
    pub frequency: Frequency,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cadence_changes: Vec<CadenceChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_streak: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_on: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<NaiveDate>,
}

impl Habit {
    pub fn new(id: impl Into<String>, frequency: Frequency) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            workspace_id: default_workspace(),
            frequency,
            cadence_changes: Vec::new(),
            target_streak: None,
            created_on: None,
            archived_at: None,
        }
    }

    pub fn cadence(&self) -> Cadence {
        Cadence::new(self.frequency, self.cadence_changes.clone())
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    /// Archive date if the habit was already archived on `as_of`.
    pub fn archived_by(&self, as_of: NaiveDate) -> Option<NaiveDate> {
        self.archived_at.filter(|date| *date <= as_of)
    }
}

/// Sorts entries chronologically and keeps the last entry seen for each (habit, day).
pub fn normalize_entries(entries: &[HabitEntry]) -> Vec<HabitEntry> {
    let mut sorted: Vec<HabitEntry> = entries.to_vec();
    sorted.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.habit_id.cmp(&b.habit_id)));
    let mut normalized: Vec<HabitEntry> = Vec::with_capacity(sorted.len());
    for entry in sorted {
        match normalized.last_mut() {
            Some(last) if last.date == entry.date && last.habit_id == entry.habit_id => {
                *last = entry;
            }
            _ => normalized.push(entry),
        }
    }
    normalized
}

pub(crate) fn weekday_of(date: NaiveDate) -> Weekday {
    date.weekday()
}
