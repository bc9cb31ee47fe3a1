use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cadence::{required_periods, PeriodLog, PeriodOutcome};
use crate::error::Result;
use crate::habit::{Cadence, Habit, HabitEntry};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BreakReason {
    Missed,
    Archived,
    FrequencyGap,
}

/// A maximal run of consecutive satisfied cadence periods.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreakRun {
    pub habit_id: String,
    pub start_date: NaiveDate,
    /// Start of the last satisfied period in the run.
    pub last_date: NaiveDate,
    pub length: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<BreakReason>,
}

impl StreakRun {
    fn open(habit_id: &str, start: NaiveDate) -> Self {
        Self {
            habit_id: habit_id.to_string(),
            start_date: start,
            last_date: start,
            length: 1,
            broken_at: None,
            reason: None,
        }
    }

    fn extend(&mut self, period: NaiveDate) {
        self.length += 1;
        self.last_date = period;
    }

    fn close(mut self, at: NaiveDate, reason: BreakReason) -> Self {
        self.broken_at = Some(at);
        self.reason = Some(reason);
        self
    }

    pub fn is_open(&self) -> bool {
        self.broken_at.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreakSummary {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub runs: Vec<StreakRun>,
    pub total_completions: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_completed: Option<NaiveDate>,
}

impl StreakSummary {
    pub fn active_run(&self) -> Option<&StreakRun> {
        self.runs.iter().find(|run| run.is_open())
    }

    /// Percentage of `target` reached by the current streak, capped at 100.
    pub fn target_progress(&self, target: u32) -> f64 {
        if target == 0 {
            return 100.0;
        }
        (f64::from(self.current_streak) / f64::from(target) * 100.0).min(100.0)
    }
}

/// Derive streak runs from one habit's entries as of `as_of`.
///
/// Completed entries satisfy their period, skipped entries are neutral, and a
/// missed entry or an elapsed period with no entry breaks the open run. The
/// period containing `as_of` is still in progress, so only an explicit miss
/// breaks it.
pub fn compute_streaks(
    entries: &[HabitEntry],
    cadence: &Cadence,
    as_of: NaiveDate,
) -> Result<StreakSummary> {
    let habit_id = entries
        .first()
        .map(|entry| entry.habit_id.as_str())
        .unwrap_or_default();
    walk(habit_id, entries, cadence, as_of, None)
}

/// Same as [`compute_streaks`], using the habit's cadence history and closing the
/// active run when the habit was archived on or before `as_of`.
pub fn compute_habit_streaks(
    habit: &Habit,
    entries: &[HabitEntry],
    as_of: NaiveDate,
) -> Result<StreakSummary> {
    walk(
        &habit.id,
        entries,
        &habit.cadence(),
        as_of,
        habit.archived_by(as_of),
    )
}

fn walk(
    habit_id: &str,
    entries: &[HabitEntry],
    cadence: &Cadence,
    as_of: NaiveDate,
    archived_at: Option<NaiveDate>,
) -> Result<StreakSummary> {
    cadence.validate()?;
    let horizon = archived_at.map_or(as_of, |date| date.min(as_of));
    let log = PeriodLog::collect(entries, cadence, horizon);
    if log.off_cadence > 0 {
        debug!(
            habit_id,
            excluded = log.off_cadence,
            "entries outside the cadence excluded from streaks"
        );
    }

    let mut summary = StreakSummary {
        total_completions: log.completions,
        last_completed: log.last_completed,
        ..StreakSummary::default()
    };
    let Some(first_completed) = log.first_completed else {
        return Ok(summary);
    };

    let in_progress = cadence.slot_of(horizon);
    let slots = required_periods(cadence, first_completed, horizon);
    let mut open: Option<StreakRun> = None;
    let mut segment = slots.first().map_or(0, |slot| slot.segment);

    for slot in slots {
        if slot.segment != segment {
            if let Some(run) = open.take() {
                let changed_on = cadence.segment_start(slot.segment).unwrap_or(slot.start);
                summary
                    .runs
                    .push(run.close(changed_on, BreakReason::FrequencyGap));
            }
            segment = slot.segment;
        }

        match log.outcome(&slot) {
            Some(PeriodOutcome::Satisfied) => match open.as_mut() {
                Some(run) => run.extend(slot.start),
                None => open = Some(StreakRun::open(habit_id, slot.start)),
            },
            Some(PeriodOutcome::Neutral) => {}
            None if Some(slot) == in_progress => {}
            Some(PeriodOutcome::Broken) | None => {
                if let Some(run) = open.take() {
                    summary.runs.push(run.close(slot.start, BreakReason::Missed));
                }
            }
        }
    }

    if let Some(run) = open {
        match archived_at {
            Some(date) => summary.runs.push(run.close(date, BreakReason::Archived)),
            None => {
                summary.current_streak = run.length;
                summary.runs.push(run);
            }
        }
    }

    summary.longest_streak = summary
        .runs
        .iter()
        .map(|run| run.length)
        .max()
        .unwrap_or(0);
    Ok(summary)
}
