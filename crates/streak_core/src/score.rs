//! Consistency and momentum scores.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::cadence::{required_periods, trailing_start, PeriodLog, PeriodOutcome};
use crate::error::{AnalyticsError, Result};
use crate::habit::{Cadence, HabitEntry};

pub const DEFAULT_CONSISTENCY_DAYS: u32 = 30;
pub const DEFAULT_MOMENTUM_DAYS: u32 = 7;
pub const DEFAULT_BASELINE_DAYS: u32 = 30;

const RATE_WEIGHT: f64 = 0.7;
const STABILITY_WEIGHT: f64 = 0.3;
/// Points of difference between momentum and baseline rate treated as a change in direction.
const DIRECTION_THRESHOLD: f64 = 10.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreResult {
    pub value: u8,
    pub window_days: u32,
    /// Entries that informed the score; zero means there was nothing to score.
    pub sample_size: u32,
}

impl ScoreResult {
    pub fn empty(window_days: u32) -> Self {
        Self {
            value: 0,
            window_days,
            sample_size: 0,
        }
    }

    pub fn has_data(&self) -> bool {
        self.sample_size > 0
    }
}

/// A trailing window of `days` calendar days ending on `as_of`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreWindow {
    pub as_of: NaiveDate,
    pub days: u32,
    /// First day the habit existed; days before it are never required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<NaiveDate>,
}

impl ScoreWindow {
    pub fn new(as_of: NaiveDate, days: u32) -> Self {
        Self {
            as_of,
            days,
            not_before: None,
        }
    }

    pub fn not_before(mut self, date: Option<NaiveDate>) -> Self {
        self.not_before = date;
        self
    }

    /// First day of the window, `NaiveDate::MIN` when the window reaches past the calendar.
    pub fn start(&self) -> NaiveDate {
        trailing_start(self.as_of, self.days).unwrap_or(NaiveDate::MIN)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.days == 0 {
            return Err(AnalyticsError::zero_window(name));
        }
        if trailing_start(self.as_of, self.days).is_none() {
            return Err(AnalyticsError::window_too_long(name, self.days));
        }
        Ok(())
    }

    /// Start of the window clipped to the habit's first day.
    fn effective_start(&self, log: &PeriodLog) -> Option<NaiveDate> {
        let habit_start = self.not_before.or_else(|| log.first_observed())?;
        Some(self.start().max(habit_start))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConsistencyReport {
    pub score: ScoreResult,
    /// Satisfied share of required periods, 0–100.
    pub completion_rate: f64,
    /// Evenness of completions across the window, 0–1.
    pub stability: f64,
    pub required_periods: u32,
    pub satisfied_periods: u32,
}

impl ConsistencyReport {
    pub fn empty(window_days: u32) -> Self {
        Self {
            score: ScoreResult::empty(window_days),
            completion_rate: 0.0,
            stability: 0.0,
            required_periods: 0,
            satisfied_periods: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MomentumDirection {
    Rising,
    Steady,
    Falling,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MomentumReport {
    pub score: ScoreResult,
    /// Unweighted completion rate over the baseline window, 0–100.
    pub baseline_rate: f64,
    pub direction: MomentumDirection,
}

impl MomentumReport {
    pub fn empty(window_days: u32) -> Self {
        Self {
            score: ScoreResult::empty(window_days),
            baseline_rate: 0.0,
            direction: MomentumDirection::Steady,
        }
    }
}

pub fn compute_consistency(
    entries: &[HabitEntry],
    cadence: &Cadence,
    window: ScoreWindow,
) -> Result<ScoreResult> {
    consistency_report(entries, cadence, window).map(|report| report.score)
}

/// Blend of completion rate (70%) and distribution evenness (30%) over the window.
pub fn consistency_report(
    entries: &[HabitEntry],
    cadence: &Cadence,
    window: ScoreWindow,
) -> Result<ConsistencyReport> {
    window.validate("consistency window")?;
    cadence.validate()?;

    let log = PeriodLog::collect(entries, cadence, window.as_of);
    let Some(start) = window.effective_start(&log) else {
        return Ok(ConsistencyReport::empty(window.days));
    };
    let log = PeriodLog::collect_within(entries, cadence, start, window.as_of);
    let outcomes = window_outcomes(&log, cadence, start, window.as_of);
    if outcomes.is_empty() {
        return Ok(ConsistencyReport::empty(window.days));
    }

    let satisfied: Vec<bool> = outcomes.iter().map(|(_, satisfied)| *satisfied).collect();
    let required = satisfied.len() as u32;
    let completed = satisfied.iter().filter(|hit| **hit).count() as u32;
    let rate = f64::from(completed) / f64::from(required);
    let stability = stability(&satisfied);
    let value = to_score(RATE_WEIGHT * rate + STABILITY_WEIGHT * stability);

    Ok(ConsistencyReport {
        score: ScoreResult {
            value,
            window_days: window.days,
            sample_size: log.observed_between(start, window.as_of),
        },
        completion_rate: rate * 100.0,
        stability,
        required_periods: required,
        satisfied_periods: completed,
    })
}

pub fn compute_momentum(
    entries: &[HabitEntry],
    cadence: &Cadence,
    short: ScoreWindow,
    baseline: ScoreWindow,
) -> Result<ScoreResult> {
    momentum_report(entries, cadence, short, baseline).map(|report| report.score)
}

/// Recency-weighted completion rate over the short window. Weights grow linearly
/// from 1 on the oldest day of the window to 2 on `as_of`.
pub fn momentum_report(
    entries: &[HabitEntry],
    cadence: &Cadence,
    short: ScoreWindow,
    baseline: ScoreWindow,
) -> Result<MomentumReport> {
    short.validate("momentum window")?;
    baseline.validate("baseline window")?;
    if short.days > baseline.days {
        return Err(AnalyticsError::InvalidWindow(format!(
            "momentum window ({} days) is longer than its baseline ({} days)",
            short.days, baseline.days
        )));
    }
    if short.as_of != baseline.as_of {
        return Err(AnalyticsError::InvalidWindow(
            "momentum and baseline windows must end on the same day".to_string(),
        ));
    }
    cadence.validate()?;

    let log = PeriodLog::collect(entries, cadence, baseline.as_of);
    let Some(baseline_start) = baseline.effective_start(&log) else {
        return Ok(MomentumReport::empty(short.days));
    };
    let log = PeriodLog::collect_within(entries, cadence, baseline_start, baseline.as_of);
    let sample_size = log.observed_between(baseline_start, baseline.as_of);
    if sample_size == 0 {
        return Ok(MomentumReport::empty(short.days));
    }

    let baseline_outcomes = window_outcomes(&log, cadence, baseline_start, baseline.as_of);
    let baseline_rate = if baseline_outcomes.is_empty() {
        0.0
    } else {
        let hits = baseline_outcomes.iter().filter(|(_, hit)| *hit).count();
        hits as f64 / baseline_outcomes.len() as f64 * 100.0
    };

    let window_start = short.start();
    let span = f64::from(short.days.saturating_sub(1));
    let short_start = window_start.max(baseline_start);
    let short_log = PeriodLog::collect_within(entries, cadence, short_start, short.as_of);
    let mut weighted_hits = 0.0;
    let mut total_weight = 0.0;
    for (day, satisfied) in window_outcomes(&short_log, cadence, short_start, short.as_of) {
        let offset = (day.max(window_start) - window_start).num_days() as f64;
        let weight = if span == 0.0 { 2.0 } else { 1.0 + offset / span };
        total_weight += weight;
        if satisfied {
            weighted_hits += weight;
        }
    }
    let rate = if total_weight > 0.0 {
        weighted_hits / total_weight
    } else {
        0.0
    };

    let value = to_score(rate);
    let delta = f64::from(value) - baseline_rate;
    let direction = if delta > DIRECTION_THRESHOLD {
        MomentumDirection::Rising
    } else if delta < -DIRECTION_THRESHOLD {
        MomentumDirection::Falling
    } else {
        MomentumDirection::Steady
    };

    Ok(MomentumReport {
        score: ScoreResult {
            value,
            window_days: short.days,
            sample_size,
        },
        baseline_rate,
        direction,
    })
}

/// Required periods between `start` and `as_of` paired with whether each was satisfied.
/// Skipped periods and an unlogged in-progress period are not required, nor is a
/// period that began before `start` unless an entry inside the window judges it.
/// `log` must only hold entries dated on or after `start`.
fn window_outcomes(
    log: &PeriodLog,
    cadence: &Cadence,
    start: NaiveDate,
    as_of: NaiveDate,
) -> Vec<(NaiveDate, bool)> {
    let in_progress = cadence.slot_of(as_of);
    required_periods(cadence, start, as_of)
        .into_iter()
        .filter_map(|slot| match log.outcome(&slot) {
            Some(PeriodOutcome::Satisfied) => Some((slot.start, true)),
            Some(PeriodOutcome::Neutral) => None,
            None if Some(slot) == in_progress || slot.start < start => None,
            Some(PeriodOutcome::Broken) | None => Some((slot.start, false)),
        })
        .collect()
}

/// `1 - cv` of the gaps between completions, including the leading and trailing gaps.
fn stability(satisfied: &[bool]) -> f64 {
    let positions: Vec<usize> = satisfied
        .iter()
        .enumerate()
        .filter_map(|(idx, hit)| hit.then_some(idx))
        .collect();
    if positions.is_empty() {
        return 0.0;
    }

    let mut gaps = Vec::with_capacity(positions.len() + 1);
    let mut previous: isize = -1;
    for &position in &positions {
        gaps.push((position as isize - previous) as f64);
        previous = position as isize;
    }
    gaps.push((satisfied.len() as isize - previous) as f64);

    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    let variance = gaps.iter().map(|gap| (gap - mean).powi(2)).sum::<f64>() / gaps.len() as f64;
    let cv = variance.sqrt() / mean;
    1.0 - cv.min(1.0)
}

fn to_score(fraction: f64) -> u8 {
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}
