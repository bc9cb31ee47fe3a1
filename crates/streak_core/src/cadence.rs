//! Cadence periods: the unit of time a habit's frequency declares as due.
//!
//! A period is identified by its first day. Daily periods are single days,
//! weekly periods are ISO weeks starting on Monday, and custom periods are
//! single days whose weekday belongs to the habit's set.

use std::collections::BTreeMap;

use chrono::{Datelike, Days, Duration, NaiveDate};

use crate::habit::{weekday_of, Cadence, EntryStatus, Frequency, HabitEntry};

impl Frequency {
    /// First day of the period containing `date`, if `date` is covered by this cadence.
    pub fn period_of(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Frequency::Daily => Some(date),
            Frequency::Weekly => Some(week_start(date)),
            Frequency::Custom(days) => days.contains(weekday_of(date)).then_some(date),
        }
    }

    /// First day of the period following the one starting at `start`.
    pub fn next_period(&self, start: NaiveDate) -> NaiveDate {
        match self {
            Frequency::Daily => start + Duration::days(1),
            Frequency::Weekly => start + Duration::days(7),
            Frequency::Custom(days) => {
                let mut candidate = start + Duration::days(1);
                for _ in 0..7 {
                    if days.contains(weekday_of(candidate)) {
                        return candidate;
                    }
                    candidate += Duration::days(1);
                }
                // Empty set: no later period exists inside a week.
                candidate
            }
        }
    }

    /// The earliest period that overlaps `date` or starts after it.
    pub fn first_period_touching(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Frequency::Daily | Frequency::Weekly => self.period_of(date),
            Frequency::Custom(days) => (0..7)
                .map(|offset| date + Duration::days(offset))
                .find(|candidate| days.contains(weekday_of(*candidate))),
        }
    }

    /// Last day of the period starting at `start`.
    pub fn period_end(&self, start: NaiveDate) -> NaiveDate {
        match self {
            Frequency::Weekly => start + Duration::days(6),
            Frequency::Daily | Frequency::Custom(_) => start,
        }
    }
}

pub fn week_start(date: NaiveDate) -> NaiveDate {
    date.checked_sub_days(Days::new(u64::from(date.weekday().num_days_from_monday())))
        .unwrap_or(NaiveDate::MIN)
}

/// First day of the `days`-long span ending on `as_of`, `None` if it predates the calendar.
pub(crate) fn trailing_start(as_of: NaiveDate, days: u32) -> Option<NaiveDate> {
    as_of.checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
}

/// A cadence period tagged with the cadence segment it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeriodSlot {
    pub segment: usize,
    pub start: NaiveDate,
}

impl Cadence {
    pub fn slot_of(&self, date: NaiveDate) -> Option<PeriodSlot> {
        let segment = self.segment_at(date);
        self.frequency_of_segment(segment)
            .period_of(date)
            .map(|start| PeriodSlot { segment, start })
    }
}

/// Enumerate the periods due between `from` and `to` (inclusive), crossing cadence changes.
pub fn required_periods(cadence: &Cadence, from: NaiveDate, to: NaiveDate) -> Vec<PeriodSlot> {
    let mut slots = Vec::new();
    if from > to {
        return slots;
    }

    let mut segment = cadence.segment_at(from);
    loop {
        let frequency = cadence.frequency_of_segment(segment);
        let seg_from = cadence
            .segment_start(segment)
            .map_or(from, |start| start.max(from));
        let seg_to = cadence.segment_end(segment).map_or(to, |end| end.min(to));

        if seg_from <= seg_to {
            if let Some(mut start) = frequency.first_period_touching(seg_from) {
                while start <= seg_to {
                    slots.push(PeriodSlot { segment, start });
                    start = frequency.next_period(start);
                }
            }
        }

        match cadence.segment_end(segment) {
            Some(end) if end < to => segment += 1,
            _ => break,
        }
    }

    slots
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PeriodState {
    completed: bool,
    missed: bool,
    skipped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PeriodOutcome {
    Satisfied,
    Neutral,
    Broken,
}

impl PeriodState {
    fn record(&mut self, status: EntryStatus) {
        match status {
            EntryStatus::Completed => self.completed = true,
            EntryStatus::Missed => self.missed = true,
            EntryStatus::Skipped => self.skipped = true,
        }
    }

    pub(crate) fn outcome(&self) -> PeriodOutcome {
        if self.completed {
            PeriodOutcome::Satisfied
        } else if self.missed {
            PeriodOutcome::Broken
        } else {
            PeriodOutcome::Neutral
        }
    }
}

/// Entries folded into their cadence periods, up to a horizon date.
#[derive(Debug, Default)]
pub(crate) struct PeriodLog {
    pub(crate) states: BTreeMap<PeriodSlot, PeriodState>,
    /// Dates of cadence-valid entries, in order.
    observed: Vec<NaiveDate>,
    pub(crate) first_completed: Option<NaiveDate>,
    pub(crate) last_completed: Option<NaiveDate>,
    pub(crate) completions: u32,
    pub(crate) off_cadence: usize,
}

impl PeriodLog {
    pub(crate) fn collect(entries: &[HabitEntry], cadence: &Cadence, horizon: NaiveDate) -> Self {
        Self::collect_within(entries, cadence, NaiveDate::MIN, horizon)
    }

    /// Like [`PeriodLog::collect`], ignoring entries dated before `from`.
    pub(crate) fn collect_within(
        entries: &[HabitEntry],
        cadence: &Cadence,
        from: NaiveDate,
        horizon: NaiveDate,
    ) -> Self {
        let mut log = PeriodLog::default();
        for entry in entries
            .iter()
            .filter(|entry| entry.date >= from && entry.date <= horizon)
        {
            let Some(slot) = cadence.slot_of(entry.date) else {
                log.off_cadence += 1;
                continue;
            };
            log.states.entry(slot).or_default().record(entry.status);
            log.observed.push(entry.date);
            if entry.is_completed() {
                log.completions += 1;
                log.first_completed = Some(
                    log.first_completed
                        .map_or(entry.date, |first| first.min(entry.date)),
                );
                log.last_completed = Some(
                    log.last_completed
                        .map_or(entry.date, |last| last.max(entry.date)),
                );
            }
        }
        log.observed.sort();
        log
    }

    pub(crate) fn first_observed(&self) -> Option<NaiveDate> {
        self.observed.first().copied()
    }

    pub(crate) fn observed_between(&self, from: NaiveDate, to: NaiveDate) -> u32 {
        self.observed
            .iter()
            .filter(|date| **date >= from && **date <= to)
            .count() as u32
    }

    pub(crate) fn outcome(&self, slot: &PeriodSlot) -> Option<PeriodOutcome> {
        self.states.get(slot).map(PeriodState::outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::habit::CadenceChange;
    use chrono::Weekday;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn weekly_periods_start_on_iso_monday() {
        // 2025-01-01 is a Wednesday in ISO week 1, which starts on 2024-12-30.
        assert_eq!(
            Frequency::Weekly.period_of(date(2025, 1, 1)),
            Some(date(2024, 12, 30))
        );
        assert_eq!(
            Frequency::Weekly.next_period(date(2024, 12, 30)),
            date(2025, 1, 6)
        );
        assert_eq!(
            Frequency::Weekly.period_end(date(2024, 12, 30)),
            date(2025, 1, 5)
        );
    }

    #[test]
    fn custom_periods_skip_disallowed_weekdays() {
        let frequency = Frequency::custom([Weekday::Mon, Weekday::Fri]).unwrap();
        // 2025-03-04 is a Tuesday.
        assert_eq!(frequency.period_of(date(2025, 3, 4)), None);
        assert_eq!(
            frequency.first_period_touching(date(2025, 3, 4)),
            Some(date(2025, 3, 7))
        );
        assert_eq!(frequency.next_period(date(2025, 3, 7)), date(2025, 3, 10));
    }

    #[test]
    fn required_periods_cross_cadence_changes() {
        let cadence = Cadence::new(
            Frequency::Daily,
            vec![CadenceChange {
                effective_from: date(2025, 3, 5),
                frequency: Frequency::Weekly,
            }],
        );
        let slots = required_periods(&cadence, date(2025, 3, 3), date(2025, 3, 16));
        let daily: Vec<_> = slots.iter().filter(|slot| slot.segment == 0).collect();
        let weekly: Vec<_> = slots.iter().filter(|slot| slot.segment == 1).collect();
        assert_eq!(daily.len(), 2);
        assert_eq!(weekly.len(), 2);
        assert_eq!(weekly[0].start, date(2025, 3, 3));
        assert_eq!(weekly[1].start, date(2025, 3, 10));
        assert!(slots.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn empty_range_has_no_periods() {
        let cadence = Cadence::from(Frequency::Daily);
        assert!(required_periods(&cadence, date(2025, 3, 5), date(2025, 3, 4)).is_empty());
    }
}
