use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use streak_core::{
    compute_habit_streaks, compute_trend, consistency_report, momentum_report,
    rank_leaderboard_at, ConsistencyReport, Habit, HabitEntry, LeaderboardEntry,
    MomentumReport, ScoreWindow, ScoredHabit, StreakSummary, TrendMode, TrendPoint,
};
use tracing::{debug, error, instrument};

use crate::config::AnalyticsConfig;
use crate::source::{DateRange, EntrySource, HabitCatalog};
use crate::store::JsonLogStore;

/// Leaderboards always compare completion rates over the same 30 days.
pub const LEADERBOARD_WINDOW_DAYS: u32 = 30;
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HabitReport {
    pub habit: Habit,
    pub as_of: NaiveDate,
    pub streaks: StreakSummary,
    pub consistency: ConsistencyReport,
    pub momentum: MomentumReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_progress: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardSnapshot {
    pub workspace_id: String,
    pub as_of: NaiveDate,
    pub habits: Vec<HabitReport>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub trend_mode: TrendMode,
    pub trend: Vec<TrendPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    habit_id: String,
    as_of: NaiveDate,
    window_days: u32,
}

#[derive(Default)]
struct ReportCache {
    generation: u64,
    reports: HashMap<CacheKey, HabitReport>,
}

impl ReportCache {
    /// Insert `report`, first evicting reports for earlier days once `capacity` is reached,
    /// and everything if that is not enough.
    fn store(&mut self, key: CacheKey, report: HabitReport, capacity: usize) {
        if capacity == 0 {
            return;
        }
        if self.reports.len() >= capacity && !self.reports.contains_key(&key) {
            let as_of = key.as_of;
            self.reports.retain(|cached, _| cached.as_of >= as_of);
            if self.reports.len() >= capacity {
                self.reports.clear();
            }
            debug!(capacity, kept = self.reports.len(), "report cache full, evicted older reports");
        }
        self.reports.insert(key, report);
    }
}

/// Computes habit analytics from an entry source, memoizing per-habit reports until
/// the source reports a new generation.
pub struct AnalyticsService {
    entries: Arc<dyn EntrySource>,
    catalog: Arc<dyn HabitCatalog>,
    config: AnalyticsConfig,
    cache: RwLock<ReportCache>,
    cache_capacity: usize,
}

pub struct AnalyticsServiceBuilder {
    roots: Vec<PathBuf>,
    config: AnalyticsConfig,
    sources: Option<(Arc<dyn EntrySource>, Arc<dyn HabitCatalog>)>,
    watch: bool,
    cache_capacity: usize,
}

impl Default for AnalyticsServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyticsServiceBuilder {
    pub fn new() -> Self {
        Self {
            roots: Vec::new(),
            config: AnalyticsConfig::default(),
            sources: None,
            watch: false,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    pub fn add_root(mut self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        if !self.roots.contains(&path) {
            self.roots.push(path);
        }
        self
    }

    pub fn with_config(mut self, config: AnalyticsConfig) -> Self {
        self.config = config;
        self
    }

    /// Use external collaborators instead of on-disk logs.
    pub fn with_sources(
        mut self,
        entries: Arc<dyn EntrySource>,
        catalog: Arc<dyn HabitCatalog>,
    ) -> Self {
        self.sources = Some((entries, catalog));
        self
    }

    pub fn with_store(self, store: Arc<JsonLogStore>) -> Self {
        let entries: Arc<dyn EntrySource> = store.clone();
        let catalog: Arc<dyn HabitCatalog> = store;
        self.with_sources(entries, catalog)
    }

    /// Upper bound on memoized reports. Zero disables memoization.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Watch the log roots and drop memoized reports when files change.
    pub fn watch(mut self, enabled: bool) -> Self {
        self.watch = enabled;
        self
    }

    pub fn build(self) -> Result<AnalyticsService> {
        let (entries, catalog) = match self.sources {
            Some(sources) => sources,
            None => {
                if self.roots.is_empty() {
                    return Err(anyhow!("no habit log roots configured"));
                }
                let mut store = JsonLogStore::open(self.roots)?;
                if self.watch {
                    store.watch()?;
                }
                let store = Arc::new(store);
                let entries: Arc<dyn EntrySource> = store.clone();
                let catalog: Arc<dyn HabitCatalog> = store;
                (entries, catalog)
            }
        };
        Ok(AnalyticsService {
            entries,
            catalog,
            config: self.config,
            cache: RwLock::new(ReportCache::default()),
            cache_capacity: self.cache_capacity,
        })
    }
}

impl AnalyticsService {
    pub fn builder() -> AnalyticsServiceBuilder {
        AnalyticsServiceBuilder::new()
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Streaks, consistency and momentum for one habit.
    pub fn habit_report(&self, habit_id: &str, as_of: NaiveDate) -> Result<HabitReport> {
        let habit = self
            .catalog
            .habit(habit_id)?
            .with_context(|| format!("unknown habit `{habit_id}`"))?;
        self.report_for(&habit, as_of, self.config.consistency_days)
    }

    #[instrument(skip(self))]
    pub fn leaderboard(&self, workspace_id: &str, as_of: NaiveDate) -> Result<Vec<LeaderboardEntry>> {
        let habits = self.catalog.habits(workspace_id)?;
        let scored = habits
            .iter()
            .filter(|habit| habit.archived_by(as_of).is_none())
            .map(|habit| {
                let report = self.report_for(habit, as_of, LEADERBOARD_WINDOW_DAYS)?;
                Ok(ScoredHabit {
                    habit: report.habit,
                    streaks: report.streaks,
                    consistency: report.consistency,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(rank_leaderboard_at(&scored, self.config.ranking, as_of))
    }

    /// Trend series for one habit, or for every habit of the workspace when `habit_id` is `None`.
    #[instrument(skip(self))]
    pub fn trend(
        &self,
        workspace_id: &str,
        habit_id: Option<&str>,
        mode: TrendMode,
        lookback_days: u32,
        as_of: NaiveDate,
    ) -> Result<Vec<TrendPoint>> {
        let range = DateRange::through(as_of);
        let entries: Vec<HabitEntry> = match habit_id {
            Some(id) => self.entries.entries(id, range)?,
            None => {
                let mut all = Vec::new();
                for habit in self.catalog.habits(workspace_id)? {
                    all.extend(self.entries.entries(&habit.id, range)?);
                }
                all
            }
        };
        let scope = habit_id.unwrap_or(workspace_id);
        self.settle(scope, "trend", compute_trend(&entries, mode, lookback_days, as_of), Vec::new)
    }

    pub fn dashboard(&self, workspace_id: &str, as_of: NaiveDate) -> Result<DashboardSnapshot> {
        let habits = self
            .catalog
            .habits(workspace_id)?
            .iter()
            .map(|habit| self.report_for(habit, as_of, self.config.consistency_days))
            .collect::<Result<Vec<_>>>()?;
        Ok(DashboardSnapshot {
            workspace_id: workspace_id.to_string(),
            as_of,
            habits,
            leaderboard: self.leaderboard(workspace_id, as_of)?,
            trend_mode: self.config.trend_mode,
            trend: self.trend(
                workspace_id,
                None,
                self.config.trend_mode,
                self.config.trend_lookback_days,
                as_of,
            )?,
        })
    }

    /// Drop every memoized report.
    pub fn invalidate(&self) {
        let mut cache = self.cache.write();
        cache.reports.clear();
    }

    pub fn cached_reports(&self) -> usize {
        self.cache.read().reports.len()
    }
}

impl AnalyticsService {
    fn report_for(&self, habit: &Habit, as_of: NaiveDate, window_days: u32) -> Result<HabitReport> {
        let key = CacheKey {
            habit_id: habit.id.clone(),
            as_of,
            window_days,
        };
        let generation = self.entries.generation();
        {
            let cache = self.cache.read();
            if cache.generation == generation {
                if let Some(report) = cache.reports.get(&key) {
                    return Ok(report.clone());
                }
            }
        }

        let entries = self.entries.entries(&habit.id, DateRange::through(as_of))?;
        let report = self.compute_report(habit, &entries, as_of, window_days)?;

        let mut cache = self.cache.write();
        if cache.generation != generation {
            debug!(from = cache.generation, to = generation, "entry log changed, dropping cached reports");
            cache.reports.clear();
            cache.generation = generation;
        }
        cache.store(key, report.clone(), self.cache_capacity);
        Ok(report)
    }

    fn compute_report(
        &self,
        habit: &Habit,
        entries: &[HabitEntry],
        as_of: NaiveDate,
        window_days: u32,
    ) -> Result<HabitReport> {
        let cadence = habit.cadence();
        let started = habit.created_on;

        let streaks = self.settle(
            &habit.id,
            "streaks",
            compute_habit_streaks(habit, entries, as_of),
            StreakSummary::default,
        )?;
        let consistency = self.settle(
            &habit.id,
            "consistency",
            consistency_report(
                entries,
                &cadence,
                ScoreWindow::new(as_of, window_days).not_before(started),
            ),
            || ConsistencyReport::empty(window_days),
        )?;
        let momentum = self.settle(
            &habit.id,
            "momentum",
            momentum_report(
                entries,
                &cadence,
                ScoreWindow::new(as_of, self.config.momentum_days).not_before(started),
                ScoreWindow::new(as_of, self.config.baseline_days).not_before(started),
            ),
            || MomentumReport::empty(self.config.momentum_days),
        )?;

        Ok(HabitReport {
            target_progress: habit.target_streak.map(|target| streaks.target_progress(target)),
            habit: habit.clone(),
            as_of,
            streaks,
            consistency,
            momentum,
        })
    }

    /// In strict mode computation errors propagate; otherwise they are logged and
    /// replaced by an empty result so dashboards keep rendering.
    fn settle<T>(
        &self,
        scope: &str,
        what: &str,
        result: streak_core::Result<T>,
        fallback: impl FnOnce() -> T,
    ) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) if self.config.strict => {
                Err(anyhow::Error::new(err).context(format!("computing {what} for `{scope}`")))
            }
            Err(err) => {
                error!(scope, what, %err, "analytics computation failed, serving empty result");
                Ok(fallback())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use streak_core::{EntryStatus, Frequency};

    #[derive(Default)]
    struct MemorySource {
        habits: Vec<Habit>,
        entries: RwLock<Vec<HabitEntry>>,
        generation: AtomicU64,
    }

    impl MemorySource {
        fn log(&self, entry: HabitEntry) {
            self.entries.write().push(entry);
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl EntrySource for MemorySource {
        fn entries(&self, habit_id: &str, range: DateRange) -> Result<Vec<HabitEntry>> {
            let mut entries: Vec<HabitEntry> = self
                .entries
                .read()
                .iter()
                .filter(|entry| entry.habit_id == habit_id && range.contains(entry.date))
                .cloned()
                .collect();
            entries.sort_by_key(|entry| entry.date);
            Ok(entries)
        }

        fn generation(&self) -> u64 {
            self.generation.load(Ordering::SeqCst)
        }
    }

    impl HabitCatalog for MemorySource {
        fn habits(&self, workspace_id: &str) -> Result<Vec<Habit>> {
            Ok(self
                .habits
                .iter()
                .filter(|habit| habit.workspace_id == workspace_id)
                .cloned()
                .collect())
        }

        fn habit(&self, habit_id: &str) -> Result<Option<Habit>> {
            Ok(self.habits.iter().find(|habit| habit.id == habit_id).cloned())
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn service(source: Arc<MemorySource>, strict: bool) -> AnalyticsService {
        let config = AnalyticsConfig {
            strict,
            ..AnalyticsConfig::default()
        };
        AnalyticsService::builder()
            .with_config(config)
            .with_sources(source.clone(), source)
            .build()
            .unwrap()
    }

    fn source_with(habits: Vec<Habit>) -> Arc<MemorySource> {
        Arc::new(MemorySource {
            habits,
            ..MemorySource::default()
        })
    }

    #[test]
    fn reports_are_memoized_until_the_log_changes() {
        let source = source_with(vec![Habit::new("read", Frequency::Daily)]);
        for d in 1..=3 {
            source.log(HabitEntry::new("read", day(d), EntryStatus::Completed));
        }
        let service = service(source.clone(), true);

        let first = service.habit_report("read", day(3)).unwrap();
        assert_eq!(first.streaks.current_streak, 3);
        assert_eq!(service.cached_reports(), 1);
        service.habit_report("read", day(3)).unwrap();
        assert_eq!(service.cached_reports(), 1);

        source.log(HabitEntry::new("read", day(4), EntryStatus::Completed));
        let refreshed = service.habit_report("read", day(4)).unwrap();
        assert_eq!(refreshed.streaks.current_streak, 4);
        assert_eq!(service.cached_reports(), 1);

        service.invalidate();
        assert_eq!(service.cached_reports(), 0);
    }

    #[test]
    fn unknown_habit_is_an_error() {
        let service = service(source_with(Vec::new()), true);
        assert!(service.habit_report("ghost", day(1)).is_err());
    }

    #[test]
    fn malformed_cadence_fails_in_strict_mode_and_degrades_otherwise() {
        let broken = Habit::new("broken", Frequency::Custom(Default::default()));
        let source = source_with(vec![broken]);
        source.log(HabitEntry::new("broken", day(2), EntryStatus::Completed));

        assert!(service(source.clone(), true).habit_report("broken", day(2)).is_err());

        let lenient = service(source, false).habit_report("broken", day(2)).unwrap();
        assert_eq!(lenient.streaks, StreakSummary::default());
        assert!(!lenient.consistency.score.has_data());
    }

    #[test]
    fn leaderboard_skips_archived_habits() {
        let mut retired = Habit::new("retired", Frequency::Daily);
        retired.archived_at = Some(day(1));
        let source = source_with(vec![
            Habit::new("read", Frequency::Daily),
            Habit::new("run", Frequency::Daily),
            retired,
        ]);
        for d in 1..=5 {
            source.log(HabitEntry::new("run", day(d), EntryStatus::Completed));
            source.log(HabitEntry::new("retired", day(d), EntryStatus::Completed));
        }
        source.log(HabitEntry::new("read", day(5), EntryStatus::Completed));

        let board = service(source, true).leaderboard("default", day(5)).unwrap();
        let ids: Vec<&str> = board.iter().map(|entry| entry.habit.id.as_str()).collect();
        assert_eq!(ids, ["run", "read"]);
        assert_eq!(board[0].current_streak, 5);
        assert_eq!(board[0].rank, 1);
    }

    #[test]
    fn historical_leaderboard_includes_habits_archived_later() {
        let mut retired = Habit::new("retired", Frequency::Daily);
        retired.archived_at = Some(day(10));
        let source = source_with(vec![retired]);
        for d in 1..=5 {
            source.log(HabitEntry::new("retired", day(d), EntryStatus::Completed));
        }
        let service = service(source, true);

        let board = service.leaderboard("default", day(5)).unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].current_streak, 5);
        assert!(service.leaderboard("default", day(12)).unwrap().is_empty());
    }

    #[test]
    fn cache_stays_bounded_without_generation_changes() {
        let source = source_with(vec![Habit::new("read", Frequency::Daily)]);
        for d in 1..=20 {
            source.log(HabitEntry::new("read", day(d), EntryStatus::Completed));
        }
        let service = AnalyticsService::builder()
            .with_sources(source.clone(), source)
            .cache_capacity(4)
            .build()
            .unwrap();

        for d in 1..=20 {
            service.habit_report("read", day(d)).unwrap();
            assert!(service.cached_reports() <= 4);
        }
        assert_eq!(service.habit_report("read", day(20)).unwrap().streaks.current_streak, 20);
    }

    #[test]
    fn dashboard_collects_every_view() {
        let mut habit = Habit::new("meditate", Frequency::Daily);
        habit.target_streak = Some(10);
        let source = source_with(vec![habit]);
        for d in 1..=5 {
            source.log(HabitEntry::new("meditate", day(d), EntryStatus::Completed));
        }
        let snapshot = service(source, true).dashboard("default", day(5)).unwrap();
        assert_eq!(snapshot.habits.len(), 1);
        assert_eq!(snapshot.habits[0].target_progress, Some(50.0));
        assert_eq!(snapshot.leaderboard.len(), 1);
        assert_eq!(snapshot.trend.len(), 30);
        assert_eq!(snapshot.trend.last().unwrap().completion_rate, Some(100.0));
    }
}
