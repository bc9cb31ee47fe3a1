use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use streak_core::habit::normalize_entries;
use streak_core::{Habit, HabitEntry};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::source::{DateRange, EntrySource, HabitCatalog};

/// On-disk shape of one habit and its check-ins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HabitLog {
    pub habit: Habit,
    #[serde(default)]
    pub entries: Vec<HabitEntry>,
}

/// Habit logs stored as `*.json` files under one or more roots.
pub struct JsonLogStore {
    roots: Vec<PathBuf>,
    logs: RwLock<HashMap<PathBuf, HabitLog>>,
    generation: Arc<AtomicU64>,
    dirty: Arc<AtomicBool>,
    watcher: Option<RecommendedWatcher>,
}

impl JsonLogStore {
    pub fn open(roots: impl IntoIterator<Item = PathBuf>) -> Result<Self> {
        let mut unique: Vec<PathBuf> = Vec::new();
        for root in roots {
            if !unique.contains(&root) {
                unique.push(root);
            }
        }
        let store = Self {
            roots: unique,
            logs: RwLock::new(HashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
            dirty: Arc::new(AtomicBool::new(false)),
            watcher: None,
        };
        store.reload_all()?;
        Ok(store)
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn reload_all(&self) -> Result<()> {
        let mut logs = self.logs.write();
        logs.clear();
        for root in &self.roots {
            Self::ingest_root(&mut logs, root)?;
        }
        self.dirty.store(false, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        info!(roots = self.roots.len(), logs = logs.len(), "habit logs loaded");
        Ok(())
    }

    pub fn list_logs(&self) -> Vec<PathBuf> {
        self.refresh_if_dirty();
        let mut paths: Vec<PathBuf> = self.logs.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Write a new log file for `habit`. Fails if the habit id is already known.
    pub fn create_log(&self, path: impl AsRef<Path>, habit: Habit) -> Result<()> {
        self.refresh_if_dirty();
        let path_buf = path.as_ref().to_path_buf();
        let mut logs = self.logs.write();
        if logs.values().any(|log| log.habit.id == habit.id) {
            return Err(anyhow!("habit `{}` already has a log", habit.id));
        }
        let log = HabitLog {
            habit,
            entries: Vec::new(),
        };
        Self::write_log(&path_buf, &log)?;
        logs.insert(path_buf, log);
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Insert or replace the entry for (habit, date) and persist the log.
    pub fn upsert_entry(&self, entry: HabitEntry) -> Result<()> {
        self.refresh_if_dirty();
        let mut logs = self.logs.write();
        let (path, log) = logs
            .iter_mut()
            .find(|(_, log)| log.habit.id == entry.habit_id)
            .ok_or_else(|| anyhow!("no log for habit `{}`", entry.habit_id))?;

        match log
            .entries
            .binary_search_by(|existing| existing.date.cmp(&entry.date))
        {
            Ok(idx) => log.entries[idx] = entry,
            Err(idx) => log.entries.insert(idx, entry),
        }
        Self::write_log(path, log)?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn watch(&mut self) -> Result<()> {
        if self.watcher.is_some() {
            return Ok(());
        }
        let generation = Arc::clone(&self.generation);
        let dirty = Arc::clone(&self.dirty);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if event.paths.iter().any(|path| Self::is_log_file(path)) {
                    debug!(?event, "habit log change detected");
                    dirty.store(true, Ordering::SeqCst);
                    generation.fetch_add(1, Ordering::SeqCst);
                }
            }
        })?;
        for root in &self.roots {
            let mode = if root.is_file() {
                RecursiveMode::NonRecursive
            } else {
                RecursiveMode::Recursive
            };
            watcher.watch(root, mode)?;
        }
        self.watcher = Some(watcher);
        Ok(())
    }

    fn refresh_if_dirty(&self) {
        if self.dirty.swap(false, Ordering::SeqCst) {
            if let Err(err) = self.reload_all() {
                warn!(%err, "failed to reload habit logs after change");
            }
        }
    }

    fn ingest_root(logs: &mut HashMap<PathBuf, HabitLog>, path: &Path) -> Result<()> {
        if path.is_file() {
            if Self::is_log_file(path) {
                Self::ingest_file(logs, path);
            }
            return Ok(());
        }

        if path.is_dir() {
            for entry in WalkDir::new(path) {
                let entry = entry?;
                if entry.file_type().is_file() && Self::is_log_file(entry.path()) {
                    Self::ingest_file(logs, entry.path());
                }
            }
        }
        Ok(())
    }

    fn ingest_file(logs: &mut HashMap<PathBuf, HabitLog>, path: &Path) {
        match Self::read_log(path) {
            Ok(log) => {
                logs.insert(path.to_path_buf(), log);
            }
            Err(err) => {
                warn!(path = %path.display(), err = %format!("{err:#}"), "skipping unreadable habit log");
            }
        }
    }

    fn read_log(path: &Path) -> Result<HabitLog> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut log: HabitLog = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;
        log.habit.cadence().validate()?;

        let foreign = log
            .entries
            .iter()
            .filter(|entry| entry.habit_id != log.habit.id)
            .count();
        if foreign > 0 {
            warn!(path = %path.display(), foreign, "dropping entries logged for another habit");
            let habit_id = log.habit.id.clone();
            log.entries.retain(|entry| entry.habit_id == habit_id);
        }

        let clamped = log
            .entries
            .iter_mut()
            .map(HabitEntry::clamp_ratings)
            .filter(|changed| *changed)
            .count();
        if clamped > 0 {
            warn!(path = %path.display(), clamped, "clamped out-of-range mood or energy ratings");
        }

        let before = log.entries.len();
        log.entries = normalize_entries(&log.entries);
        if log.entries.len() != before {
            warn!(
                path = %path.display(),
                duplicates = before - log.entries.len(),
                "collapsed duplicate entries for the same day"
            );
        }
        Ok(log)
    }

    fn write_log(path: &Path, log: &HabitLog) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let payload = serde_json::to_string_pretty(log)?;
        fs::write(path, payload).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    fn is_log_file(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false)
    }
}

impl EntrySource for JsonLogStore {
    fn entries(&self, habit_id: &str, range: DateRange) -> Result<Vec<HabitEntry>> {
        self.refresh_if_dirty();
        let logs = self.logs.read();
        let entries = logs
            .values()
            .filter(|log| log.habit.id == habit_id)
            .flat_map(|log| log.entries.iter())
            .filter(|entry| range.contains(entry.date))
            .cloned()
            .collect();
        Ok(entries)
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl HabitCatalog for JsonLogStore {
    fn habits(&self, workspace_id: &str) -> Result<Vec<Habit>> {
        self.refresh_if_dirty();
        let mut habits: Vec<Habit> = self
            .logs
            .read()
            .values()
            .filter(|log| log.habit.workspace_id == workspace_id)
            .map(|log| log.habit.clone())
            .collect();
        habits.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(habits)
    }

    fn habit(&self, habit_id: &str) -> Result<Option<Habit>> {
        self.refresh_if_dirty();
        Ok(self
            .logs
            .read()
            .values()
            .find(|log| log.habit.id == habit_id)
            .map(|log| log.habit.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use streak_core::{EntryStatus, Frequency};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
    }

    #[test]
    fn upsert_replaces_the_entry_for_the_same_day() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLogStore::open([dir.path().to_path_buf()]).unwrap();
        store
            .create_log(dir.path().join("read.json"), Habit::new("read", Frequency::Daily))
            .unwrap();

        store
            .upsert_entry(HabitEntry::new("read", day(2), EntryStatus::Missed))
            .unwrap();
        store
            .upsert_entry(HabitEntry::new("read", day(1), EntryStatus::Completed))
            .unwrap();
        store
            .upsert_entry(HabitEntry::new("read", day(2), EntryStatus::Completed))
            .unwrap();

        let entries = store
            .entries("read", DateRange::through(day(31)))
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].date, day(1));
        assert_eq!(entries[1].status, EntryStatus::Completed);

        let reopened = JsonLogStore::open([dir.path().to_path_buf()]).unwrap();
        assert_eq!(
            reopened
                .entries("read", DateRange::new(day(2), day(2)))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn upsert_bumps_generation() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLogStore::open([dir.path().to_path_buf()]).unwrap();
        store
            .create_log(dir.path().join("run.json"), Habit::new("run", Frequency::Weekly))
            .unwrap();
        let before = store.generation();
        store
            .upsert_entry(HabitEntry::new("run", day(5), EntryStatus::Completed))
            .unwrap();
        assert!(store.generation() > before);
    }

    #[test]
    fn unknown_habit_cannot_be_logged() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLogStore::open([dir.path().to_path_buf()]).unwrap();
        assert!(store
            .upsert_entry(HabitEntry::new("ghost", day(1), EntryStatus::Completed))
            .is_err());
    }

    #[test]
    fn out_of_range_ratings_are_clamped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("walk.json"),
            r#"{
  "habit": { "id": "walk", "frequency": "daily" },
  "entries": [
    { "habit_id": "walk", "date": "2025-05-01", "status": "completed", "mood": 9, "energy_level": 0 },
    { "habit_id": "walk", "date": "2025-05-02", "status": "completed", "mood": 3, "energy_level": 200 }
  ]
}"#,
        )
        .unwrap();
        let store = JsonLogStore::open([dir.path().to_path_buf()]).unwrap();
        let entries = store.entries("walk", DateRange::through(day(31))).unwrap();
        assert_eq!(entries[0].mood, Some(5));
        assert_eq!(entries[0].energy_level, Some(1));
        assert_eq!(entries[1].mood, Some(3));
        assert_eq!(entries[1].energy_level, Some(10));
    }

    #[test]
    fn malformed_logs_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        fs::write(
            dir.path().join("empty_custom.json"),
            r#"{ "habit": { "id": "x", "frequency": { "custom": [] } } }"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let store = JsonLogStore::open([dir.path().to_path_buf()]).unwrap();
        assert!(store.list_logs().is_empty());
    }
}
