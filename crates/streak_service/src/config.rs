use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use streak_core::score::{DEFAULT_BASELINE_DAYS, DEFAULT_CONSISTENCY_DAYS, DEFAULT_MOMENTUM_DAYS};
use streak_core::trend::LOOKBACK_MONTH;
use streak_core::{RankingPolicy, TrendMode};
use tracing::warn;

/// Window sizes and policies used when the service computes reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub consistency_days: u32,
    pub momentum_days: u32,
    pub baseline_days: u32,
    pub trend_lookback_days: u32,
    pub trend_mode: TrendMode,
    pub ranking: RankingPolicy,
    /// Return computation errors instead of logging them and serving empty results.
    pub strict: bool,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            consistency_days: DEFAULT_CONSISTENCY_DAYS,
            momentum_days: DEFAULT_MOMENTUM_DAYS,
            baseline_days: DEFAULT_BASELINE_DAYS,
            trend_lookback_days: LOOKBACK_MONTH,
            trend_mode: TrendMode::Daily,
            ranking: RankingPolicy::Strict,
            strict: cfg!(debug_assertions),
        }
    }
}

impl AnalyticsConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self::default().apply_env())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Override fields from `STREAK_*` environment variables. Unparseable values are ignored.
    pub fn apply_env(mut self) -> Self {
        if let Some(days) = env_days("STREAK_CONSISTENCY_DAYS") {
            self.consistency_days = days;
        }
        if let Some(days) = env_days("STREAK_MOMENTUM_DAYS") {
            self.momentum_days = days;
        }
        if let Some(days) = env_days("STREAK_BASELINE_DAYS") {
            self.baseline_days = days;
        }
        if let Some(days) = env_days("STREAK_TREND_LOOKBACK_DAYS") {
            self.trend_lookback_days = days;
        }
        if let Ok(mode) = std::env::var("STREAK_TREND_MODE") {
            match mode.parse::<TrendMode>() {
                Ok(mode) => self.trend_mode = mode,
                Err(err) => warn!(%err, "ignoring STREAK_TREND_MODE"),
            }
        }
        if let Ok(ranking) = std::env::var("STREAK_RANKING") {
            match ranking.trim().to_ascii_lowercase().as_str() {
                "strict" => self.ranking = RankingPolicy::Strict,
                "shared" => self.ranking = RankingPolicy::Shared,
                other => warn!(value = other, "ignoring STREAK_RANKING"),
            }
        }
        if let Ok(strict) = std::env::var("STREAK_STRICT") {
            self.strict = matches!(
                strict.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        self
    }
}

fn env_days(name: &str) -> Option<u32> {
    let value = std::env::var(name).ok()?;
    match value.trim().parse::<u32>() {
        Ok(days) if days > 0 => Some(days),
        _ => {
            warn!(name, value = %value, "ignoring non-positive day count");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_dashboard_windows() {
        let config = AnalyticsConfig::default();
        assert_eq!(config.consistency_days, 30);
        assert_eq!(config.momentum_days, 7);
        assert_eq!(config.baseline_days, 30);
        assert_eq!(config.ranking, RankingPolicy::Strict);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analytics.json");
        std::fs::write(
            &path,
            r#"{ "trend_lookback_days": 90, "trend_mode": "weekly", "ranking": "shared" }"#,
        )
        .unwrap();
        let config = AnalyticsConfig::from_json_file(&path).unwrap();
        assert_eq!(config.trend_lookback_days, 90);
        assert_eq!(config.trend_mode, TrendMode::Weekly);
        assert_eq!(config.ranking, RankingPolicy::Shared);
        assert_eq!(config.consistency_days, 30);
    }
}
