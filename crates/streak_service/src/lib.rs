pub mod config;
pub mod service;
pub mod source;
pub mod store;

pub use crate::config::AnalyticsConfig;
pub use crate::service::{
    AnalyticsService, AnalyticsServiceBuilder, DashboardSnapshot, HabitReport,
    DEFAULT_CACHE_CAPACITY, LEADERBOARD_WINDOW_DAYS,
};
pub use crate::source::{DateRange, EntrySource, HabitCatalog};
pub use crate::store::{HabitLog, JsonLogStore};
