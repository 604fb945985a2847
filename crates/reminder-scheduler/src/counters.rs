//! Daily delivery counters — persisted as `status.json`.
//! File layout: `{"YYYY-MM-DD": {"success": n, "fail": n}}`, rewritten whole on every update.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Days, Local, NaiveDate};
use reminder_core::error::{ReminderError, Result};
use serde::{Deserialize, Serialize};

/// Dates kept in the file. Older entries are dropped on write.
pub const RETAINED_DAYS: usize = 31;

/// Success and failure totals of one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCount {
    #[serde(default)]
    pub success: u64,
    #[serde(default)]
    pub fail: u64,
}

impl DayCount {
    pub fn total(&self) -> u64 {
        self.success + self.fail
    }
}

/// Process-wide delivery counters keyed by local date.
pub struct DailyCounters {
    path: PathBuf,
    lock: Mutex<()>,
}

impl DailyCounters {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Count one delivery outcome for today.
    pub fn record(&self, ok: bool) -> Result<()> {
        self.record_on(Local::now().date_naive(), ok)
    }

    /// Count one delivery outcome for `date`.
    pub fn record_on(&self, date: NaiveDate, ok: bool) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| ReminderError::Internal(format!("counters lock poisoned: {e}")))?;

        let mut data = self.load();
        let entry = data.entry(date_key(date)).or_default();
        if ok {
            entry.success += 1;
        } else {
            entry.fail += 1;
        }
        while data.len() > RETAINED_DAYS {
            data.pop_first();
        }
        self.save(&data)
    }

    pub fn counts_on(&self, date: NaiveDate) -> DayCount {
        self.load().get(&date_key(date)).copied().unwrap_or_default()
    }

    pub fn today(&self) -> DayCount {
        self.counts_on(Local::now().date_naive())
    }

    pub fn yesterday(&self) -> DayCount {
        let today = Local::now().date_naive();
        today
            .checked_sub_days(Days::new(1))
            .map(|d| self.counts_on(d))
            .unwrap_or_default()
    }

    fn load(&self) -> BTreeMap<String, DayCount> {
        if !self.path.exists() {
            return BTreeMap::new();
        }
        match std::fs::read_to_string(&self.path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("⚠️ Failed to parse {}: {e}", self.path.display());
                BTreeMap::new()
            }),
            Err(e) => {
                tracing::warn!("⚠️ Failed to read {}: {e}", self.path.display());
                BTreeMap::new()
            }
        }
    }

    fn save(&self, data: &BTreeMap<String, DayCount>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> (PathBuf, DailyCounters) {
        let dir = std::env::temp_dir().join(name);
        std::fs::remove_dir_all(&dir).ok();
        let counters = DailyCounters::new(&dir.join("status.json"));
        (dir, counters)
    }

    #[test]
    fn test_record_and_read_today() {
        let (dir, counters) = scratch("rover-reminder-test-counters");
        counters.record(true).unwrap();
        counters.record(true).unwrap();
        counters.record(false).unwrap();

        let today = counters.today();
        assert_eq!(today, DayCount { success: 2, fail: 1 });
        assert_eq!(today.total(), 3);
        assert_eq!(counters.yesterday(), DayCount::default());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_file_layout() {
        let (dir, counters) = scratch("rover-reminder-test-counters-layout");
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        counters.record_on(date, false).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(counters.path()).unwrap()).unwrap();
        assert_eq!(raw["2025-03-14"]["success"], 0);
        assert_eq!(raw["2025-03-14"]["fail"], 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_retention_drops_oldest() {
        let (dir, counters) = scratch("rover-reminder-test-counters-retention");
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        for i in 0..40u64 {
            let date = start.checked_add_days(Days::new(i)).unwrap();
            counters.record_on(date, true).unwrap();
        }

        assert_eq!(counters.load().len(), RETAINED_DAYS);
        assert_eq!(counters.counts_on(start), DayCount::default());
        let last = start.checked_add_days(Days::new(39)).unwrap();
        assert_eq!(counters.counts_on(last).success, 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_corrupt_file_starts_fresh() {
        let (dir, counters) = scratch("rover-reminder-test-counters-corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(counters.path(), "not json").unwrap();

        counters.record(true).unwrap();
        assert_eq!(counters.today().success, 1);
        std::fs::remove_dir_all(&dir).ok();
    }
}
