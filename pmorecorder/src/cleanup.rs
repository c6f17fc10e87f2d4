//! Retention of old recordings
//!
//! Recordings live in one directory per day under the station directory.
//! Directories whose date is older than the retention window are removed,
//! together with stray files last modified before it. Directories that do
//! not carry a date are left alone.

use crate::constants::DATE_FORMAT;
use crate::error::{RecorderError, Result};
use chrono::{Duration, NaiveDate};
use std::fs;
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, info};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed_dirs: usize,
    pub removed_files: usize,
}

/// Removes recordings older than `days_to_keep` days before `today`.
///
/// A missing station directory is not an error.
pub fn remove_expired(station_dir: &Path, today: NaiveDate, days_to_keep: u32) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    if days_to_keep == 0 || !station_dir.is_dir() {
        return Ok(report);
    }

    let cutoff = today - Duration::days(i64::from(days_to_keep));
    let cutoff_time = SystemTime::now()
        .checked_sub(std::time::Duration::from_secs(u64::from(days_to_keep) * 86_400))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let entries = fs::read_dir(station_dir).map_err(|e| RecorderError::fs(station_dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| RecorderError::fs(station_dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| RecorderError::fs(&path, e))?;

        if file_type.is_dir() {
            let name = entry.file_name();
            let Ok(date) = NaiveDate::parse_from_str(&name.to_string_lossy(), DATE_FORMAT) else {
                debug!(path = %path.display(), "Skipping undated directory");
                continue;
            };
            if date < cutoff {
                fs::remove_dir_all(&path).map_err(|e| RecorderError::fs(&path, e))?;
                debug!(path = %path.display(), "Removed expired recordings");
                report.removed_dirs += 1;
            }
        } else if file_type.is_file() {
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .map_err(|e| RecorderError::fs(&path, e))?;
            if modified < cutoff_time {
                fs::remove_file(&path).map_err(|e| RecorderError::fs(&path, e))?;
                report.removed_files += 1;
            }
        }
    }

    if report.removed_dirs + report.removed_files > 0 {
        info!(
            dirs = report.removed_dirs,
            files = report.removed_files,
            "Removed recordings older than {} days",
            days_to_keep
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn test_removes_only_expired_dated_directories() {
        let dir = tempfile::tempdir().unwrap();
        for d in [1, 9, 10, 17] {
            let sub = dir.path().join(day(d).format(DATE_FORMAT).to_string());
            fs::create_dir_all(&sub).unwrap();
            fs::write(sub.join("01-A.wav"), b"x").unwrap();
        }
        fs::create_dir_all(dir.path().join("keep-me")).unwrap();
        fs::write(dir.path().join("fresh.log"), b"x").unwrap();

        let report = remove_expired(dir.path(), day(17), 7).unwrap();
        assert_eq!(
            report,
            CleanupReport {
                removed_dirs: 2,
                removed_files: 0
            }
        );
        assert!(!dir.path().join("2024-05-01").exists());
        assert!(!dir.path().join("2024-05-09").exists());
        assert!(dir.path().join("2024-05-10").exists());
        assert!(dir.path().join("2024-05-17").exists());
        assert!(dir.path().join("keep-me").exists());
        assert!(dir.path().join("fresh.log").exists());
    }

    #[test]
    fn test_disabled_or_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("2020-01-01")).unwrap();
        assert_eq!(remove_expired(dir.path(), day(17), 0).unwrap(), CleanupReport::default());
        assert!(dir.path().join("2020-01-01").exists());

        let missing = dir.path().join("nope");
        assert_eq!(remove_expired(&missing, day(17), 7).unwrap(), CleanupReport::default());
    }
}
