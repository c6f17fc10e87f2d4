//! Recording file lifecycle
//!
//! Each airing is captured to
//! `{save_folder}/{call_sign}/{date}/{id:02}-{title}-{date}-{start}-{end}.wav`
//! where `start` is the actual start time and `end` the scheduled end time,
//! both as `HHMM`. When the show ends the trailing `end` token is replaced
//! with the actual end time.

use crate::constants::{DATE_FORMAT, RECORDING_EXTENSION};
use crate::error::{RecorderError, Result};
use chrono::{NaiveDateTime, NaiveTime};
use pmoschedule::{hhmm, Show};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Replaces characters that are not allowed in file names
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned
    }
}

/// Directory holding every day of recordings for a station
pub fn station_dir(save_folder: &Path, call_sign: &str) -> PathBuf {
    save_folder.join(sanitize_title(call_sign))
}

/// Path of the capture file for an airing of `show` started at `started_at`
pub fn show_file_path(
    save_folder: &Path,
    call_sign: &str,
    show: &Show,
    started_at: NaiveDateTime,
) -> PathBuf {
    let date = started_at.format(DATE_FORMAT).to_string();
    let name = format!(
        "{:02}-{}-{}-{}-{}.{}",
        show.id,
        sanitize_title(&show.title),
        date,
        hhmm(started_at.time()),
        hhmm(show.end),
        RECORDING_EXTENSION
    );
    station_dir(save_folder, call_sign).join(date).join(name)
}

/// Creates the day directory and removes any file left at the target path.
pub fn prepare_show_file(
    save_folder: &Path,
    call_sign: &str,
    show: &Show,
    started_at: NaiveDateTime,
) -> Result<PathBuf> {
    let path = show_file_path(save_folder, call_sign, show, started_at);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RecorderError::fs(parent, e))?;
    }
    if path.exists() {
        warn!(path = %path.display(), "Overwriting existing recording");
        fs::remove_file(&path).map_err(|e| RecorderError::fs(&path, e))?;
    }
    debug!(path = %path.display(), "Recording file prepared");
    Ok(path)
}

/// Name of the recording once it is stamped with its actual end time
pub fn finalized_path(path: &Path, ended_at: NaiveTime) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let token = hhmm(ended_at);
    let tail = stem.len().saturating_sub(4);
    let new_stem = if stem.is_char_boundary(tail) && stem[tail..].bytes().all(|b| b.is_ascii_digit()) {
        format!("{}{}", &stem[..tail], token)
    } else {
        format!("{}-{}", stem, token)
    };
    path.with_file_name(format!("{}.{}", new_stem, RECORDING_EXTENSION))
}

/// First of `path`, `stem-2`, `stem-3`... that does not exist yet
fn unused_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    (2u32..)
        .map(|n| path.with_file_name(format!("{}-{}.{}", stem, n, RECORDING_EXTENSION)))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

/// Renames a closed recording with its actual end time.
///
/// An earlier segment already holding that name is kept; the new one gets a
/// `-2`, `-3`... suffix. Returns `Ok(None)` when nothing was recorded at `path`.
pub fn finalize_show_file(path: &Path, ended_at: NaiveTime) -> Result<Option<PathBuf>> {
    if !path.exists() {
        warn!(path = %path.display(), "No recording to finalize");
        return Ok(None);
    }
    let mut target = finalized_path(path, ended_at);
    if target != path {
        if target.exists() {
            target = unused_path(&target);
            warn!(path = %target.display(), "Segment name taken, keeping both recordings");
        }
        fs::rename(path, &target).map_err(|e| RecorderError::fs(path, e))?;
    }
    info!(path = %target.display(), "Recording finalized");
    Ok(Some(target))
}
