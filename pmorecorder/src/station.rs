//! Station descriptor

use crate::error::{RecorderError, Result};
use crate::playlist::load_playlist;
use pmoschedule::{Schedule, Show};
use pmostream::StreamError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Station {
    pub name: String,
    pub call_sign: String,
    pub genre: String,
    pub location: String,
    /// Stream URLs in priority order
    pub playlist: Vec<String>,
    /// `.pls` / `.m3u` file replacing `playlist` when set
    pub playlist_file: Option<PathBuf>,
    pub shows: Vec<Show>,
}

impl Station {
    /// Stream URLs to try, in order. A relative playlist file is resolved
    /// against `base_dir`.
    pub fn source_urls(&self, base_dir: &Path) -> Result<Vec<String>> {
        let urls = match &self.playlist_file {
            Some(file) => load_playlist(&base_dir.join(file))?,
            None => self.playlist.clone(),
        };
        if urls.is_empty() {
            return Err(RecorderError::Stream(StreamError::NoSource));
        }
        Ok(urls)
    }

    pub fn schedule(&self) -> Result<Schedule> {
        Ok(Schedule::new(self.shows.clone())?)
    }

    /// Identifier used for the station's recording directory
    pub fn directory_name(&self) -> &str {
        if self.call_sign.trim().is_empty() {
            &self.name
        } else {
            &self.call_sign
        }
    }
}
