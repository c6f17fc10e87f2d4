//! `.pls` and `.m3u` playlist files listing a station's stream URLs

use crate::error::{RecorderError, Result};
use std::fs;
use std::path::Path;

/// URLs from a `.pls` file (`FileN=url` entries, in `N` order)
pub fn parse_pls(content: &str) -> Vec<String> {
    let mut entries: Vec<(u32, String)> = content
        .lines()
        .filter_map(|line| {
            let (key, value) = line.trim().split_once('=')?;
            let key = key.trim();
            if key.len() <= 4 || !key[..4].eq_ignore_ascii_case("file") {
                return None;
            }
            let index = key[4..].parse::<u32>().ok()?;
            let url = value.trim();
            (!url.is_empty()).then(|| (index, url.to_string()))
        })
        .collect();
    entries.sort_by_key(|(index, _)| *index);
    entries.into_iter().map(|(_, url)| url).collect()
}

/// URLs from an `.m3u` file (every non-comment line)
pub fn parse_m3u(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Reads a playlist file, choosing the parser from its extension.
pub fn load_playlist(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| RecorderError::fs(path, e))?;
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    let urls = match extension.as_str() {
        "pls" => parse_pls(&content),
        "m3u" | "m3u8" => parse_m3u(&content),
        other => {
            return Err(RecorderError::Playlist(format!(
                "unsupported playlist format '{}': {}",
                other,
                path.display()
            )))
        }
    };

    if urls.is_empty() {
        return Err(RecorderError::Playlist(format!(
            "no stream URL in {}",
            path.display()
        )));
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pls() {
        let pls = "[playlist]\nNumberOfEntries=2\nFile2=http://b.example/live\nTitle1=Main\nFile1=http://a.example/live\nLength1=-1\nVersion=2\n";
        assert_eq!(
            parse_pls(pls),
            vec!["http://a.example/live", "http://b.example/live"]
        );
    }

    #[test]
    fn test_parse_m3u() {
        let m3u = "#EXTM3U\n#EXTINF:-1,Station\nhttp://a.example/live\n\n  http://b.example/live  \n";
        assert_eq!(
            parse_m3u(m3u),
            vec!["http://a.example/live", "http://b.example/live"]
        );
    }

    #[test]
    fn test_load_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let pls = dir.path().join("station.PLS");
        fs::write(&pls, "[playlist]\nFile1=http://a.example/live\n").unwrap();
        assert_eq!(load_playlist(&pls).unwrap(), vec!["http://a.example/live"]);

        let empty = dir.path().join("empty.m3u");
        fs::write(&empty, "#EXTM3U\n").unwrap();
        assert!(matches!(load_playlist(&empty), Err(RecorderError::Playlist(_))));

        let other = dir.path().join("urls.txt");
        fs::write(&other, "http://a.example/live\n").unwrap();
        assert!(matches!(load_playlist(&other), Err(RecorderError::Playlist(_))));

        assert!(matches!(
            load_playlist(&dir.path().join("missing.pls")),
            Err(RecorderError::FileSystem { .. })
        ));
    }
}
