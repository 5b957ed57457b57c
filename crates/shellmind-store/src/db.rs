//! Low-level file-system helpers: directory layout, filename sanitisation,
//! and JSON read/write for a single session file.
//!
//! Resolved byte-for-byte against
//! `examples/original_source/src/conversation_manager.py`: four directories
//! under a configurable root (`active.json`, `recent/`, `saved/`,
//! `archive/`), filenames restricted to `[A-Za-z0-9 _-]` with spaces mapped
//! to underscores.

use std::path::{Path, PathBuf};

use shellmind_core::Session;

use crate::error::Result;

pub struct Layout {
    pub base: PathBuf,
    pub active: PathBuf,
    pub recent: PathBuf,
    pub saved: PathBuf,
    pub archive: PathBuf,
}

impl Layout {
    pub fn new(storage_path: &str) -> Result<Self> {
        let base = expand_tilde(storage_path);
        let recent = base.join("recent");
        let saved = base.join("saved");
        let archive = base.join("archive");
        for dir in [&base, &recent, &saved, &archive] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(Self {
            active: base.join("active.json"),
            base,
            recent,
            saved,
            archive,
        })
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        return PathBuf::from(home).join(rest);
    }
    PathBuf::from(path)
}

/// Keep `[A-Za-z0-9 _-]`, then map spaces to underscores — matches the
/// original's `"".join(c for c in name if c.isalnum() or c in ('-', '_', '
/// ')).strip()` followed by `.replace(' ', '_')`.
pub fn sanitize_name(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_' || *c == ' ')
        .collect();
    kept.trim().replace(' ', "_")
}

pub fn write_session(path: &Path, session: &Session) -> Result<()> {
    let json = serde_json::to_string_pretty(session)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn read_session(path: &Path) -> Result<Option<Session>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&raw)?))
}

/// List files directly under `dir` matching `*.json`, newest `modified`
/// time first.
pub fn list_json_files_by_mtime(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if !dir.exists() {
        return Ok(Vec::new());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let modified = entry.metadata()?.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        entries.push((path, modified));
    }
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    Ok(entries.into_iter().map(|(p, _)| p).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_unsafe_chars_and_maps_spaces() {
        assert_eq!(sanitize_name("weekend trip: paris!"), "weekend_trip_paris");
    }

    #[test]
    fn sanitize_keeps_hyphen_and_underscore() {
        assert_eq!(sanitize_name("my-session_1"), "my-session_1");
    }
}
