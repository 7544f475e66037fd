//! JSON file store
//!
//! Every file is written to a temporary sibling and renamed over the target,
//! so readers (the web layer) never observe a partially written document.
//! The indexer is the only writer; there is no cross-process locking.

use crate::records::{AllTimeLeaderboard, Checkpoint};
use crate::report::Reports;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub const STATE_FILE: &str = "_indexer_state.json";
pub const OVERVIEW_FILE: &str = "overview.json";
pub const WEEKLY_FILE: &str = "weekly.json";
pub const LEADERBOARD_LATEST_FILE: &str = "leaderboard_weekly_latest.json";
pub const LEADERBOARD_ALL_TIME_FILE: &str = "leaderboard_all_time.json";
pub const FARCASTER_MAP_FILE: &str = "farcaster_map.json";

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {:?}", dir))?;
    serde_json::to_writer_pretty(&mut tmp, value)
        .with_context(|| format!("Failed to serialize {:?}", path))?;
    tmp.write_all(b"\n")?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("Failed to sync temp file for {:?}", path))?;
    tmp.persist(path)
        .map_err(|e| anyhow::anyhow!("Failed to rename temp file over {:?}: {}", path, e.error))?;
    Ok(())
}

/// Read a JSON file. `Ok(None)` if it does not exist; malformed JSON is an error.
pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
    };
    let value = serde_json::from_str(&contents)
        .with_context(|| format!("Malformed JSON in {:?}", path))?;
    Ok(Some(value))
}

/// Read a JSON file, falling back to `default` if it is missing or malformed.
pub fn read_json_or_default<T: DeserializeOwned>(path: &Path, default: T) -> T {
    match read_json_opt(path) {
        Ok(Some(value)) => value,
        Ok(None) => default,
        Err(e) => {
            warn!("Ignoring unreadable {:?}: {:#}", path, e);
            default
        }
    }
}

/// Output directory holding the checkpoint and all published documents.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    /// Open (and create if needed) the output directory.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data directory {:?}", dir))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Last fully processed block, if any run has completed a chunk.
    pub fn get_head(&self) -> Result<Option<u64>> {
        let checkpoint: Option<Checkpoint> = read_json_opt(&self.path(STATE_FILE))
            .context("Checkpoint file is unreadable; refusing to guess the resume block")?;
        Ok(checkpoint.and_then(|c| c.last_processed_block))
    }

    /// Advance the checkpoint. Never moves backwards.
    pub fn set_head(&self, block: u64) -> Result<()> {
        if let Some(current) = self.get_head()? {
            if block < current {
                anyhow::bail!(
                    "Refusing to move checkpoint backwards from {} to {}",
                    current,
                    block
                );
            }
        }
        write_json_atomic(
            &self.path(STATE_FILE),
            &Checkpoint {
                last_processed_block: Some(block),
            },
        )?;
        debug!("Checkpoint advanced to block {}", block);
        Ok(())
    }

    /// Previously published all-time leaderboard, the seed of the next run.
    pub fn get_all_time(&self) -> Result<Option<AllTimeLeaderboard>> {
        read_json_opt(&self.path(LEADERBOARD_ALL_TIME_FILE))
            .context("Previous all-time leaderboard is unreadable; refusing to discard history")
    }

    pub fn put_all_time(&self, leaderboard: &AllTimeLeaderboard) -> Result<()> {
        write_json_atomic(&self.path(LEADERBOARD_ALL_TIME_FILE), leaderboard)
    }

    /// Write all four documents.
    pub fn put_reports(&self, reports: &Reports) -> Result<()> {
        write_json_atomic(&self.path(OVERVIEW_FILE), &reports.overview)?;
        write_json_atomic(&self.path(WEEKLY_FILE), &reports.weekly)?;
        write_json_atomic(
            &self.path(LEADERBOARD_LATEST_FILE),
            &reports.leaderboard_latest_week,
        )?;
        self.put_all_time(&reports.leaderboard_all_time)?;
        info!("Wrote reports to {:?}", self.dir);
        Ok(())
    }

    /// Create `farcaster_map.json` as `{}` if it does not exist. Its content
    /// belongs to the enrichment process.
    pub fn ensure_farcaster_map(&self) -> Result<()> {
        let path = self.path(FARCASTER_MAP_FILE);
        if !path.exists() {
            write_json_atomic(&path, &serde_json::json!({}))?;
            info!("Created empty {:?}", path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_replaces_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        write_json_atomic(&path, &json!({ "a": 1 })).unwrap();
        write_json_atomic(&path, &json!({ "a": 2 })).unwrap();

        let value: Value = read_json_opt(&path).unwrap().unwrap();
        assert_eq!(value, json!({ "a": 2 }));
        // no temp files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_read_json_or_default() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.json");
        assert_eq!(read_json_or_default(&missing, json!({})), json!({}));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert_eq!(read_json_or_default(&broken, json!([])), json!([]));
        assert!(read_json_opt::<Value>(&broken).is_err());
    }

    #[test]
    fn test_checkpoint_roundtrip_and_monotonic() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        assert_eq!(store.get_head().unwrap(), None);

        store.set_head(100).unwrap();
        store.set_head(100).unwrap();
        store.set_head(250).unwrap();
        assert_eq!(store.get_head().unwrap(), Some(250));
        assert!(store.set_head(249).is_err());
        assert_eq!(store.get_head().unwrap(), Some(250));

        let raw: Value = read_json_opt(&store.path(STATE_FILE)).unwrap().unwrap();
        assert_eq!(raw, json!({ "lastProcessedBlock": 250 }));
    }

    #[test]
    fn test_malformed_checkpoint_is_fatal() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        fs::write(store.path(STATE_FILE), "garbage").unwrap();
        assert!(store.get_head().is_err());
    }

    #[test]
    fn test_farcaster_map_created_once() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        store.ensure_farcaster_map().unwrap();
        let path = store.path(FARCASTER_MAP_FILE);
        assert_eq!(read_json_opt::<Value>(&path).unwrap(), Some(json!({})));

        fs::write(&path, r#"{"0xabc":{"fid":1}}"#).unwrap();
        store.ensure_farcaster_map().unwrap();
        assert_eq!(
            read_json_opt::<Value>(&path).unwrap(),
            Some(json!({ "0xabc": { "fid": 1 } }))
        );
    }
}
