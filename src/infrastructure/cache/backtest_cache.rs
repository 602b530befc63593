//! On-disk cache of analyzed backtests.
//!
//! One JSON file per (lab, backtest) under `<base>/backtests/`. Writes go to
//! a unique temp file first and are renamed into place, so a crash mid-write
//! never leaves a truncated entry behind.

use crate::domain::backtest::analysis::BacktestAnalysis;
use crate::domain::errors::CacheError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

const BACKTESTS_DIR: &str = "backtests";
const ENTRY_EXTENSION: &str = "json";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// The cached payload: the raw runtime record plus its derived analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedBacktest {
    pub lab_id: String,
    pub backtest_id: String,
    pub cached_at: DateTime<Utc>,
    pub raw_record: Value,
    pub analysis: BacktestAnalysis,
}

impl CachedBacktest {
    pub fn new(raw_record: Value, analysis: BacktestAnalysis) -> Self {
        Self {
            lab_id: analysis.lab_id.clone(),
            backtest_id: analysis.backtest_id.clone(),
            cached_at: Utc::now(),
            raw_record,
            analysis,
        }
    }
}

/// File-per-key backtest cache.
#[derive(Debug, Clone)]
pub struct BacktestCache {
    dir: PathBuf,
}

impl BacktestCache {
    /// Opens (and creates if needed) `<base_dir>/backtests`.
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self, CacheError> {
        let dir = base_dir.as_ref().join(BACKTESTS_DIR);
        fs::create_dir_all(&dir).map_err(|source| CacheError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, lab_id: &str, backtest_id: &str) -> PathBuf {
        self.dir.join(entry_file_name(lab_id, backtest_id))
    }

    pub fn exists(&self, lab_id: &str, backtest_id: &str) -> bool {
        self.entry_path(lab_id, backtest_id).is_file()
    }

    pub fn read(&self, lab_id: &str, backtest_id: &str) -> Result<CachedBacktest, CacheError> {
        let path = self.entry_path(lab_id, backtest_id);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CacheError::NotFound {
                    lab_id: lab_id.to_string(),
                    backtest_id: backtest_id.to_string(),
                });
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(CacheError::Malformed {
                    path,
                    reason: e.to_string(),
                });
            }
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        let record: CachedBacktest =
            serde_json::from_str(&content).map_err(|e| CacheError::Malformed {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        if record.lab_id != lab_id || record.backtest_id != backtest_id {
            return Err(CacheError::Malformed {
                path,
                reason: format!(
                    "entry holds {}/{}, expected {}/{}",
                    record.lab_id, record.backtest_id, lab_id, backtest_id
                ),
            });
        }

        Ok(record)
    }

    /// Writes (or fully replaces) an entry atomically.
    pub fn write(
        &self,
        lab_id: &str,
        backtest_id: &str,
        record: &CachedBacktest,
    ) -> Result<(), CacheError> {
        let path = self.entry_path(lab_id, backtest_id);
        let content = serde_json::to_string_pretty(record)?;
        write_atomic(&path, content.as_bytes())?;
        debug!("Cached backtest {}/{} at {:?}", lab_id, backtest_id, path);
        Ok(())
    }

    pub fn remove(&self, lab_id: &str, backtest_id: &str) -> Result<bool, CacheError> {
        let path = self.entry_path(lab_id, backtest_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }

    /// Backtest ids cached for a lab, sorted.
    pub fn list_keys(&self, lab_id: &str) -> Result<Vec<String>, CacheError> {
        let prefix = format!("{}_", sanitize(lab_id));
        let entries = fs::read_dir(&self.dir).map_err(|source| CacheError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CacheError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(stem) = file_name
                .strip_suffix(&format!(".{}", ENTRY_EXTENSION))
                .and_then(|s| s.strip_prefix(&prefix))
            else {
                continue;
            };

            // Plain form: the stem is the backtest id itself.
            if entry_file_name(lab_id, stem) == file_name {
                keys.push(stem.to_string());
                continue;
            }

            // Digest form: the real ids live inside the record.
            match fs::read_to_string(entry.path())
                .ok()
                .and_then(|c| serde_json::from_str::<CachedBacktest>(&c).ok())
            {
                Some(record) if record.lab_id == lab_id => keys.push(record.backtest_id),
                Some(_) => {}
                None => warn!("Skipping unreadable cache entry {:?}", entry.path()),
            }
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

/// `<lab>_<bt>.json` for filesystem-safe ids, otherwise sanitized ids plus a
/// digest of the exact pair so distinct keys never share a file.
pub fn entry_file_name(lab_id: &str, backtest_id: &str) -> String {
    if is_safe(lab_id) && is_safe(backtest_id) {
        return format!("{}_{}.{}", lab_id, backtest_id, ENTRY_EXTENSION);
    }

    let mut hasher = Sha256::new();
    hasher.update(lab_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(backtest_id.as_bytes());
    let digest = hex::encode(hasher.finalize());

    format!(
        "{}_{}_{}.{}",
        sanitize(lab_id),
        sanitize(backtest_id),
        &digest[..16],
        ENTRY_EXTENSION
    )
}

fn is_safe(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

/// Temp file in the same directory, then rename over the target.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<(), CacheError> {
    let unique = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let temp_path = path.with_extension(format!("{}.{}.tmp", std::process::id(), unique));

    if let Err(source) = fs::write(&temp_path, content) {
        fs::remove_file(&temp_path).ok();
        return Err(CacheError::Io {
            path: temp_path,
            source,
        });
    }
    fs::rename(&temp_path, path).map_err(|source| {
        fs::remove_file(&temp_path).ok();
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::extractor::MetricExtractor;
    use serde_json::json;

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn create_test_cache() -> (BacktestCache, PathBuf) {
        let unique_id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let temp_dir = std::env::temp_dir().join(format!(
            "labscope_test_{}_{}_{}_cache",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0),
            unique_id
        ));
        let cache = BacktestCache::open(&temp_dir).expect("Failed to create test cache");
        (cache, temp_dir)
    }

    fn cleanup_test_dir(temp_dir: PathBuf) {
        fs::remove_dir_all(temp_dir).ok();
    }

    fn record(lab_id: &str, backtest_id: &str) -> CachedBacktest {
        let raw = json!({
            "Reports": { "k": { "PR": { "SB": 1000, "RPH": [5.5, -1.25, 12.0], "ROI": 1.2 } } },
            "FinishedPositions": [{ "rp": 12.0, "fe": 0.3, "eno": [{ "m": 333.3 }] }],
            "InputFields": { "Length": 7 }
        });
        let analysis = MetricExtractor::default()
            .extract(lab_id, backtest_id, &raw)
            .unwrap();
        CachedBacktest::new(raw, analysis)
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let (cache, temp_dir) = create_test_cache();
        let err = cache.read("lab", "bt").unwrap_err();
        assert!(matches!(err, CacheError::NotFound { .. }));
        assert!(!cache.exists("lab", "bt"));
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_write_and_read_roundtrip() {
        let (cache, temp_dir) = create_test_cache();
        let original = record("lab-1", "bt-1");

        cache.write("lab-1", "bt-1", &original).unwrap();
        assert!(cache.exists("lab-1", "bt-1"));

        let loaded = cache.read("lab-1", "bt-1").unwrap();
        assert_eq!(loaded, original);
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_overwrite_replaces_whole_entry() {
        let (cache, temp_dir) = create_test_cache();
        let first = record("lab", "bt");
        cache.write("lab", "bt", &first).unwrap();

        let mut second = record("lab", "bt");
        second.raw_record = json!({ "replaced": true });
        cache.write("lab", "bt", &second).unwrap();

        assert_eq!(cache.read("lab", "bt").unwrap().raw_record, json!({ "replaced": true }));
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_corrupt_file_is_malformed() {
        let (cache, temp_dir) = create_test_cache();
        fs::write(cache.entry_path("lab", "bt"), "{\"lab_id\": \"lab\", trunc").unwrap();

        let err = cache.read("lab", "bt").unwrap_err();
        assert!(matches!(err, CacheError::Malformed { .. }));
        assert!(err.is_miss());
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_list_keys_per_lab() {
        let (cache, temp_dir) = create_test_cache();
        for (lab, bt) in [("lab-a", "2"), ("lab-a", "1"), ("lab-b", "9"), ("lab-a", "x/y z")] {
            cache.write(lab, bt, &record(lab, bt)).unwrap();
        }
        // Stray temp files from an interrupted write are ignored
        fs::write(cache.dir().join("lab-a_3.json.1.1.tmp"), "partial").unwrap();

        assert_eq!(cache.list_keys("lab-a").unwrap(), vec!["1", "2", "x/y z"]);
        assert_eq!(cache.list_keys("lab-b").unwrap(), vec!["9"]);
        assert!(cache.list_keys("lab-c").unwrap().is_empty());
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_file_names_are_deterministic_and_distinct() {
        assert_eq!(entry_file_name("lab", "bt-1"), "lab_bt-1.json");
        assert_eq!(entry_file_name("a/b", "c"), entry_file_name("a/b", "c"));
        assert_ne!(entry_file_name("a/b", "c"), entry_file_name("a:b", "c"));
        assert_ne!(entry_file_name("a_b", "c"), entry_file_name("a", "b_c"));
    }

    #[test]
    fn test_remove() {
        let (cache, temp_dir) = create_test_cache();
        cache.write("lab", "bt", &record("lab", "bt")).unwrap();
        assert!(cache.remove("lab", "bt").unwrap());
        assert!(!cache.remove("lab", "bt").unwrap());
        assert!(!cache.exists("lab", "bt"));
        cleanup_test_dir(temp_dir);
    }
}
