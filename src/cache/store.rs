//! Bounded on-disk store for query responses
//!
//! Each cached query is a single file in the cache directory whose entire
//! content is the raw response payload. The file's modification time is the
//! eviction clock: when a write pushes the entry count past the limit, the
//! entry with the oldest modification time is deleted. Reads do not touch the
//! modification time, so this is write-time LRU rather than true LRU.

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use super::key::CacheKey;

/// Default upper bound on the number of cached queries
pub const MAX_ENTRIES: usize = 50;

/// Errors raised when the cache directory cannot be used
///
/// These are distinct from a cache miss: a miss is `Ok(None)` from
/// [`CacheStore::lookup`].
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading, writing, listing or deleting a cache file failed
    #[error("cache unavailable at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A cache record exists but does not hold UTF-8 text
    #[error("cache record is not valid UTF-8: {}", path.display())]
    Corrupt { path: PathBuf },
}

impl CacheError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Metadata about one cached query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Key the record is stored under
    pub key: CacheKey,
    /// Payload size in bytes
    pub size: u64,
    /// Last time the record was written
    pub modified: DateTime<Utc>,
}

/// Persists query responses to disk with count-based eviction
///
/// The store itself holds no open handles, so cloning it is cheap and clones
/// may be moved onto blocking threads.
#[derive(Debug, Clone)]
pub struct CacheStore {
    /// Directory where cache records are stored
    cache_dir: PathBuf,
    /// Number of entries kept before eviction kicks in
    max_entries: usize,
}

impl CacheStore {
    /// Returns the XDG-compliant default cache directory
    ///
    /// Uses `~/.cache/offsearch/queries/` on Linux. Returns `None` when no home
    /// directory can be determined.
    pub fn default_dir() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "offsearch")?;
        Some(project_dirs.cache_dir().join("queries"))
    }

    /// Creates a store in the default cache directory
    pub fn new(max_entries: usize) -> Option<Self> {
        Some(Self::with_dir(Self::default_dir()?, max_entries))
    }

    /// Creates a store rooted at a custom directory
    ///
    /// The directory does not need to exist yet; it is created on first write.
    pub fn with_dir(cache_dir: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            max_entries,
        }
    }

    /// Directory holding the cache records
    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Number of entries kept before eviction
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn record_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(key.file_name())
    }

    fn ensure_dir(&self) -> Result<(), CacheError> {
        fs::create_dir_all(&self.cache_dir).map_err(|e| CacheError::io(&self.cache_dir, e))
    }

    /// Reads the cached response for a query
    ///
    /// # Returns
    /// * `Ok(Some(payload))` if a record exists, byte-for-byte as stored
    /// * `Ok(None)` if nothing is cached for the query
    /// * `Err(CacheError)` if the record or directory could not be read
    pub fn lookup(&self, query: &str) -> Result<Option<String>, CacheError> {
        let path = self.record_path(&CacheKey::from_query(query));

        match fs::read(&path) {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| CacheError::Corrupt { path }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Writes the response for a query, evicting the oldest entry if needed
    ///
    /// Overwrites any existing record for the same query and sets its
    /// modification time to now. If the store then holds more than
    /// `max_entries` records, exactly one is removed: the one with the oldest
    /// modification time, never the record just written. The check runs once
    /// per call, so a directory that is already several entries over the limit
    /// shrinks by one per write.
    pub fn store(&self, query: &str, response: &str) -> Result<(), CacheError> {
        self.store_at(query, response, SystemTime::now())
    }

    /// Same as [`store`](Self::store) with an explicit modification time
    pub(crate) fn store_at(
        &self,
        query: &str,
        response: &str,
        modified: SystemTime,
    ) -> Result<(), CacheError> {
        self.ensure_dir()?;

        let key = CacheKey::from_query(query);
        let path = self.record_path(&key);

        // Write to a temp file in the same directory, then rename over the
        // record so readers never observe a partial payload.
        let mut tmp =
            NamedTempFile::new_in(&self.cache_dir).map_err(|e| CacheError::io(&self.cache_dir, e))?;
        tmp.write_all(response.as_bytes())
            .and_then(|()| tmp.as_file().set_modified(modified))
            .map_err(|e| CacheError::io(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| CacheError::io(&path, e.error))?;

        debug!(key = %key, bytes = response.len(), "stored cache record");

        self.evict_oldest_if_full(&key)
    }

    fn evict_oldest_if_full(&self, just_written: &CacheKey) -> Result<(), CacheError> {
        let entries = self.entries()?;
        if entries.len() <= self.max_entries {
            return Ok(());
        }

        // `entries` is sorted oldest first with ties broken by key
        let Some(victim) = entries.iter().find(|e| &e.key != just_written) else {
            return Ok(());
        };

        let path = self.record_path(&victim.key);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(
                    key = %victim.key,
                    modified = %victim.modified,
                    count = entries.len(),
                    max = self.max_entries,
                    "evicted oldest cache record"
                );
                Ok(())
            }
            // Someone else removed it first; the count is back down either way
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Lists all records, oldest modification time first
    ///
    /// Files in the directory that are not cache records are ignored. A
    /// missing directory is an empty cache.
    pub fn entries(&self) -> Result<Vec<EntryInfo>, CacheError> {
        let read_dir = match fs::read_dir(&self.cache_dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(&self.cache_dir, e)),
        };

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(|e| CacheError::io(&self.cache_dir, e))?;
            let Some(key) = dir_entry
                .file_name()
                .to_str()
                .and_then(CacheKey::from_file_name)
            else {
                continue;
            };

            let metadata = match dir_entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(CacheError::io(dir_entry.path(), e)),
            };
            if !metadata.is_file() {
                continue;
            }

            let modified = metadata
                .modified()
                .map_err(|e| CacheError::io(dir_entry.path(), e))?;

            entries.push(EntryInfo {
                key,
                size: metadata.len(),
                modified: DateTime::<Utc>::from(modified),
            });
        }

        entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.key.cmp(&b.key)));
        Ok(entries)
    }

    /// Number of records currently stored
    pub fn len(&self) -> Result<usize, CacheError> {
        Ok(self.entries()?.len())
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.entries()?.is_empty())
    }

    /// Removes the record for a query
    ///
    /// Returns `Ok(false)` if nothing was cached for it.
    pub fn remove(&self, query: &str) -> Result<bool, CacheError> {
        let path = self.record_path(&CacheKey::from_query(query));
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Removes every record, returning how many were deleted
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for entry in self.entries()? {
            let path = self.record_path(&entry.key);
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::io(path, e)),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    const PAYLOAD: &str = r#"{"results":[{"doc_id":"doc1","score":0.91}]}"#;

    fn create_test_store(max_entries: usize) -> (CacheStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = CacheStore::with_dir(temp_dir.path(), max_entries);
        (store, temp_dir)
    }

    /// Fixed, strictly increasing modification times
    fn at(offset_secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + offset_secs)
    }

    fn record_path(store: &CacheStore, query: &str) -> PathBuf {
        store.dir().join(CacheKey::from_query(query).file_name())
    }

    #[test]
    fn test_lookup_returns_none_for_missing_query() {
        let (store, _temp_dir) = create_test_store(MAX_ENTRIES);
        assert_eq!(store.lookup("never stored").unwrap(), None);
    }

    #[test]
    fn test_lookup_returns_none_when_directory_missing() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::with_dir(temp_dir.path().join("absent"), MAX_ENTRIES);

        assert_eq!(store.lookup("anything").unwrap(), None);
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn test_store_then_lookup_is_byte_exact() {
        let (store, _temp_dir) = create_test_store(MAX_ENTRIES);
        let payload = "  {\"results\": []}\r\n\t ünïcødé \u{1F50D}\n";

        store.store("i18n IoT", payload).expect("Store should succeed");

        assert_eq!(store.lookup("i18n IoT").unwrap().as_deref(), Some(payload));
    }

    #[test]
    fn test_record_file_holds_raw_payload() {
        let (store, _temp_dir) = create_test_store(MAX_ENTRIES);
        store.store("i18n IoT", PAYLOAD).unwrap();

        let path = record_path(&store, "i18n IoT");
        assert!(path.exists(), "Record file should exist");
        assert_eq!(fs::read_to_string(path).unwrap(), PAYLOAD);
    }

    #[test]
    fn test_store_creates_directory_if_missing() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested").join("cache").join("dir");
        let store = CacheStore::with_dir(&nested, MAX_ENTRIES);

        store.store("q", "r").expect("Store should succeed");

        assert!(nested.is_dir(), "Nested directory should be created");
        assert_eq!(store.lookup("q").unwrap().as_deref(), Some("r"));
    }

    #[test]
    fn test_store_same_query_twice_keeps_one_entry() {
        let (store, _temp_dir) = create_test_store(MAX_ENTRIES);

        store.store_at("q", "first", at(1)).unwrap();
        store.store_at("q", "second", at(2)).unwrap();

        let entries = store.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, CacheKey::from_query("q"));
        assert_eq!(entries[0].modified, DateTime::<Utc>::from(at(2)));
        assert_eq!(store.lookup("q").unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_store_sets_modification_time_to_now() {
        let (store, _temp_dir) = create_test_store(MAX_ENTRIES);

        let before = Utc::now() - chrono::Duration::seconds(1);
        store.store("q", "r").unwrap();
        let after = Utc::now() + chrono::Duration::seconds(1);

        let entries = store.entries().unwrap();
        assert!(entries[0].modified >= before);
        assert!(entries[0].modified <= after);
    }

    #[test]
    fn test_distinct_queries_are_distinct_entries() {
        let (store, _temp_dir) = create_test_store(MAX_ENTRIES);

        store.store("rust", "lower").unwrap();
        store.store("Rust", "upper").unwrap();

        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.lookup("rust").unwrap().as_deref(), Some("lower"));
        assert_eq!(store.lookup("Rust").unwrap().as_deref(), Some("upper"));
    }

    #[test]
    fn test_evicts_oldest_when_over_capacity() {
        let (store, _temp_dir) = create_test_store(3);

        store.store_at("a", "1", at(10)).unwrap();
        store.store_at("b", "2", at(5)).unwrap();
        store.store_at("c", "3", at(20)).unwrap();
        assert_eq!(store.len().unwrap(), 3);

        store.store_at("d", "4", at(30)).unwrap();

        assert_eq!(store.len().unwrap(), 3);
        assert_eq!(store.lookup("b").unwrap(), None, "Oldest entry should be evicted");
        assert!(store.lookup("a").unwrap().is_some());
        assert!(store.lookup("c").unwrap().is_some());
        assert!(store.lookup("d").unwrap().is_some());
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let (store, _temp_dir) = create_test_store(2);

        store.store_at("a", "1", at(1)).unwrap();
        store.store_at("b", "2", at(2)).unwrap();
        store.store_at("a", "1 again", at(3)).unwrap();

        assert_eq!(store.len().unwrap(), 2);
        assert!(store.lookup("b").unwrap().is_some());
    }

    #[test]
    fn test_rewrite_refreshes_eviction_priority() {
        let (store, _temp_dir) = create_test_store(2);

        store.store_at("a", "1", at(1)).unwrap();
        store.store_at("b", "2", at(2)).unwrap();
        store.store_at("a", "1", at(3)).unwrap();
        store.store_at("c", "3", at(4)).unwrap();

        assert_eq!(store.lookup("b").unwrap(), None);
        assert!(store.lookup("a").unwrap().is_some());
    }

    #[test]
    fn test_lookup_does_not_refresh_eviction_priority() {
        let (store, _temp_dir) = create_test_store(2);

        store.store_at("a", "1", at(1)).unwrap();
        store.store_at("b", "2", at(2)).unwrap();
        store.lookup("a").unwrap();
        store.store_at("c", "3", at(3)).unwrap();

        assert_eq!(store.lookup("a").unwrap(), None);
    }

    #[test]
    fn test_never_evicts_record_just_written() {
        let (store, _temp_dir) = create_test_store(1);

        store.store_at("a", "1", at(100)).unwrap();
        // Older timestamp than the existing entry
        store.store_at("b", "2", at(1)).unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert!(store.lookup("b").unwrap().is_some());
        assert_eq!(store.lookup("a").unwrap(), None);
    }

    #[test]
    fn test_eviction_ties_broken_by_key() {
        let (store, _temp_dir) = create_test_store(2);

        store.store_at("x", "1", at(1)).unwrap();
        store.store_at("y", "2", at(1)).unwrap();
        store.store_at("z", "3", at(2)).unwrap();

        let smaller_key = std::cmp::min(CacheKey::from_query("x"), CacheKey::from_query("y"));
        let remaining: Vec<CacheKey> = store.entries().unwrap().into_iter().map(|e| e.key).collect();
        assert_eq!(remaining.len(), 2);
        assert!(!remaining.contains(&smaller_key));
    }

    #[test]
    fn test_eviction_is_one_shot() {
        let temp_dir = TempDir::new().unwrap();
        let roomy = CacheStore::with_dir(temp_dir.path(), 10);
        for (i, q) in ["a", "b", "c", "d"].iter().enumerate() {
            roomy.store_at(q, "r", at(i as u64)).unwrap();
        }

        let tight = CacheStore::with_dir(temp_dir.path(), 2);
        tight.store_at("e", "r", at(10)).unwrap();

        // 5 records over a limit of 2: only the single oldest goes
        assert_eq!(tight.len().unwrap(), 4);
        assert_eq!(tight.lookup("a").unwrap(), None);
        assert!(tight.lookup("b").unwrap().is_some());
    }

    #[test]
    fn test_fifty_one_queries_leave_fifty() {
        let (store, _temp_dir) = create_test_store(MAX_ENTRIES);

        for i in 0..=MAX_ENTRIES {
            store
                .store_at(&format!("query {}", i), &format!("payload {}", i), at(i as u64))
                .unwrap();
        }

        assert_eq!(store.len().unwrap(), MAX_ENTRIES);
        assert_eq!(store.lookup("query 0").unwrap(), None);
        assert_eq!(
            store.lookup(&format!("query {}", MAX_ENTRIES)).unwrap().as_deref(),
            Some("payload 50")
        );
    }

    #[test]
    fn test_entries_sorted_oldest_first() {
        let (store, _temp_dir) = create_test_store(MAX_ENTRIES);

        store.store_at("new", "123", at(30)).unwrap();
        store.store_at("old", "1", at(10)).unwrap();
        store.store_at("mid", "12", at(20)).unwrap();

        let entries = store.entries().unwrap();
        let keys: Vec<CacheKey> = entries.iter().map(|e| e.key.clone()).collect();
        assert_eq!(
            keys,
            vec![
                CacheKey::from_query("old"),
                CacheKey::from_query("mid"),
                CacheKey::from_query("new"),
            ]
        );
        assert_eq!(entries[0].size, 1);
        assert_eq!(entries[2].size, 3);
    }

    #[test]
    fn test_foreign_files_are_ignored() {
        let (store, temp_dir) = create_test_store(1);
        fs::write(temp_dir.path().join("README.txt"), "hello").unwrap();
        fs::create_dir(temp_dir.path().join("subdir")).unwrap();

        store.store_at("a", "1", at(1)).unwrap();
        store.store_at("b", "2", at(2)).unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert!(temp_dir.path().join("README.txt").exists());
        assert!(temp_dir.path().join("subdir").exists());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let (store, temp_dir) = create_test_store(MAX_ENTRIES);
        store.store("a", "1").unwrap();
        store.store("a", "2").unwrap();

        let names: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_non_utf8_record_is_corrupt_not_miss() {
        let (store, _temp_dir) = create_test_store(MAX_ENTRIES);
        store.store("q", "placeholder").unwrap();
        fs::write(record_path(&store, "q"), [0xff, 0xfe, 0x00, 0x80]).unwrap();

        let err = store.lookup("q").unwrap_err();
        assert!(matches!(err, CacheError::Corrupt { .. }));
        assert!(err.to_string().contains("not valid UTF-8"));
    }

    #[test]
    fn test_directory_that_is_a_file_is_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let store = CacheStore::with_dir(&blocker, MAX_ENTRIES);

        assert!(matches!(store.store("q", "r"), Err(CacheError::Io { .. })));
        assert!(matches!(store.lookup("q"), Err(CacheError::Io { .. })));
    }

    #[test]
    fn test_remove_single_entry() {
        let (store, _temp_dir) = create_test_store(MAX_ENTRIES);
        store.store("a", "1").unwrap();
        store.store("b", "2").unwrap();

        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
        assert_eq!(store.lookup("a").unwrap(), None);
        assert_eq!(store.lookup("b").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_clear_removes_all_records() {
        let (store, temp_dir) = create_test_store(MAX_ENTRIES);
        fs::write(temp_dir.path().join("keep.txt"), "x").unwrap();
        for q in ["a", "b", "c"] {
            store.store(q, "r").unwrap();
        }

        assert_eq!(store.clear().unwrap(), 3);
        assert!(store.is_empty().unwrap());
        assert!(temp_dir.path().join("keep.txt").exists());
    }

    #[test]
    fn test_default_dir_is_xdg_compliant() {
        if let Some(dir) = CacheStore::default_dir() {
            let path_str = dir.to_string_lossy();
            assert!(path_str.contains("offsearch"), "Cache path should contain project name");
            assert!(dir.ends_with("queries"));
        }
        // Test passes if there is no home directory (e.g. in CI)
    }
}
