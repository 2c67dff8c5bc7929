//! Durable key-value storage for the two session tokens.
//!
//! The session layer never touches a file or a global directly: it goes
//! through the [`TokenStorage`] capability, so a desktop client can keep
//! tokens in a file ([`FileStorage`]) while tests use an in-memory map
//! ([`MemoryStorage`]).

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use campusfund_protocol::{Codec, JsonCodec, TokenPair};

use crate::StorageError;

/// Storage key of the short-lived bearer credential.
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key of the long-lived credential used to mint access tokens.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// A string-to-string store that outlives the process (or not, for
/// tests).
///
/// Reads never fail: a backend that can't produce a value reports `None`,
/// which the session layer treats as "no session". Writes can fail and
/// report why.
pub trait TokenStorage: Send + Sync + 'static {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<S: TokenStorage> TokenStorage for Arc<S> {
    fn get(&self, key: &str) -> Option<String> {
        S::get(self, key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        S::set(self, key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        S::remove(self, key)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// Process-local storage. Everything is lost when it's dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds a signed-in session.
    pub fn with_session(tokens: &TokenPair) -> Self {
        let store = Self::new();
        {
            let mut entries = lock(&store.entries);
            entries.insert(ACCESS_TOKEN_KEY.to_string(), tokens.access.clone());
            entries.insert(REFRESH_TOKEN_KEY.to_string(), tokens.refresh.clone());
        }
        store
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

impl TokenStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileStorage
// ---------------------------------------------------------------------------

/// Storage backed by a JSON object file, e.g.
/// `{"access_token":"…","refresh_token":"…"}`.
///
/// The file is read once at [`open`](Self::open) and rewritten on every
/// mutation (write to a sibling `.tmp` file, then rename), so a session
/// survives a restart and a crash mid-write leaves the previous contents
/// intact.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Opens (or lazily creates) the store at `path`.
    ///
    /// A missing or empty file is an empty store.
    ///
    /// # Errors
    /// - [`StorageError::Io`] if the file exists but can't be read
    /// - [`StorageError::Codec`] if it isn't a JSON object of strings
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => JsonCodec.decode(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(
            path = %path.display(),
            entries = entries.len(),
            "opened token storage"
        );

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `entries` to disk. The caller commits them to memory only
    /// once this succeeds, so a failed write leaves both sides unchanged.
    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let bytes = JsonCodec.encode(entries)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        write_private(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Writes `bytes` to a new file that only the current user can read.
#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    // A leftover from an interrupted write may carry wider permissions.
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    fs::write(path, bytes)
}

impl TokenStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = lock(&self.entries);
        let mut next = entries.clone();
        next.insert(key.to_string(), value.to_string());
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = lock(&self.entries);
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> TokenPair {
        TokenPair {
            access: "A1".into(),
            refresh: "R1".into(),
        }
    }

    #[test]
    fn test_memory_with_session_holds_both_keys() {
        let store = MemoryStorage::with_session(&pair());
        assert_eq!(store.get(ACCESS_TOKEN_KEY).as_deref(), Some("A1"));
        assert_eq!(store.get(REFRESH_TOKEN_KEY).as_deref(), Some("R1"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_memory_remove_missing_key_is_ok() {
        let store = MemoryStorage::new();
        store.remove(ACCESS_TOKEN_KEY).expect("should be a no-op");
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::open(dir.path().join("session.json")).unwrap();
        assert_eq!(store.get(ACCESS_TOKEN_KEY), None);
        assert!(!store.path().exists(), "open must not create the file");
    }

    #[test]
    fn test_file_set_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = FileStorage::open(&path).unwrap();
        store.set(ACCESS_TOKEN_KEY, "A1").unwrap();
        store.set(REFRESH_TOKEN_KEY, "R1").unwrap();
        drop(store);

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get(ACCESS_TOKEN_KEY).as_deref(), Some("A1"));
        assert_eq!(reopened.get(REFRESH_TOKEN_KEY).as_deref(), Some("R1"));
    }

    #[test]
    fn test_file_remove_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileStorage::open(&path).unwrap();
        store.set(ACCESS_TOKEN_KEY, "A1").unwrap();
        store.remove(ACCESS_TOKEN_KEY).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "{}");
    }

    #[test]
    fn test_file_open_corrupt_file_returns_codec_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();

        let result = FileStorage::open(&path);
        assert!(matches!(result, Err(StorageError::Codec(_))));
    }

    #[test]
    fn test_file_open_whitespace_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "\n").unwrap();

        let store = FileStorage::open(&path).unwrap();
        assert_eq!(store.get(REFRESH_TOKEN_KEY), None);
    }

    #[test]
    fn test_file_remove_failed_write_keeps_token_in_memory_and_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileStorage::open(&path).unwrap();
        store.set(ACCESS_TOKEN_KEY, "A1").unwrap();
        store.set(REFRESH_TOKEN_KEY, "R1").unwrap();

        // A directory where the temp file goes makes every write fail.
        fs::create_dir(path.with_extension("tmp")).unwrap();

        assert!(matches!(store.remove(REFRESH_TOKEN_KEY), Err(StorageError::Io(_))));
        assert_eq!(store.get(REFRESH_TOKEN_KEY).as_deref(), Some("R1"));

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get(REFRESH_TOKEN_KEY).as_deref(), Some("R1"));
    }

    #[test]
    fn test_file_set_failed_write_leaves_old_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileStorage::open(&path).unwrap();
        store.set(ACCESS_TOKEN_KEY, "A1").unwrap();

        fs::create_dir(path.with_extension("tmp")).unwrap();

        assert!(store.set(ACCESS_TOKEN_KEY, "A2").is_err());
        assert_eq!(store.get(ACCESS_TOKEN_KEY).as_deref(), Some("A1"));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_readable_by_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileStorage::open(&path).unwrap();
        store.set(ACCESS_TOKEN_KEY, "A1").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
