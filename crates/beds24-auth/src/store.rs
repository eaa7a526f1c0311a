//! Record persistence
//!
//! `Persistence` is keyed by `RecordKind`. Loads never fail: a missing, empty,
//! unreadable or malformed entry is simply absent. Saves report errors, but the
//! manager treats them as non-fatal.
//!
//! `FileStore` keeps one JSON file per record kind. All writes use atomic
//! temp-file + rename so a crash mid-write never leaves a truncated token file.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::record::{Record, RecordKind};

/// Key-value storage for the three credential records.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Persistence>`).
pub trait Persistence: Send + Sync {
    /// Load a record, or `None` if it is missing or cannot be decoded.
    fn load(&self, kind: RecordKind) -> Pin<Box<dyn Future<Output = Option<Record>> + Send + '_>>;

    /// Overwrite the stored record of the same kind.
    fn save<'a>(&'a self, record: &'a Record)
    -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Remove a record. Removing an absent record succeeds.
    fn delete(&self, kind: RecordKind) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// File name for each record kind inside the store directory.
fn file_name(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Invite => "beds24_invite_code.json",
        RecordKind::Refresh => "beds24_refresh_token.json",
        RecordKind::Access => "beds24_auth_token.json",
    }
}

/// Directory of JSON record files.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the file backing `kind`.
    pub fn path(&self, kind: RecordKind) -> PathBuf {
        self.dir.join(file_name(kind))
    }

    async fn read(&self, kind: RecordKind) -> Option<Record> {
        let path = self.path(kind);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(%kind, path = %path.display(), "no record file");
                return None;
            }
            Err(e) => {
                warn!(%kind, path = %path.display(), error = %e, "failed to read record file");
                return None;
            }
        };

        if contents.trim().is_empty() {
            debug!(%kind, path = %path.display(), "record file is empty");
            return None;
        }

        match Record::from_json(kind, &contents) {
            Ok(record) => {
                debug!(%kind, path = %path.display(), "loaded record");
                Some(record)
            }
            Err(e) => {
                warn!(%kind, path = %path.display(), error = %e, "malformed record file, ignoring");
                None
            }
        }
    }

    async fn write(&self, record: &Record) -> Result<()> {
        let kind = record.kind();
        let json = record
            .to_json()
            .map_err(|e| Error::Persistence(format!("serializing {kind}: {e}")))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::Persistence(format!("creating {}: {e}", self.dir.display())))?;

        write_atomic(&self.path(kind), json.as_bytes()).await
    }

    async fn remove(&self, kind: RecordKind) -> Result<()> {
        let path = self.path(kind);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(%kind, path = %path.display(), "deleted record file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Persistence(format!(
                "deleting {}: {e}",
                path.display()
            ))),
        }
    }
}

impl Persistence for FileStore {
    fn load(&self, kind: RecordKind) -> Pin<Box<dyn Future<Output = Option<Record>> + Send + '_>> {
        Box::pin(self.read(kind))
    }

    fn save<'a>(
        &'a self,
        record: &'a Record,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.write(record))
    }

    fn delete(&self, kind: RecordKind) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.remove(kind))
    }
}

/// Write a record file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains tokens.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Persistence("record path has no parent directory".into()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let tmp_path = dir.join(format!(".{name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, data)
        .await
        .map_err(|e| Error::Persistence(format!("writing temp record file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Persistence(format!("setting record file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Persistence(format!("renaming temp record file: {e}")))?;

    debug!(path = %path.display(), "persisted record");
    Ok(())
}

/// In-process store, for tests and callers that manage durability themselves.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<RecordKind, Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `records`.
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let records = records.into_iter().map(|r| (r.kind(), r)).collect();
        Self {
            records: Mutex::new(records),
        }
    }

    /// Snapshot of the stored record of `kind`.
    pub async fn get(&self, kind: RecordKind) -> Option<Record> {
        self.records.lock().await.get(&kind).cloned()
    }
}

impl Persistence for MemoryStore {
    fn load(&self, kind: RecordKind) -> Pin<Box<dyn Future<Output = Option<Record>> + Send + '_>> {
        Box::pin(self.get(kind))
    }

    fn save<'a>(
        &'a self,
        record: &'a Record,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.records
                .lock()
                .await
                .insert(record.kind(), record.clone());
            Ok(())
        })
    }

    fn delete(&self, kind: RecordKind) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.records.lock().await.remove(&kind);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AccessRecord, InviteRecord, RefreshRecord};
    use chrono::{TimeDelta, TimeZone, Utc};

    fn access(token: &str) -> Record {
        let now = Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap();
        Record::Access(AccessRecord::issued(token, now, 3600))
    }

    #[tokio::test]
    async fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let record = access("at_1");
        store.save(&record).await.unwrap();

        let reopened = FileStore::new(dir.path());
        assert_eq!(reopened.load(RecordKind::Access).await, Some(record));
        assert_eq!(reopened.load(RecordKind::Refresh).await, None);
    }

    #[tokio::test]
    async fn records_issued_now_reload_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let access = Record::Access(AccessRecord::issued("at", Utc::now(), 3600));
        let refresh = Record::Refresh(RefreshRecord::issued("rt", Utc::now(), TimeDelta::days(30)));
        store.save(&access).await.unwrap();
        store.save(&refresh).await.unwrap();

        assert_eq!(store.load(RecordKind::Access).await, Some(access));
        assert_eq!(store.load(RecordKind::Refresh).await, Some(refresh));
    }

    #[tokio::test]
    async fn save_overwrites_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.save(&access("at_old")).await.unwrap();
        store.save(&access("at_new")).await.unwrap();

        let Some(Record::Access(loaded)) = store.load(RecordKind::Access).await else {
            panic!("expected access record");
        };
        assert_eq!(loaded.access_token.expose(), "at_new");
    }

    #[tokio::test]
    async fn missing_empty_and_malformed_files_load_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert_eq!(store.load(RecordKind::Invite).await, None);

        std::fs::write(store.path(RecordKind::Invite), "").unwrap();
        assert_eq!(store.load(RecordKind::Invite).await, None);

        std::fs::write(store.path(RecordKind::Refresh), "{ not json").unwrap();
        assert_eq!(store.load(RecordKind::Refresh).await, None);

        std::fs::write(store.path(RecordKind::Access), "{}").unwrap();
        assert_eq!(store.load(RecordKind::Access).await, None);
    }

    #[tokio::test]
    async fn loads_legacy_naive_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        std::fs::write(
            store.path(RecordKind::Refresh),
            r#"{"refresh_token":"rt_legacy","created":"2030-01-01T00:00:00","expiration":"2030-01-31T00:00:00"}"#,
        )
        .unwrap();

        let Some(Record::Refresh(refresh)) = store.load(RecordKind::Refresh).await else {
            panic!("expected refresh record");
        };
        let created = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(refresh.created, Some(created));
        assert_eq!(refresh.expiration, Some(created + TimeDelta::days(30)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let invite = Record::Invite(InviteRecord {
            invite_code: "inv".into(),
            expiration: None,
        });

        store.save(&invite).await.unwrap();
        assert!(store.path(RecordKind::Invite).exists());

        store.delete(RecordKind::Invite).await.unwrap();
        assert!(!store.path(RecordKind::Invite).exists());
        store.delete(RecordKind::Invite).await.unwrap();
    }

    #[tokio::test]
    async fn save_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("state").join("beds24");
        let store = FileStore::new(&nested);

        store.save(&access("at_1")).await.unwrap();
        assert!(nested.join("beds24_auth_token.json").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store
            .save(&Record::Refresh(RefreshRecord::issued(
                "rt_1",
                Utc::now(),
                TimeDelta::days(30),
            )))
            .await
            .unwrap();

        let metadata = tokio::fs::metadata(store.path(RecordKind::Refresh))
            .await
            .unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "record file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.save(&access("at_1")).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["beds24_auth_token.json"]);
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::with_records([access("at_1")]);
        assert_eq!(store.load(RecordKind::Access).await, Some(access("at_1")));

        store.delete(RecordKind::Access).await.unwrap();
        assert_eq!(store.load(RecordKind::Access).await, None);
        store.delete(RecordKind::Access).await.unwrap();
    }
}
