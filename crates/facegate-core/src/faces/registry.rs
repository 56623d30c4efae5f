use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::errors::{AppError, AppResult};
use crate::faces::encoding::{BiometricEncoding, ExtractionMode, FaceRecord};
use crate::faces::store::FaceStore;

/// Identity-keyed encodings, one record per user.
///
/// Every mutation rewrites the whole durable file while the lock is still
/// held, so concurrent register/delete calls cannot interleave their writes.
pub struct EncodingStore {
    path: PathBuf,
    persistence: Box<dyn FaceStore>,
    records: Mutex<HashMap<String, FaceRecord>>,
}

impl EncodingStore {
    pub fn open(path: impl Into<PathBuf>, persistence: Box<dyn FaceStore>) -> Self {
        let path = path.into();
        let loaded = match persistence.load(&path) {
            Ok(records) => records,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not load encoding store; starting empty");
                Vec::new()
            }
        };

        let mut records = HashMap::with_capacity(loaded.len());
        for record in loaded {
            if let Some(previous) = records.insert(record.user_id.clone(), record) {
                warn!(user = %previous.user_id, "duplicate record in encoding store; keeping the last one");
            }
        }
        info!(path = %path.display(), registered = records.len(), "loaded face registrations");

        Self {
            path,
            persistence,
            records: Mutex::new(records),
        }
    }

    pub fn register(&self, user_id: &str, encoding: BiometricEncoding) -> AppResult<FaceRecord> {
        self.register_with(user_id, encoding, |_| {})
    }

    /// Registers and then runs `on_commit` before the lock is released, so
    /// side artifacts of the record cannot race a concurrent delete.
    pub fn register_with(
        &self,
        user_id: &str,
        encoding: BiometricEncoding,
        on_commit: impl FnOnce(&FaceRecord),
    ) -> AppResult<FaceRecord> {
        let mut records = self.records.lock();
        if records.contains_key(user_id) {
            return Err(AppError::Conflict {
                user: user_id.to_string(),
            });
        }

        let record = FaceRecord::new(user_id, encoding);
        records.insert(user_id.to_string(), record.clone());
        self.flush(&records);
        on_commit(&record);
        Ok(record)
    }

    pub fn lookup(&self, user_id: &str) -> AppResult<FaceRecord> {
        self.records
            .lock()
            .get(user_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound {
                user: user_id.to_string(),
            })
    }

    pub fn status(&self, user_id: &str) -> bool {
        self.records.lock().contains_key(user_id)
    }

    pub fn delete(&self, user_id: &str) -> AppResult<FaceRecord> {
        self.delete_with(user_id, |_| {})
    }

    pub fn delete_with(
        &self,
        user_id: &str,
        on_commit: impl FnOnce(&FaceRecord),
    ) -> AppResult<FaceRecord> {
        let mut records = self.records.lock();
        let removed = records.remove(user_id).ok_or_else(|| AppError::NotFound {
            user: user_id.to_string(),
        })?;
        self.flush(&records);
        on_commit(&removed);
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn modes(&self) -> BTreeSet<ExtractionMode> {
        self.records
            .lock()
            .values()
            .map(|record| record.encoding.mode())
            .collect()
    }

    pub fn snapshot(&self) -> Vec<FaceRecord> {
        let mut records: Vec<FaceRecord> = self.records.lock().values().cloned().collect();
        records.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        records
    }

    // A failed write keeps the in-memory change; the next mutation retries the full rewrite.
    fn flush(&self, records: &HashMap<String, FaceRecord>) {
        let snapshot: Vec<FaceRecord> = records.values().cloned().collect();
        match self.persistence.save(&self.path, &snapshot) {
            Ok(()) => debug!(registered = snapshot.len(), "saved face registrations"),
            Err(err) => {
                error!(path = %self.path.display(), error = %err, "failed to persist encoding store")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;
    use std::thread;

    use tempfile::TempDir;

    use crate::faces::store::{encodings_path, FilesystemFaceStore};

    fn open_in(dir: &Path) -> EncodingStore {
        EncodingStore::open(encodings_path(dir), Box::new(FilesystemFaceStore))
    }

    struct FailingStore;

    impl FaceStore for FailingStore {
        fn load(&self, path: &Path) -> AppResult<Vec<FaceRecord>> {
            Err(AppError::InvalidStore {
                path: path.to_path_buf(),
                message: "truncated".into(),
            })
        }

        fn save(&self, path: &Path, _records: &[FaceRecord]) -> AppResult<()> {
            Err(AppError::PersistenceWrite {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            })
        }
    }

    #[test]
    fn second_registration_conflicts_and_keeps_first() {
        let tmp = TempDir::new().unwrap();
        let store = open_in(tmp.path());
        store
            .register("alice", BiometricEncoding::Vector(vec![0.1, 0.2]))
            .unwrap();

        let err = store
            .register("alice", BiometricEncoding::Vector(vec![0.9, 0.9]))
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
        assert_eq!(
            store.lookup("alice").unwrap().encoding,
            BiometricEncoding::Vector(vec![0.1, 0.2])
        );
    }

    #[test]
    fn delete_then_lookup_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = open_in(tmp.path());
        store
            .register("alice", BiometricEncoding::Digest("aa".into()))
            .unwrap();
        assert!(store.status("alice"));

        store.delete("alice").unwrap();
        assert!(!store.status("alice"));
        assert!(matches!(
            store.lookup("alice").unwrap_err(),
            AppError::NotFound { .. }
        ));
        assert!(matches!(
            store.delete("alice").unwrap_err(),
            AppError::NotFound { .. }
        ));
    }

    #[test]
    fn commit_hooks_run_only_for_applied_mutations() {
        let tmp = TempDir::new().unwrap();
        let store = open_in(tmp.path());
        let mut seen = Vec::new();

        store
            .register_with("alice", BiometricEncoding::Digest("aa".into()), |record| {
                seen.push(format!("register:{}", record.user_id))
            })
            .unwrap();
        store
            .register_with("alice", BiometricEncoding::Digest("bb".into()), |record| {
                seen.push(format!("register:{}", record.user_id))
            })
            .unwrap_err();
        store
            .delete_with("alice", |record| seen.push(format!("delete:{}", record.user_id)))
            .unwrap();
        store
            .delete_with("alice", |record| seen.push(format!("delete:{}", record.user_id)))
            .unwrap_err();

        assert_eq!(seen, vec!["register:alice", "delete:alice"]);
    }

    #[test]
    fn reopen_reproduces_registrations() {
        let tmp = TempDir::new().unwrap();
        let before = {
            let store = open_in(tmp.path());
            store
                .register("alice", BiometricEncoding::Vector(vec![0.25, 0.5, -0.125]))
                .unwrap();
            store
                .register("bob", BiometricEncoding::Digest("ff00".into()))
                .unwrap();
            store.delete("bob").unwrap();
            store
                .register("carol", BiometricEncoding::Digest("00ff".into()))
                .unwrap();
            store.snapshot()
        };

        let reopened = open_in(tmp.path());
        assert_eq!(reopened.snapshot(), before);
        assert_eq!(reopened.len(), 2);
    }

    #[test]
    fn corrupt_file_opens_empty() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(encodings_path(tmp.path()), b"\x00\x01garbage").unwrap();
        let store = open_in(tmp.path());
        assert!(store.is_empty());
    }

    #[test]
    fn failed_save_keeps_in_memory_mutation() {
        let store = EncodingStore::open("/nonexistent/encodings.json", Box::new(FailingStore));
        assert!(store.is_empty());

        store
            .register("alice", BiometricEncoding::Digest("aa".into()))
            .unwrap();
        assert!(store.status("alice"));
    }

    #[test]
    fn modes_reports_each_variant_present() {
        let tmp = TempDir::new().unwrap();
        let store = open_in(tmp.path());
        store
            .register("alice", BiometricEncoding::Vector(vec![0.1]))
            .unwrap();
        store
            .register("bob", BiometricEncoding::Digest("aa".into()))
            .unwrap();
        let modes: Vec<_> = store.modes().into_iter().collect();
        assert_eq!(modes, vec![ExtractionMode::Vector, ExtractionMode::Digest]);
    }

    #[test]
    fn concurrent_registrations_are_all_persisted() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(open_in(tmp.path()));

        let handles: Vec<_> = (0..8)
            .map(|idx| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .register(
                            &format!("user-{idx}"),
                            BiometricEncoding::Vector(vec![idx as f64, 1.0]),
                        )
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reopened = open_in(tmp.path());
        assert_eq!(reopened.len(), 8);
    }
}
