//! Username-keyed credential table, persisted as one JSON document

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

use super::AuthError;
use super::models::UserRecord;

#[derive(Debug, Default)]
pub struct UserTable {
    path: Option<PathBuf>,
    rows: RwLock<BTreeMap<String, UserRecord>>,
}

impl UserTable {
    /// Table that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the table stored at `path`, starting empty when the file is absent
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref().to_path_buf();
        let rows = if path.exists() {
            let contents = fs::read_to_string(&path)
                .map_err(|e| AuthError::Store(format!("reading {}: {}", path.display(), e)))?;
            let records: Vec<UserRecord> = serde_json::from_str(&contents)
                .map_err(|e| AuthError::Store(format!("parsing {}: {}", path.display(), e)))?;
            records.into_iter().map(|r| (r.username.clone(), r)).collect()
        } else {
            BTreeMap::new()
        };

        info!("Opened credential table {} with {} users", path.display(), rows.len());
        Ok(Self {
            path: Some(path),
            rows: RwLock::new(rows),
        })
    }

    pub fn get(&self, username: &str) -> Option<UserRecord> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        rows.get(username).cloned()
    }

    /// Insert `record` unless its username is already taken
    pub fn insert_new(&self, record: UserRecord) -> Result<(), AuthError> {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        if rows.contains_key(&record.username) {
            return Err(AuthError::AlreadyExists);
        }

        let username = record.username.clone();
        rows.insert(username.clone(), record);
        if let Err(e) = self.persist(&rows) {
            rows.remove(&username);
            return Err(e);
        }
        Ok(())
    }

    pub fn set_last_login(&self, username: &str, at: &str) -> Result<(), AuthError> {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let Some(row) = rows.get_mut(username) else {
            return Err(AuthError::UserNotFound);
        };
        row.last_login = Some(at.to_string());
        self.persist(&rows)
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Called with the write lock held so concurrent writers cannot interleave files.
    fn persist(&self, rows: &BTreeMap<String, UserRecord>) -> Result<(), AuthError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let records: Vec<&UserRecord> = rows.values().collect();
        let contents = serde_json::to_string_pretty(&records)
            .map_err(|e| AuthError::Store(e.to_string()))?;

        let staging = path.with_extension("json.tmp");
        fs::write(&staging, contents)
            .and_then(|_| fs::rename(&staging, path))
            .map_err(|e| AuthError::Store(format!("writing {}: {}", path.display(), e)))?;

        debug!("Persisted {} users to {}", records.len(), path.display());
        Ok(())
    }
}
