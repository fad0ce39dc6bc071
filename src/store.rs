//! Persisted credential storage
//!
//! The session survives restarts as two string entries: `token` holds the
//! opaque bearer string and `user` holds the JSON-serialized [`User`].

use async_trait::async_trait;
use log::{debug, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

use crate::auth::User;
use crate::error::StorageError;

/// Key of the bearer token entry
pub const TOKEN_KEY: &str = "token";

/// Key of the serialized user entry
pub const USER_KEY: &str = "user";

/// String key/value storage that outlives the process
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory store, mostly useful for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items.write().await.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object on disk
///
/// Writes go to a sibling temporary file which is then renamed into place.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<HashMap<String, String>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StorageError::ReadFailure(format!("{}: {}", self.path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(StorageError::ReadFailure(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn write_all(&self, items: &HashMap<String, String>) -> Result<(), StorageError> {
        let data = serde_json::to_vec_pretty(items)
            .map_err(|e| StorageError::WriteFailure(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| StorageError::WriteFailure(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StorageError::WriteFailure(format!("{}: {}", self.path.display(), e)))
    }

    async fn update<F>(&self, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut HashMap<String, String>) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut items = self.read_all().await.map_err(|e| match e {
            StorageError::ReadFailure(msg) => StorageError::WriteFailure(msg),
            other => other,
        })?;
        f(&mut items);
        self.write_all(&items).await
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let (key, value) = (key.to_string(), value.to_string());
        self.update(move |items| {
            items.insert(key, value);
        })
        .await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let key = key.to_string();
        self.update(move |items| {
            items.remove(&key);
        })
        .await
    }
}

/// Read the persisted `(token, user)` pair.
///
/// `Ok(None)` when either entry is absent or the token is blank; an
/// unparseable user record is a [`StorageError::ReadFailure`].
pub async fn load_credentials(
    store: &dyn CredentialStore,
) -> Result<Option<(String, User)>, StorageError> {
    let token = store.get_item(TOKEN_KEY).await?;
    let user = store.get_item(USER_KEY).await?;

    let (token, user) = match (token, user) {
        (Some(token), Some(user)) if !token.trim().is_empty() => (token, user),
        _ => return Ok(None),
    };

    let user: User = serde_json::from_str(&user)
        .map_err(|e| StorageError::ReadFailure(format!("malformed user record: {}", e)))?;

    Ok(Some((token, user)))
}

/// Persist the `(token, user)` pair. If the user entry cannot be written the
/// token entry is removed again so the store never holds half a session.
pub async fn save_credentials(
    store: &dyn CredentialStore,
    token: &str,
    user: &User,
) -> Result<(), StorageError> {
    let user_json =
        serde_json::to_string(user).map_err(|e| StorageError::WriteFailure(e.to_string()))?;

    store.set_item(TOKEN_KEY, token).await?;
    if let Err(e) = store.set_item(USER_KEY, &user_json).await {
        warn!("Failed to persist user record, rolling back token: {}", e);
        let _ = store.remove_item(TOKEN_KEY).await;
        return Err(e);
    }

    debug!("Persisted credentials for user {}", user.id);
    Ok(())
}

/// Remove both entries. Both removals are attempted even if the first fails.
pub async fn clear_credentials(store: &dyn CredentialStore) -> Result<(), StorageError> {
    let token = store.remove_item(TOKEN_KEY).await;
    let user = store.remove_item(USER_KEY).await;
    token.and(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        serde_json::from_value(serde_json::json!({
            "id": "7f9c2d8e-1111-4c2a-9e61-4a0d5b7e3c10",
            "username": "gael",
            "firstName": "Gael",
            "lastName": "Zamora",
            "email": "gael@example.com",
            "created_at": "2025-03-01T10:00:00Z"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileStore::new(&path);
        save_credentials(&store, "bearer-1", &user()).await.unwrap();
        drop(store);

        let reopened = FileStore::new(&path);
        let (token, loaded) = load_credentials(&reopened).await.unwrap().unwrap();
        assert_eq!(token, "bearer-1");
        assert_eq!(loaded, user());
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent.json"));
        assert_eq!(store.get_item(TOKEN_KEY).await.unwrap(), None);
        assert!(load_credentials(&store).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(
            store.get_item(TOKEN_KEY).await,
            Err(StorageError::ReadFailure(_))
        ));
    }

    #[tokio::test]
    async fn malformed_user_record_is_rejected() {
        let store = MemoryStore::new();
        store.set_item(TOKEN_KEY, "bearer-1").await.unwrap();
        store.set_item(USER_KEY, "{\"id\": ").await.unwrap();
        assert!(load_credentials(&store).await.is_err());
    }

    #[tokio::test]
    async fn token_without_user_is_absent() {
        let store = MemoryStore::new();
        store.set_item(TOKEN_KEY, "bearer-1").await.unwrap();
        assert!(load_credentials(&store).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_removes_both_entries() {
        let store = MemoryStore::new();
        save_credentials(&store, "bearer-1", &user()).await.unwrap();
        clear_credentials(&store).await.unwrap();
        assert_eq!(store.get_item(TOKEN_KEY).await.unwrap(), None);
        assert_eq!(store.get_item(USER_KEY).await.unwrap(), None);
    }
}
