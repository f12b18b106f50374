//! Linked credential storage.

use async_trait::async_trait;
use chatlink_core::{CredentialStore, LinkError, LinkResult, LinkedCredential, ProviderTokens};
use dashmap::DashMap;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument};

type CredentialMap = HashMap<String, LinkedCredential>;

fn linked(messaging_identity: &str, tokens: ProviderTokens) -> LinkedCredential {
    LinkedCredential {
        messaging_identity: messaging_identity.to_string(),
        tokens,
    }
}

/// In-memory [`CredentialStore`]. Each save replaces the whole record under
/// its shard lock, so readers see either the old or the new credential.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    credentials: DashMap<String, LinkedCredential>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn save(
        &self,
        messaging_identity: &str,
        tokens: ProviderTokens,
    ) -> LinkResult<LinkedCredential> {
        let credential = linked(messaging_identity, tokens);
        self.credentials
            .insert(messaging_identity.to_string(), credential.clone());
        debug!(%messaging_identity, "Saved linked credential");
        Ok(credential)
    }

    async fn get(&self, messaging_identity: &str) -> LinkResult<LinkedCredential> {
        self.credentials
            .get(messaging_identity)
            .map(|credential| credential.clone())
            .ok_or(LinkError::NotFound)
    }

    async fn delete(&self, messaging_identity: &str) -> LinkResult<bool> {
        Ok(self.credentials.remove(messaging_identity).is_some())
    }

    async fn replace_if(
        &self,
        messaging_identity: &str,
        expected: &ProviderTokens,
        tokens: ProviderTokens,
    ) -> LinkResult<Option<LinkedCredential>> {
        let Some(mut current) = self.credentials.get_mut(messaging_identity) else {
            return Ok(None);
        };
        if current.tokens != *expected {
            return Ok(None);
        }

        current.tokens = tokens;
        Ok(Some(current.value().clone()))
    }

    async fn delete_if(
        &self,
        messaging_identity: &str,
        expected: &ProviderTokens,
    ) -> LinkResult<bool> {
        Ok(self
            .credentials
            .remove_if(messaging_identity, |_, current| current.tokens == *expected)
            .is_some())
    }
}

/// [`CredentialStore`] persisted as one JSON document.
///
/// Every write goes to a temporary file in the target directory which is then
/// renamed over the document, so a crash never leaves a half-written file.
/// Writes are serialized by a single lock; credential saves happen once per
/// completed link or token refresh.
///
/// Each write runs as its own task: dropping the caller's future does not
/// stop it, so memory and disk are always swapped together.
pub struct FileCredentialStore {
    inner: Arc<FileState>,
}

struct FileState {
    path: PathBuf,
    credentials: RwLock<CredentialMap>,
}

impl FileCredentialStore {
    /// Open the store at `path`, loading existing credentials if the file exists.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> LinkResult<Self> {
        let path = path.as_ref().to_path_buf();

        let credentials = match tokio::fs::read_to_string(&path).await {
            Ok(json) => serde_json::from_str(&json).map_err(|e| {
                error!("Failed to parse credentials file: {}", e);
                LinkError::from(e)
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No credentials file found, starting empty");
                HashMap::new()
            }
            Err(e) => {
                error!("Failed to read credentials file: {}", e);
                return Err(e.into());
            }
        };

        info!(count = credentials.len(), "Credential store opened");
        Ok(Self {
            inner: Arc::new(FileState {
                path,
                credentials: RwLock::new(credentials),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Apply `change` to a copy of the map and, if it reports a change,
    /// write the copy to disk before swapping it in.
    async fn commit<R, F>(&self, change: F) -> LinkResult<R>
    where
        F: FnOnce(&mut CredentialMap) -> (R, bool) + Send + 'static,
        R: Send + 'static,
    {
        let inner = self.inner.clone();

        tokio::spawn(async move {
            let mut credentials = inner.credentials.write().await;
            let mut snapshot = credentials.clone();

            let (result, changed) = change(&mut snapshot);
            if changed {
                inner.persist(&snapshot).await?;
                *credentials = snapshot;
            }
            Ok::<_, LinkError>(result)
        })
        .await
        .map_err(|e| LinkError::StoreUnavailable(e.to_string()))?
    }
}

impl FileState {
    async fn persist(&self, snapshot: &CredentialMap) -> LinkResult<()> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomically(&path, &json))
            .await
            .map_err(|e| LinkError::StoreUnavailable(e.to_string()))?
            .map_err(|e| {
                error!(path = %self.path.display(), "Failed to write credentials file: {}", e);
                e
            })
    }
}

fn write_atomically(path: &Path, contents: &[u8]) -> LinkResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| LinkError::from(e.error))?;
    Ok(())
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn save(
        &self,
        messaging_identity: &str,
        tokens: ProviderTokens,
    ) -> LinkResult<LinkedCredential> {
        let credential = linked(messaging_identity, tokens);

        let record = credential.clone();
        self.commit(move |credentials| {
            credentials.insert(record.messaging_identity.clone(), record);
            ((), true)
        })
        .await?;

        debug!(%messaging_identity, "Saved linked credential");
        Ok(credential)
    }

    async fn get(&self, messaging_identity: &str) -> LinkResult<LinkedCredential> {
        self.inner
            .credentials
            .read()
            .await
            .get(messaging_identity)
            .cloned()
            .ok_or(LinkError::NotFound)
    }

    async fn delete(&self, messaging_identity: &str) -> LinkResult<bool> {
        let key = messaging_identity.to_string();
        let removed = self
            .commit(move |credentials| {
                let removed = credentials.remove(&key).is_some();
                (removed, removed)
            })
            .await?;

        if removed {
            debug!(%messaging_identity, "Deleted linked credential");
        }
        Ok(removed)
    }

    async fn replace_if(
        &self,
        messaging_identity: &str,
        expected: &ProviderTokens,
        tokens: ProviderTokens,
    ) -> LinkResult<Option<LinkedCredential>> {
        let key = messaging_identity.to_string();
        let expected = expected.clone();

        self.commit(move |credentials| match credentials.get_mut(&key) {
            Some(current) if current.tokens == expected => {
                current.tokens = tokens;
                (Some(current.clone()), true)
            }
            _ => (None, false),
        })
        .await
    }

    async fn delete_if(
        &self,
        messaging_identity: &str,
        expected: &ProviderTokens,
    ) -> LinkResult<bool> {
        let key = messaging_identity.to_string();
        let expected = expected.clone();

        self.commit(move |credentials| {
            let matches = credentials
                .get(&key)
                .is_some_and(|current| current.tokens == expected);
            if matches {
                credentials.remove(&key);
            }
            (matches, matches)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn tokens(access: &str, refresh: Option<&str>) -> ProviderTokens {
        let now = Utc::now();
        ProviderTokens {
            access_token: access.to_string(),
            refresh_token: refresh.map(String::from),
            token_type: "Bearer".to_string(),
            scope: Some("https://www.googleapis.com/auth/calendar".to_string()),
            obtained_at: now,
            expires_at: Some(now + Duration::hours(1)),
        }
    }

    #[tokio::test]
    async fn test_in_memory_save_get_overwrite() {
        let store = InMemoryCredentialStore::new();

        assert!(matches!(store.get("U1").await, Err(LinkError::NotFound)));

        let first = tokens("access-1", Some("refresh-1"));
        store.save("U1", first.clone()).await.unwrap();
        assert_eq!(store.get("U1").await.unwrap().tokens, first);

        // Relinking replaces the whole record; nothing from the old one survives.
        let second = tokens("access-2", None);
        store.save("U1", second.clone()).await.unwrap();
        let stored = store.get("U1").await.unwrap();
        assert_eq!(stored.tokens, second);
        assert_eq!(stored.tokens.refresh_token, None);
    }

    #[tokio::test]
    async fn test_in_memory_delete() {
        let store = InMemoryCredentialStore::new();
        store.save("U1", tokens("a", None)).await.unwrap();

        assert!(store.delete("U1").await.unwrap());
        assert!(!store.delete("U1").await.unwrap());
        assert!(matches!(store.get("U1").await, Err(LinkError::NotFound)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_observe_mixed_credentials() {
        let store = Arc::new(InMemoryCredentialStore::new());
        store.save("U1", tokens("access-a", Some("refresh-a"))).await.unwrap();

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..500 {
                    let suffix = if i % 2 == 0 { "b" } else { "a" };
                    store
                        .save(
                            "U1",
                            tokens(&format!("access-{}", suffix), Some(&format!("refresh-{}", suffix))),
                        )
                        .await
                        .unwrap();
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..500 {
                    let credential = store.get("U1").await.unwrap();
                    let access_suffix = credential.tokens.access_token.trim_start_matches("access-");
                    let refresh = credential.tokens.refresh_token.unwrap();
                    assert_eq!(refresh.trim_start_matches("refresh-"), access_suffix);
                }
            }));
        }

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = FileCredentialStore::open(&path).await.unwrap();
        let saved = tokens("access-1", Some("refresh-1"));
        store.save("U1", saved.clone()).await.unwrap();
        store.save("U2", tokens("access-2", None)).await.unwrap();
        drop(store);

        let reopened = FileCredentialStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("U1").await.unwrap().tokens, saved);
        assert_eq!(
            reopened.get("U2").await.unwrap().tokens.access_token,
            "access-2"
        );
    }

    #[tokio::test]
    async fn test_file_store_overwrite_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.json");

        let store = FileCredentialStore::open(&path).await.unwrap();
        assert!(matches!(store.get("U1").await, Err(LinkError::NotFound)));

        store.save("U1", tokens("old", Some("old-refresh"))).await.unwrap();
        store.save("U1", tokens("new", None)).await.unwrap();
        assert_eq!(store.get("U1").await.unwrap().tokens.access_token, "new");

        assert!(store.delete("U1").await.unwrap());
        assert!(!store.delete("U1").await.unwrap());

        let reopened = FileCredentialStore::open(&path).await.unwrap();
        assert!(matches!(reopened.get("U1").await, Err(LinkError::NotFound)));
    }

    async fn assert_conditional_writes(store: &dyn CredentialStore) {
        let original = tokens("access-1", Some("refresh-1"));
        store.save("U1", original.clone()).await.unwrap();

        let renewed = tokens("access-2", Some("refresh-1"));
        let replaced = store
            .replace_if("U1", &original, renewed.clone())
            .await
            .unwrap();
        assert_eq!(replaced.map(|c| c.tokens), Some(renewed.clone()));

        // The record no longer holds `original`, so neither write applies.
        let stale = store
            .replace_if("U1", &original, tokens("stale", None))
            .await
            .unwrap();
        assert!(stale.is_none());
        assert!(!store.delete_if("U1", &original).await.unwrap());
        assert_eq!(store.get("U1").await.unwrap().tokens, renewed);

        assert!(store.delete_if("U1", &renewed).await.unwrap());
        assert!(matches!(store.get("U1").await, Err(LinkError::NotFound)));
        assert!(
            store
                .replace_if("U1", &renewed, tokens("late", None))
                .await
                .unwrap()
                .is_none()
        );
        assert!(matches!(store.get("U1").await, Err(LinkError::NotFound)));
    }

    #[tokio::test]
    async fn test_in_memory_conditional_writes() {
        assert_conditional_writes(&InMemoryCredentialStore::new()).await;
    }

    #[tokio::test]
    async fn test_file_store_conditional_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = FileCredentialStore::open(&path).await.unwrap();
        assert_conditional_writes(&store).await;

        let reopened = FileCredentialStore::open(&path).await.unwrap();
        assert!(matches!(reopened.get("U1").await, Err(LinkError::NotFound)));
    }

    #[tokio::test]
    async fn test_file_store_save_completes_when_caller_goes_away() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = FileCredentialStore::open(&path).await.unwrap();

        {
            let save = store.save("U1", tokens("access-1", None));
            tokio::pin!(save);
            // Poll once so the write starts, then drop the future.
            let _ = tokio::time::timeout(std::time::Duration::ZERO, &mut save).await;
        }

        let mut in_memory = None;
        for _ in 0..200 {
            if let Ok(credential) = store.get("U1").await {
                in_memory = Some(credential);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let in_memory = in_memory.expect("save should finish without its caller");

        let on_disk = FileCredentialStore::open(&path).await.unwrap();
        assert_eq!(on_disk.get("U1").await.unwrap(), in_memory);
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "{not json").unwrap();

        let result = FileCredentialStore::open(&path).await;
        assert!(matches!(result, Err(LinkError::StoreUnavailable(_))));
    }
}
