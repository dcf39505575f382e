use super::{ObjectStore, Revision, StoreError, StoreResult, StoredObject, cancellable};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Keyspace {
    entries: BTreeMap<String, (Vec<u8>, Revision)>,
    revision: Revision,
}

impl Keyspace {
    fn next_revision(&mut self) -> Revision {
        self.revision += 1;
        self.revision
    }
}

/// In-process object store.
///
/// One lock guards the whole keyspace and a store-wide revision counter, so
/// create and update are atomic exactly like the etcd transactions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Keyspace>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a key unconditionally, bypassing the create/update contract.
    #[cfg(test)]
    pub(crate) async fn put_raw(&self, key: &str, value: Vec<u8>) -> Revision {
        let mut keyspace = self.inner.lock().await;
        let revision = keyspace.next_revision();
        keyspace.entries.insert(key.to_string(), (value, revision));
        revision
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn create(
        &self,
        key: &str,
        value: Vec<u8>,
        cancel: &CancellationToken,
    ) -> StoreResult<Revision> {
        cancellable(cancel, async {
            let mut keyspace = self.inner.lock().await;
            if keyspace.entries.contains_key(key) {
                return Err(StoreError::AlreadyExists(key.to_string()));
            }

            let revision = keyspace.next_revision();
            keyspace.entries.insert(key.to_string(), (value, revision));
            Ok(revision)
        })
        .await
    }

    async fn get(&self, key: &str, cancel: &CancellationToken) -> StoreResult<StoredObject> {
        cancellable(cancel, async {
            let keyspace = self.inner.lock().await;
            keyspace
                .entries
                .get(key)
                .map(|(value, revision)| StoredObject {
                    key: key.to_string(),
                    value: value.clone(),
                    revision: *revision,
                })
                .ok_or_else(|| StoreError::NotFound(key.to_string()))
        })
        .await
    }

    async fn update(
        &self,
        key: &str,
        value: Vec<u8>,
        expected: Revision,
        cancel: &CancellationToken,
    ) -> StoreResult<Revision> {
        cancellable(cancel, async {
            let mut keyspace = self.inner.lock().await;
            let actual = match keyspace.entries.get(key) {
                Some((_, revision)) => *revision,
                None => return Err(StoreError::NotFound(key.to_string())),
            };

            if actual != expected {
                return Err(StoreError::Conflict {
                    key: key.to_string(),
                    expected,
                    actual,
                });
            }

            let revision = keyspace.next_revision();
            keyspace.entries.insert(key.to_string(), (value, revision));
            Ok(revision)
        })
        .await
    }

    async fn delete(&self, key: &str, cancel: &CancellationToken) -> StoreResult<bool> {
        cancellable(cancel, async {
            let mut keyspace = self.inner.lock().await;
            let removed = keyspace.entries.remove(key).is_some();
            if removed {
                keyspace.next_revision();
            }
            Ok(removed)
        })
        .await
    }

    async fn list(
        &self,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<StoredObject>> {
        cancellable(cancel, async {
            let keyspace = self.inner.lock().await;
            let objects = keyspace
                .entries
                .range(prefix.to_string()..)
                .take_while(|(key, _)| key.starts_with(prefix))
                .map(|(key, (value, revision))| StoredObject {
                    key: key.clone(),
                    value: value.clone(),
                    revision: *revision,
                })
                .collect();
            Ok(objects)
        })
        .await
    }
}
