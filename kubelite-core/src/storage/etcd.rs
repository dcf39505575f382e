use super::{ObjectStore, Revision, StoreError, StoreResult, StoredObject, cancellable};
use async_trait::async_trait;
use etcd_client::{
    Client, Compare, CompareOp, ConnectOptions, GetOptions, KvClient, Txn, TxnOp, TxnOpResponse,
    TxnResponse,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Object store backed by etcd.
///
/// Create and update are single etcd transactions guarded on
/// `create_revision` / `mod_revision`; the revision handed back to callers is
/// the key's etcd `mod_revision`.
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
    key_prefix: String,
}

impl EtcdStore {
    pub async fn new(
        endpoints: &[String],
        namespace: &str,
        request_timeout: Duration,
    ) -> StoreResult<Self> {
        let options = ConnectOptions::new()
            .with_connect_timeout(request_timeout)
            .with_timeout(request_timeout);

        let client = Client::connect(endpoints, Some(options))
            .await
            .map_err(|error| {
                StoreError::Unavailable(format!("failed to connect to etcd: {}", error))
            })?;

        tracing::info!(
            "Connected to etcd endpoints={:?} namespace={}",
            endpoints,
            namespace
        );

        Ok(Self {
            client,
            key_prefix: namespace_prefix(namespace),
        })
    }

    fn kv(&self) -> KvClient {
        self.client.kv_client()
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    fn strip_prefix<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.key_prefix.as_str()).unwrap_or(key)
    }

    async fn run_txn(&self, txn: Txn) -> StoreResult<TxnResponse> {
        self.kv().txn(txn).await.map_err(map_etcd_error)
    }
}

#[async_trait]
impl ObjectStore for EtcdStore {
    async fn create(
        &self,
        key: &str,
        value: Vec<u8>,
        cancel: &CancellationToken,
    ) -> StoreResult<Revision> {
        let full_key = self.full_key(key);
        let txn = Txn::new()
            .when(vec![Compare::create_revision(
                full_key.clone(),
                CompareOp::Equal,
                0,
            )])
            .and_then(vec![TxnOp::put(full_key, value, None)]);

        let response = cancellable(cancel, self.run_txn(txn)).await?;
        if !response.succeeded() {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }

        header_revision(&response)
    }

    async fn get(&self, key: &str, cancel: &CancellationToken) -> StoreResult<StoredObject> {
        let full_key = self.full_key(key);
        let response = cancellable(cancel, async {
            self.kv().get(full_key, None).await.map_err(map_etcd_error)
        })
        .await?;

        response
            .kvs()
            .first()
            .map(|kv| StoredObject {
                key: key.to_string(),
                value: kv.value().to_vec(),
                revision: kv.mod_revision(),
            })
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn update(
        &self,
        key: &str,
        value: Vec<u8>,
        expected: Revision,
        cancel: &CancellationToken,
    ) -> StoreResult<Revision> {
        let full_key = self.full_key(key);
        let txn = Txn::new()
            .when(vec![Compare::mod_revision(
                full_key.clone(),
                CompareOp::Equal,
                expected,
            )])
            .and_then(vec![TxnOp::put(full_key.clone(), value, None)])
            .or_else(vec![TxnOp::get(full_key, None)]);

        let response = cancellable(cancel, self.run_txn(txn)).await?;
        if response.succeeded() {
            return header_revision(&response);
        }

        // The else branch read the key back: absent means deleted, otherwise stale.
        let actual = response.op_responses().into_iter().find_map(|op| match op {
            TxnOpResponse::Get(get) => get.kvs().first().map(|kv| kv.mod_revision()),
            _ => None,
        });

        match actual {
            Some(actual) => Err(StoreError::Conflict {
                key: key.to_string(),
                expected,
                actual,
            }),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn delete(&self, key: &str, cancel: &CancellationToken) -> StoreResult<bool> {
        let full_key = self.full_key(key);
        let response = cancellable(cancel, async {
            self.kv().delete(full_key, None).await.map_err(map_etcd_error)
        })
        .await?;

        Ok(response.deleted() > 0)
    }

    async fn list(
        &self,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<StoredObject>> {
        let full_prefix = self.full_key(prefix);
        let response = cancellable(cancel, async {
            self.kv()
                .get(full_prefix, Some(GetOptions::new().with_prefix()))
                .await
                .map_err(map_etcd_error)
        })
        .await?;

        let mut objects = Vec::with_capacity(response.kvs().len());
        for kv in response.kvs() {
            let key = kv.key_str().map_err(|error| {
                StoreError::Internal(format!("non-utf8 key under {}: {}", prefix, error))
            })?;
            objects.push(StoredObject {
                key: self.strip_prefix(key).to_string(),
                value: kv.value().to_vec(),
                revision: kv.mod_revision(),
            });
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }
}

fn namespace_prefix(namespace: &str) -> String {
    let trimmed = namespace.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

fn header_revision(response: &TxnResponse) -> StoreResult<Revision> {
    response
        .header()
        .map(|header| header.revision())
        .ok_or_else(|| StoreError::Internal("etcd txn response missing header".to_string()))
}

fn map_etcd_error(error: etcd_client::Error) -> StoreError {
    StoreError::Unavailable(error.to_string())
}
