use super::{DynObjectStore, EtcdStore, MemoryStore};
use crate::{KubeError, Result};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct StoreBuilder {
    backend: Option<String>,
    namespace: Option<String>,
    etcd_endpoints: Option<Vec<String>>,
    request_timeout: Option<Duration>,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn etcd_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.etcd_endpoints = Some(endpoints);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    fn resolve_backend(&self) -> Result<String> {
        let backend = self
            .backend
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if backend.is_empty() {
            return Err(KubeError::Config("store backend cannot be empty".to_string()));
        }

        Ok(backend)
    }

    pub async fn build(&self) -> Result<DynObjectStore> {
        let backend = self.resolve_backend()?;

        match backend.as_str() {
            "etcd" => {
                let endpoints = self.etcd_endpoints.clone().ok_or_else(|| {
                    KubeError::Config("etcd endpoints are required for etcd backend".to_string())
                })?;

                if endpoints.is_empty() {
                    return Err(KubeError::Config(
                        "etcd endpoints cannot be empty for etcd backend".to_string(),
                    ));
                }

                let namespace = self.namespace.as_deref().unwrap_or_default();
                let timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
                let store = EtcdStore::new(&endpoints, namespace, timeout).await?;
                Ok(Arc::new(store))
            }
            "memory" => {
                tracing::warn!("Using in-memory store; node state will not survive restart");
                Ok(Arc::new(MemoryStore::new()))
            }
            other => Err(KubeError::Config(format!(
                "unsupported store backend: {}",
                other
            ))),
        }
    }
}
