use kubelite_core::{HealthReconcilerConfig, KubeError, KubeletConfig, Result, StoreBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub apiserver: ApiServerConfig,
    #[serde(default)]
    pub kubelet: KubeletSection,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_missed_heartbeats")]
    pub missed_heartbeats: u32,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub reconcile_interval_secs: u64,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            missed_heartbeats: default_missed_heartbeats(),
            reconcile_interval_secs: default_heartbeat_interval_secs(),
        }
    }
}

impl ApiServerConfig {
    pub fn reconciler(&self) -> HealthReconcilerConfig {
        HealthReconcilerConfig {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
            missed_heartbeats: self.missed_heartbeats,
            check_interval: Duration::from_secs(self.reconcile_interval_secs.max(1)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubeletSection {
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default = "default_bind_addr")]
    pub api_server: String,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_conflict_retries")]
    pub conflict_retries: usize,
}

impl Default for KubeletSection {
    fn default() -> Self {
        Self {
            node_name: None,
            api_server: default_bind_addr(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            conflict_retries: default_conflict_retries(),
        }
    }
}

impl KubeletSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn agent_config(&self, node_name: &str) -> KubeletConfig {
        let mut config = KubeletConfig::new(node_name);
        config.heartbeat_interval = Duration::from_secs(self.heartbeat_interval_secs.max(1));
        config.conflict_retries = self.conflict_retries;
        config.shutdown_grace = self.request_timeout();
        config
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub namespace: Option<String>,
    pub etcd: Option<EtcdConfig>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            namespace: None,
            etcd: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl StoreConfig {
    pub fn builder(&self) -> Result<StoreBuilder> {
        let mut builder = StoreBuilder::new()
            .request_timeout(Duration::from_secs(self.request_timeout_secs.max(1)));

        if let Some(namespace) = self.namespace.as_deref() {
            builder = builder.namespace(namespace);
        }

        match self.backend {
            StoreBackend::Memory => Ok(builder.backend("memory")),
            StoreBackend::Etcd => {
                let etcd = self.etcd.as_ref().ok_or_else(|| {
                    KubeError::Config("etcd configuration is required for etcd backend".to_string())
                })?;
                Ok(builder
                    .backend("etcd")
                    .etcd_endpoints(etcd.endpoints.clone()))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Etcd,
    #[default]
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtcdConfig {
    pub endpoints: Vec<String>,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_heartbeat_interval_secs() -> u64 {
    10
}

fn default_missed_heartbeats() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_conflict_retries() -> usize {
    3
}

impl Config {
    /// Load from an optional YAML file, then `KUBELITE__SECTION__KEY` environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path));
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix("KUBELITE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(|e| KubeError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| KubeError::Config(e.to_string()))?;

        Ok(config)
    }
}
