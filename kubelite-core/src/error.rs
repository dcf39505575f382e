use crate::storage::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KubeError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("node already exists: {0}")]
    NodeAlreadyExists(String),

    #[error("resource version conflict: {0}")]
    Conflict(String),

    #[error("invalid node: {0}")]
    Invalid(String),

    #[error("failed to list nodes: {0}")]
    ListFailed(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl KubeError {
    /// Conditions the kubelet and reconciler expect and retry on their own schedule.
    pub fn is_retryable(&self) -> bool {
        matches!(self, KubeError::Conflict(_) | KubeError::Unavailable(_))
    }

    /// Stable variant name carried in control-surface error bodies.
    pub fn reason(&self) -> &'static str {
        match self {
            KubeError::NodeNotFound(_) => "NotFound",
            KubeError::NodeAlreadyExists(_) => "AlreadyExists",
            KubeError::Conflict(_) => "Conflict",
            KubeError::Invalid(_) => "Invalid",
            KubeError::ListFailed(_) => "ListFailed",
            KubeError::Unavailable(_) => "Unavailable",
            KubeError::Cancelled => "Cancelled",
            KubeError::Config(_) => "Config",
            KubeError::Http(_) => "Http",
            KubeError::Internal(_) | KubeError::Io(_) => "Internal",
        }
    }

    /// Rebuild an error from a control-surface `reason` and message.
    pub fn from_reason(reason: &str, message: String) -> Self {
        match reason {
            "NotFound" => KubeError::NodeNotFound(message),
            "AlreadyExists" => KubeError::NodeAlreadyExists(message),
            "Conflict" => KubeError::Conflict(message),
            "Invalid" => KubeError::Invalid(message),
            "ListFailed" => KubeError::ListFailed(message),
            "Unavailable" => KubeError::Unavailable(message),
            "Cancelled" => KubeError::Cancelled,
            _ => KubeError::Internal(message),
        }
    }
}

impl From<StoreError> for KubeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => KubeError::NodeNotFound(key),
            StoreError::AlreadyExists(key) => KubeError::NodeAlreadyExists(key),
            conflict @ StoreError::Conflict { .. } => KubeError::Conflict(conflict.to_string()),
            StoreError::Unavailable(msg) => KubeError::Unavailable(msg),
            StoreError::Cancelled => KubeError::Cancelled,
            StoreError::Internal(msg) => KubeError::Internal(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, KubeError>;
