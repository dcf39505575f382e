pub mod reconcile_health;

pub use reconcile_health::{
    HealthReconciler, HealthReconcilerConfig, ReconcileHealthOperation,
    ReconcileHealthOperationRequest, ReconcileHealthOperationResult,
};
