pub mod types;

pub use types::{
    BundleError, CaptureError, ConfigError, DeliveryError, MetricsError, NetworkFailure,
    ReportError, ScanError, ScienceError, TriageError,
};
