pub mod procfs;
pub mod types;

pub use procfs::ProcfsMetrics;
pub use types::SystemSnapshot;

use crate::error_handling::types::MetricsError;

/// Source of the system information section of the report.
///
/// Implementations may block while sampling; callers run them on the
/// blocking pool.
pub trait MetricsProvider: Send + Sync {
    fn snapshot(&self) -> Result<SystemSnapshot, MetricsError>;
}
