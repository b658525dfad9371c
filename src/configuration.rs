pub mod config;
pub mod types;

pub use types::{
    CaptureConfig, DeliveryConfig, DiscoveryConfig, LogConfig, ReportConfig, ScienceConfig,
    TriageConfig,
};
