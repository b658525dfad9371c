pub mod bundle;
pub mod configuration;
pub mod controller;
pub mod delivery;
pub mod error_handling;
pub mod log_scanning;
pub mod report;
pub mod science;
pub mod screen_capture;
pub mod system_info;

pub use configuration::TriageConfig;
pub use controller::{DeliveryStatus, RunSummary, TriageController};
pub use error_handling::TriageError;
