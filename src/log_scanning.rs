//! Time-windowed log combing.
//!
//! - `time_window`: timestamp extraction and the lookback cutoff.
//! - `scanner`: error/warning extraction and raw log gathering.
//! - `types`: matches and scan results.

pub mod scanner;
pub mod time_window;
pub mod types;

pub use scanner::{gather_logs, LogScanner};
pub use time_window::{in_window, TimeWindowFilter, TimestampRule};
pub use types::{GatherReport, LogMatch, ScanReport, SkippedSource};
