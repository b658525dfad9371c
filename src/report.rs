pub mod layout;
pub mod render;
pub mod writer;

pub use layout::{unique_destination, RunLayout};
pub use writer::{ReportSection, ReportWriter};
