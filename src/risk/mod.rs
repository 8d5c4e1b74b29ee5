// Risk management module
pub mod reserves;

pub use reserves::{ReserveAssessment, ReserveMonitor, ReserveReport};
