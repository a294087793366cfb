//! Stoppage detection
//!
//! The per-line detector, the keyed lock map that serializes it, and the
//! background task that drives it.

pub mod detector;
pub mod line_locks;
pub mod monitor;

pub use detector::{last_producing_timestamp, DetectorSettings, StoppageDetector};
pub use line_locks::LineLocks;
pub use monitor::StoppageMonitor;
