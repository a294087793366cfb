//! Work orders, consumed read-only by OEE calculations

pub mod model;
pub mod repository;

pub use model::WorkOrder;
pub use repository::WorkOrderSource;
