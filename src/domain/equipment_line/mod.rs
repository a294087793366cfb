//! Equipment line aggregate

pub mod model;
pub mod repository;

pub use model::EquipmentLine;
pub use repository::EquipmentLineDirectory;
