//! HTTP API handlers for lombada-review

pub mod buildinfo;
pub mod health;
pub mod records;

pub use buildinfo::get_build_info;
pub use health::health_routes;
pub use records::{get_record, list_records};
