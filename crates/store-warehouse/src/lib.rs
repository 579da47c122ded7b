//! Warehouse loading and pipeline orchestration for SmartStore.
//!
//! Loads the cleaned tables into SQLite and sequences the scrub, cube and
//! load stages, pre-flighting each one before it touches the filesystem.

pub mod loader;
pub mod pipeline;
pub mod report;

pub use store_core as core;
pub use store_data as data;
