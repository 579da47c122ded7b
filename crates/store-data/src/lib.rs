//! File-to-file stages of the SmartStore pipeline.
//!
//! Reads raw CSV exports, maps their headers onto canonical column names,
//! scrubs each entity into a cleaned CSV and aggregates the cleaned tables
//! into the sales cube.

pub mod columns;
pub mod cube;
pub mod reader;
pub mod scrubber;
pub mod writer;

pub use store_core as core;
