//! Shared building blocks for the SmartStore warehouse pipeline.
//!
//! Holds the domain records, fixed-point money, date coercion, the error
//! taxonomy, CLI settings and the pre-flight path diagnostics used by every
//! pipeline stage.

pub mod dates;
pub mod error;
pub mod models;
pub mod money;
pub mod preflight;
pub mod settings;
