//! Up-front validation of every path a stage is about to touch.
//!
//! Callers build a list of [`PathCheck`]s, run [`preflight`] once, and turn
//! the resulting [`PreflightReport`] into a fatal error with
//! [`PreflightReport::ensure_ok`] before any data is read or written.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Result, StoreError};

/// What a path is expected to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathRole {
    /// An existing, readable, non-empty input file.
    Input,
    /// A directory that outputs will be written into; created if absent.
    OutputDir,
}

/// A single path to validate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCheck {
    pub path: PathBuf,
    pub role: PathRole,
}

impl PathCheck {
    pub fn input(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            role: PathRole::Input,
        }
    }

    pub fn output_dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            role: PathRole::OutputDir,
        }
    }
}

/// Outcome of one [`PathCheck`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum PathStatus {
    Ok,
    Missing(String),
    Unreadable(String),
    Empty(String),
    Unwritable(String),
}

impl PathStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, PathStatus::Ok)
    }

    fn reason(&self) -> &str {
        match self {
            PathStatus::Ok => "ok",
            PathStatus::Missing(r)
            | PathStatus::Unreadable(r)
            | PathStatus::Empty(r)
            | PathStatus::Unwritable(r) => r,
        }
    }
}

impl fmt::Display for PathStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PathStatus::Ok => "ok",
            PathStatus::Missing(_) => "missing",
            PathStatus::Unreadable(_) => "unreadable",
            PathStatus::Empty(_) => "empty",
            PathStatus::Unwritable(_) => "unwritable",
        };
        if self.is_ok() {
            f.write_str(label)
        } else {
            write!(f, "{}: {}", label, self.reason())
        }
    }
}

/// A checked path together with its status.
#[derive(Debug, Clone, Serialize)]
pub struct PathResult {
    pub path: PathBuf,
    pub role: PathRole,
    pub status: PathStatus,
}

/// Results of a pre-flight run, in the order the checks were given.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PreflightReport {
    pub results: Vec<PathResult>,
}

impl PreflightReport {
    pub fn is_ok(&self) -> bool {
        self.results.iter().all(|r| r.status.is_ok())
    }

    /// Iterate over the failed checks only.
    pub fn failures(&self) -> impl Iterator<Item = &PathResult> {
        self.results.iter().filter(|r| !r.status.is_ok())
    }

    /// Convert the first failure into [`StoreError::Preflight`].
    pub fn ensure_ok(&self) -> Result<()> {
        match self.failures().next() {
            None => Ok(()),
            Some(failed) => Err(StoreError::Preflight {
                path: failed.path.clone(),
                reason: failed.status.to_string(),
            }),
        }
    }
}

/// Run every check and collect the results. Never fails on its own.
pub fn preflight(checks: &[PathCheck]) -> PreflightReport {
    let results: Vec<PathResult> = checks
        .iter()
        .map(|check| {
            let status = match check.role {
                PathRole::Input => check_input(&check.path),
                PathRole::OutputDir => check_output_dir(&check.path),
            };
            debug!("pre-flight {} ({:?}): {}", check.path.display(), check.role, status);
            PathResult {
                path: check.path.clone(),
                role: check.role,
                status,
            }
        })
        .collect();

    let report = PreflightReport { results };
    info!(
        "Pre-flight: {} path(s) checked, {} failed",
        report.results.len(),
        report.failures().count()
    );
    report
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn check_input(path: &Path) -> PathStatus {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return PathStatus::Missing("input file does not exist".to_string());
        }
        Err(e) => return PathStatus::Unreadable(format!("cannot stat input file: {}", e)),
    };

    if !metadata.is_file() {
        return PathStatus::Unreadable("input path is not a regular file".to_string());
    }
    if let Err(e) = File::open(path) {
        return PathStatus::Unreadable(format!("cannot open input file: {}", e));
    }
    if metadata.len() == 0 {
        return PathStatus::Empty("input file is zero bytes".to_string());
    }
    PathStatus::Ok
}

fn check_output_dir(path: &Path) -> PathStatus {
    if path.exists() && !path.is_dir() {
        return PathStatus::Unwritable("output path exists and is not a directory".to_string());
    }
    if let Err(e) = std::fs::create_dir_all(path) {
        return PathStatus::Unwritable(format!("cannot create output directory: {}", e));
    }

    // Write a real file: permission bits alone miss read-only mounts.
    match tempfile::Builder::new()
        .prefix(".preflight-")
        .tempfile_in(path)
    {
        Ok(_scratch) => PathStatus::Ok,
        Err(e) => PathStatus::Unwritable(format!("directory is not writable: {}", e)),
    }
}
