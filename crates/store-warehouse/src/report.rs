use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use store_core::error::{Result, StoreError};
use store_data::cube::CubeReport;
use store_data::scrubber::ScrubReport;

use crate::loader::LoadReport;

/// Wall-clock seconds spent in each stage of a full run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageTimings {
    pub scrub_seconds: f64,
    pub cube_seconds: f64,
    pub load_seconds: f64,
}

impl StageTimings {
    pub fn total(&self) -> f64 {
        self.scrub_seconds + self.cube_seconds + self.load_seconds
    }
}

/// Summary of a full `run`, written as JSON next to the cube.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// RFC 3339 timestamp of when the report was assembled.
    pub generated_at: String,
    pub scrub: Vec<ScrubReport>,
    pub cube: CubeReport,
    pub load: LoadReport,
    pub timings: StageTimings,
}

impl RunReport {
    pub fn new(scrub: Vec<ScrubReport>, cube: CubeReport, load: LoadReport, timings: StageTimings) -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339(),
            scrub,
            cube,
            load,
            timings,
        }
    }

    /// Serialize to `path` via a temp file and rename.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::FileWrite {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|source| StoreError::FileWrite {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, path).map_err(|source| StoreError::FileWrite {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}
