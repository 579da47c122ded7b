//! Stage sequencing.
//!
//! Each public method runs one stage after pre-flighting exactly the paths
//! that stage reads and writes. [`Pipeline::run_all`] chains them and saves a
//! [`RunReport`].

use std::time::Instant;

use store_core::error::Result;
use store_core::models::EntityKind;
use store_core::preflight::{preflight, PathCheck};
use store_core::settings::PipelineConfig;
use store_data::cube::{build_cube, CubeReport};
use store_data::scrubber::{scrub_entity, ScrubReport};
use tracing::info;

use crate::loader::{load_warehouse, LoadReport};
use crate::report::{RunReport, StageTimings};

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn prepared_inputs(&self) -> Vec<PathCheck> {
        EntityKind::ALL
            .iter()
            .map(|e| PathCheck::input(self.config.prepared_path(*e)))
            .collect()
    }

    // ── Stages ────────────────────────────────────────────────────────────

    /// Clean one raw export.
    pub fn scrub(&self, entity: EntityKind) -> Result<ScrubReport> {
        preflight(&[
            PathCheck::input(self.config.raw_path(entity)),
            PathCheck::output_dir(&self.config.prepared_dir),
        ])
        .ensure_ok()?;
        scrub_entity(entity, &self.config)
    }

    /// Clean all three raw exports. Every input is checked before any is
    /// processed.
    pub fn scrub_all(&self) -> Result<Vec<ScrubReport>> {
        let mut checks: Vec<PathCheck> = EntityKind::ALL
            .iter()
            .map(|e| PathCheck::input(self.config.raw_path(*e)))
            .collect();
        checks.push(PathCheck::output_dir(&self.config.prepared_dir));
        preflight(&checks).ensure_ok()?;

        EntityKind::ALL
            .iter()
            .map(|e| scrub_entity(*e, &self.config))
            .collect()
    }

    pub fn build_cube(&self) -> Result<CubeReport> {
        let mut checks = self.prepared_inputs();
        checks.push(PathCheck::output_dir(&self.config.cube_dir));
        preflight(&checks).ensure_ok()?;
        build_cube(&self.config)
    }

    pub fn load(&self) -> Result<LoadReport> {
        let mut checks = self.prepared_inputs();
        checks.push(PathCheck::output_dir(self.config.warehouse_dir()));
        preflight(&checks).ensure_ok()?;
        load_warehouse(&self.config)
    }

    /// Scrub, cube, load, then write the run report.
    pub fn run_all(&self) -> Result<RunReport> {
        let start = Instant::now();
        let scrub = self.scrub_all()?;
        let scrub_seconds = start.elapsed().as_secs_f64();

        let start = Instant::now();
        let cube = self.build_cube()?;
        let cube_seconds = start.elapsed().as_secs_f64();

        let start = Instant::now();
        let load = self.load()?;
        let load_seconds = start.elapsed().as_secs_f64();

        let timings = StageTimings {
            scrub_seconds,
            cube_seconds,
            load_seconds,
        };
        let report = RunReport::new(scrub, cube, load, timings);

        let path = self.config.report_path();
        report.save_to(&path)?;
        info!(
            "Run complete in {:.2}s; report written to {}",
            report.timings.total(),
            path.display()
        );
        Ok(report)
    }
}
