mod bootstrap;

use anyhow::{Context, Result};
use store_core::settings::{Command, Settings};
use store_data::cube::CubeReport;
use store_data::scrubber::ScrubReport;
use store_warehouse::loader::LoadReport;
use store_warehouse::pipeline::Pipeline;

fn main() -> Result<()> {
    let settings = Settings::load();

    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_deref())?;

    let cwd = std::env::current_dir().context("reading current directory")?;
    let today = chrono::Local::now().date_naive();
    let config = settings.resolve(&cwd, today)?;

    tracing::info!("SmartStore v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::debug!(
        "raw={} prepared={} cube={} warehouse={} tenure={}",
        config.raw_dir.display(),
        config.prepared_dir.display(),
        config.cube_dir.display(),
        config.warehouse_path.display(),
        config.tenure_basis
    );

    let pipeline = Pipeline::new(config);

    match settings.command {
        Command::Scrub { target } => {
            for entity in target.entities() {
                let report = pipeline.scrub(entity)?;
                print_scrub(&report);
            }
        }
        Command::Cube => {
            let report = pipeline.build_cube()?;
            print_cube(&report);
        }
        Command::Load => {
            let report = pipeline.load()?;
            print_load(&report);
        }
        Command::Run => {
            let report = pipeline.run_all()?;
            for scrub in &report.scrub {
                print_scrub(scrub);
            }
            print_cube(&report.cube);
            print_load(&report.load);
            println!(
                "run: {:.2}s total, report at {}",
                report.timings.total(),
                pipeline.config().report_path().display()
            );
        }
    }

    Ok(())
}

// ── Summaries ──────────────────────────────────────────────────────────────────

fn print_scrub(report: &ScrubReport) {
    println!(
        "scrub {}: {} read, {} written, {} malformed, {} duplicate, {} by rule",
        report.entity,
        report.rows_read,
        report.rows_written,
        report.dropped_malformed,
        report.dropped_duplicate,
        report.dropped_by_rule
    );
}

fn print_cube(report: &CubeReport) {
    println!(
        "cube: {} groups from {}/{} sales ({}), {} dangling customer, {} dangling product, {} zero-purchase, {} negative tenure, {} amount overflow, {} malformed",
        report.groups_written,
        report.sales_joined,
        report.sales_read,
        report.sales_amount_total.to_display_string(),
        report.dangling_customer,
        report.dangling_product,
        report.zero_purchase_customer,
        report.negative_tenure_rows,
        report.amount_overflow,
        report.malformed_rows
    );
}

fn print_load(report: &LoadReport) {
    for table in &report.tables {
        println!(
            "load {}: {} inserted, {} duplicate, {} dangling",
            table.table, table.inserted, table.skipped_duplicate, table.skipped_dangling
        );
    }
    println!(
        "load: {} malformed input rows, {} policy",
        report.malformed_rows, report.policy
    );
}
