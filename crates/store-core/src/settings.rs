use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};
use crate::models::{EntityKind, TenureBasis};
use crate::money::Money;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Scrub, cube and load the SmartStore sales warehouse
#[derive(Parser, Debug, Clone)]
#[command(
    name = "smartstore",
    about = "Scrub, cube and load the SmartStore sales warehouse",
    version
)]
pub struct Settings {
    #[command(subcommand)]
    pub command: Command,

    /// Root data directory (defaults to ./data or ./src/data, whichever exists)
    #[arg(long, global = true, env = "SMARTSTORE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Directory holding the raw CSV exports [default: <data-dir>/raw]
    #[arg(long, global = true, env = "SMARTSTORE_RAW_DIR")]
    pub raw_dir: Option<PathBuf>,

    /// Directory for cleaned CSVs [default: <data-dir>/prepared]
    #[arg(long, global = true, env = "SMARTSTORE_PREPARED_DIR")]
    pub prepared_dir: Option<PathBuf>,

    /// Directory for the cube and run report [default: <data-dir>/cube]
    #[arg(long, global = true, env = "SMARTSTORE_CUBE_DIR")]
    pub cube_dir: Option<PathBuf>,

    /// SQLite warehouse file [default: <data-dir>/warehouse/smart_sales.db]
    #[arg(long, global = true, env = "SMARTSTORE_WAREHOUSE")]
    pub warehouse: Option<PathBuf>,

    /// Date that customer tenure is measured against
    #[arg(
        long,
        global = true,
        default_value = "sale-date",
        value_parser = ["sale-date", "as-of"],
        env = "SMARTSTORE_TENURE_BASIS"
    )]
    pub tenure_basis: String,

    /// Reference date for --tenure-basis as-of (YYYY-MM-DD, defaults to today)
    #[arg(long, global = true, value_parser = parse_iso_date, env = "SMARTSTORE_AS_OF")]
    pub as_of: Option<NaiveDate>,

    /// Drop sales with more items than this
    #[arg(long, global = true, env = "SMARTSTORE_MAX_ITEMS")]
    pub max_items: Option<u32>,

    /// Drop sales whose amount is at or below this
    #[arg(long, global = true, value_parser = parse_money, env = "SMARTSTORE_MIN_SALE_AMOUNT")]
    pub min_sale_amount: Option<Money>,

    /// Drop products outside the 1.5×IQR fence on price and stock
    #[arg(long, global = true)]
    pub iqr_outliers: bool,

    /// What `load` does with a duplicate key or dangling reference
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = ConflictPolicy::Skip,
        env = "SMARTSTORE_CONFLICT_POLICY"
    )]
    pub conflict_policy: ConflictPolicy,

    /// Logging level
    #[arg(
        long,
        global = true,
        default_value = "INFO",
        value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"],
        env = "SMARTSTORE_LOG_LEVEL"
    )]
    pub log_level: String,

    /// Log file path
    #[arg(long, global = true, env = "SMARTSTORE_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Pipeline stage to run.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Clean raw exports into prepared CSVs
    Scrub {
        #[arg(value_enum, default_value = "all")]
        target: ScrubTarget,
    },
    /// Build the aggregated sales cube from the prepared CSVs
    Cube,
    /// Load the prepared CSVs into the SQLite warehouse
    Load,
    /// Scrub everything, build the cube, then load the warehouse
    Run,
}

/// Which entity `scrub` should process.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrubTarget {
    Customers,
    Products,
    Sales,
    All,
}

/// What to do when a warehouse row violates a key constraint.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Skip the row, count it, and keep loading.
    #[default]
    Skip,
    /// Fail the whole load; nothing is committed.
    Abort,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::Skip => f.write_str("skip"),
            ConflictPolicy::Abort => f.write_str("abort"),
        }
    }
}

impl ScrubTarget {
    /// Entities covered by this target, in load order.
    pub fn entities(self) -> Vec<EntityKind> {
        match self {
            ScrubTarget::Customers => vec![EntityKind::Customers],
            ScrubTarget::Products => vec![EntityKind::Products],
            ScrubTarget::Sales => vec![EntityKind::Sales],
            ScrubTarget::All => EntityKind::ALL.to_vec(),
        }
    }
}

impl Settings {
    /// Parse the process arguments and apply the `--debug` override.
    pub fn load() -> Self {
        Self::load_from_args(std::env::args_os().collect())
    }

    /// Same as [`Settings::load`] but with an explicit argument list.
    pub fn load_from_args(args: Vec<std::ffi::OsString>) -> Self {
        let mut settings = Settings::parse_from(args);
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    /// Resolve every path and rule into a [`PipelineConfig`].
    ///
    /// `cwd` anchors data-directory discovery; `today` is the default
    /// reference date for `--tenure-basis as-of`.
    pub fn resolve(&self, cwd: &Path, today: NaiveDate) -> Result<PipelineConfig> {
        let data_dir = self
            .data_dir
            .clone()
            .unwrap_or_else(|| discover_data_dir(cwd));

        let tenure_basis = match self.tenure_basis.as_str() {
            "sale-date" => {
                if self.as_of.is_some() {
                    return Err(StoreError::Config(
                        "--as-of only applies with --tenure-basis as-of".to_string(),
                    ));
                }
                TenureBasis::SaleDate
            }
            "as-of" => TenureBasis::AsOf(self.as_of.unwrap_or(today)),
            other => {
                return Err(StoreError::Config(format!("unknown tenure basis \"{}\"", other)));
            }
        };

        let mut config = PipelineConfig::with_data_dir(&data_dir);
        if let Some(dir) = &self.raw_dir {
            config.raw_dir = dir.clone();
        }
        if let Some(dir) = &self.prepared_dir {
            config.prepared_dir = dir.clone();
        }
        if let Some(dir) = &self.cube_dir {
            config.cube_dir = dir.clone();
        }
        if let Some(path) = &self.warehouse {
            config.warehouse_path = path.clone();
        }
        config.tenure_basis = tenure_basis;
        config.conflict_policy = self.conflict_policy;
        config.rules = ScrubRules {
            max_items: self.max_items,
            min_sale_amount: self.min_sale_amount,
            iqr_outliers: self.iqr_outliers,
        };
        Ok(config)
    }
}

// ── PipelineConfig ─────────────────────────────────────────────────────────────

/// Optional row filters applied on top of type validation.
///
/// Everything is off by default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScrubRules {
    pub max_items: Option<u32>,
    pub min_sale_amount: Option<Money>,
    pub iqr_outliers: bool,
}

/// Resolved paths and rules, built once at start-up and handed to every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineConfig {
    pub raw_dir: PathBuf,
    pub prepared_dir: PathBuf,
    pub cube_dir: PathBuf,
    pub warehouse_path: PathBuf,
    pub tenure_basis: TenureBasis,
    pub rules: ScrubRules,
    pub conflict_policy: ConflictPolicy,
}

impl PipelineConfig {
    /// Standard layout under `data_dir` with default rules.
    pub fn with_data_dir(data_dir: &Path) -> Self {
        Self {
            raw_dir: data_dir.join("raw"),
            prepared_dir: data_dir.join("prepared"),
            cube_dir: data_dir.join("cube"),
            warehouse_path: data_dir.join("warehouse").join("smart_sales.db"),
            tenure_basis: TenureBasis::SaleDate,
            rules: ScrubRules::default(),
            conflict_policy: ConflictPolicy::default(),
        }
    }

    pub fn raw_path(&self, entity: EntityKind) -> PathBuf {
        self.raw_dir.join(format!("{}_data.csv", entity.name()))
    }

    pub fn prepared_path(&self, entity: EntityKind) -> PathBuf {
        self.prepared_dir.join(format!("{}_prepared.csv", entity.name()))
    }

    pub fn cube_path(&self) -> PathBuf {
        self.cube_dir.join("sales_cube.csv")
    }

    pub fn report_path(&self) -> PathBuf {
        self.cube_dir.join("run_report.json")
    }

    /// Directory containing the warehouse file.
    pub fn warehouse_dir(&self) -> PathBuf {
        match self.warehouse_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

// ── Data-path discovery ────────────────────────────────────────────────────────

/// Locate the data directory relative to `base`.
///
/// Checks `base/data` then `base/src/data` and returns the first that exists,
/// falling back to `base/data`.
pub fn discover_data_dir(base: &Path) -> PathBuf {
    let candidates = [base.join("data"), base.join("src").join("data")];
    candidates
        .iter()
        .find(|p| p.is_dir())
        .cloned()
        .unwrap_or_else(|| base.join("data"))
}

// ── Value parsers ──────────────────────────────────────────────────────────────

fn parse_iso_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

fn parse_money(s: &str) -> std::result::Result<Money, String> {
    Money::parse(s).ok_or_else(|| format!("\"{}\" is not a currency amount", s))
}

// ── Tests ──────────────────────────────────────────────────────────────────────
