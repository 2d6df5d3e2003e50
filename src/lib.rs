//! # Net-Net Workbook
//!
//! Scoring and structure-safe maintenance of net-net stock analysis workbooks.
//!
//! A workbook carries two raw statement sheets (income statement and balance sheet,
//! found by their `_is` / `_bs` suffixes) and a set of calculation sheets (`ncav`,
//! `profitability`, `ro`, `piotrosky`, `C7`) whose formulas derive ratios from the raw
//! data. This crate reads those sheets through the [`Workbook`] trait and:
//!
//! - **Scores** the Piotroski and C7 checklists from the calculation sheets, attaching
//!   every cell a verdict was based on and marking anything it cannot decide as
//!   manual-required ([`ScoringEngine`]).
//! - **Records** the results on the scorecard sheets without touching formula cells
//!   ([`write_scorecard`]).
//! - **Validates** freshly exported statements against the workbook's current layout
//!   ([`StructureMapper`], [`diff_signatures`]).
//! - **Merges** exports into the raw sheets with a backup first, formulas protected and
//!   new periods carried through the calculation sheets ([`SafeMergeUpdater`]).
//!
//! ## Example
//!
//! ```rust,ignore
//! use netnet_workbook::*;
//! use std::path::Path;
//!
//! let path = Path::new("almedio.json");
//! let mut workbook = MemoryWorkbook::open(path)?;
//! let config = EngineConfig::default();
//!
//! let params = ScoringParams::from_defaults(&config.scoring)
//!     .with_price(412.0)
//!     .with_market_cap(38.5);
//! let report = NetNetProcessor::score(&workbook, &config, params)?;
//! println!("{}", report.to_json()?);
//!
//! let export = MemoryWorkbook::open(Path::new("export.json"))?;
//! let exports = [
//!     StatementExport::new(SheetRole::IncomeStatement, &export, "Almedio_IS"),
//!     StatementExport::new(SheetRole::BalanceSheet, &export, "Almedio_BS"),
//! ];
//! let merge = NetNetProcessor::merge(
//!     &mut workbook,
//!     path,
//!     &exports,
//!     &config,
//!     MergeOptions::update().with_extend_periods(),
//! )?;
//! println!("{} cells changed", merge.cells_changed());
//! ```

pub mod backup;
pub mod config;
pub mod criteria;
pub mod diff;
pub mod error;
pub mod extract;
pub mod frequency;
pub mod merge;
pub mod schema;
pub mod scorecard;
pub mod scoring;
pub mod structure;
pub mod trend;
pub mod utils;
pub mod workbook;

pub use backup::{backup_path_for, create_backup};
pub use config::{
    CalculationSheet, EngineConfig, ScorecardColumns, ScorecardLayout, ScoringDefaults,
    WorkbookLayout,
};
pub use criteria::{catalogue, Criterion, Rule, Section};
pub use diff::{diff_signatures, has_blocking};
pub use error::{NetNetError, Result};
pub use extract::{extract_series, parse_numeric, ScanWindow, Series, SeriesPoint};
pub use frequency::{classify, FrequencyCache};
pub use merge::{
    merge_statements, CellChange, MergeMode, MergeOptions, MergePlan, MergeReport,
    SafeMergeUpdater,
};
pub use schema::*;
pub use scorecard::{write_scorecard, ScorecardWrite};
pub use scoring::{score_workbook, ScoreReport, ScoreSummary, ScoringEngine, ScoringParams};
pub use structure::{StatementExport, StructureMapper};
pub use trend::{Direction, Magnitude, Trend, TrendClassifier};
pub use workbook::{MemoryWorkbook, Workbook};

use log::info;
use std::path::Path;

pub struct NetNetProcessor;

impl NetNetProcessor {
    pub fn score<W: Workbook + ?Sized>(
        workbook: &W,
        config: &EngineConfig,
        params: ScoringParams,
    ) -> Result<ScoreReport> {
        score_workbook(workbook, config, params)
    }

    /// Scores the workbook, backs it up and writes the results onto its scorecard sheets.
    pub fn score_and_record<W: Workbook + ?Sized>(
        workbook: &mut W,
        workbook_path: &Path,
        config: &EngineConfig,
        params: ScoringParams,
    ) -> Result<(ScoreReport, ScorecardWrite)> {
        let report = score_workbook(&*workbook, config, params)?;
        let written = write_scorecard(workbook, workbook_path, &report, &config.scorecard)?;
        Ok((report, written))
    }

    /// Structural signature of a workbook, tagged with the file it was read from.
    pub fn capture_structure<W: Workbook + ?Sized>(
        workbook: &W,
        workbook_path: &Path,
        config: &EngineConfig,
    ) -> Result<StructuralSignature> {
        let mut signature = StructureMapper::new(&config.layout).map_workbook(workbook)?;
        signature.source = workbook_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Ok(signature)
    }

    /// Diffs the exports against the workbook's current structure.
    pub fn validate<W: Workbook + ?Sized>(
        workbook: &W,
        exports: &[StatementExport<'_>],
        config: &EngineConfig,
    ) -> Result<Vec<StructureDiscrepancy>> {
        let mapper = StructureMapper::new(&config.layout);
        let baseline = mapper.map_workbook(workbook)?;
        let candidate = mapper.map_exports(exports);
        let discrepancies = diff_signatures(&baseline, &candidate);
        info!(
            "Validated {} export sheets: {} discrepancies",
            exports.len(),
            discrepancies.len()
        );
        Ok(discrepancies)
    }

    /// Validates, backs up and merges. Replace-all merges skip validation.
    pub fn merge<W: Workbook + ?Sized>(
        workbook: &mut W,
        workbook_path: &Path,
        exports: &[StatementExport<'_>],
        config: &EngineConfig,
        options: MergeOptions,
    ) -> Result<MergeReport> {
        let discrepancies = match options.mode {
            MergeMode::Update => Self::validate(&*workbook, exports, config)?,
            MergeMode::ReplaceAll => {
                info!("Replace-all merge: structural validation skipped");
                Vec::new()
            }
        };
        merge_statements(
            workbook,
            workbook_path,
            exports,
            &discrepancies,
            &config.layout,
            options,
        )
    }
}

pub fn validate_exports<W: Workbook + ?Sized>(
    workbook: &W,
    exports: &[StatementExport<'_>],
    config: &EngineConfig,
) -> Result<Vec<StructureDiscrepancy>> {
    NetNetProcessor::validate(workbook, exports, config)
}

pub fn merge_exports<W: Workbook + ?Sized>(
    workbook: &mut W,
    workbook_path: &Path,
    exports: &[StatementExport<'_>],
    config: &EngineConfig,
    options: MergeOptions,
) -> Result<MergeReport> {
    NetNetProcessor::merge(workbook, workbook_path, exports, config, options)
}
