use crate::backup::create_backup;
use crate::config::{ScorecardColumns, ScorecardLayout};
use crate::criteria::{find, Section};
use crate::error::Result;
use crate::schema::{CellAddress, CellValue, ScoreResult};
use crate::scoring::ScoreReport;
use crate::workbook::Workbook;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// What a scorecard write touched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScorecardWrite {
    /// Copy taken before the workbook was first modified.
    pub backup_path: Option<PathBuf>,
    pub cells_written: usize,
    pub skipped_formula_cells: Vec<CellAddress>,
}

fn columns_for(layout: &ScorecardLayout, section: Section) -> &ScorecardColumns {
    match section {
        Section::Piotroski => &layout.piotroski,
        Section::C7Core | Section::C7Ranking => &layout.c7,
    }
}

fn note(result: &ScoreResult) -> String {
    if result.is_resolved() {
        format!("AUTO: {}", result.reasoning())
    } else {
        format!("MANUAL: {}", result.reasoning())
    }
}

fn periods(result: &ScoreResult) -> CellValue {
    let labels: Vec<String> = result
        .sources()
        .iter()
        .map(|s| s.period_or_column())
        .collect();
    if labels.is_empty() {
        CellValue::Empty
    } else {
        CellValue::Text(labels.join("; "))
    }
}

struct Writer<'w, W: Workbook + ?Sized> {
    workbook: &'w mut W,
    workbook_path: &'w Path,
    outcome: ScorecardWrite,
}

impl<W: Workbook + ?Sized> Writer<'_, W> {
    fn ensure_backup(&mut self) -> Result<()> {
        if self.outcome.backup_path.is_none() {
            self.outcome.backup_path = Some(create_backup(&*self.workbook, self.workbook_path)?);
        }
        Ok(())
    }

    fn protected(&mut self, address: &CellAddress) -> bool {
        if self.workbook.read(address).is_formula() {
            debug!("Leaving formula cell {} untouched", address);
            self.outcome.skipped_formula_cells.push(address.clone());
            return true;
        }
        false
    }

    fn literal(&mut self, address: CellAddress, value: CellValue) -> Result<()> {
        if self.protected(&address) {
            return Ok(());
        }
        self.ensure_backup()?;
        self.workbook.write(&address, value)?;
        self.outcome.cells_written += 1;
        Ok(())
    }

    /// The reference column is ours: a pointer left by an earlier run is replaced, any
    /// other formula is kept.
    fn reference(&mut self, address: CellAddress, result: &ScoreResult) -> Result<()> {
        let formula = self.workbook.read(&address).is_formula();
        self.ensure_backup()?;
        if formula && !self.workbook.clear_reference(&address)? {
            debug!("Leaving formula cell {} untouched", address);
            self.outcome.skipped_formula_cells.push(address);
            return Ok(());
        }
        match result.sources() {
            [single] => self.workbook.write_reference(&address, &single.address)?,
            [] => self.workbook.write(&address, CellValue::Empty)?,
            many => {
                let list: Vec<String> = many.iter().map(|s| s.address.to_string()).collect();
                self.workbook
                    .write(&address, CellValue::Text(list.join("; ")))?
            }
        }
        self.outcome.cells_written += 1;
        Ok(())
    }
}

/// Persists each result on its scorecard row: score, note, source reference and period
/// labels. Unresolved results clear the score cell. Formula cells are left as they are,
/// except for references this writer placed itself.
///
/// A backup of `workbook_path` is taken before the first write.
pub fn write_scorecard<W: Workbook + ?Sized>(
    workbook: &mut W,
    workbook_path: &Path,
    report: &ScoreReport,
    layout: &ScorecardLayout,
) -> Result<ScorecardWrite> {
    let mut writer = Writer {
        workbook,
        workbook_path,
        outcome: ScorecardWrite::default(),
    };

    for result in report.results() {
        let Some(criterion) = find(result.criterion()) else {
            warn!("No scorecard row for criterion '{}'", result.criterion());
            continue;
        };
        let columns = columns_for(layout, criterion.section);
        let cell = |col: u32| CellAddress::new(columns.sheet.as_str(), criterion.row, col);

        let score = match result.score() {
            Some(score) => CellValue::Number(f64::from(score)),
            None => CellValue::Empty,
        };
        writer.literal(cell(columns.score_col), score)?;
        writer.literal(cell(columns.note_col), CellValue::Text(note(result)))?;
        writer.reference(cell(columns.reference_col), result)?;
        writer.literal(cell(columns.period_col), periods(result))?;
    }

    let outcome = writer.outcome;
    if outcome.cells_written > 0 {
        writer.workbook.save()?;
    }
    info!(
        "Scorecard written: {} cells, {} formula cells kept",
        outcome.cells_written,
        outcome.skipped_formula_cells.len()
    );
    Ok(outcome)
}
