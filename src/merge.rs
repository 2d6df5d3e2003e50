//! Structure-safe merging of freshly exported statements into a workbook.
//!
//! A merge runs in two phases. Planning reads the workbook and the exports and decides
//! every cell change, formula replication and header write up front. Applying takes a
//! backup, replays the plan and saves. Nothing is written unless the whole plan could be
//! built and the backup succeeded.

use crate::backup::create_backup;
use crate::config::WorkbookLayout;
use crate::diff::has_blocking;
use crate::error::{NetNetError, Result};
use crate::schema::{CellAddress, CellValue, SheetRole, SheetSignature, StructureDiscrepancy};
use crate::structure::{StatementExport, StructureMapper};
use crate::utils::{format_plain, normalize_label};
use crate::workbook::Workbook;
use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Overwrite values of periods the workbook already has, matching rows by position.
    #[default]
    Update,
    /// Rebuild the raw sheets from the exports, matching rows by label. Used when the
    /// reporting cadence changed and period columns no longer line up.
    ReplaceAll,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MergeOptions {
    pub mode: MergeMode,

    /// Append export periods the workbook does not have yet.
    pub extend_periods: bool,

    /// Proceed even when the structure diff contains blocking discrepancies.
    pub allow_blocking: bool,

    /// Plan and report only. No backup is taken and nothing is written.
    pub preview: bool,
}

impl MergeOptions {
    pub fn update() -> Self {
        Self::default()
    }

    pub fn replace_all() -> Self {
        Self {
            mode: MergeMode::ReplaceAll,
            ..Self::default()
        }
    }

    pub fn with_extend_periods(mut self) -> Self {
        self.extend_periods = true;
        self
    }

    pub fn with_allow_blocking(mut self) -> Self {
        self.allow_blocking = true;
        self
    }

    pub fn with_preview(mut self) -> Self {
        self.preview = true;
        self
    }
}

/// One planned literal write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellChange {
    pub address: CellAddress,
    pub label: Option<String>,
    pub period: Option<String>,
    pub old: CellValue,
    pub new: CellValue,
}

/// A formula copied one column to the right on a calculation sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replication {
    pub sheet: String,
    pub row: u32,
    pub from_col: u32,
    pub to_col: u32,
}

/// A period column appended to a raw sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendedColumn {
    pub sheet: String,
    pub col: u32,
    pub period: String,
}

/// Everything a merge will do, decided before anything is written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergePlan {
    /// Raw-sheet writes, including period code and date cells of appended columns.
    pub changes: Vec<CellChange>,
    /// Calculation-sheet date header writes.
    pub headers: Vec<CellChange>,
    pub replications: Vec<Replication>,
    pub new_columns: Vec<AppendedColumn>,
    /// Target cells holding formulas that an export value would otherwise have replaced.
    pub skipped_formula_cells: Vec<CellAddress>,
    pub discrepancies: Vec<StructureDiscrepancy>,
}

impl MergePlan {
    /// True when applying the plan would not touch the workbook.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.headers.is_empty() && self.replications.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    pub backup_path: Option<PathBuf>,
    pub applied: bool,
    pub preview: bool,
    pub changes: Vec<CellChange>,
    pub header_changes: Vec<CellChange>,
    pub new_columns: Vec<AppendedColumn>,
    pub formulas_extended: usize,
    pub skipped_formula_cells: Vec<CellAddress>,
    pub discrepancies: Vec<StructureDiscrepancy>,
}

impl MergeReport {
    pub fn cells_changed(&self) -> usize {
        self.changes.len() + self.header_changes.len()
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Normalizes an export cell into the literal that would be written.
fn incoming(value: CellValue) -> CellValue {
    match value {
        CellValue::Formula { cached: Some(n) } => CellValue::Number(n),
        CellValue::Formula { cached: None } => CellValue::Empty,
        CellValue::Text(t) if t.trim().is_empty() => CellValue::Empty,
        other => other,
    }
}

fn literal_text(value: &CellValue) -> String {
    match value {
        CellValue::Number(n) | CellValue::Formula { cached: Some(n) } => format_plain(*n),
        CellValue::Text(t) => t.trim().to_string(),
        _ => String::new(),
    }
}

/// Two cells hold the same value when their numbers match or their trimmed text does.
fn equivalent(current: &CellValue, new: &CellValue) -> bool {
    match (current, new) {
        (CellValue::Number(a), CellValue::Number(b)) => a == b,
        _ => literal_text(current) == literal_text(new),
    }
}

#[derive(Debug)]
struct Staged {
    value: CellValue,
    label: Option<String>,
    period: Option<String>,
    header: bool,
}

struct Planner<'p, W: Workbook + ?Sized> {
    workbook: &'p W,
    layout: &'p WorkbookLayout,
    mapper: StructureMapper<'p>,
    staged: BTreeMap<CellAddress, Staged>,
    planned_formulas: HashSet<CellAddress>,
    extended_cols: BTreeSet<u32>,
    plan: MergePlan,
}

impl<'p, W: Workbook + ?Sized> Planner<'p, W> {
    fn new(workbook: &'p W, layout: &'p WorkbookLayout) -> Self {
        Self {
            workbook,
            layout,
            mapper: StructureMapper::new(layout),
            staged: BTreeMap::new(),
            planned_formulas: HashSet::new(),
            extended_cols: BTreeSet::new(),
            plan: MergePlan::default(),
        }
    }

    fn stage(
        &mut self,
        address: CellAddress,
        value: CellValue,
        label: Option<&str>,
        period: Option<&str>,
    ) {
        self.staged.insert(
            address,
            Staged {
                value,
                label: label.map(str::to_string),
                period: period.map(str::to_string),
                header: false,
            },
        );
    }

    fn stage_header(&mut self, address: CellAddress, value: CellValue, period: Option<&str>) {
        if self.planned_formulas.contains(&address) {
            return;
        }
        self.staged.insert(
            address,
            Staged {
                value,
                label: None,
                period: period.map(str::to_string),
                header: true,
            },
        );
    }

    fn is_formula(&self, address: &CellAddress) -> bool {
        self.planned_formulas.contains(address) || self.workbook.read(address).is_formula()
    }

    fn replicate(&mut self, sheet: &str, row: u32, from_col: u32, to_col: u32) {
        let source = CellAddress::new(sheet, row, from_col);
        let target = CellAddress::new(sheet, row, to_col);
        if !self.is_formula(&source)
            || self.planned_formulas.contains(&target)
            || !self.workbook.read(&target).is_blank()
        {
            return;
        }
        self.planned_formulas.insert(target);
        self.plan.replications.push(Replication {
            sheet: sheet.to_string(),
            row,
            from_col,
            to_col,
        });
    }

    /// Carries a raw period column into every calculation sheet that mirrors periods:
    /// formulas from the preceding mirror column and the period date in the header row.
    fn extend_calculations(&mut self, raw_col: u32, period: &str) {
        if !self.extended_cols.insert(raw_col) {
            return;
        }
        let layout = self.layout;
        for calc in &layout.calculation_sheets {
            if !calc.mirrors_periods || !self.workbook.has_sheet(&calc.name) {
                continue;
            }
            let Some(mirror) = calc.mirror_col(raw_col, layout.first_period_col) else {
                continue;
            };
            if mirror > calc.start_col {
                for row in 1..=calc.max_row {
                    self.replicate(&calc.name, row, mirror - 1, mirror);
                }
            }
            let header = CellAddress::new(calc.name.as_str(), calc.header_row, mirror);
            if !self.workbook.read(&header).is_formula() {
                self.stage_header(header, CellValue::text(period), Some(period));
            }
        }
    }

    fn export_value(export: &StatementExport<'_>, row: u32, col: u32) -> CellValue {
        incoming(export.workbook.read(&CellAddress::new(export.sheet, row, col)))
    }

    fn plan_update(&mut self, export: &StatementExport<'_>, extend_periods: bool) -> Result<()> {
        let target = self.mapper.find_raw_sheet(self.workbook, export.role)?;
        let baseline = self.mapper.map_sheet(self.workbook, &target, export.role);
        let candidate = self.mapper.map_sheet(export.workbook, export.sheet, export.role);
        let existing = baseline.columns_by_period();
        let layout = self.layout;

        let mut next_col = baseline
            .last_period_col()
            .map_or(layout.first_period_col, |col| col + 1);
        let mut appended: HashSet<String> = HashSet::new();

        for (&export_col, header) in &candidate.column_periods {
            let Some(period) = header.key() else { continue };

            if let Some(&col) = existing.get(period) {
                for (&row, label) in &baseline.row_labels {
                    let value = Self::export_value(export, row, export_col);
                    self.stage(
                        CellAddress::new(target.as_str(), row, col),
                        value,
                        Some(label),
                        Some(period),
                    );
                }
                continue;
            }

            if !extend_periods {
                debug!("Period {} is not in '{}'; leaving it out", period, target);
                continue;
            }
            if !appended.insert(period.to_string()) {
                continue;
            }
            if next_col > layout.last_period_col {
                warn!(
                    "No room for period {} on '{}' past column {}",
                    period, target, layout.last_period_col
                );
                continue;
            }

            let col = next_col;
            next_col += 1;
            info!("Appending period {} to '{}' at column {}", period, target, col);

            let code = header.code.clone().map(CellValue::Text).unwrap_or_default();
            self.stage(
                CellAddress::new(target.as_str(), layout.code_row, col),
                code,
                None,
                Some(period),
            );
            let date = match Self::export_value(export, layout.date_row, export_col) {
                CellValue::Empty => CellValue::text(period),
                value => value,
            };
            self.stage(
                CellAddress::new(target.as_str(), layout.date_row, col),
                date,
                None,
                Some(period),
            );
            for (&row, label) in &baseline.row_labels {
                let value = Self::export_value(export, row, export_col);
                self.stage(
                    CellAddress::new(target.as_str(), row, col),
                    value,
                    Some(label),
                    Some(period),
                );
            }
            self.plan.new_columns.push(AppendedColumn {
                sheet: target.clone(),
                col,
                period: period.to_string(),
            });
            self.extend_calculations(col, period);
        }
        Ok(())
    }

    fn plan_replace_all(&mut self, export: &StatementExport<'_>) -> Result<SheetSignature> {
        let target = self.mapper.find_raw_sheet(self.workbook, export.role)?;
        let baseline = self.mapper.map_sheet(self.workbook, &target, export.role);
        let candidate = self.mapper.map_sheet(export.workbook, export.sheet, export.role);
        let layout = self.layout;
        let columns = layout.first_period_col..=layout.last_period_col;

        let rows: Vec<u32> = [layout.code_row, layout.date_row]
            .into_iter()
            .chain(layout.first_label_row..=layout.last_label_row)
            .collect();
        for col in columns.clone() {
            for &row in &rows {
                let address = CellAddress::new(target.as_str(), row, col);
                let current = self.workbook.read(&address);
                if !current.is_blank() && !current.is_formula() {
                    self.stage(address, CellValue::Empty, None, None);
                }
            }
        }

        let period_of = |col: u32| candidate.column_periods.get(&col).and_then(|h| h.key());

        for col in columns.clone() {
            for row in [layout.code_row, layout.date_row] {
                let value = Self::export_value(export, row, col);
                if !value.is_blank() {
                    self.stage(
                        CellAddress::new(target.as_str(), row, col),
                        value,
                        None,
                        period_of(col),
                    );
                }
            }
        }

        let mut target_rows: HashMap<String, u32> = HashMap::new();
        for (&row, label) in &baseline.row_labels {
            target_rows.entry(normalize_label(label)).or_insert(row);
        }

        let mut seen = HashSet::new();
        let mut unmatched = 0usize;
        for (&export_row, label) in &candidate.row_labels {
            let key = normalize_label(label);
            if !seen.insert(key.clone()) {
                continue;
            }
            let Some(&row) = target_rows.get(&key) else {
                debug!("Export row '{}' has no match on '{}'", label, target);
                unmatched += 1;
                continue;
            };
            for col in columns.clone() {
                let value = Self::export_value(export, export_row, col);
                if !value.is_blank() {
                    self.stage(
                        CellAddress::new(target.as_str(), row, col),
                        value,
                        Some(label),
                        period_of(col),
                    );
                }
            }
        }
        if unmatched > 0 {
            warn!("{} export rows matched no label on '{}'", unmatched, target);
        }
        Ok(candidate)
    }

    /// Rewrites the date headers of every calculation sheet from a rebuilt raw sheet.
    fn sync_headers(&mut self, source: &SheetSignature) {
        let layout = self.layout;
        for calc in &layout.calculation_sheets {
            if !calc.mirrors_periods || !self.workbook.has_sheet(&calc.name) {
                continue;
            }
            for raw_col in layout.first_period_col..=layout.last_period_col {
                let Some(mirror) = calc.mirror_col(raw_col, layout.first_period_col) else {
                    continue;
                };
                let address = CellAddress::new(calc.name.as_str(), calc.header_row, mirror);
                let current = self.workbook.read(&address);
                if !current.is_blank() && !current.is_formula() {
                    self.stage_header(address, CellValue::Empty, None);
                }
            }
        }
        for (&col, header) in &source.column_periods {
            if let Some(period) = header.key() {
                self.extend_calculations(col, period);
            }
        }
    }

    fn finish(mut self) -> MergePlan {
        let staged = std::mem::take(&mut self.staged);
        for (address, staged) in staged {
            let current = self.workbook.read(&address);
            if current.is_formula() {
                if !staged.value.is_blank() {
                    self.plan.skipped_formula_cells.push(address);
                }
                continue;
            }
            if equivalent(&current, &staged.value) {
                continue;
            }
            let change = CellChange {
                address,
                label: staged.label,
                period: staged.period,
                old: current,
                new: staged.value,
            };
            if staged.header {
                self.plan.headers.push(change);
            } else {
                self.plan.changes.push(change);
            }
        }
        self.plan
    }
}

/// Plans and applies statement merges against one workbook layout.
#[derive(Debug, Clone)]
pub struct SafeMergeUpdater<'a> {
    layout: &'a WorkbookLayout,
    options: MergeOptions,
}

impl<'a> SafeMergeUpdater<'a> {
    pub fn new(layout: &'a WorkbookLayout, options: MergeOptions) -> Self {
        Self { layout, options }
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Decides every write without touching the workbook. In update mode, blocking
    /// discrepancies abort here unless explicitly allowed.
    pub fn plan<W: Workbook + ?Sized>(
        &self,
        workbook: &W,
        exports: &[StatementExport<'_>],
        discrepancies: &[StructureDiscrepancy],
    ) -> Result<MergePlan> {
        let mode = self.options.mode;
        if mode == MergeMode::Update && has_blocking(discrepancies) {
            if !self.options.allow_blocking {
                warn!("Merge aborted: structure diff has blocking discrepancies");
                return Err(NetNetError::BlockingDiscrepancies {
                    discrepancies: discrepancies.to_vec(),
                });
            }
            warn!("Proceeding despite blocking discrepancies");
        }

        let mut planner = Planner::new(workbook, self.layout);
        match mode {
            MergeMode::Update => {
                for export in exports {
                    planner.plan_update(export, self.options.extend_periods)?;
                }
            }
            MergeMode::ReplaceAll => {
                info!("Replace-all merge: rows matched by label");
                let mut rebuilt = Vec::with_capacity(exports.len());
                for export in exports {
                    rebuilt.push(planner.plan_replace_all(export)?);
                }
                let source = rebuilt
                    .iter()
                    .find(|s| s.role == SheetRole::IncomeStatement)
                    .or_else(|| rebuilt.first());
                if let Some(source) = source {
                    planner.sync_headers(source);
                }
            }
        }

        let mut plan = planner.finish();
        plan.discrepancies = discrepancies.to_vec();
        info!(
            "Merge plan: {} cell changes, {} header writes, {} formulas to extend, {} new columns",
            plan.changes.len(),
            plan.headers.len(),
            plan.replications.len(),
            plan.new_columns.len()
        );
        Ok(plan)
    }

    /// Backs up the workbook, replays `plan` and saves. An empty plan leaves the workbook
    /// and its directory alone.
    pub fn apply<W: Workbook + ?Sized>(
        &self,
        workbook: &mut W,
        workbook_path: &Path,
        plan: MergePlan,
    ) -> Result<MergeReport> {
        let mut report = MergeReport {
            backup_path: None,
            applied: false,
            preview: self.options.preview,
            changes: plan.changes,
            header_changes: plan.headers,
            new_columns: plan.new_columns,
            formulas_extended: 0,
            skipped_formula_cells: plan.skipped_formula_cells,
            discrepancies: plan.discrepancies,
        };

        if self.options.preview {
            report.formulas_extended = plan.replications.len();
            info!("Preview only: {} cells would change", report.cells_changed());
            return Ok(report);
        }
        if report.cells_changed() == 0 && plan.replications.is_empty() {
            info!("Workbook already up to date");
            return Ok(report);
        }

        report.backup_path = Some(create_backup(&*workbook, workbook_path)?);

        for change in report.changes.iter().chain(&report.header_changes) {
            workbook.write(&change.address, change.new.clone())?;
        }
        for replication in &plan.replications {
            if workbook.replicate_formula(
                &replication.sheet,
                replication.row,
                replication.from_col,
                replication.to_col,
            )? {
                report.formulas_extended += 1;
            }
        }
        workbook.save()?;
        report.applied = true;

        info!(
            "Merge applied: {} cells changed, {} formulas extended",
            report.cells_changed(),
            report.formulas_extended
        );
        Ok(report)
    }

    pub fn merge<W: Workbook + ?Sized>(
        &self,
        workbook: &mut W,
        workbook_path: &Path,
        exports: &[StatementExport<'_>],
        discrepancies: &[StructureDiscrepancy],
    ) -> Result<MergeReport> {
        let plan = self.plan(&*workbook, exports, discrepancies)?;
        self.apply(workbook, workbook_path, plan)
    }
}

pub fn merge_statements<W: Workbook + ?Sized>(
    workbook: &mut W,
    workbook_path: &Path,
    exports: &[StatementExport<'_>],
    discrepancies: &[StructureDiscrepancy],
    layout: &WorkbookLayout,
    options: MergeOptions,
) -> Result<MergeReport> {
    SafeMergeUpdater::new(layout, options).merge(workbook, workbook_path, exports, discrepancies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff_signatures;
    use crate::schema::DiscrepancyKind;
    use crate::workbook::MemoryWorkbook;

    const IS: &str = "almedio_IS";
    const BS: &str = "almedio_BS";

    fn target_workbook(dir: &tempfile::TempDir) -> (MemoryWorkbook, PathBuf) {
        let mut wb = MemoryWorkbook::new();
        wb.set_text(IS, 2, 3, "Almedio Inc");
        wb.set_text(IS, 8, 4, "FY2023Q4");
        wb.set_text(IS, 8, 5, "FY2024Q1");
        wb.set_text(IS, 10, 4, "2023-12-31");
        wb.set_text(IS, 10, 5, "2024-03-31");
        wb.set_text(IS, 12, 3, "Revenue");
        wb.set_number(IS, 12, 4, 100.0);
        wb.set_number(IS, 12, 5, 110.0);
        wb.set_text(IS, 13, 3, "Net Income");
        wb.set_number(IS, 13, 4, 10.0);
        wb.set_number(IS, 13, 5, 11.0);
        wb.set_text(IS, 14, 3, "Net Margin");
        wb.set_formula(IS, 14, 4, "=D13/D12", Some(0.1));
        wb.set_formula(IS, 14, 5, "=E13/E12", Some(0.1));

        wb.set_text(BS, 10, 4, "2023-12-31");
        wb.set_text(BS, 10, 5, "2024-03-31");
        wb.set_text(BS, 12, 3, "Cash");
        wb.set_number(BS, 12, 4, 50.0);
        wb.set_number(BS, 12, 5, 55.0);

        wb.set_text("ncav", 1, 4, "2023-12-31");
        wb.set_text("ncav", 1, 5, "2024-03-31");
        wb.set_formula("ncav", 5, 4, "=almedio_BS!D12*2", Some(100.0));
        wb.set_formula("ncav", 5, 5, "=almedio_BS!E12*2", Some(110.0));
        wb.set_formula("piotrosky", 3, 5, "=ncav!E5", Some(110.0));

        let path = dir.path().join("almedio.json");
        wb.save_as(&path).unwrap();
        (wb, path)
    }

    fn export_workbook(revenue_label: &str) -> MemoryWorkbook {
        let mut wb = MemoryWorkbook::new();
        let s = "Export_IS";
        wb.set_text(s, 2, 3, "Almedio Inc");
        for (col, code, date) in [
            (4, "FY2023Q4", "2023-12-31"),
            (5, "FY2024Q1", "2024-03-31"),
            (6, "FY2024Q2", "2024-06-30"),
        ] {
            wb.set_text(s, 8, col, code);
            wb.set_text(s, 10, col, date);
        }
        wb.set_text(s, 12, 3, revenue_label);
        wb.set_number(s, 12, 4, 100.0);
        wb.set_number(s, 12, 5, 115.0);
        wb.set_number(s, 12, 6, 120.0);
        wb.set_text(s, 13, 3, "Net Income");
        wb.set_number(s, 13, 4, 10.0);
        wb.set_number(s, 13, 5, 11.0);
        wb.set_number(s, 13, 6, 12.0);
        wb.set_text(s, 14, 3, "Net Margin");
        wb.set_number(s, 14, 4, 0.1);
        wb.set_number(s, 14, 5, 0.0957);

        let b = "Export_BS";
        for (col, date) in [(4, "2023-12-31"), (5, "2024-03-31"), (6, "2024-06-30")] {
            wb.set_text(b, 10, col, date);
        }
        wb.set_text(b, 12, 3, "Cash");
        wb.set_number(b, 12, 4, 50.0);
        wb.set_text(b, 12, 5, " 55 ");
        wb.set_number(b, 12, 6, 60.0);
        wb
    }

    fn exports(wb: &MemoryWorkbook) -> Vec<StatementExport<'_>> {
        vec![
            StatementExport::new(SheetRole::IncomeStatement, wb, "Export_IS"),
            StatementExport::new(SheetRole::BalanceSheet, wb, "Export_BS"),
        ]
    }

    fn diff_for(
        wb: &MemoryWorkbook,
        exports: &[StatementExport<'_>],
        layout: &WorkbookLayout,
    ) -> Vec<StructureDiscrepancy> {
        let mapper = StructureMapper::new(layout);
        let baseline = mapper.map_workbook(wb).unwrap();
        diff_signatures(&baseline, &mapper.map_exports(exports))
    }

    fn files_in(dir: &tempfile::TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[test]
    fn test_update_changes_values_and_keeps_formulas() {
        let dir = tempfile::tempdir().unwrap();
        let (mut wb, path) = target_workbook(&dir);
        let export_wb = export_workbook("Revenue");
        let exports = exports(&export_wb);
        let layout = WorkbookLayout::default();
        let diff = diff_for(&wb, &exports, &layout);
        assert!(!has_blocking(&diff));

        let report =
            merge_statements(&mut wb, &path, &exports, &diff, &layout, MergeOptions::update())
                .unwrap();

        assert!(report.applied);
        assert_eq!(report.changes.len(), 1, "only E12 differs: {:?}", report.changes);
        let change = &report.changes[0];
        assert_eq!(change.address, CellAddress::new(IS, 12, 5));
        assert_eq!(change.label.as_deref(), Some("Revenue"));
        assert_eq!(change.period.as_deref(), Some("2024-03-31"));
        assert_eq!(change.old, CellValue::Number(110.0));
        assert_eq!(change.new, CellValue::Number(115.0));
        assert!(report.new_columns.is_empty());

        assert_eq!(wb.read(&CellAddress::new(IS, 12, 5)), CellValue::Number(115.0));
        assert_eq!(wb.formula_text(&CellAddress::new(IS, 14, 5)), Some("=E13/E12"));
        assert!(report
            .skipped_formula_cells
            .contains(&CellAddress::new(IS, 14, 5)));

        let backup = report.backup_path.unwrap();
        assert!(backup.exists());
        let saved = MemoryWorkbook::open(&path).unwrap();
        assert_eq!(saved.read(&CellAddress::new(IS, 12, 5)), CellValue::Number(115.0));
    }

    #[test]
    fn test_backup_failure_leaves_workbook_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let (mut wb, _) = target_workbook(&dir);
        let export_wb = export_workbook("Revenue");
        let exports = exports(&export_wb);
        let layout = WorkbookLayout::default();
        let diff = diff_for(&wb, &exports, &layout);
        let before = wb.clone();

        let unreachable = dir.path().join("gone").join("almedio.json");
        let updater = SafeMergeUpdater::new(&layout, MergeOptions::update());
        let plan = updater.plan(&wb, &exports, &diff).unwrap();
        assert!(!plan.is_empty());

        let err = merge_statements(
            &mut wb,
            &unreachable,
            &exports,
            &diff,
            &layout,
            MergeOptions::update(),
        )
        .unwrap_err();
        assert!(matches!(err, NetNetError::BackupFailure { .. }));
        assert_eq!(wb, before);
        assert!(!dir.path().join("gone").exists());
    }

    #[test]
    fn test_reapplying_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut wb, path) = target_workbook(&dir);
        let export_wb = export_workbook("Revenue");
        let exports = exports(&export_wb);
        let layout = WorkbookLayout::default();
        let options = MergeOptions::update().with_extend_periods();

        let diff = diff_for(&wb, &exports, &layout);
        merge_statements(&mut wb, &path, &exports, &diff, &layout, options.clone()).unwrap();
        let after_first = wb.clone();
        let files_after_first = files_in(&dir);

        let diff = diff_for(&wb, &exports, &layout);
        let second = merge_statements(&mut wb, &path, &exports, &diff, &layout, options).unwrap();
        assert!(!second.applied);
        assert_eq!(second.cells_changed(), 0);
        assert_eq!(second.formulas_extended, 0);
        assert!(second.backup_path.is_none());
        assert_eq!(wb, after_first);
        assert_eq!(files_in(&dir), files_after_first);
    }

    #[test]
    fn test_blocking_discrepancy_aborts_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut wb, path) = target_workbook(&dir);
        let before = wb.clone();
        let export_wb = export_workbook("Total Revenue");
        let exports = exports(&export_wb);
        let layout = WorkbookLayout::default();
        let diff = diff_for(&wb, &exports, &layout);

        let err = merge_statements(&mut wb, &path, &exports, &diff, &layout, MergeOptions::update())
            .unwrap_err();
        match err {
            NetNetError::BlockingDiscrepancies { discrepancies } => {
                assert!(discrepancies
                    .iter()
                    .any(|d| d.kind == DiscrepancyKind::LabelMismatch));
                assert_eq!(discrepancies, diff);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(wb, before);
        assert_eq!(files_in(&dir), 1);
    }

    #[test]
    fn test_allow_blocking_proceeds() {
        let dir = tempfile::tempdir().unwrap();
        let (mut wb, path) = target_workbook(&dir);
        let export_wb = export_workbook("Total Revenue");
        let exports = exports(&export_wb);
        let layout = WorkbookLayout::default();
        let diff = diff_for(&wb, &exports, &layout);

        let options = MergeOptions::update().with_allow_blocking();
        let report = merge_statements(&mut wb, &path, &exports, &diff, &layout, options).unwrap();
        assert!(report.applied);
        assert!(has_blocking(&report.discrepancies));
    }

    #[test]
    fn test_preview_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut wb, path) = target_workbook(&dir);
        let before = wb.clone();
        let export_wb = export_workbook("Revenue");
        let exports = exports(&export_wb);
        let layout = WorkbookLayout::default();
        let diff = diff_for(&wb, &exports, &layout);

        let options = MergeOptions::update().with_extend_periods().with_preview();
        let report = merge_statements(&mut wb, &path, &exports, &diff, &layout, options).unwrap();
        assert!(report.preview);
        assert!(!report.applied);
        assert!(report.backup_path.is_none());
        assert!(!report.changes.is_empty());
        assert_eq!(report.formulas_extended, 1);
        assert_eq!(wb, before);
        assert_eq!(files_in(&dir), 1);
    }

    #[test]
    fn test_extend_appends_period_and_replicates_formulas() {
        let dir = tempfile::tempdir().unwrap();
        let (mut wb, path) = target_workbook(&dir);
        let export_wb = export_workbook("Revenue");
        let exports = exports(&export_wb);
        let layout = WorkbookLayout::default();
        let diff = diff_for(&wb, &exports, &layout);

        let options = MergeOptions::update().with_extend_periods();
        let report = merge_statements(&mut wb, &path, &exports, &diff, &layout, options).unwrap();

        assert_eq!(report.new_columns.len(), 2);
        assert!(report.new_columns.iter().all(|c| c.col == 6));
        assert_eq!(wb.read(&CellAddress::new(IS, 8, 6)), CellValue::text("FY2024Q2"));
        assert_eq!(wb.read(&CellAddress::new(IS, 10, 6)), CellValue::text("2024-06-30"));
        assert_eq!(wb.read(&CellAddress::new(IS, 12, 6)), CellValue::Number(120.0));
        assert_eq!(wb.read(&CellAddress::new(IS, 13, 6)), CellValue::Number(12.0));
        assert_eq!(wb.read(&CellAddress::new(BS, 12, 6)), CellValue::Number(60.0));

        assert_eq!(report.formulas_extended, 1);
        assert_eq!(
            wb.formula_text(&CellAddress::new("ncav", 5, 6)),
            Some("=almedio_BS!F12*2")
        );
        assert_eq!(wb.formula_text(&CellAddress::new("ncav", 5, 5)), Some("=almedio_BS!E12*2"));
        assert_eq!(wb.read(&CellAddress::new("ncav", 1, 6)), CellValue::text("2024-06-30"));
        assert_eq!(report.header_changes.len(), 1);
        assert_eq!(wb.read(&CellAddress::new("piotrosky", 3, 6)), CellValue::Empty);
        assert_eq!(wb.read(&CellAddress::new("piotrosky", 1, 6)), CellValue::Empty);
    }

    #[test]
    fn test_replace_all_matches_rows_by_label() {
        let dir = tempfile::tempdir().unwrap();
        let (mut wb, path) = target_workbook(&dir);

        let mut export_wb = MemoryWorkbook::new();
        let s = "Almedio_H_IS";
        wb.set_number(IS, 12, 6, 999.0);
        for (col, code, date) in [(4, "FY2023H1", "2023-06-30"), (5, "FY2023H2", "2023-12-31")] {
            export_wb.set_text(s, 8, col, code);
            export_wb.set_text(s, 10, col, date);
        }
        export_wb.set_text(s, 12, 3, "net income");
        export_wb.set_number(s, 12, 4, 5.0);
        export_wb.set_number(s, 12, 5, 9.0);
        export_wb.set_text(s, 13, 3, "Revenue ");
        export_wb.set_number(s, 13, 4, 50.0);
        export_wb.set_number(s, 13, 5, 90.0);
        export_wb.set_text(s, 20, 3, "Extraordinary Items");
        export_wb.set_number(s, 20, 4, 1.0);
        let exports = [StatementExport::new(SheetRole::IncomeStatement, &export_wb, s)];

        let layout = WorkbookLayout::default();
        let report = merge_statements(
            &mut wb,
            &path,
            &exports,
            &[],
            &layout,
            MergeOptions::replace_all(),
        )
        .unwrap();
        assert!(report.applied);
        assert!(report.backup_path.is_some());

        assert_eq!(wb.read(&CellAddress::new(IS, 12, 4)), CellValue::Number(50.0));
        assert_eq!(wb.read(&CellAddress::new(IS, 12, 5)), CellValue::Number(90.0));
        assert_eq!(wb.read(&CellAddress::new(IS, 13, 4)), CellValue::Number(5.0));
        assert_eq!(wb.read(&CellAddress::new(IS, 13, 5)), CellValue::Number(9.0));
        assert_eq!(wb.read(&CellAddress::new(IS, 12, 6)), CellValue::Empty);
        assert_eq!(wb.read(&CellAddress::new(IS, 10, 4)), CellValue::text("2023-06-30"));
        assert_eq!(wb.read(&CellAddress::new(IS, 8, 5)), CellValue::text("FY2023H2"));
        assert_eq!(wb.read(&CellAddress::new(IS, 20, 4)), CellValue::Empty);
        assert_eq!(wb.formula_text(&CellAddress::new(IS, 14, 4)), Some("=D13/D12"));

        assert_eq!(wb.read(&CellAddress::new("ncav", 1, 4)), CellValue::text("2023-06-30"));
        assert_eq!(wb.read(&CellAddress::new("ncav", 1, 5)), CellValue::text("2023-12-31"));
        assert_eq!(wb.read(&CellAddress::new(BS, 12, 5)), CellValue::Number(55.0));
    }

    #[test]
    fn test_value_equivalence() {
        assert!(equivalent(&CellValue::Number(55.0), &CellValue::text(" 55 ")));
        assert!(equivalent(&CellValue::Empty, &CellValue::Empty));
        assert!(!equivalent(&CellValue::Number(55.0), &CellValue::Number(55.5)));
        assert!(!equivalent(&CellValue::text("abc"), &CellValue::Empty));
    }
}
