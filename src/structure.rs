use crate::config::WorkbookLayout;
use crate::error::{NetNetError, Result};
use crate::schema::{
    CellAddress, CellValue, PeriodHeader, SheetRole, SheetSignature, StructuralSignature,
};
use crate::utils::{format_plain, period_label};
use crate::workbook::Workbook;
use chrono::Local;
use log::{debug, info};

/// One raw statement sheet of a downloaded export, with the role it plays.
#[derive(Clone, Copy)]
pub struct StatementExport<'a> {
    pub role: SheetRole,
    pub workbook: &'a dyn Workbook,
    pub sheet: &'a str,
}

impl<'a> StatementExport<'a> {
    pub fn new(role: SheetRole, workbook: &'a dyn Workbook, sheet: &'a str) -> Self {
        Self {
            role,
            workbook,
            sheet,
        }
    }
}

impl std::fmt::Debug for StatementExport<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementExport")
            .field("role", &self.role)
            .field("sheet", &self.sheet)
            .finish()
    }
}

/// Text of a label or period-code cell.
fn cell_text(value: &CellValue) -> Option<String> {
    match value {
        CellValue::Text(t) if !t.trim().is_empty() => Some(t.trim().to_string()),
        CellValue::Number(n) if n.is_finite() => Some(format_plain(*n)),
        _ => None,
    }
}

/// Reads structural signatures out of workbooks that follow the raw-sheet layout.
#[derive(Debug, Clone, Copy)]
pub struct StructureMapper<'a> {
    layout: &'a WorkbookLayout,
}

impl<'a> StructureMapper<'a> {
    pub fn new(layout: &'a WorkbookLayout) -> Self {
        Self { layout }
    }

    /// First sheet whose name ends with the role's suffix, ignoring case.
    pub fn find_raw_sheet<W: Workbook + ?Sized>(
        &self,
        workbook: &W,
        role: SheetRole,
    ) -> Result<String> {
        let suffix = self.layout.suffix_for(role).unwrap_or_default();
        let wanted = suffix.to_lowercase();
        workbook
            .sheet_names()
            .into_iter()
            .find(|name| !wanted.is_empty() && name.to_lowercase().ends_with(&wanted))
            .ok_or_else(|| NetNetError::MissingSheet {
                role: role.to_string(),
                suffix: suffix.to_string(),
            })
    }

    pub fn map_sheet<W: Workbook + ?Sized>(
        &self,
        workbook: &W,
        sheet: &str,
        role: SheetRole,
    ) -> SheetSignature {
        let layout = self.layout;
        let mut signature = SheetSignature::new(sheet, role);

        for row in layout.first_label_row..=layout.last_label_row {
            let value = workbook.read(&CellAddress::new(sheet, row, layout.label_col));
            if let Some(label) = cell_text(&value) {
                signature.row_labels.insert(row, label);
            }
        }

        for col in layout.first_period_col..=layout.last_period_col {
            let header = PeriodHeader {
                date: period_label(&workbook.read(&CellAddress::new(sheet, layout.date_row, col))),
                code: cell_text(&workbook.read(&CellAddress::new(sheet, layout.code_row, col))),
            };
            if header.key().is_some() {
                signature.column_periods.insert(col, header);
            }
        }

        debug!(
            "Mapped '{}' ({}): {} labelled rows, {} period columns",
            sheet,
            role,
            signature.row_labels.len(),
            signature.column_periods.len()
        );
        signature
    }

    /// Maps both raw statement sheets of a workbook. A missing raw sheet is an error.
    pub fn map_workbook<W: Workbook + ?Sized>(&self, workbook: &W) -> Result<StructuralSignature> {
        let mut signature = StructuralSignature::new(Local::now().naive_local());

        for role in SheetRole::RAW {
            let sheet = self.find_raw_sheet(workbook, role)?;
            signature.sheets.push(self.map_sheet(workbook, &sheet, role));
        }

        if let Some(is_sheet) = signature.sheet(SheetRole::IncomeStatement) {
            let name = workbook.read(&CellAddress::new(
                is_sheet.sheet_name.as_str(),
                self.layout.company_name_row,
                self.layout.company_name_col,
            ));
            signature.company_name = cell_text(&name);
        }

        signature.calculation_sheets = self
            .layout
            .calculation_sheets
            .iter()
            .filter(|c| workbook.has_sheet(&c.name))
            .map(|c| c.name.clone())
            .collect();

        info!(
            "Mapped workbook structure for {}",
            signature.company_name.as_deref().unwrap_or("unnamed company")
        );
        Ok(signature)
    }

    /// Maps freshly downloaded export sheets. Each export supplies its own role.
    pub fn map_exports(&self, exports: &[StatementExport<'_>]) -> StructuralSignature {
        let mut signature = StructuralSignature::new(Local::now().naive_local());
        for export in exports {
            signature
                .sheets
                .push(self.map_sheet(export.workbook, export.sheet, export.role));
            if export.role == SheetRole::IncomeStatement && signature.company_name.is_none() {
                let name = export.workbook.read(&CellAddress::new(
                    export.sheet,
                    self.layout.company_name_row,
                    self.layout.company_name_col,
                ));
                signature.company_name = cell_text(&name);
            }
        }
        signature.sheets.sort_by_key(|s| s.role);
        signature
    }
}
