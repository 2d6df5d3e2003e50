use crate::config::{CalculationSheet, WorkbookLayout};
use crate::schema::{CellAddress, CellRef, CellValue};
use crate::utils::period_label;
use crate::workbook::Workbook;
use log::trace;

/// The columns a row scan inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub start_col: u32,
    pub max_width: u32,
    /// Stop after this many consecutive unusable cells once data has been found.
    pub max_gap: Option<u32>,
    /// Row holding the period label for each column.
    pub header_row: Option<u32>,
}

impl ScanWindow {
    pub fn new(start_col: u32, max_width: u32) -> Self {
        Self {
            start_col,
            max_width,
            max_gap: Some(3),
            header_row: None,
        }
    }

    pub fn for_calculation_sheet(sheet: &CalculationSheet, layout: &WorkbookLayout) -> Self {
        Self {
            start_col: sheet.start_col,
            max_width: layout.scan_width,
            max_gap: layout.scan_max_gap,
            header_row: Some(sheet.header_row),
        }
    }

    pub fn with_header_row(mut self, row: u32) -> Self {
        self.header_row = Some(row);
        self
    }

    pub fn without_gap_limit(mut self) -> Self {
        self.max_gap = None;
        self
    }

    fn columns(&self) -> std::ops::Range<u32> {
        self.start_col..self.start_col.saturating_add(self.max_width)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub address: CellAddress,
    pub value: f64,
    pub period: Option<String>,
}

impl SeriesPoint {
    pub fn to_cell_ref(&self) -> CellRef {
        CellRef {
            address: self.address.clone(),
            value: self.value,
            period: self.period.clone(),
        }
    }
}

/// Numeric values of one row, oldest column first.
///
/// Points are strictly column-ascending and every value is finite.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    points: Vec<SeriesPoint>,
}

impl Series {
    pub fn from_points(mut points: Vec<SeriesPoint>) -> Self {
        points.retain(|p| p.value.is_finite());
        points.sort_by_key(|p| p.address.col);
        points.dedup_by_key(|p| p.address.col);
        Self { points }
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn latest(&self) -> Option<&SeriesPoint> {
        self.points.last()
    }

    /// The point `back` positions before the latest; `back == 0` is the latest itself.
    pub fn from_end(&self, back: usize) -> Option<&SeriesPoint> {
        self.points
            .len()
            .checked_sub(back + 1)
            .and_then(|i| self.points.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SeriesPoint> {
        self.points.iter()
    }
}

const PLACEHOLDERS: [&str; 9] = ["", "NA", "N/A", "-", "--", "—", "–", "n.a.", "nm"];

const CURRENCY_SYMBOLS: [char; 6] = ['$', '¥', '€', '£', '₩', '円'];

/// Reads a usable number out of a cell, or `None` when the cell is a placeholder.
pub fn parse_numeric(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::Number(n) if n.is_finite() => Some(*n),
        CellValue::Text(text) => parse_numeric_text(text),
        CellValue::Formula { cached: Some(n) } if n.is_finite() => Some(*n),
        _ => None,
    }
}

/// Parses the number formats statement exports use: thousands separators,
/// trailing percent signs, parenthesised negatives and currency symbols.
pub fn parse_numeric_text(text: &str) -> Option<f64> {
    let compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    if PLACEHOLDERS
        .iter()
        .any(|p| p.eq_ignore_ascii_case(&compact))
    {
        return None;
    }

    let mut negative = false;
    let mut body = compact.as_str();

    if let Some(inner) = body.strip_prefix('(').and_then(|b| b.strip_suffix(')')) {
        negative = true;
        body = inner;
    }

    let percent = body.ends_with('%');
    body = body.trim_end_matches('%');

    if let Some(rest) = body.strip_prefix('-') {
        negative = !negative;
        body = rest;
    }
    body = body.trim_start_matches(&CURRENCY_SYMBOLS[..]);
    body = body.trim_end_matches(&CURRENCY_SYMBOLS[..]);
    if let Some(rest) = body.strip_prefix('-') {
        negative = !negative;
        body = rest;
    }

    let mut value = body.parse::<f64>().ok().filter(|v| v.is_finite())?;
    if percent {
        value /= 100.0;
    }
    if negative {
        value = -value;
    }
    Some(value)
}

/// Scans one row within `window` and collects every usable numeric cell.
pub fn extract_series<W: Workbook + ?Sized>(
    workbook: &W,
    sheet: &str,
    row: u32,
    window: &ScanWindow,
) -> Series {
    let mut points = Vec::new();
    let mut gap = 0u32;

    for col in window.columns() {
        let address = CellAddress::new(sheet, row, col);
        match parse_numeric(&workbook.read(&address)) {
            Some(value) => {
                gap = 0;
                let period = window
                    .header_row
                    .and_then(|r| period_label(&workbook.read(&CellAddress::new(sheet, r, col))));
                points.push(SeriesPoint {
                    address,
                    value,
                    period,
                });
            }
            None => {
                gap += 1;
                if matches!(window.max_gap, Some(max) if gap >= max && !points.is_empty()) {
                    break;
                }
            }
        }
    }

    trace!("{} row {}: {} points", sheet, row, points.len());
    Series::from_points(points)
}
