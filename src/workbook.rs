//! The workbook boundary.
//!
//! Scoring and merging only ever see a [`Workbook`]: a set of named sheets made of
//! addressable cells, each either a literal or an opaque formula. [`MemoryWorkbook`] is
//! the in-process implementation, persisted as JSON.

use crate::error::{NetNetError, Result};
use crate::schema::{CellAddress, CellValue};
use crate::utils::{a1, column_index, column_letter, parse_a1};
use log::debug;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

pub trait Workbook {
    fn sheet_names(&self) -> Vec<String>;

    fn has_sheet(&self, name: &str) -> bool {
        self.sheet_names().iter().any(|s| s == name)
    }

    /// Reads a cell. Unknown sheets and unset cells read as [`CellValue::Empty`].
    fn read(&self, address: &CellAddress) -> CellValue;

    /// Writes a literal. Fails if the target holds a formula or if `value` is a formula.
    fn write(&mut self, address: &CellAddress, value: CellValue) -> Result<()>;

    /// Writes a formula pointing at a single other cell.
    fn write_reference(&mut self, address: &CellAddress, target: &CellAddress) -> Result<()>;

    /// Blanks the cell if it holds a formula that only points at one other cell, as
    /// written by [`Workbook::write_reference`]. Returns `false` and leaves the cell alone
    /// for literals and for any other formula.
    fn clear_reference(&mut self, address: &CellAddress) -> Result<bool>;

    /// Copies the formula at (`row`, `from_col`) into (`row`, `to_col`), shifting its
    /// relative column references. Returns `false` when the source is not a formula or the
    /// target already holds one.
    fn replicate_formula(&mut self, sheet: &str, row: u32, from_col: u32, to_col: u32)
        -> Result<bool>;

    fn copy_to(&self, path: &Path) -> Result<()>;

    /// Flushes pending writes to the workbook's backing store.
    fn save(&mut self) -> Result<()>;
}

/// Grid coordinate within one sheet, serialized in A1 form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridPos {
    pub row: u32,
    pub col: u32,
}

impl GridPos {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", a1(self.row, self.col))
    }
}

impl FromStr for GridPos {
    type Err = NetNetError;

    fn from_str(s: &str) -> Result<Self> {
        let (row, col) = parse_a1(s)?;
        Ok(GridPos::new(row, col))
    }
}

impl Serialize for GridPos {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for GridPos {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        GridPos::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoredCell {
    Number(f64),
    Text(String),
    Formula {
        expr: String,
        #[serde(default)]
        cached: Option<f64>,
    },
}

impl StoredCell {
    fn to_value(&self) -> CellValue {
        match self {
            StoredCell::Number(n) => CellValue::Number(*n),
            StoredCell::Text(t) => CellValue::Text(t.clone()),
            StoredCell::Formula { cached, .. } => CellValue::Formula { cached: *cached },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySheet {
    pub name: String,
    #[serde(default)]
    pub cells: BTreeMap<GridPos, StoredCell>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryWorkbook {
    sheets: Vec<MemorySheet>,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut workbook: MemoryWorkbook = serde_json::from_str(&contents)?;
        workbook.path = Some(path.to_path_buf());
        debug!(
            "Opened workbook {} with {} sheets",
            path.display(),
            workbook.sheets.len()
        );
        Ok(workbook)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Writes the workbook to `path` and makes it the backing file for later saves.
    pub fn save_as(&mut self, path: &Path) -> Result<()> {
        self.path = Some(path.to_path_buf());
        self.save()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn add_sheet(&mut self, name: &str) -> &mut MemorySheet {
        let index = match self.sheets.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.sheets.push(MemorySheet {
                    name: name.to_string(),
                    cells: BTreeMap::new(),
                });
                self.sheets.len() - 1
            }
        };
        &mut self.sheets[index]
    }

    pub fn set_number(&mut self, sheet: &str, row: u32, col: u32, value: f64) {
        self.put(sheet, row, col, StoredCell::Number(value));
    }

    pub fn set_text(&mut self, sheet: &str, row: u32, col: u32, value: &str) {
        self.put(sheet, row, col, StoredCell::Text(value.to_string()));
    }

    /// Stores a formula with an optional last-evaluated result. A leading `=` is added
    /// when missing.
    pub fn set_formula(
        &mut self,
        sheet: &str,
        row: u32,
        col: u32,
        expr: &str,
        cached: Option<f64>,
    ) {
        let expr = if expr.starts_with('=') {
            expr.to_string()
        } else {
            format!("={}", expr)
        };
        self.put(sheet, row, col, StoredCell::Formula { expr, cached });
    }

    pub fn formula_text(&self, address: &CellAddress) -> Option<&str> {
        match self.cell(address) {
            Some(StoredCell::Formula { expr, .. }) => Some(expr.as_str()),
            _ => None,
        }
    }

    /// Number of populated cells on a sheet.
    pub fn cell_count(&self, sheet: &str) -> usize {
        self.sheet(sheet).map(|s| s.cells.len()).unwrap_or(0)
    }

    fn put(&mut self, sheet: &str, row: u32, col: u32, cell: StoredCell) {
        self.add_sheet(sheet).cells.insert(GridPos::new(row, col), cell);
    }

    fn sheet(&self, name: &str) -> Option<&MemorySheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    fn sheet_mut(&mut self, name: &str) -> Result<&mut MemorySheet> {
        self.sheets
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| NetNetError::UnknownSheet(name.to_string()))
    }

    fn cell(&self, address: &CellAddress) -> Option<&StoredCell> {
        self.sheet(&address.sheet)
            .and_then(|s| s.cells.get(&GridPos::new(address.row, address.col)))
    }
}

impl Workbook for MemoryWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    fn read(&self, address: &CellAddress) -> CellValue {
        self.cell(address)
            .map(StoredCell::to_value)
            .unwrap_or(CellValue::Empty)
    }

    fn write(&mut self, address: &CellAddress, value: CellValue) -> Result<()> {
        let sheet = self.sheet_mut(&address.sheet)?;
        let pos = GridPos::new(address.row, address.col);
        if matches!(sheet.cells.get(&pos), Some(StoredCell::Formula { .. })) {
            return Err(NetNetError::FormulaCellProtected(address.to_string()));
        }
        match value {
            CellValue::Number(n) => {
                sheet.cells.insert(pos, StoredCell::Number(n));
            }
            CellValue::Text(t) => {
                sheet.cells.insert(pos, StoredCell::Text(t));
            }
            CellValue::Empty => {
                sheet.cells.remove(&pos);
            }
            CellValue::Formula { .. } => {
                return Err(NetNetError::LiteralRequired(address.to_string()));
            }
        }
        Ok(())
    }

    fn write_reference(&mut self, address: &CellAddress, target: &CellAddress) -> Result<()> {
        let cached = match self.read(target) {
            CellValue::Number(n) => Some(n),
            CellValue::Formula { cached } => cached,
            _ => None,
        };
        let expr = if target.sheet == address.sheet {
            format!("={}", target.a1())
        } else {
            format!("={}", target.qualified())
        };
        let sheet = self.sheet_mut(&address.sheet)?;
        let pos = GridPos::new(address.row, address.col);
        if matches!(sheet.cells.get(&pos), Some(StoredCell::Formula { .. })) {
            return Err(NetNetError::FormulaCellProtected(address.to_string()));
        }
        sheet.cells.insert(pos, StoredCell::Formula { expr, cached });
        Ok(())
    }

    fn clear_reference(&mut self, address: &CellAddress) -> Result<bool> {
        let sheet = self.sheet_mut(&address.sheet)?;
        let pos = GridPos::new(address.row, address.col);
        let is_pointer = match sheet.cells.get(&pos) {
            Some(StoredCell::Formula { expr, .. }) => pointer_pattern().is_match(expr.trim()),
            _ => false,
        };
        if is_pointer {
            sheet.cells.remove(&pos);
        }
        Ok(is_pointer)
    }

    fn replicate_formula(
        &mut self,
        sheet: &str,
        row: u32,
        from_col: u32,
        to_col: u32,
    ) -> Result<bool> {
        let sheet = self.sheet_mut(sheet)?;
        let source = match sheet.cells.get(&GridPos::new(row, from_col)) {
            Some(StoredCell::Formula { expr, .. }) => expr.clone(),
            _ => return Ok(false),
        };
        let target = GridPos::new(row, to_col);
        if matches!(sheet.cells.get(&target), Some(StoredCell::Formula { .. })) {
            return Ok(false);
        }
        let delta = i64::from(to_col) - i64::from(from_col);
        let expr = shift_formula_columns(&source, delta);
        debug!("{}!{}: {} -> {}", sheet.name, target, source, expr);
        sheet
            .cells
            .insert(target, StoredCell::Formula { expr, cached: None });
        Ok(true)
    }

    fn copy_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        let path = self.path.clone().ok_or_else(|| {
            NetNetError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "workbook has no backing file",
            ))
        })?;
        self.copy_to(&path)
    }
}

fn reference_pattern() -> &'static Regex {
    static CELL_REF_RE: OnceLock<Regex> = OnceLock::new();
    CELL_REF_RE.get_or_init(|| Regex::new(r"(\$?)([A-Z]{1,3})(\$?)(\d+)").expect("valid regex"))
}

fn pointer_pattern() -> &'static Regex {
    static POINTER_RE: OnceLock<Regex> = OnceLock::new();
    POINTER_RE.get_or_init(|| {
        Regex::new(r"^=(?:(?:'(?:[^']|'')+'|[A-Za-z0-9_.]+)!)?\$?[A-Z]{1,3}\$?\d+$")
            .expect("valid regex")
    })
}

/// Byte ranges covered by quoted sheet names or string literals.
fn quoted_spans(expr: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut open: Option<(char, usize)> = None;
    for (i, c) in expr.char_indices() {
        match open {
            Some((quote, start)) if c == quote => {
                spans.push((start, i));
                open = None;
            }
            None if c == '\'' || c == '"' => open = Some((c, i)),
            _ => {}
        }
    }
    if let Some((_, start)) = open {
        spans.push((start, expr.len()));
    }
    spans
}

fn is_reference_boundary(expr: &str, start: usize, end: usize) -> bool {
    let before_ok = expr[..start]
        .chars()
        .next_back()
        .map_or(true, |c| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'));
    // Function names such as LOG10( and sheet prefixes such as Q1!D4.
    let after_ok = expr[end..].chars().next().map_or(true, |c| {
        !(c.is_ascii_alphanumeric() || c == '_' || c == '(' || c == '!' || c == '.')
    });
    before_ok && after_ok
}

/// Shifts every relative column reference in `expr` by `delta` columns. `$`-anchored
/// columns, quoted text and references that would fall off the sheet are left as is.
pub fn shift_formula_columns(expr: &str, delta: i64) -> String {
    if delta == 0 {
        return expr.to_string();
    }
    let quoted = quoted_spans(expr);
    let mut out = String::with_capacity(expr.len() + 8);
    let mut last = 0;

    for caps in reference_pattern().captures_iter(expr) {
        let Some(whole) = caps.get(0) else { continue };
        if quoted
            .iter()
            .any(|(s, e)| whole.start() > *s && whole.start() < *e)
        {
            continue;
        }
        if !is_reference_boundary(expr, whole.start(), whole.end()) {
            continue;
        }
        if !caps[1].is_empty() {
            continue;
        }
        let shifted = column_index(&caps[2])
            .and_then(|col| u32::try_from(i64::from(col) + delta).ok())
            .filter(|col| *col > 0);
        let Some(col) = shifted else { continue };

        out.push_str(&expr[last..whole.start()]);
        out.push_str(&column_letter(col));
        out.push_str(&caps[3]);
        out.push_str(&caps[4]);
        last = whole.end();
    }
    out.push_str(&expr[last..]);
    out
}
