use crate::utils::{a1, column_letter};
use chrono::NaiveDateTime;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Position of a cell: sheet name plus 1-based row and column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct CellAddress {
    pub sheet: String,
    pub row: u32,
    pub col: u32,
}

impl CellAddress {
    pub fn new(sheet: impl Into<String>, row: u32, col: u32) -> Self {
        Self {
            sheet: sheet.into(),
            row,
            col,
        }
    }

    /// The sheet-local A1 form, e.g. `K12`.
    pub fn a1(&self) -> String {
        a1(self.row, self.col)
    }

    pub fn column_letter(&self) -> String {
        column_letter(self.col)
    }

    /// The sheet-qualified A1 form, e.g. `ncav!K12` or `'Almedio IS'!K12`.
    pub fn qualified(&self) -> String {
        let needs_quotes = self
            .sheet
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '_'));
        if needs_quotes {
            format!("'{}'!{}", self.sheet.replace('\'', "''"), self.a1())
        } else {
            format!("{}!{}", self.sheet, self.a1())
        }
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified())
    }
}

/// What the core can see of a cell. A formula is opaque: only the fact that the cell is
/// derived, and the last evaluated result if the workbook carries one, are exposed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    Number(f64),
    Text(String),
    #[default]
    Empty,
    Formula { cached: Option<f64> },
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, CellValue::Formula { .. })
    }

    /// True for empty cells and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(t) => t.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(t) => Some(t.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(t) => write!(f, "{}", t),
            CellValue::Empty => Ok(()),
            CellValue::Formula { cached: Some(n) } => write!(f, "={}", n),
            CellValue::Formula { cached: None } => write!(f, "=?"),
        }
    }
}

/// How often a row's values genuinely change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Quarterly,
    /// Every filed figure appears in two adjacent columns.
    SemiAnnual,
    Unknown,
}

impl Frequency {
    /// Columns between two genuinely distinct consecutive periods.
    pub fn stride(self) -> usize {
        match self {
            Frequency::SemiAnnual => 2,
            Frequency::Quarterly | Frequency::Unknown => 1,
        }
    }

    /// Columns to look back for a year-over-year comparison.
    pub fn year_lookback(self) -> usize {
        match self {
            Frequency::SemiAnnual => self.stride() * 2,
            Frequency::Quarterly | Frequency::Unknown => 4,
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Frequency::Quarterly => "quarterly",
            Frequency::SemiAnnual => "semi-annual",
            Frequency::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Provenance of a computed value: the cell it came from, what it held and which period
/// that column reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CellRef {
    pub address: CellAddress,
    pub value: f64,
    pub period: Option<String>,
}

impl CellRef {
    pub fn period_or_column(&self) -> String {
        self.period
            .clone()
            .unwrap_or_else(|| format!("col {}", self.address.column_letter()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
    ManualRequired,
}

/// Outcome of one screening criterion.
///
/// The score is `None` exactly when the confidence is [`Confidence::ManualRequired`];
/// the constructors are the only way to build one, and deserialization rejects JSON that
/// breaks the rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "ScoreResultFields")]
pub struct ScoreResult {
    criterion: String,
    score: Option<u8>,
    confidence: Confidence,
    reasoning: String,
    sources: Vec<CellRef>,
}

#[derive(Deserialize)]
struct ScoreResultFields {
    criterion: String,
    score: Option<u8>,
    confidence: Confidence,
    reasoning: String,
    #[serde(default)]
    sources: Vec<CellRef>,
}

impl TryFrom<ScoreResultFields> for ScoreResult {
    type Error = String;

    fn try_from(fields: ScoreResultFields) -> Result<Self, Self::Error> {
        let manual = fields.confidence == Confidence::ManualRequired;
        match fields.score {
            Some(score) if manual => Err(format!(
                "criterion '{}' has score {} but requires a manual check",
                fields.criterion, score
            )),
            None if !manual => Err(format!(
                "criterion '{}' has no score but {:?} confidence",
                fields.criterion, fields.confidence
            )),
            Some(score) if score > 1 => Err(format!(
                "criterion '{}' has score {}, expected 0 or 1",
                fields.criterion, score
            )),
            _ => Ok(Self {
                criterion: fields.criterion,
                score: fields.score,
                confidence: fields.confidence,
                reasoning: non_empty(fields.reasoning),
                sources: fields.sources,
            }),
        }
    }
}

impl ScoreResult {
    /// A resolved result. A `ManualRequired` confidence is downgraded to `Low`, since a
    /// resolved score cannot carry it.
    pub fn scored(
        criterion: impl Into<String>,
        passed: bool,
        confidence: Confidence,
        reasoning: impl Into<String>,
        sources: Vec<CellRef>,
    ) -> Self {
        let confidence = match confidence {
            Confidence::ManualRequired => Confidence::Low,
            other => other,
        };
        Self {
            criterion: criterion.into(),
            score: Some(u8::from(passed)),
            confidence,
            reasoning: non_empty(reasoning.into()),
            sources,
        }
    }

    pub fn manual(
        criterion: impl Into<String>,
        reasoning: impl Into<String>,
        sources: Vec<CellRef>,
    ) -> Self {
        Self {
            criterion: criterion.into(),
            score: None,
            confidence: Confidence::ManualRequired,
            reasoning: non_empty(reasoning.into()),
            sources,
        }
    }

    pub fn criterion(&self) -> &str {
        &self.criterion
    }

    pub fn score(&self) -> Option<u8> {
        self.score
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn sources(&self) -> &[CellRef] {
        &self.sources
    }

    pub fn is_resolved(&self) -> bool {
        self.score.is_some()
    }
}

fn non_empty(reasoning: String) -> String {
    if reasoning.trim().is_empty() {
        "No reasoning recorded".to_string()
    } else {
        reasoning
    }
}

/// The role a sheet plays in the two-sheet-per-statement convention.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SheetRole {
    IncomeStatement,
    BalanceSheet,
    Calculation,
}

impl SheetRole {
    /// Roles that hold raw statement data and are compared structurally.
    pub const RAW: [SheetRole; 2] = [SheetRole::IncomeStatement, SheetRole::BalanceSheet];
}

impl fmt::Display for SheetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SheetRole::IncomeStatement => "income statement",
            SheetRole::BalanceSheet => "balance sheet",
            SheetRole::Calculation => "calculation",
        };
        write!(f, "{}", name)
    }
}

/// Header information for one period column.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct PeriodHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl PeriodHeader {
    /// The identity used to match columns across workbooks: the date when present,
    /// otherwise the period code.
    pub fn key(&self) -> Option<&str> {
        self.date.as_deref().or(self.code.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SheetSignature {
    #[schemars(description = "Sheet name in the workbook the signature was captured from")]
    pub sheet_name: String,

    pub role: SheetRole,

    #[schemars(description = "Row index -> literal label text in the label column")]
    pub row_labels: BTreeMap<u32, String>,

    #[schemars(description = "Column index -> period date and/or period code")]
    pub column_periods: BTreeMap<u32, PeriodHeader>,
}

impl SheetSignature {
    pub fn new(sheet_name: impl Into<String>, role: SheetRole) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            role,
            row_labels: BTreeMap::new(),
            column_periods: BTreeMap::new(),
        }
    }

    pub fn last_period_col(&self) -> Option<u32> {
        self.column_periods.keys().next_back().copied()
    }

    /// Period key -> column, first occurrence wins.
    pub fn columns_by_period(&self) -> BTreeMap<String, u32> {
        let mut map = BTreeMap::new();
        for (col, header) in &self.column_periods {
            if let Some(key) = header.key() {
                map.entry(key.to_string()).or_insert(*col);
            }
        }
        map
    }
}

/// A point-in-time structural fingerprint of the raw statement sheets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StructuralSignature {
    #[serde(default)]
    pub company_name: Option<String>,

    #[serde(default)]
    pub source: Option<String>,

    pub captured_at: NaiveDateTime,

    #[schemars(description = "Raw statement sheets, ordered by role")]
    pub sheets: Vec<SheetSignature>,

    #[serde(default)]
    #[schemars(description = "Calculation sheets found in the workbook")]
    pub calculation_sheets: Vec<String>,
}

impl StructuralSignature {
    pub fn new(captured_at: NaiveDateTime) -> Self {
        Self {
            company_name: None,
            source: None,
            captured_at,
            sheets: Vec::new(),
            calculation_sheets: Vec::new(),
        }
    }

    pub fn sheet(&self, role: SheetRole) -> Option<&SheetSignature> {
        self.sheets.iter().find(|s| s.role == role)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(StructuralSignature)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    LabelMismatch,
    MissingRow,
    AddedRow,
    MissingColumn,
    AddedColumn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Blocking,
    Advisory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DiscrepancyLocation {
    pub role: SheetRole,
    pub sheet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col: Option<u32>,
}

impl fmt::Display for DiscrepancyLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.row, self.col) {
            (Some(row), Some(col)) => write!(f, "{}!{}", self.sheet, a1(row, col)),
            (Some(row), None) => write!(f, "{} row {}", self.sheet, row),
            (None, Some(col)) => write!(f, "{} column {}", self.sheet, column_letter(col)),
            (None, None) => write!(f, "{}", self.sheet),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StructureDiscrepancy {
    pub location: DiscrepancyLocation,
    pub kind: DiscrepancyKind,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl StructureDiscrepancy {
    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}

impl fmt::Display for StructureDiscrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expected = self.expected.as_deref().unwrap_or("");
        let actual = self.actual.as_deref().unwrap_or("");
        match self.kind {
            DiscrepancyKind::LabelMismatch => write!(
                f,
                "{}: expected '{}', got '{}'",
                self.location, expected, actual
            ),
            DiscrepancyKind::MissingRow => {
                write!(f, "{}: missing (expected '{}')", self.location, expected)
            }
            DiscrepancyKind::AddedRow => write!(f, "{}: new row '{}'", self.location, actual),
            DiscrepancyKind::MissingColumn => {
                write!(f, "{}: period {} not in export", self.location, expected)
            }
            DiscrepancyKind::AddedColumn => {
                write!(f, "{}: new period {}", self.location, actual)
            }
        }
    }
}
