use crate::error::Result;
use crate::schema::SheetRole;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A named calculation sheet and where its period columns live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CalculationSheet {
    pub name: String,

    /// Row holding the period date headers.
    pub header_row: u32,

    /// Column that mirrors the first raw period column.
    pub start_col: u32,

    /// Last row searched for formulas when a period column is added.
    pub max_row: u32,

    /// Whether this sheet follows the raw period columns. New periods get replicated
    /// formulas and a date header; scorecard sheets opt out.
    #[serde(default = "default_true")]
    pub mirrors_periods: bool,
}

fn default_true() -> bool {
    true
}

impl CalculationSheet {
    pub fn new(name: &str, header_row: u32, start_col: u32, max_row: u32) -> Self {
        Self {
            name: name.to_string(),
            header_row,
            start_col,
            max_row,
            mirrors_periods: true,
        }
    }

    fn scorecard(name: &str, max_row: u32) -> Self {
        Self {
            mirrors_periods: false,
            ..Self::new(name, 1, 4, max_row)
        }
    }

    /// The calculation-sheet column that mirrors a raw-sheet period column.
    pub fn mirror_col(&self, raw_col: u32, first_period_col: u32) -> Option<u32> {
        raw_col
            .checked_sub(first_period_col)
            .map(|offset| self.start_col + offset)
    }
}

/// Row and column conventions of a statement workbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct WorkbookLayout {
    pub income_statement_suffix: String,
    pub balance_sheet_suffix: String,

    pub label_col: u32,
    pub first_label_row: u32,
    pub last_label_row: u32,

    pub date_row: u32,
    pub code_row: u32,
    pub first_period_col: u32,
    pub last_period_col: u32,

    pub company_name_row: u32,
    pub company_name_col: u32,

    pub calculation_sheets: Vec<CalculationSheet>,

    /// Maximum number of columns a series scan inspects.
    pub scan_width: u32,

    /// Consecutive unusable cells that end a scan once data has been found.
    pub scan_max_gap: Option<u32>,
}

impl Default for WorkbookLayout {
    fn default() -> Self {
        Self {
            income_statement_suffix: "_is".to_string(),
            balance_sheet_suffix: "_bs".to_string(),
            label_col: 3,
            first_label_row: 12,
            last_label_row: 60,
            date_row: 10,
            code_row: 8,
            first_period_col: 4,
            last_period_col: 50,
            company_name_row: 2,
            company_name_col: 3,
            calculation_sheets: vec![
                CalculationSheet::new("ncav", 1, 4, 60),
                CalculationSheet::new("profitability", 1, 3, 15),
                CalculationSheet::new("ro", 1, 3, 40),
                CalculationSheet::scorecard("piotrosky", 15),
                CalculationSheet::scorecard("C7", 25),
            ],
            scan_width: 45,
            scan_max_gap: Some(3),
        }
    }
}

impl WorkbookLayout {
    pub fn suffix_for(&self, role: SheetRole) -> Option<&str> {
        match role {
            SheetRole::IncomeStatement => Some(&self.income_statement_suffix),
            SheetRole::BalanceSheet => Some(&self.balance_sheet_suffix),
            SheetRole::Calculation => None,
        }
    }

    pub fn calculation_sheet(&self, name: &str) -> Option<&CalculationSheet> {
        self.calculation_sheets.iter().find(|c| c.name == name)
    }
}

/// Default scoring parameters applied when a run does not override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ScoringDefaults {
    /// NCAV year-over-year change must exceed this fraction.
    pub burn_threshold: f64,

    /// Market capitalization cutoff, in the same unit the caller supplies market cap in.
    pub market_cap_cutoff: f64,
}

impl Default for ScoringDefaults {
    fn default() -> Self {
        Self {
            burn_threshold: -0.10,
            market_cap_cutoff: 50.0,
        }
    }
}

/// Where one scorecard section is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScorecardColumns {
    pub sheet: String,
    pub score_col: u32,
    pub note_col: u32,
    pub reference_col: u32,
    pub period_col: u32,
}

impl ScorecardColumns {
    fn starting_at(sheet: &str, score_col: u32) -> Self {
        Self {
            sheet: sheet.to_string(),
            score_col,
            note_col: score_col + 1,
            reference_col: score_col + 2,
            period_col: score_col + 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ScorecardLayout {
    pub piotroski: ScorecardColumns,
    /// Shared by the C7 core and ranking sections.
    pub c7: ScorecardColumns,
}

impl Default for ScorecardLayout {
    fn default() -> Self {
        Self {
            piotroski: ScorecardColumns::starting_at("piotrosky", 11),
            c7: ScorecardColumns::starting_at("C7", 8),
        }
    }
}

/// Full engine configuration. Every field defaults to the conventional workbook layout,
/// so a partial JSON document only needs to name what differs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    pub layout: WorkbookLayout,
    pub scoring: ScoringDefaults,
    pub scorecard: ScorecardLayout,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
