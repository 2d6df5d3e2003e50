//! The screening criteria, declared as data.
//!
//! Each entry names where its inputs live, the kind of rule applied to them and the
//! scorecard row it is reported on. [`crate::scoring::ScoringEngine`] interprets the rules.

use crate::utils::format_amount;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Piotroski,
    C7Core,
    C7Ranking,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Piotroski, Section::C7Core, Section::C7Ranking];
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Section::Piotroski => "Piotroski F-Score",
            Section::C7Core => "C7 Core",
            Section::C7Ranking => "C7 Ranking",
        };
        write!(f, "{}", name)
    }
}

/// A row on a calculation sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesSource {
    pub sheet: &'static str,
    pub row: u32,
}

const fn at(sheet: &'static str, row: u32) -> SeriesSource {
    SeriesSource { sheet, row }
}

pub mod rows {
    use super::{at, SeriesSource};

    pub const SHARES_OUTSTANDING: SeriesSource = at("ncav", 20);
    pub const CURRENT_RATIO: SeriesSource = at("ncav", 26);
    pub const NCAV_PER_SHARE: SeriesSource = at("ncav", 34);
    pub const NCAV_YOY_CHANGE: SeriesSource = at("ncav", 36);
    pub const DEBT_TO_ASSETS: SeriesSource = at("ncav", 52);
    pub const DEBT_TO_EQUITY: SeriesSource = at("ncav", 53);
    pub const GROSS_MARGIN: SeriesSource = at("profitability", 7);
    pub const NET_INCOME: SeriesSource = at("profitability", 10);
    pub const NET_INCOME_MARGIN: SeriesSource = at("profitability", 11);
    pub const ROA_ANNUAL: SeriesSource = at("ro", 21);
    pub const ASSET_TURNOVER: SeriesSource = at("ro", 33);
}

/// How a value is rendered in reasoning text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    Amount,
    Percent,
    Multiple,
    Ratio,
}

impl ValueFormat {
    pub fn render(self, value: f64) -> String {
        match self {
            ValueFormat::Amount => format_amount(value),
            ValueFormat::Percent => format!("{:.2}%", value * 100.0),
            ValueFormat::Multiple => format!("{:.2}x", value),
            ValueFormat::Ratio => format!("{:.2}", value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendRequirement {
    Increasing,
    Decreasing,
    /// Stable or decreasing.
    NotIncreasing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YoyBaseline {
    /// The run's burn threshold.
    BurnThreshold,
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rule {
    /// Latest value is above zero.
    Positive { source: SeriesSource },
    Trend {
        source: SeriesSource,
        requirement: TrendRequirement,
    },
    /// Latest value compared against a constant. With `negative_guard`, a negative value
    /// means the ratio's denominator is negative and the criterion cannot be judged.
    Threshold {
        source: SeriesSource,
        comparator: Comparator,
        limit: f64,
        negative_guard: bool,
    },
    AnyPeriodAbove { source: SeriesSource, limit: f64 },
    /// Price divided by the latest per-share value is below `limit`.
    PriceToValue { source: SeriesSource, limit: f64 },
    /// Supplied market cap is below the configured cutoff.
    MarketCapBelow { shares: SeriesSource },
    /// Year-over-year change read from a pre-computed row, or derived from a value row.
    YearOverYear {
        precomputed: SeriesSource,
        fallback: SeriesSource,
        baseline: YoyBaseline,
    },
    /// Never attempted automatically.
    Manual { reason: &'static str },
}

impl Rule {
    /// Every calculation-sheet row the rule reads.
    pub fn sources(&self) -> Vec<SeriesSource> {
        match *self {
            Rule::Positive { source }
            | Rule::Trend { source, .. }
            | Rule::Threshold { source, .. }
            | Rule::AnyPeriodAbove { source, .. }
            | Rule::PriceToValue { source, .. } => vec![source],
            Rule::MarketCapBelow { shares } => vec![shares],
            Rule::YearOverYear {
                precomputed,
                fallback,
                ..
            } => vec![precomputed, fallback],
            Rule::Manual { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Criterion {
    pub id: &'static str,
    pub name: &'static str,
    pub section: Section,
    /// Scorecard row the result is written to.
    pub row: u32,
    pub format: ValueFormat,
    pub rule: Rule,
}

use rows::*;
use Rule::*;
use Section::*;

const fn manual(
    id: &'static str,
    name: &'static str,
    section: Section,
    row: u32,
    reason: &'static str,
) -> Criterion {
    Criterion {
        id,
        name,
        section,
        row,
        format: ValueFormat::Ratio,
        rule: Manual { reason },
    }
}

const fn trend(
    id: &'static str,
    name: &'static str,
    section: Section,
    row: u32,
    format: ValueFormat,
    source: SeriesSource,
    requirement: TrendRequirement,
) -> Criterion {
    Criterion {
        id,
        name,
        section,
        row,
        format,
        rule: Trend {
            source,
            requirement,
        },
    }
}

// Piotroski rows 8 and 9 hold asset turnover and gross margin, in that order.
pub static CATALOGUE: [Criterion; 27] = [
    Criterion {
        id: "piotroski.positive_earnings",
        name: "Positive earnings",
        section: Piotroski,
        row: 1,
        format: ValueFormat::Amount,
        rule: Positive { source: NET_INCOME },
    },
    manual(
        "piotroski.positive_ocf",
        "Positive OCF",
        Piotroski,
        2,
        "Operating cash flow is not in the statement data",
    ),
    trend(
        "piotroski.increasing_roa",
        "Increasing ROA",
        Piotroski,
        3,
        ValueFormat::Percent,
        ROA_ANNUAL,
        TrendRequirement::Increasing,
    ),
    manual(
        "piotroski.accruals",
        "OCF > NI (accruals)",
        Piotroski,
        4,
        "OCF data not available for accruals check",
    ),
    trend(
        "piotroski.decreasing_leverage",
        "Decreasing LT debt ratio",
        Piotroski,
        5,
        ValueFormat::Percent,
        DEBT_TO_ASSETS,
        TrendRequirement::Decreasing,
    ),
    trend(
        "piotroski.increasing_current_ratio",
        "Increasing current ratio",
        Piotroski,
        6,
        ValueFormat::Multiple,
        CURRENT_RATIO,
        TrendRequirement::Increasing,
    ),
    trend(
        "piotroski.no_dilution",
        "No share dilution",
        Piotroski,
        7,
        ValueFormat::Amount,
        SHARES_OUTSTANDING,
        TrendRequirement::NotIncreasing,
    ),
    trend(
        "piotroski.increasing_asset_turnover",
        "Increasing asset turnover",
        Piotroski,
        8,
        ValueFormat::Ratio,
        ASSET_TURNOVER,
        TrendRequirement::Increasing,
    ),
    trend(
        "piotroski.increasing_gross_margin",
        "Increasing gross margin",
        Piotroski,
        9,
        ValueFormat::Percent,
        GROSS_MARGIN,
        TrendRequirement::Increasing,
    ),
    manual(
        "c7.not_chinese",
        "Not majority Chinese",
        C7Core,
        2,
        "Check ownership manually",
    ),
    Criterion {
        id: "c7.low_price_to_ncav",
        name: "Low P/NCAV",
        section: C7Core,
        row: 3,
        format: ValueFormat::Ratio,
        rule: PriceToValue {
            source: NCAV_PER_SHARE,
            limit: 0.67,
        },
    },
    Criterion {
        id: "c7.low_debt_to_equity",
        name: "Low D/E",
        section: C7Core,
        row: 4,
        format: ValueFormat::Ratio,
        rule: Threshold {
            source: DEBT_TO_EQUITY,
            comparator: Comparator::Below,
            limit: 0.5,
            negative_guard: true,
        },
    },
    Criterion {
        id: "c7.adequate_earnings",
        name: "Adequate past earnings",
        section: C7Core,
        row: 5,
        format: ValueFormat::Percent,
        rule: AnyPeriodAbove {
            source: NET_INCOME_MARGIN,
            limit: 0.05,
        },
    },
    manual(
        "c7.past_price_above_ncav",
        "Past price above NCAV",
        C7Core,
        6,
        "Requires historical price data",
    ),
    manual(
        "c7.existing_operations",
        "Existing operations",
        C7Core,
        7,
        "Verify the business is still operating",
    ),
    trend(
        "c7.not_selling_shares",
        "Not selling shares",
        C7Core,
        8,
        ValueFormat::Amount,
        SHARES_OUTSTANDING,
        TrendRequirement::NotIncreasing,
    ),
    Criterion {
        id: "c7.small_market_cap",
        name: "Market cap < $50mm",
        section: C7Core,
        row: 9,
        format: ValueFormat::Amount,
        rule: MarketCapBelow {
            shares: SHARES_OUTSTANDING,
        },
    },
    Criterion {
        id: "c7.low_burn_rate",
        name: "Low NCAV burn rate",
        section: C7Core,
        row: 10,
        format: ValueFormat::Percent,
        rule: YearOverYear {
            precomputed: NCAV_YOY_CHANGE,
            fallback: NCAV_PER_SHARE,
            baseline: YoyBaseline::BurnThreshold,
        },
    },
    Criterion {
        id: "c7.high_current_ratio",
        name: "CR > 1.5x",
        section: C7Ranking,
        row: 14,
        format: ValueFormat::Multiple,
        rule: Threshold {
            source: CURRENT_RATIO,
            comparator: Comparator::Above,
            limit: 1.5,
            negative_guard: false,
        },
    },
    manual(
        "c7.not_financial",
        "Not financial/RE/fund",
        C7Ranking,
        15,
        "Check industry classification manually",
    ),
    trend(
        "c7.buying_back",
        "Buying back stock",
        C7Ranking,
        16,
        ValueFormat::Amount,
        SHARES_OUTSTANDING,
        TrendRequirement::Decreasing,
    ),
    manual(
        "c7.low_price_to_net_cash",
        "Low P/Net Cash",
        C7Ranking,
        17,
        "Net cash calculation requires manual review",
    ),
    manual(
        "c7.insider_ownership",
        "Insider ownership > 10%",
        C7Ranking,
        18,
        "Check ownership sheet manually",
    ),
    manual(
        "c7.insider_buys",
        "Insider buys > sells",
        C7Ranking,
        19,
        "Requires insider transaction data",
    ),
    Criterion {
        id: "c7.positive_burn",
        name: "Positive burn rate",
        section: C7Ranking,
        row: 20,
        format: ValueFormat::Percent,
        rule: YearOverYear {
            precomputed: NCAV_YOY_CHANGE,
            fallback: NCAV_PER_SHARE,
            baseline: YoyBaseline::Zero,
        },
    },
    manual(
        "c7.reasonable_pay",
        "Reasonable insider pay",
        C7Ranking,
        21,
        "Qualitative assessment required",
    ),
    manual(
        "c7.dividend_yield",
        "Dividend yield",
        C7Ranking,
        22,
        "Requires dividend and price data",
    ),
];

pub fn catalogue() -> &'static [Criterion] {
    &CATALOGUE
}

pub fn find(id: &str) -> Option<&'static Criterion> {
    CATALOGUE.iter().find(|c| c.id == id)
}

pub fn in_section(section: Section) -> impl Iterator<Item = &'static Criterion> {
    CATALOGUE.iter().filter(move |c| c.section == section)
}
