use crate::config::{EngineConfig, ScoringDefaults};
use crate::criteria::{
    catalogue, Comparator, Criterion, Rule, Section, SeriesSource, TrendRequirement, ValueFormat,
    YoyBaseline,
};
use crate::error::{NetNetError, Result};
use crate::extract::{extract_series, ScanWindow, Series};
use crate::frequency::FrequencyCache;
use crate::schema::{CellRef, Confidence, Frequency, ScoreResult};
use crate::trend::{Comparison, Direction, Magnitude, Trend, TrendClassifier};
use crate::utils::format_amount;
use crate::workbook::Workbook;
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Inputs supplied by the caller for one scoring run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScoringParams {
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub burn_threshold: f64,
    pub market_cap_cutoff: f64,
}

impl ScoringParams {
    pub fn from_defaults(defaults: &ScoringDefaults) -> Self {
        Self {
            price: None,
            market_cap: None,
            burn_threshold: defaults.burn_threshold,
            market_cap_cutoff: defaults.market_cap_cutoff,
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_market_cap(mut self, market_cap: f64) -> Self {
        self.market_cap = Some(market_cap);
        self
    }

    fn positive_price(&self) -> Option<f64> {
        self.price.filter(|p| p.is_finite() && *p > 0.0)
    }

    fn positive_market_cap(&self) -> Option<f64> {
        self.market_cap.filter(|m| m.is_finite() && *m > 0.0)
    }
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self::from_defaults(&ScoringDefaults::default())
    }
}

/// Why a criterion could not be scored automatically.
#[derive(Debug, Clone, PartialEq)]
enum Unresolved {
    DataUnavailable(String),
    Ambiguous { reason: String, sources: Vec<CellRef> },
}

#[derive(Debug, Clone, PartialEq)]
struct Verdict {
    passed: bool,
    confidence: Confidence,
    reasoning: String,
    sources: Vec<CellRef>,
}

type Evaluation = std::result::Result<Verdict, Unresolved>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScoreSummary {
    pub auto_scored: usize,
    pub manual_required: usize,
    pub total_score: u32,
}

impl ScoreSummary {
    pub fn of<'a>(results: impl IntoIterator<Item = &'a ScoreResult>) -> Self {
        let mut summary = ScoreSummary::default();
        for result in results {
            match result.score() {
                Some(score) => {
                    summary.auto_scored += 1;
                    summary.total_score += u32::from(score);
                }
                None => summary.manual_required += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SectionReport {
    pub section: Section,
    pub results: Vec<ScoreResult>,
}

impl SectionReport {
    pub fn summary(&self) -> ScoreSummary {
        ScoreSummary::of(&self.results)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScoreReport {
    pub sections: Vec<SectionReport>,

    /// Frequency detected per calculation sheet during the run.
    pub frequencies: BTreeMap<String, Frequency>,
}

impl ScoreReport {
    pub fn summary(&self) -> ScoreSummary {
        ScoreSummary::of(self.results())
    }

    pub fn section(&self, section: Section) -> Option<&SectionReport> {
        self.sections.iter().find(|s| s.section == section)
    }

    pub fn results(&self) -> impl Iterator<Item = &ScoreResult> {
        self.sections.iter().flat_map(|s| s.results.iter())
    }

    pub fn result(&self, criterion: &str) -> Option<&ScoreResult> {
        self.results().find(|r| r.criterion() == criterion)
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Evaluates the criterion catalogue against a workbook's calculation sheets.
///
/// Reading is side-effect free. Criteria that cannot be judged from the data come back
/// as manual-required results rather than errors.
pub struct ScoringEngine<'a, W: Workbook + ?Sized> {
    workbook: &'a W,
    config: &'a EngineConfig,
    params: ScoringParams,
    frequencies: FrequencyCache,
    series: HashMap<(String, u32), Series>,
}

impl<'a, W: Workbook + ?Sized> ScoringEngine<'a, W> {
    /// Fails when a calculation sheet the catalogue reads is absent.
    pub fn new(workbook: &'a W, config: &'a EngineConfig, params: ScoringParams) -> Result<Self> {
        let required: BTreeSet<&str> = catalogue()
            .iter()
            .flat_map(|c| c.rule.sources())
            .map(|s| s.sheet)
            .collect();
        for sheet in required {
            if !workbook.has_sheet(sheet) {
                return Err(NetNetError::UnknownSheet(sheet.to_string()));
            }
        }

        Ok(Self {
            workbook,
            config,
            params,
            frequencies: FrequencyCache::new(),
            series: HashMap::new(),
        })
    }

    pub fn score_all(&mut self) -> ScoreReport {
        info!("Scoring {} criteria", catalogue().len());
        let mut sections = Vec::new();
        for section in Section::ALL {
            let results = catalogue()
                .iter()
                .filter(|c| c.section == section)
                .map(|c| self.score(c))
                .collect();
            sections.push(SectionReport { section, results });
        }

        let mut frequencies = BTreeMap::new();
        for sheet in self.series.keys().map(|(sheet, _)| sheet.clone()) {
            if let Some(frequency) = self.frequencies.get(&sheet) {
                frequencies.insert(sheet, frequency);
            }
        }

        let report = ScoreReport {
            sections,
            frequencies,
        };
        let summary = report.summary();
        info!(
            "Auto-scored {} | manual {} | score {}",
            summary.auto_scored, summary.manual_required, summary.total_score
        );
        report
    }

    pub fn score(&mut self, criterion: &Criterion) -> ScoreResult {
        let result = match self.evaluate(criterion) {
            Ok(verdict) => ScoreResult::scored(
                criterion.id,
                verdict.passed,
                verdict.confidence,
                verdict.reasoning,
                verdict.sources,
            ),
            Err(Unresolved::DataUnavailable(reason)) => {
                ScoreResult::manual(criterion.id, reason, Vec::new())
            }
            Err(Unresolved::Ambiguous { reason, sources }) => {
                ScoreResult::manual(criterion.id, reason, sources)
            }
        };
        debug!(
            "{}: {:?} ({:?}) {}",
            criterion.id,
            result.score(),
            result.confidence(),
            result.reasoning()
        );
        result
    }

    fn evaluate(&mut self, criterion: &Criterion) -> Evaluation {
        let format = criterion.format;
        match criterion.rule {
            Rule::Positive { source } => self.positive(source, format),
            Rule::Trend {
                source,
                requirement,
            } => self.trend(source, requirement, format),
            Rule::Threshold {
                source,
                comparator,
                limit,
                negative_guard,
            } => self.threshold(source, comparator, limit, negative_guard, format),
            Rule::AnyPeriodAbove { source, limit } => self.any_period_above(source, limit, format),
            Rule::PriceToValue { source, limit } => self.price_to_value(source, limit, format),
            Rule::MarketCapBelow { shares } => self.market_cap_below(shares),
            Rule::YearOverYear {
                precomputed,
                fallback,
                baseline,
            } => self.year_over_year(precomputed, fallback, baseline),
            Rule::Manual { reason } => Err(Unresolved::DataUnavailable(reason.to_string())),
        }
    }

    fn series(&mut self, source: SeriesSource) -> Series {
        let key = (source.sheet.to_string(), source.row);
        if let Some(series) = self.series.get(&key) {
            return series.clone();
        }
        let layout = &self.config.layout;
        let window = layout
            .calculation_sheet(source.sheet)
            .map(|sheet| ScanWindow::for_calculation_sheet(sheet, layout))
            .unwrap_or_else(|| ScanWindow::new(layout.first_period_col, layout.scan_width));
        let series = extract_series(self.workbook, source.sheet, source.row, &window);
        self.series.insert(key, series.clone());
        series
    }

    fn latest(&mut self, source: SeriesSource) -> std::result::Result<CellRef, Unresolved> {
        self.series(source)
            .latest()
            .map(|p| p.to_cell_ref())
            .ok_or_else(|| no_data(source))
    }

    fn positive(&mut self, source: SeriesSource, format: ValueFormat) -> Evaluation {
        let latest = self.latest(source)?;
        Ok(Verdict {
            passed: latest.value > 0.0,
            confidence: Confidence::High,
            reasoning: format!(
                "{} in {} (must be > 0)",
                format.render(latest.value),
                latest.period_or_column()
            ),
            sources: vec![latest],
        })
    }

    fn trend(
        &mut self,
        source: SeriesSource,
        requirement: TrendRequirement,
        format: ValueFormat,
    ) -> Evaluation {
        let series = self.series(source);
        if series.len() < 2 {
            return Err(Unresolved::DataUnavailable(format!(
                "Insufficient history in {} row {}: {} value(s)",
                source.sheet,
                source.row,
                series.len()
            )));
        }
        let frequency = self.frequencies.get_or_classify(source.sheet, &series);
        let trend = TrendClassifier::new(&series, frequency).latest_vs_prior();

        let comparison = match trend {
            Trend::Compared(comparison) => comparison,
            Trend::InsufficientHistory {
                available,
                required,
            } => {
                return Err(Unresolved::Ambiguous {
                    reason: format!(
                        "A {} comparison needs {} values, found {}",
                        frequency, required, available
                    ),
                    sources: series.latest().map(|p| p.to_cell_ref()).into_iter().collect(),
                });
            }
        };

        let passed = match requirement {
            TrendRequirement::Increasing => comparison.direction == Direction::Increasing,
            TrendRequirement::Decreasing => comparison.direction == Direction::Decreasing,
            TrendRequirement::NotIncreasing => matches!(
                comparison.direction,
                Direction::Stable | Direction::Decreasing
            ),
        };
        let confidence = if frequency == Frequency::Unknown {
            Confidence::Low
        } else {
            Confidence::High
        };

        let mut reasoning = describe_comparison(&comparison, format);
        if frequency == Frequency::Unknown {
            reasoning.push_str(" [reporting frequency unknown]");
        }
        Ok(Verdict {
            passed,
            confidence,
            reasoning,
            sources: comparison.sources(),
        })
    }

    fn threshold(
        &mut self,
        source: SeriesSource,
        comparator: Comparator,
        limit: f64,
        negative_guard: bool,
        format: ValueFormat,
    ) -> Evaluation {
        let latest = self.latest(source)?;
        if negative_guard && latest.value < 0.0 {
            return Err(Unresolved::Ambiguous {
                reason: format!(
                    "Negative ratio {} in {} (negative denominator)",
                    format.render(latest.value),
                    latest.period_or_column()
                ),
                sources: vec![latest],
            });
        }
        let (passed, symbol) = match comparator {
            Comparator::Above => (latest.value > limit, ">"),
            Comparator::Below => (latest.value < limit, "<"),
        };
        Ok(Verdict {
            passed,
            confidence: Confidence::High,
            reasoning: format!(
                "{} in {} (threshold: {} {})",
                format.render(latest.value),
                latest.period_or_column(),
                symbol,
                format.render(limit)
            ),
            sources: vec![latest],
        })
    }

    fn any_period_above(
        &mut self,
        source: SeriesSource,
        limit: f64,
        format: ValueFormat,
    ) -> Evaluation {
        let series = self.series(source);
        let best = series
            .iter()
            .max_by(|a, b| a.value.total_cmp(&b.value))
            .map(|p| p.to_cell_ref())
            .ok_or_else(|| no_data(source))?;
        Ok(Verdict {
            passed: best.value > limit,
            confidence: Confidence::High,
            reasoning: format!(
                "Best of {} periods: {} in {} (threshold: > {})",
                series.len(),
                format.render(best.value),
                best.period_or_column(),
                format.render(limit)
            ),
            sources: vec![best],
        })
    }

    fn price_to_value(
        &mut self,
        source: SeriesSource,
        limit: f64,
        format: ValueFormat,
    ) -> Evaluation {
        let price = self
            .params
            .positive_price()
            .ok_or_else(|| Unresolved::DataUnavailable("Price not provided".to_string()))?;
        let per_share = self.latest(source)?;
        if per_share.value <= 0.0 {
            return Err(Unresolved::Ambiguous {
                reason: format!(
                    "Per-share value {} in {} is not positive",
                    format.render(per_share.value),
                    per_share.period_or_column()
                ),
                sources: vec![per_share],
            });
        }
        let ratio = price / per_share.value;
        Ok(Verdict {
            passed: ratio < limit,
            confidence: Confidence::High,
            reasoning: format!(
                "{} / {} = {} (threshold: < {})",
                format.render(price),
                format.render(per_share.value),
                format.render(ratio),
                format.render(limit)
            ),
            sources: vec![per_share],
        })
    }

    fn market_cap_below(&mut self, shares: SeriesSource) -> Evaluation {
        let market_cap = self
            .params
            .positive_market_cap()
            .ok_or_else(|| Unresolved::DataUnavailable("Market cap not provided".to_string()))?;
        let shares = self.latest(shares)?;
        let cutoff = self.params.market_cap_cutoff;
        Ok(Verdict {
            passed: market_cap < cutoff,
            // The caller's unit for market cap cannot be checked against the sheet.
            confidence: Confidence::Medium,
            reasoning: format!(
                "Market cap {} (cutoff: < {}; {} shares in {})",
                format_amount(market_cap),
                format_amount(cutoff),
                format_amount(shares.value),
                shares.period_or_column()
            ),
            sources: vec![shares],
        })
    }

    fn year_over_year(
        &mut self,
        precomputed: SeriesSource,
        fallback: SeriesSource,
        baseline: YoyBaseline,
    ) -> Evaluation {
        let threshold = match baseline {
            YoyBaseline::BurnThreshold => self.params.burn_threshold,
            YoyBaseline::Zero => 0.0,
        };
        let pct = ValueFormat::Percent;

        if let Ok(latest) = self.latest(precomputed) {
            return Ok(Verdict {
                passed: latest.value > threshold,
                confidence: Confidence::High,
                reasoning: format!(
                    "YoY {} in {} (threshold: > {})",
                    pct.render(latest.value),
                    latest.period_or_column(),
                    pct.render(threshold)
                ),
                sources: vec![latest],
            });
        }

        let series = self.series(fallback);
        if series.is_empty() {
            return Err(no_data(fallback));
        }
        let frequency = self.frequencies.get_or_classify(fallback.sheet, &series);
        let comparison = match TrendClassifier::new(&series, frequency).year_over_year() {
            Trend::Compared(comparison) => comparison,
            Trend::InsufficientHistory {
                available,
                required,
            } => {
                return Err(Unresolved::Ambiguous {
                    reason: format!(
                        "Year-over-year change needs {} values, found {}",
                        required, available
                    ),
                    sources: series.latest().map(|p| p.to_cell_ref()).into_iter().collect(),
                });
            }
        };

        let change = match comparison.change {
            Magnitude::Defined(change) => change,
            Magnitude::Undefined => {
                return Err(Unresolved::Ambiguous {
                    reason: format!(
                        "Year-over-year change undefined (prior value {} in {})",
                        comparison.prior.value,
                        comparison.prior.period_or_column()
                    ),
                    sources: comparison.sources(),
                });
            }
        };

        let confidence = if frequency == Frequency::Unknown {
            Confidence::Low
        } else {
            Confidence::Medium
        };
        Ok(Verdict {
            passed: change > threshold,
            confidence,
            reasoning: format!(
                "Calculated YoY {} from {} (threshold: > {})",
                pct.render(change),
                describe_comparison(&comparison, ValueFormat::Ratio),
                pct.render(threshold)
            ),
            sources: comparison.sources(),
        })
    }
}

fn no_data(source: SeriesSource) -> Unresolved {
    Unresolved::DataUnavailable(format!("No data in {} row {}", source.sheet, source.row))
}

fn describe_comparison(comparison: &Comparison, format: ValueFormat) -> String {
    format!(
        "{} ({}) -> {} ({}) {}",
        format.render(comparison.prior.value),
        comparison.prior.period_or_column(),
        format.render(comparison.current.value),
        comparison.current.period_or_column(),
        comparison.direction.arrow()
    )
}

/// Scores every criterion with a fresh engine.
pub fn score_workbook<W: Workbook + ?Sized>(
    workbook: &W,
    config: &EngineConfig,
    params: ScoringParams,
) -> Result<ScoreReport> {
    let mut engine = ScoringEngine::new(workbook, config, params)?;
    Ok(engine.score_all())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::find;
    use crate::workbook::MemoryWorkbook;

    fn calculation_workbook() -> MemoryWorkbook {
        let mut wb = MemoryWorkbook::new();
        for sheet in ["ncav", "profitability", "ro"] {
            wb.add_sheet(sheet);
        }
        wb
    }

    fn fill_row(wb: &mut MemoryWorkbook, sheet: &str, row: u32, start_col: u32, values: &[f64]) {
        for (i, v) in values.iter().enumerate() {
            wb.set_number(sheet, row, start_col + i as u32, *v);
        }
    }

    fn score(wb: &MemoryWorkbook, id: &str, params: ScoringParams) -> ScoreResult {
        let config = EngineConfig::default();
        let mut engine = ScoringEngine::new(wb, &config, params).unwrap();
        engine.score(find(id).unwrap())
    }

    #[test]
    fn test_current_ratio_below_threshold() {
        let mut wb = calculation_workbook();
        fill_row(&mut wb, "ncav", 26, 4, &[1.4, 1.3, 1.2]);

        let result = score(&wb, "c7.high_current_ratio", ScoringParams::default());
        assert_eq!(result.score(), Some(0));
        assert_eq!(result.confidence(), Confidence::High);
        assert_eq!(result.sources().len(), 1);
        assert_eq!(result.sources()[0].address.col, 6);
        assert!(result.reasoning().contains("1.20x"));
    }

    #[test]
    fn test_price_to_ncav_requires_price() {
        let mut wb = calculation_workbook();
        fill_row(&mut wb, "ncav", 34, 4, &[200.0, 210.0]);

        let missing = score(&wb, "c7.low_price_to_ncav", ScoringParams::default());
        assert_eq!(missing.score(), None);
        assert_eq!(missing.confidence(), Confidence::ManualRequired);

        let zero = score(
            &wb,
            "c7.low_price_to_ncav",
            ScoringParams::default().with_price(0.0),
        );
        assert_eq!(zero.score(), None);
        assert_eq!(zero.confidence(), Confidence::ManualRequired);

        let priced = score(
            &wb,
            "c7.low_price_to_ncav",
            ScoringParams::default().with_price(105.0),
        );
        assert_eq!(priced.score(), Some(1));
        assert_eq!(priced.sources()[0].address.col, 5);
    }

    #[test]
    fn test_zero_denominator_is_manual() {
        let mut wb = calculation_workbook();
        fill_row(&mut wb, "ncav", 34, 4, &[5.0, 0.0]);
        let result = score(
            &wb,
            "c7.low_price_to_ncav",
            ScoringParams::default().with_price(10.0),
        );
        assert_eq!(result.score(), None);
        assert_eq!(result.confidence(), Confidence::ManualRequired);
        assert_eq!(result.sources().len(), 1);

        // Year-over-year fallback with a zero prior value.
        let mut wb = calculation_workbook();
        fill_row(&mut wb, "ncav", 34, 4, &[0.0, 1.0, 2.0, 3.0, 4.0]);
        let result = score(&wb, "c7.low_burn_rate", ScoringParams::default());
        assert_eq!(result.score(), None);
        assert_eq!(result.confidence(), Confidence::ManualRequired);
        assert_eq!(result.sources().len(), 2);
    }

    #[test]
    fn test_negative_debt_to_equity_is_manual() {
        let mut wb = calculation_workbook();
        fill_row(&mut wb, "ncav", 53, 4, &[0.3, -0.4]);
        let result = score(&wb, "c7.low_debt_to_equity", ScoringParams::default());
        assert_eq!(result.score(), None);
        assert_eq!(result.confidence(), Confidence::ManualRequired);

        let mut wb = calculation_workbook();
        fill_row(&mut wb, "ncav", 53, 4, &[0.3, 0.2]);
        let result = score(&wb, "c7.low_debt_to_equity", ScoringParams::default());
        assert_eq!(result.score(), Some(1));
    }

    #[test]
    fn test_semi_annual_trend() {
        let mut wb = calculation_workbook();
        fill_row(&mut wb, "ncav", 26, 4, &[100.0, 100.0, 120.0, 120.0]);

        let result = score(&wb, "piotroski.increasing_current_ratio", ScoringParams::default());
        assert_eq!(result.score(), Some(1));
        assert_eq!(result.confidence(), Confidence::High);
        let cols: Vec<u32> = result.sources().iter().map(|s| s.address.col).collect();
        assert_eq!(cols, vec![5, 7]);
    }

    #[test]
    fn test_equal_middle_quarters_keep_quarterly_stride() {
        let mut wb = calculation_workbook();
        fill_row(&mut wb, "ncav", 26, 4, &[1.0, 1.3, 1.3, 1.2]);

        let config = EngineConfig::default();
        let report = score_workbook(&wb, &config, ScoringParams::default()).unwrap();
        assert_eq!(report.frequencies.get("ncav"), Some(&Frequency::Quarterly));

        let result = report.result("piotroski.increasing_current_ratio").unwrap();
        assert_eq!(result.score(), Some(0));
        let cols: Vec<u32> = result.sources().iter().map(|s| s.address.col).collect();
        assert_eq!(cols, vec![6, 7]);
    }

    #[test]
    fn test_short_trend_has_low_confidence() {
        let mut wb = calculation_workbook();
        fill_row(&mut wb, "ncav", 20, 4, &[1000.0, 900.0]);

        let result = score(&wb, "c7.buying_back", ScoringParams::default());
        assert_eq!(result.score(), Some(1));
        assert_eq!(result.confidence(), Confidence::Low);

        let mut wb = calculation_workbook();
        fill_row(&mut wb, "ncav", 20, 4, &[1000.0]);
        let result = score(&wb, "c7.buying_back", ScoringParams::default());
        assert_eq!(result.confidence(), Confidence::ManualRequired);
    }

    #[test]
    fn test_year_over_year_prefers_precomputed_row() {
        let mut wb = calculation_workbook();
        fill_row(&mut wb, "ncav", 36, 4, &[0.02, -0.15]);
        fill_row(&mut wb, "ncav", 34, 4, &[10.0, 10.0, 12.0, 12.0, 14.0]);

        let burn = score(&wb, "c7.low_burn_rate", ScoringParams::default());
        assert_eq!(burn.score(), Some(0));
        assert_eq!(burn.confidence(), Confidence::High);
        assert_eq!(burn.sources()[0].address.row, 36);

        let positive = score(&wb, "c7.positive_burn", ScoringParams::default());
        assert_eq!(positive.score(), Some(0));
    }

    #[test]
    fn test_year_over_year_fallback() {
        let mut wb = calculation_workbook();
        fill_row(&mut wb, "ncav", 34, 4, &[100.0, 100.0, 95.0, 95.0, 92.0, 92.0]);

        let result = score(&wb, "c7.low_burn_rate", ScoringParams::default());
        assert_eq!(result.score(), Some(1));
        assert_eq!(result.confidence(), Confidence::Medium);
        assert!(result.reasoning().contains("-8.00%"));
    }

    #[test]
    fn test_market_cap_requires_input() {
        let mut wb = calculation_workbook();
        fill_row(&mut wb, "ncav", 20, 4, &[5_000_000.0]);

        let missing = score(&wb, "c7.small_market_cap", ScoringParams::default());
        assert_eq!(missing.confidence(), Confidence::ManualRequired);

        let small = score(
            &wb,
            "c7.small_market_cap",
            ScoringParams::default().with_market_cap(32.0),
        );
        assert_eq!(small.score(), Some(1));
        assert_eq!(small.sources().len(), 1);
    }

    #[test]
    fn test_score_all_and_summary() {
        let mut wb = calculation_workbook();
        fill_row(&mut wb, "profitability", 10, 3, &[50.0, 60.0]);
        fill_row(&mut wb, "profitability", 11, 3, &[0.02, 0.07]);
        fill_row(&mut wb, "ncav", 26, 4, &[1.6, 1.7, 1.8, 1.9]);

        let config = EngineConfig::default();
        let report = score_workbook(&wb, &config, ScoringParams::default()).unwrap();
        assert_eq!(report.results().count(), 27);
        assert_eq!(report.sections.len(), 3);

        let summary = report.summary();
        assert_eq!(summary.auto_scored + summary.manual_required, 27);
        assert_eq!(report.result("piotroski.positive_earnings").unwrap().score(), Some(1));
        assert_eq!(report.result("c7.adequate_earnings").unwrap().score(), Some(1));
        assert_eq!(report.result("c7.high_current_ratio").unwrap().score(), Some(1));
        assert_eq!(report.frequencies.get("ncav"), Some(&Frequency::Quarterly));

        for result in report.results() {
            assert_eq!(result.score().is_none(), result.confidence() == Confidence::ManualRequired);
            assert!(!result.reasoning().is_empty());
            if result.is_resolved() {
                assert!(!result.sources().is_empty(), "{} has no sources", result.criterion());
            }
        }
    }

    #[test]
    fn test_missing_calculation_sheet() {
        let mut wb = MemoryWorkbook::new();
        wb.add_sheet("ncav");
        let config = EngineConfig::default();
        let result = ScoringEngine::new(&wb, &config, ScoringParams::default());
        assert!(matches!(result, Err(NetNetError::UnknownSheet(_))));
    }
}
