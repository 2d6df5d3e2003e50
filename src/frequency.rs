use crate::extract::Series;
use crate::schema::Frequency;
use crate::utils::approx_equal;
use log::debug;
use std::collections::HashMap;

/// Most recent entries inspected when classifying a series.
pub const FREQUENCY_WINDOW: usize = 8;

/// Below this many entries the frequency is [`Frequency::Unknown`].
pub const MIN_ENTRIES: usize = 4;

/// Counts of equal values among non-overlapping consecutive pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PairCount {
    equal: usize,
    total: usize,
}

fn count_pairs(values: &[f64]) -> PairCount {
    let mut count = PairCount { equal: 0, total: 0 };
    for pair in values.chunks_exact(2) {
        count.total += 1;
        if approx_equal(pair[0], pair[1]) {
            count.equal += 1;
        }
    }
    count
}

/// Classifies a series as quarterly or semi-annual.
///
/// Semi-annual filers show each figure in two adjacent quarterly columns. Pairs are
/// taken from the start of the recent window; a trailing odd entry is ignored.
pub fn classify(series: &Series) -> Frequency {
    let values = series.values();
    if values.len() < MIN_ENTRIES {
        return Frequency::Unknown;
    }
    let recent = &values[values.len().saturating_sub(FREQUENCY_WINDOW)..];

    let pairs = count_pairs(recent);
    if pairs.equal * 2 > pairs.total {
        Frequency::SemiAnnual
    } else {
        Frequency::Quarterly
    }
}

/// Memoizes one classification per sheet for the duration of a scoring run.
#[derive(Debug, Default)]
pub struct FrequencyCache {
    by_sheet: HashMap<String, Frequency>,
}

impl FrequencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the sheet's cached frequency, classifying `sample` on first use. An
    /// `Unknown` result is not cached, so a later, longer series can still decide.
    pub fn get_or_classify(&mut self, sheet: &str, sample: &Series) -> Frequency {
        if let Some(frequency) = self.by_sheet.get(sheet) {
            return *frequency;
        }
        let frequency = classify(sample);
        debug!(
            "Detected {} data on sheet '{}' from {} entries",
            frequency,
            sheet,
            sample.len()
        );
        if frequency != Frequency::Unknown {
            self.by_sheet.insert(sheet.to_string(), frequency);
        }
        frequency
    }

    pub fn get(&self, sheet: &str) -> Option<Frequency> {
        self.by_sheet.get(sheet).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::SeriesPoint;
    use crate::schema::CellAddress;

    fn series(values: &[f64]) -> Series {
        Series::from_points(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| SeriesPoint {
                    address: CellAddress::new("ncav", 34, 4 + i as u32),
                    value: *v,
                    period: None,
                })
                .collect(),
        )
    }

    #[test]
    fn test_duplicated_pairs_are_semi_annual() {
        assert_eq!(
            classify(&series(&[100.0, 100.0, 120.0, 120.0])),
            Frequency::SemiAnnual
        );
        assert_eq!(
            classify(&series(&[1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0])),
            Frequency::SemiAnnual
        );
    }

    #[test]
    fn test_distinct_values_are_quarterly() {
        assert_eq!(
            classify(&series(&[100.0, 105.0, 110.0, 115.0, 120.0])),
            Frequency::Quarterly
        );
    }

    #[test]
    fn test_short_series_is_unknown() {
        assert_eq!(classify(&series(&[1.0, 1.0, 2.0])), Frequency::Unknown);
        assert_eq!(classify(&series(&[])), Frequency::Unknown);
    }

    #[test]
    fn test_equal_neighbours_across_pairs_stay_quarterly() {
        assert_eq!(
            classify(&series(&[1.0, 1.1, 1.1, 1.2])),
            Frequency::Quarterly
        );
        assert_eq!(
            classify(&series(&[1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 5.0, 6.0])),
            Frequency::Quarterly
        );
    }

    #[test]
    fn test_trailing_odd_entry_is_ignored() {
        assert_eq!(
            classify(&series(&[1.0, 1.0, 2.0, 2.0, 3.0])),
            Frequency::SemiAnnual
        );
    }

    #[test]
    fn test_only_recent_window_counts() {
        let mut values = vec![5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        values.extend([1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0]);
        assert_eq!(classify(&series(&values)), Frequency::SemiAnnual);
    }

    #[test]
    fn test_relative_tolerance() {
        assert_eq!(
            classify(&series(&[1000.0, 1000.0000001, 2000.0, 2000.0])),
            Frequency::SemiAnnual
        );
    }

    #[test]
    fn test_cache_per_sheet() {
        let mut cache = FrequencyCache::new();
        let short = series(&[1.0, 2.0]);
        assert_eq!(cache.get_or_classify("ncav", &short), Frequency::Unknown);
        assert_eq!(cache.get("ncav"), None);

        let semi = series(&[1.0, 1.0, 2.0, 2.0]);
        assert_eq!(cache.get_or_classify("ncav", &semi), Frequency::SemiAnnual);

        let quarterly = series(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(cache.get_or_classify("ncav", &quarterly), Frequency::SemiAnnual);
        assert_eq!(cache.get_or_classify("ro", &quarterly), Frequency::Quarterly);
    }
}
