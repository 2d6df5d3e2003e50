use crate::extract::Series;
use crate::schema::{CellRef, Frequency};
use crate::utils::approx_equal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increasing,
    Decreasing,
    Stable,
    Undetermined,
}

impl Direction {
    pub fn arrow(self) -> &'static str {
        match self {
            Direction::Increasing => "↑",
            Direction::Decreasing => "↓",
            Direction::Stable => "→",
            Direction::Undetermined => "?",
        }
    }
}

/// A quantity that may be undefined, e.g. a percentage change from zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Magnitude {
    Defined(f64),
    Undefined,
}

impl Magnitude {
    pub fn value(self) -> Option<f64> {
        match self {
            Magnitude::Defined(v) => Some(v),
            Magnitude::Undefined => None,
        }
    }
}

/// Relative change from `prior` to `current`, measured against `|prior|`.
/// A zero prior, including 0 -> 0, is undefined.
pub fn percent_change(current: f64, prior: f64) -> Magnitude {
    if prior.abs() < f64::EPSILON {
        return Magnitude::Undefined;
    }
    let change = (current - prior) / prior.abs();
    if change.is_finite() {
        Magnitude::Defined(change)
    } else {
        Magnitude::Undefined
    }
}

fn direction(current: f64, prior: f64) -> Direction {
    if approx_equal(current, prior) {
        Direction::Stable
    } else if current > prior {
        Direction::Increasing
    } else {
        Direction::Decreasing
    }
}

/// Two points of a series and how they relate.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub direction: Direction,
    pub change: Magnitude,
    pub current: CellRef,
    pub prior: CellRef,
}

impl Comparison {
    pub fn sources(&self) -> Vec<CellRef> {
        vec![self.prior.clone(), self.current.clone()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Trend {
    InsufficientHistory { available: usize, required: usize },
    Compared(Comparison),
}

impl Trend {
    pub fn direction(&self) -> Direction {
        match self {
            Trend::InsufficientHistory { .. } => Direction::Undetermined,
            Trend::Compared(c) => c.direction,
        }
    }

    pub fn comparison(&self) -> Option<&Comparison> {
        match self {
            Trend::InsufficientHistory { .. } => None,
            Trend::Compared(c) => Some(c),
        }
    }
}

/// Reads trends out of a series, stepping over duplicated semi-annual columns.
#[derive(Debug, Clone, Copy)]
pub struct TrendClassifier<'a> {
    series: &'a Series,
    frequency: Frequency,
}

impl<'a> TrendClassifier<'a> {
    pub fn new(series: &'a Series, frequency: Frequency) -> Self {
        Self { series, frequency }
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn latest(&self) -> Option<CellRef> {
        self.series.latest().map(|p| p.to_cell_ref())
    }

    /// Latest value against the previous distinct period: one column back for quarterly
    /// data, two for semi-annual.
    pub fn latest_vs_prior(&self) -> Trend {
        self.compare_back(self.frequency.stride())
    }

    /// Latest value against the same period one year earlier.
    pub fn year_over_year(&self) -> Trend {
        self.compare_back(self.frequency.year_lookback())
    }

    fn compare_back(&self, back: usize) -> Trend {
        match (self.series.from_end(0), self.series.from_end(back)) {
            (Some(current), Some(prior)) => Trend::Compared(Comparison {
                direction: direction(current.value, prior.value),
                change: percent_change(current.value, prior.value),
                current: current.to_cell_ref(),
                prior: prior.to_cell_ref(),
            }),
            _ => Trend::InsufficientHistory {
                available: self.series.len(),
                required: back + 1,
            },
        }
    }
}
