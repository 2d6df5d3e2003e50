use crate::schema::{
    DiscrepancyKind, DiscrepancyLocation, PeriodHeader, Severity, SheetRole, SheetSignature,
    StructuralSignature, StructureDiscrepancy,
};
use log::debug;
use std::collections::{BTreeSet, HashSet};

fn describe_period(header: &PeriodHeader) -> String {
    match (&header.date, &header.code) {
        (Some(date), Some(code)) => format!("{} ({})", date, code),
        (Some(date), None) => date.clone(),
        (None, Some(code)) => code.clone(),
        (None, None) => String::new(),
    }
}

fn discrepancy(
    sheet: &SheetSignature,
    row: Option<u32>,
    col: Option<u32>,
    kind: DiscrepancyKind,
    expected: Option<String>,
    actual: Option<String>,
) -> StructureDiscrepancy {
    let severity = match kind {
        DiscrepancyKind::LabelMismatch | DiscrepancyKind::MissingRow => Severity::Blocking,
        DiscrepancyKind::AddedRow | DiscrepancyKind::AddedColumn | DiscrepancyKind::MissingColumn => {
            Severity::Advisory
        }
    };
    StructureDiscrepancy {
        location: DiscrepancyLocation {
            role: sheet.role,
            sheet: sheet.sheet_name.clone(),
            row,
            col,
        },
        kind,
        severity,
        expected,
        actual,
    }
}

fn diff_rows(baseline: &SheetSignature, candidate: &SheetSignature) -> Vec<StructureDiscrepancy> {
    let rows: BTreeSet<u32> = baseline
        .row_labels
        .keys()
        .chain(candidate.row_labels.keys())
        .copied()
        .collect();

    let mut out = Vec::new();
    for row in rows {
        match (baseline.row_labels.get(&row), candidate.row_labels.get(&row)) {
            (Some(expected), Some(actual)) if expected != actual => out.push(discrepancy(
                baseline,
                Some(row),
                None,
                DiscrepancyKind::LabelMismatch,
                Some(expected.clone()),
                Some(actual.clone()),
            )),
            (Some(expected), None) => out.push(discrepancy(
                baseline,
                Some(row),
                None,
                DiscrepancyKind::MissingRow,
                Some(expected.clone()),
                None,
            )),
            (None, Some(actual)) => out.push(discrepancy(
                candidate,
                Some(row),
                None,
                DiscrepancyKind::AddedRow,
                None,
                Some(actual.clone()),
            )),
            _ => {}
        }
    }
    out
}

fn diff_columns(baseline: &SheetSignature, candidate: &SheetSignature) -> Vec<StructureDiscrepancy> {
    let baseline_keys: HashSet<&str> = baseline
        .column_periods
        .values()
        .filter_map(PeriodHeader::key)
        .collect();
    let candidate_keys: HashSet<&str> = candidate
        .column_periods
        .values()
        .filter_map(PeriodHeader::key)
        .collect();

    let mut out = Vec::new();
    for (col, header) in &baseline.column_periods {
        if header.key().is_some_and(|k| !candidate_keys.contains(k)) {
            out.push(discrepancy(
                baseline,
                None,
                Some(*col),
                DiscrepancyKind::MissingColumn,
                Some(describe_period(header)),
                None,
            ));
        }
    }
    for (col, header) in &candidate.column_periods {
        if header.key().is_some_and(|k| !baseline_keys.contains(k)) {
            out.push(discrepancy(
                candidate,
                None,
                Some(*col),
                DiscrepancyKind::AddedColumn,
                None,
                Some(describe_period(header)),
            ));
        }
    }
    out.sort_by_key(|d| (d.location.col, d.kind));
    out
}

/// Compares a candidate structure against a baseline.
///
/// Sheets are paired by role. Output is ordered by role, then rows ascending, then
/// columns ascending, so identical inputs always yield identical output.
pub fn diff_signatures(
    baseline: &StructuralSignature,
    candidate: &StructuralSignature,
) -> Vec<StructureDiscrepancy> {
    let mut discrepancies = Vec::new();
    for role in SheetRole::RAW {
        let (Some(base), Some(cand)) = (baseline.sheet(role), candidate.sheet(role)) else {
            continue;
        };
        discrepancies.extend(diff_rows(base, cand));
        discrepancies.extend(diff_columns(base, cand));
    }
    debug!(
        "Structure diff: {} discrepancies ({} blocking)",
        discrepancies.len(),
        discrepancies.iter().filter(|d| d.is_blocking()).count()
    );
    discrepancies
}

pub fn has_blocking(discrepancies: &[StructureDiscrepancy]) -> bool {
    discrepancies.iter().any(StructureDiscrepancy::is_blocking)
}

pub fn blocking(discrepancies: &[StructureDiscrepancy]) -> Vec<StructureDiscrepancy> {
    discrepancies
        .iter()
        .filter(|d| d.is_blocking())
        .cloned()
        .collect()
}
