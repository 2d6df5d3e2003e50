use crate::error::{NetNetError, Result};
use crate::schema::CellValue;
use chrono::{Days, NaiveDate, NaiveDateTime};

/// Relative tolerance used wherever two reported figures are compared for equality.
pub const RELATIVE_TOLERANCE: f64 = 1e-6;

const NEAR_ZERO: f64 = 1e-9;

/// Compares two figures within [`RELATIVE_TOLERANCE`] of the larger magnitude.
/// Two values that are both effectively zero compare equal.
pub fn approx_equal(a: f64, b: f64) -> bool {
    let scale = a.abs().max(b.abs());
    if scale < NEAR_ZERO {
        return true;
    }
    (a - b).abs() / scale < RELATIVE_TOLERANCE
}

/// Converts a 1-based column index into spreadsheet letters (1 -> A, 27 -> AA).
pub fn column_letter(col: u32) -> String {
    let mut n = col;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Converts spreadsheet column letters into a 1-based index. Returns `None` for anything
/// that is not one to three ASCII letters.
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    letters.chars().try_fold(0u32, |acc, c| {
        if c.is_ascii_alphabetic() {
            Some(acc * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1))
        } else {
            None
        }
    })
}

/// Parses an A1-style reference such as `K12` into `(row, col)`.
pub fn parse_a1(reference: &str) -> Result<(u32, u32)> {
    let trimmed = reference.trim().replace('$', "");
    let split = trimmed
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| NetNetError::InvalidCellReference(reference.to_string()))?;
    let (letters, digits) = trimmed.split_at(split);
    let col = column_index(letters)
        .ok_or_else(|| NetNetError::InvalidCellReference(reference.to_string()))?;
    let row = digits
        .parse::<u32>()
        .ok()
        .filter(|r| *r > 0)
        .ok_or_else(|| NetNetError::InvalidCellReference(reference.to_string()))?;
    Ok((row, col))
}

pub fn a1(row: u32, col: u32) -> String {
    format!("{}{}", column_letter(col), row)
}

/// Lowercases, trims and collapses internal whitespace so that labels from different
/// exports can be matched.
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Converts a spreadsheet serial day number (1900 date system) into a date.
pub fn serial_to_date(serial: f64) -> Result<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return Err(NetNetError::DateError(format!(
            "Serial {} is not a valid spreadsheet date",
            serial
        )));
    }

    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)
        .ok_or_else(|| NetNetError::DateError("Invalid spreadsheet epoch".to_string()))?;
    epoch
        .checked_add_days(Days::new(serial.trunc() as u64))
        .ok_or_else(|| NetNetError::DateError(format!("Serial {} overflows", serial)))
}

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%b %d, %Y", "%d %b %Y",
];

/// Parses the date formats seen in statement export headers.
pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

// Serials outside roughly 1955..2118 are treated as plain numbers, not dates.
const SERIAL_DATE_RANGE: std::ops::RangeInclusive<f64> = 20_000.0..=80_000.0;

/// Reads a period header cell as a label. Dates (text or serial) normalize to
/// `YYYY-MM-DD`; other text is returned trimmed.
pub fn period_label(value: &CellValue) -> Option<String> {
    match value {
        CellValue::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return None;
            }
            Some(
                parse_date_text(trimmed)
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| trimmed.to_string()),
            )
        }
        CellValue::Number(n) if SERIAL_DATE_RANGE.contains(n) => serial_to_date(*n)
            .ok()
            .map(|d| d.format("%Y-%m-%d").to_string()),
        CellValue::Number(n) if n.is_finite() => Some(format_plain(*n)),
        CellValue::Formula { cached: Some(n) } if SERIAL_DATE_RANGE.contains(n) => {
            serial_to_date(*n)
                .ok()
                .map(|d| d.format("%Y-%m-%d").to_string())
        }
        _ => None,
    }
}

/// Formats a number without a trailing `.0` for integral values.
pub fn format_plain(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Formats an amount with thousands separators and no decimals.
pub fn format_amount(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{}", rounded.abs() as i64);
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if rounded < 0.0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}
