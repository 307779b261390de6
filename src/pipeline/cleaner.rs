//! Mortality table normalization
//!
//! Turns the raw CDC weekly table into MortalityRecord rows: one row per
//! (jurisdiction, quarter) with short column names and no flag columns.

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use std::collections::HashSet;

use super::error::{AtStage, PipelineError, Result, Stage};
use super::schema::{
    mortality_columns, require_columns, string_values, DAY, FLAG_COLUMNS, MONTH, QUARTER,
    RAW_JURISDICTION, RAW_WEEK_ENDING_DATE, RENAMES, YEAR,
};

/// Parse a week ending date in any of the encodings the CDC export has used
pub fn parse_week_ending(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| NaiveDate::parse_from_str(trimmed, "%m/%d/%Y").ok())
        .or_else(|| {
            trimmed
                .get(..10)
                .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        })
}

/// Quarter label in the `YYYYQn` form shared with the population table
pub fn quarter_label(date: NaiveDate) -> String {
    format!("{}Q{}", date.year(), (date.month() - 1) / 3 + 1)
}

/// Normalize the raw mortality table.
///
/// Steps run in a fixed order: parse dates and derive the quarter, dedup on
/// (jurisdiction, quarter) keeping the first row, drop flag columns, rename to
/// short names, derive year/month/day, and project the MortalityRecord columns.
pub fn clean_mortality(raw: &DataFrame) -> Result<DataFrame> {
    require_columns(raw, &[RAW_JURISDICTION, RAW_WEEK_ENDING_DATE], Stage::Clean)?;

    let dates = string_values(raw, RAW_WEEK_ENDING_DATE, Stage::Clean)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            let text = value.ok_or_else(|| {
                PipelineError::malformed_column(
                    Stage::Clean,
                    RAW_WEEK_ENDING_DATE,
                    format!("has a missing date at row {}", row),
                )
            })?;
            parse_week_ending(&text).ok_or_else(|| {
                PipelineError::malformed_column(
                    Stage::Clean,
                    RAW_WEEK_ENDING_DATE,
                    format!("has an unparseable date '{}' at row {}", text, row),
                )
            })
        })
        .collect::<Result<Vec<NaiveDate>>>()?;

    let quarters: Vec<String> = dates.iter().map(|d| quarter_label(*d)).collect();
    let jurisdictions = string_values(raw, RAW_JURISDICTION, Stage::Clean)?;

    let mut seen: HashSet<(Option<String>, String)> = HashSet::with_capacity(raw.height());
    let keep: Vec<bool> = jurisdictions
        .into_iter()
        .zip(quarters.iter())
        .map(|(jurisdiction, quarter)| seen.insert((jurisdiction, quarter.clone())))
        .collect();

    let mut df = raw.clone();
    df.with_column(Column::new(QUARTER.into(), quarters))
        .at(Stage::Clean)?;

    let present: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    let flags: Vec<&str> = FLAG_COLUMNS
        .iter()
        .copied()
        .filter(|flag| present.iter().any(|p| p == flag))
        .collect();
    let mut df = df.drop_many(flags.iter().copied());

    for (old, new) in RENAMES {
        let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        let has_old = names.iter().any(|n| n == old);
        let has_new = names.iter().any(|n| n == new);
        if has_old && !has_new {
            df.rename(old, new.into()).at(Stage::Clean)?;
        }
    }

    let years: Vec<i32> = dates.iter().map(|d| d.year()).collect();
    let months: Vec<u32> = dates.iter().map(|d| d.month()).collect();
    let days: Vec<u32> = dates.iter().map(|d| d.day()).collect();
    df.with_column(Column::new(YEAR.into(), years)).at(Stage::Clean)?;
    df.with_column(Column::new(MONTH.into(), months)).at(Stage::Clean)?;
    df.with_column(Column::new(DAY.into(), days)).at(Stage::Clean)?;

    let mask = BooleanChunked::from_slice("keep".into(), &keep);
    let deduped = df.filter(&mask).at(Stage::Clean)?;

    let columns = mortality_columns();
    require_columns(&deduped, &columns, Stage::Clean)?;
    let cleaned = deduped.select(columns).at(Stage::Clean)?;

    tracing::info!(
        raw_rows = raw.height(),
        rows = cleaned.height(),
        duplicates = raw.height() - cleaned.height(),
        dropped_flags = flags.len(),
        "cleaned mortality table"
    );

    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_week_ending_formats() {
        let expected = NaiveDate::from_ymd_opt(2020, 1, 4).unwrap();
        assert_eq!(parse_week_ending("2020-01-04"), Some(expected));
        assert_eq!(parse_week_ending("01/04/2020"), Some(expected));
        assert_eq!(parse_week_ending("2020-01-04T00:00:00.000"), Some(expected));
        assert_eq!(parse_week_ending("not a date"), None);
    }

    #[test]
    fn test_quarter_label() {
        let q = |y, m, d| quarter_label(NaiveDate::from_ymd_opt(y, m, d).unwrap());
        assert_eq!(q(2020, 1, 4), "2020Q1");
        assert_eq!(q(2020, 3, 31), "2020Q1");
        assert_eq!(q(2021, 4, 1), "2021Q2");
        assert_eq!(q(2022, 12, 31), "2022Q4");
    }
}
