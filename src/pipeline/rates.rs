//! Death and cause-specific mortality rates
//!
//! [`rate`] is the only place a rate is computed; every derived column and
//! aggregate below goes through it.

use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

use super::error::{AtStage, Result, Stage};
use super::schema::{
    float_values, require_columns, string_values, DEATH_RATE, JURISDICTION, QUARTER,
    TOTAL_DEATHS, TOTAL_POPULATION, YEAR,
};

/// Deaths per person. None when either input is missing or the population is
/// not positive.
pub fn rate(count: Option<f64>, population: Option<f64>) -> Option<f64> {
    match (count, population) {
        (Some(c), Some(p)) if p > 0.0 && c.is_finite() && p.is_finite() => Some(c / p),
        _ => None,
    }
}

/// Name of the mortality-rate column derived for a cause
pub fn rate_column_name(cause: &str) -> String {
    format!("{}_Mortality_Rate", cause)
}

fn rate_values(df: &DataFrame, count_column: &str) -> Result<Vec<Option<f64>>> {
    let counts = float_values(df, count_column, Stage::Prepare)?;
    let population = float_values(df, TOTAL_POPULATION, Stage::Prepare)?;
    Ok(counts
        .into_iter()
        .zip(population)
        .map(|(c, p)| rate(c, p))
        .collect())
}

/// Add `Death_Rate` = Total Deaths / Total_Population
pub fn with_death_rate(df: &DataFrame) -> Result<DataFrame> {
    require_columns(df, &[TOTAL_DEATHS, TOTAL_POPULATION], Stage::Prepare)?;
    let mut out = df.clone();
    out.with_column(Column::new(DEATH_RATE.into(), rate_values(df, TOTAL_DEATHS)?))
        .at(Stage::Prepare)?;
    Ok(out)
}

/// Add `<cause>_Mortality_Rate` for each cause
pub fn with_cause_rates(df: &DataFrame, causes: &[&str]) -> Result<DataFrame> {
    require_columns(df, &[TOTAL_POPULATION], Stage::Prepare)?;
    require_columns(df, causes, Stage::Prepare)?;
    let mut out = df.clone();
    for cause in causes {
        out.with_column(Column::new(
            rate_column_name(cause).into(),
            rate_values(df, cause)?,
        ))
        .at(Stage::Prepare)?;
    }
    Ok(out)
}

/// A region and its mean death rate over all its periods
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionRate {
    pub region: String,
    pub mean_death_rate: f64,
}

/// Regions with the highest mean death rate, descending
pub fn top_regions_by_death_rate(df: &DataFrame, n: usize) -> Result<Vec<RegionRate>> {
    require_columns(df, &[JURISDICTION], Stage::Prepare)?;
    let regions = string_values(df, JURISDICTION, Stage::Prepare)?;
    let rates = rate_values(df, TOTAL_DEATHS)?;

    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for (region, r) in regions.into_iter().zip(rates) {
        if let (Some(region), Some(r)) = (region, r) {
            let entry = sums.entry(region).or_insert((0.0, 0));
            entry.0 += r;
            entry.1 += 1;
        }
    }

    let mut ranked: Vec<RegionRate> = sums
        .into_iter()
        .map(|(region, (sum, count))| RegionRate {
            region,
            mean_death_rate: sum / count as f64,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.mean_death_rate
            .partial_cmp(&a.mean_death_rate)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(n);
    Ok(ranked)
}

/// Mean cause mortality rates for one (year, quarter)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuarterTrend {
    pub year: i64,
    pub quarter: String,
    /// Mean rate per cause, in the order the causes were requested
    pub mean_rates: Vec<(String, f64)>,
}

/// Mean mortality rate of each cause per (Year, Quarter), sorted by period
pub fn quarterly_rate_trends(df: &DataFrame, causes: &[&str]) -> Result<Vec<QuarterTrend>> {
    require_columns(df, &[YEAR, QUARTER], Stage::Prepare)?;
    let years = float_values(df, YEAR, Stage::Prepare)?;
    let quarters = string_values(df, QUARTER, Stage::Prepare)?;
    let cause_rates: Vec<Vec<Option<f64>>> = causes
        .iter()
        .map(|cause| rate_values(df, cause))
        .collect::<Result<_>>()?;

    // (year, quarter) -> per-cause (sum, count)
    let mut groups: BTreeMap<(i64, String), Vec<(f64, usize)>> = BTreeMap::new();
    for row in 0..df.height() {
        let (Some(year), Some(quarter)) = (years[row], quarters[row].as_ref()) else {
            continue;
        };
        let acc = groups
            .entry((year as i64, quarter.clone()))
            .or_insert_with(|| vec![(0.0, 0); causes.len()]);
        for (i, rates) in cause_rates.iter().enumerate() {
            if let Some(r) = rates[row] {
                acc[i].0 += r;
                acc[i].1 += 1;
            }
        }
    }

    Ok(groups
        .into_iter()
        .map(|((year, quarter), acc)| QuarterTrend {
            year,
            quarter,
            mean_rates: causes
                .iter()
                .zip(acc)
                .map(|(cause, (sum, count))| {
                    let mean = if count == 0 { f64::NAN } else { sum / count as f64 };
                    (cause.to_string(), mean)
                })
                .collect(),
        })
        .collect())
}
