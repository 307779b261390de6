//! Population reshape and the mortality/population inner join

use polars::prelude::*;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use super::error::{AtStage, Result, Stage};
use super::schema::{
    merged_columns, mortality_columns, require_columns, string_values, GEO_FIPS, GEO_NAME,
    JURISDICTION, QUARTER, TOTAL_POPULATION,
};

/// Region names present in only one of the two sources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegionDiff {
    pub mortality_only: BTreeSet<String>,
    pub population_only: BTreeSet<String>,
}

impl RegionDiff {
    pub fn between<'a>(
        mortality: impl IntoIterator<Item = &'a str>,
        population: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let left: BTreeSet<String> = mortality.into_iter().map(str::to_string).collect();
        let right: BTreeSet<String> = population.into_iter().map(str::to_string).collect();
        Self {
            mortality_only: left.difference(&right).cloned().collect(),
            population_only: right.difference(&left).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mortality_only.is_empty() && self.population_only.is_empty()
    }

    /// Symmetric difference of both sides
    pub fn symmetric(&self) -> BTreeSet<String> {
        self.mortality_only
            .union(&self.population_only)
            .cloned()
            .collect()
    }
}

/// Merged table plus the diagnostics gathered while joining
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub table: DataFrame,
    pub diff: RegionDiff,
    /// Mortality rows dropped by the join
    pub unmatched_rows: usize,
}

/// Strip separator characters so `"2020:Q1"` and `"2020Q1"` compare equal
pub fn normalize_period(label: &str) -> String {
    label
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '/') && !c.is_whitespace())
        .collect()
}

fn parse_population_cells(column: &Column) -> Result<Vec<Option<f64>>> {
    if column.dtype().is_primitive_numeric() || column.dtype() == &DataType::Null {
        let cast = column.cast(&DataType::Float64).at(Stage::Merge)?;
        return Ok(cast.f64().at(Stage::Merge)?.into_iter().collect());
    }

    // BEA exports sometimes quote counts with thousands separators or "(NA)"
    let cast = column.cast(&DataType::String).at(Stage::Merge)?;
    let values = cast
        .str()
        .at(Stage::Merge)?
        .into_iter()
        .map(|v| v.and_then(|s| s.trim().replace(',', "").parse::<f64>().ok()))
        .collect();
    Ok(values)
}

/// Reshape the wide population table (one column per quarter) to long form.
///
/// Output columns: `GeoName`, `Quarter` (normalized), `Total_Population`,
/// sorted stably by `GeoName`.
pub fn reshape_population(wide: &DataFrame) -> Result<DataFrame> {
    require_columns(wide, &[GEO_NAME], Stage::Merge)?;

    let geo_names = string_values(wide, GEO_NAME, Stage::Merge)?;
    let period_columns: Vec<&Column> = wide
        .get_columns()
        .iter()
        .filter(|col| col.name().as_str() != GEO_NAME && col.name().as_str() != GEO_FIPS)
        .collect();

    let mut rows: Vec<(String, String, Option<f64>)> =
        Vec::with_capacity(geo_names.len() * period_columns.len());
    let mut skipped = 0usize;

    for column in &period_columns {
        let period = normalize_period(column.name().as_str());
        let cells = parse_population_cells(column)?;
        for (geo, value) in geo_names.iter().zip(cells) {
            match geo {
                Some(name) => rows.push((name.clone(), period.clone(), value)),
                None => skipped += 1,
            }
        }
    }

    if skipped > 0 {
        tracing::debug!(skipped, "population cells without a GeoName skipped");
    }

    rows.sort_by(|a, b| a.0.cmp(&b.0));

    let mut geo = Vec::with_capacity(rows.len());
    let mut quarter = Vec::with_capacity(rows.len());
    let mut population = Vec::with_capacity(rows.len());
    for (g, q, p) in rows {
        geo.push(g);
        quarter.push(q);
        population.push(p);
    }

    let long = DataFrame::new(vec![
        Column::new(GEO_NAME.into(), geo),
        Column::new(QUARTER.into(), quarter),
        Column::new(TOTAL_POPULATION.into(), population),
    ])
    .at(Stage::Merge)?;

    tracing::info!(
        periods = period_columns.len(),
        rows = long.height(),
        "reshaped population table"
    );

    Ok(long)
}

fn key_tuples(df: &DataFrame, keys: &[&str]) -> Result<Vec<Option<Vec<String>>>> {
    let columns = keys
        .iter()
        .map(|k| string_values(df, k, Stage::Merge))
        .collect::<Result<Vec<_>>>()?;

    let tuples = (0..df.height())
        .map(|row| {
            columns
                .iter()
                .map(|col| col[row].clone())
                .collect::<Option<Vec<String>>>()
        })
        .collect();
    Ok(tuples)
}

/// Inner join on string-compared keys.
///
/// Keeps every left column, then the right columns that are not join keys.
/// Left row order is preserved; each left row emits one row per right match.
/// Rows with a missing key never match.
pub fn join_on_keys(
    left: &DataFrame,
    left_keys: &[&str],
    right: &DataFrame,
    right_keys: &[&str],
) -> Result<DataFrame> {
    require_columns(left, left_keys, Stage::Merge)?;
    require_columns(right, right_keys, Stage::Merge)?;

    let mut index: HashMap<Vec<String>, Vec<IdxSize>> = HashMap::new();
    for (row, key) in key_tuples(right, right_keys)?.into_iter().enumerate() {
        if let Some(key) = key {
            index.entry(key).or_default().push(row as IdxSize);
        }
    }

    let mut left_rows: Vec<IdxSize> = Vec::new();
    let mut right_rows: Vec<IdxSize> = Vec::new();
    for (row, key) in key_tuples(left, left_keys)?.into_iter().enumerate() {
        if let Some(matches) = key.as_ref().and_then(|k| index.get(k)) {
            for &m in matches {
                left_rows.push(row as IdxSize);
                right_rows.push(m);
            }
        }
    }

    let left_taken = left
        .take(&IdxCa::from_vec("idx".into(), left_rows))
        .at(Stage::Merge)?;
    let right_taken = right
        .take(&IdxCa::from_vec("idx".into(), right_rows))
        .at(Stage::Merge)?
        .drop_many(right_keys.iter().copied());

    let left_names: Vec<String> = left.get_column_names().iter().map(|s| s.to_string()).collect();
    let mut extra: Vec<Column> = Vec::with_capacity(right_taken.width());
    for col in right_taken.get_columns() {
        let mut col = col.clone();
        if left_names.iter().any(|n| n == col.name().as_str()) {
            let renamed = format!("{}_right", col.name());
            col.rename(renamed.into());
        }
        extra.push(col);
    }

    left_taken.hstack(&extra).at(Stage::Merge)
}

fn with_normalized_period(df: &DataFrame) -> Result<DataFrame> {
    let periods: Vec<Option<String>> = string_values(df, QUARTER, Stage::Merge)?
        .into_iter()
        .map(|p| p.map(|label| normalize_period(&label)))
        .collect();
    let mut out = df.clone();
    out.with_column(Column::new(QUARTER.into(), periods))
        .at(Stage::Merge)?;
    Ok(out)
}

fn distinct_names(df: &DataFrame, column: &str) -> Result<BTreeSet<String>> {
    Ok(string_values(df, column, Stage::Merge)?
        .into_iter()
        .flatten()
        .collect())
}

/// Inner-join the cleaned mortality table to the long population table on
/// (region, normalized period) and project the MergedRecord columns.
///
/// Regions present on only one side are reported through the returned
/// [`RegionDiff`] and a warning; they never fail the merge.
pub fn merge(mortality: &DataFrame, population: &DataFrame) -> Result<MergeOutcome> {
    require_columns(mortality, &mortality_columns(), Stage::Merge)?;
    require_columns(population, &[GEO_NAME, QUARTER, TOTAL_POPULATION], Stage::Merge)?;

    let mortality_regions = distinct_names(mortality, JURISDICTION)?;
    let population_regions = distinct_names(population, GEO_NAME)?;
    let diff = RegionDiff::between(
        mortality_regions.iter().map(String::as_str),
        population_regions.iter().map(String::as_str),
    );

    if !diff.is_empty() {
        tracing::warn!(
            mortality_only = ?diff.mortality_only,
            population_only = ?diff.population_only,
            "region names differ between sources; unmatched regions are dropped by the join"
        );
    }

    let left = with_normalized_period(mortality)?;
    let right = with_normalized_period(population)?;
    let joined = join_on_keys(&left, &[JURISDICTION, QUARTER], &right, &[GEO_NAME, QUARTER])?;
    let table = joined.select(merged_columns()).at(Stage::Merge)?;

    let unmatched_rows = mortality.height().saturating_sub(table.height());
    tracing::info!(
        mortality_rows = mortality.height(),
        population_rows = population.height(),
        rows = table.height(),
        unmatched_rows,
        "merged mortality and population"
    );

    Ok(MergeOutcome {
        table,
        diff,
        unmatched_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_period() {
        assert_eq!(normalize_period("2020:Q1"), "2020Q1");
        assert_eq!(normalize_period("2020Q1"), "2020Q1");
        assert_eq!(normalize_period(" 2021 - Q3 "), "2021Q3");
    }

    #[test]
    fn test_region_diff() {
        let diff = RegionDiff::between(["Alabama", "New York City", "Ohio"], ["Alabama", "Ohio", "US"]);
        assert_eq!(diff.mortality_only.iter().collect::<Vec<_>>(), vec!["New York City"]);
        assert_eq!(diff.population_only.iter().collect::<Vec<_>>(), vec!["US"]);
        assert_eq!(diff.symmetric().len(), 2);
        assert!(!diff.is_empty());
    }

    #[test]
    fn test_reshape_population_wide_to_long() {
        let wide = df! {
            "GeoFips" => ["01000", "02000"],
            "GeoName" => ["Alaska", "Alabama"],
            "2020:Q1" => [731_000i64, 4_900_000],
            "2020:Q2" => [732_000i64, 4_910_000],
        }
        .unwrap();

        let long = reshape_population(&wide).unwrap();
        assert_eq!(long.shape(), (4, 3));

        let geo = string_values(&long, GEO_NAME, Stage::Merge).unwrap();
        let quarters = string_values(&long, QUARTER, Stage::Merge).unwrap();
        // Sorted by GeoName, melt order kept within a region
        assert_eq!(geo[0].as_deref(), Some("Alabama"));
        assert_eq!(geo[1].as_deref(), Some("Alabama"));
        assert_eq!(quarters[0].as_deref(), Some("2020Q1"));
        assert_eq!(quarters[1].as_deref(), Some("2020Q2"));
    }

    #[test]
    fn test_reshape_population_parses_text_counts() {
        let wide = df! {
            "GeoName" => ["Ohio", "Utah"],
            "2020:Q1" => ["11,790,000", "(NA)"],
        }
        .unwrap();

        let long = reshape_population(&wide).unwrap();
        let pops: Vec<Option<f64>> = long
            .column(TOTAL_POPULATION)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(pops, vec![Some(11_790_000.0), None]);
    }

    #[test]
    fn test_join_renames_clashing_columns() {
        let left = df! { "k" => ["a", "b"], "v" => [1i32, 2] }.unwrap();
        let right = df! { "key" => ["b", "a"], "v" => [20i32, 10] }.unwrap();

        let joined = join_on_keys(&left, &["k"], &right, &["key"]).unwrap();
        let names: Vec<String> = joined.get_column_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["k", "v", "v_right"]);
        let right_v: Vec<Option<i32>> =
            joined.column("v_right").unwrap().i32().unwrap().into_iter().collect();
        assert_eq!(right_v, vec![Some(10), Some(20)]);
    }
}
