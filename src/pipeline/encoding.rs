//! Categorical encoding
//!
//! Each text column is fitted to its own vocabulary: distinct observed values,
//! sorted, mapped to dense codes `0..n`. The vocabulary lives only for the run
//! and is handed back to the caller alongside the encoded table.

use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

use super::error::{AtStage, PipelineError, Result, Stage};

/// Bijection between the distinct values of one column and `0..len`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryMapping {
    codes: BTreeMap<String, u32>,
    #[serde(skip)]
    values: Vec<String>,
}

impl CategoryMapping {
    /// Fit on observed values; missing entries are ignored
    pub fn fit<'a>(observed: impl IntoIterator<Item = &'a str>) -> Self {
        let mut values: Vec<String> = observed.into_iter().map(str::to_string).collect();
        values.sort();
        values.dedup();
        let codes = values
            .iter()
            .enumerate()
            .map(|(code, value)| (value.clone(), code as u32))
            .collect();
        Self { codes, values }
    }

    pub fn code(&self, value: &str) -> Option<u32> {
        self.codes.get(value).copied()
    }

    pub fn value(&self, code: u32) -> Option<&str> {
        self.values.get(code as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// (value, code) pairs in code order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.values
            .iter()
            .enumerate()
            .map(|(code, value)| (value.as_str(), code as u32))
    }
}

/// Mappings for every encoded column, keyed by column name
pub type CategoryMappings = BTreeMap<String, CategoryMapping>;

/// Replace every text column with its integer codes.
///
/// Returns the encoded table and the mapping fitted for each text column.
/// Non-text columns pass through unchanged.
pub fn encode_categorical(df: &DataFrame) -> Result<(DataFrame, CategoryMappings)> {
    let mut mappings = CategoryMappings::new();
    let mut columns: Vec<Column> = Vec::with_capacity(df.width());

    for col in df.get_columns() {
        if col.dtype() != &DataType::String {
            columns.push(col.clone());
            continue;
        }

        let ca = col.str().at(Stage::Prepare)?;
        let mapping = CategoryMapping::fit(ca.into_iter().flatten());
        let codes: Vec<Option<u32>> = ca
            .into_iter()
            .map(|v| match v {
                Some(s) => mapping.code(s).map(Some).ok_or_else(|| {
                    PipelineError::data(
                        Stage::Prepare,
                        format!("value '{}' of column '{}' missing from its own vocabulary", s, col.name()),
                    )
                }),
                None => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(column = %col.name(), categories = mapping.len(), "encoded categorical column");
        columns.push(Column::new(col.name().clone(), codes));
        mappings.insert(col.name().to_string(), mapping);
    }

    let encoded = DataFrame::new(columns).at(Stage::Prepare)?;
    Ok((encoded, mappings))
}
