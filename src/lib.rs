//! Mortality analysis: merge cause-of-death counts with population figures,
//! rank causes by correlation with total deaths and fit a regression tree.

pub mod cli;
pub mod pipeline;
pub mod report;
pub mod utils;
