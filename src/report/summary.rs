//! Terminal summary tables

use std::time::Duration;

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, CellAlignment, Color, Table};
use console::style;

use crate::pipeline::correlation::FeatureSelection;
use crate::pipeline::merger::RegionDiff;
use crate::pipeline::model::{Metrics, ModelArtifact};
use crate::pipeline::rates::RegionRate;

/// Row counts and timings collected while the pipeline runs
#[derive(Debug, Default)]
pub struct RunSummary {
    pub mortality_rows: usize,
    pub cleaned_rows: usize,
    pub population_rows: usize,
    pub merged_rows: usize,
    pub unmatched_rows: usize,
    pub regions_dropped: usize,
    pub outlier_rows_dropped: Option<usize>,
    pub selected_features: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub metrics: Option<Metrics>,
    step_times: Vec<(&'static str, Duration)>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_time(&mut self, step: &'static str, elapsed: Duration) {
        self.step_times.push((step, elapsed));
    }

    pub fn total_time(&self) -> Duration {
        self.step_times.iter().map(|(_, d)| *d).sum()
    }

    pub fn display(&self) {
        print_section("📋", "RUN SUMMARY");

        let mut table = new_table(&["Metric", "Value"]);
        table.add_row(vec![Cell::new("Mortality rows (raw)"), Cell::new(self.mortality_rows)]);
        table.add_row(vec![Cell::new("Mortality rows (cleaned)"), Cell::new(self.cleaned_rows)]);
        table.add_row(vec![Cell::new("Population rows (long)"), Cell::new(self.population_rows)]);
        table.add_row(vec![
            Cell::new("Merged rows"),
            Cell::new(self.merged_rows).fg(Color::Green).add_attribute(Attribute::Bold),
        ]);
        table.add_row(vec![
            Cell::new("Unmatched mortality rows"),
            Cell::new(self.unmatched_rows).fg(warn_if_nonzero(self.unmatched_rows)),
        ]);
        table.add_row(vec![
            Cell::new("Regions in one source only"),
            Cell::new(self.regions_dropped).fg(warn_if_nonzero(self.regions_dropped)),
        ]);
        if let Some(dropped) = self.outlier_rows_dropped {
            table.add_row(vec![
                Cell::new("Outlier rows dropped"),
                Cell::new(dropped).fg(warn_if_nonzero(dropped)),
            ]);
        }
        table.add_row(vec![Cell::new("Selected features"), Cell::new(self.selected_features)]);
        table.add_row(vec![
            Cell::new("Train / test rows"),
            Cell::new(format!("{} / {}", self.train_rows, self.test_rows)),
        ]);
        if let Some(m) = &self.metrics {
            table.add_row(vec![Cell::new("MAE"), Cell::new(format!("{:.3}", m.mae))]);
            table.add_row(vec![Cell::new("MSE"), Cell::new(format!("{:.3}", m.mse))]);
            table.add_row(vec![
                Cell::new("R²"),
                Cell::new(format!("{:.4}", m.r2))
                    .fg(r2_color(m.r2))
                    .add_attribute(Attribute::Bold),
            ]);
        }
        table.add_row(vec![
            Cell::new("Total time"),
            Cell::new(format!("{:.2}s", self.total_time().as_secs_f64())),
        ]);
        print_indented(&table);
    }
}

fn warn_if_nonzero(n: usize) -> Color {
    if n == 0 {
        Color::White
    } else {
        Color::Yellow
    }
}

fn r2_color(r2: f64) -> Color {
    if r2 >= 0.7 {
        Color::Green
    } else if r2 >= 0.3 {
        Color::Yellow
    } else {
        Color::Red
    }
}

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(
        header
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect::<Vec<_>>(),
    );
    table
}

fn print_section(icon: &str, title: &str) {
    println!();
    println!("    {} {}", style(icon).cyan(), style(title).white().bold());
    println!("    {}", style("─".repeat(50)).dim());
    println!();
}

fn print_indented(table: &Table) {
    for line in table.to_string().lines() {
        println!("    {}", line);
    }
}

/// Regions that only one source knows about
pub fn display_region_diff(diff: &RegionDiff) {
    if diff.is_empty() {
        return;
    }
    print_section("🧭", "UNMATCHED REGIONS");
    for (label, regions) in [
        ("Mortality only", &diff.mortality_only),
        ("Population only", &diff.population_only),
    ] {
        if regions.is_empty() {
            continue;
        }
        println!(
            "      {} {}:",
            style(label).yellow(),
            style(format!("({})", regions.len())).dim()
        );
        for region in regions {
            println!("        {} {}", style("•").dim(), region);
        }
    }
}

pub fn display_selected_features(selection: &FeatureSelection) {
    print_section("🔗", "SELECTED FEATURES");
    let correlation_header = format!("r with {}", selection.target);
    let mut table = new_table(&["#", "Feature", correlation_header.as_str()]);
    for (rank, feature) in selection.selected.iter().enumerate() {
        table.add_row(vec![
            Cell::new(rank + 1).set_alignment(CellAlignment::Right),
            Cell::new(&feature.feature),
            Cell::new(format!("{:+.4}", feature.correlation)).set_alignment(CellAlignment::Right),
        ]);
    }
    print_indented(&table);
}

pub fn display_importances(artifact: &ModelArtifact) {
    print_section("🌳", "FEATURE IMPORTANCE");
    let mut table = new_table(&["Feature", "Importance"]);
    for (feature, importance) in artifact.ranked_importances() {
        let cell = Cell::new(format!("{:.4}", importance)).set_alignment(CellAlignment::Right);
        let cell = if importance > 0.0 { cell.fg(Color::Green) } else { cell };
        table.add_row(vec![Cell::new(feature), cell]);
    }
    print_indented(&table);
}

pub fn display_top_regions(regions: &[RegionRate]) {
    if regions.is_empty() {
        return;
    }
    print_section("📈", "HIGHEST MEAN DEATH RATE");
    let mut table = new_table(&["Region", "Deaths per 100k"]);
    for region in regions {
        table.add_row(vec![
            Cell::new(&region.region),
            Cell::new(format!("{:.1}", region.mean_death_rate * 100_000.0))
                .set_alignment(CellAlignment::Right),
        ]);
    }
    print_indented(&table);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_time() {
        let mut summary = RunSummary::new();
        summary.record_time("load", Duration::from_millis(250));
        summary.record_time("merge", Duration::from_millis(750));
        assert_eq!(summary.total_time(), Duration::from_secs(1));
    }

    #[test]
    fn test_r2_color_bands() {
        assert_eq!(r2_color(0.9), Color::Green);
        assert_eq!(r2_color(0.5), Color::Yellow);
        assert_eq!(r2_color(-1.0), Color::Red);
    }
}
