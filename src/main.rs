//! mortality: cause-of-death regression analysis CLI
//!
//! Loads CDC mortality counts and BEA population figures, merges them per
//! state and quarter, selects the causes most correlated with the target and
//! fits a shallow regression tree.

use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use console::style;

use mortality_analysis::cli::Cli;
use mortality_analysis::pipeline::schema::{CAUSE_COLUMNS, TOTAL_DEATHS};
use mortality_analysis::pipeline::{
    analyze_missing_values, cause_correlations, clean_mortality, dataset_stats, filter_outliers,
    load_table, merge, prepare, quarterly_rate_trends, reshape_population, save_dataset,
    top_regions_by_death_rate, with_cause_rates, with_death_rate, Modeler,
};
use mortality_analysis::report::{
    display_importances, display_region_diff, display_selected_features, display_top_regions,
    export_run_report, ReportParams, RunReport, RunResults, RunSummary,
};
use mortality_analysis::utils::{
    abandon, create_spinner, finish_with_success, finish_with_warning, init_logger, print_banner,
    print_block, print_completion, print_config, print_count, print_info, print_step_header,
    print_step_time, print_success, print_warning,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let prepare_config = cli.prepare_config();
    let split_params = cli.split_params();
    let tree_params = cli.tree_params();

    print_banner(env!("CARGO_PKG_VERSION"));
    print_config(&[
        ("Mortality", cli.mortality.clone()),
        ("Population", cli.population.clone()),
        ("Target", cli.target.clone()),
        ("Top k", prepare_config.top_k.to_string()),
        ("Test size", format!("{:.0}%", split_params.test_fraction * 100.0)),
        ("Seed", split_params.seed.to_string()),
        (
            "Tree",
            format!(
                "depth ≤ {}, split ≥ {}, leaf ≥ {}",
                tree_params.max_depth, tree_params.min_samples_split, tree_params.min_samples_leaf
            ),
        ),
        (
            "Outliers",
            cli.outliers.map_or("off".to_string(), |m| m.to_string()),
        ),
    ]);

    let mut summary = RunSummary::new();

    // Step 1: Load both sources
    print_step_header(1, "Load Data");
    let step_start = Instant::now();
    let spinner = create_spinner("Loading mortality data...");
    let raw_mortality =
        load_table(&cli.mortality, cli.infer_schema_length).inspect_err(|_| abandon(&spinner))?;
    finish_with_success(&spinner, "Mortality data loaded");
    let spinner = create_spinner("Loading population data...");
    let raw_population =
        load_table(&cli.population, cli.infer_schema_length).inspect_err(|_| abandon(&spinner))?;
    finish_with_success(&spinner, "Population data loaded");

    for (name, df) in [("Mortality", &raw_mortality), ("Population", &raw_population)] {
        let (rows, cols, memory_mb) = dataset_stats(df);
        println!(
            "\n    {} {}: {} rows × {} columns ({:.2} MB)",
            style("✧").cyan(),
            name,
            rows,
            cols,
            memory_mb
        );
    }
    summary.mortality_rows = raw_mortality.height();
    let elapsed = step_start.elapsed();
    summary.record_time("load", elapsed);
    print_step_time(elapsed);

    // Step 2: Clean mortality
    print_step_header(2, "Clean Mortality Data");
    let step_start = Instant::now();
    let mortality = clean_mortality(&raw_mortality)?;
    summary.cleaned_rows = mortality.height();
    print_success(&format!(
        "{} region-quarter rows ({} duplicates removed)",
        mortality.height(),
        raw_mortality.height().saturating_sub(mortality.height())
    ));
    let elapsed = step_start.elapsed();
    summary.record_time("clean", elapsed);
    print_step_time(elapsed);

    // Step 3: Reshape population and merge
    print_step_header(3, "Merge Mortality and Population");
    let step_start = Instant::now();
    let population = reshape_population(&raw_population)?;
    summary.population_rows = population.height();
    let outcome = merge(&mortality, &population)?;
    summary.merged_rows = outcome.table.height();
    summary.unmatched_rows = outcome.unmatched_rows;
    summary.regions_dropped = outcome.diff.symmetric().len();

    if outcome.diff.is_empty() {
        print_success("Every region appears in both sources");
    } else {
        print_warning(&format!(
            "{} region(s) appear in only one source and were dropped",
            summary.regions_dropped
        ));
        display_region_diff(&outcome.diff);
    }
    print_success(&format!("Merged table: {} rows", outcome.table.height()));
    let elapsed = step_start.elapsed();
    summary.record_time("merge", elapsed);
    print_step_time(elapsed);

    let mut step_num = 4;
    let mut modeling_table = outcome.table.clone();
    let mut outlier_report = None;

    // Optional: outlier filtering
    if let Some(method) = cli.outliers {
        print_step_header(step_num, "Outlier Filtering");
        step_num += 1;
        let step_start = Instant::now();
        let spinner = create_spinner(&format!("Filtering outliers ({})...", method));
        let (filtered, report) =
            filter_outliers(&modeling_table, method).inspect_err(|_| abandon(&spinner))?;
        let dropped = report.rows_before - report.rows_after;
        if dropped == 0 {
            finish_with_success(&spinner, "No outlier rows found");
        } else {
            finish_with_warning(&spinner, &format!("Dropped {} outlier row(s)", dropped));
        }
        summary.outlier_rows_dropped = Some(dropped);
        modeling_table = filtered;
        outlier_report = Some(report);
        let elapsed = step_start.elapsed();
        summary.record_time("outliers", elapsed);
        print_step_time(elapsed);
    }

    // Feature preparation
    print_step_header(step_num, "Prepare Features");
    step_num += 1;
    let step_start = Instant::now();
    let missing = analyze_missing_values(&modeling_table)?;
    let with_missing = missing.iter().filter(|(_, ratio)| *ratio > 0.0).count();
    if with_missing == 0 {
        print_info("No missing values");
    } else {
        print_count("column(s) with missing values", with_missing, Some("(imputed)"));
    }

    let spinner = create_spinner("Ranking features by correlation...");
    let (features, preparation) =
        prepare(&modeling_table, &cli.target, &prepare_config).inspect_err(|_| abandon(&spinner))?;
    finish_with_success(
        &spinner,
        &format!("Selected {} feature(s)", preparation.selection.k),
    );
    summary.selected_features = preparation.selection.k;
    display_selected_features(&preparation.selection);
    let elapsed = step_start.elapsed();
    summary.record_time("prepare", elapsed);
    print_step_time(elapsed);

    // Modeling
    print_step_header(step_num, "Fit Regression Tree");
    step_num += 1;
    let step_start = Instant::now();
    let spinner = create_spinner("Fitting regression tree...");
    let mut modeler = Modeler::new();
    let metrics = modeler
        .load(&features, &cli.target)
        .and_then(|m| m.split(split_params.test_fraction, split_params.seed))
        .and_then(|m| m.fit(&tree_params))
        .and_then(|m| m.evaluate())
        .inspect_err(|_| abandon(&spinner))?;
    finish_with_success(&spinner, "Model evaluated");

    let artifact = modeler.into_artifact()?;
    summary.train_rows = artifact.split.train.len();
    summary.test_rows = artifact.split.test.len();
    summary.metrics = Some(metrics);

    println!(
        "\n    {} MAE {:.3}  MSE {:.3}  R² {:.4}",
        style("✧").cyan(),
        metrics.mae,
        metrics.mse,
        metrics.r2
    );
    println!(
        "    {} depth {}, {} leaves\n",
        style("✧").cyan(),
        artifact.tree.depth(),
        artifact.tree.n_leaves()
    );
    print_block(&artifact.tree.render(&artifact.feature_names, cli.tree_depth));
    display_importances(&artifact);
    let elapsed = step_start.elapsed();
    summary.record_time("model", elapsed);
    print_step_time(elapsed);

    // Rates
    print_step_header(step_num, "Mortality Rates");
    step_num += 1;
    let step_start = Instant::now();
    let top_regions = top_regions_by_death_rate(&outcome.table, cli.top_regions)?;
    let trends = quarterly_rate_trends(&outcome.table, &CAUSE_COLUMNS)?;
    let correlations = cause_correlations(&outcome.table, TOTAL_DEATHS)?;
    display_top_regions(&top_regions);
    print_info(&format!("Computed cause rate trends for {} quarter(s)", trends.len()));
    let elapsed = step_start.elapsed();
    summary.record_time("rates", elapsed);
    print_step_time(elapsed);

    // Outputs are written only once the model has been evaluated
    if cli.merged_output.is_some() || cli.report.is_some() {
        print_step_header(step_num, "Save Results");
        let step_start = Instant::now();

        if let Some(path) = &cli.merged_output {
            let spinner = create_spinner("Writing merged table...");
            let mut with_rates = with_death_rate(&outcome.table)
                .and_then(|df| with_cause_rates(&df, &CAUSE_COLUMNS))
                .inspect_err(|_| abandon(&spinner))?;
            save_dataset(&mut with_rates, path).inspect_err(|_| abandon(&spinner))?;
            finish_with_success(&spinner, &format!("Saved to {}", path.display()));
        }

        if let Some(path) = &cli.report {
            let spinner = create_spinner("Writing run report...");
            let params = ReportParams {
                mortality_source: &cli.mortality,
                population_source: &cli.population,
                target_column: &cli.target,
                prepare: &prepare_config,
                split: split_params,
                tree: &tree_params,
                outliers: cli.outliers,
            };
            let results = RunResults {
                merged_rows: outcome.table.height(),
                unmatched_rows: outcome.unmatched_rows,
                region_diff: &outcome.diff,
                outliers: outlier_report.as_ref(),
                preparation: &preparation,
                artifact: &artifact,
                cause_correlations: &correlations,
                top_regions: &top_regions,
                quarterly_trends: &trends,
            };
            export_run_report(&RunReport::new(&params, &results), path)
                .inspect_err(|_| abandon(&spinner))?;
            finish_with_success(&spinner, &format!("Saved to {}", path.display()));
        }

        let elapsed = step_start.elapsed();
        summary.record_time("save", elapsed);
        print_step_time(elapsed);
    }

    summary.display();
    print_completion();

    Ok(())
}
