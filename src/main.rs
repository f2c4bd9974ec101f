// Entry point and high-level CLI flow.
//
// Each subcommand is one batch step of the analysis:
// - `normalize`, `score`, `scenarios` cover the ranking side,
// - `sample`, `reconcile`, `impute` cover the inspection feedback loop,
// - `report` runs everything into one output directory,
// - `tune` recomputes the ranking interactively as weights are typed in.
use anyhow::{anyhow, bail, Context};
use asset_criticality::config::AnalysisConfig;
use asset_criticality::fixtures;
use asset_criticality::loader::{load_field_measurements, load_overrides};
use asset_criticality::output;
use asset_criticality::pipeline::{self, Prepared};
use asset_criticality::reports;
use asset_criticality::reconcile::Recommendation;
use asset_criticality::scenario::{compute, ScenarioResult};
use asset_criticality::scoring::WeightConfig;
use asset_criticality::types::PriorityRow;
use asset_criticality::util::{self, format_int};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "asset-criticality")]
#[command(version, about = "Criticality scoring and inspection planning for network assets", long_about = None)]
struct Cli {
    /// TOML analysis configuration; reference defaults when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Rows shown in console table previews.
    #[arg(long, global = true, default_value_t = 5)]
    preview_rows: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize the dataset and report per-attribute outcomes.
    Normalize {
        input: PathBuf,
        #[arg(short, long, default_value = "normalized.csv")]
        out: PathBuf,
    },
    /// Write the priority matrix for one scenario.
    Score {
        input: PathBuf,
        /// Scenario name; the primary scenario when omitted.
        #[arg(short, long)]
        scenario: Option<String>,
        #[arg(long)]
        overrides: Option<PathBuf>,
        #[arg(short, long, default_value = "priority_matrix.csv")]
        out: PathBuf,
    },
    /// Rank under every configured scenario and compare the top assets.
    Scenarios {
        input: PathBuf,
        #[arg(long)]
        overrides: Option<PathBuf>,
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Draw a stratified inspection sample.
    Sample {
        input: PathBuf,
        #[arg(long)]
        overrides: Option<PathBuf>,
        #[arg(short = 'n', long)]
        size: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(short, long, default_value = "inspection_sample.csv")]
        out: PathBuf,
    },
    /// Compare computed scores with field measurements.
    Reconcile {
        input: PathBuf,
        #[arg(short, long)]
        field: PathBuf,
        #[arg(long)]
        overrides: Option<PathBuf>,
        #[arg(short, long, default_value = "reconciliation.csv")]
        out: PathBuf,
    },
    /// Reconcile, then estimate measurements for assets never inspected.
    Impute {
        input: PathBuf,
        #[arg(short, long)]
        field: PathBuf,
        #[arg(long)]
        overrides: Option<PathBuf>,
        #[arg(short, long, default_value = "imputed_measurements.csv")]
        out: PathBuf,
    },
    /// Run the whole analysis and write every table, summary.json and report.md.
    Report {
        input: PathBuf,
        #[arg(short, long)]
        field: Option<PathBuf>,
        #[arg(long)]
        overrides: Option<PathBuf>,
        #[arg(short, long, default_value = "report")]
        out_dir: PathBuf,
    },
    /// Adjust weights interactively and watch the ranking change.
    Tune {
        input: PathBuf,
        #[arg(long)]
        overrides: Option<PathBuf>,
    },
    /// Write a synthetic demo dataset and input templates.
    Generate {
        #[arg(short, long, default_value = "demo")]
        out_dir: PathBuf,
        #[arg(short = 'n', long, default_value_t = 100)]
        assets: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

struct Session {
    config: AnalysisConfig,
    preview_rows: usize,
}

fn init_tracing(verbose: bool) {
    // ASSET_CRITICALITY_LOG_FORMAT=json switches to machine-parseable output.
    let log_format =
        std::env::var("ASSET_CRITICALITY_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = if verbose {
        EnvFilter::new("asset_criticality=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "asset_criticality=info".into())
    };

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
                .init();
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AnalysisConfig> {
    match path {
        Some(p) => AnalysisConfig::load(p)
            .with_context(|| format!("failed to load configuration {}", p.display())),
        None => Ok(AnalysisConfig::default()),
    }
}

/// Load, clean and normalize the dataset, then apply overrides if given.
///
/// Prints the same kind of processing diagnostics for every command.
fn prepare(ctx: &Session, input: &Path, overrides: Option<&Path>) -> anyhow::Result<Prepared> {
    let mut prepared = pipeline::load_and_prepare(input, &ctx.config)
        .with_context(|| format!("failed to load {}", input.display()))?;
    let load = &prepared.load;
    println!(
        "Processing dataset... ({} rows read, {} assets kept)",
        format_int(load.total_rows),
        format_int(prepared.dataset.len())
    );
    if load.duplicate_rows > 0 || load.skipped_rows > 0 {
        println!(
            "Note: {} duplicate rows dropped, {} rows skipped without an asset id.",
            format_int(load.duplicate_rows),
            format_int(load.skipped_rows)
        );
    }
    if load.imputed_values > 0 {
        println!(
            "Info: Filled {} blank values with the column mean.",
            format_int(load.imputed_values)
        );
    }
    if load.invalid_dates > 0 {
        println!("Info: {} event dates could not be parsed.", format_int(load.invalid_dates));
    }
    if !prepared.dropped.is_empty() {
        println!("Note: excluded from scoring: {}", prepared.dropped.join(", "));
    }

    if let Some(path) = overrides {
        let rows = load_overrides(path, &ctx.config)
            .with_context(|| format!("failed to load overrides {}", path.display()))?;
        let report = prepared.apply_overrides(&rows);
        println!(
            "Info: Applied {} override values from {}.",
            format_int(report.applied),
            path.display()
        );
        if !report.unknown_assets.is_empty() {
            println!("Note: overrides for unknown assets ignored: {}", report.unknown_assets.join(", "));
        }
    }
    println!();
    Ok(prepared)
}

/// Score the named scenario, or the primary scenario when no name is given.
fn scenario_result(prepared: &Prepared, name: Option<&str>) -> anyhow::Result<ScenarioResult> {
    let Some(name) = name else {
        return prepared.primary().context("no scenario could be scored");
    };
    let scenario = prepared
        .scenario(name)
        .ok_or_else(|| anyhow!("unknown scenario '{}'", name))?;
    prepared
        .score(scenario)
        .with_context(|| format!("scenario '{}' could not be scored", scenario.name))
}

fn handle_normalize(ctx: &Session, input: &Path, out: &Path) -> anyhow::Result<()> {
    let prepared = prepare(ctx, input, None)?;
    let outcomes = reports::attribute_outcome_rows(&prepared.outcomes);
    output::preview_table("Attribute Normalization", None, &outcomes, outcomes.len());

    let (headers, rows) = reports::normalized_records(&prepared.table);
    output::write_records(out, &headers, &rows)?;
    output::preview_records(&headers, &rows, ctx.preview_rows);
    println!("(Full table exported to {})\n", out.display());
    Ok(())
}

fn handle_score(
    ctx: &Session,
    input: &Path,
    scenario: Option<&str>,
    overrides: Option<&Path>,
    out: &Path,
) -> anyhow::Result<()> {
    let prepared = prepare(ctx, input, overrides)?;
    let result = scenario_result(&prepared, scenario)?;
    let plan = pipeline::plan_inspections(&result, &ctx.config)?;
    let rows = reports::priority_rows(&result, Some(&plan.strata));
    output::write_csv(out, &rows)?;
    output::preview_table(
        "Asset Priority Matrix",
        Some(format!("scenario: {}", result.name).as_str()),
        &rows,
        ctx.preview_rows,
    );
    println!("(Full table exported to {})\n", out.display());
    Ok(())
}

fn handle_scenarios(
    ctx: &Session,
    input: &Path,
    overrides: Option<&Path>,
    out_dir: &Path,
) -> anyhow::Result<()> {
    let prepared = prepare(ctx, input, overrides)?;
    std::fs::create_dir_all(out_dir)?;
    let report = prepared.run_scenarios(ctx.config.top_k);

    for result in report.succeeded() {
        let file = out_dir.join(format!("ranking_{}.csv", result.name));
        output::write_csv(&file, &reports::priority_rows(result, None))?;
        println!("Scenario {}: ranking exported to {}", result.name, file.display());
    }
    for (name, err) in report.failed() {
        eprintln!("Scenario {} failed: {}", name, err);
    }

    let (headers, rows) = reports::comparison_records(&report.comparison);
    let file = out_dir.join("comparison.csv");
    output::write_records(&file, &headers, &rows)?;
    println!("\nScenario Comparison");
    println!("(Top {} assets of the primary scenario)\n", ctx.config.top_k);
    output::preview_records(&headers, &rows, ctx.preview_rows);
    println!("(Full table exported to {})\n", file.display());
    Ok(())
}

fn handle_sample(
    ctx: &Session,
    input: &Path,
    overrides: Option<&Path>,
    out: &Path,
) -> anyhow::Result<()> {
    let prepared = prepare(ctx, input, overrides)?;
    let result = prepared.primary().context("no scenario could be scored")?;
    let plan = pipeline::plan_inspections(&result, &ctx.config)?;
    for (i, (&size, &drawn)) in plan
        .strata
        .sizes()
        .iter()
        .zip(&plan.sample.per_stratum)
        .enumerate()
    {
        println!(
            "Stratum {}: {} assets, {} sampled",
            plan.strata.label(i),
            format_int(size),
            format_int(drawn)
        );
    }
    println!();

    let rows = reports::sample_rows(&plan.sample, &plan.strata);
    output::write_csv(out, &rows)?;
    output::preview_table(
        "Inspection Sample",
        Some(format!("seed {}", ctx.config.sampling.seed).as_str()),
        &rows,
        ctx.preview_rows,
    );
    println!("(Full table exported to {})\n", out.display());
    Ok(())
}

fn handle_reconcile(
    ctx: &Session,
    input: &Path,
    field: &Path,
    overrides: Option<&Path>,
    out: &Path,
) -> anyhow::Result<()> {
    let prepared = prepare(ctx, input, overrides)?;
    let result = prepared.primary().context("no scenario could be scored")?;
    let measurements = load_field_measurements(field, &ctx.config)
        .with_context(|| format!("failed to load field measurements {}", field.display()))?;
    let feedback = pipeline::process_feedback(&result, &measurements, &ctx.config)?;
    let rec = &feedback.reconciliation;
    println!(
        "Reconciled {} assets: {} to reassess, {} to retain.\n",
        format_int(rec.rows.len()),
        format_int(rec.count(Recommendation::Reassess)),
        format_int(rec.count(Recommendation::Retain))
    );

    let rows = reports::reconciliation_rows(rec);
    output::write_csv(out, &rows)?;
    output::preview_table(
        "Field Reconciliation",
        Some(format!("threshold {}", rec.threshold).as_str()),
        &rows,
        ctx.preview_rows,
    );
    println!("(Full table exported to {})\n", out.display());
    Ok(())
}

fn handle_impute(
    ctx: &Session,
    input: &Path,
    field: &Path,
    overrides: Option<&Path>,
    out: &Path,
) -> anyhow::Result<()> {
    let prepared = prepare(ctx, input, overrides)?;
    let result = prepared.primary().context("no scenario could be scored")?;
    let measurements = load_field_measurements(field, &ctx.config)
        .with_context(|| format!("failed to load field measurements {}", field.display()))?;
    let feedback = pipeline::process_feedback(&result, &measurements, &ctx.config)?;
    let imputation = &feedback.imputation;
    match &imputation.fit {
        Ok(d) => {
            println!(
                "Model: measurement = {} + {} x score (train {}, test {})",
                util::format_number(d.fit.intercept, 4),
                util::format_number(d.fit.slope, 4),
                d.train_size,
                d.test_size
            );
            println!(
                "Held-out MSE: {}  R²: {}",
                util::format_optional(d.mse, 4),
                util::format_optional(d.r2, 4)
            );
            println!("Imputed {} measurements.\n", format_int(d.imputed));
        }
        Err(e) => println!("Warning: {}\n", e),
    }

    let rows = reports::imputation_rows(imputation);
    output::write_csv(out, &rows)?;
    output::preview_table("Field Measurements", None, &rows, ctx.preview_rows);
    println!("(Full table exported to {})\n", out.display());
    Ok(())
}

fn handle_report(
    ctx: &Session,
    input: &Path,
    field: Option<&Path>,
    overrides: Option<&Path>,
    out_dir: &Path,
) -> anyhow::Result<()> {
    let prepared = prepare(ctx, input, overrides)?;
    let measurements = field
        .map(|p| {
            load_field_measurements(p, &ctx.config)
                .with_context(|| format!("failed to load field measurements {}", p.display()))
        })
        .transpose()?;
    let analysis = pipeline::analyze(&prepared, measurements.as_ref(), &ctx.config)?;

    println!("Generating reports...");
    std::fs::create_dir_all(out_dir)?;

    let (headers, rows) = reports::normalized_records(&prepared.table);
    output::write_records(&out_dir.join("normalized.csv"), &headers, &rows)?;

    let priorities = reports::priority_rows(&analysis.primary, Some(&analysis.stratified.strata));
    output::write_csv(&out_dir.join("priority_matrix.csv"), &priorities)?;
    output::preview_table(
        "Asset Priority Matrix",
        Some(format!("scenario: {}", analysis.primary.name).as_str()),
        &priorities,
        ctx.preview_rows,
    );

    let (headers, rows) = reports::comparison_records(&analysis.scenarios.comparison);
    output::write_records(&out_dir.join("comparison.csv"), &headers, &rows)?;

    let samples = reports::sample_rows(&analysis.stratified.sample, &analysis.stratified.strata);
    output::write_csv(&out_dir.join("inspection_sample.csv"), &samples)?;

    if let Some(feedback) = &analysis.feedback {
        output::write_csv(
            &out_dir.join("reconciliation.csv"),
            &reports::reconciliation_rows(&feedback.reconciliation),
        )?;
        output::write_csv(
            &out_dir.join("imputed_measurements.csv"),
            &reports::imputation_rows(&feedback.imputation),
        )?;
    }

    let summary = reports::generate_summary(prepared.dataset.len(), &analysis);
    output::write_json(&out_dir.join("summary.json"), &summary)?;
    output::write_text(
        &out_dir.join("report.md"),
        &reports::render_report(&prepared, &analysis, &ctx.config),
    )?;
    info!(dir = %out_dir.display(), "reports written");

    println!("Summary Stats (summary.json):");
    println!(
        "{{\"total_assets\": {}, \"mean_score\": {}, \"reassess\": {}, \"imputed\": {}}}\n",
        format_int(summary.total_assets),
        util::format_number(summary.mean_score, 4),
        format_int(summary.reassess),
        format_int(summary.imputed)
    );
    println!("Outputs saved to {}\n", out_dir.display());
    Ok(())
}

/// Print a prompt and read one trimmed line; `None` at end of input.
fn read_line(prompt: &str) -> Option<String> {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    match io::stdin().read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

/// Apply `name=value` assignments (space or comma separated) on top of `base`.
fn parse_weights(line: &str, base: &WeightConfig) -> anyhow::Result<WeightConfig> {
    let mut weights: BTreeMap<String, f64> = base.clone().into();
    for token in line.split(|c: char| c == ',' || c.is_whitespace()).filter(|t| !t.is_empty()) {
        let Some((name, value)) = token.split_once('=') else {
            bail!("expected name=value, got '{}'", token);
        };
        let value: f64 = value
            .trim()
            .parse()
            .with_context(|| format!("'{}' is not a number", value))?;
        weights.insert(name.trim().to_string(), value);
    }
    Ok(WeightConfig::new(weights)?)
}

fn handle_tune(ctx: &Session, input: &Path, overrides: Option<&Path>) -> anyhow::Result<()> {
    let prepared = prepare(ctx, input, overrides)?;
    let primary = prepared.primary().context("no scenario could be scored")?;
    let configured = prepared
        .scenario(&primary.name)
        .map(|s| s.weights.clone())
        .unwrap_or_default();
    let mut weights = configured.clone();
    println!("Enter weights as name=value pairs, 'reset' for the configured weights, 'q' to quit.\n");

    loop {
        let current: Vec<String> = weights
            .iter()
            .map(|(a, w)| format!("{}={}", a, w))
            .collect();
        println!("Current weights: {}", current.join(" "));

        let Some(line) = read_line("Weights: ") else {
            break;
        };
        match line.as_str() {
            "" => continue,
            "q" | "quit" => break,
            "reset" => {
                weights = configured.clone();
                continue;
            }
            _ => {}
        }

        let candidate = match parse_weights(&line, &weights) {
            Ok(w) => w,
            Err(e) => {
                println!("Invalid input: {:#}\n", e);
                continue;
            }
        };
        // Every request is scored from scratch; the newest input wins.
        match compute(&prepared.table, "tuned", &candidate) {
            Ok(result) => {
                let rows: Vec<PriorityRow> = reports::priority_rows(&result, None);
                output::preview_table(
                    "Top Assets",
                    Some(format!("total weight {}", util::format_number(candidate.total(), 2)).as_str()),
                    &rows,
                    ctx.config.top_k,
                );
                weights = candidate;
            }
            Err(e) => println!("Error: {}\n", e),
        }
    }
    println!("Exiting the tuner.");
    Ok(())
}

fn handle_generate(out_dir: &Path, assets: usize, seed: u64) -> anyhow::Result<()> {
    let paths = fixtures::write_fixtures(out_dir, assets, seed)?;
    println!("Synthetic demo data (not for production use):");
    println!("  assets:             {}", paths.assets.display());
    println!("  field measurements: {}", paths.field.display());
    println!("  overrides:          {}", paths.overrides.display());
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = Session {
        config: load_config(cli.config.as_deref())?,
        preview_rows: cli.preview_rows,
    };
    match &cli.command {
        Command::Normalize { input, out } => handle_normalize(&ctx, input, out),
        Command::Score {
            input,
            scenario,
            overrides,
            out,
        } => handle_score(&ctx, input, scenario.as_deref(), overrides.as_deref(), out),
        Command::Scenarios {
            input,
            overrides,
            out_dir,
        } => handle_scenarios(&ctx, input, overrides.as_deref(), out_dir),
        Command::Sample {
            input,
            overrides,
            size,
            seed,
            out,
        } => {
            let mut ctx = ctx;
            if let Some(n) = size {
                ctx.config.sampling.sample_size = *n;
            }
            if let Some(s) = seed {
                ctx.config.sampling.seed = *s;
            }
            handle_sample(&ctx, input, overrides.as_deref(), out)
        }
        Command::Reconcile {
            input,
            field,
            overrides,
            out,
        } => handle_reconcile(&ctx, input, field, overrides.as_deref(), out),
        Command::Impute {
            input,
            field,
            overrides,
            out,
        } => handle_impute(&ctx, input, field, overrides.as_deref(), out),
        Command::Report {
            input,
            field,
            overrides,
            out_dir,
        } => handle_report(&ctx, input, field.as_deref(), overrides.as_deref(), out_dir),
        Command::Tune { input, overrides } => handle_tune(&ctx, input, overrides.as_deref()),
        Command::Generate {
            out_dir,
            assets,
            seed,
        } => handle_generate(out_dir, *assets, *seed),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
