use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tumor_insight::stats::{describe, describe_field};
use tumor_insight::{
    InsightEngine, Observations, PipelineConfig, PipelineReport, RawTable, SeedPolicy, Statistics,
};

#[derive(Parser)]
#[command(name = "tumor-insight")]
#[command(author = "Hummer Team")]
#[command(version = "0.1.0")]
#[command(about = "Breast cancer diagnostic data analysis and classifier comparison", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis and write its artifacts
    Run {
        /// Path to CSV file
        #[arg(short, long)]
        file: PathBuf,

        /// Directory for report.json and the SVG plots
        #[arg(short, long, default_value = "output")]
        out: PathBuf,

        /// JSON pipeline configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Neighbours used by KNN
        #[arg(short, long)]
        k: Option<usize>,

        /// Seed applied to every random stage
        #[arg(short, long)]
        seed: Option<u64>,

        /// Skip the SVG plots
        #[arg(long)]
        no_plots: bool,
    },

    /// Print summary statistics of the cleaned table
    Describe {
        /// Path to CSV file
        #[arg(short, long)]
        file: PathBuf,

        /// Field to describe (all fields when omitted)
        #[arg(short = 'a', long)]
        field: Option<String>,

        /// JSON pipeline configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "tumor_insight=info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::from_json_file(p)
            .with_context(|| format!("failed to load configuration {}", p.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            out,
            config,
            k,
            seed,
            no_plots,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(k) = k {
                config.knn.k = k;
            }
            if let Some(seed) = seed {
                config.seeds = SeedPolicy::uniform(seed);
            }

            let engine = InsightEngine::new(config).context("invalid configuration")?;
            let report = engine
                .analyze_file(&file)
                .with_context(|| format!("analysis of {} failed", file.display()))?;
            print_report(&report);

            let written = engine
                .write_artifacts(&report, &out, !no_plots)
                .with_context(|| format!("failed to write artifacts to {}", out.display()))?;
            println!("\nWrote {} files to {}", written.len(), out.display());
        }

        Commands::Describe {
            file,
            field,
            config,
        } => {
            let config = load_config(config.as_ref())?;
            let raw = RawTable::from_path(&file)
                .with_context(|| format!("failed to load {}", file.display()))?;
            let observations = Observations::from_raw(&raw, &config.schema)
                .with_context(|| format!("failed to clean {}", file.display()))?;

            let (benign, malignant) = observations.class_balance();
            println!(
                "Loaded '{}' with {} records and {} features (benign {}, malignant {})",
                observations.name,
                observations.len(),
                observations.n_features(),
                benign,
                malignant
            );

            match field {
                Some(field) => match describe_field(&observations, &field) {
                    Some(stats) => print_stats(&stats),
                    None => println!("Could not compute statistics for field '{}'", field),
                },
                None => describe(&observations).iter().for_each(print_stats),
            }
        }
    }

    Ok(())
}

fn print_stats(stats: &Statistics) {
    println!("\n=== Statistics for '{}' ===", stats.field);
    println!("Count:  {}", stats.count);
    println!("Sum:    {:.4}", stats.sum);
    println!("Mean:   {:.4}", stats.mean);
    println!("StdDev: {:.4}", stats.std_dev);
    println!("Min:    {:.4}", stats.min);
    println!("Median: {:.4}", stats.median);
    println!("Max:    {:.4}", stats.max);
}

fn print_report(report: &PipelineReport) {
    println!(
        "Dataset '{}': {} rows, {} features, benign {}, malignant {}",
        report.dataset,
        report.rows,
        report.feature_names.len(),
        report.class_balance.benign,
        report.class_balance.malignant
    );
    if !report.dropped_columns.is_empty() {
        println!("Dropped columns: {:?}", report.dropped_columns);
    }

    println!("\nStrongest correlations:");
    for pair in &report.strongest_pairs {
        println!("  {:<28} {:<28} {:>7.3}", pair.first, pair.second, pair.r);
    }

    println!("\nTrain rows: {}, test rows: {}", report.train_size, report.test_size);
    for eval in &report.evaluations {
        println!("\n=== {} ===", eval.model);
        println!("Accuracy: {:.4}", eval.accuracy);
        print!("{}", eval.cross_tab());
        println!(
            "Sensitivity {:.4}  Specificity {:.4}  Precision {:.4}  F1 {:.4}",
            eval.sensitivity, eval.specificity, eval.precision, eval.f1
        );
        if let Some(roc) = &eval.roc {
            println!("AUC: {:.4}", roc.auc);
        }
    }
}
