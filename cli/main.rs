#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::process;

use bioage::data::{load_dataset, write_results};
use bioage::dataset::Dataset;
use bioage::kdm::{
    DegenerateSd, KDM_ACCELERATION_COLUMN, KdmFit, KdmOptions, estimate_kdm_with,
};
use bioage::model::FitArtifact;
use bioage::panel::BiomarkerPanel;
use bioage::phenoage::{
    MAX_PHENOAGE, PHENOAGE_ACCELERATION_COLUMN, PHENOAGE_COLUMN, PhenoAgeFit, canonical_panel,
    estimate_phenoage,
};

#[derive(Args)]
pub struct KdmArgs {
    /// Path to subject table (TSV, or CSV with a .csv extension) with age and biomarker columns
    pub data: String,

    /// Comma-separated biomarker columns to combine
    #[arg(long, value_delimiter = ',', required = true)]
    pub biomarkers: Vec<String>,

    /// Saved KDM parameters (.toml). Without it, illustrative defaults are derived from the data
    #[arg(long)]
    pub fit: Option<String>,

    /// Where to write the parameters that were used
    #[arg(long, default_value = "kdm_fit.toml")]
    pub fit_out: String,

    /// Where to write the augmented table
    #[arg(long, default_value = "kdm_predictions.tsv")]
    pub output: String,

    /// Give biomarkers with zero residual SD no weight instead of failing
    #[arg(long)]
    pub skip_degenerate_sd: bool,
}

#[derive(Args)]
pub struct PhenoAgeArgs {
    /// Path to subject table (TSV, or CSV with a .csv extension) with age and biomarker columns
    pub data: String,

    /// Comma-separated biomarker columns (defaults to the nine Levine biomarkers)
    #[arg(long, value_delimiter = ',')]
    pub biomarkers: Vec<String>,

    /// Saved PhenoAge parameters (.toml). Without it, the Levine coefficients are used
    #[arg(long)]
    pub fit: Option<String>,

    /// Where to write the parameters that were used
    #[arg(long, default_value = "phenoage_fit.toml")]
    pub fit_out: String,

    /// Where to write the augmented table
    #[arg(long, default_value = "phenoage_predictions.tsv")]
    pub output: String,
}

#[derive(Parser)]
#[command(
    name = "bioage",
    about = "Biological age estimation from clinical biomarker panels",
    long_about = "Estimates Klemera-Doubal biological age (KDM-BA) and Levine phenotypic age \
                 (PhenoAge) from a table of subjects, their chronological age and biomarkers."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate Klemera-Doubal biological age
    #[command(about = "Estimate KDM-BA (outputs: kdm_predictions.tsv, kdm_fit.toml)")]
    Kdm(KdmArgs),

    /// Estimate Levine phenotypic age
    #[command(about = "Estimate PhenoAge (outputs: phenoage_predictions.tsv, phenoage_fit.toml)")]
    Phenoage(PhenoAgeArgs),

    /// Display version information
    #[command(about = "Display version information")]
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();
    let result = match command {
        Some(Commands::Kdm(args)) => run_kdm(args),
        Some(Commands::Phenoage(args)) => run_phenoage(args),
        Some(Commands::Version) => {
            println!("bioage {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_kdm(args: KdmArgs) -> Result<(), Box<dyn std::error::Error>> {
    let panel = BiomarkerPanel::new(args.biomarkers)?;
    println!("Loading subject data from: {}", args.data);
    let dataset = load_dataset(&args.data, panel.names())?;
    println!(
        "Loaded {} subjects; KDM panel: {}",
        dataset.n_subjects(),
        panel.names().join(", ")
    );

    let supplied = match &args.fit {
        Some(path) => {
            println!("Using KDM parameters from: {path}");
            Some(KdmFit::load(path)?)
        }
        None => {
            println!("No --fit given; deriving illustrative defaults from this cohort.");
            None
        }
    };

    let options = KdmOptions {
        degenerate_sd: if args.skip_degenerate_sd {
            DegenerateSd::Skip
        } else {
            DegenerateSd::Reject
        },
    };
    let result = estimate_kdm_with(&dataset, &panel, supplied.as_ref(), options)?;
    print_summary("KDM-BA acceleration", &result.dataset, KDM_ACCELERATION_COLUMN);

    write_results(&args.output, &result.dataset)?;
    println!("Predictions saved to: {}", args.output);
    result.fit.save(&args.fit_out)?;
    println!("Fit parameters saved to: {}", args.fit_out);
    Ok(())
}

fn run_phenoage(args: PhenoAgeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let panel = if args.biomarkers.is_empty() {
        canonical_panel()
    } else {
        BiomarkerPanel::new(args.biomarkers)?
    };
    println!("Loading subject data from: {}", args.data);
    let dataset = load_dataset(&args.data, panel.names())?;
    println!(
        "Loaded {} subjects; PhenoAge panel: {}",
        dataset.n_subjects(),
        panel.names().join(", ")
    );

    let supplied = match &args.fit {
        Some(path) => {
            println!("Using PhenoAge parameters from: {path}");
            Some(PhenoAgeFit::load(path)?)
        }
        None => None,
    };

    let result = estimate_phenoage(&dataset, &panel, supplied.as_ref())?;
    if let Some(estimates) = result.dataset.column(PHENOAGE_COLUMN) {
        let capped = estimates.iter().filter(|&&a| a == MAX_PHENOAGE).count();
        if capped > 0 {
            println!("{capped} subject(s) were capped at {MAX_PHENOAGE} years.");
        }
    }
    print_summary("PhenoAge acceleration", &result.dataset, PHENOAGE_ACCELERATION_COLUMN);

    write_results(&args.output, &result.dataset)?;
    println!("Predictions saved to: {}", args.output);
    result.fit.save(&args.fit_out)?;
    println!("Fit parameters saved to: {}", args.fit_out);
    Ok(())
}

fn print_summary(label: &str, dataset: &Dataset, column: &str) {
    let Some(values) = dataset.column(column) else {
        return;
    };
    let min_val = values.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max_val = values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let mean = values.mean().unwrap_or(f64::NAN);
    println!("{label}: mean {mean:.3}, range ({min_val:.3}, {max_val:.3})");
}
