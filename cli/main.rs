#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use refnorm::pipeline::run_study;
use refnorm::progress::{BootstrapProgress, NoopProgress, TerminalProgress};
use refnorm::pvalue::Alternative;
use refnorm::study::config::StudyConfig;
use refnorm::study::data::{Separator, load_observations};

#[derive(Clone, Copy, ValueEnum)]
pub enum SeparatorCli {
    Comma,
    Tab,
}

impl From<SeparatorCli> for Separator {
    fn from(value: SeparatorCli) -> Self {
        match value {
            SeparatorCli::Comma => Separator::Comma,
            SeparatorCli::Tab => Separator::Tab,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum AlternativeCli {
    Greater,
    TwoSided,
}

impl From<AlternativeCli> for Alternative {
    fn from(value: AlternativeCli) -> Self {
        match value {
            AlternativeCli::Greater => Alternative::Greater,
            AlternativeCli::TwoSided => Alternative::TwoSided,
        }
    }
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to the subject-level table (delimited text with a header row)
    pub data: PathBuf,

    /// Path to the study configuration (.toml)
    #[arg(long)]
    pub config: PathBuf,

    /// Where to write the results; a .json extension selects JSON, anything else TOML
    #[arg(long, default_value = "comparison.toml")]
    pub output: PathBuf,

    /// Also write a flat tab-separated summary with one row per fitted model
    #[arg(long, value_name = "PATH")]
    pub summary: Option<PathBuf>,

    /// Field separator of the input table
    #[arg(long, value_enum, default_value_t = SeparatorCli::Comma)]
    pub separator: SeparatorCli,

    /// Override the number of bootstrap iterations from the configuration
    #[arg(long, value_name = "N")]
    pub n_iter: Option<usize>,

    /// Restrict each outcome to subjects with every panel value present
    #[arg(long)]
    pub subset: bool,

    /// Override the random seed from the configuration
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override the alternative hypothesis from the configuration
    #[arg(long, value_enum)]
    pub alternative: Option<AlternativeCli>,

    /// Hide the bootstrap progress bar
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct TemplateArgs {
    /// Write the template here instead of printing it
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser)]
#[command(
    name = "refnorm",
    version,
    about = "Compare raw and reference-protein-normalized biomarkers as predictors of PET outcomes",
    long_about = "Fits univariate regressions of tau- and amyloid-PET outcomes on CSF and plasma \
                 biomarkers, with and without normalization by a reference protein, and tests the \
                 R² improvement with a paired bootstrap and Benjamini-Hochberg correction."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full comparison
    #[command(about = "Run the biomarker comparison (outputs: comparison.toml)")]
    Run(RunArgs),

    /// Print an example study configuration
    #[command(about = "Print an example study configuration in TOML")]
    Template(TemplateArgs),
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let start_time = Instant::now();

    let mut config = StudyConfig::load(&args.config)?;
    if let Some(n_iter) = args.n_iter {
        config.n_iter = n_iter;
    }
    if args.subset {
        config.subset = true;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(alternative) = args.alternative {
        config.alternative = alternative.into();
    }
    log::info!(
        "Configuration: n_iter={}, subset={}, seed={}, alternative={}",
        config.n_iter,
        config.subset,
        config.seed,
        config.alternative
    );

    let table = load_observations(
        &args.data,
        args.separator.into(),
        &config.required_columns(),
    )?;

    let terminal = TerminalProgress::new();
    let progress: &dyn BootstrapProgress = if args.quiet {
        &NoopProgress
    } else {
        &terminal
    };
    let report = run_study(&table, &config, progress)?;

    report.save(&args.output)?;
    log::info!("Results saved to: {}", args.output.display());
    if let Some(summary) = &args.summary {
        report.write_summary(summary)?;
        log::info!("Summary table saved to: {}", summary.display());
    }

    log::info!(
        "Finished in {:.1}s",
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

pub fn template(args: TemplateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let text = StudyConfig::template().to_toml()?;
    match args.output {
        Some(path) => {
            fs::write(&path, text)?;
            log::info!("Template written to: {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();
    let result = match command {
        Some(Commands::Run(args)) => run(args),
        Some(Commands::Template(args)) => template(args),
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
