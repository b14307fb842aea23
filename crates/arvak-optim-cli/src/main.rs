//! Arvak optimization CLI.
//!
//! Runs one of the drivers against a built-in landscape and writes the
//! iteration history plus a run manifest.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use arvak_optim::{
    BoxedQuasiNewtonOptimizer, ColumnLayout, CosineLandscape, Driver, GradientDescentOptimizer,
    IterationLogger, IterationRecord, IterationSink, LinearSum, Objective, OptimResult,
    ParameterSet, Quadratic, RunConfig, RunManifest, RunSummary, WorkerPool,
};

#[derive(Parser)]
#[command(name = "arvak-optim")]
#[command(author, version, about = "Variational parameter optimization", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fixed-step gradient descent with parallel finite-difference gradients
    Descent(RunArgs),
    /// Box-constrained L-BFGS
    Lbfgsb(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// YAML run configuration; defaults apply if omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// CSV iteration history, appended to if it exists
    #[arg(short, long)]
    output: PathBuf,

    /// Energy landscape to minimize
    #[arg(short, long, value_enum, default_value_t = Landscape::Cosine)]
    landscape: Landscape,

    /// Worker threads, overrides the configuration
    #[arg(short, long, env = "ARVAK_OPTIM_WORKERS")]
    workers: Option<usize>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Landscape {
    /// Sum of all coordinates
    Linear,
    /// Bowl centred at 0.25 in every coordinate
    Quadratic,
    /// Σ -cos(γ)·cos(β)
    Cosine,
}

impl Landscape {
    fn objective(self, initial: &ParameterSet) -> Box<dyn Objective> {
        match self {
            Landscape::Linear => Box::new(LinearSum),
            Landscape::Quadratic => Box::new(Quadratic::centered(initial, 0.25, 0.0)),
            Landscape::Cosine => Box::new(CosineLandscape),
        }
    }
}

/// Forwards records to the history file and ticks the progress display.
struct ProgressSink<S> {
    inner: S,
    progress: ProgressBar,
}

impl<S: IterationSink> IterationSink for ProgressSink<S> {
    fn record(&mut self, record: &IterationRecord) -> OptimResult<()> {
        self.inner.record(record)?;
        self.progress.inc(1);
        self.progress
            .set_message(format!("E = {:.6}", record.energy.re));
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Descent(args) => run(Driver::GradientDescent, args),
        Command::Lbfgsb(args) => run(Driver::BoxedQuasiNewton, args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &RunArgs) -> Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RunConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.validate()?;
    Ok(config)
}

fn progress_bar(budget: Option<usize>, label: &str) -> Result<ProgressBar> {
    let pb = match budget {
        Some(n) => {
            let pb = ProgressBar::new(n as u64);
            pb.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )?
                .progress_chars("#>-"),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {pos} iterations {msg}",
            )?);
            pb
        }
    };
    pb.set_message(label.to_string());
    Ok(pb)
}

fn run(driver: Driver, args: RunArgs) -> Result<()> {
    let config = load_config(&args)?;
    let initial = config.initial_params();
    let objective = args.landscape.objective(&initial);
    let layout = ColumnLayout::from_params(&initial)?;

    print_header(match driver {
        Driver::GradientDescent => "Gradient Descent",
        Driver::BoxedQuasiNewton => "Boxed L-BFGS",
    });
    print_result("Vectors", initial.names().join(", "));
    print_result("Depth", initial.depth()?);
    print_result("History", args.output.display());

    let logger = IterationLogger::open(&args.output, layout)
        .with_context(|| format!("opening {}", args.output.display()))?;
    let manifest = RunManifest::new(driver, &initial, &config)?;
    let start = Instant::now();

    let summary = match driver {
        Driver::GradientDescent => {
            print_result("Workers", config.workers);
            print_result("Learning rate", config.descent.learning_rate);
            let pool = WorkerPool::new(config.workers)?;
            let optimizer = GradientDescentOptimizer::new(config.descent.clone())?;
            let progress = progress_bar(config.descent.budget.limit(), "descending")?;
            let mut sink = ProgressSink {
                inner: logger,
                progress: progress.clone(),
            };

            let outcome = optimizer.minimize(objective.as_ref(), initial, &pool, &mut sink)?;
            progress.finish_and_clear();
            RunSummary {
                energy: outcome.energy,
                iterations: outcome.iterations as u64,
                converged: outcome.converged(),
                params: outcome.params,
            }
        }
        Driver::BoxedQuasiNewton => {
            let optimizer = BoxedQuasiNewtonOptimizer::new(config.quasi_newton.clone())?;
            let progress = progress_bar(None, "searching")?;
            let sink = Arc::new(Mutex::new(ProgressSink {
                inner: logger,
                progress: progress.clone(),
            }));

            let outcome = optimizer.minimize(objective.as_ref(), &initial, sink)?;
            progress.finish_and_clear();
            print_info(&outcome.message);
            RunSummary {
                energy: outcome.energy,
                iterations: outcome.iterations,
                converged: outcome.converged,
                params: outcome.params,
            }
        }
    };

    print_section("Result");
    print_result("Energy", summary.energy);
    print_result("Iterations", summary.iterations);
    print_result("Elapsed", format!("{:.2?}", start.elapsed()));
    for (name, values) in summary.params.iter() {
        print_result(name, format!("{values:.6?}"));
    }

    let converged = summary.converged;
    let manifest_path = RunManifest::path_for(&args.output);
    manifest.finish(summary).write(&manifest_path)?;
    print_result("Manifest", manifest_path.display());

    if converged {
        print_success("Converged");
    } else {
        print_info("Stopped without meeting the convergence criterion");
    }
    Ok(())
}

const RULE_WIDTH: usize = 60;

fn print_header(title: &str) {
    let rule = style("═".repeat(RULE_WIDTH)).cyan();
    println!("\n{rule}\n{}\n{rule}\n", style(format!("  {title}")).cyan().bold());
}

fn print_section(title: &str) {
    println!("\n{}", style(format!("▶ {title}")).green().bold());
    println!("{}", style("─".repeat(RULE_WIDTH / 2)).dim());
}

fn print_result(label: &str, value: impl std::fmt::Display) {
    println!("  {:<14} {value}", style(format!("{label}:")).dim());
}

fn print_success(message: &str) {
    println!("{} {message}", style("✓").green().bold());
}

fn print_info(message: &str) {
    println!("{} {message}", style("ℹ").blue());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(argv: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Command::Descent(args) | Command::Lbfgsb(args) => args,
        }
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["arvak-optim", "-v", "lbfgsb", "-o", "h.csv"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Lbfgsb(_)));

        let args = run_args(&["arvak-optim", "descent", "--output", "h.csv", "--landscape", "quadratic"]);
        assert_eq!(args.output, PathBuf::from("h.csv"));
        assert!(matches!(args.landscape, Landscape::Quadratic));
        assert!(args.config.is_none());

        assert!(Cli::try_parse_from(["arvak-optim", "descent"]).is_err());
    }

    #[test]
    fn test_workers_flag_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        std::fs::write(&path, "workers: 3\ndepth: 2\n").unwrap();
        let config_arg = path.to_str().unwrap();

        let from_file = load_config(&run_args(&[
            "arvak-optim", "descent", "-o", "h.csv", "-c", config_arg,
        ]))
        .unwrap();
        assert_eq!(from_file.workers, 3);

        let overridden = load_config(&run_args(&[
            "arvak-optim", "descent", "-o", "h.csv", "-c", config_arg, "-w", "6",
        ]))
        .unwrap();
        assert_eq!(overridden.workers, 6);
        assert_eq!(overridden.depth, 2);

        assert!(
            load_config(&run_args(&["arvak-optim", "descent", "-o", "h.csv", "-w", "0"])).is_err()
        );
    }

    #[test]
    fn test_missing_config_names_the_file() {
        let args = run_args(&["arvak-optim", "lbfgsb", "-o", "h.csv", "-c", "nowhere.yaml"]);
        let err = load_config(&args).unwrap_err();
        assert!(format!("{err:#}").contains("nowhere.yaml"));
    }

    #[test]
    fn test_landscape_objectives() {
        let initial = ParameterSet::qaoa(vec![0.25], vec![0.25]);
        let bowl = Landscape::Quadratic.objective(&initial);
        assert_eq!(bowl.evaluate(&initial).unwrap().re, 0.0);
        let sum = Landscape::Linear.objective(&initial);
        assert_eq!(sum.evaluate(&initial).unwrap().re, 0.5);
    }
}
