//! `gradpilot` command line: train, evaluate and generate reference corpora.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};

use gradpilot::gradpilot_train::{ConsoleSink, FanoutSink, JsonlSink};
use gradpilot::{Checkpoint, RunConfig, TrajectoryCorpus, VehicleKind};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum VehicleArg {
    Cartpole,
    Quadrotor,
    FixedWing,
}

impl From<VehicleArg> for VehicleKind {
    fn from(arg: VehicleArg) -> Self {
        match arg {
            VehicleArg::Cartpole => VehicleKind::CartPole,
            VehicleArg::Quadrotor => VehicleKind::Quadrotor,
            VehicleArg::FixedWing => VehicleKind::FixedWing,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "gradpilot",
    about = "Train vehicle controllers by differentiating through their dynamics",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Train a controller with the curriculum.
    Train(TrainArgs),
    /// Evaluate a checkpoint on a corpus's test split.
    Eval(EvalArgs),
    /// Generate a seeded train/test reference corpus.
    Generate(GenerateArgs),
}

#[derive(Debug, Args)]
struct TrainArgs {
    #[arg(value_enum)]
    vehicle: VehicleArg,

    /// Run configuration (JSON). Defaults to the vehicle's preset.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Reference corpus (JSON).
    #[arg(long)]
    corpus: PathBuf,

    /// Output directory for checkpoint.json, best.json and events.jsonl.
    #[arg(long)]
    out: PathBuf,

    /// Override the iteration budget.
    #[arg(long)]
    iterations: Option<usize>,

    /// Override the training seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Differentiate through a residual model fitted on transitions of the
    /// evaluation vehicle instead of the nominal vehicle.
    #[arg(long)]
    learnt_model: bool,
}

#[derive(Debug, Args)]
struct EvalArgs {
    #[arg(value_enum)]
    vehicle: VehicleArg,

    #[arg(long)]
    checkpoint: PathBuf,

    #[arg(long)]
    corpus: PathBuf,

    /// Metrics report path.
    #[arg(long)]
    out: PathBuf,

    /// Write one trace file per episode into this directory.
    #[arg(long)]
    traces: Option<PathBuf>,

    /// Run configuration (JSON); supplies the evaluation settings and vehicle.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[arg(value_enum)]
    vehicle: VehicleArg,

    #[arg(long)]
    out: PathBuf,

    #[arg(long, default_value_t = 64)]
    train: usize,

    #[arg(long, default_value_t = 16)]
    test: usize,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Steps per trajectory.
    #[arg(long, default_value_t = 400)]
    steps: usize,

    /// Time step (s).
    #[arg(long, default_value_t = 0.02)]
    dt: f64,

    /// Run configuration (JSON) supplying the vehicle parameters.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(kind: VehicleKind, path: Option<&Path>) -> gradpilot::Result<RunConfig> {
    match path {
        Some(path) => RunConfig::load(path),
        None => Ok(RunConfig::preset(kind)),
    }
}

fn train(args: TrainArgs) -> gradpilot::Result<()> {
    let kind = VehicleKind::from(args.vehicle);
    let mut config = load_config(kind, args.config.as_deref())?;
    if let Some(iterations) = args.iterations {
        config.trainer.iterations = iterations;
    }
    if let Some(seed) = args.seed {
        config.trainer.seed = seed;
    }
    let corpus = TrajectoryCorpus::load(&args.corpus)?;

    let mut sink = FanoutSink::new()
        .with(ConsoleSink {
            print_every: config.trainer.print_every,
        })
        .with(JsonlSink::create(args.out.join("events.jsonl"))?);
    let output = if args.learnt_model {
        gradpilot::train_on_learnt_model(kind, &config, &corpus, &mut sink)?
    } else {
        gradpilot::train(kind, &config, &corpus, &mut sink)?
    };
    if let Some(fit) = &output.residual_fit {
        println!(
            "learnt model: {} transitions, one-step MSE {:.3e} -> {:.3e}",
            fit.observations, fit.nominal_error, fit.fitted_error
        );
    }

    output.checkpoint.save(args.out.join("checkpoint.json"))?;
    let best = output.best.as_ref().unwrap_or(&output.checkpoint);
    best.save(args.out.join("best.json"))?;

    let summary = &output.summary;
    println!(
        "done: {} iterations, level {}/{}, completed={}, diverged iterations={}, final loss {:.6}",
        summary.iterations,
        summary.final_level + 1,
        summary.num_levels,
        summary.completed,
        summary.diverged_iterations,
        summary.final_loss().unwrap_or(f64::NAN)
    );
    if let Some(best) = &summary.best_eval {
        println!(
            "best eval: {}/{} failed, position RMSE {:.4}",
            best.n_failed, best.n_episodes, best.mean_position_rmse
        );
    }
    Ok(())
}

fn eval(args: EvalArgs) -> gradpilot::Result<()> {
    let kind = VehicleKind::from(args.vehicle);
    let config = load_config(kind, args.config.as_deref())?;
    let checkpoint = Checkpoint::load(&args.checkpoint)?;
    let corpus = TrajectoryCorpus::load(&args.corpus)?;

    let (report, traces) = gradpilot::evaluate(
        kind,
        &config,
        &checkpoint,
        &corpus.test,
        args.traces.is_some(),
    )?;
    report.save(&args.out)?;
    if let Some(dir) = &args.traces {
        for trace in &traces {
            trace.save_in(dir)?;
        }
    }

    println!(
        "{}: {} episodes, {} failed ({} non-finite), \
         position RMSE {:.4} ± {:.4}, steps survived {:.1}",
        report.vehicle,
        report.n_episodes,
        report.n_failed,
        report.n_diverged,
        report.mean_position_rmse,
        report.std_position_rmse,
        report.mean_steps_survived
    );
    Ok(())
}

fn generate(args: GenerateArgs) -> gradpilot::Result<()> {
    let kind = VehicleKind::from(args.vehicle);
    let config = load_config(kind, args.config.as_deref())?;
    let corpus = gradpilot::generate_corpus(
        kind,
        &config.vehicle,
        args.seed,
        args.train,
        args.test,
        args.steps,
        args.dt,
    )?;
    corpus.save(&args.out)?;
    println!(
        "{}: {} train / {} test trajectories -> {}",
        corpus.name,
        corpus.train.len(),
        corpus.test.len(),
        args.out.display()
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Train(args) => train(args),
        Command::Eval(args) => eval(args),
        Command::Generate(args) => generate(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
