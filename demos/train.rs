//! Trains a regression circuit on synthetic binary data.
//!
//! Run with:
//! ```bash
//! cargo run --release --example train -- --vars 8 --rounds 20 --output model.psdd
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use regression_circuit::dataset::DataSet;
use regression_circuit::solver::{SolverConfig, SolverKind};
use regression_circuit::split::SplitConfig;
use regression_circuit::train::{learn_regression_circuit, TrainConfig};
use regression_circuit::vtree::Vtree;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Shape {
    Balanced,
    RightLinear,
    LeftLinear,
}

#[derive(Debug, Parser)]
#[command(author, version, about = "Train a regression circuit on synthetic data")]
struct Cli {
    /// Number of variables
    #[arg(long, default_value = "8")]
    vars: u32,

    /// Number of training samples
    #[arg(long, default_value = "2000")]
    samples: usize,

    /// Fraction of input values hidden as missing
    #[arg(long, default_value = "0.0")]
    missing: f64,

    /// Vtree shape, ignored when --vtree is given
    #[arg(long, value_enum, default_value = "balanced")]
    shape: Shape,

    /// Read the vtree from a file
    #[arg(long)]
    vtree: Option<PathBuf>,

    /// Structure learning rounds
    #[arg(long, default_value = "20")]
    rounds: usize,

    /// Splits per round
    #[arg(long, default_value = "10")]
    splits: usize,

    /// Regression solver: ordinary, bayesian-ridge or bayesian-ard
    #[arg(long, default_value = "ordinary")]
    solver: SolverKind,

    #[arg(long, default_value = "1337")]
    seed: u64,

    /// Where to write the learned circuit
    #[arg(long, default_value = "circuit.psdd")]
    output: PathBuf,

    /// Also write a Graphviz rendering of the learned circuit
    #[arg(long)]
    dot: Option<PathBuf>,
}

/// Target: a sum of pairwise interactions between neighbouring variables.
fn synthetic(num_vars: usize, samples: usize, missing: f64, rng: &mut ChaCha8Rng) -> DataSet {
    let clean = Array2::from_shape_fn((samples, num_vars), |_| if rng.random::<bool>() { 1.0 } else { 0.0 });
    let labels: Array1<f64> = clean
        .rows()
        .into_iter()
        .map(|x| {
            let pairs: f64 = x.windows(2).into_iter().map(|w| w[0] * w[1]).sum();
            pairs + 0.5 * x[0] - 0.25 * rng.random::<f64>()
        })
        .collect();
    let images = clean.mapv(|v| if rng.random::<f64>() < missing { -1.0 } else { v });
    DataSet::new(images, labels)
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let cli = Cli::parse();
    println!("cli = {:?}", cli);

    let time_total = Instant::now();

    let vtree = match &cli.vtree {
        Some(path) => Vtree::load(path)?,
        None => match cli.shape {
            Shape::Balanced => Vtree::balanced(cli.vars),
            Shape::RightLinear => Vtree::right_linear(cli.vars),
            Shape::LeftLinear => Vtree::left_linear(cli.vars),
        },
    };
    let vtree = Arc::new(vtree);
    let num_vars = vtree.num_vars() as usize;

    let mut rng = ChaCha8Rng::seed_from_u64(cli.seed);
    let train = synthetic(num_vars, cli.samples, cli.missing, &mut rng);
    let valid = synthetic(num_vars, cli.samples / 4, cli.missing, &mut rng);

    let config = TrainConfig {
        solver: SolverConfig {
            kind: cli.solver,
            ..SolverConfig::default()
        },
        split: SplitConfig {
            num_splits: cli.splits,
            ..SplitConfig::default()
        },
        max_iter_sl: cli.rounds,
        validate_every: 2,
        seed: cli.seed,
        ..TrainConfig::default()
    };

    let result = learn_regression_circuit(vtree, train, Some(valid), config)?;
    println!("error history:");
    for (i, error) in result.error_history.iter().enumerate() {
        println!("  {:>4}: {:.5}", i, error);
    }
    println!(
        "circuit: {} decision nodes, {} elements, {} parameters",
        result.circuit.decision_nodes().len(),
        result.circuit.num_elements(),
        result.circuit.num_parameters()
    );

    result.circuit.save_file(&cli.output)?;
    println!("circuit written to {}", cli.output.display());

    if let Some(path) = &cli.dot {
        std::fs::write(path, result.circuit.to_dot())?;
        println!("dot written to {}", path.display());
    }

    println!("Total time: {:?}", time_total.elapsed());
    Ok(())
}
