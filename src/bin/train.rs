//! Offline training script: fits the Iris classifier and writes the artifact
//! the service loads at startup.

use anyhow::Result;
use clap::Parser;
use iris_serving::training::{train_iris, TrainingParams};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "train", version, about = "Fit the Iris classifier and export it")]
struct Cli {
    /// Where to write the JSON model artifact
    #[arg(long, default_value = "iris_model.json")]
    output: PathBuf,
    /// Held-out share used for the accuracy report
    #[arg(long, default_value_t = 0.2)]
    test_ratio: f32,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, default_value_t = 200)]
    max_iterations: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("iris_serving=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let params = TrainingParams {
        test_ratio: cli.test_ratio,
        seed: cli.seed,
        max_iterations: cli.max_iterations,
    };

    let report = train_iris(&params)?;
    println!("Accuracy: {:.4}", report.accuracy);

    report.model.save(&cli.output)?;
    info!(path = %cli.output.display(), "Model saved");
    println!("Model saved to {}", cli.output.display());

    Ok(())
}
