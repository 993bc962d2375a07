// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments,
// composes the configuration, and hands it to Layer 2.
//
// Three commands are supported:
//   1. `train`  — train and/or test from train.yaml
//   2. `infer`  — load a checkpoint from infer.yaml
//   3. `config` — print the composed configuration
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::Commands;

use crate::config::{Composer, ConfigTree};

#[derive(Parser, Debug)]
#[command(
    name = "breed-classifier",
    version,
    about = "Config-driven training, testing and inference for image classifiers."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Compose the configuration, then route to the use case.
    pub fn run(self) -> Result<()> {
        let cfg = self.compose()?;
        match self.command {
            Commands::Train(_) => self.run_train(cfg),
            Commands::Infer(_) => self.run_infer(cfg),
            Commands::Config(_) => {
                print!("{}", cfg.to_yaml()?);
                Ok(())
            }
        }
    }

    fn compose(&self) -> Result<ConfigTree> {
        let args = self.command.compose_args();
        let name = args
            .config_name
            .as_deref()
            .unwrap_or_else(|| self.command.default_config_name());
        Composer::new(&args.config_dir)
            .compose(name, &args.overrides)
            .with_context(|| format!("Cannot compose '{name}' from '{}'", args.config_dir))
    }

    fn run_train(&self, cfg: ConfigTree) -> Result<()> {
        use crate::application::train_use_case::TrainUseCase;

        let outcome = TrainUseCase::new(cfg).execute()?;
        if outcome.train_metrics.is_none() && outcome.test_metrics.is_none() {
            println!("Nothing to do: both `train` and `test` are false.");
        }
        Ok(())
    }

    fn run_infer(&self, cfg: ConfigTree) -> Result<()> {
        use crate::application::infer_use_case::InferUseCase;

        let outcome = InferUseCase::new(cfg).execute()?;
        println!(
            "Loaded {} (epoch {}, {} parameters).",
            outcome.checkpoint.display(),
            outcome.epoch,
            outcome.parameter_count
        );
        Ok(())
    }
}
