// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Every subcommand takes the same composition arguments:
//
//   --config-dir DIR     directory holding <name>.yaml and groups
//   --config-name NAME   primary config file, without .yaml
//   OVERRIDES...         key=value, +key=value, ~key, group=option
//
// When --config-name is omitted, `train` and `config` use
// train.yaml and `infer` uses infer.yaml.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train and/or test a classifier
    Train(ComposeArgs),

    /// Load a checkpoint for inference
    Infer(ComposeArgs),

    /// Print a composed configuration and exit
    Config(ComposeArgs),
}

impl Commands {
    pub fn default_config_name(&self) -> &'static str {
        match self {
            Commands::Infer(_) => "infer",
            Commands::Train(_) | Commands::Config(_) => "train",
        }
    }

    pub fn compose_args(&self) -> &ComposeArgs {
        match self {
            Commands::Train(args) | Commands::Infer(args) | Commands::Config(args) => args,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ComposeArgs {
    /// Directory containing the YAML configuration files
    #[arg(long, default_value = "configs")]
    pub config_dir: String,

    /// Primary config file name (without .yaml)
    #[arg(long)]
    pub config_name: Option<String>,

    /// Overrides, e.g. trainer.max_epochs=5 data=dogbreed ~logger.csv
    #[arg(allow_hyphen_values = true)]
    pub overrides: Vec<String>,
}
