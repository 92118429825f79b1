//! `mindg`: trains the drug-target interaction models and scores new pairs.
//!
//! Examples:
//! `mindg init-config --output mindg.toml`
//! `mindg train --config mindg.toml --result ./result --order 3 --cuda`
//! `mindg predict --result ./result --input pairs.csv --output scores.csv`

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use log::info;

use mindg::{
    config::{HdnConfig, HoagcnConfig, RunConfig},
    data::DatasetKind,
    encoding::{DrugEncoding, TargetEncoding},
    pipeline::{self, Models},
};

#[derive(Parser)]
#[command(name = "mindg", version)]
#[command(about = "Drug-target interaction prediction with a higher-order GCN and a deep sequence classifier", long_about = None)]
struct Cli {
    /// Verbosity level; RUST_LOG overrides it.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train both models and the ensemble.
    Train(TrainArgs),
    /// Train the HOAGCN link predictor only.
    TrainHoagcn(TrainArgs),
    /// Train the HDN classifier only.
    TrainHdn(TrainArgs),
    /// Score pairs with a trained result folder.
    Predict {
        #[arg(long, default_value = "./result")]
        result: PathBuf,
        /// CSV with `smiles` and `sequence` columns, and optionally `label`.
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "scores.csv")]
        output: PathBuf,
        #[arg(long, default_value_t = 256)]
        batch_size: usize,
    },
    /// Write the default run configuration.
    InitConfig {
        #[arg(long, default_value = "mindg.toml")]
        output: PathBuf,
    },
}

#[derive(Args)]
struct TrainArgs {
    /// TOML run configuration. Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "./result")]
    result: PathBuf,

    /// davis, kiba or csv
    #[arg(long)]
    dataset: Option<DatasetKind>,

    /// Data root folder, or the pair file for `csv`.
    #[arg(long)]
    data_path: Option<String>,

    #[command(flatten)]
    hoagcn: HoagcnArgs,

    #[command(flatten)]
    hdn: HdnArgs,
}

#[derive(Args)]
struct HoagcnArgs {
    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Number of training epochs
    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long = "batch_size", alias = "batch-size")]
    batch_size: Option<usize>,

    /// Early stopping patience, in epochs
    #[arg(long)]
    early_stopping: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    #[arg(long)]
    dropout: Option<f64>,

    /// Highest adjacency power
    #[arg(long)]
    order: Option<usize>,

    /// Run on the GPU (needs the `gpu` feature).
    #[arg(long)]
    cuda: bool,
}

impl HoagcnArgs {
    fn apply(&self, cfg: &mut HoagcnConfig) {
        if let Some(v) = self.seed {
            cfg.seed = v;
        }
        if let Some(v) = self.epochs {
            cfg.epochs = v;
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.early_stopping {
            cfg.early_stopping = v;
        }
        if let Some(v) = self.learning_rate {
            cfg.learning_rate = v;
        }
        if let Some(v) = self.dropout {
            cfg.dropout = v;
        }
        if let Some(v) = self.order {
            cfg.order = v;
        }
        if self.cuda {
            cfg.cuda = true;
        }
    }
}

#[derive(Args)]
struct HdnArgs {
    /// e.g. `1024,1024,512`
    #[arg(long, value_delimiter = ',')]
    cls_hidden_dims: Option<Vec<usize>>,

    #[arg(long)]
    train_epoch: Option<usize>,

    /// HDN learning rate
    #[arg(long = "LR")]
    lr: Option<f64>,

    #[arg(long)]
    hdn_batch_size: Option<usize>,

    #[arg(long, value_delimiter = ',')]
    cnn_target_filters: Option<Vec<usize>>,

    #[arg(long, value_delimiter = ',')]
    cnn_target_kernels: Option<Vec<usize>>,

    /// CNN, Transformer or MPNN
    #[arg(long)]
    drug_encoding: Option<DrugEncoding>,

    /// CNN or AAC
    #[arg(long)]
    target_encoding: Option<TargetEncoding>,
}

impl HdnArgs {
    fn apply(&self, cfg: &mut HdnConfig) {
        if let Some(v) = &self.cls_hidden_dims {
            cfg.cls_hidden_dims = v.clone();
        }
        if let Some(v) = self.train_epoch {
            cfg.train_epoch = v;
        }
        if let Some(v) = self.lr {
            cfg.lr = v;
        }
        if let Some(v) = self.hdn_batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = &self.cnn_target_filters {
            cfg.cnn_target_filters = v.clone();
        }
        if let Some(v) = &self.cnn_target_kernels {
            cfg.cnn_target_kernels = v.clone();
        }
        if let Some(v) = self.drug_encoding {
            cfg.drug_encoding = v;
        }
        if let Some(v) = self.target_encoding {
            cfg.target_encoding = v;
        }
    }
}

impl TrainArgs {
    fn run_config(&self) -> anyhow::Result<RunConfig> {
        let mut cfg = match &self.config {
            Some(path) => RunConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => RunConfig::default(),
        };

        if let Some(v) = self.dataset {
            cfg.data.dataset = v;
        }
        if let Some(v) = &self.data_path {
            cfg.data.path = v.clone();
        }
        self.hoagcn.apply(&mut cfg.hoagcn);
        self.hdn.apply(&mut cfg.hdn);

        cfg.validate().context("invalid run configuration")?;
        Ok(cfg)
    }
}

fn train(args: &TrainArgs, models: Models) -> anyhow::Result<()> {
    let cfg = args.run_config()?;
    pipeline::run(&cfg, &args.result, models)
        .with_context(|| format!("training into {}", args.result.display()))?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .parse_default_env()
        .init();

    info!("MINDG v{}", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Command::Train(args) => train(args, Models::All),
        Command::TrainHoagcn(args) => train(args, Models::Hoagcn),
        Command::TrainHdn(args) => train(args, Models::Hdn),
        Command::Predict {
            result,
            input,
            output,
            batch_size,
        } => {
            pipeline::predict(result, input, output, *batch_size)
                .with_context(|| format!("scoring {}", input.display()))?;
            Ok(())
        }
        Command::InitConfig { output } => {
            RunConfig::default()
                .save(output)
                .with_context(|| format!("writing {}", output.display()))?;
            info!("Wrote the default configuration to {}", output.display());
            Ok(())
        }
    }
}
