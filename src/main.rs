use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::info;
use vdnet_train::logging::{self, init_logging};
use vdnet_train::training::{
    Dataset, DeviceType, FileSummaryWriter, MotionDataset, Split, TrainingConfig, VdnetTrainer,
};
use vdnet_train::utils::device::{describe, select_device};
use vdnet_train::utils::io::prepare_experiment_dir;
use vdnet_train::vdnet::{GenerativeModel, VDNet};

#[derive(Parser)]
#[command(name = "vdnet-train")]
#[command(about = "Train VDNet variational motion-transfer models", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model
    Train(TrainArgs),

    /// Validate configuration file
    Config {
        /// Configuration file to validate
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show system information
    Info,
}

/// Flags override the configuration file, which overrides the defaults
#[derive(Args, Debug)]
struct TrainArgs {
    /// Experiment name [default: default]
    #[arg(long)]
    exp: Option<String>,

    /// Checkpoint to resume from (snapshot dir, its checkpoint.json, or a snapshots dir)
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Dataset directory holding train.safetensors and test.safetensors
    #[arg(long)]
    data_path: Option<PathBuf>,

    /// Number of data loading workers [default: 8]
    #[arg(long)]
    workers: Option<usize>,

    /// Batch size [default: 8]
    #[arg(long)]
    batch: Option<usize>,

    /// Adam learning rate [default: 0.001]
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Initial KL weight [default: 0.00001]
    #[arg(long)]
    weight_kl: Option<f64>,

    /// Test reconstruction loss below which the KL weight doubles; "none" disables [default: 10]
    #[arg(long)]
    target_loss: Option<TargetLoss>,

    /// Ceiling for the KL weight [default: inf]
    #[arg(long)]
    max_weight: Option<f64>,

    /// Number of epochs [default: 1024]
    #[arg(long)]
    epochs: Option<usize>,

    /// Snapshot and visualize every N epochs, 0 disables [default: 1]
    #[arg(long)]
    snapshot: Option<usize>,

    /// GPU ordinal, or "cpu" [default: 0]
    #[arg(long)]
    gpu: Option<GpuSelection>,

    /// Configuration file (JSON or YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root directory for experiments [default: exp]
    #[arg(long)]
    exp_root: Option<PathBuf>,

    /// Seed for data shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// Disable shuffling
    #[arg(long)]
    no_shuffle: bool,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,
}

/// `--target-loss` value
#[derive(Debug, Clone, Copy)]
struct TargetLoss(Option<f64>);

impl FromStr for TargetLoss {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("none") {
            return Ok(Self(None));
        }
        s.parse::<f64>()
            .map(|value| Self(Some(value)))
            .map_err(|e| format!("expected a number or 'none': {}", e))
    }
}

/// `--gpu` value
#[derive(Debug, Clone, Copy)]
enum GpuSelection {
    Cpu,
    Ordinal(usize),
}

impl FromStr for GpuSelection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("cpu") {
            return Ok(Self::Cpu);
        }
        s.parse::<usize>()
            .map(Self::Ordinal)
            .map_err(|e| format!("expected a GPU ordinal or 'cpu': {}", e))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs).context("Failed to initialize logging")?;

    match cli.command {
        Commands::Train(args) => {
            train(args).await?;
        }

        Commands::Config { file } => {
            validate_config(file)?;
        }

        Commands::Info => {
            show_system_info();
        }
    }

    Ok(())
}

fn build_config(args: &TrainArgs) -> Result<TrainingConfig> {
    let mut config = match &args.config {
        Some(path) => TrainingConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration file {}", path.display()))?,
        None => TrainingConfig::default(),
    };

    if let Some(exp) = &args.exp {
        config.experiment.name = exp.clone();
    }
    if let Some(root) = &args.exp_root {
        config.experiment.root = root.clone();
    }
    if args.resume.is_some() {
        config.experiment.resume = args.resume.clone();
    }
    if let Some(path) = &args.data_path {
        config.data.path = path.clone();
    }
    if let Some(workers) = args.workers {
        config.data.num_workers = workers;
    }
    if let Some(batch) = args.batch {
        config.data.batch_size = batch;
    }
    if args.no_shuffle {
        config.data.shuffle = false;
    }
    if let Some(lr) = args.learning_rate {
        config.optimizer.learning_rate = lr;
    }
    if let Some(weight) = args.weight_kl {
        config.kl.initial_weight = weight;
    }
    if let Some(TargetLoss(target)) = args.target_loss {
        config.kl.target_loss = target;
    }
    if let Some(max_weight) = args.max_weight {
        config.kl.max_weight = max_weight.is_finite().then_some(max_weight);
    }
    if let Some(epochs) = args.epochs {
        config.training.num_epochs = epochs;
    }
    if let Some(snapshot) = args.snapshot {
        config.training.snapshot_interval = snapshot;
    }
    if args.no_progress {
        config.training.progress_bar = false;
    }
    match args.gpu {
        Some(GpuSelection::Cpu) => config.runtime.device_type = DeviceType::Cpu,
        Some(GpuSelection::Ordinal(id)) => {
            config.runtime.device_type = DeviceType::Auto;
            config.runtime.device_id = id;
        }
        None => {}
    }
    if args.seed.is_some() {
        config.runtime.seed = args.seed;
    }

    Ok(config)
}

fn echo_settings(config: &TrainingConfig) {
    let target_loss = config
        .kl
        .target_loss
        .map(|t| t.to_string())
        .unwrap_or_else(|| "none".to_string());
    let resume = config
        .experiment
        .resume
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "none".to_string());
    let gpu = match config.runtime.device_type {
        DeviceType::Cpu => "cpu".to_string(),
        _ => config.runtime.device_id.to_string(),
    };
    let seed = config
        .runtime
        .seed
        .map(|s| s.to_string())
        .unwrap_or_else(|| "random".to_string());

    let settings = [
        ("exp", config.experiment.name.clone()),
        ("resume", resume),
        ("data_path", config.data.path.display().to_string()),
        ("workers", config.data.num_workers.to_string()),
        ("batch", config.data.batch_size.to_string()),
        ("learning_rate", config.optimizer.learning_rate.to_string()),
        ("weight_kl", config.kl.initial_weight.to_string()),
        ("target_loss", target_loss),
        ("max_weight", config.kl.max_weight().to_string()),
        ("epochs", config.training.num_epochs.to_string()),
        ("snapshot", config.training.snapshot_interval.to_string()),
        ("gpu", gpu),
        ("shuffle", config.data.shuffle.to_string()),
        ("seed", seed),
    ];

    println!("==> arguments parsed");
    for (key, value) in settings {
        println!("[{}] = {}", key, value);
    }
}

async fn train(args: TrainArgs) -> Result<()> {
    let mut config = build_config(&args)?;
    echo_settings(&config);

    let train_data = MotionDataset::open(&config.data.path, Split::Train)
        .context("Failed to load training split")?;
    let test_data = MotionDataset::open(&config.data.path, Split::Test)
        .context("Failed to load test split")?;
    println!("==> dataset loaded");
    println!("[size] = {} + {}", train_data.len(), test_data.len());

    let metadata = train_data.metadata();
    config.model = config
        .model
        .clone()
        .with_shapes(metadata.input_shape, metadata.target_shape);
    config.validate().context("Invalid training configuration")?;

    let device = select_device(&config.runtime).context("Failed to select device")?;
    let model = VDNet::new(config.model.clone(), &device).context("Failed to build model")?;
    info!(
        "Model {} has {} parameters on {}",
        model.name(),
        model.num_parameters(),
        describe(&device)
    );

    let exp_dir = prepare_experiment_dir(config.experiment_dir())
        .context("Failed to create experiment directory")?;
    let log_dir = exp_dir.join("logs");
    let writer = FileSummaryWriter::create(&log_dir)
        .await
        .context("Failed to open summary logs")?;
    println!("==> save logs to {}", log_dir.display());

    let mut trainer = VdnetTrainer::new(
        config,
        model,
        Arc::new(train_data),
        Arc::new(test_data),
        Box::new(writer),
        device,
    )
    .context("Failed to initialize trainer")?;

    let result = trainer.train().await.context("Training failed")?;

    logging::success(&format!(
        "Trained {} epochs ({} steps) in {:?}, final kl weight {}",
        result.history.len(),
        result.final_state.global_step,
        result.training_duration,
        result.final_state.kl_weight
    ));
    Ok(())
}

fn validate_config(config_path: PathBuf) -> Result<()> {
    info!("Validating configuration file: {}", config_path.display());

    let config = TrainingConfig::from_file(&config_path).context("Failed to load configuration file")?;
    config.validate().context("Configuration is invalid")?;

    logging::success("Configuration is valid");
    println!("Configuration summary:");
    println!("  - Experiment: {}", config.experiment_dir().display());
    println!("  - Data: {}", config.data.path.display());
    println!(
        "  - Model: hidden {}, latent {}",
        config.model.hidden_dim, config.model.latent_dim
    );
    println!(
        "  - Batch size {}, {} epochs, snapshot every {}",
        config.data.batch_size, config.training.num_epochs, config.training.snapshot_interval
    );
    println!(
        "  - KL weight {} (target loss {:?}, max {})",
        config.kl.initial_weight,
        config.kl.target_loss,
        config.kl.max_weight()
    );
    if config.training.snapshot_interval == 0 {
        logging::warning("Snapshots are disabled; the run cannot be resumed");
    }

    Ok(())
}

fn show_system_info() {
    println!("vdnet-train {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Hardware support:");

    #[cfg(feature = "cuda")]
    println!("  ✅ NVIDIA CUDA GPU acceleration");
    #[cfg(not(feature = "cuda"))]
    println!("  ❌ CUDA support (not compiled)");

    #[cfg(feature = "metal")]
    println!("  ✅ Apple Metal GPU acceleration");
    #[cfg(not(feature = "metal"))]
    println!("  ❌ Metal support (not compiled)");

    #[cfg(feature = "accelerate")]
    println!("  ✅ Apple Accelerate framework");
    #[cfg(not(feature = "accelerate"))]
    println!("  ❌ Accelerate support (not compiled)");

    println!("  ✅ CPU training");
    println!();
    println!("Usage:");
    println!("  vdnet-train train --data-path data/motion --exp run1");
    println!("  vdnet-train train --exp run1 --resume exp/run1/snapshots");
    println!("  vdnet-train config -f config.yaml");
    println!("  vdnet-train info");
}
