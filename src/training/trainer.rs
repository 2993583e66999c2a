//! Epoch-loop driver for VDNet training
//!
//! [`VdnetTrainer`] runs the state machine
//!
//! ```text
//! Initializing -> TrainingEpoch -> TestingEpoch -> (Checkpointing -> Visualizing)? -> TrainingEpoch ...
//! ```
//!
//! until the configured number of epochs has completed. The [`TrainingState`]
//! is passed into and returned from every epoch function; the KL weight inside
//! it only changes through [`KlWeightScheduler::adjust`]. Errors abort the run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use candle_core::Device;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::training::checkpoints::{CheckpointManager, CheckpointProgress, TrainingCheckpoint};
use crate::training::config::TrainingConfig;
use crate::training::data::{Batch, DataLoader, Dataset, Split};
use crate::training::loss::{LossState, VdnetLoss};
use crate::training::metrics::{LossAccumulator, SummaryWriter};
use crate::training::optimizers::{Adam, Optimizer};
use crate::training::progress::PassProgress;
use crate::training::schedulers::{KlWeight, KlWeightScheduler};
use crate::training::visualize::SplitVisualization;
use crate::vdnet::{ForwardMode, GenerativeModel, LatentParameters};

/// Phase of the training state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingPhase {
    /// Restoring or creating the initial state
    Initializing,
    /// Optimizing over the training split
    TrainingEpoch,
    /// Evaluating the test split
    TestingEpoch,
    /// Writing a snapshot
    Checkpointing,
    /// Logging image summaries
    Visualizing,
    /// All epochs done
    Completed,
}

/// Training progress threaded through the epoch loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    /// Number of completed epochs, also the index of the next one
    pub epoch: usize,

    /// Number of training samples processed so far
    pub global_step: u64,

    /// KL weight for the next training pass
    pub kl_weight: KlWeight,

    /// Current phase
    pub phase: TrainingPhase,
}

impl TrainingState {
    /// Fresh state at epoch 0, step 0
    pub fn new(kl_weight: KlWeight) -> Self {
        Self {
            epoch: 0,
            global_step: 0,
            kl_weight,
            phase: TrainingPhase::Initializing,
        }
    }

    /// State recorded in a checkpoint
    pub fn from_checkpoint(checkpoint: &TrainingCheckpoint) -> Self {
        Self {
            epoch: checkpoint.epoch,
            global_step: checkpoint.global_step,
            kl_weight: checkpoint.kl_weight,
            phase: TrainingPhase::Initializing,
        }
    }
}

/// Per-epoch record kept in the training history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// 0-based epoch index
    pub epoch: usize,
    /// Global step at the end of the epoch
    pub global_step: u64,
    /// Sample-weighted training losses
    pub train: LossState,
    /// Sample-weighted test losses
    pub test: LossState,
    /// KL weight after scheduling
    pub kl_weight: KlWeight,
    /// Whether the scheduler changed the weight this epoch
    pub kl_adjusted: bool,
    /// Snapshot written at the end of the epoch
    pub checkpoint: Option<PathBuf>,
    /// Wall-clock time of the epoch
    pub duration: Duration,
}

/// Training events for monitoring
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub enum TrainingEvent {
    EpochStarted { epoch: usize, kl_weight: KlWeight },
    EpochCompleted { summary: EpochSummary },
    KlWeightAdjusted { epoch: usize, previous: KlWeight, current: KlWeight },
    /// `epoch` counts completed epochs, as stored in the snapshot
    CheckpointSaved { epoch: usize, path: PathBuf },
    VisualizationLogged { epoch: usize, step: u64 },
    TrainingCompleted { epochs: usize, global_step: u64 },
}

/// Outcome of [`VdnetTrainer::train`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingResult {
    /// State after the last epoch
    pub final_state: TrainingState,

    /// One summary per epoch run by this invocation
    pub history: Vec<EpochSummary>,

    /// Wall-clock training time
    pub training_duration: Duration,

    /// Checkpoint the run resumed from
    pub resumed_from: Option<PathBuf>,
}

/// Trainer for a [`GenerativeModel`] over a train/test pair of datasets
pub struct VdnetTrainer<M: GenerativeModel, D: Dataset + 'static> {
    /// Training configuration
    config: TrainingConfig,

    /// Model being trained
    model: M,

    /// Optimizer over the model's variables
    optimizer: Adam,

    /// KL-weight schedule
    scheduler: KlWeightScheduler,

    /// Training data loader
    train_loader: DataLoader<D>,

    /// Test data loader
    test_loader: DataLoader<D>,

    /// Snapshot location
    checkpoints: CheckpointManager,

    /// Summary sink
    writer: Box<dyn SummaryWriter>,

    /// Last committed state
    state: TrainingState,

    /// Device batches are moved to
    device: Device,

    /// Event channel for monitoring
    event_tx: Option<mpsc::UnboundedSender<TrainingEvent>>,

    /// Epoch summaries of this run
    history: Vec<EpochSummary>,
}

impl<M: GenerativeModel, D: Dataset + 'static> VdnetTrainer<M, D> {
    /// Create a trainer
    ///
    /// The configuration is validated here; nothing is read from or written
    /// to the experiment directory until [`train`](Self::train).
    pub fn new(
        config: TrainingConfig,
        model: M,
        train_data: Arc<D>,
        test_data: Arc<D>,
        writer: Box<dyn SummaryWriter>,
        device: Device,
    ) -> Result<Self> {
        config.validate()?;

        let optimizer = Adam::new(model.var_map(), config.optimizer.clone())?;
        let scheduler = config.kl_scheduler()?;
        let state = TrainingState::new(config.initial_kl_weight()?);

        let train_loader = DataLoader::new(train_data, config.loader_config(Split::Train));
        let test_loader = DataLoader::new(test_data, config.loader_config(Split::Test));
        let checkpoints = CheckpointManager::new(config.experiment_dir());

        Ok(Self {
            config,
            model,
            optimizer,
            scheduler,
            train_loader,
            test_loader,
            checkpoints,
            writer,
            state,
            device,
            event_tx: None,
            history: Vec::new(),
        })
    }

    /// Enable event monitoring
    pub fn with_event_monitoring(mut self, tx: mpsc::UnboundedSender<TrainingEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Run every remaining epoch
    pub async fn train(&mut self) -> Result<TrainingResult> {
        let start = Instant::now();
        let mut state = self.initialize()?;

        let num_epochs = self.config.training.num_epochs;
        if state.epoch >= num_epochs {
            warn!(
                "Checkpoint already covers {} of {} epochs, nothing to train",
                state.epoch, num_epochs
            );
        }

        while state.epoch < num_epochs {
            state = self.run_epoch(state).await?;
            self.state = state.clone();
        }

        state.phase = TrainingPhase::Completed;
        self.state = state.clone();
        self.writer.flush().await?;

        let training_duration = start.elapsed();
        info!(
            "Training completed in {:?}: {} epochs, {} steps, kl weight {}",
            training_duration, state.epoch, state.global_step, state.kl_weight
        );
        self.send_event(TrainingEvent::TrainingCompleted {
            epochs: state.epoch,
            global_step: state.global_step,
        });

        Ok(TrainingResult {
            final_state: state,
            history: self.history.clone(),
            training_duration,
            resumed_from: self.config.experiment.resume.clone(),
        })
    }

    /// Restore the resume checkpoint or start from scratch
    fn initialize(&mut self) -> Result<TrainingState> {
        let state = match self.config.experiment.resume.clone() {
            Some(path) => {
                info!("Resuming from checkpoint: {}", path.display());
                let checkpoint = CheckpointManager::load(&path, &mut self.model, &mut self.optimizer)?;
                self.scheduler.check_initial(checkpoint.kl_weight)?;
                TrainingState::from_checkpoint(&checkpoint)
            }
            None => TrainingState::new(self.config.initial_kl_weight()?),
        };

        info!(
            "Training {} ({} parameters) on {:?}",
            self.model.name(),
            self.model.num_parameters(),
            self.device
        );
        info!(
            "Dataset sizes: {} train, {} test; {} + {} batches per epoch",
            self.train_loader.dataset_size(),
            self.test_loader.dataset_size(),
            self.train_loader.num_batches(),
            self.test_loader.num_batches()
        );
        info!(
            "Starting at epoch {}, step {}, kl weight {}",
            state.epoch, state.global_step, state.kl_weight
        );

        Ok(state)
    }

    /// One full pass of the state machine
    async fn run_epoch(&mut self, state: TrainingState) -> Result<TrainingState> {
        let epoch_start = Instant::now();
        let epoch = state.epoch;
        info!("Starting epoch {}/{}", epoch + 1, self.config.training.num_epochs);
        self.send_event(TrainingEvent::EpochStarted {
            epoch,
            kl_weight: state.kl_weight,
        });

        let (state, train) = self.train_epoch(state).await?;
        let (mut state, test) = self.test_epoch(state).await?;

        let update = self
            .scheduler
            .adjust(test.reconstruction, test.kl, state.kl_weight);
        if update.adjusted {
            info!("adjusted kl weight to {}", update.current);
            self.send_event(TrainingEvent::KlWeightAdjusted {
                epoch,
                previous: update.previous,
                current: update.current,
            });
        }
        state.kl_weight = update.current;
        self.writer
            .scalar_summary("kl_weight", state.kl_weight.value(), state.global_step)
            .await?;

        let mut checkpoint = None;
        if self.config.is_snapshot_epoch(epoch) {
            state = self.checkpoint(state)?;
            checkpoint = Some(self.checkpoints.checkpoint_path(epoch + 1));
            state = self.visualize(state).await?;
        }

        state.epoch += 1;
        self.writer.flush().await?;

        let summary = EpochSummary {
            epoch,
            global_step: state.global_step,
            train,
            test,
            kl_weight: state.kl_weight,
            kl_adjusted: update.adjusted,
            checkpoint,
            duration: epoch_start.elapsed(),
        };
        info!(
            "Epoch {}/{} completed - train loss {:.4}, test loss_r {:.4}, test loss_kl {:.4}",
            epoch + 1,
            self.config.training.num_epochs,
            train.combined,
            test.reconstruction,
            test.kl
        );
        self.history.push(summary.clone());
        self.send_event(TrainingEvent::EpochCompleted { summary });

        Ok(state)
    }

    /// Optimize over the training split, advancing the step by each batch size
    #[instrument(skip_all, fields(epoch = state.epoch))]
    async fn train_epoch(&mut self, mut state: TrainingState) -> Result<(TrainingState, LossState)> {
        state.phase = TrainingPhase::TrainingEpoch;
        let kl_weight = state.kl_weight.value();

        let mut batches = self.train_loader.epoch_stream();
        let progress = PassProgress::new(
            "train",
            batches.total_batches() as u64,
            self.config.training.progress_bar,
        );
        let mut losses = LossAccumulator::new();

        while let Some(batch) = batches.next().await {
            let batch = batch?.to_device(&self.device)?;
            let batch_size = batch.size();

            let (reconstruction, latent) = self
                .model
                .forward(&batch.inputs, ForwardMode::Reconstruct)?
                .into_parts()?;
            let loss = VdnetLoss::compute(&reconstruction, &batch.targets, &latent, kl_weight)?;
            self.optimizer.backward_step(loss.combined())?;

            let batch_losses = loss.state()?;
            state.global_step += batch_size as u64;

            self.writer
                .scalar_summary("train_loss", batch_losses.combined, state.global_step)
                .await?;
            self.writer
                .scalar_summary("train_loss_r", batch_losses.reconstruction, state.global_step)
                .await?;
            self.writer
                .scalar_summary("train_loss_kl", batch_losses.kl, state.global_step)
                .await?;

            losses.add(&batch_losses, batch_size);
            progress.advance("train", batch_losses.combined);
        }
        progress.finish();

        debug!(
            "Trained on {} samples in {} batches",
            losses.samples(),
            losses.batches()
        );
        Ok((state, losses.mean()))
    }

    /// Evaluate the test split without touching the parameters
    #[instrument(skip_all, fields(epoch = state.epoch))]
    async fn test_epoch(&mut self, mut state: TrainingState) -> Result<(TrainingState, LossState)> {
        state.phase = TrainingPhase::TestingEpoch;
        let kl_weight = state.kl_weight.value();

        let mut batches = self.test_loader.epoch_stream();
        let progress = PassProgress::new(
            "test",
            batches.total_batches() as u64,
            self.config.training.progress_bar,
        );
        let mut losses = LossAccumulator::new();

        while let Some(batch) = batches.next().await {
            let batch = batch?.to_device(&self.device)?;
            let batch_losses = self.evaluate(&batch, kl_weight)?;
            losses.add(&batch_losses, batch.size());
            progress.advance("test", batch_losses.combined);
        }
        progress.finish();

        if losses.samples() == 0 {
            warn!("Test split yielded no batches, reporting zero test losses");
        }

        let test = losses.mean();
        self.writer
            .scalar_summary("test_loss_r", test.reconstruction, state.global_step)
            .await?;
        self.writer
            .scalar_summary("test_loss_kl", test.kl, state.global_step)
            .await?;

        Ok((state, test))
    }

    /// Losses of one batch on detached outputs
    fn evaluate(&self, batch: &Batch, kl_weight: f64) -> Result<LossState> {
        let (reconstruction, latent) = self
            .model
            .forward(&batch.inputs, ForwardMode::Reconstruct)?
            .into_parts()?;
        let latent = LatentParameters {
            mean: latent.mean.detach(),
            log_var: latent.log_var.detach(),
        };
        VdnetLoss::compute(&reconstruction.detach(), &batch.targets, &latent, kl_weight)?.state()
    }

    /// Persist the state reached after this epoch
    fn checkpoint(&mut self, mut state: TrainingState) -> Result<TrainingState> {
        state.phase = TrainingPhase::Checkpointing;
        let progress = CheckpointProgress {
            epoch: state.epoch + 1,
            global_step: state.global_step,
            kl_weight: state.kl_weight,
        };

        self.checkpoints
            .save(progress, &self.config, &self.model, &self.optimizer)?;
        self.send_event(TrainingEvent::CheckpointSaved {
            epoch: progress.epoch,
            path: self.checkpoints.checkpoint_path(progress.epoch),
        });

        Ok(state)
    }

    /// Log inputs, reconstructions, targets and prior samples for both splits
    #[instrument(skip_all, fields(epoch = state.epoch, step = state.global_step))]
    async fn visualize(&mut self, mut state: TrainingState) -> Result<TrainingState> {
        state.phase = TrainingPhase::Visualizing;
        let step = state.global_step;

        for split in Split::ALL {
            let Some(batch) = self.loader(split).sample_batch().await? else {
                warn!("No {} batch to visualize", split);
                continue;
            };
            let batch = batch.to_device(&self.device)?;

            let outputs = self
                .model
                .forward(&batch.inputs, ForwardMode::Reconstruct)?
                .reconstruction
                .detach();
            let samples = (0..self.config.training.num_prior_samples)
                .map(|_| {
                    Ok(self
                        .model
                        .forward(&batch.inputs, ForwardMode::SamplePrior)?
                        .reconstruction
                        .detach())
                })
                .collect::<Result<Vec<_>>>()?;

            let visualization = SplitVisualization {
                split,
                inputs: &batch.inputs,
                outputs: &outputs,
                targets: &batch.targets,
                samples: &samples,
            };
            for (tag, images) in visualization.summaries()? {
                self.writer.image_summary(&tag, &images, step).await?;
            }
        }

        self.send_event(TrainingEvent::VisualizationLogged {
            epoch: state.epoch,
            step,
        });
        Ok(state)
    }

    fn loader(&self, split: Split) -> &DataLoader<D> {
        match split {
            Split::Train => &self.train_loader,
            Split::Test => &self.test_loader,
        }
    }

    /// Send training event
    fn send_event(&self, event: TrainingEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Get current training state
    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    /// Get training configuration
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Model being trained
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Optimizer state
    pub fn optimizer(&self) -> &Adam {
        &self.optimizer
    }

    /// Snapshot manager for this experiment
    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Epoch summaries recorded so far
    pub fn history(&self) -> &[EpochSummary] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_state() {
        let state = TrainingState::new(KlWeight::new(1e-5).unwrap());
        assert_eq!(state.epoch, 0);
        assert_eq!(state.global_step, 0);
        assert_eq!(state.phase, TrainingPhase::Initializing);
    }

    #[test]
    fn test_state_serialization() {
        let mut state = TrainingState::new(KlWeight::new(2e-5).unwrap());
        state.epoch = 3;
        state.global_step = 120;
        state.phase = TrainingPhase::TestingEpoch;

        let json = serde_json::to_string(&state).unwrap();
        let parsed: TrainingState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }
}
