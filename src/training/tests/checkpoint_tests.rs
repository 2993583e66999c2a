//! Snapshot and resume behavior of the trainer

use std::fs;

use approx::assert_relative_eq;
use tokio::sync::mpsc;

use super::fixtures::TrainingTestFixture;
use crate::error::Error;
use crate::training::checkpoints::{CheckpointError, CheckpointManager};
use crate::training::metrics::MemorySummaryWriter;
use crate::training::optimizers::Optimizer;
use crate::training::trainer::TrainingEvent;

fn train_steps(writer: &MemorySummaryWriter) -> Vec<u64> {
    writer
        .scalar_series("train_loss")
        .into_iter()
        .map(|(step, _)| step)
        .collect()
}

#[tokio::test]
async fn test_resume_reproduces_step_trajectory() {
    let mut fixture = TrainingTestFixture::new(10, 6);
    fixture.config.training.num_epochs = 3;

    // uninterrupted run in its own experiment
    let mut full_config = fixture.config.clone();
    full_config.experiment.name = "full".to_string();
    let full_writer = MemorySummaryWriter::new();
    let mut full = fixture.create_trainer_with(full_config, full_writer.clone());
    let full_result = full.train().await.unwrap();

    // interrupted after two epochs, then resumed
    let mut first_config = fixture.config.clone();
    first_config.training.num_epochs = 2;
    let first_writer = MemorySummaryWriter::new();
    let mut first = fixture.create_trainer_with(first_config, first_writer.clone());
    first.train().await.unwrap();

    let mut resume_config = fixture.config.clone();
    resume_config.experiment.resume =
        Some(CheckpointManager::new(fixture.experiment_dir()).checkpoint_path(2));
    let resumed_writer = MemorySummaryWriter::new();
    let mut resumed = fixture.create_trainer_with(resume_config, resumed_writer.clone());
    let resumed_result = resumed.train().await.unwrap();

    let mut stitched = train_steps(&first_writer);
    stitched.extend(train_steps(&resumed_writer));
    assert_eq!(stitched, train_steps(&full_writer));

    assert_eq!(resumed_result.final_state.global_step, full_result.final_state.global_step);
    assert_eq!(resumed_result.final_state.epoch, 3);
    assert_eq!(resumed_result.history.len(), 1);
    assert_eq!(resumed_result.history[0].epoch, 2);
    assert!(resumed_result.resumed_from.is_some());
    assert_eq!(resumed.optimizer().step_count(), full.optimizer().step_count());
}

#[tokio::test]
async fn test_resume_restores_kl_weight() {
    let mut fixture = TrainingTestFixture::new(8, 4);
    fixture.config.training.num_epochs = 1;
    fixture.config.kl.target_loss = Some(1e6);

    let mut first = fixture.create_trainer();
    let first_result = first.train().await.unwrap();
    assert_relative_eq!(first_result.final_state.kl_weight.value(), 2e-5);

    let mut resume_config = fixture.config.clone();
    resume_config.training.num_epochs = 2;
    resume_config.experiment.resume = Some(fixture.experiment_dir().join("snapshots"));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut resumed = fixture
        .create_trainer_with(resume_config, MemorySummaryWriter::new())
        .with_event_monitoring(tx);
    resumed.train().await.unwrap();

    let mut started_with = None;
    while let Ok(event) = rx.try_recv() {
        if let TrainingEvent::EpochStarted { epoch, kl_weight } = event {
            assert_eq!(epoch, 1);
            started_with = Some(kl_weight.value());
        }
    }
    assert_relative_eq!(started_with.unwrap(), 2e-5);
}

#[tokio::test]
async fn test_resume_past_final_epoch_trains_nothing() {
    let fixture = TrainingTestFixture::new(8, 4);
    let mut first = fixture.create_trainer();
    first.train().await.unwrap();

    let mut resume_config = fixture.config.clone();
    resume_config.experiment.resume = Some(fixture.experiment_dir().join("snapshots"));
    let writer = MemorySummaryWriter::new();
    let mut resumed = fixture.create_trainer_with(resume_config, writer.clone());
    let result = resumed.train().await.unwrap();

    assert!(result.history.is_empty());
    assert_eq!(result.final_state.epoch, 2);
    assert_eq!(result.final_state.global_step, 16);
    assert!(writer.scalars().is_empty());
}

#[tokio::test]
async fn test_missing_resume_path_is_load_error() {
    let mut fixture = TrainingTestFixture::new(8, 4);
    fixture.config.experiment.resume = Some(fixture.root().join("does-not-exist"));

    let mut trainer = fixture.create_trainer();
    let err = trainer.train().await.unwrap_err();

    assert!(err.is_checkpoint_load());
    assert!(matches!(
        err,
        Error::CheckpointLoad { source: CheckpointError::Missing { .. }, .. }
    ));
    assert!(fixture.writer.scalars().is_empty());
}

#[tokio::test]
async fn test_corrupt_manifest_is_load_error() {
    let fixture = TrainingTestFixture::new(8, 4);
    let mut first = fixture.create_trainer();
    first.train().await.unwrap();

    let snapshot = CheckpointManager::new(fixture.experiment_dir()).checkpoint_path(1);
    fs::write(snapshot.join("checkpoint.json"), b"{ not json").unwrap();

    let mut resume_config = fixture.config.clone();
    resume_config.experiment.resume = Some(snapshot);
    let mut resumed = fixture.create_trainer_with(resume_config, MemorySummaryWriter::new());
    let err = resumed.train().await.unwrap_err();

    assert!(matches!(
        err,
        Error::CheckpointLoad { source: CheckpointError::Manifest(_), .. }
    ));
}

#[tokio::test]
async fn test_unwritable_experiment_dir_is_save_error() {
    let mut fixture = TrainingTestFixture::new(8, 4);
    // a plain file where the experiment root should be
    let blocker = fixture.root().join("blocked");
    fs::write(&blocker, b"").unwrap();
    fixture.config.experiment.root = blocker;

    let mut trainer = fixture.create_trainer();
    let err = trainer.train().await.unwrap_err();

    assert!(err.is_checkpoint_save());
    assert!(!err.is_checkpoint_load());
    // the first epoch ran before the snapshot failed
    assert!(!fixture.writer.scalar_series("train_loss").is_empty());
}

#[tokio::test]
async fn test_latest_pointer_tracks_newest_snapshot() {
    let mut fixture = TrainingTestFixture::new(8, 4);
    fixture.config.training.num_epochs = 3;

    let mut trainer = fixture.create_trainer();
    trainer.train().await.unwrap();

    let manager = CheckpointManager::new(fixture.experiment_dir());
    assert_eq!(manager.list().unwrap().len(), 3);
    assert_eq!(manager.latest().unwrap(), Some(manager.checkpoint_path(3)));
}
