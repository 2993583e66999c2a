//! Test suite for the VDNet training pipeline
//!
//! Unit tests live next to each component; the modules here drive the whole
//! trainer over small synthetic datasets.

// Test modules
pub mod checkpoint_tests;

// Utility modules for testing
pub mod fixtures;
pub mod mock_data;

// Re-export commonly used test utilities
pub use test_utils::{assert_tensor_close, create_test_config, create_test_device, create_test_model};

pub use mock_data::{create_mock_batch, create_mock_dataset};

pub use fixtures::TrainingTestFixture;
