//! blobtrack Simulation Harness
//!
//! Runs the tracker outside a live camera pipeline:
//! - **Replay**: JSON lines detection frames in, JSON lines snapshots out
//! - **Scenarios**: a seeded ground-truth oracle generates noisy detections
//!   and the runner scores the tracker against it
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                ScenarioRunner                │
//! │                                              │
//! │  Oracle ──► DetectionFrame ──► FrameProcessor│
//! │    │                                │        │
//! │    └──── ground truth ──► IdentityLedger ◄───┘
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use blobtrack_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).with_frames(100).run(ScenarioId::Crossing)?;
//! assert!(result.passed);
//! ```

mod error;
mod exporter;
mod oracle;
mod replay;
mod runner;
pub mod scenarios;

pub use error::SimError;
pub use exporter::{BlobPosition, SimExport, SimFrame};
pub use oracle::{GroundTruthBlob, Oracle};
pub use replay::{JsonLinesSink, JsonLinesSource};
pub use runner::{ScenarioResult, ScenarioRunner};
