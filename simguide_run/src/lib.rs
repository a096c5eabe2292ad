//! SimGuide frame synthesis runner
//!
//! Replays a recorded multi-vehicle template dataset while a network
//! simulator advances, shifting each frame's poses and point clouds by the
//! simulator's reported vehicle motion.
//!
//! # Pipeline
//!
//! ```text
//!   template/<vehicle>/<frame>.yaml|.pcd|.png
//!            │
//!            ▼
//!   ┌──────────────────┐   step()   ┌───────────────────┐
//!   │ FrameSynthesizer │◄──────────►│ SimulatorLink      │
//!   │  (cycle + shift) │  snapshot  │  (codec + retry)   │
//!   └────────┬─────────┘            └───────────────────┘
//!            ▼
//!   output/<scenario>/<vehicle>/000000.yaml|.pcd ...
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use simguide_run::{AugmentConfig, FrameSynthesizer};
//! use simguide_env::NoSimulator;
//!
//! let config = AugmentConfig::new("data/test/town05", "data/augmented", "town05_sim");
//! let mut synthesizer = FrameSynthesizer::new(config, NoSimulator);
//! let ok = synthesizer.augment();
//! ```

pub mod config;
pub mod dataset;
pub mod diagnostics;
pub mod error;
pub mod protocol;
pub mod synthesizer;

pub use config::AugmentConfig;
pub use dataset::{link_images, OutputLayout, TemplateDataset};
pub use diagnostics::Diagnostics;
pub use error::AugmentError;
pub use protocol::{write_protocol, AugmentationRecord, ProtocolArtifact, ProtocolMetadata};
pub use synthesizer::{AugmentReport, FrameSynthesizer};
