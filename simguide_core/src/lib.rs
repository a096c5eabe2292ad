//! SimGuide Core - Telemetry-Guided Frame Synthesis Engine
//!
//! Steers a fixed, previously validated perception dataset with vehicle
//! telemetry sampled live from a network simulator:
//! 1. **Telemetry Codec**: flat observation vectors → per-vehicle snapshots
//! 2. **Reference Tracker**: the first observation is the zero point
//! 3. **Simulator Link**: connect / retry / step / close with graceful degradation
//! 4. **Delta Transform**: clamped planar offsets applied to scenes and point clouds
//!
//! Scene records (YAML) and point clouds (PCD) are read and written through
//! the `SceneStore` / `PointCloudStore` traits.

pub mod error;
pub mod link;
pub mod point_cloud;
pub mod reference;
pub mod scene;
pub mod telemetry;
pub mod transform;

// Re-export key types for convenience
pub use error::CoreError;
pub use link::{LinkState, RetryPolicy, SimulatorLink, StepOutcome};
pub use point_cloud::{PcdField, PcdStore, PointCloud, PointCloudStore};
pub use reference::ReferenceTracker;
pub use scene::{SceneFrame, SceneStore, YamlSceneStore};
pub use telemetry::{DecodeOutcome, StateSnapshot, TelemetryCodec, VehicleState};
pub use transform::{DeltaTransform, Offset, SceneUpdate};
