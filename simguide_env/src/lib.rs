//! SimGuide Environment Abstraction Layer
//!
//! This crate isolates the external network simulator behind one trait so
//! the frame synthesis engine can run against:
//! - **Live**: ns-3 OpenGym through a JSON relay (`opengym` feature)
//! - **Replay**: a scripted in-process simulator (tests, dry runs)
//! - **Nothing**: a backend that never connects (template-only replay)
//!
//! # Example
//!
//! ```ignore
//! use simguide_env::{ScriptedSimulator, SimulatorEnv};
//!
//! let mut sim = ScriptedSimulator::linear_drive(7, 100, 10.0, 0.1);
//! let initial = sim.connect(5555, 0.1)?;
//! let action = sim.sample_action();
//! let step = sim.step(action)?;
//! sim.close()?;
//! ```

mod error;
mod opengym;
mod scripted;
mod simulator;
mod types;

pub use error::EnvError;
pub use opengym::{BridgeReply, BridgeRequest, OpenGymBridge, DEFAULT_TIMEOUT_MS};
pub use scripted::{ScriptStats, ScriptedSimulator};
pub use simulator::{NoSimulator, SimulatorEnv};
pub use types::{Action, BoxSpace, Observation, StepResult};
