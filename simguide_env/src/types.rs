//! Common types exchanged with a simulator environment.

use serde::{Deserialize, Serialize};

/// Raw observation vector as reported by the simulator.
///
/// Layout is owned by the simulator script; decoding lives in
/// `simguide_core::telemetry`.
pub type Observation = Vec<f64>;

/// Action submitted on each step.
///
/// The augmentor never interprets action content; any valid sample will do.
pub type Action = Vec<f64>;

/// Result of one simulator step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Observation after the step (may be absent if the simulator sent none)
    pub observation: Option<Observation>,
    
    /// Reward reported by the simulator (unused by the augmentor)
    pub reward: f64,
    
    /// Simulator finished its run
    pub done: bool,
    
    /// Free-form extra info string
    #[serde(default)]
    pub info: String,
}

impl StepResult {
    /// Creates a non-terminal step result.
    pub fn running(observation: Observation) -> Self {
        Self {
            observation: Some(observation),
            reward: 0.0,
            done: false,
            info: String::new(),
        }
    }
    
    /// Creates a terminal step result.
    pub fn finished() -> Self {
        Self {
            observation: None,
            reward: 0.0,
            done: true,
            info: String::new(),
        }
    }
}

/// Continuous box action space (`shape` values, each in `[low, high]`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxSpace {
    pub low: f64,
    pub high: f64,
    pub shape: usize,
}

impl BoxSpace {
    /// Action space advertised by the V2X simulation script.
    pub const V2X_DEFAULT: BoxSpace = BoxSpace { low: 0.0, high: 10.0, shape: 4 };
    
    /// Draws a uniform sample from the box.
    pub fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> Action {
        (0..self.shape)
            .map(|_| {
                if self.high > self.low {
                    rng.gen_range(self.low..self.high)
                } else {
                    self.low
                }
            })
            .collect()
    }
}
