//! Simulator environment abstraction.

use crate::error::EnvError;
use crate::types::{Action, Observation, StepResult};

/// Abstraction for a stepped external simulator.
///
/// # Implementations
///
/// - **Live**: `OpenGymBridge` - ZeroMQ session to a JSON relay in front of ns-3 OpenGym
/// - **Replay**: `ScriptedSimulator` - in-process list of observations
///
/// # Session Flow
///
/// ```text
/// Augmentor                     Simulator
///   |-- connect(port, dt) ------->|
///   |<------------ initial obs ---|
///   |-- step(action) ------------>|
///   |<---- (obs, reward, done) ---|
///   |          ...                |
///   |-- close() ----------------->|
/// ```
///
/// Steps are strictly sequential: the simulator keeps a single mutable
/// sequence and cannot replay, so step `k + 1` must never be issued before
/// the result of step `k` has been consumed.
pub trait SimulatorEnv {
    /// Opens a session and returns the initial observation.
    ///
    /// # Arguments
    /// * `port` - Simulator port on localhost
    /// * `step_interval` - Simulated seconds per step
    ///
    /// # Returns
    /// * `Ok(Some(obs))` - Session open, initial observation received
    /// * `Ok(None)` - Session open but the simulator sent no observation
    /// * `Err(EnvError)` - No session; the caller may retry
    fn connect(&mut self, port: u16, step_interval: f64) -> Result<Option<Observation>, EnvError>;
    
    /// Draws any valid action from the simulator's action space.
    fn sample_action(&mut self) -> Action;
    
    /// Submits an action and waits for the simulator's reply.
    fn step(&mut self, action: Action) -> Result<StepResult, EnvError>;
    
    /// Releases the session.
    fn close(&mut self) -> Result<(), EnvError>;
    
    /// Short backend name for logging.
    fn name(&self) -> &str;
}

impl<S: SimulatorEnv + ?Sized> SimulatorEnv for Box<S> {
    fn connect(&mut self, port: u16, step_interval: f64) -> Result<Option<Observation>, EnvError> {
        (**self).connect(port, step_interval)
    }
    
    fn sample_action(&mut self) -> Action {
        (**self).sample_action()
    }
    
    fn step(&mut self, action: Action) -> Result<StepResult, EnvError> {
        (**self).step(action)
    }
    
    fn close(&mut self) -> Result<(), EnvError> {
        (**self).close()
    }
    
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Simulator that is never reachable.
///
/// Used when no backend is configured; every connect attempt fails so the
/// run falls back to template replay.
#[derive(Debug, Default)]
pub struct NoSimulator;

impl SimulatorEnv for NoSimulator {
    fn connect(&mut self, _port: u16, _step_interval: f64) -> Result<Option<Observation>, EnvError> {
        Err(EnvError::connection("no simulator backend configured"))
    }
    
    fn sample_action(&mut self) -> Action {
        Vec::new()
    }
    
    fn step(&mut self, _action: Action) -> Result<StepResult, EnvError> {
        Err(EnvError::Closed)
    }
    
    fn close(&mut self) -> Result<(), EnvError> {
        Ok(())
    }
    
    fn name(&self) -> &str {
        "none"
    }
}
