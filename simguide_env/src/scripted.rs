//! Scripted in-process simulator for dry runs and deterministic tests.

use crate::error::EnvError;
use crate::simulator::SimulatorEnv;
use crate::types::{Action, BoxSpace, Observation, StepResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Call counters shared between a `ScriptedSimulator` and its owner.
///
/// The simulator is usually moved into a link, so tests keep an `Arc`
/// to observe what happened to it.
#[derive(Debug, Default)]
pub struct ScriptStats {
    connect_attempts: AtomicUsize,
    steps: AtomicUsize,
    closes: AtomicUsize,
}

impl ScriptStats {
    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }
    
    pub fn steps(&self) -> usize {
        self.steps.load(Ordering::SeqCst)
    }
    
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Replays a fixed list of observations.
///
/// The first observation answers `connect`; each `step` returns the next
/// one. When the list runs out the simulator reports `done`.
pub struct ScriptedSimulator {
    observations: Vec<Observation>,
    
    /// Index of the next observation to hand out
    cursor: usize,
    
    /// Number of steps taken in this session
    step_index: usize,
    
    /// Connect attempts that fail before one succeeds
    failing_connects: usize,
    
    /// Step index (0-based) that reports `done`
    done_at: Option<usize>,
    
    /// Step index (0-based) that raises
    fail_at: Option<usize>,
    
    connected: bool,
    action_space: BoxSpace,
    rng: StdRng,
    stats: Arc<ScriptStats>,
}

impl ScriptedSimulator {
    /// Creates a simulator replaying `observations`.
    pub fn new(observations: Vec<Observation>) -> Self {
        Self {
            observations,
            cursor: 0,
            step_index: 0,
            failing_connects: 0,
            done_at: None,
            fail_at: None,
            connected: false,
            action_space: BoxSpace::V2X_DEFAULT,
            rng: StdRng::seed_from_u64(0),
            stats: Arc::new(ScriptStats::default()),
        }
    }
    
    /// Builds observations for vehicles driving in a straight line.
    ///
    /// Vehicle `i` starts at `(100 * i, 50)` and moves `velocity * step_interval`
    /// along x every step. The layout matches the V2X script:
    /// `[count, avg_speed, avg_x, avg_y, (x, y, speed) * count]`.
    pub fn linear_drive(num_vehicles: usize, steps: usize, velocity: f64, step_interval: f64) -> Self {
        let observations = (0..=steps)
            .map(|k| {
                let t = k as f64 * step_interval;
                let positions: Vec<(f64, f64)> = (0..num_vehicles)
                    .map(|i| (100.0 * i as f64 + velocity * t, 50.0))
                    .collect();
                
                let n = num_vehicles.max(1) as f64;
                let avg_x = positions.iter().map(|p| p.0).sum::<f64>() / n;
                let avg_y = positions.iter().map(|p| p.1).sum::<f64>() / n;
                
                let mut obs = vec![num_vehicles as f64, velocity, avg_x, avg_y];
                for (x, y) in positions {
                    obs.extend_from_slice(&[x, y, velocity]);
                }
                obs
            })
            .collect();
        
        Self::new(observations)
    }
    
    /// Makes the first `count` connect attempts fail.
    pub fn with_failing_connects(mut self, count: usize) -> Self {
        self.failing_connects = count;
        self
    }
    
    /// Reports `done` on the given 0-based step index.
    pub fn with_done_at(mut self, step_index: usize) -> Self {
        self.done_at = Some(step_index);
        self
    }
    
    /// Raises on the given 0-based step index.
    pub fn with_failure_at(mut self, step_index: usize) -> Self {
        self.fail_at = Some(step_index);
        self
    }
    
    /// Returns the shared call counters.
    pub fn stats(&self) -> Arc<ScriptStats> {
        Arc::clone(&self.stats)
    }
}

impl SimulatorEnv for ScriptedSimulator {
    fn connect(&mut self, _port: u16, _step_interval: f64) -> Result<Option<Observation>, EnvError> {
        let attempt = self.stats.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failing_connects {
            return Err(EnvError::connection(format!(
                "scripted refusal {}/{}",
                attempt + 1,
                self.failing_connects
            )));
        }
        
        self.connected = true;
        self.step_index = 0;
        self.cursor = 0;
        
        let initial = self.observations.first().cloned();
        if initial.is_some() {
            self.cursor = 1;
        }
        Ok(initial)
    }
    
    fn sample_action(&mut self) -> Action {
        self.action_space.sample(&mut self.rng)
    }
    
    fn step(&mut self, _action: Action) -> Result<StepResult, EnvError> {
        if !self.connected {
            return Err(EnvError::Closed);
        }
        
        let index = self.step_index;
        self.step_index += 1;
        self.stats.steps.fetch_add(1, Ordering::SeqCst);
        
        if self.fail_at == Some(index) {
            return Err(EnvError::protocol(format!("scripted failure at step {}", index)));
        }
        if self.done_at == Some(index) {
            return Ok(StepResult::finished());
        }
        
        match self.observations.get(self.cursor) {
            Some(obs) => {
                self.cursor += 1;
                Ok(StepResult::running(obs.clone()))
            }
            None => Ok(StepResult::finished()),
        }
    }
    
    fn close(&mut self) -> Result<(), EnvError> {
        self.connected = false;
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    
    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_connect_returns_first_observation() {
        let mut sim = ScriptedSimulator::new(vec![vec![1.0], vec![2.0]]);
        let obs = sim.connect(5555, 0.1).unwrap();
        assert_eq!(obs, Some(vec![1.0]));
        
        let step = sim.step(vec![]).unwrap();
        assert_eq!(step.observation, Some(vec![2.0]));
        assert!(!step.done);
        
        // Script exhausted
        assert!(sim.step(vec![]).unwrap().done);
    }
    
    #[test]
    fn test_failing_connects() {
        let mut sim = ScriptedSimulator::new(vec![vec![0.0]]).with_failing_connects(2);
        let stats = sim.stats();
        
        assert!(sim.connect(5555, 0.1).is_err());
        assert!(sim.connect(5555, 0.1).is_err());
        assert!(sim.connect(5555, 0.1).is_ok());
        assert_eq!(stats.connect_attempts(), 3);
    }
    
    #[test]
    fn test_done_and_failure_indices() {
        let mut sim = ScriptedSimulator::linear_drive(2, 10, 5.0, 0.1).with_done_at(2);
        sim.connect(5555, 0.1).unwrap();
        assert!(!sim.step(vec![]).unwrap().done);
        assert!(!sim.step(vec![]).unwrap().done);
        assert!(sim.step(vec![]).unwrap().done);
        
        let mut sim = ScriptedSimulator::linear_drive(2, 10, 5.0, 0.1).with_failure_at(0);
        sim.connect(5555, 0.1).unwrap();
        assert!(sim.step(vec![]).is_err());
    }
    
    #[test]
    fn test_step_before_connect_is_closed() {
        let mut sim = ScriptedSimulator::new(vec![vec![0.0]]);
        assert!(matches!(sim.step(vec![]), Err(EnvError::Closed)));
    }
    
    #[test]
    fn test_linear_drive_layout() {
        let mut sim = ScriptedSimulator::linear_drive(3, 4, 10.0, 0.5);
        let initial = sim.connect(5555, 0.5).unwrap().unwrap();
        assert_eq!(initial.len(), 4 + 3 * 3);
        assert_eq!(initial[0], 3.0);
        // Vehicle 1 at (100, 50)
        assert_eq!(&initial[7..10], &[100.0, 50.0, 10.0]);
        
        let next = sim.step(vec![]).unwrap().observation.unwrap();
        // Moved 10 m/s * 0.5 s
        assert_eq!(next[4], 5.0);
    }
}
