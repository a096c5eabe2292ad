//! Run configuration.

use crate::error::AugmentError;
use serde::{Deserialize, Serialize};
use simguide_core::link::RetryPolicy;
use simguide_core::telemetry::{DEFAULT_HEADER_LEN, DEFAULT_VEHICLE_ORDER};
use simguide_core::transform::DEFAULT_MAX_OFFSET;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for an augmentation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    /// Template dataset root (`<root>/<vehicleId>/<frame>.yaml`)
    pub source: PathBuf,
    
    /// Directory that receives the output scenario
    pub output_dir: PathBuf,
    
    /// Output scenario name (subdirectory of `output_dir`)
    pub scenario_name: String,
    
    /// Simulator port on localhost
    pub port: u16,
    
    /// Simulated run length in seconds
    pub sim_time: f64,
    
    /// Simulated seconds per step
    pub step_time: f64,
    
    /// Point noise standard deviation (meters, 0 disables)
    pub noise_std: f64,
    
    /// Link template imagery into the output on the first frame
    pub copy_images: bool,
    
    /// Per-axis offset ceiling (meters)
    pub max_offset: f64,
    
    /// Simulator connect attempts before degrading
    pub connect_attempts: usize,
    
    /// Wait between connect attempts (seconds)
    pub connect_backoff_secs: f64,
    
    /// Vehicle id for each observation slot
    pub vehicle_order: Vec<String>,
    
    /// Aggregate values before the first observation slot
    pub header_len: usize,
    
    /// Noise seed (0 = from OS entropy)
    pub seed: u64,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            output_dir: PathBuf::new(),
            scenario_name: String::new(),
            port: 5555,
            sim_time: 120.0,
            step_time: 0.1,
            noise_std: 0.03,
            copy_images: true,
            max_offset: DEFAULT_MAX_OFFSET,
            connect_attempts: 15,
            connect_backoff_secs: 2.0,
            vehicle_order: DEFAULT_VEHICLE_ORDER.iter().map(|s| s.to_string()).collect(),
            header_len: DEFAULT_HEADER_LEN,
            seed: 0,
        }
    }
}

impl AugmentConfig {
    /// Creates a configuration with default simulator settings.
    pub fn new(
        source: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        scenario_name: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            output_dir: output_dir.into(),
            scenario_name: scenario_name.into(),
            ..Default::default()
        }
    }
    
    /// Loads a configuration from a YAML file; missing keys take defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, AugmentError> {
        let text = std::fs::read_to_string(path).map_err(|e| AugmentError::io(path, e))?;
        serde_yaml::from_str(&text).map_err(|source| AugmentError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }
    
    /// Sets the simulator port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
    
    /// Sets simulation length and step interval.
    pub fn with_timing(mut self, sim_time: f64, step_time: f64) -> Self {
        self.sim_time = sim_time;
        self.step_time = step_time;
        self
    }
    
    /// Sets the point noise standard deviation.
    pub fn with_noise(mut self, noise_std: f64) -> Self {
        self.noise_std = noise_std;
        self
    }
    
    /// Enables or disables imagery linking.
    pub fn with_images(mut self, copy_images: bool) -> Self {
        self.copy_images = copy_images;
        self
    }
    
    /// Sets the connect retry budget.
    pub fn with_connect_retry(mut self, attempts: usize, backoff_secs: f64) -> Self {
        self.connect_attempts = attempts;
        self.connect_backoff_secs = backoff_secs;
        self
    }
    
    /// Sets the noise seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
    
    /// Output scenario root.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.scenario_name)
    }
    
    /// Number of frames a full simulator run produces.
    pub fn expected_simulator_frames(&self) -> usize {
        // Absorb representation error (0.3 / 0.1 = 2.9999999999999996)
        (self.sim_time / self.step_time + 1e-9).floor() as usize
    }
    
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.connect_attempts,
            backoff: Duration::from_secs_f64(self.connect_backoff_secs.max(0.0)),
        }
    }
    
    /// Rejects settings the run cannot proceed with.
    pub fn validate(&self) -> Result<(), AugmentError> {
        if self.source.as_os_str().is_empty() {
            return Err(AugmentError::config("source path is empty"));
        }
        if self.scenario_name.trim().is_empty() {
            return Err(AugmentError::config("scenario name is empty"));
        }
        if !(self.step_time > 0.0 && self.step_time.is_finite()) {
            return Err(AugmentError::config(format!("step time must be positive, got {}", self.step_time)));
        }
        if !(self.sim_time >= 0.0 && self.sim_time.is_finite()) {
            return Err(AugmentError::config(format!("sim time must be non-negative, got {}", self.sim_time)));
        }
        if !(self.noise_std >= 0.0 && self.noise_std.is_finite()) {
            return Err(AugmentError::config(format!("noise std must be non-negative, got {}", self.noise_std)));
        }
        if !(self.max_offset > 0.0) {
            return Err(AugmentError::config(format!("max offset must be positive, got {}", self.max_offset)));
        }
        if self.connect_attempts == 0 {
            return Err(AugmentError::config("connect attempts must be at least 1"));
        }
        if !(self.connect_backoff_secs >= 0.0 && self.connect_backoff_secs.is_finite()) {
            return Err(AugmentError::config("connect backoff must be a non-negative number of seconds"));
        }
        if self.vehicle_order.is_empty() {
            return Err(AugmentError::config("vehicle order is empty"));
        }
        Ok(())
    }
}
