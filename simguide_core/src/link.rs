//! Simulator Link - connect / retry / step / close lifecycle.
//!
//! ```text
//! DISCONNECTED ──connect()──► CONNECTING ──ok──► CONNECTED ◄──► STEPPING
//!                                  │                 │             │
//!                           retries exhausted      close()    step raised
//!                                  ▼                 ▼             ▼
//!                              DEGRADED            CLOSED       DEGRADED
//! ```
//!
//! Degradation is a normal operating mode: the caller keeps producing
//! frames without telemetry.

use crate::reference::ReferenceTracker;
use crate::telemetry::{DecodeOutcome, TelemetryCodec};
use simguide_env::SimulatorEnv;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Stepping,
    Closed,
    Degraded,
}

/// Connection retry budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total connect attempts
    pub max_attempts: usize,
    
    /// Wait between failed attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            backoff: Duration::from_secs(2),
        }
    }
}

/// Result of one `step()` call.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Simulator advanced; carries the decoded observation
    Advanced(DecodeOutcome),
    
    /// Simulator finished its run; request no further frames
    Finished,
    
    /// Step raised; the link is now degraded
    Failed(String),
    
    /// Link is not connected (never connected, degraded, or closed)
    Unavailable,
}

/// Owns the simulator session for one run.
///
/// The session is released exactly once, either through `close()` or when
/// the link is dropped.
pub struct SimulatorLink<S: SimulatorEnv> {
    env: S,
    codec: TelemetryCodec,
    retry: RetryPolicy,
    port: u16,
    step_interval: f64,
    state: LinkState,
    
    /// Set once the session was touched and must be released
    needs_release: bool,
    released: bool,
    steps_taken: usize,
}

impl<S: SimulatorEnv> SimulatorLink<S> {
    /// Creates a disconnected link.
    pub fn new(env: S, codec: TelemetryCodec, port: u16, step_interval: f64) -> Self {
        Self {
            env,
            codec,
            retry: RetryPolicy::default(),
            port,
            step_interval,
            state: LinkState::Disconnected,
            needs_release: false,
            released: false,
            steps_taken: 0,
        }
    }
    
    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
    
    pub fn state(&self) -> LinkState {
        self.state
    }
    
    pub fn is_connected(&self) -> bool {
        matches!(self.state, LinkState::Connected | LinkState::Stepping)
    }
    
    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }
    
    pub fn codec(&self) -> &TelemetryCodec {
        &self.codec
    }
    
    /// Establishes the session and captures the reference snapshot.
    ///
    /// Returns `false` once the retry budget is spent; the link is then
    /// degraded and the run continues without telemetry.
    pub fn connect(&mut self, reference: &mut ReferenceTracker) -> bool {
        if self.state != LinkState::Disconnected {
            warn!("connect() called in state {:?}", self.state);
            return self.is_connected();
        }
        
        self.state = LinkState::Connecting;
        let max_attempts = self.retry.max_attempts.max(1);
        
        for attempt in 1..=max_attempts {
            info!(
                "Simulator connection attempt ({}/{}) via {} on port {}...",
                attempt,
                max_attempts,
                self.env.name(),
                self.port
            );
            
            self.needs_release = true;
            let failure = match self.env.connect(self.port, self.step_interval) {
                Ok(Some(observation)) => {
                    self.state = LinkState::Connected;
                    info!(
                        "✅ Simulator connected (port {}), observation length {}",
                        self.port,
                        observation.len()
                    );
                    
                    let snapshot = self.codec.decode(Some(observation.as_slice())).into_snapshot();
                    reference.capture(&snapshot);
                    return true;
                }
                Ok(None) => {
                    // Session opened without an observation; start over
                    if let Err(e) = self.env.close() {
                        debug!("Release after empty handshake failed: {}", e);
                    }
                    self.needs_release = false;
                    "no initial observation".to_string()
                }
                Err(e) => e.to_string(),
            };
            
            if attempt < max_attempts {
                info!(
                    "   connection failed, retrying in {:?}... ({})",
                    self.retry.backoff, failure
                );
                std::thread::sleep(self.retry.backoff);
            } else {
                warn!("Simulator connection failed, switching to static mode: {}", failure);
            }
        }
        
        self.state = LinkState::Degraded;
        false
    }
    
    /// Advances the simulator by one step.
    ///
    /// A raised step degrades the link for the rest of the run; it is
    /// never retried.
    pub fn step(&mut self) -> StepOutcome {
        if self.state != LinkState::Connected {
            return StepOutcome::Unavailable;
        }
        
        self.state = LinkState::Stepping;
        let action = self.env.sample_action();
        
        match self.env.step(action) {
            Ok(result) => {
                self.state = LinkState::Connected;
                self.steps_taken += 1;
                
                if result.done {
                    StepOutcome::Finished
                } else {
                    StepOutcome::Advanced(self.codec.decode(result.observation.as_deref()))
                }
            }
            Err(e) => {
                self.state = LinkState::Degraded;
                warn!("Simulator step {} failed: {}", self.steps_taken, e);
                StepOutcome::Failed(e.to_string())
            }
        }
    }
    
    /// Releases the session. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        
        if self.needs_release {
            match self.env.close() {
                Ok(()) => debug!("Simulator session released"),
                Err(e) => debug!("Simulator close failed (ignored): {}", e),
            }
        }
        
        if self.state != LinkState::Degraded {
            self.state = LinkState::Closed;
        }
    }
}

impl<S: SimulatorEnv> Drop for SimulatorLink<S> {
    fn drop(&mut self) {
        self.close();
    }
}
