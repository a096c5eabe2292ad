//! OpenGym Relay Client - Live Telemetry via a JSON Relay
//!
//! ns-3 OpenGym itself does not speak this protocol: the simulation binds
//! its own socket and exchanges ns3gym protobuf messages with a Python-side
//! agent. This client needs a relay in front of that endpoint which
//! translates to the JSON messages below:
//! - ZMQ REQ socket on `tcp://127.0.0.1:<port>` (the relay binds REP)
//! - JSON requests: `reset`, `step`, `close`
//! - Each reply carries `obs`, `reward`, `done` and `info`
//!
//! Every round trip is bounded by a receive timeout so an absent simulator
//! surfaces as a connection error instead of a hang.

use crate::error::EnvError;
use crate::simulator::SimulatorEnv;
use crate::types::{Action, BoxSpace, Observation, StepResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Request sent to the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeRequest {
    Reset { step_time: f64 },
    Step { action: Action },
    Close,
}

/// Reply received from the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeReply {
    #[serde(default)]
    pub obs: Option<Observation>,
    #[serde(default)]
    pub reward: f64,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub info: String,
    /// Set by the relay when it could not serve the request
    #[serde(default)]
    pub error: Option<String>,
}

impl BridgeReply {
    /// Parses a reply frame.
    pub fn from_bytes(data: &[u8]) -> Result<Self, EnvError> {
        let reply: BridgeReply = serde_json::from_slice(data)?;
        if let Some(err) = &reply.error {
            return Err(EnvError::protocol(err.clone()));
        }
        Ok(reply)
    }
    
    /// Converts into a step result.
    pub fn into_step(self) -> StepResult {
        StepResult {
            observation: self.obs,
            reward: self.reward,
            done: self.done,
            info: self.info,
        }
    }
}

/// Round-trip timeout for every request (milliseconds)
pub const DEFAULT_TIMEOUT_MS: i32 = 5_000;

// ============================================================================
// ZMQ CLIENT (opengym feature)
// ============================================================================

/// ZMQ client for the OpenGym JSON relay.
#[cfg(feature = "opengym")]
pub struct OpenGymBridge {
    context: zmq::Context,
    socket: Option<zmq::Socket>,
    timeout_ms: i32,
    action_space: BoxSpace,
    rng: StdRng,
}

#[cfg(feature = "opengym")]
impl OpenGymBridge {
    /// Creates an unconnected client.
    pub fn new() -> Self {
        Self {
            context: zmq::Context::new(),
            socket: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            action_space: BoxSpace::V2X_DEFAULT,
            rng: StdRng::from_entropy(),
        }
    }
    
    /// Sets the per-request timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: i32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
    
    fn open_socket(&self, port: u16) -> Result<zmq::Socket, EnvError> {
        let socket = self.context.socket(zmq::REQ)
            .map_err(|e| EnvError::connection(e.to_string()))?;
        
        socket.set_linger(0)
            .map_err(|e| EnvError::connection(e.to_string()))?;
        socket.set_rcvtimeo(self.timeout_ms)
            .map_err(|e| EnvError::connection(e.to_string()))?;
        socket.set_sndtimeo(self.timeout_ms)
            .map_err(|e| EnvError::connection(e.to_string()))?;
        socket.connect(&format!("tcp://127.0.0.1:{}", port))
            .map_err(|e| EnvError::connection(e.to_string()))?;
        
        Ok(socket)
    }
    
    fn request(&mut self, request: &BridgeRequest) -> Result<BridgeReply, EnvError> {
        let socket = self.socket.as_ref().ok_or(EnvError::Closed)?;
        let payload = serde_json::to_vec(request)?;
        
        let timeout = self.timeout_ms.max(0) as u64;
        let map_err = |e: zmq::Error| match e {
            zmq::Error::EAGAIN => EnvError::Timeout(timeout),
            other => EnvError::protocol(other.to_string()),
        };
        
        socket.send(payload, 0).map_err(map_err)?;
        let data = socket.recv_bytes(0).map_err(map_err)?;
        BridgeReply::from_bytes(&data)
    }
}

#[cfg(feature = "opengym")]
impl Default for OpenGymBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "opengym")]
impl SimulatorEnv for OpenGymBridge {
    fn connect(&mut self, port: u16, step_interval: f64) -> Result<Option<Observation>, EnvError> {
        // A REQ socket that timed out cannot be reused
        self.socket = Some(self.open_socket(port)?);
        debug!("OpenGym relay: reset via tcp://127.0.0.1:{} (step {}s)", port, step_interval);
        
        match self.request(&BridgeRequest::Reset { step_time: step_interval }) {
            Ok(reply) => Ok(reply.obs),
            Err(e) => {
                self.socket = None;
                Err(EnvError::connection(e.to_string()))
            }
        }
    }
    
    fn sample_action(&mut self) -> Action {
        self.action_space.sample(&mut self.rng)
    }
    
    fn step(&mut self, action: Action) -> Result<StepResult, EnvError> {
        let reply = self.request(&BridgeRequest::Step { action })?;
        Ok(reply.into_step())
    }
    
    fn close(&mut self) -> Result<(), EnvError> {
        if self.socket.is_none() {
            return Ok(());
        }
        let result = self.request(&BridgeRequest::Close).map(|_| ());
        self.socket = None;
        debug!("OpenGym relay session closed");
        result
    }
    
    fn name(&self) -> &str {
        "opengym"
    }
}

// ============================================================================
// NON-ZMQ FALLBACK (when opengym feature is disabled)
// ============================================================================

/// Stand-in client when the relay client is compiled out; never connects.
#[cfg(not(feature = "opengym"))]
pub struct OpenGymBridge {
    action_space: BoxSpace,
    rng: StdRng,
}

#[cfg(not(feature = "opengym"))]
impl OpenGymBridge {
    pub fn new() -> Self {
        Self {
            action_space: BoxSpace::V2X_DEFAULT,
            rng: StdRng::from_entropy(),
        }
    }
    
    pub fn with_timeout_ms(self, _timeout_ms: i32) -> Self {
        self
    }
}

#[cfg(not(feature = "opengym"))]
impl Default for OpenGymBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(feature = "opengym"))]
impl SimulatorEnv for OpenGymBridge {
    fn connect(&mut self, port: u16, _step_interval: f64) -> Result<Option<Observation>, EnvError> {
        debug!("OpenGym relay client disabled; not contacting port {}", port);
        Err(EnvError::connection(
            "built without the `opengym` feature (live runs need a JSON relay in front of ns-3 OpenGym)",
        ))
    }
    
    fn sample_action(&mut self) -> Action {
        self.action_space.sample(&mut self.rng)
    }
    
    fn step(&mut self, _action: Action) -> Result<StepResult, EnvError> {
        Err(EnvError::Closed)
    }
    
    fn close(&mut self) -> Result<(), EnvError> {
        Ok(())
    }
    
    fn name(&self) -> &str {
        "opengym"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_request_encoding() {
        let json = serde_json::to_string(&BridgeRequest::Reset { step_time: 0.1 }).unwrap();
        assert_eq!(json, r#"{"type":"reset","step_time":0.1}"#);
        
        let json = serde_json::to_string(&BridgeRequest::Close).unwrap();
        assert_eq!(json, r#"{"type":"close"}"#);
    }
    
    #[test]
    fn test_step_request_is_relay_json() {
        let json = serde_json::to_value(&BridgeRequest::Step { action: vec![1.0, 2.0] }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "step", "action": [1.0, 2.0]}));
        
        let back: BridgeRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, BridgeRequest::Step { action: vec![1.0, 2.0] });
    }
    
    #[test]
    fn test_reply_parsing() {
        let data = br#"{"obs": [2.0, 1.0, 0.0, 0.0, 5.0, 6.0, 7.0], "reward": 0.5, "done": false, "info": "step:1"}"#;
        let step = BridgeReply::from_bytes(data).unwrap().into_step();
        
        assert_eq!(step.observation.as_ref().map(|o| o.len()), Some(7));
        assert!(!step.done);
        assert_eq!(step.info, "step:1");
    }
    
    #[test]
    fn test_reply_defaults_and_errors() {
        let step = BridgeReply::from_bytes(br#"{"done": true}"#).unwrap().into_step();
        assert!(step.done);
        assert!(step.observation.is_none());
        
        let err = BridgeReply::from_bytes(br#"{"error": "simulation not running"}"#);
        assert!(matches!(err, Err(EnvError::ProtocolError(_))));
        
        assert!(matches!(
            BridgeReply::from_bytes(b"not json"),
            Err(EnvError::SerializationError(_))
        ));
    }
    
    #[cfg(not(feature = "opengym"))]
    #[test]
    fn test_fallback_never_connects() {
        let mut bridge = OpenGymBridge::new();
        let err = bridge.connect(5555, 0.1).unwrap_err();
        assert!(err.to_string().contains("JSON relay"));
        assert!(bridge.close().is_ok());
    }
}
