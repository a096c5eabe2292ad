//! Telemetry Codec - Simulator Observation Decoding
//!
//! The V2X simulation script reports a flat numeric vector every step:
//!
//! ```text
//! [count, avg_speed, avg_x, avg_y, x0, y0, speed0, x1, y1, speed1, ...]
//!  └──────── header (4) ───────┘  └─ vehicle slot 0 ┘ └─ slot 1 ─┘
//! ```
//!
//! Slot `i` belongs to identifier `i` of a fixed vehicle order known up
//! front; the payload carries no identifiers of its own.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Vehicle order of the SUMO FCD trace that drives the V2X simulation.
pub const DEFAULT_VEHICLE_ORDER: [&str; 7] = ["962", "971", "980", "989", "998", "1007", "1016"];

/// Number of leading aggregate values before the first vehicle slot
pub const DEFAULT_HEADER_LEN: usize = 4;

/// Values per vehicle slot (x, y, speed)
pub const SLOT_WIDTH: usize = 3;

/// State of one vehicle at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    /// Not observed by the simulator; always 0.0
    pub heading: f64,
}

impl VehicleState {
    pub fn new(id: impl Into<String>, x: f64, y: f64, speed: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            speed,
            heading: 0.0,
        }
    }
}

/// All vehicles at one instant, keyed by vehicle id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    vehicles: BTreeMap<String, VehicleState>,
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Inserts a vehicle, replacing any previous state for its id.
    pub fn insert(&mut self, state: VehicleState) {
        self.vehicles.insert(state.id.clone(), state);
    }
    
    pub fn get(&self, id: &str) -> Option<&VehicleState> {
        self.vehicles.get(id)
    }
    
    pub fn contains(&self, id: &str) -> bool {
        self.vehicles.contains_key(id)
    }
    
    pub fn len(&self) -> usize {
        self.vehicles.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
    
    /// Vehicle ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.vehicles.keys().map(String::as_str)
    }
    
    pub fn iter(&self) -> impl Iterator<Item = &VehicleState> {
        self.vehicles.values()
    }
    
    /// Pairs of (self, other) states for every id present in both.
    pub fn paired<'a>(
        &'a self,
        other: &'a StateSnapshot,
    ) -> impl Iterator<Item = (&'a VehicleState, &'a VehicleState)> + 'a {
        self.vehicles
            .iter()
            .filter_map(move |(id, state)| other.get(id).map(|o| (state, o)))
    }
}

impl FromIterator<VehicleState> for StateSnapshot {
    fn from_iter<I: IntoIterator<Item = VehicleState>>(iter: I) -> Self {
        let mut snapshot = StateSnapshot::new();
        for state in iter {
            snapshot.insert(state);
        }
        snapshot
    }
}

/// Result of decoding one observation.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// At least one vehicle decoded (possibly fewer than reported)
    Decoded(StateSnapshot),
    
    /// Nothing to decode (no observation, too short, or zero vehicles)
    Empty,
    
    /// Observation did not fit the layout
    Malformed(String),
}

impl DecodeOutcome {
    /// Collapses the outcome into a snapshot; non-decoded outcomes are empty.
    pub fn into_snapshot(self) -> StateSnapshot {
        match self {
            DecodeOutcome::Decoded(snapshot) => snapshot,
            DecodeOutcome::Empty | DecodeOutcome::Malformed(_) => StateSnapshot::new(),
        }
    }
    
    pub fn is_decoded(&self) -> bool {
        matches!(self, DecodeOutcome::Decoded(_))
    }
}

/// Decodes observation vectors into per-vehicle snapshots.
#[derive(Debug, Clone)]
pub struct TelemetryCodec {
    /// Identifier for each observation slot, in slot order
    vehicle_order: Vec<String>,
    
    /// Aggregate values before the first slot
    header_len: usize,
}

impl Default for TelemetryCodec {
    fn default() -> Self {
        Self::new(DEFAULT_VEHICLE_ORDER.iter().map(|s| s.to_string()).collect())
    }
}

impl TelemetryCodec {
    /// Creates a codec for the given slot order.
    pub fn new(vehicle_order: Vec<String>) -> Self {
        Self {
            vehicle_order,
            header_len: DEFAULT_HEADER_LEN,
        }
    }
    
    /// Overrides the header length.
    pub fn with_header_len(mut self, header_len: usize) -> Self {
        self.header_len = header_len;
        self
    }
    
    pub fn vehicle_order(&self) -> &[String] {
        &self.vehicle_order
    }
    
    /// Decodes an observation.
    ///
    /// Slots past `min(count, vehicle_order.len())` or running past the end
    /// of the vector are omitted. A malformed vector is logged and reported
    /// as `Malformed`; callers treat it like an empty snapshot.
    pub fn decode(&self, observation: Option<&[f64]>) -> DecodeOutcome {
        let obs = match observation {
            Some(obs) if obs.len() >= self.header_len.max(1) => obs,
            _ => return DecodeOutcome::Empty,
        };
        
        let count = obs[0];
        if !count.is_finite() || count < 0.0 {
            let reason = format!("invalid vehicle count {}", count);
            warn!("Telemetry decode failed: {}", reason);
            return DecodeOutcome::Malformed(reason);
        }
        
        let reported = count as usize;
        let slots = reported.min(self.vehicle_order.len());
        let mut snapshot = StateSnapshot::new();
        
        for (i, id) in self.vehicle_order.iter().take(slots).enumerate() {
            let base = self.header_len + i * SLOT_WIDTH;
            let Some(slot) = obs.get(base..base + SLOT_WIDTH) else {
                break;
            };
            
            if slot.iter().any(|v| !v.is_finite()) {
                debug!("Skipping vehicle {}: non-finite telemetry {:?}", id, slot);
                continue;
            }
            
            snapshot.insert(VehicleState::new(id.clone(), slot[0], slot[1], slot[2]));
        }
        
        if snapshot.is_empty() {
            DecodeOutcome::Empty
        } else {
            DecodeOutcome::Decoded(snapshot)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    fn obs(count: f64, slots: &[[f64; 3]]) -> Vec<f64> {
        let mut v = vec![count, 0.0, 0.0, 0.0];
        for s in slots {
            v.extend_from_slice(s);
        }
        v
    }
    
    #[test]
    fn test_decode_slots_in_order() {
        let codec = TelemetryCodec::default();
        let data = obs(2.0, &[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        
        let snapshot = codec.decode(Some(data.as_slice())).into_snapshot();
        assert_eq!(snapshot.len(), 2);
        
        let first = snapshot.get("962").unwrap();
        assert_eq!((first.x, first.y, first.speed, first.heading), (1.0, 2.0, 3.0, 0.0));
        let second = snapshot.get("971").unwrap();
        assert_eq!((second.x, second.y, second.speed), (4.0, 5.0, 6.0));
    }
    
    #[test]
    fn test_count_limits_slots() {
        let codec = TelemetryCodec::default();
        let data = obs(1.0, &[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        
        let snapshot = codec.decode(Some(data.as_slice())).into_snapshot();
        assert_eq!(snapshot.ids().collect::<Vec<_>>(), vec!["962"]);
    }
    
    #[test]
    fn test_count_beyond_known_ids() {
        let codec = TelemetryCodec::new(vec!["a".into(), "b".into()]);
        let data = obs(5.0, &[[1.0, 1.0, 1.0], [2.0, 2.0, 2.0], [3.0, 3.0, 3.0]]);
        
        let snapshot = codec.decode(Some(data.as_slice())).into_snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(!snapshot.contains("c"));
    }
    
    #[test]
    fn test_truncated_slot_omitted() {
        let codec = TelemetryCodec::default();
        let mut data = obs(2.0, &[[1.0, 2.0, 3.0]]);
        data.extend_from_slice(&[4.0, 5.0]); // second slot missing speed
        
        let snapshot = codec.decode(Some(data.as_slice())).into_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains("962"));
    }
    
    #[test]
    fn test_short_or_missing_observation_is_empty() {
        let codec = TelemetryCodec::default();
        assert_eq!(codec.decode(None), DecodeOutcome::Empty);
        assert_eq!(codec.decode(Some(&[3.0, 1.0, 2.0][..])), DecodeOutcome::Empty);
        assert_eq!(codec.decode(Some(&[0.0, 0.0, 0.0, 0.0][..])), DecodeOutcome::Empty);
    }
    
    #[test]
    fn test_malformed_count() {
        let codec = TelemetryCodec::default();
        let data = obs(f64::NAN, &[[1.0, 2.0, 3.0]]);
        assert!(matches!(codec.decode(Some(data.as_slice())), DecodeOutcome::Malformed(_)));
        
        let data = obs(-1.0, &[[1.0, 2.0, 3.0]]);
        assert!(codec.decode(Some(data.as_slice())).into_snapshot().is_empty());
    }
    
    #[test]
    fn test_paired_ids() {
        let a: StateSnapshot = vec![
            VehicleState::new("1", 0.0, 0.0, 0.0),
            VehicleState::new("2", 0.0, 0.0, 0.0),
        ].into_iter().collect();
        let b: StateSnapshot = vec![VehicleState::new("2", 1.0, 1.0, 0.0)].into_iter().collect();
        
        let pairs: Vec<_> = a.paired(&b).map(|(x, _)| x.id.as_str()).collect();
        assert_eq!(pairs, vec!["2"]);
    }
}
