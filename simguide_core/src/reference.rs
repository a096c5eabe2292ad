//! Reference Tracker - the zero point for all telemetry deltas.

use crate::telemetry::StateSnapshot;
use tracing::{info, warn};

/// Holds the simulator's first observation for the whole run.
///
/// Capture happens once, right after the handshake. Until then `get()`
/// returns an empty snapshot, so every delta degrades to "no offset".
#[derive(Debug, Default)]
pub struct ReferenceTracker {
    snapshot: StateSnapshot,
    captured: bool,
}

impl ReferenceTracker {
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Stores a copy of `snapshot` as the reference.
    ///
    /// Returns `false` (and keeps the original) if a reference was already
    /// captured.
    pub fn capture(&mut self, snapshot: &StateSnapshot) -> bool {
        if self.captured {
            warn!("Reference snapshot already captured; ignoring recapture");
            return false;
        }
        
        self.snapshot = snapshot.clone();
        self.captured = true;
        
        info!("🔍 Reference snapshot captured ({} vehicles)", self.snapshot.len());
        for state in self.snapshot.iter().take(3) {
            info!(
                "   vehicle {}: pos=({:.2}, {:.2}), speed={:.2} m/s",
                state.id, state.x, state.y, state.speed
            );
        }
        true
    }
    
    /// Returns the reference snapshot (empty before capture).
    pub fn get(&self) -> &StateSnapshot {
        &self.snapshot
    }
    
    pub fn is_captured(&self) -> bool {
        self.captured
    }
}
