//! Throttled run diagnostics.
//!
//! Owned by the synthesis loop and passed by `&mut` to whatever needs to
//! log "only the first N times".

use simguide_core::{Offset, StateSnapshot};
use tracing::info;

/// Counters that keep per-frame logging bounded.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    delta_logs: usize,
    delta_log_limit: usize,
    first_frame_logged: bool,
    base_logged: bool,
    telemetry_every: usize,
    progress_every: usize,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            delta_logs: 0,
            delta_log_limit: 5,
            first_frame_logged: false,
            base_logged: false,
            telemetry_every: 10,
            progress_every: 50,
        }
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Number of delta computations logged so far.
    pub fn delta_logs(&self) -> usize {
        self.delta_logs
    }
    
    /// Speed comparison against the reference, logged once per run.
    pub fn log_first_frame(&mut self, current: &StateSnapshot, reference: &StateSnapshot, offset: Offset) -> bool {
        if self.first_frame_logged {
            return false;
        }
        
        let changes: Vec<_> = current
            .paired(reference)
            .filter(|(_, start)| start.speed > 0.01)
            .take(3)
            .collect();
        if changes.is_empty() {
            return false;
        }
        self.first_frame_logged = true;
        
        info!("🔍 First frame speed analysis:");
        for (now, start) in changes {
            info!(
                "   vehicle {}: {:.2}m/s → {:.2}m/s (ratio: {:.2}x)",
                now.id,
                start.speed,
                now.speed,
                now.speed / start.speed
            );
        }
        info!("   mean position delta: dx={:.2}m, dy={:.2}m (clamped)", offset.dx, offset.dy);
        true
    }
    
    /// Delta computation detail for the first few applications.
    pub fn log_delta(&mut self, current: &StateSnapshot, reference: &StateSnapshot, offset: Offset) -> bool {
        if self.delta_logs >= self.delta_log_limit {
            return false;
        }
        self.delta_logs += 1;
        
        info!("🔍 Delta computation (log {}/{}):", self.delta_logs, self.delta_log_limit);
        info!("   current states: {}, reference states: {}", current.len(), reference.len());
        if let Some(sample) = current.iter().next() {
            info!("   sample vehicle {}: now=({:.2}, {:.2})", sample.id, sample.x, sample.y);
            if let Some(start) = reference.get(&sample.id) {
                info!(
                    "     reference=({:.2}, {:.2}) delta=({:.2}, {:.2})",
                    start.x,
                    start.y,
                    sample.x - start.x,
                    sample.y - start.y
                );
            }
        }
        info!("   applied offset: dx={:.3}, dy={:.3}", offset.dx, offset.dy);
        true
    }
    
    /// Template vehicle states of the very first frame.
    pub fn log_base_snapshot(&mut self, base: &StateSnapshot) -> bool {
        if self.base_logged || base.is_empty() {
            return false;
        }
        self.base_logged = true;
        
        info!("🔍 Template first-frame base states:");
        for state in base.iter().take(3) {
            info!(
                "   vehicle {}: pos=({:.2}, {:.2}), speed={:.2} m/s",
                state.id, state.x, state.y, state.speed
            );
        }
        true
    }
    
    /// Periodic telemetry check (every `telemetry_every` frames).
    pub fn log_telemetry(&mut self, frame_index: usize, target: usize, current: &StateSnapshot, reference: &StateSnapshot) -> bool {
        if frame_index % self.telemetry_every != 0 || current.is_empty() {
            return false;
        }
        
        info!("📍 Frame {}/{}: telemetry check", frame_index, target);
        for state in current.iter().take(2) {
            let (rx, ry) = reference
                .get(&state.id)
                .map(|r| (r.x, r.y))
                .unwrap_or((0.0, 0.0));
            info!(
                "  vehicle {}: pos=({:.1},{:.1}), delta=({:.1},{:.1}m), speed={:.1}m/s",
                state.id,
                state.x,
                state.y,
                state.x - rx,
                state.y - ry,
                state.speed
            );
        }
        true
    }
    
    /// Progress line on the first frame and every `progress_every` frames.
    pub fn log_progress(
        &mut self,
        frame_index: usize,
        target: usize,
        source_index: usize,
        source_count: usize,
        telemetry_active: bool,
    ) -> bool {
        if frame_index != 0 && (frame_index + 1) % self.progress_every != 0 {
            return false;
        }
        
        let percent = (frame_index + 1) as f64 / target.max(1) as f64 * 100.0;
        info!("⏳ Progress: {}/{} frames ({:.1}%)", frame_index + 1, target, percent);
        info!("   template frame {}/{} (cycling)", source_index, source_count);
        if telemetry_active {
            info!("   simulator: ✅ active");
        } else {
            info!("   simulator: ⚠️ disconnected or static mode");
        }
        true
    }
}
