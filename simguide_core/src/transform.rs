//! Delta Transform - telemetry deltas applied to scenes and point clouds.
//!
//! The offset is the mean displacement of every vehicle seen both now and
//! in the reference snapshot, clamped per axis. Clamping is a hard ceiling:
//! values inside the bound pass through, values outside are pinned to it.

use crate::scene::{shift_planar, SceneFrame};
use crate::telemetry::StateSnapshot;
use nalgebra::Vector3;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// Default per-axis offset ceiling (scene meters).
///
/// Keeps shifted geometry inside the detector's lidar range.
pub const DEFAULT_MAX_OFFSET: f64 = 20.0;

/// Planar correction `(dx, dy)` in scene units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    pub dx: f64,
    pub dy: f64,
}

impl Offset {
    pub const ZERO: Offset = Offset { dx: 0.0, dy: 0.0 };
    
    pub fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }
    
    /// Clamps each axis independently to `±max`.
    pub fn clamped(self, max: f64) -> Self {
        Self {
            dx: clamp_axis(self.dx, max),
            dy: clamp_axis(self.dy, max),
        }
    }
    
    pub fn is_zero(&self) -> bool {
        self.dx == 0.0 && self.dy == 0.0
    }
}

/// Pins `value` to `±max` when it exceeds the bound, keeping its sign.
pub fn clamp_axis(value: f64, max: f64) -> f64 {
    if value.abs() > max {
        max.copysign(value)
    } else {
        value
    }
}

/// What `apply_to_scene` changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneUpdate {
    pub ego_fields: usize,
    pub camera_fields: usize,
    pub vehicles_moved: usize,
    pub speeds_overwritten: usize,
}

/// Converts snapshot deltas into offsets and applies them.
#[derive(Debug, Clone, Copy)]
pub struct DeltaTransform {
    max_offset: f64,
}

impl Default for DeltaTransform {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OFFSET)
    }
}

impl DeltaTransform {
    pub fn new(max_offset: f64) -> Self {
        Self { max_offset }
    }
    
    pub fn max_offset(&self) -> f64 {
        self.max_offset
    }
    
    /// Mean displacement of all vehicles in both snapshots, clamped.
    ///
    /// Zero when the snapshots share no vehicle.
    pub fn compute_offset(&self, current: &StateSnapshot, reference: &StateSnapshot) -> Offset {
        let (mut sum_dx, mut sum_dy, mut n) = (0.0, 0.0, 0usize);
        for (now, start) in current.paired(reference) {
            sum_dx += now.x - start.x;
            sum_dy += now.y - start.y;
            n += 1;
        }
        
        if n == 0 {
            return Offset::ZERO;
        }
        
        Offset::new(sum_dx / n as f64, sum_dy / n as f64).clamped(self.max_offset)
    }
    
    /// Displacement of one vehicle, clamped; `None` unless it is in both.
    pub fn vehicle_offset(&self, id: &str, current: &StateSnapshot, reference: &StateSnapshot) -> Option<Offset> {
        let now = current.get(id)?;
        let start = reference.get(id)?;
        Some(Offset::new(now.x - start.x, now.y - start.y).clamped(self.max_offset))
    }
    
    /// Shifts a scene frame.
    ///
    /// Ego poses and camera poses move by `offset`. Each vehicle known to
    /// the frame, `current` and `reference` moves by its own offset and
    /// takes the simulator's current speed. Absent fields stay absent.
    pub fn apply_to_scene(
        &self,
        frame: &mut SceneFrame,
        offset: Offset,
        current: &StateSnapshot,
        reference: &StateSnapshot,
    ) -> SceneUpdate {
        let mut update = SceneUpdate::default();
        
        for pose in frame.ego_poses_mut() {
            if shift_planar(pose, offset.dx, offset.dy) {
                update.ego_fields += 1;
            }
        }
        
        for cords in frame.camera_cords_mut() {
            if shift_planar(cords, offset.dx, offset.dy) {
                update.camera_fields += 1;
            }
        }
        
        for (id, record) in frame.vehicles_mut() {
            let (Some(delta), Some(live)) = (self.vehicle_offset(&id, current, reference), current.get(&id)) else {
                continue;
            };
            
            if let Some(location) = record.get_mut("location") {
                if shift_planar(location, delta.dx, delta.dy) {
                    update.vehicles_moved += 1;
                }
            }
            
            // A present key is overwritten whatever it held; an absent one stays absent
            if let Some(speed) = record.get_mut("speed") {
                *speed = Value::from(live.speed);
                update.speeds_overwritten += 1;
            }
        }
        
        update
    }
    
    /// Shifts every point by `(dx, dy, 0)` and adds N(0, σ²) noise to all
    /// three ordinates when `noise_std > 0`.
    pub fn apply_to_points<R: Rng + ?Sized>(
        &self,
        points: &mut [Vector3<f64>],
        offset: Offset,
        noise_std: f64,
        rng: &mut R,
    ) {
        let shift = Vector3::new(offset.dx, offset.dy, 0.0);
        for p in points.iter_mut() {
            *p += shift;
        }
        
        if noise_std <= 0.0 {
            return;
        }
        
        if let Ok(normal) = Normal::new(0.0, noise_std) {
            for p in points.iter_mut() {
                p.x += normal.sample(rng);
                p.y += normal.sample(rng);
                p.z += normal.sample(rng);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::numbers;
    use crate::telemetry::VehicleState;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde_yaml::Mapping;
    
    fn snapshot(states: &[(&str, f64, f64, f64)]) -> StateSnapshot {
        states
            .iter()
            .map(|&(id, x, y, speed)| VehicleState::new(id, x, y, speed))
            .collect()
    }
    
    fn frame_with_vehicle(id: i64, location: Vec<f64>, speed: Option<f64>) -> SceneFrame {
        let mut vehicle = Mapping::new();
        vehicle.insert("location".into(), Value::from(location));
        if let Some(speed) = speed {
            vehicle.insert("speed".into(), Value::from(speed));
        }
        let mut vehicles = Mapping::new();
        vehicles.insert(Value::from(id), Value::Mapping(vehicle));
        
        let mut frame = SceneFrame::from_yaml_str(
            "lidar_pose: [10.0, 20.0, 1.9, 0.0, 0.0, 0.0]\n\
             true_ego_pos: [10.0, 20.0]\n\
             camera0:\n  cords: [1.0, 2.0, 3.0]\n\
             camera2:\n  cords: [4.0]\n",
        )
        .unwrap();
        frame.insert("vehicles", Value::Mapping(vehicles));
        frame
    }
    
    fn pose(frame: &SceneFrame, key: &str) -> Option<Vec<f64>> {
        frame.get(key).and_then(numbers)
    }
    
    fn cords(frame: &SceneFrame, camera: &str) -> Option<Vec<f64>> {
        frame.get(camera)?.get("cords").and_then(numbers)
    }
    
    fn location(frame: &SceneFrame, id: &str) -> Option<Vec<f64>> {
        frame.vehicle(id)?.get("location").and_then(numbers)
    }
    
    fn speed(frame: &SceneFrame, id: &str) -> Option<f64> {
        frame.vehicle(id)?.get("speed")?.as_f64()
    }
    
    #[test]
    fn test_offset_is_mean_of_deltas() {
        let transform = DeltaTransform::default();
        let reference = snapshot(&[("a", 0.0, 0.0, 0.0), ("b", 10.0, 10.0, 0.0)]);
        let current = snapshot(&[("a", 2.0, -1.0, 0.0), ("b", 14.0, 11.0, 0.0), ("c", 99.0, 99.0, 0.0)]);
        
        let offset = transform.compute_offset(&current, &reference);
        assert_relative_eq!(offset.dx, 3.0);
        assert_relative_eq!(offset.dy, 0.0);
    }
    
    #[test]
    fn test_offset_clamped_not_rescaled() {
        let transform = DeltaTransform::new(20.0);
        let reference = snapshot(&[("a", 0.0, 0.0, 0.0)]);
        let current = snapshot(&[("a", 50.0, -7.5, 0.0)]);
        
        let offset = transform.compute_offset(&current, &reference);
        assert_eq!(offset, Offset::new(20.0, -7.5));
        
        let current = snapshot(&[("a", -31.0, 25.0, 0.0)]);
        assert_eq!(transform.compute_offset(&current, &reference), Offset::new(-20.0, 20.0));
    }
    
    #[test]
    fn test_empty_reference_yields_zero() {
        let transform = DeltaTransform::default();
        let current = snapshot(&[("a", 5.0, 5.0, 1.0)]);
        assert_eq!(transform.compute_offset(&current, &StateSnapshot::new()), Offset::ZERO);
    }
    
    #[test]
    fn test_apply_to_scene_moves_present_fields() {
        let transform = DeltaTransform::default();
        let reference = snapshot(&[("962", 0.0, 0.0, 5.0)]);
        let current = snapshot(&[("962", 3.0, 4.0, 11.0)]);
        let offset = transform.compute_offset(&current, &reference);
        
        let mut frame = frame_with_vehicle(962, vec![100.0, 200.0, 0.5], Some(0.0));
        let update = transform.apply_to_scene(&mut frame, offset, &current, &reference);
        
        assert_eq!(update.ego_fields, 2);
        assert_eq!(update.camera_fields, 1);
        assert_eq!(pose(&frame, "lidar_pose").unwrap()[..3], [13.0, 24.0, 1.9]);
        assert_eq!(pose(&frame, "true_ego_pos"), Some(vec![13.0, 24.0]));
        assert!(!frame.contains("predicted_ego_pos"));
        assert_eq!(cords(&frame, "camera0"), Some(vec![4.0, 6.0, 3.0]));
        // Too short to shift
        assert_eq!(cords(&frame, "camera2"), Some(vec![4.0]));
        assert!(!frame.contains("camera1"));
        
        assert_eq!(location(&frame, "962"), Some(vec![103.0, 204.0, 0.5]));
        assert_eq!(speed(&frame, "962"), Some(11.0));
    }
    
    #[test]
    fn test_per_vehicle_offset_not_averaged() {
        let transform = DeltaTransform::default();
        let reference = snapshot(&[("962", 0.0, 0.0, 0.0), ("971", 0.0, 0.0, 0.0)]);
        let current = snapshot(&[("962", 2.0, 0.0, 1.0), ("971", 8.0, 0.0, 1.0)]);
        let offset = transform.compute_offset(&current, &reference);
        assert_relative_eq!(offset.dx, 5.0);
        
        let mut frame = frame_with_vehicle(971, vec![0.0, 0.0], Some(3.0));
        transform.apply_to_scene(&mut frame, offset, &current, &reference);
        
        assert_eq!(location(&frame, "971"), Some(vec![8.0, 0.0]));
    }
    
    #[test]
    fn test_identical_coordinates_still_overwrite_speed() {
        let transform = DeltaTransform::default();
        let reference = snapshot(&[("962", 7.0, 7.0, 4.0)]);
        let current = snapshot(&[("962", 7.0, 7.0, 4.0)]);
        
        let mut frame = frame_with_vehicle(962, vec![1.0, 2.0, 0.0], Some(0.0));
        let update = transform.apply_to_scene(&mut frame, Offset::ZERO, &current, &reference);
        
        assert_eq!(location(&frame, "962"), Some(vec![1.0, 2.0, 0.0]));
        assert_eq!(speed(&frame, "962"), Some(4.0));
        assert_eq!(update.speeds_overwritten, 1);
    }
    
    #[test]
    fn test_absent_speed_not_created() {
        let transform = DeltaTransform::default();
        let reference = snapshot(&[("962", 0.0, 0.0, 0.0)]);
        let current = snapshot(&[("962", 1.0, 1.0, 9.0)]);
        
        let mut frame = frame_with_vehicle(962, vec![0.0, 0.0], None);
        transform.apply_to_scene(&mut frame, Offset::ZERO, &current, &reference);
        
        assert!(frame.vehicle("962").unwrap().get("speed").is_none());
    }
    
    #[test]
    fn test_vehicle_without_telemetry_untouched() {
        let transform = DeltaTransform::default();
        let reference = snapshot(&[("962", 0.0, 0.0, 0.0)]);
        let current = snapshot(&[("962", 5.0, 5.0, 9.0)]);
        
        let mut frame = frame_with_vehicle(1016, vec![1.0, 1.0], Some(2.0));
        let update = transform.apply_to_scene(&mut frame, Offset::new(5.0, 5.0), &current, &reference);
        
        assert_eq!(update.vehicles_moved, 0);
        assert_eq!(location(&frame, "1016"), Some(vec![1.0, 1.0]));
        assert_eq!(speed(&frame, "1016"), Some(2.0));
    }
    
    #[test]
    fn test_null_and_non_list_fields_left_alone() {
        let transform = DeltaTransform::default();
        let reference = snapshot(&[("962", 0.0, 0.0, 0.0)]);
        let current = snapshot(&[("962", 1.0, 1.0, 6.0)]);
        let mut frame = SceneFrame::from_yaml_str(
            "lidar_pose: unknown\npredicted_ego_pos: null\ntrue_ego_pos: [0.0, 0.0]\n\
             vehicles:\n  962:\n    location: null\n    speed: null\n",
        )
        .unwrap();
        
        let update = transform.apply_to_scene(&mut frame, Offset::new(1.0, 1.0), &current, &reference);
        
        assert_eq!(update.ego_fields, 1);
        assert_eq!(update.vehicles_moved, 0);
        assert_eq!(frame.get("lidar_pose"), Some(&Value::from("unknown")));
        assert_eq!(frame.get("predicted_ego_pos"), Some(&Value::Null));
        assert_eq!(frame.vehicle("962").unwrap().get("location"), Some(&Value::Null));
        // The key was present, so it takes the live speed
        assert_eq!(speed(&frame, "962"), Some(6.0));
    }
    
    #[test]
    fn test_points_noise_is_seeded() {
        let transform = DeltaTransform::default();
        let base = vec![Vector3::new(1.0, 1.0, 1.0); 50];
        
        let mut a = base.clone();
        let mut b = base.clone();
        transform.apply_to_points(&mut a, Offset::new(1.0, 0.0), 0.03, &mut ChaCha8Rng::seed_from_u64(42));
        transform.apply_to_points(&mut b, Offset::new(1.0, 0.0), 0.03, &mut ChaCha8Rng::seed_from_u64(42));
        
        assert_eq!(a, b);
        assert!(a.iter().any(|p| p.z != 1.0));
        
        let mean_x = a.iter().map(|p| p.x).sum::<f64>() / a.len() as f64;
        assert!((mean_x - 2.0).abs() < 0.05);
    }
    
    proptest! {
        #[test]
        fn prop_disjoint_snapshots_give_zero(
            xs in proptest::collection::vec((-500.0f64..500.0, -500.0f64..500.0), 1..6),
            ys in proptest::collection::vec((-500.0f64..500.0, -500.0f64..500.0), 1..6),
        ) {
            let current: StateSnapshot = xs.iter().enumerate()
                .map(|(i, &(x, y))| VehicleState::new(format!("c{}", i), x, y, 0.0))
                .collect();
            let reference: StateSnapshot = ys.iter().enumerate()
                .map(|(i, &(x, y))| VehicleState::new(format!("r{}", i), x, y, 0.0))
                .collect();
            
            prop_assert_eq!(DeltaTransform::default().compute_offset(&current, &reference), Offset::ZERO);
        }
        
        #[test]
        fn prop_clamp_pins_to_bound(value in -1.0e4f64..1.0e4, max in 0.1f64..100.0) {
            let clamped = clamp_axis(value, max);
            if value.abs() > max {
                prop_assert_eq!(clamped.abs(), max);
                prop_assert_eq!(clamped.signum(), value.signum());
            } else {
                prop_assert_eq!(clamped, value);
            }
        }
        
        #[test]
        fn prop_points_translate_exactly_without_noise(
            pts in proptest::collection::vec((-100.0f64..100.0, -100.0f64..100.0, -5.0f64..5.0), 0..40),
            dx in -20.0f64..20.0,
            dy in -20.0f64..20.0,
        ) {
            let input: Vec<Vector3<f64>> = pts.iter().map(|&(x, y, z)| Vector3::new(x, y, z)).collect();
            let mut output = input.clone();
            DeltaTransform::default().apply_to_points(&mut output, Offset::new(dx, dy), 0.0, &mut ChaCha8Rng::seed_from_u64(1));
            
            for (before, after) in input.iter().zip(&output) {
                prop_assert_eq!(*after, before + Vector3::new(dx, dy, 0.0));
            }
        }
    }
}
