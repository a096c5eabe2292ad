//! Scene Records - per-vehicle YAML frames.
//!
//! A frame is kept as the YAML mapping it was read from, in file order.
//! The fields the transform touches are reached through typed accessors;
//! a field that is absent, `null`, not a list, or too short is simply not
//! updated. Everything is written back as read, `null`s included.

use crate::error::{CoreError, Result};
use crate::telemetry::{StateSnapshot, VehicleState};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::Path;

/// Ego pose fields, each `[x, y, z, roll, yaw, pitch]`.
pub const EGO_POSE_FIELDS: [&str; 3] = ["lidar_pose", "predicted_ego_pos", "true_ego_pos"];

/// Camera blocks carrying a `cords` pose.
pub const CAMERA_FIELDS: [&str; 4] = ["camera0", "camera1", "camera2", "camera3"];

/// Key of the per-vehicle mapping.
pub const VEHICLES_FIELD: &str = "vehicles";

/// One frame of one vehicle's scene description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneFrame {
    fields: Mapping,
}

impl From<Mapping> for SceneFrame {
    fn from(fields: Mapping) -> Self {
        Self { fields }
    }
}

impl SceneFrame {
    /// Parses a frame from YAML text.
    pub fn from_yaml_str(text: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Sets a top-level field, keeping its position if it already exists.
    pub fn insert(&mut self, key: &str, value: Value) {
        self.fields.insert(Value::from(key), value);
    }

    /// Ego pose fields that are present (any value).
    pub fn ego_poses_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        self.fields
            .iter_mut()
            .filter(|(key, _)| key.as_str().map_or(false, |k| EGO_POSE_FIELDS.contains(&k)))
            .map(|(_, value)| value)
    }

    /// Camera `cords` fields that are present (any value).
    pub fn camera_cords_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        self.fields
            .iter_mut()
            .filter(|(key, _)| key.as_str().map_or(false, |k| CAMERA_FIELDS.contains(&k)))
            .filter_map(|(_, camera)| camera.get_mut("cords"))
    }

    /// Vehicle entries that are mappings, with their telemetry ids.
    pub fn vehicles_mut(&mut self) -> impl Iterator<Item = (String, &mut Mapping)> {
        self.fields
            .get_mut(VEHICLES_FIELD)
            .and_then(Value::as_mapping_mut)
            .into_iter()
            .flat_map(|vehicles| vehicles.iter_mut())
            .filter_map(|(key, record)| Some((vehicle_id(key)?, record.as_mapping_mut()?)))
    }

    /// Looks up a vehicle entry by telemetry id.
    pub fn vehicle(&self, id: &str) -> Option<&Mapping> {
        self.fields
            .get(VEHICLES_FIELD)?
            .as_mapping()?
            .iter()
            .find(|(key, _)| vehicle_id(key).as_deref() == Some(id))
            .and_then(|(_, record)| record.as_mapping())
    }

    /// The frame's own vehicle states (location x/y and speed).
    ///
    /// Non-numeric ordinates read as 0.0, a missing speed as 0.0. Vehicles
    /// without a list location are skipped.
    pub fn base_snapshot(&self) -> StateSnapshot {
        let Some(vehicles) = self.fields.get(VEHICLES_FIELD).and_then(Value::as_mapping) else {
            return StateSnapshot::new();
        };

        vehicles
            .iter()
            .filter_map(|(key, record)| {
                let location = record.get("location")?.as_sequence()?;
                let ordinate = |i: usize| location.get(i).and_then(Value::as_f64).unwrap_or(0.0);
                let speed = record.get("speed").and_then(Value::as_f64).unwrap_or(0.0);
                Some(VehicleState::new(vehicle_id(key)?, ordinate(0), ordinate(1), speed))
            })
            .collect()
    }
}

/// Telemetry id of a vehicle key (`962:` or `"962":`).
pub fn vehicle_id(key: &Value) -> Option<String> {
    match key {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Reads a list of numbers; `None` if the value is not one.
pub fn numbers(value: &Value) -> Option<Vec<f64>> {
    value.as_sequence()?.iter().map(Value::as_f64).collect()
}

/// Adds `(dx, dy)` to the first two ordinates of a list.
///
/// Returns `false` and leaves `value` alone unless it is a list whose
/// first two entries are numbers.
pub fn shift_planar(value: &mut Value, dx: f64, dy: f64) -> bool {
    let Some(coords) = value.as_sequence_mut() else {
        return false;
    };
    let (Some(x), Some(y)) = (
        coords.first().and_then(Value::as_f64),
        coords.get(1).and_then(Value::as_f64),
    ) else {
        return false;
    };

    coords[0] = Value::from(x + dx);
    coords[1] = Value::from(y + dy);
    true
}

/// Loads and saves scene records.
pub trait SceneStore {
    /// File extension of scene records (without the dot).
    fn extension(&self) -> &str;

    fn load(&self, path: &Path) -> Result<SceneFrame>;

    /// Saves a record, creating parent directories.
    fn save(&self, frame: &SceneFrame, path: &Path) -> Result<()>;
}

/// YAML scene records.
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlSceneStore;

impl SceneStore for YamlSceneStore {
    fn extension(&self) -> &str {
        "yaml"
    }

    fn load(&self, path: &Path) -> Result<SceneFrame> {
        let text = fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        SceneFrame::from_yaml_str(&text).map_err(|e| CoreError::yaml(path, e))
    }

    fn save(&self, frame: &SceneFrame, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
        }
        let text = serde_yaml::to_string(frame).map_err(|e| CoreError::yaml(path, e))?;
        fs::write(path, text).map_err(|e| CoreError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: &str = r#"
camera0:
  cords: [10.0, 20.0, 1.5, 0.0, 90.0, 0.0]
  intrinsic: [[1, 0], [0, 1]]
ego_speed: 12.5
lidar_pose: [100.0, 200.0, 1.9, 0.0, 45.0, 0.0]
true_ego_pos: [100.0, 200.0]
vehicles:
  962:
    angle: [0.0, 90.0, 0.0]
    location: [5.0, 6.0, 0.5]
    speed: 0.0
  971:
    extent: [2.0, 1.0, 0.8]
"#;

    fn frame(text: &str) -> SceneFrame {
        SceneFrame::from_yaml_str(text).unwrap()
    }

    #[test]
    fn test_parse_known_and_unknown_fields() {
        let frame = frame(FRAME);

        assert_eq!(numbers(frame.get("lidar_pose").unwrap()).unwrap()[0], 100.0);
        assert!(!frame.contains("predicted_ego_pos"));
        assert!(frame.get("ego_speed").is_some());
        assert!(frame.get("camera0").unwrap().get("intrinsic").is_some());

        assert!(frame.vehicle("962").is_some());
        assert!(frame.vehicle("971").unwrap().get("location").is_none());
        assert!(frame.vehicle("1016").is_none());
    }

    #[test]
    fn test_round_trip_preserves_fields() {
        let frame = frame(FRAME);
        let text = serde_yaml::to_string(&frame).unwrap();

        assert_eq!(SceneFrame::from_yaml_str(&text).unwrap(), frame);
        assert!(!text.contains("predicted_ego_pos"));
    }

    #[test]
    fn test_round_trip_keeps_nulls() {
        let frame = frame("lidar_pose: null\nvehicles:\n  962:\n    location: [1.0, 2.0]\n    speed: null\n");
        let text = serde_yaml::to_string(&frame).unwrap();
        let reparsed = SceneFrame::from_yaml_str(&text).unwrap();

        assert_eq!(reparsed.get("lidar_pose"), Some(&Value::Null));
        assert_eq!(reparsed.vehicle("962").unwrap().get("speed"), Some(&Value::Null));
    }

    #[test]
    fn test_non_list_fields_load_and_stay_put() {
        let mut frame = frame("lidar_pose: unknown\ncamera1:\n  cords: 7\ntrue_ego_pos: [1.0, 2.0]\n");

        let mut shifted = 0;
        for pose in frame.ego_poses_mut() {
            if shift_planar(pose, 1.0, 1.0) {
                shifted += 1;
            }
        }
        assert_eq!(shifted, 1);
        assert_eq!(frame.camera_cords_mut().count(), 1);

        assert_eq!(frame.get("lidar_pose"), Some(&Value::from("unknown")));
        assert_eq!(numbers(frame.get("true_ego_pos").unwrap()), Some(vec![2.0, 3.0]));
        assert_eq!(frame.get("camera1").unwrap().get("cords"), Some(&Value::from(7)));
    }

    #[test]
    fn test_base_snapshot() {
        let base = frame(FRAME).base_snapshot();

        assert_eq!(base.len(), 1);
        let v = base.get("962").unwrap();
        assert_eq!((v.x, v.y, v.speed, v.heading), (5.0, 6.0, 0.0, 0.0));
    }

    #[test]
    fn test_base_snapshot_tolerates_odd_values() {
        let base = frame("vehicles:\n  962:\n    location: [x, 4.0]\n  \"971\":\n    location: here\n").base_snapshot();

        assert_eq!(base.len(), 1);
        let v = base.get("962").unwrap();
        assert_eq!((v.x, v.y, v.speed), (0.0, 4.0, 0.0));
    }

    #[test]
    fn test_vehicle_ids_numeric_and_string() {
        let mut frame = frame("vehicles:\n  962: {speed: 1.0}\n  \"971\": {speed: 2.0}\n  true: {speed: 3.0}\n  980: unknown\n");
        let ids: Vec<String> = frame.vehicles_mut().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["962", "971"]);

        assert!(SceneFrame::default().vehicle("962").is_none());
    }

    #[test]
    fn test_shift_planar() {
        let mut pose = Value::from(vec![1.0, 2.0, 3.0]);
        assert!(shift_planar(&mut pose, 0.5, -1.0));
        assert_eq!(numbers(&pose), Some(vec![1.5, 1.0, 3.0]));

        let mut short = Value::from(vec![1.0]);
        assert!(!shift_planar(&mut short, 0.5, -1.0));
        assert_eq!(numbers(&short), Some(vec![1.0]));

        let mut text = Value::from("pose");
        assert!(!shift_planar(&mut text, 0.5, -1.0));
        assert!(!shift_planar(&mut Value::Null, 0.5, -1.0));
    }

    #[test]
    fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("000000.yaml");
        let store = YamlSceneStore;

        let frame = frame(FRAME);
        store.save(&frame, &path).unwrap();
        assert_eq!(store.load(&path).unwrap(), frame);
    }

    #[test]
    fn test_load_missing_file() {
        let err = YamlSceneStore.load(Path::new("/nonexistent/000000.yaml"));
        assert!(matches!(err, Err(CoreError::Io { .. })));
    }
}
