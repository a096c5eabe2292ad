//! Template dataset discovery and output layout.
//!
//! Both trees share one shape:
//!
//! ```text
//! root/
//! ├── data_protocol.yaml
//! ├── 962/
//! │   ├── 000068.yaml
//! │   ├── 000068.pcd
//! │   └── 000068_camera0.png
//! └── 971/
//!     └── ...
//! ```

use crate::error::AugmentError;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Dataset-level metadata artifact
pub const PROTOCOL_FILE: &str = "data_protocol.yaml";

/// Extension of auxiliary imagery linked into the output
pub const IMAGE_EXTENSION: &str = "png";

/// Read-only view of the template dataset.
#[derive(Debug, Clone)]
pub struct TemplateDataset {
    root: PathBuf,
    vehicle_ids: Vec<String>,
    frames: Vec<String>,
    scene_ext: String,
    points_ext: String,
}

impl TemplateDataset {
    /// Discovers vehicles (numeric subdirectories) and frames (scene files
    /// of the first vehicle).
    pub fn open(root: &Path, scene_ext: &str, points_ext: &str) -> Result<Self, AugmentError> {
        if !root.is_dir() {
            return Err(AugmentError::SourceNotFound(root.to_path_buf()));
        }
        
        let mut vehicle_ids: Vec<String> = fs::read_dir(root)
            .map_err(|e| AugmentError::io(root, e))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| !name.is_empty() && name.chars().all(|c| c.is_ascii_digit()))
            .collect();
        vehicle_ids.sort();
        
        let first = vehicle_ids
            .first()
            .ok_or_else(|| AugmentError::NoVehicles(root.to_path_buf()))?;
        let first_dir = root.join(first);
        
        let mut frames = files_with_extension(&first_dir, scene_ext)?
            .into_iter()
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect::<Vec<_>>();
        frames.sort();
        
        if frames.is_empty() {
            return Err(AugmentError::NoFrames(first_dir));
        }
        
        Ok(Self {
            root: root.to_path_buf(),
            vehicle_ids,
            frames,
            scene_ext: scene_ext.to_string(),
            points_ext: points_ext.to_string(),
        })
    }
    
    pub fn root(&self) -> &Path {
        &self.root
    }
    
    pub fn vehicle_ids(&self) -> &[String] {
        &self.vehicle_ids
    }
    
    /// Frame names (file stems) in replay order.
    pub fn frames(&self) -> &[String] {
        &self.frames
    }
    
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
    
    pub fn vehicle_dir(&self, vehicle: &str) -> PathBuf {
        self.root.join(vehicle)
    }
    
    pub fn scene_path(&self, vehicle: &str, frame_index: usize) -> PathBuf {
        self.vehicle_dir(vehicle)
            .join(format!("{}.{}", self.frames[frame_index], self.scene_ext))
    }
    
    pub fn points_path(&self, vehicle: &str, frame_index: usize) -> PathBuf {
        self.vehicle_dir(vehicle)
            .join(format!("{}.{}", self.frames[frame_index], self.points_ext))
    }
    
    /// Imagery of one vehicle, sorted by name.
    pub fn images(&self, vehicle: &str) -> Result<Vec<PathBuf>, AugmentError> {
        files_with_extension(&self.vehicle_dir(vehicle), IMAGE_EXTENSION)
    }
    
    pub fn protocol_path(&self) -> PathBuf {
        self.root.join(PROTOCOL_FILE)
    }
}

/// Output scenario tree with contiguous zero-padded frame names.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
    scene_ext: String,
    points_ext: String,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>, scene_ext: &str, points_ext: &str) -> Self {
        Self {
            root: root.into(),
            scene_ext: scene_ext.to_string(),
            points_ext: points_ext.to_string(),
        }
    }
    
    /// Output frame name: `000000`, `000001`, ...
    pub fn frame_name(index: usize) -> String {
        format!("{:06}", index)
    }
    
    pub fn root(&self) -> &Path {
        &self.root
    }
    
    /// Creates the scenario root.
    pub fn create_root(&self) -> Result<(), AugmentError> {
        fs::create_dir_all(&self.root).map_err(|e| AugmentError::io(&self.root, e))
    }
    
    /// Creates (if needed) and returns a vehicle directory.
    pub fn ensure_vehicle_dir(&self, vehicle: &str) -> Result<PathBuf, AugmentError> {
        let dir = self.root.join(vehicle);
        fs::create_dir_all(&dir).map_err(|e| AugmentError::io(&dir, e))?;
        Ok(dir)
    }
    
    pub fn scene_path(&self, vehicle: &str, index: usize) -> PathBuf {
        self.root
            .join(vehicle)
            .join(format!("{}.{}", Self::frame_name(index), self.scene_ext))
    }
    
    pub fn points_path(&self, vehicle: &str, index: usize) -> PathBuf {
        self.root
            .join(vehicle)
            .join(format!("{}.{}", Self::frame_name(index), self.points_ext))
    }
    
    pub fn protocol_path(&self) -> PathBuf {
        self.root.join(PROTOCOL_FILE)
    }
}

/// Regular files in `dir` with the given extension, sorted.
fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, AugmentError> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| AugmentError::io(dir, e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(extension))
        .collect();
    files.sort();
    Ok(files)
}

/// Path of `target` relative to directory `base`.
///
/// Both paths must be absolute (or both relative to the same directory).
pub fn relative_path(target: &Path, base: &Path) -> PathBuf {
    let target: Vec<Component> = target.components().collect();
    let base: Vec<Component> = base.components().collect();
    
    let common = target
        .iter()
        .zip(&base)
        .take_while(|(a, b)| a == b)
        .count();
    
    let mut relative = PathBuf::new();
    for _ in common..base.len() {
        relative.push("..");
    }
    for component in &target[common..] {
        relative.push(component.as_os_str());
    }
    relative
}

/// Links every image of a template vehicle into `dst_dir`.
///
/// Uses relative symlinks where possible and falls back to a copy.
/// Existing destinations are left alone. Returns the number of new entries.
pub fn link_images(images: &[PathBuf], dst_dir: &Path) -> Result<usize, AugmentError> {
    let mut linked = 0;
    let dst_abs = fs::canonicalize(dst_dir).map_err(|e| AugmentError::io(dst_dir, e))?;
    
    for image in images {
        let Some(name) = image.file_name() else {
            continue;
        };
        let dst = dst_dir.join(name);
        if fs::symlink_metadata(&dst).is_ok() {
            continue;
        }
        
        match symlink_relative(image, &dst_abs, &dst) {
            Ok(()) => {}
            Err(e) => {
                warn!("Symlink failed for {}, copying: {}", name.to_string_lossy(), e);
                fs::copy(image, &dst).map_err(|e| AugmentError::io(&dst, e))?;
            }
        }
        linked += 1;
    }
    
    Ok(linked)
}

#[cfg(unix)]
fn symlink_relative(image: &Path, dst_dir_abs: &Path, dst: &Path) -> std::io::Result<()> {
    let image_abs = fs::canonicalize(image)?;
    std::os::unix::fs::symlink(relative_path(&image_abs, dst_dir_abs), dst)
}

#[cfg(not(unix))]
fn symlink_relative(_image: &Path, _dst_dir_abs: &Path, _dst: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "symlinks not supported"))
}

#[cfg(test)]
mod tests {
    use super::*;
    
    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }
    
    #[test]
    fn test_open_discovers_vehicles_and_frames() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("971/000070.yaml"));
        touch(&root.join("962/000070.yaml"));
        touch(&root.join("962/000068.yaml"));
        touch(&root.join("962/000068.pcd"));
        touch(&root.join("notes/readme.yaml"));
        touch(&root.join(PROTOCOL_FILE));
        
        let dataset = TemplateDataset::open(root, "yaml", "pcd").unwrap();
        assert_eq!(dataset.vehicle_ids(), &["962".to_string(), "971".to_string()]);
        assert_eq!(dataset.frames(), &["000068".to_string(), "000070".to_string()]);
        assert_eq!(dataset.scene_path("971", 1), root.join("971/000070.yaml"));
        assert_eq!(dataset.points_path("962", 0), root.join("962/000068.pcd"));
    }
    
    #[test]
    fn test_open_errors() {
        let dir = tempfile::tempdir().unwrap();
        
        let missing = dir.path().join("missing");
        assert!(matches!(TemplateDataset::open(&missing, "yaml", "pcd"), Err(AugmentError::SourceNotFound(_))));
        
        assert!(matches!(TemplateDataset::open(dir.path(), "yaml", "pcd"), Err(AugmentError::NoVehicles(_))));
        
        fs::create_dir_all(dir.path().join("962")).unwrap();
        assert!(matches!(TemplateDataset::open(dir.path(), "yaml", "pcd"), Err(AugmentError::NoFrames(_))));
    }
    
    #[test]
    fn test_output_names_are_contiguous() {
        let layout = OutputLayout::new("/out/aug", "yaml", "pcd");
        assert_eq!(OutputLayout::frame_name(0), "000000");
        assert_eq!(OutputLayout::frame_name(1234), "001234");
        assert_eq!(layout.scene_path("962", 7), PathBuf::from("/out/aug/962/000007.yaml"));
        assert_eq!(layout.points_path("962", 7), PathBuf::from("/out/aug/962/000007.pcd"));
    }
    
    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("/data/src/962/a.png"), Path::new("/data/out/aug/962")),
            PathBuf::from("../../../src/962/a.png")
        );
        assert_eq!(relative_path(Path::new("/a/b/c.png"), Path::new("/a/b")), PathBuf::from("c.png"));
    }
    
    #[test]
    fn test_link_images_skips_existing() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src/962");
        let dst = dir.path().join("out/962");
        touch(&src.join("000068_camera0.png"));
        touch(&src.join("000068_camera1.png"));
        fs::create_dir_all(&dst).unwrap();
        fs::write(dst.join("000068_camera1.png"), b"keep").unwrap();
        
        let images = vec![src.join("000068_camera0.png"), src.join("000068_camera1.png")];
        assert_eq!(link_images(&images, &dst).unwrap(), 1);
        
        assert_eq!(fs::read(dst.join("000068_camera0.png")).unwrap(), b"x");
        assert_eq!(fs::read(dst.join("000068_camera1.png")).unwrap(), b"keep");
        
        // Second pass links nothing new
        assert_eq!(link_images(&images, &dst).unwrap(), 0);
    }
}
