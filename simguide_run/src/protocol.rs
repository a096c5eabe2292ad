//! Dataset-level metadata artifact (`data_protocol.yaml`).
//!
//! The template's protocol is copied verbatim when present so downstream
//! loaders see the same sensor configuration. Otherwise a record of the
//! augmentation parameters is written instead.

use crate::error::AugmentError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Augmentation parameters and outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentationRecord {
    #[serde(rename = "type")]
    pub kind: String,
    
    /// Template scenario name
    pub source: String,
    
    pub source_frames: usize,
    pub generated_frames: usize,
    pub sim_time: f64,
    pub step_time: f64,
    
    /// Simulator still connected when the run finished
    pub simulator_connected: bool,
    pub simulator_port: u16,
    pub noise_std: f64,
    pub max_offset: f64,
    pub run_id: String,
    
    /// RFC 3339 wall-clock time of the run
    pub timestamp: String,
}

/// Synthesized protocol file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMetadata {
    pub augmentation: AugmentationRecord,
}

/// How the protocol artifact was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolArtifact {
    Copied,
    Synthesized,
}

/// Copies `template` to `output` if it exists, otherwise writes `record`.
pub fn write_protocol(
    template: &Path,
    output: &Path,
    record: impl FnOnce() -> AugmentationRecord,
) -> Result<ProtocolArtifact, AugmentError> {
    if template.is_file() {
        fs::copy(template, output).map_err(|e| AugmentError::io(output, e))?;
        info!("Copied template {} for loader compatibility", template.display());
        return Ok(ProtocolArtifact::Copied);
    }
    
    let metadata = ProtocolMetadata { augmentation: record() };
    let text = serde_yaml::to_string(&metadata).map_err(|source| AugmentError::Yaml {
        path: output.to_path_buf(),
        source,
    })?;
    fs::write(output, text).map_err(|e| AugmentError::io(output, e))?;
    info!("Template has no protocol file; wrote augmentation metadata to {}", output.display());
    Ok(ProtocolArtifact::Synthesized)
}

#[cfg(test)]
mod tests {
    use super::*;
    
    fn record() -> AugmentationRecord {
        AugmentationRecord {
            kind: "simulator_guided_template".into(),
            source: "2021_09_11_00_33_16".into(),
            source_frames: 5,
            generated_frames: 5,
            sim_time: 120.0,
            step_time: 0.1,
            simulator_connected: false,
            simulator_port: 5555,
            noise_std: 0.03,
            max_offset: 20.0,
            run_id: "run".into(),
            timestamp: "2026-01-01T00:00:00+00:00".into(),
        }
    }
    
    #[test]
    fn test_copy_when_template_present() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template.yaml");
        let output = dir.path().join("out.yaml");
        fs::write(&template, "lidar: {channels: 32}\n").unwrap();
        
        let artifact = write_protocol(&template, &output, record).unwrap();
        assert_eq!(artifact, ProtocolArtifact::Copied);
        assert_eq!(fs::read_to_string(&output).unwrap(), "lidar: {channels: 32}\n");
    }
    
    #[test]
    fn test_synthesize_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.yaml");
        
        let artifact = write_protocol(&dir.path().join("absent.yaml"), &output, record).unwrap();
        assert_eq!(artifact, ProtocolArtifact::Synthesized);
        
        let text = fs::read_to_string(&output).unwrap();
        assert!(text.contains("type: simulator_guided_template"));
        let parsed: ProtocolMetadata = serde_yaml::from_str(&text).unwrap();
        assert_eq!(parsed.augmentation, record());
    }
}
