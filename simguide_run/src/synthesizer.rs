//! Frame Synthesis Loop - replays the template steered by live telemetry.
//!
//! Two frame counts meet here: the template's own length and the target
//! length (the simulator's run length when connected, otherwise the
//! template's). Template frames are cycled by index and every output frame
//! is renumbered contiguously from `000000`.

use crate::config::AugmentConfig;
use crate::dataset::{link_images, OutputLayout, TemplateDataset};
use crate::diagnostics::Diagnostics;
use crate::error::AugmentError;
use crate::protocol::{write_protocol, AugmentationRecord, ProtocolArtifact};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use simguide_core::{
    DeltaTransform, Offset, PcdStore, PointCloudStore, ReferenceTracker, SceneStore,
    SimulatorLink, StateSnapshot, StepOutcome, TelemetryCodec, YamlSceneStore,
};
use simguide_env::SimulatorEnv;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Outcome of one augmentation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AugmentReport {
    /// Frames in the template dataset
    pub source_frames: usize,
    
    /// Frames planned when the loop started
    pub target_frames: usize,
    
    /// Frames actually written (per vehicle)
    pub generated_frames: usize,
    
    /// Vehicle directories processed
    pub vehicles: usize,
    
    /// Simulator connected before the first frame
    pub connected_at_start: bool,
    
    /// Frame at which a failed step degraded the run
    pub degraded_at: Option<usize>,
    
    /// Frame at which the simulator reported the end of its run
    pub terminated_at: Option<usize>,
    
    pub scenes_written: usize,
    pub point_clouds_written: usize,
    
    /// Point clouds absent or unreadable in the template
    pub point_clouds_skipped: usize,
    
    pub images_linked: usize,
    
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ProtocolArtifact>,
    
    pub output_path: PathBuf,
}

impl AugmentReport {
    /// How many times the template was replayed.
    pub fn template_cycles(&self) -> f64 {
        if self.source_frames == 0 {
            0.0
        } else {
            self.generated_frames as f64 / self.source_frames as f64
        }
    }
}

/// Drives one augmentation run.
pub struct FrameSynthesizer<S: SimulatorEnv> {
    config: AugmentConfig,
    link: SimulatorLink<S>,
    reference: ReferenceTracker,
    transform: DeltaTransform,
    scenes: Box<dyn SceneStore>,
    clouds: Box<dyn PointCloudStore>,
    rng: ChaCha8Rng,
    diagnostics: Diagnostics,
    report: Option<AugmentReport>,
}

impl<S: SimulatorEnv> FrameSynthesizer<S> {
    /// Creates a synthesizer for `config` talking to `simulator`.
    pub fn new(config: AugmentConfig, simulator: S) -> Self {
        let codec = TelemetryCodec::new(config.vehicle_order.clone())
            .with_header_len(config.header_len);
        let link = SimulatorLink::new(simulator, codec, config.port, config.step_time)
            .with_retry(config.retry_policy());
        
        let rng = if config.seed == 0 {
            ChaCha8Rng::from_entropy()
        } else {
            ChaCha8Rng::seed_from_u64(config.seed)
        };
        
        info!("Frame synthesizer initialized: {}", config.scenario_name);
        info!("  Source: {}", config.source.display());
        info!("  Output: {}", config.output_path().display());
        info!("  Simulator port: {}", config.port);
        info!(
            "  Simulation: {}s @ {}s/step = {} frames",
            config.sim_time,
            config.step_time,
            config.expected_simulator_frames()
        );
        
        Self {
            transform: DeltaTransform::new(config.max_offset),
            config,
            link,
            reference: ReferenceTracker::new(),
            scenes: Box::new(YamlSceneStore),
            clouds: Box::new(PcdStore),
            rng,
            diagnostics: Diagnostics::new(),
            report: None,
        }
    }
    
    /// Replaces the scene and point-cloud collaborators.
    pub fn with_stores(mut self, scenes: Box<dyn SceneStore>, clouds: Box<dyn PointCloudStore>) -> Self {
        self.scenes = scenes;
        self.clouds = clouds;
        self
    }
    
    /// Report of the last successful run.
    pub fn report(&self) -> Option<&AugmentReport> {
        self.report.as_ref()
    }
    
    /// Runs the augmentation and reports success as a single flag.
    ///
    /// Errors are logged once here with their cause chain. Frames already
    /// written stay on disk.
    pub fn augment(&mut self) -> bool {
        match self.run() {
            Ok(report) => {
                info!("✅ Augmentation complete: {}", report.output_path.display());
                self.report = Some(report);
                true
            }
            Err(e) => {
                error!("Augmentation failed: {}", e);
                let mut cause = std::error::Error::source(&e);
                while let Some(inner) = cause {
                    error!("  caused by: {}", inner);
                    cause = inner.source();
                }
                false
            }
        }
    }
    
    /// Runs the augmentation.
    ///
    /// The simulator session is released before returning on every path.
    pub fn run(&mut self) -> Result<AugmentReport, AugmentError> {
        self.config.validate()?;
        
        let dataset = TemplateDataset::open(
            &self.config.source,
            self.scenes.extension(),
            self.clouds.extension(),
        )?;
        let template_frames = dataset.frame_count();
        info!(
            "Found {} vehicles: {}",
            dataset.vehicle_ids().len(),
            dataset.vehicle_ids().join(", ")
        );
        info!("Source template frames: {}", template_frames);
        
        let connected = self.link.connect(&mut self.reference);
        let target = if connected {
            let frames = self.config.expected_simulator_frames();
            info!(
                "🎯 Simulator connected: will generate up to {} frames ({}s simulation)",
                frames, self.config.sim_time
            );
            frames
        } else {
            warn!(
                "⚠️ Simulator not connected: will generate {} frames (template frame count)",
                template_frames
            );
            template_frames
        };
        
        info!("📊 Frame generation plan:");
        info!("   Source template: {} frames", template_frames);
        info!("   Target output: {} frames", target);
        if target > template_frames {
            info!(
                "   Strategy: cycle through template frames {} times",
                target / template_frames + 1
            );
        }
        
        let layout = OutputLayout::new(
            self.config.output_path(),
            self.scenes.extension(),
            self.clouds.extension(),
        );
        let mut report = AugmentReport {
            source_frames: template_frames,
            target_frames: target,
            vehicles: dataset.vehicle_ids().len(),
            connected_at_start: connected,
            output_path: layout.root().to_path_buf(),
            ..Default::default()
        };
        
        let outcome = layout
            .create_root()
            .and_then(|()| self.synthesize(&dataset, &layout, connected, &mut report));
        self.link.close();
        let still_connected = outcome?;
        
        let record = || AugmentationRecord {
            kind: "simulator_guided_template".to_string(),
            source: dataset
                .root()
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            source_frames: template_frames,
            generated_frames: report.generated_frames,
            sim_time: self.config.sim_time,
            step_time: self.config.step_time,
            simulator_connected: still_connected,
            simulator_port: self.config.port,
            noise_std: self.config.noise_std,
            max_offset: self.config.max_offset,
            run_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Local::now().to_rfc3339(),
        };
        let artifact = write_protocol(&dataset.protocol_path(), &layout.protocol_path(), record)?;
        report.protocol = Some(artifact);
        
        Self::log_summary(&report, &self.config);
        Ok(report)
    }
    
    /// The per-frame loop. Returns whether telemetry was still live at the end.
    fn synthesize(
        &mut self,
        dataset: &TemplateDataset,
        layout: &OutputLayout,
        mut connected: bool,
        report: &mut AugmentReport,
    ) -> Result<bool, AugmentError> {
        let template_frames = dataset.frame_count();
        let target = report.target_frames;
        
        for frame_index in 0..target {
            let source_index = frame_index % template_frames;
            let mut current: Option<StateSnapshot> = None;
            
            if connected {
                match self.link.step() {
                    StepOutcome::Finished => {
                        info!("✅ Simulator run completed at frame {}/{}", frame_index, target);
                        info!("   Generated {} frames total", frame_index);
                        report.terminated_at = Some(frame_index);
                        break;
                    }
                    StepOutcome::Advanced(decoded) => {
                        let snapshot = decoded.into_snapshot();
                        self.diagnostics
                            .log_telemetry(frame_index, target, &snapshot, self.reference.get());
                        if !snapshot.is_empty() {
                            current = Some(snapshot);
                        }
                    }
                    StepOutcome::Failed(reason) => {
                        warn!(
                            "Simulator step failed (frame {}): {}; remaining frames use the template only",
                            frame_index, reason
                        );
                        connected = false;
                        report.degraded_at = Some(frame_index);
                    }
                    StepOutcome::Unavailable => {
                        connected = false;
                        report.degraded_at.get_or_insert(frame_index);
                    }
                }
            }
            
            let offset = match &current {
                Some(snapshot) => {
                    let offset = self.transform.compute_offset(snapshot, self.reference.get());
                    self.diagnostics.log_first_frame(snapshot, self.reference.get(), offset);
                    self.diagnostics.log_delta(snapshot, self.reference.get(), offset);
                    offset
                }
                None => Offset::ZERO,
            };
            
            for vehicle in dataset.vehicle_ids() {
                self.write_vehicle_frame(
                    dataset,
                    layout,
                    vehicle,
                    frame_index,
                    source_index,
                    current.as_ref(),
                    offset,
                    report,
                )?;
            }
            report.generated_frames = frame_index + 1;
            
            self.diagnostics.log_progress(
                frame_index,
                target,
                source_index,
                template_frames,
                current.is_some(),
            );
        }
        
        Ok(connected)
    }
    
    /// Produces one vehicle's scene record and point cloud for one frame.
    #[allow(clippy::too_many_arguments)]
    fn write_vehicle_frame(
        &mut self,
        dataset: &TemplateDataset,
        layout: &OutputLayout,
        vehicle: &str,
        frame_index: usize,
        source_index: usize,
        current: Option<&StateSnapshot>,
        offset: Offset,
        report: &mut AugmentReport,
    ) -> Result<(), AugmentError> {
        let dst_dir = layout.ensure_vehicle_dir(vehicle)?;
        
        // Imagery is linked once, never regenerated per frame
        if self.config.copy_images && frame_index == 0 {
            let images = dataset.images(vehicle)?;
            report.images_linked += link_images(&images, &dst_dir)?;
        }
        
        let mut frame = self.scenes.load(&dataset.scene_path(vehicle, source_index))?;
        
        if frame_index == 0 && dataset.vehicle_ids().first().map(String::as_str) == Some(vehicle) {
            self.diagnostics.log_base_snapshot(&frame.base_snapshot());
        }
        
        if let Some(current) = current {
            let update = self
                .transform
                .apply_to_scene(&mut frame, offset, current, self.reference.get());
            debug!(
                "vehicle {} frame {}: ego={} cameras={} moved={} speeds={}",
                vehicle,
                frame_index,
                update.ego_fields,
                update.camera_fields,
                update.vehicles_moved,
                update.speeds_overwritten
            );
        }
        
        self.scenes.save(&frame, &layout.scene_path(vehicle, frame_index))?;
        report.scenes_written += 1;
        
        let src_points = dataset.points_path(vehicle, source_index);
        if !src_points.is_file() {
            debug!("No point cloud at {}", src_points.display());
            report.point_clouds_skipped += 1;
            return Ok(());
        }
        
        match self.clouds.read(&src_points) {
            Ok(mut cloud) => {
                self.transform
                    .apply_to_points(&mut cloud.points, offset, self.config.noise_std, &mut self.rng);
                self.clouds.write(&cloud, &layout.points_path(vehicle, frame_index))?;
                report.point_clouds_written += 1;
            }
            Err(e) => {
                warn!("Skipping unreadable point cloud {}: {}", src_points.display(), e);
                report.point_clouds_skipped += 1;
            }
        }
        
        Ok(())
    }
    
    fn log_summary(report: &AugmentReport, config: &AugmentConfig) {
        info!("📊 Augmentation Summary:");
        info!("   Source template: {} frames", report.source_frames);
        info!("   Generated output: {} frames", report.generated_frames);
        info!("   Simulation: {}s @ {}s/step", config.sim_time, config.step_time);
        if report.generated_frames > report.source_frames {
            info!("   Template cycled: {:.1}x", report.template_cycles());
        }
        if let Some(frame) = report.degraded_at {
            info!("   Telemetry lost at frame {}", frame);
        }
        info!(
            "   Written: {} scenes, {} point clouds ({} skipped), {} images linked",
            report.scenes_written,
            report.point_clouds_written,
            report.point_clouds_skipped,
            report.images_linked
        );
    }
}
