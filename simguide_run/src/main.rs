//! SimGuide CLI
//!
//! Synthesize a simulator-guided scenario from a recorded template.

use clap::{Parser, ValueEnum};
use simguide_env::{NoSimulator, OpenGymBridge, ScriptedSimulator, SimulatorEnv};
use simguide_run::{AugmentConfig, FrameSynthesizer};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Speed of the scripted backend's vehicles (m/s)
const SCRIPTED_VELOCITY: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// ns-3 OpenGym through a JSON relay over ZeroMQ
    Opengym,
    /// In-process linear drive of every vehicle
    Scripted,
    /// Never connect; replay the template as-is
    None,
}

#[derive(Parser, Debug)]
#[command(name = "simguide")]
#[command(about = "Simulator-guided frame synthesis for multi-vehicle perception datasets")]
#[command(version)]
struct Args {
    /// Template scenario directory
    #[arg(long)]
    source: Option<PathBuf>,
    
    /// Output base directory
    #[arg(long)]
    output_dir: Option<PathBuf>,
    
    /// Output scenario name
    #[arg(long)]
    scenario_name: Option<String>,
    
    /// Simulator port
    #[arg(short, long)]
    port: Option<u16>,
    
    /// Simulation time in seconds
    #[arg(long)]
    sim_time: Option<f64>,
    
    /// Simulation step time in seconds
    #[arg(long)]
    step_time: Option<f64>,
    
    /// Point cloud noise standard deviation (meters)
    #[arg(long)]
    noise_std: Option<f64>,
    
    /// Do not link template images into the output
    #[arg(long)]
    no_copy_images: bool,
    
    /// Per-axis offset ceiling (meters)
    #[arg(long)]
    max_offset: Option<f64>,
    
    /// Noise seed (0 = random)
    #[arg(short, long)]
    seed: Option<u64>,
    
    /// YAML run configuration; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
    
    /// Simulator backend
    #[arg(long, value_enum, default_value = "opengym")]
    backend: Backend,
    
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
    
    /// Also write plain log lines to a file
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    log_file: Option<PathBuf>,
    
    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    /// Layers command-line overrides over the file (or default) configuration.
    fn into_config(self) -> Result<AugmentConfig, simguide_run::AugmentError> {
        let mut config = match &self.config {
            Some(path) => AugmentConfig::from_yaml_file(path)?,
            None => AugmentConfig::default(),
        };
        
        if let Some(source) = self.source {
            config.source = source;
        }
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
        if let Some(name) = self.scenario_name {
            config.scenario_name = name;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(sim_time) = self.sim_time {
            config.sim_time = sim_time;
        }
        if let Some(step_time) = self.step_time {
            config.step_time = step_time;
        }
        if let Some(noise_std) = self.noise_std {
            config.noise_std = noise_std;
        }
        if let Some(max_offset) = self.max_offset {
            config.max_offset = max_offset;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if self.no_copy_images {
            config.copy_images = false;
        }
        
        Ok(config)
    }
}

fn init_logging(verbose: bool, log_file: Option<&PathBuf>) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    
    let file_layer = log_file.and_then(|path| {
        let path = if path.as_os_str().is_empty() {
            PathBuf::from(format!("simguide_{}.log", chrono::Local::now().format("%Y%m%d_%H%M%S")))
        } else {
            path.clone()
        };
        match File::create(&path) {
            Ok(file) => Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file))),
            Err(e) => {
                eprintln!("Cannot open log file {}: {}", path.display(), e);
                None
            }
        }
    });
    
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
}

fn build_backend(backend: Backend, config: &AugmentConfig) -> Box<dyn SimulatorEnv> {
    match backend {
        Backend::Opengym => Box::new(OpenGymBridge::new()),
        Backend::Scripted => Box::new(ScriptedSimulator::linear_drive(
            config.vehicle_order.len(),
            config.expected_simulator_frames(),
            SCRIPTED_VELOCITY,
            config.step_time,
        )),
        Backend::None => Box::new(NoSimulator),
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.log_file.as_ref());
    
    let json = args.json;
    let backend = args.backend;
    
    info!("SimGuide frame synthesis v{}", env!("CARGO_PKG_VERSION"));
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    
    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    
    let simulator = build_backend(backend, &config);
    info!("Simulator backend: {}", simulator.name());
    
    let mut synthesizer = FrameSynthesizer::new(config, simulator);
    if !synthesizer.augment() {
        error!("❌ Augmentation failed");
        std::process::exit(1);
    }
    
    if json {
        if let Some(report) = synthesizer.report() {
            match serde_json::to_string_pretty(report) {
                Ok(text) => println!("{}", text),
                Err(e) => {
                    error!("Cannot encode report: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}
