//! Engine configuration management via TOML files.
//!
//! Every tunable the engine exposes lives in an explicit struct with named,
//! documented fields and defaults; values are clamped to safe ranges while
//! parsing. Sections may be omitted entirely, in which case defaults apply.

use std::fs;
use std::path::Path;

use serde::Serialize;
use toml::Value;

/// Classifier runtime options.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifierOptions {
    /// Frames per second the throttle targets in fast mode.
    pub target_fps: f32,
    /// When set, calls arriving faster than `1000/target_fps` ms return the
    /// cached result unprocessed.
    pub fast_mode: bool,
    /// Exponential blend factor applied to morph weights between frames.
    pub smoothing_factor: f32,
    /// Ring-buffer length of prior classification results.
    pub history_len: usize,
    /// Capacity of the quantized-feature LRU result cache.
    pub cache_capacity: usize,
    /// Minimum expected mouth width; drives the geometry-quality factor.
    pub min_mouth_width: f32,
    /// Append every accepted frame to `logs/classifications.jsonl`. Off by
    /// default: it costs a disk write per frame.
    pub log_frames: bool,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            target_fps: 30.0,
            fast_mode: false,
            smoothing_factor: 0.3,
            history_len: 5,
            cache_capacity: 128,
            min_mouth_width: 0.02,
            log_frames: false,
        }
    }
}

/// Per-run optimizer tunables, caller-supplied at optimize time.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizeConfig {
    pub max_iterations: usize,
    pub learning_rate: f32,
    /// Early-stop threshold on score improvement between iterations.
    pub convergence_threshold: f32,
    /// Weight applied to each violated constraint's severity.
    pub constraint_weight: f32,
    /// Wall-clock budget for one run, in milliseconds.
    pub max_optimization_time_ms: u64,
    /// Minimum absolute metric deviation that triggers an adjustment.
    pub deviation_threshold: f32,
    /// Combined penalty is capped here regardless of violation count.
    pub penalty_cap: f32,
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            learning_rate: 0.3,
            convergence_threshold: 0.02,
            constraint_weight: 0.5,
            max_optimization_time_ms: 10_000,
            deviation_threshold: 0.05,
            penalty_cap: 0.8,
        }
    }
}

/// Controller tunables governing adaptation and notifications.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerConfig {
    /// Interval between progress notifications, in milliseconds.
    pub progress_interval_ms: u64,
    /// Score above which (with constraints satisfied) a run counts as
    /// successful and feeds the learned state.
    pub success_score: f32,
    /// Runs required before a viseme's learned profile overrides caller
    /// options.
    pub min_runs_for_profile: usize,
    /// Historical configurations kept per viseme.
    pub max_history_entries: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: 500,
            success_score: 85.0,
            min_runs_for_profile: 3,
            max_history_entries: 10,
        }
    }
}

/// Anatomical constraint thresholds.
///
/// The natural-length constants are empirically chosen; they are preserved
/// from observed behavior and exposed here as tunables.
#[derive(Debug, Clone, Serialize)]
pub struct ConstraintThresholds {
    pub philtrum_natural: f32,
    pub philtrum_max_stretch: f32,
    pub lip_symmetry_max: f32,
    pub face_width_natural: f32,
    pub face_width_max_deviation: f32,
    pub eye_nose_expected: f32,
    pub eye_nose_max_excess: f32,
}

impl Default for ConstraintThresholds {
    fn default() -> Self {
        Self {
            philtrum_natural: 0.03,
            philtrum_max_stretch: 0.15,
            lip_symmetry_max: 0.10,
            face_width_natural: 0.4,
            face_width_max_deviation: 0.12,
            eye_nose_expected: 0.02,
            eye_nose_max_excess: 0.08,
        }
    }
}

/// Full engine configuration, loadable from one TOML file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineConfig {
    pub classifier: ClassifierOptions,
    pub optimizer: OptimizeConfig,
    pub controller: ControllerConfig,
    pub constraints: ConstraintThresholds,
}

impl EngineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(&path)?;
        Self::from_str(&contents)
    }

    pub fn from_str(toml_str: &str) -> Result<Self, ConfigError> {
        let value: Value =
            toml::from_str(toml_str).map_err(|err| ConfigError::Parse(err.to_string()))?;

        Ok(Self {
            classifier: parse_classifier(&value),
            optimizer: parse_optimizer(&value),
            controller: parse_controller(&value),
            constraints: parse_constraints(&value),
        })
    }
}

fn table<'a>(value: &'a Value, name: &str) -> Option<&'a toml::value::Table> {
    value.get(name).and_then(|v| v.as_table())
}

fn float(table: Option<&toml::value::Table>, key: &str, default: f32) -> f32 {
    table
        .and_then(|t| t.get(key))
        .and_then(|v| {
            v.as_float()
                .map(|f| f as f32)
                .or_else(|| v.as_integer().map(|i| i as f32))
        })
        .unwrap_or(default)
}

fn integer(table: Option<&toml::value::Table>, key: &str, default: usize) -> usize {
    table
        .and_then(|t| t.get(key))
        .and_then(|v| v.as_integer())
        .map(|v| v.max(0) as usize)
        .unwrap_or(default)
}

fn boolean(table: Option<&toml::value::Table>, key: &str, default: bool) -> bool {
    table
        .and_then(|t| t.get(key))
        .and_then(|v| v.as_bool())
        .unwrap_or(default)
}

fn parse_classifier(value: &Value) -> ClassifierOptions {
    let t = table(value, "classifier");
    let d = ClassifierOptions::default();
    ClassifierOptions {
        target_fps: float(t, "target_fps", d.target_fps).clamp(1.0, 120.0),
        fast_mode: boolean(t, "fast_mode", d.fast_mode),
        smoothing_factor: float(t, "smoothing_factor", d.smoothing_factor).clamp(0.0, 1.0),
        history_len: integer(t, "history_len", d.history_len).clamp(1, 64),
        cache_capacity: integer(t, "cache_capacity", d.cache_capacity).clamp(1, 4096),
        min_mouth_width: float(t, "min_mouth_width", d.min_mouth_width).max(1e-4),
        log_frames: boolean(t, "log_frames", d.log_frames),
    }
}

fn parse_optimizer(value: &Value) -> OptimizeConfig {
    let t = table(value, "optimizer");
    let d = OptimizeConfig::default();
    OptimizeConfig {
        max_iterations: integer(t, "max_iterations", d.max_iterations).clamp(1, 256),
        learning_rate: float(t, "learning_rate", d.learning_rate).clamp(0.001, 2.0),
        convergence_threshold: float(t, "convergence_threshold", d.convergence_threshold)
            .clamp(0.0, 1.0),
        constraint_weight: float(t, "constraint_weight", d.constraint_weight).clamp(0.0, 2.0),
        max_optimization_time_ms: integer(
            t,
            "max_optimization_time_ms",
            d.max_optimization_time_ms as usize,
        ) as u64,
        deviation_threshold: float(t, "deviation_threshold", d.deviation_threshold).max(0.0),
        penalty_cap: float(t, "penalty_cap", d.penalty_cap).clamp(0.0, 1.0),
    }
}

fn parse_controller(value: &Value) -> ControllerConfig {
    let t = table(value, "controller");
    let d = ControllerConfig::default();
    ControllerConfig {
        progress_interval_ms: integer(t, "progress_interval_ms", d.progress_interval_ms as usize)
            .max(10) as u64,
        success_score: float(t, "success_score", d.success_score).clamp(0.0, 100.0),
        min_runs_for_profile: integer(t, "min_runs_for_profile", d.min_runs_for_profile).max(1),
        max_history_entries: integer(t, "max_history_entries", d.max_history_entries).clamp(1, 64),
    }
}

fn parse_constraints(value: &Value) -> ConstraintThresholds {
    let t = table(value, "constraints");
    let d = ConstraintThresholds::default();
    ConstraintThresholds {
        philtrum_natural: float(t, "philtrum_natural", d.philtrum_natural).max(1e-4),
        philtrum_max_stretch: float(t, "philtrum_max_stretch", d.philtrum_max_stretch).max(0.0),
        lip_symmetry_max: float(t, "lip_symmetry_max", d.lip_symmetry_max).max(0.0),
        face_width_natural: float(t, "face_width_natural", d.face_width_natural).max(1e-4),
        face_width_max_deviation: float(t, "face_width_max_deviation", d.face_width_max_deviation)
            .max(0.0),
        eye_nose_expected: float(t, "eye_nose_expected", d.eye_nose_expected).max(1e-4),
        eye_nose_max_excess: float(t, "eye_nose_max_excess", d.eye_nose_max_excess).max(0.0),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "IO error: {}", err),
            ConfigError::Parse(err) => write!(f, "Parse error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}
