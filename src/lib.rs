//! # Viseme Core
//!
//! A facial viseme morph-target optimization engine. Landmark sets from a
//! face tracker are classified into viseme classes with smoothed morph
//! weights; a constrained iterative optimizer refines morph configurations
//! against rendered output through injected render/capture/analyze
//! collaborators; and an adaptive controller learns per-viseme priors
//! across runs and exports them as a versioned blob.
//!
//! ## Quick Start
//!
//! ```rust
//! use viseme_core::{ClassifierOptions, LandmarkSet, Point3, VisemeClassifier, LANDMARK_COUNT};
//!
//! // One classifier per face stream.
//! let mut classifier = VisemeClassifier::new(ClassifierOptions::default());
//!
//! let points = vec![Point3::default(); LANDMARK_COUNT];
//! let landmarks = LandmarkSet::new(points).unwrap();
//!
//! // Infallible per frame: falls back to the last valid result on trouble.
//! let result = classifier.classify(&landmarks);
//! println!("{} ({:.2})", result.viseme, result.confidence);
//! ```
//!
//! ## Core Modules
//!
//! - [`config`] - Engine configuration via TOML
//! - [`classifier`] - Landmark-to-viseme classification
//! - [`optimizer`] - Constrained iterative morph optimization
//! - [`learning`] - Adaptive per-viseme learning controller
//! - [`persistence`] - Versioned export/import of learned state
//! - [`logging`] - JSON line-delimited run logs

pub mod classifier;
pub mod config;
pub mod constraint;
pub mod error;
pub mod geometry;
pub mod influence;
pub mod landmarks;
pub mod learning;
pub mod logging;
pub mod morph;
pub mod optimizer;
pub mod persistence;
pub mod viseme;

pub use classifier::{ClassificationResult, GeometricFeatures, VisemeClassifier};
pub use config::{
    ClassifierOptions, ConfigError, ConstraintThresholds, ControllerConfig, EngineConfig,
    OptimizeConfig,
};
pub use constraint::{ConstraintEvaluator, ConstraintName, ConstraintResult, ALL_CONSTRAINTS};
pub use error::{EngineError, EngineResult};
pub use influence::{InfluenceMap, Metric, MetricEffect, MorphInfluence};
pub use landmarks::{LandmarkSet, Point3, LANDMARK_COUNT};
pub use learning::{
    AdaptiveController, CompletionCallback, CompletionUpdate, EffectivenessTable,
    LearnedVisemeProfile, LearningState, ProgressCallback, ProgressUpdate, SessionMetrics,
};
pub use morph::MorphConfiguration;
pub use optimizer::{
    AnalysisReport, FrameCapture, FrameImage, IterationRecord, MetricDeviation, MorphOptimizer,
    OptimizationLog, OptimizationOutcome, RenderTarget, VisemeAnalyzer,
};
pub use persistence::{
    export_learning_data, import_learning_data, load_checkpoint, save_checkpoint,
    CheckpointError, LEARNING_DATA_VERSION,
};
pub use viseme::{Viseme, ALL_VISEMES};
