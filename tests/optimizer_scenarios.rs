//! End-to-end scenarios over the optimizer and the adaptive controller,
//! driven by mock render/capture/analyze collaborators.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use viseme_core::{
    AdaptiveController, AnalysisReport, ClassifierOptions, ControllerConfig, EngineError,
    EngineResult, FrameCapture, FrameImage, LandmarkSet, MetricDeviation, Metric,
    MorphConfiguration, MorphOptimizer, OptimizeConfig, Point3, RenderTarget, Viseme,
    VisemeAnalyzer, VisemeClassifier, LANDMARK_COUNT,
};

const NOSE_TIP: usize = 1;
const UPPER_LIP_CENTER: usize = 0;
const LEFT_MOUTH_CORNER: usize = 61;
const RIGHT_MOUTH_CORNER: usize = 291;
const JAW_LEFT: usize = 234;
const JAW_RIGHT: usize = 454;
const LEFT_EYE_OUTER: usize = 33;
const RIGHT_EYE_OUTER: usize = 263;
const CHIN: usize = 152;

/// A symmetric face whose constraints all sit within bounds, with a
/// tunable philtrum length.
fn face_with_philtrum(length: f32) -> LandmarkSet {
    let mut points = vec![Point3::default(); LANDMARK_COUNT];
    points[NOSE_TIP] = Point3::new(0.5, 0.45, 0.0);
    points[UPPER_LIP_CENTER] = Point3::new(0.5, 0.45 + length, 0.0);
    points[LEFT_MOUTH_CORNER] = Point3::new(0.45, 0.5, 0.0);
    points[RIGHT_MOUTH_CORNER] = Point3::new(0.55, 0.5, 0.0);
    points[JAW_LEFT] = Point3::new(0.3, 0.5, 0.0);
    points[JAW_RIGHT] = Point3::new(0.7, 0.5, 0.0);
    points[LEFT_EYE_OUTER] = Point3::new(0.4, 0.35, 0.0);
    points[RIGHT_EYE_OUTER] = Point3::new(0.6, 0.35, 0.0);
    points[CHIN] = Point3::new(0.5, 0.58, 0.0);
    LandmarkSet::new(points).expect("full landmark set")
}

fn neutral_face() -> LandmarkSet {
    face_with_philtrum(0.03)
}

/// Records every applied configuration.
#[derive(Default)]
struct RecordingRender {
    applied: Mutex<Vec<MorphConfiguration>>,
}

impl RecordingRender {
    fn last_applied(&self) -> Option<MorphConfiguration> {
        self.applied.lock().ok().and_then(|a| a.last().cloned())
    }
}

#[async_trait]
impl RenderTarget for RecordingRender {
    async fn apply_morphs(&self, morphs: &MorphConfiguration) -> EngineResult<()> {
        if let Ok(mut applied) = self.applied.lock() {
            applied.push(morphs.clone());
        }
        Ok(())
    }
}

struct StaticCapture;

#[async_trait]
impl FrameCapture for StaticCapture {
    async fn capture_frame(&self) -> EngineResult<FrameImage> {
        Ok(FrameImage {
            width: 1,
            height: 1,
            data: vec![0],
        })
    }
}

/// Always reports the same score over a well-behaved face.
struct ConstantAnalyzer {
    score: f32,
    delay: Option<Duration>,
}

#[async_trait]
impl VisemeAnalyzer for ConstantAnalyzer {
    async fn analyze(&self, _frame: &FrameImage, _target: Viseme) -> EngineResult<AnalysisReport> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(AnalysisReport {
            score: self.score,
            landmarks: neutral_face(),
            deviations: BTreeMap::new(),
        })
    }
}

struct FailingAnalyzer;

#[async_trait]
impl VisemeAnalyzer for FailingAnalyzer {
    async fn analyze(&self, _frame: &FrameImage, _target: Viseme) -> EngineResult<AnalysisReport> {
        Err(EngineError::CaptureUnavailable("surface lost".into()))
    }
}

/// Reports one jaw deviation, then fails every subsequent measurement.
struct SingleShotAnalyzer {
    calls: AtomicUsize,
}

#[async_trait]
impl VisemeAnalyzer for SingleShotAnalyzer {
    async fn analyze(&self, _frame: &FrameImage, _target: Viseme) -> EngineResult<AnalysisReport> {
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(EngineError::CaptureUnavailable("surface lost".into()));
        }
        let mut deviations = BTreeMap::new();
        deviations.insert(Metric::JawOpening, MetricDeviation::new(0.5, 0.0));
        Ok(AnalysisReport {
            score: 40.0,
            landmarks: neutral_face(),
            deviations,
        })
    }
}

/// Rejects every configuration.
struct RejectingRender;

#[async_trait]
impl RenderTarget for RejectingRender {
    async fn apply_morphs(&self, _morphs: &MorphConfiguration) -> EngineResult<()> {
        Err(EngineError::Config("no scene loaded".into()))
    }
}

/// Couples the reported face to the applied morphs: a raised `jawOpen`
/// stretches the philtrum past its bound and drags the score down, so the
/// optimizer must back the morph off to improve.
struct CoupledAnalyzer {
    render: Arc<RecordingRender>,
}

#[async_trait]
impl VisemeAnalyzer for CoupledAnalyzer {
    async fn analyze(&self, _frame: &FrameImage, _target: Viseme) -> EngineResult<AnalysisReport> {
        let jaw = self
            .render
            .last_applied()
            .map(|m| m.get("jawOpen"))
            .unwrap_or(0.0);
        let mut deviations = BTreeMap::new();
        deviations.insert(Metric::JawOpening, MetricDeviation::new(jaw, 0.0));
        Ok(AnalysisReport {
            score: 100.0 * (1.0 - jaw),
            landmarks: face_with_philtrum(0.03 + 0.006 * jaw),
            deviations,
        })
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

fn no_cancel() -> watch::Receiver<bool> {
    // The sender can drop: the receiver keeps reporting the last value.
    let (_tx, rx) = watch::channel(false);
    rx
}

// Scenario A: a closed mouth classifies as the bilabial viseme with high
// confidence and weights near its base table.
#[test]
fn scenario_a_closed_mouth_is_bilabial() {
    let mut classifier = VisemeClassifier::new(ClassifierOptions::default());

    let mut points = vec![Point3::default(); LANDMARK_COUNT];
    let (cx, cy, width) = (0.5f32, 0.5f32, 0.10f32);
    points[NOSE_TIP] = Point3::new(cx, cy - 0.05, 0.0);
    points[UPPER_LIP_CENTER] = Point3::new(cx, cy - 0.02, 0.0);
    points[CHIN] = Point3::new(cx, cy + 0.07, 0.0);
    points[LEFT_MOUTH_CORNER] = Point3::new(cx - width / 2.0, cy, 0.0);
    points[RIGHT_MOUTH_CORNER] = Point3::new(cx + width / 2.0, cy, 0.0);
    // Lip rows and the inner ring all collapse to one point: zero separation.
    for &idx in &[
        82usize, 81, 13, 311, 312, 88, 178, 14, 402, 318, 78, 95, 87, 317, 324, 308, 415, 310, 80,
        191,
    ] {
        points[idx] = Point3::new(cx, cy, 0.0);
    }
    let set = LandmarkSet::new(points).expect("full landmark set");

    let mut result = classifier.classify(&set);
    for _ in 0..4 {
        result = classifier.classify(&set);
    }

    assert_eq!(result.viseme, Viseme::PP);
    assert!(result.confidence >= 0.8, "confidence {}", result.confidence);
    for (name, weight) in Viseme::PP.base_weights().iter() {
        assert!((result.morph_targets.get(name) - weight * result.confidence).abs() < 0.25);
    }
}

// Scenario B: a single-iteration run against a constant-score analyzer
// terminates after exactly one iteration with that score.
#[tokio::test]
async fn scenario_b_single_iteration_constant_score() {
    init_tracing();
    let optimizer = MorphOptimizer::default();
    let render = RecordingRender::default();
    let analyzer = ConstantAnalyzer {
        score: 50.0,
        delay: None,
    };
    let config = OptimizeConfig {
        max_iterations: 1,
        ..Default::default()
    };

    let mut initial = MorphConfiguration::new();
    initial.set("jawOpen", 1.0);
    initial.set("mouthPucker", 1.0); // deliberately bad starting point

    let outcome = optimizer
        .optimize(
            Viseme::AA,
            &initial,
            &render,
            &StaticCapture,
            &analyzer,
            &config,
            &BTreeMap::new(),
            no_cancel(),
            None,
        )
        .await
        .expect("run completes");

    assert_eq!(outcome.iterations_run, 1);
    assert_eq!(outcome.log.records.len(), 1);
    assert!((outcome.best_score - 50.0).abs() < 1e-6);
    assert!(!outcome.converged);
    assert!(outcome.constraints_satisfied);
}

// A flat score converges on the second iteration: no improvement beats the
// threshold.
#[tokio::test]
async fn flat_score_converges_early() {
    let optimizer = MorphOptimizer::default();
    let render = RecordingRender::default();
    let analyzer = ConstantAnalyzer {
        score: 50.0,
        delay: None,
    };
    let config = OptimizeConfig {
        max_iterations: 6,
        ..Default::default()
    };

    let outcome = optimizer
        .optimize(
            Viseme::AA,
            &MorphConfiguration::new(),
            &render,
            &StaticCapture,
            &analyzer,
            &config,
            &BTreeMap::new(),
            no_cancel(),
            None,
        )
        .await
        .expect("run completes");

    assert!(outcome.converged);
    assert_eq!(outcome.iterations_run, 2);
}

#[tokio::test]
async fn measurement_failure_is_terminal() {
    let optimizer = MorphOptimizer::default();
    let render = RecordingRender::default();

    let err = optimizer
        .optimize(
            Viseme::AA,
            &MorphConfiguration::new(),
            &render,
            &StaticCapture,
            &FailingAnalyzer,
            &OptimizeConfig::default(),
            &BTreeMap::new(),
            no_cancel(),
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Measurement { iteration: 0, .. }));
}

// A terminal measurement failure mid-run still leaves the render target at
// the best measured configuration, not the just-adjusted probe.
#[tokio::test]
async fn failed_run_restores_best_configuration() {
    let optimizer = MorphOptimizer::default();
    let render = Arc::new(RecordingRender::default());
    let analyzer = SingleShotAnalyzer {
        calls: AtomicUsize::new(0),
    };

    let mut initial = MorphConfiguration::new();
    initial.set("jawOpen", 0.5);

    let err = optimizer
        .optimize(
            Viseme::AA,
            &initial,
            render.as_ref(),
            &StaticCapture,
            &analyzer,
            &OptimizeConfig::default(),
            &BTreeMap::new(),
            no_cancel(),
            None,
        )
        .await
        .unwrap_err();

    // Iteration 0 measured the initial config and adjusted jawOpen downward;
    // iteration 1's measurement failed before the probe was ever scored.
    assert!(matches!(err, EngineError::Measurement { iteration: 1, .. }));
    assert_eq!(render.last_applied(), Some(initial));
}

// A render target that rejects configurations surfaces as a RenderTarget
// error, not a generic one.
#[tokio::test]
async fn render_failure_surfaces_as_render_target_error() {
    let optimizer = MorphOptimizer::default();
    let analyzer = ConstantAnalyzer {
        score: 50.0,
        delay: None,
    };

    let err = optimizer
        .optimize(
            Viseme::AA,
            &MorphConfiguration::new(),
            &RejectingRender,
            &StaticCapture,
            &analyzer,
            &OptimizeConfig::default(),
            &BTreeMap::new(),
            no_cancel(),
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::RenderTarget(_)));
}

#[tokio::test]
async fn cancellation_stops_at_iteration_boundary() {
    let optimizer = MorphOptimizer::default();
    let render = RecordingRender::default();
    let analyzer = ConstantAnalyzer {
        score: 50.0,
        delay: None,
    };

    let (tx, rx) = watch::channel(true); // cancelled before the first iteration
    let err = optimizer
        .optimize(
            Viseme::AA,
            &MorphConfiguration::new(),
            &render,
            &StaticCapture,
            &analyzer,
            &OptimizeConfig::default(),
            &BTreeMap::new(),
            rx,
            None,
        )
        .await
        .unwrap_err();
    drop(tx);

    assert!(matches!(
        err,
        EngineError::Cancelled {
            completed_iterations: 0
        }
    ));
    // Nothing was measured, so the initial configuration is restored.
    assert_eq!(render.last_applied(), Some(MorphConfiguration::new()));
}

// The optimizer backs off a morph that both hurts the score and stretches a
// constraint past its bound; violated-constraint pressure never grows.
#[tokio::test]
async fn violating_morph_is_backed_off() {
    let optimizer = MorphOptimizer::default();
    let render = Arc::new(RecordingRender::default());
    let analyzer = CoupledAnalyzer {
        render: Arc::clone(&render),
    };

    let mut initial = MorphConfiguration::new();
    initial.set("jawOpen", 0.8);

    let outcome = optimizer
        .optimize(
            Viseme::AA,
            &initial,
            render.as_ref(),
            &StaticCapture,
            &analyzer,
            &OptimizeConfig::default(),
            &BTreeMap::new(),
            no_cancel(),
            None,
        )
        .await
        .expect("run completes");

    assert!(outcome.best_morphs.get("jawOpen") < 0.8);
    let first = outcome.log.records.first().expect("at least one record");
    let last = outcome.log.records.last().expect("at least one record");
    assert!(last.violated.len() <= first.violated.len());
    assert!(outcome.best_score > 100.0 * (1.0 - 0.8) * 0.2);
    // The first proposed jawOpen delta points downward.
    if let Some(delta) = first.adjustments.get("jawOpen") {
        assert!(*delta < 0.0);
    }
}

// On return, the best configuration is re-applied to the render target even
// when later iterations probed worse ones.
#[tokio::test]
async fn best_configuration_is_reapplied() {
    let optimizer = MorphOptimizer::default();
    let render = Arc::new(RecordingRender::default());
    let analyzer = CoupledAnalyzer {
        render: Arc::clone(&render),
    };

    let mut initial = MorphConfiguration::new();
    initial.set("jawOpen", 0.8);

    let outcome = optimizer
        .optimize(
            Viseme::AA,
            &initial,
            render.as_ref(),
            &StaticCapture,
            &analyzer,
            &OptimizeConfig::default(),
            &BTreeMap::new(),
            no_cancel(),
            None,
        )
        .await
        .expect("run completes");

    assert_eq!(render.last_applied(), Some(outcome.best_morphs.clone()));
}

// Every iteration record carries the measured morph snapshot and the full
// constraint evaluation alongside the violated names.
#[tokio::test]
async fn iteration_records_snapshot_morphs_and_constraints() {
    let optimizer = MorphOptimizer::default();
    let render = Arc::new(RecordingRender::default());
    let analyzer = CoupledAnalyzer {
        render: Arc::clone(&render),
    };

    let mut initial = MorphConfiguration::new();
    initial.set("jawOpen", 0.8);

    let outcome = optimizer
        .optimize(
            Viseme::AA,
            &initial,
            render.as_ref(),
            &StaticCapture,
            &analyzer,
            &OptimizeConfig::default(),
            &BTreeMap::new(),
            no_cancel(),
            None,
        )
        .await
        .expect("run completes");

    let first = outcome.log.records.first().expect("at least one record");
    assert!((first.morphs.get("jawOpen") - 0.8).abs() < 1e-6);
    // All four anatomical constraints were evaluated on the full mock face.
    assert_eq!(first.constraints.len(), 4);
    assert!(first.constraints[&viseme_core::ConstraintName::Philtrum].violated);
    for name in &first.violated {
        assert!(first.constraints[name].violated);
    }
}

// Scenario C: philtrum length 0.05 against natural 0.03 and max relative
// stretch 0.15 is a violation with formula-exact severity.
#[test]
fn scenario_c_philtrum_severity_follows_formula() {
    let evaluator = viseme_core::ConstraintEvaluator::default();
    let results = evaluator.evaluate(&face_with_philtrum(0.05));
    let philtrum = &results[&viseme_core::ConstraintName::Philtrum];

    // relative stretch (0.05-0.03)/0.03 = 0.6667 exceeds 0.15
    assert!(philtrum.violated);
    assert!((philtrum.measured - 2.0 / 3.0).abs() < 1e-4);
    // severity (0.6667-0.15)/0.15
    assert!((philtrum.severity - (2.0 / 3.0 - 0.15) / 0.15).abs() < 1e-4);
}

// Scenario D: a second concurrent optimize_viseme call is rejected
// synchronously while the first completes normally.
#[tokio::test]
async fn scenario_d_concurrent_runs_reject_busy() {
    init_tracing();
    let controller = Arc::new(AdaptiveController::new(
        MorphOptimizer::default(),
        ControllerConfig::default(),
    ));
    let render = Arc::new(RecordingRender::default());
    let analyzer = Arc::new(ConstantAnalyzer {
        score: 50.0,
        delay: Some(Duration::from_millis(40)),
    });

    let first = {
        let controller = Arc::clone(&controller);
        let render = Arc::clone(&render);
        let analyzer = Arc::clone(&analyzer);
        tokio::spawn(async move {
            controller
                .optimize_viseme(
                    Viseme::AA,
                    &MorphConfiguration::new(),
                    render.as_ref(),
                    &StaticCapture,
                    analyzer.as_ref(),
                    &OptimizeConfig::default(),
                    no_cancel(),
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;

    let second = controller
        .optimize_viseme(
            Viseme::AA,
            &MorphConfiguration::new(),
            render.as_ref(),
            &StaticCapture,
            analyzer.as_ref(),
            &OptimizeConfig::default(),
            no_cancel(),
        )
        .await;
    assert!(matches!(second, Err(EngineError::Busy)));

    let first = first.await.expect("task joins").expect("first run completes");
    assert_eq!(first.viseme, Viseme::AA);
    assert_eq!(controller.session_metrics().total_runs, 1);
}

// Scenario E: importing a blob with a future version is a warning-level
// no-op; existing state survives.
#[tokio::test]
async fn scenario_e_version_mismatch_import_is_noop() {
    let controller = AdaptiveController::new(MorphOptimizer::default(), ControllerConfig::default());
    let render = RecordingRender::default();
    let analyzer = ConstantAnalyzer {
        score: 95.0,
        delay: None,
    };

    controller
        .optimize_viseme(
            Viseme::OH,
            &MorphConfiguration::new(),
            &render,
            &StaticCapture,
            &analyzer,
            &OptimizeConfig::default(),
            no_cancel(),
        )
        .await
        .expect("run completes");
    assert_eq!(controller.session_metrics().total_runs, 1);

    let blob = controller.export_learning_data().expect("export");
    let tampered = blob.replace("\"version\":\"1.0\"", "\"version\":\"9.9\"");
    assert_ne!(blob, tampered);

    controller
        .import_learning_data(&tampered)
        .expect("mismatch is not an error");
    assert_eq!(controller.session_metrics().total_runs, 1);

    // The untampered blob does import.
    let fresh = AdaptiveController::new(MorphOptimizer::default(), ControllerConfig::default());
    fresh.import_learning_data(&blob).expect("import");
    assert_eq!(fresh.session_metrics().total_runs, 1);
}

// Successful runs feed the learned profile and effectiveness table.
#[tokio::test]
async fn successful_runs_build_a_profile() {
    let controller = AdaptiveController::new(MorphOptimizer::default(), ControllerConfig::default());
    let render = RecordingRender::default();
    let analyzer = ConstantAnalyzer {
        score: 95.0,
        delay: None,
    };

    let mut initial = MorphConfiguration::new();
    initial.set("mouthPucker", 0.6);

    for _ in 0..3 {
        controller
            .optimize_viseme(
                Viseme::OU,
                &initial,
                &render,
                &StaticCapture,
                &analyzer,
                &OptimizeConfig::default(),
                no_cancel(),
            )
            .await
            .expect("run completes");
    }

    let profile = controller.profile(Viseme::OU).expect("profile exists");
    assert_eq!(profile.runs, 3);
    assert_eq!(profile.successes, 3);
    assert!(!profile.history.is_empty());
    // score > 90 ratchets the learning-rate multiplier up
    assert!(profile.learning_rate_multiplier > 1.0);

    let state = controller.state();
    let state = state.read().expect("state readable");
    assert!(state.effectiveness.get("mouthPucker") > 1.0);
    assert_eq!(state.metrics.successful_runs, 3);
}

// Progress callbacks fire during a long run and never after it finishes.
#[tokio::test]
async fn progress_callbacks_fire_and_stop() {
    let mut config = ControllerConfig::default();
    config.progress_interval_ms = 10;
    let controller = AdaptiveController::new(MorphOptimizer::default(), config);

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    controller.on_progress(Box::new(move |update| {
        assert_eq!(update.viseme, Viseme::AA);
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));
    // A failing callback must not disturb the run.
    controller.on_progress(Box::new(|_| Err("observer exploded".into())));

    let render = RecordingRender::default();
    let analyzer = ConstantAnalyzer {
        score: 50.0,
        delay: Some(Duration::from_millis(20)),
    };

    controller
        .optimize_viseme(
            Viseme::AA,
            &MorphConfiguration::new(),
            &render,
            &StaticCapture,
            &analyzer,
            &OptimizeConfig::default(),
            no_cancel(),
        )
        .await
        .expect("run completes");

    let after_run = fired.load(Ordering::SeqCst);
    assert!(after_run >= 1, "expected at least one progress callback");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fired.load(Ordering::SeqCst), after_run, "ticker kept firing");
}

// The completion callback fires exactly once per finished run, after the
// progress ticker has stopped, with the score delta and duration filled in.
#[tokio::test]
async fn completion_notification_fires_once_per_run() {
    let controller =
        AdaptiveController::new(MorphOptimizer::default(), ControllerConfig::default());

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    controller.on_complete(Box::new(move |update| {
        assert_eq!(update.viseme, Viseme::AA);
        assert!((update.final_score - 50.0).abs() < 1e-6);
        // Constant score: no improvement over the first iteration.
        assert!(update.score_delta.abs() < 1e-6);
        assert!(!update.success);
        assert!(update.iterations >= 1);
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));

    let render = RecordingRender::default();
    let analyzer = ConstantAnalyzer {
        score: 50.0,
        delay: None,
    };

    controller
        .optimize_viseme(
            Viseme::AA,
            &MorphConfiguration::new(),
            &render,
            &StaticCapture,
            &analyzer,
            &OptimizeConfig::default(),
            no_cancel(),
        )
        .await
        .expect("run completes");
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1, "fired again after the run");

    controller
        .optimize_viseme(
            Viseme::AA,
            &MorphConfiguration::new(),
            &render,
            &StaticCapture,
            &analyzer,
            &OptimizeConfig::default(),
            no_cancel(),
        )
        .await
        .expect("run completes");
    assert_eq!(fired.load(Ordering::SeqCst), 2);

    // A failed run returns its error to the caller; no completion fires.
    let err = controller
        .optimize_viseme(
            Viseme::AA,
            &MorphConfiguration::new(),
            &render,
            &StaticCapture,
            &FailingAnalyzer,
            &OptimizeConfig::default(),
            no_cancel(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Measurement { .. }));
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

// Zero time budget ends the run before any iteration; the outcome is empty
// but well-formed.
#[tokio::test]
async fn exhausted_time_budget_yields_empty_run() {
    let optimizer = MorphOptimizer::default();
    let render = RecordingRender::default();
    let analyzer = ConstantAnalyzer {
        score: 50.0,
        delay: None,
    };
    let config = OptimizeConfig {
        max_optimization_time_ms: 0,
        ..Default::default()
    };

    let outcome = optimizer
        .optimize(
            Viseme::AA,
            &MorphConfiguration::new(),
            &render,
            &StaticCapture,
            &analyzer,
            &config,
            &BTreeMap::new(),
            no_cancel(),
            None,
        )
        .await
        .expect("run completes");

    assert_eq!(outcome.iterations_run, 0);
    assert_eq!(outcome.best_score, 0.0);
    assert!(!outcome.converged);
}
