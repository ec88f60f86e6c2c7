//! Adaptive learning across optimization runs.
//!
//! The controller wraps the optimizer and accumulates per-viseme knowledge:
//! which starting configurations worked, how effective each morph has been,
//! and how aggressively future runs should adjust. One controller serves one
//! face; it runs at most one optimization at a time and rejects concurrent
//! requests synchronously rather than queueing them.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::config::{ControllerConfig, OptimizeConfig};
use crate::constraint::ConstraintName;
use crate::error::{EngineError, EngineResult};
use crate::morph::MorphConfiguration;
use crate::optimizer::{
    FrameCapture, IterationProgress, MorphOptimizer, OptimizationOutcome, RenderTarget,
    VisemeAnalyzer,
};
use crate::viseme::Viseme;

/// Weight decay applied to existing history entries when a new one lands.
const HISTORY_DECAY: f32 = 0.95;
/// How many top historical configurations feed the seed blend.
const SEED_TOP_N: usize = 3;
/// Per-morph seed blend weight never exceeds this.
const SEED_BLEND_CAP: f32 = 0.7;

/// Per-morph effectiveness multipliers learned from successful runs.
///
/// Values live in [0.1, 2.0] and default to 1.0; they scale the optimizer's
/// adjustment deltas, so a morph that keeps paying off moves faster and one
/// that never helps is throttled without ever being silenced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EffectivenessTable {
    scores: BTreeMap<String, f32>,
}

impl EffectivenessTable {
    pub fn get(&self, morph: &str) -> f32 {
        self.scores.get(morph).copied().unwrap_or(1.0)
    }

    /// Fold one observed sample in: 80% old, 20% new, clamped.
    pub fn update(&mut self, morph: &str, sample: f32) {
        let old = self.get(morph);
        let next = (0.8 * old + 0.2 * sample).clamp(0.1, 2.0);
        self.scores.insert(morph.to_string(), next);
    }

    pub fn snapshot(&self) -> BTreeMap<String, f32> {
        self.scores.clone()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// One remembered successful configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalConfig {
    pub morphs: MorphConfiguration,
    pub score: f32,
    /// Recency weight; decays as newer entries arrive.
    pub weight: f32,
}

impl HistoricalConfig {
    fn rank(&self) -> f32 {
        self.score * self.weight
    }
}

/// Everything learned about one viseme.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedVisemeProfile {
    pub runs: usize,
    pub successes: usize,
    pub total_iterations: usize,
    /// Cumulative wall time across all runs for this viseme.
    #[serde(default)]
    pub total_duration_ms: u64,
    /// Multiplier applied to the caller's learning rate, in [0.5, 1.5].
    pub learning_rate_multiplier: f32,
    pub history: Vec<HistoricalConfig>,
    /// How often each constraint was violated across all runs.
    pub violation_counts: BTreeMap<ConstraintName, u32>,
}

impl Default for LearnedVisemeProfile {
    fn default() -> Self {
        Self {
            runs: 0,
            successes: 0,
            total_iterations: 0,
            total_duration_ms: 0,
            learning_rate_multiplier: 1.0,
            history: Vec::new(),
            violation_counts: BTreeMap::new(),
        }
    }
}

impl LearnedVisemeProfile {
    fn new() -> Self {
        Self::default()
    }

    pub fn average_iterations(&self) -> f32 {
        if self.runs == 0 {
            0.0
        } else {
            self.total_iterations as f32 / self.runs as f32
        }
    }

    pub fn average_duration_ms(&self) -> f64 {
        if self.runs == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.runs as f64
        }
    }

    /// Derive a tuned optimizer config once enough runs are on record;
    /// below the threshold the caller's options pass through unchanged.
    pub fn tuned_config(&self, base: &OptimizeConfig, min_runs: usize) -> OptimizeConfig {
        if self.runs < min_runs {
            return base.clone();
        }
        let mut tuned = base.clone();
        tuned.learning_rate =
            (base.learning_rate * self.learning_rate_multiplier).clamp(0.001, 2.0);
        tuned.max_iterations = (self.average_iterations().round() as usize + 2).clamp(1, 256);
        tuned
    }

    /// Blend the caller's starting point toward the weighted average of the
    /// best remembered configurations, per morph, by at most 70%.
    pub fn seeded_initial(
        &self,
        initial: &MorphConfiguration,
        effectiveness: &EffectivenessTable,
    ) -> MorphConfiguration {
        let mut ranked: Vec<&HistoricalConfig> = self.history.iter().collect();
        ranked.sort_by(|a, b| {
            b.rank()
                .partial_cmp(&a.rank())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let top: Vec<(&MorphConfiguration, f32)> = ranked
            .iter()
            .take(SEED_TOP_N)
            .map(|h| (&h.morphs, h.rank().max(f32::EPSILON)))
            .collect();
        if top.is_empty() {
            return initial.clone();
        }
        let prior = MorphConfiguration::weighted_average(top);

        let mut seeded = MorphConfiguration::new();
        for name in initial.morph_names().chain(prior.morph_names()) {
            if seeded.contains(name) {
                continue;
            }
            let alpha = effectiveness.get(name).min(SEED_BLEND_CAP);
            seeded.set(
                name,
                initial.get(name) * (1.0 - alpha) + prior.get(name) * alpha,
            );
        }
        seeded
    }

    fn record_success(&mut self, morphs: MorphConfiguration, score: f32, max_entries: usize) {
        for entry in &mut self.history {
            entry.weight *= HISTORY_DECAY;
        }
        self.history.push(HistoricalConfig {
            morphs,
            score,
            weight: 1.0,
        });
        while self.history.len() > max_entries {
            let lowest = self
                .history
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    a.rank()
                        .partial_cmp(&b.rank())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(i, _)| i);
            match lowest {
                Some(i) => {
                    self.history.remove(i);
                }
                None => break,
            }
        }
    }
}

/// Aggregate counters for the lifetime of the controller (or an imported
/// learning blob).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    pub total_runs: usize,
    pub successful_runs: usize,
    pub total_duration_ms: u64,
    pub total_score: f32,
}

impl SessionMetrics {
    pub fn average_duration_ms(&self) -> f64 {
        if self.total_runs == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.total_runs as f64
        }
    }

    pub fn average_score(&self) -> f32 {
        if self.total_runs == 0 {
            0.0
        } else {
            self.total_score / self.total_runs as f32
        }
    }
}

/// The complete learned state: what the export blob carries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningState {
    pub profiles: BTreeMap<Viseme, LearnedVisemeProfile>,
    pub effectiveness: EffectivenessTable,
    pub metrics: SessionMetrics,
}

/// Snapshot handed to progress callbacks.
#[derive(Debug, Clone, Copy)]
pub struct ProgressUpdate {
    pub viseme: Viseme,
    pub iteration: usize,
    pub best_score: f32,
    pub elapsed_ms: u64,
    pub violated_count: usize,
}

/// Registered observers; a failing callback is logged and skipped, it never
/// affects the run.
pub type ProgressCallback =
    Box<dyn Fn(&ProgressUpdate) -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send + Sync>;

/// One-shot snapshot handed to completion callbacks when a run finishes.
#[derive(Debug, Clone, Copy)]
pub struct CompletionUpdate {
    pub viseme: Viseme,
    pub final_score: f32,
    /// Best adjusted score minus the first iteration's adjusted score.
    pub score_delta: f32,
    pub duration_ms: u64,
    pub iterations: usize,
    pub success: bool,
}

pub type CompletionCallback =
    Box<dyn Fn(&CompletionUpdate) -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send + Sync>;

/// Clears the busy flag when the run ends, on every exit path.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the optimizer and the learned state for one face.
pub struct AdaptiveController {
    optimizer: MorphOptimizer,
    config: ControllerConfig,
    state: Arc<RwLock<LearningState>>,
    busy: AtomicBool,
    callbacks: Arc<Mutex<Vec<ProgressCallback>>>,
    completion_callbacks: Mutex<Vec<CompletionCallback>>,
}

impl AdaptiveController {
    pub fn new(optimizer: MorphOptimizer, config: ControllerConfig) -> Self {
        Self {
            optimizer,
            config,
            state: Arc::new(RwLock::new(LearningState::default())),
            busy: AtomicBool::new(false),
            callbacks: Arc::new(Mutex::new(Vec::new())),
            completion_callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Register a progress observer. Callbacks fire on the notification
    /// interval while a run is in flight.
    pub fn on_progress(&self, callback: ProgressCallback) {
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.push(callback);
        }
    }

    /// Register a completion observer. Fires exactly once per finished run,
    /// after the progress ticker has stopped.
    pub fn on_complete(&self, callback: CompletionCallback) {
        if let Ok(mut callbacks) = self.completion_callbacks.lock() {
            callbacks.push(callback);
        }
    }

    /// Read access to the learned state, for inspection and export.
    pub fn state(&self) -> Arc<RwLock<LearningState>> {
        Arc::clone(&self.state)
    }

    pub fn session_metrics(&self) -> SessionMetrics {
        self.state
            .read()
            .map(|s| s.metrics)
            .unwrap_or_default()
    }

    pub fn profile(&self, viseme: Viseme) -> Option<LearnedVisemeProfile> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.profiles.get(&viseme).cloned())
    }

    /// Serialize the learned state into a versioned, host-storable blob.
    pub fn export_learning_data(&self) -> EngineResult<String> {
        let state = self
            .state
            .read()
            .map_err(|_| EngineError::Config("learning state lock poisoned".into()))?;
        crate::persistence::export_learning_data(&state)
    }

    /// Replace the learned state from an exported blob. A version mismatch
    /// leaves the current state untouched.
    pub fn import_learning_data(&self, blob: &str) -> EngineResult<()> {
        if let Some(imported) = crate::persistence::import_learning_data(blob)? {
            let mut state = self
                .state
                .write()
                .map_err(|_| EngineError::Config("learning state lock poisoned".into()))?;
            *state = imported;
        }
        Ok(())
    }

    /// Run one adaptive optimization for a viseme.
    ///
    /// Fails fast with [`EngineError::Busy`] when a run is already in
    /// flight; no state is touched in that case.
    #[allow(clippy::too_many_arguments)]
    pub async fn optimize_viseme(
        &self,
        viseme: Viseme,
        initial: &MorphConfiguration,
        render: &dyn RenderTarget,
        capture: &dyn FrameCapture,
        analyzer: &dyn VisemeAnalyzer,
        options: &OptimizeConfig,
        cancel: watch::Receiver<bool>,
    ) -> EngineResult<OptimizationOutcome> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::Busy);
        }
        let _guard = BusyGuard(&self.busy);

        let (tuned, seeded, effectiveness) = {
            let state = self
                .state
                .read()
                .map_err(|_| EngineError::Config("learning state lock poisoned".into()))?;
            match state.profiles.get(&viseme) {
                Some(profile) => (
                    profile.tuned_config(options, self.config.min_runs_for_profile),
                    profile.seeded_initial(initial, &state.effectiveness),
                    state.effectiveness.snapshot(),
                ),
                None => (
                    options.clone(),
                    initial.clone(),
                    state.effectiveness.snapshot(),
                ),
            }
        };

        let started = Instant::now();
        let (progress_tx, progress_rx) = watch::channel(IterationProgress::default());
        let (done_tx, done_rx) = watch::channel(false);
        let ticker = self.spawn_progress_ticker(viseme, started, progress_rx, done_rx);

        let result = self
            .optimizer
            .optimize(
                viseme,
                &seeded,
                render,
                capture,
                analyzer,
                &tuned,
                &effectiveness,
                cancel,
                Some(&progress_tx),
            )
            .await;

        // Stop the ticker deterministically before touching state.
        let _ = done_tx.send(true);
        let _ = ticker.await;

        let outcome = result?;
        self.absorb_outcome(&outcome);
        self.notify_completion(&outcome, started);
        Ok(outcome)
    }

    fn notify_completion(&self, outcome: &OptimizationOutcome, started: Instant) {
        let initial_score = outcome
            .log
            .records
            .first()
            .map(|r| r.adjusted_score)
            .unwrap_or(0.0);
        let update = CompletionUpdate {
            viseme: outcome.viseme,
            final_score: outcome.best_score,
            score_delta: outcome.best_score - initial_score,
            duration_ms: started.elapsed().as_millis() as u64,
            iterations: outcome.iterations_run,
            success: outcome.best_score > self.config.success_score
                && outcome.constraints_satisfied,
        };
        if let Ok(callbacks) = self.completion_callbacks.lock() {
            for callback in callbacks.iter() {
                if let Err(err) = callback(&update) {
                    tracing::warn!(
                        viseme = %update.viseme,
                        error = %err,
                        "completion callback failed"
                    );
                }
            }
        }
    }

    fn spawn_progress_ticker(
        &self,
        viseme: Viseme,
        started: Instant,
        progress_rx: watch::Receiver<IterationProgress>,
        mut done_rx: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let callbacks = Arc::clone(&self.callbacks);
        let period = Duration::from_millis(self.config.progress_interval_ms);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await; // the immediate first tick
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let snapshot = *progress_rx.borrow();
                        let update = ProgressUpdate {
                            viseme,
                            iteration: snapshot.iteration,
                            best_score: snapshot.best_score,
                            elapsed_ms: started.elapsed().as_millis() as u64,
                            violated_count: snapshot.violated_count,
                        };
                        if let Ok(callbacks) = callbacks.lock() {
                            for callback in callbacks.iter() {
                                if let Err(err) = callback(&update) {
                                    tracing::warn!(
                                        viseme = %viseme,
                                        error = %err,
                                        "progress callback failed"
                                    );
                                }
                            }
                        }
                    }
                    _ = done_rx.changed() => break,
                }
            }
        })
    }

    /// Fold a completed run into the learned state.
    fn absorb_outcome(&self, outcome: &OptimizationOutcome) {
        let Ok(mut state) = self.state.write() else {
            tracing::error!("learning state lock poisoned, run not recorded");
            return;
        };

        state.metrics.total_runs += 1;
        state.metrics.total_duration_ms += outcome.log.duration_ms;
        state.metrics.total_score += outcome.best_score;

        let success = outcome.best_score > self.config.success_score
            && outcome.constraints_satisfied;
        if success {
            state.metrics.successful_runs += 1;
        }

        // Effectiveness updates use the whole state, so split the borrow.
        if success {
            let sample = (outcome.best_score / 50.0).clamp(0.1, 2.0);
            let touched: Vec<String> = outcome
                .best_morphs
                .iter()
                .filter(|(_, w)| *w > 0.0)
                .map(|(name, _)| name.to_string())
                .collect();
            for morph in touched {
                state.effectiveness.update(&morph, sample);
            }
        }

        let max_entries = self.config.max_history_entries;
        let profile = state
            .profiles
            .entry(outcome.viseme)
            .or_insert_with(LearnedVisemeProfile::new);

        profile.runs += 1;
        profile.total_iterations += outcome.iterations_run;
        profile.total_duration_ms += outcome.log.duration_ms;
        for record in &outcome.log.records {
            for name in &record.violated {
                *profile.violation_counts.entry(*name).or_insert(0) += 1;
            }
        }

        if outcome.best_score > 90.0 {
            profile.learning_rate_multiplier =
                (profile.learning_rate_multiplier * 1.1).min(1.5);
        } else if outcome.best_score < 60.0 {
            profile.learning_rate_multiplier =
                (profile.learning_rate_multiplier * 0.9).max(0.5);
        }

        if success {
            profile.successes += 1;
            profile.record_success(
                outcome.best_morphs.clone(),
                outcome.best_score,
                max_entries,
            );
        }
    }
}
