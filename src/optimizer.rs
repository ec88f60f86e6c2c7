//! Constrained iterative morph optimization.
//!
//! The optimizer owns no rendering or vision code. It drives three injected
//! collaborators through a render → capture → analyze cycle, scores each
//! iteration against the anatomical constraints, and proposes bounded
//! adjustments through the influence map until the score converges, the
//! iteration or time budget runs out, or the caller cancels.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::config::OptimizeConfig;
use crate::constraint::{ConstraintEvaluator, ConstraintName, ConstraintResult};
use crate::error::{EngineError, EngineResult};
use crate::influence::{InfluenceMap, Metric};
use crate::landmarks::LandmarkSet;
use crate::logging::{self, OptimizationRunFields};
use crate::morph::MorphConfiguration;
use crate::viseme::Viseme;

/// One captured frame handed from the capture collaborator to the analyzer.
/// The optimizer never inspects the pixels.
#[derive(Debug, Clone)]
pub struct FrameImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Deviation of one measured metric from its target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDeviation {
    pub current: f32,
    pub target: f32,
    /// `current − target`.
    pub deviation: f32,
}

impl MetricDeviation {
    pub fn new(current: f32, target: f32) -> Self {
        Self {
            current,
            target,
            deviation: current - target,
        }
    }
}

/// What the analyzer reports for one rendered frame.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// Raw similarity score in [0, 100].
    pub score: f32,
    /// Landmarks detected on the rendered face.
    pub landmarks: LandmarkSet,
    pub deviations: BTreeMap<Metric, MetricDeviation>,
}

/// Applies a morph configuration to the rendered face. Must be idempotent:
/// applying the same configuration twice is a no-op.
#[async_trait]
pub trait RenderTarget: Send + Sync {
    async fn apply_morphs(&self, morphs: &MorphConfiguration) -> EngineResult<()>;
}

/// Captures the current rendered frame.
#[async_trait]
pub trait FrameCapture: Send + Sync {
    async fn capture_frame(&self) -> EngineResult<FrameImage>;
}

/// Scores a frame against a target viseme.
#[async_trait]
pub trait VisemeAnalyzer: Send + Sync {
    async fn analyze(&self, frame: &FrameImage, target: Viseme) -> EngineResult<AnalysisReport>;
}

/// Live snapshot published once per iteration for progress reporting.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationProgress {
    pub iteration: usize,
    pub best_score: f32,
    pub violated_count: usize,
}

/// Record of one optimization iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRecord {
    pub iteration: usize,
    /// Configuration that was applied and measured this iteration.
    pub morphs: MorphConfiguration,
    pub raw_score: f32,
    pub penalty: f32,
    pub adjusted_score: f32,
    pub violated: Vec<ConstraintName>,
    /// Full constraint evaluation of the measured frame.
    pub constraints: BTreeMap<ConstraintName, ConstraintResult>,
    /// Morph deltas applied after this iteration's measurement.
    pub adjustments: BTreeMap<String, f32>,
}

/// Full trace of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationLog {
    pub viseme: Viseme,
    pub records: Vec<IterationRecord>,
    pub duration_ms: u64,
    pub converged: bool,
}

/// Final result of a run.
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub viseme: Viseme,
    pub best_score: f32,
    pub best_morphs: MorphConfiguration,
    pub iterations_run: usize,
    pub converged: bool,
    /// True when the best iteration had no violated constraints.
    pub constraints_satisfied: bool,
    pub log: OptimizationLog,
}

/// Combined constraint penalty: weighted severity sum, escalated by 20% per
/// additional simultaneous violation, capped so the raw score is never
/// erased entirely.
pub(crate) fn compute_penalty(
    results: &BTreeMap<ConstraintName, ConstraintResult>,
    constraint_weight: f32,
    penalty_cap: f32,
) -> f32 {
    let violated: Vec<&ConstraintResult> = results.values().filter(|r| r.violated).collect();
    if violated.is_empty() {
        return 0.0;
    }
    let base: f32 = violated.iter().map(|r| r.severity * constraint_weight).sum();
    let escalation = 1.2f32.powi(violated.len() as i32 - 1);
    (base * escalation).min(penalty_cap)
}

/// Halve any proposal that conflicts with a larger, already-accepted one.
/// Proposals are considered in descending |delta| order.
pub(crate) fn resolve_conflicts(
    proposals: &mut Vec<(String, f32)>,
    influences: &InfluenceMap,
) {
    proposals.sort_by(|a, b| {
        b.1.abs()
            .partial_cmp(&a.1.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut accepted: Vec<String> = Vec::new();
    for (morph, delta) in proposals.iter_mut() {
        if accepted.iter().any(|a| influences.conflicts(a, morph)) {
            *delta /= 2.0;
        }
        accepted.push(morph.clone());
    }
}

/// Drives the render/measure/adjust loop.
pub struct MorphOptimizer {
    evaluator: ConstraintEvaluator,
    influences: InfluenceMap,
}

impl Default for MorphOptimizer {
    fn default() -> Self {
        Self::new(ConstraintEvaluator::default(), InfluenceMap::standard())
    }
}

impl MorphOptimizer {
    pub fn new(evaluator: ConstraintEvaluator, influences: InfluenceMap) -> Self {
        Self {
            evaluator,
            influences,
        }
    }

    pub fn influences(&self) -> &InfluenceMap {
        &self.influences
    }

    /// Run one optimization. `effectiveness` supplies per-morph multipliers
    /// (missing morphs count as 1.0); `cancel` flips to `true` to abort at
    /// the next iteration boundary; `progress` (if given) receives one
    /// snapshot per iteration.
    ///
    /// On every exit, terminal errors included, the best measured
    /// configuration (the initial one when nothing was measured) is
    /// re-applied to the render target.
    #[allow(clippy::too_many_arguments)]
    pub async fn optimize(
        &self,
        viseme: Viseme,
        initial: &MorphConfiguration,
        render: &dyn RenderTarget,
        capture: &dyn FrameCapture,
        analyzer: &dyn VisemeAnalyzer,
        config: &OptimizeConfig,
        effectiveness: &BTreeMap<String, f32>,
        cancel: watch::Receiver<bool>,
        progress: Option<&watch::Sender<IterationProgress>>,
    ) -> EngineResult<OptimizationOutcome> {
        let started = Instant::now();
        let budget = Duration::from_millis(config.max_optimization_time_ms);

        let mut current = initial.clone();
        let mut best_score = f32::NEG_INFINITY;
        let mut best_morphs = current.clone();
        let mut best_violated: Vec<ConstraintName> = Vec::new();
        let mut previous_adjusted: Option<f32> = None;
        let mut converged = false;
        let mut records: Vec<IterationRecord> = Vec::new();

        let loop_result: EngineResult<()> = async {
            for iteration in 0..config.max_iterations {
                if *cancel.borrow() {
                    return Err(EngineError::Cancelled {
                        completed_iterations: iteration,
                    });
                }
                if started.elapsed() >= budget {
                    tracing::warn!(
                        viseme = %viseme,
                        iteration,
                        "optimization time budget exhausted"
                    );
                    break;
                }

                render
                    .apply_morphs(&current)
                    .await
                    .map_err(|err| EngineError::RenderTarget(err.to_string()))?;
                let frame = capture.capture_frame().await?;
                let report = analyzer.analyze(&frame, viseme).await.map_err(|err| {
                    EngineError::Measurement {
                        iteration,
                        reason: err.to_string(),
                    }
                })?;

                let constraints = self.evaluator.evaluate(&report.landmarks);
                let violated: Vec<ConstraintName> = constraints
                    .iter()
                    .filter(|(_, r)| r.violated)
                    .map(|(name, _)| *name)
                    .collect();

                let penalty =
                    compute_penalty(&constraints, config.constraint_weight, config.penalty_cap);
                let adjusted = report.score * (1.0 - penalty);

                if adjusted > best_score {
                    best_score = adjusted;
                    best_morphs = current.clone();
                    best_violated = violated.clone();
                }

                if let Some(sender) = progress {
                    let _ = sender.send(IterationProgress {
                        iteration,
                        best_score,
                        violated_count: violated.len(),
                    });
                }

                if let Some(previous) = previous_adjusted {
                    if adjusted - previous < config.convergence_threshold {
                        records.push(IterationRecord {
                            iteration,
                            morphs: current.clone(),
                            raw_score: report.score,
                            penalty,
                            adjusted_score: adjusted,
                            violated,
                            constraints,
                            adjustments: BTreeMap::new(),
                        });
                        converged = true;
                        break;
                    }
                }
                previous_adjusted = Some(adjusted);

                let adjustments = self.propose_adjustments(
                    &current,
                    &report.deviations,
                    &constraints,
                    config,
                    effectiveness,
                );
                let measured = current.clone();
                for (morph, delta) in &adjustments {
                    current.adjust(morph, *delta);
                }

                records.push(IterationRecord {
                    iteration,
                    morphs: measured,
                    raw_score: report.score,
                    penalty,
                    adjusted_score: adjusted,
                    violated,
                    constraints,
                    adjustments,
                });
            }
            Ok(())
        }
        .await;

        // Whatever ended the loop, leave the face at the best measured
        // configuration, never at a half-adjusted probe.
        let restored = render
            .apply_morphs(&best_morphs)
            .await
            .map_err(|err| EngineError::RenderTarget(err.to_string()));
        loop_result?;
        restored?;

        let duration_ms = started.elapsed().as_millis() as u64;
        let iterations_run = records.len();
        let initial_score = records.first().map(|r| r.adjusted_score).unwrap_or(0.0);
        let constraints_satisfied = best_violated.is_empty();
        let best_score = if best_score.is_finite() { best_score } else { 0.0 };

        if let Err(err) = logging::log_optimization_run(OptimizationRunFields {
            viseme: viseme.as_str(),
            iterations: iterations_run,
            initial_score,
            final_score: best_score,
            constraints_satisfied,
            converged,
            duration_ms,
        }) {
            tracing::warn!(error = %err, "failed to append optimization log");
        }

        Ok(OptimizationOutcome {
            viseme,
            best_score,
            best_morphs,
            iterations_run,
            converged,
            constraints_satisfied,
            log: OptimizationLog {
                viseme,
                records,
                duration_ms,
                converged,
            },
        })
    }

    /// Turn per-metric deviations into per-morph deltas, scaled down where
    /// they overlap violated constraints.
    fn propose_adjustments(
        &self,
        current: &MorphConfiguration,
        deviations: &BTreeMap<Metric, MetricDeviation>,
        constraints: &BTreeMap<ConstraintName, ConstraintResult>,
        config: &OptimizeConfig,
        effectiveness: &BTreeMap<String, f32>,
    ) -> BTreeMap<String, f32> {
        let mut proposals: BTreeMap<String, f32> = BTreeMap::new();

        for (metric, deviation) in deviations {
            if deviation.deviation.abs() <= config.deviation_threshold {
                continue;
            }
            for (morph, direction) in self.influences.morphs_for_metric(*metric) {
                let eff = effectiveness.get(morph).copied().unwrap_or(1.0);
                // Signed to move the metric back toward its target.
                let mut delta = -deviation.deviation * direction * config.learning_rate * eff;

                let overlap = self.constraint_overlap(morph, constraints, config);
                delta *= (1.0 - overlap).clamp(0.0, 1.0);
                if overlap > 0.0 {
                    // Never push hard into a violated region.
                    delta *= 0.3;
                }

                *proposals.entry(morph.to_string()).or_insert(0.0) += delta;
            }
        }

        let mut ordered: Vec<(String, f32)> = proposals.into_iter().collect();
        resolve_conflicts(&mut ordered, &self.influences);

        ordered
            .into_iter()
            .filter(|(_, delta)| delta.abs() > 1e-6)
            .map(|(morph, delta)| {
                // Pre-clamp so the recorded delta matches what gets applied.
                let applied = (current.get(&morph) + delta).clamp(0.0, 1.0) - current.get(&morph);
                (morph, applied)
            })
            .collect()
    }

    /// Weighted severity of violated constraints whose related metrics this
    /// morph touches, in [0, 1).
    fn constraint_overlap(
        &self,
        morph: &str,
        constraints: &BTreeMap<ConstraintName, ConstraintResult>,
        config: &OptimizeConfig,
    ) -> f32 {
        let Some(influence) = self.influences.get(morph) else {
            return 0.0;
        };
        let mut overlap = 0.0;
        for (name, result) in constraints {
            if !result.violated {
                continue;
            }
            if name
                .related_metrics()
                .iter()
                .any(|metric| influence.touches(*metric))
            {
                overlap += result.severity * config.constraint_weight;
            }
        }
        overlap.min(0.95)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(measured: f32, max: f32) -> ConstraintResult {
        let severity = ((measured - max).max(0.0)) / max;
        ConstraintResult {
            measured,
            max_allowed: max,
            violated: measured > max,
            severity,
        }
    }

    #[test]
    fn penalty_is_zero_without_violations() {
        let mut constraints = BTreeMap::new();
        constraints.insert(ConstraintName::Philtrum, result(0.1, 0.15));
        assert_eq!(compute_penalty(&constraints, 0.5, 0.8), 0.0);
    }

    #[test]
    fn single_violation_penalty_is_weighted_severity() {
        let mut constraints = BTreeMap::new();
        // severity (0.3 - 0.15)/0.15 = 1.0
        constraints.insert(ConstraintName::Philtrum, result(0.3, 0.15));
        let penalty = compute_penalty(&constraints, 0.5, 0.8);
        assert!((penalty - 0.5).abs() < 1e-6);
    }

    #[test]
    fn multiple_violations_escalate_by_twenty_percent_each() {
        let mut constraints = BTreeMap::new();
        constraints.insert(ConstraintName::Philtrum, result(0.18, 0.15)); // severity 0.2
        constraints.insert(ConstraintName::LipSymmetry, result(0.12, 0.10)); // severity 0.2
        let penalty = compute_penalty(&constraints, 0.5, 0.8);
        // (0.1 + 0.1) * 1.2 = 0.24
        assert!((penalty - 0.24).abs() < 1e-5);
    }

    #[test]
    fn penalty_caps_at_configured_maximum() {
        let mut constraints = BTreeMap::new();
        constraints.insert(ConstraintName::Philtrum, result(3.0, 0.15));
        constraints.insert(ConstraintName::LipSymmetry, result(1.0, 0.10));
        constraints.insert(ConstraintName::FaceWidth, result(1.0, 0.12));
        let penalty = compute_penalty(&constraints, 0.5, 0.8);
        assert!((penalty - 0.8).abs() < 1e-6);
    }

    #[test]
    fn conflicting_proposal_is_halved() {
        let influences = InfluenceMap::standard();
        let mut proposals = vec![("jawOpen".to_string(), 0.2), ("mouthClose".to_string(), 0.1)];
        resolve_conflicts(&mut proposals, &influences);
        // jawOpen wins on magnitude, mouthClose is halved.
        assert!((proposals[0].1 - 0.2).abs() < 1e-6);
        assert_eq!(proposals[1].0, "mouthClose");
        assert!((proposals[1].1 - 0.05).abs() < 1e-6);
    }

    #[test]
    fn unrelated_proposals_are_untouched() {
        let influences = InfluenceMap::standard();
        let mut proposals = vec![
            ("mouthSmileLeft".to_string(), 0.3),
            ("jawOpen".to_string(), 0.2),
        ];
        resolve_conflicts(&mut proposals, &influences);
        assert!((proposals[0].1 - 0.3).abs() < 1e-6);
        assert!((proposals[1].1 - 0.2).abs() < 1e-6);
    }

    #[test]
    fn metric_deviation_records_signed_difference() {
        let d = MetricDeviation::new(0.4, 0.5);
        assert!((d.deviation + 0.1).abs() < 1e-6);
    }
}
