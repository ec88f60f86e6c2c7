//! Landmark-to-viseme classification with temporal smoothing and throttling.
//!
//! One classifier instance serves one face stream at up to 30 Hz. Calls are
//! infallible by contract: any failure during feature extraction or
//! classification falls back to the last valid result (or a neutral silence
//! result on cold start) because a missed frame must never stall the
//! caller's render loop.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::time::Instant;

use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::config::ClassifierOptions;
use crate::error::EngineResult;
use crate::geometry;
use crate::landmarks::{
    LandmarkSet, CHIN, INNER_MOUTH_RING, LEFT_MOUTH_CORNER, LOWER_LIP, NOSE_TIP,
    OUTER_MOUTH_RING, RIGHT_MOUTH_CORNER, UPPER_LIP, UPPER_LIP_CENTER,
};
use crate::morph::MorphConfiguration;
use crate::viseme::{Viseme, ALL_VISEMES};

/// Scalar measurements derived from one landmark set.
///
/// Recomputed every frame; never persisted beyond one classification cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeometricFeatures {
    pub mouth_width: f32,
    pub mouth_height: f32,
    pub mouth_area: f32,
    pub lip_separation: f32,
    pub aspect_ratio: f32,
    pub curvature: f32,
    pub roundness: f32,
    pub jaw_opening: f32,
}

impl GeometricFeatures {
    /// Extract all features from a landmark set.
    pub fn from_landmarks(landmarks: &LandmarkSet) -> EngineResult<Self> {
        let missing = || crate::error::EngineError::InvalidLandmarks {
            expected: crate::landmarks::LANDMARK_COUNT,
            got: landmarks.len(),
        };

        let outer = landmarks.subset(&OUTER_MOUTH_RING).ok_or_else(missing)?;
        let upper = landmarks.subset(&UPPER_LIP).ok_or_else(missing)?;
        let lower = landmarks.subset(&LOWER_LIP).ok_or_else(missing)?;
        let inner = landmarks.subset(&INNER_MOUTH_RING).ok_or_else(missing)?;

        let left = *landmarks.point(LEFT_MOUTH_CORNER).ok_or_else(missing)?;
        let right = *landmarks.point(RIGHT_MOUTH_CORNER).ok_or_else(missing)?;
        let top = *landmarks.point(UPPER_LIP_CENTER).ok_or_else(missing)?;
        let nose = *landmarks.point(NOSE_TIP).ok_or_else(missing)?;
        let chin = *landmarks.point(CHIN).ok_or_else(missing)?;

        let mouth_width = geometry::distance(&left, &right);
        let upper_mid = geometry::centroid(&upper);
        let lower_mid = geometry::centroid(&lower);
        let mouth_height = geometry::distance(&upper_mid, &lower_mid);
        let mouth_area = geometry::polygon_area(&outer);
        let lip_separation = geometry::mean_lip_separation(&upper, &lower);
        let aspect_ratio = if mouth_width > 1e-6 {
            mouth_height / mouth_width
        } else {
            0.0
        };
        let curvature = geometry::mouth_curvature(&left, &right, &top);
        let roundness = geometry::roundness(&inner);

        // Vertical + depth magnitude of nose-to-chin travel.
        let dy = chin.y - nose.y;
        let dz = chin.z - nose.z;
        let jaw_opening = (dy * dy + dz * dz).sqrt();

        Ok(Self {
            mouth_width,
            mouth_height,
            mouth_area,
            lip_separation,
            aspect_ratio,
            curvature,
            roundness,
            jaw_opening,
        })
    }
}

/// Result of classifying one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub viseme: Viseme,
    pub confidence: f32,
    pub morph_targets: MorphConfiguration,
    pub features: GeometricFeatures,
    /// Ranked runner-up labels with their raw similarity scores.
    pub alternatives: Vec<(Viseme, f32)>,
    pub processing_time_ms: f32,
    /// True when the throttle or the feature cache served this result.
    pub served_from_cache: bool,
}

impl ClassificationResult {
    fn neutral() -> Self {
        Self {
            viseme: Viseme::Sil,
            confidence: 0.0,
            morph_targets: Viseme::Sil.base_weights(),
            features: GeometricFeatures {
                mouth_width: 0.0,
                mouth_height: 0.0,
                mouth_area: 0.0,
                lip_separation: 0.0,
                aspect_ratio: 0.0,
                curvature: 0.0,
                roundness: 0.0,
                jaw_opening: 0.0,
            },
            alternatives: Vec::new(),
            processing_time_ms: 0.0,
            served_from_cache: false,
        }
    }
}

/// Feature signature quantized to 3 decimal places so near-identical frames
/// hit the cache despite floating-point jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FeatureKey([i32; 5]);

impl FeatureKey {
    fn from_features(f: &GeometricFeatures) -> Self {
        let q = |v: f32| (v * 1000.0).round() as i32;
        Self([
            q(f.mouth_width),
            q(f.lip_separation),
            q(f.jaw_opening),
            q(f.roundness),
            q(f.curvature),
        ])
    }
}

#[derive(Debug, Clone, Copy)]
struct HistoryEntry {
    viseme: Viseme,
    confidence: f32,
}

/// Feature prototype per viseme used by the rule-based model.
///
/// Targets are in normalized image units for a face spanning roughly 40% of
/// the frame; similarity is 1 − weighted mean absolute difference.
fn prototype(viseme: Viseme) -> [f32; 4] {
    // [lip_separation, mouth_width, jaw_opening, roundness]
    match viseme {
        Viseme::Sil => [0.010, 0.10, 0.12, 0.35],
        Viseme::PP => [0.000, 0.10, 0.10, 0.30],
        Viseme::FF => [0.012, 0.11, 0.12, 0.30],
        Viseme::TH => [0.020, 0.11, 0.14, 0.35],
        Viseme::DD => [0.018, 0.11, 0.13, 0.35],
        Viseme::KK => [0.022, 0.10, 0.15, 0.35],
        Viseme::CH => [0.020, 0.09, 0.14, 0.55],
        Viseme::SS => [0.010, 0.13, 0.12, 0.25],
        Viseme::NN => [0.012, 0.10, 0.12, 0.35],
        Viseme::RR => [0.018, 0.09, 0.13, 0.50],
        Viseme::AA => [0.055, 0.11, 0.19, 0.55],
        Viseme::E => [0.030, 0.13, 0.17, 0.35],
        Viseme::IH => [0.020, 0.14, 0.14, 0.25],
        Viseme::OH => [0.045, 0.08, 0.19, 0.70],
        Viseme::OU => [0.020, 0.06, 0.14, 0.80],
    }
}

/// Per-feature scales that normalize the absolute differences.
const FEATURE_SCALES: [f32; 4] = [0.05, 0.08, 0.12, 0.5];
/// Relative weights of the four prototype features.
const FEATURE_WEIGHTS: [f32; 4] = [0.4, 0.2, 0.25, 0.15];

fn similarity(features: &GeometricFeatures, target: &[f32; 4]) -> f32 {
    let observed = [
        features.lip_separation,
        features.mouth_width,
        features.jaw_opening,
        features.roundness,
    ];
    let mut d = 0.0;
    for i in 0..4 {
        d += FEATURE_WEIGHTS[i] * ((observed[i] - target[i]).abs() / FEATURE_SCALES[i]).min(1.0);
    }
    (1.0 - d).clamp(0.0, 1.0)
}

/// Rank all visemes by similarity, best first.
fn rank_visemes(features: &GeometricFeatures) -> Vec<(Viseme, f32)> {
    let mut ranked: Vec<(Viseme, f32)> = ALL_VISEMES
        .iter()
        .map(|&v| (v, similarity(features, &prototype(v))))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}

/// Stateful per-stream classifier.
pub struct VisemeClassifier {
    options: ClassifierOptions,
    history: VecDeque<HistoryEntry>,
    previous_weights: Option<MorphConfiguration>,
    last_result: Option<ClassificationResult>,
    last_accepted: Option<Instant>,
    cache: LruCache<FeatureKey, Vec<(Viseme, f32)>>,
    cache_hits: u64,
    cache_misses: u64,
}

impl VisemeClassifier {
    pub fn new(options: ClassifierOptions) -> Self {
        let capacity = NonZeroUsize::new(options.cache_capacity.max(1))
            .unwrap_or_else(|| NonZeroUsize::new(1).unwrap());
        Self {
            options,
            history: VecDeque::new(),
            previous_weights: None,
            last_result: None,
            last_accepted: None,
            cache: LruCache::new(capacity),
            cache_hits: 0,
            cache_misses: 0,
        }
    }

    pub fn options(&self) -> &ClassifierOptions {
        &self.options
    }

    /// (hits, misses) for the quantized-feature result cache.
    pub fn cache_stats(&self) -> (u64, u64) {
        (self.cache_hits, self.cache_misses)
    }

    /// Classify one frame at the current instant. Never fails; see the
    /// module docs for the fallback policy.
    pub fn classify(&mut self, landmarks: &LandmarkSet) -> ClassificationResult {
        self.classify_at(landmarks, Instant::now())
    }

    /// Classify one frame with an explicit timestamp. The timestamp drives
    /// fast-mode throttling and the reported processing time.
    pub fn classify_at(
        &mut self,
        landmarks: &LandmarkSet,
        timestamp: Instant,
    ) -> ClassificationResult {
        let started = timestamp;

        if self.options.fast_mode {
            let frame_budget_ms = 1000.0 / self.options.target_fps;
            if let (Some(last), Some(result)) = (self.last_accepted, self.last_result.as_ref()) {
                if (started.duration_since(last).as_secs_f32() * 1000.0) < frame_budget_ms {
                    let mut throttled = result.clone();
                    throttled.served_from_cache = true;
                    return throttled;
                }
            }
        }

        match self.classify_inner(landmarks, started) {
            Ok(result) => {
                self.last_accepted = Some(started);
                self.last_result = Some(result.clone());
                result
            }
            Err(err) => {
                tracing::warn!(error = %err, "classification failed, serving fallback");
                match self.last_result.as_ref() {
                    Some(previous) => {
                        let mut fallback = previous.clone();
                        fallback.served_from_cache = true;
                        fallback
                    }
                    None => ClassificationResult::neutral(),
                }
            }
        }
    }

    fn classify_inner(
        &mut self,
        landmarks: &LandmarkSet,
        started: Instant,
    ) -> EngineResult<ClassificationResult> {
        let features = GeometricFeatures::from_landmarks(landmarks)?;

        let key = FeatureKey::from_features(&features);
        let (ranked, cached) = match self.cache.get(&key) {
            Some(ranked) => {
                self.cache_hits += 1;
                (ranked.clone(), true)
            }
            None => {
                self.cache_misses += 1;
                let ranked = rank_visemes(&features);
                self.cache.put(key, ranked.clone());
                (ranked, false)
            }
        };

        let (raw_viseme, raw_score) = ranked[0];
        let alternatives: Vec<(Viseme, f32)> = ranked.iter().skip(1).take(3).copied().collect();

        // Geometry-quality factor: a mouth smaller than the expected minimum
        // shrinks trust in the frame proportionally.
        let quality = (features.mouth_width / self.options.min_mouth_width).clamp(0.0, 1.0);
        let frame_confidence = raw_score * quality;

        // Temporal vote over the last 3 frames including this one.
        self.history.push_back(HistoryEntry {
            viseme: raw_viseme,
            confidence: frame_confidence,
        });
        while self.history.len() > self.options.history_len {
            self.history.pop_front();
        }

        let recent = self.history.iter().rev().take(3);
        let best_recent = recent
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .copied()
            .unwrap_or(HistoryEntry {
                viseme: raw_viseme,
                confidence: frame_confidence,
            });

        let voted_viseme = best_recent.viseme;
        let voted_confidence = (frame_confidence + best_recent.confidence) / 2.0;

        // Stability blend with the historical mean, 70/30.
        let historical_mean = if self.history.is_empty() {
            voted_confidence
        } else {
            self.history.iter().map(|h| h.confidence).sum::<f32>() / self.history.len() as f32
        };
        let confidence = (0.7 * voted_confidence + 0.3 * historical_mean).clamp(0.0, 1.0);

        // Base table scaled by confidence, then smoothed toward last frame.
        let scaled = voted_viseme.base_weights().scaled(confidence);
        let morph_targets = match self.previous_weights.as_ref() {
            Some(previous) => scaled.blend_toward(previous, self.options.smoothing_factor),
            None => scaled,
        };
        self.previous_weights = Some(morph_targets.clone());

        let processing_time_ms = started.elapsed().as_secs_f32() * 1000.0;
        if self.options.log_frames {
            if let Err(err) = crate::logging::log_classification(
                voted_viseme.as_str(),
                confidence,
                processing_time_ms,
                cached,
            ) {
                tracing::warn!(error = %err, "failed to append classification log");
            }
        }

        Ok(ClassificationResult {
            viseme: voted_viseme,
            confidence,
            morph_targets,
            features,
            alternatives,
            processing_time_ms,
            served_from_cache: cached,
        })
    }
}
