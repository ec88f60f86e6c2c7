//! Anatomical-plausibility constraint evaluation.
//!
//! Each constraint reads a small fixed set of landmarks, computes a relative
//! deviation from its natural value, and compares it against a maximum. A
//! constraint whose landmarks are missing is skipped, never flagged: partial
//! tracker output must not spuriously fail the whole evaluation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ConstraintThresholds;
use crate::geometry;
use crate::influence::Metric;
use crate::landmarks::{
    LandmarkSet, JAW_LEFT, JAW_RIGHT, LEFT_EYE_OUTER, LEFT_MOUTH_CORNER, NOSE_TIP,
    RIGHT_EYE_OUTER, RIGHT_MOUTH_CORNER, UPPER_LIP_CENTER,
};

/// Named anatomical constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConstraintName {
    Philtrum,
    LipSymmetry,
    FaceWidth,
    EyeNoseRelation,
}

pub const ALL_CONSTRAINTS: [ConstraintName; 4] = [
    ConstraintName::Philtrum,
    ConstraintName::LipSymmetry,
    ConstraintName::FaceWidth,
    ConstraintName::EyeNoseRelation,
];

impl ConstraintName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintName::Philtrum => "philtrum",
            ConstraintName::LipSymmetry => "lipSymmetry",
            ConstraintName::FaceWidth => "faceWidth",
            ConstraintName::EyeNoseRelation => "eyeNoseRelation",
        }
    }

    /// Metrics whose morphs plausibly disturb this constraint. Used by the
    /// optimizer to scale back adjustments that overlap a violation.
    pub fn related_metrics(&self) -> &'static [Metric] {
        match self {
            ConstraintName::Philtrum => &[Metric::JawOpening, Metric::MouthHeight, Metric::LipGap],
            ConstraintName::LipSymmetry => &[Metric::MouthWidth, Metric::Curvature],
            ConstraintName::FaceWidth => &[Metric::MouthWidth],
            ConstraintName::EyeNoseRelation => &[Metric::MouthWidth, Metric::Curvature],
        }
    }
}

impl fmt::Display for ConstraintName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating one constraint against one landmark set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintResult {
    /// Relative deviation from the natural value (dimensionless).
    pub measured: f32,
    /// Maximum allowed relative deviation.
    pub max_allowed: f32,
    pub violated: bool,
    /// `max(0, measured − max_allowed) / max_allowed`; 0 within bounds.
    pub severity: f32,
}

impl ConstraintResult {
    fn from_measure(measured: f32, max_allowed: f32) -> Self {
        let severity = if max_allowed > 0.0 {
            ((measured - max_allowed).max(0.0)) / max_allowed
        } else {
            0.0
        };
        Self {
            measured,
            max_allowed,
            violated: measured > max_allowed,
            severity,
        }
    }
}

/// Evaluates the fixed constraint set against landmark sets.
#[derive(Debug, Clone)]
pub struct ConstraintEvaluator {
    thresholds: ConstraintThresholds,
}

impl Default for ConstraintEvaluator {
    fn default() -> Self {
        Self::new(ConstraintThresholds::default())
    }
}

impl ConstraintEvaluator {
    pub fn new(thresholds: ConstraintThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ConstraintThresholds {
        &self.thresholds
    }

    /// Evaluate every constraint whose landmarks are present.
    pub fn evaluate(&self, landmarks: &LandmarkSet) -> BTreeMap<ConstraintName, ConstraintResult> {
        let mut results = BTreeMap::new();

        if let Some(result) = self.philtrum(landmarks) {
            results.insert(ConstraintName::Philtrum, result);
        }
        if let Some(result) = self.lip_symmetry(landmarks) {
            results.insert(ConstraintName::LipSymmetry, result);
        }
        if let Some(result) = self.face_width(landmarks) {
            results.insert(ConstraintName::FaceWidth, result);
        }
        if let Some(result) = self.eye_nose_relation(landmarks) {
            results.insert(ConstraintName::EyeNoseRelation, result);
        }

        results
    }

    /// Vertical philtrum stretch: upper-lip-center to nose-tip distance vs.
    /// the expected natural length.
    fn philtrum(&self, landmarks: &LandmarkSet) -> Option<ConstraintResult> {
        let upper = landmarks.point(UPPER_LIP_CENTER)?;
        let nose = landmarks.point(NOSE_TIP)?;

        let length = geometry::distance(upper, nose);
        let natural = self.thresholds.philtrum_natural;
        let relative_stretch = (length - natural).max(0.0) / natural;

        Some(ConstraintResult::from_measure(
            relative_stretch,
            self.thresholds.philtrum_max_stretch,
        ))
    }

    /// Left vs. right corner-to-lip-center distance asymmetry.
    fn lip_symmetry(&self, landmarks: &LandmarkSet) -> Option<ConstraintResult> {
        let left = landmarks.point(LEFT_MOUTH_CORNER)?;
        let right = landmarks.point(RIGHT_MOUTH_CORNER)?;
        let center = landmarks.point(UPPER_LIP_CENTER)?;

        let dl = geometry::distance(left, center);
        let dr = geometry::distance(right, center);
        let longer = dl.max(dr);
        let asymmetry = if longer < 1e-6 {
            0.0
        } else {
            (dl - dr).abs() / longer
        };

        Some(ConstraintResult::from_measure(
            asymmetry,
            self.thresholds.lip_symmetry_max,
        ))
    }

    /// Jaw-to-jaw width vs. the expected natural face width.
    fn face_width(&self, landmarks: &LandmarkSet) -> Option<ConstraintResult> {
        let left = landmarks.point(JAW_LEFT)?;
        let right = landmarks.point(JAW_RIGHT)?;

        let width = geometry::distance_2d(left, right);
        let natural = self.thresholds.face_width_natural;
        let deviation = (width - natural).abs() / natural;

        Some(ConstraintResult::from_measure(
            deviation,
            self.thresholds.face_width_max_deviation,
        ))
    }

    /// Nose-tip horizontal offset from the eye-corner midpoint.
    fn eye_nose_relation(&self, landmarks: &LandmarkSet) -> Option<ConstraintResult> {
        let nose = landmarks.point(NOSE_TIP)?;
        let left_eye = landmarks.point(LEFT_EYE_OUTER)?;
        let right_eye = landmarks.point(RIGHT_EYE_OUTER)?;

        let mid_x = (left_eye.x + right_eye.x) / 2.0;
        let offset = (nose.x - mid_x).abs();
        let expected = self.thresholds.eye_nose_expected;
        let excess = (offset - expected).max(0.0) / expected;

        Some(ConstraintResult::from_measure(
            excess,
            self.thresholds.eye_nose_max_excess,
        ))
    }
}
