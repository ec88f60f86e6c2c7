//! Landmark set type and the fixed index tables used to extract named
//! facial regions.
//!
//! Index tables follow the 468-point MediaPipe FaceMesh convention. A
//! `LandmarkSet` is immutable once constructed and is owned by the caller
//! of a single classification or measurement call.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Number of points in a full face mesh.
pub const LANDMARK_COUNT: usize = 468;

/// A tracked 3D point in normalized image space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Point3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Outer mouth ring, ordered clockwise starting at the left corner.
pub const OUTER_MOUTH_RING: [usize; 20] = [
    61, 146, 91, 181, 84, 17, 314, 405, 321, 375, 291, 409, 270, 269, 267, 0, 37, 39, 40, 185,
];

/// Inner mouth ring, ordered clockwise starting at the left corner.
pub const INNER_MOUTH_RING: [usize; 20] = [
    78, 95, 88, 178, 87, 14, 317, 402, 318, 324, 308, 415, 310, 311, 312, 13, 82, 81, 80, 191,
];

/// Upper lip samples, left to right, used for lip-separation pairing.
pub const UPPER_LIP: [usize; 5] = [82, 81, 13, 311, 312];

/// Lower lip samples, left to right, paired with [`UPPER_LIP`].
pub const LOWER_LIP: [usize; 5] = [88, 178, 14, 402, 318];

pub const LEFT_MOUTH_CORNER: usize = 61;
pub const RIGHT_MOUTH_CORNER: usize = 291;
pub const UPPER_LIP_CENTER: usize = 0;
pub const LOWER_LIP_CENTER: usize = 17;
pub const INNER_UPPER_LIP_CENTER: usize = 13;
pub const INNER_LOWER_LIP_CENTER: usize = 14;
pub const NOSE_TIP: usize = 1;
pub const CHIN: usize = 152;
pub const JAW_LEFT: usize = 234;
pub const JAW_RIGHT: usize = 454;
pub const LEFT_EYE_OUTER: usize = 33;
pub const RIGHT_EYE_OUTER: usize = 263;

/// Ordered sequence of 468 face landmarks captured from one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandmarkSet {
    points: Vec<Point3>,
}

impl LandmarkSet {
    /// Construct from exactly [`LANDMARK_COUNT`] points.
    pub fn new(points: Vec<Point3>) -> EngineResult<Self> {
        if points.len() != LANDMARK_COUNT {
            return Err(EngineError::InvalidLandmarks {
                expected: LANDMARK_COUNT,
                got: points.len(),
            });
        }
        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Point at a fixed table index, or `None` when out of range.
    ///
    /// The `None` path only fires for landmark sets produced by partial
    /// trackers; constraint evaluation skips (never flags) on it.
    pub fn point(&self, index: usize) -> Option<&Point3> {
        self.points.get(index)
    }

    /// Extract the points for an index table; `None` if any index is missing.
    pub fn subset(&self, indices: &[usize]) -> Option<Vec<Point3>> {
        indices
            .iter()
            .map(|&i| self.points.get(i).copied())
            .collect()
    }

    /// Construct a partial set for testing trackers that emit fewer points.
    /// Constraint evaluation treats missing indices as "skip".
    pub fn partial(points: Vec<Point3>) -> Self {
        Self { points }
    }
}
