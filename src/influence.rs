//! Static knowledge base linking morph targets to the facial metrics they
//! move and to the morphs they conflict with.
//!
//! This is configuration data, not derived at runtime: the optimizer only
//! queries it, so new morphs can be registered without touching the control
//! flow. Directions record whether raising the morph raises (+1) or lowers
//! (−1) the metric.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Scalar facial measurements the analyzer reports deviations for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    LipGap,
    MouthWidth,
    MouthHeight,
    MouthArea,
    JawOpening,
    Roundness,
    Curvature,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::LipGap => "lipGap",
            Metric::MouthWidth => "mouthWidth",
            Metric::MouthHeight => "mouthHeight",
            Metric::MouthArea => "mouthArea",
            Metric::JawOpening => "jawOpening",
            Metric::Roundness => "roundness",
            Metric::Curvature => "curvature",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lipGap" => Ok(Metric::LipGap),
            "mouthWidth" => Ok(Metric::MouthWidth),
            "mouthHeight" => Ok(Metric::MouthHeight),
            "mouthArea" => Ok(Metric::MouthArea),
            "jawOpening" => Ok(Metric::JawOpening),
            "roundness" => Ok(Metric::Roundness),
            "curvature" => Ok(Metric::Curvature),
            other => Err(format!("unknown metric: {other}")),
        }
    }
}

/// One metric a morph moves, with the direction of the effect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricEffect {
    pub metric: Metric,
    /// +1.0 when raising the morph raises the metric, −1.0 when it lowers it.
    pub direction: f32,
}

impl MetricEffect {
    pub fn raises(metric: Metric) -> Self {
        Self { metric, direction: 1.0 }
    }

    pub fn lowers(metric: Metric) -> Self {
        Self { metric, direction: -1.0 }
    }
}

/// Static record for one morph target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MorphInfluence {
    /// Metrics this morph is the main driver for.
    pub primary: Vec<MetricEffect>,
    /// Metrics it also nudges.
    pub secondary: Vec<MetricEffect>,
    /// Morphs that must not be raised together with this one.
    pub conflicts: Vec<String>,
}

impl MorphInfluence {
    /// Direction of this morph's effect on a metric, primary first.
    /// `None` when the morph does not move the metric at all.
    pub fn effect_on(&self, metric: Metric) -> Option<f32> {
        self.primary
            .iter()
            .chain(self.secondary.iter())
            .find(|e| e.metric == metric)
            .map(|e| e.direction)
    }

    pub fn touches(&self, metric: Metric) -> bool {
        self.effect_on(metric).is_some()
    }
}

/// Lookup table from morph name to its influence record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfluenceMap {
    entries: BTreeMap<String, MorphInfluence>,
}

impl InfluenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard ARKit-style mouth morph set.
    pub fn standard() -> Self {
        let mut map = Self::new();

        map.insert(
            "jawOpen",
            MorphInfluence {
                primary: vec![
                    MetricEffect::raises(Metric::JawOpening),
                    MetricEffect::raises(Metric::MouthHeight),
                ],
                secondary: vec![
                    MetricEffect::raises(Metric::LipGap),
                    MetricEffect::raises(Metric::MouthArea),
                ],
                conflicts: vec!["mouthClose".into()],
            },
        );
        map.insert(
            "mouthClose",
            MorphInfluence {
                primary: vec![MetricEffect::lowers(Metric::LipGap)],
                secondary: vec![
                    MetricEffect::lowers(Metric::MouthHeight),
                    MetricEffect::lowers(Metric::MouthArea),
                ],
                conflicts: vec!["jawOpen".into()],
            },
        );
        map.insert(
            "mouthFunnel",
            MorphInfluence {
                primary: vec![MetricEffect::raises(Metric::Roundness)],
                secondary: vec![
                    MetricEffect::lowers(Metric::MouthWidth),
                    MetricEffect::raises(Metric::LipGap),
                ],
                conflicts: vec!["mouthPressLeft".into(), "mouthPressRight".into()],
            },
        );
        map.insert(
            "mouthPucker",
            MorphInfluence {
                primary: vec![
                    MetricEffect::lowers(Metric::MouthWidth),
                    MetricEffect::raises(Metric::Roundness),
                ],
                secondary: vec![MetricEffect::lowers(Metric::MouthArea)],
                conflicts: vec!["mouthStretchLeft".into(), "mouthStretchRight".into()],
            },
        );
        map.insert(
            "mouthStretchLeft",
            MorphInfluence {
                primary: vec![MetricEffect::raises(Metric::MouthWidth)],
                secondary: vec![MetricEffect::lowers(Metric::Roundness)],
                conflicts: vec!["mouthPucker".into(), "mouthStretchRight".into()],
            },
        );
        map.insert(
            "mouthStretchRight",
            MorphInfluence {
                primary: vec![MetricEffect::raises(Metric::MouthWidth)],
                secondary: vec![MetricEffect::lowers(Metric::Roundness)],
                conflicts: vec!["mouthPucker".into(), "mouthStretchLeft".into()],
            },
        );
        map.insert(
            "mouthSmileLeft",
            MorphInfluence {
                primary: vec![MetricEffect::raises(Metric::Curvature)],
                secondary: vec![MetricEffect::raises(Metric::MouthWidth)],
                conflicts: vec!["mouthFrownLeft".into()],
            },
        );
        map.insert(
            "mouthSmileRight",
            MorphInfluence {
                primary: vec![MetricEffect::raises(Metric::Curvature)],
                secondary: vec![MetricEffect::raises(Metric::MouthWidth)],
                conflicts: vec!["mouthFrownRight".into()],
            },
        );
        map.insert(
            "mouthFrownLeft",
            MorphInfluence {
                primary: vec![MetricEffect::lowers(Metric::Curvature)],
                secondary: vec![],
                conflicts: vec!["mouthSmileLeft".into()],
            },
        );
        map.insert(
            "mouthFrownRight",
            MorphInfluence {
                primary: vec![MetricEffect::lowers(Metric::Curvature)],
                secondary: vec![],
                conflicts: vec!["mouthSmileRight".into()],
            },
        );
        map.insert(
            "mouthPressLeft",
            MorphInfluence {
                primary: vec![MetricEffect::lowers(Metric::LipGap)],
                secondary: vec![MetricEffect::lowers(Metric::MouthHeight)],
                conflicts: vec!["mouthFunnel".into()],
            },
        );
        map.insert(
            "mouthPressRight",
            MorphInfluence {
                primary: vec![MetricEffect::lowers(Metric::LipGap)],
                secondary: vec![MetricEffect::lowers(Metric::MouthHeight)],
                conflicts: vec!["mouthFunnel".into()],
            },
        );
        map.insert(
            "mouthLowerDownLeft",
            MorphInfluence {
                primary: vec![MetricEffect::raises(Metric::LipGap)],
                secondary: vec![MetricEffect::raises(Metric::MouthHeight)],
                conflicts: vec![],
            },
        );
        map.insert(
            "mouthLowerDownRight",
            MorphInfluence {
                primary: vec![MetricEffect::raises(Metric::LipGap)],
                secondary: vec![MetricEffect::raises(Metric::MouthHeight)],
                conflicts: vec![],
            },
        );
        map.insert(
            "mouthRollLower",
            MorphInfluence {
                primary: vec![MetricEffect::lowers(Metric::LipGap)],
                secondary: vec![],
                conflicts: vec!["mouthLowerDownLeft".into(), "mouthLowerDownRight".into()],
            },
        );
        map.insert(
            "tongueOut",
            MorphInfluence {
                primary: vec![],
                secondary: vec![MetricEffect::raises(Metric::LipGap)],
                conflicts: vec!["mouthClose".into()],
            },
        );

        map
    }

    pub fn insert(&mut self, name: &str, influence: MorphInfluence) {
        self.entries.insert(name.to_string(), influence);
    }

    pub fn get(&self, name: &str) -> Option<&MorphInfluence> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Morphs that can move `metric`, with the direction of their effect.
    pub fn morphs_for_metric(&self, metric: Metric) -> Vec<(&str, f32)> {
        self.entries
            .iter()
            .filter_map(|(name, inf)| inf.effect_on(metric).map(|dir| (name.as_str(), dir)))
            .collect()
    }

    /// Whether two morphs are declared mutually conflicting (either side).
    pub fn conflicts(&self, a: &str, b: &str) -> bool {
        let listed = |x: &str, y: &str| {
            self.entries
                .get(x)
                .map(|inf| inf.conflicts.iter().any(|c| c == y))
                .unwrap_or(false)
        };
        listed(a, b) || listed(b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_map_links_jaw_to_opening() {
        let map = InfluenceMap::standard();
        let jaw = map.get("jawOpen").unwrap();
        assert_eq!(jaw.effect_on(Metric::JawOpening), Some(1.0));
        assert_eq!(jaw.effect_on(Metric::LipGap), Some(1.0));
        assert_eq!(jaw.effect_on(Metric::Curvature), None);
    }

    #[test]
    fn conflicts_are_symmetric() {
        let map = InfluenceMap::standard();
        assert!(map.conflicts("jawOpen", "mouthClose"));
        assert!(map.conflicts("mouthClose", "jawOpen"));
        assert!(map.conflicts("mouthStretchLeft", "mouthStretchRight"));
        assert!(!map.conflicts("jawOpen", "mouthPucker"));
    }

    #[test]
    fn metric_query_finds_movers() {
        let map = InfluenceMap::standard();
        let movers = map.morphs_for_metric(Metric::LipGap);
        assert!(movers.iter().any(|(n, d)| *n == "mouthClose" && *d < 0.0));
        assert!(movers.iter().any(|(n, d)| *n == "jawOpen" && *d > 0.0));
    }

    #[test]
    fn map_extends_without_touching_existing_entries() {
        let mut map = InfluenceMap::standard();
        let before = map.len();
        map.insert(
            "cheekPuff",
            MorphInfluence {
                primary: vec![MetricEffect::raises(Metric::MouthArea)],
                secondary: vec![],
                conflicts: vec![],
            },
        );
        assert_eq!(map.len(), before + 1);
        assert!(map.get("jawOpen").is_some());
    }

    #[test]
    fn metric_names_round_trip() {
        for m in [
            Metric::LipGap,
            Metric::MouthWidth,
            Metric::MouthHeight,
            Metric::MouthArea,
            Metric::JawOpening,
            Metric::Roundness,
            Metric::Curvature,
        ] {
            assert_eq!(m.as_str().parse::<Metric>().unwrap(), m);
        }
    }
}
