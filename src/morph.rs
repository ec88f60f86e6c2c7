//! Morph target configuration: the central currency of the engine.
//!
//! A `MorphConfiguration` maps morph names to influence weights. Every
//! write path clamps to [0, 1] so the invariant holds no matter which
//! stage produced the value. Configurations are passed by value (logical
//! copy) between pipeline stages to avoid aliasing during optimization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Mapping from morph name to influence weight in [0, 1].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MorphConfiguration {
    weights: BTreeMap<String, f32>,
}

impl MorphConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a weight, clamped to [0, 1]. Non-finite values are dropped.
    pub fn set(&mut self, name: &str, weight: f32) {
        if !weight.is_finite() {
            return;
        }
        self.weights.insert(name.to_string(), weight.clamp(0.0, 1.0));
    }

    /// Weight for a morph; unset morphs read as 0.0.
    pub fn get(&self, name: &str) -> f32 {
        self.weights.get(name).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.weights.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.weights.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn morph_names(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    /// Add a signed delta to one channel, clamping the result.
    pub fn adjust(&mut self, name: &str, delta: f32) {
        let next = self.get(name) + delta;
        self.set(name, next);
    }

    /// Scale every weight by a factor, clamping results.
    pub fn scaled(&self, factor: f32) -> Self {
        let mut out = Self::new();
        for (name, w) in self.iter() {
            out.set(name, w * factor);
        }
        out
    }

    /// Per-channel exponential blend: `self*(1-alpha) + other*alpha` over
    /// the union of channels. Used for frame-to-frame weight smoothing.
    pub fn blend_toward(&self, other: &Self, alpha: f32) -> Self {
        let alpha = alpha.clamp(0.0, 1.0);
        let mut out = Self::new();
        for name in self.morph_names().chain(other.morph_names()) {
            if out.contains(name) {
                continue;
            }
            let blended = self.get(name) * (1.0 - alpha) + other.get(name) * alpha;
            out.set(name, blended);
        }
        out
    }

    /// Weighted per-channel average of several configurations.
    ///
    /// Returns an empty configuration when the weight mass is zero.
    pub fn weighted_average<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a MorphConfiguration, f32)>,
    {
        let entries: Vec<_> = entries.into_iter().filter(|(_, w)| *w > 0.0).collect();
        let total: f32 = entries.iter().map(|(_, w)| w).sum();
        let mut out = Self::new();
        if total <= f32::EPSILON {
            return out;
        }

        let mut sums: BTreeMap<String, f32> = BTreeMap::new();
        for (config, weight) in &entries {
            for (name, value) in config.iter() {
                *sums.entry(name.to_string()).or_insert(0.0) += value * weight;
            }
        }
        for (name, sum) in sums {
            out.set(&name, sum / total);
        }
        out
    }
}

impl FromIterator<(String, f32)> for MorphConfiguration {
    fn from_iter<T: IntoIterator<Item = (String, f32)>>(iter: T) -> Self {
        let mut config = Self::new();
        for (name, weight) in iter {
            config.set(&name, weight);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_clamps_to_unit_interval() {
        let mut c = MorphConfiguration::new();
        c.set("jawOpen", 1.7);
        c.set("mouthClose", -0.2);
        assert_eq!(c.get("jawOpen"), 1.0);
        assert_eq!(c.get("mouthClose"), 0.0);
    }

    #[test]
    fn non_finite_values_are_dropped() {
        let mut c = MorphConfiguration::new();
        c.set("jawOpen", f32::NAN);
        assert!(!c.contains("jawOpen"));
    }

    #[test]
    fn unset_reads_as_zero() {
        assert_eq!(MorphConfiguration::new().get("anything"), 0.0);
    }

    #[test]
    fn adjust_clamps() {
        let mut c = MorphConfiguration::new();
        c.set("jawOpen", 0.9);
        c.adjust("jawOpen", 0.5);
        assert_eq!(c.get("jawOpen"), 1.0);
        c.adjust("jawOpen", -2.0);
        assert_eq!(c.get("jawOpen"), 0.0);
    }

    #[test]
    fn blend_covers_union_of_channels() {
        let mut a = MorphConfiguration::new();
        a.set("jawOpen", 1.0);
        let mut b = MorphConfiguration::new();
        b.set("mouthPucker", 1.0);

        let out = a.blend_toward(&b, 0.3);
        assert!((out.get("jawOpen") - 0.7).abs() < 1e-6);
        assert!((out.get("mouthPucker") - 0.3).abs() < 1e-6);
    }

    #[test]
    fn weighted_average_normalizes() {
        let mut a = MorphConfiguration::new();
        a.set("jawOpen", 1.0);
        let mut b = MorphConfiguration::new();
        b.set("jawOpen", 0.0);

        let avg = MorphConfiguration::weighted_average([(&a, 3.0), (&b, 1.0)]);
        assert!((avg.get("jawOpen") - 0.75).abs() < 1e-6);
    }

    #[test]
    fn weighted_average_of_nothing_is_empty() {
        let avg = MorphConfiguration::weighted_average([]);
        assert!(avg.is_empty());
    }
}
