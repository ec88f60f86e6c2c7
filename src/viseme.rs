//! Viseme classes and their base morph weight tables.
//!
//! A viseme is a purely categorical label; all per-viseme state lives in
//! the learning controller. The base weight tables here are configuration
//! data: the starting mouth shape for each class before confidence scaling
//! and temporal smoothing are applied.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::morph::MorphConfiguration;

/// ARKit-style viseme classes plus silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Viseme {
    /// Silence / neutral mouth.
    Sil,
    /// Bilabial plosives: p, b, m.
    PP,
    /// Labiodental fricatives: f, v.
    FF,
    /// Dental fricatives: th.
    TH,
    /// Alveolar plosives: t, d.
    DD,
    /// Velar plosives: k, g.
    KK,
    /// Postalveolar affricates: ch, j, sh.
    CH,
    /// Alveolar fricatives: s, z.
    SS,
    /// Alveolar nasals: n, l.
    NN,
    /// Rhotic: r.
    RR,
    /// Open vowel: aa.
    AA,
    /// Mid front vowel: e.
    E,
    /// Close front vowel: ih.
    IH,
    /// Rounded back vowel: oh.
    OH,
    /// Close rounded vowel: ou.
    OU,
}

pub const ALL_VISEMES: [Viseme; 15] = [
    Viseme::Sil,
    Viseme::PP,
    Viseme::FF,
    Viseme::TH,
    Viseme::DD,
    Viseme::KK,
    Viseme::CH,
    Viseme::SS,
    Viseme::NN,
    Viseme::RR,
    Viseme::AA,
    Viseme::E,
    Viseme::IH,
    Viseme::OH,
    Viseme::OU,
];

impl Viseme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Viseme::Sil => "sil",
            Viseme::PP => "PP",
            Viseme::FF => "FF",
            Viseme::TH => "TH",
            Viseme::DD => "DD",
            Viseme::KK => "KK",
            Viseme::CH => "CH",
            Viseme::SS => "SS",
            Viseme::NN => "NN",
            Viseme::RR => "RR",
            Viseme::AA => "AA",
            Viseme::E => "E",
            Viseme::IH => "IH",
            Viseme::OH => "OH",
            Viseme::OU => "OU",
        }
    }

    /// Base morph target table for this viseme, all weights in [0, 1].
    ///
    /// Values are empirically tuned for a closed-mouth neutral mesh; the
    /// optimizer refines them per avatar at runtime.
    pub fn base_weights(&self) -> MorphConfiguration {
        let table: &[(&str, f32)] = match self {
            Viseme::Sil => &[("mouthClose", 0.1)],
            Viseme::PP => &[("mouthClose", 0.9), ("mouthPressLeft", 0.4), ("mouthPressRight", 0.4)],
            Viseme::FF => &[("mouthLowerDownLeft", 0.3), ("mouthLowerDownRight", 0.3), ("jawOpen", 0.15), ("mouthRollLower", 0.5)],
            Viseme::TH => &[("jawOpen", 0.25), ("tongueOut", 0.4), ("mouthStretchLeft", 0.2), ("mouthStretchRight", 0.2)],
            Viseme::DD => &[("jawOpen", 0.2), ("mouthStretchLeft", 0.25), ("mouthStretchRight", 0.25)],
            Viseme::KK => &[("jawOpen", 0.3), ("mouthClose", 0.2)],
            Viseme::CH => &[("jawOpen", 0.25), ("mouthFunnel", 0.5), ("mouthPucker", 0.3)],
            Viseme::SS => &[("jawOpen", 0.15), ("mouthStretchLeft", 0.4), ("mouthStretchRight", 0.4), ("mouthClose", 0.3)],
            Viseme::NN => &[("jawOpen", 0.15), ("mouthClose", 0.4)],
            Viseme::RR => &[("jawOpen", 0.2), ("mouthFunnel", 0.35), ("mouthPucker", 0.25)],
            Viseme::AA => &[("jawOpen", 0.8), ("mouthLowerDownLeft", 0.3), ("mouthLowerDownRight", 0.3)],
            Viseme::E => &[("jawOpen", 0.45), ("mouthStretchLeft", 0.35), ("mouthStretchRight", 0.35)],
            Viseme::IH => &[("jawOpen", 0.25), ("mouthSmileLeft", 0.4), ("mouthSmileRight", 0.4), ("mouthStretchLeft", 0.3), ("mouthStretchRight", 0.3)],
            Viseme::OH => &[("jawOpen", 0.6), ("mouthFunnel", 0.6), ("mouthPucker", 0.4)],
            Viseme::OU => &[("jawOpen", 0.3), ("mouthPucker", 0.8), ("mouthFunnel", 0.5)],
        };

        let mut config = MorphConfiguration::new();
        for (name, weight) in table {
            config.set(name, *weight);
        }
        config
    }
}

impl fmt::Display for Viseme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Viseme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_VISEMES
            .iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown viseme: {s}"))
    }
}
