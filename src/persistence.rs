//! Versioned persistence of learned state.
//!
//! Two surfaces: an opaque JSON blob for host applications to store wherever
//! they like (export/import), and a binary file checkpoint for local reuse.
//! Both carry a version; the blob treats a mismatch as a warning and a no-op,
//! the checkpoint rejects it, since a local file under our own control should
//! never be from a different schema.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use bincode::Options;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::learning::LearningState;

/// Schema version of the export blob and the file checkpoint payload.
pub const LEARNING_DATA_VERSION: &str = "1.0";

const CHECKPOINT_VERSION: u32 = 1;

/// The export blob as serialized: version first so readers can gate on it
/// without touching the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LearningDataBlob {
    version: String,
    exported_at: DateTime<Utc>,
    state: LearningState,
}

/// Serialize the learned state into a self-describing JSON blob.
pub fn export_learning_data(state: &LearningState) -> EngineResult<String> {
    let blob = LearningDataBlob {
        version: LEARNING_DATA_VERSION.to_string(),
        exported_at: Utc::now(),
        state: state.clone(),
    };
    serde_json::to_string(&blob)
        .map_err(|err| EngineError::MalformedLearningData(err.to_string()))
}

/// Parse a previously exported blob.
///
/// Returns `Ok(None)` on a parseable blob with an unknown version (the
/// caller keeps its current state); a blob that does not parse at all is an
/// error.
pub fn import_learning_data(blob: &str) -> EngineResult<Option<LearningState>> {
    let parsed: LearningDataBlob = serde_json::from_str(blob)
        .map_err(|err| EngineError::MalformedLearningData(err.to_string()))?;

    if parsed.version != LEARNING_DATA_VERSION {
        tracing::warn!(
            found = %parsed.version,
            expected = LEARNING_DATA_VERSION,
            "learning data version mismatch, import skipped"
        );
        return Ok(None);
    }
    Ok(Some(parsed.state))
}

/// Errors from the binary file checkpoint.
#[derive(Debug)]
pub enum CheckpointError {
    Io(std::io::Error),
    Serialization(bincode::Error),
    VersionMismatch { expected: u32, found: u32 },
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointError::Io(err) => write!(f, "I/O error while accessing checkpoint: {err}"),
            CheckpointError::Serialization(err) => {
                write!(f, "Failed to (de)serialize checkpoint payload: {err}")
            }
            CheckpointError::VersionMismatch { expected, found } => write!(
                f,
                "Checkpoint version mismatch: expected {expected}, found {found}",
            ),
        }
    }
}

impl std::error::Error for CheckpointError {}

impl From<std::io::Error> for CheckpointError {
    fn from(err: std::io::Error) -> Self {
        CheckpointError::Io(err)
    }
}

impl From<bincode::Error> for CheckpointError {
    fn from(err: bincode::Error) -> Self {
        CheckpointError::Serialization(err)
    }
}

/// Deterministic binary codec shared by save and load.
fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_little_endian()
}

#[derive(Serialize, Deserialize)]
struct CheckpointFile {
    version: u32,
    state: LearningState,
}

/// Write the learned state to a binary checkpoint file, creating parent
/// directories as needed.
pub fn save_checkpoint<P: AsRef<Path>>(
    state: &LearningState,
    path: P,
) -> Result<(), CheckpointError> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    codec().serialize_into(
        &mut writer,
        &CheckpointFile {
            version: CHECKPOINT_VERSION,
            state: state.clone(),
        },
    )?;
    writer.flush()?;
    Ok(())
}

/// Load a checkpoint written by [`save_checkpoint`].
pub fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<LearningState, CheckpointError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let parsed: CheckpointFile = codec().deserialize_from(&mut reader)?;
    if parsed.version != CHECKPOINT_VERSION {
        return Err(CheckpointError::VersionMismatch {
            expected: CHECKPOINT_VERSION,
            found: parsed.version,
        });
    }
    Ok(parsed.state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morph::MorphConfiguration;
    use crate::viseme::Viseme;

    fn sample_state() -> LearningState {
        let mut state = LearningState::default();
        state.effectiveness.update("jawOpen", 2.0);
        state.metrics.total_runs = 3;
        state.metrics.successful_runs = 2;
        let profile = state.profiles.entry(Viseme::AA).or_default();
        profile.runs = 3;
        profile.total_iterations = 12;
        profile.learning_rate_multiplier = 1.1;
        state
    }

    #[test]
    fn export_import_round_trips() {
        let state = sample_state();
        let blob = export_learning_data(&state).unwrap();
        let imported = import_learning_data(&blob).unwrap().unwrap();
        assert_eq!(imported.metrics.total_runs, 3);
        assert_eq!(imported.profiles[&Viseme::AA].runs, 3);
        assert!((imported.effectiveness.get("jawOpen") - 1.2).abs() < 1e-6);
    }

    #[test]
    fn version_mismatch_is_a_no_op() {
        let blob = export_learning_data(&sample_state()).unwrap();
        let tampered = blob.replace("\"version\":\"1.0\"", "\"version\":\"9.9\"");
        assert_ne!(blob, tampered);
        assert!(import_learning_data(&tampered).unwrap().is_none());
    }

    #[test]
    fn garbage_blob_is_an_error() {
        assert!(import_learning_data("not json at all").is_err());
        assert!(import_learning_data("{\"version\": 7}").is_err());
    }

    #[test]
    fn checkpoint_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("learning.ckpt");

        let mut state = sample_state();
        let profile = state.profiles.entry(Viseme::PP).or_default();
        profile.history.push(crate::learning::HistoricalConfig {
            morphs: {
                let mut m = MorphConfiguration::new();
                m.set("mouthClose", 0.9);
                m
            },
            score: 92.0,
            weight: 1.0,
        });

        save_checkpoint(&state, &path).unwrap();
        let loaded = load_checkpoint(&path).unwrap();
        assert_eq!(loaded.profiles[&Viseme::PP].history.len(), 1);
        assert!((loaded.profiles[&Viseme::PP].history[0].score - 92.0).abs() < 1e-6);
    }

    #[test]
    fn missing_checkpoint_is_io_error() {
        let err = load_checkpoint("/nonexistent/learning.ckpt").unwrap_err();
        assert!(matches!(err, CheckpointError::Io(_)));
    }
}
