use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

fn log_dir() -> io::Result<()> {
    fs::create_dir_all("logs")
}

fn append_json_line<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    serde_json::to_writer(&mut file, value)
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    file.write_all(b"\n")
}

fn timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

#[derive(Debug, Serialize)]
pub struct OptimizationLogEntry {
    pub viseme: String,
    pub iterations: usize,
    pub initial_score: f32,
    pub final_score: f32,
    pub constraints_satisfied: bool,
    pub converged: bool,
    pub duration_ms: u64,
    pub timestamp_ms: u128,
}

/// Append one completed optimization run to `logs/optimizations.jsonl`.
pub fn log_optimization_run(entry_fields: OptimizationRunFields<'_>) -> io::Result<()> {
    log_dir()?;
    let entry = OptimizationLogEntry {
        viseme: entry_fields.viseme.to_string(),
        iterations: entry_fields.iterations,
        initial_score: entry_fields.initial_score,
        final_score: entry_fields.final_score,
        constraints_satisfied: entry_fields.constraints_satisfied,
        converged: entry_fields.converged,
        duration_ms: entry_fields.duration_ms,
        timestamp_ms: timestamp_ms(),
    };
    append_json_line("logs/optimizations.jsonl", &entry)
}

/// Borrowed field bundle for [`log_optimization_run`].
#[derive(Debug)]
pub struct OptimizationRunFields<'a> {
    pub viseme: &'a str,
    pub iterations: usize,
    pub initial_score: f32,
    pub final_score: f32,
    pub constraints_satisfied: bool,
    pub converged: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct ClassificationLogEntry {
    pub viseme: String,
    pub confidence: f32,
    pub processing_time_ms: f32,
    pub cache_hit: bool,
    pub timestamp_ms: u128,
}

pub fn log_classification(
    viseme: &str,
    confidence: f32,
    processing_time_ms: f32,
    cache_hit: bool,
) -> io::Result<()> {
    log_dir()?;
    let entry = ClassificationLogEntry {
        viseme: viseme.to_string(),
        confidence,
        processing_time_ms,
        cache_hit,
        timestamp_ms: timestamp_ms(),
    };
    append_json_line("logs/classifications.jsonl", &entry)
}
