//! Common test utilities

#![allow(dead_code)]

use maestro::Maestro;
use maestro::core::env::Scope;
use maestro::models::DuplicatePolicy;
use maestro::system::output::{MemoryBuffer, Output};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Captured standard output and standard error of a run.
pub struct Captured {
    pub out: MemoryBuffer,
    pub err: MemoryBuffer,
}

impl Captured {
    pub fn new() -> (Self, Output) {
        let out = MemoryBuffer::new();
        let err = MemoryBuffer::new();
        let output = Output::new(out.writer(), err.writer());
        (Self { out, err }, output)
    }
}

/// Decodes `source` with `policy`, writing into an in-memory sink.
pub fn load_with(source: &str, policy: DuplicatePolicy) -> (Maestro, Captured) {
    let (captured, output) = Captured::new();
    let maestro = Maestro::from_source(source, policy)
        .unwrap()
        .with_output(output);
    (maestro, captured)
}

pub fn load(source: &str) -> (Maestro, Captured) {
    load_with(source, DuplicatePolicy::Replace)
}

/// Create a temporary directory with a maestro.mf file
pub fn create_test_file(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("maestro.mf");
    fs::write(&file, content).unwrap();
    (temp_dir, file)
}

/// Loads a file from disk, writing into an in-memory sink.
pub fn load_file(file: &PathBuf) -> (Maestro, Captured) {
    let (captured, output) = Captured::new();
    let maestro = Maestro::load(file, DuplicatePolicy::Replace, Scope::new())
        .unwrap()
        .with_output(output);
    (maestro, captured)
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}
