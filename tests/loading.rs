//! Integration tests for loading maestro files from disk

mod common;

use common::{create_test_file, load_file};
use maestro::core::decoder::DecodeError;
use maestro::models::DuplicatePolicy;
use maestro::{Maestro, MaestroError};
use maestro::core::env::Scope;
use std::fs;

#[tokio::test]
async fn test_included_variables_stay_in_their_file() {
    let (dir, file) = create_test_file(
        "NAME = outer\ninclude lib.mf\n\nmain: lib\n  echo main %(NAME)\n",
    );
    fs::write(
        dir.path().join("lib.mf"),
        "NAME = inner\nlib:\n  echo lib %(NAME)\n",
    )
    .unwrap();

    let (maestro, captured) = load_file(&file);
    maestro.execute("main", &[]).await.unwrap();
    assert_eq!(captured.out.lines(), vec!["lib inner", "main outer"]);
}

#[test]
fn test_included_variable_is_undefined_afterwards() {
    let (dir, file) = create_test_file("include lib.mf\nUSE = %(ONLY_IN_LIB)\n");
    fs::write(dir.path().join("lib.mf"), "ONLY_IN_LIB = x\n").unwrap();
    let err = Maestro::load(&file, DuplicatePolicy::Replace, Scope::new()).unwrap_err();
    assert!(matches!(
        err,
        MaestroError::Decode(DecodeError::Undefined { ref name, .. }) if name == "ONLY_IN_LIB"
    ));
}

#[test]
fn test_missing_file_is_an_io_error() {
    let (dir, _) = create_test_file("");
    let missing = dir.path().join("nope.mf");
    assert!(matches!(
        Maestro::load(&missing, DuplicatePolicy::Replace, Scope::new()),
        Err(MaestroError::Decode(DecodeError::Io { .. }))
    ));
}

#[tokio::test]
async fn test_workdir_property() {
    let (dir, _) = create_test_file("");
    let work = dir.path().join("work");
    fs::create_dir(&work).unwrap();
    fs::write(work.join("marker.txt"), "").unwrap();
    let (_keep, file) = create_test_file(&format!(
        "list(workdir = \"{}\"):\n  ls\n",
        work.display()
    ));
    let (maestro, captured) = load_file(&file);
    maestro.execute("list", &[]).await.unwrap();
    assert_eq!(captured.out.lines(), vec!["marker.txt"]);
}

#[test]
fn test_help_version_and_graph() {
    let (_dir, file) = create_test_file(
        ".VERSION = 1.0.0\n\nbuild(short = \"compile everything\", tag = ci): fetch\n  true\n\nfetch:\n  true\n\n!internal:\n  true\n",
    );
    let (maestro, captured) = load_file(&file);
    maestro.execute_version().unwrap();
    maestro.execute_help("").unwrap();
    maestro.graph("build").unwrap();

    let lines = captured.out.lines();
    assert_eq!(lines[0], "maestro 1.0.0");
    assert_eq!(lines[1], "maestro (1.0.0)");
    assert!(lines.iter().any(|l| l.starts_with("  build") && l.ends_with("compile everything")));
    assert!(!lines.iter().any(|l| l.contains("internal")));
    assert_eq!(lines[lines.len() - 1], "order fetch -> build");
}
