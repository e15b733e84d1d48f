//! Declarative task runner: named commands with options, dependencies and
//! hooks, declared in one maestro file and run locally or over ssh.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Shared cancellation flag, set once by the signal listener.
pub type CancellationToken = Arc<AtomicBool>;

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;

pub use crate::core::engine::{Maestro, MaestroError};
