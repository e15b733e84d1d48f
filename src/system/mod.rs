//! # System Interaction Layer
//!
//! Everything that touches processes, pipes and signals. The core builds
//! plans; this layer runs them.
//!
//! ## Modules
//!
//! - **`executor`**: Spawns one `sh -c` process per script line, forwards its
//!   output line by line and kills it on cancellation or timeout.
//! - **`output`**: The internally synchronized sinks shared by concurrently
//!   running commands.
//! - **`remote`**: Runs script lines on remote hosts through the system `ssh`
//!   client, with bounded fan-out.
//! - **`signals`**: Turns an interrupt or termination signal into a cancelled
//!   token.

pub mod executor;
pub mod output;
pub mod remote;
pub mod signals;
