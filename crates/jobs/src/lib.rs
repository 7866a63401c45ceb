//! Process supervision core for the remote-exec server.
//!
//! Provides:
//! - `JobRegistry` - actor that owns the live-job table (register, list, kill, poll)
//! - `CommandExecutor` - spawns processes to completion or in the background
//! - `FileRoot` - resolves caller-supplied capture/upload names
//! - `CommandSpec` / `RunOutput` / `JobSummary` - wire types shared with the gateway

pub mod capture;
pub mod error;
pub mod executor;
pub mod id;
pub mod metrics;
pub mod paths;
pub mod process;
pub mod registry;
pub mod types;

pub use error::{ExecError, PathError, RegistryError};
pub use executor::CommandExecutor;
pub use id::JobIdSource;
pub use paths::FileRoot;
pub use process::{ChildProcess, ProcessHandle, ProcessState};
pub use registry::{Job, JobRegistry, DEFAULT_POLL_INTERVAL};
pub use types::{CommandSpec, JobNo, JobSummary, KillTarget, RunOutput, KILL_ALL};
