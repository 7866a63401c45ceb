use std::io;
use std::time::Duration;

use thiserror::Error;

/// The registry loop has stopped and no longer accepts requests.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("job registry is not running")]
pub struct RegistryError;

/// A caller-supplied file name that cannot be used.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("file name is empty")]
    Empty,

    #[error("file name escapes the file root: {name}")]
    Escapes { name: String },
}

/// Errors from running a command.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` did not finish within {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("failed waiting for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid capture path: {0}")]
    Path(#[from] PathError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
