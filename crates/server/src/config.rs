//! Command-line and environment configuration.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use remote_exec_jobs::{FileRoot, DEFAULT_POLL_INTERVAL};
use thiserror::Error;

/// Default port for the server.
pub const DEFAULT_PORT: u16 = 8888;

/// Default limit for `/upload` bodies.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Remote process supervision server.
///
/// Runs arbitrary commands on behalf of any client holding the session
/// token. Do not expose it to networks you do not control.
#[derive(Debug, Clone, Parser)]
#[command(name = "remote-exec-server", version)]
pub struct Cli {
    /// Port number to listen on.
    #[arg(long, env = "REMOTE_EXEC_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind.
    #[arg(long, env = "REMOTE_EXEC_BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Path to the PEM certificate file.
    #[arg(long, env = "REMOTE_EXEC_CERTPATH")]
    pub certpath: Option<PathBuf>,

    /// Path to the PEM private key file.
    #[arg(long, env = "REMOTE_EXEC_KEYPATH")]
    pub keypath: Option<PathBuf>,

    /// Serve plain HTTP instead of TLS.
    #[arg(long, conflicts_with_all = ["certpath", "keypath"])]
    pub plaintext: bool,

    /// Shared secret expected in the X-Session-Token header.
    #[arg(long, env = "SERVER_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Interval between reaping sweeps of background jobs, in milliseconds.
    #[arg(
        long,
        env = "REMOTE_EXEC_POLL_INTERVAL_MS",
        default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64
    )]
    pub poll_interval_ms: u64,

    /// Directory that capture and upload file names are resolved against
    /// (defaults to the working directory).
    #[arg(long, env = "REMOTE_EXEC_FILE_ROOT")]
    pub file_root: Option<PathBuf>,

    /// Accept absolute and `..` file names for captures and uploads.
    #[arg(long, env = "REMOTE_EXEC_UNCONFINED_PATHS")]
    pub unconfined_paths: bool,

    /// Delay between answering /exit and shutting down, in milliseconds.
    #[arg(long, env = "REMOTE_EXEC_EXIT_GRACE_MS", default_value_t = 1000)]
    pub exit_grace_ms: u64,

    /// Largest accepted /upload body, in bytes.
    #[arg(long, env = "REMOTE_EXEC_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,
}

/// How the listener is secured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Plaintext,
    Tls { cert: PathBuf, key: PathBuf },
}

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub transport: Transport,
    pub auth_token: String,
    pub poll_interval: Duration,
    pub files: FileRoot,
    pub exit_grace: Duration,
    pub max_upload_bytes: usize,
}

/// Configuration problems that stop the server from starting.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("SERVER_AUTH_TOKEN not set")]
    MissingAuthToken,

    #[error("both --certpath and --keypath are required (or pass --plaintext)")]
    MissingTlsMaterial,

    #[error("--poll-interval-ms must be greater than zero")]
    ZeroPollInterval,

    #[error("cannot determine working directory: {0}")]
    WorkingDir(String),
}

impl ServerConfig {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let auth_token = cli
            .auth_token
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingAuthToken)?;

        let transport = match (cli.plaintext, cli.certpath, cli.keypath) {
            (true, _, _) => Transport::Plaintext,
            (false, Some(cert), Some(key)) => Transport::Tls { cert, key },
            _ => return Err(ConfigError::MissingTlsMaterial),
        };

        if cli.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }

        let root = match cli.file_root {
            Some(root) => root,
            None => std::env::current_dir().map_err(|e| ConfigError::WorkingDir(e.to_string()))?,
        };
        let files = if cli.unconfined_paths {
            FileRoot::unconfined(root)
        } else {
            FileRoot::new(root)
        };

        Ok(Self {
            addr: SocketAddr::new(cli.bind, cli.port),
            transport,
            auth_token,
            poll_interval: Duration::from_millis(cli.poll_interval_ms),
            files,
            exit_grace: Duration::from_millis(cli.exit_grace_ms),
            max_upload_bytes: cli.max_upload_bytes,
        })
    }
}
