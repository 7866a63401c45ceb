//! Types shared by the registry, the executor and the HTTP gateway.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

/// Unique identifier for a background job.
pub type JobNo = i64;

/// Job number in a kill request that selects every registered job.
pub const KILL_ALL: JobNo = -1;

/// Which jobs a kill request applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillTarget {
    All,
    Job(JobNo),
}

impl KillTarget {
    pub fn matches(&self, job_no: JobNo) -> bool {
        match self {
            KillTarget::All => true,
            KillTarget::Job(n) => *n == job_no,
        }
    }
}

impl From<JobNo> for KillTarget {
    fn from(job_no: JobNo) -> Self {
        if job_no == KILL_ALL {
            KillTarget::All
        } else {
            KillTarget::Job(job_no)
        }
    }
}

/// A command submitted by a client, for either execution mode.
///
/// `stdout`/`stderr` are only used by background runs; an empty string is
/// the same as leaving the field out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Deadline in seconds; zero or negative means no deadline.
    #[serde(default)]
    pub timeout: f64,
    pub cmd: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl CommandSpec {
    pub fn new<I, S>(cmd: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cmd: cmd.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: f64) -> Self {
        self.timeout = secs;
        self
    }

    pub fn with_stdout(mut self, path: impl Into<String>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    pub fn with_stderr(mut self, path: impl Into<String>) -> Self {
        self.stderr = Some(path.into());
        self
    }

    /// Program and arguments joined for display.
    pub fn command_line(&self) -> String {
        std::iter::once(self.cmd.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The deadline, if `timeout` is a positive, representable number of seconds.
    pub fn deadline(&self) -> Option<Duration> {
        if self.timeout > 0.0 {
            Duration::try_from_secs_f64(self.timeout).ok()
        } else {
            None
        }
    }

    pub fn stdout_file(&self) -> Option<&str> {
        self.stdout.as_deref().filter(|s| !s.is_empty())
    }

    pub fn stderr_file(&self) -> Option<&str> {
        self.stderr.as_deref().filter(|s| !s.is_empty())
    }
}

/// Clients written against nil slices send `"args": null` for no arguments.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<String>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Result of a run-to-completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    pub success: bool,
    pub output: String,
    pub exit_code: i32,
}

/// One row of the job list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_no: JobNo,
    pub cmd_line: String,
    pub stdout_file: String,
    pub stderr_file: String,
}
