//! Command execution: run-to-completion and run-in-background.

use std::process::Stdio;

use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::capture::{spawn_collect, spawn_drain_to_file};
use crate::error::ExecError;
use crate::metrics;
use crate::paths::FileRoot;
use crate::process::ChildProcess;
use crate::registry::{Job, JobRegistry};
use crate::types::{CommandSpec, JobNo, RunOutput};

/// Exit code reported when the process was ended by a signal.
const SIGNALED_EXIT_CODE: i32 = -1;

/// Spawns processes and hands background ones to the [`JobRegistry`].
#[derive(Clone)]
pub struct CommandExecutor {
    registry: JobRegistry,
    files: FileRoot,
}

impl CommandExecutor {
    pub fn new(registry: JobRegistry, files: FileRoot) -> Self {
        Self { registry, files }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn files(&self) -> &FileRoot {
        &self.files
    }

    /// Run `spec` and wait for it to exit, or for its deadline.
    ///
    /// A nonzero exit code is a normal result: the output is returned with
    /// `exit_code` set. Only a missed deadline or a failure to start or wait
    /// on the process is an error. On a missed deadline the process is
    /// killed and its output discarded.
    pub async fn run_to_completion(&self, spec: &CommandSpec) -> Result<RunOutput, ExecError> {
        let command_line = spec.command_line();
        let mut child = Command::new(&spec.cmd)
            .args(&spec.args)
            .current_dir(self.files.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                metrics::record_run("error");
                ExecError::Spawn {
                    command: command_line.clone(),
                    source,
                }
            })?;

        let stdout = spawn_collect(child.stdout.take());
        let stderr = spawn_collect(child.stderr.take());
        let stdout_abort = stdout.abort_handle();
        let stderr_abort = stderr.abort_handle();

        let run = async {
            let status = child.wait().await?;
            let stdout = stdout.await.map_err(std::io::Error::other)??;
            let stderr = stderr.await.map_err(std::io::Error::other)??;
            Ok::<_, std::io::Error>((status, stdout, stderr))
        };

        let finished = match spec.deadline() {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(finished) => finished,
                Err(_) => {
                    stdout_abort.abort();
                    stderr_abort.abort();
                    if let Err(e) = child.kill().await {
                        warn!(cmd_line = %command_line, error = %e, "failed to kill timed-out process");
                    }
                    info!(cmd_line = %command_line, timeout = ?limit, "run timed out");
                    metrics::record_run("timeout");
                    return Err(ExecError::Timeout {
                        command: command_line,
                        after: limit,
                    });
                }
            },
            None => run.await,
        };

        let (status, stdout, stderr) = finished.map_err(|source| {
            metrics::record_run("error");
            ExecError::Wait {
                command: command_line.clone(),
                source,
            }
        })?;

        let exit_code = status.code().unwrap_or(SIGNALED_EXIT_CODE);
        if !stderr.is_empty() {
            debug!(
                cmd_line = %command_line,
                stderr = %String::from_utf8_lossy(&stderr),
                "run wrote to stderr"
            );
        }
        info!(cmd_line = %command_line, exit_code, "run finished");
        metrics::record_run("exited");

        Ok(RunOutput {
            success: true,
            output: String::from_utf8_lossy(&stdout).into_owned(),
            exit_code,
        })
    }

    /// Start `spec` in the background and register it. Returns once the
    /// process is registered; it does not wait for the process.
    ///
    /// Capture paths are resolved before anything is spawned, so a rejected
    /// path never leaves a process behind.
    pub async fn run_in_background(&self, spec: &CommandSpec) -> Result<JobNo, ExecError> {
        let command_line = spec.command_line();
        let stdout_path = spec.stdout_file().map(|f| self.files.resolve(f)).transpose()?;
        let stderr_path = spec.stderr_file().map(|f| self.files.resolve(f)).transpose()?;
        // A deadline past the end of the clock is no deadline, as for runs to completion.
        let deadline = spec
            .deadline()
            .and_then(|limit| Instant::now().checked_add(limit));

        let mut child = self
            .background_command(spec, stdout_path.is_some(), stderr_path.is_some())
            .spawn()
            .map_err(|source| ExecError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        let mut drains = Vec::with_capacity(2);
        if let (Some(path), Some(pipe)) = (stdout_path, child.stdout.take()) {
            drains.push(spawn_drain_to_file(pipe, path, "stdout"));
        }
        if let (Some(path), Some(pipe)) = (stderr_path, child.stderr.take()) {
            drains.push(spawn_drain_to_file(pipe, path, "stderr"));
        }

        let mut job = Job::new(command_line, Box::new(ChildProcess::new(child)))
            .with_capture_files(
                spec.stdout_file().map(str::to_string),
                spec.stderr_file().map(str::to_string),
            )
            .with_drains(drains);
        if let Some(deadline) = deadline {
            job = job.with_deadline(deadline);
        }

        Ok(self.registry.register(job).await?)
    }

    /// The background process is killed if its [`Job`] is dropped before the
    /// registry takes it, e.g. when the request goes away mid-registration.
    fn background_command(
        &self,
        spec: &CommandSpec,
        capture_stdout: bool,
        capture_stderr: bool,
    ) -> Command {
        let mut command = Command::new(&spec.cmd);
        command
            .args(&spec.args)
            .current_dir(self.files.root())
            .stdin(Stdio::null())
            .stdout(piped_if(capture_stdout))
            .stderr(piped_if(capture_stderr))
            .kill_on_drop(true);
        command
    }
}

fn piped_if(capture: bool) -> Stdio {
    if capture {
        Stdio::piped()
    } else {
        Stdio::null()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::PathError;
    use crate::types::KillTarget;
    use std::time::Duration;

    const TICK: Duration = Duration::from_millis(50);

    fn executor(root: &std::path::Path) -> CommandExecutor {
        CommandExecutor::new(JobRegistry::spawn(TICK), FileRoot::new(root))
    }

    async fn wait_until_empty(registry: &JobRegistry, limit: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < limit {
            if registry.list().await.unwrap().is_empty() {
                return true;
            }
            tokio::time::sleep(TICK).await;
        }
        false
    }

    #[tokio::test]
    async fn test_run_to_completion_echo() {
        let dir = tempfile::tempdir().unwrap();
        let output = executor(dir.path())
            .run_to_completion(&CommandSpec::new("echo", ["hello"]))
            .await
            .unwrap();
        assert_eq!(
            output,
            RunOutput {
                success: true,
                output: "hello\n".to_string(),
                exit_code: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_run_to_completion_nonzero_exit_keeps_output() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("sh", ["-c", "echo partial; echo oops >&2; exit 4"]);
        let output = executor(dir.path()).run_to_completion(&spec).await.unwrap();
        assert!(output.success);
        assert_eq!(output.output, "partial\n");
        assert_eq!(output.exit_code, 4);
    }

    #[tokio::test]
    async fn test_run_to_completion_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("sleep", ["5"]).with_timeout(1.0);
        let start = Instant::now();
        let err = executor(dir.path()).run_to_completion(&spec).await.unwrap_err();
        assert!(matches!(err, ExecError::Timeout { .. }), "got {err:?}");
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_run_to_completion_within_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("echo", ["quick"]).with_timeout(5.0);
        let output = executor(dir.path()).run_to_completion(&spec).await.unwrap();
        assert_eq!(output.output, "quick\n");
    }

    #[tokio::test]
    async fn test_run_to_completion_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("/definitely/not/a/program", Vec::<String>::new());
        let err = executor(dir.path()).run_to_completion(&spec).await.unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_background_job_listed_then_reaped() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let job_no = exec
            .run_in_background(&CommandSpec::new("sleep", ["1"]))
            .await
            .unwrap();

        let jobs = exec.registry().list().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_no, job_no);
        assert_eq!(jobs[0].cmd_line, "sleep 1");

        assert!(wait_until_empty(exec.registry(), Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_background_capture_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let spec = CommandSpec::new("sh", ["-c", "echo to-out; echo to-err >&2"])
            .with_stdout("run.log")
            .with_stderr("run.err");
        exec.run_in_background(&spec).await.unwrap();

        // Reaping waits for both drains, so the files are complete afterwards.
        assert!(wait_until_empty(exec.registry(), Duration::from_secs(5)).await);
        let out = tokio::fs::read_to_string(dir.path().join("run.log")).await.unwrap();
        let err = tokio::fs::read_to_string(dir.path().join("run.err")).await.unwrap();
        assert_eq!(out, "to-out\n");
        assert_eq!(err, "to-err\n");
    }

    #[tokio::test]
    async fn test_background_capture_large_output_does_not_stall() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        // Well past a typical 64 KiB pipe buffer on both streams.
        let spec = CommandSpec::new(
            "sh",
            ["-c", "head -c 1000000 /dev/zero; head -c 1000000 /dev/zero >&2"],
        )
        .with_stdout("big.out")
        .with_stderr("big.err");
        exec.run_in_background(&spec).await.unwrap();

        assert!(wait_until_empty(exec.registry(), Duration::from_secs(10)).await);
        let out = tokio::fs::metadata(dir.path().join("big.out")).await.unwrap();
        let err = tokio::fs::metadata(dir.path().join("big.err")).await.unwrap();
        assert_eq!(out.len(), 1_000_000);
        assert_eq!(err.len(), 1_000_000);
    }

    #[tokio::test]
    async fn test_background_rejects_escaping_capture_path() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let spec = CommandSpec::new("echo", ["x"]).with_stdout("../outside.log");
        let err = exec.run_in_background(&spec).await.unwrap_err();
        assert!(matches!(err, ExecError::Path(PathError::Escapes { .. })));
        assert!(exec.registry().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_background_spawn_failure_registers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let spec = CommandSpec::new("/definitely/not/a/program", Vec::<String>::new());
        let err = exec.run_in_background(&spec).await.unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
        assert!(exec.registry().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_background_deadline_kills_job() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let spec = CommandSpec::new("sleep", ["30"]).with_timeout(0.2);
        exec.run_in_background(&spec).await.unwrap();
        assert_eq!(exec.registry().list().await.unwrap().len(), 1);

        assert!(wait_until_empty(exec.registry(), Duration::from_secs(3)).await);
    }

    #[tokio::test]
    async fn test_background_unrepresentable_deadline_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let spec = CommandSpec::new("sleep", ["30"]).with_timeout(1.8e19);
        let job_no = exec.run_in_background(&spec).await.unwrap();

        tokio::time::sleep(TICK * 4).await;
        let jobs = exec.registry().list().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_no, job_no);

        exec.registry().kill(KillTarget::All).await.unwrap();
    }

    #[tokio::test]
    async fn test_unregistered_background_process_dies_with_its_job() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let spec = CommandSpec::new("sh", ["-c", "sleep 0.5; touch ran"]);
        let child = exec.background_command(&spec, false, false).spawn().unwrap();
        let job = Job::new(spec.command_line(), Box::new(ChildProcess::new(child)));

        drop(job);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(!dir.path().join("ran").exists());
    }

    #[tokio::test]
    async fn test_kill_background_job() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let first = exec
            .run_in_background(&CommandSpec::new("sleep", ["30"]))
            .await
            .unwrap();
        let second = exec
            .run_in_background(&CommandSpec::new("sleep", ["30"]))
            .await
            .unwrap();
        assert!(first < second);

        assert_eq!(exec.registry().kill(KillTarget::Job(first)).await.unwrap(), 1);
        let jobs = exec.registry().list().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_no, second);

        exec.registry().kill(KillTarget::All).await.unwrap();
        assert!(exec.registry().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_background_runs_get_distinct_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let exec = exec.clone();
                tokio::spawn(async move {
                    exec.run_in_background(&CommandSpec::new("sleep", ["5"]))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap());
        }
        numbers.sort_unstable();
        numbers.dedup();
        assert_eq!(numbers.len(), 10);

        exec.registry().kill(KillTarget::All).await.unwrap();
    }
}
