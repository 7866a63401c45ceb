//! Owned handles to spawned OS processes.

use std::io;

use tokio::process::Child;

/// Observed state of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// The process has exited and been waited on. `code` is `None` when it
    /// was ended by a signal.
    Exited { code: Option<i32> },
}

/// Exclusive ownership of one live process.
///
/// The executor creates a handle at spawn time and gives it to the registry
/// at registration; from then on only the registry loop touches it.
pub trait ProcessHandle: Send + 'static {
    fn pid(&self) -> Option<u32>;

    /// Non-blocking exit check. Once this reports `Exited`, the process has
    /// been reaped and every later call reports the same state.
    fn try_state(&mut self) -> io::Result<ProcessState>;

    /// Send a forceful stop signal without waiting for the process to die.
    ///
    /// The process is reaped in the background.
    fn terminate(self: Box<Self>);
}

/// [`ProcessHandle`] backed by a tokio child process.
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
}

impl ChildProcess {
    pub fn new(child: Child) -> Self {
        Self { child }
    }
}

impl ProcessHandle for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_state(&mut self) -> io::Result<ProcessState> {
        Ok(match self.child.try_wait()? {
            Some(status) => ProcessState::Exited {
                code: status.code(),
            },
            None => ProcessState::Running,
        })
    }

    fn terminate(self: Box<Self>) {
        let mut child = self.child;
        let pid = child.id();
        if let Err(e) = child.start_kill() {
            // Already exited; the wait below still reaps it.
            tracing::debug!(pid = ?pid, error = %e, "kill signal not delivered");
        }
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => tracing::debug!(pid = ?pid, status = %status, "killed process reaped"),
                Err(e) => tracing::warn!(pid = ?pid, error = %e, "failed to reap killed process"),
            }
        });
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Duration;
    use tokio::process::Command;

    fn spawn(cmd: &str, args: &[&str]) -> ChildProcess {
        let child = Command::new(cmd)
            .args(args)
            .stdout(Stdio::null())
            .spawn()
            .expect("spawn test process");
        ChildProcess::new(child)
    }

    async fn wait_for_exit(process: &mut ChildProcess) -> ProcessState {
        for _ in 0..100 {
            let state = process.try_state().unwrap();
            if state != ProcessState::Running {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("process did not exit");
    }

    #[tokio::test]
    async fn test_exit_code_observed() {
        let mut process = spawn("sh", &["-c", "exit 3"]);
        assert!(process.pid().is_some());
        assert_eq!(
            wait_for_exit(&mut process).await,
            ProcessState::Exited { code: Some(3) }
        );
        // Stays exited once observed.
        assert_eq!(
            process.try_state().unwrap(),
            ProcessState::Exited { code: Some(3) }
        );
    }

    #[tokio::test]
    async fn test_running_until_exit() {
        let mut process = spawn("sleep", &["5"]);
        assert_eq!(process.try_state().unwrap(), ProcessState::Running);
        Box::new(process).terminate();
    }

    #[tokio::test]
    async fn test_terminate_kills_process() {
        let process = spawn("sleep", &["30"]);
        let pid = process.pid().unwrap();
        Box::new(process).terminate();

        // The process table entry goes away once the background wait reaps it.
        let mut gone = false;
        for _ in 0..100 {
            let alive = std::process::Command::new("kill")
                .args(["-0", &pid.to_string()])
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false);
            if !alive {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(gone, "process {pid} still alive after terminate");
    }
}
