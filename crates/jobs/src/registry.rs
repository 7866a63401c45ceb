//! The job registry: sole owner of the live-job table.
//!
//! A single task owns the table and serves four kinds of messages (register,
//! list, kill, shutdown) plus a periodic tick that reaps exited jobs. Callers
//! hold a cheap cloneable [`JobRegistry`] handle and never touch the table.
//!
//! Completion detection is poll-based: a job that exits naturally leaves the
//! table at the first tick after both its process has exited and its output
//! drains have finished, so within one poll interval of that moment. A job
//! with a deadline leaves at the first tick past the deadline even if its
//! drains are still open.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::id::JobIdSource;
use crate::metrics;
use crate::process::{ProcessHandle, ProcessState};
use crate::types::{JobNo, JobSummary, KillTarget};

/// Default interval between reaping sweeps.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

const QUEUE_DEPTH: usize = 256;

/// A spawned process on its way into the registry.
///
/// The job number is assigned by the registry at registration, so numbers
/// follow registration order.
pub struct Job {
    command_line: String,
    stdout_file: Option<String>,
    stderr_file: Option<String>,
    process: Box<dyn ProcessHandle>,
    drains: Vec<JoinHandle<()>>,
    deadline: Option<Instant>,
    exited: Option<ProcessState>,
}

impl Job {
    pub fn new(command_line: impl Into<String>, process: Box<dyn ProcessHandle>) -> Self {
        Self {
            command_line: command_line.into(),
            stdout_file: None,
            stderr_file: None,
            process,
            drains: Vec::new(),
            deadline: None,
            exited: None,
        }
    }

    /// Names shown in the job list for the capture files.
    pub fn with_capture_files(mut self, stdout: Option<String>, stderr: Option<String>) -> Self {
        self.stdout_file = stdout;
        self.stderr_file = stderr;
        self
    }

    /// Output drain tasks that must finish before the job can be reaped.
    pub fn with_drains(mut self, drains: Vec<JoinHandle<()>>) -> Self {
        self.drains = drains;
        self
    }

    /// Kill the job if it is still registered when `deadline` passes.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn summary(&self, job_no: JobNo) -> JobSummary {
        JobSummary {
            job_no,
            cmd_line: self.command_line.clone(),
            stdout_file: self.stdout_file.clone().unwrap_or_default(),
            stderr_file: self.stderr_file.clone().unwrap_or_default(),
        }
    }

    /// Whether the process has exited and all output has been drained.
    fn is_finished(&mut self, job_no: JobNo) -> bool {
        if self.exited.is_none() {
            match self.process.try_state() {
                Ok(ProcessState::Running) => {}
                Ok(state) => self.exited = Some(state),
                Err(e) => {
                    warn!(job_no, error = %e, "exit check failed; treating job as exited");
                    self.exited = Some(ProcessState::Exited { code: None });
                }
            }
        }
        self.exited.is_some() && self.drains.iter().all(JoinHandle::is_finished)
    }

    /// Stop the process and stop waiting for its output. A drain can outlive
    /// the process when a descendant still holds the pipe open.
    fn terminate(self) {
        for drain in &self.drains {
            drain.abort();
        }
        self.process.terminate();
    }
}

enum RegistryCommand {
    Register {
        job: Job,
        reply: oneshot::Sender<JobNo>,
    },
    List {
        reply: oneshot::Sender<Vec<JobSummary>>,
    },
    Kill {
        target: KillTarget,
        reply: oneshot::Sender<usize>,
    },
    Shutdown {
        reply: oneshot::Sender<usize>,
    },
}

/// Handle to the registry loop.
///
/// Cloning is cheap; every clone talks to the same table. The loop stops when
/// [`shutdown`](Self::shutdown) is called or every handle is dropped, and
/// kills whatever jobs are still registered on the way out.
#[derive(Clone)]
pub struct JobRegistry {
    tx: mpsc::Sender<RegistryCommand>,
}

impl JobRegistry {
    /// Start the registry loop on the current tokio runtime.
    pub fn spawn(poll_interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let registry_loop = RegistryLoop {
            jobs: BTreeMap::new(),
            ids: JobIdSource::new(),
        };
        tokio::spawn(registry_loop.run(rx, poll_interval));
        Self { tx }
    }

    /// Hand a spawned job to the registry and get its job number.
    ///
    /// If the registry is gone the job's process is terminated.
    pub async fn register(&self, job: Job) -> Result<JobNo, RegistryError> {
        let (reply, rx) = oneshot::channel();
        if let Err(mpsc::error::SendError(cmd)) =
            self.tx.send(RegistryCommand::Register { job, reply }).await
        {
            if let RegistryCommand::Register { job, .. } = cmd {
                job.terminate();
            }
            return Err(RegistryError);
        }
        rx.await.map_err(|_| RegistryError)
    }

    /// Snapshot of all registered jobs, in job-number order.
    pub async fn list(&self) -> Result<Vec<JobSummary>, RegistryError> {
        self.request(|reply| RegistryCommand::List { reply }).await
    }

    /// Terminate and remove the matching jobs. Returns how many were removed;
    /// a job number that is not registered is not an error.
    pub async fn kill(&self, target: KillTarget) -> Result<usize, RegistryError> {
        self.request(|reply| RegistryCommand::Kill { target, reply }).await
    }

    /// Kill every job and stop the loop. Returns how many jobs were killed.
    pub async fn shutdown(&self) -> Result<usize, RegistryError> {
        self.request(|reply| RegistryCommand::Shutdown { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T, RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| RegistryError)?;
        rx.await.map_err(|_| RegistryError)
    }
}

struct RegistryLoop {
    jobs: BTreeMap<JobNo, Job>,
    ids: JobIdSource,
}

impl RegistryLoop {
    async fn run(mut self, mut rx: mpsc::Receiver<RegistryCommand>, poll_interval: Duration) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(cmd) => {
                        if let Some(reply) = self.handle(cmd) {
                            rx.close();
                            while let Ok(queued) = rx.try_recv() {
                                if let RegistryCommand::Register { job, .. } = queued {
                                    job.terminate();
                                }
                            }
                            let killed = self.kill(KillTarget::All);
                            info!(killed, "job registry shut down");
                            let _ = reply.send(killed);
                            return;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => self.sweep(),
            }
        }

        let killed = self.kill(KillTarget::All);
        debug!(killed, "all registry handles dropped; loop stopped");
    }

    /// Serve one message. Returns the reply channel if the message asks the
    /// loop to shut down.
    fn handle(&mut self, cmd: RegistryCommand) -> Option<oneshot::Sender<usize>> {
        match cmd {
            RegistryCommand::Register { job, reply } => {
                let job_no = self.ids.next();
                info!(
                    job_no,
                    pid = ?job.process.pid(),
                    cmd_line = %job.command_line,
                    "job registered"
                );
                if reply.send(job_no).is_err() {
                    // Caller went away; keep tracking the process anyway.
                    debug!(job_no, "register reply dropped");
                }
                self.jobs.insert(job_no, job);
                metrics::record_spawned();
                metrics::record_live(self.jobs.len());
            }
            RegistryCommand::List { reply } => {
                let jobs = self
                    .jobs
                    .iter()
                    .map(|(job_no, job)| job.summary(*job_no))
                    .collect();
                let _ = reply.send(jobs);
            }
            RegistryCommand::Kill { target, reply } => {
                let killed = self.kill(target);
                let _ = reply.send(killed);
            }
            RegistryCommand::Shutdown { reply } => return Some(reply),
        }
        None
    }

    fn kill(&mut self, target: KillTarget) -> usize {
        let doomed: Vec<JobNo> = self
            .jobs
            .keys()
            .copied()
            .filter(|job_no| target.matches(*job_no))
            .collect();
        for job_no in &doomed {
            if let Some(job) = self.jobs.remove(job_no) {
                info!(job_no, cmd_line = %job.command_line, "killing job");
                job.terminate();
            }
        }
        if !doomed.is_empty() {
            metrics::record_killed(doomed.len());
            metrics::record_live(self.jobs.len());
        }
        doomed.len()
    }

    fn sweep(&mut self) {
        let now = Instant::now();
        let mut finished = Vec::new();
        let mut expired = Vec::new();
        for (job_no, job) in self.jobs.iter_mut() {
            if job.is_finished(*job_no) {
                finished.push(*job_no);
            } else if job.deadline.is_some_and(|d| d <= now) {
                expired.push(*job_no);
            }
        }

        for job_no in &finished {
            if let Some(job) = self.jobs.remove(job_no) {
                let code = match job.exited {
                    Some(ProcessState::Exited { code }) => code,
                    _ => None,
                };
                info!(job_no, exit_code = ?code, cmd_line = %job.command_line, "job reaped");
            }
        }
        if !finished.is_empty() {
            metrics::record_reaped(finished.len());
        }

        for job_no in expired {
            info!(job_no, "background job deadline passed");
            self.kill(KillTarget::Job(job_no));
        }

        metrics::record_live(self.jobs.len());
    }
}
