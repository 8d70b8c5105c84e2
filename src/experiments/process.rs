//! Single-slot experiment process supervisor
//!
//! One experiment process may run at a time. The slot holds the pid and a
//! kill channel; the spawned child itself is owned by a reaper task that
//! waits for the exit, logs failures, and clears the slot. `stop` hands a
//! kill request to the reaper and waits for the acknowledgement, so kill
//! errors surface to the caller.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

use super::error::ProcessError;
use super::record::ExperimentRecord;

/// Reply channel for a kill request
type KillAck = oneshot::Sender<std::io::Result<()>>;

/// Handle data for the process occupying the slot
struct RunningExperiment {
    id: Uuid,
    pid: u32,
    /// Distinguishes this occupancy from later ones, so a stale reaper
    /// never clears a newer process
    token: u64,
    kill_tx: Option<oneshot::Sender<KillAck>>,
}

/// What `start` reports back to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartedProcess {
    pub id: Uuid,
    pub pid: u32,
}

/// Launches and supervises at most one experiment process
pub struct ProcessSupervisor {
    base_dir: PathBuf,
    slot: Mutex<Option<RunningExperiment>>,
    next_token: AtomicU64,
}

impl ProcessSupervisor {
    /// Create a supervisor whose non-local experiments run under
    /// `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            slot: Mutex::new(None),
            next_token: AtomicU64::new(1),
        }
    }

    /// Whether the slot is occupied
    pub async fn is_running(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Id and pid of the running experiment, if any
    pub async fn current(&self) -> Option<StartedProcess> {
        self.slot
            .lock()
            .await
            .as_ref()
            .map(|r| StartedProcess { id: r.id, pid: r.pid })
    }

    /// Launch the experiment described by `record`
    ///
    /// The exec is chosen by `selector` (falling back to the first
    /// entry), split on whitespace, and launched in the record's working
    /// directory with stdout and stderr inherited. The slot lock is held
    /// from the running check through the spawn so two concurrent starts
    /// cannot both succeed.
    pub async fn start(
        self: &Arc<Self>,
        record: &ExperimentRecord,
        selector: Option<&str>,
    ) -> Result<StartedProcess, ProcessError> {
        let exec = record.select_exec(selector).ok_or_else(|| {
            ProcessError::InvalidRecord(match selector {
                Some(name) => format!("no exec named {}", name),
                None => "experiment exec command is empty".to_string(),
            })
        })?;

        let mut parts = exec.exec.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| ProcessError::InvalidRecord("experiment exec command is empty".into()))?;

        let working_dir = record.working_dir(&self.base_dir).ok_or_else(|| {
            ProcessError::InvalidRecord("local experiment has no address".into())
        })?;

        let mut slot = self.slot.lock().await;
        if slot.is_some() {
            return Err(ProcessError::AlreadyRunning);
        }

        let mut child = Command::new(program)
            .args(parts)
            .current_dir(&working_dir)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(ProcessError::Spawn)?;

        let pid = child.id().ok_or_else(|| {
            ProcessError::Spawn(std::io::Error::other("process exited before reporting a pid"))
        })?;

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (kill_tx, kill_rx) = oneshot::channel();
        *slot = Some(RunningExperiment {
            id: record.id,
            pid,
            token,
            kill_tx: Some(kill_tx),
        });
        drop(slot);

        tracing::info!(
            id = %record.id,
            pid,
            dir = %working_dir.display(),
            exec = %exec.exec,
            "Experiment started"
        );

        let supervisor = Arc::clone(self);
        let id = record.id;
        tokio::spawn(async move {
            supervisor.reap(child, kill_rx, id, token).await;
        });

        Ok(StartedProcess { id: record.id, pid })
    }

    /// Kill the running experiment and clear the slot
    pub async fn stop(&self) -> Result<StartedProcess, ProcessError> {
        let mut slot = self.slot.lock().await;
        let Some(mut running) = slot.take() else {
            return Err(ProcessError::NoneRunning);
        };
        drop(slot);

        let stopped = StartedProcess {
            id: running.id,
            pid: running.pid,
        };

        let Some(kill_tx) = running.kill_tx.take() else {
            return Ok(stopped);
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        if kill_tx.send(ack_tx).is_err() {
            // Reaper already finished; the process is gone
            return Ok(stopped);
        }

        match ack_rx.await {
            Ok(Ok(())) => {
                tracing::info!(id = %stopped.id, pid = stopped.pid, "Experiment stopped");
                Ok(stopped)
            }
            Ok(Err(e)) => Err(ProcessError::Kill(e)),
            // Reaper exited between accepting the request and replying
            Err(_) => Ok(stopped),
        }
    }

    /// Wait for the child to exit, honoring a kill request, then release
    /// the slot
    async fn reap(
        &self,
        mut child: Child,
        mut kill_rx: oneshot::Receiver<KillAck>,
        id: Uuid,
        token: u64,
    ) {
        enum ReapEvent {
            Exited(std::io::Result<std::process::ExitStatus>),
            KillRequested(Result<KillAck, oneshot::error::RecvError>),
        }

        let event = tokio::select! {
            status = child.wait() => ReapEvent::Exited(status),
            request = &mut kill_rx => ReapEvent::KillRequested(request),
        };

        let status = match event {
            ReapEvent::Exited(status) => status,
            ReapEvent::KillRequested(request) => {
                if let Ok(ack) = request {
                    let _ = ack.send(child.start_kill());
                }
                child.wait().await
            }
        };

        match status {
            Ok(status) if status.success() => {
                tracing::debug!(id = %id, "Experiment exited cleanly");
            }
            Ok(status) => {
                tracing::error!(id = %id, status = %status, "Experiment exited with error");
            }
            Err(e) => {
                tracing::error!(id = %id, error = %e, "Failed waiting for experiment exit");
            }
        }

        let mut slot = self.slot.lock().await;
        if slot.as_ref().map(|r| r.token) == Some(token) {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use super::super::record::{Exec, Experiment, ExperimentKind};
    use super::*;

    fn record(dir: &Path, execs: Vec<Exec>) -> ExperimentRecord {
        ExperimentRecord::register(Experiment {
            nickname: "proc-test".to_string(),
            kind: ExperimentKind::Local,
            address: Some(dir.to_string_lossy().into_owned()),
            data_path: None,
            execs,
        })
    }

    fn exec(line: &str) -> Exec {
        Exec {
            nickname: None,
            exec: line.to_string(),
        }
    }

    async fn wait_until_idle(supervisor: &Arc<ProcessSupervisor>) {
        for _ in 0..200 {
            if !supervisor.is_running().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("supervisor never became idle");
    }

    #[tokio::test]
    async fn test_start_records_pid_and_reaps_exit() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Arc::new(ProcessSupervisor::new(dir.path()));
        let rec = record(dir.path(), vec![exec("true")]);

        let started = supervisor.start(&rec, None).await.unwrap();
        assert_eq!(started.id, rec.id);
        assert!(started.pid > 0);

        wait_until_idle(&supervisor).await;
    }

    #[tokio::test]
    async fn test_second_start_conflicts_until_exit() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Arc::new(ProcessSupervisor::new(dir.path()));
        let long = record(dir.path(), vec![exec("sleep 30")]);

        supervisor.start(&long, None).await.unwrap();
        assert!(matches!(
            supervisor.start(&long, None).await,
            Err(ProcessError::AlreadyRunning)
        ));

        supervisor.stop().await.unwrap();
        wait_until_idle(&supervisor).await;

        // Slot is free again
        let quick = record(dir.path(), vec![exec("true")]);
        supervisor.start(&quick, None).await.unwrap();
        wait_until_idle(&supervisor).await;
    }

    #[tokio::test]
    async fn test_stop_without_running_process() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Arc::new(ProcessSupervisor::new(dir.path()));

        assert!(matches!(
            supervisor.stop().await,
            Err(ProcessError::NoneRunning)
        ));
    }

    #[tokio::test]
    async fn test_stop_kills_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Arc::new(ProcessSupervisor::new(dir.path()));
        let rec = record(dir.path(), vec![exec("sleep 30")]);

        let started = supervisor.start(&rec, None).await.unwrap();
        let stopped = supervisor.stop().await.unwrap();
        assert_eq!(stopped.pid, started.pid);

        wait_until_idle(&supervisor).await;
    }

    #[tokio::test]
    async fn test_exec_selector_picks_named_command() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Arc::new(ProcessSupervisor::new(dir.path()));
        let rec = record(
            dir.path(),
            vec![
                Exec {
                    nickname: Some("long".to_string()),
                    exec: "sleep 30".to_string(),
                },
                Exec {
                    nickname: Some("quick".to_string()),
                    exec: "true".to_string(),
                },
            ],
        );

        supervisor.start(&rec, Some("quick")).await.unwrap();
        wait_until_idle(&supervisor).await;

        assert!(matches!(
            supervisor.start(&rec, Some("missing")).await,
            Err(ProcessError::InvalidRecord(_))
        ));
    }

    #[tokio::test]
    async fn test_start_with_empty_execs() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Arc::new(ProcessSupervisor::new(dir.path()));
        let rec = record(dir.path(), vec![]);

        assert!(matches!(
            supervisor.start(&rec, None).await,
            Err(ProcessError::InvalidRecord(_))
        ));
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_slot_free() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Arc::new(ProcessSupervisor::new(dir.path()));
        let rec = record(dir.path(), vec![exec("/nonexistent/binary-for-test")]);

        assert!(matches!(
            supervisor.start(&rec, None).await,
            Err(ProcessError::Spawn(_))
        ));
        assert!(!supervisor.is_running().await);
    }
}
