//! Experiment lifecycle service
//!
//! The operations the HTTP surface calls, tying together the record
//! store, the source capabilities, and the process supervisor. State
//! transitions on records go through the store's take-and-restore guard
//! so a failed fetch never loses or corrupts a record.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use super::error::{ExperimentError, SourceError};
use super::process::{ProcessSupervisor, StartedProcess};
use super::record::{Experiment, ExperimentRecord, RecordStatus};
use super::source::{ArchiveInstaller, GitCli};
use super::store::RecordStore;

/// Orchestrates experiment registration, retrieval, and execution
pub struct ExperimentService {
    store: RecordStore,
    supervisor: Arc<ProcessSupervisor>,
    git: GitCli,
    archives: ArchiveInstaller,
}

impl ExperimentService {
    /// Open the service rooted at `base_dir` (the experiments directory
    /// under the platform data home)
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, ExperimentError> {
        let base_dir = base_dir.into();
        let store = RecordStore::open(&base_dir)?;

        Ok(Self {
            store,
            supervisor: Arc::new(ProcessSupervisor::new(&base_dir)),
            git: GitCli::new(&base_dir),
            archives: ArchiveInstaller::new(&base_dir),
        })
    }

    /// The experiments directory
    pub fn base_dir(&self) -> &Path {
        self.store.base_dir()
    }

    /// All records, oldest registration first
    pub fn list(&self) -> Vec<ExperimentRecord> {
        self.store.load_all()
    }

    /// One record by id
    pub fn get(&self, id: Uuid) -> Result<ExperimentRecord, ExperimentError> {
        self.store.get(id).ok_or(ExperimentError::NotFound(id))
    }

    /// Register new experiment meta-information
    ///
    /// Sources are not fetched here: git and archive experiments stay
    /// `uninitialized` until their first fetch operation.
    pub fn register(&self, experiment: Experiment) -> Result<ExperimentRecord, ExperimentError> {
        if self.store.nickname_in_use(&experiment.nickname, None) {
            return Err(ExperimentError::NicknameTaken(experiment.nickname));
        }

        let record = ExperimentRecord::register(experiment);
        self.store.put(record.clone())?;
        tracing::info!(
            id = %record.id,
            nickname = %record.experiment.nickname,
            kind = %record.experiment.kind,
            "Experiment registered"
        );
        Ok(record)
    }

    /// Replace a record's meta-information, creating the record if the id
    /// is unknown
    ///
    /// Returns the stored record and whether it was newly created.
    pub fn update_meta(
        &self,
        id: Uuid,
        experiment: Experiment,
    ) -> Result<(ExperimentRecord, bool), ExperimentError> {
        if self.store.nickname_in_use(&experiment.nickname, Some(id)) {
            return Err(ExperimentError::NicknameTaken(experiment.nickname));
        }

        let (mut record, created) = match self.store.get(id) {
            Some(existing) => (existing, false),
            None => {
                let mut fresh = ExperimentRecord::register(experiment.clone());
                fresh.id = id;
                (fresh, true)
            }
        };

        record.experiment = experiment;
        record.touch();
        self.store.put(record.clone())?;
        Ok((record, created))
    }

    /// Remove a record and its non-local working directory
    pub fn delete(&self, id: Uuid) -> Result<(), ExperimentError> {
        match self.store.delete(id)? {
            Some(record) => {
                tracing::info!(
                    id = %id,
                    nickname = %record.experiment.nickname,
                    "Experiment deleted"
                );
                Ok(())
            }
            None => Err(ExperimentError::NotFound(id)),
        }
    }

    /// Remove every record and working directory
    pub fn clear(&self) -> Result<(), ExperimentError> {
        self.store.clear()?;
        tracing::info!("All experiments deleted");
        Ok(())
    }

    /// Clone an uninitialized git experiment and mark it ready
    pub async fn git_init(&self, id: Uuid) -> Result<(ExperimentRecord, String), ExperimentError> {
        let guard = self.store.take(id).ok_or(ExperimentError::NotFound(id))?;
        if guard.record().status != RecordStatus::Uninitialized {
            return Err(ExperimentError::InvalidState(
                "experiment is already initialized".into(),
            ));
        }

        let output = self.git.clone_repo(guard.record()).await?;

        let mut updated = guard.to_record();
        updated.status = RecordStatus::Ok;
        updated.touch();
        guard.commit(updated.clone())?;
        Ok((updated, output))
    }

    /// Pull the latest changes for an initialized git experiment
    pub async fn git_update(&self, id: Uuid) -> Result<(ExperimentRecord, String), ExperimentError> {
        let guard = self.store.take(id).ok_or(ExperimentError::NotFound(id))?;
        if guard.record().status == RecordStatus::Uninitialized {
            return Err(ExperimentError::InvalidState(
                "experiment is uninitialized".into(),
            ));
        }

        let output = self.git.pull(guard.record()).await?;

        let mut updated = guard.to_record();
        updated.touch();
        guard.commit(updated.clone())?;
        Ok((updated, output))
    }

    /// Switch an initialized git experiment to another branch
    pub async fn git_switch(
        &self,
        id: Uuid,
        branch: &str,
    ) -> Result<(ExperimentRecord, String), ExperimentError> {
        let guard = self.store.take(id).ok_or(ExperimentError::NotFound(id))?;
        if guard.record().status == RecordStatus::Uninitialized {
            return Err(ExperimentError::InvalidState(
                "experiment is uninitialized".into(),
            ));
        }

        let output = self.git.switch(guard.record(), branch).await?;

        let mut updated = guard.to_record();
        updated.branch = Some(branch.to_string());
        updated.touch();
        guard.commit(updated.clone())?;
        Ok((updated, output))
    }

    /// Install an uploaded archive into the experiment's working
    /// directory
    ///
    /// `replace` removes an existing working directory first (the PUT
    /// semantics); without it an existing directory is an error.
    pub async fn install_artifact(
        &self,
        id: Uuid,
        filename: &str,
        archive: &Path,
        replace: bool,
    ) -> Result<ExperimentRecord, ExperimentError> {
        if !ArchiveInstaller::accepts(filename) {
            return Err(ExperimentError::Source(SourceError::InvalidArchive(
                format!("only .zip archives are supported, got: {}", filename),
            )));
        }

        let guard = self.store.take(id).ok_or(ExperimentError::NotFound(id))?;

        if replace {
            self.archives.replace(guard.record(), archive).await?;
        } else {
            self.archives.install(guard.record(), archive).await?;
        }

        let mut updated = guard.to_record();
        updated.status = RecordStatus::Ok;
        updated.touch();
        guard.commit(updated.clone())?;
        Ok(updated)
    }

    /// Launch an experiment process
    pub async fn start(
        &self,
        id: Uuid,
        selector: Option<&str>,
    ) -> Result<StartedProcess, ExperimentError> {
        let record = self.get(id)?;
        if record.experiment.execs.is_empty() {
            return Err(ExperimentError::InvalidRecord(
                "experiment exec command is empty".into(),
            ));
        }

        let started = self.supervisor.start(&record, selector).await?;
        Ok(started)
    }

    /// Kill the running experiment process
    pub async fn stop(&self) -> Result<StartedProcess, ExperimentError> {
        let stopped = self.supervisor.stop().await?;
        Ok(stopped)
    }

    /// Whether an experiment process is currently running
    pub async fn is_running(&self) -> bool {
        self.supervisor.is_running().await
    }
}
