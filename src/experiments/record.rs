//! Experiment record data model
//!
//! The persisted form matches what remote tooling sends and receives:
//! lowercase status and kind strings, RFC 3339 timestamps, and explicit
//! `null`s for absent optional fields.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Initialization state of an experiment's working directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Registered, but the files have not been fetched yet
    Uninitialized,
    /// The working directory is ready to run
    Ok,
}

/// How the experiment's files are obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentKind {
    /// Cloned from a git repository (`address` is the remote URL)
    Git,
    /// Installed from an uploaded zip archive
    Archive,
    /// Already present on this host (`address` is the absolute path)
    Local,
}

impl std::fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExperimentKind::Git => write!(f, "git"),
            ExperimentKind::Archive => write!(f, "archive"),
            ExperimentKind::Local => write!(f, "local"),
        }
    }
}

/// A launchable command belonging to an experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exec {
    /// Optional name so clients can pick between several commands
    pub nickname: Option<String>,
    /// The command line, split on whitespace at launch
    pub exec: String,
}

/// Experiment meta-information supplied at registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub nickname: String,
    #[serde(rename = "type")]
    pub kind: ExperimentKind,
    /// Remote URL (git) or absolute path (local)
    pub address: Option<String>,
    /// Where the experiment writes its data, if it tells us
    pub data_path: Option<String>,
    pub execs: Vec<Exec>,
}

/// A registered experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub id: Uuid,
    pub status: RecordStatus,
    /// Branch last switched to, for git experiments
    pub branch: Option<String>,
    pub register_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub experiment: Experiment,
}

impl ExperimentRecord {
    /// Build a fresh record for newly registered meta-information
    ///
    /// Local experiments are ready as soon as they are registered, since
    /// their files already exist outside our tree; everything else starts
    /// uninitialized until its first fetch.
    pub fn register(experiment: Experiment) -> Self {
        let status = match experiment.kind {
            ExperimentKind::Local => RecordStatus::Ok,
            _ => RecordStatus::Uninitialized,
        };
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            status,
            branch: None,
            register_time: now,
            last_update: now,
            experiment,
        }
    }

    /// Set the update timestamp to now
    pub fn touch(&mut self) {
        self.last_update = Utc::now();
    }

    /// The directory the experiment process launches in
    ///
    /// Local experiments run in their own absolute `address`; everything
    /// else runs in `<base>/<nickname>`.
    pub fn working_dir(&self, base: &Path) -> Option<PathBuf> {
        match self.experiment.kind {
            ExperimentKind::Local => self
                .experiment
                .address
                .as_deref()
                .filter(|a| !a.is_empty())
                .map(PathBuf::from),
            _ => Some(base.join(&self.experiment.nickname)),
        }
    }

    /// Pick the exec to launch: by nickname when a selector is given,
    /// otherwise the first entry
    pub fn select_exec(&self, selector: Option<&str>) -> Option<&Exec> {
        match selector {
            Some(name) => self
                .experiment
                .execs
                .iter()
                .find(|e| e.nickname.as_deref() == Some(name)),
            None => self.experiment.execs.first(),
        }
    }
}
