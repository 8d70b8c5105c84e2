//! Experiment error types
//!
//! Each sub-component has its own error enum; `ExperimentError` is what
//! the service surfaces to the HTTP layer.

use uuid::Uuid;

/// Error type for record store operations
#[derive(Debug)]
pub enum StoreError {
    /// Persisting the record file failed; the in-memory state is already
    /// updated
    Persist(std::io::Error),
    /// The record file exists but could not be parsed
    Corrupt(serde_json::Error),
    /// Reading the record file failed
    Load(std::io::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Persist(e) => write!(f, "failed to persist experiment records: {}", e),
            StoreError::Corrupt(e) => write!(f, "experiment record file is corrupt: {}", e),
            StoreError::Load(e) => write!(f, "failed to load experiment records: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Persist(e) | StoreError::Load(e) => Some(e),
            StoreError::Corrupt(e) => Some(e),
        }
    }
}

/// Error type for git retrieval and archive installation
#[derive(Debug)]
pub enum SourceError {
    /// The record is missing a field the operation needs
    MissingAddress,
    /// `git` exited non-zero; the combined output is attached
    GitFailed(String),
    /// Running `git` failed outright
    GitSpawn(std::io::Error),
    /// The uploaded file is not an acceptable archive
    InvalidArchive(String),
    /// Unpacking the archive failed
    Extract(String),
    /// Filesystem work around the working directory failed
    Io(std::io::Error),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::MissingAddress => write!(f, "experiment address is empty"),
            SourceError::GitFailed(output) => write!(f, "git failed: {}", output.trim()),
            SourceError::GitSpawn(e) => write!(f, "failed to run git: {}", e),
            SourceError::InvalidArchive(reason) => write!(f, "invalid archive: {}", reason),
            SourceError::Extract(reason) => write!(f, "failed to unpack archive: {}", reason),
            SourceError::Io(e) => write!(f, "filesystem error: {}", e),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SourceError::GitSpawn(e) | SourceError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        SourceError::Io(e)
    }
}

/// Error type for the process supervisor
#[derive(Debug)]
pub enum ProcessError {
    /// Another experiment process is alive
    AlreadyRunning,
    /// There is nothing to stop
    NoneRunning,
    /// The record cannot be launched as-is
    InvalidRecord(String),
    /// Spawning the child failed
    Spawn(std::io::Error),
    /// Delivering the kill failed
    Kill(std::io::Error),
}

impl std::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessError::AlreadyRunning => write!(f, "another experiment is already running"),
            ProcessError::NoneRunning => write!(f, "no experiment is running"),
            ProcessError::InvalidRecord(reason) => {
                write!(f, "experiment cannot be started: {}", reason)
            }
            ProcessError::Spawn(e) => write!(f, "failed to start experiment process: {}", e),
            ProcessError::Kill(e) => write!(f, "failed to stop experiment process: {}", e),
        }
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProcessError::Spawn(e) | ProcessError::Kill(e) => Some(e),
            _ => None,
        }
    }
}

/// Error type surfaced by the experiment service
#[derive(Debug)]
pub enum ExperimentError {
    /// No record with this id
    NotFound(Uuid),
    /// Another record already uses this nickname
    NicknameTaken(String),
    /// The operation does not apply to the record's current state
    InvalidState(String),
    /// The record is malformed for this operation
    InvalidRecord(String),
    Store(StoreError),
    Source(SourceError),
    Process(ProcessError),
}

impl std::fmt::Display for ExperimentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExperimentError::NotFound(id) => write!(f, "experiment not found: {}", id),
            ExperimentError::NicknameTaken(nickname) => {
                write!(f, "experiment nickname already in use: {}", nickname)
            }
            ExperimentError::InvalidState(reason) => write!(f, "{}", reason),
            ExperimentError::InvalidRecord(reason) => write!(f, "{}", reason),
            ExperimentError::Store(e) => write!(f, "{}", e),
            ExperimentError::Source(e) => write!(f, "{}", e),
            ExperimentError::Process(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ExperimentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExperimentError::Store(e) => Some(e),
            ExperimentError::Source(e) => Some(e),
            ExperimentError::Process(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for ExperimentError {
    fn from(e: StoreError) -> Self {
        ExperimentError::Store(e)
    }
}

impl From<SourceError> for ExperimentError {
    fn from(e: SourceError) -> Self {
        ExperimentError::Source(e)
    }
}

impl From<ProcessError> for ExperimentError {
    fn from(e: ProcessError) -> Self {
        ExperimentError::Process(e)
    }
}
