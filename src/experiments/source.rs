//! Experiment source retrieval
//!
//! Non-local experiments get their files either by cloning a git
//! repository or by unpacking an uploaded zip archive into the working
//! directory. Git work shells out to the host's `git` binary; archive
//! work uses an in-process zip reader on a blocking thread.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use super::error::SourceError;
use super::record::ExperimentRecord;

/// Git operations against experiment working directories
pub struct GitCli {
    base_dir: PathBuf,
}

impl GitCli {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn working_dir(&self, record: &ExperimentRecord) -> PathBuf {
        self.base_dir.join(&record.experiment.nickname)
    }

    /// Clone the record's repository into a fresh working directory
    ///
    /// An existing directory from an earlier attempt is removed first.
    pub async fn clone_repo(&self, record: &ExperimentRecord) -> Result<String, SourceError> {
        let address = record
            .experiment
            .address
            .as_deref()
            .filter(|a| !a.is_empty())
            .ok_or(SourceError::MissingAddress)?;

        tokio::fs::create_dir_all(&self.base_dir).await?;

        let destination = self.working_dir(record);
        match tokio::fs::remove_dir_all(&destination).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(SourceError::Io(e)),
        }

        let output = run_git(
            &self.base_dir,
            &["clone", address, &record.experiment.nickname],
        )
        .await?;

        tracing::info!(
            nickname = %record.experiment.nickname,
            address = %address,
            "Experiment repository cloned"
        );
        Ok(output)
    }

    /// Pull the latest changes in the working directory
    pub async fn pull(&self, record: &ExperimentRecord) -> Result<String, SourceError> {
        let dir = self.existing_working_dir(record).await?;
        run_git(&dir, &["pull"]).await
    }

    /// Switch the working directory to another branch
    pub async fn switch(
        &self,
        record: &ExperimentRecord,
        branch: &str,
    ) -> Result<String, SourceError> {
        let dir = self.existing_working_dir(record).await?;
        run_git(&dir, &["switch", branch]).await
    }

    async fn existing_working_dir(
        &self,
        record: &ExperimentRecord,
    ) -> Result<PathBuf, SourceError> {
        let dir = self.working_dir(record);
        if !tokio::fs::try_exists(&dir).await? {
            return Err(SourceError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("experiment directory does not exist: {}", dir.display()),
            )));
        }
        Ok(dir)
    }
}

/// Run `git -C <dir> <args…>`, returning the combined output
async fn run_git(dir: &Path, args: &[&str]) -> Result<String, SourceError> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .await
        .map_err(SourceError::GitSpawn)?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(SourceError::GitFailed(combined));
    }
    Ok(combined)
}

/// Zip archive installation into experiment working directories
pub struct ArchiveInstaller {
    base_dir: PathBuf,
}

impl ArchiveInstaller {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Whether an uploaded file name is an acceptable archive
    pub fn accepts(filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
    }

    /// Unpack an archive into a new working directory
    ///
    /// Fails if the working directory already exists; use [`Self::replace`]
    /// to reinstall.
    pub async fn install(
        &self,
        record: &ExperimentRecord,
        archive: &Path,
    ) -> Result<(), SourceError> {
        tokio::fs::create_dir_all(&self.base_dir).await?;

        let destination = self.base_dir.join(&record.experiment.nickname);
        tokio::fs::create_dir(&destination).await?;

        unpack(archive.to_path_buf(), destination.clone()).await?;
        tracing::info!(
            nickname = %record.experiment.nickname,
            "Experiment archive installed"
        );
        Ok(())
    }

    /// Remove any existing working directory and unpack the archive in
    /// its place
    pub async fn replace(
        &self,
        record: &ExperimentRecord,
        archive: &Path,
    ) -> Result<(), SourceError> {
        let destination = self.base_dir.join(&record.experiment.nickname);
        match tokio::fs::remove_dir_all(&destination).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(SourceError::Io(e)),
        }

        self.install(record, archive).await
    }
}

/// Extract a zip file on a blocking thread
async fn unpack(archive: PathBuf, destination: PathBuf) -> Result<(), SourceError> {
    let result = tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&archive).map_err(SourceError::Io)?;
        let mut zip = zip::ZipArchive::new(file)
            .map_err(|e| SourceError::InvalidArchive(e.to_string()))?;
        zip.extract(&destination)
            .map_err(|e| SourceError::Extract(e.to_string()))
    })
    .await;

    match result {
        Ok(inner) => inner,
        Err(e) => Err(SourceError::Extract(format!("unpack task failed: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::super::record::{Exec, Experiment, ExperimentKind};
    use super::*;

    fn record(nickname: &str) -> ExperimentRecord {
        ExperimentRecord::register(Experiment {
            nickname: nickname.to_string(),
            kind: ExperimentKind::Archive,
            address: None,
            data_path: None,
            execs: vec![Exec {
                nickname: None,
                exec: "python main.py".to_string(),
            }],
        })
    }

    fn write_test_zip(path: &Path) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();

        writer.start_file("main.py", options).unwrap();
        writer.write_all(b"print('hello')\n").unwrap();
        writer.add_directory("assets", options).unwrap();
        writer.start_file("assets/config.json", options).unwrap();
        writer.write_all(b"{}\n").unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_accepts_only_zip() {
        assert!(ArchiveInstaller::accepts("exp.zip"));
        assert!(ArchiveInstaller::accepts("exp.ZIP"));
        assert!(!ArchiveInstaller::accepts("exp.tar.gz"));
        assert!(!ArchiveInstaller::accepts("exp"));
    }

    #[tokio::test]
    async fn test_install_unpacks_into_working_dir() {
        let base = tempfile::tempdir().unwrap();
        let archive = base.path().join("upload.zip");
        write_test_zip(&archive);

        let installer = ArchiveInstaller::new(base.path());
        let rec = record("rdk");
        installer.install(&rec, &archive).await.unwrap();

        let workdir = base.path().join("rdk");
        assert!(workdir.join("main.py").exists());
        assert!(workdir.join("assets/config.json").exists());
    }

    #[tokio::test]
    async fn test_install_refuses_existing_dir() {
        let base = tempfile::tempdir().unwrap();
        let archive = base.path().join("upload.zip");
        write_test_zip(&archive);
        std::fs::create_dir_all(base.path().join("rdk")).unwrap();

        let installer = ArchiveInstaller::new(base.path());
        let result = installer.install(&record("rdk"), &archive).await;
        assert!(matches!(result, Err(SourceError::Io(_))));
    }

    #[tokio::test]
    async fn test_replace_overwrites_existing_dir() {
        let base = tempfile::tempdir().unwrap();
        let archive = base.path().join("upload.zip");
        write_test_zip(&archive);

        let workdir = base.path().join("rdk");
        std::fs::create_dir_all(&workdir).unwrap();
        std::fs::write(workdir.join("stale.txt"), b"old").unwrap();

        let installer = ArchiveInstaller::new(base.path());
        installer.replace(&record("rdk"), &archive).await.unwrap();

        assert!(workdir.join("main.py").exists());
        assert!(!workdir.join("stale.txt").exists());
    }

    #[tokio::test]
    async fn test_install_rejects_non_archive() {
        let base = tempfile::tempdir().unwrap();
        let bogus = base.path().join("upload.zip");
        std::fs::write(&bogus, b"this is not a zip file").unwrap();

        let installer = ArchiveInstaller::new(base.path());
        let result = installer.install(&record("rdk"), &bogus).await;
        assert!(matches!(result, Err(SourceError::InvalidArchive(_))));
    }

    #[tokio::test]
    async fn test_clone_requires_address() {
        let base = tempfile::tempdir().unwrap();
        let git = GitCli::new(base.path());

        let mut rec = record("rdk");
        rec.experiment.kind = ExperimentKind::Git;
        rec.experiment.address = None;

        let result = git.clone_repo(&rec).await;
        assert!(matches!(result, Err(SourceError::MissingAddress)));
    }

    #[tokio::test]
    async fn test_pull_requires_existing_working_dir() {
        let base = tempfile::tempdir().unwrap();
        let git = GitCli::new(base.path());

        let result = git.pull(&record("rdk")).await;
        assert!(matches!(result, Err(SourceError::Io(_))));
    }
}
