//! Per-job isolated filesystem workspace.
//!
//! Every job owns a disjoint directory under `<storage_root>/jobs/<id>`,
//! provisioned lazily on first access. Relative paths returned by the
//! helpers are relative to the storage root (so they can be persisted and
//! later served); `absolute` resolves them back. Input filenames supplied
//! as job parameters resolve relative to the job directory and are
//! existence-checked: a nonexistent referenced file means "modality not
//! supplied", never an error.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::types::DbId;

const JOBS_SUBDIR: &str = "jobs";

/// Filesystem permission policy applied once when a job directory is
/// provisioned. Configured centrally instead of chmod-ing every file the
/// pipeline touches.
#[derive(Debug, Clone, Copy)]
pub struct WorkspacePolicy {
    /// Unix mode for the job directory, e.g. `0o777` so pipeline
    /// containers running as a different user can write into it. `None`
    /// leaves the process umask in charge.
    pub dir_mode: Option<u32>,
}

impl Default for WorkspacePolicy {
    fn default() -> Self {
        Self {
            dir_mode: Some(0o777),
        }
    }
}

/// Handle on one job's workspace directory.
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    storage_root: PathBuf,
    job_id: DbId,
    policy: WorkspacePolicy,
}

impl JobWorkspace {
    pub fn new(storage_root: impl Into<PathBuf>, job_id: DbId, policy: WorkspacePolicy) -> Self {
        Self {
            storage_root: storage_root.into(),
            job_id,
            policy,
        }
    }

    pub fn job_id(&self) -> DbId {
        self.job_id
    }

    /// Path of the job directory relative to the storage root.
    pub fn relative_dir(&self) -> PathBuf {
        Path::new(JOBS_SUBDIR).join(self.job_id.to_string())
    }

    /// Absolute path of the job directory, provisioning it (and applying
    /// the permission policy) on first access.
    pub fn dir(&self) -> io::Result<PathBuf> {
        let dir = self.storage_root.join(self.relative_dir());
        if !dir.is_dir() {
            fs::create_dir_all(&dir)?;
            self.apply_policy(&dir)?;
        }
        Ok(dir)
    }

    #[cfg(unix)]
    fn apply_policy(&self, dir: &Path) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        if let Some(mode) = self.policy.dir_mode {
            fs::set_permissions(dir, fs::Permissions::from_mode(mode))?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn apply_policy(&self, _dir: &Path) -> io::Result<()> {
        Ok(())
    }

    /// Resolve a storage-root-relative path to an absolute one.
    pub fn absolute(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.storage_root.join(relative)
    }

    /// Relative path of a fresh randomized temp file inside the job
    /// directory. The generated stem is stripped of non-word characters.
    pub fn temp_file(&self, prefix: &str, suffix: &str) -> PathBuf {
        let stem = sanitize_filename(&format!(
            "{prefix}{}",
            uuid::Uuid::new_v4().simple()
        ));
        self.relative_dir().join(format!("{stem}{suffix}"))
    }

    /// Relative path of a named file derived from the job's name:
    /// `<prefix><slugified name><suffix>` inside the job directory.
    pub fn named_file(&self, job_name: &str, prefix: &str, suffix: &str) -> PathBuf {
        self.relative_dir()
            .join(format!("{prefix}{}{suffix}", slugify(job_name)))
    }

    /// Whether a storage-root-relative path exists.
    pub fn exists(&self, relative: impl AsRef<Path>) -> bool {
        self.absolute(relative).exists()
    }

    /// Whether an absolute path exists.
    pub fn exists_absolute(path: impl AsRef<Path>) -> bool {
        path.as_ref().exists()
    }

    /// Resolve an input filename parameter against the job directory.
    /// Returns the absolute path only when the file exists.
    pub fn resolve_input(&self, filename: Option<&str>) -> Option<PathBuf> {
        let filename = filename?;
        if filename.is_empty() {
            return None;
        }
        let path = self
            .storage_root
            .join(self.relative_dir())
            .join(filename);
        path.is_file().then_some(path)
    }

    /// Recursively delete the job directory. Invoked when the record is
    /// deleted; a workspace that was never provisioned is a no-op.
    pub fn delete(&self) -> io::Result<()> {
        let dir = self.storage_root.join(self.relative_dir());
        if dir.is_dir() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}

/// Strip every non-word character (anything but alphanumerics and `_`).
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// Generate a filesystem-safe slug from a job name.
///
/// Converts to lowercase, replaces special characters with hyphens,
/// collapses consecutive hyphens, and trims leading/trailing hyphens.
pub fn slugify(name: &str) -> String {
    let lowered: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();

    let mut result = String::with_capacity(lowered.len());
    let mut prev_hyphen = false;
    for c in lowered.chars() {
        if c == '-' {
            if !prev_hyphen {
                result.push('-');
            }
            prev_hyphen = true;
        } else {
            result.push(c);
            prev_hyphen = false;
        }
    }

    result.trim_matches('-').to_string()
}
