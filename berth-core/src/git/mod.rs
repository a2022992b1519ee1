//! Version-control operations service.
//!
//! Wraps libgit2 with the policies the stack controller needs: a process-wide
//! cap on concurrent clone/pull operations, bounded retries with linear
//! backoff, per-request deadlines that also bound permit acquisition and
//! backoff sleeps, credential resolution with service-level defaults, and a
//! best-effort disk-space guard before clones. Read-only queries (branches,
//! tags, file content, latest commit, validation, dirty check) are
//! single-attempt and never retried.
//!
//! libgit2 transfers are blocking, so every clone/pull attempt runs on the
//! blocking pool; an attempt whose deadline fires is abandoned rather than
//! interrupted, and the retry loop never sleeps past the deadline.

use crate::error::{BerthError, Result};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    BranchType, Cred, FetchOptions, ObjectType, RemoteCallbacks, Repository, ResetType,
    StatusOptions,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{info, instrument, warn};

/// Authentication descriptor for a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GitAuth {
    /// Anonymous access.
    #[default]
    None,
    /// SSH key-based authentication.
    Ssh {
        /// Path to the private key; falls back to the service default.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        private_key_path: Option<PathBuf>,
        /// Passphrase for an encrypted key.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        passphrase: Option<String>,
    },
    /// HTTPS basic/token authentication.
    Https {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        /// Password or personal access token.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },
}

/// Tuning knobs for the git service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Cap on simultaneous clone/pull operations (0 means the default of 5).
    pub max_concurrent_operations: usize,
    /// Retries after the first failed attempt (0 means no retries... the
    /// request can still override per call).
    pub retry_attempts: u32,
    /// Fail clones fast when the target filesystem has less than this many
    /// bytes free. 0 disables the check.
    pub min_free_space_bytes: u64,
    /// Default per-operation timeout in seconds. 0 disables it.
    pub operation_timeout_secs: u64,
    /// SSH key used when a request's descriptor omits one.
    pub default_ssh_key: Option<PathBuf>,
    /// Username paired with the default HTTPS token.
    pub default_https_username: Option<String>,
    /// HTTPS token used when a request's descriptor omits credentials.
    pub default_https_token: Option<String>,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            max_concurrent_operations: 5,
            retry_attempts: 3,
            min_free_space_bytes: 0,
            operation_timeout_secs: 0,
            default_ssh_key: None,
            default_https_username: None,
            default_https_token: None,
        }
    }
}

/// Request to clone a repository.
#[derive(Debug, Clone)]
pub struct CloneRequest {
    pub url: String,
    /// Branch to check out (None for the remote default).
    pub branch: Option<String>,
    pub directory: PathBuf,
    pub auth: GitAuth,
    /// Shallow clone depth (None for a full clone).
    pub depth: Option<i32>,
    /// Restrict the clone to the requested branch.
    pub single_branch: bool,
    /// Deadline for the whole retry loop, permit wait included.
    pub timeout: Option<Duration>,
    /// Validate the repository after cloning (failure is logged, not raised).
    pub validate: bool,
    /// Per-request retry override.
    pub retry_attempts: Option<u32>,
}

impl CloneRequest {
    /// Clone `url` into `directory` with default options.
    pub fn new(url: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            branch: None,
            directory: directory.into(),
            auth: GitAuth::None,
            depth: None,
            single_branch: false,
            timeout: None,
            validate: false,
            retry_attempts: None,
        }
    }
}

/// Request to pull an existing repository.
#[derive(Debug, Clone)]
pub struct PullRequest {
    pub path: PathBuf,
    /// Branch to pull (None for the current HEAD branch).
    pub branch: Option<String>,
    pub auth: GitAuth,
    /// Hard-reset a dirty worktree before pulling.
    pub force: bool,
    pub timeout: Option<Duration>,
    pub retry_attempts: Option<u32>,
}

impl PullRequest {
    /// Pull the repository at `path` with default options.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            branch: None,
            auth: GitAuth::None,
            force: false,
            timeout: None,
            retry_attempts: None,
        }
    }
}

/// A cloned repository on disk.
#[derive(Debug, Clone)]
pub struct ClonedRepository {
    pub path: PathBuf,
    pub url: String,
}

/// Information about a branch.
#[derive(Debug, Clone, Serialize)]
pub struct BranchInfo {
    pub name: String,
    pub commit: String,
    pub is_default: bool,
}

/// Information about a tag.
#[derive(Debug, Clone, Serialize)]
pub struct TagInfo {
    pub name: String,
    pub commit: String,
}

/// Credentials after merging the request descriptor with service defaults.
#[derive(Clone)]
enum ResolvedAuth {
    Anonymous,
    Ssh { private_key: PathBuf, passphrase: Option<String> },
    Https { username: String, secret: String },
}

/// Rate-limited, retrying git client.
pub struct GitService {
    config: GitConfig,
    permits: Arc<Semaphore>,
}

impl GitService {
    /// Create a new git service.
    pub fn new(config: GitConfig) -> Self {
        let max_concurrent = if config.max_concurrent_operations == 0 {
            5
        } else {
            config.max_concurrent_operations
        };
        Self { config, permits: Arc::new(Semaphore::new(max_concurrent)) }
    }

    /// Clone a repository.
    ///
    /// Fails with Conflict if the target directory already exists, DiskSpace
    /// if the free-space floor is configured and not met, and CloneFailed
    /// wrapping the last underlying error once retries are exhausted.
    #[instrument(skip(self, req), fields(url = %req.url, directory = %req.directory.display()))]
    pub async fn clone_repository(&self, req: CloneRequest) -> Result<ClonedRepository> {
        info!(branch = req.branch.as_deref().unwrap_or(""), "cloning repository");

        let parent =
            req.directory.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        self.check_disk_space(&parent)?;

        let timeout = self.effective_timeout(req.timeout);
        let deadline = timeout.map(|t| Instant::now() + t);
        let _permit = self.acquire_permit(deadline, timeout).await?;

        if req.directory.exists() {
            return Err(BerthError::RepositoryExists { path: req.directory });
        }

        let auth = resolve_auth(&req.auth, &self.config)?;
        let attempts = req.retry_attempts.unwrap_or(self.config.retry_attempts);
        let args = CloneArgs {
            url: req.url.clone(),
            branch: req.branch.clone(),
            single_branch: req.single_branch,
            depth: req.depth,
            directory: req.directory.clone(),
            auth,
        };

        let mut last_err: Option<git2::Error> = None;
        for attempt in 0..=attempts {
            if attempt > 0 {
                let delay = Duration::from_secs(u64::from(attempt));
                if let Some(d) = deadline {
                    if Instant::now() + delay >= d {
                        return Err(BerthError::Timeout {
                            timeout: timeout.unwrap_or_default(),
                        });
                    }
                }
                warn!(attempt, "retrying clone");
                tokio::time::sleep(delay).await;
            }

            let attempt_args = args.clone();
            let outcome =
                run_blocking(deadline, timeout, move || clone_once(&attempt_args)).await?;
            match outcome {
                Ok(()) => {
                    last_err = None;
                    break;
                }
                Err(err) => {
                    // leave no partial checkout behind for the next attempt
                    if req.directory.exists() {
                        let _ = std::fs::remove_dir_all(&req.directory);
                    }
                    last_err = Some(err);
                }
            }
        }

        if let Some(err) = last_err {
            metrics::counter!("berth_git_errors_total", "operation" => "clone").increment(1);
            tracing::error!(attempts = attempts + 1, error = %err, "failed to clone repository after retries");
            return Err(BerthError::CloneFailed { url: req.url, reason: err.to_string() });
        }

        info!("repository cloned successfully");

        if req.validate {
            if let Err(err) = self.validate_repository(&req.directory) {
                warn!(error = %err, "repository validation failed after clone");
            }
        }

        Ok(ClonedRepository { path: req.directory, url: req.url })
    }

    /// Pull the latest changes into an existing repository.
    ///
    /// "Already up to date" is success. Fails with NotFound if there is no
    /// repository at the path, PullFailed once retries are exhausted.
    #[instrument(skip(self, req), fields(path = %req.path.display()))]
    pub async fn pull(&self, req: PullRequest) -> Result<()> {
        info!(
            branch = req.branch.as_deref().unwrap_or(""),
            force = req.force,
            "pulling repository"
        );

        let timeout = self.effective_timeout(req.timeout);
        let deadline = timeout.map(|t| Instant::now() + t);
        let _permit = self.acquire_permit(deadline, timeout).await?;

        if !self.repository_exists(&req.path) {
            return Err(BerthError::RepositoryNotFound { path: req.path });
        }

        let auth = resolve_auth(&req.auth, &self.config)?;
        let attempts = req.retry_attempts.unwrap_or(self.config.retry_attempts);
        let args = PullArgs {
            path: req.path.clone(),
            branch: req.branch.clone(),
            force: req.force,
            auth,
        };

        let mut last_err: Option<git2::Error> = None;
        for attempt in 0..=attempts {
            if attempt > 0 {
                let delay = Duration::from_secs(u64::from(attempt));
                if let Some(d) = deadline {
                    if Instant::now() + delay >= d {
                        return Err(BerthError::Timeout {
                            timeout: timeout.unwrap_or_default(),
                        });
                    }
                }
                warn!(attempt, "retrying pull");
                tokio::time::sleep(delay).await;
            }

            let attempt_args = args.clone();
            let outcome =
                run_blocking(deadline, timeout, move || pull_once(&attempt_args)).await?;
            match outcome {
                Ok(()) => {
                    last_err = None;
                    break;
                }
                Err(err) => last_err = Some(err),
            }
        }

        if let Some(err) = last_err {
            metrics::counter!("berth_git_errors_total", "operation" => "pull").increment(1);
            tracing::error!(attempts = attempts + 1, error = %err, "failed to pull repository after retries");
            return Err(BerthError::PullFailed { path: req.path, reason: err.to_string() });
        }

        info!("repository pulled successfully");
        Ok(())
    }

    /// Check that a remote repository is reachable with the given credentials.
    ///
    /// Performs a single-attempt probe clone into a scratch directory that is
    /// discarded afterwards.
    #[instrument(skip(self, auth), fields(url = %url))]
    pub async fn validate_remote(&self, url: &str, auth: &GitAuth) -> Result<()> {
        let scratch = tempfile::tempdir()
            .map_err(|e| BerthError::Io { path: std::env::temp_dir(), source: e })?;

        let mut req = CloneRequest::new(url, scratch.path().join("probe"));
        req.auth = auth.clone();
        req.retry_attempts = Some(0);
        req.timeout = self.effective_timeout(None);

        self.clone_repository(req)
            .await
            .map_err(|e| BerthError::ValidationFailed { reason: e.to_string() })?;
        Ok(())
    }

    /// Check whether a working copy exists at the path.
    pub fn repository_exists(&self, directory: &Path) -> bool {
        directory.join(".git").exists()
    }

    /// Remove a working copy from disk.
    pub fn remove_repository(&self, directory: &Path) -> Result<()> {
        std::fs::remove_dir_all(directory)
            .map_err(|e| BerthError::Io { path: directory.to_path_buf(), source: e })
    }

    /// Validate a local repository: HEAD must resolve to a commit and at
    /// least one remote must be configured.
    pub fn validate_repository(&self, path: &Path) -> Result<()> {
        let repo = open_repository(path)?;

        let head = repo.head().map_err(|e| BerthError::InvalidRepository {
            path: path.to_path_buf(),
            reason: format!("HEAD is not resolvable: {}", e),
        })?;
        head.peel_to_commit().map_err(|e| BerthError::InvalidRepository {
            path: path.to_path_buf(),
            reason: format!("HEAD does not point at a commit: {}", e),
        })?;

        let remotes = repo.remotes().map_err(|e| BerthError::InvalidRepository {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if remotes.is_empty() {
            return Err(BerthError::InvalidRepository {
                path: path.to_path_buf(),
                reason: "no remotes configured".to_string(),
            });
        }

        Ok(())
    }

    /// Check whether the worktree has uncommitted changes (untracked included).
    pub fn is_dirty(&self, path: &Path) -> Result<bool> {
        let repo = open_repository(path)?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true);
        let statuses = repo.statuses(Some(&mut opts)).map_err(|e| {
            BerthError::InvalidRepository { path: path.to_path_buf(), reason: e.to_string() }
        })?;
        Ok(!statuses.is_empty())
    }

    /// List local branches with their head commits.
    pub fn branches(&self, path: &Path) -> Result<Vec<BranchInfo>> {
        let repo = open_repository(path)?;
        let head_name =
            repo.head().ok().and_then(|h| h.shorthand().map(str::to_string));

        let mut infos = Vec::new();
        let branches = repo.branches(Some(BranchType::Local)).map_err(|e| {
            BerthError::InvalidRepository { path: path.to_path_buf(), reason: e.to_string() }
        })?;
        for entry in branches {
            let (branch, _) = entry.map_err(|e| BerthError::InvalidRepository {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            let name = match branch.name() {
                Ok(Some(name)) => name.to_string(),
                _ => continue,
            };
            let commit = match branch.get().peel_to_commit() {
                Ok(commit) => commit.id().to_string(),
                Err(err) => {
                    warn!(branch = %name, error = %err, "failed to resolve branch head");
                    continue;
                }
            };
            let is_default = head_name.as_deref() == Some(name.as_str());
            infos.push(BranchInfo { name, commit, is_default });
        }
        Ok(infos)
    }

    /// List tags with the commits they point at.
    pub fn tags(&self, path: &Path) -> Result<Vec<TagInfo>> {
        let repo = open_repository(path)?;

        let mut raw = Vec::new();
        repo.tag_foreach(|oid, refname| {
            raw.push((oid, String::from_utf8_lossy(refname).into_owned()));
            true
        })
        .map_err(|e| BerthError::InvalidRepository {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut infos = Vec::new();
        for (oid, refname) in raw {
            let name = refname.strip_prefix("refs/tags/").unwrap_or(&refname).to_string();
            // annotated tags peel to their target commit
            let commit = repo
                .find_object(oid, None)
                .ok()
                .and_then(|obj| obj.peel_to_commit().ok())
                .map(|c| c.id().to_string());
            match commit {
                Some(commit) => infos.push(TagInfo { name, commit }),
                None => warn!(tag = %name, "failed to resolve tag target"),
            }
        }
        Ok(infos)
    }

    /// Read a file from the worktree.
    pub fn file_content(&self, path: &Path, file_path: &str) -> Result<String> {
        open_repository(path)?;
        std::fs::read_to_string(path.join(file_path))
            .map_err(|_| BerthError::FileNotFound { path: file_path.to_string() })
    }

    /// Latest commit id on a branch (or on HEAD when no branch is given).
    pub fn latest_commit(&self, path: &Path, branch: Option<&str>) -> Result<String> {
        let repo = open_repository(path)?;
        let commit = match branch {
            Some(branch) => repo
                .find_branch(branch, BranchType::Local)
                .map_err(|_| BerthError::BranchNotFound { branch: branch.to_string() })?
                .get()
                .peel_to_commit()
                .map_err(|e| BerthError::InvalidRepository {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?,
            None => repo
                .head()
                .and_then(|h| h.peel_to_commit())
                .map_err(|e| BerthError::InvalidRepository {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?,
        };
        Ok(commit.id().to_string())
    }

    fn effective_timeout(&self, requested: Option<Duration>) -> Option<Duration> {
        requested.or_else(|| {
            (self.config.operation_timeout_secs > 0)
                .then(|| Duration::from_secs(self.config.operation_timeout_secs))
        })
    }

    /// Acquire a concurrency permit, giving up at the deadline.
    async fn acquire_permit(
        &self,
        deadline: Option<Instant>,
        timeout: Option<Duration>,
    ) -> Result<OwnedSemaphorePermit> {
        let acquire = self.permits.clone().acquire_owned();
        let permit = match deadline {
            Some(d) => tokio::time::timeout_at(d, acquire)
                .await
                .map_err(|_| BerthError::Timeout { timeout: timeout.unwrap_or_default() })?,
            None => acquire.await,
        };
        permit.map_err(|_| BerthError::Cancelled)
    }

    /// Best-effort free-space check; a failed probe never blocks the operation.
    #[cfg(unix)]
    fn check_disk_space(&self, directory: &Path) -> Result<()> {
        use std::os::unix::ffi::OsStrExt;

        let required = self.config.min_free_space_bytes;
        if required == 0 {
            return Ok(());
        }

        let Ok(cpath) = std::ffi::CString::new(directory.as_os_str().as_bytes()) else {
            return Ok(());
        };
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        if unsafe { libc::statvfs(cpath.as_ptr(), &mut stat) } != 0 {
            warn!(directory = %directory.display(), "failed to query free disk space");
            return Ok(());
        }

        let available = stat.f_bavail as u64 * stat.f_frsize as u64;
        if available < required {
            return Err(BerthError::DiskSpace { available, required });
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn check_disk_space(&self, _directory: &Path) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone)]
struct CloneArgs {
    url: String,
    branch: Option<String>,
    single_branch: bool,
    depth: Option<i32>,
    directory: PathBuf,
    auth: ResolvedAuth,
}

#[derive(Clone)]
struct PullArgs {
    path: PathBuf,
    branch: Option<String>,
    force: bool,
    auth: ResolvedAuth,
}

/// Run a blocking git operation on the blocking pool, bounded by the deadline.
async fn run_blocking<T, F>(
    deadline: Option<Instant>,
    timeout: Option<Duration>,
    f: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let task = tokio::task::spawn_blocking(f);
    let joined = match deadline {
        Some(d) => tokio::time::timeout_at(d, task)
            .await
            .map_err(|_| BerthError::Timeout { timeout: timeout.unwrap_or_default() })?,
        None => task.await,
    };
    joined.map_err(|e| BerthError::Internal(format!("git task failed: {}", e)))
}

fn clone_once(args: &CloneArgs) -> std::result::Result<(), git2::Error> {
    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(remote_callbacks(args.auth.clone()));
    if let Some(depth) = args.depth {
        fetch.depth(depth);
    }

    let mut builder = RepoBuilder::new();
    builder.fetch_options(fetch);
    if let Some(branch) = &args.branch {
        builder.branch(branch);
        if args.single_branch {
            let refspec = format!("+refs/heads/{0}:refs/remotes/origin/{0}", branch);
            builder.remote_create(move |repo, name, url| {
                repo.remote_with_fetch(name, url, &refspec)
            });
        }
    }

    builder.clone(&args.url, &args.directory)?;
    Ok(())
}

fn pull_once(args: &PullArgs) -> std::result::Result<(), git2::Error> {
    let repo = Repository::open(&args.path)?;

    if args.force {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true);
        let dirty = !repo.statuses(Some(&mut opts))?.is_empty();
        if dirty {
            warn!(path = %args.path.display(), "force pull: discarding local changes");
            let head = repo.head()?.peel(ObjectType::Commit)?;
            repo.reset(&head, ResetType::Hard, None)?;
        }
    }

    let branch = match &args.branch {
        Some(branch) => branch.clone(),
        None => repo.head()?.shorthand().unwrap_or("HEAD").to_string(),
    };

    let mut remote = repo.find_remote("origin")?;
    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(remote_callbacks(args.auth.clone()));
    remote.fetch(&[branch.as_str()], Some(&mut fetch), None)?;

    let fetch_head = repo.find_reference("FETCH_HEAD")?;
    let fetch_commit = repo.reference_to_annotated_commit(&fetch_head)?;
    let (analysis, _) = repo.merge_analysis(&[&fetch_commit])?;

    if analysis.is_up_to_date() {
        return Ok(());
    }
    if analysis.is_fast_forward() {
        let refname = format!("refs/heads/{}", branch);
        let mut reference = repo.find_reference(&refname)?;
        reference.set_target(fetch_commit.id(), "fast-forward")?;
        repo.set_head(&refname)?;
        repo.checkout_head(Some(CheckoutBuilder::default().force()))?;
        return Ok(());
    }
    Err(git2::Error::from_str("local history has diverged; cannot fast-forward"))
}

/// Merge the request descriptor with the service defaults.
///
/// Fails with AuthenticationFailed when a non-anonymous descriptor cannot be
/// turned into a usable credential.
fn resolve_auth(auth: &GitAuth, config: &GitConfig) -> Result<ResolvedAuth> {
    match auth {
        GitAuth::None => Ok(ResolvedAuth::Anonymous),
        GitAuth::Ssh { private_key_path, passphrase } => {
            let private_key = private_key_path
                .clone()
                .or_else(|| config.default_ssh_key.clone())
                .ok_or_else(|| BerthError::AuthenticationFailed {
                    reason: "no SSH private key available".to_string(),
                })?;
            Ok(ResolvedAuth::Ssh { private_key, passphrase: passphrase.clone() })
        }
        GitAuth::Https { username, password } => {
            if let Some(password) = password.clone().filter(|p| !p.is_empty()) {
                let username = username
                    .clone()
                    .filter(|u| !u.is_empty())
                    .unwrap_or_else(|| "git".to_string());
                return Ok(ResolvedAuth::Https { username, secret: password });
            }
            if let Some(token) =
                config.default_https_token.clone().filter(|t| !t.is_empty())
            {
                let username = config
                    .default_https_username
                    .clone()
                    .filter(|u| !u.is_empty())
                    .unwrap_or_else(|| "git".to_string());
                return Ok(ResolvedAuth::Https { username, secret: token });
            }
            Err(BerthError::AuthenticationFailed {
                reason: "HTTPS authentication requires a token or username/password"
                    .to_string(),
            })
        }
    }
}

fn remote_callbacks(auth: ResolvedAuth) -> RemoteCallbacks<'static> {
    let mut callbacks = RemoteCallbacks::new();
    match auth {
        ResolvedAuth::Anonymous => {}
        ResolvedAuth::Ssh { private_key, passphrase } => {
            callbacks.credentials(move |_url, username_from_url, _allowed| {
                Cred::ssh_key(
                    username_from_url.unwrap_or("git"),
                    None,
                    &private_key,
                    passphrase.as_deref(),
                )
            });
        }
        ResolvedAuth::Https { username, secret } => {
            callbacks.credentials(move |_url, _username, _allowed| {
                Cred::userpass_plaintext(&username, &secret)
            });
        }
    }
    callbacks
}

fn open_repository(path: &Path) -> Result<Repository> {
    Repository::open(path)
        .map_err(|_| BerthError::RepositoryNotFound { path: path.to_path_buf() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_auth_none() {
        let config = GitConfig::default();
        assert!(matches!(
            resolve_auth(&GitAuth::None, &config),
            Ok(ResolvedAuth::Anonymous)
        ));
    }

    #[test]
    fn test_resolve_auth_ssh_requires_a_key() {
        let config = GitConfig::default();
        let auth = GitAuth::Ssh { private_key_path: None, passphrase: None };
        assert!(matches!(
            resolve_auth(&auth, &config),
            Err(BerthError::AuthenticationFailed { .. })
        ));

        let config =
            GitConfig { default_ssh_key: Some(PathBuf::from("/etc/berth/id_ed25519")), ..config };
        assert!(matches!(
            resolve_auth(&auth, &config),
            Ok(ResolvedAuth::Ssh { private_key, .. }) if private_key == PathBuf::from("/etc/berth/id_ed25519")
        ));
    }

    #[test]
    fn test_resolve_auth_https_falls_back_to_default_token() {
        let auth = GitAuth::Https { username: None, password: None };

        let config = GitConfig::default();
        assert!(matches!(
            resolve_auth(&auth, &config),
            Err(BerthError::AuthenticationFailed { .. })
        ));

        let config = GitConfig {
            default_https_token: Some("tok".to_string()),
            default_https_username: Some("ci".to_string()),
            ..GitConfig::default()
        };
        match resolve_auth(&auth, &config) {
            Ok(ResolvedAuth::Https { username, secret }) => {
                assert_eq!(username, "ci");
                assert_eq!(secret, "tok");
            }
            other => panic!("expected https credentials, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn test_explicit_https_password_wins_over_default() {
        let auth = GitAuth::Https {
            username: Some("dev".to_string()),
            password: Some("secret".to_string()),
        };
        let config = GitConfig {
            default_https_token: Some("tok".to_string()),
            ..GitConfig::default()
        };
        match resolve_auth(&auth, &config) {
            Ok(ResolvedAuth::Https { username, secret }) => {
                assert_eq!(username, "dev");
                assert_eq!(secret, "secret");
            }
            other => panic!("expected https credentials, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn test_auth_descriptor_round_trips_tagged_json() {
        let auth = GitAuth::Ssh {
            private_key_path: Some(PathBuf::from("/home/ci/.ssh/id_ed25519")),
            passphrase: None,
        };
        let json = serde_json::to_string(&auth).unwrap();
        assert!(json.contains(r#""type":"ssh""#));
        let back: GitAuth = serde_json::from_str(&json).unwrap();
        assert_eq!(back, auth);
    }
}
