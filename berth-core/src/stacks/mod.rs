//! Stack lifecycle service.
//!
//! Owns stack records and keeps each stack's on-disk working copy in step
//! with its repository configuration: creation validates and clones, updates
//! to git-related fields re-sync (pull when a working copy exists, clone
//! otherwise), deletion removes the working copy. The working copy lives at
//! a deterministic path derived from the stack id.

use crate::error::{BerthError, Result};
use crate::git::{CloneRequest, GitService, PullRequest};
use crate::store::{Repository, Store};
use crate::types::{Stack, StackChange, StackDraft, StackStatus};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Service owning stack records and their working copies.
pub struct StackService {
    stacks: Repository<Stack>,
    git: Arc<GitService>,
    repositories_dir: PathBuf,
}

impl StackService {
    /// Create a new stack service.
    pub fn new(store: &Store, git: Arc<GitService>, repositories_dir: impl Into<PathBuf>) -> Self {
        Self { stacks: store.repository(), git, repositories_dir: repositories_dir.into() }
    }

    /// The deterministic working copy path for a stack.
    pub fn working_copy_path(&self, id: Uuid) -> PathBuf {
        self.repositories_dir.join(id.to_string())
    }

    /// Create a stack.
    ///
    /// When a repository URL is set, the remote is validated before anything
    /// is persisted, and the repository is cloned into the stack's working
    /// copy after the record is created. A failed clone deletes the
    /// just-created record (best effort) and returns the clone error.
    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create(&self, draft: StackDraft) -> Result<Stack> {
        if !draft.git_url.is_empty() {
            self.git.validate_remote(&draft.git_url, &draft.git_auth).await?;
        }

        let stack = Stack::new(draft);
        self.stacks.create(&stack, &[Stack::name_key(&stack.name)])?;
        info!(stack_id = %stack.id, "stack created");

        if stack.git_url.is_empty() {
            return Ok(stack);
        }

        let mut clone = CloneRequest::new(&stack.git_url, self.working_copy_path(stack.id));
        clone.branch = branch_of(&stack.git_branch);
        clone.auth = stack.git_auth.clone();
        clone.validate = true;

        if let Err(err) = self.git.clone_repository(clone).await {
            // compensate: the record must not outlive a failed initial clone
            if let Err(delete_err) = self.stacks.delete(stack.id) {
                warn!(stack_id = %stack.id, error = %delete_err, "failed to remove stack after clone failure");
            }
            return Err(err);
        }

        let stack = self.stacks.update(stack.id, |current| {
            let mut next = current.clone();
            next.last_sync = Some(Utc::now());
            next.updated_at = Utc::now();
            Ok(next)
        })?;
        info!(stack_id = %stack.id, "working copy cloned");
        Ok(stack)
    }

    /// Apply a partial update to a stack.
    ///
    /// Renames are rejected. When a git-related field changed and a URL is
    /// set, the working copy is re-synced: a sync failure parks the stack in
    /// `error` status and surfaces the error; success refreshes the last-sync
    /// timestamp and restores `active`.
    #[instrument(skip(self, change), fields(stack_id = %id))]
    pub async fn update(&self, id: Uuid, change: StackChange) -> Result<Stack> {
        let touches_git = change.touches_git();

        let updated = self.stacks.update(id, move |current| {
            if let Some(name) = &change.name {
                if name != &current.name {
                    return Err(BerthError::NotAllowed {
                        reason: "stack renames are not allowed".to_string(),
                    });
                }
            }
            let mut next = current.clone();
            next.apply(change);
            next.updated_at = Utc::now();
            Ok(next)
        })?;

        if !touches_git || updated.git_url.is_empty() {
            return Ok(updated);
        }

        match self.sync_working_copy(&updated).await {
            Ok(()) => self.stacks.update(id, |current| {
                let mut next = current.clone();
                next.last_sync = Some(Utc::now());
                if next.status == StackStatus::Error {
                    next.status = StackStatus::Active;
                }
                next.updated_at = Utc::now();
                Ok(next)
            }),
            Err(err) => {
                let marked = self.stacks.update(id, |current| {
                    let mut next = current.clone();
                    next.status = StackStatus::Error;
                    next.updated_at = Utc::now();
                    Ok(next)
                });
                if let Err(mark_err) = marked {
                    warn!(stack_id = %id, error = %mark_err, "failed to mark stack as errored");
                }
                Err(err)
            }
        }
    }

    /// Delete a stack.
    ///
    /// The working copy is removed best-effort first; a removal failure never
    /// blocks deletion of the record.
    #[instrument(skip(self), fields(stack_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let stack = self.stacks.get(id)?;

        let directory = self.working_copy_path(id);
        if self.git.repository_exists(&directory) {
            if let Err(err) = self.git.remove_repository(&directory) {
                warn!(stack_id = %id, error = %err, "failed to remove working copy; continuing with delete");
            }
        }

        self.stacks.delete(id)?;
        info!(stack_id = %id, name = %stack.name, "stack deleted");
        Ok(())
    }

    /// Get a stack by id.
    pub fn get(&self, id: Uuid) -> Result<Stack> {
        self.stacks.get(id)
    }

    /// Get a stack by its unique name.
    pub fn get_by_name(&self, name: &str) -> Result<Stack> {
        self.stacks.get_by_index(&Stack::name_key(name))
    }

    /// List all stacks.
    pub fn list(&self) -> Result<Vec<Stack>> {
        self.stacks.list()
    }

    /// List stacks in a given lifecycle status.
    pub fn list_by_status(&self, status: StackStatus) -> Result<Vec<Stack>> {
        self.stacks.list_by_index(&Stack::status_prefix(status))
    }

    /// List stacks carrying a given label.
    pub fn list_by_label(&self, key: &str, value: &str) -> Result<Vec<Stack>> {
        self.stacks.list_by_index(&Stack::label_prefix(key, value))
    }

    /// Pull the stack's working copy, or clone it when none exists yet.
    async fn sync_working_copy(&self, stack: &Stack) -> Result<()> {
        let directory = self.working_copy_path(stack.id);

        if self.git.repository_exists(&directory) {
            let mut pull = PullRequest::new(directory);
            pull.branch = branch_of(&stack.git_branch);
            pull.auth = stack.git_auth.clone();
            pull.force = true;
            self.git.pull(pull).await
        } else {
            let mut clone = CloneRequest::new(&stack.git_url, directory);
            clone.branch = branch_of(&stack.git_branch);
            clone.auth = stack.git_auth.clone();
            clone.validate = true;
            self.git.clone_repository(clone).await.map(|_| ())
        }
    }
}

fn branch_of(branch: &str) -> Option<String> {
    if branch.is_empty() {
        None
    } else {
        Some(branch.to_string())
    }
}
