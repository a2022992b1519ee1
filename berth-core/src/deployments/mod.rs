//! Deployment lifecycle service.
//!
//! Owns the per-stack deployment history. Triggering a deployment links it
//! back to the last successful one, forming the rollback chain; rolling back
//! flips the two most recent records in a single store transaction so the
//! history is never observable in a half-flipped state.

use crate::error::{BerthError, Result};
use crate::stacks::StackService;
use crate::store::{Repository, Store};
use crate::types::{Deployment, DeploymentStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Request to trigger a deployment.
#[derive(Debug, Clone, Default)]
pub struct DeploymentRequest {
    pub stack_id: Uuid,
    /// Per-deployment variables; override the stack defaults key-for-key.
    pub variables: HashMap<String, String>,
}

/// Service owning deployment records and rollback.
pub struct DeploymentService {
    deployments: Repository<Deployment>,
    stacks: Arc<StackService>,
}

impl DeploymentService {
    /// Create a new deployment service.
    pub fn new(store: &Store, stacks: Arc<StackService>) -> Self {
        Self { deployments: store.repository(), stacks }
    }

    /// Trigger a deployment for a stack.
    ///
    /// The new record points at the stack's latest successful deployment (if
    /// any), carries the stack variables merged with the request overrides
    /// (request wins), and starts out `pending`.
    #[instrument(skip(self, req), fields(stack_id = %req.stack_id))]
    pub async fn trigger(&self, req: DeploymentRequest) -> Result<Deployment> {
        let stack = self.stacks.get(req.stack_id)?;

        let previous = self.latest_successful(stack.id)?;

        let mut variables = stack.variables.clone();
        variables.extend(req.variables);

        let deployment = Deployment::new(
            stack.id,
            stack.git_branch.clone(),
            variables,
            previous.as_ref().map(|p| p.id),
        );
        self.deployments.create(&deployment, &[])?;
        info!(deployment_id = %deployment.id, previous = ?deployment.previous, "deployment triggered");

        // TODO: drive the compose rollout through the orchestration client
        // once it lands; until then a triggered deployment completes
        // immediately.
        let completed = self.deployments.update(deployment.id, |current| {
            let mut next = current.clone();
            next.mark_succeeded(Utc::now());
            guard_same_stack(current, &next)?;
            Ok(next)
        })?;

        info!(deployment_id = %completed.id, "deployment completed");
        Ok(completed)
    }

    /// Roll a stack back to the deployment before its latest successful one.
    ///
    /// Flips the latest successful deployment to `rolled_back` and its
    /// `previous` back to `success` in one transaction, stamping both with
    /// the same completion instant. Fails with NotFound when the stack has no
    /// successful deployment or no `previous` to return to; nothing is
    /// mutated in that case.
    ///
    /// Returns `(rolled_back, restored)`.
    #[instrument(skip(self), fields(stack_id = %stack_id))]
    pub async fn rollback(&self, stack_id: Uuid) -> Result<(Deployment, Deployment)> {
        self.stacks.get(stack_id)?;

        let latest = self
            .latest_successful(stack_id)?
            .ok_or_else(|| BerthError::not_found("deployment", stack_id))?;
        let previous_id = latest
            .previous
            .ok_or_else(|| BerthError::not_found("previous deployment", latest.id))?;

        let now = Utc::now();
        let (rolled_back, restored) =
            self.deployments.update_pair(latest.id, previous_id, |current, previous| {
                let mut rolled_back = current.clone();
                rolled_back.mark_rolled_back(now);
                guard_same_stack(current, &rolled_back)?;

                let mut restored = previous.clone();
                restored.mark_succeeded(now);
                guard_same_stack(previous, &restored)?;

                Ok((rolled_back, restored))
            })?;

        info!(
            rolled_back = %rolled_back.id,
            restored = %restored.id,
            "stack rolled back"
        );
        Ok((rolled_back, restored))
    }

    /// Get a deployment by id.
    pub fn get(&self, id: Uuid) -> Result<Deployment> {
        self.deployments.get(id)
    }

    /// List all deployments.
    pub fn list(&self) -> Result<Vec<Deployment>> {
        self.deployments.list()
    }

    /// List a stack's deployments in creation order.
    pub fn list_by_stack(&self, stack_id: Uuid) -> Result<Vec<Deployment>> {
        self.deployments.list_by_index(&Deployment::stack_prefix(stack_id))
    }

    /// The stack's most recent deployment in `success` state, if any.
    fn latest_successful(&self, stack_id: Uuid) -> Result<Option<Deployment>> {
        self.deployments.latest_by_index(&Deployment::stack_prefix(stack_id), |d| {
            d.status == DeploymentStatus::Success
        })
    }
}

/// A deployment can never move between stacks; any mutation that tries
/// aborts the whole transaction.
fn guard_same_stack(old: &Deployment, new: &Deployment) -> Result<()> {
    if new.stack_id != old.stack_id {
        return Err(BerthError::NotAllowed {
            reason: format!(
                "deployment cannot change stack (old={} new={})",
                old.stack_id, new.stack_id
            ),
        });
    }
    Ok(())
}
