//! Deployment domain types.

use crate::store::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Status of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Deployment has not started.
    Pending,
    /// Deployment is in progress.
    Running,
    /// Deployment completed successfully.
    Success,
    /// Deployment failed.
    Failed,
    /// Deployment was cancelled.
    Cancelled,
    /// Deployment was rolled back.
    RolledBack,
}

impl DeploymentStatus {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Running => "running",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Cancelled => "cancelled",
            DeploymentStatus::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One versioned attempt to materialize a stack's git reference, with
/// outcome tracking and rollback linkage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Deployment ID (time-sortable).
    pub id: Uuid,

    /// Owning stack, immutable after creation.
    pub stack_id: Uuid,

    /// Commit SHA or tag being deployed.
    #[serde(default)]
    pub version: String,

    /// Branch, tag, or commit reference.
    #[serde(default)]
    pub git_ref: String,

    /// Commit message.
    #[serde(default)]
    pub message: String,

    /// Effective variables: stack defaults overridden by the request.
    #[serde(default)]
    pub variables: HashMap<String, String>,

    pub status: DeploymentStatus,

    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Error message if the deployment failed.
    #[serde(default)]
    pub error: String,

    /// Ordered execution log.
    #[serde(default)]
    pub logs: Vec<String>,

    /// The last deployment that was successful before this one was created.
    /// Forms the rollback chain.
    pub previous: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    /// Build a new pending deployment for a stack.
    pub fn new(
        stack_id: Uuid,
        git_ref: String,
        variables: HashMap<String, String>,
        previous: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            stack_id,
            version: String::new(),
            git_ref,
            message: String::new(),
            variables,
            status: DeploymentStatus::Pending,
            started_at: Some(now),
            completed_at: None,
            error: String::new(),
            logs: Vec::new(),
            previous,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the deployment successful at the given instant.
    pub fn mark_succeeded(&mut self, at: DateTime<Utc>) {
        self.status = DeploymentStatus::Success;
        self.completed_at = Some(at);
        self.updated_at = at;
    }

    /// Mark the deployment rolled back at the given instant.
    pub fn mark_rolled_back(&mut self, at: DateTime<Utc>) {
        self.status = DeploymentStatus::RolledBack;
        self.completed_at = Some(at);
        self.updated_at = at;
    }

    /// Index prefix for all deployments of a stack, in creation order.
    pub fn stack_prefix(stack_id: Uuid) -> String {
        format!("{}:stack:{}:", Self::PREFIX, stack_id)
    }

    /// Stack index key for this deployment. The creation timestamp is
    /// zero-padded so lexicographic order is chronological order.
    fn stack_key(&self) -> String {
        format!(
            "{}{:020}",
            Self::stack_prefix(self.stack_id),
            self.created_at.timestamp_nanos_opt().unwrap_or(0)
        )
    }
}

impl Record for Deployment {
    const PREFIX: &'static str = "deployment";

    fn id(&self) -> Uuid {
        self.id
    }

    fn index_keys(&self) -> Vec<String> {
        vec![self.stack_key()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_index_key_sorts_chronologically() {
        let stack_id = Uuid::now_v7();
        let first = Deployment::new(stack_id, "main".to_string(), HashMap::new(), None);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = Deployment::new(stack_id, "main".to_string(), HashMap::new(), None);

        let first_key = &first.index_keys()[0];
        let second_key = &second.index_keys()[0];
        assert!(first_key < second_key);
        assert!(first_key.starts_with(&Deployment::stack_prefix(stack_id)));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&DeploymentStatus::RolledBack).unwrap();
        assert_eq!(json, r#""rolled_back""#);
    }
}
