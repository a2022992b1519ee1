//! Integration tests for the stack lifecycle: create/update/delete with the
//! store and real local git repositories.

mod common;

use berth_core::git::{GitConfig, GitService};
use berth_core::{BerthError, Stack, StackChange, StackDraft, StackService, StackStatus, Store};
use common::{commit_file, default_branch, init_repo};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

fn stack_service(repositories_dir: &std::path::Path) -> StackService {
    let store = Store::in_memory().unwrap();
    let git = Arc::new(GitService::new(GitConfig { retry_attempts: 0, ..GitConfig::default() }));
    StackService::new(&store, git, repositories_dir)
}

fn draft(name: &str) -> StackDraft {
    StackDraft { name: name.to_string(), ..Default::default() }
}

#[tokio::test]
async fn test_create_without_repository() {
    let tmp = TempDir::new().unwrap();
    let service = stack_service(&tmp.path().join("repositories"));

    let stack = service.create(draft("web")).await.unwrap();
    assert_eq!(stack.status, StackStatus::Active);
    assert!(stack.last_sync.is_none());
    assert!(stack.last_deploy.is_none());
    assert!(!service.working_copy_path(stack.id).exists());

    assert_eq!(service.get(stack.id).unwrap().name, "web");
    assert_eq!(service.get_by_name("web").unwrap().id, stack.id);
}

#[tokio::test]
async fn test_duplicate_name_conflicts() {
    let tmp = TempDir::new().unwrap();
    let service = stack_service(&tmp.path().join("repositories"));

    service.create(draft("web")).await.unwrap();
    let result = service.create(draft("web")).await;
    assert!(matches!(result, Err(BerthError::Conflict { .. })));
    assert_eq!(service.list().unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_with_repository_clones_working_copy() {
    let tmp = TempDir::new().unwrap();
    let origin_path = tmp.path().join("origin");
    let origin = init_repo(&origin_path);
    commit_file(&origin, "compose.yaml", "services: {}\n", "initial commit");

    let service = stack_service(&tmp.path().join("repositories"));
    let mut draft = draft("web");
    draft.git_url = origin_path.to_str().unwrap().to_string();
    draft.git_branch = default_branch(&origin);

    let stack = service.create(draft).await.unwrap();
    assert!(stack.last_sync.is_some());
    assert!(service.working_copy_path(stack.id).join(".git").exists());
}

#[tokio::test]
async fn test_invalid_repository_fails_before_persisting() {
    let tmp = TempDir::new().unwrap();
    let service = stack_service(&tmp.path().join("repositories"));

    let mut draft = draft("web");
    draft.git_url = tmp.path().join("no-such-origin").to_str().unwrap().to_string();

    let result = service.create(draft).await;
    assert!(matches!(result, Err(BerthError::ValidationFailed { .. })));
    assert!(service.list().unwrap().is_empty());
}

#[tokio::test]
async fn test_clone_failure_deletes_created_record() {
    let tmp = TempDir::new().unwrap();
    let origin_path = tmp.path().join("origin");
    let origin = init_repo(&origin_path);
    commit_file(&origin, "a.txt", "a", "initial commit");

    // a plain file where the repositories directory should be: remote
    // validation (scratch clone) succeeds, the working-copy clone cannot
    let repositories = tmp.path().join("repositories");
    std::fs::write(&repositories, b"not a directory").unwrap();
    let service = stack_service(&repositories);

    let mut draft = draft("web");
    draft.git_url = origin_path.to_str().unwrap().to_string();

    let result = service.create(draft).await;
    assert!(matches!(result, Err(BerthError::CloneFailed { .. })));

    // compensation removed the stack record again
    assert!(service.list().unwrap().is_empty());
    assert!(matches!(service.get_by_name("web"), Err(BerthError::NotFound { .. })));
}

#[tokio::test]
async fn test_rename_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let service = stack_service(&tmp.path().join("repositories"));

    let stack = service.create(draft("web")).await.unwrap();

    let change = StackChange { name: Some("frontend".to_string()), ..Default::default() };
    let result = service.update(stack.id, change).await;
    assert!(matches!(result, Err(BerthError::NotAllowed { .. })));
    assert_eq!(service.get(stack.id).unwrap().name, "web");

    // restating the current name is not a rename
    let change = StackChange {
        name: Some("web".to_string()),
        description: Some("storefront".to_string()),
        ..Default::default()
    };
    let updated = service.update(stack.id, change).await.unwrap();
    assert_eq!(updated.description, "storefront");
}

#[tokio::test]
async fn test_update_git_fields_resyncs_working_copy() {
    let tmp = TempDir::new().unwrap();
    let origin_path = tmp.path().join("origin");
    let origin = init_repo(&origin_path);
    commit_file(&origin, "a.txt", "one", "initial commit");
    let branch = default_branch(&origin);

    let service = stack_service(&tmp.path().join("repositories"));
    let mut draft = draft("web");
    draft.git_url = origin_path.to_str().unwrap().to_string();
    draft.git_branch = branch.clone();
    let stack = service.create(draft).await.unwrap();
    let first_sync = stack.last_sync.unwrap();

    let head = commit_file(&origin, "a.txt", "two", "second commit");

    let change = StackChange { git_branch: Some(branch), ..Default::default() };
    let updated = service.update(stack.id, change).await.unwrap();

    assert!(updated.last_sync.unwrap() >= first_sync);
    let copy = service.working_copy_path(stack.id);
    let synced = git2::Repository::open(&copy).unwrap();
    assert_eq!(synced.head().unwrap().target().unwrap(), head);
}

#[tokio::test]
async fn test_update_without_git_fields_skips_sync() {
    let tmp = TempDir::new().unwrap();
    let service = stack_service(&tmp.path().join("repositories"));

    let stack = service.create(draft("web")).await.unwrap();
    let change = StackChange {
        variables: Some(HashMap::from([("TAG".to_string(), "v1".to_string())])),
        ..Default::default()
    };
    let updated = service.update(stack.id, change).await.unwrap();
    assert_eq!(updated.variables.get("TAG").map(String::as_str), Some("v1"));
    assert!(updated.last_sync.is_none());
}

#[tokio::test]
async fn test_sync_failure_parks_stack_in_error_and_recovery_restores_active() {
    let tmp = TempDir::new().unwrap();
    let origin_path = tmp.path().join("origin");
    let origin = init_repo(&origin_path);
    commit_file(&origin, "a.txt", "one", "initial commit");
    let branch = default_branch(&origin);

    let service = stack_service(&tmp.path().join("repositories"));
    let mut first = draft("web");
    first.git_url = origin_path.to_str().unwrap().to_string();
    first.git_branch = branch.clone();
    let stack = service.create(first).await.unwrap();

    // the origin vanishes; the next sync cannot fetch
    std::fs::remove_dir_all(&origin_path).unwrap();
    let change = StackChange { git_branch: Some(branch.clone()), ..Default::default() };
    let result = service.update(stack.id, change).await;
    assert!(matches!(result, Err(BerthError::PullFailed { .. })));
    assert_eq!(service.get(stack.id).unwrap().status, StackStatus::Error);

    // point the stack at a fresh origin; with the stale working copy gone
    // the sync clones anew and the stack recovers
    let origin2_path = tmp.path().join("origin2");
    let origin2 = init_repo(&origin2_path);
    commit_file(&origin2, "a.txt", "fresh", "initial commit");
    std::fs::remove_dir_all(service.working_copy_path(stack.id)).unwrap();

    let change = StackChange {
        git_url: Some(origin2_path.to_str().unwrap().to_string()),
        git_branch: Some(default_branch(&origin2)),
        ..Default::default()
    };
    let recovered = service.update(stack.id, change).await.unwrap();
    assert_eq!(recovered.status, StackStatus::Active);
    assert!(recovered.last_sync.is_some());
}

#[tokio::test]
async fn test_delete_removes_working_copy_and_record() {
    let tmp = TempDir::new().unwrap();
    let origin_path = tmp.path().join("origin");
    let origin = init_repo(&origin_path);
    commit_file(&origin, "a.txt", "a", "initial commit");

    let service = stack_service(&tmp.path().join("repositories"));
    let mut draft = draft("web");
    draft.git_url = origin_path.to_str().unwrap().to_string();
    let stack = service.create(draft).await.unwrap();
    let copy = service.working_copy_path(stack.id);
    assert!(copy.exists());

    service.delete(stack.id).await.unwrap();
    assert!(!copy.exists());
    assert!(matches!(service.get(stack.id), Err(BerthError::NotFound { .. })));

    let result = service.delete(stack.id).await;
    assert!(matches!(result, Err(BerthError::NotFound { .. })));
}

#[tokio::test]
async fn test_list_by_status_and_label() {
    let tmp = TempDir::new().unwrap();
    let service = stack_service(&tmp.path().join("repositories"));

    let mut web = draft("web");
    web.labels.insert("team".to_string(), "infra".to_string());
    let web = service.create(web).await.unwrap();
    service.create(draft("api")).await.unwrap();

    let active = service.list_by_status(StackStatus::Active).unwrap();
    assert_eq!(active.len(), 2);
    assert!(service.list_by_status(StackStatus::Error).unwrap().is_empty());

    let labeled = service.list_by_label("team", "infra").unwrap();
    assert_eq!(labeled.iter().map(|s: &Stack| s.id).collect::<Vec<_>>(), vec![web.id]);
}
