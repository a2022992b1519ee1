//! Shared helpers for integration tests: building real local git
//! repositories to clone from and pull against.

use git2::{Commit, Oid, Repository, Signature};
use std::path::Path;

/// Initialize a repository with committer identity configured.
pub fn init_repo(path: &Path) -> Repository {
    std::fs::create_dir_all(path).unwrap();
    let repo = Repository::init(path).unwrap();
    {
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "Test Author").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();
    }
    repo
}

/// Write a file into the worktree and commit it on HEAD.
pub fn commit_file(repo: &Repository, name: &str, content: &str, message: &str) -> Oid {
    let workdir = repo.workdir().unwrap();
    std::fs::write(workdir.join(name), content).unwrap();

    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();

    let signature = Signature::now("Test Author", "test@example.com").unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents).unwrap()
}

/// Shorthand name of the repository's HEAD branch.
pub fn default_branch(repo: &Repository) -> String {
    repo.head().unwrap().shorthand().unwrap().to_string()
}
