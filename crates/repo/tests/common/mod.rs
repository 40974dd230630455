use std::sync::Arc;
use strata_index::{MembershipIndex, SqliteIndex};
use strata_repo::FsContainerRepository;
use tempfile::TempDir;

/// Build a repository over a temp directory and an in-memory index.
pub async fn new_repo() -> (TempDir, FsContainerRepository) {
    let temp = tempfile::tempdir().expect("tempdir");
    let index: Arc<dyn MembershipIndex> =
        Arc::new(SqliteIndex::in_memory().await.expect("in-memory index"));
    let repo = FsContainerRepository::new(temp.path().join("containers"), index)
        .await
        .expect("repository");
    (temp, repo)
}
