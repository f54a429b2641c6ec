//! In-memory store
//!
//! Everything lives behind one `RwLock`, taken only for the span of a single
//! store call.

use crate::change_request::{
    ChangeRequest, ChangeRequestFilter, ChangeRequestReview, ChangeRequestStatus,
};
use crate::error::StoreError;
use crate::store::{
    AppliedChange, ApplyCommit, ChangeRequestStore, FlagStore, FlagWrite, RevisionCheck,
    StoredFlag, WorkflowStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rollgate_core::RolloutConfig;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

type FlagKey = (String, String);

#[derive(Debug, Default)]
struct Inner {
    projects: BTreeSet<String>,
    flags: BTreeMap<FlagKey, StoredFlag>,
    requests: HashMap<Uuid, ChangeRequest>,
    reviews: HashMap<Uuid, Vec<ChangeRequestReview>>,
}

impl Inner {
    fn write_flag(
        &mut self,
        write: FlagWrite,
        now: DateTime<Utc>,
    ) -> Result<(Option<StoredFlag>, StoredFlag), StoreError> {
        let FlagWrite {
            project,
            key,
            config,
            check,
        } = write;
        let id = (project, key);
        let previous = self.flags.get(&id).cloned();
        check.verify(previous.as_ref())?;

        let stored = StoredFlag {
            project: id.0.clone(),
            key: id.1.clone(),
            config,
            revision: previous.as_ref().map(|f| f.revision).unwrap_or(0) + 1,
            updated_at: now,
        };
        self.flags.insert(id, stored.clone());
        Ok((previous, stored))
    }

    fn request_mut(&mut self, id: Uuid) -> Result<&mut ChangeRequest, StoreError> {
        self.requests
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("change request {}", id)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a flag directly, creating its project. Used for fixtures and
    /// imports that bypass the review flow.
    pub async fn seed_flag(
        &self,
        project: &str,
        key: &str,
        config: RolloutConfig,
    ) -> Result<StoredFlag, StoreError> {
        let mut inner = self.inner.write().await;
        inner.projects.insert(project.to_string());
        let write = FlagWrite {
            project: project.to_string(),
            key: key.to_string(),
            config,
            check: RevisionCheck::Any,
        };
        inner.write_flag(write, Utc::now()).map(|(_, stored)| stored)
    }
}

#[async_trait]
impl FlagStore for MemoryStore {
    async fn get_flag(&self, project: &str, key: &str) -> Result<Option<StoredFlag>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.flags.get(&(project.to_string(), key.to_string())).cloned())
    }

    async fn put_flag(
        &self,
        project: &str,
        key: &str,
        config: RolloutConfig,
        check: RevisionCheck,
    ) -> Result<StoredFlag, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.projects.contains(project) {
            return Err(StoreError::NotFound(format!("project {}", project)));
        }
        let write = FlagWrite {
            project: project.to_string(),
            key: key.to_string(),
            config,
            check,
        };
        inner.write_flag(write, Utc::now()).map(|(_, stored)| stored)
    }

    async fn ensure_project(&self, project: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.projects.insert(project.to_string()))
    }

    async fn list_projects(&self) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.projects.iter().cloned().collect())
    }

    async fn list_flags(&self, project: &str) -> Result<Vec<StoredFlag>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .flags
            .values()
            .filter(|f| f.project == project)
            .cloned()
            .collect())
    }

    async fn rename_flag(&self, project: &str, from: &str, to: &str) -> Result<StoredFlag, StoreError> {
        let mut inner = self.inner.write().await;
        let target = (project.to_string(), to.to_string());
        if inner.flags.contains_key(&target) {
            return Err(StoreError::Conflict(format!("flag {}/{}", project, to)));
        }
        let mut flag = inner
            .flags
            .remove(&(project.to_string(), from.to_string()))
            .ok_or_else(|| StoreError::NotFound(format!("flag {}/{}", project, from)))?;
        flag.key = to.to_string();
        flag.revision += 1;
        flag.updated_at = Utc::now();
        inner.flags.insert(target, flag.clone());
        Ok(flag)
    }
}

#[async_trait]
impl ChangeRequestStore for MemoryStore {
    async fn insert_request(&self, request: ChangeRequest) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.requests.contains_key(&request.id) {
            return Err(StoreError::Conflict(format!("change request {}", request.id)));
        }
        inner.requests.insert(request.id, request);
        Ok(())
    }

    async fn get_request(&self, id: Uuid) -> Result<Option<ChangeRequest>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.requests.get(&id).cloned())
    }

    async fn list_requests(&self, filter: &ChangeRequestFilter) -> Result<Vec<ChangeRequest>, StoreError> {
        let inner = self.inner.read().await;
        let mut requests: Vec<ChangeRequest> = inner
            .requests
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(requests)
    }

    async fn list_reviews(&self, id: Uuid) -> Result<Vec<ChangeRequestReview>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.reviews.get(&id).cloned().unwrap_or_default())
    }

    async fn count_pending(&self) -> Result<usize, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .requests
            .values()
            .filter(|r| r.status == ChangeRequestStatus::Pending)
            .count())
    }

    async fn record_review(
        &self,
        review: ChangeRequestReview,
        status: Option<ChangeRequestStatus>,
    ) -> Result<ChangeRequest, StoreError> {
        let mut inner = self.inner.write().await;
        let request = inner.request_mut(review.change_request_id)?;
        if request.status.is_terminal() {
            return Err(StoreError::StatusMismatch {
                actual: request.status,
            });
        }
        if let Some(status) = status {
            request.status = status;
        }
        request.updated_at = review.created_at;
        let updated = request.clone();

        inner
            .reviews
            .entry(review.change_request_id)
            .or_default()
            .push(review);
        Ok(updated)
    }

    async fn transition(
        &self,
        id: Uuid,
        allowed_from: &[ChangeRequestStatus],
        to: ChangeRequestStatus,
    ) -> Result<ChangeRequest, StoreError> {
        let mut inner = self.inner.write().await;
        let request = inner.request_mut(id)?;
        if !allowed_from.contains(&request.status) {
            return Err(StoreError::StatusMismatch {
                actual: request.status,
            });
        }
        request.status = to;
        request.updated_at = Utc::now();
        Ok(request.clone())
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn commit_apply(&self, id: Uuid, commit: ApplyCommit) -> Result<AppliedChange, StoreError> {
        let mut inner = self.inner.write().await;

        // Every check runs before the first mutation.
        let status = inner.request_mut(id)?.status;
        if !commit.allowed_from.contains(&status) {
            return Err(StoreError::StatusMismatch { actual: status });
        }
        if let Some(write) = &commit.flag {
            let current = inner.flags.get(&(write.project.clone(), write.key.clone()));
            write.check.verify(current)?;
        }

        let mut project_created = false;
        let mut previous = None;
        let mut flag = None;
        if let Some(write) = commit.flag {
            project_created = inner.projects.insert(write.project.clone());
            let (before, after) = inner.write_flag(write, commit.applied_at)?;
            previous = before;
            flag = Some(after);
        }

        let request = inner.request_mut(id)?;
        request.status = ChangeRequestStatus::Applied;
        request.applied_at = Some(commit.applied_at);
        request.applied_by = Some(commit.applied_by);
        request.updated_at = commit.applied_at;

        Ok(AppliedChange {
            request: request.clone(),
            flag,
            previous,
            project_created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_request::{Actor, ResourceType};
    use serde_json::json;

    fn request(status: ChangeRequestStatus) -> ChangeRequest {
        let now = Utc::now();
        ChangeRequest {
            id: Uuid::new_v4(),
            title: "Enable checkout".to_string(),
            description: None,
            resource_type: ResourceType::Flag,
            project: "web".to_string(),
            flag_key: "checkout".to_string(),
            current_config: None,
            proposed_config: json!({}),
            status,
            author: Actor::user("alice"),
            created_at: now,
            updated_at: now,
            applied_at: None,
            applied_by: None,
            base_revision: None,
        }
    }

    fn commit(check: RevisionCheck) -> ApplyCommit {
        ApplyCommit {
            allowed_from: vec![ChangeRequestStatus::Approved, ChangeRequestStatus::Pending],
            flag: Some(FlagWrite {
                project: "web".to_string(),
                key: "checkout".to_string(),
                config: RolloutConfig::boolean(true),
                check,
            }),
            applied_by: Actor::user("bob"),
            applied_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_put_requires_project() {
        let store = MemoryStore::new();
        let err = store
            .put_flag("web", "checkout", RolloutConfig::boolean(true), RevisionCheck::Any)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        assert!(store.ensure_project("web").await.unwrap());
        assert!(!store.ensure_project("web").await.unwrap());
        let flag = store
            .put_flag("web", "checkout", RolloutConfig::boolean(true), RevisionCheck::Absent)
            .await
            .unwrap();
        assert_eq!(flag.revision, 1);
        let flag = store
            .put_flag("web", "checkout", RolloutConfig::boolean(false), RevisionCheck::At(1))
            .await
            .unwrap();
        assert_eq!(flag.revision, 2);
    }

    #[tokio::test]
    async fn test_rename() {
        let store = MemoryStore::new();
        store.seed_flag("web", "old", RolloutConfig::boolean(true)).await.unwrap();
        store.seed_flag("web", "taken", RolloutConfig::boolean(false)).await.unwrap();

        let err = store.rename_flag("web", "old", "taken").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let renamed = store.rename_flag("web", "old", "new").await.unwrap();
        assert_eq!(renamed.key, "new");
        assert!(store.get_flag("web", "old").await.unwrap().is_none());
        assert_eq!(store.list_flags("web").await.unwrap().len(), 2);

        let err = store.rename_flag("web", "ghost", "other").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_transition_guard() {
        let store = MemoryStore::new();
        let cr = request(ChangeRequestStatus::Applied);
        let id = cr.id;
        store.insert_request(cr).await.unwrap();

        let err = store
            .transition(id, &[ChangeRequestStatus::Pending], ChangeRequestStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::StatusMismatch { actual: ChangeRequestStatus::Applied }
        ));
    }

    #[tokio::test]
    async fn test_commit_apply_creates_project() {
        let store = MemoryStore::new();
        let cr = request(ChangeRequestStatus::Approved);
        let id = cr.id;
        store.insert_request(cr).await.unwrap();

        let applied = store.commit_apply(id, commit(RevisionCheck::Any)).await.unwrap();
        assert!(applied.project_created);
        assert!(applied.previous.is_none());
        assert_eq!(applied.request.status, ChangeRequestStatus::Applied);
        assert_eq!(applied.request.applied_by, Some(Actor::user("bob")));
        assert_eq!(store.list_projects().await.unwrap(), vec!["web".to_string()]);
    }

    #[tokio::test]
    async fn test_commit_apply_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.seed_flag("web", "checkout", RolloutConfig::boolean(false)).await.unwrap();
        let cr = request(ChangeRequestStatus::Approved);
        let id = cr.id;
        store.insert_request(cr).await.unwrap();

        let err = store.commit_apply(id, commit(RevisionCheck::Absent)).await.unwrap_err();
        assert!(matches!(err, StoreError::RevisionMismatch { .. }));

        let request = store.get_request(id).await.unwrap().unwrap();
        assert_eq!(request.status, ChangeRequestStatus::Approved);
        let flag = store.get_flag("web", "checkout").await.unwrap().unwrap();
        assert_eq!(flag.config, RolloutConfig::boolean(false));
        assert_eq!(flag.revision, 1);
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = MemoryStore::new();
        let mut older = request(ChangeRequestStatus::Pending);
        older.created_at = older.created_at - chrono::Duration::minutes(5);
        let newer = request(ChangeRequestStatus::Rejected);
        let (older_id, newer_id) = (older.id, newer.id);
        store.insert_request(older).await.unwrap();
        store.insert_request(newer).await.unwrap();

        let all = store.list_requests(&ChangeRequestFilter::default()).await.unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![newer_id, older_id]);
        assert_eq!(store.count_pending().await.unwrap(), 1);
    }
}
