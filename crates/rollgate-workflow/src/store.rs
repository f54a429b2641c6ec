//! Storage seams for flags and change requests.
//!
//! Backends implement [`FlagStore`] and [`ChangeRequestStore`], plus
//! [`WorkflowStore::commit_apply`], which must write the flag and mark the
//! request applied as one unit.

use crate::change_request::{
    Actor, ChangeRequest, ChangeRequestFilter, ChangeRequestReview, ChangeRequestStatus,
};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rollgate_core::RolloutConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The live config bound to `{project, key}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFlag {
    pub project: String,
    pub key: String,
    pub config: RolloutConfig,
    /// Starts at 1 and grows by one on every write.
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

/// What a flag write expects to find before it replaces the entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RevisionCheck {
    /// Overwrite whatever is there.
    #[default]
    Any,
    /// The flag must not exist yet.
    Absent,
    /// The flag must still be at this revision.
    At(u64),
}

impl RevisionCheck {
    pub fn from_base(base: Option<u64>) -> Self {
        match base {
            Some(revision) => RevisionCheck::At(revision),
            None => RevisionCheck::Absent,
        }
    }

    pub fn verify(&self, current: Option<&StoredFlag>) -> Result<(), StoreError> {
        let actual = current.map(|f| f.revision).unwrap_or(0);
        match *self {
            RevisionCheck::Any => Ok(()),
            RevisionCheck::Absent if actual == 0 => Ok(()),
            RevisionCheck::Absent => Err(StoreError::RevisionMismatch { expected: 0, actual }),
            RevisionCheck::At(expected) if expected == actual => Ok(()),
            RevisionCheck::At(expected) => Err(StoreError::RevisionMismatch { expected, actual }),
        }
    }
}

#[async_trait]
pub trait FlagStore: Send + Sync {
    async fn get_flag(&self, project: &str, key: &str) -> Result<Option<StoredFlag>, StoreError>;

    /// Replace the whole config. Fails with `NotFound` if the project does
    /// not exist.
    async fn put_flag(
        &self,
        project: &str,
        key: &str,
        config: RolloutConfig,
        check: RevisionCheck,
    ) -> Result<StoredFlag, StoreError>;

    /// Create the project if missing. Returns `true` when it was created.
    async fn ensure_project(&self, project: &str) -> Result<bool, StoreError>;

    async fn list_projects(&self) -> Result<Vec<String>, StoreError>;

    /// Flags of one project, ordered by key.
    async fn list_flags(&self, project: &str) -> Result<Vec<StoredFlag>, StoreError>;

    /// Move a flag to a new key. `Conflict` if `to` already exists.
    async fn rename_flag(&self, project: &str, from: &str, to: &str) -> Result<StoredFlag, StoreError>;
}

#[async_trait]
pub trait ChangeRequestStore: Send + Sync {
    async fn insert_request(&self, request: ChangeRequest) -> Result<(), StoreError>;

    async fn get_request(&self, id: Uuid) -> Result<Option<ChangeRequest>, StoreError>;

    /// Newest first.
    async fn list_requests(&self, filter: &ChangeRequestFilter) -> Result<Vec<ChangeRequest>, StoreError>;

    /// Reviews of one request, oldest first.
    async fn list_reviews(&self, id: Uuid) -> Result<Vec<ChangeRequestReview>, StoreError>;

    async fn count_pending(&self) -> Result<usize, StoreError>;

    /// Append a review and, if `status` is set, move the request to it.
    /// Refused with `StatusMismatch` once the request is applied or
    /// cancelled; otherwise the latest write wins.
    async fn record_review(
        &self,
        review: ChangeRequestReview,
        status: Option<ChangeRequestStatus>,
    ) -> Result<ChangeRequest, StoreError>;

    /// Move a request to `to` if its status is one of `allowed_from`.
    async fn transition(
        &self,
        id: Uuid,
        allowed_from: &[ChangeRequestStatus],
        to: ChangeRequestStatus,
    ) -> Result<ChangeRequest, StoreError>;
}

/// A flag write carried by an apply.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagWrite {
    pub project: String,
    pub key: String,
    pub config: RolloutConfig,
    pub check: RevisionCheck,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyCommit {
    pub allowed_from: Vec<ChangeRequestStatus>,
    /// `None` for resources that are tracked but not written.
    pub flag: Option<FlagWrite>,
    pub applied_by: Actor,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedChange {
    pub request: ChangeRequest,
    pub flag: Option<StoredFlag>,
    /// The entry the write replaced.
    pub previous: Option<StoredFlag>,
    pub project_created: bool,
}

#[async_trait]
pub trait WorkflowStore: FlagStore + ChangeRequestStore {
    /// Create the project if needed, write the flag and mark the request
    /// applied. Either everything is visible afterwards or nothing is.
    async fn commit_apply(&self, id: Uuid, commit: ApplyCommit) -> Result<AppliedChange, StoreError>;
}
