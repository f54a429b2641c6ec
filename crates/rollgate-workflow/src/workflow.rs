//! Change request workflow
//!
//! Drives a request from proposal through review to apply or cancel. Every
//! committed transition is logged with `tracing` and produces exactly one
//! audit event; applying a flag change also signals the relay.

use crate::audit::{AuditAction, AuditEvent, AuditSink, NoopAuditSink};
use crate::change_request::{
    Actor, ChangeRequest, ChangeRequestDetail, ChangeRequestFilter, ChangeRequestReview,
    ChangeRequestStatus, NewChangeRequest, ResourceType, ReviewDecision,
};
use crate::diff;
use crate::error::{StoreError, WorkflowError, WorkflowResult};
use crate::refresh::{NoopRefresh, RefreshSignal, RefreshTarget};
use crate::store::{AppliedChange, ApplyCommit, FlagWrite, RevisionCheck, StoredFlag, WorkflowStore};
use chrono::Utc;
use rollgate_core::{validate_document, validate_flag_key, validate_project_name};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const NOT_PENDING: &str = "change request is not pending";
const NOT_APPLICABLE: &str = "change request must be approved or pending to apply";

/// What apply does when the flag moved since the request was opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StaleApply {
    /// Overwrite and log a warning.
    #[default]
    LastWriteWins,
    /// Refuse with `Conflict`.
    RejectStale,
}

impl fmt::Display for StaleApply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleApply::LastWriteWins => f.write_str("last-write-wins"),
            StaleApply::RejectStale => f.write_str("reject-stale"),
        }
    }
}

impl FromStr for StaleApply {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last-write-wins" => Ok(StaleApply::LastWriteWins),
            "reject-stale" => Ok(StaleApply::RejectStale),
            other => Err(format!(
                "unknown stale apply policy '{}', expected last-write-wins or reject-stale",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub stale_apply: StaleApply,
}

/// Result of a review: the request after the review and the review itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub request: ChangeRequest,
    pub review: ChangeRequestReview,
}

pub struct ChangeRequestWorkflow<S> {
    store: Arc<S>,
    audit: Arc<dyn AuditSink>,
    refresh: Arc<dyn RefreshSignal>,
    settings: WorkflowSettings,
}

impl<S> Clone for ChangeRequestWorkflow<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            audit: Arc::clone(&self.audit),
            refresh: Arc::clone(&self.refresh),
            settings: self.settings.clone(),
        }
    }
}

impl<S: WorkflowStore + 'static> ChangeRequestWorkflow<S> {
    /// A workflow with no audit sink and no relay.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            audit: Arc::new(NoopAuditSink),
            refresh: Arc::new(NoopRefresh),
            settings: WorkflowSettings::default(),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_refresh(mut self, refresh: Arc<dyn RefreshSignal>) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_settings(mut self, settings: WorkflowSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    /// Open a request in `pending`, snapshotting the live config.
    pub async fn create(&self, input: NewChangeRequest, author: Actor) -> WorkflowResult<ChangeRequest> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(WorkflowError::InvalidRequest("title is required".to_string()));
        }
        validate_project_name(&input.project)
            .map_err(|e| WorkflowError::InvalidRequest(e.to_string()))?;
        if input.resource_type == ResourceType::Flag {
            validate_flag_key(&input.flag_key)
                .map_err(|e| WorkflowError::InvalidRequest(e.to_string()))?;
        }

        let current = match input.resource_type {
            ResourceType::Flag => self
                .store
                .get_flag(&input.project, &input.flag_key)
                .await
                .map_err(|e| WorkflowError::store("loading current flag", e))?,
            _ => None,
        };
        let current_config = current
            .as_ref()
            .map(|flag| flag.config.to_document())
            .transpose()
            .map_err(|e| {
                WorkflowError::store("snapshotting current flag", StoreError::Backend(Box::new(e)))
            })?;

        let now = Utc::now();
        let request = ChangeRequest {
            id: Uuid::new_v4(),
            title,
            description: input.description.filter(|d| !d.trim().is_empty()),
            resource_type: input.resource_type,
            project: input.project,
            flag_key: input.flag_key,
            current_config,
            proposed_config: input.proposed_config,
            status: ChangeRequestStatus::Pending,
            author: author.clone(),
            created_at: now,
            updated_at: now,
            applied_at: None,
            applied_by: None,
            base_revision: current.map(|flag| flag.revision),
        };

        self.store
            .insert_request(request.clone())
            .await
            .map_err(|e| WorkflowError::store("saving change request", e))?;

        info!(
            change_request = %request.id,
            project = %request.project,
            flag_key = %request.flag_key,
            author = %author.id,
            "change request created"
        );
        self.emit(
            AuditEvent::for_request(AuditAction::Created, &author, &request).with_metadata(json!({
                "baseRevision": request.base_revision,
            })),
        )
        .await;

        Ok(request)
    }

    /// Record a review. Only a `pending` request can be reviewed.
    pub async fn review(
        &self,
        id: Uuid,
        decision: ReviewDecision,
        reviewer: Actor,
        comment: Option<String>,
    ) -> WorkflowResult<ReviewOutcome> {
        let request = self.load(id).await?;
        if !request.status.can_review() {
            return Err(WorkflowError::invalid_state(request.status, NOT_PENDING));
        }

        let review = ChangeRequestReview {
            id: Uuid::new_v4(),
            change_request_id: id,
            reviewer: reviewer.clone(),
            decision,
            comment: comment.filter(|c| !c.trim().is_empty()),
            created_at: Utc::now(),
        };
        let updated = self
            .store
            .record_review(review.clone(), decision.resulting_status())
            .await
            .map_err(|e| store_failure(id, "recording review", e, |_| NOT_PENDING.to_string()))?;

        info!(
            change_request = %id,
            decision = %decision,
            reviewer = %reviewer.id,
            status = %updated.status,
            "change request reviewed"
        );
        let mut event = AuditEvent::for_request(AuditAction::Reviewed, &reviewer, &updated)
            .with_changes(json!({ "decision": decision }));
        if let Some(comment) = &review.comment {
            event = event.with_metadata(json!({ "comment": comment }));
        }
        self.emit(event).await;

        Ok(ReviewOutcome {
            request: updated,
            review,
        })
    }

    /// Validate the proposal, then write it and mark the request applied in
    /// one store commit.
    pub async fn apply(&self, id: Uuid, actor: Actor) -> WorkflowResult<AppliedChange> {
        let request = self.load(id).await?;
        if !request.status.can_apply() {
            return Err(WorkflowError::invalid_state(request.status, NOT_APPLICABLE));
        }

        let flag = match request.resource_type {
            ResourceType::Flag => {
                let config = validate_document(&request.proposed_config)?;
                debug!(change_request = %id, "proposed config validated");
                let check = match self.settings.stale_apply {
                    StaleApply::LastWriteWins => RevisionCheck::Any,
                    StaleApply::RejectStale => RevisionCheck::from_base(request.base_revision),
                };
                Some(FlagWrite {
                    project: request.project.clone(),
                    key: request.flag_key.clone(),
                    config,
                    check,
                })
            }
            _ => None,
        };

        let commit = ApplyCommit {
            allowed_from: vec![ChangeRequestStatus::Approved, ChangeRequestStatus::Pending],
            flag,
            applied_by: actor.clone(),
            applied_at: Utc::now(),
        };
        let applied = self
            .store
            .commit_apply(id, commit)
            .await
            .map_err(|e| store_failure(id, "applying change request", e, |_| NOT_APPLICABLE.to_string()))?;

        let previous_revision = applied.previous.as_ref().map(|f| f.revision);
        if applied.flag.is_some() && previous_revision != request.base_revision {
            warn!(
                change_request = %id,
                project = %request.project,
                flag_key = %request.flag_key,
                base_revision = ?request.base_revision,
                overwritten_revision = ?previous_revision,
                "applied over a flag that changed since the request was opened"
            );
        }
        if applied.project_created {
            info!(project = %request.project, "project created");
        }
        info!(
            change_request = %id,
            actor = %actor.id,
            revision = ?applied.flag.as_ref().map(|f| f.revision),
            "change request applied"
        );

        self.emit(apply_event(&actor, &applied)).await;

        if applied.flag.is_some() {
            self.signal_refresh(RefreshTarget {
                project: request.project,
                flag_key: request.flag_key,
            });
        }

        Ok(applied)
    }

    /// Cancel a request that is neither applied nor already cancelled.
    pub async fn cancel(&self, id: Uuid, actor: Actor) -> WorkflowResult<ChangeRequest> {
        let request = self.load(id).await?;
        if !request.status.can_cancel() {
            return Err(WorkflowError::invalid_state(
                request.status,
                cannot_cancel(request.status),
            ));
        }

        let updated = self
            .store
            .transition(
                id,
                &[
                    ChangeRequestStatus::Pending,
                    ChangeRequestStatus::Approved,
                    ChangeRequestStatus::Rejected,
                ],
                ChangeRequestStatus::Cancelled,
            )
            .await
            .map_err(|e| store_failure(id, "cancelling change request", e, cannot_cancel))?;

        info!(change_request = %id, actor = %actor.id, from = %request.status, "change request cancelled");
        self.emit(
            AuditEvent::for_request(AuditAction::Cancelled, &actor, &updated)
                .with_changes(json!({ "status": { "before": request.status, "after": updated.status } })),
        )
        .await;

        Ok(updated)
    }

    /// A request with its reviews, oldest review first.
    pub async fn get(&self, id: Uuid) -> WorkflowResult<ChangeRequestDetail> {
        let request = self.load(id).await?;
        let reviews = self
            .store
            .list_reviews(id)
            .await
            .map_err(|e| WorkflowError::store("loading reviews", e))?;
        Ok(ChangeRequestDetail { request, reviews })
    }

    pub async fn list(&self, filter: &ChangeRequestFilter) -> WorkflowResult<Vec<ChangeRequest>> {
        self.store
            .list_requests(filter)
            .await
            .map_err(|e| WorkflowError::store("listing change requests", e))
    }

    pub async fn count_pending(&self) -> WorkflowResult<usize> {
        self.store
            .count_pending()
            .await
            .map_err(|e| WorkflowError::store("counting pending change requests", e))
    }

    /// The live flag, if any.
    pub async fn flag(&self, project: &str, key: &str) -> WorkflowResult<Option<StoredFlag>> {
        self.store
            .get_flag(project, key)
            .await
            .map_err(|e| WorkflowError::store("loading flag", e))
    }

    async fn load(&self, id: Uuid) -> WorkflowResult<ChangeRequest> {
        self.store
            .get_request(id)
            .await
            .map_err(|e| WorkflowError::store("loading change request", e))?
            .ok_or(WorkflowError::NotFound(id))
    }

    async fn emit(&self, event: AuditEvent) {
        let action = event.action;
        let resource_id = event.resource_id.clone();
        if let Err(e) = self.audit.record(event).await {
            warn!(%action, %resource_id, error = %e, "audit event dropped");
        }
    }

    fn signal_refresh(&self, target: RefreshTarget) {
        let refresh = Arc::clone(&self.refresh);
        tokio::spawn(async move {
            let project = target.project.clone();
            let flag_key = target.flag_key.clone();
            match refresh.refresh(target).await {
                Ok(()) => debug!(%project, %flag_key, "relay refresh sent"),
                Err(e) => warn!(%project, %flag_key, error = %e, "relay refresh failed"),
            }
        });
    }
}

fn cannot_cancel(status: ChangeRequestStatus) -> String {
    format!("cannot cancel a change request that is already {}", status)
}

fn store_failure(
    id: Uuid,
    context: &str,
    err: StoreError,
    reason: impl Fn(ChangeRequestStatus) -> String,
) -> WorkflowError {
    match err {
        StoreError::NotFound(_) => WorkflowError::NotFound(id),
        StoreError::StatusMismatch { actual } => WorkflowError::invalid_state(actual, reason(actual)),
        StoreError::RevisionMismatch { expected, actual } => WorkflowError::Conflict(format!(
            "flag changed since the request was opened (expected revision {}, found {})",
            expected, actual
        )),
        StoreError::Conflict(what) => WorkflowError::Conflict(format!("{} already exists", what)),
        other => WorkflowError::store(context, other),
    }
}

fn apply_event(actor: &Actor, applied: &AppliedChange) -> AuditEvent {
    let event = AuditEvent::for_request(AuditAction::Applied, actor, &applied.request);
    let flag = match &applied.flag {
        Some(flag) => flag,
        None => return event,
    };
    let before = applied
        .previous
        .as_ref()
        .and_then(|f| f.config.to_document().ok());
    let after = flag.config.to_document().ok();
    event
        .with_changes(diff::to_changes(before.as_ref(), after.as_ref()))
        .with_metadata(json!({
            "flagKey": flag.key,
            "revision": flag.revision,
            "previousRevision": applied.previous.as_ref().map(|f| f.revision),
            "projectCreated": applied.project_created,
        }))
}
