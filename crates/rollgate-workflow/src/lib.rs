//! Rollgate Workflow: change requests, flag storage and audit
//!
//! Proposed rollout configs travel through a review workflow before they
//! reach the live [`FlagStore`].
//!
//! # Architecture
//!
//! ```text
//! create ──► pending ──review──► approved / rejected
//!               │                    │
//!               └──────apply─────────┘──► validate ──► commit_apply ──► applied
//!                                                         │
//!                                              audit event + relay refresh
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rollgate_core::RolloutConfig;
//! use rollgate_workflow::{
//!     Actor, AuditLog, ChangeRequestStatus, ChangeRequestWorkflow, MemoryStore,
//!     NewChangeRequest, ReviewDecision,
//! };
//!
//! # tokio_test_block(async {
//! let store = Arc::new(MemoryStore::new());
//! let audit = Arc::new(AuditLog::new());
//! let workflow = ChangeRequestWorkflow::new(store).with_audit(audit.clone());
//!
//! let proposal = RolloutConfig::boolean(true).to_document().unwrap();
//! let request = workflow
//!     .create(
//!         NewChangeRequest::new("Enable checkout", "web", "new-checkout", proposal),
//!         Actor::user("alice"),
//!     )
//!     .await
//!     .unwrap();
//!
//! workflow
//!     .review(request.id, ReviewDecision::Approved, Actor::user("bob"), None)
//!     .await
//!     .unwrap();
//! let applied = workflow.apply(request.id, Actor::user("bob")).await.unwrap();
//!
//! assert_eq!(applied.request.status, ChangeRequestStatus::Applied);
//! assert_eq!(audit.len(), 3);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f);
//! # }
//! ```

pub mod audit;
pub mod change_request;
pub mod diff;
pub mod error;
pub mod memory;
pub mod refresh;
pub mod store;
pub mod workflow;

pub use audit::{
    AuditAction, AuditError, AuditEvent, AuditLog, AuditSink, AuditStats, NoopAuditSink,
    CHANGE_REQUEST_RESOURCE,
};
pub use change_request::{
    Actor, ActorKind, ChangeRequest, ChangeRequestDetail, ChangeRequestFilter, ChangeRequestReview,
    ChangeRequestStatus, NewChangeRequest, ResourceType, ReviewDecision,
};
pub use diff::FieldChange;
pub use error::{StoreError, WorkflowError, WorkflowResult};
pub use memory::MemoryStore;
pub use refresh::{NoopRefresh, RefreshError, RefreshSignal, RefreshTarget};
pub use store::{
    AppliedChange, ApplyCommit, ChangeRequestStore, FlagStore, FlagWrite, RevisionCheck,
    StoredFlag, WorkflowStore,
};
pub use workflow::{ChangeRequestWorkflow, ReviewOutcome, StaleApply, WorkflowSettings};
