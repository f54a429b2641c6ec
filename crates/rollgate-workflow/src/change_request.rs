//! Change requests, reviews and the actors behind them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle of a change request.
///
/// ```text
/// pending ──► approved ──► applied
///    │  └───► rejected
///    ├──────────────────► applied
///    └──► cancelled ◄── approved | rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeRequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Applied,
}

impl ChangeRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeRequestStatus::Pending => "pending",
            ChangeRequestStatus::Approved => "approved",
            ChangeRequestStatus::Rejected => "rejected",
            ChangeRequestStatus::Cancelled => "cancelled",
            ChangeRequestStatus::Applied => "applied",
        }
    }

    pub fn can_review(&self) -> bool {
        matches!(self, ChangeRequestStatus::Pending)
    }

    /// Apply is reachable from `approved` and straight from `pending`.
    pub fn can_apply(&self) -> bool {
        matches!(self, ChangeRequestStatus::Approved | ChangeRequestStatus::Pending)
    }

    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ChangeRequestStatus::Applied | ChangeRequestStatus::Cancelled)
    }
}

impl fmt::Display for ChangeRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeRequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ChangeRequestStatus::Pending),
            "approved" => Ok(ChangeRequestStatus::Approved),
            "rejected" => Ok(ChangeRequestStatus::Rejected),
            "cancelled" => Ok(ChangeRequestStatus::Cancelled),
            "applied" => Ok(ChangeRequestStatus::Applied),
            other => Err(format!("unknown change request status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approved,
    Rejected,
    /// Leaves the status untouched.
    Commented,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewDecision::Approved => "approved",
            ReviewDecision::Rejected => "rejected",
            ReviewDecision::Commented => "commented",
        }
    }

    /// The status a request moves to after this review, if any.
    pub fn resulting_status(&self) -> Option<ChangeRequestStatus> {
        match self {
            ReviewDecision::Approved => Some(ChangeRequestStatus::Approved),
            ReviewDecision::Rejected => Some(ChangeRequestStatus::Rejected),
            ReviewDecision::Commented => None,
        }
    }
}

impl fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(ReviewDecision::Approved),
            "rejected" => Ok(ReviewDecision::Rejected),
            "commented" => Ok(ReviewDecision::Commented),
            _ => Err("decision must be approved, rejected, or commented".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    User,
    ApiKey,
    System,
}

/// Who performed an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: ActorKind,
}

impl Actor {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            name: None,
            kind: ActorKind::User,
        }
    }

    pub fn api_key(id: impl Into<String>) -> Self {
        Self {
            kind: ActorKind::ApiKey,
            ..Self::user(id)
        }
    }

    pub fn system() -> Self {
        Self {
            kind: ActorKind::System,
            ..Self::user("system")
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Best human-readable label: name, then email, then id.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    #[default]
    Flag,
    Segment,
    Flagset,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Flag => "flag",
            ResourceType::Segment => "segment",
            ResourceType::Flagset => "flagset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRequest {
    pub id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub resource_type: ResourceType,
    pub project: String,
    pub flag_key: String,
    /// Snapshot of the live config when the request was opened.
    pub current_config: Option<Value>,
    pub proposed_config: Value,
    pub status: ChangeRequestStatus,
    pub author: Actor,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_by: Option<Actor>,
    /// Store revision of the flag the proposal was made against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_revision: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRequestReview {
    pub id: Uuid,
    pub change_request_id: Uuid,
    pub reviewer: Actor,
    pub decision: ReviewDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for opening a change request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChangeRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub resource_type: ResourceType,
    pub project: String,
    pub flag_key: String,
    pub proposed_config: Value,
}

impl NewChangeRequest {
    pub fn new(
        title: impl Into<String>,
        project: impl Into<String>,
        flag_key: impl Into<String>,
        proposed_config: Value,
    ) -> Self {
        Self {
            title: title.into(),
            description: None,
            resource_type: ResourceType::Flag,
            project: project.into(),
            flag_key: flag_key.into(),
            proposed_config,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn for_resource(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = resource_type;
        self
    }
}

/// Listing filter. `search` matches title, flag key and project,
/// ignoring case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequestFilter {
    #[serde(default)]
    pub status: Option<ChangeRequestStatus>,
    #[serde(default)]
    pub search: Option<String>,
}

impl ChangeRequestFilter {
    pub fn status(status: ChangeRequestStatus) -> Self {
        Self {
            status: Some(status),
            search: None,
        }
    }

    pub fn matches(&self, request: &ChangeRequest) -> bool {
        if let Some(status) = self.status {
            if request.status != status {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                [&request.title, &request.flag_key, &request.project]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&term))
            }
            _ => true,
        }
    }
}

/// A change request together with its reviews, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRequestDetail {
    #[serde(flatten)]
    pub request: ChangeRequest,
    pub reviews: Vec<ChangeRequestReview>,
}
