//! Audit trail generation
//!
//! Every change request transition produces one [`AuditEvent`], handed to an
//! [`AuditSink`]. Sink failures never roll back a transition.

use crate::change_request::{Actor, ChangeRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "change_request.created")]
    Created,
    #[serde(rename = "change_request.reviewed")]
    Reviewed,
    #[serde(rename = "change_request.applied")]
    Applied,
    #[serde(rename = "change_request.cancelled")]
    Cancelled,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "change_request.created",
            AuditAction::Reviewed => "change_request.reviewed",
            AuditAction::Applied => "change_request.applied",
            AuditAction::Cancelled => "change_request.cancelled",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `resourceType` of every event: the audited resource is the change
/// request, the flag it targets goes in `metadata`.
pub const CHANGE_REQUEST_RESOURCE: &str = "change_request";

/// An audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor: Actor,
    pub action: AuditAction,
    pub resource_type: String,

    /// Change request ID
    pub resource_id: String,

    /// Change request title
    pub resource_name: String,

    pub project: String,

    /// Before/after data, shape depends on the action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl AuditEvent {
    /// Create an event describing `action` on a change request
    pub fn for_request(action: AuditAction, actor: &Actor, request: &ChangeRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor: actor.clone(),
            action,
            resource_type: CHANGE_REQUEST_RESOURCE.to_string(),
            resource_id: request.id.to_string(),
            resource_name: request.title.clone(),
            project: request.project.clone(),
            changes: None,
            metadata: Some(json!({
                "targetType": request.resource_type,
                "flagKey": request.flag_key,
            })),
        }
    }

    pub fn with_changes(mut self, changes: Value) -> Self {
        self.changes = Some(changes);
        self
    }

    /// Merge object keys into the metadata; anything else replaces it.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        if let (Some(Value::Object(current)), Value::Object(extra)) = (&mut self.metadata, &metadata) {
            current.extend(extra.clone());
            return self;
        }
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Error, Debug)]
#[error("audit sink unavailable: {0}")]
pub struct AuditError(pub String);

/// Destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn record(&self, _event: AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Bounded in-memory audit log collector
pub struct AuditLog {
    entries: Mutex<Vec<AuditEvent>>,
    max_entries: usize,
}

impl AuditLog {
    /// Create a new audit log
    pub fn new() -> Self {
        Self::with_max_entries(10000)
    }

    /// Create with a custom max size
    pub fn with_max_entries(max: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            max_entries: max,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<AuditEvent>>, AuditError> {
        self.entries
            .lock()
            .map_err(|_| AuditError("audit log lock poisoned".to_string()))
    }

    /// Log an entry
    pub fn log(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut entries = self.lock()?;
        entries.push(event);

        // Trim if over limit
        if entries.len() > self.max_entries {
            let drain_count = entries.len() - self.max_entries;
            entries.drain(0..drain_count);
        }
        Ok(())
    }

    /// Snapshot of all entries, oldest first
    pub fn entries(&self) -> Vec<AuditEvent> {
        self.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// The most recent `limit` entries, newest first
    pub fn recent(&self, limit: usize) -> Vec<AuditEvent> {
        self.lock()
            .map(|e| e.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Get entries since a timestamp
    pub fn entries_since(&self, timestamp: DateTime<Utc>) -> Vec<AuditEvent> {
        self.filtered(|e| e.timestamp >= timestamp)
    }

    /// Get entries for one change request
    pub fn entries_for_resource(&self, resource_id: &str) -> Vec<AuditEvent> {
        self.filtered(|e| e.resource_id == resource_id)
    }

    /// Get entries for a specific action
    pub fn entries_for_action(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.filtered(|e| e.action == action)
    }

    fn filtered(&self, keep: impl Fn(&AuditEvent) -> bool) -> Vec<AuditEvent> {
        self.lock()
            .map(|e| e.iter().filter(|ev| keep(ev)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all entries
    pub fn clear(&self) {
        if let Ok(mut entries) = self.lock() {
            entries.clear();
        }
    }

    /// Export to JSON Lines
    pub fn to_jsonl(&self) -> String {
        self.entries()
            .iter()
            .filter_map(|e| serde_json::to_string(e).ok())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Get statistics
    pub fn stats(&self) -> AuditStats {
        let entries = self.entries();
        let mut by_action: HashMap<String, usize> = HashMap::new();
        for entry in &entries {
            *by_action.entry(entry.action.to_string()).or_default() += 1;
        }
        let count = |action: AuditAction| by_action.get(action.as_str()).copied().unwrap_or(0);

        let created = count(AuditAction::Created);
        let applied = count(AuditAction::Applied);
        let cancelled = count(AuditAction::Cancelled);

        AuditStats {
            total: entries.len(),
            created,
            reviewed: count(AuditAction::Reviewed),
            applied,
            cancelled,
            apply_rate: if created > 0 { applied as f64 / created as f64 } else { 0.0 },
            cancel_rate: if created > 0 { cancelled as f64 / created as f64 } else { 0.0 },
        }
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for AuditLog {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.log(event)
    }
}

/// Statistics about audit entries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    pub total: usize,
    pub created: usize,
    pub reviewed: usize,
    pub applied: usize,
    pub cancelled: usize,
    pub apply_rate: f64,
    pub cancel_rate: f64,
}
