//! Best-effort notification that a flag changed.
//!
//! A downstream relay reloads its flag set when signalled. Delivery is
//! fire-and-forget: failures are logged by the caller and never affect
//! change request state.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("refresh request failed: {0}")]
    Transport(String),

    #[error("relay answered with status {0}")]
    Status(u16),
}

/// What was applied, for signals that care.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTarget {
    pub project: String,
    pub flag_key: String,
}

#[async_trait]
pub trait RefreshSignal: Send + Sync {
    async fn refresh(&self, target: RefreshTarget) -> Result<(), RefreshError>;
}

/// Used when no relay is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRefresh;

#[async_trait]
impl RefreshSignal for NoopRefresh {
    async fn refresh(&self, _target: RefreshTarget) -> Result<(), RefreshError> {
        Ok(())
    }
}
