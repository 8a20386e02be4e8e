//! Shared traits and interfaces
//!
//! This module defines the external-collaborator seams: audit logging,
//! win notifications, the permission gate, and the injectable clock.
//! Persistence lives in `crate::storage`.

use crate::common::types::{
    ActorId, GameId, ItemId, MemberId, Points,
};
use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;

/// A single audited state transition.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub actor: ActorId,
    /// Machine-readable action name, e.g. "ledger_approve".
    pub action: &'static str,
    /// Identifier of the row the action touched.
    pub target: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub at: DateTime<Utc>,
}

/// Sink for audit events. Every state transition in the core is forwarded
/// here; persistence format is the sink's concern. Implementations must
/// not fail the business operation, so recording is infallible.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Payload describing a winning wager.
#[derive(Debug, Clone)]
pub struct WinNotification {
    pub member_id: MemberId,
    pub game_id: GameId,
    pub game_label: String,
    pub item_id: ItemId,
    pub odds: f64,
    pub payout: Points,
    pub at: DateTime<Utc>,
}

/// Sink informed of settlement wins. Delivery transport is out of scope.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn wager_won(&self, notification: WinNotification);
}

/// Capabilities the core checks before privileged operations. Resolved
/// once per call by the permission gate, never re-derived from role
/// strings at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Approve, reject, or reverse ledger entries
    ApprovePoints,
    /// Trigger settlement runs
    Settle,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::ApprovePoints => write!(f, "approve-points"),
            Capability::Settle => write!(f, "settle"),
        }
    }
}

/// Authorization decisions are delegated here; the core only names the
/// capability it needs.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Err(Authorization) when the actor lacks the capability.
    async fn authorize(&self, actor: ActorId, capability: Capability) -> Result<()>;
}

/// Injectable time source so ticket numbers, settlement timestamps, and
/// cache staleness are all deterministic under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
