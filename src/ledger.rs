//! Ledger accounting
//!
//! The sole authority for member balances. Entries are created pending and
//! only an approval applies their signed amount to the balance; rejection
//! is a no-op on funds. Finalization rides on the store's pending-only
//! compare-and-set, so two operators racing on the same entry produce
//! exactly one balance application.

use crate::common::traits::{AuditEvent, AuditSink, Capability, Clock, PermissionGate};
use crate::common::types::{
    ActorId, EntryId, EntryKind, EntryStatus, LedgerEntry, MemberId, PointCategory, Points,
};
use crate::errors::{Error, Result};
use crate::storage::Store;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Caller-facing shape of a new entry request. `amount` is a magnitude;
/// the sign is derived from `kind`.
#[derive(Debug, Clone)]
pub struct EntryRequest {
    pub member_id: MemberId,
    pub category: PointCategory,
    pub kind: EntryKind,
    pub amount: Points,
    pub reason: String,
    pub requested_by: ActorId,
}

/// Ledger accounting service.
pub struct Ledger {
    store: Arc<dyn Store>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>, audit: Arc<dyn AuditSink>, clock: Arc<dyn Clock>) -> Self {
        Self { store, audit, clock }
    }

    fn validate(&self, req: &EntryRequest) -> Result<()> {
        if req.amount == 0 {
            return Err(Error::validation("entry amount must not be zero"));
        }
        if req.reason.trim().is_empty() {
            return Err(Error::validation("entry reason must not be empty"));
        }
        Ok(())
    }

    /// Record a pending entry. The balance is untouched until approval.
    pub async fn request_entry(&self, req: EntryRequest) -> Result<EntryId> {
        self.validate(&req)?;
        // Reject unknown members up front rather than at approval time.
        self.store.member(req.member_id).await?;

        let entry = LedgerEntry::pending(
            req.member_id,
            req.category,
            req.kind,
            req.amount,
            req.reason,
            req.requested_by,
            self.clock.now(),
        );
        let entry_id = entry.id;

        self.store.insert_entry(entry.clone()).await?;
        self.audit
            .record(AuditEvent {
                actor: req.requested_by,
                action: "ledger_request",
                target: entry_id.to_string(),
                before: None,
                after: serde_json::to_value(&entry).ok(),
                at: self.clock.now(),
            })
            .await;

        Ok(entry_id)
    }

    /// Record a pending deduction with an atomic available-balance check;
    /// this is what order creation uses to freeze funds.
    pub async fn request_hold(&self, req: EntryRequest) -> Result<EntryId> {
        self.validate(&req)?;
        if req.kind != EntryKind::Use {
            return Err(Error::validation("holds must use the `use` entry kind"));
        }

        let entry = LedgerEntry::pending(
            req.member_id,
            req.category,
            req.kind,
            req.amount,
            req.reason,
            req.requested_by,
            self.clock.now(),
        );
        let entry_id = entry.id;

        self.store.insert_hold(entry.clone()).await?;
        self.audit
            .record(AuditEvent {
                actor: req.requested_by,
                action: "ledger_hold",
                target: entry_id.to_string(),
                before: None,
                after: serde_json::to_value(&entry).ok(),
                at: self.clock.now(),
            })
            .await;

        Ok(entry_id)
    }

    /// Transition a pending entry to approved and apply its amount to the
    /// member's balance. The second of two concurrent approvals observes
    /// `AlreadyFinalized` and applies nothing.
    pub async fn approve(&self, entry_id: EntryId, approver: ActorId) -> Result<LedgerEntry> {
        let before = self.store.entry(entry_id).await?;
        let approved = self
            .store
            .finalize_entry(entry_id, EntryStatus::Approved, approver)
            .await?;

        let balance = self
            .store
            .adjust_balance(approved.member_id, approved.category, approved.amount)
            .await?;

        info!(
            entry = %entry_id,
            member = %approved.member_id,
            category = %approved.category,
            amount = approved.amount,
            balance,
            "ledger entry approved"
        );
        self.audit
            .record(AuditEvent {
                actor: approver,
                action: "ledger_approve",
                target: entry_id.to_string(),
                before: serde_json::to_value(&before).ok(),
                after: serde_json::to_value(&approved).ok(),
                at: self.clock.now(),
            })
            .await;

        Ok(approved)
    }

    /// Transition a pending entry to rejected. Never touches the balance.
    pub async fn reject(
        &self,
        entry_id: EntryId,
        approver: ActorId,
        reason: String,
    ) -> Result<LedgerEntry> {
        let before = self.store.entry(entry_id).await?;
        let rejected = self
            .store
            .finalize_entry(entry_id, EntryStatus::Rejected, approver)
            .await?;

        info!(entry = %entry_id, reason = %reason, "ledger entry rejected");
        self.audit
            .record(AuditEvent {
                actor: approver,
                action: "ledger_reject",
                target: entry_id.to_string(),
                before: serde_json::to_value(&before).ok(),
                after: serde_json::to_value(&rejected).ok(),
                at: self.clock.now(),
            })
            .await;

        Ok(rejected)
    }

    /// Undo an approved entry by posting an offsetting approved entry and
    /// applying it to the balance. Each entry can be reversed at most once;
    /// the store's compare-and-set on the reversal fields enforces that.
    pub async fn reverse(
        &self,
        entry_id: EntryId,
        operator: ActorId,
        reason: String,
    ) -> Result<EntryId> {
        if reason.trim().is_empty() {
            return Err(Error::validation("reversal reason must not be empty"));
        }

        let original = self.store.entry(entry_id).await?;
        let now = self.clock.now();
        let offset_id = Uuid::new_v4();

        // Claim the reversal first so a concurrent reverse cannot post a
        // second offset.
        let reversed = self
            .store
            .mark_entry_reversed(entry_id, operator, now, reason.clone(), offset_id)
            .await?;

        let offset = LedgerEntry {
            id: offset_id,
            member_id: reversed.member_id,
            category: reversed.category,
            kind: reversed.kind,
            amount: -reversed.amount,
            status: EntryStatus::Approved,
            reason: format!("reversal of {}: {}", entry_id, reason),
            requested_by: operator,
            approved_by: Some(operator),
            is_reversed: false,
            reversed_by: None,
            reversed_at: None,
            reversal_reason: None,
            offset_entry_id: None,
            created_at: now,
        };
        self.store.insert_entry(offset.clone()).await?;
        self.store
            .adjust_balance(reversed.member_id, reversed.category, offset.amount)
            .await?;

        self.audit
            .record(AuditEvent {
                actor: operator,
                action: "ledger_reverse",
                target: entry_id.to_string(),
                before: serde_json::to_value(&original).ok(),
                after: serde_json::to_value(&reversed).ok(),
                at: now,
            })
            .await;

        Ok(offset_id)
    }
}

/// Operator-facing wrapper over approve/reject/reverse. The permission
/// gate resolves the caller's capability once; the ledger itself stays
/// authorization-free.
pub struct ApprovalGateway {
    ledger: Arc<Ledger>,
    gate: Arc<dyn PermissionGate>,
}

impl ApprovalGateway {
    pub fn new(ledger: Arc<Ledger>, gate: Arc<dyn PermissionGate>) -> Self {
        Self { ledger, gate }
    }

    pub async fn approve(&self, entry_id: EntryId, approver: ActorId) -> Result<LedgerEntry> {
        self.gate
            .authorize(approver, Capability::ApprovePoints)
            .await?;
        self.ledger.approve(entry_id, approver).await
    }

    pub async fn reject(
        &self,
        entry_id: EntryId,
        approver: ActorId,
        reason: String,
    ) -> Result<LedgerEntry> {
        self.gate
            .authorize(approver, Capability::ApprovePoints)
            .await?;
        self.ledger.reject(entry_id, approver, reason).await
    }

    pub async fn reverse(
        &self,
        entry_id: EntryId,
        operator: ActorId,
        reason: String,
    ) -> Result<EntryId> {
        self.gate
            .authorize(operator, Capability::ApprovePoints)
            .await?;
        self.ledger.reverse(entry_id, operator, reason).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{MemoryAuditSink, SystemClock};
    use crate::storage::MemoryStore;
    use crate::common::types::Member;
    use chrono::Utc;

    async fn ledger_with_member(general: Points) -> (Arc<Ledger>, Arc<MemoryStore>, MemberId) {
        let store = Arc::new(MemoryStore::new());
        let mut member = Member::new("test member".to_string(), Utc::now());
        member.general_balance = general;
        let member_id = member.id;
        store.insert_member(member).await.unwrap();

        let ledger = Arc::new(Ledger::new(
            store.clone(),
            Arc::new(MemoryAuditSink::default()),
            Arc::new(SystemClock),
        ));
        (ledger, store, member_id)
    }

    fn charge(member_id: MemberId, amount: Points) -> EntryRequest {
        EntryRequest {
            member_id,
            category: PointCategory::General,
            kind: EntryKind::Charge,
            amount,
            reason: "deposit received".to_string(),
            requested_by: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_request_does_not_touch_balance() {
        let (ledger, store, member_id) = ledger_with_member(1000).await;
        ledger.request_entry(charge(member_id, 500)).await.unwrap();

        let member = store.member(member_id).await.unwrap();
        assert_eq!(member.general_balance, 1000);
    }

    #[tokio::test]
    async fn test_zero_amount_rejected() {
        let (ledger, _, member_id) = ledger_with_member(0).await;
        let result = ledger.request_entry(charge(member_id, 0)).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_unknown_member_rejected() {
        let (ledger, _, _) = ledger_with_member(0).await;
        let result = ledger.request_entry(charge(Uuid::new_v4(), 100)).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_approve_applies_balance_once() {
        let (ledger, store, member_id) = ledger_with_member(1000).await;
        let entry_id = ledger.request_entry(charge(member_id, 500)).await.unwrap();

        let approver = Uuid::new_v4();
        ledger.approve(entry_id, approver).await.unwrap();
        assert_eq!(store.member(member_id).await.unwrap().general_balance, 1500);

        // A second approval must not double-apply.
        let second = ledger.approve(entry_id, approver).await;
        assert!(matches!(second, Err(Error::AlreadyFinalized(_))));
        assert_eq!(store.member(member_id).await.unwrap().general_balance, 1500);
    }

    #[tokio::test]
    async fn test_reject_never_mutates_balance() {
        let (ledger, store, member_id) = ledger_with_member(1000).await;
        let entry_id = ledger.request_entry(charge(member_id, 500)).await.unwrap();

        let rejected = ledger
            .reject(entry_id, Uuid::new_v4(), "not funded".to_string())
            .await
            .unwrap();
        assert_eq!(rejected.status, EntryStatus::Rejected);
        assert_eq!(store.member(member_id).await.unwrap().general_balance, 1000);
    }

    #[tokio::test]
    async fn test_use_entry_deducts_on_approval() {
        let (ledger, store, member_id) = ledger_with_member(1000).await;
        let entry_id = ledger
            .request_hold(EntryRequest {
                member_id,
                category: PointCategory::General,
                kind: EntryKind::Use,
                amount: 300,
                reason: "order hold".to_string(),
                requested_by: Uuid::new_v4(),
            })
            .await
            .unwrap();

        ledger.approve(entry_id, Uuid::new_v4()).await.unwrap();
        assert_eq!(store.member(member_id).await.unwrap().general_balance, 700);
    }

    #[tokio::test]
    async fn test_reverse_restores_balance_exactly_once() {
        let (ledger, store, member_id) = ledger_with_member(1000).await;
        let entry_id = ledger.request_entry(charge(member_id, 500)).await.unwrap();
        ledger.approve(entry_id, Uuid::new_v4()).await.unwrap();
        assert_eq!(store.member(member_id).await.unwrap().general_balance, 1500);

        let operator = Uuid::new_v4();
        let offset_id = ledger
            .reverse(entry_id, operator, "entered twice".to_string())
            .await
            .unwrap();
        assert_eq!(store.member(member_id).await.unwrap().general_balance, 1000);

        let offset = store.entry(offset_id).await.unwrap();
        assert_eq!(offset.amount, -500);
        assert_eq!(offset.status, EntryStatus::Approved);

        let original = store.entry(entry_id).await.unwrap();
        assert!(original.is_reversed);
        assert_eq!(original.offset_entry_id, Some(offset_id));

        let second = ledger
            .reverse(entry_id, operator, "again".to_string())
            .await;
        assert!(matches!(second, Err(Error::AlreadyFinalized(_))));
        assert_eq!(store.member(member_id).await.unwrap().general_balance, 1000);
    }

    #[tokio::test]
    async fn test_reverse_requires_approved_entry() {
        let (ledger, _, member_id) = ledger_with_member(1000).await;
        let entry_id = ledger.request_entry(charge(member_id, 500)).await.unwrap();

        let result = ledger
            .reverse(entry_id, Uuid::new_v4(), "too soon".to_string())
            .await;
        assert!(matches!(result, Err(Error::AlreadyFinalized(_))));
    }
}
