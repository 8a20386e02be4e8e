//! Service layer providing dependency injection and clean separation of concerns
//!
//! This module implements the Dependency Injection pattern to create loosely
//! coupled, testable components: default collaborator implementations
//! (audit, notifications, permissions, clocks) plus the container that
//! wires the core services together.

use crate::common::config::AppConfig;
use crate::common::traits::{
    AuditEvent, AuditSink, Capability, Clock, NotificationSink, PermissionGate, WinNotification,
};
use crate::common::types::ActorId;
use crate::errors::{Error, Result};
use crate::ledger::{ApprovalGateway, Ledger};
use crate::orders::OrderWorkflow;
use crate::settlement::SettlementEngine;
use crate::storage::{MemoryStore, Store};
use crate::teams::TeamAliasCache;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Wall-clock time source used in production.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock whose time only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
        }
    }
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock poisoned");
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock poisoned")
    }
}

/// Default audit sink: structured log lines. A real deployment points this
/// at the audit-log persistence service instead.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        info!(
            actor = %event.actor,
            action = event.action,
            target = %event.target,
            at = %event.at,
            "audit"
        );
    }
}

/// Capturing audit sink for tests.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit sink poisoned").clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuditEvent) {
        self.events.lock().expect("audit sink poisoned").push(event);
    }
}

/// Default notification sink: log only; transport is out of scope.
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn wager_won(&self, n: WinNotification) {
        info!(
            member = %n.member_id,
            game = %n.game_label,
            odds = n.odds,
            payout = n.payout,
            "wager won"
        );
    }
}

/// Capturing notification sink for tests.
#[derive(Default)]
pub struct MemoryNotificationSink {
    notifications: Mutex<Vec<WinNotification>>,
}

impl MemoryNotificationSink {
    pub fn notifications(&self) -> Vec<WinNotification> {
        self.notifications
            .lock()
            .expect("notification sink poisoned")
            .clone()
    }
}

#[async_trait]
impl NotificationSink for MemoryNotificationSink {
    async fn wager_won(&self, n: WinNotification) {
        self.notifications
            .lock()
            .expect("notification sink poisoned")
            .push(n);
    }
}

/// Operator roles known to the static permission gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Staff,
    Operator,
    Admin,
}

impl Role {
    fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::ApprovePoints | Capability::Settle => {
                matches!(self, Role::Operator | Role::Admin)
            }
        }
    }
}

/// Permission gate backed by an in-process role table. Capabilities are
/// resolved here, once per call; callers never inspect roles themselves.
#[derive(Default)]
pub struct StaticPermissionGate {
    roles: DashMap<ActorId, Role>,
}

impl StaticPermissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, actor: ActorId, role: Role) {
        self.roles.insert(actor, role);
    }
}

#[async_trait]
impl PermissionGate for StaticPermissionGate {
    async fn authorize(&self, actor: ActorId, capability: Capability) -> Result<()> {
        let allowed = self
            .roles
            .get(&actor)
            .map(|role| role.allows(capability))
            .unwrap_or(false);

        if allowed {
            Ok(())
        } else {
            Err(Error::Authorization(format!(
                "actor {} lacks the {} capability",
                actor, capability
            )))
        }
    }
}

/// Gate that allows everything; development and test wiring only.
pub struct AllowAllGate;

#[async_trait]
impl PermissionGate for AllowAllGate {
    async fn authorize(&self, _actor: ActorId, _capability: Capability) -> Result<()> {
        Ok(())
    }
}

/// Fully wired core services.
pub struct ServiceContainer {
    pub store: Arc<dyn Store>,
    pub ledger: Arc<Ledger>,
    pub approvals: Arc<ApprovalGateway>,
    pub orders: Arc<OrderWorkflow>,
    pub settlement: Arc<SettlementEngine>,
    pub teams: Arc<TeamAliasCache>,
    pub audit: Arc<dyn AuditSink>,
    pub clock: Arc<dyn Clock>,
}

/// Builder for `ServiceContainer` with per-collaborator overrides
/// (useful for testing).
pub struct ServiceBuilder {
    config: AppConfig,
    store: Option<Arc<dyn Store>>,
    gate: Option<Arc<dyn PermissionGate>>,
    audit: Option<Arc<dyn AuditSink>>,
    notifier: Option<Arc<dyn NotificationSink>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ServiceBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            store: None,
            gate: None,
            audit: None,
            notifier: None,
            clock: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_gate(mut self, gate: Arc<dyn PermissionGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the service container
    pub fn build(self) -> ServiceContainer {
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let gate = self
            .gate
            .unwrap_or_else(|| Arc::new(StaticPermissionGate::new()));
        let audit: Arc<dyn AuditSink> = self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink));
        let notifier: Arc<dyn NotificationSink> = self
            .notifier
            .unwrap_or_else(|| Arc::new(TracingNotificationSink));
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let teams = Arc::new(TeamAliasCache::new(
            clock.clone(),
            Duration::seconds(self.config.teams.ttl_secs as i64),
        ));
        let ledger = Arc::new(Ledger::new(store.clone(), audit.clone(), clock.clone()));
        let approvals = Arc::new(ApprovalGateway::new(ledger.clone(), gate.clone()));
        let orders = Arc::new(OrderWorkflow::new(
            store.clone(),
            ledger.clone(),
            teams.clone(),
            audit.clone(),
            clock.clone(),
        ));
        let settlement = Arc::new(SettlementEngine::new(
            store.clone(),
            gate,
            audit.clone(),
            notifier,
            clock.clone(),
            self.config.settlement.max_games_per_run,
        ));

        ServiceContainer {
            store,
            ledger,
            approvals,
            orders,
            settlement,
            teams,
            audit,
            clock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_static_gate_roles() {
        let gate = StaticPermissionGate::new();
        let staff = Uuid::new_v4();
        let operator = Uuid::new_v4();
        gate.grant(staff, Role::Staff);
        gate.grant(operator, Role::Operator);

        assert!(gate.authorize(operator, Capability::Settle).await.is_ok());
        assert!(gate
            .authorize(operator, Capability::ApprovePoints)
            .await
            .is_ok());
        assert!(matches!(
            gate.authorize(staff, Capability::Settle).await,
            Err(Error::Authorization(_))
        ));
        assert!(matches!(
            gate.authorize(Uuid::new_v4(), Capability::Settle).await,
            Err(Error::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn test_manual_clock_advances() {
        let clock = ManualClock::default();
        let start = clock.now();
        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now() - start, Duration::minutes(5));
    }

    #[test]
    fn test_container_wiring() {
        let container = ServiceBuilder::new(AppConfig::default()).build();
        assert!(!container.teams.is_stale());
    }
}
