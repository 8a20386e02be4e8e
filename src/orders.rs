//! Order ("ticket") workflow
//!
//! Creating an order is a saga, not a database transaction: the order row,
//! its items, and the per-category ledger holds are written one step at a
//! time, and any failure unwinds everything this call created via an
//! explicit undo log. A successful call leaves the order in `draft` with
//! pending holds sized to its general and wager totals; no balance changes
//! until the holds are approved.

use crate::common::traits::{AuditEvent, AuditSink, Clock};
use crate::common::types::{
    ActorId, EntryId, EntryKind, GameId, ItemCategory, ItemStatus, MemberId, Order, OrderId,
    OrderItem, OrderStatus, PointCategory, Points, WagerDetails,
};
use crate::errors::{Error, Result};
use crate::ledger::{EntryRequest, Ledger};
use crate::storage::Store;
use crate::teams::{resolve_selection, TeamAliasCache};
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// One requested line of a new order. Wager items (category `game`) must
/// reference a game and carry a selection; odds default to 1.0.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub category: ItemCategory,
    pub description: String,
    pub amount: Points,
    pub game_id: Option<GameId>,
    pub selection: Option<String>,
    pub odds: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct OrderReceipt {
    pub order_id: OrderId,
    pub ticket_no: String,
}

/// Undo log entries, executed in reverse on failure. A failed undo is
/// logged and the remaining steps still run.
enum Undo {
    Order(OrderId),
    Items(OrderId),
    Entry(EntryId),
}

pub struct OrderWorkflow {
    store: Arc<dyn Store>,
    ledger: Arc<Ledger>,
    teams: Arc<TeamAliasCache>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl OrderWorkflow {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: Arc<Ledger>,
        teams: Arc<TeamAliasCache>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            ledger,
            teams,
            audit,
            clock,
        }
    }

    /// Create an order with its items and ledger holds, or nothing at all.
    pub async fn create_order(
        &self,
        member_id: MemberId,
        items: Vec<NewOrderItem>,
        created_by: ActorId,
    ) -> Result<OrderReceipt> {
        validate_items(&items)?;
        self.store.member(member_id).await?;

        let mut undo = Vec::new();
        match self.run(member_id, &items, created_by, &mut undo).await {
            Ok(receipt) => {
                info!(
                    order = %receipt.order_id,
                    ticket = %receipt.ticket_no,
                    member = %member_id,
                    items = items.len(),
                    "order created"
                );
                self.audit
                    .record(AuditEvent {
                        actor: created_by,
                        action: "order_create",
                        target: receipt.order_id.to_string(),
                        before: None,
                        after: serde_json::json!({
                            "ticket_no": receipt.ticket_no,
                            "member_id": member_id,
                            "item_count": items.len(),
                        })
                        .into(),
                        at: self.clock.now(),
                    })
                    .await;
                Ok(receipt)
            }
            Err(e) => {
                self.compensate(undo).await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        member_id: MemberId,
        items: &[NewOrderItem],
        created_by: ActorId,
        undo: &mut Vec<Undo>,
    ) -> Result<OrderReceipt> {
        let now = self.clock.now();
        let total: Points = items.iter().map(|i| i.amount).sum();
        let ticket_no = generate_ticket_no(now);

        let order = Order {
            id: Uuid::new_v4(),
            ticket_no: ticket_no.clone(),
            member_id,
            total_amount: total,
            status: OrderStatus::Draft,
            created_by,
            created_at: now,
        };
        let order_id = order.id;
        self.store.insert_order(order).await?;
        undo.push(Undo::Order(order_id));

        let rows = self.build_items(order_id, items, now).await?;
        self.store.insert_items(rows).await?;
        undo.push(Undo::Items(order_id));

        // Freeze funds per category. The hold insert itself enforces the
        // available-balance floor, so a concurrent order for the same
        // member cannot promise the same points twice.
        for category in [PointCategory::General, PointCategory::Wager] {
            let amount: Points = items
                .iter()
                .filter(|i| i.category.point_category() == category)
                .map(|i| i.amount)
                .sum();
            if amount == 0 {
                continue;
            }

            let entry_id = self
                .ledger
                .request_hold(EntryRequest {
                    member_id,
                    category,
                    kind: EntryKind::Use,
                    amount,
                    reason: format!("ticket {} {} deduction", ticket_no, category),
                    requested_by: created_by,
                })
                .await?;
            undo.push(Undo::Entry(entry_id));
        }

        Ok(OrderReceipt {
            order_id,
            ticket_no,
        })
    }

    /// Materialize item rows, resolving wager selections to typed values.
    async fn build_items(
        &self,
        order_id: OrderId,
        items: &[NewOrderItem],
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderItem>> {
        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            let wager = if item.category.is_wager() {
                let game_id = item
                    .game_id
                    .ok_or_else(|| Error::validation("wager items must reference a game"))?;
                let game = self.store.game(game_id).await?;
                let text = item
                    .selection
                    .as_deref()
                    .ok_or_else(|| Error::validation("wager items must carry a selection"))?;
                let selection = resolve_selection(text, &game, &self.teams).ok_or_else(|| {
                    Error::validation(format!(
                        "unrecognized selection '{}' for {}",
                        text,
                        game.label()
                    ))
                })?;
                Some(WagerDetails {
                    selection,
                    odds: WagerDetails::normalize_odds(item.odds),
                })
            } else {
                None
            };

            rows.push(OrderItem {
                id: Uuid::new_v4(),
                order_id,
                category: item.category,
                description: item.description.clone(),
                amount: item.amount,
                status: ItemStatus::Pending,
                game_id: item.game_id,
                wager,
                settled_at: None,
                created_at: now,
            });
        }
        Ok(rows)
    }

    /// Run the undo log in reverse. Undo failures are logged, not raised,
    /// so the caller still sees the original error.
    async fn compensate(&self, undo: Vec<Undo>) {
        for step in undo.into_iter().rev() {
            let result = match &step {
                Undo::Order(id) => self.store.delete_order(*id).await,
                Undo::Items(order_id) => self.store.delete_items_for_order(*order_id).await,
                Undo::Entry(id) => self.store.delete_entry(*id).await,
            };
            if let Err(e) = result {
                let target = match step {
                    Undo::Order(id) => format!("order {}", id),
                    Undo::Items(id) => format!("items of order {}", id),
                    Undo::Entry(id) => format!("ledger entry {}", id),
                };
                error!(%target, error = %e, "order compensation step failed");
            }
        }
    }
}

fn validate_items(items: &[NewOrderItem]) -> Result<()> {
    if items.is_empty() {
        return Err(Error::validation("an order requires at least one item"));
    }
    for item in items {
        if item.amount < 0 {
            return Err(Error::validation("item amounts must not be negative"));
        }
        if item.description.trim().is_empty() {
            return Err(Error::validation("item descriptions must not be empty"));
        }
    }
    Ok(())
}

/// "T" + date + 6-char random suffix, e.g. `T20260806-X4K2QZ`.
/// Best-effort unique; collisions are tolerated upstream.
fn generate_ticket_no(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect();
    format!("T{}-{}", now.format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{EntryStatus, Game, GameStatus, Member};
    use crate::services::{MemoryAuditSink, SystemClock};
    use crate::storage::MemoryStore;
    use chrono::Duration;

    struct Fixture {
        workflow: OrderWorkflow,
        store: Arc<MemoryStore>,
        member_id: MemberId,
        game_id: GameId,
        staff: ActorId,
    }

    async fn fixture(general: Points, wager: Points) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let audit = Arc::new(MemoryAuditSink::default());

        let mut member = Member::new("test member".to_string(), Utc::now());
        member.general_balance = general;
        member.wager_balance = wager;
        let member_id = member.id;
        store.insert_member(member).await.unwrap();

        let game = Game {
            id: Uuid::new_v4(),
            league: "KBO".to_string(),
            home_team: "Bears".to_string(),
            away_team: "Giants".to_string(),
            result_score: String::new(),
            status: GameStatus::Scheduled,
            is_verified: false,
            game_date: Utc::now() + Duration::days(1),
            settled_at: None,
            settled_by: None,
        };
        let game_id = game.id;
        store.upsert_game(game).await.unwrap();

        let ledger = Arc::new(Ledger::new(store.clone(), audit.clone(), clock.clone()));
        let teams = Arc::new(TeamAliasCache::new(clock.clone(), Duration::hours(1)));
        let workflow = OrderWorkflow::new(store.clone(), ledger, teams, audit, clock);

        Fixture {
            workflow,
            store,
            member_id,
            game_id,
            staff: Uuid::new_v4(),
        }
    }

    fn book_item(amount: Points) -> NewOrderItem {
        NewOrderItem {
            category: ItemCategory::Book,
            description: "rust in action".to_string(),
            amount,
            game_id: None,
            selection: None,
            odds: None,
        }
    }

    fn wager_item(game_id: GameId, amount: Points, selection: &str, odds: f64) -> NewOrderItem {
        NewOrderItem {
            category: ItemCategory::Game,
            description: "bears to win".to_string(),
            amount,
            game_id: Some(game_id),
            selection: Some(selection.to_string()),
            odds: Some(odds),
        }
    }

    #[tokio::test]
    async fn test_create_order_freezes_without_spending() {
        let f = fixture(1000, 500).await;

        let receipt = f
            .workflow
            .create_order(
                f.member_id,
                vec![book_item(300), wager_item(f.game_id, 200, "home", 2.5)],
                f.staff,
            )
            .await
            .unwrap();

        let order = f.store.order(receipt.order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Draft);
        assert_eq!(order.total_amount, 500);
        assert_eq!(order.ticket_no, receipt.ticket_no);

        let items = f.store.items_for_order(receipt.order_id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.status == ItemStatus::Pending));
        let wager = items.iter().find(|i| i.category.is_wager()).unwrap();
        let details = wager.wager.as_ref().unwrap();
        assert_eq!(details.odds, 2.5);

        // Two pending holds, one per category, balances untouched.
        let entries = f.store.entries_for_member(f.member_id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.status == EntryStatus::Pending));
        let mut amounts: Vec<Points> = entries.iter().map(|e| e.amount).collect();
        amounts.sort();
        assert_eq!(amounts, vec![-300, -200]);

        let member = f.store.member(f.member_id).await.unwrap();
        assert_eq!(member.general_balance, 1000);
        assert_eq!(member.wager_balance, 500);
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_no_rows() {
        let f = fixture(1000, 0).await;

        let result = f
            .workflow
            .create_order(f.member_id, vec![book_item(1200)], f.staff)
            .await;
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));

        let entries = f.store.entries_for_member(f.member_id).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_wager_shortfall_unwinds_general_hold() {
        let f = fixture(1000, 100).await;

        let result = f
            .workflow
            .create_order(
                f.member_id,
                vec![book_item(300), wager_item(f.game_id, 200, "home", 2.0)],
                f.staff,
            )
            .await;
        assert!(matches!(
            result,
            Err(Error::InsufficientFunds {
                category: PointCategory::Wager,
                ..
            })
        ));

        // The general hold created before the failure is gone too.
        let entries = f.store.entries_for_member(f.member_id).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_empty_and_invalid_items_rejected() {
        let f = fixture(1000, 0).await;

        let empty = f.workflow.create_order(f.member_id, vec![], f.staff).await;
        assert!(matches!(empty, Err(Error::Validation(_))));

        let negative = f
            .workflow
            .create_order(f.member_id, vec![book_item(-5)], f.staff)
            .await;
        assert!(matches!(negative, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_unresolvable_selection_fails_whole_order() {
        let f = fixture(1000, 500).await;

        let result = f
            .workflow
            .create_order(
                f.member_id,
                vec![
                    book_item(300),
                    wager_item(f.game_id, 200, "the weather", 2.0),
                ],
                f.staff,
            )
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));

        let entries = f.store.entries_for_member(f.member_id).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_zero_amount_category_creates_no_hold() {
        let f = fixture(1000, 0).await;

        let receipt = f
            .workflow
            .create_order(f.member_id, vec![book_item(300)], f.staff)
            .await
            .unwrap();

        let entries = f.store.entries_for_member(f.member_id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].category, PointCategory::General);
        assert_eq!(entries[0].amount, -300);
        assert!(entries[0].reason.contains(&receipt.ticket_no));
    }

    #[test]
    fn test_ticket_no_shape() {
        let now = Utc::now();
        let ticket = generate_ticket_no(now);
        let expected_prefix = format!("T{}-", now.format("%Y%m%d"));
        assert!(ticket.starts_with(&expected_prefix));
        assert_eq!(ticket.len(), expected_prefix.len() + 6);
    }
}
