//! Storage layer for members, ledger entries, orders, and games
//!
//! The `Store` trait abstracts the relational rows behind async calls and
//! exposes the conditional-update primitives the core depends on: the
//! pending-only finalization of ledger entries, the `settled_at IS NULL`
//! settlement claim, the available-balance floor check for holds, and
//! atomic balance increments. `MemoryStore` is the shipped implementation,
//! backed by sharded concurrent maps.

use crate::common::types::{
    ActorId, EntryId, EntryStatus, Game, GameId, ItemId, ItemStatus, LedgerEntry, Member,
    MemberId, Order, OrderId, OrderItem, PointCategory, Points,
};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};

/// Persistence interface for the points core.
#[async_trait]
pub trait Store: Send + Sync {
    // Members

    async fn insert_member(&self, member: Member) -> Result<()>;

    async fn member(&self, id: MemberId) -> Result<Member>;

    /// Atomically add `delta` to the member's balance for `category` and
    /// return the new balance. Negative results are allowed (point debt).
    async fn adjust_balance(
        &self,
        id: MemberId,
        category: PointCategory,
        delta: Points,
    ) -> Result<Points>;

    // Ledger entries

    /// Insert an entry without any funds check (charges, refunds, manual
    /// deductions requested by staff).
    async fn insert_entry(&self, entry: LedgerEntry) -> Result<()>;

    /// Insert a pending deduction only if the member's *available* balance
    /// covers it. Available balance is the stored balance plus the sum of
    /// all outstanding pending deductions for the same category, so two
    /// in-flight orders cannot promise the same funds twice.
    async fn insert_hold(&self, entry: LedgerEntry) -> Result<()>;

    async fn entry(&self, id: EntryId) -> Result<LedgerEntry>;

    async fn entries_for_member(&self, id: MemberId) -> Result<Vec<LedgerEntry>>;

    /// Pending-only compare-and-set to a terminal status. The loser of a
    /// concurrent finalization race observes `AlreadyFinalized`.
    async fn finalize_entry(
        &self,
        id: EntryId,
        status: EntryStatus,
        approver: ActorId,
    ) -> Result<LedgerEntry>;

    /// Approved-and-unreversed-only compare-and-set of the reversal fields.
    async fn mark_entry_reversed(
        &self,
        id: EntryId,
        reversed_by: ActorId,
        reversed_at: DateTime<Utc>,
        reason: String,
        offset_entry_id: EntryId,
    ) -> Result<LedgerEntry>;

    /// Remove an entry; used only by saga compensation.
    async fn delete_entry(&self, id: EntryId) -> Result<()>;

    // Orders and items

    async fn insert_order(&self, order: Order) -> Result<()>;

    async fn order(&self, id: OrderId) -> Result<Order>;

    /// Remove an order; used only by saga compensation.
    async fn delete_order(&self, id: OrderId) -> Result<()>;

    async fn insert_items(&self, items: Vec<OrderItem>) -> Result<()>;

    async fn items_for_order(&self, order_id: OrderId) -> Result<Vec<OrderItem>>;

    /// Remove all items of an order; used only by saga compensation.
    async fn delete_items_for_order(&self, order_id: OrderId) -> Result<()>;

    async fn update_item_status(
        &self,
        id: ItemId,
        status: ItemStatus,
        settled_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Wager items referencing a game, filtered by status.
    async fn wager_items_for_game(
        &self,
        game_id: GameId,
        statuses: &[ItemStatus],
    ) -> Result<Vec<OrderItem>>;

    // Games

    async fn upsert_game(&self, game: Game) -> Result<()>;

    async fn game(&self, id: GameId) -> Result<Game>;

    /// Finished, verified, unsettled games, newest first.
    async fn settlement_candidates(&self) -> Result<Vec<Game>>;

    /// `settled_at IS NULL` compare-and-set. Returns false when another run
    /// already claimed the game.
    async fn claim_game(
        &self,
        id: GameId,
        operator: ActorId,
        now: DateTime<Utc>,
    ) -> Result<bool>;
}

/// In-memory store backed by sharded concurrent maps.
///
/// Mutating accessors hold the target shard's lock, which makes each of
/// the conditional updates above a single atomic step. The hold floor
/// check additionally serializes per member so concurrent orders observe
/// each other's pending deductions.
#[derive(Default)]
pub struct MemoryStore {
    members: DashMap<MemberId, Member>,
    entries: DashMap<EntryId, LedgerEntry>,
    orders: DashMap<OrderId, Order>,
    items: DashMap<ItemId, OrderItem>,
    games: DashMap<GameId, Game>,
    funds_locks: DashMap<MemberId, Arc<Mutex<()>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn funds_lock(&self, id: MemberId) -> Arc<Mutex<()>> {
        self.funds_locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Stored balance minus what outstanding pending deductions already
    /// promise. Callers must hold the member's funds lock.
    fn available_balance(&self, id: MemberId, category: PointCategory) -> Result<Points> {
        let balance = self
            .members
            .get(&id)
            .map(|m| m.balance(category))
            .ok_or_else(|| Error::not_found("member", id))?;

        let pending_deductions: Points = self
            .entries
            .iter()
            .filter(|e| {
                e.member_id == id
                    && e.category == category
                    && e.status == EntryStatus::Pending
                    && e.amount < 0
            })
            .map(|e| e.amount)
            .sum();

        Ok(balance + pending_deductions)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_member(&self, member: Member) -> Result<()> {
        self.members.insert(member.id, member);
        Ok(())
    }

    async fn member(&self, id: MemberId) -> Result<Member> {
        self.members
            .get(&id)
            .map(|m| m.value().clone())
            .ok_or_else(|| Error::not_found("member", id))
    }

    async fn adjust_balance(
        &self,
        id: MemberId,
        category: PointCategory,
        delta: Points,
    ) -> Result<Points> {
        let mut member = self
            .members
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("member", id))?;

        let balance = match category {
            PointCategory::General => {
                member.general_balance += delta;
                member.general_balance
            }
            PointCategory::Wager => {
                member.wager_balance += delta;
                member.wager_balance
            }
        };

        Ok(balance)
    }

    async fn insert_entry(&self, entry: LedgerEntry) -> Result<()> {
        self.entries.insert(entry.id, entry);
        Ok(())
    }

    async fn insert_hold(&self, entry: LedgerEntry) -> Result<()> {
        if entry.amount >= 0 || entry.status != EntryStatus::Pending {
            return Err(Error::validation(
                "holds must be pending deductions with a negative amount",
            ));
        }

        let lock = self.funds_lock(entry.member_id);
        let _guard = lock.lock().expect("funds lock poisoned");

        let available = self.available_balance(entry.member_id, entry.category)?;
        let required = -entry.amount;
        if required > available {
            return Err(Error::InsufficientFunds {
                category: entry.category,
                required,
                available,
            });
        }

        self.entries.insert(entry.id, entry);
        Ok(())
    }

    async fn entry(&self, id: EntryId) -> Result<LedgerEntry> {
        self.entries
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::not_found("ledger entry", id))
    }

    async fn entries_for_member(&self, id: MemberId) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.member_id == id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn finalize_entry(
        &self,
        id: EntryId,
        status: EntryStatus,
        approver: ActorId,
    ) -> Result<LedgerEntry> {
        let mut entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("ledger entry", id))?;

        if entry.status != EntryStatus::Pending {
            return Err(Error::AlreadyFinalized(id));
        }

        entry.status = status;
        entry.approved_by = Some(approver);
        Ok(entry.clone())
    }

    async fn mark_entry_reversed(
        &self,
        id: EntryId,
        reversed_by: ActorId,
        reversed_at: DateTime<Utc>,
        reason: String,
        offset_entry_id: EntryId,
    ) -> Result<LedgerEntry> {
        let mut entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("ledger entry", id))?;

        if entry.status != EntryStatus::Approved || entry.is_reversed {
            return Err(Error::AlreadyFinalized(id));
        }

        entry.is_reversed = true;
        entry.reversed_by = Some(reversed_by);
        entry.reversed_at = Some(reversed_at);
        entry.reversal_reason = Some(reason);
        entry.offset_entry_id = Some(offset_entry_id);
        Ok(entry.clone())
    }

    async fn delete_entry(&self, id: EntryId) -> Result<()> {
        self.entries.remove(&id);
        Ok(())
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        self.orders.insert(order.id, order);
        Ok(())
    }

    async fn order(&self, id: OrderId) -> Result<Order> {
        self.orders
            .get(&id)
            .map(|o| o.value().clone())
            .ok_or_else(|| Error::not_found("order", id))
    }

    async fn delete_order(&self, id: OrderId) -> Result<()> {
        self.orders.remove(&id);
        Ok(())
    }

    async fn insert_items(&self, items: Vec<OrderItem>) -> Result<()> {
        for item in items {
            self.items.insert(item.id, item);
        }
        Ok(())
    }

    async fn items_for_order(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        Ok(self
            .items
            .iter()
            .filter(|i| i.order_id == order_id)
            .map(|i| i.value().clone())
            .collect())
    }

    async fn delete_items_for_order(&self, order_id: OrderId) -> Result<()> {
        self.items.retain(|_, item| item.order_id != order_id);
        Ok(())
    }

    async fn update_item_status(
        &self,
        id: ItemId,
        status: ItemStatus,
        settled_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut item = self
            .items
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("order item", id))?;

        item.status = status;
        if settled_at.is_some() {
            item.settled_at = settled_at;
        }
        Ok(())
    }

    async fn wager_items_for_game(
        &self,
        game_id: GameId,
        statuses: &[ItemStatus],
    ) -> Result<Vec<OrderItem>> {
        Ok(self
            .items
            .iter()
            .filter(|i| {
                i.category.is_wager()
                    && i.game_id == Some(game_id)
                    && statuses.contains(&i.status)
            })
            .map(|i| i.value().clone())
            .collect())
    }

    async fn upsert_game(&self, game: Game) -> Result<()> {
        self.games.insert(game.id, game);
        Ok(())
    }

    async fn game(&self, id: GameId) -> Result<Game> {
        self.games
            .get(&id)
            .map(|g| g.value().clone())
            .ok_or_else(|| Error::not_found("game", id))
    }

    async fn settlement_candidates(&self) -> Result<Vec<Game>> {
        let mut candidates: Vec<Game> = self
            .games
            .iter()
            .filter(|g| g.is_settleable())
            .map(|g| g.value().clone())
            .collect();

        candidates.sort_by(|a, b| b.game_date.cmp(&a.game_date));
        Ok(candidates)
    }

    async fn claim_game(
        &self,
        id: GameId,
        operator: ActorId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut game = self
            .games
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("game", id))?;

        if game.settled_at.is_some() {
            return Ok(false);
        }

        game.settled_at = Some(now);
        game.settled_by = Some(operator);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{EntryKind, GameStatus};
    use uuid::Uuid;

    fn member_with(general: Points, wager: Points) -> Member {
        let mut member = Member::new("test member".to_string(), Utc::now());
        member.general_balance = general;
        member.wager_balance = wager;
        member
    }

    fn pending_use(member_id: MemberId, category: PointCategory, amount: Points) -> LedgerEntry {
        LedgerEntry::pending(
            member_id,
            category,
            EntryKind::Use,
            amount,
            "test hold".to_string(),
            Uuid::new_v4(),
            Utc::now(),
        )
    }

    fn finished_game() -> Game {
        Game {
            id: Uuid::new_v4(),
            league: "KBO".to_string(),
            home_team: "Bears".to_string(),
            away_team: "Giants".to_string(),
            result_score: "3:1".to_string(),
            status: GameStatus::Finished,
            is_verified: true,
            game_date: Utc::now(),
            settled_at: None,
            settled_by: None,
        }
    }

    #[tokio::test]
    async fn test_adjust_balance_goes_negative() {
        let store = MemoryStore::new();
        let member = member_with(100, 0);
        let id = member.id;
        store.insert_member(member).await.unwrap();

        let balance = store
            .adjust_balance(id, PointCategory::General, -250)
            .await
            .unwrap();
        assert_eq!(balance, -150);
    }

    #[tokio::test]
    async fn test_finalize_entry_is_pending_only() {
        let store = MemoryStore::new();
        let member = member_with(1000, 0);
        let member_id = member.id;
        store.insert_member(member).await.unwrap();

        let entry = pending_use(member_id, PointCategory::General, 300);
        let entry_id = entry.id;
        store.insert_entry(entry).await.unwrap();

        let approver = Uuid::new_v4();
        let approved = store
            .finalize_entry(entry_id, EntryStatus::Approved, approver)
            .await
            .unwrap();
        assert_eq!(approved.status, EntryStatus::Approved);
        assert_eq!(approved.approved_by, Some(approver));

        let second = store
            .finalize_entry(entry_id, EntryStatus::Approved, approver)
            .await;
        assert!(matches!(second, Err(Error::AlreadyFinalized(_))));
    }

    #[tokio::test]
    async fn test_concurrent_finalize_single_winner() {
        let store = Arc::new(MemoryStore::new());
        let member = member_with(1000, 0);
        let member_id = member.id;
        store.insert_member(member).await.unwrap();

        let entry = pending_use(member_id, PointCategory::General, 300);
        let entry_id = entry.id;
        store.insert_entry(entry).await.unwrap();

        let a = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .finalize_entry(entry_id, EntryStatus::Approved, Uuid::new_v4())
                    .await
            })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .finalize_entry(entry_id, EntryStatus::Rejected, Uuid::new_v4())
                    .await
            })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_insert_hold_floor_check() {
        let store = MemoryStore::new();
        let member = member_with(1000, 0);
        let member_id = member.id;
        store.insert_member(member).await.unwrap();

        // First hold fits.
        store
            .insert_hold(pending_use(member_id, PointCategory::General, 700))
            .await
            .unwrap();

        // Second hold exceeds what is left even though the stored balance
        // is untouched.
        let second = store
            .insert_hold(pending_use(member_id, PointCategory::General, 400))
            .await;
        assert!(matches!(
            second,
            Err(Error::InsufficientFunds { available: 300, .. })
        ));

        let stored = store.member(member_id).await.unwrap();
        assert_eq!(stored.general_balance, 1000);
    }

    #[tokio::test]
    async fn test_claim_game_single_winner() {
        let store = MemoryStore::new();
        let game = finished_game();
        let game_id = game.id;
        store.upsert_game(game).await.unwrap();

        let operator = Uuid::new_v4();
        assert!(store.claim_game(game_id, operator, Utc::now()).await.unwrap());
        assert!(!store.claim_game(game_id, operator, Utc::now()).await.unwrap());

        let stored = store.game(game_id).await.unwrap();
        assert_eq!(stored.settled_by, Some(operator));
        assert!(stored.settled_at.is_some());
    }

    #[tokio::test]
    async fn test_settlement_candidates_newest_first() {
        let store = MemoryStore::new();

        let mut older = finished_game();
        older.game_date = Utc::now() - chrono::Duration::days(2);
        let mut newer = finished_game();
        newer.game_date = Utc::now();
        let mut unverified = finished_game();
        unverified.is_verified = false;

        let (older_id, newer_id) = (older.id, newer.id);
        store.upsert_game(older).await.unwrap();
        store.upsert_game(newer).await.unwrap();
        store.upsert_game(unverified).await.unwrap();

        let candidates = store.settlement_candidates().await.unwrap();
        let ids: Vec<GameId> = candidates.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![newer_id, older_id]);
    }
}
