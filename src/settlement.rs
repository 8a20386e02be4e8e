//! Settlement engine
//!
//! Resolves finished, verified games into win/loss outcomes and posts
//! payouts. Each game is processed independently: an error in one game is
//! recorded in that game's result entry and never aborts the batch. The
//! one-shot `settled_at` claim happens after the result score parses and
//! before any payout is applied, so settling is at-most-once even under
//! concurrent runs, and a run can always be retried wholesale (already
//! settled games report as skipped).
//!
//! Payouts are credited directly to the wager balance, deliberately
//! bypassing the pending/approve ledger flow used for manual movements.

use crate::common::traits::{
    AuditEvent, AuditSink, Capability, Clock, NotificationSink, PermissionGate, WinNotification,
};
use crate::common::types::{
    ActorId, Game, GameId, GameStatus, ItemId, ItemStatus, MemberId, Outcome, PointCategory,
    Points, ScoreLine, Selection, WagerDetails,
};
use crate::errors::{Error, Result};
use crate::storage::Store;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// How a game fared within one settlement run.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameRunStatus {
    Settled,
    Skipped,
    Errored,
}

/// Per-item detail inside a game's settlement result.
#[derive(Debug, Clone, Serialize)]
pub struct ItemSettlement {
    pub item_id: ItemId,
    pub member_id: MemberId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selection>,
    pub odds: f64,
    pub stake: Points,
    pub status: ItemStatus,
    pub payout: Points,
}

/// Result entry for one game in a run.
#[derive(Debug, Clone, Serialize)]
pub struct GameSettlement {
    pub game_id: GameId,
    pub game_label: String,
    pub status: GameRunStatus,
    pub outcome: Option<Outcome>,
    pub result_score: String,
    pub total_staked: Points,
    pub total_payout: Points,
    pub profit: Points,
    /// Profit as a percentage of total stakes; 0 when nothing was staked.
    pub profit_rate: f64,
    pub win_count: usize,
    pub lose_count: usize,
    pub items: Vec<ItemSettlement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GameSettlement {
    fn skipped(game: &Game) -> Self {
        Self::bare(game.id, game.label(), &game.result_score, GameRunStatus::Skipped, None)
    }

    fn errored(game_id: GameId, label: String, score: &str, message: String) -> Self {
        Self::bare(game_id, label, score, GameRunStatus::Errored, Some(message))
    }

    fn bare(
        game_id: GameId,
        game_label: String,
        result_score: &str,
        status: GameRunStatus,
        error: Option<String>,
    ) -> Self {
        Self {
            game_id,
            game_label,
            status,
            outcome: None,
            result_score: result_score.to_string(),
            total_staked: 0,
            total_payout: 0,
            profit: 0,
            profit_rate: 0.0,
            win_count: 0,
            lose_count: 0,
            items: Vec::new(),
            error,
        }
    }
}

/// Counters and aggregates over a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub processed: usize,
    pub settled: usize,
    pub skipped: usize,
    pub errored: usize,
    pub total_staked: Points,
    pub total_payout: Points,
    pub total_profit: Points,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementReport {
    pub stats: RunStats,
    pub results: Vec<GameSettlement>,
}

/// A game awaiting settlement, with its open-wager count.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateGame {
    pub game_id: GameId,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub result_score: String,
    pub game_date: DateTime<Utc>,
    pub bet_count: usize,
}

pub struct SettlementEngine {
    store: Arc<dyn Store>,
    gate: Arc<dyn PermissionGate>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    max_games_per_run: usize,
}

impl SettlementEngine {
    pub fn new(
        store: Arc<dyn Store>,
        gate: Arc<dyn PermissionGate>,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        max_games_per_run: usize,
    ) -> Self {
        Self {
            store,
            gate,
            audit,
            notifier,
            clock,
            max_games_per_run,
        }
    }

    /// Finished, verified, unsettled games with their open-wager counts,
    /// newest first.
    pub async fn candidates(&self) -> Result<Vec<CandidateGame>> {
        let games = self.store.settlement_candidates().await?;
        let mut out = Vec::with_capacity(games.len());
        for game in games {
            let bet_count = self
                .store
                .wager_items_for_game(game.id, &[ItemStatus::Pending, ItemStatus::Approved])
                .await?
                .len();
            out.push(CandidateGame {
                game_id: game.id,
                league: game.league,
                home_team: game.home_team,
                away_team: game.away_team,
                result_score: game.result_score,
                game_date: game.game_date,
                bet_count,
            });
        }
        Ok(out)
    }

    /// Settle the given games, or every eligible candidate when no ids are
    /// passed. Always returns a structured report; individual game
    /// failures are entries in it, never an error of the run itself.
    pub async fn run(
        &self,
        operator: ActorId,
        game_ids: Option<Vec<GameId>>,
    ) -> Result<SettlementReport> {
        self.gate.authorize(operator, Capability::Settle).await?;

        let mut results = Vec::new();
        let games = match game_ids {
            Some(ids) => {
                let mut games = Vec::with_capacity(ids.len());
                for id in ids {
                    match self.store.game(id).await {
                        Ok(game) => games.push(game),
                        Err(e) => results.push(GameSettlement::errored(
                            id,
                            "unknown game".to_string(),
                            "",
                            e.to_string(),
                        )),
                    }
                }
                games
            }
            None => {
                let mut candidates = self.store.settlement_candidates().await?;
                candidates.truncate(self.max_games_per_run);
                candidates
            }
        };

        let mut stats = RunStats {
            processed: results.len(),
            errored: results.len(),
            ..RunStats::default()
        };

        for game in games {
            stats.processed += 1;
            let entry = match self.settle_game(operator, &game).await {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(game = %game.id, error = %e, "settlement failed for game");
                    GameSettlement::errored(game.id, game.label(), &game.result_score, e.to_string())
                }
            };

            match entry.status {
                GameRunStatus::Settled => {
                    stats.settled += 1;
                    stats.total_staked += entry.total_staked;
                    stats.total_payout += entry.total_payout;
                }
                GameRunStatus::Skipped => stats.skipped += 1,
                GameRunStatus::Errored => stats.errored += 1,
            }
            results.push(entry);
        }

        stats.total_profit = stats.total_staked - stats.total_payout;
        info!(
            processed = stats.processed,
            settled = stats.settled,
            skipped = stats.skipped,
            errored = stats.errored,
            profit = stats.total_profit,
            "settlement run finished"
        );
        self.audit
            .record(AuditEvent {
                actor: operator,
                action: "settlement_run",
                target: format!("{} games", stats.processed),
                before: None,
                after: serde_json::to_value(&stats).ok(),
                at: self.clock.now(),
            })
            .await;

        Ok(SettlementReport { stats, results })
    }

    /// Settle a single game. Errors bubble to the caller, which records
    /// them as that game's result entry.
    async fn settle_game(&self, operator: ActorId, game: &Game) -> Result<GameSettlement> {
        if game.settled_at.is_some() {
            return Ok(GameSettlement::skipped(game));
        }
        if game.status != GameStatus::Finished || !game.is_verified {
            return Err(Error::validation(format!(
                "game {} is not finished and verified",
                game.id
            )));
        }

        // An indeterminate score must not consume the one-shot settled_at
        // transition; the game stays open for manual handling.
        let score: ScoreLine = game.result_score.parse().map_err(|_| {
            Error::validation(format!(
                "result score '{}' is not a parsable H:A line",
                game.result_score
            ))
        })?;
        let outcome = score.outcome();

        let now = self.clock.now();
        if !self.store.claim_game(game.id, operator, now).await? {
            return Ok(GameSettlement::skipped(game));
        }

        let items = self
            .store
            .wager_items_for_game(game.id, &[ItemStatus::Pending, ItemStatus::Approved])
            .await?;

        let mut entry = GameSettlement::bare(
            game.id,
            game.label(),
            &game.result_score,
            GameRunStatus::Settled,
            None,
        );
        entry.outcome = Some(outcome);

        for item in items {
            let order = self.store.order(item.order_id).await?;
            let details = item.wager.clone();
            if details.is_none() {
                // A wager row without captured details cannot name a
                // winner; it settles as lost.
                warn!(item = %item.id, "wager item without details, treating as lost");
            }
            let odds = WagerDetails::normalize_odds(details.as_ref().map(|d| d.odds));
            let selection = details.map(|d| d.selection);
            let stake = item.amount;
            entry.total_staked += stake;

            let won = selection.map(|s| s.wins(score)).unwrap_or(false);
            let payout = if won {
                (stake as f64 * odds).round() as Points
            } else {
                0
            };

            let status = if won { ItemStatus::Won } else { ItemStatus::Lost };
            if won {
                self.store
                    .adjust_balance(order.member_id, PointCategory::Wager, payout)
                    .await?;
                self.store
                    .update_item_status(item.id, ItemStatus::Won, Some(now))
                    .await?;
                entry.total_payout += payout;
                entry.win_count += 1;

                self.notifier
                    .wager_won(WinNotification {
                        member_id: order.member_id,
                        game_id: game.id,
                        game_label: game.label(),
                        item_id: item.id,
                        odds,
                        payout,
                        at: now,
                    })
                    .await;
            } else {
                self.store
                    .update_item_status(item.id, ItemStatus::Lost, Some(now))
                    .await?;
                entry.lose_count += 1;
            }

            self.audit
                .record(AuditEvent {
                    actor: operator,
                    action: "wager_settle",
                    target: item.id.to_string(),
                    before: serde_json::to_value(&item).ok(),
                    after: serde_json::json!({
                        "status": status,
                        "payout": payout,
                    })
                    .into(),
                    at: now,
                })
                .await;

            entry.items.push(ItemSettlement {
                item_id: item.id,
                member_id: order.member_id,
                selection,
                odds,
                stake,
                status,
                payout,
            });
        }

        entry.profit = entry.total_staked - entry.total_payout;
        entry.profit_rate = if entry.total_staked > 0 {
            (entry.profit as f64 / entry.total_staked as f64) * 100.0
        } else {
            0.0
        };

        info!(
            game = %game.id,
            outcome = %outcome,
            wins = entry.win_count,
            losses = entry.lose_count,
            payout = entry.total_payout,
            "game settled"
        );
        self.audit
            .record(AuditEvent {
                actor: operator,
                action: "game_settle",
                target: game.id.to_string(),
                before: serde_json::to_value(game).ok(),
                after: serde_json::json!({
                    "settled_at": now,
                    "outcome": outcome,
                    "total_staked": entry.total_staked,
                    "total_payout": entry.total_payout,
                })
                .into(),
                at: now,
            })
            .await;

        Ok(entry)
    }
}
