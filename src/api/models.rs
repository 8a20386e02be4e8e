//! API Request & Response Models
//!
//! All wire types for the API endpoints.

use crate::common::types::{
    ActorId, EntryId, EntryKind, EntryStatus, Game, GameId, GameStatus, ItemCategory,
    LedgerEntry, Member, MemberId, OrderId, PointCategory, Points,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// POST /orders request body
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub member_id: MemberId,
    pub requested_by: ActorId,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemRequest {
    pub category: ItemCategory,
    pub description: String,
    pub amount: Points,
    #[serde(default)]
    pub game_id: Option<GameId>,
    /// Free-text pick, resolved to a typed selection at creation.
    #[serde(default)]
    pub selection: Option<String>,
    #[serde(default)]
    pub odds: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderResponse {
    pub order_id: OrderId,
    pub ticket_no: String,
}

/// POST /ledger/entries request body
#[derive(Debug, Clone, Deserialize)]
pub struct CreateEntryRequest {
    pub member_id: MemberId,
    pub category: PointCategory,
    pub kind: EntryKind,
    /// Magnitude; the sign is derived from `kind` server-side.
    pub amount: Points,
    pub reason: String,
    pub requested_by: ActorId,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateEntryResponse {
    pub entry_id: EntryId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApproveEntryRequest {
    pub approver_id: ActorId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RejectEntryRequest {
    pub approver_id: ActorId,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReverseEntryRequest {
    pub operator_id: ActorId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReverseEntryResponse {
    pub offset_entry_id: EntryId,
}

/// Ledger entry as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct EntryView {
    pub id: EntryId,
    pub member_id: MemberId,
    pub category: PointCategory,
    pub kind: EntryKind,
    pub amount: Points,
    pub status: EntryStatus,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<ActorId>,
    pub is_reversed: bool,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for EntryView {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id,
            member_id: entry.member_id,
            category: entry.category,
            kind: entry.kind,
            amount: entry.amount,
            status: entry.status,
            reason: entry.reason,
            approved_by: entry.approved_by,
            is_reversed: entry.is_reversed,
            created_at: entry.created_at,
        }
    }
}

/// POST /settlement/run request body
#[derive(Debug, Clone, Deserialize)]
pub struct RunSettlementRequest {
    pub operator_id: ActorId,
    #[serde(default)]
    pub game_ids: Option<Vec<GameId>>,
}

/// PUT /games request body (game data source interface)
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertGameRequest {
    #[serde(default)]
    pub id: Option<GameId>,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub game_date: DateTime<Utc>,
    #[serde(default)]
    pub status: Option<GameStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertGameResponse {
    pub game_id: GameId,
}

/// POST /games/{id}/result request body
#[derive(Debug, Clone, Deserialize)]
pub struct GameResultRequest {
    pub result_score: String,
    pub status: GameStatus,
    pub is_verified: bool,
}

/// Game as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct GameView {
    pub id: GameId,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub result_score: String,
    pub status: GameStatus,
    pub is_verified: bool,
    pub game_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
}

impl From<Game> for GameView {
    fn from(game: Game) -> Self {
        Self {
            id: game.id,
            league: game.league,
            home_team: game.home_team,
            away_team: game.away_team,
            result_score: game.result_score,
            status: game.status,
            is_verified: game.is_verified,
            game_date: game.game_date,
            settled_at: game.settled_at,
        }
    }
}

/// POST /members request body
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMemberRequest {
    pub name: String,
}

/// Member with both balances.
#[derive(Debug, Clone, Serialize)]
pub struct MemberView {
    pub id: MemberId,
    pub name: String,
    pub general_balance: Points,
    pub wager_balance: Points,
    pub created_at: DateTime<Utc>,
}

impl From<Member> for MemberView {
    fn from(member: Member) -> Self {
        Self {
            id: member.id,
            name: member.name,
            general_balance: member.general_balance,
            wager_balance: member.wager_balance,
            created_at: member.created_at,
        }
    }
}
