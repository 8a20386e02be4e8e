//! Request Handlers
//!
//! Endpoint handlers mapping the HTTP surface onto the core services.

use super::{errors::ApiError, middleware::RequestId, models::*, monitoring::MetricsRegistry};
use crate::common::traits::{AuditEvent, AuditSink, Clock};
use crate::common::types::{Game, GameId, GameStatus, Member};
use crate::errors::Error;
use crate::ledger::{ApprovalGateway, EntryRequest, Ledger};
use crate::orders::{NewOrderItem, OrderWorkflow};
use crate::settlement::{CandidateGame, SettlementEngine, SettlementReport};
use crate::storage::Store;
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub ledger: Arc<Ledger>,
    pub approvals: Arc<ApprovalGateway>,
    pub orders: Arc<OrderWorkflow>,
    pub settlement: Arc<SettlementEngine>,
    pub audit: Arc<dyn AuditSink>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<MetricsRegistry>,
    pub version: String,
}

impl AppState {
    fn fail(&self, request_id: &RequestId, error: Error) -> ApiError {
        self.metrics.record_error();
        ApiError::from_domain(request_id.0.clone(), error)
    }
}

/// Health check handler - minimal response time
/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        service: "pointdesk".to_string(),
        version: state.version.clone(),
    })
}

/// Create an order with its items and ledger holds
/// POST /orders
pub async fn create_order_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, ApiError> {
    state.metrics.record_request();

    let items: Vec<NewOrderItem> = body
        .items
        .into_iter()
        .map(|item| NewOrderItem {
            category: item.category,
            description: item.description,
            amount: item.amount,
            game_id: item.game_id,
            selection: item.selection,
            odds: item.odds,
        })
        .collect();

    let receipt = state
        .orders
        .create_order(body.member_id, items, body.requested_by)
        .await
        .map_err(|e| {
            state
                .metrics
                .orders_rejected_total
                .fetch_add(1, Ordering::SeqCst);
            state.fail(&request_id, e)
        })?;

    state
        .metrics
        .orders_created_total
        .fetch_add(1, Ordering::SeqCst);
    Ok(Json(CreateOrderResponse {
        order_id: receipt.order_id,
        ticket_no: receipt.ticket_no,
    }))
}

/// Request a manual ledger entry (charge/use/refund/exchange)
/// POST /ledger/entries
pub async fn create_entry_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateEntryRequest>,
) -> Result<Json<CreateEntryResponse>, ApiError> {
    state.metrics.record_request();

    let entry_id = state
        .ledger
        .request_entry(EntryRequest {
            member_id: body.member_id,
            category: body.category,
            kind: body.kind,
            amount: body.amount,
            reason: body.reason,
            requested_by: body.requested_by,
        })
        .await
        .map_err(|e| state.fail(&request_id, e))?;

    state
        .metrics
        .entries_requested_total
        .fetch_add(1, Ordering::SeqCst);
    Ok(Json(CreateEntryResponse { entry_id }))
}

/// Approve a pending ledger entry, applying its amount to the balance
/// POST /ledger/entries/:id/approve
pub async fn approve_entry_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<Uuid>,
    Json(body): Json<ApproveEntryRequest>,
) -> Result<Json<EntryView>, ApiError> {
    state.metrics.record_request();

    let entry = state
        .approvals
        .approve(entry_id, body.approver_id)
        .await
        .map_err(|e| state.fail(&request_id, e))?;

    state
        .metrics
        .entries_approved_total
        .fetch_add(1, Ordering::SeqCst);
    Ok(Json(entry.into()))
}

/// Reject a pending ledger entry; never mutates the balance
/// POST /ledger/entries/:id/reject
pub async fn reject_entry_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<Uuid>,
    Json(body): Json<RejectEntryRequest>,
) -> Result<Json<EntryView>, ApiError> {
    state.metrics.record_request();

    let entry = state
        .approvals
        .reject(entry_id, body.approver_id, body.reason)
        .await
        .map_err(|e| state.fail(&request_id, e))?;

    state
        .metrics
        .entries_rejected_total
        .fetch_add(1, Ordering::SeqCst);
    Ok(Json(entry.into()))
}

/// Reverse an approved ledger entry with an offsetting entry
/// POST /ledger/entries/:id/reverse
pub async fn reverse_entry_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<Uuid>,
    Json(body): Json<ReverseEntryRequest>,
) -> Result<Json<ReverseEntryResponse>, ApiError> {
    state.metrics.record_request();

    let offset_entry_id = state
        .approvals
        .reverse(entry_id, body.operator_id, body.reason)
        .await
        .map_err(|e| state.fail(&request_id, e))?;

    state
        .metrics
        .entries_reversed_total
        .fetch_add(1, Ordering::SeqCst);
    Ok(Json(ReverseEntryResponse { offset_entry_id }))
}

#[derive(Debug, Serialize)]
pub struct CandidatesResponse {
    pub games: Vec<CandidateGame>,
    pub count: usize,
}

/// Unsettled, verified, finished games with open-wager counts
/// GET /settlement/candidates
pub async fn settlement_candidates_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<CandidatesResponse>, ApiError> {
    state.metrics.record_request();

    let games = state
        .settlement
        .candidates()
        .await
        .map_err(|e| state.fail(&request_id, e))?;

    let count = games.len();
    Ok(Json(CandidatesResponse { games, count }))
}

/// Run settlement over the given games, or every candidate
/// POST /settlement/run
pub async fn run_settlement_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<RunSettlementRequest>,
) -> Result<Json<SettlementReport>, ApiError> {
    state.metrics.record_request();

    let report = state
        .settlement
        .run(body.operator_id, body.game_ids)
        .await
        .map_err(|e| state.fail(&request_id, e))?;

    state
        .metrics
        .record_settlement_run(report.stats.settled, report.stats.total_payout);
    Ok(Json(report))
}

/// Upsert a game row from the external schedule feed. Settlement fields
/// are never writable through this interface.
/// PUT /games
pub async fn upsert_game_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<UpsertGameRequest>,
) -> Result<Json<UpsertGameResponse>, ApiError> {
    state.metrics.record_request();

    if body.home_team.trim().is_empty() || body.away_team.trim().is_empty() {
        return Err(state.fail(
            &request_id,
            Error::validation("home_team and away_team must not be empty"),
        ));
    }

    let game = match body.id {
        Some(id) => match state.store.game(id).await {
            Ok(mut existing) => {
                existing.league = body.league;
                existing.home_team = body.home_team;
                existing.away_team = body.away_team;
                existing.game_date = body.game_date;
                if let Some(status) = body.status {
                    existing.status = status;
                }
                existing
            }
            Err(Error::NotFound { .. }) => new_game(Some(id), body),
            Err(e) => return Err(state.fail(&request_id, e)),
        },
        None => new_game(None, body),
    };
    let game_id = game.id;

    state
        .store
        .upsert_game(game)
        .await
        .map_err(|e| state.fail(&request_id, e))?;

    Ok(Json(UpsertGameResponse { game_id }))
}

fn new_game(id: Option<GameId>, body: UpsertGameRequest) -> Game {
    Game {
        id: id.unwrap_or_else(Uuid::new_v4),
        league: body.league,
        home_team: body.home_team,
        away_team: body.away_team,
        result_score: String::new(),
        status: body.status.unwrap_or(GameStatus::Scheduled),
        is_verified: false,
        game_date: body.game_date,
        settled_at: None,
        settled_by: None,
    }
}

/// Record a game's result and verification flag from the data source
/// POST /games/:id/result
pub async fn game_result_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<Uuid>,
    Json(body): Json<GameResultRequest>,
) -> Result<Json<GameView>, ApiError> {
    state.metrics.record_request();

    let mut game = state
        .store
        .game(game_id)
        .await
        .map_err(|e| state.fail(&request_id, e))?;

    // Results are frozen once the settlement engine has claimed the game.
    if game.settled_at.is_some() {
        return Err(state.fail(&request_id, Error::AlreadySettled(game_id)));
    }

    let before = serde_json::to_value(&game).ok();
    game.result_score = body.result_score;
    game.status = body.status;
    game.is_verified = body.is_verified;

    state
        .store
        .upsert_game(game.clone())
        .await
        .map_err(|e| state.fail(&request_id, e))?;

    state
        .audit
        .record(AuditEvent {
            actor: Uuid::nil(),
            action: "game_result",
            target: game_id.to_string(),
            before,
            after: serde_json::to_value(&game).ok(),
            at: state.clock.now(),
        })
        .await;

    Ok(Json(game.into()))
}

/// Onboard a member
/// POST /members
pub async fn create_member_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateMemberRequest>,
) -> Result<Json<MemberView>, ApiError> {
    state.metrics.record_request();

    if body.name.trim().is_empty() {
        return Err(state.fail(
            &request_id,
            Error::validation("member name must not be empty"),
        ));
    }

    let member = Member::new(body.name, state.clock.now());
    state
        .store
        .insert_member(member.clone())
        .await
        .map_err(|e| state.fail(&request_id, e))?;

    Ok(Json(member.into()))
}

/// Member lookup with balances
/// GET /members/:id
pub async fn get_member_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<Uuid>,
) -> Result<Json<MemberView>, ApiError> {
    state.metrics.record_request();

    let member = state
        .store
        .member(member_id)
        .await
        .map_err(|e| state.fail(&request_id, e))?;

    Ok(Json(member.into()))
}
