//! Pointdesk - Points Ledger & Wager Settlement Service
//!
//! Back-office core for a membership points economy: members hold
//! segregated general and wager balances, staff-created orders freeze
//! funds through pending ledger holds, an approval gateway turns holds
//! into balance changes, and a settlement engine resolves finished,
//! verified games into payouts exactly once per game.

pub mod api;
pub mod common;
pub mod errors;
pub mod ledger;
pub mod orders;
pub mod services;
pub mod settlement;
pub mod storage;
pub mod teams;

pub use common::config::AppConfig;
pub use common::types::{
    EntryKind, EntryStatus, Game, GameStatus, ItemCategory, ItemStatus, LedgerEntry, Member,
    Order, OrderItem, Outcome, PointCategory, Points, ScoreLine, Selection, WagerDetails,
};
pub use errors::{Error, Result};
