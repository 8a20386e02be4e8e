//! Shared type definitions for the pointdesk service
//!
//! This module provides canonical types used throughout the system,
//! ensuring consistency and preventing duplication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Point amounts are whole points; negative values represent point debt.
pub type Points = i64;

pub type MemberId = Uuid;
pub type EntryId = Uuid;
pub type OrderId = Uuid;
pub type ItemId = Uuid;
pub type GameId = Uuid;
/// Staff/operator account performing an action.
pub type ActorId = Uuid;

/// The two segregated point balances a member holds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PointCategory {
    General,
    Wager,
}

impl fmt::Display for PointCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointCategory::General => write!(f, "general"),
            PointCategory::Wager => write!(f, "wager"),
        }
    }
}

/// Ledger entry kinds. The sign of the stored amount is derived from the
/// kind at creation time, never supplied by callers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Charge,
    Use,
    Refund,
    Exchange,
}

impl EntryKind {
    /// Normalize a caller-supplied magnitude into the signed amount stored
    /// on the entry: `use` deducts, everything else credits.
    pub fn signed_amount(&self, amount: Points) -> Points {
        let magnitude = amount.abs();
        match self {
            EntryKind::Use => -magnitude,
            EntryKind::Charge | EntryKind::Refund | EntryKind::Exchange => magnitude,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Charge => write!(f, "charge"),
            EntryKind::Use => write!(f, "use"),
            EntryKind::Refund => write!(f, "refund"),
            EntryKind::Exchange => write!(f, "exchange"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Approved,
    Rejected,
}

/// A single signed point movement with an approval lifecycle.
///
/// Terminal entries (approved/rejected) are immutable apart from the
/// reversal bookkeeping fields, which transition at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub member_id: MemberId,
    pub category: PointCategory,
    pub kind: EntryKind,
    /// Signed amount; negative for deductions.
    pub amount: Points,
    pub status: EntryStatus,
    pub reason: String,
    pub requested_by: ActorId,
    pub approved_by: Option<ActorId>,
    pub is_reversed: bool,
    pub reversed_by: Option<ActorId>,
    pub reversed_at: Option<DateTime<Utc>>,
    pub reversal_reason: Option<String>,
    /// The offsetting entry created when this one was reversed.
    pub offset_entry_id: Option<EntryId>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn pending(
        member_id: MemberId,
        category: PointCategory,
        kind: EntryKind,
        amount: Points,
        reason: String,
        requested_by: ActorId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            member_id,
            category,
            kind,
            amount: kind.signed_amount(amount),
            status: EntryStatus::Pending,
            reason,
            requested_by,
            approved_by: None,
            is_reversed: false,
            reversed_by: None,
            reversed_at: None,
            reversal_reason: None,
            offset_entry_id: None,
            created_at,
        }
    }
}

/// A member of the points economy with two segregated balances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub general_balance: Points,
    pub wager_balance: Points,
    pub created_at: DateTime<Utc>,
}

impl Member {
    pub fn new(name: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            general_balance: 0,
            wager_balance: 0,
            created_at,
        }
    }

    pub fn balance(&self, category: PointCategory) -> Points {
        match category {
            PointCategory::General => self.general_balance,
            PointCategory::Wager => self.wager_balance,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Draft,
    Processing,
    Processed,
    Closed,
}

/// A staff-created multi-item order ("ticket").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Human-readable ticket number, date prefix plus random suffix.
    /// Uniqueness is best-effort only.
    pub ticket_no: String,
    pub member_id: MemberId,
    pub total_amount: Points,
    pub status: OrderStatus,
    pub created_by: ActorId,
    pub created_at: DateTime<Utc>,
}

/// Item categories. `game` marks wager items; everything else spends from
/// the general balance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemCategory {
    Book,
    Game,
    Goods,
    Inquiry,
    Complaint,
    Other,
}

impl ItemCategory {
    pub fn is_wager(&self) -> bool {
        matches!(self, ItemCategory::Game)
    }

    /// Which balance this category spends from.
    pub fn point_category(&self) -> PointCategory {
        if self.is_wager() {
            PointCategory::Wager
        } else {
            PointCategory::General
        }
    }
}

impl fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemCategory::Book => write!(f, "book"),
            ItemCategory::Game => write!(f, "game"),
            ItemCategory::Goods => write!(f, "goods"),
            ItemCategory::Inquiry => write!(f, "inquiry"),
            ItemCategory::Complaint => write!(f, "complaint"),
            ItemCategory::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Approved,
    Won,
    Lost,
}

/// A wager's selection, captured as a typed value when the order is
/// created so settlement never has to interpret free text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "pick", rename_all = "lowercase")]
pub enum Selection {
    Home,
    Away,
    Draw,
    Exact { home: u32, away: u32 },
}

impl Selection {
    /// Whether this selection wins against the given final score.
    ///
    /// `Exact` wins on exact score equality; the three outcome picks win
    /// when the resolved outcome matches.
    pub fn wins(&self, score: ScoreLine) -> bool {
        match self {
            Selection::Home => score.outcome() == Outcome::Home,
            Selection::Away => score.outcome() == Outcome::Away,
            Selection::Draw => score.outcome() == Outcome::Draw,
            Selection::Exact { home, away } => *home == score.home && *away == score.away,
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Home => write!(f, "home"),
            Selection::Away => write!(f, "away"),
            Selection::Draw => write!(f, "draw"),
            Selection::Exact { home, away } => write!(f, "{}:{}", home, away),
        }
    }
}

/// Wager bookkeeping carried on a `game` item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WagerDetails {
    pub selection: Selection,
    /// Decimal odds, always >= 1.0.
    pub odds: f64,
}

impl WagerDetails {
    /// Clamp caller-supplied odds to a usable decimal: absent or malformed
    /// values fall back to 1.0 (stake returned, no winnings).
    pub fn normalize_odds(odds: Option<f64>) -> f64 {
        odds.filter(|o| o.is_finite() && *o >= 1.0).unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: ItemId,
    pub order_id: OrderId,
    pub category: ItemCategory,
    pub description: String,
    pub amount: Points,
    pub status: ItemStatus,
    pub game_id: Option<GameId>,
    pub wager: Option<WagerDetails>,
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Scheduled,
    Live,
    Finished,
    Postponed,
    Cancelled,
}

/// A third-party sporting event as supplied by the game data source.
///
/// `settled_at`/`settled_by` are owned by the settlement engine and
/// transition away from null at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    /// "H:A" score line, empty until a result is recorded.
    pub result_score: String,
    pub status: GameStatus,
    pub is_verified: bool,
    pub game_date: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    pub settled_by: Option<ActorId>,
}

impl Game {
    pub fn label(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }

    /// A game is eligible for settlement once it is finished, externally
    /// verified, and not yet claimed by a settlement run.
    pub fn is_settleable(&self) -> bool {
        self.status == GameStatus::Finished && self.is_verified && self.settled_at.is_none()
    }
}

/// Resolved result of a game.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Home,
    Away,
    Draw,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Home => write!(f, "home"),
            Outcome::Away => write!(f, "away"),
            Outcome::Draw => write!(f, "draw"),
        }
    }
}

/// A parsed "H:A" score line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreLine {
    pub home: u32,
    pub away: u32,
}

impl ScoreLine {
    pub fn outcome(&self) -> Outcome {
        if self.home > self.away {
            Outcome::Home
        } else if self.away > self.home {
            Outcome::Away
        } else {
            Outcome::Draw
        }
    }
}

impl FromStr for ScoreLine {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (home, away) = s.split_once(':').ok_or(())?;
        Ok(ScoreLine {
            home: home.trim().parse().map_err(|_| ())?,
            away: away.trim().parse().map_err(|_| ())?,
        })
    }
}

impl fmt::Display for ScoreLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.home, self.away)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_normalization() {
        assert_eq!(EntryKind::Charge.signed_amount(300), 300);
        assert_eq!(EntryKind::Refund.signed_amount(-300), 300);
        assert_eq!(EntryKind::Exchange.signed_amount(300), 300);
        assert_eq!(EntryKind::Use.signed_amount(300), -300);
        assert_eq!(EntryKind::Use.signed_amount(-300), -300);
    }

    #[test]
    fn test_score_line_parsing() {
        assert_eq!("3:1".parse::<ScoreLine>(), Ok(ScoreLine { home: 3, away: 1 }));
        assert_eq!(" 0 : 0 ".parse::<ScoreLine>(), Ok(ScoreLine { home: 0, away: 0 }));
        assert!("".parse::<ScoreLine>().is_err());
        assert!("3-1".parse::<ScoreLine>().is_err());
        assert!("a:b".parse::<ScoreLine>().is_err());
    }

    #[test]
    fn test_outcome_resolution() {
        assert_eq!(ScoreLine { home: 3, away: 1 }.outcome(), Outcome::Home);
        assert_eq!(ScoreLine { home: 1, away: 2 }.outcome(), Outcome::Away);
        assert_eq!(ScoreLine { home: 0, away: 0 }.outcome(), Outcome::Draw);
    }

    #[test]
    fn test_selection_wins() {
        let score = ScoreLine { home: 3, away: 1 };
        assert!(Selection::Home.wins(score));
        assert!(!Selection::Away.wins(score));
        assert!(Selection::Exact { home: 3, away: 1 }.wins(score));
        assert!(!Selection::Exact { home: 1, away: 3 }.wins(score));
        assert!(Selection::Draw.wins(ScoreLine { home: 0, away: 0 }));
    }

    #[test]
    fn test_odds_normalization() {
        assert_eq!(WagerDetails::normalize_odds(Some(2.5)), 2.5);
        assert_eq!(WagerDetails::normalize_odds(Some(0.4)), 1.0);
        assert_eq!(WagerDetails::normalize_odds(Some(f64::NAN)), 1.0);
        assert_eq!(WagerDetails::normalize_odds(None), 1.0);
    }

    #[test]
    fn test_item_category_partitioning() {
        assert_eq!(ItemCategory::Book.point_category(), PointCategory::General);
        assert_eq!(ItemCategory::Game.point_category(), PointCategory::Wager);
        assert!(!ItemCategory::Goods.is_wager());
    }
}
