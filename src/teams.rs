//! Team name normalization for wager capture
//!
//! Bets arrive as free text ("Bears win", "3:1", "draw"). Resolving that
//! text against a game's team names needs a lookup table of name variants,
//! and that table goes stale as leagues rename and the upstream feed
//! changes spelling. The cache below makes that staleness explicit: it is
//! driven by an injected clock, expires after a configurable TTL, and can
//! be invalidated on demand, so tests control time instead of waiting on
//! wall-clock timers.

use crate::common::traits::Clock;
use crate::common::types::{Game, ScoreLine, Selection};
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Seed aliases that survive invalidation. Maps a lowercase variant to the
/// canonical token used in matching.
static BUILTIN_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("home team", "home"),
        ("home win", "home"),
        ("away team", "away"),
        ("away win", "away"),
        ("visitors", "away"),
        ("tie", "draw"),
        ("tied", "draw"),
        ("even", "draw"),
    ])
});

struct CacheState {
    aliases: HashMap<String, String>,
    refreshed_at: DateTime<Utc>,
}

/// Clock-driven alias table with TTL expiry and explicit invalidation.
pub struct TeamAliasCache {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    state: RwLock<CacheState>,
}

impl TeamAliasCache {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        let refreshed_at = clock.now();
        Self {
            clock,
            ttl,
            state: RwLock::new(CacheState {
                aliases: Self::builtin(),
                refreshed_at,
            }),
        }
    }

    fn builtin() -> HashMap<String, String> {
        BUILTIN_ALIASES
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Register a runtime alias (e.g. a feed's spelling of a team name).
    /// Runtime aliases expire with the TTL; builtin seeds do not.
    pub fn insert_alias(&self, alias: &str, canonical: &str) {
        let mut state = self.state.write().expect("alias cache poisoned");
        state
            .aliases
            .insert(alias.trim().to_lowercase(), canonical.trim().to_lowercase());
    }

    /// Drop runtime aliases immediately and restart the TTL window.
    pub fn invalidate(&self) {
        let mut state = self.state.write().expect("alias cache poisoned");
        state.aliases = Self::builtin();
        state.refreshed_at = self.clock.now();
    }

    pub fn is_stale(&self) -> bool {
        let state = self.state.read().expect("alias cache poisoned");
        self.clock.now() - state.refreshed_at > self.ttl
    }

    /// Lowercase `raw` and map it through the alias table. Expired runtime
    /// aliases are dropped before the lookup.
    pub fn canonical(&self, raw: &str) -> String {
        if self.is_stale() {
            self.invalidate();
        }

        let lowered = raw.trim().to_lowercase();
        let state = self.state.read().expect("alias cache poisoned");
        state.aliases.get(&lowered).cloned().unwrap_or(lowered)
    }
}

/// Resolve free-text bet wording into a typed selection for `game`.
///
/// Tried in order: exact "H:A" score, outcome tokens (home/away/draw),
/// then containment of either team's canonical name. Returns None when
/// nothing matches; callers treat that as a validation failure.
pub fn resolve_selection(text: &str, game: &Game, aliases: &TeamAliasCache) -> Option<Selection> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(score) = trimmed.parse::<ScoreLine>() {
        return Some(Selection::Exact {
            home: score.home,
            away: score.away,
        });
    }

    let canonical = aliases.canonical(trimmed);
    if canonical.contains("draw") {
        return Some(Selection::Draw);
    }
    if canonical.contains("home") {
        return Some(Selection::Home);
    }
    if canonical.contains("away") {
        return Some(Selection::Away);
    }

    let home_team = aliases.canonical(&game.home_team);
    if !home_team.is_empty() && canonical.contains(&home_team) {
        return Some(Selection::Home);
    }
    let away_team = aliases.canonical(&game.away_team);
    if !away_team.is_empty() && canonical.contains(&away_team) {
        return Some(Selection::Away);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::GameStatus;
    use crate::services::ManualClock;
    use uuid::Uuid;

    fn game(home: &str, away: &str) -> Game {
        Game {
            id: Uuid::new_v4(),
            league: "KBO".to_string(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            result_score: String::new(),
            status: GameStatus::Scheduled,
            is_verified: false,
            game_date: Utc::now(),
            settled_at: None,
            settled_by: None,
        }
    }

    fn cache(clock: Arc<ManualClock>) -> TeamAliasCache {
        TeamAliasCache::new(clock, Duration::hours(1))
    }

    #[test]
    fn test_resolve_exact_score() {
        let aliases = cache(Arc::new(ManualClock::default()));
        let g = game("Bears", "Giants");
        assert_eq!(
            resolve_selection("3:1", &g, &aliases),
            Some(Selection::Exact { home: 3, away: 1 })
        );
    }

    #[test]
    fn test_resolve_outcome_tokens() {
        let aliases = cache(Arc::new(ManualClock::default()));
        let g = game("Bears", "Giants");
        assert_eq!(resolve_selection("Home win", &g, &aliases), Some(Selection::Home));
        assert_eq!(resolve_selection("visitors", &g, &aliases), Some(Selection::Away));
        assert_eq!(resolve_selection("tie", &g, &aliases), Some(Selection::Draw));
        assert_eq!(resolve_selection("Bears", &g, &aliases), Some(Selection::Home));
        assert_eq!(resolve_selection("giants", &g, &aliases), Some(Selection::Away));
        assert_eq!(resolve_selection("coin flip", &g, &aliases), None);
        assert_eq!(resolve_selection("", &g, &aliases), None);
    }

    #[test]
    fn test_runtime_alias_resolves_team() {
        let aliases = cache(Arc::new(ManualClock::default()));
        let g = game("Bears", "Giants");

        assert_eq!(resolve_selection("doosan", &g, &aliases), None);
        aliases.insert_alias("doosan", "bears");
        assert_eq!(resolve_selection("doosan", &g, &aliases), Some(Selection::Home));
    }

    #[test]
    fn test_ttl_expiry_is_clock_driven() {
        let clock = Arc::new(ManualClock::default());
        let aliases = cache(clock.clone());
        aliases.insert_alias("doosan", "bears");

        assert!(!aliases.is_stale());
        clock.advance(Duration::hours(2));
        assert!(aliases.is_stale());

        // Lookup after expiry drops the runtime alias.
        assert_eq!(aliases.canonical("doosan"), "doosan");
        assert!(!aliases.is_stale());
    }

    #[test]
    fn test_invalidate_drops_runtime_aliases() {
        let aliases = cache(Arc::new(ManualClock::default()));
        aliases.insert_alias("doosan", "bears");
        aliases.invalidate();
        assert_eq!(aliases.canonical("doosan"), "doosan");
        // Builtin seeds survive.
        assert_eq!(aliases.canonical("tie"), "draw");
    }
}
