//! Leaderboard queries over persisted high scores. Read-only.
//!
//! A player's rank is one plus the number of players with a strictly greater high
//! score. Equal scores therefore share a rank and the next rank is skipped
//! (`300, 100, 100, 50` ranks as `1, 2, 2, 4`).

use std::sync::Arc;

use crate::storage::{GameStore, LedgerError, PlayerId, PlayerSummary};

pub struct RankingService {
    store: Arc<GameStore>,
}

impl RankingService {
    pub fn new(store: Arc<GameStore>) -> Self {
        Self { store }
    }

    /// Rank of `id`, or `None` when the player does not exist.
    pub fn rank(&self, id: PlayerId) -> Result<Option<u64>, LedgerError> {
        let Some(player) = self.store.get_player(id)? else {
            return Ok(None);
        };
        let above = self.store.count_high_scores_above(player.high_score)?;
        Ok(Some(above as u64 + 1))
    }

    /// Players with a positive high score, best first, at most `limit` rows.
    /// Order between equal scores is not specified.
    pub fn leaderboard(&self, limit: usize) -> Result<Vec<PlayerSummary>, LedgerError> {
        Ok(self
            .store
            .top_players(limit)?
            .iter()
            .map(PlayerSummary::from)
            .collect())
    }
}
