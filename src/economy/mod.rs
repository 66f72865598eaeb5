//! # Economy Ledger
//!
//! Owns every balance-affecting operation on a player:
//!
//! - **registration** on first verified contact, with the free default loadout;
//! - **settlement** of a completed run into the cumulative stats and coin balance;
//! - **purchase** of a catalog item as one atomic debit + grant + audit entry.
//!
//! Each operation is a single [`GameStore::transaction`], so a failure at any step
//! (including a concurrent request that granted the same item first) leaves no partial
//! state behind. Results of runs must already have passed the plausibility checker;
//! settlement itself does not second-guess them.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, info};

use crate::auth::PlatformUser;
use crate::logutil::escape_log;
use crate::metrics::EconomyMetrics;
use crate::storage::{
    abort, EntryKind, GameSession, GameStore, ItemKind, LedgerEntry, LedgerError, OwnedItem,
    OwnedItems, PlayerId, PlayerRecord, SessionReport, SessionStats, TopSession,
    DEFAULT_ITEM_ID,
};

pub mod catalog;

pub use catalog::ItemCatalog;

/// Outcome of [`EconomyLedger::register`].
#[derive(Debug, Clone)]
pub struct Registration {
    pub player: PlayerRecord,
    pub items: OwnedItems,
    pub created: bool,
}

/// Outcome of [`EconomyLedger::record_session`].
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session: GameSession,
    pub player: PlayerRecord,
    /// The run beat the high score held before this settlement.
    pub is_new_record: bool,
}

/// Outcome of a committed purchase.
#[derive(Debug, Clone)]
pub struct PurchaseReceipt {
    pub player: PlayerRecord,
    pub item: OwnedItem,
    pub entry: LedgerEntry,
}

pub struct EconomyLedger {
    store: Arc<GameStore>,
    catalog: ItemCatalog,
    metrics: Arc<EconomyMetrics>,
}

impl EconomyLedger {
    pub fn new(store: Arc<GameStore>, catalog: ItemCatalog, metrics: Arc<EconomyMetrics>) -> Self {
        Self {
            store,
            catalog,
            metrics,
        }
    }

    pub fn catalog(&self) -> &ItemCatalog {
        &self.catalog
    }

    /// Create the player on first contact, otherwise refresh their display metadata.
    pub fn register(&self, user: &PlatformUser) -> Result<Registration, LedgerError> {
        let (player, created) = self.store.transaction(|txn| {
            match txn.get_player(user.id)? {
                Some(mut player) => {
                    player.refresh_profile(user);
                    player.last_played_at = Some(Utc::now());
                    player.touch();
                    txn.put_player(&player)?;
                    Ok((player, false))
                }
                None => {
                    let player = PlayerRecord::new(user);
                    txn.put_player(&player)?;
                    txn.grant_item(user.id, ItemKind::Character, DEFAULT_ITEM_ID)?;
                    txn.grant_item(user.id, ItemKind::Skin, DEFAULT_ITEM_ID)?;
                    Ok((player, true))
                }
            }
        })?;

        if created {
            self.metrics.inc_players_created();
            info!(
                "economy: created player {} ({})",
                player.platform_id,
                escape_log(&user.display_name())
            );
        }
        let items = self.store.owned_items(player.platform_id)?;
        Ok(Registration {
            player,
            items,
            created,
        })
    }

    pub fn player(&self, id: PlayerId) -> Result<PlayerRecord, LedgerError> {
        self.store.get_player(id)?.ok_or(LedgerError::PlayerNotFound(id))
    }

    pub fn owned_items(&self, id: PlayerId) -> Result<OwnedItems, LedgerError> {
        self.store.owned_items(id)
    }

    /// Settle a completed run: persist it and fold it into the player's totals.
    ///
    /// Counters are advanced inside the transaction from the committed record, so two
    /// runs settled concurrently for the same player both land.
    pub fn record_session(&self, id: PlayerId, report: &SessionReport) -> Result<SessionOutcome, LedgerError> {
        let outcome = self.store.transaction(|txn| {
            let mut player = txn.require_player(id)?;
            let previous_high = player.high_score;
            let session = txn.insert_session(id, report)?;

            player.games_played = player.games_played.saturating_add(1);
            player.total_distance = player.total_distance.saturating_add(report.distance);
            player.total_coins = player.total_coins.saturating_add(report.coins_collected);
            player.total_beans = player.total_beans.saturating_add(report.beans_collected);
            player.high_score = player.high_score.max(report.score);

            if let Some(character) = &report.character {
                if txn.owns_item(id, ItemKind::Character, character)? {
                    player.selected_character = character.clone();
                }
            }
            if let Some(skin) = &report.skin {
                if txn.owns_item(id, ItemKind::Skin, skin)? {
                    player.selected_skin = skin.clone();
                }
            }

            let now = Utc::now();
            player.last_played_at = Some(now);
            player.updated_at = now;
            txn.put_player(&player)?;

            if report.coins_collected > 0 {
                let delta = i64::try_from(report.coins_collected).unwrap_or(i64::MAX);
                txn.append_entry(
                    id,
                    EntryKind::SessionReward,
                    delta,
                    format!("Run reward: {} coins", report.coins_collected),
                )?;
            }

            Ok(SessionOutcome {
                session,
                player,
                is_new_record: report.score > previous_high,
            })
        })?;

        self.metrics.inc_runs_recorded();
        debug!(
            "economy: player {} run {} score={} coins={} new_record={}",
            id, outcome.session.id, report.score, report.coins_collected, outcome.is_new_record
        );
        Ok(outcome)
    }

    /// Buy a catalog item at its catalog price.
    pub fn purchase(&self, id: PlayerId, kind: ItemKind, item_id: &str) -> Result<PurchaseReceipt, LedgerError> {
        let price = self
            .catalog
            .price(kind, item_id)
            .ok_or_else(|| LedgerError::UnknownItem {
                kind,
                item_id: item_id.to_string(),
            });
        let result = price.and_then(|price| self.purchase_at_price(id, kind, item_id, price));
        match &result {
            Ok(_) => self.metrics.inc_purchases_committed(),
            Err(e) if e.is_economy_refusal() => self.metrics.inc_purchases_refused(),
            Err(_) => {}
        }
        result
    }

    /// The atomic purchase unit: check balance, check ownership, debit, grant, audit.
    ///
    /// `price` must come from trusted data. The ownership key is checked again by
    /// [`grant_item`](crate::storage::LedgerTxn::grant_item) inside the same
    /// transaction, so two racing purchases cannot both grant or both debit.
    pub fn purchase_at_price(
        &self,
        id: PlayerId,
        kind: ItemKind,
        item_id: &str,
        price: u64,
    ) -> Result<PurchaseReceipt, LedgerError> {
        let delta = i64::try_from(price)
            .map_err(|_| LedgerError::Internal(format!("price {} out of range", price)))?;

        let receipt = self.store.transaction(|txn| {
            let mut player = txn.require_player(id)?;
            if player.total_coins < price {
                return Err(abort(LedgerError::InsufficientFunds {
                    balance: player.total_coins,
                    price,
                }));
            }
            if txn.owns_item(id, kind, item_id)? {
                return Err(abort(LedgerError::AlreadyOwned {
                    kind,
                    item_id: item_id.to_string(),
                }));
            }

            player.total_coins -= price;
            player.touch();
            txn.put_player(&player)?;
            let item = txn.grant_item(id, kind, item_id)?;
            let entry = txn.append_entry(
                id,
                EntryKind::Purchase,
                -delta,
                format!("Purchased {}: {}", kind.as_str(), item_id),
            )?;
            Ok(PurchaseReceipt {
                player,
                item,
                entry,
            })
        })?;

        info!(
            "economy: player {} bought {}:{} for {} coins (balance {})",
            id,
            kind.as_str(),
            item_id,
            price,
            receipt.player.total_coins
        );
        Ok(receipt)
    }

    /// Change the selected character and/or skin. Only owned items can be selected.
    pub fn select_loadout(
        &self,
        id: PlayerId,
        character: Option<&str>,
        skin: Option<&str>,
    ) -> Result<PlayerRecord, LedgerError> {
        self.store.transaction(|txn| {
            let mut player = txn.require_player(id)?;
            for (kind, choice) in [(ItemKind::Character, character), (ItemKind::Skin, skin)] {
                let Some(item_id) = choice else { continue };
                if !txn.owns_item(id, kind, item_id)? {
                    return Err(abort(LedgerError::NotOwned {
                        kind,
                        item_id: item_id.to_string(),
                    }));
                }
                match kind {
                    ItemKind::Character => player.selected_character = item_id.to_string(),
                    ItemKind::Skin => player.selected_skin = item_id.to_string(),
                }
            }
            player.touch();
            txn.put_player(&player)?;
            Ok(player)
        })
    }

    pub fn session_stats(&self, id: PlayerId) -> Result<SessionStats, LedgerError> {
        self.store.session_stats(id)
    }

    pub fn recent_sessions(&self, id: PlayerId, limit: usize) -> Result<Vec<GameSession>, LedgerError> {
        self.store.sessions_for(id, limit)
    }

    pub fn ledger_entries(&self, id: PlayerId, limit: usize) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.store.ledger_entries(id, limit)
    }

    /// Best runs across all players with the runner's name attached.
    pub fn top_sessions(&self, limit: usize) -> Result<Vec<TopSession>, LedgerError> {
        let sessions = self.store.top_sessions(limit)?;
        let mut out = Vec::with_capacity(sessions.len());
        for session in sessions {
            let (username, first_name) = match self.store.get_player(session.platform_id)? {
                Some(p) => (p.username, p.first_name),
                None => (None, String::new()),
            };
            out.push(TopSession {
                session,
                username,
                first_name,
            });
        }
        Ok(out)
    }
}
