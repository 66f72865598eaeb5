//! # Storage Module
//!
//! Sled-backed persistence for players, completed runs, owned items and the coin
//! ledger. Records are bincode encoded; keys are big-endian so prefix scans come back
//! in id order.
//!
//! ## Trees
//!
//! | tree          | key                                   | value           |
//! |---------------|---------------------------------------|-----------------|
//! | `players`     | `player_id`                           | [`PlayerRecord`]|
//! | `sessions`    | `player_id ++ session_id`             | [`GameSession`] |
//! | `items`       | `player_id ++ kind tag ++ item_id`    | [`OwnedItem`]   |
//! | `ledger`      | `player_id ++ entry_id`               | [`LedgerEntry`] |
//! | `high_scores` | `high_score ++ player_id`             | empty           |
//! | `session_scores` | `score ++ player_id ++ session_id` | empty           |
//!
//! The `items` key space makes `(player, kind, item)` unique: a second grant of the same
//! item finds the existing key inside the same serializable transaction and is refused.
//!
//! ## Transactions
//!
//! Every mutation goes through [`GameStore::transaction`], which runs a closure over a
//! [`LedgerTxn`] spanning all trees. Returning `Err` from the closure aborts the whole
//! unit; sled re-runs the closure when a concurrent writer touched the same keys, so
//! counters are always advanced from the committed value.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{IVec, Transactional};

pub mod errors;
pub mod types;

pub use errors::LedgerError;
pub use types::*;

const TREE_PLAYERS: &str = "players";
const TREE_SESSIONS: &str = "sessions";
const TREE_ITEMS: &str = "items";
const TREE_LEDGER: &str = "ledger";
const TREE_HIGH_SCORES: &str = "high_scores";
const TREE_SESSION_SCORES: &str = "session_scores";

/// Result type for code running inside [`GameStore::transaction`].
pub type TxnResult<T> = Result<T, ConflictableTransactionError<LedgerError>>;

/// Abort the surrounding transaction with `err`; nothing written so far becomes visible.
pub fn abort(err: LedgerError) -> ConflictableTransactionError<LedgerError> {
    ConflictableTransactionError::Abort(err)
}

fn player_key(id: PlayerId) -> [u8; 8] {
    id.to_be_bytes()
}

fn child_key(id: PlayerId, child: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&id.to_be_bytes());
    key.extend_from_slice(&child.to_be_bytes());
    key
}

fn item_key(id: PlayerId, kind: ItemKind, item_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(9 + item_id.len());
    key.extend_from_slice(&id.to_be_bytes());
    key.push(kind.tag());
    key.extend_from_slice(item_id.as_bytes());
    key
}

fn score_key(score: u64, id: PlayerId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&score.to_be_bytes());
    key[8..].copy_from_slice(&id.to_be_bytes());
    key
}

fn session_score_key(score: u64, id: PlayerId, session_id: u64) -> [u8; 24] {
    let mut key = [0u8; 24];
    key[..16].copy_from_slice(&score_key(score, id));
    key[16..].copy_from_slice(&session_id.to_be_bytes());
    key
}

/// `(player_id, session_id)` of a `session_scores` key.
fn session_from_score_key(key: &[u8]) -> Option<(PlayerId, u64)> {
    let player: [u8; 8] = key.get(8..16)?.try_into().ok()?;
    let session: [u8; 8] = key.get(16..24)?.try_into().ok()?;
    Some((PlayerId::from_be_bytes(player), u64::from_be_bytes(session)))
}

fn player_from_score_key(key: &[u8]) -> Option<PlayerId> {
    let bytes: [u8; 8] = key.get(8..16)?.try_into().ok()?;
    Some(PlayerId::from_be_bytes(bytes))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, LedgerError> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LedgerError> {
    Ok(bincode::deserialize::<T>(bytes)?)
}

fn decode_player(bytes: &[u8]) -> Result<PlayerRecord, LedgerError> {
    let record: PlayerRecord = decode(bytes)?;
    if record.schema_version != PLAYER_SCHEMA_VERSION {
        return Err(LedgerError::SchemaMismatch {
            entity: "player",
            expected: PLAYER_SCHEMA_VERSION,
            found: record.schema_version,
        });
    }
    Ok(record)
}

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct GameStoreBuilder {
    path: PathBuf,
    flush_on_commit: bool,
}

impl GameStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            flush_on_commit: true,
        }
    }

    /// Skip the fsync after each commit. Writes are still atomic, only durability on
    /// power loss is relaxed; useful for tests that hammer the store.
    pub fn without_flush(mut self) -> Self {
        self.flush_on_commit = false;
        self
    }

    pub fn open(self) -> Result<GameStore, LedgerError> {
        GameStore::open_with_options(self.path, self.flush_on_commit)
    }
}

/// Persistent state of the player economy.
pub struct GameStore {
    db: sled::Db,
    players: sled::Tree,
    sessions: sled::Tree,
    items: sled::Tree,
    ledger: sled::Tree,
    high_scores: sled::Tree,
    session_scores: sled::Tree,
    flush_on_commit: bool,
}

impl GameStore {
    /// Open (or create) the store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        Self::open_with_options(path, true)
    }

    fn open_with_options<P: AsRef<Path>>(path: P, flush_on_commit: bool) -> Result<Self, LedgerError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let store = Self {
            players: db.open_tree(TREE_PLAYERS)?,
            sessions: db.open_tree(TREE_SESSIONS)?,
            items: db.open_tree(TREE_ITEMS)?,
            ledger: db.open_tree(TREE_LEDGER)?,
            high_scores: db.open_tree(TREE_HIGH_SCORES)?,
            session_scores: db.open_tree(TREE_SESSION_SCORES)?,
            db,
            flush_on_commit,
        };
        store.backfill_session_scores()?;
        Ok(store)
    }

    /// Build the `session_scores` index for data written before it existed.
    fn backfill_session_scores(&self) -> Result<(), LedgerError> {
        if !self.session_scores.is_empty() || self.sessions.is_empty() {
            return Ok(());
        }
        let mut batch = sled::Batch::default();
        let mut indexed = 0usize;
        for entry in self.sessions.iter() {
            let (_, value) = entry?;
            let session: GameSession = decode(&value)?;
            batch.insert(
                &session_score_key(session.score, session.platform_id, session.id)[..],
                Vec::<u8>::new(),
            );
            indexed += 1;
        }
        self.session_scores.apply_batch(batch)?;
        log::info!("session_scores: indexed {} existing sessions", indexed);
        Ok(())
    }

    /// Run `f` as one all-or-nothing unit over every tree.
    ///
    /// `f` may be invoked more than once when it conflicts with a concurrent
    /// transaction, so it must not have side effects outside the [`LedgerTxn`].
    pub fn transaction<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        F: Fn(&LedgerTxn<'_>) -> TxnResult<T>,
    {
        let result = (
            &self.players,
            &self.sessions,
            &self.items,
            &self.ledger,
            &self.high_scores,
            &self.session_scores,
        )
            .transaction(|(players, sessions, items, ledger, high_scores, session_scores)| {
                let txn = LedgerTxn {
                    players,
                    sessions,
                    items,
                    ledger,
                    high_scores,
                    session_scores,
                };
                f(&txn)
            });

        match result {
            Ok(value) => {
                if self.flush_on_commit {
                    self.db.flush()?;
                }
                Ok(value)
            }
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => Err(LedgerError::Sled(err)),
        }
    }

    /// Fetch a player by platform id.
    pub fn get_player(&self, id: PlayerId) -> Result<Option<PlayerRecord>, LedgerError> {
        match self.players.get(player_key(id))? {
            Some(bytes) => Ok(Some(decode_player(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// All items a player owns, grouped by kind.
    pub fn owned_items(&self, id: PlayerId) -> Result<OwnedItems, LedgerError> {
        let mut owned = OwnedItems::default();
        for entry in self.items.scan_prefix(player_key(id)) {
            let (_, value) = entry?;
            let item: OwnedItem = decode(&value)?;
            match item.kind {
                ItemKind::Character => owned.characters.push(item.item_id),
                ItemKind::Skin => owned.skins.push(item.item_id),
            }
        }
        Ok(owned)
    }

    /// A player's runs, newest first.
    pub fn sessions_for(&self, id: PlayerId, limit: usize) -> Result<Vec<GameSession>, LedgerError> {
        Self::scan_newest(&self.sessions, id, limit)
    }

    /// A player's ledger entries, newest first.
    pub fn ledger_entries(&self, id: PlayerId, limit: usize) -> Result<Vec<LedgerEntry>, LedgerError> {
        Self::scan_newest(&self.ledger, id, limit)
    }

    fn scan_newest<T: DeserializeOwned>(
        tree: &sled::Tree,
        id: PlayerId,
        limit: usize,
    ) -> Result<Vec<T>, LedgerError> {
        tree.scan_prefix(player_key(id))
            .rev()
            .take(limit)
            .map(|entry| {
                entry
                    .map_err(LedgerError::from)
                    .and_then(|(_, value)| decode(&value))
            })
            .collect()
    }

    /// Aggregate statistics over every run of one player.
    pub fn session_stats(&self, id: PlayerId) -> Result<SessionStats, LedgerError> {
        let mut stats = SessionStats::default();
        for entry in self.sessions.scan_prefix(player_key(id)) {
            let (_, value) = entry?;
            let session: GameSession = decode(&value)?;
            stats.accumulate(&session);
        }
        Ok(stats)
    }

    /// Highest scoring individual runs across all players, read off the
    /// `session_scores` index so only `limit` sessions are decoded.
    pub fn top_sessions(&self, limit: usize) -> Result<Vec<GameSession>, LedgerError> {
        let mut out = Vec::with_capacity(limit.min(256));
        for entry in self.session_scores.iter().rev() {
            if out.len() >= limit {
                break;
            }
            let (key, _) = entry?;
            let Some((player, session_id)) = session_from_score_key(&key) else {
                log::warn!("session_scores: skipping malformed index key ({} bytes)", key.len());
                continue;
            };
            match self.sessions.get(child_key(player, session_id))? {
                Some(value) => out.push(decode::<GameSession>(&value)?),
                None => log::warn!(
                    "session_scores: index points at missing session {}/{}",
                    player,
                    session_id
                ),
            }
        }
        Ok(out)
    }

    /// Number of players whose high score is strictly greater than `score`.
    pub fn count_high_scores_above(&self, score: u64) -> Result<usize, LedgerError> {
        let Some(floor) = score.checked_add(1) else {
            return Ok(0);
        };
        let mut count = 0usize;
        for entry in self.high_scores.range(score_key(floor, 0)..) {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    /// Players with a positive high score, best first.
    pub fn top_players(&self, limit: usize) -> Result<Vec<PlayerRecord>, LedgerError> {
        let mut out = Vec::with_capacity(limit.min(256));
        for entry in self.high_scores.iter().rev() {
            if out.len() >= limit {
                break;
            }
            let (key, _) = entry?;
            let Some(id) = player_from_score_key(&key) else {
                log::warn!("high_scores: skipping malformed index key ({} bytes)", key.len());
                continue;
            };
            match self.get_player(id)? {
                Some(player) => out.push(player),
                None => log::warn!("high_scores: index points at missing player {}", id),
            }
        }
        Ok(out)
    }
}

/// View of every tree inside one serializable transaction.
pub struct LedgerTxn<'a> {
    players: &'a TransactionalTree,
    sessions: &'a TransactionalTree,
    items: &'a TransactionalTree,
    ledger: &'a TransactionalTree,
    high_scores: &'a TransactionalTree,
    session_scores: &'a TransactionalTree,
}

fn encode_txn<T: Serialize>(value: &T) -> TxnResult<Vec<u8>> {
    encode(value).map_err(abort)
}

fn decode_player_txn(bytes: &IVec) -> TxnResult<PlayerRecord> {
    decode_player(bytes).map_err(abort)
}

impl LedgerTxn<'_> {
    pub fn get_player(&self, id: PlayerId) -> TxnResult<Option<PlayerRecord>> {
        match self.players.get(player_key(id))? {
            Some(bytes) => Ok(Some(decode_player_txn(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Like [`get_player`](Self::get_player) but aborts with `PlayerNotFound`.
    pub fn require_player(&self, id: PlayerId) -> TxnResult<PlayerRecord> {
        self.get_player(id)?
            .ok_or_else(|| abort(LedgerError::PlayerNotFound(id)))
    }

    /// Write a player record and keep the high score index in step with it.
    pub fn put_player(&self, player: &PlayerRecord) -> TxnResult<()> {
        let key = player_key(player.platform_id);
        let previous_high = match self.players.get(key)? {
            Some(bytes) => decode_player_txn(&bytes)?.high_score,
            None => 0,
        };
        let mut record = player.clone();
        record.schema_version = PLAYER_SCHEMA_VERSION;
        self.players.insert(&key[..], encode_txn(&record)?)?;

        if previous_high != record.high_score {
            if previous_high > 0 {
                self.high_scores
                    .remove(&score_key(previous_high, record.platform_id)[..])?;
            }
            if record.high_score > 0 {
                self.high_scores
                    .insert(&score_key(record.high_score, record.platform_id)[..], Vec::<u8>::new())?;
            }
        }
        Ok(())
    }

    pub fn owns_item(&self, id: PlayerId, kind: ItemKind, item_id: &str) -> TxnResult<bool> {
        Ok(self.items.get(item_key(id, kind, item_id))?.is_some())
    }

    /// Record ownership of an item. Aborts with `AlreadyOwned` if the key exists.
    pub fn grant_item(&self, id: PlayerId, kind: ItemKind, item_id: &str) -> TxnResult<OwnedItem> {
        let key = item_key(id, kind, item_id);
        if self.items.get(&key)?.is_some() {
            return Err(abort(LedgerError::AlreadyOwned {
                kind,
                item_id: item_id.to_string(),
            }));
        }
        let item = OwnedItem {
            kind,
            item_id: item_id.to_string(),
            acquired_at: Utc::now(),
        };
        self.items.insert(key, encode_txn(&item)?)?;
        Ok(item)
    }

    /// Persist a completed run under a fresh id.
    pub fn insert_session(&self, id: PlayerId, report: &SessionReport) -> TxnResult<GameSession> {
        let session = GameSession {
            id: self.sessions.generate_id()?,
            platform_id: id,
            score: report.score,
            coins_collected: report.coins_collected,
            beans_collected: report.beans_collected,
            distance: report.distance,
            max_multiplier: report.max_multiplier,
            duration_seconds: report.duration_seconds,
            character_used: report.character.clone(),
            skin_used: report.skin.clone(),
            played_at: Utc::now(),
        };
        self.sessions
            .insert(child_key(id, session.id), encode_txn(&session)?)?;
        self.session_scores.insert(
            &session_score_key(session.score, id, session.id)[..],
            Vec::<u8>::new(),
        )?;
        Ok(session)
    }

    /// Append an audit entry. Entries are never rewritten.
    pub fn append_entry(
        &self,
        id: PlayerId,
        kind: EntryKind,
        delta: i64,
        description: String,
    ) -> TxnResult<LedgerEntry> {
        let entry = LedgerEntry {
            id: self.ledger.generate_id()?,
            platform_id: id,
            kind,
            delta,
            currency: Currency::Coins,
            description,
            occurred_at: Utc::now(),
        };
        self.ledger
            .insert(child_key(id, entry.id), encode_txn(&entry)?)?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PlatformUser;
    use tempfile::TempDir;

    fn user(id: PlayerId, name: &str) -> PlatformUser {
        PlatformUser {
            id,
            first_name: name.to_string(),
            ..PlatformUser::default()
        }
    }

    #[test]
    fn store_round_trip_player() {
        let dir = TempDir::new().expect("tempdir");
        let store = GameStoreBuilder::new(dir.path()).open().expect("store");
        let mut player = PlayerRecord::new(&user(7, "Alice"));
        player.total_coins = 42;
        store
            .transaction(|txn| txn.put_player(&player))
            .expect("put");
        let fetched = store.get_player(7).expect("get").expect("present");
        assert_eq!(fetched.first_name, "Alice");
        assert_eq!(fetched.total_coins, 42);
        assert_eq!(fetched.schema_version, PLAYER_SCHEMA_VERSION);
        assert!(store.get_player(8).expect("get").is_none());
    }

    #[test]
    fn aborted_transaction_leaves_no_trace() {
        let dir = TempDir::new().expect("tempdir");
        let store = GameStoreBuilder::new(dir.path()).open().expect("store");
        let player = PlayerRecord::new(&user(1, "Bob"));
        let result: Result<(), LedgerError> = store.transaction(|txn| {
            txn.put_player(&player)?;
            txn.grant_item(1, ItemKind::Skin, "gold")?;
            Err(abort(LedgerError::Internal("boom".into())))
        });
        assert!(matches!(result, Err(LedgerError::Internal(_))));
        assert!(store.get_player(1).expect("get").is_none());
        assert!(store.owned_items(1).expect("items").skins.is_empty());
    }

    #[test]
    fn granting_twice_is_refused() {
        let dir = TempDir::new().expect("tempdir");
        let store = GameStoreBuilder::new(dir.path()).open().expect("store");
        store
            .transaction(|txn| txn.grant_item(3, ItemKind::Character, "barista"))
            .expect("first grant");
        let second = store.transaction(|txn| txn.grant_item(3, ItemKind::Character, "barista"));
        assert!(matches!(second, Err(LedgerError::AlreadyOwned { .. })));
        let owned = store.owned_items(3).expect("items");
        assert_eq!(owned.characters, vec!["barista".to_string()]);
    }

    #[test]
    fn high_score_index_follows_player_updates() {
        let dir = TempDir::new().expect("tempdir");
        let store = GameStoreBuilder::new(dir.path()).open().expect("store");
        let mut player = PlayerRecord::new(&user(5, "Cy"));
        player.high_score = 10;
        store.transaction(|txn| txn.put_player(&player)).expect("put");
        player.high_score = 30;
        store.transaction(|txn| txn.put_player(&player)).expect("put");

        assert_eq!(store.count_high_scores_above(9).unwrap(), 1);
        assert_eq!(store.count_high_scores_above(10).unwrap(), 1);
        assert_eq!(store.count_high_scores_above(30).unwrap(), 0);
        assert_eq!(store.count_high_scores_above(u64::MAX).unwrap(), 0);
        let top = store.top_players(10).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].high_score, 30);
    }

    #[test]
    fn sessions_listed_newest_first() {
        let dir = TempDir::new().expect("tempdir");
        let store = GameStoreBuilder::new(dir.path()).without_flush().open().expect("store");
        for score in [10u64, 20, 30] {
            let report = SessionReport {
                score,
                distance: score,
                ..SessionReport::default()
            };
            store
                .transaction(|txn| txn.insert_session(9, &report))
                .expect("insert");
        }
        let recent = store.sessions_for(9, 2).unwrap();
        assert_eq!(recent.iter().map(|s| s.score).collect::<Vec<_>>(), vec![30, 20]);
        let stats = store.session_stats(9).unwrap();
        assert_eq!(stats.total_games, 3);
        assert_eq!(stats.best_score, 30);
        assert_eq!(stats.total_score, 60);
        assert!((stats.avg_score - 20.0).abs() < f64::EPSILON);
        assert!(store.sessions_for(10, 5).unwrap().is_empty());
    }

    #[test]
    fn top_sessions_come_from_score_index() {
        let dir = TempDir::new().expect("tempdir");
        let store = GameStoreBuilder::new(dir.path()).without_flush().open().expect("store");
        // Interleave players so key order in `sessions` differs from score order.
        for (player, score) in [(1u64, 50u64), (2, 300), (1, 700), (3, 5), (2, 120), (3, 700)] {
            let report = SessionReport {
                score,
                distance: score,
                ..SessionReport::default()
            };
            store
                .transaction(|txn| txn.insert_session(player, &report))
                .expect("insert");
        }

        let top = store.top_sessions(4).unwrap();
        assert_eq!(top.iter().map(|s| s.score).collect::<Vec<_>>(), vec![700, 700, 300, 120]);
        // Equal scores fall back to player id, highest first.
        assert_eq!(top[0].platform_id, 3);
        assert_eq!(top[1].platform_id, 1);
        assert_eq!(store.top_sessions(100).unwrap().len(), 6);
        assert!(store.top_sessions(0).unwrap().is_empty());
    }

    #[test]
    fn reopening_backfills_session_index() {
        let dir = TempDir::new().expect("tempdir");
        {
            let store = GameStoreBuilder::new(dir.path()).open().expect("store");
            for score in [15u64, 45] {
                let report = SessionReport {
                    score,
                    distance: score,
                    ..SessionReport::default()
                };
                store
                    .transaction(|txn| txn.insert_session(4, &report))
                    .expect("insert");
            }
            store.session_scores.clear().expect("clear index");
            store.db.flush().expect("flush");
        }
        let store = GameStoreBuilder::new(dir.path()).open().expect("reopen");
        let top = store.top_sessions(10).unwrap();
        assert_eq!(top.iter().map(|s| s.score).collect::<Vec<_>>(), vec![45, 15]);
    }
}
