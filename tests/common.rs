//! Test utilities & fixtures shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use perkup_runner::auth::PlatformUser;
use perkup_runner::config::CatalogConfig;
use perkup_runner::economy::{EconomyLedger, ItemCatalog};
use perkup_runner::metrics::EconomyMetrics;
use perkup_runner::storage::{GameStore, GameStoreBuilder, PlayerId};
use tempfile::TempDir;

/// A ledger over a fresh store. Keep the fixture alive for the duration of the test;
/// dropping it removes the data directory.
pub struct Fixture {
    pub dir: TempDir,
    pub store: Arc<GameStore>,
    pub ledger: Arc<EconomyLedger>,
    pub metrics: Arc<EconomyMetrics>,
}

pub fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(
        GameStoreBuilder::new(dir.path())
            .without_flush()
            .open()
            .expect("open store"),
    );
    let metrics = Arc::new(EconomyMetrics::default());
    let catalog = ItemCatalog::from_config(&CatalogConfig::default());
    let ledger = Arc::new(EconomyLedger::new(store.clone(), catalog, metrics.clone()));
    Fixture {
        dir,
        store,
        ledger,
        metrics,
    }
}

pub fn user(id: PlayerId, first_name: &str) -> PlatformUser {
    PlatformUser {
        id,
        first_name: first_name.to_string(),
        username: Some(first_name.to_lowercase()),
        ..Default::default()
    }
}

/// Overwrite a player's coin balance directly.
pub fn set_balance(store: &GameStore, id: PlayerId, coins: u64) {
    store
        .transaction(|txn| {
            let mut player = txn.require_player(id)?;
            player.total_coins = coins;
            txn.put_player(&player)
        })
        .expect("set balance");
}
