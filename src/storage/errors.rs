use thiserror::Error;

use super::types::{ItemKind, PlayerId};

/// Errors raised by the store and by the economy operations built on it.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("player not found: {0}")]
    PlayerNotFound(PlayerId),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    #[error("insufficient funds: balance {balance}, price {price}")]
    InsufficientFunds { balance: u64, price: u64 },

    #[error("item already owned: {}:{item_id}", .kind.as_str())]
    AlreadyOwned { kind: ItemKind, item_id: String },

    /// Item is not in the catalog.
    #[error("unknown item: {}:{item_id}", .kind.as_str())]
    UnknownItem { kind: ItemKind, item_id: String },

    /// Loadout selection refers to an item the player does not own.
    #[error("item not owned: {}:{item_id}", .kind.as_str())]
    NotOwned { kind: ItemKind, item_id: String },

    /// Broken internal invariant, such as a price that does not fit a ledger delta
    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Economy refusals are reported to the caller verbatim; everything else is a server fault.
    pub fn is_economy_refusal(&self) -> bool {
        matches!(
            self,
            LedgerError::InsufficientFunds { .. }
                | LedgerError::AlreadyOwned { .. }
                | LedgerError::UnknownItem { .. }
                | LedgerError::NotOwned { .. }
        )
    }
}
