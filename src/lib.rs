//! # PerkUP Runner - game backend for a chat mini-app
//!
//! The server behind an endless-runner game launched inside a chat client. The client
//! reports finished runs; the server decides whether to believe them and keeps the
//! economy honest.
//!
//! ## Features
//!
//! - **Launch data verification**: HMAC-SHA256 signatures over the client's `initData`,
//!   constant-time comparison, 24 hour freshness window.
//! - **Plausibility checks**: score-per-second, distance-per-score and multiplier bounds
//!   applied before any result is settled.
//! - **Atomic economy**: run settlement and item purchases are single sled transactions;
//!   concurrent purchases of the same item debit exactly once.
//! - **Leaderboards**: rank and top-N over an ordered high-score index.
//! - **Audit trail**: every balance change is appended to a per-player ledger.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use perkup_runner::config::Config;
//! use perkup_runner::http::{router, AppState};
//! use perkup_runner::storage::GameStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let store = Arc::new(GameStore::open(&config.storage.data_dir)?);
//!     let app = router(AppState::new(&config, store)?, &config.server.cors_allowed_origins);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`auth`] - launch data parsing, signing and verification
//! - [`anticheat`] - plausibility bounds for reported runs
//! - [`economy`] - registration, settlement, purchases, item catalog
//! - [`ranking`] - rank and leaderboard queries
//! - [`storage`] - sled-backed persistence and transactions
//! - [`http`] - axum routes and the authentication middleware
//! - [`config`] - configuration management and validation
//! - [`validation`] - input validation for client-supplied identifiers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   HTTP (axum)   │ ← auth middleware, JSON handlers
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ Economy/Ranking │ ← anticheat gate, transactional ledger
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   Storage       │ ← sled trees
//! └─────────────────┘
//! ```

pub mod anticheat;
pub mod auth;
pub mod config;
pub mod economy;
pub mod http;
pub mod logutil;
pub mod metrics;
pub mod ranking;
pub mod storage;
pub mod validation;
