//! Route handlers. Thin: parse, authorize, call the ledger or ranking service, shape JSON.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ApiError, ApiJson, ApiQuery, AppState};
use crate::anticheat::RunSummary;
use crate::auth::{AuthOutcome, PlatformUser};
use crate::storage::{OwnedItems, PlayerId, PlayerRecord, SessionReport};
use crate::validation::{optional_item_id, parse_item_kind, validate_item_id};

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 500;
const RECENT_SESSIONS: usize = 10;

// ============ Request/response shapes ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    #[serde(default, alias = "identityClaim")]
    pub telegram_user: Option<PlatformUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub score: u64,
    #[serde(default)]
    pub coins: u64,
    #[serde(default)]
    pub beans: u64,
    #[serde(default = "default_multiplier")]
    pub max_multiplier: u32,
    pub duration: u32,
    /// Distance travelled; clients that do not track it report the score.
    #[serde(default)]
    pub distance: Option<u64>,
    #[serde(default)]
    pub character: Option<String>,
    #[serde(default)]
    pub skin: Option<String>,
}

fn default_multiplier() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default, alias = "character")]
    pub selected_character: Option<String>,
    #[serde(default, alias = "skin")]
    pub selected_skin: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub item_type: String,
    pub item_id: String,
    /// Price shown to the client. Only compared against the catalog for logging.
    #[serde(default)]
    pub price: Option<i64>,
}

/// `?limit=` kept as text: anything that is not a positive integer means the default.
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<String>,
}

impl LimitQuery {
    fn resolve(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .min(MAX_LIST_LIMIT)
    }
}

/// Player record with ownership (and optionally rank) folded in.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView<'a> {
    #[serde(flatten)]
    pub player: &'a PlayerRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<u64>,
    pub owned_characters: &'a [String],
    pub owned_skins: &'a [String],
}

impl<'a> ProfileView<'a> {
    fn new(player: &'a PlayerRecord, items: &'a OwnedItems, rank: Option<u64>) -> Self {
        Self {
            player,
            rank,
            owned_characters: &items.characters,
            owned_skins: &items.skins,
        }
    }
}

// ============ Helpers ============

fn parse_player_id(raw: &str) -> Result<PlayerId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("Invalid player id".to_string()))
}

/// A verified caller may only act on their own player.
fn ensure_same_player(outcome: &AuthOutcome, player_id: PlayerId) -> Result<(), ApiError> {
    match outcome.claim() {
        Some(claim) if claim.platform_id() != player_id => {
            warn!(
                target: "security",
                "auth: player {} attempted to act on player {}",
                claim.platform_id(),
                player_id
            );
            Err(ApiError::Forbidden)
        }
        _ => Ok(()),
    }
}

// ============ Handlers ============

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "OK",
        "timestamp": Utc::now().to_rfc3339(),
        "environment": state.environment.as_str(),
        "metrics": state.metrics.snapshot(),
    }))
}

pub async fn auth_telegram(
    State(state): State<AppState>,
    Extension(outcome): Extension<AuthOutcome>,
    ApiJson(req): ApiJson<AuthRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // The body is only trusted when verification was bypassed.
    let user = match outcome.claim() {
        Some(claim) => {
            if let Some(body) = &req.telegram_user {
                if body.id != claim.platform_id() {
                    debug!(
                        "auth: body user {} ignored in favour of verified {}",
                        body.id,
                        claim.platform_id()
                    );
                }
            }
            claim.user.clone()
        }
        None => req
            .telegram_user
            .ok_or_else(|| ApiError::BadRequest("Invalid Telegram user data".to_string()))?,
    };
    if user.id == 0 {
        return Err(ApiError::BadRequest("Invalid Telegram user data".to_string()));
    }

    let registration = state.ledger.register(&user)?;
    Ok(Json(json!({
        "success": true,
        "user": ProfileView::new(&registration.player, &registration.items, None),
    })))
}

pub async fn submit_game(
    State(state): State<AppState>,
    Extension(outcome): Extension<AuthOutcome>,
    Path(player_id): Path<String>,
    ApiJson(req): ApiJson<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let player_id = parse_player_id(&player_id)?;
    ensure_same_player(&outcome, player_id)?;
    state.ledger.player(player_id)?;

    let character = optional_item_id("character", req.character.as_deref())?;
    let skin = optional_item_id("skin", req.skin.as_deref())?;
    let distance = req.distance.unwrap_or(req.score);
    // A run always has at least the base multiplier.
    let max_multiplier = req.max_multiplier.max(1);

    let run = RunSummary {
        score: req.score,
        distance,
        duration_seconds: req.duration,
        max_multiplier,
    };
    if let Err(rejection) = state.checker.check(&run) {
        state.metrics.inc_run_rejected(rejection);
        warn!(
            target: "security",
            "anticheat: player {} run rejected ({}): score={} distance={} duration={}s multiplier={}",
            player_id,
            rejection.code(),
            run.score,
            run.distance,
            run.duration_seconds,
            run.max_multiplier
        );
        return Err(ApiError::InvalidResult(rejection));
    }

    let report = SessionReport {
        score: req.score,
        coins_collected: req.coins,
        beans_collected: req.beans,
        distance,
        max_multiplier,
        duration_seconds: req.duration,
        character,
        skin,
    };
    let settled = state.ledger.record_session(player_id, &report)?;
    Ok(Json(json!({
        "success": true,
        "session": settled.session,
        "user": settled.player,
        "isNewRecord": settled.is_new_record,
    })))
}

pub async fn player_stats(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let player_id = parse_player_id(&player_id)?;
    state.ledger.player(player_id)?;
    let stats = state.ledger.session_stats(player_id)?;
    let recent = state.ledger.recent_sessions(player_id, RECENT_SESSIONS)?;
    Ok(Json(json!({"stats": stats, "recentSessions": recent})))
}

pub async fn top_games(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let games = state.ledger.top_sessions(query.resolve())?;
    Ok(Json(json!({"topGames": games})))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let player_id = parse_player_id(&player_id)?;
    let player = state.ledger.player(player_id)?;
    let items = state.ledger.owned_items(player_id)?;
    let rank = state.ranking.rank(player_id)?;
    Ok(Json(json!({"user": ProfileView::new(&player, &items, rank)})))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(outcome): Extension<AuthOutcome>,
    Path(player_id): Path<String>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let player_id = parse_player_id(&player_id)?;
    ensure_same_player(&outcome, player_id)?;
    let character = optional_item_id("selectedCharacter", req.selected_character.as_deref())?;
    let skin = optional_item_id("selectedSkin", req.selected_skin.as_deref())?;

    let player = state
        .ledger
        .select_loadout(player_id, character.as_deref(), skin.as_deref())?;
    Ok(Json(json!({"user": player})))
}

pub async fn purchase_item(
    State(state): State<AppState>,
    Extension(outcome): Extension<AuthOutcome>,
    Path(player_id): Path<String>,
    ApiJson(req): ApiJson<PurchaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let player_id = parse_player_id(&player_id)?;
    ensure_same_player(&outcome, player_id)?;
    let kind = parse_item_kind(&req.item_type)?;
    let item_id = req.item_id.trim();
    validate_item_id("itemId", item_id)?;

    if let (Some(claimed), Some(actual)) = (req.price, state.ledger.catalog().price(kind, item_id)) {
        if i64::try_from(actual).ok() != Some(claimed) {
            warn!(
                target: "security",
                "economy: player {} sent price {} for {}:{} (catalog {})",
                player_id,
                claimed,
                kind.as_str(),
                item_id,
                actual
            );
        }
    }

    let receipt = state.ledger.purchase(player_id, kind, item_id)?;
    Ok(Json(json!({
        "success": true,
        "user": receipt.player,
        "message": "Item purchased successfully",
    })))
}

pub async fn leaderboard(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.ranking.leaderboard(query.resolve())?;
    Ok(Json(json!({"leaderboard": rows})))
}
