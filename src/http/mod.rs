//! JSON API served to the mini-app client.
//!
//! Every `/api/*` route except `/api/health` sits behind [`require_launch_data`], which
//! checks the `X-Telegram-Init-Data` header and stores the [`AuthOutcome`] in the request
//! extensions for the handlers.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use log::warn;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::anticheat::PlausibilityChecker;
use crate::auth::{AuthError, AuthOutcome, RequestAuthenticator};
use crate::config::{Config, Environment};
use crate::economy::{EconomyLedger, ItemCatalog};
use crate::logutil::{escape_log, redact_init_data};
use crate::metrics::EconomyMetrics;
use crate::ranking::RankingService;
use crate::storage::GameStore;

pub mod error;
pub mod handlers;

pub use error::{ApiError, ApiJson, ApiQuery};

/// Header carrying the signed launch parameters.
pub const INIT_DATA_HEADER: &str = "x-telegram-init-data";

#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<RequestAuthenticator>,
    pub ledger: Arc<EconomyLedger>,
    pub ranking: Arc<RankingService>,
    pub checker: Arc<PlausibilityChecker>,
    pub metrics: Arc<EconomyMetrics>,
    pub environment: Environment,
}

impl AppState {
    /// Wire the services for `config` on top of an open store.
    pub fn new(config: &Config, store: Arc<GameStore>) -> Result<Self, AuthError> {
        let environment = config.server.environment;
        let metrics = Arc::new(EconomyMetrics::default());
        let authenticator = RequestAuthenticator::from_config(&config.telegram, environment)?;
        let catalog = ItemCatalog::from_config(&config.catalog);
        Ok(Self {
            authenticator: Arc::new(authenticator),
            ledger: Arc::new(EconomyLedger::new(store.clone(), catalog, metrics.clone())),
            ranking: Arc::new(RankingService::new(store)),
            checker: Arc::new(PlausibilityChecker::new(config.anticheat.clone())),
            metrics,
            environment,
        })
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("http: ignoring invalid CORS origin {:?}", o);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    use handlers::*;

    let api = Router::new()
        .route("/api/auth/telegram", post(auth_telegram))
        .route("/api/game/top", get(top_games))
        .route("/api/game/:player_id/submit", post(submit_game))
        .route("/api/game/:player_id/stats", get(player_stats))
        .route("/api/users/leaderboard/top", get(leaderboard))
        .route("/api/users/:player_id", get(get_profile).put(update_profile))
        .route("/api/users/:player_id/purchase", post(purchase_item))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_launch_data));

    let mut app = Router::new().merge(api).route("/api/health", get(health));
    if !state.environment.is_production() {
        app = app.layer(middleware::from_fn(error::expose_internal_details));
    }
    app.layer(cors_layer(cors_origins)).with_state(state)
}

/// Authenticate the caller before any handler runs.
pub async fn require_launch_data(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let raw = req
        .headers()
        .get(INIT_DATA_HEADER)
        .map(|v| v.to_str().map(str::to_owned));

    let now = Utc::now().timestamp();
    // A header that is present but not visible ASCII is malformed, never absent.
    let result = match &raw {
        Some(Err(_)) => Err(AuthError::MalformedEncoding(
            "launch data header is not visible ASCII".to_string(),
        )),
        Some(Ok(data)) => state.authenticator.authenticate(Some(data.as_str()), now),
        None => state.authenticator.authenticate(None, now),
    };

    match result {
        Ok(outcome) => {
            if outcome == AuthOutcome::Bypassed {
                state.metrics.inc_auth_bypassed();
            }
            req.extensions_mut().insert(outcome);
            Ok(next.run(req).await)
        }
        Err(e) => {
            state.metrics.inc_auth_rejected();
            warn!(
                target: "security",
                "auth: rejected {} {}: {} [{}]",
                req.method(),
                escape_log(req.uri().path()),
                e,
                raw.as_ref()
                    .and_then(|r| r.as_deref().ok())
                    .map(redact_init_data)
                    .unwrap_or_default()
            );
            Err(ApiError::Unauthorized(e))
        }
    }
}
