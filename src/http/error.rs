//! Mapping of domain failures onto HTTP responses.
//!
//! Every error body carries `{"error": ...}`. Storage faults are logged here and
//! returned as an opaque 500; [`expose_internal_details`] adds the detail back for
//! non-production deployments.

use axum::{
    body::Body,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Request,
    },
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use log::error;
use serde_json::json;

use crate::anticheat::Rejection;
use crate::auth::AuthError;
use crate::storage::LedgerError;
use crate::validation::ValidationError;

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(AuthError),
    /// Verified caller acting on another player's resources.
    Forbidden,
    BadRequest(String),
    InvalidResult(Rejection),
    NotFound,
    Economy(LedgerError),
    Internal(String),
}

/// `Json` whose rejections render as [`ApiError`], so a malformed body gets the same
/// `{"error": ...}` 400 as every other client mistake.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

/// `Query` counterpart of [`ApiJson`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(format!("Invalid query string: {}", rejection.body_text()))
    }
}

/// Server-side detail of a 500, carried in the response extensions.
#[derive(Debug, Clone)]
pub struct InternalDetail(pub String);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::PlayerNotFound(_) => ApiError::NotFound,
            e if e.is_economy_refusal() => ApiError::Economy(e),
            e => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

fn economy_message(err: &LedgerError) -> &'static str {
    match err {
        LedgerError::InsufficientFunds { .. } => "Insufficient funds",
        LedgerError::AlreadyOwned { .. } => "Item already purchased",
        LedgerError::UnknownItem { .. } => "Unknown item",
        LedgerError::NotOwned { .. } => "Item not owned",
        _ => "Request refused",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(AuthError::NotConfigured) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": AuthError::NotConfigured.public_reason()})),
            )
                .into_response(),
            ApiError::Unauthorized(e) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Unauthorized", "reason": e.public_reason()})),
            )
                .into_response(),
            ApiError::Forbidden => {
                (StatusCode::FORBIDDEN, Json(json!({"error": "Forbidden"}))).into_response()
            }
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({"error": msg}))).into_response()
            }
            ApiError::InvalidResult(rejection) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Invalid game result",
                    "reason": rejection.to_string(),
                    "code": rejection.code(),
                })),
            )
                .into_response(),
            ApiError::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({"error": "User not found"}))).into_response()
            }
            ApiError::Economy(e) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": economy_message(&e)})),
            )
                .into_response(),
            ApiError::Internal(detail) => {
                error!("http: internal error: {}", detail);
                let mut res = (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "Internal server error"})),
                )
                    .into_response();
                res.extensions_mut().insert(InternalDetail(detail));
                res
            }
        }
    }
}

/// Development-only layer: copy the detail of a 500 into its body.
pub async fn expose_internal_details(req: Request, next: Next) -> Response {
    let res = next.run(req).await;
    let Some(InternalDetail(detail)) = res.extensions().get::<InternalDetail>().cloned() else {
        return res;
    };
    let (mut parts, _) = res.into_parts();
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    let body = json!({"error": "Internal server error", "details": detail});
    Response::from_parts(parts, Body::from(body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ItemKind;

    #[tokio::test]
    async fn malformed_json_body_is_a_json_400() {
        let req = axum::http::Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from("{\"score\": "))
            .unwrap();
        let Err(err) = ApiJson::<serde_json::Value>::from_request(req, &()).await else {
            panic!("truncated body accepted");
        };
        let res = err.into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
    }

    #[test]
    fn ledger_errors_map_to_status() {
        let not_found: ApiError = LedgerError::PlayerNotFound(7).into();
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);

        let refused: ApiError = LedgerError::InsufficientFunds {
            balance: 50,
            price: 100,
        }
        .into();
        assert_eq!(refused.into_response().status(), StatusCode::BAD_REQUEST);

        let internal: ApiError = LedgerError::Internal("boom".into()).into();
        let res = internal.into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(res.extensions().get::<InternalDetail>().is_some());
    }

    #[test]
    fn purchase_refusals_are_distinct() {
        let funds = LedgerError::InsufficientFunds { balance: 0, price: 1 };
        let owned = LedgerError::AlreadyOwned {
            kind: ItemKind::Skin,
            item_id: "gold".into(),
        };
        assert_eq!(economy_message(&funds), "Insufficient funds");
        assert_eq!(economy_message(&owned), "Item already purchased");
    }

    #[test]
    fn auth_failures_are_401_except_misconfiguration() {
        let res = ApiError::Unauthorized(AuthError::InvalidSignature).into_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let res = ApiError::Unauthorized(AuthError::NotConfigured).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
