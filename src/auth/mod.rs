//! Launch signature verification for requests coming from the chat platform's WebApp
//! container.
//!
//! The client forwards the container's `initData` string verbatim. It is a URL-encoded
//! parameter set carrying `auth_date`, a JSON `user` object, some platform extras and
//! a `hash`. The hash is `HMAC-SHA256(data_check_string, secret_key)` where
//!
//! - `data_check_string` is every other parameter as `key=value`, sorted by key and
//!   joined with `\n`, using the decoded values;
//! - `secret_key` is `HMAC-SHA256("<bot token>")` keyed with the literal `WebAppData`.
//!
//! [`RequestAuthenticator`] owns the derived key and the deployment mode. It is built
//! once from configuration and shared read-only between requests.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::config::{Environment, TelegramConfig};

type HmacSha256 = Hmac<Sha256>;

/// Key used to derive the per-bot secret from the bot token.
pub const WEB_APP_DATA_KEY: &[u8] = b"WebAppData";

/// Default freshness window for `auth_date`.
pub const DEFAULT_MAX_AGE_SECS: i64 = 86_400;

const HASH_FIELD: &str = "hash";
const AUTH_DATE_FIELD: &str = "auth_date";
const USER_FIELD: &str = "user";

/// User object as sent by the platform inside `initData` (and by the auth route body).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformUser {
    pub id: u64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
    #[serde(default)]
    pub is_premium: bool,
}

impl PlatformUser {
    pub fn display_name(&self) -> String {
        match (&self.username, &self.last_name) {
            (Some(username), _) if !username.is_empty() => format!("@{}", username),
            (_, Some(last)) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

/// Identity asserted by a request whose signature verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityClaim {
    pub user: PlatformUser,
    /// `auth_date` of the launch, seconds since the epoch.
    pub issued_at: i64,
}

impl IdentityClaim {
    pub fn platform_id(&self) -> u64 {
        self.user.id
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing launch signature")]
    MissingSignature,

    #[error("malformed parameter encoding: {0}")]
    MalformedEncoding(String),

    #[error("signature mismatch")]
    InvalidSignature,

    #[error("missing or invalid auth_date")]
    InvalidAuthDate,

    #[error("launch data expired ({age_secs}s old)")]
    Expired { age_secs: i64 },

    #[error("malformed user payload: {0}")]
    MalformedUser(String),

    /// A signature was presented but no bot token is configured to check it.
    #[error("bot token not configured")]
    NotConfigured,
}

impl AuthError {
    /// Reason safe to send back to the client. Deliberately coarse.
    pub fn public_reason(&self) -> &'static str {
        match self {
            AuthError::MissingSignature => "Missing Telegram data",
            AuthError::Expired { .. } => "Data expired",
            AuthError::NotConfigured => "Server configuration error",
            _ => "Validation failed",
        }
    }
}

/// Result of checking a request that may or may not carry launch data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Verified(IdentityClaim),
    /// No launch data and the deployment is not production.
    Bypassed,
}

impl AuthOutcome {
    pub fn claim(&self) -> Option<&IdentityClaim> {
        match self {
            AuthOutcome::Verified(claim) => Some(claim),
            AuthOutcome::Bypassed => None,
        }
    }
}

pub struct RequestAuthenticator {
    secret_key: Option<[u8; 32]>,
    environment: Environment,
    max_age_secs: i64,
}

impl std::fmt::Debug for RequestAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestAuthenticator")
            .field("configured", &self.secret_key.is_some())
            .field("environment", &self.environment)
            .field("max_age_secs", &self.max_age_secs)
            .finish()
    }
}

impl RequestAuthenticator {
    /// Build an authenticator for `bot_token`. An empty token leaves it unconfigured:
    /// every signed request then fails with [`AuthError::NotConfigured`].
    pub fn new(bot_token: &str, environment: Environment) -> Result<Self, AuthError> {
        let secret_key = if bot_token.is_empty() {
            None
        } else {
            Some(derive_secret_key(bot_token)?)
        };
        Ok(Self {
            secret_key,
            environment,
            max_age_secs: DEFAULT_MAX_AGE_SECS,
        })
    }

    pub fn from_config(telegram: &TelegramConfig, environment: Environment) -> Result<Self, AuthError> {
        Ok(Self::new(&telegram.bot_token, environment)?.with_max_age(telegram.max_auth_age_secs))
    }

    pub fn with_max_age(mut self, secs: i64) -> Self {
        self.max_age_secs = secs;
        self
    }

    /// Entry point for request middleware. A missing or blank header is only tolerated
    /// outside production.
    pub fn authenticate(&self, init_data: Option<&str>, now: i64) -> Result<AuthOutcome, AuthError> {
        match init_data.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => self.verify(raw, now).map(AuthOutcome::Verified),
            None if !self.environment.is_production() => Ok(AuthOutcome::Bypassed),
            None => Err(AuthError::MissingSignature),
        }
    }

    /// Verify a raw `initData` string and return the identity it carries.
    pub fn verify(&self, raw: &str, now: i64) -> Result<IdentityClaim, AuthError> {
        let secret_key = self.secret_key.ok_or(AuthError::NotConfigured)?;
        let mut pairs = parse_init_data(raw)?;

        let supplied_hash = pairs
            .iter()
            .find(|(k, _)| k == HASH_FIELD)
            .map(|(_, v)| v.clone())
            .ok_or(AuthError::MissingSignature)?;
        pairs.retain(|(k, _)| k != HASH_FIELD);

        let check_string = data_check_string(&pairs);
        verify_hash(&secret_key, &check_string, &supplied_hash)?;

        let auth_date: i64 = field(&pairs, AUTH_DATE_FIELD)
            .and_then(|v| v.parse().ok())
            .ok_or(AuthError::InvalidAuthDate)?;
        let age_secs = now.saturating_sub(auth_date);
        if age_secs > self.max_age_secs {
            return Err(AuthError::Expired { age_secs });
        }

        let user_json = field(&pairs, USER_FIELD)
            .ok_or_else(|| AuthError::MalformedUser("user field missing".to_string()))?;
        let user: PlatformUser = serde_json::from_str(user_json)
            .map_err(|e| AuthError::MalformedUser(e.to_string()))?;

        Ok(IdentityClaim {
            user,
            issued_at: auth_date,
        })
    }
}

fn field<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn mac_with_key(key: &[u8]) -> Result<HmacSha256, AuthError> {
    HmacSha256::new_from_slice(key).map_err(|_| AuthError::NotConfigured)
}

/// `HMAC-SHA256(bot_token)` keyed with `WebAppData`.
pub fn derive_secret_key(bot_token: &str) -> Result<[u8; 32], AuthError> {
    let mut mac = mac_with_key(WEB_APP_DATA_KEY)?;
    mac.update(bot_token.as_bytes());
    let mut key = [0u8; 32];
    key.copy_from_slice(&mac.finalize().into_bytes());
    Ok(key)
}

/// Decode a query string the way browsers' `URLSearchParams` do: `+` is a space,
/// percent escapes are UTF-8, a segment without `=` is a key with an empty value.
pub fn parse_init_data(raw: &str) -> Result<Vec<(String, String)>, AuthError> {
    let decode = |part: &str| -> Result<String, AuthError> {
        let spaced = part.replace('+', " ");
        urlencoding::decode(&spaced)
            .map(|s| s.into_owned())
            .map_err(|e| AuthError::MalformedEncoding(e.to_string()))
    };

    raw.trim_start_matches('?')
        .split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
            Ok((decode(key)?, decode(value)?))
        })
        .collect()
}

/// Sorted `key=value` lines, without the hash.
pub fn data_check_string(pairs: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = pairs.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}

fn verify_hash(secret_key: &[u8; 32], check_string: &str, supplied: &str) -> Result<(), AuthError> {
    // Only the canonical lowercase hex form is accepted.
    if supplied.len() != 64 || !supplied.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(AuthError::InvalidSignature);
    }
    let supplied_bytes = hex::decode(supplied).map_err(|_| AuthError::InvalidSignature)?;
    let mut mac = mac_with_key(secret_key)?;
    mac.update(check_string.as_bytes());
    // verify_slice compares in constant time
    mac.verify_slice(&supplied_bytes)
        .map_err(|_| AuthError::InvalidSignature)
}

/// Produce a signed `initData` string for `fields` (which must not contain `hash`).
/// Used by tests and the `sign` CLI command to emulate the platform container.
pub fn sign_init_data(fields: &[(&str, &str)], bot_token: &str) -> Result<String, AuthError> {
    let secret_key = derive_secret_key(bot_token)?;
    let pairs: Vec<(String, String)> = fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let mut mac = mac_with_key(&secret_key)?;
    mac.update(data_check_string(&pairs).as_bytes());
    let hash = hex::encode(mac.finalize().into_bytes());

    let mut encoded: Vec<String> = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    encoded.push(format!("{}={}", HASH_FIELD, hash));
    Ok(encoded.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "123456:TEST-token";
    const NOW: i64 = 1_700_000_000;

    fn user_json() -> String {
        r#"{"id":4242,"first_name":"Olena","last_name":"K","username":"olena","language_code":"uk","is_premium":true}"#.to_string()
    }

    fn signed(auth_date: i64) -> String {
        let date = auth_date.to_string();
        let user = user_json();
        sign_init_data(
            &[
                ("query_id", "AAHdF6IQAAAAAN0XohDhrOrc"),
                ("user", user.as_str()),
                ("auth_date", date.as_str()),
            ],
            TOKEN,
        )
        .expect("sign")
    }

    fn authenticator(env: Environment) -> RequestAuthenticator {
        RequestAuthenticator::new(TOKEN, env).expect("authenticator")
    }

    #[test]
    fn valid_signature_yields_claim() {
        let auth = authenticator(Environment::Production);
        let claim = auth.verify(&signed(NOW - 60), NOW).expect("verify");
        assert_eq!(claim.platform_id(), 4242);
        assert_eq!(claim.user.language_code.as_deref(), Some("uk"));
        assert!(claim.user.is_premium);
        assert_eq!(claim.issued_at, NOW - 60);
    }

    #[test]
    fn parameter_order_does_not_matter() {
        let auth = authenticator(Environment::Production);
        let raw = signed(NOW);
        let mut parts: Vec<&str> = raw.split('&').collect();
        parts.reverse();
        let reordered = parts.join("&");
        assert!(auth.verify(&reordered, NOW).is_ok());
    }

    #[test]
    fn any_single_character_change_is_rejected() {
        let auth = authenticator(Environment::Production);
        let raw = signed(NOW);
        let hash_start = raw.find("hash=").expect("hash present");
        for idx in 0..hash_start {
            let original = raw.as_bytes()[idx];
            if original == b'&' || original == b'=' || original == b'%' {
                continue;
            }
            let replacement = if original == b'x' { 'y' } else { 'x' };
            let mut tampered = raw.clone();
            tampered.replace_range(idx..idx + 1, &replacement.to_string());
            assert!(
                auth.verify(&tampered, NOW).is_err(),
                "mutation at byte {} was accepted",
                idx
            );
        }
    }

    #[test]
    fn tampered_hash_is_rejected() {
        let auth = authenticator(Environment::Production);
        let raw = signed(NOW);
        let last = raw.chars().last().unwrap();
        let flipped = if last == '0' { '1' } else { '0' };
        let tampered = format!("{}{}", &raw[..raw.len() - 1], flipped);
        assert_eq!(auth.verify(&tampered, NOW), Err(AuthError::InvalidSignature));

        let upper = raw.replace(&raw[raw.len() - 64..], &raw[raw.len() - 64..].to_uppercase());
        if upper != raw {
            assert_eq!(auth.verify(&upper, NOW), Err(AuthError::InvalidSignature));
        }
    }

    #[test]
    fn wrong_bot_token_is_rejected() {
        let auth = RequestAuthenticator::new("other:token", Environment::Production).unwrap();
        assert_eq!(auth.verify(&signed(NOW), NOW), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn expiry_window_is_inclusive() {
        let auth = authenticator(Environment::Production);
        assert!(auth.verify(&signed(NOW - 86_400), NOW).is_ok());
        assert_eq!(
            auth.verify(&signed(NOW - 86_401), NOW),
            Err(AuthError::Expired { age_secs: 86_401 })
        );
    }

    #[test]
    fn missing_hash_is_reported() {
        let auth = authenticator(Environment::Production);
        let raw = format!("auth_date={}&user={}", NOW, urlencoding::encode(&user_json()));
        assert_eq!(auth.verify(&raw, NOW), Err(AuthError::MissingSignature));
    }

    #[test]
    fn malformed_user_payload_is_reported() {
        let auth = authenticator(Environment::Production);
        let date = NOW.to_string();
        let raw = sign_init_data(&[("auth_date", date.as_str()), ("user", "{not json")], TOKEN).unwrap();
        assert!(matches!(auth.verify(&raw, NOW), Err(AuthError::MalformedUser(_))));

        let raw = sign_init_data(&[("auth_date", date.as_str())], TOKEN).unwrap();
        assert!(matches!(auth.verify(&raw, NOW), Err(AuthError::MalformedUser(_))));
    }

    #[test]
    fn invalid_auth_date_is_reported() {
        let auth = authenticator(Environment::Production);
        let user = user_json();
        let raw = sign_init_data(&[("auth_date", "yesterday"), ("user", user.as_str())], TOKEN).unwrap();
        assert_eq!(auth.verify(&raw, NOW), Err(AuthError::InvalidAuthDate));
    }

    #[test]
    fn invalid_utf8_escape_is_malformed_encoding() {
        let auth = authenticator(Environment::Production);
        let raw = "auth_date=1&user=%FF%FE&hash=00";
        assert!(matches!(auth.verify(raw, NOW), Err(AuthError::MalformedEncoding(_))));
    }

    #[test]
    fn bypass_only_outside_production() {
        let prod = authenticator(Environment::Production);
        assert_eq!(prod.authenticate(None, NOW), Err(AuthError::MissingSignature));
        assert_eq!(prod.authenticate(Some("  "), NOW), Err(AuthError::MissingSignature));

        let dev = authenticator(Environment::Development);
        assert_eq!(dev.authenticate(None, NOW), Ok(AuthOutcome::Bypassed));
        // A header that is present is always verified, even in development.
        assert_eq!(
            dev.authenticate(Some("auth_date=1&hash=abc"), NOW),
            Err(AuthError::InvalidSignature)
        );
    }

    #[test]
    fn unconfigured_token_rejects_signed_data() {
        let auth = RequestAuthenticator::new("", Environment::Development).unwrap();
        assert_eq!(auth.verify(&signed(NOW), NOW), Err(AuthError::NotConfigured));
    }

    #[test]
    fn plus_is_decoded_as_space() {
        let pairs = parse_init_data("a=hello+world&b=x%2By&flag").unwrap();
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "hello world".to_string()),
                ("b".to_string(), "x+y".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn check_string_is_sorted_by_key() {
        let pairs = vec![
            ("user".to_string(), "{}".to_string()),
            ("auth_date".to_string(), "1".to_string()),
            ("query_id".to_string(), "q".to_string()),
        ];
        assert_eq!(data_check_string(&pairs), "auth_date=1\nquery_id=q\nuser={}");
    }

    #[test]
    fn display_name_prefers_username() {
        let mut user = PlatformUser {
            id: 1,
            first_name: "Ivan".to_string(),
            ..PlatformUser::default()
        };
        assert_eq!(user.display_name(), "Ivan");
        user.last_name = Some("P".to_string());
        assert_eq!(user.display_name(), "Ivan P");
        user.username = Some("ivanp".to_string());
        assert_eq!(user.display_name(), "@ivanp");
    }
}
