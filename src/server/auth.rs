//! Caller identity.
//!
//! Every protected route runs behind [`identity_middleware`], which resolves
//! the calling user and stores a [`Caller`] in the request extensions.
//!
//! # Session tokens
//!
//! With authentication enabled, callers present an HMAC-SHA256 session token:
//!
//! ```text
//! token = "{user_id}.{expiry}.{hex(HMAC-SHA256(secret, "{user_id}.{expiry}"))}"
//! ```
//!
//! The token is read from `Authorization: Bearer <token>` or, for viewers
//! that cannot set headers on tile requests, from the `token` query
//! parameter:
//!
//! ```text
//! /viewer/42_files/12/3_4.jpg?token=7.1735689600.9f2c...
//! ```
//!
//! With authentication disabled, the caller is taken at face value from the
//! `X-User-Id` header or the `uid` query parameter.
//!
//! # Example
//!
//! ```rust
//! use wsi_gateway::server::auth::TokenAuth;
//! use std::time::Duration;
//!
//! let auth = TokenAuth::new("my-secret-key");
//! let token = auth.issue(7, Duration::from_secs(3600));
//!
//! assert_eq!(auth.verify(&token).unwrap(), 7);
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use url::form_urlencoded;

use super::handlers::ErrorResponse;
use crate::store::UserId;

/// Header naming the caller when authentication is disabled.
pub const USER_ID_HEADER: &str = "x-user-id";

type HmacSha256 = Hmac<Sha256>;

// =============================================================================
// Types
// =============================================================================

/// Authentication error types.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// No token or user id was presented
    MissingCredentials,

    /// Token is not `{user}.{expiry}.{signature}`
    MalformedToken,

    /// Token has expired
    Expired {
        /// When the token expired
        expired_at: u64,
        /// Current time
        current_time: u64,
    },

    /// Signature does not match
    InvalidSignature,

    /// User id is not a non-negative integer
    InvalidUserId,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingCredentials => write!(f, "Missing credentials"),
            AuthError::MalformedToken => write!(f, "Malformed session token"),
            AuthError::Expired {
                expired_at,
                current_time,
            } => write!(
                f,
                "Session token expired at {} (current time: {})",
                expired_at, current_time
            ),
            AuthError::InvalidSignature => write!(f, "Invalid session token signature"),
            AuthError::InvalidUserId => write!(f, "Invalid user id"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = StatusCode::UNAUTHORIZED;
        let error_type = match &self {
            AuthError::MissingCredentials => "missing_credentials",
            AuthError::MalformedToken => "malformed_token",
            AuthError::Expired { .. } => "token_expired",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::InvalidUserId => "invalid_user_id",
        };
        let message = self.to_string();

        // A bad signature may be tampering; everything else is routine
        match &self {
            AuthError::InvalidSignature => {
                warn!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Authentication failed: {}",
                    message
                );
            }
            _ => {
                debug!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Authentication failed: {}",
                    message
                );
            }
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Session Tokens
// =============================================================================

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Issues and verifies HMAC-SHA256 session tokens.
#[derive(Clone)]
pub struct TokenAuth {
    secret_key: Vec<u8>,
}

impl TokenAuth {
    /// Create an authenticator. The secret should be at least 32 bytes.
    pub fn new(secret_key: impl AsRef<[u8]>) -> Self {
        Self {
            secret_key: secret_key.as_ref().to_vec(),
        }
    }

    /// Issue a token for `user` valid for `ttl`.
    pub fn issue(&self, user: UserId, ttl: Duration) -> String {
        self.issue_with_expiry(user, now_secs().saturating_add(ttl.as_secs()))
    }

    /// Issue a token with an explicit Unix expiry.
    pub fn issue_with_expiry(&self, user: UserId, expiry: u64) -> String {
        format!("{}.{}.{}", user, expiry, self.signature(user, expiry))
    }

    /// Verify a token and return the user it names.
    pub fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let mut parts = token.splitn(3, '.');
        let (user, expiry, signature) = match (parts.next(), parts.next(), parts.next()) {
            (Some(user), Some(expiry), Some(signature)) => (user, expiry, signature),
            _ => return Err(AuthError::MalformedToken),
        };

        let user: UserId = user.parse().map_err(|_| AuthError::InvalidUserId)?;
        let expiry: u64 = expiry.parse().map_err(|_| AuthError::MalformedToken)?;

        let current_time = now_secs();
        if current_time > expiry {
            return Err(AuthError::Expired {
                expired_at: expiry,
                current_time,
            });
        }

        let provided = hex::decode(signature).map_err(|_| AuthError::MalformedToken)?;
        let expected = self.mac(user, expiry);

        if provided.ct_eq(&expected).into() {
            Ok(user)
        } else {
            Err(AuthError::InvalidSignature)
        }
    }

    fn mac(&self, user: UserId, expiry: u64) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret_key).expect("HMAC can take key of any size");
        mac.update(format!("{}.{}", user, expiry).as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    fn signature(&self, user: UserId, expiry: u64) -> String {
        hex::encode(self.mac(user, expiry))
    }
}

// =============================================================================
// Caller Resolution
// =============================================================================

/// The resolved calling user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
}

/// Resolves callers from requests.
///
/// `tokens: None` means authentication is disabled.
#[derive(Clone)]
pub struct Authenticator {
    tokens: Option<TokenAuth>,
}

impl Authenticator {
    /// Require signed session tokens.
    pub fn tokens(auth: TokenAuth) -> Self {
        Self { tokens: Some(auth) }
    }

    /// Trust the `X-User-Id` header or `uid` query parameter.
    pub fn trusted() -> Self {
        Self { tokens: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tokens.is_some()
    }

    /// Resolve the caller from request headers and query string.
    pub fn identify(&self, headers: &HeaderMap, query: Option<&str>) -> Result<Caller, AuthError> {
        let user_id = match &self.tokens {
            Some(tokens) => {
                let token = bearer_token(headers)
                    .or_else(|| query_param(query, "token"))
                    .ok_or(AuthError::MissingCredentials)?;
                tokens.verify(&token)?
            }
            None => headers
                .get(USER_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .or_else(|| query_param(query, "uid"))
                .ok_or(AuthError::MissingCredentials)?
                .trim()
                .parse()
                .map_err(|_| AuthError::InvalidUserId)?,
        };

        Ok(Caller { user_id })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?;
    Some(token.trim().to_string())
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

// =============================================================================
// Axum Middleware
// =============================================================================

/// Axum middleware resolving the [`Caller`] for protected routes.
///
/// # Example
///
/// ```ignore
/// use axum::{Router, middleware};
/// use wsi_gateway::server::auth::{Authenticator, TokenAuth, identity_middleware};
///
/// let auth = Authenticator::tokens(TokenAuth::new("secret-key"));
/// let app = Router::new()
///     .route("/slides", get(list_slides))
///     .layer(middleware::from_fn_with_state(auth, identity_middleware));
/// ```
pub async fn identity_middleware(
    State(auth): State<Authenticator>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let caller = auth.identify(request.headers(), request.uri().query())?;
    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Caller>()
            .copied()
            .ok_or(AuthError::MissingCredentials)
    }
}

// =============================================================================
// Tests
// =============================================================================
