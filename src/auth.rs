//! Bearer token authentication.
//!
//! The middleware validates `Authorization: Bearer <token>` when a signing
//! secret is configured and puts the resulting [`Identity`] into the request
//! extensions. Requests without a token pass through unless authentication is
//! required; handlers then fall back to the `userId` the client supplied.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::error::ApiError;
use crate::models::UserRef;

const INVALID_TOKEN: &str = "Invalid or expired token. Please login again.";
const TOKEN_REQUIRED: &str = "Authentication required. Please login.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub exp: usize,
}

/// The caller, as established by a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub role: Option<String>,
}

impl Identity {
    /// Owned data is keyed by email; tokens without one fall back to the id.
    pub fn user_ref(&self) -> Option<UserRef> {
        UserRef::parse(&self.email).or_else(|| UserRef::parse(&self.id))
    }
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid(e.to_string()),
            }
        })?;
        Ok(Identity {
            id: data.claims.id,
            email: data.claims.email,
            role: data.claims.role,
        })
    }
}

#[derive(Clone)]
pub struct AuthState {
    /// `None` when no secret is configured; tokens are then ignored.
    pub verifier: Option<Arc<JwtVerifier>>,
    pub required: bool,
}

impl AuthState {
    pub fn disabled() -> Self {
        Self {
            verifier: None,
            required: false,
        }
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "success": false, "message": message })),
    )
        .into_response()
}

pub async fn authenticate(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let identity = match (auth.verifier.as_deref(), token) {
        (Some(verifier), Some(token)) => match verifier.verify(token) {
            Ok(identity) => Some(identity),
            Err(e) => {
                tracing::warn!("🔒 Rejected token: {}", e);
                return unauthorized(INVALID_TOKEN);
            }
        },
        _ => None,
    };

    match identity {
        Some(identity) => {
            request.extensions_mut().insert(identity);
        }
        None if auth.required => return unauthorized(TOKEN_REQUIRED),
        None => {}
    }

    next.run(request).await
}

/// Decides whose data a request touches.
///
/// An authenticated caller acts as themselves; a `userId` naming anyone else
/// is refused. Without a token the supplied `userId` is used as given.
pub fn resolve_user(identity: Option<&Identity>, supplied: Option<&str>) -> Result<UserRef, ApiError> {
    let supplied = supplied.and_then(UserRef::parse);

    match identity {
        Some(identity) => {
            let me = identity.user_ref().ok_or(ApiError::Unauthorized)?;
            match supplied {
                Some(other) if other != me && other.as_str() != identity.id => Err(
                    ApiError::Forbidden("Not allowed to access another user's data".to_string()),
                ),
                _ => Ok(me),
            }
        }
        None => supplied.ok_or_else(|| ApiError::validation("User ID is required")),
    }
}
