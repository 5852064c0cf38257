use std::sync::Arc;

use axum::{Json, extract::{Query, State}, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{error, info};

use blog_types::api::{Claims, TokenRequest, TokenResponse};
use blog_types::{BlogError, Result};

use crate::schema::BlogSchema;
use crate::service::ContentService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub schema: BlogSchema,
    pub service: ContentService,
    pub jwt_secret: String,
}

/// Who is calling, as resolved before any operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    User(String),
    Anonymous,
}

const TOKEN_TTL_HOURS: i64 = 24;
const DEV_USER: &str = "user1";

/// Issue a token for local testing. Without `user_id` the token is for the
/// default development user.
pub async fn issue_token(
    State(state): State<AppState>,
    Query(req): Query<TokenRequest>,
) -> std::result::Result<impl IntoResponse, StatusCode> {
    let user_id = req.user_id.unwrap_or_else(|| DEV_USER.to_string());
    if user_id.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let token = create_token(&state.jwt_secret, &user_id).map_err(|e| {
        error!("Failed to sign token: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    info!("Issued token for {}", user_id);
    Ok(Json(TokenResponse { token }))
}

pub fn create_token(secret: &str, user_id: &str) -> Result<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(TOKEN_TTL_HOURS)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| BlogError::Unauthorized(format!("cannot sign token: {}", e)))
}

pub fn validate_token(secret: &str, token: &str) -> Result<String> {
    if token.is_empty() {
        return Err(BlogError::Unauthorized("empty token".to_string()));
    }

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| BlogError::Unauthorized(format!("invalid token: {}", e)))?;

    if data.claims.sub.is_empty() {
        return Err(BlogError::Unauthorized("token has no subject".to_string()));
    }
    Ok(data.claims.sub)
}

/// Resolve an `Authorization` header value. A missing header is anonymous;
/// anything present must be a valid bearer token.
pub fn identity_from_header(secret: &str, header: Option<&str>) -> Result<Identity> {
    let Some(value) = header.filter(|v| !v.is_empty()) else {
        return Ok(Identity::Anonymous);
    };

    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| BlogError::Unauthorized("expected a Bearer token".to_string()))?;

    validate_token(secret, token).map(Identity::User)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn token_round_trips_to_user_identity() {
        let token = create_token(SECRET, "alice").unwrap();
        let header = format!("Bearer {}", token);
        assert_eq!(
            identity_from_header(SECRET, Some(&header)).unwrap(),
            Identity::User("alice".to_string())
        );
    }

    #[test]
    fn missing_header_is_anonymous() {
        assert_eq!(identity_from_header(SECRET, None).unwrap(), Identity::Anonymous);
        assert_eq!(identity_from_header(SECRET, Some("")).unwrap(), Identity::Anonymous);
    }

    #[test]
    fn malformed_header_is_rejected() {
        let token = create_token(SECRET, "alice").unwrap();
        assert!(identity_from_header(SECRET, Some(&token)).is_err());
        assert!(identity_from_header(SECRET, Some("Basic abc")).is_err());
        assert!(identity_from_header(SECRET, Some("Bearer ")).is_err());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = create_token("other", "alice").unwrap();
        let err = validate_token(SECRET, &token).unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
    }
}
