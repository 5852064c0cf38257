use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::auth::{AppState, identity_from_header};

/// Resolve the caller's identity from the Authorization header and attach it
/// to the request. Requests without the header proceed anonymously.
pub async fn resolve_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .map(|v| v.to_str().map_err(|_| StatusCode::UNAUTHORIZED))
        .transpose()?;

    let identity = identity_from_header(&state.jwt_secret, auth_header).map_err(|e| {
        warn!("Rejected request: {}", e);
        StatusCode::UNAUTHORIZED
    })?;
    debug!("Request identity: {:?}", identity);

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
