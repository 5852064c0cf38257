pub mod auth;
pub mod graphql;
pub mod loader;
pub mod middleware;
pub mod schema;
pub mod service;

#[cfg(test)]
mod test_support;

use axum::{
    Router,
    routing::{get, post},
};

use auth::AppState;

/// All HTTP routes. Cross-cutting layers (CORS, tracing) are added by the
/// binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(graphql::playground))
        .route("/token", get(auth::issue_token))
        .with_state(state.clone());

    let graphql_routes = Router::new()
        .route("/query", post(graphql::graphql_handler))
        .route("/ws", get(graphql::graphql_ws))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::resolve_identity,
        ))
        .with_state(state);

    Router::new().merge(public_routes).merge(graphql_routes)
}
