use async_graphql::Data;
use async_graphql::http::{ALL_WEBSOCKET_PROTOCOLS, GraphiQLSource};
use async_graphql_axum::{GraphQLProtocol, GraphQLRequest, GraphQLResponse, GraphQLWebSocket};
use axum::{
    Extension,
    extract::{State, WebSocketUpgrade},
    response::{Html, IntoResponse},
};
use tracing::{info, warn};

use crate::auth::{AppState, Identity, identity_from_header};

/// POST /query
pub async fn graphql_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let req = req
        .into_inner()
        .data(identity)
        .data(state.service.comment_loader());
    state.schema.execute(req).await.into()
}

/// GET /ws. Subscriptions over graphql-ws or graphql-transport-ws.
///
/// Browsers cannot set headers on a WebSocket upgrade, so the token may also
/// arrive as `Authorization` in the `connection_init` payload.
pub async fn graphql_ws(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    protocol: GraphQLProtocol,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    let schema = state.schema.clone();
    let secret = state.jwt_secret.clone();

    upgrade
        .protocols(ALL_WEBSOCKET_PROTOCOLS)
        .on_upgrade(move |socket| {
            GraphQLWebSocket::new(socket, schema, protocol)
                .on_connection_init(move |payload| async move {
                    let identity = match init_authorization(&payload) {
                        Some(value) => identity_from_header(&secret, Some(value)).map_err(|e| {
                            warn!("Rejected WebSocket connection: {}", e);
                            async_graphql::Error::new(e.to_string())
                        })?,
                        None => identity,
                    };
                    info!("WebSocket connection initialised as {:?}", identity);

                    let mut data = Data::default();
                    data.insert(identity);
                    Ok(data)
                })
                .serve()
        })
}

fn init_authorization(payload: &serde_json::Value) -> Option<&str> {
    payload
        .get("Authorization")
        .or_else(|| payload.get("authorization"))
        .and_then(|v| v.as_str())
}

/// GET /. Interactive explorer wired to both endpoints.
pub async fn playground() -> impl IntoResponse {
    Html(
        GraphiQLSource::build()
            .endpoint("/query")
            .subscription_endpoint("/ws")
            .finish(),
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn init_payload_authorization_is_case_tolerant() {
        let upper = json!({ "Authorization": "Bearer a" });
        let lower = json!({ "authorization": "Bearer b" });
        assert_eq!(init_authorization(&upper), Some("Bearer a"));
        assert_eq!(init_authorization(&lower), Some("Bearer b"));
        assert_eq!(init_authorization(&json!({})), None);
        assert_eq!(init_authorization(&serde_json::Value::Null), None);
    }
}
