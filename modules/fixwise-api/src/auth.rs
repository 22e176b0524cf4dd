use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::Json,
};
use serde_json::{json, Value};

use crate::AppState;

/// Admin bearer-token guard. Every trigger and admin route extracts this;
/// the public routes (health, ask) do not.
pub struct AdminAuth;

impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = (StatusCode, Json<Value>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "));

        match token {
            Some(token) if token == state.admin_api_token => Ok(AdminAuth),
            _ => Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Invalid or missing bearer token"})),
            )),
        }
    }
}
