//! Session termination.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{error, instrument};

use super::{clear_session_cookie, extract_session_token};
use crate::api::AppState;

#[utoipa::path(
    post,
    path = "/api/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth",
)]
#[instrument(skip_all)]
pub async fn logout(headers: HeaderMap, Extension(state): Extension<Arc<AppState>>) -> Response {
    if let Some(token) = extract_session_token(&headers, &state.cookie_name) {
        if let Err(err) = state.session_store.destroy(&token).await {
            error!("Unable to destroy session: {err:#}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(&state.cookie_name, state.cookie_secure) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}
