//! First-factor login endpoint: password check, regulation, session
//! issuance.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

use super::session_cookie;
use crate::api::AppState;
use crate::authz::types::AuthenticationLevel;
use crate::session::{self, Session};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FirstFactorRequest {
    pub username: String,
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/api/firstfactor",
    request_body = FirstFactorRequest,
    responses(
        (status = 204, description = "Credentials accepted, session cookie issued"),
        (status = 401, description = "Bad credentials"),
        (status = 429, description = "Temporarily banned after repeated failures"),
    ),
    tag = "auth",
)]
#[instrument(skip_all, fields(username = %payload.username))]
pub async fn firstfactor(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<FirstFactorRequest>,
) -> Response {
    let FirstFactorRequest { username, password } = payload;
    let password = SecretString::from(password);

    // Regulation first: a banned user never reaches the credential check.
    match state.regulator.regulate(&username).await {
        Ok(None) => {}
        Ok(Some(banned_until)) => {
            warn!(banned_until, "Login attempt while banned");
            return StatusCode::TOO_MANY_REQUESTS.into_response();
        }
        Err(err) => {
            error!("Regulation check failed: {err:#}");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    match state.user_provider.check_user_password(&username, &password).await {
        Ok(true) => {
            state.regulator.mark(&username, true).await;
        }
        Ok(false) => {
            state.regulator.mark(&username, false).await;
            warn!("Invalid credentials");
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Err(err) => {
            // A backend failure is not a failed attempt; don't mark it.
            error!("Credential check failed: {err:#}");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let details = match state.user_provider.get_details(&username).await {
        Ok(details) => details,
        Err(err) => {
            error!("Unable to fetch user details: {err:#}");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    let token = match session::generate_token() {
        Ok(token) => token,
        Err(err) => {
            error!("Unable to generate session token: {err:#}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let new_session = Session {
        username: username.clone(),
        groups: details.groups,
        emails: details.emails,
        authentication_level: AuthenticationLevel::OneFactor,
        last_activity: Utc::now().timestamp(),
    };
    if let Err(err) = state.session_store.save(&token, new_session).await {
        error!("Unable to save session: {err:#}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    info!("First factor succeeded");

    let max_age = state.session_store.expiration().as_secs();
    let mut response_headers = HeaderMap::new();
    match session_cookie(&state.cookie_name, &token, state.cookie_secure, max_age) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Unable to build session cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    (StatusCode::NO_CONTENT, response_headers).into_response()
}
