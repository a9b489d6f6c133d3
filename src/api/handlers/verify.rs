//! Forward-auth verification endpoint.
//!
//! The reverse proxy calls this for every protected request. The caller's
//! identity comes from exactly one of two channels: `Proxy-Authorization`
//! Basic credentials (stateless, always one-factor) or the session cookie.
//! The policy engine then decides the required level and the verdict maps
//! to `200`/`401`(or redirect)/`403`. Every error path fails closed.

use anyhow::{Context, Result};
use axum::{
    extract::{Extension, Query},
    http::{
        header::{LOCATION, PROXY_AUTHORIZATION},
        HeaderMap, HeaderName, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use secrecy::SecretString;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};
use url::Url;

use super::{extract_client_ip, extract_session_token};
use crate::api::AppState;
use crate::authz::types::{AuthenticationLevel, AuthorizationMatching, Object, PolicyLevel, Subject};
use crate::session::Session;

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    /// Login-portal base URL unauthenticated callers are redirected to.
    pub rd: Option<String>,
}

/// Identity and proof level resolved for the current request.
struct Authn {
    username: String,
    groups: Vec<String>,
    emails: Vec<String>,
    level: AuthenticationLevel,
    /// Cookie token and loaded session when resolved over the cookie
    /// channel; `None` for Basic credentials, which are stateless.
    session: Option<(String, Session)>,
}

impl Authn {
    fn anonymous() -> Self {
        Self {
            username: String::new(),
            groups: Vec::new(),
            emails: Vec::new(),
            level: AuthenticationLevel::NotAuthenticated,
            session: None,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/verify",
    responses(
        (status = 200, description = "Access granted; identity in Remote-* headers"),
        (status = 302, description = "Authentication required, redirecting to the login portal"),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Access denied for this identity"),
    ),
    tag = "verify",
)]
#[instrument(skip_all)]
pub async fn verify(
    headers: HeaderMap,
    Query(params): Query<VerifyParams>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    let target = match target_url(&headers) {
        Ok(target) => target,
        Err(err) => {
            error!("Unable to resolve target URL: {err:#}");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };
    let object = Object::from_url(&target);

    let authn = match resolve_authentication(&headers, &state).await {
        Ok(authn) => authn,
        Err(status) => return status.into_response(),
    };

    let subject = Subject {
        username: authn.username.clone(),
        groups: authn.groups.clone(),
        ip: extract_client_ip(&headers),
    };

    let required = state.access_control.required_level(&subject, &object);

    match verdict(required, &subject, authn.level) {
        AuthorizationMatching::Authorized => authorized_response(&state, authn).await,
        AuthorizationMatching::Forbidden => {
            // A known, blocked user is never bounced to the login page;
            // that could imply retrying would help.
            warn!(username = %subject.username, url = %target, "Access forbidden");
            StatusCode::FORBIDDEN.into_response()
        }
        AuthorizationMatching::NotAuthorized => {
            debug!(url = %target, "Authentication required");
            not_authorized_response(params.rd.as_deref(), &target)
        }
    }
}

/// Map the required policy level and the caller's proven level to a
/// verdict.
///
/// An anonymous caller hitting a denied resource might still gain access
/// by authenticating, so the signal is "authenticate" rather than a hard
/// forbidden; a named caller has already been evaluated against every rule
/// naming them.
fn verdict(
    required: PolicyLevel,
    subject: &Subject,
    level: AuthenticationLevel,
) -> AuthorizationMatching {
    match required {
        PolicyLevel::Bypass => AuthorizationMatching::Authorized,
        PolicyLevel::Denied => {
            if subject.is_anonymous() {
                AuthorizationMatching::NotAuthorized
            } else {
                AuthorizationMatching::Forbidden
            }
        }
        PolicyLevel::OneFactor => {
            if level >= AuthenticationLevel::OneFactor {
                AuthorizationMatching::Authorized
            } else {
                AuthorizationMatching::NotAuthorized
            }
        }
        PolicyLevel::TwoFactor => {
            if level >= AuthenticationLevel::TwoFactor {
                AuthorizationMatching::Authorized
            } else {
                AuthorizationMatching::NotAuthorized
            }
        }
    }
}

/// Resolve identity over the Basic channel when the header is present,
/// the cookie channel otherwise. All failures collapse to 401.
async fn resolve_authentication(
    headers: &HeaderMap,
    state: &AppState,
) -> Result<Authn, StatusCode> {
    if let Some(value) = headers.get(PROXY_AUTHORIZATION) {
        return basic_channel(value, state).await;
    }
    cookie_channel(headers, state).await
}

async fn basic_channel(value: &HeaderValue, state: &AppState) -> Result<Authn, StatusCode> {
    let credentials = match parse_basic_credentials(value) {
        Ok(credentials) => credentials,
        Err(err) => {
            warn!("Malformed Proxy-Authorization header: {err:#}");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    match state
        .user_provider
        .check_user_password(&credentials.username, &credentials.password)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            warn!(username = %credentials.username, "Invalid credentials");
            return Err(StatusCode::UNAUTHORIZED);
        }
        Err(err) => {
            error!("Credential check failed: {err:#}");
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    let details = match state.user_provider.get_details(&credentials.username).await {
        Ok(details) => details,
        Err(err) => {
            error!(username = %credentials.username, "Unable to fetch user details: {err:#}");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    Ok(Authn {
        username: credentials.username,
        groups: details.groups,
        emails: details.emails,
        // Basic credentials can never prove a second factor.
        level: AuthenticationLevel::OneFactor,
        session: None,
    })
}

async fn cookie_channel(headers: &HeaderMap, state: &AppState) -> Result<Authn, StatusCode> {
    let Some(token) = extract_session_token(headers, &state.cookie_name) else {
        return Ok(Authn::anonymous());
    };

    let session = match state.session_store.get(&token).await {
        Ok(Some(session)) => session,
        Ok(None) => return Ok(Authn::anonymous()),
        Err(err) => {
            error!("Unable to load session: {err:#}");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // An anonymous session can never carry a proven level; this points at
    // tampering or a bug, not a normal runtime path.
    if session.is_anonymous()
        && session.authentication_level != AuthenticationLevel::NotAuthenticated
    {
        error!("Session has an authentication level but no username");
        return Err(StatusCode::UNAUTHORIZED);
    }

    if !session.is_anonymous() {
        let now = Utc::now().timestamp();
        if session.expired_by_inactivity(state.inactivity_seconds, now) {
            warn!(username = %session.username, "Session expired by inactivity");
            if let Err(err) = state.session_store.destroy(&token).await {
                error!("Unable to destroy expired session: {err:#}");
            }
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    Ok(Authn {
        username: session.username.clone(),
        groups: session.groups.clone(),
        emails: session.emails.clone(),
        level: session.authentication_level,
        session: Some((token, session)),
    })
}

async fn authorized_response(state: &AppState, authn: Authn) -> Response {
    let mut response_headers = HeaderMap::new();
    if !authn.username.is_empty() {
        insert_header(&mut response_headers, "remote-user", &authn.username);
        insert_header(&mut response_headers, "remote-groups", &authn.groups.join(","));
        if let Some(email) = authn.emails.first() {
            insert_header(&mut response_headers, "remote-email", email);
        }
    }

    // Only cookie sessions track activity; Basic credentials are checked
    // on every request and carry no state.
    if let Some((token, mut session)) = authn.session {
        if !session.is_anonymous() {
            session.last_activity = Utc::now().timestamp();
            if let Err(err) = state.session_store.save(&token, session).await {
                error!("Unable to persist session activity: {err:#}");
                return StatusCode::UNAUTHORIZED.into_response();
            }
        }
    }

    (StatusCode::OK, response_headers).into_response()
}

fn not_authorized_response(rd: Option<&str>, target: &Url) -> Response {
    let Some(rd) = rd.filter(|rd| !rd.is_empty()) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let mut portal = match Url::parse(rd) {
        Ok(portal) => portal,
        Err(err) => {
            warn!("Ignoring unparsable rd parameter `{rd}`: {err}");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };
    portal.query_pairs_mut().append_pair("rd", target.as_str());

    match HeaderValue::from_str(portal.as_str()) {
        Ok(location) => {
            let mut headers = HeaderMap::new();
            headers.insert(LOCATION, location);
            (StatusCode::FOUND, headers).into_response()
        }
        Err(_) => StatusCode::UNAUTHORIZED.into_response(),
    }
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(HeaderName::from_static(name), value);
        }
        Err(_) => warn!("Skipping {name} header: value is not header-safe"),
    }
}

struct BasicCredentials {
    username: String,
    password: SecretString,
}

/// Parse RFC 7617 Basic credentials.
fn parse_basic_credentials(value: &HeaderValue) -> Result<BasicCredentials> {
    let value = value.to_str().context("header is not valid UTF-8")?;
    let encoded = value
        .strip_prefix("Basic ")
        .context("missing Basic scheme prefix")?;
    let decoded = STANDARD
        .decode(encoded.trim())
        .context("invalid base64 payload")?;
    let decoded = String::from_utf8(decoded).context("credentials are not valid UTF-8")?;
    let (username, password) = decoded
        .split_once(':')
        .context("missing `:` credentials separator")?;

    Ok(BasicCredentials {
        username: username.to_string(),
        password: SecretString::from(password.to_string()),
    })
}

/// Externally-requested URL, from `X-Original-URL` or the forwarded
/// header triple.
fn target_url(headers: &HeaderMap) -> Result<Url> {
    if let Some(original) = headers.get("x-original-url") {
        let raw = original.to_str().context("X-Original-URL is not valid UTF-8")?;
        return Url::parse(raw).with_context(|| format!("invalid X-Original-URL `{raw}`"));
    }

    let proto = header_str(headers, "x-forwarded-proto").context("missing X-Forwarded-Proto")?;
    let host = header_str(headers, "x-forwarded-host").context("missing X-Forwarded-Host")?;
    let uri = header_str(headers, "x-forwarded-uri").unwrap_or_default();

    Url::parse(&format!("{proto}://{host}{uri}"))
        .with_context(|| format!("invalid forwarded target `{proto}://{host}{uri}`"))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
