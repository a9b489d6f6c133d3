//! HTTP server wiring: router, shared state, middleware, shutdown.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;

use crate::authz::AccessControl;
use crate::config::Settings;
use crate::regulation::{MemoryRegulator, NoopRegulator, Regulator};
use crate::session::{MemorySessionStore, SessionStore};
use crate::users::{FileUserProvider, UserProvider};

pub(crate) mod handlers;

/// Shared state injected into every handler: the compiled policy engine
/// plus the collaborator backends chosen at startup.
pub struct AppState {
    pub access_control: AccessControl,
    pub user_provider: Arc<dyn UserProvider>,
    pub session_store: Arc<dyn SessionStore>,
    pub regulator: Arc<dyn Regulator>,
    pub cookie_name: String,
    pub cookie_secure: bool,
    pub inactivity_seconds: i64,
}

/// Build the application router with the shared state attached.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/verify", get(handlers::verify))
        .route("/api/firstfactor", post(handlers::firstfactor))
        .route("/api/logout", post(handlers::logout))
        .route("/health", get(handlers::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, settings: Settings) -> Result<()> {
    let state = build_state(&settings)?;
    let app = router(Arc::new(state));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn build_state(settings: &Settings) -> Result<AppState> {
    let access_control = settings
        .access_control
        .compile()
        .context("invalid access control configuration")?;

    let user_provider: Arc<dyn UserProvider> = Arc::new(
        FileUserProvider::load(&settings.users_file).context("failed to load users file")?,
    );

    let session_store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new(
        Duration::from_secs(settings.session.expiration),
    ));

    let regulator: Arc<dyn Regulator> = if settings.regulation.max_retries == 0 {
        Arc::new(NoopRegulator)
    } else {
        Arc::new(MemoryRegulator::new(
            settings.regulation.max_retries,
            settings.regulation.find_time,
            settings.regulation.ban_time,
        ))
    };

    Ok(AppState {
        access_control,
        user_provider,
        session_store,
        regulator,
        cookie_name: settings.session.name.clone(),
        cookie_secure: settings.session.secure,
        inactivity_seconds: settings.session.inactivity,
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to install ctrl-c handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
