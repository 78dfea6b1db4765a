use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use shesphere_backend::{
    app,
    auth::{AuthState, JwtVerifier},
    config::{AppConfig, ServerConfig},
    dispatch::{DispatchSettings, TracingObserver},
    notify::{Notifier, ResendNotifier},
    store::PgStore,
    AppState,
};

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    config.validate().context("validating configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("connecting to database")?;
    let store = Arc::new(PgStore::new(pool));
    if config.database.run_migrations {
        store.migrate().await.context("running migrations")?;
        tracing::info!("🗄️ Migrations applied");
    }

    let notifier: Option<Arc<dyn Notifier>> = match config.email.credentials() {
        Some((api_key, from_email)) => {
            let resend = ResendNotifier::new(api_key, from_email, config.email.send_timeout())?
                .with_base_url(&config.email.api_base_url);
            tracing::info!("📧 Alert emails will be sent from {}", from_email);
            Some(Arc::new(resend) as Arc<dyn Notifier>)
        }
        None => {
            tracing::warn!("❗ Email credentials missing; safety alerts will be stored but not emailed");
            None
        }
    };

    let dispatch = DispatchSettings {
        sender_name: config.email.from_name.clone(),
        send_timeout: config.email.send_timeout(),
        window: Duration::from_secs(config.dispatch.window_secs),
        max_concurrency: config.dispatch.max_concurrency,
    };
    let state = AppState::with_store(store, notifier, Arc::new(TracingObserver), dispatch);

    let auth = AuthState {
        verifier: config
            .auth
            .jwt_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|secret| Arc::new(JwtVerifier::new(secret))),
        required: config.auth.required,
    };
    if auth.verifier.is_none() {
        tracing::warn!("🔓 No JWT secret configured; requests are identified by userId only");
    }

    let app = app(state, auth).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&config.server))
            .layer(TimeoutLayer::new(config.server.request_timeout())),
    );

    let addr = config.server.socket_addr()?;
    tracing::info!("🧠 Server running at {}", addr);

    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service(),
    )
    .await?;

    Ok(())
}
