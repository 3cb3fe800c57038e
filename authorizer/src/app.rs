use axum::{Router, routing::get};
use std::{panic, process, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::{Config, SecretsBackend};
use crate::error::AppError;
use crate::middleware;
use crate::services::auth::asserter_client::AsserterClient;
use crate::services::auth::authorize_service::AuthorizeService;
use crate::services::auth::idp_client::IdpClient;
use crate::services::auth::key_resolver::RemoteJwksResolver;
use crate::services::secrets::{EnvSecrets, SecretSource, VaultSecrets};
use crate::state::AppState;

fn init_tracing() {
    // RUST_LOG always wins; the DEBUG toggle only widens the fallback filter.
    let default_filter = if std::env::var("DEBUG").is_ok_and(|v| v.eq_ignore_ascii_case("true")) {
        "debug"
    } else {
        "info,tower_http=info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    // Keep the default hook as a fallback (prints to stderr with location/payload).
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // Always surface panics via tracing so they don't get "lost"
        // (stderr can be hidden depending on how the process is launched.)
        tracing::error!(?info, "panic");

        // In development, fail fast. In production, prefer the default behavior
        // (stderr) and let the server keep running.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<(), AppError> {
    init_tracing();
    let config = Config::from_env()
        .inspect_err(|e| tracing::error!(error = %e, "configuration error"))?;

    let abort_on_panic = !config.app_env.is_production();
    init_panic_hook(abort_on_panic);

    tracing::info!(
        "starting authorizer in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let state = build_state(&config)?;
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .map_err(|_| AppError::Internal)?;
    axum::serve(listener, app)
        .await
        .map_err(|_| AppError::Internal)?;

    Ok(())
}

fn build_state(config: &Config) -> Result<AppState, AppError> {
    // One pooled client for every outbound call; the per-request deadline
    // rides on it, so a hung collaborator surfaces as an error, not a hang.
    let http = reqwest::Client::builder()
        .timeout(config.outbound_timeout)
        .build()
        .map_err(|e| {
            tracing::error!(error = %e, "failed to build outbound HTTP client");
            AppError::Internal
        })?;

    let secrets: Arc<dyn SecretSource> = match &config.secrets_backend {
        SecretsBackend::Env => Arc::new(EnvSecrets),
        SecretsBackend::Vault { endpoint } => {
            Arc::new(VaultSecrets::new(http.clone(), endpoint.clone()))
        }
    };

    let keys = Arc::new(RemoteJwksResolver::new(
        http.clone(),
        config.idp_jwks_url.clone(),
    ));
    let exchanger = Arc::new(IdpClient::new(
        http.clone(),
        config.idp_token_url.clone(),
        config.idp_client_id.clone(),
    ));
    let asserter = Arc::new(AsserterClient::new(
        http,
        config.asserter_endpoint.clone(),
        config.delegated_assertion_ttl_seconds,
        config.asserter_api_key.clone(),
    ));

    let authorize = Arc::new(AuthorizeService::new(
        config, secrets, keys, exchanger, asserter,
    ));

    Ok(AppState::new(authorize))
}

fn build_router(state: AppState) -> Router {
    async fn health() -> &'static str {
        "ok"
    }

    let router = Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api::v1::routes(state.clone()))
        .with_state(state);

    middleware::http::apply(router)
}
