use std::{process, sync::Arc};

use pixelwar::{
    application::{
        cooldown::CooldownLimiter,
        error::AppError,
        placement::PlacementService,
        repos::{HealthRepo, PlacementsRepo},
        snapshot::CanvasService,
    },
    cache::{CacheSubscriber, FastCache, MemoryCache, MemoryCacheOptions},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState, EventsState, GatewayHeaderVerifier, ViewerStreamSettings},
        telemetry,
    },
    realtime::{RelayBackoff, RelayBridge, SessionManager},
};
use tokio::try_join;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    init_repositories(&settings).await?;
    info!(target = "pixelwar::migrate", "Migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let placements_repo: Arc<dyn PlacementsRepo> = repositories.clone();
    let health_repo: Arc<dyn HealthRepo> = repositories;

    let memory_cache = Arc::new(MemoryCache::new(MemoryCacheOptions {
        channel_capacity: settings.cache.channel_capacity.get() as usize,
        ..Default::default()
    }));
    let cache: Arc<dyn FastCache> = memory_cache.clone();
    let subscriber: Arc<dyn CacheSubscriber> = memory_cache;

    let limiter = Arc::new(CooldownLimiter::new(
        cache.clone(),
        settings.cooldown.window,
        settings.cooldown.cas_retry_budget.get(),
    ));
    let placements = Arc::new(PlacementService::new(
        placements_repo.clone(),
        cache.clone(),
        limiter.clone(),
        settings.canvas.bounds,
        settings.relay.channel.clone(),
    ));
    let canvas = Arc::new(CanvasService::new(placements_repo, cache.clone()));

    canvas
        .warm_cache()
        .await
        .map_err(|err| AppError::unexpected(format!("cache warm-up failed: {err}")))?;

    let sessions = Arc::new(SessionManager::new());
    let relay = RelayBridge::new(
        subscriber,
        settings.relay.channel.clone(),
        sessions.clone(),
        RelayBackoff {
            initial: settings.relay.reconnect_initial,
            max: settings.relay.reconnect_max,
        },
    );
    let relay_handle = relay.spawn();

    let api_state = ApiState {
        placements,
        canvas,
        limiter,
        verifier: Arc::new(GatewayHeaderVerifier::new(
            settings.auth.contributor_header.clone(),
        )),
        health: health_repo.clone(),
        cache: cache.clone(),
    };
    let events_state = EventsState {
        sessions,
        stream: ViewerStreamSettings {
            session_buffer: settings.fanout.session_buffer.get() as usize,
            delivery_timeout: settings.fanout.delivery_timeout,
            heartbeat: settings.fanout.heartbeat,
        },
        health: health_repo,
        cache,
    };

    let result = serve_http(&settings, api_state, events_state).await;

    relay_handle.abort();
    let _ = relay_handle.await;

    result
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(InfraError::from)?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn serve_http(
    settings: &config::Settings,
    api_state: ApiState,
    events_state: EventsState,
) -> Result<(), AppError> {
    let api_router = http::build_api_router(api_state);
    let events_router = http::build_events_router(events_state);

    let api_listener = tokio::net::TcpListener::bind(settings.server.api_addr)
        .await
        .map_err(InfraError::from)?;
    let events_listener = tokio::net::TcpListener::bind(settings.server.events_addr)
        .await
        .map_err(InfraError::from)?;

    info!(
        target = "pixelwar::serve",
        api_addr = %settings.server.api_addr,
        events_addr = %settings.server.events_addr,
        "Listeners bound"
    );

    let api_server = axum::serve(api_listener, api_router.into_make_service());
    let events_server = axum::serve(events_listener, events_router.into_make_service());

    try_join!(api_server, events_server)
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}
