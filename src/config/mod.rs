//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, num::NonZeroU32, str::FromStr, time::Duration};

use axum::http::HeaderName;
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::canvas::CanvasBounds;

pub use cli::{CliArgs, Command, DatabaseOverride, MigrateArgs, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "pixelwar";
const ENV_PREFIX: &str = "PIXELWAR";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_API_PORT: u16 = 8000;
const DEFAULT_EVENTS_PORT: u16 = 8001;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CANVAS_WIDTH: u32 = 50;
const DEFAULT_CANVAS_HEIGHT: u32 = 50;
const DEFAULT_COOLDOWN_WINDOW_SECS: u64 = 9;
const DEFAULT_CAS_RETRY_BUDGET: u32 = 5;
const DEFAULT_CHANNEL_CAPACITY: u32 = 1024;
const DEFAULT_RELAY_CHANNEL: &str = "pixel_updates";
const DEFAULT_RECONNECT_INITIAL_MS: u64 = 100;
const DEFAULT_RECONNECT_MAX_MS: u64 = 5_000;
const DEFAULT_SESSION_BUFFER: u32 = 64;
const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_HEARTBEAT_SECS: u64 = 15;
const DEFAULT_CONTRIBUTOR_HEADER: &str = "x-contributor-id";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub canvas: CanvasSettings,
    pub cooldown: CooldownSettings,
    pub cache: CacheSettings,
    pub relay: RelaySettings,
    pub fanout: FanoutSettings,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub api_addr: SocketAddr,
    pub events_addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CanvasSettings {
    pub bounds: CanvasBounds,
}

#[derive(Debug, Clone)]
pub struct CooldownSettings {
    pub window: Duration,
    pub cas_retry_budget: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub channel_capacity: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub channel: String,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

#[derive(Debug, Clone)]
pub struct FanoutSettings {
    pub session_buffer: NonZeroU32,
    pub delivery_timeout: Duration,
    pub heartbeat: Duration,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub contributor_header: HeaderName,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    canvas: RawCanvasSettings,
    cooldown: RawCooldownSettings,
    cache: RawCacheSettings,
    relay: RawRelaySettings,
    fanout: RawFanoutSettings,
    auth: RawAuthSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_database_override(&overrides.database);

        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.api_port {
            self.server.api_port = Some(port);
        }
        if let Some(port) = overrides.events_port {
            self.server.events_port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(width) = overrides.canvas_width {
            self.canvas.width = Some(width);
        }
        if let Some(height) = overrides.canvas_height {
            self.canvas.height = Some(height);
        }
        if let Some(window) = overrides.cooldown_window_seconds {
            self.cooldown.window_seconds = Some(window);
        }
        if let Some(channel) = overrides.relay_channel.as_ref() {
            self.relay.channel = Some(channel.clone());
        }
        if let Some(header) = overrides.auth_contributor_header.as_ref() {
            self.auth.contributor_header = Some(header.clone());
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            canvas,
            cooldown,
            cache,
            relay,
            fanout,
            auth,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            canvas: build_canvas_settings(canvas)?,
            cooldown: build_cooldown_settings(cooldown)?,
            cache: build_cache_settings(cache)?,
            relay: build_relay_settings(relay)?,
            fanout: build_fanout_settings(fanout)?,
            auth: build_auth_settings(auth)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let api_port = server.api_port.unwrap_or(DEFAULT_API_PORT);
    if api_port == 0 {
        return Err(LoadError::invalid(
            "server.api_port",
            "port must be greater than zero",
        ));
    }

    let events_port = server.events_port.unwrap_or(DEFAULT_EVENTS_PORT);
    if events_port == 0 {
        return Err(LoadError::invalid(
            "server.events_port",
            "port must be greater than zero",
        ));
    }
    if events_port == api_port {
        return Err(LoadError::invalid(
            "server.events_port",
            "must differ from server.api_port",
        ));
    }

    let api_addr = parse_socket_addr(&host, api_port)
        .map_err(|reason| LoadError::invalid("server.api_addr", reason))?;
    let events_addr = parse_socket_addr(&host, events_port)
        .map_err(|reason| LoadError::invalid("server.events_addr", reason))?;

    Ok(ServerSettings {
        api_addr,
        events_addr,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_canvas_settings(canvas: RawCanvasSettings) -> Result<CanvasSettings, LoadError> {
    let width = canvas.width.unwrap_or(DEFAULT_CANVAS_WIDTH);
    let height = canvas.height.unwrap_or(DEFAULT_CANVAS_HEIGHT);
    let bounds = CanvasBounds::new(width, height)
        .map_err(|err| LoadError::invalid("canvas", err.to_string()))?;

    Ok(CanvasSettings { bounds })
}

fn build_cooldown_settings(cooldown: RawCooldownSettings) -> Result<CooldownSettings, LoadError> {
    let window_seconds = cooldown
        .window_seconds
        .unwrap_or(DEFAULT_COOLDOWN_WINDOW_SECS);
    if window_seconds == 0 {
        return Err(LoadError::invalid(
            "cooldown.window_seconds",
            "must be greater than zero",
        ));
    }

    let cas_retry_budget = non_zero_u32(
        cooldown
            .cas_retry_budget
            .unwrap_or(DEFAULT_CAS_RETRY_BUDGET)
            .into(),
        "cooldown.cas_retry_budget",
    )?;

    Ok(CooldownSettings {
        window: Duration::from_secs(window_seconds),
        cas_retry_budget,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let channel_capacity = non_zero_u32(
        cache
            .channel_capacity
            .unwrap_or(DEFAULT_CHANNEL_CAPACITY)
            .into(),
        "cache.channel_capacity",
    )?;

    Ok(CacheSettings { channel_capacity })
}

fn build_relay_settings(relay: RawRelaySettings) -> Result<RelaySettings, LoadError> {
    let channel = relay
        .channel
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_RELAY_CHANNEL.to_string());
    if channel.is_empty() {
        return Err(LoadError::invalid("relay.channel", "must not be empty"));
    }

    let initial_ms = relay
        .reconnect_initial_ms
        .unwrap_or(DEFAULT_RECONNECT_INITIAL_MS);
    if initial_ms == 0 {
        return Err(LoadError::invalid(
            "relay.reconnect_initial_ms",
            "must be greater than zero",
        ));
    }
    let max_ms = relay.reconnect_max_ms.unwrap_or(DEFAULT_RECONNECT_MAX_MS);
    if max_ms < initial_ms {
        return Err(LoadError::invalid(
            "relay.reconnect_max_ms",
            "must not be smaller than relay.reconnect_initial_ms",
        ));
    }

    Ok(RelaySettings {
        channel,
        reconnect_initial: Duration::from_millis(initial_ms),
        reconnect_max: Duration::from_millis(max_ms),
    })
}

fn build_fanout_settings(fanout: RawFanoutSettings) -> Result<FanoutSettings, LoadError> {
    let session_buffer = non_zero_u32(
        fanout
            .session_buffer
            .unwrap_or(DEFAULT_SESSION_BUFFER)
            .into(),
        "fanout.session_buffer",
    )?;

    let delivery_timeout_ms = fanout
        .delivery_timeout_ms
        .unwrap_or(DEFAULT_DELIVERY_TIMEOUT_MS);
    if delivery_timeout_ms == 0 {
        return Err(LoadError::invalid(
            "fanout.delivery_timeout_ms",
            "must be greater than zero",
        ));
    }

    let heartbeat_seconds = fanout.heartbeat_seconds.unwrap_or(DEFAULT_HEARTBEAT_SECS);
    if heartbeat_seconds == 0 {
        return Err(LoadError::invalid(
            "fanout.heartbeat_seconds",
            "must be greater than zero",
        ));
    }

    Ok(FanoutSettings {
        session_buffer,
        delivery_timeout: Duration::from_millis(delivery_timeout_ms),
        heartbeat: Duration::from_secs(heartbeat_seconds),
    })
}

fn build_auth_settings(auth: RawAuthSettings) -> Result<AuthSettings, LoadError> {
    let header = auth
        .contributor_header
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_CONTRIBUTOR_HEADER.to_string());
    let contributor_header = HeaderName::from_bytes(header.as_bytes()).map_err(|err| {
        LoadError::invalid("auth.contributor_header", format!("`{header}`: {err}"))
    })?;

    Ok(AuthSettings { contributor_header })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    api_port: Option<u16>,
    events_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCanvasSettings {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCooldownSettings {
    window_seconds: Option<u64>,
    cas_retry_budget: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    channel_capacity: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRelaySettings {
    channel: Option<String>,
    reconnect_initial_ms: Option<u64>,
    reconnect_max_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFanoutSettings {
    session_buffer: Option<u32>,
    delivery_timeout_ms: Option<u64>,
    heartbeat_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    contributor_header: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
