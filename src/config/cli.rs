use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the pixelwar binary.
#[derive(Debug, Parser)]
#[command(name = "pixelwar", version, about = "Shared pixel canvas server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PIXELWAR_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the placement API, the viewer event stream and the relay.
    Serve(Box<ServeArgs>),
    /// Apply database migrations and exit.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the placement API port.
    #[arg(long = "server-api-port", value_name = "PORT")]
    pub api_port: Option<u16>,

    /// Override the viewer event stream port.
    #[arg(long = "server-events-port", value_name = "PORT")]
    pub events_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the canvas width.
    #[arg(long = "canvas-width", value_name = "CELLS")]
    pub canvas_width: Option<u32>,

    /// Override the canvas height.
    #[arg(long = "canvas-height", value_name = "CELLS")]
    pub canvas_height: Option<u32>,

    /// Override the per-contributor cooldown window.
    #[arg(long = "cooldown-window-seconds", value_name = "SECONDS")]
    pub cooldown_window_seconds: Option<u64>,

    /// Override the update channel name.
    #[arg(long = "relay-channel", value_name = "NAME")]
    pub relay_channel: Option<String>,

    /// Override the header carrying the verified contributor identity.
    #[arg(long = "auth-contributor-header", value_name = "HEADER")]
    pub auth_contributor_header: Option<String>,
}
