use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use uuid::Uuid;

/// Command-line arguments for the Pressroom binary.
#[derive(Debug, Parser)]
#[command(name = "pressroom", version, about = "Report PDF render worker")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PRESSROOM_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Consume queued render jobs until interrupted.
    Worker(Box<WorkerArgs>),
    /// Render a single job in the foreground, bypassing the queue.
    Render(RenderArgs),
    /// Create a render job for an artifact and queue it.
    Enqueue(EnqueueArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub overrides: SharedOverrides,

    /// Override the render worker concurrency.
    #[arg(long = "jobs-render-concurrency", value_name = "COUNT")]
    pub jobs_render_concurrency: Option<u32>,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub overrides: SharedOverrides,

    /// Render job to execute.
    #[arg(value_name = "JOB_ID")]
    pub job_id: Uuid,
}

#[derive(Debug, Args, Clone)]
pub struct EnqueueArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Artifact to render.
    #[arg(value_name = "ARTIFACT_ID")]
    pub artifact_id: Uuid,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RendererOverrides {
    /// Override the renderer executable.
    #[arg(long = "renderer-program", value_name = "PATH", value_hint = ValueHint::ExecutablePath)]
    pub program: Option<PathBuf>,

    /// Override the headless browser binary handed to the renderer.
    #[arg(long = "renderer-browser", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub browser_binary: Option<PathBuf>,

    /// Override the renderer timeout; unparsable or sub-second values fall back to the default.
    #[arg(long = "renderer-timeout-seconds", value_name = "SECONDS")]
    pub timeout_seconds: Option<String>,

    /// Run the browser without its sandbox.
    #[arg(
        long = "renderer-disable-sandbox",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub disable_sandbox: Option<bool>,

    /// Override the assets directory served to the renderer.
    #[arg(long = "renderer-assets-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub assets_dir: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SharedOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(flatten)]
    pub renderer: RendererOverrides,

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

    /// Override the directory rendered PDFs are stored under.
    #[arg(long = "storage-directory", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub storage_directory: Option<PathBuf>,
}
