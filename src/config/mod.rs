//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{
    CliArgs, Command, DatabaseOverride, EnqueueArgs, RenderArgs, RendererOverrides,
    SharedOverrides, WorkerArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "pressroom";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_JOB_RENDER_CONCURRENCY: u32 = 2;
const DEFAULT_RENDERER_PROGRAM: &str = "pressroom-renderer";
const DEFAULT_ASSETS_DIR: &str = "assets";
const DEFAULT_STORAGE_DIR: &str = "storage";
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 90;
const DEFAULT_MAX_DOCUMENT_BYTES: u64 = 2 * 1024 * 1024;
const DEFAULT_MAX_OUTPUT_BYTES: u64 = 64 * 1024;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub jobs: JobsSettings,
    pub renderer: RendererSettings,
    pub storage: StorageSettings,
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
pub struct JobsSettings {
    pub render_concurrency: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub program: PathBuf,
    /// Arguments placed before the per-job flags, e.g. a renderer script.
    pub args: Vec<String>,
    pub browser_binary: Option<PathBuf>,
    pub assets_dir: PathBuf,
    pub timeout: Duration,
    pub disable_sandbox: bool,
    pub allow_remote_requests: bool,
    pub max_document_bytes: usize,
    pub max_output_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub directory: PathBuf,
    /// Parent for per-job scratch directories; the system temp dir when unset.
    pub workdir_root: Option<PathBuf>,
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

    builder = builder.add_source(Environment::with_prefix("PRESSROOM").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Worker(args)) => raw.apply_worker_overrides(args),
        Some(Command::Render(args)) => raw.apply_shared_overrides(&args.overrides),
        Some(Command::Enqueue(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_worker_overrides(&WorkerArgs::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

/// Interpret a configured renderer timeout. Anything that is not a whole
/// number of seconds of at least one yields the default.
pub fn parse_timeout_seconds(raw: Option<&str>) -> Duration {
    let seconds = raw
        .map(str::trim)
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value >= 1)
        .and_then(|value| u64::try_from(value).ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    Duration::from_secs(seconds)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    jobs: RawJobsSettings,
    renderer: RawRendererSettings,
    storage: RawStorageSettings,
}

impl RawSettings {
    fn apply_worker_overrides(&mut self, args: &WorkerArgs) {
        self.apply_shared_overrides(&args.overrides);
        if let Some(value) = args.jobs_render_concurrency {
            self.jobs.render_concurrency = Some(value);
        }
    }

    fn apply_shared_overrides(&mut self, overrides: &SharedOverrides) {
        self.apply_database_override(&overrides.database);
        self.apply_renderer_overrides(&overrides.renderer);

        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(directory) = overrides.storage_directory.as_ref() {
            self.storage.directory = Some(directory.clone());
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }

    fn apply_renderer_overrides(&mut self, overrides: &RendererOverrides) {
        if let Some(program) = overrides.program.as_ref() {
            self.renderer.program = Some(program.clone());
        }
        if let Some(browser) = overrides.browser_binary.as_ref() {
            self.renderer.browser_binary = Some(browser.clone());
        }
        if let Some(timeout) = overrides.timeout_seconds.as_ref() {
            self.renderer.timeout_seconds = Some(timeout.clone());
        }
        if let Some(disable) = overrides.disable_sandbox {
            self.renderer.disable_sandbox = Some(disable);
        }
        if let Some(dir) = overrides.assets_dir.as_ref() {
            self.renderer.assets_dir = Some(dir.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            jobs,
            renderer,
            storage,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            jobs: build_jobs_settings(jobs)?,
            renderer: build_renderer_settings(renderer)?,
            storage: build_storage_settings(storage)?,
        })
    }
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

fn build_jobs_settings(jobs: RawJobsSettings) -> Result<JobsSettings, LoadError> {
    let render = jobs
        .render_concurrency
        .unwrap_or(DEFAULT_JOB_RENDER_CONCURRENCY);

    Ok(JobsSettings {
        render_concurrency: non_zero_u32(render.into(), "jobs.render_concurrency")?,
    })
}

fn build_renderer_settings(renderer: RawRendererSettings) -> Result<RendererSettings, LoadError> {
    let program = renderer
        .program
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RENDERER_PROGRAM));
    if program.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "renderer.program",
            "path must not be empty",
        ));
    }

    let browser_binary = renderer
        .browser_binary
        .filter(|path| !path.as_os_str().is_empty());

    let assets_dir = renderer
        .assets_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSETS_DIR));
    if assets_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "renderer.assets_dir",
            "path must not be empty",
        ));
    }

    let max_document_bytes = usize_limit(
        renderer
            .max_document_bytes
            .unwrap_or(DEFAULT_MAX_DOCUMENT_BYTES),
        "renderer.max_document_bytes",
    )?;
    let max_output_bytes = usize_limit(
        renderer.max_output_bytes.unwrap_or(DEFAULT_MAX_OUTPUT_BYTES),
        "renderer.max_output_bytes",
    )?;

    Ok(RendererSettings {
        program,
        args: renderer.args.unwrap_or_default(),
        browser_binary,
        assets_dir,
        timeout: parse_timeout_seconds(renderer.timeout_seconds.as_deref()),
        disable_sandbox: renderer.disable_sandbox.unwrap_or(false),
        allow_remote_requests: renderer.allow_remote_requests.unwrap_or(false),
        max_document_bytes,
        max_output_bytes,
    })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let directory = storage
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "storage.directory",
            "path must not be empty",
        ));
    }

    Ok(StorageSettings {
        directory,
        workdir_root: storage
            .workdir_root
            .filter(|path| !path.as_os_str().is_empty()),
    })
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
struct RawJobsSettings {
    render_concurrency: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRendererSettings {
    program: Option<PathBuf>,
    args: Option<Vec<String>>,
    browser_binary: Option<PathBuf>,
    assets_dir: Option<PathBuf>,
    // Kept as text so a malformed value degrades to the default instead of failing startup.
    timeout_seconds: Option<String>,
    disable_sandbox: Option<bool>,
    allow_remote_requests: Option<bool>,
    max_document_bytes: Option<u64>,
    max_output_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    directory: Option<PathBuf>,
    workdir_root: Option<PathBuf>,
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

fn usize_limit(value: u64, key: &'static str) -> Result<usize, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    usize::try_from(value)
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))
}

#[cfg(test)]
mod tests;
