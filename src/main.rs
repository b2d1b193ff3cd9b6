use std::{process, sync::Arc};

use apalis::{
    layers::WorkerBuilderExt,
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_sql::{Config as ApalisSqlConfig, postgres::PostgresStorage};
use pressroom::{
    application::{
        document::ComrakDocumentBuilder,
        error::AppError,
        jobs::JobWorkerContext,
        render::{
            PdfRenderConfig, PdfRenderOrchestrator, ProcessRenderer, RenderCollaborators,
            process_render_report_pdf_job, request_render,
        },
    },
    config,
    domain::types::JobType,
    infra::{
        blobs::FilesystemBlobStore, db::PostgresRepositories, error::InfraError,
        events::PgStatusNotifier, telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    if dispatcher::has_been_set() {
        error!(error = %report.joined(), "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %report.joined(), "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "failed to load configuration: {err}"
        )))
    })?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Worker(Box::<config::WorkerArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Worker(_) => run_worker(settings).await,
        config::Command::Render(args) => run_render(settings, args.job_id).await,
        config::Command::Enqueue(args) => run_enqueue(settings, args.artifact_id).await,
    }
}

async fn run_worker(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let orchestrator = build_orchestrator(repositories.clone(), &settings)?;

    let storage = PostgresStorage::new_with_config(
        repositories.pool().clone(),
        ApalisSqlConfig::new(JobType::RenderReportPdf.as_str()),
    );
    let worker = WorkerBuilder::new("render-report-pdf-worker")
        .concurrency(settings.jobs.render_concurrency.get() as usize)
        .data(JobWorkerContext {
            orchestrator: Arc::new(orchestrator),
        })
        .backend(storage)
        .build_fn(process_render_report_pdf_job);

    info!(
        target = "pressroom::worker",
        concurrency = settings.jobs.render_concurrency.get(),
        renderer = %settings.renderer.program.display(),
        "render worker started"
    );

    Monitor::new()
        .register(worker)
        .run()
        .await
        .map_err(|err| AppError::from(InfraError::queue(err.to_string())))
}

async fn run_render(settings: config::Settings, job_id: Uuid) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let orchestrator = build_orchestrator(repositories, &settings)?;

    orchestrator.start_render(job_id).await?;
    Ok(())
}

async fn run_enqueue(settings: config::Settings, artifact_id: Uuid) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;

    let job = request_render(
        repositories.as_ref(),
        repositories.as_ref(),
        repositories.as_ref(),
        artifact_id,
    )
    .await?;

    println!("{}", job.id);
    Ok(())
}

fn build_orchestrator(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<PdfRenderOrchestrator, AppError> {
    let renderer_settings = &settings.renderer;

    let blobs = FilesystemBlobStore::new(settings.storage.directory.clone())
        .map_err(|err| AppError::from(InfraError::Io(err)))?;
    let renderer = ProcessRenderer::new(
        renderer_settings.program.clone(),
        renderer_settings.args.clone(),
    )
    .with_max_output_bytes(renderer_settings.max_output_bytes);
    let notifier = PgStatusNotifier::new(repositories.pool().clone());

    let deps = RenderCollaborators {
        jobs: repositories.clone(),
        artifacts: repositories,
        documents: Arc::new(ComrakDocumentBuilder::new(
            renderer_settings.max_document_bytes,
        )),
        renderer: Arc::new(renderer),
        blobs: Arc::new(blobs),
        notifier: Arc::new(notifier),
    };

    let config = PdfRenderConfig {
        assets_dir: renderer_settings.assets_dir.clone(),
        browser_binary: renderer_settings.browser_binary.clone(),
        timeout: renderer_settings.timeout,
        disable_sandbox: renderer_settings.disable_sandbox,
        allow_remote_requests: renderer_settings.allow_remote_requests,
        workdir_root: settings.storage.workdir_root.clone(),
    };

    Ok(PdfRenderOrchestrator::new(deps, config))
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}
