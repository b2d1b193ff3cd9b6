use std::io::Write;

use serial_test::serial;

use super::*;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_are_sandboxed_and_block_remote_requests() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert!(!settings.renderer.disable_sandbox);
    assert!(!settings.renderer.allow_remote_requests);
    assert_eq!(settings.renderer.timeout, Duration::from_secs(90));
    assert_eq!(settings.renderer.program, PathBuf::from("pressroom-renderer"));
    assert!(settings.renderer.browser_binary.is_none());
    assert_eq!(settings.jobs.render_concurrency.get(), 2);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn timeout_falls_back_on_unusable_values() {
    assert_eq!(parse_timeout_seconds(None), Duration::from_secs(90));
    assert_eq!(parse_timeout_seconds(Some("abc")), Duration::from_secs(90));
    assert_eq!(parse_timeout_seconds(Some("0")), Duration::from_secs(90));
    assert_eq!(parse_timeout_seconds(Some("-5")), Duration::from_secs(90));
    assert_eq!(parse_timeout_seconds(Some("2.5")), Duration::from_secs(90));
    assert_eq!(parse_timeout_seconds(Some(" 1 ")), Duration::from_secs(1));
    assert_eq!(parse_timeout_seconds(Some("240")), Duration::from_secs(240));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.renderer.timeout_seconds = Some("30".to_string());
    raw.logging.level = Some("info".to_string());

    let args = WorkerArgs {
        overrides: SharedOverrides {
            renderer: RendererOverrides {
                timeout_seconds: Some("45".to_string()),
                disable_sandbox: Some(true),
                ..Default::default()
            },
            log_level: Some("debug".to_string()),
            ..Default::default()
        },
        jobs_render_concurrency: Some(6),
    };

    raw.apply_worker_overrides(&args);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.renderer.timeout, Duration::from_secs(45));
    assert!(settings.renderer.disable_sandbox);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.jobs.render_concurrency.get(), 6);
}

#[test]
fn zero_concurrency_is_rejected() {
    let mut raw = RawSettings::default();
    raw.jobs.render_concurrency = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero concurrency");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "jobs.render_concurrency",
            ..
        }
    ));
}

#[test]
#[serial]
fn config_file_values_are_layered_and_numeric_timeout_is_accepted() {
    let file = write_config(
        r#"
[renderer]
program = "node"
args = ["scripts/render.mjs"]
timeout_seconds = 12
allow_remote_requests = true

[storage]
directory = "/var/lib/pressroom"
"#,
    );
    let path = file.path().to_string_lossy().into_owned();
    let args = CliArgs::parse_from(["pressroom", "--config-file", path.as_str(), "worker"]);

    let settings = load(&args).expect("settings");

    assert_eq!(settings.renderer.program, PathBuf::from("node"));
    assert_eq!(settings.renderer.args, vec!["scripts/render.mjs".to_string()]);
    assert_eq!(settings.renderer.timeout, Duration::from_secs(12));
    assert!(settings.renderer.allow_remote_requests);
    assert_eq!(
        settings.storage.directory,
        PathBuf::from("/var/lib/pressroom")
    );
}

#[test]
#[serial]
fn environment_timeout_garbage_degrades_to_default() {
    // SAFETY: serialised with every other test that touches the environment.
    unsafe { std::env::set_var("PRESSROOM__RENDERER__TIMEOUT_SECONDS", "soon") };
    let result = load(&CliArgs::parse_from(["pressroom"]));
    unsafe { std::env::remove_var("PRESSROOM__RENDERER__TIMEOUT_SECONDS") };

    let settings = result.expect("settings");
    assert_eq!(settings.renderer.timeout, Duration::from_secs(90));
}

#[test]
fn parse_render_arguments() {
    let job_id = uuid::Uuid::new_v4();
    let job_arg = job_id.to_string();
    let args = CliArgs::parse_from([
        "pressroom",
        "render",
        "--database-url",
        "postgres://example",
        "--renderer-timeout-seconds",
        "5",
        job_arg.as_str(),
    ]);

    match args.command.expect("render command") {
        Command::Render(render) => {
            assert_eq!(render.job_id, job_id);
            assert_eq!(
                render.overrides.database.database_url.as_deref(),
                Some("postgres://example")
            );
            assert_eq!(
                render.overrides.renderer.timeout_seconds.as_deref(),
                Some("5")
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_enqueue_arguments() {
    let artifact_id = uuid::Uuid::new_v4();
    let artifact_arg = artifact_id.to_string();
    let args = CliArgs::parse_from(["pressroom", "enqueue", artifact_arg.as_str()]);

    match args.command.expect("enqueue command") {
        Command::Enqueue(enqueue) => {
            assert_eq!(enqueue.artifact_id, artifact_id);
            assert!(enqueue.database.database_url.is_none());
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn default_to_worker_command() {
    let args = CliArgs::parse_from(["pressroom"]);
    let command = args
        .command
        .unwrap_or(Command::Worker(Box::<WorkerArgs>::default()));
    assert!(matches!(command, Command::Worker(_)));
}
