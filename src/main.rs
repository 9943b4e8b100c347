use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use multicam_recorder::{ApiServer, BatchReport, Config, Orchestrator, VideoFormat};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    // Load configuration
    let (mut config, load_error) = match matches.get_one::<String>("config") {
        Some(path) => (Config::load_from(path)?, None),
        None => match Config::load() {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        },
    };
    apply_cli_overrides(&mut config, &matches)?;

    // Initialize logging
    let filter = EnvFilter::try_from_env("MULTICAM_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(e) = load_error {
        warn!("Failed to load config, using defaults: {:#}", e);
    }
    config.validate()?;

    info!("🚀 Multicam Recorder starting...");
    info!("{}", config.summary());

    let orchestrator = Orchestrator::from_config(&config)?;

    match matches.subcommand() {
        Some(("list", _)) => list_cameras(&orchestrator).await,
        Some(("capture", sub)) => capture(&orchestrator, sub).await,
        _ => serve(orchestrator, config).await,
    }
}

fn cli() -> Command {
    Command::new("Multicam Recorder")
        .version(env!("CARGO_PKG_VERSION"))
        .author("TigreRoll")
        .about("Records video from multiple networked cameras")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file")
                .global(true),
        )
        .arg(
            Arg::new("output-dir")
                .short('o')
                .long("output-dir")
                .value_name("DIR")
                .help("Directory for recorded videos")
                .global(true),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .help("Video format (mp4 or avi)")
                .global(true),
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("NUM")
                .help("Maximum number of cameras recording at once")
                .global(true),
        )
        .subcommand(
            Command::new("serve").about("Run the HTTP control API (default)").arg(
                Arg::new("port")
                    .short('p')
                    .long("port")
                    .value_name("PORT")
                    .help("Port to listen on"),
            ),
        )
        .subcommand(Command::new("list").about("List configured cameras"))
        .subcommand(
            Command::new("capture")
                .about("Record cameras in the foreground and wait for the results")
                .arg(
                    Arg::new("camera")
                        .long("camera")
                        .value_name("ID")
                        .help("Camera to record (repeatable, default: all enabled)")
                        .action(ArgAction::Append),
                ),
        )
}

fn apply_cli_overrides(config: &mut Config, matches: &ArgMatches) -> Result<()> {
    if let Some(dir) = matches.get_one::<String>("output-dir") {
        config.capture.output_dir = PathBuf::from(dir);
    }
    if let Some(format) = matches.get_one::<String>("format") {
        config.capture.default_format = format.parse::<VideoFormat>()?;
    }
    if let Some(workers) = matches.get_one::<String>("workers") {
        config.capture.max_concurrent_jobs = workers.parse().context("Invalid --workers value")?;
    }
    if let Some(("serve", sub)) = matches.subcommand() {
        if let Some(port) = sub.get_one::<String>("port") {
            config.server.port = port.parse().context("Invalid --port value")?;
        }
    }
    Ok(())
}

async fn serve(orchestrator: Orchestrator, config: Config) -> Result<()> {
    let server = ApiServer::new(orchestrator, Arc::new(config));

    tokio::select! {
        result = server.start() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("👋 Shutting down");
            Ok(())
        }
    }
}

async fn list_cameras(orchestrator: &Orchestrator) -> Result<()> {
    let cameras = orchestrator.cameras().list().await;
    if cameras.is_empty() {
        println!("No cameras configured");
        return Ok(());
    }

    println!("{:<12} {:<24} {:>5} {:>9} {:<8} URL", "ID", "NAME", "FPS", "DURATION", "ENABLED");
    for camera in cameras {
        println!(
            "{:<12} {:<24} {:>5} {:>8}s {:<8} {}",
            camera.id, camera.name, camera.fps, camera.duration, camera.enabled, camera.url
        );
    }
    Ok(())
}

async fn capture(orchestrator: &Orchestrator, matches: &ArgMatches) -> Result<()> {
    let requested: Vec<String> = matches
        .get_many::<String>("camera")
        .map(|ids| ids.cloned().collect())
        .unwrap_or_default();

    let outcome = if requested.is_empty() {
        orchestrator.dispatch_all().await?
    } else {
        orchestrator.dispatch(&requested).await
    };

    let report = tokio::select! {
        report = orchestrator.summarize(&outcome) => report,
        _ = tokio::signal::ctrl_c() => {
            warn!("🛑 Interrupted, stopping {} captures", outcome.tasks.len());
            for task_id in outcome.tasks.values() {
                orchestrator.stop(task_id).await?;
            }
            orchestrator.summarize(&outcome).await
        }
    };

    print_report(&report);
    if let Some(dir) = &orchestrator.settings().reports_dir {
        report.write_to(dir).await?;
    }

    if report.successful == 0 && report.total_cameras > 0 {
        anyhow::bail!("no camera was recorded successfully");
    }
    Ok(())
}

fn print_report(report: &BatchReport) {
    println!();
    println!("Capture results ({}):", report.video_format);
    for result in &report.results {
        let size = result
            .size_mb
            .map(|mb| format!("{:.2} MB", mb))
            .unwrap_or_else(|| "-".to_string());
        let path = result
            .output_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let mark = if result.success { "✅" } else { "❌" };
        println!("{} {:<12} {:>10}  {}  {}", mark, result.camera_id, size, path, result.message);
    }
    for (camera_id, reason) in &report.rejected {
        println!("❌ {:<12} {}", camera_id, reason);
    }
    println!(
        "{}/{} cameras recorded successfully",
        report.successful, report.total_cameras
    );
}
