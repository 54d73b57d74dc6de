mod app;
mod config;
mod error;
mod handler;
mod history;
mod metrics;
mod registry;
mod runner;
mod scheduler;
mod script_store;
mod store;
mod templates;

use anyhow::Context;
use app::App;
use clap::Parser;
use common::{Reply, Request, Response};
use config::{Config, LoggingConfig};
use metrics::MetricsCollector;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (.yaml, .yml or .toml)
    #[arg(short, long, env = "SCRIPTSCHED_CONFIG")]
    config: Option<PathBuf>,
}

type SharedApp = Arc<Mutex<App>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    setup_logging(&config.logging);
    log::info!("Starting scriptsched-daemon...");

    let metrics = Arc::new(MetricsCollector::new());
    let app = App::open(&config.storage, metrics, chrono::Utc::now());
    let app: SharedApp = Arc::new(Mutex::new(app));

    let socket_path = &config.server.socket_path;
    if let Some(parent) = socket_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create socket directory {:?}", parent))?;
    }
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("Failed to bind {:?}", socket_path))?;
    log::info!("Listening on {:?}", socket_path);

    // Set socket permissions to allow all users to connect
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(socket_path)?.permissions();
    perms.set_mode(0o666);
    std::fs::set_permissions(socket_path, perms)?;

    if config.server.tick_interval_ms > 0 {
        spawn_ticker(app.clone(), config.server.tick_interval_ms);
    } else {
        log::info!("Background ticking disabled; due jobs run when a client connects");
    }

    loop {
        let (socket, _) = listener.accept().await?;
        let app = app.clone();
        tokio::spawn(async move {
            if let Err(e) = serve(socket, app).await {
                log::error!("Connection error: {:#}", e);
            }
        });
    }
}

/// Checks for due jobs on a fixed period under the same lock as requests.
fn spawn_ticker(app: SharedApp, period_ms: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_millis(period_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let app = app.clone();
            let result = tokio::task::spawn_blocking(move || {
                let mut app = app.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                app.tick(chrono::Utc::now())
            })
            .await;
            match result {
                Ok(0) => {}
                Ok(n) => log::info!("Tick ran {} job(s)", n),
                Err(e) => log::error!("Scheduler tick panicked: {}", e),
            }
        }
    });
}

/// One JSON request per line, one JSON reply per line.
async fn serve(socket: UnixStream, app: SharedApp) -> anyhow::Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<Request>(&line) {
            Ok(req) => {
                log::info!("Received request: {:?}", req);
                let app = app.clone();
                tokio::task::spawn_blocking(move || {
                    let mut app = app.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    handler::handle_request(&mut app, req, chrono::Utc::now())
                })
                .await
                .context("Request handler panicked")?
            }
            Err(e) => {
                log::error!("failed to deserialize request; err = {:?}", e);
                Reply {
                    warnings: Vec::new(),
                    response: Response::Error(format!("Invalid request: {}", e)),
                }
            }
        };

        let mut bytes = serde_json::to_vec(&reply)?;
        bytes.push(b'\n');
        writer.write_all(&bytes).await?;
    }
    Ok(())
}

fn setup_logging(logging: &LoggingConfig) {
    if let Err(e) = setup_file_logging(logging) {
        env_logger::Builder::new()
            .filter_level(logging.level_filter())
            .init();
        log::warn!("File logging unavailable ({}), logging to stderr only", e);
    }
}

fn setup_file_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    for path in [&logging.output, &logging.jobs_output] {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
    }

    let base_config = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d][%H:%M:%S"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(logging.level_filter());

    // Main log file: Filter OUT job_output
    let main_log = fern::Dispatch::new()
        .filter(|metadata| metadata.target() != "job_output")
        .chain(std::io::stdout())
        .chain(fern::log_file(&logging.output)?);

    // Jobs log file: Filter IN job_output
    let jobs_log = fern::Dispatch::new()
        .filter(|metadata| metadata.target() == "job_output")
        .chain(fern::log_file(&logging.jobs_output)?);

    base_config
        .chain(main_log)
        .chain(jobs_log)
        .apply()?;

    Ok(())
}
