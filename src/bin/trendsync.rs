use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::sync::{broadcast::error::RecvError, mpsc};

use trendsync::{
    config::{load_with_fallback, AppConfig, ConfigManager},
    logging, report,
    session::SessionStore,
    DashboardEvent, DashboardState, HttpCsvSource, SelectedEntities, SyncOutcome, SyncService,
    TimeWindow,
};

/// YouTube エンゲージメント推移ダッシュボード
#[derive(Parser, Debug)]
#[command(name = "trendsync", version, about, long_about = None)]
struct Cli {
    #[arg(long, global = true, help = "Path to the configuration file (TOML or JSON)")]
    config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        help = "Log level (error, warn, info, debug, trace); RUST_LOG takes precedence"
    )]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Poll the selected source and print updates until Ctrl+C")]
    Watch(ViewArgs),
    #[command(about = "Fetch the selected source once and print the charts")]
    Sync(ViewArgs),
    #[command(about = "Fetch the summary sheet and print the ranked table")]
    Summary {
        #[arg(long, help = "Print JSON instead of a table")]
        json: bool,
    },
    #[command(about = "Remember a display name and unlock the dashboard")]
    Login {
        name: String,
        #[arg(long, help = "Keep the user name after logout")]
        remember: bool,
    },
    #[command(about = "Clear the login flag")]
    Logout,
    #[command(about = "Show session, configuration and sources")]
    Status,
}

#[derive(clap::Args, Debug, Clone)]
struct ViewArgs {
    #[arg(long, help = "Source key (defaults to the configured current source)")]
    source: Option<String>,
    #[arg(long, help = "Time window: 6h, 12h, 1d, 3d, 7d or all")]
    window: Option<TimeWindow>,
    #[arg(long = "member", help = "Member to show (repeatable; defaults to configured selection)")]
    members: Vec<String>,
    #[arg(long, help = "Print chart data as JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_manager = match &cli.config {
        Some(path) => Ok(ConfigManager::with_path(path)),
        None => ConfigManager::new(),
    };
    let (config, load_error) = load_with_fallback(config_manager.as_ref());

    // ガードはプロセス終了まで保持する
    let _log_guard = logging::init_logging(&config.log, cli.log_level.as_deref())?;

    match (&config_manager, load_error) {
        (_, Some(reason)) => {
            tracing::warn!("設定読み込みエラー、デフォルト設定を使用: {}", reason);
        }
        (Ok(manager), None) => {
            let path = manager.config_path().display();
            tracing::debug!(config = %path, "⚙️ Configuration loaded");
        }
        (Err(_), None) => {}
    }

    match cli.command {
        Commands::Watch(args) => watch(&config, &args).await,
        Commands::Sync(args) => sync_once(&config, &args).await,
        Commands::Summary { json } => summary(&config, json).await,
        Commands::Login { name, remember } => {
            let state = SessionStore::new()?.login(&name, remember)?;
            println!("Logged in as {}", state.display_name());
            Ok(())
        }
        Commands::Logout => {
            SessionStore::new()?.logout()?;
            println!("Logged out");
            Ok(())
        }
        Commands::Status => status(config_manager.as_ref().ok(), &config),
    }
}

/// ダッシュボード系コマンドの前提チェックとサービス構築
fn build_service(config: &AppConfig, args: &ViewArgs) -> anyhow::Result<Arc<SyncService>> {
    let session = SessionStore::new()?.require_login()?;
    tracing::info!(user = %session.display_name(), "👤 Session active");

    let state = DashboardState::new(&config.dashboard);
    if let Some(source) = &args.source {
        state.set_current_source(source);
    }
    if let Some(window) = args.window {
        state.set_time_window(window);
    }
    if !args.members.is_empty() {
        state.set_selected(args.members.iter().cloned().collect::<SelectedEntities>());
    }

    let source = HttpCsvSource::new(config.sync.request_timeout())
        .context("failed to build HTTP client")?;

    Ok(Arc::new(SyncService::new(
        Arc::new(source),
        Arc::new(config.dashboard.clone()),
        &config.sync,
        state,
    )))
}

fn print_charts(service: &SyncService, config: &AppConfig, json: bool) -> anyhow::Result<()> {
    let state = service.state();
    let chart = state.chart_data(Utc::now());
    let views = report::chart_views(&chart, service.config(), config.sync.utc_offset_hours);

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    println!(
        "{}",
        report::status_line(&state.status(), state.latest_update(), config.sync.utc_offset_hours)
    );
    if chart.is_empty() {
        println!("No members selected or no data in the last {}", chart.window);
    } else {
        print!("{}", report::render_chart_summary(&views));
    }
    Ok(())
}

async fn sync_once(config: &AppConfig, args: &ViewArgs) -> anyhow::Result<()> {
    let service = build_service(config, args)?;

    match service.sync_once().await {
        SyncOutcome::Failed(failure) => {
            anyhow::bail!("sync failed ({}): {}", failure.kind, failure.message);
        }
        outcome => tracing::debug!(?outcome, "Sync finished"),
    }

    print_charts(&service, config, args.json)
}

async fn watch(config: &AppConfig, args: &ViewArgs) -> anyhow::Result<()> {
    let service = build_service(config, args)?;
    let mut events = service.broadcaster().subscribe();

    let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
    let runner = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.run(shutdown_rx).await })
    };

    if service.config().summary_endpoint().is_some() {
        match service.load_summary().await {
            Ok(rows) => print!(
                "{}",
                report::render_summary_table(&report::summary_rows(&rows, service.config()))
            ),
            Err(e) => tracing::warn!("⚠️ Summary unavailable: {}", e),
        }
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("🛑 終了シグナルを受信しました");
                let _ = shutdown_tx.send(());
                break;
            }
            event = events.recv() => match event {
                Ok(DashboardEvent::DataChanged { records }) => {
                    tracing::debug!(records, "🔄 Redrawing charts");
                    print_charts(&service, config, args.json)?;
                }
                Ok(DashboardEvent::StatusChanged(status)) if status.is_error() => {
                    eprintln!("{status}");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Event receiver lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    runner.await.context("sync loop panicked")?;
    tracing::info!("👋 trendsync shutting down");
    Ok(())
}

async fn summary(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    SessionStore::new()?.require_login()?;

    let source = HttpCsvSource::new(config.sync.request_timeout())?;
    let service = SyncService::new(
        Arc::new(source),
        Arc::new(config.dashboard.clone()),
        &config.sync,
        DashboardState::new(&config.dashboard),
    );

    let rows = service.load_summary().await?;
    let view = report::summary_rows(&rows, service.config());
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print!("{}", report::render_summary_table(&view));
    }
    Ok(())
}

fn status(config_manager: Option<&ConfigManager>, config: &AppConfig) -> anyhow::Result<()> {
    let session = SessionStore::new()?.load()?;
    let dashboard = &config.dashboard;

    match config_manager {
        Some(manager) => println!("Config:   {}", manager.config_path().display()),
        None => println!("Config:   (unavailable, using defaults)"),
    }
    if session.is_logged_in {
        println!("Session:  logged in as {}", session.display_name());
    } else {
        println!("Session:  not logged in");
    }
    println!(
        "Default:  source={} window={} members={}",
        dashboard.default_settings.current_source,
        dashboard.default_settings.current_time_range,
        dashboard.default_settings.selected_members.join(",")
    );
    println!("Sources:");
    for key in dashboard.sources() {
        let configured = if dashboard.endpoint_for(key).is_some() {
            "configured"
        } else {
            "not configured"
        };
        println!("  {key:<12} {:<20} {configured}", dashboard.display_name(key));
    }
    println!(
        "Summary:  {}",
        if dashboard.summary_endpoint().is_some() {
            "configured"
        } else {
            "not configured"
        }
    );
    Ok(())
}
