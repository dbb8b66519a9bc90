use anyhow::{Result, anyhow};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::PathBuf;
use task_manager::cli::{Cli, Command};
use task_manager::config::{Config, ConfigLoader};
use task_manager::db::Database;
use task_manager::service::TaskManager;
use task_manager::types::EntityKind;
use task_manager::web::start_server;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn init_logging(cli: &Cli) -> Result<()> {
    // RUST_LOG wins over --verbose when set.
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }))
    };

    match cli.log.as_str() {
        "0" | "off" => {}
        "1" | "stdout" => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter())
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        "2" | "stderr" => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        filename => {
            let file = OpenOptions::new().create(true).append(true).open(filename)?;
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter())
                .with_writer(file)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

fn open_manager(config: Config) -> Result<TaskManager> {
    config.ensure_db_dir()?;
    let db = Database::open(&config.server.db_path)?;
    Ok(TaskManager::new(db, config))
}

async fn run_server(config: Config) -> Result<()> {
    let addr = config.bind_address();
    let tm = open_manager(config)?;

    let purged = tm.db().purge_expired_sessions()?;
    if purged > 0 {
        info!(purged, "Removed expired sessions");
    }

    let server = start_server(tm, &addr).await?;
    tokio::signal::ctrl_c().await?;
    server.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let mut loader = ConfigLoader::load(cli.config.as_ref().map(PathBuf::from))?;
    for source in loader.sources() {
        info!(path = %source.display(), "Loaded configuration");
    }

    let config = loader.config_mut();
    if let Some(db_path) = &cli.database {
        config.server.db_path = db_path.into();
    }
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    let config = loader.into_config();

    match cli.command {
        Some(Command::CreateSuperuser {
            username,
            password,
            email,
            position,
        }) => {
            let tm = open_manager(config)?;
            let worker = tm.create_superuser(&username, &password, email.as_deref(), &position)?;
            println!("Created superuser {} (id {})", worker.username, worker.id);
        }
        Some(Command::Grant {
            username,
            kind,
            revoke,
        }) => {
            let kind: EntityKind = kind.parse().map_err(|e: String| anyhow!(e))?;
            let tm = open_manager(config)?;
            let worker = tm.set_capability(&username, kind, !revoke)?;
            let held: Vec<&str> = worker.capabilities.iter().map(|k| k.as_str()).collect();
            println!("{} now manages: {}", worker.username, held.join(", "));
        }
        Some(Command::Serve) | None => {
            run_server(config).await?;
        }
    }

    Ok(())
}
