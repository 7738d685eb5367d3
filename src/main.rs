//! onedrive-uploader - Main entry point
//!
//! OneDrive command-line client with resumable uploads and token renewal.

use anyhow::{Context, Result};
use onedrive_uploader::cli::commands::{self, HashKind};
use onedrive_uploader::{
    find_config_path, CliArgs, Command, Config, DriveClient, DriveConfig, JsonFileStore,
    ProgressDisplay, ReqwestTransport, TokenManager, TransferEngine,
};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Set up panic handler for unexpected errors
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();
        match panic_info.location() {
            Some(location) => error!(
                "PANIC occurred at {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            ),
            None => error!("PANIC occurred at unknown location"),
        }
        let payload = panic_info.payload();
        if let Some(s) = payload.downcast_ref::<&str>() {
            error!("Panic message: {}", s);
        } else if let Some(s) = payload.downcast_ref::<String>() {
            error!("Panic message: {}", s);
        } else {
            error!("Panic message: unknown");
        }
        error!("Backtrace:\n{:?}", backtrace);
    }));
}

#[tokio::main]
async fn main() {
    setup_panic_handler();

    let args = CliArgs::parse_args();
    init_logging(&args);
    debug!("CLI arguments: {:?}", args);

    let display = ProgressDisplay::new(args.is_quiet());
    if let Err(e) = run(args).await {
        debug!("Command failed: {:?}", e);
        let _ = display.print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let command = args.command();
    if let Command::Version = command {
        println!("onedrive-uploader {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::from_args(&args);
    config.validate().context("Invalid configuration")?;

    let config_path = find_config_path(config.config_path.as_deref())?;
    if let Command::Migrate { source } = &command {
        return commands::migrate(source, &config_path).await;
    }
    info!("Using config file {}", config_path.display());
    let drive_config = DriveConfig::load(&config_path).context("Failed to load config")?;

    let transport = Arc::new(ReqwestTransport::new(config.timeout)?);
    let store = Arc::new(JsonFileStore::new(&config_path));
    let tokens = Arc::new(
        TokenManager::load(drive_config.oauth_app(), transport.clone(), store, config.renew_margin)
            .await
            .context("Failed to load credential")?,
    );

    if let Command::Login = command {
        return commands::login(&tokens).await;
    }

    if command.needs_auth() {
        // fail early on a dead refresh token instead of mid-command
        tokens.ensure_valid().await.context("Authentication failed; run `login` again")?;
    }

    let client = Arc::new(DriveClient::new(transport, tokens, drive_config.root.clone()));

    match &command {
        Command::Mkdir { path } => commands::mkdir(&client, path).await,
        Command::Rm { path } => commands::remove(&client, path).await,
        Command::Ls { path } => commands::list(&client, path).await,
        Command::Info { path } => commands::info(&client, path).await,
        Command::Sha1 { path } => commands::hash(&client, path, HashKind::Sha1).await,
        Command::Sha256 { path } => commands::hash(&client, path, HashKind::Sha256).await,
        Command::Search { query } => commands::search(&client, query).await,
        Command::Share { path } => commands::share(&client, path).await,
        Command::Up { files, dest } => {
            let engine = TransferEngine::new(client, config.transfer_options())?;
            commands::upload(&engine, files, dest, config.is_quiet()).await.map(|_| ())
        }
        Command::Down { remote, local } => {
            let engine = TransferEngine::new(client, config.transfer_options())?;
            let target = commands::download(&engine, remote, local, config.is_quiet()).await?;
            info!("Saved {}", target.display());
            Ok(())
        }
        Command::Login | Command::Version | Command::Migrate { .. } => Ok(()),
    }
}

/// Initialize logging based on verbosity settings
fn init_logging(args: &CliArgs) {
    let level = args.log_level();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }

    debug!("Logging initialized with level {:?}", level);
}
