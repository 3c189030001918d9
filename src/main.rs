use clap::Parser;
use fintrack_sync::args::{Args, Command};
use fintrack_sync::{commands, App, Config, Mode, Result};
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().fintrack_home().path();

    // This allows for testing the program without hitting the Google APIs. When
    // FINTRACK_IN_TEST_MODE is set and non-zero in length, then the mode will be Mode::Test,
    // otherwise it will be Mode::Google.
    let mode = Mode::from_env();

    let offline = args.common().offline();

    // Route to appropriate command handler
    let _: () = match args.command() {
        Command::Init(init_args) => {
            commands::init(home, init_args.client_secret(), init_args.sheet_url())
                .await?
                .print()
        }
        Command::Auth => commands::auth(&open(home, mode, offline).await?)
            .await?
            .print(),
        Command::Disconnect => commands::disconnect(&open(home, mode, offline).await?)
            .await?
            .print(),
        Command::Status => commands::status(&open(home, mode, offline).await?)
            .await?
            .print(),
        Command::AutoSync(auto_sync_args) => {
            let app = open(home, mode, offline).await?;
            commands::auto_sync(&app, auto_sync_args.state().enabled())
                .await?
                .print()
        }
        Command::Add(add_args) => {
            let app = open(home, mode, offline).await?;
            commands::add(&app, add_args.clone()).await?.print()
        }
        Command::Update(update_args) => {
            let app = open(home, mode, offline).await?;
            commands::update(&app, update_args.clone()).await?.print()
        }
        Command::Delete(delete_args) => {
            let app = open(home, mode, offline).await?;
            commands::delete(&app, delete_args.clone()).await?.print()
        }
        Command::List => commands::list(&open(home, mode, offline).await?)
            .await?
            .print(),
        Command::Sync => commands::sync(&open(home, mode, offline).await?)
            .await?
            .print(),
        Command::Channels(channels_command) => {
            let app = open(home, mode, offline).await?;
            commands::channels(&app, channels_command).await?.print()
        }
    };
    Ok(())
}

async fn open(home: &Path, mode: Mode, offline: bool) -> Result<App> {
    let config = Config::load(home).await?;
    App::open(&config, mode, offline)
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate only.
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_CRATE_NAME"),
                level,
                "fintrack_sync",
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
