use clap::Parser;
use finmirror::args::{Args, CacheSubcommand, Command, SaveSubcommand};
use finmirror::{commands, error_type, Config, Environment, ErrorType, IntoResult, Mode, Result};
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
            match error_type(&e) {
                Some(kind) => error!("Exiting with {kind} error ({}): {e:#}", kind.status()),
                None => error!("Exiting with error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().home().path();
    let environment = args.common().environment();

    // This allows for testing the program without hitting the Google APIs. When
    // FINMIRROR_IN_TEST_MODE is set and non-zero in length, then the mode will be Mode::Testing,
    // otherwise it will be Mode::Google.
    let mode = Mode::from_env();

    // Route to appropriate command handler
    let _: () = match args.command() {
        Command::Init(init_args) => commands::init(
            home,
            init_args.client_secret(),
            init_args.sheet_url(),
            init_args.drive_folder_id(),
            environment.unwrap_or_default(),
        )
        .await?
        .print(),

        Command::Auth(auth_args) => {
            let config = load(home, environment).await?;
            if auth_args.verify() {
                commands::auth_verify(&config).await?.print()
            } else {
                commands::auth(&config).await?.print()
            }
        }

        Command::Transactions(query_args) => {
            commands::transactions(load(home, environment).await?, mode, query_args)
                .await?
                .print()
        }

        Command::Budgets(query_args) => {
            commands::budgets(load(home, environment).await?, mode, query_args)
                .await?
                .print()
        }

        Command::Templates(query_args) => {
            commands::templates(load(home, environment).await?, mode, query_args)
                .await?
                .print()
        }

        Command::Cache(cache_args) => {
            let config = load(home, environment).await?;
            match cache_args.action() {
                CacheSubcommand::Status => commands::cache_status(config, mode).await?.print(),
                CacheSubcommand::Refresh(domain_args) => {
                    commands::cache_refresh(config, mode, domain_args.domain())
                        .await?
                        .print()
                }
                CacheSubcommand::Clear(domain_args) => {
                    commands::cache_clear(config, mode, domain_args.domain())
                        .await?
                        .print()
                }
                CacheSubcommand::InitRemote => {
                    commands::cache_init_remote(config, mode).await?.print()
                }
            }
        }

        Command::Save(save_args) => {
            let config = load(home, environment).await?;
            match save_args.entity() {
                SaveSubcommand::Budgets(file_args) => {
                    commands::save_budgets(config, mode, file_args.file())
                        .await?
                        .print()
                }
                SaveSubcommand::Templates(file_args) => {
                    commands::save_templates(config, mode, file_args.file())
                        .await?
                        .print()
                }
            }
        }

        Command::ApplyTemplate(apply_args) => {
            commands::apply_template(load(home, environment).await?, mode, apply_args)
                .await?
                .print()
        }
    };
    Ok(())
}

/// Loads the config in `home`, with `environment` overriding the file when given.
async fn load(home: &Path, environment: Option<Environment>) -> Result<Config> {
    let config = Config::load(home).await.pub_result(ErrorType::Config)?;
    Ok(config.with_environment(environment))
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
                env!("CARGO_BIN_NAME"),
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
