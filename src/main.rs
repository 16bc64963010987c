use clap::Parser;
use kamling_ledger::args::{Args, AuthCommand, Command, TransactionsCommand, UsersCommand};
use kamling_ledger::{commands, AuthFlow, Config, Mode, RecordStore, Result};
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
    let home = args.common().kamling_home().path();

    // When KAMLING_IN_TEST_MODE is set and non-empty the seeded in-memory sheet is used instead
    // of Google.
    let mode = Mode::from_env();

    let _: () = match args.command() {
        Command::Init(init_args) => commands::init(home, init_args.settings()).await?.print(),

        Command::Auth(auth_args) => {
            let config = Config::load(home).await?;
            let auth = AuthFlow::new(&config);
            match auth_args.action() {
                AuthCommand::Url => commands::auth_url(&auth).await?.print(),
                AuthCommand::Callback { fragment } => {
                    commands::auth_callback(&auth, fragment).await?.print()
                }
                AuthCommand::Status => commands::auth_status(&auth).await?.print(),
                AuthCommand::Logout => commands::auth_logout(&auth).await?.print(),
            }
        }

        Command::Users(users_args) => {
            let store = RecordStore::from_config(&Config::load(home).await?, mode)?;
            match users_args.action() {
                UsersCommand::Add { name, phone } => {
                    commands::user_add(&store, name, phone).await?.print()
                }
                UsersCommand::List { phone } => commands::users(&store, phone.as_deref())
                    .await?
                    .print_json(),
            }
        }

        Command::Transactions(tx_args) => {
            let store = RecordStore::from_config(&Config::load(home).await?, mode)?;
            match tx_args.action() {
                TransactionsCommand::Add {
                    phone,
                    name,
                    amount,
                    kind,
                    date,
                } => commands::transaction_add(
                    &store,
                    phone,
                    name.as_deref(),
                    *amount,
                    *kind,
                    date.as_deref(),
                )
                .await?
                .print(),
                TransactionsCommand::List { phone, name } => {
                    commands::transactions(&store, phone.as_deref(), name.as_deref())
                        .await?
                        .print_json()
                }
            }
        }

        Command::Serve(serve_args) => {
            let config = Config::load(home).await?;
            let port = serve_args.port().unwrap_or(config.port());
            let store = RecordStore::from_config(&config, mode)?;
            commands::serve(store, port).await?.print()
        }
    };
    Ok(())
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for the library and the binary only.
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
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
