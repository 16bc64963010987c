//! These structs provide the CLI interface for the kamling CLI.

use crate::config::{OwnerScope, Settings};
use crate::model::TransactionType;
use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing::level_filters::LevelFilter;

/// kamling: the contribution ledger of a neighbourhood night watch.
///
/// Users and their contributions are kept in a shared Google sheet with a `Users` tab and a
/// `Transactions` tab. Reads use a public API key or an OAuth token, writes need an OAuth token,
/// and everything is mirrored into a local SQLite cache so the ledger keeps working when the
/// sheet cannot be reached.
///
/// Set KAMLING_IN_TEST_MODE to a non-empty value to run against a seeded in-memory sheet instead
/// of Google.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the data directory and initialize the configuration file and the local cache.
    ///
    /// This is the first command you should run. You need the URL of the ledger's Google sheet.
    /// For reads without signing in, pass a Google API key with --api-key. For writes, pass the
    /// client id of an OAuth web client with --client-id and then run `kamling auth url`.
    Init(InitArgs),
    /// Authorize kamling to write to the sheet, or inspect and clear the authorization.
    Auth(AuthArgs),
    /// Register users or list them.
    Users(UsersArgs),
    /// Record contributions and expenses or list them.
    Transactions(TransactionsArgs),
    /// Run the HTTP API used by the web front end.
    Serve(ServeArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where kamling data and configuration is held. Defaults to ~/kamling
    #[arg(long, env = "KAMLING_HOME", default_value_t = default_kamling_home())]
    kamling_home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, kamling_home: PathBuf) -> Self {
        Self {
            log_level,
            kamling_home: kamling_home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn kamling_home(&self) -> &DisplayPath {
        &self.kamling_home
    }
}

/// Args for the `kamling init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The URL of the ledger's Google sheet. It looks like this:
    /// https://docs.google.com/spreadsheets/d/1a7Km9FxQwRbPt82JvN4LzYpH5OcGnWsT6iDuE3VhMjX
    #[arg(long)]
    sheet_url: String,

    /// A Google API key allowed to read the sheet.
    #[arg(long, env = "KAMLING_API_KEY")]
    api_key: Option<String>,

    /// The client id of the OAuth web client used to authorize writes.
    #[arg(long, env = "KAMLING_CLIENT_ID")]
    client_id: Option<String>,

    /// Where Google sends the browser after consent. Defaults to http://localhost:3001
    #[arg(long)]
    redirect_uri: Option<String>,

    /// Which transactions an owner sees: "all" or "owner".
    #[arg(long, default_value_t = OwnerScope::All)]
    owner_scope: OwnerScope,
}

impl InitArgs {
    pub fn sheet_url(&self) -> &str {
        &self.sheet_url
    }

    pub fn settings(&self) -> Settings {
        Settings {
            sheet_url: self.sheet_url.clone(),
            api_key: self.api_key.clone(),
            client_id: self.client_id.clone(),
            redirect_uri: self.redirect_uri.clone(),
            owner_scope: self.owner_scope,
        }
    }
}

/// Args for the `kamling auth` command.
#[derive(Debug, Parser, Clone)]
pub struct AuthArgs {
    #[command(subcommand)]
    action: AuthCommand,
}

impl AuthArgs {
    pub fn action(&self) -> &AuthCommand {
        &self.action
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum AuthCommand {
    /// Print the URL that starts the consent flow.
    Url,
    /// Finish the consent flow with the fragment of the redirect URL, e.g.
    /// '#access_token=...&expires_in=3599&state=...'. The whole redirect URL also works.
    Callback {
        fragment: String,
    },
    /// Show whether kamling is configured, waiting for a callback, authorized or expired.
    Status,
    /// Forget the stored token.
    Logout,
}

/// Args for the `kamling users` command.
#[derive(Debug, Parser, Clone)]
pub struct UsersArgs {
    #[command(subcommand)]
    action: UsersCommand,
}

impl UsersArgs {
    pub fn action(&self) -> &UsersCommand {
        &self.action
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum UsersCommand {
    /// Register a user. Users already in the sheet are left as they are.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
    },
    /// List the users, or only the one with --phone.
    List {
        #[arg(long)]
        phone: Option<String>,
    },
}

/// Args for the `kamling transactions` command.
#[derive(Debug, Parser, Clone)]
pub struct TransactionsArgs {
    #[command(subcommand)]
    action: TransactionsCommand,
}

impl TransactionsArgs {
    pub fn action(&self) -> &TransactionsCommand {
        &self.action
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum TransactionsCommand {
    /// Record a contribution ("in") or an expense ("out").
    Add {
        /// The owner's phone number.
        #[arg(long)]
        phone: String,
        /// The owner's name. Looked up among the users when omitted.
        #[arg(long)]
        name: Option<String>,
        /// The amount in rupiah.
        #[arg(long)]
        amount: u64,
        /// "in" (masuk) or "out" (keluar).
        #[arg(long = "type", default_value_t = TransactionType::In)]
        kind: TransactionType,
        /// The date of the patrol as YYYY-MM-DD. Defaults to today.
        #[arg(long)]
        date: Option<String>,
    },
    /// List transactions, newest first. With --phone, show that owner's view.
    List {
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
}

/// Args for the `kamling serve` command.
#[derive(Debug, Parser, Clone)]
pub struct ServeArgs {
    /// The port to listen on. Defaults to the configured port, 3001 unless changed.
    #[arg(long)]
    port: Option<u16>,
}

impl ServeArgs {
    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

fn default_kamling_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("kamling"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --kamling-home or KAMLING_HOME instead of relying on the \
                default kamling home directory.",
            );
            PathBuf::from("kamling")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}
