//! These structs provide the CLI interface for the finmirror CLI.

use crate::config::Environment;
use crate::filters::{BudgetQuery, TemplateQuery, TransactionQuery};
use crate::model::Domain;
use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// finmirror: Mirrors a personal-finance Google sheet into a tiered cache.
///
/// Transactions, budgets and budget templates are read from a Google sheet, cached as CSV files
/// in a Google Drive folder and/or a local directory, and served as filtered JSON views.
/// Installment purchases such as "Netflix 01/12" are expanded into their full schedule.
///
/// You will need to set up Google OAuth credentials for this. Run `finmirror init` and then
/// `finmirror auth` to get started.
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
    /// Create the home directory and initialize the configuration files.
    ///
    /// This is the first command you should run. You need a few things ready beforehand.
    ///
    /// - Decide what directory you want to store data in and pass this as --home. By default it
    ///   will be $HOME/finmirror.
    ///
    /// - Get the URL of your Google sheet and pass it as --sheet-url.
    ///
    /// - Create OAuth client credentials (desktop app) in the Google Cloud console and download
    ///   them to a file. You will pass this as --client-secret.
    ///
    /// - Optionally, create a Google Drive folder for the remote cache and pass its id as
    ///   --drive-folder-id.
    Init(InitArgs),
    /// Authenticate with Google via OAuth.
    Auth(AuthArgs),
    /// Print transactions as JSON, with installment series expanded.
    Transactions(TransactionsArgs),
    /// Print budgets as JSON with totals.
    Budgets(BudgetsArgs),
    /// Print budget templates as JSON with each person's active percentage total.
    Templates(TemplatesArgs),
    /// Inspect or manage the cache.
    Cache(CacheArgs),
    /// Create or update budgets or budget templates from a JSON file.
    Save(SaveArgs),
    /// Create a person's budgets for one month from their active templates.
    ApplyTemplate(ApplyTemplateArgs),
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

    /// The directory where finmirror data and configuration is held. Defaults to ~/finmirror
    #[arg(long, env = "FINMIRROR_HOME", default_value_t = default_home())]
    home: DisplayPath,

    /// Overrides the environment in config.json. Only development may fall back to the local
    /// cache when the remote cache fails.
    #[arg(long, env = "FINMIRROR_ENVIRONMENT", value_enum)]
    environment: Option<Environment>,
}

impl Common {
    pub fn new(log_level: LevelFilter, home: PathBuf, environment: Option<Environment>) -> Self {
        Self {
            log_level,
            home: home.into(),
            environment,
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn home(&self) -> &DisplayPath {
        &self.home
    }

    pub fn environment(&self) -> Option<Environment> {
        self.environment
    }
}

/// (Not shown): Args for the `finmirror init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The URL to your Google sheet. It looks like this:
    /// https://docs.google.com/spreadsheets/d/1a7Km9FxQwRbPt82JvN4LzYpH5OcGnWsT6iDuE3VhMjX
    #[arg(long)]
    sheet_url: String,

    /// The path to your downloaded OAuth client credentials. This file will be moved to the
    /// secrets directory inside the home directory.
    #[arg(long)]
    client_secret: PathBuf,

    /// The id of the Google Drive folder that holds the remote cache. Without it only the local
    /// cache is used.
    #[arg(long)]
    drive_folder_id: Option<String>,
}

impl InitArgs {
    pub fn new(
        sheet_url: impl Into<String>,
        client_secret: impl Into<PathBuf>,
        drive_folder_id: Option<String>,
    ) -> Self {
        Self {
            sheet_url: sheet_url.into(),
            client_secret: client_secret.into(),
            drive_folder_id,
        }
    }

    pub fn sheet_url(&self) -> &str {
        &self.sheet_url
    }

    pub fn client_secret(&self) -> &Path {
        &self.client_secret
    }

    pub fn drive_folder_id(&self) -> Option<&str> {
        self.drive_folder_id.as_deref()
    }
}

/// (Not shown): Args for the `finmirror auth` command.
#[derive(Debug, Parser, Clone)]
pub struct AuthArgs {
    /// Verify and refresh authentication.
    #[arg(long)]
    verify: bool,
}

impl AuthArgs {
    pub fn new(verify: bool) -> Self {
        Self { verify }
    }

    pub fn verify(&self) -> bool {
        self.verify
    }
}

/// (Not shown): Args for the `finmirror transactions` command.
#[derive(Debug, Parser, Clone, Default)]
pub struct TransactionsArgs {
    /// A configured person, or "all".
    #[arg(long)]
    person: Option<String>,

    /// The first date to include, YYYY-MM-DD.
    #[arg(long)]
    start_date: Option<String>,

    /// The last date to include, YYYY-MM-DD.
    #[arg(long)]
    end_date: Option<String>,

    /// Case-insensitive text to look for in the description.
    #[arg(long)]
    search: Option<String>,

    /// Case-insensitive text to look for in the origin account.
    #[arg(long)]
    origin: Option<String>,

    /// Case-insensitive text to look for in the destination category.
    #[arg(long)]
    destination: Option<String>,

    /// Print installment purchases as they are in the sheet, without expanding them.
    #[arg(long)]
    no_installments: bool,
}

impl TransactionsArgs {
    pub fn query(&self) -> TransactionQuery {
        TransactionQuery {
            person: self.person.clone(),
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            search: self.search.clone(),
            origin: self.origin.clone(),
            destination: self.destination.clone(),
        }
    }

    pub fn expand_installments(&self) -> bool {
        !self.no_installments
    }
}

/// (Not shown): Args for the `finmirror budgets` command.
#[derive(Debug, Parser, Clone, Default)]
pub struct BudgetsArgs {
    #[arg(long)]
    person: Option<String>,

    /// Case-insensitive text to look for in the category.
    #[arg(long)]
    category: Option<String>,

    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    month: Option<u32>,

    #[arg(long)]
    year: Option<i32>,
}

impl BudgetsArgs {
    pub fn query(&self) -> BudgetQuery {
        BudgetQuery {
            person: self.person.clone(),
            category: self.category.clone(),
            month: self.month,
            year: self.year,
        }
    }
}

/// (Not shown): Args for the `finmirror templates` command.
#[derive(Debug, Parser, Clone, Default)]
pub struct TemplatesArgs {
    #[arg(long)]
    person: Option<String>,

    /// Case-insensitive text to look for in the category.
    #[arg(long)]
    category: Option<String>,

    /// Only templates that are (true) or are not (false) active.
    #[arg(long)]
    active: Option<bool>,
}

impl TemplatesArgs {
    pub fn query(&self) -> TemplateQuery {
        TemplateQuery {
            person: self.person.clone(),
            category: self.category.clone(),
            active: self.active,
        }
    }
}

/// (Not shown): Args for the `finmirror cache` command.
#[derive(Debug, Parser, Clone)]
pub struct CacheArgs {
    #[command(subcommand)]
    action: CacheSubcommand,
}

impl CacheArgs {
    pub fn new(action: CacheSubcommand) -> Self {
        Self { action }
    }

    pub fn action(&self) -> &CacheSubcommand {
        &self.action
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum CacheSubcommand {
    /// Print the state of each cached domain.
    Status,
    /// Replace the cache with the current sheet contents.
    Refresh(DomainArgs),
    /// Delete the cached files from every cache location.
    Clear(DomainArgs),
    /// Create the cache files that the Google Drive folder is missing.
    ///
    /// The Drive cache only updates existing files, so this must run once after
    /// --drive-folder-id is configured.
    InitRemote,
}

/// (Not shown): Selects one domain, or all of them when omitted.
#[derive(Debug, Parser, Clone, Default)]
pub struct DomainArgs {
    #[arg(long, value_enum)]
    domain: Option<Domain>,
}

impl DomainArgs {
    pub fn new(domain: Option<Domain>) -> Self {
        Self { domain }
    }

    pub fn domain(&self) -> Option<Domain> {
        self.domain
    }
}

/// (Not shown): Args for the `finmirror save` command.
#[derive(Debug, Parser, Clone)]
pub struct SaveArgs {
    #[command(subcommand)]
    entity: SaveSubcommand,
}

impl SaveArgs {
    pub fn new(entity: SaveSubcommand) -> Self {
        Self { entity }
    }

    pub fn entity(&self) -> &SaveSubcommand {
        &self.entity
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum SaveSubcommand {
    /// Create or update budgets. The file holds one object or an array of objects with
    /// category, person, month, year and amount.
    Budgets(SaveFileArgs),
    /// Create or update budget templates. The file holds one object or an array of objects with
    /// category, person, percentage and, optionally, active.
    Templates(SaveFileArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct SaveFileArgs {
    /// The JSON file to read.
    #[arg(long)]
    file: PathBuf,
}

impl SaveFileArgs {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self { file: file.into() }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }
}

/// (Not shown): Args for the `finmirror apply-template` command.
#[derive(Debug, Parser, Clone)]
pub struct ApplyTemplateArgs {
    #[arg(long)]
    person: String,

    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    month: u32,

    #[arg(long)]
    year: i32,
}

impl ApplyTemplateArgs {
    pub fn new(person: impl Into<String>, month: u32, year: i32) -> Self {
        Self {
            person: person.into(),
            month,
            year,
        }
    }

    pub fn person(&self) -> &str {
        &self.person
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn year(&self) -> i32 {
        self.year
    }
}

fn default_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("finmirror"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --home or FINMIRROR_HOME instead of relying on the default \
                home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("finmirror")
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

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        <Args as CommandFactory>::command().debug_assert();
    }

    #[test]
    fn test_parse_transactions() {
        let args = Args::try_parse_from([
            "finmirror",
            "--home",
            "/tmp/fm",
            "transactions",
            "--person",
            "Alex",
            "--search",
            "netflix",
            "--no-installments",
        ])
        .unwrap();
        assert_eq!(args.common().home().path(), Path::new("/tmp/fm"));
        let Command::Transactions(transactions) = args.command() else {
            panic!("expected the transactions command");
        };
        assert!(!transactions.expand_installments());
        let query = transactions.query();
        assert_eq!(query.person.as_deref(), Some("Alex"));
        assert_eq!(query.search.as_deref(), Some("netflix"));
    }

    #[test]
    fn test_parse_cache_and_apply_template() {
        let args = Args::try_parse_from([
            "finmirror",
            "--environment",
            "development",
            "cache",
            "refresh",
            "--domain",
            "budget-templates",
        ])
        .unwrap();
        assert_eq!(args.common().environment(), Some(Environment::Development));
        let Command::Cache(cache) = args.command() else {
            panic!("expected the cache command");
        };
        let CacheSubcommand::Refresh(domain) = cache.action() else {
            panic!("expected cache refresh");
        };
        assert_eq!(domain.domain(), Some(Domain::BudgetTemplates));

        assert!(Args::try_parse_from([
            "finmirror",
            "apply-template",
            "--person",
            "Alex",
            "--month",
            "13",
            "--year",
            "2025",
        ])
        .is_err());
    }
}
