//! These structs provide the CLI interface for the mezgeb CLI.

use crate::model::{Amount, CategoryUpdate, ExpenseFilter, ExpenseUpdate, NewCategory, NewExpense};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// mezgeb: an offline-first command-line client for the Mezgeb expense tracker.
///
/// Expenses and categories are read from and written to the Mezgeb server. Every answer is kept
/// in a local cache, so lists keep working without a network connection, and expenses or
/// categories created while offline are stored as pending and sent to the server once it can be
/// reached again (`mezgeb sync`, or automatically with `mezgeb watch`).
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
    /// Create the data directory, the configuration file and the local cache.
    ///
    /// Pass the root of the server's API as --api-url and, if the server requires it, the bearer
    /// token you got when logging in as --token.
    Init(InitArgs),
    /// List, add, update or delete expenses.
    #[command(subcommand)]
    Expenses(ExpensesCommand),
    /// List, add, update or delete categories.
    #[command(subcommand)]
    Categories(CategoriesCommand),
    /// Send everything created while offline to the server, categories first.
    Sync,
    /// Show whether the server is reachable and what the local cache holds.
    Status,
    /// Keep running, and sync pending records whenever the server becomes reachable.
    Watch,
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

    /// The directory where mezgeb data and configuration is held. Defaults to ~/mezgeb
    #[arg(long, env = "MEZGEB_HOME", default_value_t = default_mezgeb_home())]
    mezgeb_home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, mezgeb_home: PathBuf) -> Self {
        Self {
            log_level,
            mezgeb_home: mezgeb_home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn mezgeb_home(&self) -> &DisplayPath {
        &self.mezgeb_home
    }
}

/// (Not shown): Args for the `mezgeb init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The root of the server's REST API.
    #[arg(long, default_value = crate::config::DEFAULT_API_URL)]
    api_url: String,

    /// The bearer token sent with every request.
    #[arg(long, env = "MEZGEB_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

impl InitArgs {
    pub fn new(api_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            api_url: api_url.into(),
            token,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum ExpensesCommand {
    /// List expenses, optionally filtered. Served from the cache while offline.
    List(ListExpensesArgs),
    /// Add an expense. Recorded as pending while offline.
    Add(AddExpenseArgs),
    /// Change an expense. Requires the server.
    Update(UpdateExpenseArgs),
    /// Delete an expense. Requires the server.
    Delete(IdArg),
}

#[derive(Subcommand, Debug, Clone)]
pub enum CategoriesCommand {
    /// List categories. Served from the cache while offline.
    List,
    /// Add a category. Recorded as pending while offline.
    Add(AddCategoryArgs),
    /// Change a category. Requires the server.
    Update(UpdateCategoryArgs),
    /// Delete a category. Requires the server. Expenses keep referring to it.
    Delete(IdArg),
}

/// (Not shown): Args for `mezgeb expenses list`.
#[derive(Debug, Parser, Clone, Default)]
pub struct ListExpensesArgs {
    /// Only expenses whose reason contains this text, ignoring case.
    #[arg(long)]
    search: Option<String>,
    /// Only expenses on or after this day, e.g. 2026-01-31.
    #[arg(long)]
    date_from: Option<NaiveDate>,
    /// Only expenses on or before this day.
    #[arg(long)]
    date_to: Option<NaiveDate>,
    /// Only expenses of at least this amount.
    #[arg(long)]
    amount_min: Option<Amount>,
    /// Only expenses of at most this amount.
    #[arg(long)]
    amount_max: Option<Amount>,
    /// Only expenses in this category.
    #[arg(long)]
    category_id: Option<String>,
}

impl ListExpensesArgs {
    pub fn filter(&self) -> ExpenseFilter {
        ExpenseFilter {
            search: self.search.clone(),
            date_from: self.date_from,
            date_to: self.date_to,
            amount_min: self.amount_min,
            amount_max: self.amount_max,
            category_id: self.category_id.clone(),
        }
    }
}

impl From<ExpenseFilter> for ListExpensesArgs {
    fn from(f: ExpenseFilter) -> Self {
        Self {
            search: f.search,
            date_from: f.date_from,
            date_to: f.date_to,
            amount_min: f.amount_min,
            amount_max: f.amount_max,
            category_id: f.category_id,
        }
    }
}

/// (Not shown): Args for `mezgeb expenses add`.
#[derive(Debug, Parser, Clone)]
pub struct AddExpenseArgs {
    /// The category the expense is filed under.
    #[arg(long)]
    category_id: String,
    /// The amount spent, e.g. 120.50
    #[arg(long)]
    amount: Amount,
    /// What the money was spent on.
    #[arg(long)]
    reason: String,
    /// When it was spent, RFC 3339, e.g. 2026-01-31T09:30:00Z
    #[arg(long)]
    date: Option<DateTime<Utc>>,
    /// The same date in the Ethiopian calendar, e.g. "Tir 23, 2018"
    #[arg(long)]
    date_ethiopian: Option<String>,
}

impl AddExpenseArgs {
    pub fn new_expense(&self) -> NewExpense {
        NewExpense {
            category_id: self.category_id.clone(),
            amount: self.amount,
            reason: self.reason.clone(),
            date: self.date,
            date_ethiopian: self.date_ethiopian.clone(),
        }
    }
}

impl From<NewExpense> for AddExpenseArgs {
    fn from(e: NewExpense) -> Self {
        Self {
            category_id: e.category_id,
            amount: e.amount,
            reason: e.reason,
            date: e.date,
            date_ethiopian: e.date_ethiopian,
        }
    }
}

/// (Not shown): Args for `mezgeb expenses update`.
#[derive(Debug, Parser, Clone)]
pub struct UpdateExpenseArgs {
    /// The server identifier of the expense.
    id: String,
    #[arg(long)]
    category_id: Option<String>,
    #[arg(long)]
    amount: Option<Amount>,
    #[arg(long)]
    reason: Option<String>,
    #[arg(long)]
    date: Option<DateTime<Utc>>,
    #[arg(long)]
    date_ethiopian: Option<String>,
}

impl UpdateExpenseArgs {
    pub fn new(id: impl Into<String>, update: ExpenseUpdate) -> Self {
        Self {
            id: id.into(),
            category_id: update.category_id,
            amount: update.amount,
            reason: update.reason,
            date: update.date,
            date_ethiopian: update.date_ethiopian,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn update(&self) -> ExpenseUpdate {
        ExpenseUpdate {
            category_id: self.category_id.clone(),
            amount: self.amount,
            reason: self.reason.clone(),
            date: self.date,
            date_ethiopian: self.date_ethiopian.clone(),
        }
    }
}

/// (Not shown): Args for `mezgeb categories add`.
#[derive(Debug, Parser, Clone)]
pub struct AddCategoryArgs {
    #[arg(long)]
    name: String,
    /// An emoji or icon name shown next to the category.
    #[arg(long)]
    icon: String,
    /// Create the category hidden.
    #[arg(long)]
    hidden: bool,
}

impl AddCategoryArgs {
    pub fn new(name: impl Into<String>, icon: impl Into<String>, hidden: bool) -> Self {
        Self {
            name: name.into(),
            icon: icon.into(),
            hidden,
        }
    }

    pub fn new_category(&self) -> NewCategory {
        NewCategory {
            name: self.name.clone(),
            icon: self.icon.clone(),
            is_visible: self.hidden.then_some(false),
        }
    }
}

/// (Not shown): Args for `mezgeb categories update`.
#[derive(Debug, Parser, Clone)]
pub struct UpdateCategoryArgs {
    /// The server identifier of the category.
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    icon: Option<String>,
    /// Show (true) or hide (false) the category.
    #[arg(long)]
    visible: Option<bool>,
}

impl UpdateCategoryArgs {
    pub fn new(id: impl Into<String>, update: CategoryUpdate) -> Self {
        Self {
            id: id.into(),
            name: update.name,
            icon: update.icon,
            visible: update.is_visible,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn update(&self) -> CategoryUpdate {
        CategoryUpdate {
            name: self.name.clone(),
            icon: self.icon.clone(),
            is_visible: self.visible,
        }
    }
}

/// (Not shown): A single record identifier.
#[derive(Debug, Parser, Clone)]
pub struct IdArg {
    /// The server identifier of the record.
    id: String,
}

impl IdArg {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

fn default_mezgeb_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("mezgeb"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --mezgeb-home or MEZGEB_HOME instead of relying on the default \
                mezgeb home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("mezgeb")
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

    #[test]
    fn test_parse_expense_add() {
        let args = Args::try_parse_from([
            "mezgeb",
            "--mezgeb-home",
            "/tmp/m",
            "expenses",
            "add",
            "--category-id",
            "cat_1",
            "--amount",
            "50",
            "--reason",
            "Coffee",
        ])
        .unwrap();
        assert_eq!(args.common().mezgeb_home().path(), Path::new("/tmp/m"));
        let Command::Expenses(ExpensesCommand::Add(add)) = args.command() else {
            panic!("wrong command: {:?}", args.command());
        };
        let expense = add.new_expense();
        assert_eq!(expense.amount, Amount::from(50));
        assert_eq!(expense.category_id, "cat_1");
    }

    #[test]
    fn test_parse_list_filters() {
        let args = Args::try_parse_from([
            "mezgeb",
            "expenses",
            "list",
            "--date-from",
            "2026-01-01",
            "--amount-max",
            "1,000",
        ])
        .unwrap();
        let Command::Expenses(ExpensesCommand::List(list)) = args.command() else {
            panic!("wrong command: {:?}", args.command());
        };
        let filter = list.filter();
        assert_eq!(filter.date_from, NaiveDate::from_ymd_opt(2026, 1, 1));
        assert_eq!(filter.amount_max, Some(Amount::from(1000)));
        assert!(filter.search.is_none());
    }

    #[test]
    fn test_parse_category_update_and_log_level() {
        let args = Args::try_parse_from([
            "mezgeb",
            "--log-level",
            "debug",
            "categories",
            "update",
            "c1",
            "--visible",
            "false",
        ])
        .unwrap();
        assert_eq!(args.common().log_level(), LevelFilter::DEBUG);
        let Command::Categories(CategoriesCommand::Update(update)) = args.command() else {
            panic!("wrong command: {:?}", args.command());
        };
        assert_eq!(update.id(), "c1");
        assert_eq!(update.update().is_visible, Some(false));
        assert!(update.update().name.is_none());
    }

    #[test]
    fn test_hidden_category() {
        assert_eq!(
            AddCategoryArgs::new("Gifts", "gift", true)
                .new_category()
                .is_visible,
            Some(false)
        );
        assert_eq!(
            AddCategoryArgs::new("Gifts", "gift", false)
                .new_category()
                .is_visible,
            None
        );
    }
}
