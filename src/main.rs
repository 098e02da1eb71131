use clap::Parser;
use mezgeb::args::{Args, CategoriesCommand, Command, ExpensesCommand};
use mezgeb::{commands, Mode, Result};
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
            error!("Exiting with error: {e}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().mezgeb_home().path();

    // This allows for testing the program without a server. When MEZGEB_IN_TEST_MODE is set and
    // non-zero in length, then the mode will be Mode::Test, otherwise it will be Mode::Live.
    let mode = Mode::from_env();

    let _: () = match args.command() {
        Command::Init(init_args) => {
            commands::init(home, init_args.api_url(), init_args.token())
                .await?
                .print()
        }

        Command::Expenses(expenses) => {
            let config = commands::load_config(home).await?;
            match expenses {
                ExpensesCommand::List(list) => {
                    commands::list_expenses(config, mode, list.clone())
                        .await?
                        .print()
                }
                ExpensesCommand::Add(add) => commands::add_expense(config, mode, add.clone())
                    .await?
                    .print(),
                ExpensesCommand::Update(update) => {
                    commands::update_expense(config, mode, update.clone())
                        .await?
                        .print()
                }
                ExpensesCommand::Delete(id) => commands::delete_expense(config, mode, id.id())
                    .await?
                    .print(),
            }
        }

        Command::Categories(categories) => {
            let config = commands::load_config(home).await?;
            match categories {
                CategoriesCommand::List => commands::list_categories(config, mode).await?.print(),
                CategoriesCommand::Add(add) => commands::add_category(config, mode, add.clone())
                    .await?
                    .print(),
                CategoriesCommand::Update(update) => {
                    commands::update_category(config, mode, update.clone())
                        .await?
                        .print()
                }
                CategoriesCommand::Delete(id) => {
                    commands::delete_category(config, mode, id.id())
                        .await?
                        .print()
                }
            }
        }

        Command::Sync => commands::sync(commands::load_config(home).await?, mode)
            .await?
            .print(),

        Command::Status => commands::status(commands::load_config(home).await?, mode)
            .await?
            .print(),

        Command::Watch => commands::watch(commands::load_config(home).await?, mode)
            .await?
            .print(),
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
