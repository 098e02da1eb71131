//! Command handlers for the mezgeb CLI.
//!
//! This module contains implementations for all CLI subcommands.

mod categories;
mod expenses;
mod init;
mod sync;
mod watch;

use crate::api::{self, Mode};
use crate::connectivity::{Connectivity, FixedOracle, LiveOracle};
use crate::error::{ErrorType, IntoResult};
use crate::sync::SyncClient;
use crate::{Config, Result};
use serde::Serialize;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub use categories::{add_category, delete_category, list_categories, update_category};
pub use expenses::{add_expense, delete_expense, list_expenses, update_expense};
pub use init::init;
pub use sync::{status, sync};
pub use watch::watch;

/// The output type for a command. This allows the command to return a consistent message and,
/// optionally, structured data.
#[derive(Debug, Clone, Serialize)]
pub struct Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// A message that can be printed to the user regarding the outcome of the command execution.
    message: String,

    /// Any structured data that needs to be output from the call.
    structure: Option<T>,
}

impl<T, S> From<S> for Out<T>
where
    T: Debug + Clone + Serialize,
    S: Into<String>,
{
    fn from(value: S) -> Self {
        Out::new_message(value)
    }
}

impl<T> Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// Create a new `Out` object that has `Some(structure)`.
    pub fn new<S>(message: S, structure: T) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: Some(structure),
        }
    }

    /// Create a new `Out` object that has `None` for `structure`.
    pub fn new_message<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: None,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn structure(&self) -> Option<&T> {
        self.structure.as_ref()
    }

    /// Print the message to `info!` and the structured data (if it exists) as JSON to `debug!`.
    pub fn print(&self) {
        info!("{}", self.message);
        if let Some(structure) = self.structure() {
            if let Ok(json) = serde_json::to_string_pretty(structure) {
                debug!("Command output:\n\n{json}\n\n");
            }
        }
    }
}

/// Loads the configuration in `mezgeb_home`, failing if `mezgeb init` has not been run there.
pub async fn load_config(mezgeb_home: &Path) -> Result<Config> {
    Config::load(mezgeb_home)
        .await
        .pub_result(ErrorType::Config)
}

/// Builds the oracle for `mode`. In `Mode::Test` the server is in memory and always reachable.
async fn oracle(config: &Config, mode: Mode) -> Result<Oracle> {
    Ok(match mode {
        Mode::Live => Oracle::Live(Arc::new(
            LiveOracle::new(config.api_url(), config.request_timeout())
                .await
                .pub_result(ErrorType::Config)?,
        )),
        Mode::Test => Oracle::Fixed(Arc::new(FixedOracle::online())),
    })
}

enum Oracle {
    Live(Arc<LiveOracle>),
    Fixed(Arc<FixedOracle>),
}

impl Oracle {
    fn shared(&self) -> Arc<dyn Connectivity> {
        match self {
            Oracle::Live(o) => o.clone(),
            Oracle::Fixed(o) => o.clone(),
        }
    }
}

fn client(config: &Config, mode: Mode, oracle: &Oracle) -> Result<SyncClient> {
    let transport = api::transport(config, mode).pub_result(ErrorType::Config)?;
    Ok(SyncClient::new(
        Arc::new(config.db().clone()),
        transport,
        oracle.shared(),
        config.request_timeout(),
    ))
}

/// The `SyncClient` used by one-shot commands.
async fn connect(config: &Config, mode: Mode) -> Result<SyncClient> {
    let oracle = oracle(config, mode).await?;
    client(config, mode, &oracle)
}

/// A suffix telling the user that an answer came from the cache.
fn offline_note(client: &SyncClient) -> &'static str {
    if client.is_online() {
        ""
    } else {
        " (offline, from the local cache)"
    }
}
