use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the data directory, its subdirectories and:
/// - Creates an initial `config.json` file using `api_url` along with default settings
/// - Stores `token`, when given, in the secrets directory
/// - Creates the empty SQLite cache
///
/// # Arguments
/// - `mezgeb_home` - The directory that will be the root of data directory, e.g. `$HOME/mezgeb`
/// - `api_url` - The root of the server's REST API, e.g. `http://localhost:5000/api`
/// - `token` - The bearer token the server expects, if any
///
/// # Errors
/// - Returns an error if the directory already holds a cache or if any file operations fail.
pub async fn init(mezgeb_home: &Path, api_url: &str, token: Option<&str>) -> Result<Out<()>> {
    let config = Config::create(mezgeb_home, api_url, token)
        .await
        .context("Unable to create the data directory and configs")
        .pub_result(ErrorType::Config)?;
    Ok(format!(
        "Successfully created the mezgeb directory at {}",
        config.root().display()
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("mezgeb");
        let out = init(&home, "http://localhost:5000/api", None).await.unwrap();
        assert!(out.message().starts_with("Successfully created"));
        assert!(home.join("config.json").is_file());

        let err = init(&home, "http://localhost:5000/api", None)
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Config);
    }
}
