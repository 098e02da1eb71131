use crate::api::Mode;
use crate::args::{AddCategoryArgs, UpdateCategoryArgs};
use crate::commands::{connect, offline_note, Out};
use crate::model::{Category, Record};
use crate::{Config, Result};
use std::fmt::Write;

/// Lists all categories. While offline these come from the local cache.
pub async fn list_categories(config: Config, mode: Mode) -> Result<Out<Vec<Category>>> {
    let client = connect(&config, mode).await?;
    let categories = client.list_categories().await?;

    let mut message = format!("{} categories{}", categories.len(), offline_note(&client));
    for c in &categories {
        let hidden = if c.is_visible() { "" } else { " (hidden)" };
        let _ = write!(
            message,
            "\n  {}  {} {}{}  [{}]",
            c.id(),
            c.icon(),
            c.name(),
            hidden,
            c.status()
        );
    }
    Ok(Out::new(message, categories))
}

/// Adds a category. Offline, it is stored as pending and sent on the next sync.
pub async fn add_category(
    config: Config,
    mode: Mode,
    args: AddCategoryArgs,
) -> Result<Out<Category>> {
    let client = connect(&config, mode).await?;
    let category = client.create_category(&args.new_category()).await?;
    let message = if category.status().is_pending() {
        format!(
            "Saved category '{}' locally as {}, it will be sent to the server when it is reachable",
            category.name(),
            category.id()
        )
    } else {
        format!("Added category '{}' as {}", category.name(), category.id())
    };
    Ok(Out::new(message, category))
}

pub async fn update_category(
    config: Config,
    mode: Mode,
    args: UpdateCategoryArgs,
) -> Result<Out<Category>> {
    let client = connect(&config, mode).await?;
    let category = client.update_category(args.id(), &args.update()).await?;
    Ok(Out::new(
        format!("Updated category '{}'", category.name()),
        category,
    ))
}

/// Deletes a category on the server. Expenses filed under it are left as they are.
pub async fn delete_category(config: Config, mode: Mode, id: &str) -> Result<Out<String>> {
    let client = connect(&config, mode).await?;
    client.delete_category(id).await?;
    Ok(Out::new(format!("Deleted category {id}"), id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CategoryUpdate, Collection};
    use crate::test::TestEnv;

    #[tokio::test]
    async fn test_list_categories_fills_cache() {
        let env = TestEnv::new().await;
        let out = list_categories(env.config(), Mode::Test).await.unwrap();
        let names: Vec<&str> = out
            .structure()
            .unwrap()
            .iter()
            .map(Category::name)
            .collect();
        assert_eq!(names, vec!["Food", "Transport", "Utilities"]);
        assert_eq!(
            env.cached_ids(Collection::Categories).await,
            vec!["c1", "c2", "c3"]
        );
    }

    #[tokio::test]
    async fn test_add_hidden_and_update() {
        let env = TestEnv::new().await;
        let out = add_category(
            env.config(),
            Mode::Test,
            AddCategoryArgs::new("Gifts", "gift", true),
        )
        .await
        .unwrap();
        let category = out.structure().unwrap();
        assert!(!category.is_visible());
        assert_eq!(category.id(), "c4");

        // Each command talks to a freshly seeded server, so update one of the seeded records.
        let out = update_category(
            env.config(),
            Mode::Test,
            UpdateCategoryArgs::new(
                "c2",
                CategoryUpdate {
                    name: Some("Transit".to_string()),
                    ..CategoryUpdate::default()
                },
            ),
        )
        .await
        .unwrap();
        assert_eq!(out.message(), "Updated category 'Transit'");
    }
}
