use crate::model::{Collection, Record, SyncStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A category that expenses are filed under.
///
/// Hiding a category (or deleting it) does not touch the expenses that reference it. Those keep
/// their `categoryId` even when it no longer resolves.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(rename = "_id")]
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) icon: String,
    #[serde(default = "default_visible")]
    pub(crate) is_visible: bool,
    #[serde(default)]
    pub(crate) status: SyncStatus,
    /// Server-computed fields we do not interpret, e.g. `userId` or `createdAt`.
    #[serde(flatten)]
    pub(crate) other_fields: BTreeMap<String, Value>,
}

fn default_visible() -> bool {
    true
}

impl Category {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn icon(&self) -> &str {
        &self.icon
    }

    pub fn is_visible(&self) -> bool {
        self.is_visible
    }

    pub fn other_fields(&self) -> &BTreeMap<String, Value> {
        &self.other_fields
    }
}

impl Record for Category {
    const COLLECTION: Collection = Collection::Categories;

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> SyncStatus {
        self.status
    }
}

/// The body of a category create request.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    pub name: String,
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_visible: Option<bool>,
}

/// The body of a category update request. Only the fields that are `Some` are sent.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_visible: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_server_category() {
        let value = json!({
            "_id": "c1",
            "name": "Food",
            "icon": "🍔",
            "isVisible": false,
            "userId": "u1",
            "__v": 0
        });
        let category = Category::from_value(value).unwrap();
        assert_eq!(category.id(), "c1");
        assert_eq!(category.name(), "Food");
        assert!(!category.is_visible());
        assert_eq!(category.status(), SyncStatus::Synced);
        assert_eq!(category.other_fields().get("userId"), Some(&json!("u1")));
    }

    #[test]
    fn test_visible_by_default() {
        let category = Category::from_value(json!({"_id": "c2", "name": "Shop"})).unwrap();
        assert!(category.is_visible());
    }

    #[test]
    fn test_update_only_sends_some_fields() {
        let update = CategoryUpdate {
            is_visible: Some(false),
            ..CategoryUpdate::default()
        };
        assert_eq!(
            serde_json::to_value(update).unwrap(),
            json!({"isVisible": false})
        );
    }
}
