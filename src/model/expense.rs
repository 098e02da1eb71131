use crate::model::{Amount, Category, Collection, Record, SyncStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single expense.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    #[serde(rename = "_id")]
    pub(crate) id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) category_id: Option<CategoryRef>,
    #[serde(default)]
    pub(crate) amount: Amount,
    #[serde(default)]
    pub(crate) reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) date: Option<DateTime<Utc>>,
    /// The same date rendered in the Ethiopian calendar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) date_ethiopian: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) status: SyncStatus,
    /// Server-computed fields we do not interpret, e.g. `userId` or `updatedAt`.
    #[serde(flatten)]
    pub(crate) other_fields: BTreeMap<String, Value>,
}

impl Expense {
    /// The identifier of the referenced category, whether or not the server populated it.
    pub fn category_id(&self) -> Option<&str> {
        self.category_id.as_ref().map(CategoryRef::id)
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.date
    }

    pub fn date_ethiopian(&self) -> Option<&str> {
        self.date_ethiopian.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

impl Record for Expense {
    const COLLECTION: Collection = Collection::Expenses;

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> SyncStatus {
        self.status
    }
}

/// The category of an expense. List responses populate it with the whole category, everything
/// else carries just the identifier.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryRef {
    Id(String),
    Populated(Box<Category>),
}

impl CategoryRef {
    pub fn id(&self) -> &str {
        match self {
            CategoryRef::Id(id) => id,
            CategoryRef::Populated(category) => category.id(),
        }
    }
}

/// The body of an expense create request.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpense {
    pub category_id: String,
    pub amount: Amount,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_ethiopian: Option<String>,
}

/// The body of an expense update request. Only the fields that are `Some` are sent.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_ethiopian: Option<String>,
}
