use crate::error::Res;
use crate::model::SyncStatus;
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;

/// The JSON key holding a record's identifier.
pub const ID_KEY: &str = "_id";

/// The JSON key holding a record's synchronization status.
pub const STATUS_KEY: &str = "status";

/// A key used by some older caches for an auto-incremented local row number.
const LOCAL_KEY: &str = "id";

/// The two record collections that are cached and synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Categories,
    Expenses,
}

serde_plain::derive_display_from_serialize!(Collection);
serde_plain::derive_fromstr_from_deserialize!(Collection);

impl Collection {
    /// The order in which pending records are replayed. Expenses reference categories, so
    /// categories go first.
    pub const RECONCILE_ORDER: [Collection; 2] = [Collection::Categories, Collection::Expenses];

    /// The resource path of this collection on the server, e.g. `/expenses`.
    pub fn path(&self) -> &'static str {
        match self {
            Collection::Categories => "/categories",
            Collection::Expenses => "/expenses",
        }
    }

    /// The name of the SQLite table caching this collection.
    pub(crate) fn table(&self) -> &'static str {
        match self {
            Collection::Categories => "categories",
            Collection::Expenses => "expenses",
        }
    }
}

/// Something stored in one of the cached collections.
pub trait Record: Debug + Clone + Serialize + DeserializeOwned + Send + Sync {
    /// The collection this record type belongs to.
    const COLLECTION: Collection;

    /// The server-assigned identifier, or the local placeholder while pending.
    fn id(&self) -> &str;

    fn status(&self) -> SyncStatus;

    /// Parses a record out of a JSON document.
    fn from_value(value: Value) -> Res<Self> {
        serde_json::from_value(value).with_context(|| {
            format!("Unable to parse a record of the {} collection", Self::COLLECTION)
        })
    }

    fn to_value(&self) -> Res<Value> {
        serde_json::to_value(self).with_context(|| {
            format!("Unable to serialize a record of the {} collection", Self::COLLECTION)
        })
    }
}

/// Removes the local-only fields (placeholder identifier, status and any local row key) from a
/// cached document, leaving the fields that are submitted to the server when a pending record is
/// replayed.
pub(crate) fn replay_payload(document: &Value) -> Value {
    let mut payload = document.clone();
    if let Value::Object(map) = &mut payload {
        map.remove(ID_KEY);
        map.remove(STATUS_KEY);
        map.remove(LOCAL_KEY);
    }
    payload
}
