//! Implements the `Transport` trait with an in-memory server for testing purposes.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without a running server (see `Mode::Test`).

use crate::api::{
    Endpoint, Method, Request, Response, Transport, TransportError, TransportErrorKind,
};
use crate::model::{Collection, Expense, Record, ID_KEY};
use anyhow::anyhow;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// How a request matched by a failure rule fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The server answers with `status` and `{"error": message}`.
    Reject { status: u16, message: String },
    /// The server cannot be reached at all.
    Unreachable,
    /// The request is sent but no answer arrives in time.
    Timeout,
    /// The server answers 200 with a body that is not JSON.
    Garbled,
}

type Predicate = Box<dyn Fn(&Request) -> bool + Send + Sync>;

struct Rule {
    matches: Predicate,
    failure: Failure,
}

struct State {
    records: BTreeMap<Collection, Vec<Value>>,
    next_ids: BTreeMap<Collection, u64>,
    requests: Vec<Request>,
    reachable: bool,
    delete_no_content: bool,
    rules: Vec<Rule>,
}

/// An implementation of the `Transport` trait that does not use the network. It behaves like the
/// expense server's REST API, records every request it receives, and can be told to fail.
pub struct TestServer {
    state: Mutex<State>,
}

impl Default for TestServer {
    fn default() -> Self {
        Self::new()
    }
}

impl TestServer {
    /// Creates a reachable server with no records.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                records: BTreeMap::new(),
                next_ids: BTreeMap::new(),
                requests: Vec::new(),
                reachable: true,
                delete_no_content: false,
                rules: Vec::new(),
            }),
        }
    }

    /// Creates a server holding a few categories and expenses.
    pub fn seeded() -> Self {
        let server = Self::new();
        for (name, icon) in SEED_CATEGORIES {
            server.insert(Collection::Categories, json!({"name": name, "icon": icon}));
        }
        for (category, amount, reason, date) in SEED_EXPENSES {
            server.insert(
                Collection::Expenses,
                json!({"categoryId": category, "amount": amount, "reason": reason, "date": date}),
            );
        }
        server
    }

    /// Stores `record` as if it had been created through the API and returns the stored value.
    pub fn insert(&self, collection: Collection, record: Value) -> Value {
        match self.lock() {
            Ok(mut state) => state.create(collection, record),
            Err(_) => Value::Null,
        }
    }

    /// The records the server currently holds for `collection`.
    pub fn records(&self, collection: Collection) -> Vec<Value> {
        self.lock()
            .map(|s| s.records.get(&collection).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Every request received so far, including the ones that failed.
    pub fn requests(&self) -> Vec<Request> {
        self.lock().map(|s| s.requests.clone()).unwrap_or_default()
    }

    pub fn clear_requests(&self) {
        if let Ok(mut state) = self.lock() {
            state.requests.clear();
        }
    }

    /// When unreachable, every request fails as if the network were down.
    pub fn set_reachable(&self, reachable: bool) {
        if let Ok(mut state) = self.lock() {
            state.reachable = reachable;
        }
    }

    /// Answer successful deletions with `204 No Content` instead of a JSON message.
    pub fn set_delete_no_content(&self, no_content: bool) {
        if let Ok(mut state) = self.lock() {
            state.delete_no_content = no_content;
        }
    }

    /// Makes every request for which `matches` returns true fail with `failure`. Rules are
    /// checked in the order they were added.
    pub fn fail_if<F>(&self, matches: F, failure: Failure)
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        if let Ok(mut state) = self.lock() {
            state.rules.push(Rule {
                matches: Box::new(matches),
                failure,
            });
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut state) = self.lock() {
            state.rules.clear();
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, TransportError> {
        self.state.lock().map_err(|_| {
            TransportError::new(
                TransportErrorKind::Other,
                anyhow!("The test server state is poisoned"),
            )
        })
    }
}

#[async_trait::async_trait]
impl Transport for TestServer {
    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let mut state = self.lock()?;
        state.requests.push(request.clone());

        if !state.reachable {
            return Err(unreachable());
        }
        let failure = state
            .rules
            .iter()
            .find(|rule| (rule.matches)(request))
            .map(|rule| rule.failure.clone());
        match failure {
            Some(Failure::Reject { status, message }) => {
                return Ok(Response::new(status, Some(json!({ "error": message }))));
            }
            Some(Failure::Unreachable) => return Err(unreachable()),
            Some(Failure::Timeout) => {
                return Err(TransportError::new(
                    TransportErrorKind::Timeout,
                    anyhow!("The request to {request} timed out"),
                ));
            }
            Some(Failure::Garbled) => {
                return Err(TransportError::new(
                    TransportErrorKind::Decode,
                    anyhow!("The response to {request} is not valid JSON"),
                ));
            }
            None => {}
        }

        Ok(state.handle(request))
    }
}

fn unreachable() -> TransportError {
    TransportError::new(
        TransportErrorKind::Connect,
        anyhow!("Connection refused by the test server"),
    )
}

fn not_found(collection: Collection) -> Response {
    let noun = match collection {
        Collection::Categories => "Category",
        Collection::Expenses => "Expense",
    };
    Response::new(404, Some(json!({ "error": format!("{noun} not found") })))
}

fn bad_request(message: &str) -> Response {
    Response::new(400, Some(json!({ "error": message })))
}

impl State {
    fn handle(&mut self, request: &Request) -> Response {
        match (request.method(), request.endpoint()) {
            (Method::Get, Endpoint::Collection { collection, filter }) => {
                let records = self.records.get(collection).cloned().unwrap_or_default();
                let records: Vec<Value> = if filter.is_empty() {
                    records
                } else {
                    records
                        .into_iter()
                        .filter(|r| {
                            Expense::from_value(r.clone())
                                .map(|e| filter.matches(&e))
                                .unwrap_or(false)
                        })
                        .collect()
                };
                Response::new(200, Some(Value::Array(records)))
            }
            (Method::Get, Endpoint::Item { collection, id }) => match self.find(*collection, id) {
                Some(record) => Response::new(200, Some(record.clone())),
                None => not_found(*collection),
            },
            (Method::Post, Endpoint::Collection { collection, .. }) => {
                let Some(body) = request.body().filter(|b| b.is_object()) else {
                    return bad_request("A JSON object is required");
                };
                let required = match collection {
                    Collection::Categories => "name",
                    Collection::Expenses => "amount",
                };
                if !matches!(body.get(required), Some(v) if !v.is_null()) {
                    return bad_request(&format!("The '{required}' field is required"));
                }
                let created = self.create(*collection, body.clone());
                Response::new(201, Some(created))
            }
            (Method::Patch, Endpoint::Item { collection, id }) => {
                let Some(Value::Object(changes)) = request.body() else {
                    return bad_request("A JSON object is required");
                };
                match self.find_mut(*collection, id) {
                    Some(Value::Object(record)) => {
                        for (key, value) in changes {
                            if key != ID_KEY {
                                record.insert(key.clone(), value.clone());
                            }
                        }
                        Response::new(200, Some(Value::Object(record.clone())))
                    }
                    _ => not_found(*collection),
                }
            }
            (Method::Delete, Endpoint::Item { collection, id }) => {
                let records = self.records.entry(*collection).or_default();
                let before = records.len();
                records.retain(|r| r.get(ID_KEY).and_then(Value::as_str) != Some(id));
                if records.len() == before {
                    return not_found(*collection);
                }
                if self.delete_no_content {
                    Response::new(204, None)
                } else {
                    Response::new(200, Some(json!({ "message": "Deleted" })))
                }
            }
            _ => Response::new(404, Some(json!({ "error": "Not found" }))),
        }
    }

    fn create(&mut self, collection: Collection, body: Value) -> Value {
        let next = self.next_ids.entry(collection).or_insert(0);
        *next += 1;
        let prefix = match collection {
            Collection::Categories => "c",
            Collection::Expenses => "e",
        };
        let mut record = match body {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        record.insert(ID_KEY.to_string(), Value::String(format!("{prefix}{next}")));
        record.insert(
            "createdAt".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        if collection == Collection::Categories {
            record.entry("isVisible").or_insert(Value::Bool(true));
        }
        let record = Value::Object(record);
        self.records
            .entry(collection)
            .or_default()
            .push(record.clone());
        record
    }

    fn find(&self, collection: Collection, id: &str) -> Option<&Value> {
        self.records
            .get(&collection)?
            .iter()
            .find(|r| r.get(ID_KEY).and_then(Value::as_str) == Some(id))
    }

    fn find_mut(&mut self, collection: Collection, id: &str) -> Option<&mut Value> {
        self.records
            .get_mut(&collection)?
            .iter_mut()
            .find(|r| r.get(ID_KEY).and_then(Value::as_str) == Some(id))
    }
}

const SEED_CATEGORIES: [(&str, &str); 3] = [
    ("Food", "utensils"),
    ("Transport", "bus"),
    ("Utilities", "bolt"),
];

const SEED_EXPENSES: [(&str, u32, &str, &str); 4] = [
    ("c1", 120, "Injera and tibs", "2026-01-03T12:30:00.000Z"),
    ("c2", 40, "Minibus to Piassa", "2026-01-04T08:10:00.000Z"),
    ("c1", 25, "Macchiato", "2026-01-04T09:00:00.000Z"),
    ("c3", 350, "Electricity bill", "2026-01-05T17:45:00.000Z"),
];
