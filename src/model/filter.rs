//! Filters for expense list requests.
//!
//! Online, a filter becomes the query string of the list request and the server applies it.
//! Offline, the same filter is evaluated against the cached expenses.

use crate::model::{Amount, Expense};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The query parameters accepted by the expense list endpoint.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseFilter {
    /// Case-insensitive substring of the expense reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_min: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_max: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
}

impl ExpenseFilter {
    /// A filter restricted to a single category.
    pub fn category(category_id: impl Into<String>) -> Self {
        Self {
            category_id: Some(category_id.into()),
            ..Self::default()
        }
    }

    /// True when no criteria are set, i.e. the request reads the whole collection.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// The filter as `(name, value)` query parameters, in a stable order.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(search) = &self.search {
            pairs.push(("search", search.clone()));
        }
        if let Some(d) = self.date_from {
            pairs.push(("dateFrom", d.format("%Y-%m-%d").to_string()));
        }
        if let Some(d) = self.date_to {
            pairs.push(("dateTo", d.format("%Y-%m-%d").to_string()));
        }
        if let Some(a) = self.amount_min {
            pairs.push(("amountMin", a.to_string()));
        }
        if let Some(a) = self.amount_max {
            pairs.push(("amountMax", a.to_string()));
        }
        if let Some(c) = &self.category_id {
            pairs.push(("categoryId", c.clone()));
        }
        pairs
    }

    /// Evaluates the filter locally. Date bounds are inclusive and compare calendar days, an
    /// expense without a date never satisfies a date bound.
    pub fn matches(&self, expense: &Expense) -> bool {
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !expense.reason().to_lowercase().contains(&needle) {
                return false;
            }
        }
        if self.date_from.is_some() || self.date_to.is_some() {
            let Some(day) = expense.date().map(|d| d.date_naive()) else {
                return false;
            };
            if self.date_from.is_some_and(|from| day < from) {
                return false;
            }
            if self.date_to.is_some_and(|to| day > to) {
                return false;
            }
        }
        if self.amount_min.is_some_and(|min| expense.amount().value() < min.value()) {
            return false;
        }
        if self.amount_max.is_some_and(|max| expense.amount().value() > max.value()) {
            return false;
        }
        if let Some(category_id) = &self.category_id {
            if expense.category_id() != Some(category_id.as_str()) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use serde_json::json;

    fn expense(reason: &str, amount: u32, date: &str, category: &str) -> Expense {
        Expense::from_value(json!({
            "_id": format!("e-{reason}"),
            "reason": reason,
            "amount": amount,
            "date": date,
            "categoryId": category,
        }))
        .unwrap()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = ExpenseFilter::default();
        assert!(filter.is_empty());
        assert!(filter.query_pairs().is_empty());
        assert!(filter.matches(&expense("Taxi", 80, "2026-01-02T10:00:00Z", "c1")));
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let filter = ExpenseFilter {
            search: Some("coffee".to_string()),
            ..ExpenseFilter::default()
        };
        assert!(filter.matches(&expense("Morning Coffee", 5, "2026-01-02T10:00:00Z", "c1")));
        assert!(!filter.matches(&expense("Taxi", 80, "2026-01-02T10:00:00Z", "c1")));
    }

    #[test]
    fn test_date_and_amount_bounds() {
        let filter = ExpenseFilter {
            date_from: NaiveDate::from_ymd_opt(2026, 1, 2),
            date_to: NaiveDate::from_ymd_opt(2026, 1, 31),
            amount_min: Some(Amount::from(10)),
            amount_max: Some(Amount::from(100)),
            ..ExpenseFilter::default()
        };
        assert!(filter.matches(&expense("a", 10, "2026-01-02T00:00:00Z", "c1")));
        assert!(filter.matches(&expense("b", 100, "2026-01-31T23:59:00Z", "c1")));
        assert!(!filter.matches(&expense("c", 9, "2026-01-10T00:00:00Z", "c1")));
        assert!(!filter.matches(&expense("d", 50, "2026-02-01T00:00:00Z", "c1")));
    }

    #[test]
    fn test_category_and_query_pairs() {
        let filter = ExpenseFilter::category("c2");
        assert!(!filter.matches(&expense("a", 10, "2026-01-02T00:00:00Z", "c1")));
        assert!(filter.matches(&expense("a", 10, "2026-01-02T00:00:00Z", "c2")));
        assert_eq!(filter.query_pairs(), vec![("categoryId", "c2".to_string())]);
    }
}
