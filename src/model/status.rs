use serde::{Deserialize, Serialize};

/// Whether a cached record mirrors the server or is still waiting to be sent to it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// The identifier and fields are authoritative, sourced from the server.
    #[default]
    Synced,
    /// Created while offline. Holds a placeholder identifier until reconciliation.
    Pending,
}

serde_plain::derive_display_from_serialize!(SyncStatus);
serde_plain::derive_fromstr_from_deserialize!(SyncStatus);

impl SyncStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, SyncStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_strings() {
        assert_eq!(SyncStatus::Pending.to_string(), "pending");
        assert_eq!(SyncStatus::from_str("synced").unwrap(), SyncStatus::Synced);
        assert!(SyncStatus::from_str("queued").is_err());
    }
}
