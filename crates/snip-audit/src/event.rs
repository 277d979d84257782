use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// What happened to a short link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    /// A URL was shortened.
    Shorten,
    /// A short link was resolved to its URL.
    Follow,
}

impl Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditAction::Shorten => f.write_str("shorten"),
            AuditAction::Follow => f.write_str("follow"),
        }
    }
}

/// A single audit record.
///
/// Serialized as one JSON object, which is both the line format of the file
/// sink and the request body of the HTTP sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unix timestamp in seconds.
    pub ts: i64,
    pub action: AuditAction,
    /// The acting user, absent for anonymous requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// The original URL involved.
    pub url: String,
}

impl AuditEvent {
    /// Creates an event stamped with the current time.
    pub fn new(action: AuditAction, user_id: Option<String>, url: impl Into<String>) -> Self {
        Self {
            ts: Timestamp::now().as_second(),
            action,
            user_id,
            url: url.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_flat_json() {
        let event = AuditEvent {
            ts: 1_700_000_000,
            action: AuditAction::Shorten,
            user_id: Some("u1".to_string()),
            url: "https://example.com".to_string(),
        };

        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"ts":1700000000,"action":"shorten","user_id":"u1","url":"https://example.com"}"#
        );
    }

    #[test]
    fn anonymous_events_omit_user() {
        let event = AuditEvent {
            ts: 1,
            action: AuditAction::Follow,
            user_id: None,
            url: "https://example.com".to_string(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("user_id").is_none());
        assert_eq!(json["action"], "follow");
    }
}
