use thiserror::Error;

/// Errors raised by audit observers.
///
/// They never leave the audit subsystem: the manager logs and drops them.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot encode audit event: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("audit request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("audit collector rejected event with status {0}")]
    Rejected(u16),
    #[error("audit observer is closed")]
    Closed,
}
