mod file;
mod http;
mod logging;

pub use file::FileObserver;
pub use http::{HttpObserver, DEFAULT_HTTP_TIMEOUT};
pub use logging::TracingObserver;

use crate::error::AuditError;
use crate::event::AuditEvent;
use async_trait::async_trait;

/// A sink for audit events.
///
/// Implementations report failures through their return value; the
/// [`AuditManager`](crate::AuditManager) logs and discards them, so an
/// observer can never fail or slow down the code path that emitted the event.
#[async_trait]
pub trait Observer: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Delivers one event.
    async fn notify(&self, event: &AuditEvent) -> Result<(), AuditError>;

    /// Releases held resources. Events delivered after close may fail.
    async fn close(&self) -> Result<(), AuditError> {
        Ok(())
    }
}
