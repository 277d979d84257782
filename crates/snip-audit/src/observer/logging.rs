use crate::error::AuditError;
use crate::event::AuditEvent;
use crate::observer::Observer;
use async_trait::async_trait;
use tracing::info;

/// Emits audit events as structured `tracing` events on the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

#[async_trait]
impl Observer for TracingObserver {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn notify(&self, event: &AuditEvent) -> Result<(), AuditError> {
        info!(
            target: "audit",
            ts = event.ts,
            action = %event.action,
            user_id = event.user_id.as_deref().unwrap_or("-"),
            url = %event.url,
            "audit event"
        );
        Ok(())
    }
}
