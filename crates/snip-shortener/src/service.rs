use crate::error::{storage_to_shortener_error, Result, ShortenerError};
use crate::model::{BatchItem, BatchRequest, UrlPair};
use snip_audit::{AuditAction, AuditEvent, AuditManager};
use snip_core::{Repository, ShortCode, Stats, StorageError, UserId};
use snip_generator::Generator;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use typed_builder::TypedBuilder;

/// Default bound on generate-and-save attempts per shortened URL.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, TypedBuilder)]
pub struct ServiceConfig {
    /// Prefix of every short link, e.g. `https://sn.ip`.
    #[builder(setter(into))]
    pub base_url: String,
    /// How many generated codes to try before giving up with
    /// [`ShortenerError::Exhausted`].
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,
    /// Deadline applied to each storage call.
    #[builder(default, setter(strip_option))]
    pub operation_timeout: Option<Duration>,
}

/// The shortening engine.
///
/// This service wraps a `Repository` and a `Generator` to handle:
/// - Short code generation with bounded retry on collisions
/// - URL validation
/// - Ownership-scoped listing and soft deletion
/// - Audit notifications for shortens and follows
///
/// Cloning is cheap and clones share the same backend, generator and audit
/// manager.
pub struct ShortenerService<R, G> {
    repository: Arc<R>,
    generator: Arc<G>,
    config: ServiceConfig,
    audit: Option<Arc<AuditManager>>,
}

impl<R, G> Clone for ShortenerService<R, G> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            generator: Arc::clone(&self.generator),
            config: self.config.clone(),
            audit: self.audit.clone(),
        }
    }
}

impl<R: Repository, G: Generator> ShortenerService<R, G> {
    pub fn new(repository: R, generator: G, config: ServiceConfig) -> Self {
        Self {
            repository: Arc::new(repository),
            generator: Arc::new(generator),
            config,
            audit: None,
        }
    }

    /// Reports successful shortens and follows to `audit`.
    pub fn with_audit(mut self, audit: Arc<AuditManager>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Shortens `url` on behalf of `owner`.
    ///
    /// Returns [`ShortenerError::Conflict`] with the existing code when the URL
    /// is already shortened, by any user.
    pub async fn shorten(&self, url: &str, owner: &UserId) -> Result<ShortCode> {
        let code = self.store(url, owner).await?;
        self.audit(AuditAction::Shorten, Some(owner), url);
        Ok(code)
    }

    /// Resolves a short code to its original URL.
    pub async fn resolve(&self, code: &ShortCode, requester: Option<&UserId>) -> Result<String> {
        let record = self
            .with_deadline("get", self.repository.get(code))
            .await
            .map_err(storage_to_shortener_error)?
            .ok_or_else(|| ShortenerError::NotFound(code.clone()))?;

        if record.deleted {
            return Err(ShortenerError::Gone(code.clone()));
        }

        self.audit(AuditAction::Follow, requester, &record.original_url);
        Ok(record.original_url)
    }

    /// Lists the active links of `owner` with the base URL applied.
    pub async fn list_by_user(&self, owner: &UserId) -> Result<Vec<UrlPair>> {
        let records = self
            .with_deadline("get_by_owner", self.repository.get_by_owner(owner))
            .await
            .map_err(storage_to_shortener_error)?;

        Ok(records
            .into_iter()
            .map(|record| UrlPair {
                short_url: self.short_url(&record.short_code),
                original_url: record.original_url,
            })
            .collect())
    }

    /// Shortens every URL of `requests` in order.
    ///
    /// The first failure, a conflict included, aborts the batch. Items stored
    /// before the failure stay stored.
    pub async fn shorten_batch(
        &self,
        requests: &[BatchRequest],
        owner: &UserId,
    ) -> Result<Vec<BatchItem>> {
        let mut items = Vec::with_capacity(requests.len());
        for request in requests {
            let code = self.store(&request.original_url, owner).await.map_err(|err| {
                debug!(
                    owner = %owner,
                    correlation_id = %request.correlation_id,
                    error = %err,
                    "batch aborted"
                );
                err
            })?;

            items.push(BatchItem {
                correlation_id: request.correlation_id.clone(),
                short_url: self.short_url(&code),
            });
        }
        Ok(items)
    }

    /// Soft-deletes the codes of `codes` that `owner` owns. Returns how many
    /// records were newly deleted.
    pub async fn delete_batch(&self, owner: &UserId, codes: &[ShortCode]) -> Result<u64> {
        if codes.is_empty() {
            return Ok(0);
        }

        let deleted = self
            .with_deadline("delete_by_owner", self.repository.delete_by_owner(owner, codes))
            .await
            .map_err(storage_to_shortener_error)?;

        debug!(owner = %owner, requested = codes.len(), deleted, "delete batch finished");
        Ok(deleted)
    }

    pub async fn stats(&self) -> Result<Stats> {
        self.with_deadline("stats", self.repository.stats())
            .await
            .map_err(storage_to_shortener_error)
    }

    pub async fn ping(&self) -> Result<()> {
        self.with_deadline("ping", self.repository.ping())
            .await
            .map_err(storage_to_shortener_error)
    }

    /// Formats the full short link for `code`.
    pub fn short_url(&self, code: &ShortCode) -> String {
        code.to_url(&self.config.base_url)
    }

    /// Generates codes until one is stored, bounded by `max_attempts`.
    async fn store(&self, url: &str, owner: &UserId) -> Result<ShortCode> {
        validate_url(url)?;

        let attempts = self.config.max_attempts.max(1);
        for attempt in 1..=attempts {
            let code = self.generator.generate();
            match self
                .with_deadline("save", self.repository.save(&code, url, owner))
                .await
            {
                Ok(()) => {
                    debug!(code = %code, owner = %owner, attempt, "url shortened");
                    return Ok(code);
                }
                Err(StorageError::CodeTaken(_)) => {
                    debug!(code = %code, attempt, "short code collision, regenerating");
                }
                Err(err) => return Err(storage_to_shortener_error(err)),
            }
        }

        warn!(attempts, owner = %owner, "gave up finding a free short code");
        Err(ShortenerError::Exhausted { attempts })
    }

    async fn with_deadline<T, F>(
        &self,
        operation: &'static str,
        future: F,
    ) -> snip_core::error::Result<T>
    where
        F: Future<Output = snip_core::error::Result<T>>,
    {
        let Some(limit) = self.config.operation_timeout else {
            return future.await;
        };

        match tokio::time::timeout(limit, future).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout_ms = limit.as_millis() as u64, "storage call timed out");
                Err(StorageError::Timeout(format!(
                    "{operation} did not finish within {}ms",
                    limit.as_millis()
                )))
            }
        }
    }

    fn audit(&self, action: AuditAction, user: Option<&UserId>, url: &str) {
        if let Some(audit) = &self.audit {
            audit.notify(AuditEvent::new(action, user.map(ToString::to_string), url));
        }
    }
}

/// Validates that the URL has a valid format (has a scheme and host).
fn validate_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(ShortenerError::InvalidUrl(
            "URL cannot be empty".to_string(),
        ));
    }

    // A valid URL should have "://" and something after it
    let Some((scheme, rest)) = url.split_once("://") else {
        return Err(ShortenerError::InvalidUrl(format!(
            "URL must have a valid scheme and host: {}",
            url
        )));
    };

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if scheme.is_empty() || host.is_empty() {
        return Err(ShortenerError::InvalidUrl(format!(
            "URL must have a valid scheme and host: {}",
            url
        )));
    }

    let scheme = scheme.to_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(ShortenerError::InvalidUrl(format!(
            "URL scheme must be http or https: {}",
            scheme
        )));
    }

    Ok(())
}
