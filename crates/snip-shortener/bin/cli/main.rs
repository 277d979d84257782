mod cli;

use crate::cli::{Command, StorageBackendArg, CLI};
use clap::Parser;
use serde_json::json;
use snip_audit::{AuditManager, FileObserver, HttpObserver, TracingObserver};
use snip_generator::RandomGenerator;
use snip_shortener::{
    BatchRequest, ServiceConfig, ShortCode, ShortenerError, ShortenerService, UserId,
};
use snip_storage::{FileRepository, InMemoryRepository, MySqlRepository, Repository};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CLI::parse();
    init_tracing(config.log_json);

    info!(
        base_url = %config.base_url,
        storage_backend = %config.storage,
        max_attempts = config.max_attempts,
        "starting snip"
    );

    let audit = Arc::new(build_audit(&config).await?);
    let service_config = ServiceConfig::builder()
        .base_url(config.base_url.clone())
        .max_attempts(config.max_attempts)
        .build();

    let result = match config.storage {
        StorageBackendArg::InMemory => {
            run(
                config.command,
                InMemoryRepository::new(),
                service_config,
                Arc::clone(&audit),
            )
            .await
        }
        StorageBackendArg::File => {
            let path = config
                .file_storage_path
                .ok_or("file storage path is required when storage backend is file")?;
            let repository = FileRepository::open(path).await?;
            run(config.command, repository, service_config, Arc::clone(&audit)).await
        }
        StorageBackendArg::Mysql => {
            let mysql_dsn = config
                .mysql_dsn
                .ok_or("mysql dsn is required when storage backend is mysql")?;
            let repository = MySqlRepository::connect(&mysql_dsn).await?;
            repository.ensure_schema().await?;
            run(config.command, repository, service_config, Arc::clone(&audit)).await
        }
    };

    audit.close().await;
    result
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn build_audit(config: &CLI) -> Result<AuditManager, Box<dyn std::error::Error>> {
    let audit = AuditManager::new();

    if let Some(path) = &config.audit_file {
        audit.register(Arc::new(FileObserver::open(path).await?));
    }
    if let Some(url) = &config.audit_url {
        audit.register(Arc::new(HttpObserver::new(url)?));
    }
    if config.audit_log {
        audit.register(Arc::new(TracingObserver));
    }

    Ok(audit)
}

async fn run<R: Repository>(
    command: Command,
    repository: R,
    config: ServiceConfig,
    audit: Arc<AuditManager>,
) -> Result<(), Box<dyn std::error::Error>> {
    let service =
        ShortenerService::new(repository, RandomGenerator::new(), config).with_audit(audit);

    let output = match command {
        Command::Shorten { url, user } => {
            let owner = UserId::new(user)?;
            match service.shorten(&url, &owner).await {
                Ok(code) => json!({ "short_url": service.short_url(&code), "created": true }),
                Err(ShortenerError::Conflict { short_code }) => {
                    json!({ "short_url": service.short_url(&short_code), "created": false })
                }
                Err(err) => return Err(err.into()),
            }
        }
        Command::Resolve { code, user } => {
            let code = ShortCode::new(code).map_err(ShortenerError::from)?;
            let requester = user.map(UserId::new).transpose()?;
            let url = service.resolve(&code, requester.as_ref()).await?;
            json!({ "original_url": url })
        }
        Command::List { user } => {
            let owner = UserId::new(user)?;
            serde_json::to_value(service.list_by_user(&owner).await?)?
        }
        Command::Delete { user, codes } => {
            let owner = UserId::new(user)?;
            let codes = codes
                .into_iter()
                .map(ShortCode::new)
                .collect::<Result<Vec<_>, _>>()?;
            let deleted = service.delete_batch(&owner, &codes).await?;
            json!({ "deleted": deleted })
        }
        Command::Batch { user, input } => {
            let owner = UserId::new(user)?;
            let raw = tokio::fs::read(&input).await?;
            let requests: Vec<BatchRequest> = serde_json::from_slice(&raw)?;
            serde_json::to_value(service.shorten_batch(&requests, &owner).await?)?
        }
        Command::Stats => serde_json::to_value(service.stats().await?)?,
        Command::Ping => {
            service.ping().await?;
            json!({ "status": "ok" })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
