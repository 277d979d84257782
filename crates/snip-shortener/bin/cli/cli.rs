use clap::{Parser, Subcommand, ValueEnum};
use snip_shortener::DEFAULT_MAX_ATTEMPTS;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const BASE_URL_ENV: &str = "SNIP_BASE_URL";
pub const STORAGE_BACKEND_ENV: &str = "SNIP_STORAGE_BACKEND";
pub const FILE_STORAGE_PATH_ENV: &str = "SNIP_FILE_STORAGE_PATH";
pub const MYSQL_DSN_ENV: &str = "SNIP_MYSQL_DSN";
pub const AUDIT_FILE_ENV: &str = "SNIP_AUDIT_FILE";
pub const AUDIT_URL_ENV: &str = "SNIP_AUDIT_URL";
pub const MAX_ATTEMPTS_ENV: &str = "SNIP_MAX_ATTEMPTS";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "file")]
    File,
    #[value(name = "mysql")]
    Mysql,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::File => write!(f, "file"),
            StorageBackendArg::Mysql => write!(f, "mysql"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "snip", about = "Operate a snip URL shortener store")]
pub struct CLI {
    #[arg(long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::InMemory
    )]
    pub storage: StorageBackendArg,

    #[arg(long, env = FILE_STORAGE_PATH_ENV, required_if_eq("storage", "file"))]
    pub file_storage_path: Option<PathBuf>,

    #[arg(long, env = MYSQL_DSN_ENV, required_if_eq("storage", "mysql"))]
    pub mysql_dsn: Option<String>,

    /// Append audit events to this file, one JSON object per line.
    #[arg(long, env = AUDIT_FILE_ENV)]
    pub audit_file: Option<PathBuf>,

    /// POST audit events to this URL.
    #[arg(long, env = AUDIT_URL_ENV)]
    pub audit_url: Option<String>,

    /// Also emit audit events through the log output.
    #[arg(long)]
    pub audit_log: bool,

    #[arg(long, env = MAX_ATTEMPTS_ENV, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Log as JSON instead of human readable text.
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten a URL.
    Shorten {
        url: String,
        #[arg(long)]
        user: String,
    },
    /// Print the original URL behind a short code.
    Resolve {
        code: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// List the links owned by a user.
    List {
        #[arg(long)]
        user: String,
    },
    /// Soft-delete short codes owned by a user.
    Delete {
        #[arg(long)]
        user: String,
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Shorten every entry of a JSON file of `{correlation_id, original_url}` objects.
    Batch {
        #[arg(long)]
        user: String,
        input: PathBuf,
    },
    /// Print the number of active links and users.
    Stats,
    /// Check that the storage backend is reachable.
    Ping,
}
