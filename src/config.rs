use anyhow::{Context, Result};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use std::fmt;
use std::path::PathBuf;

use crate::auth::{redact, AuthConfig, FileStore};

const DEFAULT_SITE_URL: &str = "https://cfc.localline.ca";
const API_PATH: &str = "/api/backoffice/v2";

/// Local Line backoffice command boundary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Local Line site URL
    #[arg(
        long,
        env = "LOCAL_LINE_BASE_URL",
        default_value = DEFAULT_SITE_URL,
        global = true,
    )]
    pub base_url: String,

    /// Backoffice API base URL (defaults to {base-url}/api/backoffice/v2)
    #[arg(long, env = "LOCAL_LINE_API_BASE", global = true)]
    pub api_base: Option<String>,

    /// Credential store scope (keychain service name)
    #[arg(
        long,
        env = "LOCAL_LINE_KEYCHAIN_SERVICE",
        default_value = "mcp.localline",
        global = true,
    )]
    pub keychain_service: String,

    /// Credential store backend (keyring, file)
    #[arg(
        long,
        env = "LOCAL_LINE_STORE_BACKEND",
        default_value = "keyring",
        global = true,
    )]
    pub store_backend: String,

    /// Credentials file for the file backend
    #[arg(long, env = "LOCAL_LINE_CREDENTIALS_FILE", global = true)]
    pub credentials_file: Option<String>,

    /// Timezone used for the fulfillment week
    #[arg(
        long,
        env = "LOCAL_LINE_TIMEZONE",
        default_value = "America/Toronto",
        global = true,
    )]
    pub timezone: String,

    /// Token endpoint timeout in seconds
    #[arg(long, env = "TOKEN_REQUEST_TIMEOUT", default_value = "45", global = true)]
    pub token_timeout: u64,

    /// Business API timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "60", global = true)]
    pub http_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Report whether a usable access token is available
    AuthStatus,

    /// Log in with LOCALLINE_USERNAME/LOCALLINE_PASSWORD and store the tokens
    AuthBootstrap,

    /// Create vendor picklists for the current fulfillment week
    PicklistsCreate {
        #[arg(long)]
        start_date: String,
        #[arg(long)]
        end_date: String,
        /// Picklist name (defaults to "{Weekday}, {Mon} {day} Deliveries" of the end date)
        #[arg(long, default_value = "")]
        name: String,
        /// Hub note attached to the picklists
        #[arg(long, default_value = "")]
        note: String,
        #[arg(long)]
        allow_outside_current_week: bool,
    },

    /// Export orders for a date range
    OrdersExport {
        #[arg(long)]
        start_date: String,
        #[arg(long)]
        end_date: String,
    },

    /// Send a proof email to one customer
    CustomersEmailProof {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        body: String,
        #[arg(long, default_value = "744150")]
        customer_id: String,
    },

    /// Send an email to every customer
    CustomersEmailSendAll {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        body: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum StoreBackend {
    Keyring,
    File,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Secrets read from the environment only
#[derive(Clone, Default)]
pub struct Secrets {
    pub api_token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            api_token: read("LOCALLINE_API_TOKEN"),
            username: read("LOCALLINE_USERNAME"),
            password: read("LOCALLINE_PASSWORD"),
        }
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("api_token", &self.api_token.as_deref().map(redact))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    // Endpoints
    pub site_url: String,
    pub api_base: String,

    // Credential storage
    pub keychain_service: String,
    pub store_backend: StoreBackend,
    pub credentials_file: Option<PathBuf>,

    // Fulfillment week
    pub timezone: Tz,

    // Timeouts
    pub token_timeout: u64,
    pub http_timeout: u64,

    // Logging
    pub log_level: String,
    pub log_format: LogFormat,

    pub secrets: Secrets,
    pub command: Command,
}

impl Config {
    /// Load configuration with priority: CLI > ENV (.env included) > defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        Self::from_args(args, Secrets::from_env())
    }

    pub fn from_args(args: CliArgs, secrets: Secrets) -> Result<Self> {
        let site_url = args.base_url.trim().trim_end_matches('/').to_string();
        let api_base = args
            .api_base
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("{}{}", site_url, API_PATH));

        let timezone: Tz = args
            .timezone
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Invalid LOCAL_LINE_TIMEZONE: {}", args.timezone))?;

        let credentials_file = args
            .credentials_file
            .map(|s| expand_tilde(&s))
            .or_else(FileStore::default_path);

        Ok(Config {
            site_url,
            api_base,
            keychain_service: args.keychain_service.trim().to_string(),
            store_backend: parse_store_backend(&args.store_backend),
            credentials_file,
            timezone,
            token_timeout: args.token_timeout,
            http_timeout: args.http_timeout,
            log_level: args.log_level,
            log_format: parse_log_format(&args.log_format),
            secrets,
            command: args.command,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.keychain_service.is_empty() {
            anyhow::bail!("LOCAL_LINE_KEYCHAIN_SERVICE must not be blank");
        }
        if self.token_timeout == 0 {
            anyhow::bail!("TOKEN_REQUEST_TIMEOUT must be greater than zero");
        }
        if self.http_timeout == 0 {
            anyhow::bail!("HTTP_REQUEST_TIMEOUT must be greater than zero");
        }
        if self.store_backend == StoreBackend::File && self.credentials_file.is_none() {
            anyhow::bail!("No config directory found; set LOCAL_LINE_CREDENTIALS_FILE");
        }

        Ok(())
    }

    /// Token routes live under the API base
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig::new(self.api_base.clone(), self.keychain_service.clone())
            .with_direct_token(self.secrets.api_token.clone())
            .with_login(self.secrets.username.clone(), self.secrets.password.clone())
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Parse store backend; unknown values use the keyring when it is compiled in
fn parse_store_backend(s: &str) -> StoreBackend {
    match s.trim().to_lowercase().as_str() {
        "file" => StoreBackend::File,
        _ if cfg!(feature = "keyring-storage") => StoreBackend::Keyring,
        _ => StoreBackend::File,
    }
}

/// Parse log format from string
fn parse_log_format(s: &str) -> LogFormat {
    match s.trim().to_lowercase().as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    }
}
