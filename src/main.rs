use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

#[cfg(feature = "keyring-storage")]
use localline_boundary::auth::KeyringStore;
use localline_boundary::auth::{
    AuthConfig, CredentialSource, CredentialStore, FailureRecord, FileStore, TokenEndpoint,
    TokenManager,
};
use localline_boundary::commands::{picklist_output, Backoffice, CommandOutput, PicklistRequest};
use localline_boundary::config::{Command, Config, LogFormat, StoreBackend};
use localline_boundary::error::GuardError;
use localline_boundary::http_client::BackofficeClient;
use localline_boundary::week::WeekWindow;

/// Exit code for missing credentials and guard refusals
const EXIT_BLOCKED: i32 = 2;

type Manager = TokenManager<Box<dyn CredentialStore>>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = Config::load()?;
    config.validate()?;

    init_logging(&config);
    tracing::debug!(
        api_base = %config.api_base,
        store = ?config.store_backend,
        "Configuration loaded"
    );

    let store = open_store(&config)?;
    tracing::debug!("Credential store: {}", store.describe());

    let endpoint = TokenEndpoint::new(Duration::from_secs(config.token_timeout))?;
    let manager = TokenManager::new(store, endpoint);

    let code = run(&config, &manager).await?;
    std::process::exit(code)
}

/// Logs go to stderr so stdout carries only the JSON result
fn init_logging(config: &Config) {
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.with_file(true).with_line_number(true).init(),
    }
}

fn open_store(config: &Config) -> Result<Box<dyn CredentialStore>> {
    match config.store_backend {
        #[cfg(feature = "keyring-storage")]
        StoreBackend::Keyring => Ok(Box::new(KeyringStore::new())),
        _ => {
            let path = config
                .credentials_file
                .clone()
                .context("No credentials file path; set LOCAL_LINE_CREDENTIALS_FILE")?;
            Ok(Box::new(FileStore::new(path)))
        }
    }
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{}", rendered);
    Ok(())
}

async fn run(config: &Config, manager: &Manager) -> Result<i32> {
    let auth = config.auth_config();

    match &config.command {
        Command::AuthStatus => {
            let record = manager.auth_status(&auth).await;
            emit(&record)?;
            Ok(if record.ok { 0 } else { 1 })
        }

        Command::AuthBootstrap => match manager.bootstrap_and_store(&auth).await {
            Ok(record) => {
                emit(&record)?;
                Ok(0)
            }
            Err(e) => {
                tracing::error!(error_kind = e.kind(), "Bootstrap failed: {}", e);
                emit(&e.to_record())?;
                Ok(1)
            }
        },

        Command::PicklistsCreate {
            start_date,
            end_date,
            name,
            note,
            allow_outside_current_week,
        } => {
            let window = WeekWindow::current(config.timezone);
            let guard = (!allow_outside_current_week).then_some(&window);
            let request = match PicklistRequest::prepare(start_date, end_date, name, note, guard) {
                Ok(request) => request,
                Err(e) => return blocked(&e),
            };

            let Some((token, source)) = require_token(manager, &auth).await? else {
                return Ok(EXIT_BLOCKED);
            };
            let client = BackofficeClient::new(config.http_timeout)?;
            let api = Backoffice::new(&client, &config.api_base, &token);

            let (response, vendor_count) = api.create_picklists(&request).await;
            finish(&picklist_output(response, vendor_count, source))
        }

        Command::OrdersExport {
            start_date,
            end_date,
        } => {
            let Some((token, source)) = require_token(manager, &auth).await? else {
                return Ok(EXIT_BLOCKED);
            };
            let client = BackofficeClient::new(config.http_timeout)?;
            let api = Backoffice::new(&client, &config.api_base, &token);

            let response = api.export_orders(start_date, end_date).await;
            finish(&CommandOutput::new(response, source))
        }

        Command::CustomersEmailProof {
            subject,
            body,
            customer_id,
        } => {
            let Some((token, source)) = require_token(manager, &auth).await? else {
                return Ok(EXIT_BLOCKED);
            };
            let client = BackofficeClient::new(config.http_timeout)?;
            let api = Backoffice::new(&client, &config.api_base, &token);

            let response = api.email_customer_proof(subject, body, customer_id).await;
            finish(&CommandOutput::new(response, source))
        }

        Command::CustomersEmailSendAll { subject, body } => {
            let Some((token, source)) = require_token(manager, &auth).await? else {
                return Ok(EXIT_BLOCKED);
            };
            let client = BackofficeClient::new(config.http_timeout)?;
            let api = Backoffice::new(&client, &config.api_base, &token);

            let response = api.email_all_customers(subject, body).await;
            finish(&CommandOutput::new(response, source))
        }
    }
}

/// Token for a business call; prints the failure and returns None when there is none
async fn require_token(
    manager: &Manager,
    auth: &AuthConfig,
) -> Result<Option<(String, CredentialSource)>> {
    let resolution = match manager.get_access_token(auth).await {
        Ok(resolution) => resolution,
        Err(e) => {
            tracing::error!(error_kind = e.kind(), "Credential resolution failed: {}", e);
            emit(&e.to_record())?;
            return Ok(None);
        }
    };

    let reason = resolution.reason();
    match resolution.token {
        Some(token) => Ok(Some((token, resolution.source))),
        None => {
            emit(&FailureRecord::no_credential(reason))?;
            Ok(None)
        }
    }
}

fn finish(output: &CommandOutput) -> Result<i32> {
    emit(output)?;
    Ok(if output.response.ok { 0 } else { 1 })
}

fn blocked(e: &GuardError) -> Result<i32> {
    let status = match e {
        GuardError::InvalidDate(_) => "INVALID_DATE",
        GuardError::OutsideCurrentWeek { .. } => "GUARD_BLOCKED",
    };
    tracing::warn!("{}", e);
    emit(&json!({
        "ok": false,
        "status": status,
        "error": e.to_string(),
    }))?;
    Ok(EXIT_BLOCKED)
}
