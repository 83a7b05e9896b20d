// Authentication module
// Token lifecycle management, credential storage and cookie parsing

pub mod cookies;
mod credentials;
mod manager;
mod refresh;
mod types;

#[cfg(feature = "keyring-storage")]
pub use credentials::KeyringStore;
pub use credentials::{CredentialStore, FileStore, MemoryStore};
pub use manager::{RefreshOutcome, TokenManager};
pub use refresh::{TokenEndpoint, REFRESH_COOKIE_NAME};
pub use types::{
    redact, AuthConfig, BootstrapRecord, CredentialSource, EndpointUrls, FailureRecord,
    LoginCredentials, RemoteEnvelope, Slot, StatusRecord, TokenPair, TokenResolution,
    BOOTSTRAP_HINT, MISSING_REFRESH_TOKEN,
};
