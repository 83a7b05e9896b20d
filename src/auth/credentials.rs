// Credential store adapter
// Scoped key/value secret storage: platform keychain, owner-only file, or memory

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::types::Slot;
use crate::error::StoreError;

/// Scoped secret store with two logical slots per scope.
///
/// `get` reports "absent" for anything it cannot read; only misuse is an error.
/// `set` is an upsert and every failure is surfaced.
pub trait CredentialStore: Send + Sync {
    fn get(&self, scope: &str, slot: Slot) -> Result<Option<String>, StoreError>;

    fn set(&self, scope: &str, slot: Slot, value: &str) -> Result<(), StoreError>;

    /// Human-readable backend description for logs
    fn describe(&self) -> String;
}

impl<S: CredentialStore + ?Sized> CredentialStore for Box<S> {
    fn get(&self, scope: &str, slot: Slot) -> Result<Option<String>, StoreError> {
        (**self).get(scope, slot)
    }

    fn set(&self, scope: &str, slot: Slot, value: &str) -> Result<(), StoreError> {
        (**self).set(scope, slot, value)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

fn check_scope(scope: &str) -> Result<&str, StoreError> {
    let scope = scope.trim();
    if scope.is_empty() {
        return Err(StoreError::InvalidScope);
    }
    Ok(scope)
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

// ============================================================================
// Platform keychain
// ============================================================================

/// Platform keychain store: service = scope, account = slot name
#[cfg(feature = "keyring-storage")]
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringStore;

#[cfg(feature = "keyring-storage")]
impl KeyringStore {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "keyring-storage")]
impl CredentialStore for KeyringStore {
    fn get(&self, scope: &str, slot: Slot) -> Result<Option<String>, StoreError> {
        let scope = check_scope(scope)?;

        let entry = match keyring::Entry::new(scope, slot.as_str()) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(
                    "Failed to open keyring entry (service='{}', account='{}'): {}",
                    scope,
                    slot,
                    e
                );
                return Ok(None);
            }
        };

        match entry.get_password() {
            Ok(value) => Ok(non_blank(&value)),
            Err(keyring::Error::NoEntry) => {
                tracing::debug!("No {} in keyring for service '{}'", slot, scope);
                Ok(None)
            }
            Err(e) => {
                tracing::warn!("Failed to read {} from keyring: {}", slot, e);
                Ok(None)
            }
        }
    }

    fn set(&self, scope: &str, slot: Slot, value: &str) -> Result<(), StoreError> {
        let scope = check_scope(scope)?;

        let entry = keyring::Entry::new(scope, slot.as_str())
            .map_err(|e| StoreError::Backend(format!("failed to open keyring entry: {}", e)))?;
        entry
            .set_password(value)
            .map_err(|e| StoreError::Backend(format!("failed to write keyring entry: {}", e)))?;

        tracing::debug!("Stored {} in keyring for service '{}'", slot, scope);
        Ok(())
    }

    fn describe(&self) -> String {
        #[cfg(target_os = "macos")]
        {
            "macOS Keychain".to_string()
        }
        #[cfg(target_os = "windows")]
        {
            "Windows Credential Manager".to_string()
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            "Secret Service keyring".to_string()
        }
    }
}

// ============================================================================
// File-based storage
// ============================================================================

/// On-disk layout: `{scope: {slot: value}}`
type CredentialDocument = BTreeMap<String, BTreeMap<String, String>>;

/// JSON file store for hosts without a usable keychain
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/localline/credentials.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .map(|dir| dir.join("localline").join("credentials.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unreadable or malformed contents read as empty
    fn load(&self) -> CredentialDocument {
        if !self.path.exists() {
            return CredentialDocument::new();
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(
                    "Failed to read credentials file {}: {}",
                    self.path.display(),
                    e
                );
                return CredentialDocument::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(
                    "Ignoring malformed credentials file {}: {}",
                    self.path.display(),
                    e
                );
                CredentialDocument::new()
            }
        }
    }

    /// Write to a temp file in the same directory, then rename over the target.
    /// An interrupted write leaves the previous document intact.
    fn save(&self, doc: &CredentialDocument) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }

        let json = serde_json::to_string_pretty(doc)?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            temp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        temp.write_all(json.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| e.error)?;

        Ok(())
    }
}

impl CredentialStore for FileStore {
    fn get(&self, scope: &str, slot: Slot) -> Result<Option<String>, StoreError> {
        let scope = check_scope(scope)?;
        let doc = self.load();

        Ok(doc
            .get(scope)
            .and_then(|slots| slots.get(slot.as_str()))
            .and_then(|value| non_blank(value)))
    }

    fn set(&self, scope: &str, slot: Slot, value: &str) -> Result<(), StoreError> {
        let scope = check_scope(scope)?;

        let mut doc = self.load();
        doc.entry(scope.to_string())
            .or_default()
            .insert(slot.as_str().to_string(), value.to_string());
        self.save(&doc)?;

        tracing::debug!("Stored {} in {}", slot, self.path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("File-based storage: {}", self.path.display())
    }
}

// ============================================================================
// In-memory storage
// ============================================================================

/// Process-local store for tests and throwaway runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<(String, Slot), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style seed value
    pub fn with_entry(self, scope: &str, slot: Slot, value: &str) -> Self {
        self.lock()
            .insert((scope.to_string(), slot), value.to_string());
        self
    }

    /// Raw stored value, bypassing normalization
    pub fn peek(&self, scope: &str, slot: Slot) -> Option<String> {
        self.lock().get(&(scope.to_string(), slot)).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, Slot), String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, scope: &str, slot: Slot) -> Result<Option<String>, StoreError> {
        let scope = check_scope(scope)?;
        Ok(self
            .lock()
            .get(&(scope.to_string(), slot))
            .and_then(|value| non_blank(value)))
    }

    fn set(&self, scope: &str, slot: Slot, value: &str) -> Result<(), StoreError> {
        let scope = check_scope(scope)?;
        self.lock()
            .insert((scope.to_string(), slot), value.to_string());
        Ok(())
    }

    fn describe(&self) -> String {
        "In-memory storage".to_string()
    }
}
