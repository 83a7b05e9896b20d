use super::cookies;
use super::credentials::CredentialStore;
use super::refresh::TokenEndpoint;
use super::types::{
    redact, AuthConfig, BootstrapRecord, CredentialSource, Slot, StatusRecord, TokenPair,
    TokenResolution, BOOTSTRAP_HINT,
};
use crate::error::AuthError;

/// Outcome of a refresh attempt during credential resolution
#[derive(Debug)]
pub enum RefreshOutcome {
    /// The refresh endpoint issued a new access token
    Refreshed(TokenPair),
    /// The attempt failed; resolution continues with the next source
    Continue(AuthError),
}

/// Login result plus the raw cookie headers needed for diagnostics
struct LoginOutcome {
    pair: TokenPair,
    set_cookies: Vec<String>,
}

/// Token lifecycle manager.
///
/// Holds no token state between calls: every operation re-derives the active
/// credential from its `AuthConfig` and the credential store.
pub struct TokenManager<S> {
    store: S,
    endpoint: TokenEndpoint,
}

impl<S: CredentialStore> TokenManager<S> {
    pub fn new(store: S, endpoint: TokenEndpoint) -> Self {
        Self { store, endpoint }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Log in with the configured username/password
    pub async fn bootstrap_from_credentials(
        &self,
        config: &AuthConfig,
    ) -> Result<TokenPair, AuthError> {
        self.login(config).await.map(|outcome| outcome.pair)
    }

    async fn login(&self, config: &AuthConfig) -> Result<LoginOutcome, AuthError> {
        let credentials = config.login_credentials()?;
        let envelope = self.endpoint.login(config.base_url(), &credentials).await?;

        let access = envelope.field("access");
        if access.is_empty() {
            return Err(AuthError::LoginFailed {
                status: Some(envelope.status),
                message: "login succeeded but no access token returned".to_string(),
            });
        }

        let mut refresh = envelope.field("refresh");
        if refresh.is_empty() {
            refresh = cookies::extract_refresh_token(&envelope.set_cookies);
            if !refresh.is_empty() {
                tracing::debug!("Refresh token recovered from Set-Cookie headers");
            } else {
                tracing::warn!(
                    "Login returned no refresh token (cookies seen: {:?})",
                    cookies::cookie_names_seen(&envelope.set_cookies)
                );
            }
        }

        tracing::info!("Login succeeded (access token {})", redact(&access));
        Ok(LoginOutcome {
            pair: TokenPair { access, refresh },
            set_cookies: envelope.set_cookies,
        })
    }

    /// Exchange a refresh token for a new access token.
    /// Keeps the supplied refresh token when the server does not rotate it.
    pub async fn refresh_access(
        &self,
        base_url: &str,
        refresh_token: &str,
    ) -> Result<TokenPair, AuthError> {
        let envelope = self.endpoint.refresh(base_url, refresh_token).await?;

        let access = envelope.field("access");
        if access.is_empty() {
            return Err(AuthError::RefreshFailed {
                status: Some(envelope.status),
                message: "refresh succeeded but no access token returned".to_string(),
            });
        }

        let refresh = [
            envelope.field("refresh"),
            cookies::extract_refresh_token(&envelope.set_cookies),
        ]
        .into_iter()
        .find(|candidate| !candidate.is_empty())
        .unwrap_or_else(|| refresh_token.trim().to_string());

        Ok(TokenPair { access, refresh })
    }

    async fn attempt_refresh(&self, base_url: &str, refresh_token: &str) -> RefreshOutcome {
        match self.refresh_access(base_url, refresh_token).await {
            Ok(pair) => RefreshOutcome::Refreshed(pair),
            Err(e) => RefreshOutcome::Continue(e),
        }
    }

    /// Resolve a usable access token.
    ///
    /// Order: direct override, stored refresh token (refreshed remotely),
    /// stored access token, nothing. A failed refresh falls through to the
    /// stored access token. Only store writes and store misuse are errors.
    pub async fn get_access_token(
        &self,
        config: &AuthConfig,
    ) -> Result<TokenResolution, AuthError> {
        if let Some(token) = config.direct_token() {
            tracing::debug!("Using direct override access token");
            return Ok(TokenResolution::resolved(
                token.to_string(),
                CredentialSource::EnvDirect,
            ));
        }

        let scope = config.store_scope();
        let mut refresh_error = None;

        if let Some(refresh_token) = self.store.get(scope, Slot::RefreshToken)? {
            match self.attempt_refresh(config.base_url(), &refresh_token).await {
                RefreshOutcome::Refreshed(pair) => {
                    self.persist(scope, &pair)?;
                    tracing::info!("Access token refreshed from stored refresh token");
                    return Ok(TokenResolution::resolved(
                        pair.access,
                        CredentialSource::StoreRefresh,
                    ));
                }
                RefreshOutcome::Continue(e) => {
                    tracing::warn!(
                        error_kind = e.kind(),
                        "Refresh with stored token failed, falling back to stored access token: {}",
                        e
                    );
                    refresh_error = Some(e.to_string());
                }
            }
        }

        if let Some(access) = self.store.get(scope, Slot::AccessToken)? {
            tracing::debug!("Using stored access token (not validated)");
            return Ok(
                TokenResolution::resolved(access, CredentialSource::StoreAccess)
                    .with_refresh_error(refresh_error),
            );
        }

        tracing::warn!("No credential source available");
        Ok(TokenResolution::missing().with_refresh_error(refresh_error))
    }

    /// Log in and persist the resulting tokens
    pub async fn bootstrap_and_store(
        &self,
        config: &AuthConfig,
    ) -> Result<BootstrapRecord, AuthError> {
        let outcome = self.login(config).await?;
        let (stored_refresh, stored_access) = self.persist(config.store_scope(), &outcome.pair)?;

        tracing::info!(
            stored_refresh,
            stored_access,
            "Bootstrap complete, credentials stored in {}",
            self.store.describe()
        );

        Ok(BootstrapRecord {
            ok: true,
            status: "AUTH_OK",
            urls: config.urls(),
            stored_refresh,
            stored_access,
            set_cookie_count: outcome.set_cookies.len(),
            cookie_names: cookies::cookie_names_seen(&outcome.set_cookies),
        })
    }

    /// Report whether any credential source currently yields a token
    pub async fn auth_status(&self, config: &AuthConfig) -> StatusRecord {
        let urls = config.urls();

        match self.get_access_token(config).await {
            Ok(resolution) if resolution.is_resolved() => StatusRecord {
                ok: true,
                status: "AUTH_OK",
                urls,
                source: Some(resolution.source),
                reason: None,
                error: None,
                refresh_error: resolution.refresh_error,
                fix: None,
            },
            Ok(resolution) => StatusRecord {
                ok: false,
                status: "AUTH_FAILED",
                urls,
                source: None,
                reason: Some(resolution.reason().to_string()),
                error: None,
                refresh_error: resolution.refresh_error,
                fix: Some(BOOTSTRAP_HINT),
            },
            Err(e) => {
                tracing::error!("Credential resolution failed: {}", e);
                StatusRecord {
                    ok: false,
                    status: e.to_record().status,
                    urls,
                    source: None,
                    reason: Some(e.kind().to_string()),
                    error: Some(e.to_string()),
                    refresh_error: None,
                    fix: Some(e.remediation()),
                }
            }
        }
    }

    /// Write refresh (only when non-empty) then access; returns what was stored
    fn persist(&self, scope: &str, pair: &TokenPair) -> Result<(bool, bool), AuthError> {
        let stored_refresh = !pair.refresh.is_empty();
        if stored_refresh {
            self.write(scope, Slot::RefreshToken, &pair.refresh)?;
        }

        let stored_access = !pair.access.is_empty();
        if stored_access {
            self.write(scope, Slot::AccessToken, &pair.access)?;
        }

        Ok((stored_refresh, stored_access))
    }

    fn write(&self, scope: &str, slot: Slot, value: &str) -> Result<(), AuthError> {
        self.store.set(scope, slot, value).map_err(|source| {
            tracing::error!("Failed to persist {}: {}", slot, source);
            AuthError::StoreWriteFailed { slot, source }
        })
    }
}
