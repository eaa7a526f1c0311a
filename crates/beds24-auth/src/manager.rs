//! Credential state machine
//!
//! The manager owns the invite, refresh and access records. They are loaded
//! once at construction, replaced wholesale on every successful change and
//! written back to persistence. Decision order for an access token:
//!
//! 1. Access record valid → return it, no network call
//! 2. Refresh record valid → one refresh round trip, then validate the result
//! 3. Otherwise → no token; a new invite code exchange is needed
//!
//! A tokio Mutex serializes the read-check-refresh-write sequence so concurrent
//! callers never issue duplicate refreshes against the same refresh token.
//!
//! Failed remote calls never touch in-memory state. Persistence failures are
//! logged and otherwise ignored: the in-memory record stays authoritative for
//! the lifetime of the manager.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::RemoteAuth;
use crate::constants::{DEFAULT_ACCESS_TOKEN_TTL_SECS, DEFAULT_REFRESH_VALIDITY_DAYS};
use crate::error::{Error, Result};
use crate::metrics;
use crate::record::{AccessRecord, Expiring, InviteRecord, Record, RecordKind, RefreshRecord};
use crate::store::Persistence;

/// Presence and validity of one record kind.
///
/// `expired` is `exists && !valid`; an absent record is neither valid nor expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordStatus {
    pub exists: bool,
    pub valid: bool,
    pub expired: bool,
}

impl RecordStatus {
    pub fn of<R: Expiring>(record: Option<&R>, now: DateTime<Utc>) -> Self {
        let exists = record.is_some();
        let valid = record.is_some_and(|r| r.is_valid_at(now));
        Self {
            exists,
            valid,
            expired: exists && !valid,
        }
    }
}

/// Snapshot of all three records, taken at a single instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CredentialStatus {
    pub auth_token: RecordStatus,
    pub refresh_token: RecordStatus,
    pub invite_code: RecordStatus,
}

impl CredentialStatus {
    /// Neither the access token nor the refresh token can be used.
    pub fn needs_setup(&self) -> bool {
        !self.auth_token.valid && !self.refresh_token.valid
    }

    /// A stored invite code is available for an exchange.
    pub fn can_setup(&self) -> bool {
        self.invite_code.valid
    }
}

#[derive(Debug, Default)]
struct CredentialState {
    invite: Option<InviteRecord>,
    refresh: Option<RefreshRecord>,
    access: Option<AccessRecord>,
}

impl CredentialState {
    fn status(&self, now: DateTime<Utc>) -> CredentialStatus {
        CredentialStatus {
            auth_token: RecordStatus::of(self.access.as_ref(), now),
            refresh_token: RecordStatus::of(self.refresh.as_ref(), now),
            invite_code: RecordStatus::of(self.invite.as_ref(), now),
        }
    }
}

/// Owns the credential records and the lifecycle operations over them.
pub struct CredentialManager {
    persistence: Arc<dyn Persistence>,
    remote: Arc<dyn RemoteAuth>,
    refresh_validity: TimeDelta,
    state: Mutex<CredentialState>,
}

impl CredentialManager {
    /// Load all records from `persistence`. Missing or corrupt entries start absent.
    pub async fn load(persistence: Arc<dyn Persistence>, remote: Arc<dyn RemoteAuth>) -> Self {
        let mut state = CredentialState::default();
        for kind in RecordKind::ALL {
            match persistence.load(kind).await {
                Some(Record::Invite(r)) => state.invite = Some(r),
                Some(Record::Refresh(r)) => state.refresh = Some(r),
                Some(Record::Access(r)) => state.access = Some(r),
                None => {}
            }
        }

        let status = state.status(Utc::now());
        info!(
            access_valid = status.auth_token.valid,
            refresh_valid = status.refresh_token.valid,
            invite_present = status.invite_code.exists,
            "credential manager loaded"
        );

        Self {
            persistence,
            remote,
            refresh_validity: TimeDelta::days(i64::from(DEFAULT_REFRESH_VALIDITY_DAYS)),
            state: Mutex::new(state),
        }
    }

    /// Validity window applied to refresh tokens obtained by `setup_with_invite_code`.
    pub fn with_refresh_validity(mut self, validity: TimeDelta) -> Self {
        self.refresh_validity = validity;
        self
    }

    pub fn refresh_validity(&self) -> TimeDelta {
        self.refresh_validity
    }

    /// Presence/validity projection of all records. No side effects.
    pub async fn status(&self) -> CredentialStatus {
        self.state.lock().await.status(Utc::now())
    }

    pub async fn access_record(&self) -> Option<AccessRecord> {
        self.state.lock().await.access.clone()
    }

    pub async fn refresh_record(&self) -> Option<RefreshRecord> {
        self.state.lock().await.refresh.clone()
    }

    pub async fn invite_record(&self) -> Option<InviteRecord> {
        self.state.lock().await.invite.clone()
    }

    /// Exchange an invite code using the manager's refresh validity window.
    pub async fn setup_with_invite_code(&self, invite_code: &str) -> Result<()> {
        self.setup_with_validity(invite_code, self.refresh_validity)
            .await
    }

    /// Exchange an invite code for a fresh access + refresh token pair.
    ///
    /// On success both records are persisted independently (a failed save of
    /// one does not undo the other), adopted in memory, and the invite record
    /// is deleted. On failure nothing changes.
    pub async fn setup_with_validity(
        &self,
        invite_code: &str,
        refresh_validity: TimeDelta,
    ) -> Result<()> {
        let invite_code = invite_code.trim();
        if invite_code.is_empty() {
            metrics::record_setup(Error::EmptyInviteCode.outcome());
            return Err(Error::EmptyInviteCode);
        }

        let mut state = self.state.lock().await;

        let response = match self.remote.setup(invite_code).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "setup failed");
                metrics::record_setup(e.outcome());
                return Err(e);
            }
        };

        let now = Utc::now();
        let expires_in = response.expires_in.unwrap_or(DEFAULT_ACCESS_TOKEN_TTL_SECS);
        let access = AccessRecord::issued(response.token, now, expires_in);
        let refresh = RefreshRecord::issued(response.refresh_token, now, refresh_validity);

        self.persist(Record::Access(access.clone())).await;
        self.persist(Record::Refresh(refresh.clone())).await;
        state.access = Some(access);
        state.refresh = Some(refresh);

        if let Err(e) = self.persistence.delete(RecordKind::Invite).await {
            warn!(error = %e, "failed to delete used invite code");
        }
        state.invite = None;

        info!(
            expires_in,
            refresh_validity_days = refresh_validity.num_days(),
            "setup completed"
        );
        metrics::record_setup(metrics::SUCCESS);
        Ok(())
    }

    /// Mint a new access token from the stored refresh token.
    ///
    /// Fails without a network call unless the refresh record is valid and
    /// carries a non-empty token.
    pub async fn refresh_auth_token(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state).await.map(|_| ())
    }

    /// Ask the server whether `token` is accepted. Any failure means "no".
    pub async fn validate_token(&self, token: &str) -> bool {
        match self.remote.details(token).await {
            Ok(details) => {
                debug!(valid = details.valid_token, "token details received");
                details.valid_token
            }
            Err(e) => {
                warn!(error = %e, "token validation request failed");
                false
            }
        }
    }

    /// A usable access token: the cached one, or one refresh attempt, or none.
    ///
    /// Performs at most one refresh round trip per call (plus its validation).
    pub async fn get_valid_token(&self) -> Option<String> {
        let mut state = self.state.lock().await;

        if let Some(access) = state.access.as_ref().filter(|a| a.is_valid()) {
            debug!("using cached access token");
            metrics::record_token_request("cached");
            return Some(access.access_token.expose().clone());
        }

        if state.refresh.as_ref().is_some_and(|r| r.is_valid()) {
            info!("access token expired, attempting refresh");
            if let Ok(token) = self.refresh_locked(&mut state).await {
                metrics::record_token_request("refreshed");
                return Some(token);
            }
        }

        warn!("no valid authentication method available");
        metrics::record_token_request("unavailable");
        None
    }

    /// Refresh under an already-held state lock and return the new token.
    ///
    /// The new token is checked against the details endpoint before it is
    /// persisted or adopted; a token that fails that check is discarded.
    async fn refresh_locked(&self, state: &mut CredentialState) -> Result<String> {
        let refresh_token = match state
            .refresh
            .as_ref()
            .filter(|r| r.is_valid() && !r.refresh_token.expose().is_empty())
        {
            Some(refresh) => refresh.refresh_token.clone(),
            None => {
                warn!("no valid refresh token available");
                metrics::record_refresh(Error::NoValidRefreshToken.outcome());
                return Err(Error::NoValidRefreshToken);
            }
        };

        let response = match self.remote.refresh(refresh_token.expose()).await {
            Ok(response) => response,
            Err(e @ Error::AuthRejected(_)) => {
                warn!(error = %e, "refresh token rejected - may be invalid, expired or revoked");
                metrics::record_refresh(e.outcome());
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                metrics::record_refresh(e.outcome());
                return Err(e);
            }
        };

        let expires_in = response.expires_in.unwrap_or(DEFAULT_ACCESS_TOKEN_TTL_SECS);
        let access = AccessRecord::issued(response.token, Utc::now(), expires_in);

        if !self.validate_token(access.access_token.expose()).await {
            warn!("refreshed access token failed validation, discarding");
            metrics::record_refresh(Error::ValidationFailed.outcome());
            return Err(Error::ValidationFailed);
        }

        let token = access.access_token.expose().clone();
        self.persist(Record::Access(access.clone())).await;
        state.access = Some(access);

        info!(expires_in, "token refresh completed");
        metrics::record_refresh(metrics::SUCCESS);
        Ok(token)
    }

    async fn persist(&self, record: Record) {
        let kind = record.kind();
        match self.persistence.save(&record).await {
            Ok(()) => debug!(%kind, "record saved"),
            Err(e) => warn!(%kind, error = %e, "failed to persist record"),
        }
    }
}
