//! Command implementations sequencing the credential manager
//!
//! Each command returns `anyhow::Result`; a failure maps to a non-zero exit.
//! Command output goes to stdout, diagnostics go through tracing (stderr).

use anyhow::{Context, Result, bail};
use beds24_auth::{CredentialManager, Expiring};
use common::Secret;
use tracing::{info, warn};

/// Characters of the access token shown in `run` output
const TOKEN_PREVIEW_LEN: usize = 15;

/// Pick an invite code: explicit argument, then configured code, then the
/// stored invite record if it is still valid.
pub async fn resolve_invite_code(
    explicit: Option<Secret<String>>,
    configured: Option<&Secret<String>>,
    manager: &CredentialManager,
) -> Option<Secret<String>> {
    if let Some(code) = explicit.filter(|c| !c.expose().trim().is_empty()) {
        return Some(code);
    }
    if let Some(code) = configured {
        return Some(code.clone());
    }
    match manager.invite_record().await {
        Some(invite) if invite.is_valid() => Some(invite.invite_code),
        Some(_) => {
            warn!("stored invite code has expired");
            None
        }
        None => None,
    }
}

/// Print the status projection as JSON.
pub async fn status(manager: &CredentialManager) -> Result<String> {
    let status = manager.status().await;
    serde_json::to_string_pretty(&status).context("serializing credential status")
}

/// Exchange an invite code, optionally with a custom refresh window.
pub async fn setup(
    manager: &CredentialManager,
    invite_code: Option<Secret<String>>,
    refresh_validity: chrono::TimeDelta,
) -> Result<()> {
    let Some(code) = invite_code else {
        bail!(
            "no invite code available: pass --code, set BEDS24_INVITE_CODE, configure invite_code_file, or store a valid invite record"
        );
    };
    manager
        .setup_with_validity(code.expose(), refresh_validity)
        .await
        .context("invite code exchange failed")
}

/// Current usable access token.
pub async fn token(manager: &CredentialManager) -> Result<String> {
    match manager.get_valid_token().await {
        Some(token) => Ok(token),
        None => bail!("no valid access token available; run `beds24-token setup` with a new invite code"),
    }
}

/// Validate `token`, or the current access token when none is given.
pub async fn validate(manager: &CredentialManager, token: Option<String>) -> Result<bool> {
    let token = match token {
        Some(token) => token,
        None => self::token(manager).await?,
    };
    Ok(manager.validate_token(&token).await)
}

/// Full sequence: check status, set up if needed, obtain and validate a token.
///
/// Returns the preview line printed for the obtained token.
pub async fn run(
    manager: &CredentialManager,
    configured_code: Option<&Secret<String>>,
    refresh_validity: chrono::TimeDelta,
) -> Result<String> {
    let status = manager.status().await;
    info!(
        access_valid = status.auth_token.valid,
        refresh_valid = status.refresh_token.valid,
        invite_valid = status.invite_code.valid,
        "credential status"
    );

    if status.needs_setup() {
        match resolve_invite_code(None, configured_code, manager).await {
            Some(code) => {
                info!("no usable token, starting setup with invite code");
                if let Err(e) = setup(manager, Some(code), refresh_validity).await {
                    warn!(error = %e, "setup with invite code failed");
                }
            }
            None => warn!("no usable token and no invite code available"),
        }
    }

    let token = Secret::new(self::token(manager).await?);
    if !manager.validate_token(token.expose()).await {
        bail!("access token obtained but failed validation");
    }
    info!("token validation successful");
    Ok(format!("valid token: {}", token.preview(TOKEN_PREVIEW_LEN)))
}
