//! Beds24 API v2 credential lifecycle
//!
//! Exchanges a one-time invite code for a refresh token and an access token,
//! persists both, and renews the access token from the refresh token when it
//! expires. The crate has no dependency on the CLI binary and can be embedded
//! with any `Persistence` backend.
//!
//! Credential flow:
//! 1. `CredentialManager::load()` reads the invite, refresh and access records
//! 2. `CredentialManager::setup_with_invite_code()` calls `/authentication/setup`
//!    and stores the initial access + refresh tokens, deleting the invite
//! 3. `CredentialManager::get_valid_token()` returns the cached access token,
//!    or refreshes it once via `/authentication/token`
//! 4. Refreshed tokens are checked against `/authentication/details` before
//!    they replace the stored access token

pub mod client;
pub mod constants;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod record;
pub mod store;

pub use client::{HttpAuthClient, RefreshResponse, RemoteAuth, SetupResponse, TokenDetails};
pub use constants::*;
pub use error::{Error, Result};
pub use manager::{CredentialManager, CredentialStatus, RecordStatus};
pub use record::{AccessRecord, Expiring, InviteRecord, Record, RecordKind, RefreshRecord};
pub use store::{FileStore, MemoryStore, Persistence};
