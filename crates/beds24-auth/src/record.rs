//! Typed credential records
//!
//! Three record kinds live side by side in persistence, each replaced wholesale
//! when a new value is obtained. Field names on disk are `invite_code`,
//! `refresh_token`, `access_token`, `created` and `expiration`.
//!
//! Timestamps are absolute UTC instants. Naive values read from storage are
//! taken as UTC; values written always carry an explicit `+00:00` offset.
//! A missing or unparseable `expiration` does not make the record absent, it
//! makes the record permanently invalid.

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use common::Secret;
use serde::{Deserialize, Serialize};

/// Logical record names used as persistence keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Invite,
    Refresh,
    Access,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [RecordKind::Invite, RecordKind::Refresh, RecordKind::Access];

    /// Fixed logical key for this kind.
    pub fn key(&self) -> &'static str {
        match self {
            RecordKind::Invite => "invite_code",
            RecordKind::Refresh => "refresh_token",
            RecordKind::Access => "auth_token",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Anything carrying an absolute expiration instant.
pub trait Expiring {
    fn expiration(&self) -> Option<DateTime<Utc>>;

    /// Valid iff an expiration is known and `now` is strictly before it.
    fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration().is_some_and(|expiration| now < expiration)
    }

    fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

/// Single-use invite code provided out of band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteRecord {
    pub invite_code: Secret<String>,
    #[serde(
        default,
        with = "timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiration: Option<DateTime<Utc>>,
}

/// Long-lived token used only to mint access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRecord {
    pub refresh_token: Secret<String>,
    #[serde(
        default,
        with = "timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiration: Option<DateTime<Utc>>,
}

impl RefreshRecord {
    /// Record for a refresh token issued at `now`, valid for `validity`.
    pub fn issued(token: impl Into<Secret<String>>, now: DateTime<Utc>, validity: TimeDelta) -> Self {
        let now = stored_precision(now);
        Self {
            refresh_token: token.into(),
            created: Some(now),
            expiration: Some(saturating_add(now, validity)),
        }
    }
}

/// Short-lived token sent with API calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub access_token: Secret<String>,
    #[serde(
        default,
        with = "timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiration: Option<DateTime<Utc>>,
}

impl AccessRecord {
    /// Record for an access token issued at `now` that lives `expires_in_secs`.
    pub fn issued(token: impl Into<Secret<String>>, now: DateTime<Utc>, expires_in_secs: u64) -> Self {
        let lifetime = i64::try_from(expires_in_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        let now = stored_precision(now);
        Self {
            access_token: token.into(),
            created: Some(now),
            expiration: Some(saturating_add(now, lifetime)),
        }
    }
}

impl Expiring for InviteRecord {
    fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }
}

impl Expiring for RefreshRecord {
    fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }
}

impl Expiring for AccessRecord {
    fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }
}

/// A persisted record of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Invite(InviteRecord),
    Refresh(RefreshRecord),
    Access(AccessRecord),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Invite(_) => RecordKind::Invite,
            Record::Refresh(_) => RecordKind::Refresh,
            Record::Access(_) => RecordKind::Access,
        }
    }

    /// Serialize the inner record as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            Record::Invite(r) => serde_json::to_string_pretty(r),
            Record::Refresh(r) => serde_json::to_string_pretty(r),
            Record::Access(r) => serde_json::to_string_pretty(r),
        }
    }

    /// Decode JSON for the given kind. Empty objects and records without
    /// their token field are errors, which callers treat as absent.
    pub fn from_json(kind: RecordKind, json: &str) -> serde_json::Result<Self> {
        Ok(match kind {
            RecordKind::Invite => Record::Invite(serde_json::from_str(json)?),
            RecordKind::Refresh => Record::Refresh(serde_json::from_str(json)?),
            RecordKind::Access => Record::Access(serde_json::from_str(json)?),
        })
    }
}

/// Timestamps are written with microsecond precision; issuing at that
/// precision keeps a reloaded record equal to the one held in memory.
fn stored_precision(now: DateTime<Utc>) -> DateTime<Utc> {
    now.trunc_subsecs(6)
}

fn saturating_add(start: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    start
        .checked_add_signed(delta)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Lenient ISO-8601 codec for optional record timestamps.
pub mod timestamp {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
    use serde::de::IgnoredAny;
    use serde::{Deserialize, Deserializer, Serializer};
    use tracing::warn;

    const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z"];
    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];

    /// Parse an ISO-8601 datetime, interpreting naive values as UTC.
    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        for fmt in OFFSET_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
                return Some(dt.with_timezone(&Utc));
            }
        }
        for fmt in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
                return Some(naive.and_utc());
            }
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }

    /// RFC 3339 with microseconds and an explicit `+00:00` offset.
    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Micros, false)
    }

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_str(&format(dt)),
            None => serializer.serialize_none(),
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Other(IgnoredAny),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(match Option::<Raw>::deserialize(deserializer)? {
            None => None,
            Some(Raw::Text(text)) => {
                let parsed = parse(&text);
                if parsed.is_none() {
                    warn!(value = %text, "unparseable timestamp, treating credential as expired");
                }
                parsed
            }
            Some(Raw::Other(_)) => {
                warn!("non-string timestamp, treating credential as expired");
                None
            }
        })
    }
}
