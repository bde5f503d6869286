//! The operator's token record and the partial update applied after refresh.
//!
//! All instants are Unix epoch milliseconds, matching the persisted
//! `tokens.json` layout `{access_token, refresh_token, expires_at}`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Proactive refresh buffer: tokens expiring within this window are refreshed
/// before use.
pub const REFRESH_BUFFER_MS: i64 = 60 * 1000;

/// Current instant in Unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Absolute expiry for a lifetime of `expires_in_secs` starting now.
/// Saturates instead of overflowing.
fn expiry_from_now(expires_in_secs: i64) -> i64 {
    now_millis().saturating_add(expires_in_secs.saturating_mul(1000))
}

/// The singleton OAuth token record for the connected X account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenRecord {
    /// Short-lived bearer credential.
    pub access_token: String,

    /// Long-lived refresh credential. `None` when the provider never issued
    /// one (e.g. `offline.access` was not granted).
    #[serde(default, deserialize_with = "empty_as_none")]
    pub refresh_token: Option<String>,

    /// Absolute expiry of `access_token`, Unix milliseconds.
    pub expires_at: i64,
}

/// Older stores wrote `""` for a missing refresh token.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

impl TokenRecord {
    /// Build a record whose expiry is `expires_in_secs` from now.
    pub fn new(access_token: String, refresh_token: Option<String>, expires_in_secs: i64) -> Self {
        Self {
            access_token,
            refresh_token: refresh_token.filter(|r| !r.is_empty()),
            expires_at: expiry_from_now(expires_in_secs),
        }
    }

    /// True once `expires_at` has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= now_millis()
    }

    /// True when the token expires within [`REFRESH_BUFFER_MS`] and must be
    /// refreshed before it is used.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.expires_at <= now_millis() + REFRESH_BUFFER_MS
    }

    /// Time left until expiry, `Duration::ZERO` once expired.
    pub fn time_until_expiry(&self) -> Duration {
        let remaining = self.expires_at - now_millis();
        if remaining > 0 {
            Duration::from_millis(remaining as u64)
        } else {
            Duration::ZERO
        }
    }

    /// Merge a partial update into this record.
    ///
    /// A supplied `expires_in` recomputes `expires_at` from now and takes
    /// precedence over an explicit `expires_at`. An absent `refresh_token`
    /// keeps the current one.
    pub fn merged(mut self, update: TokenUpdate) -> Self {
        if let Some(access_token) = update.access_token {
            self.access_token = access_token;
        }
        if let Some(refresh_token) = update.refresh_token.filter(|r| !r.is_empty()) {
            self.refresh_token = Some(refresh_token);
        }
        if let Some(expires_at) = update.expires_at {
            self.expires_at = expires_at;
        }
        if let Some(expires_in) = update.expires_in {
            self.expires_at = expiry_from_now(expires_in);
        }
        self
    }
}

/// Partial token update, e.g. from a refresh-token grant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUpdate {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// New lifetime in seconds from now.
    pub expires_in: Option<i64>,
    /// Explicit absolute expiry, Unix milliseconds.
    pub expires_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(expires_at: i64) -> TokenRecord {
        TokenRecord {
            access_token: "access".into(),
            refresh_token: Some("R1".into()),
            expires_at,
        }
    }

    #[test]
    fn test_new_computes_expiry_in_millis() {
        let before = now_millis();
        let token = TokenRecord::new("A".into(), Some("R".into()), 3600);
        let after = now_millis();
        assert!(token.expires_at >= before + 3_600_000);
        assert!(token.expires_at <= after + 3_600_000);
        assert!(!token.is_expired());
        assert!(!token.needs_refresh());
    }

    #[test]
    fn test_new_drops_empty_refresh_token() {
        let token = TokenRecord::new("A".into(), Some(String::new()), 3600);
        assert!(token.refresh_token.is_none());
    }

    #[test]
    fn test_needs_refresh_inside_buffer() {
        assert!(record(now_millis() + 30_000).needs_refresh());
        assert!(!record(now_millis() + 120_000).needs_refresh());
        assert!(record(0).needs_refresh());
    }

    #[test]
    fn test_is_expired() {
        assert!(record(now_millis() - 1).is_expired());
        assert!(!record(now_millis() + 30_000).is_expired());
    }

    #[test]
    fn test_time_until_expiry() {
        let remaining = record(now_millis() + 3_600_000).time_until_expiry();
        assert!(remaining.as_secs() >= 3595);
        assert!(remaining.as_secs() <= 3600);
        assert_eq!(record(0).time_until_expiry(), Duration::ZERO);
    }

    #[test]
    fn test_merge_preserves_refresh_token_and_recomputes_expiry() {
        let merged = record(0).merged(TokenUpdate {
            access_token: Some("A2".into()),
            refresh_token: None,
            expires_in: Some(3600),
            expires_at: None,
        });
        assert_eq!(merged.access_token, "A2");
        assert_eq!(merged.refresh_token.as_deref(), Some("R1"));
        let delta = merged.expires_at - now_millis();
        assert!((3_590_000..=3_600_000).contains(&delta), "delta = {delta}");
    }

    #[test]
    fn test_extreme_lifetimes_saturate() {
        assert_eq!(TokenRecord::new("A".into(), None, i64::MAX).expires_at, i64::MAX);
        assert!(TokenRecord::new("A".into(), None, i64::MIN).is_expired());

        let merged = record(0).merged(TokenUpdate {
            expires_in: Some(i64::MAX),
            ..Default::default()
        });
        assert_eq!(merged.expires_at, i64::MAX);
    }

    #[test]
    fn test_merge_rotates_refresh_token() {
        let merged = record(0).merged(TokenUpdate {
            refresh_token: Some("R2".into()),
            ..Default::default()
        });
        assert_eq!(merged.refresh_token.as_deref(), Some("R2"));
    }

    #[test]
    fn test_merge_without_lifetime_keeps_expiry() {
        let merged = record(42).merged(TokenUpdate {
            access_token: Some("A2".into()),
            ..Default::default()
        });
        assert_eq!(merged.expires_at, 42);
    }

    #[test]
    fn test_merge_explicit_expires_at() {
        let merged = record(42).merged(TokenUpdate {
            expires_at: Some(1_000),
            ..Default::default()
        });
        assert_eq!(merged.expires_at, 1_000);
    }

    #[test]
    fn test_serialization_layout() {
        let token = record(1_700_000_000_000);
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["access_token"], "access");
        assert_eq!(json["refresh_token"], "R1");
        assert_eq!(json["expires_at"], 1_700_000_000_000_i64);
    }

    #[test]
    fn test_deserialize_empty_refresh_token_as_none() {
        let token: TokenRecord = serde_json::from_str(
            r#"{"access_token":"A","refresh_token":"","expires_at":1}"#,
        )
        .unwrap();
        assert!(token.refresh_token.is_none());

        let token: TokenRecord =
            serde_json::from_str(r#"{"access_token":"A","expires_at":1}"#).unwrap();
        assert!(token.refresh_token.is_none());
    }
}
