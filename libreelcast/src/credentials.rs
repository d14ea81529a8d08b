//! Platform credentials
//!
//! Credentials are obtained elsewhere (OAuth consent, app dashboards) and
//! handed to Reelcast through a [`CredentialProvider`]. Each adapter receives
//! its own [`PlatformCredential`] and refreshes it in place.
//!
//! # Token file format
//!
//! ```json
//! {
//!   "access_token": "ya29...",
//!   "refresh_token": "1//0g...",
//!   "expiry": "2026-03-01T12:00:00Z"
//! }
//! ```
//!
//! `refresh_token` and `expiry` are optional.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::{PlatformError, Result};
use crate::types::PlatformId;

/// Access material for one platform account
#[derive(Debug)]
pub struct PlatformCredential {
    access_token: SecretString,
    refresh_token: Option<SecretString>,
    expiry: Option<DateTime<Utc>>,
}

impl PlatformCredential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: None,
            expiry: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(SecretString::from(refresh_token.into()));
        self
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_ref().map(|t| t.expose_secret())
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Whether the expiry hint says the token is no longer valid at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry.map(|e| e <= now).unwrap_or(false)
    }

    /// Replace the access token after a refresh
    ///
    /// Some platforms rotate the refresh token too; pass it when they do.
    pub fn apply_refresh(
        &mut self,
        access_token: String,
        refresh_token: Option<String>,
        expiry: Option<DateTime<Utc>>,
    ) {
        self.access_token = SecretString::from(access_token);
        if let Some(refresh) = refresh_token {
            self.refresh_token = Some(SecretString::from(refresh));
        }
        self.expiry = expiry;
    }
}

/// Source of credentials for platform adapters
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Load a fresh credential for `platform`
    ///
    /// Every call returns a new value; adapters never share one.
    async fn credential(&self, platform: PlatformId) -> Result<PlatformCredential>;
}

#[derive(Deserialize)]
struct TokenFile {
    access_token: String,
    refresh_token: Option<String>,
    expiry: Option<DateTime<Utc>>,
}

/// Reads one JSON token file per platform
#[derive(Debug, Clone, Default)]
pub struct FileCredentialProvider {
    paths: HashMap<PlatformId, PathBuf>,
}

impl FileCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token_file(mut self, platform: PlatformId, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(platform, path.into());
        self
    }
}

#[async_trait]
impl CredentialProvider for FileCredentialProvider {
    async fn credential(&self, platform: PlatformId) -> Result<PlatformCredential> {
        let path = self.paths.get(&platform).ok_or_else(|| {
            PlatformError::NotConfigured(format!("no token file configured for {}", platform))
        })?;

        let expanded = shellexpand::tilde(&path.to_string_lossy()).to_string();
        debug!("Loading {} credentials from {}", platform, expanded);

        let content = tokio::fs::read_to_string(&expanded).await.map_err(|e| {
            PlatformError::Authentication(format!(
                "Failed to read {} token file {}: {}",
                platform, expanded, e
            ))
        })?;

        let token: TokenFile = serde_json::from_str(&content).map_err(|e| {
            PlatformError::Authentication(format!(
                "Invalid {} token file {}: {}",
                platform, expanded, e
            ))
        })?;

        if token.access_token.trim().is_empty() {
            return Err(PlatformError::Authentication(format!(
                "{} token file {} has an empty access_token",
                platform, expanded
            ))
            .into());
        }

        Ok(PlatformCredential {
            access_token: SecretString::from(token.access_token),
            refresh_token: token
                .refresh_token
                .filter(|t| !t.trim().is_empty())
                .map(SecretString::from),
            expiry: token.expiry,
        })
    }
}

/// Fixed tokens, mostly for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider {
    tokens: HashMap<PlatformId, (String, Option<String>)>,
}

impl StaticCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(
        mut self,
        platform: PlatformId,
        access_token: impl Into<String>,
        refresh_token: Option<&str>,
    ) -> Self {
        self.tokens.insert(
            platform,
            (access_token.into(), refresh_token.map(str::to_string)),
        );
        self
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn credential(&self, platform: PlatformId) -> Result<PlatformCredential> {
        let (access, refresh) = self.tokens.get(&platform).ok_or_else(|| {
            PlatformError::NotConfigured(format!("no credential registered for {}", platform))
        })?;

        let credential = PlatformCredential::new(access.clone());
        Ok(match refresh {
            Some(refresh) => credential.with_refresh_token(refresh.clone()),
            None => credential,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReelcastError;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_provider_reads_token_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("youtube.json");
        std::fs::write(
            &path,
            r#"{"access_token": "ya29.abc", "refresh_token": "1//refresh", "expiry": "2030-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let provider = FileCredentialProvider::new().with_token_file(PlatformId::YouTube, &path);
        let credential = provider.credential(PlatformId::YouTube).await.unwrap();

        assert_eq!(credential.access_token(), "ya29.abc");
        assert_eq!(credential.refresh_token(), Some("1//refresh"));
        assert_eq!(
            credential.expiry(),
            Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_file_provider_missing_refresh_token() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("instagram.json");
        std::fs::write(&path, r#"{"access_token": "IGQV", "refresh_token": ""}"#).unwrap();

        let provider = FileCredentialProvider::new().with_token_file(PlatformId::Instagram, &path);
        let credential = provider.credential(PlatformId::Instagram).await.unwrap();
        assert!(!credential.can_refresh());
        assert!(credential.expiry().is_none());
    }

    #[tokio::test]
    async fn test_file_provider_errors() {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileCredentialProvider::new()
            .with_token_file(PlatformId::YouTube, temp_dir.path().join("missing.json"));

        let err = provider.credential(PlatformId::YouTube).await.unwrap_err();
        assert!(matches!(
            err,
            ReelcastError::Platform(PlatformError::Authentication(_))
        ));
        assert_eq!(err.exit_code(), 2);

        let err = provider.credential(PlatformId::Instagram).await.unwrap_err();
        assert!(matches!(
            err,
            ReelcastError::Platform(PlatformError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_debug_output_redacts_tokens() {
        let credential = PlatformCredential::new("super-secret").with_refresh_token("also-secret");
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("also-secret"));
    }

    #[test]
    fn test_apply_refresh_keeps_refresh_token_unless_rotated() {
        let mut credential = PlatformCredential::new("old").with_refresh_token("refresh");
        credential.apply_refresh("new".to_string(), None, None);
        assert_eq!(credential.access_token(), "new");
        assert_eq!(credential.refresh_token(), Some("refresh"));

        credential.apply_refresh("newer".to_string(), Some("rotated".to_string()), None);
        assert_eq!(credential.refresh_token(), Some("rotated"));
    }

    #[test]
    fn test_expiry_hint() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let credential = PlatformCredential::new("t")
            .with_expiry(Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap());
        assert!(credential.is_expired_at(now));
        assert!(!PlatformCredential::new("t").is_expired_at(now));
    }

    #[tokio::test]
    async fn test_static_provider_returns_independent_values() {
        let provider =
            StaticCredentialProvider::new().with_token(PlatformId::YouTube, "token", Some("r"));
        let mut first = provider.credential(PlatformId::YouTube).await.unwrap();
        first.apply_refresh("changed".to_string(), None, None);

        let second = provider.credential(PlatformId::YouTube).await.unwrap();
        assert_eq!(second.access_token(), "token");
    }
}
