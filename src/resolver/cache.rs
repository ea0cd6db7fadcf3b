//! `cache.*` → persisted user session
//!
//! Keys: `upn`, `username`, `accessToken`. The session is an injected
//! [`SessionCache`]; an expired or missing token goes through the optional
//! [`TokenRefresher`]. Any backend failure leaves the key unresolved.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{NoxError, Result};
use crate::variable::{Namespace, Value};

use super::NamespaceResolver;

/// Fields of the persisted session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, alias = "userPrincipalName")]
    pub upn: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// A token with no expiry is taken as valid
    pub fn token_is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.access_token.as_ref().is_some_and(|t| !t.is_empty())
            && self.expires_at.map_or(true, |exp| exp > now)
    }
}

#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn load(&self) -> Result<SessionRecord>;
}

/// Fetches a new access token for the session's user
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, session: &SessionRecord) -> Result<String>;
}

/// JSON session file
#[derive(Debug, Clone)]
pub struct FileSessionCache {
    path: PathBuf,
}

impl FileSessionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SessionCache for FileSessionCache {
    async fn load(&self) -> Result<SessionRecord> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| NoxError::CacheError {
                reason: format!("{}: {}", self.path.display(), e),
            })?;
        serde_json::from_str(&text).map_err(|e| NoxError::CacheError {
            reason: format!("{}: {}", self.path.display(), e),
        })
    }
}

pub struct CacheResolver {
    cache: Arc<dyn SessionCache>,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl CacheResolver {
    pub fn new(cache: Arc<dyn SessionCache>) -> Self {
        Self {
            cache,
            refresher: None,
        }
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    async fn access_token(&self, session: &SessionRecord) -> Option<String> {
        if session.token_is_fresh(Utc::now()) {
            return session.access_token.clone();
        }
        let refresher = self.refresher.as_ref()?;
        match refresher.refresh(session).await {
            Ok(token) if !token.is_empty() => Some(token),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "access token refresh failed");
                None
            }
        }
    }
}

#[async_trait]
impl NamespaceResolver for CacheResolver {
    fn namespace(&self) -> Namespace {
        Namespace::Cache
    }

    async fn resolve(&self, pending: &[String]) -> FxHashMap<String, Value> {
        let mut found = FxHashMap::default();
        if pending.is_empty() {
            return found;
        }

        let session = match self.cache.load().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "session cache unavailable");
                return found;
            }
        };

        for key in pending {
            let value = match key.as_str() {
                "upn" => session.upn.clone(),
                "username" => session.username.clone(),
                "accesstoken" => self.access_token(&session).await,
                _ => None,
            };
            if let Some(v) = value {
                found.insert(key.clone(), Value::String(v));
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    struct Fixed(SessionRecord);

    #[async_trait]
    impl SessionCache for Fixed {
        async fn load(&self) -> Result<SessionRecord> {
            Ok(self.0.clone())
        }
    }

    struct Refresher;

    #[async_trait]
    impl TokenRefresher for Refresher {
        async fn refresh(&self, _: &SessionRecord) -> Result<String> {
            Ok("fresh-token".into())
        }
    }

    fn keys() -> Vec<String> {
        vec!["upn".into(), "username".into(), "accesstoken".into()]
    }

    #[tokio::test]
    async fn reads_session_fields() {
        let record = SessionRecord {
            username: Some("Ada".into()),
            upn: Some("ada@example.com".into()),
            access_token: Some("tok".into()),
            expires_at: None,
        };
        let found = CacheResolver::new(Arc::new(Fixed(record))).resolve(&keys()).await;
        assert_eq!(found["upn"], Value::from("ada@example.com"));
        assert_eq!(found["accesstoken"], Value::from("tok"));
    }

    #[tokio::test]
    async fn expired_token_is_refreshed() {
        let record = SessionRecord {
            access_token: Some("stale".into()),
            expires_at: Some(Utc::now() - Duration::minutes(5)),
            ..Default::default()
        };
        let resolver = CacheResolver::new(Arc::new(Fixed(record)));
        assert!(!resolver.resolve(&keys()).await.contains_key("accesstoken"));

        let resolver = resolver.with_refresher(Arc::new(Refresher));
        let found = resolver.resolve(&keys()).await;
        assert_eq!(found["accesstoken"], Value::from("fresh-token"));
    }

    #[tokio::test]
    async fn file_cache_reads_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, r#"{"username":"ada","userPrincipalName":"ada@corp"}"#).unwrap();

        let found = CacheResolver::new(Arc::new(FileSessionCache::new(&path)))
            .resolve(&keys())
            .await;
        assert_eq!(found["upn"], Value::from("ada@corp"));
        assert!(!found.contains_key("accesstoken"));
    }

    #[tokio::test]
    async fn missing_file_resolves_nothing() {
        let found = CacheResolver::new(Arc::new(FileSessionCache::new("/nope/cache.json")))
            .resolve(&keys())
            .await;
        assert!(found.is_empty());
    }
}
