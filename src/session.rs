use chrono::{DateTime, Utc};
use core::error::Error;
use fantoccini::{Client, cookies::Cookie, error::CmdError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
}

impl From<&Cookie<'_>> for StoredCookie {
    fn from(cookie: &Cookie<'_>) -> Self {
        Self {
            name: cookie.name().to_string(),
            value: cookie.value().to_string(),
            domain: cookie.domain().map(str::to_string),
            path: cookie.path().map(str::to_string),
            secure: cookie.secure(),
            http_only: cookie.http_only(),
        }
    }
}

impl StoredCookie {
    pub fn to_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::new(self.name.clone(), self.value.clone());
        if let Some(domain) = &self.domain {
            cookie.set_domain(domain.clone());
        }
        if let Some(path) = &self.path {
            cookie.set_path(path.clone());
        }
        cookie.set_secure(self.secure);
        cookie.set_http_only(self.http_only);
        cookie
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cookies: Vec<StoredCookie>,
}

impl SessionState {
    /// `Ok(None)` when nothing has been saved yet.
    pub fn load(path: &Path) -> Result<Option<Self>, Box<dyn Error + Send + Sync>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        let state = serde_json::from_str(&raw)?;
        Ok(Some(state))
    }

    pub fn save(&self, path: &Path) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    #[instrument(skip(client))]
    pub async fn capture(client: &Client) -> Result<Self, CmdError> {
        let cookies = client
            .get_all_cookies()
            .await?
            .iter()
            .map(StoredCookie::from)
            .collect();
        Ok(Self {
            saved_at: Some(Utc::now()),
            cookies,
        })
    }

    /// Load `site_root`, plant the cookies, then reload so the page sees them.
    /// Cookies the browser refuses are skipped.
    #[instrument(skip(self, client), fields(cookies = self.cookies.len()))]
    pub async fn apply(&self, client: &Client, site_root: &str) -> Result<usize, CmdError> {
        client.goto(site_root).await?;
        let mut planted = 0;
        for stored in &self.cookies {
            match client.add_cookie(stored.to_cookie()).await {
                Ok(()) => planted += 1,
                Err(e) => debug!(name = %stored.name, error = %e, "cookie rejected"),
            }
        }
        client.refresh().await?;
        Ok(planted)
    }
}

/// Restore the saved session into `client` if there is one. Failures leave
/// the browser with a fresh session.
pub async fn restore_or_create_session(client: &Client, state_path: &Path, site_root: &str) {
    match SessionState::load(state_path) {
        Ok(Some(state)) => match state.apply(client, site_root).await {
            Ok(planted) => info!(planted, "Restored saved session from {}", state_path.display()),
            Err(e) => warn!(error = %e, "Could not restore saved session, starting fresh"),
        },
        Ok(None) => info!("No saved session at {}, starting fresh", state_path.display()),
        Err(e) => warn!(error = %e, "Unreadable session state at {}, starting fresh", state_path.display()),
    }
}

/// Capture the current cookie jar to `state_path`.
pub async fn persist_session(
    client: &Client,
    state_path: &Path,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let state = SessionState::capture(client).await?;
    state.save(state_path)?;
    info!(
        cookies = state.cookies.len(),
        "Session saved to {} for future runs",
        state_path.display()
    );
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    /// The restored session was already authenticated.
    AlreadyLoggedIn,
    /// A fresh sign-in succeeded and was persisted.
    LoggedIn,
    /// Sign-in could not be confirmed; the run continues unauthenticated.
    Unconfirmed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_state() -> SessionState {
        SessionState {
            saved_at: None,
            cookies: vec![
                StoredCookie {
                    name: "sessionid".into(),
                    value: "abc123".into(),
                    domain: Some("tradingview.com".into()),
                    path: Some("/".into()),
                    secure: Some(true),
                    http_only: Some(true),
                },
                StoredCookie {
                    name: "theme".into(),
                    value: "dark".into(),
                    domain: None,
                    path: None,
                    secure: None,
                    http_only: None,
                },
            ],
        }
    }

    #[test]
    fn test_load_missing_state_is_none() {
        let dir = tempdir().unwrap();
        assert_eq!(SessionState::load(&dir.path().join("auth_state.json")).unwrap(), None);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("auth_state.json");
        let state = sample_state();
        state.save(&path).unwrap();
        assert_eq!(SessionState::load(&path).unwrap(), Some(state));
    }

    #[test]
    fn test_load_corrupt_state_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("auth_state.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(SessionState::load(&path).is_err());
    }

    #[test]
    fn test_stored_cookie_to_cookie() {
        let state = sample_state();
        let stored = &state.cookies[0];
        let cookie = stored.to_cookie();
        assert_eq!(cookie.name(), "sessionid");
        assert_eq!(cookie.domain(), Some("tradingview.com"));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(StoredCookie::from(&cookie).name, "sessionid");
    }
}
