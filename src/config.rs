//! Credentials file loading and command-line option validation.
//!
//! Credentials live in ~/.config/tracker2gcal/credentials.toml:
//!
//! ```toml
//! [tracker]
//! api_token = "..."        # or: username = "...", password = "..."
//!
//! [calendar]
//! access_token = "..."
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Tracker API root used when -b/--tracker-base-api-url is not given
pub const DEFAULT_TRACKER_BASE_API_URL: &str = "https://www.pivotaltracker.com/services/v3/";

const CALENDAR_ID_SUFFIX: &str = "@group.calendar.google.com";

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub tracker: TrackerCredentials,
    pub calendar: CalendarCredentials,
}

#[derive(Debug, Default, Deserialize)]
pub struct TrackerCredentials {
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// How to authenticate against the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerAuth {
    Token(String),
    Password { username: String, password: String },
}

#[derive(Debug, Deserialize)]
pub struct CalendarCredentials {
    pub access_token: String,
}

impl TrackerCredentials {
    pub fn auth(&self) -> Result<TrackerAuth> {
        if let Some(token) = non_empty(&self.api_token) {
            return Ok(TrackerAuth::Token(token.to_string()));
        }

        match (non_empty(&self.username), non_empty(&self.password)) {
            (Some(username), Some(password)) => Ok(TrackerAuth::Password {
                username: username.to_string(),
                password: password.to_string(),
            }),
            _ => anyhow::bail!(
                "[tracker] needs either api_token, or both username and password"
            ),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Get the config directory path (~/.config/tracker2gcal)
pub fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .context("Could not determine config directory")?
        .join("tracker2gcal"))
}

/// Get the default credentials file path (~/.config/tracker2gcal/credentials.toml)
pub fn default_credentials_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("credentials.toml"))
}

pub fn load_credentials(path: &Path) -> Result<Credentials> {
    if !path.exists() {
        anyhow::bail!(
            "Credentials file not found at {}\n\n\
            Create it with:\n\n\
            [tracker]\n\
            api_token = \"your-tracker-api-token\"\n\n\
            [calendar]\n\
            access_token = \"your-google-oauth-access-token\"",
            path.display()
        );
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read credentials file at {}", path.display()))?;

    let credentials: Credentials = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse credentials file at {}", path.display()))?;

    credentials
        .tracker
        .auth()
        .with_context(|| format!("Invalid credentials in {}", path.display()))?;

    if credentials.calendar.access_token.trim().is_empty() {
        anyhow::bail!(
            "[calendar] access_token is empty in {}",
            path.display()
        );
    }

    Ok(credentials)
}

/// Validated command-line options for a sync run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub tracker_id: u64,
    pub calendar_id: String,
    pub tracker_base_api_url: Url,
}

impl SyncOptions {
    /// Check every option, reporting all problems at once.
    pub fn validate(tracker_id: u64, calendar_id: &str, tracker_base_api_url: &str) -> Result<Self> {
        let mut errors = Vec::new();

        let base_url = match parse_base_url(tracker_base_api_url) {
            Some(url) => Some(url),
            None => {
                errors.push(
                    "-b/--tracker-base-api-url does not look like a valid URL \
                     (expected http(s)://host/.../ with a trailing slash)"
                        .to_string(),
                );
                None
            }
        };

        if !calendar_id.ends_with(CALENDAR_ID_SUFFIX) || calendar_id.len() == CALENDAR_ID_SUFFIX.len() {
            errors.push(format!("{} does not look like a valid calendar ID.", calendar_id));
        }

        match base_url {
            Some(tracker_base_api_url) if errors.is_empty() => Ok(SyncOptions {
                tracker_id,
                calendar_id: calendar_id.to_string(),
                tracker_base_api_url,
            }),
            _ => anyhow::bail!(errors.join("\n")),
        }
    }
}

fn parse_base_url(text: &str) -> Option<Url> {
    let url = Url::parse(text).ok()?;

    let is_http = matches!(url.scheme(), "http" | "https");
    let has_host = url.host_str().is_some_and(|h| !h.is_empty());

    if is_http && has_host && url.path().ends_with('/') && text.ends_with('/') {
        Some(url)
    } else {
        None
    }
}
