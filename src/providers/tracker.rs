//! Tracker API client.

use anyhow::{Context, Result};
use roxmltree::Document;
use tracing::debug;
use tracker_core::story::split_stories;
use tracker_core::{ReleaseSource, TrackerError, TrackerResult};
use url::Url;

use super::{http_error, status_error};
use crate::config::TrackerAuth;

const TOKEN_HEADER: &str = "X-TrackerToken";

pub struct TrackerClient {
    http: reqwest::Client,
    base_api_url: Url,
    project_id: u64,
    token: String,
}

impl TrackerClient {
    /// Build a client for one project, exchanging a username and password
    /// for an API token if needed.
    pub async fn connect(base_api_url: Url, project_id: u64, auth: &TrackerAuth) -> Result<Self> {
        let http = reqwest::Client::new();

        let token = match auth {
            TrackerAuth::Token(token) => token.clone(),
            TrackerAuth::Password { username, password } => {
                fetch_token(&http, &base_api_url, username, password).await?
            }
        };

        Ok(TrackerClient {
            http,
            base_api_url,
            project_id,
            token,
        })
    }

    fn release_stories_url(&self) -> TrackerResult<Url> {
        let mut url = self
            .base_api_url
            .join(&format!("projects/{}/stories", self.project_id))
            .map_err(|e| TrackerError::Http(e.to_string()))?;
        url.query_pairs_mut().append_pair("filter", "type:release");
        Ok(url)
    }
}

impl ReleaseSource for TrackerClient {
    async fn release_stories(&self) -> TrackerResult<Vec<String>> {
        let url = self.release_stories_url()?;
        debug!("fetching {}", url);

        let response = self
            .http
            .get(url)
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error("release stories", status));
        }

        let body = response.text().await.map_err(http_error)?;
        split_stories(&body)
    }
}

async fn fetch_token(
    http: &reqwest::Client,
    base_api_url: &Url,
    username: &str,
    password: &str,
) -> Result<String> {
    let url = base_api_url
        .join("tokens/active")
        .context("Failed to build tracker token URL")?;

    let response = http
        .get(url)
        .basic_auth(username, Some(password))
        .send()
        .await
        .context("Failed to request tracker token")?
        .error_for_status()
        .with_context(|| format!("Tracker rejected credentials for {}", username))?;

    let body = response
        .text()
        .await
        .context("Failed to read tracker token response")?;

    parse_token_guid(&body)
}

/// Pull the token out of a `<token><guid>...</guid></token>` response.
fn parse_token_guid(xml: &str) -> Result<String> {
    let doc = Document::parse(xml.trim()).context("Failed to parse tracker token response")?;

    doc.root_element()
        .descendants()
        .find(|n| n.tag_name().name() == "guid")
        .and_then(|n| n.text())
        .map(|guid| guid.trim().to_string())
        .filter(|guid| !guid.is_empty())
        .context("Tracker token response has no guid")
}
