//! Session preferences, review-request context and client configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Read-only flags describing the logged-in user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    pub authenticated: bool,
    pub read_only: bool,
    /// Whether new comments open an issue by default.
    pub comments_open_an_issue: bool,
    /// Whether new comments are written in Markdown by default.
    pub default_use_rich_text: bool,
    pub login_url: String,
}

/// The review request the dialog's comment belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewRequestContext {
    pub id: u64,
    /// An unpublished draft of the review request exists; commenting waits
    /// until it is published.
    pub has_draft: bool,
    pub review_url: String,
    /// Whether the user may change issue states on published comments.
    pub issues_interactive: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    pub issue_verification: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Origin of the review server, e.g. `https://reviews.example.com`.
    pub base_url: String,
    #[serde(default)]
    pub api_token: Option<String>,
}

impl ServerConfig {
    pub fn origin(&self) -> &str { self.base_url.trim_end_matches('/') }
}

/// Everything a dialog needs besides the comment itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub session: Session,
    #[serde(default)]
    pub review_request: ReviewRequestContext,
    #[serde(default)]
    pub features: Features,
}

impl DialogConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: DialogConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.base_url.trim().is_empty() {
            return Err(ConfigError::MissingBaseUrl);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_defaults() {
        let config = DialogConfig::from_json(
            r#"{"server": {"base_url": "https://rb.example.com/"}, "session": {"authenticated": true}}"#,
        )
        .unwrap();
        assert_eq!(config.server.origin(), "https://rb.example.com");
        assert!(config.session.authenticated);
        assert!(!config.session.default_use_rich_text);
        assert_eq!(config.review_request, ReviewRequestContext::default());
        assert!(!config.features.issue_verification);
    }

    #[test]
    fn rejects_blank_base_url() {
        let err = DialogConfig::from_json(r#"{"server": {"base_url": "  "}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingBaseUrl));
        assert!(matches!(DialogConfig::from_json("{"), Err(ConfigError::Parse(_))));
    }
}
