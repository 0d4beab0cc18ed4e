use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    /// Public base URL used to build magic links in registration mail.
    pub base_url: String,
    /// Mail API endpoint; if unset, login links and decision notifications
    /// are logged instead of sent.
    pub mail_endpoint: Option<String>,
    pub mail_api_key: Option<String>,
    pub mail_from: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = env::var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let base_url = env::var("BASE_URL")
            .context("BASE_URL environment variable is required")?;

        let mail_endpoint = env::var("MAIL_ENDPOINT")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let mail_api_key = if mail_endpoint.is_some() {
            Some(
                env::var("MAIL_API_KEY")
                    .context("MAIL_API_KEY is required when MAIL_ENDPOINT is set")?,
            )
        } else {
            None
        };

        let mail_from = env::var("MAIL_FROM")
            .unwrap_or_else(|_| "no-reply@localhost".to_string());

        Ok(Config {
            port,
            state_dir,
            base_url,
            mail_endpoint,
            mail_api_key,
            mail_from,
        })
    }
}
