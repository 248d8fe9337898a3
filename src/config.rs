//! Base URL and defaults shared by every request.

use anyhow::{Context, Result};
use reqwest::Url;

/// Settings shared by every request a service sends.
///
/// Built once and never mutated afterwards; the service only reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub base_url: Url,
    /// Sent with every request; endpoint headers of the same name win.
    pub headers: Vec<(String, String)>,
    /// Appended after the endpoint's own query parameters.
    pub query_parameters: Vec<(String, String)>,
}

impl NetworkConfig {
    /// Query pairs on `base_url` become default query parameters. Any
    /// fragment is dropped.
    pub fn new(mut base_url: Url) -> Self {
        let query_parameters = base_url.query_pairs().into_owned().collect();
        base_url.set_query(None);
        base_url.set_fragment(None);
        Self {
            base_url,
            headers: Vec::new(),
            query_parameters,
        }
    }

    /// Parses `base_url` and creates a config with no defaults.
    pub fn parse(base_url: &str) -> Result<Self> {
        let url = Url::parse(base_url)
            .with_context(|| format!("Invalid base URL: {}", base_url))?;
        Ok(Self::new(url))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_parameters.push((name.into(), value.into()));
        self
    }
}

/// Splits `KEY<sep>VALUE`, trimming whitespace around both halves.
pub fn parse_pair(input: &str, separator: char) -> Result<(String, String)> {
    let (key, value) = input
        .split_once(separator)
        .with_context(|| format!("Expected KEY{}VALUE, got '{}'", separator, input))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("Empty key in '{}'", input);
    }
    Ok((key.to_string(), value.trim().to_string()))
}
