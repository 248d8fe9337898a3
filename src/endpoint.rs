//! Declarative endpoint descriptions and their conversion into requests.

use anyhow::Result;
use bytes::Bytes;
use log::debug;
use reqwest::Url;
use reqwest::header::{HeaderName, HeaderValue};
use std::fmt;
use std::str::FromStr;

use crate::config::NetworkConfig;
use crate::multipart::Attachment;

/// HTTP request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            _ => anyhow::bail!(
                "Unknown HTTP method: {}. Expected GET, POST, PUT, PATCH, DELETE or HEAD.",
                s
            ),
        }
    }
}

/// A declarative description of one HTTP call.
///
/// Everything is read-only; the service never modifies an endpoint.
pub trait Requestable: Send + Sync {
    fn path(&self) -> &str;

    /// When true, `path` is an absolute URL and the base URL is ignored.
    fn is_full_path(&self) -> bool {
        false
    }

    fn method(&self) -> HttpMethod;

    fn headers(&self) -> &[(String, String)];

    fn query_parameters(&self) -> &[(String, String)];

    /// Serialised as a JSON body when present.
    fn body_parameters(&self) -> Option<&serde_json::Value>;

    /// Multipart text fields, encoded in this order.
    fn form_fields(&self) -> &[(String, String)];

    /// Multipart binary parts, encoded in this order after the form fields.
    fn attachments(&self) -> &[(String, Attachment)];
}

/// The stock [`Requestable`], built with chained `with_*` calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Endpoint {
    pub path: String,
    pub is_full_path: bool,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub query_parameters: Vec<(String, String)>,
    pub body_parameters: Option<serde_json::Value>,
    pub form_fields: Vec<(String, String)>,
    pub attachments: Vec<(String, Attachment)>,
}

impl Endpoint {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            ..Default::default()
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn full_path(mut self) -> Self {
        self.is_full_path = true;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_parameters.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body_parameters = Some(body);
        self
    }

    pub fn with_form_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form_fields.push((name.into(), value.into()));
        self
    }

    pub fn with_attachment(mut self, field_name: impl Into<String>, attachment: Attachment) -> Self {
        self.attachments.push((field_name.into(), attachment));
        self
    }
}

impl Requestable for Endpoint {
    fn path(&self) -> &str {
        &self.path
    }

    fn is_full_path(&self) -> bool {
        self.is_full_path
    }

    fn method(&self) -> HttpMethod {
        self.method
    }

    fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    fn query_parameters(&self) -> &[(String, String)] {
        &self.query_parameters
    }

    fn body_parameters(&self) -> Option<&serde_json::Value> {
        self.body_parameters.as_ref()
    }

    fn form_fields(&self) -> &[(String, String)] {
        &self.form_fields
    }

    fn attachments(&self) -> &[(String, Attachment)] {
        &self.attachments
    }
}

/// A fully materialised request, ready for a session manager.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl Request {
    pub fn new(method: HttpMethod, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets a header, replacing any existing value of the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }
}

/// The endpoint could not be turned into a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlGenerationError(pub String);

impl fmt::Display for UrlGenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to build request: {}", self.0)
    }
}

impl std::error::Error for UrlGenerationError {}

/// Materialises endpoints into requests.
pub trait RequestBuilder: Send + Sync {
    fn build(
        &self,
        endpoint: &dyn Requestable,
        config: &NetworkConfig,
    ) -> Result<Request, UrlGenerationError>;
}

/// Joins the endpoint path onto the base URL, merges headers and query
/// parameters from the config, and encodes body parameters as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRequestBuilder;

impl DefaultRequestBuilder {
    fn url(endpoint: &dyn Requestable, config: &NetworkConfig) -> Result<Url, UrlGenerationError> {
        let mut url = if endpoint.is_full_path() {
            Url::parse(endpoint.path()).map_err(|e| {
                UrlGenerationError(format!("invalid URL '{}': {}", endpoint.path(), e))
            })?
        } else {
            let mut base = config.base_url.clone();
            base.set_query(None);
            base.set_fragment(None);
            if !base.path().ends_with('/') {
                let path = format!("{}/", base.path());
                base.set_path(&path);
            }
            // "./" keeps a path like "v1:batch" from parsing as a scheme.
            let relative = format!("./{}", endpoint.path().trim_start_matches('/'));
            base.join(&relative).map_err(|e| {
                UrlGenerationError(format!("invalid URL '{}{}': {}", base, relative, e))
            })?
        };

        let query: Vec<_> = endpoint
            .query_parameters()
            .iter()
            .chain(config.query_parameters.iter())
            .collect();
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }

        Ok(url)
    }
}

impl RequestBuilder for DefaultRequestBuilder {
    #[tracing::instrument(skip(self, endpoint, config))]
    fn build(
        &self,
        endpoint: &dyn Requestable,
        config: &NetworkConfig,
    ) -> Result<Request, UrlGenerationError> {
        let url = Self::url(endpoint, config)?;
        let mut request = Request::new(endpoint.method(), url);

        for (name, value) in config.headers.iter().chain(endpoint.headers()) {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| UrlGenerationError(format!("invalid header name '{}': {}", name, e)))?;
            HeaderValue::from_str(value).map_err(|e| {
                UrlGenerationError(format!("invalid value for header '{}': {}", name, e))
            })?;
            request.set_header(name.clone(), value.clone());
        }

        if let Some(body) = endpoint.body_parameters() {
            let encoded = serde_json::to_vec(body)
                .map_err(|e| UrlGenerationError(format!("invalid body parameters: {}", e)))?;
            if request.header("Content-Type").is_none() {
                request.set_header("Content-Type", "application/json");
            }
            request.body = Some(Bytes::from(encoded));
        }

        debug!("Built {} {}", request.method, request.url);
        Ok(request)
    }
}
