//! Streaming transport for image lists and images
//!
//! HTTP(S) goes through a shared `ureq` agent configured from `[http]`.
//! `file://` URIs and bare paths are read straight from disk, which is
//! how local mirrors are consumed.

use crate::config::schema::HttpConfig;
use crate::error::{ImgsyncError, ImgsyncResult};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Streaming body returned by a transport
pub type Body = Box<dyn Read + Send>;

/// Fetches remote resources as byte streams.
///
/// Implementations never retry; failures surface as
/// `ImgsyncError::Transport` carrying status and reason.
pub trait Transport: Send + Sync {
    /// Open `uri` for reading, sending `token` as bearer credentials if given
    fn open(&self, uri: &str, token: Option<&str>) -> ImgsyncResult<Body>;
}

/// Scheme of a resource location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    File,
}

impl Scheme {
    /// Classify a URI; anything without an http(s) scheme is a local path
    pub fn of(uri: &str) -> Self {
        let lower = uri.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Http
        } else {
            Self::File
        }
    }
}

/// Default transport: `ureq` for HTTP(S), the filesystem otherwise
pub struct DefaultTransport {
    agent: ureq::Agent,
    user_agent: String,
}

impl DefaultTransport {
    pub fn new(config: &HttpConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(config.timeout())
            .timeout_connect(Some(config.connect_timeout()))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            user_agent: config.user_agent.clone(),
        }
    }

    fn open_http(&self, uri: &str, token: Option<&str>) -> ImgsyncResult<Body> {
        debug!(uri, "GET");

        let mut request = self.agent.get(uri).header("User-Agent", self.user_agent.as_str());
        if let Some(token) = token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.call().map_err(|e| ImgsyncError::Transport {
            uri: uri.to_string(),
            status: None,
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImgsyncError::Transport {
                uri: uri.to_string(),
                status: Some(status.as_u16()),
                reason: status.canonical_reason().unwrap_or("unknown status").to_string(),
            });
        }

        Ok(Box::new(response.into_body().into_reader()))
    }
}

/// Open a local file addressed by a `file://` URI or a bare path
pub fn open_local(uri: &str) -> ImgsyncResult<Body> {
    let path = uri.strip_prefix("file://").unwrap_or(uri);
    debug!(path, "Opening local resource");

    let file = File::open(Path::new(path)).map_err(|e| ImgsyncError::Transport {
        uri: uri.to_string(),
        status: None,
        reason: e.to_string(),
    })?;
    Ok(Box::new(file))
}

impl Transport for DefaultTransport {
    fn open(&self, uri: &str, token: Option<&str>) -> ImgsyncResult<Body> {
        match Scheme::of(uri) {
            Scheme::Http => self.open_http(uri, token),
            Scheme::File => open_local(uri),
        }
    }
}
