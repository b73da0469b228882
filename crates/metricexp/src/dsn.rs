//! Connection string resolution.
//!
//! A DSN has the form `scheme://token@host[:port]/project_id`, e.g.
//! `https://secret@uptrace.dev/42`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DsnError {
    #[error("DSN is empty (set it in the config or via the UPTRACE_DSN env var)")]
    Empty,
    #[error("DSN can not be parsed: {0}")]
    Invalid(#[from] url::ParseError),
    #[error("DSN does not have a host")]
    NoHost,
    #[error("DSN does not have a project id")]
    NoProjectId,
    #[error("DSN does not have a token")]
    NoToken,
}

/// Resolved connection descriptor.
#[derive(Clone, PartialEq, Eq)]
pub struct Dsn {
    pub scheme: String,
    /// Host including the port, if any
    pub host: String,
    pub project_id: String,
    pub token: String,
}

impl Dsn {
    /// Resolves a connection string.
    pub fn parse(dsn: &str) -> Result<Self, DsnError> {
        let dsn = dsn.trim();
        if dsn.is_empty() {
            return Err(DsnError::Empty);
        }

        let url = Url::parse(dsn)?;

        let mut host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(DsnError::NoHost),
        };
        // The public site and the ingestion API live on different hosts.
        if host == "uptrace.dev" {
            host = "api.uptrace.dev".to_string();
        }
        if let Some(port) = url.port() {
            host = format!("{host}:{port}");
        }

        let project_id = url.path().trim_matches('/');
        if project_id.is_empty() {
            return Err(DsnError::NoProjectId);
        }

        let token = url.username();
        if token.is_empty() {
            return Err(DsnError::NoToken);
        }

        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            project_id: project_id.to_string(),
            token: token.to_string(),
        })
    }

    /// Metrics ingestion endpoint for this project.
    pub fn metrics_endpoint(&self) -> String {
        format!(
            "{}://{}/api/v1/projects/{}/metrics",
            self.scheme, self.host, self.project_id
        )
    }
}

impl FromStr for Dsn {
    type Err = DsnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// Keeps the token out of logs.
impl fmt::Debug for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dsn")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("project_id", &self.project_id)
            .field("token", &"<redacted>")
            .finish()
    }
}
