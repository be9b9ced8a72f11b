// crates/edge/src/backend.rs
//! Backend instances behind the edge, parsed from `URI[=weight][@instance]`.

use std::fmt;
use std::str::FromStr;

use axum::http::Uri;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackendParseError {
    #[error("invalid backend URI `{0}`")]
    Uri(String),

    #[error("backend `{0}` must be http://host[:port] with no path")]
    NotHttp(String),

    #[error("invalid weight in backend `{0}`")]
    Weight(String),

    #[error("empty instance id in backend `{0}`")]
    EmptyInstance(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    /// `host:port` the proxy connects to.
    pub authority: String,
    /// Parsed and reported, never used for selection.
    pub weight: u32,
    /// Instance id this backend writes into the connection directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

impl Backend {
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            weight: 1,
            instance_id: None,
        }
    }

    pub fn with_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    /// Absolute URI on this backend for an incoming path and query.
    pub fn target(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self.authority, path_and_query)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}", self.authority)
    }
}

impl FromStr for Backend {
    type Err = BackendParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();

        let (rest, instance_id) = match raw.rsplit_once('@') {
            Some((rest, id)) if !id.contains(['/', ':']) => {
                if id.is_empty() {
                    return Err(BackendParseError::EmptyInstance(raw.to_string()));
                }
                (rest, Some(id.to_string()))
            }
            _ => (raw, None),
        };

        let (uri, weight) = match rest.rsplit_once('=') {
            Some((uri, weight)) => {
                let weight = weight
                    .parse::<u32>()
                    .map_err(|_| BackendParseError::Weight(raw.to_string()))?;
                (uri, weight)
            }
            None => (rest, 1),
        };

        let parsed: Uri = uri
            .parse()
            .map_err(|_| BackendParseError::Uri(raw.to_string()))?;
        let authority = match (parsed.scheme_str(), parsed.authority()) {
            (Some("http"), Some(authority)) if matches!(parsed.path(), "" | "/") => {
                authority.to_string()
            }
            _ => return Err(BackendParseError::NotHttp(raw.to_string())),
        };

        Ok(Self {
            authority,
            weight,
            instance_id,
        })
    }
}
