// crates/core/src/identity.rs
//! Instance identity: which process in which cluster owns a session.

use std::fmt;

/// Identity of one server instance, stored in the connection directory as
/// `"<instanceId>:<clusterId>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceId {
    pub instance_id: String,
    pub cluster_id: String,
}

const MAX_DERIVED_ID_LEN: usize = 20;
const HOST_PREFIXES: [&str; 4] = ["pod", "node", "host", "server"];

impl InstanceId {
    pub fn new(instance_id: impl Into<String>, cluster_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            cluster_id: cluster_id.into(),
        }
    }

    /// Derive an id from this machine's hostname and the listening port.
    pub fn from_hostname(port: u16, cluster_id: impl Into<String>) -> Self {
        let host = gethostname::gethostname().to_string_lossy().into_owned();
        Self::new(derive_instance_id(&host, port), cluster_id)
    }

    /// Parse a directory value. The cluster id is everything after the last
    /// `:`; instance ids produced by [`derive_instance_id`] never contain one.
    pub fn parse(value: &str) -> Option<Self> {
        let (instance, cluster) = value.rsplit_once(':')?;
        if instance.is_empty() || cluster.is_empty() {
            return None;
        }
        Some(Self::new(instance, cluster))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.instance_id, self.cluster_id)
    }
}

/// `pod-<simplified host>-<port>`, falling back to a hashed host when that
/// would be longer than 20 characters.
pub fn derive_instance_id(host: &str, port: u16) -> String {
    let candidate = format!("pod-{}-{}", simplify_host(host), port);
    if candidate.len() <= MAX_DERIVED_ID_LEN {
        return candidate;
    }
    format!("pod-{}-{}", crc32fast::hash(host.as_bytes()) % 1000, port)
}

fn simplify_host(host: &str) -> String {
    let short = host.split('.').next().unwrap_or(host).to_ascii_lowercase();

    let mut name = short.as_str();
    for prefix in HOST_PREFIXES {
        if let Some(rest) = name.strip_prefix(prefix) {
            name = rest.strip_prefix('-').unwrap_or(rest);
            break;
        }
    }

    // "web-03" -> "web03"
    let mut simplified = name.to_string();
    let digits = simplified.bytes().rev().take_while(u8::is_ascii_digit).count();
    if digits > 0 && digits < simplified.len() {
        let dash = simplified.len() - digits - 1;
        if simplified.as_bytes()[dash] == b'-' {
            simplified.remove(dash);
        }
    }

    let simplified: String = simplified
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();

    if simplified.is_empty() {
        format!("h{}", crc32fast::hash(host.as_bytes()) % 100)
    } else {
        simplified
    }
}
