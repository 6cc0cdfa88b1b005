//! Resource-manager endpoints and their transport schemes.

use std::fmt;

use url::Url;

use crate::error::{SchedError, SchedResult};

/// Endpoint schemes served by the PBS adaptor.
pub const PBS_SCHEMES: &[&str] = &["pbs", "pbs+ssh", "pbs+gsissh"];

/// How commands reach the resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportScheme {
    /// Run commands on the local host.
    Fork,
    /// Run commands over ssh.
    Ssh,
    /// Run commands over GSI-enabled ssh.
    Gsissh,
}

impl TransportScheme {
    /// Map a job endpoint scheme to the transport scheme.
    ///
    /// The table is fixed: `pbs` runs locally, `pbs+ssh` over ssh and
    /// `pbs+gsissh` over gsissh.
    pub fn from_job_scheme(scheme: &str) -> SchedResult<Self> {
        match scheme {
            "pbs" => Ok(TransportScheme::Fork),
            "pbs+ssh" => Ok(TransportScheme::Ssh),
            "pbs+gsissh" => Ok(TransportScheme::Gsissh),
            other => Err(SchedError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Scheme name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportScheme::Fork => "fork",
            TransportScheme::Ssh => "ssh",
            TransportScheme::Gsissh => "gsissh",
        }
    }
}

impl fmt::Display for TransportScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resource manager a session is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
    transport: TransportScheme,
}

impl Endpoint {
    /// Parse an endpoint URL such as `pbs+ssh://user@cluster.example.org`.
    pub fn parse(s: &str) -> SchedResult<Self> {
        let url = Url::parse(s).map_err(|e| SchedError::InvalidEndpoint {
            url: s.to_string(),
            message: e.to_string(),
        })?;
        let transport = TransportScheme::from_job_scheme(url.scheme())?;

        if transport != TransportScheme::Fork && url.host_str().is_none_or(str::is_empty) {
            return Err(SchedError::InvalidEndpoint {
                url: s.to_string(),
                message: format!("'{}' endpoints need a host", url.scheme()),
            });
        }

        Ok(Self { url, transport })
    }

    /// Job scheme, e.g. `pbs+ssh`.
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Transport used to reach the resource manager.
    pub fn transport(&self) -> TransportScheme {
        self.transport
    }

    /// Host name, if any.
    pub fn host(&self) -> Option<&str> {
        self.url.host_str().filter(|h| !h.is_empty())
    }

    /// Explicit port, if any.
    pub fn port(&self) -> Option<u16> {
        self.url.port()
    }

    /// User name, if any.
    pub fn username(&self) -> Option<&str> {
        Some(self.url.username()).filter(|u| !u.is_empty())
    }

    /// The endpoint as it appears in job identifiers.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Endpoint {
    type Err = SchedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_table() {
        assert_eq!(
            TransportScheme::from_job_scheme("pbs").unwrap(),
            TransportScheme::Fork
        );
        assert_eq!(
            TransportScheme::from_job_scheme("pbs+ssh").unwrap(),
            TransportScheme::Ssh
        );
        assert_eq!(
            TransportScheme::from_job_scheme("pbs+gsissh").unwrap(),
            TransportScheme::Gsissh
        );
        assert!(matches!(
            TransportScheme::from_job_scheme("slurm+ssh"),
            Err(SchedError::UnsupportedScheme(s)) if s == "slurm+ssh"
        ));
    }

    #[test]
    fn test_parse_ssh_endpoint() {
        let ep = Endpoint::parse("pbs+ssh://alice@cluster.example.org:2222").unwrap();
        assert_eq!(ep.scheme(), "pbs+ssh");
        assert_eq!(ep.transport(), TransportScheme::Ssh);
        assert_eq!(ep.host(), Some("cluster.example.org"));
        assert_eq!(ep.port(), Some(2222));
        assert_eq!(ep.username(), Some("alice"));
    }

    #[test]
    fn test_parse_local_endpoint() {
        let ep = Endpoint::parse("pbs://localhost").unwrap();
        assert_eq!(ep.transport(), TransportScheme::Fork);
        assert_eq!(ep.username(), None);
        assert_eq!(ep.to_string(), "pbs://localhost");
    }

    #[test]
    fn test_remote_endpoint_needs_host() {
        assert!(matches!(
            Endpoint::parse("pbs+ssh:///home"),
            Err(SchedError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_invalid_endpoints() {
        assert!(matches!(
            Endpoint::parse("not a url"),
            Err(SchedError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            Endpoint::parse("sge://cluster"),
            Err(SchedError::UnsupportedScheme(_))
        ));
    }
}
