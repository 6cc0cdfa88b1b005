//! Composite job identifiers.
//!
//! A job is addressed by the endpoint of the resource manager it was
//! submitted to together with the id the scheduler assigned to it. The
//! textual form is `[<endpoint>]-[<raw-id>]`, which is also the only state
//! needed to re-address a job from another process.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{SchedError, SchedResult};

/// Separator between the two bracketed groups.
const SEPARATOR: &str = "]-[";

/// Endpoint plus scheduler-assigned job id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId {
    endpoint: String,
    raw: String,
}

impl JobId {
    /// Combine an endpoint and a raw scheduler id.
    pub fn new(endpoint: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            raw: raw.into(),
        }
    }

    /// Parse the `[endpoint]-[raw]` form.
    ///
    /// The endpoint group stops at the first separator, so only an endpoint
    /// containing `]-[` itself fails to round-trip.
    pub fn parse(s: &str) -> SchedResult<Self> {
        let malformed = || SchedError::MalformedIdentifier(s.to_string());

        let inner = s
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(malformed)?;
        let (endpoint, raw) = inner.split_once(SEPARATOR).ok_or_else(malformed)?;

        if endpoint.contains('\n') || raw.contains('\n') {
            return Err(malformed());
        }

        Ok(Self::new(endpoint, raw))
    }

    /// Endpoint the job was submitted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Scheduler-native id, e.g. `12345.pbs-server`.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]-[{}]", self.endpoint, self.raw)
    }
}

impl FromStr for JobId {
    type Err = SchedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for JobId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
