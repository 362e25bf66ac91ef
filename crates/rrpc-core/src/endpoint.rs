use std::fmt;

/// A candidate target for a service call, as returned by the endpoint
/// resolver external collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub channel: String,
    pub stream_id: i32,
    pub weight: i32,
    pub version: Version,
}

impl ServiceEndpoint {
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16, weight: i32) -> Self {
        let host = host.into();
        let channel = format!("aeron:udp?endpoint={host}:{port}");
        Self {
            id: id.into(),
            host,
            port,
            channel,
            stream_id: 0,
            weight,
            version: Version::new(0, 1, 0),
        }
    }
}

/// `major.minor.patch` semantic version, as carried on `ServiceEndpoint`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl std::str::FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or(ParseVersionError)?;
        let minor = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or(ParseVersionError)?;
        let patch = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or(ParseVersionError)?;
        Ok(Version::new(major, minor, patch))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseVersionError;

impl fmt::Display for ParseVersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid semver string, expected major.minor.patch")
    }
}

impl std::error::Error for ParseVersionError {}
