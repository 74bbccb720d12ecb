//! Endpoint addressing: parsing and validating `proto://addr` strings and
//! turning them into the matching hyper client/listener machinery.

use crate::error::EndpointError;

/// Maximum length of `sockaddr_un.sun_path` on Linux, including the NUL
/// terminator libc appends; we reject any path that would not leave room for it.
const SUN_PATH_LEN: usize = 108;

/// A parsed `proto://addr` endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub proto: String,
    pub addr: String,
}

impl Endpoint {
    /// Parse `proto://addr`, failing if the `://` separator is missing.
    pub fn parse(endpoint: &str) -> Result<Self, EndpointError> {
        match endpoint.split_once("://") {
            Some((proto, addr)) => Ok(Self {
                proto: proto.to_owned(),
                addr: addr.to_owned(),
            }),
            None => Err(EndpointError::MalformedEndpoint(endpoint.to_owned())),
        }
    }

    /// Parse and require the `unix` scheme, additionally checking the path
    /// length and rejecting abstract-namespace sockets if `allow_abstract`
    /// is false (the listen side refuses them; the webhook side allows them).
    pub fn parse_unix(endpoint: &str, allow_abstract: bool) -> Result<Self, EndpointError> {
        let this = Self::parse(endpoint)?;
        if this.proto != "unix" {
            return Err(EndpointError::UnsupportedScheme(
                endpoint.to_owned(),
                this.proto.clone(),
                "unix",
            ));
        }
        if !allow_abstract && this.addr.starts_with('@') {
            return Err(EndpointError::UnsupportedScheme(
                endpoint.to_owned(),
                "unix (abstract)".to_owned(),
                "unix",
            ));
        }
        if !this.addr.starts_with('@') && this.addr.len() >= SUN_PATH_LEN {
            return Err(EndpointError::AddressTooLong(
                this.addr.clone(),
                this.addr.len(),
                SUN_PATH_LEN - 1,
            ));
        }
        Ok(this)
    }

    /// Is this a `tcp://host:port` endpoint?
    pub fn is_tcp(&self) -> bool {
        self.proto == "tcp"
    }

    /// Is this a `unix://path` endpoint?
    pub fn is_unix(&self) -> bool {
        self.proto == "unix"
    }
}
