use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Host used when an address omits it, as in `:8080`.
pub const UNSPECIFIED_HOST: &str = "0.0.0.0";

/// TCP address an HTTP runnable binds to.
///
/// Accepts `host:port`, `[v6-host]:port`, and the shorthand `:port` which
/// listens on every interface. Name resolution is deferred to bind time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct ListenAddress {
    host: String,
    port: u16,
}

impl ListenAddress {
    /// Builds an address from its parts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Loopback address with an ephemeral port, used by tests and probes.
    #[must_use]
    pub fn loopback_ephemeral() -> Self {
        Self::new("127.0.0.1", 0)
    }

    /// Host name or literal IP address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port; `0` asks the operating system to choose one.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(formatter, "[{}]:{}", self.host, self.port)
        } else {
            write!(formatter, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for ListenAddress {
    type Err = AddressParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let (raw_host, raw_port) = trimmed
            .rsplit_once(':')
            .ok_or_else(|| AddressParseError::MissingPort(input.to_owned()))?;
        if raw_port.is_empty() {
            return Err(AddressParseError::MissingPort(input.to_owned()));
        }
        let port = raw_port
            .parse::<u16>()
            .map_err(|_| AddressParseError::InvalidPort(input.to_owned()))?;
        let unbracketed = raw_host
            .strip_prefix('[')
            .and_then(|inner| inner.strip_suffix(']'))
            .unwrap_or(raw_host);
        if unbracketed.contains(['[', ']']) {
            return Err(AddressParseError::InvalidHost(input.to_owned()));
        }
        let host = if unbracketed.is_empty() {
            UNSPECIFIED_HOST
        } else {
            unbracketed
        };
        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for ListenAddress {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ListenAddress> for String {
    fn from(address: ListenAddress) -> Self {
        address.to_string()
    }
}

/// Errors encountered while parsing a [`ListenAddress`] from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressParseError {
    /// No `:port` suffix was present.
    #[error("missing port in listen address '{0}'")]
    MissingPort(String),
    /// The port was not a number between 0 and 65535.
    #[error("invalid port in listen address '{0}'")]
    InvalidPort(String),
    /// Brackets were unbalanced or misplaced.
    #[error("invalid host in listen address '{0}'")]
    InvalidHost(String),
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(":8080", "0.0.0.0", 8080)]
    #[case("127.0.0.1:9000", "127.0.0.1", 9000)]
    #[case("localhost:0", "localhost", 0)]
    #[case("[::1]:443", "::1", 443)]
    fn parses_listen_addresses(#[case] input: &str, #[case] host: &str, #[case] port: u16) {
        let address: ListenAddress = input.parse().expect("address should parse");
        assert_eq!(address.host(), host);
        assert_eq!(address.port(), port);
    }

    #[rstest]
    #[case("8080")]
    #[case("localhost:")]
    #[case("localhost:http")]
    #[case("localhost:70000")]
    #[case("[::1:80")]
    fn rejects_malformed_addresses(#[case] input: &str) {
        assert!(input.parse::<ListenAddress>().is_err(), "{input} should fail");
    }

    #[test]
    fn displays_ipv6_with_brackets() {
        assert_eq!(ListenAddress::new("::1", 80).to_string(), "[::1]:80");
    }
}
