//! Provider URLs of the form `protocol://network?key=value&key=value`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use tracing::warn;

use super::TransportError;

/// Parsed provider URL selecting a transport and its options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderUrl {
    protocol: String,
    network: String,
    options: BTreeMap<String, String>,
}

impl ProviderUrl {
    /// Parses `url`. Only a missing `://` separator or an empty protocol is an
    /// error; malformed `key=value` pairs are skipped with a warning.
    pub fn parse(url: &str) -> Result<Self, TransportError> {
        let (protocol, rest) = url
            .split_once("://")
            .ok_or_else(|| TransportError::InvalidUrl(url.to_string()))?;
        if protocol.is_empty() {
            return Err(TransportError::InvalidUrl(url.to_string()));
        }

        let (network, query) = match rest.split_once('?') {
            Some((network, query)) => (network, Some(query)),
            None => (rest, None),
        };

        let mut options = BTreeMap::new();
        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            if pair.is_empty() {
                continue;
            }
            match pair.split_once('=') {
                Some((key, value)) if !key.is_empty() && !value.contains('=') => {
                    options.insert(key.to_string(), value.to_string());
                }
                _ => warn!(url, pair, "ignoring invalid key-value pair in provider url"),
            }
        }

        Ok(Self {
            protocol: protocol.to_string(),
            network: network.to_string(),
            options,
        })
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Network part between `://` and `?`; may be empty.
    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn get_usize(&self, key: &str, default: usize) -> Result<usize, TransportError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v.parse().map_err(|_| {
                TransportError::InvalidUrl(format!("option {key}={v} is not an unsigned integer"))
            }),
        }
    }

    /// `true` for `true` (any case) or `1`.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            None => default,
            Some(v) => v.eq_ignore_ascii_case("true") || v == "1",
        }
    }

    pub fn options(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromStr for ProviderUrl {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ProviderUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.network)?;
        for (i, (key, value)) in self.options.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{key}={value}")?;
        }
        Ok(())
    }
}
