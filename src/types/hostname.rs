// ABOUTME: DNS hostname validation for production domains.
// ABOUTME: Enforces RFC 1123 labels and joins subdomains onto zone apexes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostnameError {
    #[error("hostname cannot be empty")]
    Empty,

    #[error("hostname exceeds maximum length of 253 characters")]
    TooLong,

    #[error("hostname label '{0}' is empty or longer than 63 characters")]
    BadLabelLength(String),

    #[error("hostname label '{0}' cannot start or end with a hyphen")]
    HyphenEdge(String),

    #[error("invalid character in hostname: '{0}'")]
    InvalidChar(char),
}

/// A validated, lowercase DNS hostname such as `app.example.com`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hostname(String);

impl Hostname {
    pub fn new(value: &str) -> Result<Self, HostnameError> {
        let value = value.trim().trim_end_matches('.').to_ascii_lowercase();
        if value.is_empty() {
            return Err(HostnameError::Empty);
        }

        if value.len() > 253 {
            return Err(HostnameError::TooLong);
        }

        for label in value.split('.') {
            if label.is_empty() || label.len() > 63 {
                return Err(HostnameError::BadLabelLength(label.to_string()));
            }
            if label.starts_with('-') || label.ends_with('-') {
                return Err(HostnameError::HyphenEdge(label.to_string()));
            }
            if let Some(c) = label
                .chars()
                .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '-')
            {
                return Err(HostnameError::InvalidChar(c));
            }
        }

        Ok(Self(value))
    }

    /// Build `subdomain.zone`. An empty subdomain or `@` yields the zone apex.
    pub fn join(subdomain: &str, zone: &str) -> Result<Self, HostnameError> {
        let subdomain = subdomain.trim();
        if subdomain.is_empty() || subdomain == "@" {
            Self::new(zone)
        } else {
            Self::new(&format!("{subdomain}.{zone}"))
        }
    }

    /// The part of this hostname in front of `zone`, or `None` when the
    /// hostname is not inside the zone. The apex yields `Some("")`.
    pub fn subdomain_of(&self, zone: &str) -> Option<&str> {
        let zone = zone.trim_end_matches('.');
        if self.0.eq_ignore_ascii_case(zone) {
            return Some("");
        }
        self.0
            .strip_suffix(zone)
            .and_then(|rest| rest.strip_suffix('.'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Hostname {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Hostname {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hostname::new(&s).map_err(serde::de::Error::custom)
    }
}
