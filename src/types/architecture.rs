// ABOUTME: Remote CPU architecture detection result.
// ABOUTME: Parses diagnostic command output strictly; unknown values are errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The command run on a freshly reachable server to learn its architecture.
pub const ARCHITECTURE_COMMAND: &str = "uname -m";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unsupported server architecture: {raw:?} (expected aarch64 or amd64)")]
pub struct UnsupportedArchitecture {
    pub raw: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Aarch64,
    Amd64,
}

impl Architecture {
    /// Parse the output of [`ARCHITECTURE_COMMAND`].
    ///
    /// Only the two supported architectures are accepted.
    pub fn parse(output: &str) -> Result<Self, UnsupportedArchitecture> {
        match output.trim() {
            "aarch64" | "arm64" => Ok(Architecture::Aarch64),
            "x86_64" | "amd64" => Ok(Architecture::Amd64),
            other => Err(UnsupportedArchitecture {
                raw: other.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::Aarch64 => "aarch64",
            Architecture::Amd64 => "amd64",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
