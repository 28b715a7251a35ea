//! Tunnel feature kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TunnelError;

/// The kind of tunnel a session carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    /// Interactive shell byte stream.
    #[serde(alias = "ssh")]
    Shell,
    /// Request/response HTTP proxying.
    Http,
}

impl Feature {
    /// Every feature, in display order.
    pub const ALL: [Feature; 2] = [Feature::Shell, Feature::Http];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Shell => "shell",
            Feature::Http => "http",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shell" | "ssh" => Ok(Feature::Shell),
            "http" => Ok(Feature::Http),
            other => Err(TunnelError::InvalidFeature(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("shell".parse::<Feature>().unwrap(), Feature::Shell);
        assert_eq!("ssh".parse::<Feature>().unwrap(), Feature::Shell);
        assert_eq!("http".parse::<Feature>().unwrap(), Feature::Http);
    }

    #[test]
    fn test_parse_invalid() {
        let err = "HTTP".parse::<Feature>().unwrap_err();
        assert!(matches!(err, TunnelError::InvalidFeature(ref f) if f == "HTTP"));
        assert!("".parse::<Feature>().is_err());
    }

    #[test]
    fn test_display_matches_serde() {
        for feature in Feature::ALL {
            let json = serde_json::to_string(&feature).unwrap();
            assert_eq!(json, format!("\"{}\"", feature));
        }
    }

    #[test]
    fn test_deserialize_alias() {
        let feature: Feature = serde_json::from_str("\"ssh\"").unwrap();
        assert_eq!(feature, Feature::Shell);
    }
}
