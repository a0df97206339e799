//! Platform subdirectories of a channel, and the `any` key used by rule tables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One platform-specific subdirectory of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Subdir {
    #[serde(rename = "noarch")]
    Noarch,
    #[serde(rename = "linux-32")]
    Linux32,
    #[serde(rename = "linux-64")]
    Linux64,
    #[serde(rename = "linux-aarch64")]
    LinuxAarch64,
    #[serde(rename = "linux-armv6l")]
    LinuxArmv6l,
    #[serde(rename = "linux-armv7l")]
    LinuxArmv7l,
    #[serde(rename = "linux-ppc64le")]
    LinuxPpc64le,
    #[serde(rename = "osx-64")]
    Osx64,
    #[serde(rename = "win-32")]
    Win32,
    #[serde(rename = "win-64")]
    Win64,
}

impl Subdir {
    /// Every subdir the channel publishes, in publishing order.
    pub const ALL: [Subdir; 10] = [
        Subdir::Noarch,
        Subdir::Linux32,
        Subdir::Linux64,
        Subdir::LinuxAarch64,
        Subdir::LinuxArmv6l,
        Subdir::LinuxArmv7l,
        Subdir::LinuxPpc64le,
        Subdir::Osx64,
        Subdir::Win32,
        Subdir::Win64,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subdir::Noarch => "noarch",
            Subdir::Linux32 => "linux-32",
            Subdir::Linux64 => "linux-64",
            Subdir::LinuxAarch64 => "linux-aarch64",
            Subdir::LinuxArmv6l => "linux-armv6l",
            Subdir::LinuxArmv7l => "linux-armv7l",
            Subdir::LinuxPpc64le => "linux-ppc64le",
            Subdir::Osx64 => "osx-64",
            Subdir::Win32 => "win-32",
            Subdir::Win64 => "win-64",
        }
    }

    /// The platform-neutral subdir; its instructions carry the external dependency map.
    pub fn is_noarch(&self) -> bool {
        matches!(self, Subdir::Noarch)
    }
}

impl fmt::Display for Subdir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown subdir '{0}'")]
pub struct UnknownSubdir(pub String);

impl FromStr for Subdir {
    type Err = UnknownSubdir;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Subdir::ALL
            .iter()
            .copied()
            .find(|subdir| subdir.as_str() == s)
            .ok_or_else(|| UnknownSubdir(s.to_string()))
    }
}

/// Key of a removal/revocation table: a concrete subdir, or `any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubdirKey {
    Any,
    Subdir(Subdir),
}

impl SubdirKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubdirKey::Any => "any",
            SubdirKey::Subdir(subdir) => subdir.as_str(),
        }
    }
}

impl fmt::Display for SubdirKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubdirKey {
    type Err = UnknownSubdir;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "any" {
            return Ok(SubdirKey::Any);
        }
        s.parse().map(SubdirKey::Subdir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_published_subdir() {
        for subdir in Subdir::ALL {
            assert_eq!(subdir.as_str().parse::<Subdir>(), Ok(subdir));
        }
    }

    #[test]
    fn any_is_only_a_table_key() {
        assert!("any".parse::<Subdir>().is_err());
        assert_eq!("any".parse::<SubdirKey>(), Ok(SubdirKey::Any));
        assert_eq!(
            "osx-64".parse::<SubdirKey>(),
            Ok(SubdirKey::Subdir(Subdir::Osx64))
        );
    }

    #[test]
    fn rejects_unknown_platform() {
        let err = "osx-arm64".parse::<SubdirKey>().unwrap_err();
        assert_eq!(err.to_string(), "unknown subdir 'osx-arm64'");
    }
}
