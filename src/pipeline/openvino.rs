//! OpenVINO versions and network blob compatibility.

use crate::error::VisLinkError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OpenVINO release a network blob was compiled with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum OpenVinoVersion {
    #[serde(rename = "2020.3")]
    V2020_3,
    #[serde(rename = "2020.4")]
    V2020_4,
    #[serde(rename = "2021.1")]
    V2021_1,
    #[serde(rename = "2021.2")]
    V2021_2,
    #[serde(rename = "2021.3")]
    V2021_3,
    #[default]
    #[serde(rename = "2021.4")]
    V2021_4,
}

/// Blob (major, minor) version → OpenVINO versions able to run it
const BLOB_VERSIONS: &[((u32, u32), &[OpenVinoVersion])] = {
    use OpenVinoVersion::*;
    &[
        ((5, 0), &[V2020_3]),
        ((6, 0), &[V2020_4, V2021_1, V2021_2, V2021_3, V2021_4]),
        ((2020, 3), &[V2020_3]),
        ((2020, 4), &[V2020_4]),
        ((2021, 1), &[V2021_1]),
        ((2021, 2), &[V2021_2]),
        ((2021, 3), &[V2021_3]),
        ((2021, 4), &[V2021_4]),
    ]
};

impl OpenVinoVersion {
    pub fn all() -> &'static [OpenVinoVersion] {
        use OpenVinoVersion::*;
        &[V2020_3, V2020_4, V2021_1, V2021_2, V2021_3, V2021_4]
    }

    /// `"2021.4"`
    pub fn name(&self) -> &'static str {
        match self {
            OpenVinoVersion::V2020_3 => "2020.3",
            OpenVinoVersion::V2020_4 => "2020.4",
            OpenVinoVersion::V2021_1 => "2021.1",
            OpenVinoVersion::V2021_2 => "2021.2",
            OpenVinoVersion::V2021_3 => "2021.3",
            OpenVinoVersion::V2021_4 => "2021.4",
        }
    }

    /// OpenVINO versions that can run a blob of the given version
    pub fn blob_supported_versions(major: u32, minor: u32) -> &'static [OpenVinoVersion] {
        BLOB_VERSIONS
            .iter()
            .find(|(v, _)| *v == (major, minor))
            .map(|(_, versions)| *versions)
            .unwrap_or(&[])
    }

    /// Newest OpenVINO version that can run a blob of the given version
    pub fn blob_latest_supported_version(major: u32, minor: u32) -> Option<OpenVinoVersion> {
        Self::blob_supported_versions(major, minor).last().copied()
    }

    /// Whether blobs compiled for `self` and `other` can share one device program.
    ///
    /// Walks the blob table in order; the first blob version that lists either
    /// OpenVINO version decides.
    pub fn is_blob_compatible(self, other: OpenVinoVersion) -> bool {
        for (_, versions) in BLOB_VERSIONS {
            let has_self = versions.contains(&self);
            let has_other = versions.contains(&other);
            match (has_self, has_other) {
                (true, true) => return true,
                (false, false) => continue,
                _ => return false,
            }
        }
        false
    }
}

impl fmt::Display for OpenVinoVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for OpenVinoVersion {
    type Err = VisLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OpenVinoVersion::all()
            .iter()
            .copied()
            .find(|v| v.name() == s)
            .ok_or_else(|| VisLinkError::Config(format!("Unknown OpenVINO version '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OpenVinoVersion::*;

    #[test]
    fn test_latest_supported() {
        assert_eq!(OpenVinoVersion::blob_latest_supported_version(5, 0), Some(V2020_3));
        assert_eq!(OpenVinoVersion::blob_latest_supported_version(6, 0), Some(V2021_4));
        assert_eq!(OpenVinoVersion::blob_latest_supported_version(2021, 2), Some(V2021_2));
        assert_eq!(OpenVinoVersion::blob_latest_supported_version(7, 0), None);
    }

    #[test]
    fn test_blob_compatibility() {
        assert!(V2021_1.is_blob_compatible(V2021_4));
        assert!(V2020_3.is_blob_compatible(V2020_3));
        assert!(!V2020_3.is_blob_compatible(V2020_4));
        assert!(!V2021_4.is_blob_compatible(V2020_3));
    }

    #[test]
    fn test_parse_and_serde_names() {
        assert_eq!("2020.4".parse::<OpenVinoVersion>().unwrap(), V2020_4);
        assert!("2019.1".parse::<OpenVinoVersion>().is_err());
        assert_eq!(serde_json::to_string(&V2021_3).unwrap(), "\"2021.3\"");
        assert_eq!(OpenVinoVersion::default(), V2021_4);
    }
}
