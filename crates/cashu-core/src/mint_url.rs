//! Mint url

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{ParseError, Url};

use crate::ensure;

/// Url Error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Url error
    #[error(transparent)]
    Url(#[from] ParseError),
    /// Invalid URL structure
    #[error("Invalid URL")]
    InvalidUrl,
}

/// Normalized mint url
///
/// Scheme and host are lowercased and trailing slashes dropped so that two
/// spellings of the same mint compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MintUrl(String);

impl MintUrl {
    fn format_url(url: &str) -> Result<String, Error> {
        ensure!(!url.is_empty(), Error::InvalidUrl);

        let url = url.trim_end_matches('/');
        let (protocol, rest) = url.split_once("://").ok_or(Error::InvalidUrl)?;
        let (host, path) = match rest.split_once('/') {
            Some((host, path)) => (host, Some(path)),
            None => (rest, None),
        };
        ensure!(!host.is_empty(), Error::InvalidUrl);

        let mut formatted = format!("{}://{}", protocol.to_lowercase(), host.to_lowercase());
        if let Some(path) = path {
            formatted.push('/');
            formatted.push_str(path);
        }
        Ok(formatted)
    }

    /// Join a path onto the url
    pub fn join(&self, path: &str) -> Result<Url, Error> {
        let url = Url::parse(&self.0)?;

        let base_path = url.path();
        let normalized_path = if base_path.ends_with('/') {
            format!("{}{}", base_path, path)
        } else {
            format!("{}/{}", base_path, path)
        };

        let mut result = url.clone();
        result.set_path(&normalized_path);
        Ok(result)
    }

    /// Append path elements onto the url
    pub fn join_paths(&self, path_elements: &[&str]) -> Result<Url, Error> {
        self.join(&path_elements.join("/"))
    }
}

impl FromStr for MintUrl {
    type Err = Error;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        Self::format_url(url).map(Self).map_err(|_| Error::InvalidUrl)
    }
}

impl fmt::Display for MintUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for MintUrl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MintUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MintUrl::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slashes_trimmed() {
        let formatted = "http://mint.example.com";
        for raw in [
            "http://mint.example.com",
            "http://mint.example.com/",
            "http://mint.example.com////",
        ] {
            assert_eq!(formatted, MintUrl::from_str(raw).unwrap().to_string());
        }
    }

    #[test]
    fn test_host_case_insensitive_path_preserved() {
        let url = MintUrl::from_str("https://MINT.example.com/Path/To/Mint").unwrap();
        assert_eq!("https://mint.example.com/Path/To/Mint", url.to_string());
    }

    #[test]
    fn test_join_paths() {
        let url = MintUrl::from_str("https://mint.example.com").unwrap();
        assert_eq!(
            "https://mint.example.com/v1/keys",
            url.join_paths(&["v1", "keys"]).unwrap().to_string()
        );

        let url = MintUrl::from_str("https://mint.example.com/base").unwrap();
        assert_eq!(
            "https://mint.example.com/base/v1/keys",
            url.join_paths(&["v1", "keys"]).unwrap().to_string()
        );
    }

    #[test]
    fn test_invalid() {
        assert!(MintUrl::from_str("").is_err());
        assert!(MintUrl::from_str("not a url").is_err());
    }
}
