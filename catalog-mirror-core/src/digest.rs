//! Content digests (`<algorithm>:<hex>`).

use std::fmt;

use crate::{Error, Result};

/// A supported digest algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Algorithm {
    /// SHA-256, the canonical algorithm for new digests.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl Algorithm {
    /// Hex-encoded length for a digest produced by this algorithm.
    const fn hex_len(self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha384 => 96,
            Self::Sha512 => 128,
        }
    }

    /// Canonical lowercase name used in digest strings.
    const fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha256" => Some(Self::Sha256),
            "sha384" => Some(Self::Sha384),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }
}

/// A parsed and validated content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageDigest {
    algorithm: Algorithm,
    hex: String,
}

impl ImageDigest {
    /// Parses and validates a `<algorithm>:<hex>` digest string.
    pub fn parse(s: &str) -> Result<Self> {
        let (alg_name, hex) = s.split_once(':').ok_or_else(|| Error::InvalidDigest {
            digest: s.to_owned(),
            reason: "missing ':' separator".into(),
        })?;

        let algorithm = Algorithm::from_name(alg_name).ok_or_else(|| Error::InvalidDigest {
            digest: s.to_owned(),
            reason: format!("unsupported algorithm {alg_name:?}"),
        })?;

        if hex.len() != algorithm.hex_len() {
            return Err(Error::InvalidDigest {
                digest: s.to_owned(),
                reason: format!(
                    "expected {} hex characters for {}, got {}",
                    algorithm.hex_len(),
                    algorithm.name(),
                    hex.len()
                ),
            });
        }
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidDigest {
                digest: s.to_owned(),
                reason: "hex portion contains non-hex characters".into(),
            });
        }

        Ok(Self {
            algorithm,
            hex: hex.to_ascii_lowercase(),
        })
    }

    /// The digest's algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The lowercase hex portion of the digest.
    #[must_use]
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for ImageDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.name(), self.hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_sha256() {
        let d = ImageDigest::parse(
            "sha256:db563b0250838063c9d69f2aeb56c5ae7f8a41d1e3a4f5b3f1ad53c2e5e3e5e5",
        )
        .unwrap();
        assert_eq!(d.algorithm(), Algorithm::Sha256);
        assert_eq!(d.to_string().len(), "sha256:".len() + 64);
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(ImageDigest::parse("db563b").is_err());
    }

    #[test]
    fn rejects_unsupported_algorithm() {
        assert!(ImageDigest::parse("md5:abc123").is_err());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(ImageDigest::parse("sha256:abc123").is_err());
    }

    #[test]
    fn rejects_non_hex() {
        let bad = format!("sha256:{}", "g".repeat(64));
        assert!(ImageDigest::parse(&bad).is_err());
    }

    #[test]
    fn lowercases_hex() {
        let upper = format!("sha256:{}", "A".repeat(64));
        let d = ImageDigest::parse(&upper).unwrap();
        assert_eq!(d.hex(), "a".repeat(64));
    }
}
