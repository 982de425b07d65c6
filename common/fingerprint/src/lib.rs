//! Content fingerprints used as deduplication keys.
//!
//! Two flavours exist: a raw content fingerprint over the exact bytes, with a
//! configurable digest, and a normalized text fingerprint that ignores case and
//! whitespace layout, always SHA-256. Both are lower-case hex strings and depend
//! on nothing but their input.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    Sha224,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported hash algorithm: {0}, expected one of sha224, sha256, sha384, sha512")]
pub struct UnsupportedAlgorithm(pub String);

const ALGORITHMS: &[(&str, HashAlgorithm)] = &[
    ("sha224", HashAlgorithm::Sha224),
    ("sha256", HashAlgorithm::Sha256),
    ("sha384", HashAlgorithm::Sha384),
    ("sha512", HashAlgorithm::Sha512),
];

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        ALGORITHMS
            .iter()
            .find(|(_, algo)| algo == self)
            .map(|(name, _)| *name)
            .unwrap_or("sha256")
    }

    /// Length of the hex digest this algorithm produces
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha224 => 56,
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha384 => 96,
            HashAlgorithm::Sha512 => 128,
        }
    }

    pub fn hex_digest(&self, data: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha224 => hex::encode(Sha224::digest(data)),
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
            HashAlgorithm::Sha384 => hex::encode(Sha384::digest(data)),
            HashAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = UnsupportedAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "");
        ALGORITHMS
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, algo)| *algo)
            .ok_or_else(|| UnsupportedAlgorithm(s.to_string()))
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fingerprint of the exact content bytes.
pub fn content_fingerprint(content: &[u8], algorithm: HashAlgorithm) -> String {
    algorithm.hex_digest(content)
}

/// Word separators: Unicode `White_Space` plus the ASCII information
/// separators U+001C..=U+001F.
pub fn is_word_separator(c: char) -> bool {
    c.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&c)
}

/// Non-empty runs of text between word separators.
pub fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(is_word_separator).filter(|w| !w.is_empty())
}

pub fn word_count(text: &str) -> usize {
    words(text).count()
}

/// Lower-cases and collapses every separator run into a single space, dropping
/// leading and trailing ones. All-whitespace input normalizes to the empty string.
pub fn normalize_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut normalized = String::with_capacity(lowered.len());
    for word in words(&lowered) {
        if !normalized.is_empty() {
            normalized.push(' ');
        }
        normalized.push_str(word);
    }
    normalized
}

/// SHA-256 of the normalized text. Texts differing only in case or whitespace
/// layout share a fingerprint.
pub fn normalized_fingerprint(text: &str) -> String {
    HashAlgorithm::Sha256.hex_digest(normalize_text(text).as_bytes())
}
