//! Identity and reference types for the tangle node
//!
//! Equality and hashing always use the structured values. The sigil text
//! forms exist for labels, logs and the line protocol.

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 32-byte fixed-size array used for keys and hashes.
pub type Bytes32 = [u8; 32];

// =============================================================================
// FEED IDENTITY
// =============================================================================

/// Key-encoding tag a feed identity is advertised under.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RefAlgo {
    /// Classic feed format (primary)
    Ed25519,
    /// Gabby-grove feed format (alternate)
    Gabby,
}

impl RefAlgo {
    /// Every known format, primary first.
    pub const ALL: [RefAlgo; 2] = [RefAlgo::Ed25519, RefAlgo::Gabby];

    /// Suffix used in the sigil text form
    pub fn suffix(self) -> &'static str {
        match self {
            RefAlgo::Ed25519 => "ed25519",
            RefAlgo::Gabby => "ggfeed-v1",
        }
    }

    fn from_suffix(suffix: &str) -> Result<Self> {
        RefAlgo::ALL
            .into_iter()
            .find(|algo| algo.suffix() == suffix)
            .ok_or_else(|| Error::UnknownAlgo(suffix.to_string()))
    }
}

/// A participant's public key plus the format tag it was advertised under.
///
/// Two refs with the same key and different tags are distinct values.
#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedRef {
    pub key: Bytes32,
    pub algo: RefAlgo,
}

impl FeedRef {
    pub fn new(key: Bytes32, algo: RefAlgo) -> Self {
        Self { key, algo }
    }

    /// Primary-format ref for a public key
    pub fn ed25519(key: Bytes32) -> Self {
        Self::new(key, RefAlgo::Ed25519)
    }

    /// Same key, different format tag
    pub fn with_algo(&self, algo: RefAlgo) -> Self {
        Self::new(self.key, algo)
    }

    /// Short label such as `<@AbC.ed25519>`
    pub fn short_sigil(&self) -> String {
        let encoded = STANDARD.encode(self.key);
        format!("<@{}.{}>", &encoded[..3], self.algo.suffix())
    }
}

impl fmt::Display for FeedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}.{}", STANDARD.encode(self.key), self.algo.suffix())
    }
}

impl fmt::Debug for FeedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_sigil())
    }
}

impl FromStr for FeedRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (key, suffix) = split_sigil(s, '@')?;
        Ok(Self::new(key, RefAlgo::from_suffix(suffix)?))
    }
}

// =============================================================================
// BLOB REFERENCE
// =============================================================================

/// Content address of a binary blob (SHA-256 of its bytes)
#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobRef {
    pub hash: Bytes32,
}

impl BlobRef {
    pub const SUFFIX: &'static str = "sha256";

    pub fn new(hash: Bytes32) -> Self {
        Self { hash }
    }

    /// Address the given content
    pub fn of(data: &[u8]) -> Self {
        Self::new(crate::crypto::content_hash(data))
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "&{}.{}", STANDARD.encode(self.hash), Self::SUFFIX)
    }
}

impl fmt::Debug for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = STANDARD.encode(self.hash);
        write!(f, "<&{}.{}>", &encoded[..3], Self::SUFFIX)
    }
}

impl FromStr for BlobRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (hash, suffix) = split_sigil(s, '&')?;
        if suffix != Self::SUFFIX {
            return Err(Error::UnknownAlgo(suffix.to_string()));
        }
        Ok(Self::new(hash))
    }
}

/// Split `<sigil><base64>.<suffix>` into decoded bytes and suffix.
fn split_sigil(s: &str, sigil: char) -> Result<(Bytes32, &str)> {
    let rest = s
        .strip_prefix(sigil)
        .ok_or_else(|| Error::InvalidSigil(s.to_string()))?;
    // base64 has no '.', so the first one ends the payload
    let (encoded, suffix) = rest
        .split_once('.')
        .ok_or_else(|| Error::InvalidSigil(s.to_string()))?;
    let bytes = STANDARD.decode(encoded)?;
    let len = bytes.len();
    let key: Bytes32 = bytes.try_into().map_err(|_| Error::InvalidKeyLength(len))?;
    Ok((key, suffix))
}

// =============================================================================
// GRAPH UPDATE MESSAGES
// =============================================================================

/// Graph-relevant content extracted from feed messages.
///
/// Produced by log processing and consumed by the graph builder.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum ContactMessage {
    /// `author` changed its relationship to `contact`
    Contact {
        author: FeedRef,
        contact: FeedRef,
        following: bool,
        blocking: bool,
    },
    /// Display name for an identity
    About { about: FeedRef, name: String },
    /// `sub` is a secondary identity owned by `main`
    MetafeedLink { main: FeedRef, sub: FeedRef },
}

impl ContactMessage {
    pub fn follow(author: FeedRef, contact: FeedRef) -> Self {
        Self::Contact {
            author,
            contact,
            following: true,
            blocking: false,
        }
    }

    pub fn block(author: FeedRef, contact: FeedRef) -> Self {
        Self::Contact {
            author,
            contact,
            following: false,
            blocking: true,
        }
    }

    /// Neither following nor blocking
    pub fn neutral(author: FeedRef, contact: FeedRef) -> Self {
        Self::Contact {
            author,
            contact,
            following: false,
            blocking: false,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_ref_text_form() {
        let feed = FeedRef::ed25519([7; 32]);
        let text = feed.to_string();
        assert!(text.starts_with('@'));
        assert!(text.ends_with(".ed25519"));

        let parsed: FeedRef = text.parse().unwrap();
        assert_eq!(parsed, feed);
    }

    #[test]
    fn test_alternate_tag_is_distinct() {
        let primary = FeedRef::ed25519([1; 32]);
        let alternate = primary.with_algo(RefAlgo::Gabby);

        assert_ne!(primary, alternate);
        assert_eq!(primary.key, alternate.key);
        assert!(alternate.to_string().ends_with(".ggfeed-v1"));
        assert_eq!(alternate.to_string().parse::<FeedRef>().unwrap(), alternate);
    }

    #[test]
    fn test_short_sigil() {
        let feed = FeedRef::ed25519([0; 32]);
        assert_eq!(feed.short_sigil(), "<@AAA.ed25519>");
    }

    #[test]
    fn test_feed_ref_rejects_garbage() {
        assert!(matches!(
            "AAAA.ed25519".parse::<FeedRef>(),
            Err(Error::InvalidSigil(_))
        ));
        assert!(matches!(
            "@AAAA".parse::<FeedRef>(),
            Err(Error::InvalidSigil(_))
        ));
        assert!(matches!(
            "@AAAA.ed25519".parse::<FeedRef>(),
            Err(Error::InvalidKeyLength(3))
        ));

        let unknown = format!("@{}.rsa", STANDARD.encode([3u8; 32]));
        assert!(matches!(
            unknown.parse::<FeedRef>(),
            Err(Error::UnknownAlgo(_))
        ));
    }

    #[test]
    fn test_blob_ref_content_address() {
        let a = BlobRef::of(b"hello");
        let b = BlobRef::of(b"hello");
        let c = BlobRef::of(b"world");
        assert_eq!(a, b);
        assert_ne!(a, c);

        let text = a.to_string();
        assert!(text.starts_with('&'));
        assert!(text.ends_with(".sha256"));
        assert_eq!(text.parse::<BlobRef>().unwrap(), a);
    }

    #[test]
    fn test_contact_message_encoding() {
        let msg = ContactMessage::block(FeedRef::ed25519([1; 32]), FeedRef::ed25519([2; 32]));
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(ContactMessage::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_feed_ref_json_shape() {
        let feed = FeedRef::new([9; 32], RefAlgo::Gabby);
        let json = serde_json::to_string(&feed).unwrap();
        assert!(json.contains("\"Gabby\""));
    }
}
