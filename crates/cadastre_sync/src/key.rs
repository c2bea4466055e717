// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache key space: exact keys and prefix families.

use std::fmt;
use std::sync::Arc;

/// Name of one cache entry: an ordered sequence of string segments.
///
/// Two keys are equal iff all segments are equal in order and value. Keys are
/// cheap to clone (the segment list is shared behind an `Arc`) and are used
/// as map keys throughout the engine.
///
/// # Examples
///
/// ```
/// use cadastre_sync::CacheKey;
///
/// let all = CacheKey::root("landRecords");
/// let one = CacheKey::root("landRecord").child("P-100");
///
/// assert_eq!(one, CacheKey::new(["landRecord", "P-100"]));
/// assert_ne!(all, one);
/// assert_eq!(one.to_string(), "landRecord/P-100");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct CacheKey {
    segments: Arc<[String]>,
}

impl CacheKey {
    /// Creates a key from an ordered list of segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a single-segment key.
    pub fn root(segment: impl Into<String>) -> Self {
        Self::new([segment.into()])
    }

    /// Returns a new key with one more trailing segment.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments: Vec<String> = self.segments.to_vec();
        segments.push(segment.into());
        Self::new(segments)
    }

    /// The ordered segments of this key.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The family whose prefix is this entire key.
    ///
    /// Such a family matches the key itself and any descendant keys.
    #[must_use]
    pub fn family(&self) -> KeyFamily {
        KeyFamily {
            prefix: Arc::clone(&self.segments),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

/// A prefix group of cache keys, used for bulk invalidation.
///
/// A family matches every key that begins with its prefix, in order. The
/// family built from a full key matches exactly that key and its descendants.
///
/// # Examples
///
/// ```
/// use cadastre_sync::{CacheKey, KeyFamily};
///
/// let family = KeyFamily::root("landRecord");
/// assert!(family.matches(&CacheKey::new(["landRecord", "P-1"])));
/// assert!(family.matches(&CacheKey::root("landRecord")));
/// assert!(!family.matches(&CacheKey::root("landRecords")));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct KeyFamily {
    prefix: Arc<[String]>,
}

impl KeyFamily {
    /// Creates a family from an ordered prefix.
    pub fn new<I, S>(prefix: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefix: prefix.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a single-segment family.
    pub fn root(segment: impl Into<String>) -> Self {
        Self::new([segment.into()])
    }

    /// The ordered prefix segments of this family.
    #[must_use]
    pub fn prefix(&self) -> &[String] {
        &self.prefix
    }

    /// Returns whether the given key begins with this family's prefix.
    #[must_use]
    pub fn matches(&self, key: &CacheKey) -> bool {
        key.segments.len() >= self.prefix.len() && key.segments[..self.prefix.len()] == self.prefix[..]
    }
}

impl From<CacheKey> for KeyFamily {
    fn from(key: CacheKey) -> Self {
        Self { prefix: key.segments }
    }
}

impl fmt::Display for KeyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/*", self.prefix.join("/"))
    }
}
