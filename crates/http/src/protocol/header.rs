//! A read-only, lazily materialised view over a message's header fields.
//!
//! Responses read off the wire keep their header block as one frozen [`Bytes`] buffer plus
//! the byte ranges of every field name and value. Lookups scan those ranges directly and
//! never allocate; an [`http::HeaderMap`] is only built, once, when a caller asks for it.

use std::fmt;
use std::ops::Range;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue};
use once_cell::sync::OnceCell;
use triomphe::Arc;

/// Byte ranges of one field inside a raw header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FieldIndex {
    pub(crate) name: Range<usize>,
    pub(crate) value: Range<usize>,
}

/// Case-insensitive, ordered, multi-valued header fields of a single message.
///
/// Cloning is cheap, all clones share the same storage.
#[derive(Clone)]
pub struct Header {
    inner: Arc<Inner>,
}

struct Inner {
    repr: Repr,
    map: OnceCell<HeaderMap>,
}

enum Repr {
    Raw { block: Bytes, fields: Vec<FieldIndex> },
    Map(HeaderMap),
}

impl Header {
    pub(crate) fn from_raw(block: Bytes, fields: Vec<FieldIndex>) -> Self {
        Self { inner: Arc::new(Inner { repr: Repr::Raw { block, fields }, map: OnceCell::new() }) }
    }

    /// An empty header.
    #[must_use]
    pub fn empty() -> Self {
        Self::from(HeaderMap::new())
    }

    /// The first value of `key`, if present and valid UTF-8.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values(key).next()
    }

    /// Every value of `key`, in the order received.
    #[must_use]
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.values(key).collect()
    }

    /// Whether any value of `key`, split on commas, equals `token` ignoring ASCII case.
    ///
    /// ```
    /// use micro_fetch_http::protocol::Header;
    ///
    /// let mut map = http::HeaderMap::new();
    /// map.insert("connection", "keep-alive, Upgrade".parse().unwrap());
    /// let header = Header::from(map);
    ///
    /// assert!(header.contains_token("Connection", "upgrade"));
    /// assert!(!header.contains_token("Connection", "close"));
    /// ```
    #[must_use]
    pub fn contains_token(&self, key: &str, token: &str) -> bool {
        self.values(key).flat_map(|value| value.split(',')).any(|item| item.trim().eq_ignore_ascii_case(token))
    }

    /// Iterates over `(name, value)` pairs in the order received.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        match &self.inner.repr {
            Repr::Raw { block, fields } => Iter { kind: IterKind::Raw { block, fields: fields.iter() } },
            Repr::Map(map) => Iter { kind: IterKind::Map(map.iter()) },
        }
    }

    /// Number of fields, counting repeated names once per value.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.inner.repr {
            Repr::Raw { fields, .. } => fields.len(),
            Repr::Map(map) => map.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The fields as an [`http::HeaderMap`], built on first use.
    ///
    /// Raw fields whose name or value `http` refuses are left out.
    #[must_use]
    pub fn header_map(&self) -> &HeaderMap {
        match &self.inner.repr {
            Repr::Map(map) => map,
            Repr::Raw { block, fields } => self.inner.map.get_or_init(|| {
                let mut map = HeaderMap::with_capacity(fields.len());
                for field in fields {
                    let Ok(name) = HeaderName::from_bytes(&block[field.name.clone()]) else {
                        continue;
                    };
                    let Ok(value) = HeaderValue::from_maybe_shared(block.slice(field.value.clone())) else {
                        continue;
                    };
                    map.append(name, value);
                }
                map
            }),
        }
    }

    fn values<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a str> {
        self.iter()
            .filter(move |(name, _)| name.eq_ignore_ascii_case(key))
            .filter_map(|(_, value)| std::str::from_utf8(value).ok())
    }
}

impl From<HeaderMap> for Header {
    fn from(map: HeaderMap) -> Self {
        Self { inner: Arc::new(Inner { repr: Repr::Map(map), map: OnceCell::new() }) }
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter().map(|(name, value)| (name, String::from_utf8_lossy(value)))).finish()
    }
}

impl<'a> IntoIterator for &'a Header {
    type Item = (&'a str, &'a [u8]);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the fields of a [`Header`].
pub struct Iter<'a> {
    kind: IterKind<'a>,
}

enum IterKind<'a> {
    Raw { block: &'a Bytes, fields: std::slice::Iter<'a, FieldIndex> },
    Map(http::header::Iter<'a, HeaderValue>),
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.kind {
            IterKind::Raw { block, fields } => {
                let block: &'a Bytes = *block;
                let field = fields.next()?;
                // httparse only hands out token characters for names
                let name = std::str::from_utf8(&block[field.name.clone()]).unwrap_or_default();
                Some((name, &block[field.value.clone()]))
            }
            IterKind::Map(iter) => iter.next().map(|(name, value)| (name.as_str(), value.as_bytes())),
        }
    }
}

impl fmt::Debug for Iter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").finish_non_exhaustive()
    }
}
