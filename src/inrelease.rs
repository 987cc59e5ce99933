use std::collections::HashMap;
use std::sync::OnceLock;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

use crate::datetime::{format_http_datetime, parse_date_field, parse_http_datetime};

pub(crate) const SIGNED_MESSAGE_BEGIN: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
const SIGNATURE_BEGIN: &str = "-----BEGIN PGP SIGNATURE-----";
const SIGNATURE_END: &str = "-----END PGP SIGNATURE-----";

/// A single `InRelease` file published by a suite of an APT archive.
///
/// Immutable after construction. `published` is [None] when neither an
/// HTTP `Last-Modified` value nor a parsable `Date:` field was available;
/// such an instance cannot participate in snapshot selection.
#[derive(Debug)]
pub(crate) struct InRelease {
    mirror: String,
    suite: String,
    data: String,
    hash: String,
    published: Option<i64>,
    resources: OnceLock<HashMap<String, String>>,
}

/// The serialised form stored in the cache file.
///
/// `published` is kept as an RFC-1123-style GMT string for human readability.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub(crate) struct CacheEntry {
    pub(crate) mirror: String,
    pub(crate) suite: String,
    pub(crate) hash: String,
    pub(crate) published: String,
    pub(crate) data: String,
}

#[must_use]
pub(crate) fn sha256_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// Splits a clearsigned message into its content and its ASCII-armored
/// signature, tolerating both CRLF and LF line endings.
#[must_use]
pub(crate) fn split_signed_message(data: &str) -> (String, String) {
    enum Part {
        Head,
        Content,
        Signature,
        Tail,
    }

    let mut content = String::new();
    let mut signature = String::new();
    let mut part = Part::Head;

    for raw in data.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        match part {
            Part::Head => {
                if line == SIGNED_MESSAGE_BEGIN {
                    part = Part::Content;
                }
            }
            Part::Content => {
                if line == SIGNATURE_BEGIN {
                    part = Part::Signature;
                } else {
                    content.push_str(line);
                    content.push('\n');
                }
            }
            Part::Signature => {
                if line == SIGNATURE_END {
                    part = Part::Tail;
                } else {
                    signature.push_str(line);
                    signature.push('\n');
                }
            }
            Part::Tail => break,
        }
    }

    (content, signature)
}

/// Parses a checksum line of the form ` <64-hex> <decimal-size> <path>`.
#[must_use]
fn parse_checksum_line(line: &str) -> Option<(&str, &str)> {
    if !line.starts_with(|c: char| c.is_ascii_whitespace()) {
        return None;
    }

    let mut fields = line.split_ascii_whitespace();

    let hash = fields.next()?;
    if hash.len() != 64 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    let size = fields.next()?;
    if !size.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let path = fields.next()?;

    if fields.next().is_some() {
        return None;
    }

    Some((hash, path))
}

impl InRelease {
    /// Constructs an instance from the full clearsigned text.
    ///
    /// A missing `hash` is computed over the UTF-8 encoding of `data`. A
    /// missing `last_modified` falls back to the first `Date:` field inside
    /// the signed body.
    #[must_use]
    pub(crate) fn new(
        mirror: String,
        suite: String,
        data: String,
        hash: Option<String>,
        last_modified: Option<i64>,
    ) -> Self {
        let hash = hash.unwrap_or_else(|| sha256_hex(&data));
        let published = last_modified.or_else(|| {
            data.lines()
                .find_map(|line| line.strip_prefix("Date:"))
                .and_then(parse_date_field)
        });

        Self {
            mirror,
            suite,
            data,
            hash,
            published,
            resources: OnceLock::new(),
        }
    }

    /// Reconstructs an instance from its cache form.
    ///
    /// The stored hash and publication timestamp win over rederivation from
    /// `data`, keeping cached entries stable.
    #[must_use]
    pub(crate) fn from_cache_entry(entry: CacheEntry) -> Self {
        let published = parse_http_datetime(&entry.published);

        Self {
            mirror: entry.mirror,
            suite: entry.suite,
            data: entry.data,
            hash: entry.hash,
            published,
            resources: OnceLock::new(),
        }
    }

    /// Produces the cache form, or [None] for an instance without a usable
    /// publication timestamp.
    #[must_use]
    pub(crate) fn to_cache_entry(&self) -> Option<CacheEntry> {
        Some(CacheEntry {
            mirror: self.mirror.clone(),
            suite: self.suite.clone(),
            hash: self.hash.clone(),
            published: format_http_datetime(self.published?),
            data: self.data.clone(),
        })
    }

    #[must_use]
    pub(crate) fn mirror(&self) -> &str {
        &self.mirror
    }

    #[must_use]
    pub(crate) fn suite(&self) -> &str {
        &self.suite
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) fn data(&self) -> &str {
        &self.data
    }

    #[must_use]
    pub(crate) fn hash(&self) -> &str {
        &self.hash
    }

    #[must_use]
    pub(crate) fn published(&self) -> Option<i64> {
        self.published
    }

    /// Looks up the SHA-256 hash listed for a resource path, e.g.
    /// `main/binary-amd64/Packages.gz`.
    #[must_use]
    pub(crate) fn get_hash_for(&self, path: &str) -> Option<&str> {
        self.resources().get(path).map(String::as_str)
    }

    fn resources(&self) -> &HashMap<String, String> {
        self.resources.get_or_init(|| {
            let (content, _signature) = split_signed_message(&self.data);

            let mut map = HashMap::new();
            for line in content.lines() {
                if let Some((hash, path)) = parse_checksum_line(line) {
                    map.insert(path.to_owned(), hash.to_owned());
                }
            }

            map
        })
    }
}
