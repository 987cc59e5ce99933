use std::collections::BTreeSet;

use http_body_util::BodyExt;
use hyper::StatusCode;
use hyper::body::Incoming;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED};
use log::debug;
use log::info;

use crate::cache::InReleaseCache;
use crate::datetime::parse_http_datetime;
use crate::error::SnapshotError;
use crate::humanfmt::HumanFmt;
use crate::inrelease::{InRelease, SIGNED_MESSAGE_BEGIN};
use crate::upstream::UpstreamClient;

/// Acceptable size range of an `InRelease` body; by-hash entries outside it
/// (tiny `Release.gpg`-style files, huge `Packages` indexes) are discarded
/// without further inspection.
const PROBE_MIN_SIZE: u64 = 1024;
const PROBE_MAX_SIZE: u64 = 500 * 1024;

/// Fields every real `InRelease` carries.
const REQUIRED_KEYWORDS: [&str; 4] = ["Origin:", "Label:", "Suite:", "Acquire-By-Hash:"];

/// Discovers and selects the `InRelease` files of one (mirror, suite).
///
/// All memoisation goes through the shared cache; an index instance itself
/// is transient.
pub(crate) struct InReleaseIndex<'a> {
    mirror: String,
    suite: String,
    client: &'a UpstreamClient,
    cache: Option<&'a InReleaseCache>,
}

/// Extracts the set of all 64-character lowercase-hex substrings.
#[must_use]
fn extract_hash_tokens(listing: &str) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();

    let mut run_start = None;
    for (pos, c) in listing.char_indices().chain(std::iter::once((listing.len(), '\0'))) {
        let is_hex = c.is_ascii_digit() || ('a'..='f').contains(&c);

        match run_start {
            None if is_hex => run_start = Some(pos),
            Some(start) if !is_hex => {
                for chunk_start in (start..pos).step_by(64) {
                    if chunk_start + 64 > pos {
                        break;
                    }
                    tokens.insert(listing[chunk_start..chunk_start + 64].to_string());
                }
                run_start = None;
            }
            _ => {}
        }
    }

    tokens
}

/// Decodes a directory-listing body using the `charset=` parameter of its
/// `Content-Type`, defaulting to UTF-8.
#[must_use]
fn decode_listing(bytes: &[u8], content_type: Option<&str>) -> String {
    let charset = content_type
        .and_then(|ct| {
            ct.split(';')
                .find_map(|param| param.trim().strip_prefix("charset="))
        })
        .map(|cs| cs.trim_matches('"').to_ascii_lowercase());

    match charset.as_deref() {
        Some("iso-8859-1" | "latin-1" | "latin1") => {
            bytes.iter().map(|&b| char::from(b)).collect()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Reads a probe body up to `limit` bytes; [None] when the stream exceeds it.
async fn read_body_limited(body: Incoming, limit: u64) -> Result<Option<Vec<u8>>, SnapshotError> {
    let mut body = body;
    let mut buf = Vec::new();

    while let Some(frame) = body.frame().await {
        let frame = frame?;
        if let Some(data) = frame.data_ref() {
            if buf.len() as u64 + data.len() as u64 > limit {
                return Ok(None);
            }
            buf.extend_from_slice(data);
        }
    }

    Ok(Some(buf))
}

/// Applies the cheap `InRelease` shape heuristics to a probe body.
#[must_use]
fn looks_like_inrelease(data: &str) -> bool {
    data.starts_with(SIGNED_MESSAGE_BEGIN)
        && REQUIRED_KEYWORDS
            .iter()
            .all(|keyword| data.contains(keyword))
}

impl<'a> InReleaseIndex<'a> {
    #[must_use]
    pub(crate) fn new(
        client: &'a UpstreamClient,
        mirror: String,
        suite: String,
        cache: Option<&'a InReleaseCache>,
    ) -> Self {
        Self {
            mirror,
            suite,
            client,
            cache,
        }
    }

    #[must_use]
    fn by_hash_url(&self) -> String {
        format!("{}/dists/{}/by-hash/SHA256", self.mirror, self.suite)
    }

    /// Enumerates all `InRelease` candidates of the suite.
    ///
    /// Cached suites skip network discovery entirely; otherwise the by-hash
    /// directory listing is scraped and every unknown hash is probed once.
    pub(crate) async fn inrelease_files(&self) -> Result<Vec<InRelease>, SnapshotError> {
        if let Some(cache) = self.cache {
            let cached = cache.get_all(&self.mirror, &self.suite);
            if !cached.is_empty() {
                debug!(
                    "Using {} cached InRelease file(s) for {} {}",
                    cached.len(),
                    self.mirror,
                    self.suite
                );
                return Ok(cached);
            }
        }

        let listing_url = self.by_hash_url();
        let response = self.client.get(&listing_url).await?;

        if !response.status().is_success() {
            return Err(SnapshotError::index(format!(
                "Error fetching by-hash listing `{listing_url}`:  {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let bytes = response.into_body().collect().await?.to_bytes();
        let listing = decode_listing(&bytes, content_type.as_deref());

        let hashes = extract_hash_tokens(&listing);
        debug!(
            "By-hash listing `{listing_url}` contains {} candidate hash(es)",
            hashes.len()
        );

        let mut found = Vec::new();

        for hash in hashes {
            if let Some(hit) = self
                .cache
                .and_then(|cache| cache.get_one(&self.mirror, &self.suite, &hash))
            {
                found.push(hit);
                continue;
            }

            let Some(inrelease) = self.probe(&hash).await? else {
                continue;
            };

            info!(
                "Discovered InRelease {hash} for {} {} published {:?}",
                self.mirror,
                self.suite,
                inrelease.published()
            );

            if let Some(cache) = self.cache {
                cache.add(&inrelease);
            }

            found.push(inrelease);
        }

        Ok(found)
    }

    /// Fetches one by-hash object and decides whether it is an `InRelease`.
    ///
    /// 404 responses are skipped silently so stale directory listings do not
    /// break enumeration; any other HTTP error aborts discovery.
    async fn probe(&self, hash: &str) -> Result<Option<InRelease>, SnapshotError> {
        let url = format!("{}/{hash}", self.by_hash_url());

        let response = self.client.get(&url).await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!("Skipping vanished by-hash object `{url}`");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SnapshotError::index(format!(
                "Error probing by-hash object `{url}`:  {status}"
            )));
        }

        if let Some(length) = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
        {
            if !(PROBE_MIN_SIZE..=PROBE_MAX_SIZE).contains(&length) {
                debug!(
                    "Skipping by-hash object `{url}` of size {}",
                    HumanFmt::Size(length)
                );
                return Ok(None);
            }
        }

        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_http_datetime);

        let Some(body) = read_body_limited(response.into_body(), PROBE_MAX_SIZE + 1).await? else {
            debug!("Skipping oversized by-hash object `{url}`");
            return Ok(None);
        };

        if (body.len() as u64) < PROBE_MIN_SIZE || (body.len() as u64) > PROBE_MAX_SIZE {
            debug!(
                "Skipping by-hash object `{url}` of size {}",
                HumanFmt::Size(body.len() as u64)
            );
            return Ok(None);
        }

        let Ok(data) = String::from_utf8(body) else {
            debug!("Skipping non-UTF-8 by-hash object `{url}`");
            return Ok(None);
        };

        if !looks_like_inrelease(&data) {
            debug!("Skipping non-InRelease by-hash object `{url}`");
            return Ok(None);
        }

        Ok(Some(InRelease::new(
            self.mirror.clone(),
            self.suite.clone(),
            data,
            Some(hash.to_string()),
            last_modified,
        )))
    }

    /// Returns the candidate with the greatest `published` not exceeding
    /// the cutoff, or [None]. Candidates without a usable timestamp never
    /// participate; ties keep the first-seen candidate.
    pub(crate) async fn get_inrelease_for_timestamp(
        &self,
        cutoff: i64,
    ) -> Result<Option<InRelease>, SnapshotError> {
        Ok(select_for_timestamp(self.inrelease_files().await?, cutoff))
    }
}

/// Selects the candidate with the greatest `published` not exceeding the
/// cutoff from an already-materialised list.
#[must_use]
pub(crate) fn select_for_timestamp(
    candidates: Vec<InRelease>,
    cutoff: i64,
) -> Option<InRelease> {
    let mut best: Option<InRelease> = None;

    for candidate in candidates {
        let Some(published) = candidate.published() else {
            continue;
        };
        if published > cutoff {
            continue;
        }

        let better = match best.as_ref().and_then(InRelease::published) {
            Some(current) => published > current,
            None => true,
        };
        if better {
            best = Some(candidate);
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inrelease::tests::sample_inrelease_data;

    #[test]
    fn extract_hash_tokens_test() {
        let a = "a".repeat(64);
        let b = format!("0123456789abcdef{}", "f".repeat(48));

        let listing = format!(
            "<html><a href=\"{a}\">{a}</a>\n<a href=\"{b}\">{b}</a>\nreadme.txt</html>"
        );
        let tokens = extract_hash_tokens(&listing);
        assert_eq!(tokens.len(), 2);
        assert!(tokens.contains(&a));
        assert!(tokens.contains(&b));

        /* too short, too long is chunked, uppercase is no hash */
        assert!(extract_hash_tokens(&"a".repeat(63)).is_empty());
        assert_eq!(extract_hash_tokens(&"b".repeat(130)).len(), 1);
        assert!(extract_hash_tokens(&"A".repeat(64)).is_empty());
        assert!(extract_hash_tokens("zz").is_empty());
    }

    #[test]
    fn decode_listing_test() {
        assert_eq!(decode_listing(b"abc", None), "abc");
        assert_eq!(decode_listing(b"abc", Some("text/html")), "abc");
        assert_eq!(
            decode_listing(b"abc", Some("text/html; charset=utf-8")),
            "abc"
        );
        assert_eq!(
            decode_listing(&[0x61, 0xe4, 0x62], Some("text/html; charset=ISO-8859-1")),
            "a\u{e4}b"
        );
        /* invalid UTF-8 degrades instead of failing */
        assert_eq!(
            decode_listing(&[0x61, 0xff, 0x62], None),
            "a\u{fffd}b"
        );
    }

    #[test]
    fn looks_like_inrelease_test() {
        /* valid */
        assert!(looks_like_inrelease(&sample_inrelease_data(
            "Tue, 14 Nov 2023 22:13:20 UTC"
        )));

        /* invalid */
        assert!(!looks_like_inrelease("Origin: Ubuntu\nLabel: Ubuntu\n"));
        let unsigned = sample_inrelease_data("Tue, 14 Nov 2023 22:13:20 UTC")
            .replace("-----BEGIN PGP SIGNED MESSAGE-----\n", "");
        assert!(!looks_like_inrelease(&unsigned));
        let no_by_hash = sample_inrelease_data("Tue, 14 Nov 2023 22:13:20 UTC")
            .replace("Acquire-By-Hash: yes\n", "");
        assert!(!looks_like_inrelease(&no_by_hash));
    }

    fn candidate(published: Option<i64>, tag: &str) -> InRelease {
        InRelease::new(
            "http://a.example/ubuntu".to_string(),
            "jammy".to_string(),
            format!("data-{tag}"),
            Some(tag.to_string()),
            published,
        )
    }

    #[test]
    fn select_for_timestamp_test() {
        let candidates = || {
            vec![
                candidate(Some(1_700_000_000), "first"),
                candidate(Some(1_700_086_400), "second"),
                candidate(None, "untimed"),
            ]
        };

        /* cutoff between the two published instants */
        let selected = select_for_timestamp(candidates(), 1_700_050_000).unwrap();
        assert_eq!(selected.hash(), "first");

        /* cutoff after both */
        let selected = select_for_timestamp(candidates(), 1_700_100_000).unwrap();
        assert_eq!(selected.hash(), "second");

        /* exact match is included */
        let selected = select_for_timestamp(candidates(), 1_700_000_000).unwrap();
        assert_eq!(selected.hash(), "first");

        /* cutoff before all */
        assert!(select_for_timestamp(candidates(), 1_600_000_000).is_none());

        /* only untimed candidates */
        assert!(select_for_timestamp(vec![candidate(None, "untimed")], 1_700_000_000).is_none());
    }
}
