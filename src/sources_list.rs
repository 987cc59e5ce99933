/// A `deb`/`deb-src` line split into its parts, with byte offsets kept so a
/// rewrite can leave everything but the option bracket untouched.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct SourceLine<'a> {
    pub(crate) repo_type: &'a str,
    /// The text inside `[...]`, without the brackets.
    pub(crate) options: Option<&'a str>,
    pub(crate) mirror: &'a str,
    pub(crate) suite: &'a str,
    pub(crate) components: Vec<&'a str>,
    /// Byte range in the original line that an option bracket occupies, or
    /// the position where one would be inserted.
    bracket: BracketSpan,
}

#[derive(Debug, PartialEq, Eq)]
enum BracketSpan {
    Existing(std::ops::Range<usize>),
    InsertAt(usize),
}

const SUPPORTED_SCHEMES: [&str; 3] = ["http", "https", "ftp"];

/// Parses one `sources.list` line of the form
/// `<type> [<options>]? <mirror> <suite> <components...>`.
///
/// Lines of any other shape (comments, blanks, unsupported schemes) yield
/// [None] and must be passed through unchanged.
#[must_use]
pub(crate) fn parse_source_line(line: &str) -> Option<SourceLine<'_>> {
    let mut pos = line.len() - line.trim_start().len();

    let repo_type = next_token(line, &mut pos)?;
    if repo_type != "deb" && repo_type != "deb-src" {
        return None;
    }

    skip_spaces(line, &mut pos);

    let (options, bracket) = if line[pos..].starts_with('[') {
        let close = line[pos..].find(']')?;
        let span = pos..pos + close + 1;
        let inner = &line[pos + 1..pos + close];
        pos += close + 1;
        (Some(inner), BracketSpan::Existing(span))
    } else {
        (None, BracketSpan::InsertAt(pos))
    };

    let mirror = next_token(line, &mut pos)?;
    let scheme = mirror.split_once("://").map(|(scheme, _)| scheme)?;
    if !SUPPORTED_SCHEMES.contains(&scheme) {
        return None;
    }

    let suite = next_token(line, &mut pos)?;

    let mut components = Vec::new();
    while let Some(component) = next_token(line, &mut pos) {
        components.push(component);
    }
    if components.is_empty() {
        return None;
    }

    Some(SourceLine {
        repo_type,
        options,
        mirror,
        suite,
        components,
        bracket,
    })
}

#[must_use]
fn next_token<'a>(line: &'a str, pos: &mut usize) -> Option<&'a str> {
    skip_spaces(line, pos);

    let rest = &line[*pos..];
    if rest.is_empty() {
        return None;
    }

    let end = rest
        .find(|c: char| c.is_ascii_whitespace())
        .unwrap_or(rest.len());
    let token = &rest[..end];
    *pos += end;

    Some(token)
}

fn skip_spaces(line: &str, pos: &mut usize) {
    let rest = &line[*pos..];
    let trimmed = rest.trim_start();
    *pos += rest.len() - trimmed.len();
}

/// Merges `by-hash=yes` and `inrelease-path=by-hash/SHA256/<hash>` into an
/// option bracket, replacing stale values and preserving unrelated options
/// in their original order.
#[must_use]
fn merge_options(existing: Option<&str>, hash: &str) -> String {
    let inrelease_path = format!("inrelease-path=by-hash/SHA256/{hash}");

    let mut merged: Vec<String> = Vec::new();
    let mut have_by_hash = false;
    let mut have_inrelease_path = false;

    for option in existing.unwrap_or("").split_ascii_whitespace() {
        if option.starts_with("by-hash=") {
            merged.push("by-hash=yes".to_string());
            have_by_hash = true;
        } else if option.starts_with("inrelease-path=") {
            merged.push(inrelease_path.clone());
            have_inrelease_path = true;
        } else {
            merged.push(option.to_string());
        }
    }

    if !have_by_hash {
        merged.push("by-hash=yes".to_string());
    }
    if !have_inrelease_path {
        merged.push(inrelease_path);
    }

    merged.join(" ")
}

/// Re-emits a parsed line with the snapshot options injected. Everything
/// outside the option bracket is preserved byte-for-byte.
#[must_use]
pub(crate) fn inject_inrelease_path(line: &str, parsed: &SourceLine<'_>, hash: &str) -> String {
    let options = merge_options(parsed.options, hash);

    match &parsed.bracket {
        BracketSpan::Existing(span) => {
            format!("{}[{options}]{}", &line[..span.start], &line[span.end..])
        }
        BracketSpan::InsertAt(pos) => {
            format!("{}[{options}] {}", &line[..*pos], &line[*pos..])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH2: &str = "9b0b4dab764ee1e807cf4c8ab1f1bc9112a9a4e00e4c3c1312e12d253ba30a8e";

    #[test]
    fn parse_source_line_test() {
        /* valid */

        let parsed = parse_source_line("deb http://a.example/ubuntu jammy main").unwrap();
        assert_eq!(parsed.repo_type, "deb");
        assert_eq!(parsed.options, None);
        assert_eq!(parsed.mirror, "http://a.example/ubuntu");
        assert_eq!(parsed.suite, "jammy");
        assert_eq!(parsed.components, vec!["main"]);

        let parsed = parse_source_line(
            "deb-src [arch=amd64 trusted=yes] https://a.example/ubuntu jammy-updates main universe",
        )
        .unwrap();
        assert_eq!(parsed.repo_type, "deb-src");
        assert_eq!(parsed.options, Some("arch=amd64 trusted=yes"));
        assert_eq!(parsed.suite, "jammy-updates");
        assert_eq!(parsed.components, vec!["main", "universe"]);

        let parsed = parse_source_line("  deb ftp://a.example/debian sid main").unwrap();
        assert_eq!(parsed.mirror, "ftp://a.example/debian");

        /* invalid */

        assert_eq!(parse_source_line(""), None);
        assert_eq!(parse_source_line("# deb http://a.example/ubuntu jammy main"), None);
        assert_eq!(parse_source_line("deb-bin http://a.example/ubuntu jammy main"), None);
        assert_eq!(parse_source_line("deb file:/var/mirror jammy main"), None);
        assert_eq!(parse_source_line("deb cdrom://disc jammy main"), None);
        assert_eq!(parse_source_line("deb http://a.example/ubuntu jammy"), None);
        assert_eq!(parse_source_line("deb http://a.example/ubuntu"), None);
        assert_eq!(parse_source_line("deb [opts http://a.example/ubuntu jammy main"), None);
    }

    #[test]
    fn inject_without_bracket_test() {
        let line = "deb http://a.example/ubuntu jammy main";
        let parsed = parse_source_line(line).unwrap();

        assert_eq!(
            inject_inrelease_path(line, &parsed, HASH2),
            format!(
                "deb [by-hash=yes inrelease-path=by-hash/SHA256/{HASH2}] \
                 http://a.example/ubuntu jammy main"
            )
        );
    }

    #[test]
    fn inject_preserves_unrelated_options_test() {
        let line = "deb [arch=amd64] http://a.example/ubuntu jammy main restricted";
        let parsed = parse_source_line(line).unwrap();

        assert_eq!(
            inject_inrelease_path(line, &parsed, HASH2),
            format!(
                "deb [arch=amd64 by-hash=yes inrelease-path=by-hash/SHA256/{HASH2}] \
                 http://a.example/ubuntu jammy main restricted"
            )
        );
    }

    #[test]
    fn inject_preserves_spacing_test() {
        let line = "deb   http://a.example/ubuntu   jammy   main";
        let parsed = parse_source_line(line).unwrap();

        assert_eq!(
            inject_inrelease_path(line, &parsed, HASH2),
            format!(
                "deb   [by-hash=yes inrelease-path=by-hash/SHA256/{HASH2}] \
                 http://a.example/ubuntu   jammy   main"
            )
        );
    }

    #[test]
    fn inject_is_idempotent_test() {
        let line = "deb [arch=amd64] http://a.example/ubuntu jammy main";
        let parsed = parse_source_line(line).unwrap();

        let once = inject_inrelease_path(line, &parsed, HASH2);
        let parsed_again = parse_source_line(&once).unwrap();
        let twice = inject_inrelease_path(&once, &parsed_again, HASH2);
        assert_eq!(once, twice);
    }

    #[test]
    fn inject_replaces_stale_values_test() {
        let stale = "0000000000000000000000000000000000000000000000000000000000000000";
        let line = format!(
            "deb [by-hash=no inrelease-path=by-hash/SHA256/{stale} arch=amd64] \
             http://a.example/ubuntu jammy main"
        );
        let parsed = parse_source_line(&line).unwrap();

        assert_eq!(
            inject_inrelease_path(&line, &parsed, HASH2),
            format!(
                "deb [by-hash=yes inrelease-path=by-hash/SHA256/{HASH2} arch=amd64] \
                 http://a.example/ubuntu jammy main"
            )
        );
    }
}
