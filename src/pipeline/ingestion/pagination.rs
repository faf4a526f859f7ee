//! Link-header pagination.
//!
//! The audit-log API advertises neighbouring pages in a `Link` header such as
//!
//! ```text
//! <https://api.github.com/enterprises/acme/audit-log?after=XYZ&before=>; rel="next",
//! <https://api.github.com/enterprises/acme/audit-log?after=&before=ABC>; rel="prev"
//! ```
//!
//! The forward cursor is the `after` parameter of the `next` link and the
//! backward cursor is the `before` parameter of the `prev` link. A malformed
//! entry contributes nothing instead of failing the whole header.

use crate::types::{Cursor, PageLinks};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use tracing::debug;

static REL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"rel\s*=\s*"?([A-Za-z]+)"?"#).expect("valid rel regex"));

/// Parses a `Link` header value into backward and forward cursors.
pub fn parse_link_header(value: &str) -> PageLinks {
    let mut links = PageLinks::default();

    for entry in value.split(',') {
        let Some(rel) = relation(entry) else {
            continue;
        };
        match rel {
            "next" => {
                if let Some(after) = query_param(entry, "after") {
                    links.after = Cursor::new(after);
                }
            }
            "prev" => {
                if let Some(before) = query_param(entry, "before") {
                    links.before = Cursor::new(before);
                }
            }
            _ => {}
        }
    }

    links
}

fn relation(entry: &str) -> Option<&str> {
    REL.captures(entry)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// URL between `<` and `>`; entries without one (or without a scheme) yield nothing.
fn extract_url(entry: &str) -> Option<&str> {
    let start = entry.find('<')? + 1;
    let rest = &entry[start..];
    let end = rest.find('>')?;
    let url = rest[..end].trim();
    url.contains("://").then_some(url)
}

fn query_param(entry: &str, key: &str) -> Option<String> {
    let raw = extract_url(entry)?;
    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(e) => {
            debug!(entry = %entry.trim(), error = %e, "Skipping unparsable pagination link");
            return None;
        }
    };
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}
