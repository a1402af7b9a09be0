//! Lenient tag scanning for loosely-specified portal XML.
//!
//! Lookups are first-match-wins and namespace-prefix agnostic. A missing
//! tag is an empty string, never an error.

use regex::Regex;
use std::borrow::Cow;

fn element_pattern(tag: &str) -> Option<Regex> {
    let tag = regex::escape(tag);
    Regex::new(&format!(
        r"(?s)<(?:[A-Za-z_][\w.\-]*:)?{tag}(?:\s[^>]*)?>(.*?)</(?:[A-Za-z_][\w.\-]*:)?{tag}\s*>"
    ))
    .ok()
}

/// Raw inner content of the first `<tag>` element.
pub fn section<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let pattern = element_pattern(tag)?;
    pattern
        .captures(xml)
        .and_then(|captures| captures.get(1))
        .map(|inner| inner.as_str())
}

/// Trimmed, entity-decoded text of the first `<tag>` element, or `""`.
pub fn text(xml: &str, tag: &str) -> String {
    section(xml, tag)
        .map(|inner| decode_entities(strip_cdata(inner.trim())).trim().to_string())
        .unwrap_or_default()
}

/// Text of the first listed tag that is present and non-empty.
pub fn first_text(xml: &str, tags: &[&str]) -> String {
    tags.iter()
        .map(|tag| text(xml, tag))
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

/// Value of `attr` on the first opening `<tag ...>`.
pub fn attribute(xml: &str, tag: &str, attr: &str) -> Option<String> {
    let pattern = Regex::new(&format!(
        r#"<(?:[A-Za-z_][\w.\-]*:)?{}\s[^>]*?\b{}\s*=\s*["']([^"']*)["']"#,
        regex::escape(tag),
        regex::escape(attr)
    ))
    .ok()?;
    pattern
        .captures(xml)
        .and_then(|captures| captures.get(1))
        .map(|value| decode_entities(value.as_str()).into_owned())
}

fn strip_cdata(value: &str) -> &str {
    value
        .strip_prefix("<![CDATA[")
        .and_then(|rest| rest.strip_suffix("]]>"))
        .unwrap_or(value)
}

/// Decode the five predefined XML entities plus numeric references.
pub fn decode_entities(value: &str) -> Cow<'_, str> {
    if !value.contains('&') {
        return Cow::Borrowed(value);
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return Cow::Owned(out);
        };

        let entity = &tail[1..semi];
        let decoded = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };

        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}
