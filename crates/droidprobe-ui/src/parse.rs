//! Parser for uiautomator hierarchy dumps.
//!
//! The dump is a flat stream of `<node .../>` tags nested under a single
//! `<hierarchy>` root. Only the attributes the engine matches on are kept;
//! nesting is flattened into document order.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

use crate::types::{Bounds, UiElement};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("hierarchy dump has no <hierarchy> root")]
    MissingRoot,

    #[error("invalid bounds attribute: {value}")]
    InvalidBounds { value: String },
}

fn node_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<node\b([^>]*)>").expect("node pattern"))
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"([\w:-]+)="([^"]*)""#).expect("attribute pattern"))
}

fn bounds_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]$").expect("bounds pattern")
    })
}

/// Parse a raw hierarchy dump into its elements, in document order.
pub fn parse_hierarchy(xml: &str) -> Result<Vec<UiElement>, ParseError> {
    Ok(parse_hierarchy_spans(xml)?
        .into_iter()
        .map(|(_, element)| element)
        .collect())
}

/// Like [`parse_hierarchy`], paired with the byte range of each element's
/// `<node>` tag in `xml`.
pub fn parse_hierarchy_spans(xml: &str) -> Result<Vec<(Range<usize>, UiElement)>, ParseError> {
    if !xml.contains("<hierarchy") {
        return Err(ParseError::MissingRoot);
    }

    node_re()
        .captures_iter(xml)
        .map(|caps| {
            let span = caps.get(0).map_or(0..0, |m| m.range());
            let attrs = parse_attributes(&caps[1]);
            element_from_attributes(&attrs).map(|element| (span, element))
        })
        .collect()
}

fn parse_attributes(raw: &str) -> HashMap<&str, String> {
    attr_re()
        .captures_iter(raw)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str();
            let value = caps.get(2)?.as_str();
            Some((name, decode_entities(value)))
        })
        .collect()
}

fn element_from_attributes(attrs: &HashMap<&str, String>) -> Result<UiElement, ParseError> {
    let get = |name: &str| attrs.get(name).cloned().unwrap_or_default();

    let bounds = match attrs.get("bounds") {
        Some(value) => parse_bounds(value)?,
        None => Bounds::default(),
    };

    Ok(UiElement {
        class_name: get("class"),
        resource_id: get("resource-id"),
        text: get("text"),
        content_desc: get("content-desc"),
        package: get("package"),
        clickable: attrs.get("clickable").map(|v| v == "true").unwrap_or(false),
        bounds,
    })
}

/// Parse a `[left,top][right,bottom]` bounds attribute.
pub fn parse_bounds(value: &str) -> Result<Bounds, ParseError> {
    let invalid = || ParseError::InvalidBounds {
        value: value.to_string(),
    };
    let caps = bounds_re().captures(value.trim()).ok_or_else(invalid)?;
    let coord = |i: usize| caps[i].parse::<i32>().map_err(|_| invalid());
    Ok(Bounds::new(coord(1)?, coord(2)?, coord(3)?, coord(4)?))
}

/// Decode the five predefined XML entities and numeric character references.
/// Unknown entities are left as-is.
fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
