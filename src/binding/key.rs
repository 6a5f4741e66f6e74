//! Selector keys - `selector [@attribute | :property]`
//!
//! A mapping key names the nodes to bind and what to write on them:
//! - `h1` -> content of every `h1`
//! - `a@href` -> the `href` attribute of every `a`
//! - `span:model` -> the `model` property of every `span`
//! - `.`, `""`, `@style`, `:value` -> the node being visited itself
//!
//! The suffix is the rightmost `@`, `:` or `&` outside `[...]` brackets and
//! quotes (`&` is accepted as a legacy spelling of `:`). Keys are parsed
//! once, when a mapping is built, so bind never re-parses a key.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::dom::Selector;
use crate::error::{BindError, Result};

/// Names usable as attribute/property targets (anything else is a no-op write)
static TARGET_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.:-]*$").expect("valid regex"));

/// What a key writes on its matched nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Inner content (or structure, for mappings and sequences)
    Content,
    /// String-valued attribute
    Attribute,
    /// Typed property
    Property,
}

/// Where a key's selector points
#[derive(Debug, Clone, PartialEq)]
pub enum NodeTarget {
    /// The node being visited (`.` or empty selector)
    SelfNode,
    /// Descendants matching a selector
    Descendants(Selector),
}

/// Parsed mapping key
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorKey {
    raw: String,
    target: NodeTarget,
    kind: TargetKind,
    name: Option<String>,
}

impl SelectorKey {
    /// Parse a raw key
    ///
    /// Fails only when the selector part is not a valid selector; unusable
    /// target names are kept and turn into no-op writes at bind time.
    pub fn parse(raw: &str) -> Result<Self> {
        let (selector, kind, name) = match find_suffix(raw) {
            Some((pos, sep)) => {
                let kind = if sep == '@' {
                    TargetKind::Attribute
                } else {
                    TargetKind::Property
                };
                (&raw[..pos], kind, Some(raw[pos + 1..].trim().to_string()))
            }
            None => (raw, TargetKind::Content, None),
        };

        let selector = selector.trim();
        let target = if selector.is_empty() || selector == "." {
            NodeTarget::SelfNode
        } else {
            let parsed = Selector::parse(selector).map_err(|e| BindError::InvalidKey {
                key: raw.to_string(),
                details: e.to_string(),
            })?;
            NodeTarget::Descendants(parsed)
        };

        Ok(Self {
            raw: raw.to_string(),
            target,
            kind,
            name,
        })
    }

    /// The key as written
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn target(&self) -> &NodeTarget {
        &self.target
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// Attribute/property name, if the key has a suffix
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name usable for a write, `None` when empty or malformed
    pub fn usable_name(&self) -> Option<&str> {
        self.name().filter(|n| is_target_name(n))
    }

    pub fn is_self(&self) -> bool {
        matches!(self.target, NodeTarget::SelfNode)
    }
}

impl fmt::Display for SelectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Check a name against the attribute/property name grammar
pub(crate) fn is_target_name(name: &str) -> bool {
    TARGET_NAME_RE.is_match(name)
}

/// Find the rightmost suffix separator outside brackets and quotes
fn find_suffix(raw: &str) -> Option<(usize, char)> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escape_next = false;
    let mut found = None;

    for (i, ch) in raw.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match (quote, ch) {
            (_, '\\') => escape_next = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') if depth > 0 => quote = Some(ch),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, '@' | ':' | '&') if depth == 0 => found = Some((i, ch)),
            _ => {}
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_key() {
        let key = SelectorKey::parse("ul > li").unwrap();
        assert_eq!(key.kind(), TargetKind::Content);
        assert!(key.name().is_none());
        assert!(!key.is_self());
        assert_eq!(key.raw(), "ul > li");
    }

    #[test]
    fn attribute_key() {
        let key = SelectorKey::parse("a.external@href").unwrap();
        assert_eq!(key.kind(), TargetKind::Attribute);
        assert_eq!(key.name(), Some("href"));
        match key.target() {
            NodeTarget::Descendants(sel) => assert_eq!(sel.as_str(), "a.external"),
            NodeTarget::SelfNode => panic!("expected descendants"),
        }
    }

    #[test]
    fn property_key_and_legacy_ampersand() {
        let colon = SelectorKey::parse("span:model").unwrap();
        let amp = SelectorKey::parse("span&model").unwrap();
        assert_eq!(colon.kind(), TargetKind::Property);
        assert_eq!(amp.kind(), TargetKind::Property);
        assert_eq!(amp.name(), Some("model"));
    }

    #[test]
    fn self_keys() {
        for raw in [".", "", "@style", ":value", ".@title", "  "] {
            let key = SelectorKey::parse(raw).unwrap();
            assert!(key.is_self(), "{raw:?}");
        }
        assert_eq!(SelectorKey::parse("@style").unwrap().name(), Some("style"));
    }

    #[test]
    fn rightmost_separator_wins() {
        let key = SelectorKey::parse("a@href@title").unwrap_err();
        // "a@href" is not a valid selector, so the key is rejected
        assert_eq!(key.code(), "BIND-011");

        let key = SelectorKey::parse("a:x@title").unwrap_err();
        assert_eq!(key.code(), "BIND-011");
    }

    #[test]
    fn separators_inside_brackets_are_ignored() {
        let key = SelectorKey::parse("a[href='http://x@y']@title").unwrap();
        assert_eq!(key.kind(), TargetKind::Attribute);
        assert_eq!(key.name(), Some("title"));

        let key = SelectorKey::parse("a[href=\"mailto:me\"]").unwrap();
        assert_eq!(key.kind(), TargetKind::Content);
    }

    #[test]
    fn malformed_names_are_kept_but_unusable() {
        let empty = SelectorKey::parse("div@").unwrap();
        assert_eq!(empty.name(), Some(""));
        assert!(empty.usable_name().is_none());

        let spaced = SelectorKey::parse("div@  bad name ").unwrap();
        assert!(spaced.usable_name().is_none());

        let ok = SelectorKey::parse("div@data-id").unwrap();
        assert_eq!(ok.usable_name(), Some("data-id"));
    }

    #[test]
    fn invalid_selector_is_an_error() {
        let err = SelectorKey::parse("ul >@class").unwrap_err();
        assert!(err.to_string().contains("ul >@class"));
    }
}
