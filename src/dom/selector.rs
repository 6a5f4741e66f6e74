//! CSS selector subset
//!
//! Supported:
//! - `*`, type (`div`), `#id`, `.class`
//! - attributes: `[a]`, `[a=v]`, `[a~=v]`, `[a|=v]`, `[a^=v]`, `[a$=v]`, `[a*=v]`
//! - combinators: descendant (whitespace), child `>`, next sibling `+`,
//!   subsequent sibling `~`
//! - selector lists joined by `,`
//!
//! Pseudo-classes are not part of the subset: in mapping keys `:` introduces
//! a property name.
//!
//! Matching works right to left against the full ancestor chain, so a query
//! scoped to a node can still match through that node's ancestors (DOM
//! `querySelectorAll` semantics).

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use smallvec::SmallVec;

use super::Node;
use crate::error::{BindError, Result};

/// Parsed selector list
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Complex>,
}

/// Compounds joined by combinators: `compounds[i] combinators[i] compounds[i + 1]`
#[derive(Debug, Clone, PartialEq)]
struct Complex {
    compounds: Vec<Compound>,
    combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
    NextSibling,
    SubsequentSibling,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    /// `None` for `*` or when the compound has no type part
    tag: Option<String>,
    ids: SmallVec<[String; 1]>,
    classes: SmallVec<[String; 2]>,
    attributes: SmallVec<[AttributeTest; 1]>,
}

#[derive(Debug, Clone, PartialEq)]
struct AttributeTest {
    name: String,
    test: Option<(AttributeOp, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttributeOp {
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Selector {
    /// Parse a selector list
    pub fn parse(source: &str) -> Result<Self> {
        let mut parser = SelectorParser {
            source,
            chars: source.char_indices().peekable(),
        };
        let alternatives = parser.selector_list()?;
        Ok(Self {
            source: source.trim().to_string(),
            alternatives,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Check if `node` matches any alternative of the list
    pub fn matches(&self, node: &Node) -> bool {
        node.is_element()
            && self
                .alternatives
                .iter()
                .any(|complex| complex.matches_at(node, complex.compounds.len() - 1))
    }
}

impl Complex {
    fn matches_at(&self, node: &Node, index: usize) -> bool {
        if !self.compounds[index].matches(node) {
            return false;
        }
        if index == 0 {
            return true;
        }
        match self.combinators[index - 1] {
            Combinator::Child => parent_element(node)
                .is_some_and(|parent| self.matches_at(&parent, index - 1)),
            Combinator::Descendant => {
                let mut ancestor = parent_element(node);
                while let Some(current) = ancestor {
                    if self.matches_at(&current, index - 1) {
                        return true;
                    }
                    ancestor = parent_element(&current);
                }
                false
            }
            Combinator::NextSibling => node
                .preceding_element_siblings()
                .first()
                .is_some_and(|prev| self.matches_at(prev, index - 1)),
            Combinator::SubsequentSibling => node
                .preceding_element_siblings()
                .iter()
                .any(|prev| self.matches_at(prev, index - 1)),
        }
    }
}

fn parent_element(node: &Node) -> Option<Node> {
    node.parent().filter(Node::is_element)
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.ids.is_empty()
            && self.classes.is_empty()
            && self.attributes.is_empty()
    }

    fn matches(&self, node: &Node) -> bool {
        if let Some(tag) = &self.tag {
            if !node.has_tag(tag) {
                return false;
            }
        }
        if !self
            .ids
            .iter()
            .all(|id| node.attribute("id").as_deref() == Some(id.as_str()))
        {
            return false;
        }
        if !self.classes.is_empty() {
            let class_attr = node.attribute("class").unwrap_or_default();
            if !self
                .classes
                .iter()
                .all(|wanted| class_attr.split_whitespace().any(|c| c == wanted))
            {
                return false;
            }
        }
        self.attributes.iter().all(|test| test.matches(node))
    }
}

impl AttributeTest {
    fn matches(&self, node: &Node) -> bool {
        let Some(actual) = node.attribute(&self.name) else {
            return false;
        };
        let Some((op, expected)) = &self.test else {
            return true;
        };
        let expected = expected.as_str();
        match op {
            AttributeOp::Equals => actual == expected,
            AttributeOp::Includes => actual.split_whitespace().any(|w| w == expected),
            AttributeOp::DashMatch => {
                actual == expected
                    || actual
                        .strip_prefix(expected)
                        .is_some_and(|rest| rest.starts_with('-'))
            }
            AttributeOp::Prefix => !expected.is_empty() && actual.starts_with(expected),
            AttributeOp::Suffix => !expected.is_empty() && actual.ends_with(expected),
            AttributeOp::Substring => !expected.is_empty() && actual.contains(expected),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

struct SelectorParser<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> SelectorParser<'a> {
    fn error(&mut self, details: impl Into<String>) -> BindError {
        let position = self
            .chars
            .peek()
            .map(|(i, _)| *i)
            .unwrap_or(self.source.len());
        BindError::InvalidSelector {
            selector: self.source.to_string(),
            position,
            details: details.into(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn skip_whitespace(&mut self) -> bool {
        let mut skipped = false;
        while self.peek().is_some_and(char::is_whitespace) {
            self.chars.next();
            skipped = true;
        }
        skipped
    }

    fn selector_list(&mut self) -> Result<Vec<Complex>> {
        let mut list = vec![self.complex()?];
        while self.peek() == Some(',') {
            self.chars.next();
            list.push(self.complex()?);
        }
        if self.peek().is_some() {
            return Err(self.error("unexpected character"));
        }
        Ok(list)
    }

    fn complex(&mut self) -> Result<Complex> {
        self.skip_whitespace();
        let mut compounds = vec![self.compound()?];
        let mut combinators = Vec::new();

        loop {
            let had_space = self.skip_whitespace();
            let combinator = match self.peek() {
                None | Some(',') => break,
                Some('>') => Combinator::Child,
                Some('+') => Combinator::NextSibling,
                Some('~') => Combinator::SubsequentSibling,
                Some(_) if had_space => Combinator::Descendant,
                Some(_) => return Err(self.error("unexpected character")),
            };
            if combinator != Combinator::Descendant {
                self.chars.next();
                self.skip_whitespace();
            }
            combinators.push(combinator);
            compounds.push(self.compound()?);
        }

        Ok(Complex {
            compounds,
            combinators,
        })
    }

    fn compound(&mut self) -> Result<Compound> {
        let mut compound = Compound::default();
        let mut universal = false;

        match self.peek() {
            Some('*') => {
                self.chars.next();
                universal = true;
            }
            Some(c) if is_ident_char(c) => {
                compound.tag = Some(self.ident()?.to_ascii_lowercase());
            }
            _ => {}
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.chars.next();
                    let id = self.ident()?;
                    compound.ids.push(id);
                }
                Some('.') => {
                    self.chars.next();
                    let class = self.ident()?;
                    compound.classes.push(class);
                }
                Some('[') => {
                    self.chars.next();
                    let test = self.attribute()?;
                    compound.attributes.push(test);
                }
                _ => break,
            }
        }

        if compound.is_empty() && !universal {
            return Err(self.error("expected a type, '#id', '.class' or '[attribute]'"));
        }
        Ok(compound)
    }

    fn ident(&mut self) -> Result<String> {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.chars.next();
                match self.chars.next() {
                    Some((_, escaped)) => ident.push(escaped),
                    None => return Err(self.error("dangling escape")),
                }
            } else if is_ident_char(c) {
                ident.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        if ident.is_empty() {
            return Err(self.error("expected an identifier"));
        }
        Ok(ident)
    }

    fn attribute(&mut self) -> Result<AttributeTest> {
        self.skip_whitespace();
        let name = self.ident()?.to_ascii_lowercase();
        self.skip_whitespace();

        let op = match self.peek() {
            Some(']') => {
                self.chars.next();
                return Ok(AttributeTest { name, test: None });
            }
            Some('=') => {
                self.chars.next();
                AttributeOp::Equals
            }
            Some(c @ ('~' | '|' | '^' | '$' | '*')) => {
                self.chars.next();
                if self.peek() != Some('=') {
                    return Err(self.error("expected '=' in attribute operator"));
                }
                self.chars.next();
                match c {
                    '~' => AttributeOp::Includes,
                    '|' => AttributeOp::DashMatch,
                    '^' => AttributeOp::Prefix,
                    '$' => AttributeOp::Suffix,
                    _ => AttributeOp::Substring,
                }
            }
            _ => return Err(self.error("expected ']' or an attribute operator")),
        };

        self.skip_whitespace();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.chars.next();
                let mut value = String::new();
                loop {
                    match self.chars.next() {
                        Some((_, c)) if c == quote => break,
                        Some((_, '\\')) => match self.chars.next() {
                            Some((_, escaped)) => value.push(escaped),
                            None => return Err(self.error("unterminated string")),
                        },
                        Some((_, c)) => value.push(c),
                        None => return Err(self.error("unterminated string")),
                    }
                }
                value
            }
            _ => self.ident()?,
        };

        self.skip_whitespace();
        if self.peek() != Some(']') {
            return Err(self.error("expected ']'"));
        }
        self.chars.next();
        Ok(AttributeTest {
            name,
            test: Some((op, value)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Node {
        Node::parse(
            "<main>\
               <ul id='fruits' class='list big'>\
                 <li class='a' data-k='x-1'>1</li>\
                 <li class='b'>2</li>\
                 <li class='a b' lang='en-US'>3</li>\
               </ul>\
               <p><span>s1</span></p>\
               <span>s2</span>\
             </main>",
        )
        .unwrap()
    }

    fn texts(root: &Node, selector: &str) -> Vec<String> {
        root.select(selector)
            .unwrap()
            .iter()
            .map(Node::text_content)
            .collect()
    }

    #[test]
    fn type_id_and_class() {
        let root = page();
        assert_eq!(texts(&root, "li"), vec!["1", "2", "3"]);
        assert_eq!(texts(&root, "li.a"), vec!["1", "3"]);
        assert_eq!(texts(&root, ".a.b"), vec!["3"]);
        assert_eq!(texts(&root, "#fruits > .b"), vec!["2", "3"]);
        assert_eq!(texts(&root, "ul.big.list li.b"), vec!["2", "3"]);
        assert_eq!(texts(&root, "*").len(), 7);
    }

    #[test]
    fn combinators() {
        let root = page();
        assert_eq!(texts(&root, "main > span"), vec!["s2"]);
        assert_eq!(texts(&root, "main span"), vec!["s1", "s2"]);
        assert_eq!(texts(&root, "li.a + li"), vec!["2"]);
        assert_eq!(texts(&root, "li.a ~ li"), vec!["2", "3"]);
        assert_eq!(texts(&root, "p + span"), vec!["s2"]);
    }

    #[test]
    fn attribute_operators() {
        let root = page();
        assert_eq!(texts(&root, "[data-k]"), vec!["1"]);
        assert_eq!(texts(&root, "[data-k='x-1']"), vec!["1"]);
        assert_eq!(texts(&root, "[data-k^=x]"), vec!["1"]);
        assert_eq!(texts(&root, "[data-k$=\"-1\"]"), vec!["1"]);
        assert_eq!(texts(&root, "[data-k*='-']"), vec!["1"]);
        assert_eq!(texts(&root, "[class~=b]"), vec!["2", "3"]);
        assert_eq!(texts(&root, "[lang|=en]"), vec!["3"]);
        assert!(texts(&root, "[data-k^='']").is_empty());
    }

    #[test]
    fn selector_lists_keep_document_order() {
        let root = page();
        assert_eq!(texts(&root, "span, li.b"), vec!["2", "3", "s1", "s2"]);
    }

    #[test]
    fn matching_sees_ancestors_outside_scope() {
        let root = page();
        let list = root.select_first("ul").unwrap().unwrap();
        assert_eq!(texts(&list, "main li.b"), vec!["2", "3"]);
    }

    #[test]
    fn invalid_selectors_report_position() {
        for bad in ["", "li >", "li,", "[x", "[x^y]", "a!b", "li..a", "#"] {
            let err = Selector::parse(bad).unwrap_err();
            assert_eq!(err.code(), "BIND-010", "{bad}");
        }
        match Selector::parse("li >").unwrap_err() {
            BindError::InvalidSelector { position, .. } => assert_eq!(position, 4),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn display_is_trimmed_source() {
        let selector = Selector::parse("  ul  li ").unwrap();
        assert_eq!(selector.to_string(), "ul  li");
        assert_eq!(selector.as_str(), "ul  li");
    }
}
