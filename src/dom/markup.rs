//! Lenient markup fragment parser and serializer
//!
//! Parsing never fails: unclosed elements are closed at end of input, stray
//! end tags are dropped, and a `<` that does not start a tag is kept as text.
//! Only the small entity set used by templates is decoded.

use super::Node;

/// Elements that never have children or an end tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements whose content is kept verbatim
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Elements closed implicitly by an opening tag of the same name
const SELF_NESTING_CLOSERS: &[&str] = &["li", "option", "dt", "dd", "tr", "td", "th", "p"];

pub(crate) fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

fn is_raw_text(tag: &str) -> bool {
    RAW_TEXT_ELEMENTS.contains(&tag)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')
}

/// Parse markup into detached top-level nodes
pub(crate) fn parse_fragment(source: &str) -> Vec<Node> {
    let mut parser = Parser {
        src: source,
        pos: 0,
        roots: Vec::new(),
        open: Vec::new(),
        text: String::new(),
    };
    parser.run();
    parser.roots
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    roots: Vec<Node>,
    /// Stack of open elements (innermost last)
    open: Vec<Node>,
    /// Pending text, flushed before every non-text node
    text: String,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn run(&mut self) {
        while self.pos < self.src.len() {
            let rest = self.rest();
            if let Some(after) = rest.strip_prefix("<!--") {
                let (body, consumed) = match after.find("-->") {
                    Some(end) => (&after[..end], 4 + end + 3),
                    None => (after, rest.len()),
                };
                self.flush_text();
                self.append(Node::comment(body));
                self.pos += consumed;
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                // doctype and processing instructions carry nothing we keep
                self.pos += rest.find('>').map(|i| i + 1).unwrap_or(rest.len());
            } else if rest.starts_with("</")
                && rest[2..].starts_with(|c: char| c.is_ascii_alphabetic())
            {
                self.end_tag();
            } else if rest.starts_with('<') && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic())
            {
                self.start_tag();
            } else {
                let first = rest.chars().next().map(char::len_utf8).unwrap_or(1);
                let next = rest[first..]
                    .find('<')
                    .map(|i| i + first)
                    .unwrap_or(rest.len());
                self.text.push_str(&rest[..next]);
                self.pos += next;
            }
        }
        self.flush_text();
    }

    fn append(&mut self, node: Node) {
        match self.open.last() {
            Some(parent) => parent.push_parsed_child(node),
            None => self.roots.push(node),
        }
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            let text = decode_entities(&std::mem::take(&mut self.text));
            self.append(Node::text(text));
        }
    }

    fn read_name(&mut self) -> String {
        let rest = self.rest();
        let len = rest.find(|c: char| !is_name_char(c)).unwrap_or(rest.len());
        self.pos += len;
        rest[..len].to_ascii_lowercase()
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn end_tag(&mut self) {
        self.flush_text();
        self.pos += 2;
        let name = self.read_name();
        let rest = self.rest();
        self.pos += rest.find('>').map(|i| i + 1).unwrap_or(rest.len());

        if let Some(depth) = self.open.iter().rposition(|n| n.has_tag(&name)) {
            self.open.truncate(depth);
        }
    }

    fn start_tag(&mut self) {
        self.flush_text();
        self.pos += 1;
        let name = self.read_name();
        let element = Node::element(&name);
        let mut self_closing = false;

        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.is_empty() {
                break;
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                self_closing = true;
                break;
            }
            if rest.starts_with('>') {
                self.pos += 1;
                break;
            }
            if rest.starts_with('/') {
                self.pos += 1;
                continue;
            }
            let (attr, value) = self.attribute();
            if attr.is_empty() {
                // unparseable byte inside a tag, skip it
                self.pos += rest.chars().next().map(char::len_utf8).unwrap_or(1);
                continue;
            }
            if !element.has_attribute(&attr) {
                element.set_attribute(&attr, value);
            }
        }

        if SELF_NESTING_CLOSERS.contains(&name.as_str())
            && self.open.last().is_some_and(|top| top.has_tag(&name))
        {
            self.open.pop();
        }

        self.append(element.clone());

        if self_closing || is_void(&name) {
            return;
        }
        if is_raw_text(&name) {
            let rest = self.rest();
            let close = format!("</{name}");
            let end = find_ignore_case(rest, &close).unwrap_or(rest.len());
            if end > 0 {
                element.push_parsed_child(Node::text(&rest[..end]));
            }
            self.pos += end;
            let rest = self.rest();
            self.pos += rest.find('>').map(|i| i + 1).unwrap_or(rest.len());
            return;
        }
        self.open.push(element);
    }

    fn attribute(&mut self) -> (String, String) {
        let rest = self.rest();
        let len = rest
            .find(|c: char| c.is_whitespace() || matches!(c, '=' | '>' | '/' | '"' | '\''))
            .unwrap_or(rest.len());
        let name = rest[..len].to_ascii_lowercase();
        self.pos += len;
        if name.is_empty() {
            return (name, String::new());
        }

        self.skip_whitespace();
        if !self.rest().starts_with('=') {
            return (name, String::new());
        }
        self.pos += 1;
        self.skip_whitespace();

        let rest = self.rest();
        let raw = match rest.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let body = &rest[1..];
                let end = body.find(quote).unwrap_or(body.len());
                self.pos += 1 + end + usize::from(end < body.len());
                &body[..end]
            }
            _ => {
                let end = rest
                    .find(|c: char| c.is_whitespace() || c == '>')
                    .unwrap_or(rest.len());
                self.pos += end;
                &rest[..end]
            }
        };
        (name, decode_entities(raw))
    }
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.to_ascii_lowercase();
    haystack
        .char_indices()
        .map(|(i, _)| i)
        .find(|&i| {
            haystack
                .get(i..i + needle.len())
                .is_some_and(|window| window.eq_ignore_ascii_case(&needle))
        })
}

/// Decode the entity subset templates actually use
pub(crate) fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &rest[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn escape_text(raw: &str, out: &mut String) {
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(raw: &str, out: &mut String) {
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

/// Serialize a node (outer markup)
pub(crate) fn serialize(node: &Node, out: &mut String) {
    if let Some(text) = node.with_text(|t| t.map(str::to_string)) {
        let raw_parent = node
            .parent()
            .and_then(|p| p.tag_name())
            .is_some_and(|tag| is_raw_text(&tag));
        if raw_parent {
            out.push_str(&text);
        } else {
            escape_text(&text, out);
        }
        return;
    }
    if let Some(comment) = node.with_comment(|c| c.map(str::to_string)) {
        out.push_str("<!--");
        out.push_str(&comment);
        out.push_str("-->");
        return;
    }
    let Some(tag) = node.tag_name() else {
        return;
    };
    out.push('<');
    out.push_str(&tag);
    for (name, value) in node.attributes() {
        out.push(' ');
        out.push_str(&name);
        out.push_str("=\"");
        escape_attribute(&value, out);
        out.push('"');
    }
    out.push('>');
    if is_void(&tag) {
        return;
    }
    serialize_children(node, out);
    out.push_str("</");
    out.push_str(&tag);
    out.push('>');
}

/// Serialize a node's children (inner markup)
pub(crate) fn serialize_children(node: &Node, out: &mut String) {
    for child in node.children() {
        serialize(&child, out);
    }
}
