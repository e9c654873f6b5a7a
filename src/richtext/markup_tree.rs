// Markup tree
// Tolerant tokenizer and tree builder for the HTML-like article markup.
// Malformed input never fails: stray close tags are ignored and open
// elements are closed at the end of input.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Elements that never have children
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "isindex", "keygen", "link",
    "meta", "param", "source", "track", "wbr",
];

/// Elements whose content is raw text up to the matching close tag
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "textarea", "title", "xmp", "iframe", "noembed", "noframes",
    "noscript",
];

/// Opening one of these implicitly closes an open paragraph
const CLOSES_PARAGRAPH: &[&str] = &[
    "address", "article", "aside", "blockquote", "div", "dl", "fieldset", "footer",
    "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "main", "nav", "ol", "p",
    "pre", "section", "table", "ul",
];

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<!--.*?-->|<![^>]*>|<\?[^>]*>|<(/?)([A-Za-z][A-Za-z0-9:-]*)((?:\s+[^\s/>"'=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'=<>`]+))?)*)\s*(/?)>"#,
    )
    .expect("token pattern is valid")
});

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^\s/>"'=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("attribute pattern is valid")
});

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z]+);").expect("entity pattern is valid")
});

/// A node of parsed markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupNode {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercased tag name
    pub name: String,
    /// Attributes in source order, names lowercased
    pub attributes: Vec<(String, String)>,
    pub children: Vec<MarkupNode>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set an attribute, replacing any existing value
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: MarkupNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.name.as_str())
    }
}

/// Parse markup into a forest of nodes
pub fn parse_markup(input: &str) -> Vec<MarkupNode> {
    let mut builder = TreeBuilder::default();
    let mut pos = 0usize;

    while pos < input.len() {
        let Some(caps) = TOKEN.captures_at(input, pos) else {
            builder.text(&decode_entities(&input[pos..]));
            break;
        };
        let Some(whole) = caps.get(0) else {
            break;
        };
        if whole.start() > pos {
            builder.text(&decode_entities(&input[pos..whole.start()]));
        }
        pos = whole.end();

        // Comments, doctype and processing instructions have no name group
        let Some(name) = caps.get(2) else {
            continue;
        };
        let name = name.as_str().to_ascii_lowercase();
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        if closing {
            builder.close(&name);
            continue;
        }

        let attributes = caps
            .get(3)
            .map(|m| parse_attributes(m.as_str()))
            .unwrap_or_default();
        let self_closing = caps.get(4).is_some_and(|m| !m.as_str().is_empty());

        if RAW_TEXT_ELEMENTS.contains(&name.as_str()) && !self_closing {
            let (text_end, resume) = find_close_tag(&input[pos..], &name)
                .map(|(start, end)| (pos + start, pos + end))
                .unwrap_or((input.len(), input.len()));
            let mut element = Element::new(name);
            element.attributes = attributes;
            if text_end > pos {
                element
                    .children
                    .push(MarkupNode::Text(input[pos..text_end].to_string()));
            }
            builder.append(MarkupNode::Element(element));
            pos = resume;
            continue;
        }

        let is_void = self_closing || VOID_ELEMENTS.contains(&name.as_str());
        builder.open(name, attributes, is_void);
    }

    builder.finish()
}

fn parse_attributes(source: &str) -> Vec<(String, String)> {
    let mut attributes: Vec<(String, String)> = Vec::new();
    for caps in ATTRIBUTE.captures_iter(source) {
        let Some(name) = caps.get(1) else {
            continue;
        };
        let name = name.as_str().to_ascii_lowercase();
        // First occurrence wins, as in browsers
        if attributes.iter().any(|(key, _)| *key == name) {
            continue;
        }
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| decode_entities(m.as_str()).into_owned())
            .unwrap_or_default();
        attributes.push((name, value));
    }
    attributes
}

/// Locate `</name>` case-insensitively; returns (start, end) of the close tag
fn find_close_tag(rest: &str, name: &str) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(found) = rest[from..].find("</") {
        let start = from + found;
        let name_end = start + 2 + name.len();
        let matches_name = rest
            .as_bytes()
            .get(start + 2..name_end)
            .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name.as_bytes()));
        if matches_name {
            let tail = &rest[name_end..];
            let trimmed = tail.trim_start();
            if trimmed.starts_with('>') {
                return Some((start, rest.len() - trimmed.len() + 1));
            }
        }
        from = start + 2;
    }
    None
}

/// Decode character references
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    ENTITY.replace_all(text, |caps: &Captures| {
        let reference = &caps[1];
        let decoded = if let Some(hex) = reference
            .strip_prefix("#x")
            .or_else(|| reference.strip_prefix("#X"))
        {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
        } else if let Some(decimal) = reference.strip_prefix('#') {
            decimal.parse::<u32>().ok().and_then(char::from_u32)
        } else {
            named_entity(reference)
        };
        match decoded {
            Some(c) => c.to_string(),
            None => caps[0].to_string(),
        }
    })
}

fn named_entity(name: &str) -> Option<char> {
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "copy" => '\u{a9}',
        _ => return None,
    })
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Element>,
    roots: Vec<MarkupNode>,
}

impl TreeBuilder {
    fn append(&mut self, node: MarkupNode) {
        let siblings = match self.stack.last_mut() {
            Some(parent) => &mut parent.children,
            None => &mut self.roots,
        };
        if let MarkupNode::Text(text) = &node
            && let Some(MarkupNode::Text(previous)) = siblings.last_mut()
        {
            previous.push_str(text);
            return;
        }
        siblings.push(node);
    }

    fn text(&mut self, text: &str) {
        if !text.is_empty() {
            self.append(MarkupNode::Text(text.to_string()));
        }
    }

    fn open(&mut self, name: String, attributes: Vec<(String, String)>, is_void: bool) {
        self.close_implied(&name);
        let mut element = Element::new(name);
        element.attributes = attributes;
        if is_void {
            self.append(MarkupNode::Element(element));
        } else {
            self.stack.push(element);
        }
    }

    fn close_implied(&mut self, name: &str) {
        if CLOSES_PARAGRAPH.contains(&name)
            && self.stack.last().is_some_and(|top| top.name == "p")
        {
            self.close_to(self.stack.len() - 1);
        }
        if name == "li" {
            // A new item closes the previous one unless a nested list intervenes
            let open_item = self.stack.iter().rposition(|e| e.name == "li");
            let open_list = self
                .stack
                .iter()
                .rposition(|e| e.name == "ul" || e.name == "ol");
            if let Some(item) = open_item
                && open_list.is_none_or(|list| list < item)
            {
                self.close_to(item);
            }
        }
    }

    fn close(&mut self, name: &str) {
        if let Some(index) = self.stack.iter().rposition(|e| e.name == name) {
            self.close_to(index);
        }
    }

    /// Pop elements until the stack has `depth` entries
    fn close_to(&mut self, depth: usize) {
        while self.stack.len() > depth {
            if let Some(element) = self.stack.pop() {
                self.append(MarkupNode::Element(element));
            }
        }
    }

    fn finish(mut self) -> Vec<MarkupNode> {
        self.close_to(0);
        self.roots
    }
}

/// Render nodes back to markup, escaping text and attribute values
pub fn render_markup(nodes: &[MarkupNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        render_node(node, &mut out);
    }
    out
}

fn render_node(node: &MarkupNode, out: &mut String) {
    match node {
        MarkupNode::Text(text) => out.push_str(&escape_text(text)),
        MarkupNode::Element(element) => {
            out.push('<');
            out.push_str(&element.name);
            for (name, value) in &element.attributes {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&escape_attribute(value));
                out.push('"');
            }
            out.push('>');
            if element.is_void() {
                return;
            }
            for child in &element.children {
                render_node(child, out);
            }
            out.push_str("</");
            out.push_str(&element.name);
            out.push('>');
        }
    }
}

pub fn escape_text(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>']) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;"),
    )
}

fn escape_attribute(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}
