// Sanitizing importer
// Turns untrusted markup (clipboard contents, stored values) into model
// content. Executable and interactive nodes never survive.

use log::debug;

use super::markup_tree::{Element, MarkupNode, parse_markup, render_markup};
use super::structured_document::{
    Alignment, Block, BlockType, InlineContent, Link, ListKind, MAX_LIST_DEPTH, Rgb, TextRun,
    TextStyle, normalize_content,
};

/// Elements removed together with everything inside them
const DROPPED_ELEMENTS: &[&str] = &[
    "script", "style", "object", "embed", "applet", "iframe", "frame", "frameset", "form",
    "input", "button", "select", "option", "optgroup", "textarea", "link", "meta", "base",
    "template", "noscript", "svg", "math", "head", "title", "canvas", "audio", "video",
    "source", "track", "dialog", "xmp", "noembed", "noframes", "keygen", "isindex", "portal",
    "param",
];

const ALLOWED_ATTRIBUTES: &[&str] = &[
    "style", "class", "href", "src", "alt", "title", "target", "rel", "colspan", "rowspan",
    "width", "height",
];

const URL_ATTRIBUTES: &[&str] = &["href", "src"];

const UNSAFE_STYLE_PATTERNS: &[&str] = &["expression(", "javascript:", "url("];

pub const LINK_TARGET: &str = "_blank";
pub const LINK_REL: &str = "noopener noreferrer";

/// Content produced by importing pasted markup
#[derive(Debug, Clone, PartialEq)]
pub enum ImportedContent {
    /// No markup at all; inserted as one unstyled run
    PlainText(String),
    /// Inline content that belongs inside the current block
    Inline(Vec<InlineContent>),
    /// Whole blocks
    Blocks(Vec<Block>),
}

/// Import untrusted markup
pub fn import(raw: &str) -> ImportedContent {
    let nodes = parse_markup(raw);
    if !nodes.iter().any(|node| matches!(node, MarkupNode::Element(_))) {
        return ImportedContent::PlainText(raw.to_string());
    }

    let mut blocks = nodes_to_blocks(&sanitize_nodes(nodes));
    let single_paragraph = blocks.len() == 1
        && blocks[0].block_type == BlockType::Paragraph
        && blocks[0].alignment == Alignment::Left;
    if blocks.is_empty() {
        ImportedContent::Inline(Vec::new())
    } else if single_paragraph {
        ImportedContent::Inline(blocks.remove(0).content)
    } else {
        ImportedContent::Blocks(blocks)
    }
}

/// Sanitize markup and render it back
pub fn sanitize_markup(raw: &str) -> String {
    render_markup(&sanitize_nodes(parse_markup(raw)))
}

/// Remove unsafe elements and attributes from a markup forest
pub fn sanitize_nodes(nodes: Vec<MarkupNode>) -> Vec<MarkupNode> {
    nodes.into_iter().filter_map(sanitize_node).collect()
}

fn sanitize_node(node: MarkupNode) -> Option<MarkupNode> {
    let element = match node {
        MarkupNode::Text(text) => return Some(MarkupNode::Text(text)),
        MarkupNode::Element(element) => element,
    };
    if DROPPED_ELEMENTS.contains(&element.name.as_str()) {
        debug!("Dropping <{}> from imported markup", element.name);
        return None;
    }

    let attributes = element
        .attributes
        .into_iter()
        .filter(|(name, value)| is_allowed_attribute(name, value))
        .collect();
    let mut sanitized = Element {
        name: element.name,
        attributes,
        children: sanitize_nodes(element.children),
    };
    if sanitized.name == "a" {
        sanitized.set_attr("target", LINK_TARGET);
        sanitized.set_attr("rel", LINK_REL);
    }
    Some(MarkupNode::Element(sanitized))
}

fn is_allowed_attribute(name: &str, value: &str) -> bool {
    if !ALLOWED_ATTRIBUTES.contains(&name) {
        return false;
    }
    if URL_ATTRIBUTES.contains(&name) {
        return is_safe_url(value, name == "src");
    }
    if name == "style" {
        return is_safe_style(value);
    }
    true
}

/// Inline CSS that cannot load or run anything
pub fn is_safe_style(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    !UNSAFE_STYLE_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

/// URLs are opaque except for the scheme check
pub fn is_safe_url(value: &str, is_image: bool) -> bool {
    // Browsers ignore whitespace and control characters inside schemes
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    if ["javascript:", "vbscript:", "livescript:"]
        .iter()
        .any(|scheme| compact.starts_with(scheme))
    {
        return false;
    }
    if compact.starts_with("data:") {
        return is_image
            && compact.starts_with("data:image/")
            && !compact.starts_with("data:image/svg");
    }
    true
}

/// Map sanitized markup onto model blocks
pub fn nodes_to_blocks(nodes: &[MarkupNode]) -> Vec<Block> {
    let mut collector = Collector::default();
    let context = Context::default();
    for node in nodes {
        collector.walk(node, &context);
    }
    collector.finish_block();
    collector.blocks
}

/// Inherited state while walking the tree
#[derive(Debug, Clone)]
struct Context {
    style: TextStyle,
    link: Option<Link>,
    block_type: BlockType,
    alignment: Alignment,
    list: Option<(ListKind, u8)>,
}

impl Default for Context {
    fn default() -> Self {
        Context {
            style: TextStyle::default(),
            link: None,
            block_type: BlockType::Paragraph,
            alignment: Alignment::Left,
            list: None,
        }
    }
}

#[derive(Default)]
struct Collector {
    blocks: Vec<Block>,
    current: Option<Block>,
    /// The open block was started by a line break
    after_break: bool,
}

impl Collector {
    fn open_block(&mut self, context: &Context) -> &mut Block {
        self.current.get_or_insert_with(|| {
            Block::new(context.block_type.clone()).with_alignment(context.alignment)
        })
    }

    fn finish_block(&mut self) {
        if let Some(mut block) = self.current.take() {
            block.content = normalize_content(block.content);
            // A trailing <br> does not start a visible line
            if !(self.after_break && block.is_empty()) {
                self.blocks.push(block);
            }
        }
        self.after_break = false;
    }

    fn push_inline(&mut self, node: InlineContent, context: &Context) {
        self.open_block(context).content.push(node);
    }

    fn push_text(&mut self, text: &str, context: &Context) {
        if self.current.is_none() && text.trim().is_empty() {
            return;
        }
        let run = TextRun::new(text, context.style.clone());
        match &context.link {
            Some(link) => {
                let block = self.open_block(context);
                if let Some(InlineContent::Link { link: open, runs }) = block.content.last_mut()
                    && open == link
                {
                    runs.push(run);
                } else {
                    block.content.push(InlineContent::Link {
                        link: link.clone(),
                        runs: vec![run],
                    });
                }
            }
            None => self.push_inline(InlineContent::Text(run), context),
        }
    }

    fn walk(&mut self, node: &MarkupNode, context: &Context) {
        let element = match node {
            MarkupNode::Text(text) => {
                self.push_text(text, context);
                return;
            }
            MarkupNode::Element(element) => element,
        };

        let mut inner = context.clone();
        apply_tag_style(&element.name, &mut inner.style);
        if let Some(style) = element.attr("style") {
            apply_css(style, &mut inner);
        }

        match element.name.as_str() {
            "a" => {
                inner.link = element
                    .attr("href")
                    .map(str::trim)
                    .filter(|href| !href.is_empty())
                    .map(Link::new);
                self.walk_children(element, &inner);
            }
            "img" => {
                if let Some(source) = element.attr("src").map(str::trim).filter(|s| !s.is_empty()) {
                    self.push_inline(
                        InlineContent::Image {
                            source: source.to_string(),
                        },
                        &inner,
                    );
                }
            }
            "br" => {
                if self.current.as_ref().is_some_and(|block| !block.is_empty()) {
                    self.finish_block();
                    self.open_block(&inner);
                    self.after_break = true;
                }
            }
            "hr" => {
                self.finish_block();
                self.blocks.push(Block::rule());
            }
            "ul" | "ol" => {
                self.finish_block();
                let kind = if element.name == "ol" {
                    ListKind::Ordered
                } else {
                    ListKind::Unordered
                };
                let depth = context.list.map(|(_, depth)| depth + 1).unwrap_or(0);
                inner.list = Some((kind, depth.min(MAX_LIST_DEPTH)));
                self.walk_children(element, &inner);
                self.finish_block();
            }
            "li" => {
                let (kind, depth) = context.list.unwrap_or((ListKind::Unordered, 0));
                let depth = (depth + indent_class(element)).min(MAX_LIST_DEPTH);
                inner.block_type = BlockType::ListItem { kind, depth };
                self.walk_block(element, &inner, true);
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = element.name[1..].parse::<u8>().unwrap_or(1);
                inner.block_type = BlockType::Heading { level };
                self.walk_block(element, &inner, true);
            }
            "blockquote" => {
                inner.block_type = BlockType::BlockQuote;
                self.walk_block(element, &inner, true);
            }
            "p" | "pre" => {
                inner.block_type = container_kind(context);
                self.walk_block(element, &inner, true);
            }
            "div" | "section" | "article" | "header" | "footer" | "main" | "aside" | "nav"
            | "figure" | "figcaption" | "address" | "tr" | "dt" | "dd" | "caption"
            | "center" | "table" | "tbody" | "thead" | "tfoot" | "dl" => {
                if element.name == "center" {
                    inner.alignment = Alignment::Center;
                }
                inner.block_type = container_kind(context);
                self.walk_block(element, &inner, false);
            }
            // Inline formatting and unknown tags: keep the children, drop the wrapper
            _ => self.walk_children(element, &inner),
        }
    }

    fn walk_children(&mut self, element: &Element, context: &Context) {
        for child in &element.children {
            self.walk(child, context);
        }
    }

    /// Walk a block-level element. `eager` elements produce a block even when empty.
    fn walk_block(&mut self, element: &Element, context: &Context, eager: bool) {
        let adopt = !self.after_break && self.current.as_ref().is_some_and(Block::is_empty);
        if adopt {
            // An empty block opened by an enclosing element adopts this one
            if let Some(block) = self.current.as_mut() {
                if !matches!(block.block_type, BlockType::ListItem { .. })
                    || matches!(context.block_type, BlockType::ListItem { .. })
                {
                    block.block_type = context.block_type.clone();
                }
                block.alignment = context.alignment;
            }
        } else {
            self.finish_block();
            if eager {
                self.open_block(context);
            }
        }
        self.walk_children(element, context);
        self.finish_block();
    }
}

/// Paragraph-like elements inside quotes and list items keep the container's kind
fn container_kind(context: &Context) -> BlockType {
    match context.block_type {
        BlockType::BlockQuote | BlockType::ListItem { .. } => context.block_type.clone(),
        _ => BlockType::Paragraph,
    }
}

fn apply_tag_style(name: &str, style: &mut TextStyle) {
    match name {
        "b" | "strong" => style.bold = true,
        "i" | "em" | "cite" | "var" | "dfn" => style.italic = true,
        "u" | "ins" => style.underline = true,
        "s" | "strike" | "del" => style.strikethrough = true,
        _ => {}
    }
}

/// `indent-N` / `ql-indent-N` classes
fn indent_class(element: &Element) -> u8 {
    element
        .attr("class")
        .into_iter()
        .flat_map(str::split_whitespace)
        .filter_map(|class| {
            class
                .strip_prefix("ql-indent-")
                .or_else(|| class.strip_prefix("indent-"))
        })
        .filter_map(|n| n.parse::<u8>().ok())
        .max()
        .unwrap_or(0)
}

fn apply_css(declarations: &str, context: &mut Context) {
    for declaration in declarations.split(';') {
        let Some((property, value)) = declaration.split_once(':') else {
            continue;
        };
        let property = property.trim().to_ascii_lowercase();
        let value = value.trim();
        let lower = value.to_ascii_lowercase();
        let style = &mut context.style;
        match property.as_str() {
            "font-weight" => {
                style.bold = match lower.as_str() {
                    "bold" | "bolder" => true,
                    "normal" | "lighter" => false,
                    number => number.parse::<u16>().map(|w| w >= 600).unwrap_or(style.bold),
                };
            }
            "font-style" => style.italic = lower == "italic" || lower == "oblique",
            "text-decoration" | "text-decoration-line" => {
                if lower == "none" {
                    style.underline = false;
                    style.strikethrough = false;
                } else {
                    style.underline |= lower.contains("underline");
                    style.strikethrough |= lower.contains("line-through");
                }
            }
            "font-family" => style.font_family = css_value(value),
            "font-size" => style.font_size = css_value(value),
            "color" => {
                if let Some(color) = Rgb::parse(value) {
                    style.color = Some(color);
                }
            }
            "text-align" => {
                if let Some(alignment) = Alignment::from_css(value) {
                    context.alignment = alignment;
                }
            }
            _ => {}
        }
    }
}

fn css_value(value: &str) -> Option<String> {
    let cleaned: String = value.chars().filter(|c| !matches!(c, '"' | '<' | '>')).collect();
    let cleaned = cleaned.trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(raw: &str) -> Vec<Block> {
        match import(raw) {
            ImportedContent::Blocks(blocks) => blocks,
            other => panic!("expected blocks, got {:?}", other),
        }
    }

    fn inline(raw: &str) -> Vec<InlineContent> {
        match import(raw) {
            ImportedContent::Inline(content) => content,
            other => panic!("expected inline content, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_text_degrades() {
        assert_eq!(
            import("just 1 < 2 & more"),
            ImportedContent::PlainText("just 1 < 2 & more".into())
        );
    }

    #[test]
    fn test_script_and_handlers_removed() {
        let cleaned = sanitize_markup(
            r#"<p onclick="steal()">Hi<script>alert(1)</script><iframe src="x"></iframe></p>"#,
        );
        assert_eq!(cleaned, "<p>Hi</p>");
    }

    #[test]
    fn test_legacy_interactive_elements_removed() {
        let cleaned = sanitize_markup(
            r#"<p>a<keygen name="k">b<isindex prompt="q">c<param name="movie" value="x.swf"><portal src="https://e.example">inside</portal>d</p>"#,
        );
        assert_eq!(cleaned, "<p>abcd</p>");
    }

    #[test]
    fn test_anchor_gets_forced_target_and_rel() {
        let cleaned = sanitize_markup(r#"<a href="https://a.example" target="_self" rel="opener">x</a>"#);
        assert_eq!(
            cleaned,
            r#"<a href="https://a.example" target="_blank" rel="noopener noreferrer">x</a>"#
        );
    }

    #[test]
    fn test_script_urls_removed() {
        let cleaned = sanitize_markup(
            "<a href=\"java\tscript:alert(1)\">x</a><img src=\"data:text/html,hi\"><img src=\"data:image/png;base64,AA\">",
        );
        assert!(!cleaned.contains("script:"));
        assert!(!cleaned.contains("data:text"));
        assert!(cleaned.contains("data:image/png"));
    }

    #[test]
    fn test_unsafe_style_attribute_removed() {
        assert!(is_safe_style("font-size:20px;color:#ff0000"));
        assert!(!is_safe_style("font-size:Expression(1)"));
        let cleaned = sanitize_markup(r#"<span style="font-family:url(x)">a</span>"#);
        assert_eq!(cleaned, "<span>a</span>");
    }

    #[test]
    fn test_inline_styles_from_tags() {
        let content = inline("<b>bold</b> <i>it</i> <u>u</u> <del>gone</del>");
        let styles: Vec<(String, TextStyle)> = content
            .into_iter()
            .filter_map(|item| match item {
                InlineContent::Text(run) => Some((run.text, run.style)),
                _ => None,
            })
            .collect();
        assert_eq!(styles[0], ("bold".to_string(), TextStyle::bold()));
        assert_eq!(styles[2], ("it".to_string(), TextStyle::italic()));
        assert!(styles[4].1.underline);
        assert!(styles[6].1.strikethrough);
    }

    #[test]
    fn test_css_overrides_tag_weight() {
        let content = inline(r#"<b style="font-weight:normal"><span style="font-weight:700;color:#ff0000;font-family:'Georgia', serif">x</span>y</b>"#);
        match &content[..] {
            [InlineContent::Text(x), InlineContent::Text(y)] => {
                assert!(x.style.bold);
                assert_eq!(x.style.color, Some(Rgb::new(255, 0, 0)));
                assert_eq!(x.style.font_family.as_deref(), Some("'Georgia', serif"));
                assert!(!y.style.bold);
            }
            other => panic!("unexpected content {:?}", other),
        }
    }

    #[test]
    fn test_block_mapping() {
        let result = blocks(
            "<h2>Title</h2><p style=\"text-align:center\">Body</p><blockquote><p>q</p></blockquote><hr><div>tail</div>",
        );
        let kinds: Vec<&BlockType> = result.iter().map(|b| &b.block_type).collect();
        assert_eq!(
            kinds,
            vec![
                &BlockType::Heading { level: 2 },
                &BlockType::Paragraph,
                &BlockType::BlockQuote,
                &BlockType::HorizontalRule,
                &BlockType::Paragraph,
            ]
        );
        assert_eq!(result[1].alignment, Alignment::Center);
    }

    #[test]
    fn test_nested_lists_track_depth() {
        let result = blocks("<ol><li>one<ul><li>inner</li></ul></li><li class=\"ql-indent-2\">two</li></ol>");
        let kinds: Vec<BlockType> = result.iter().map(|b| b.block_type.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                BlockType::ListItem { kind: ListKind::Ordered, depth: 0 },
                BlockType::ListItem { kind: ListKind::Unordered, depth: 1 },
                BlockType::ListItem { kind: ListKind::Ordered, depth: 2 },
            ]
        );
    }

    #[test]
    fn test_paragraph_inside_list_item_does_not_duplicate() {
        let result = blocks("<ul><li><p>a</p></li><li><p>b</p></li></ul>");
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|b| matches!(b.block_type, BlockType::ListItem { .. })));
    }

    #[test]
    fn test_line_break_splits_block() {
        let result = blocks("<p>a<br>b<br></p><p><br></p>");
        let texts: Vec<String> = result.iter().map(Block::to_plain_text).collect();
        assert_eq!(texts, vec!["a", "b", ""]);
    }

    #[test]
    fn test_unknown_tags_unwrapped() {
        let content = inline("<custom-tag>keep <x-y>me</x-y></custom-tag>");
        assert_eq!(content, vec![InlineContent::Text(TextRun::plain("keep me"))]);
    }

    #[test]
    fn test_link_without_href_unwrapped() {
        let content = inline("<a>plain</a> <a href=\"https://x.org\">linked</a>");
        assert!(matches!(content[0], InlineContent::Text(_)));
        match &content[1] {
            InlineContent::Link { link, runs } => {
                assert_eq!(link.destination, "https://x.org");
                assert_eq!(runs[0].text, "linked");
            }
            other => panic!("expected link, got {:?}", other),
        }
    }

    #[test]
    fn test_only_unsafe_content_imports_nothing() {
        assert_eq!(import("<script>x()</script>"), ImportedContent::Inline(Vec::new()));
    }
}
