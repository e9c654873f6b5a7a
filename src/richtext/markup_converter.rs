// Conversion between the structured document and its markup storage format

use super::markup_tree::{Element, MarkupNode, parse_markup, render_markup};
use super::sanitizer::{LINK_REL, LINK_TARGET, nodes_to_blocks, sanitize_nodes};
use super::structured_document::{
    Alignment, Block, BlockType, InlineContent, ListKind, StructuredDocument, TextRun,
    normalize_content,
};

/// Parse stored markup into a document.
/// Stored values get the same sanitizing treatment as pasted content.
pub fn markup_to_document(markup: &str) -> StructuredDocument {
    let nodes = sanitize_nodes(parse_markup(markup));
    StructuredDocument::from_blocks(nodes_to_blocks(&nodes))
}

/// Serialize a document to markup
pub fn document_to_markup(doc: &StructuredDocument) -> String {
    let mut nodes = Vec::new();
    let mut open_list: Option<(ListKind, Element)> = None;

    for block in doc.blocks() {
        let BlockType::ListItem { kind, depth } = block.block_type else {
            if let Some((_, list)) = open_list.take() {
                nodes.push(MarkupNode::Element(list));
            }
            nodes.push(MarkupNode::Element(block_element(block)));
            continue;
        };

        let mut item = block_element(block);
        if depth > 0 {
            item.set_attr("class", format!("indent-{}", depth));
        }
        match &mut open_list {
            Some((open_kind, list)) if *open_kind == kind => {
                list.children.push(MarkupNode::Element(item));
            }
            _ => {
                if let Some((_, list)) = open_list.take() {
                    nodes.push(MarkupNode::Element(list));
                }
                let tag = match kind {
                    ListKind::Ordered => "ol",
                    ListKind::Unordered => "ul",
                };
                open_list = Some((kind, Element::new(tag).with_child(MarkupNode::Element(item))));
            }
        }
    }
    if let Some((_, list)) = open_list {
        nodes.push(MarkupNode::Element(list));
    }

    render_markup(&nodes)
}

fn block_element(block: &Block) -> Element {
    let tag = match block.block_type {
        BlockType::Paragraph => "p".to_string(),
        BlockType::Heading { level } => format!("h{}", level.clamp(1, 6)),
        BlockType::ListItem { .. } => "li".to_string(),
        BlockType::BlockQuote => "blockquote".to_string(),
        BlockType::HorizontalRule => return Element::new("hr"),
    };

    let mut element = Element::new(tag);
    if block.alignment != Alignment::Left {
        element.set_attr("style", format!("text-align:{}", block.alignment.as_css()));
    }
    for item in normalize_content(block.content.clone()) {
        element.children.push(inline_node(&item));
    }
    element
}

fn inline_node(item: &InlineContent) -> MarkupNode {
    match item {
        InlineContent::Text(run) => run_node(run),
        InlineContent::Link { link, runs } => {
            let mut anchor = Element::new("a")
                .with_attr("href", link.destination.clone())
                .with_attr("target", LINK_TARGET)
                .with_attr("rel", LINK_REL);
            anchor.children = runs.iter().map(run_node).collect();
            MarkupNode::Element(anchor)
        }
        InlineContent::Image { source } => {
            MarkupNode::Element(Element::new("img").with_attr("src", source.clone()))
        }
    }
}

/// `<span style><strong><em><u><s>text</s></u></em></strong></span>`
fn run_node(run: &TextRun) -> MarkupNode {
    let style = &run.style;
    let mut node = MarkupNode::Text(run.text.clone());
    for (on, tag) in [
        (style.strikethrough, "s"),
        (style.underline, "u"),
        (style.italic, "em"),
        (style.bold, "strong"),
    ] {
        if on {
            node = MarkupNode::Element(Element::new(tag).with_child(node));
        }
    }

    if style.has_font_attributes() {
        let mut declarations = Vec::new();
        if let Some(family) = &style.font_family {
            declarations.push(format!("font-family:{}", family));
        }
        if let Some(size) = &style.font_size {
            declarations.push(format!("font-size:{}", size));
        }
        if let Some(color) = style.color {
            declarations.push(format!("color:{}", color.to_hex()));
        }
        node = MarkupNode::Element(
            Element::new("span")
                .with_attr("style", declarations.join(";"))
                .with_child(node),
        );
    }
    node
}
