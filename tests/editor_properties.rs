// Behavioural properties of the editing core

use scribe::richtext::commands::{Command, CommandExecutor, CommandOutcome};
use scribe::richtext::format_state::compute_active_formats;
use scribe::richtext::markup_converter::{document_to_markup, markup_to_document};
use scribe::richtext::markup_tree::{MarkupNode, parse_markup};
use scribe::richtext::sanitizer::sanitize_nodes;
use scribe::richtext::selection::{Selection, capture, restore};
use scribe::richtext::structured_document::{
    Alignment, Block, DocumentPosition, Edit, InlineContent, ListKind, Rgb, StructuredDocument,
    StyleFlag, TextStyle,
};

fn pos(block_index: usize, offset: usize) -> DocumentPosition {
    DocumentPosition::new(block_index, offset)
}

fn commands() -> Vec<Command> {
    vec![
        Command::ToggleStyle(StyleFlag::Bold),
        Command::ToggleStyle(StyleFlag::Italic),
        Command::ToggleStyle(StyleFlag::Underline),
        Command::ToggleStyle(StyleFlag::Strikethrough),
        Command::SetAlignment(Alignment::Center),
        Command::SetList(Some(ListKind::Ordered)),
        Command::SetList(Some(ListKind::Unordered)),
        Command::SetList(None),
        Command::SetHeading(Some(2)),
        Command::SetHeading(None),
        Command::ToggleBlockQuote,
        Command::Indent,
        Command::Outdent,
        Command::SetColor(Some(Rgb::new(200, 10, 10))),
        Command::SetFontSize(Some("20px".into())),
        Command::SetFontSize(Some("expression(1)".into())),
        Command::SetFontFamily(Some("'Georgia', serif".into())),
        Command::SetFontFamily(Some("url(x)".into())),
        Command::SetFontFamily(None),
        Command::ClearFormatting,
        Command::InsertLink {
            url: "https://example.com/a?b=1&c=2".into(),
            label: Some("more".into()),
        },
        Command::InsertLink {
            url: "https://example.com/a?b=1&c=2".into(),
            label: Some("site".into()),
        },
        Command::RemoveLink,
        Command::InsertImage {
            source: "https://example.com/a.png".into(),
        },
        Command::InsertHorizontalRule,
        Command::InsertText("ab c".into()),
        Command::InsertText("é <&>".into()),
        Command::SplitBlock,
        Command::DeleteBackward,
        Command::DeleteForward,
        Command::Undo,
        Command::Redo,
    ]
}

fn position_from(doc: &StructuredDocument, block: u8, offset: u8) -> DocumentPosition {
    let block_index = block as usize % doc.block_count();
    doc.clamp_position(pos(block_index, offset as usize % 12))
}

fn is_valid(doc: &StructuredDocument, position: DocumentPosition) -> bool {
    doc.clamp_position(position) == position
}

quickcheck::quickcheck! {
    fn prop_command_documents_round_trip(steps: Vec<(u8, u8, u8, u8, u8)>) -> bool {
        let catalog = commands();
        let mut executor = CommandExecutor::default();
        let mut document = StructuredDocument::with_paragraph("Hello world");

        for (command, anchor_block, anchor_offset, focus_block, focus_offset) in steps {
            let mut selection = Selection::new(
                position_from(&document, anchor_block, anchor_offset),
                position_from(&document, focus_block, focus_offset),
            );
            let command = catalog[command as usize % catalog.len()].clone();
            executor.execute(&mut document, &mut selection, command);
            if !is_valid(&document, selection.anchor) || !is_valid(&document, selection.focus) {
                return false;
            }
        }

        let markup = document_to_markup(&document);
        document_to_markup(&markup_to_document(&markup)) == markup
    }

    fn prop_sanitized_tree_has_no_active_content(fragments: Vec<u8>) -> bool {
        const HOSTILE: &[&str] = &[
            "<script>alert(1)</script>",
            "<img src=\"x.png\" onerror=\"alert(1)\">",
            "<a href=\"javascript:alert(1)\" target=\"_self\">x</a>",
            "<a href=\"https://ok.example\" rel=\"opener\">ok</a>",
            "<iframe src=\"https://e.example\"></iframe>",
            "<svg onload=\"alert(1)\"><circle></circle></svg>",
            "<form action=\"/\"><input name=\"q\"><button>go</button></form>",
            "<div style=\"background:url(javascript:x)\">bg</div>",
            "<p onclick=\"x()\">",
            "</p>",
            "<b>",
            "</b>",
            "text",
            "<object data=\"x\"></object>",
        ];
        let raw: String = fragments
            .iter()
            .map(|i| HOSTILE[*i as usize % HOSTILE.len()])
            .collect();
        sanitize_nodes(parse_markup(&raw)).iter().all(is_inert)
    }
}

fn is_inert(node: &MarkupNode) -> bool {
    let MarkupNode::Element(element) = node else {
        return true;
    };
    const ACTIVE: &[&str] = &["script", "iframe", "svg", "form", "input", "button", "object"];
    if ACTIVE.contains(&element.name.as_str()) {
        return false;
    }
    let attributes_ok = element.attributes.iter().all(|(name, value)| {
        !name.starts_with("on") && !value.to_ascii_lowercase().contains("javascript:")
    });
    let anchor_ok = element.name != "a"
        || (element.attr("target") == Some("_blank")
            && element.attr("rel") == Some("noopener noreferrer"));
    attributes_ok && anchor_ok && element.children.iter().all(is_inert)
}

#[test]
fn ranged_selection_overlapping_deleted_range_collapses_at_boundary() {
    let mut doc = StructuredDocument::from_blocks(vec![
        Block::paragraph().with_plain_text("first block"),
        Block::paragraph().with_plain_text("second block"),
    ]);
    let selection = Selection::new(pos(0, 2), pos(1, 3));
    let mut saved = capture(&doc, &selection);

    let outcome = doc
        .apply(Edit::DeleteRange {
            anchor: pos(0, 5),
            focus: pos(1, 6),
        })
        .unwrap();
    saved.apply_remaps(&outcome.remaps);
    let restored = restore(&doc, &saved);

    assert_eq!(doc.to_plain_text(), "first block");
    assert!(restored.is_collapsed());
    assert_eq!(restored.focus, pos(0, 5));
}

#[test]
fn bold_toggle_twice_and_undo_restore_runs() {
    let original = StructuredDocument::from_blocks(vec![Block::paragraph()
        .with_plain_text("plain ")
        .with_text("italic", TextStyle::italic())]);
    let range = Selection::new(pos(0, 2), pos(0, 9));

    let mut executor = CommandExecutor::default();
    let mut doc = original.clone();
    let mut selection = range.clone();
    executor.execute(&mut doc, &mut selection, Command::ToggleStyle(StyleFlag::Bold));
    assert_ne!(document_to_markup(&doc), document_to_markup(&original));
    executor.execute(&mut doc, &mut selection, Command::ToggleStyle(StyleFlag::Bold));
    assert_eq!(document_to_markup(&doc), document_to_markup(&original));

    let mut executor = CommandExecutor::default();
    let mut doc = original.clone();
    let mut selection = range;
    executor.execute(&mut doc, &mut selection, Command::ToggleStyle(StyleFlag::Bold));
    executor.execute(&mut doc, &mut selection, Command::Undo);
    assert_eq!(document_to_markup(&doc), document_to_markup(&original));
}

#[test]
fn link_over_two_blocks_clips_to_first() {
    let mut doc = StructuredDocument::from_blocks(vec![
        Block::paragraph().with_plain_text("one"),
        Block::paragraph().with_plain_text("two"),
    ]);
    let mut selection = Selection::new(pos(0, 1), pos(1, 2));
    let outcome = CommandExecutor::default().execute(
        &mut doc,
        &mut selection,
        Command::InsertLink {
            url: "https://example.com".into(),
            label: None,
        },
    );
    assert_eq!(
        outcome,
        CommandOutcome::Applied {
            clipped_at_block_boundary: true
        }
    );
    assert_eq!(
        document_to_markup(&doc),
        "<p>o<a href=\"https://example.com\" target=\"_blank\" rel=\"noopener noreferrer\">ne</a></p><p>two</p>"
    );
}

#[test]
fn collapsed_link_inserts_one_node_and_places_cursor_after_it() {
    let mut doc = StructuredDocument::with_paragraph("ab");
    let mut selection = Selection::collapsed(pos(0, 1));
    CommandExecutor::default().execute(
        &mut doc,
        &mut selection,
        Command::InsertLink {
            url: "Y".into(),
            label: Some("X".into()),
        },
    );

    let links: Vec<_> = doc.blocks()[0]
        .content
        .iter()
        .filter_map(|item| match item {
            InlineContent::Link { link, runs } => Some((link.destination.clone(), runs.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].0, "Y");
    assert_eq!(links[0].1.len(), 1);
    assert_eq!(links[0].1[0].text, "X");
    assert_eq!(selection, Selection::collapsed(pos(0, 2)));
}

#[test]
fn collapsed_link_next_to_same_destination_stays_separate() {
    let mut doc = markup_to_document("<p><a href=\"Y\">Z</a></p>");
    let mut selection = Selection::collapsed(pos(0, 1));
    CommandExecutor::default().execute(
        &mut doc,
        &mut selection,
        Command::InsertLink {
            url: "Y".into(),
            label: Some("X".into()),
        },
    );

    let labels: Vec<String> = doc.blocks()[0]
        .content
        .iter()
        .filter(|item| matches!(item, InlineContent::Link { .. }))
        .map(InlineContent::to_plain_text)
        .collect();
    assert_eq!(labels, vec!["Z", "X"]);
    assert_eq!(selection, Selection::collapsed(pos(0, 2)));

    let markup = document_to_markup(&doc);
    assert_eq!(markup.matches("<a ").count(), 2);
    assert_eq!(document_to_markup(&markup_to_document(&markup)), markup);
}

#[test]
fn mixed_range_displays_off_but_toggles_on() {
    let mut doc = StructuredDocument::from_blocks(vec![Block::paragraph()
        .with_text("half", TextStyle::bold())
        .with_plain_text("half")]);
    let mut selection = Selection::new(pos(0, 0), pos(0, 8));
    assert!(!compute_active_formats(&doc, &selection).bold);

    CommandExecutor::default().execute(&mut doc, &mut selection, Command::ToggleStyle(StyleFlag::Bold));
    assert!(compute_active_formats(&doc, &selection).bold);
    assert_eq!(document_to_markup(&doc), "<p><strong>halfhalf</strong></p>");
}
