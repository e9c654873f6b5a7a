// Format state
// Snapshot of the formatting that is uniform across the current selection,
// used to drive toolbar state. Never stored.

use super::selection::Selection;
use super::structured_document::{
    Alignment, BlockType, ListKind, Rgb, StructuredDocument, StyleFlag, TextStyle,
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormatState {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub alignment: Option<Alignment>,
    pub list_kind: Option<ListKind>,
    pub heading: Option<u8>,
    pub block_quote: bool,
    pub font_family: Option<String>,
    pub font_size: Option<String>,
    pub color: Option<Rgb>,
    /// Destination of the link under the cursor or covering the whole selection
    pub link: Option<String>,
}

impl FormatState {
    pub fn is_active(&self, flag: StyleFlag) -> bool {
        match flag {
            StyleFlag::Bold => self.bold,
            StyleFlag::Italic => self.italic,
            StyleFlag::Underline => self.underline,
            StyleFlag::Strikethrough => self.strikethrough,
        }
    }
}

/// Compute the formatting reported for a selection.
/// A flag is only active when every text run in the selection has it; a
/// collapsed selection reports its pending style or the style it would type with.
pub fn compute_active_formats(doc: &StructuredDocument, selection: &Selection) -> FormatState {
    if doc.is_empty() {
        return FormatState::default();
    }
    let selection = selection.clamped(doc);
    let (start, end) = selection.range();

    let (styles, link) = if selection.is_collapsed() {
        let style = selection
            .pending
            .clone()
            .unwrap_or_else(|| doc.style_at(start));
        let link = doc.link_at(start).map(|link| link.destination.clone());
        (vec![style], link)
    } else {
        let runs = doc.runs_in_range(start, end);
        let links: Vec<Option<&str>> = runs
            .iter()
            .map(|placed| placed.link.map(|link| link.destination.as_str()))
            .collect();
        let link = uniform(&links).flatten().map(str::to_string);
        (runs.iter().map(|placed| placed.run.style.clone()).collect(), link)
    };

    let all_have = |flag: StyleFlag| !styles.is_empty() && styles.iter().all(|s| s.flag(flag));

    let blocks = &doc.blocks()[start.block_index..=end.block_index];
    let text_blocks: Vec<_> = blocks.iter().filter(|b| !b.is_rule()).collect();
    let alignments: Vec<Alignment> = text_blocks.iter().map(|b| b.alignment).collect();
    let kinds: Vec<&BlockType> = text_blocks.iter().map(|b| &b.block_type).collect();

    let list_kinds: Vec<Option<ListKind>> = kinds
        .iter()
        .map(|kind| match kind {
            BlockType::ListItem { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect();
    let headings: Vec<Option<u8>> = kinds
        .iter()
        .map(|kind| match kind {
            BlockType::Heading { level } => Some(*level),
            _ => None,
        })
        .collect();

    FormatState {
        bold: all_have(StyleFlag::Bold),
        italic: all_have(StyleFlag::Italic),
        underline: all_have(StyleFlag::Underline),
        strikethrough: all_have(StyleFlag::Strikethrough),
        alignment: uniform(&alignments),
        list_kind: uniform(&list_kinds).flatten(),
        heading: uniform(&headings).flatten(),
        block_quote: !kinds.is_empty() && kinds.iter().all(|k| **k == BlockType::BlockQuote),
        font_family: uniform_value(&styles, |s| s.font_family.clone()),
        font_size: uniform_value(&styles, |s| s.font_size.clone()),
        color: uniform_value(&styles, |s| s.color),
        link,
    }
}

fn uniform_value<T: Clone + PartialEq>(
    styles: &[TextStyle],
    get: impl Fn(&TextStyle) -> Option<T>,
) -> Option<T> {
    let values: Vec<Option<T>> = styles.iter().map(get).collect();
    uniform(&values).flatten()
}

/// The shared value when every element is equal
fn uniform<T: Clone + PartialEq>(values: &[T]) -> Option<T> {
    let first = values.first()?;
    values.iter().all(|v| v == first).then(|| first.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::richtext::structured_document::{Block, DocumentPosition, InlineContent, TextRun};

    fn mixed() -> StructuredDocument {
        StructuredDocument::from_blocks(vec![
            Block::paragraph()
                .with_text("bold", TextStyle::bold())
                .with_plain_text("plain"),
            Block::heading(2).with_text("title", TextStyle::bold()),
        ])
    }

    fn range(a: (usize, usize), b: (usize, usize)) -> Selection {
        Selection::new(DocumentPosition::new(a.0, a.1), DocumentPosition::new(b.0, b.1))
    }

    #[test]
    fn test_mixed_range_reports_inactive() {
        let state = compute_active_formats(&mixed(), &range((0, 0), (0, 9)));
        for flag in StyleFlag::ALL {
            assert!(!state.is_active(flag));
        }
        assert_eq!(state.alignment, Some(Alignment::Left));
    }

    #[test]
    fn test_uniform_range_reports_active() {
        let state = compute_active_formats(&mixed(), &range((0, 1), (0, 3)));
        assert!(state.bold);
        assert!(state.is_active(StyleFlag::Bold));
        assert!(!state.italic);
    }

    #[test]
    fn test_collapsed_uses_character_before_cursor() {
        let doc = mixed();
        assert!(compute_active_formats(&doc, &Selection::collapsed(DocumentPosition::new(0, 4))).bold);
        assert!(!compute_active_formats(&doc, &Selection::collapsed(DocumentPosition::new(0, 5))).bold);
    }

    #[test]
    fn test_pending_style_wins() {
        let mut selection = Selection::collapsed(DocumentPosition::new(0, 6));
        selection.pending = Some(TextStyle::italic());
        let state = compute_active_formats(&mixed(), &selection);
        assert!(state.italic);
        assert!(!state.bold);
    }

    #[test]
    fn test_block_formats_across_blocks() {
        let doc = mixed();
        let state = compute_active_formats(&doc, &range((1, 0), (1, 5)));
        assert_eq!(state.heading, Some(2));
        let state = compute_active_formats(&doc, &range((0, 0), (1, 5)));
        assert_eq!(state.heading, None);
        assert!(!state.block_quote);
    }

    #[test]
    fn test_link_under_cursor() {
        let doc = StructuredDocument::from_blocks(vec![Block::paragraph()
            .with_plain_text("a ")
            .with_inline(InlineContent::link("https://example.com", TextRun::plain("link")))]);
        let state = compute_active_formats(&doc, &Selection::collapsed(DocumentPosition::new(0, 4)));
        assert_eq!(state.link.as_deref(), Some("https://example.com"));
        let state = compute_active_formats(&doc, &range((0, 0), (0, 6)));
        assert_eq!(state.link, None);
    }
}
