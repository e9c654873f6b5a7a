// Selection tracking
// A selection is a pair of document positions plus the style the next typed
// character will take. Across edits it is carried as block-id markers so it
// survives blocks being inserted, split and merged.

use super::structured_document::{
    DocumentPosition, ElementId, Remap, StructuredDocument, TextStyle, ordered,
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    pub anchor: DocumentPosition,
    pub focus: DocumentPosition,
    /// Style toggled while the selection was collapsed
    pub pending: Option<TextStyle>,
}

impl Selection {
    pub fn new(anchor: DocumentPosition, focus: DocumentPosition) -> Self {
        Selection {
            anchor,
            focus,
            pending: None,
        }
    }

    pub fn collapsed(position: DocumentPosition) -> Self {
        Self::new(position, position)
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// (start, end) in document order
    pub fn range(&self) -> (DocumentPosition, DocumentPosition) {
        ordered(self.anchor, self.focus)
    }

    pub fn start(&self) -> DocumentPosition {
        self.range().0
    }

    pub fn end(&self) -> DocumentPosition {
        self.range().1
    }

    /// Clamp both ends into the document
    pub fn clamped(&self, doc: &StructuredDocument) -> Selection {
        Selection {
            anchor: doc.clamp_position(self.anchor),
            focus: doc.clamp_position(self.focus),
            pending: self.pending.clone(),
        }
    }
}

/// A position expressed against a block identity instead of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub block: ElementId,
    pub offset: usize,
}

/// A selection detached from block indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSelection {
    pub anchor: Marker,
    pub focus: Marker,
    pub pending: Option<TextStyle>,
    anchor_absorbed: bool,
    focus_absorbed: bool,
}

impl SavedSelection {
    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// Move the markers through the remaps produced by an edit.
    /// A ranged selection with an end inside deleted content collapses onto
    /// the boundary where that content was.
    pub fn apply_remaps(&mut self, remaps: &[Remap]) {
        let was_collapsed = self.is_collapsed();
        for remap in remaps {
            let (anchor, absorbed) = remap_marker(self.anchor, remap);
            self.anchor = anchor;
            self.anchor_absorbed |= absorbed;
            let (focus, absorbed) = remap_marker(self.focus, remap);
            self.focus = focus;
            self.focus_absorbed |= absorbed;
        }

        if !was_collapsed {
            if self.anchor_absorbed {
                self.focus = self.anchor;
            } else if self.focus_absorbed {
                self.anchor = self.focus;
            }
        }
        self.anchor_absorbed = false;
        self.focus_absorbed = false;
    }
}

fn remap_marker(marker: Marker, remap: &Remap) -> (Marker, bool) {
    let Marker { block, offset } = marker;
    match *remap {
        Remap::Inserted { block: b, at, len } if b == block && offset >= at => {
            (Marker { block, offset: offset + len }, false)
        }
        Remap::Deleted {
            block: b,
            start,
            end,
            joins_previous,
            joins_next,
        } if b == block => {
            let after_start = start < offset || (offset == start && joins_previous);
            let before_end = offset < end || (offset == end && joins_next);
            let offset = if offset <= start {
                offset
            } else if offset >= end {
                offset - (end - start)
            } else {
                start
            };
            (Marker { block, offset }, after_start && before_end)
        }
        Remap::Absorbed {
            block: b,
            into,
            offset: target,
        } if b == block => (
            Marker {
                block: into,
                offset: target,
            },
            true,
        ),
        Remap::Split { block: b, at, into } if b == block && offset >= at => (
            Marker {
                block: into,
                offset: offset - at,
            },
            false,
        ),
        Remap::Merged {
            block: b,
            into,
            offset: base,
        } if b == block => (
            Marker {
                block: into,
                offset: base + offset,
            },
            false,
        ),
        _ => (marker, false),
    }
}

/// Record a selection as block-id markers
pub fn capture(doc: &StructuredDocument, selection: &Selection) -> SavedSelection {
    let marker = |position: DocumentPosition| {
        let position = doc.clamp_position(position);
        Marker {
            block: doc.block(position.block_index).map(|b| b.id).unwrap_or(0),
            offset: position.offset,
        }
    };
    SavedSelection {
        anchor: marker(selection.anchor),
        focus: marker(selection.focus),
        pending: selection.pending.clone(),
        anchor_absorbed: false,
        focus_absorbed: false,
    }
}

/// Resolve markers back to positions. A marker whose block no longer exists
/// falls back to the start of the document.
pub fn restore(doc: &StructuredDocument, saved: &SavedSelection) -> Selection {
    let resolve = |marker: Marker| match doc.find_block_index(marker.block) {
        Some(index) => doc.clamp_position(DocumentPosition::new(index, marker.offset)),
        None => doc.clamp_position(DocumentPosition::start()),
    };
    Selection {
        anchor: resolve(saved.anchor),
        focus: resolve(saved.focus),
        pending: saved.pending.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::richtext::structured_document::{Block, Edit};

    fn doc() -> StructuredDocument {
        StructuredDocument::from_blocks(vec![
            Block::paragraph().with_plain_text("alpha"),
            Block::paragraph().with_plain_text("beta"),
            Block::paragraph().with_plain_text("gamma"),
        ])
    }

    fn apply(doc: &mut StructuredDocument, selection: &Selection, edit: Edit) -> Selection {
        let mut saved = capture(doc, selection);
        let outcome = doc.apply(edit).unwrap();
        saved.apply_remaps(&outcome.remaps);
        restore(doc, &saved)
    }

    #[test]
    fn test_insert_before_cursor_shifts_it() {
        let mut d = doc();
        let sel = Selection::collapsed(DocumentPosition::new(0, 3));
        let sel = apply(
            &mut d,
            &sel,
            Edit::InsertText {
                at: DocumentPosition::new(0, 1),
                text: "xy".into(),
                style: TextStyle::plain(),
            },
        );
        assert_eq!(sel.focus, DocumentPosition::new(0, 5));
    }

    #[test]
    fn test_ranged_selection_overlapping_delete_collapses() {
        let mut d = doc();
        let sel = Selection::new(DocumentPosition::new(0, 1), DocumentPosition::new(1, 2));
        let sel = apply(
            &mut d,
            &sel,
            Edit::DeleteRange {
                anchor: DocumentPosition::new(0, 3),
                focus: DocumentPosition::new(2, 1),
            },
        );
        assert!(sel.is_collapsed());
        assert_eq!(sel.focus, DocumentPosition::new(0, 3));
        assert_eq!(d.blocks()[0].to_plain_text(), "alpamma");
    }

    #[test]
    fn test_selection_after_deleted_range_survives() {
        let mut d = doc();
        let sel = Selection::new(DocumentPosition::new(2, 1), DocumentPosition::new(2, 4));
        let sel = apply(
            &mut d,
            &sel,
            Edit::DeleteRange {
                anchor: DocumentPosition::new(0, 5),
                focus: DocumentPosition::new(1, 0),
            },
        );
        assert_eq!(sel.anchor, DocumentPosition::new(1, 1));
        assert_eq!(sel.focus, DocumentPosition::new(1, 4));
    }

    #[test]
    fn test_split_moves_cursor_to_new_block() {
        let mut d = doc();
        let sel = Selection::collapsed(DocumentPosition::new(1, 2));
        let sel = apply(
            &mut d,
            &sel,
            Edit::SplitBlock {
                at: DocumentPosition::new(1, 2),
            },
        );
        assert_eq!(sel.focus, DocumentPosition::new(2, 0));
    }

    #[test]
    fn test_backspace_merge_moves_cursor_to_join() {
        let mut d = doc();
        let sel = Selection::collapsed(DocumentPosition::new(1, 0));
        let sel = apply(
            &mut d,
            &sel,
            Edit::DeleteRange {
                anchor: DocumentPosition::new(0, 5),
                focus: DocumentPosition::new(1, 0),
            },
        );
        assert_eq!(sel.focus, DocumentPosition::new(0, 5));
    }

    #[test]
    fn test_restore_missing_block_falls_back_to_start() {
        let d = doc();
        let saved = SavedSelection {
            anchor: Marker {
                block: 999,
                offset: 3,
            },
            focus: Marker {
                block: 999,
                offset: 3,
            },
            pending: None,
            anchor_absorbed: false,
            focus_absorbed: false,
        };
        assert_eq!(restore(&d, &saved), Selection::collapsed(DocumentPosition::start()));
    }

    #[test]
    fn test_restore_clamps_offset() {
        let mut d = doc();
        let saved = capture(&d, &Selection::collapsed(DocumentPosition::new(2, 5)));
        d.apply(Edit::DeleteRange {
            anchor: DocumentPosition::new(2, 0),
            focus: DocumentPosition::new(2, 5),
        })
        .unwrap();
        assert_eq!(restore(&d, &saved).focus, DocumentPosition::new(2, 0));
    }

    #[test]
    fn test_pending_style_carried() {
        let d = doc();
        let mut sel = Selection::collapsed(DocumentPosition::new(0, 2));
        sel.pending = Some(TextStyle::bold());
        assert_eq!(restore(&d, &capture(&d, &sel)).pending, Some(TextStyle::bold()));
    }
}
