// Structured Document Model
// A document representation independent of the markup used to store it.
// Markup is only a storage/serialization format (see markup_converter).

use std::cmp::{max, min};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use unicode_segmentation::UnicodeSegmentation;

/// Unique identifier for document blocks
pub type ElementId = usize;

/// Character an image occupies in a block's flattened text
pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';

/// Deepest list nesting the editor will produce
pub const MAX_LIST_DEPTH: u8 = 8;

/// A foreground color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Parse `#rgb`, `#rrggbb` or `rgb(r, g, b)`
    pub fn parse(value: &str) -> Option<Rgb> {
        let value = value.trim();
        if let Some(hex) = value.strip_prefix('#') {
            if !hex.is_ascii() {
                return None;
            }
            return match hex.len() {
                3 => {
                    let mut digits = hex.chars().map(|c| c.to_digit(16).map(|d| (d * 17) as u8));
                    Some(Rgb::new(digits.next()??, digits.next()??, digits.next()??))
                }
                6 => Some(Rgb::new(
                    u8::from_str_radix(&hex[0..2], 16).ok()?,
                    u8::from_str_radix(&hex[2..4], 16).ok()?,
                    u8::from_str_radix(&hex[4..6], 16).ok()?,
                )),
                _ => None,
            };
        }

        let lower = value.to_ascii_lowercase();
        let inner = lower.strip_prefix("rgb(")?.strip_suffix(')')?;
        let channels = inner
            .split(',')
            .map(|part| part.trim().parse::<u8>().ok())
            .collect::<Option<Vec<u8>>>()?;
        match channels.as_slice() {
            [r, g, b] => Some(Rgb::new(*r, *g, *b)),
            _ => None,
        }
    }
}

/// The boolean style flags a text run can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleFlag {
    Bold,
    Italic,
    Underline,
    Strikethrough,
}

impl StyleFlag {
    pub const ALL: [StyleFlag; 4] = [
        StyleFlag::Bold,
        StyleFlag::Italic,
        StyleFlag::Underline,
        StyleFlag::Strikethrough,
    ];
}

/// Text styling (semantic, not syntactic)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub font_family: Option<String>,
    pub font_size: Option<String>,
    pub color: Option<Rgb>,
}

impl TextStyle {
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn bold() -> Self {
        TextStyle {
            bold: true,
            ..Default::default()
        }
    }

    pub fn italic() -> Self {
        TextStyle {
            italic: true,
            ..Default::default()
        }
    }

    pub fn flag(&self, flag: StyleFlag) -> bool {
        match flag {
            StyleFlag::Bold => self.bold,
            StyleFlag::Italic => self.italic,
            StyleFlag::Underline => self.underline,
            StyleFlag::Strikethrough => self.strikethrough,
        }
    }

    /// A copy of this style with one flag set to `on`
    pub fn with_flag(&self, flag: StyleFlag, on: bool) -> Self {
        let mut style = self.clone();
        match flag {
            StyleFlag::Bold => style.bold = on,
            StyleFlag::Italic => style.italic = on,
            StyleFlag::Underline => style.underline = on,
            StyleFlag::Strikethrough => style.strikethrough = on,
        }
        style
    }

    pub fn has_font_attributes(&self) -> bool {
        self.font_family.is_some() || self.font_size.is_some() || self.color.is_some()
    }
}

/// A change applied to every run inside a range
#[derive(Debug, Clone, PartialEq)]
pub enum StyleChange {
    Flag(StyleFlag, bool),
    FontFamily(Option<String>),
    FontSize(Option<String>),
    Color(Option<Rgb>),
    Clear,
}

impl StyleChange {
    /// Build the replacement style for a run; the original is left untouched
    pub fn applied_to(&self, style: &TextStyle) -> TextStyle {
        match self {
            StyleChange::Flag(flag, on) => style.with_flag(*flag, *on),
            StyleChange::FontFamily(family) => TextStyle {
                font_family: family.clone(),
                ..style.clone()
            },
            StyleChange::FontSize(size) => TextStyle {
                font_size: size.clone(),
                ..style.clone()
            },
            StyleChange::Color(color) => TextStyle {
                color: *color,
                ..style.clone()
            },
            StyleChange::Clear => TextStyle::default(),
        }
    }
}

/// A run of styled text (a contiguous piece of text with uniform styling)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    pub text: String,
    pub style: TextStyle,
}

impl TextRun {
    pub fn new(text: impl Into<String>, style: TextStyle) -> Self {
        TextRun {
            text: text.into(),
            style,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, TextStyle::plain())
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Split this text run at the given byte offset
    /// Returns (left_run, right_run)
    pub fn split_at(&self, offset: usize) -> (TextRun, TextRun) {
        let offset = floor_char_boundary(&self.text, offset);
        let (left, right) = self.text.split_at(offset);
        (
            TextRun::new(left, self.style.clone()),
            TextRun::new(right, self.style.clone()),
        )
    }
}

static NEXT_ANCHOR: AtomicU64 = AtomicU64::new(1);

/// Link destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub destination: String,
    /// Open in a new browsing context; always set for links the editor creates
    pub new_context: bool,
    /// Shared by the pieces of one anchor. Only pieces of the same anchor merge.
    pub anchor: u64,
}

impl Link {
    pub fn new(destination: impl Into<String>) -> Self {
        Link {
            destination: destination.into(),
            new_context: true,
            anchor: NEXT_ANCHOR.fetch_add(1, Ordering::Relaxed),
        }
    }
}

/// Inline content (can appear within a block)
#[derive(Debug, Clone, PartialEq)]
pub enum InlineContent {
    Text(TextRun),
    Link { link: Link, runs: Vec<TextRun> },
    Image { source: String },
}

impl InlineContent {
    /// Get the flattened text length of this inline content
    pub fn text_len(&self) -> usize {
        match self {
            InlineContent::Text(run) => run.len(),
            InlineContent::Link { runs, .. } => runs.iter().map(TextRun::len).sum(),
            InlineContent::Image { .. } => OBJECT_REPLACEMENT.len_utf8(),
        }
    }

    /// Flatten to plain text
    pub fn to_plain_text(&self) -> String {
        match self {
            InlineContent::Text(run) => run.text.clone(),
            InlineContent::Link { runs, .. } => runs.iter().map(|r| r.text.as_str()).collect(),
            InlineContent::Image { .. } => OBJECT_REPLACEMENT.to_string(),
        }
    }

    pub fn link(destination: impl Into<String>, label: TextRun) -> Self {
        InlineContent::Link {
            link: Link::new(destination),
            runs: vec![label],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    Ordered,
    Unordered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

impl Alignment {
    pub fn as_css(&self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
            Alignment::Justify => "justify",
        }
    }

    pub fn from_css(value: &str) -> Option<Alignment> {
        match value.trim().to_ascii_lowercase().as_str() {
            "left" | "start" => Some(Alignment::Left),
            "center" => Some(Alignment::Center),
            "right" | "end" => Some(Alignment::Right),
            "justify" => Some(Alignment::Justify),
            _ => None,
        }
    }
}

/// Block-level content types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockType {
    Paragraph,
    Heading { level: u8 }, // 1-6
    ListItem { kind: ListKind, depth: u8 },
    BlockQuote,
    HorizontalRule,
}

/// A block of content
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: ElementId,
    pub block_type: BlockType,
    pub alignment: Alignment,
    pub content: Vec<InlineContent>,
}

/// A text run together with where it sits in its block
#[derive(Debug, Clone, Copy)]
pub struct PlacedRun<'a> {
    pub block_index: usize,
    pub start: usize,
    pub run: &'a TextRun,
    pub link: Option<&'a Link>,
}

impl PlacedRun<'_> {
    pub fn end(&self) -> usize {
        self.start + self.run.len()
    }
}

impl Block {
    /// A new block; its id is assigned when it is added to a document
    pub fn new(block_type: BlockType) -> Self {
        Block {
            id: 0,
            block_type,
            alignment: Alignment::Left,
            content: Vec::new(),
        }
    }

    pub fn paragraph() -> Self {
        Self::new(BlockType::Paragraph)
    }

    pub fn heading(level: u8) -> Self {
        Self::new(BlockType::Heading {
            level: level.clamp(1, 6),
        })
    }

    pub fn list_item(kind: ListKind, depth: u8) -> Self {
        Self::new(BlockType::ListItem {
            kind,
            depth: depth.min(MAX_LIST_DEPTH),
        })
    }

    pub fn block_quote() -> Self {
        Self::new(BlockType::BlockQuote)
    }

    pub fn rule() -> Self {
        Self::new(BlockType::HorizontalRule)
    }

    pub fn with_text(mut self, text: impl Into<String>, style: TextStyle) -> Self {
        self.content
            .push(InlineContent::Text(TextRun::new(text, style)));
        self
    }

    pub fn with_plain_text(mut self, text: impl Into<String>) -> Self {
        self.content.push(InlineContent::Text(TextRun::plain(text)));
        self
    }

    pub fn with_inline(mut self, inline: InlineContent) -> Self {
        self.content.push(inline);
        self
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    /// Get the total text length of this block
    pub fn text_len(&self) -> usize {
        self.content.iter().map(|c| c.text_len()).sum()
    }

    /// Get plain text content
    pub fn to_plain_text(&self) -> String {
        self.content.iter().map(|c| c.to_plain_text()).collect()
    }

    /// Check if this block has no content at all
    pub fn is_empty(&self) -> bool {
        self.text_len() == 0
    }

    pub fn is_rule(&self) -> bool {
        self.block_type == BlockType::HorizontalRule
    }

    pub fn list_depth(&self) -> Option<u8> {
        match self.block_type {
            BlockType::ListItem { depth, .. } => Some(depth),
            _ => None,
        }
    }

    /// Largest valid offset that is not past `offset`
    pub fn floor_boundary(&self, offset: usize) -> usize {
        floor_char_boundary(&self.to_plain_text(), offset)
    }

    /// Offset of the grapheme boundary before `offset`
    pub fn previous_grapheme(&self, offset: usize) -> usize {
        let text = self.to_plain_text();
        let offset = floor_char_boundary(&text, offset);
        text[..offset]
            .grapheme_indices(true)
            .next_back()
            .map(|(index, _)| index)
            .unwrap_or(0)
    }

    /// Offset of the grapheme boundary after `offset`
    pub fn next_grapheme(&self, offset: usize) -> usize {
        let text = self.to_plain_text();
        let offset = floor_char_boundary(&text, offset);
        text[offset..]
            .graphemes(true)
            .next()
            .map(|grapheme| offset + grapheme.len())
            .unwrap_or(offset)
    }

    /// Every text run of the block (including link labels) with its start offset
    pub fn text_runs(&self, block_index: usize) -> Vec<PlacedRun<'_>> {
        let mut placed = Vec::new();
        let mut pos = 0usize;
        for item in &self.content {
            match item {
                InlineContent::Text(run) => {
                    placed.push(PlacedRun {
                        block_index,
                        start: pos,
                        run,
                        link: None,
                    });
                    pos += run.len();
                }
                InlineContent::Link { link, runs } => {
                    for run in runs {
                        placed.push(PlacedRun {
                            block_index,
                            start: pos,
                            run,
                            link: Some(link),
                        });
                        pos += run.len();
                    }
                }
                InlineContent::Image { .. } => pos += item.text_len(),
            }
        }
        placed
    }
}

fn floor_char_boundary(text: &str, offset: usize) -> usize {
    let mut offset = min(offset, text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Split inline content at a flattened offset into (left, right).
/// Links straddling the offset are split into two links with the same destination.
pub fn split_content(
    content: &[InlineContent],
    offset: usize,
) -> (Vec<InlineContent>, Vec<InlineContent>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut pos = 0usize;

    for item in content {
        let len = item.text_len();
        if pos + len <= offset {
            left.push(item.clone());
        } else if pos >= offset {
            right.push(item.clone());
        } else {
            let local = offset - pos;
            match item {
                InlineContent::Text(run) => {
                    let (l, r) = run.split_at(local);
                    left.push(InlineContent::Text(l));
                    right.push(InlineContent::Text(r));
                }
                InlineContent::Link { link, runs } => {
                    let (l, r) = split_runs(runs, local);
                    left.push(InlineContent::Link {
                        link: link.clone(),
                        runs: l,
                    });
                    right.push(InlineContent::Link {
                        link: link.clone(),
                        runs: r,
                    });
                }
                // Offsets never land inside an image
                InlineContent::Image { .. } => right.push(item.clone()),
            }
        }
        pos += len;
    }

    (left, right)
}

fn split_runs(runs: &[TextRun], offset: usize) -> (Vec<TextRun>, Vec<TextRun>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut pos = 0usize;
    for run in runs {
        let len = run.len();
        if pos + len <= offset {
            left.push(run.clone());
        } else if pos >= offset {
            right.push(run.clone());
        } else {
            let (l, r) = run.split_at(offset - pos);
            left.push(l);
            right.push(r);
        }
        pos += len;
    }
    (left, right)
}

/// Split content into three parts: before, within and after [start..end)
pub fn split_range(
    content: &[InlineContent],
    start: usize,
    end: usize,
) -> (Vec<InlineContent>, Vec<InlineContent>, Vec<InlineContent>) {
    let (before, rest) = split_content(content, start);
    let (selected, after) = split_content(&rest, end.saturating_sub(start));
    (before, selected, after)
}

/// Merge adjacent runs with equal styles and adjacent links with equal
/// destinations; drop empty runs and links whose label became empty.
pub fn normalize_content(content: Vec<InlineContent>) -> Vec<InlineContent> {
    let mut out: Vec<InlineContent> = Vec::with_capacity(content.len());
    for item in content {
        match item {
            InlineContent::Text(run) => {
                if run.is_empty() {
                    continue;
                }
                if let Some(InlineContent::Text(prev)) = out.last_mut()
                    && prev.style == run.style
                {
                    prev.text.push_str(&run.text);
                    continue;
                }
                out.push(InlineContent::Text(run));
            }
            InlineContent::Link { link, runs } => {
                let runs = merge_runs(runs);
                if runs.is_empty() {
                    continue;
                }
                if let Some(InlineContent::Link {
                    link: prev_link,
                    runs: prev_runs,
                }) = out.last_mut()
                    && *prev_link == link
                {
                    prev_runs.extend(runs);
                    *prev_runs = merge_runs(std::mem::take(prev_runs));
                    continue;
                }
                out.push(InlineContent::Link { link, runs });
            }
            image @ InlineContent::Image { .. } => out.push(image),
        }
    }
    out
}

fn merge_runs(runs: Vec<TextRun>) -> Vec<TextRun> {
    let mut out: Vec<TextRun> = Vec::with_capacity(runs.len());
    for run in runs {
        if run.is_empty() {
            continue;
        }
        if let Some(prev) = out.last_mut()
            && prev.style == run.style
        {
            prev.text.push_str(&run.text);
            continue;
        }
        out.push(run);
    }
    out
}

/// Position within a document
/// This represents a logical cursor position in the structured content
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DocumentPosition {
    pub block_index: usize,
    pub offset: usize, // Byte offset within the block's flattened text
}

impl DocumentPosition {
    pub fn new(block_index: usize, offset: usize) -> Self {
        DocumentPosition {
            block_index,
            offset,
        }
    }

    pub fn start() -> Self {
        DocumentPosition::new(0, 0)
    }
}

/// Where a position falls inside a block's inline sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlinePoint {
    pub inline_index: usize,
    pub within: InlineOffset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineOffset {
    /// Offset into the text (or link label) of the inline
    Text(usize),
    /// Before a non-text inline
    Before,
    /// After a non-text inline
    After,
}

/// What a range gets wrapped in
#[derive(Debug, Clone, PartialEq)]
pub enum Wrapper {
    Link(Link),
}

/// A primitive document mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    InsertInline {
        at: DocumentPosition,
        node: InlineContent,
    },
    InsertText {
        at: DocumentPosition,
        text: String,
        style: TextStyle,
    },
    DeleteRange {
        anchor: DocumentPosition,
        focus: DocumentPosition,
    },
    WrapRange {
        anchor: DocumentPosition,
        focus: DocumentPosition,
        wrapper: Wrapper,
    },
    UnwrapRange {
        anchor: DocumentPosition,
        focus: DocumentPosition,
    },
    RestyleRange {
        anchor: DocumentPosition,
        focus: DocumentPosition,
        change: StyleChange,
    },
    SetBlockKind {
        block_index: usize,
        kind: BlockType,
    },
    SetAlignment {
        block_index: usize,
        alignment: Alignment,
    },
    SplitBlock {
        at: DocumentPosition,
    },
    InsertBlock {
        index: usize,
        block: Block,
    },
}

/// How block-relative offsets moved during an edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remap {
    /// `len` bytes were inserted at `at`; offsets at or after it shift right
    Inserted {
        block: ElementId,
        at: usize,
        len: usize,
    },
    /// [start..end) was removed. `joins_previous`/`joins_next` mark a deletion
    /// that continues across the block break on that side.
    Deleted {
        block: ElementId,
        start: usize,
        end: usize,
        joins_previous: bool,
        joins_next: bool,
    },
    /// The whole block was deleted as part of a range; its offsets land at `offset` in `into`
    Absorbed {
        block: ElementId,
        into: ElementId,
        offset: usize,
    },
    /// Offsets at or after `at` moved to the start of the new block `into`
    Split {
        block: ElementId,
        at: usize,
        into: ElementId,
    },
    /// The block was appended to `into` at `offset`
    Merged {
        block: ElementId,
        into: ElementId,
        offset: usize,
    },
}

/// Result of applying an edit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditOutcome {
    pub remaps: Vec<Remap>,
    /// A link wrap was cut short at the end of its first block
    pub clipped_at_block_boundary: bool,
}

impl EditOutcome {
    fn with_remap(remap: Remap) -> Self {
        EditOutcome {
            remaps: vec![remap],
            clipped_at_block_boundary: false,
        }
    }
}

/// Errors that can occur while applying an edit
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("position {0:?} is not a valid offset in the document")]
    InvalidPosition(DocumentPosition),
    #[error("block index {0} is out of range")]
    InvalidBlockIndex(usize),
    #[error("the document has no blocks")]
    EmptyDocument,
    #[error("block {0} does not hold inline content")]
    NotATextBlock(usize),
    #[error("block {0} has content and cannot become a rule")]
    InvalidBlockKind(usize),
    #[error("URL must not be empty")]
    EmptyUrl,
    #[error("link label must not be empty")]
    EmptyLabel,
}

/// The structured document
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredDocument {
    blocks: Vec<Block>,
    next_id: ElementId,
}

impl StructuredDocument {
    pub fn new() -> Self {
        StructuredDocument {
            blocks: Vec::new(),
            next_id: 1,
        }
    }

    /// Build a document from blocks, assigning ids. Never returns an empty document.
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        let mut doc = Self::new();
        for block in blocks {
            doc.add_block(block);
        }
        if doc.is_empty() {
            doc.add_block(Block::paragraph());
        }
        doc
    }

    /// Create a simple document with one paragraph
    pub fn with_paragraph(text: impl Into<String>) -> Self {
        Self::from_blocks(vec![Block::paragraph().with_plain_text(text)])
    }

    /// Get a unique element ID
    fn next_id(&mut self) -> ElementId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    /// Add a block, returning its id
    pub fn add_block(&mut self, block: Block) -> ElementId {
        let index = self.blocks.len();
        self.insert_block(index, block)
    }

    /// Insert a block at a specific position, returning its id
    pub fn insert_block(&mut self, index: usize, mut block: Block) -> ElementId {
        block.id = self.next_id();
        block.content = normalize_content(block.content);
        let id = block.id;
        self.blocks.insert(index.min(self.blocks.len()), block);
        id
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Find block index by ID
    pub fn find_block_index(&self, id: ElementId) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == id)
    }

    /// Validate and clamp a position to document bounds
    pub fn clamp_position(&self, pos: DocumentPosition) -> DocumentPosition {
        if self.blocks.is_empty() {
            return DocumentPosition::start();
        }

        let block_index = pos.block_index.min(self.blocks.len() - 1);
        let offset = self.blocks[block_index].floor_boundary(pos.offset);
        DocumentPosition::new(block_index, offset)
    }

    /// End of the last block
    pub fn end_position(&self) -> DocumentPosition {
        match self.blocks.last() {
            Some(block) => DocumentPosition::new(self.blocks.len() - 1, block.text_len()),
            None => DocumentPosition::start(),
        }
    }

    /// Convert to plain text
    pub fn to_plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.to_plain_text())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Merge adjacent equal runs and links in one block
    pub fn normalize_block(&mut self, index: usize) {
        if let Some(block) = self.blocks.get_mut(index) {
            block.content = normalize_content(std::mem::take(&mut block.content));
        }
    }

    /// Resolve a position to an inline index and an offset or marker within it.
    /// When the position sits on a boundary, the inline ending there wins.
    pub fn locate(&self, pos: DocumentPosition) -> Option<InlinePoint> {
        let block = self.blocks.get(pos.block_index)?;
        let mut start = 0usize;
        for (inline_index, item) in block.content.iter().enumerate() {
            let end = start + item.text_len();
            if pos.offset <= end {
                let within = match item {
                    InlineContent::Image { .. } if pos.offset == start => InlineOffset::Before,
                    InlineContent::Image { .. } => InlineOffset::After,
                    _ => InlineOffset::Text(pos.offset - start),
                };
                return Some(InlinePoint {
                    inline_index,
                    within,
                });
            }
            start = end;
        }
        None
    }

    /// The link strictly enclosing a position, if any
    pub fn link_at(&self, pos: DocumentPosition) -> Option<&Link> {
        let point = self.locate(pos)?;
        let item = self.blocks[pos.block_index].content.get(point.inline_index)?;
        match (item, point.within) {
            (InlineContent::Link { link, .. }, InlineOffset::Text(local))
                if local > 0 && local < item.text_len() =>
            {
                Some(link)
            }
            _ => None,
        }
    }

    /// Style that text typed at `pos` inherits: that of the character before it,
    /// or of the first run when the position is at the start of the block.
    pub fn style_at(&self, pos: DocumentPosition) -> TextStyle {
        let Some(block) = self.blocks.get(pos.block_index) else {
            return TextStyle::default();
        };
        let runs = block.text_runs(pos.block_index);
        runs.iter()
            .rev()
            .find(|placed| placed.start < pos.offset)
            .or_else(|| runs.first())
            .map(|placed| placed.run.style.clone())
            .unwrap_or_default()
    }

    /// Text runs overlapping [start..end) by at least one byte
    pub fn runs_in_range(&self, start: DocumentPosition, end: DocumentPosition) -> Vec<PlacedRun<'_>> {
        let (start, end) = ordered(start, end);
        let mut placed = Vec::new();
        if self.blocks.is_empty() {
            return placed;
        }
        let last = end.block_index.min(self.blocks.len() - 1);
        for block_index in start.block_index..=last {
            let block = &self.blocks[block_index];
            let (from, to) = local_range(block, block_index, start, end);
            placed.extend(
                block
                    .text_runs(block_index)
                    .into_iter()
                    .filter(|run| run.start < to && run.end() > from),
            );
        }
        placed
    }

    /// Apply a primitive edit
    pub fn apply(&mut self, edit: Edit) -> Result<EditOutcome, EditError> {
        match edit {
            Edit::InsertInline { at, node } => self.insert_inline(at, node),
            Edit::InsertText { at, text, style } => self.insert_text(at, text, style),
            Edit::DeleteRange { anchor, focus } => self.delete_range(anchor, focus),
            Edit::WrapRange {
                anchor,
                focus,
                wrapper,
            } => self.wrap_range(anchor, focus, wrapper),
            Edit::UnwrapRange { anchor, focus } => self.unwrap_range(anchor, focus),
            Edit::RestyleRange {
                anchor,
                focus,
                change,
            } => self.restyle_range(anchor, focus, &change),
            Edit::SetBlockKind { block_index, kind } => self.set_block_kind(block_index, kind),
            Edit::SetAlignment {
                block_index,
                alignment,
            } => {
                let block = self
                    .blocks
                    .get_mut(block_index)
                    .ok_or(EditError::InvalidBlockIndex(block_index))?;
                block.alignment = alignment;
                Ok(EditOutcome::default())
            }
            Edit::SplitBlock { at } => self.split_block(at),
            Edit::InsertBlock { index, block } => {
                if index > self.blocks.len() {
                    return Err(EditError::InvalidBlockIndex(index));
                }
                self.insert_block(index, block);
                Ok(EditOutcome::default())
            }
        }
    }

    fn check_position(&self, pos: DocumentPosition) -> Result<&Block, EditError> {
        let block = self.blocks.get(pos.block_index).ok_or(if self.blocks.is_empty() {
            EditError::EmptyDocument
        } else {
            EditError::InvalidBlockIndex(pos.block_index)
        })?;
        if pos.offset > block.text_len() || block.floor_boundary(pos.offset) != pos.offset {
            return Err(EditError::InvalidPosition(pos));
        }
        Ok(block)
    }

    fn check_text_position(&self, pos: DocumentPosition) -> Result<(), EditError> {
        if self.check_position(pos)?.is_rule() {
            return Err(EditError::NotATextBlock(pos.block_index));
        }
        Ok(())
    }

    fn insert_inline(
        &mut self,
        at: DocumentPosition,
        node: InlineContent,
    ) -> Result<EditOutcome, EditError> {
        self.check_text_position(at)?;
        match &node {
            InlineContent::Text(run) if run.is_empty() => return Ok(EditOutcome::default()),
            InlineContent::Link { link, runs } => {
                if link.destination.trim().is_empty() {
                    return Err(EditError::EmptyUrl);
                }
                if runs.iter().all(TextRun::is_empty) {
                    return Err(EditError::EmptyLabel);
                }
            }
            InlineContent::Image { source } if source.trim().is_empty() => {
                return Err(EditError::EmptyUrl);
            }
            _ => {}
        }

        let len = node.text_len();
        let block = &mut self.blocks[at.block_index];
        let (mut left, right) = split_content(&block.content, at.offset);
        left.push(node);
        left.extend(right);
        block.content = normalize_content(left);
        Ok(EditOutcome::with_remap(Remap::Inserted {
            block: block.id,
            at: at.offset,
            len,
        }))
    }

    fn insert_text(
        &mut self,
        at: DocumentPosition,
        text: String,
        style: TextStyle,
    ) -> Result<EditOutcome, EditError> {
        self.check_text_position(at)?;
        if text.is_empty() {
            return Ok(EditOutcome::default());
        }

        let len = text.len();
        let block = &mut self.blocks[at.block_index];
        let (mut left, right) = split_content(&block.content, at.offset);
        let run = TextRun::new(text, style);

        // Typing strictly inside a link extends its label; at its edges the text stays outside
        let inside_link = matches!(
            (left.last(), right.first()),
            (
                Some(InlineContent::Link { link: before, .. }),
                Some(InlineContent::Link { link: after, .. })
            ) if before == after
        );
        match left.last_mut() {
            Some(InlineContent::Link { runs, .. }) if inside_link => runs.push(run),
            _ => left.push(InlineContent::Text(run)),
        }
        left.extend(right);
        block.content = normalize_content(left);
        Ok(EditOutcome::with_remap(Remap::Inserted {
            block: block.id,
            at: at.offset,
            len,
        }))
    }

    /// Delete content in [start..end) across blocks.
    /// If the range spans multiple blocks, the head of the first block and the tail
    /// of the last block are merged and all blocks in between are removed.
    fn delete_range(
        &mut self,
        anchor: DocumentPosition,
        focus: DocumentPosition,
    ) -> Result<EditOutcome, EditError> {
        self.check_position(anchor)?;
        self.check_position(focus)?;
        let (start, end) = ordered(anchor, focus);
        if start == end {
            return Ok(EditOutcome::default());
        }

        if start.block_index == end.block_index {
            let block = &mut self.blocks[start.block_index];
            let (mut content, _, right) = split_range(&block.content, start.offset, end.offset);
            content.extend(right);
            block.content = normalize_content(content);
            return Ok(EditOutcome::with_remap(Remap::Deleted {
                block: block.id,
                start: start.offset,
                end: end.offset,
                joins_previous: false,
                joins_next: false,
            }));
        }

        let first = &self.blocks[start.block_index];
        let last = &self.blocks[end.block_index];
        let (head, _) = split_content(&first.content, start.offset);
        let (_, tail) = split_content(&last.content, end.offset);

        let mut remaps = vec![Remap::Deleted {
            block: first.id,
            start: start.offset,
            end: first.text_len(),
            joins_previous: false,
            joins_next: true,
        }];
        for middle in &self.blocks[start.block_index + 1..end.block_index] {
            remaps.push(Remap::Absorbed {
                block: middle.id,
                into: first.id,
                offset: start.offset,
            });
        }
        remaps.push(Remap::Deleted {
            block: last.id,
            start: 0,
            end: end.offset,
            joins_previous: true,
            joins_next: false,
        });
        remaps.push(Remap::Merged {
            block: last.id,
            into: first.id,
            offset: start.offset,
        });

        // A rule never survives a merge
        let (block_type, alignment) = if first.is_rule() {
            (last.block_type.clone(), last.alignment)
        } else {
            (first.block_type.clone(), first.alignment)
        };

        let mut content = head;
        content.extend(tail);
        let merged = &mut self.blocks[start.block_index];
        merged.block_type = block_type;
        merged.alignment = alignment;
        merged.content = normalize_content(content);
        self.blocks.drain(start.block_index + 1..=end.block_index);

        Ok(EditOutcome {
            remaps,
            clipped_at_block_boundary: false,
        })
    }

    fn wrap_range(
        &mut self,
        anchor: DocumentPosition,
        focus: DocumentPosition,
        wrapper: Wrapper,
    ) -> Result<EditOutcome, EditError> {
        self.check_position(anchor)?;
        self.check_position(focus)?;
        let Wrapper::Link(link) = wrapper;
        if link.destination.trim().is_empty() {
            return Err(EditError::EmptyUrl);
        }

        let (start, mut end) = ordered(anchor, focus);
        let mut clipped = false;
        if end.block_index != start.block_index {
            end = DocumentPosition::new(
                start.block_index,
                self.blocks[start.block_index].text_len(),
            );
            clipped = true;
        }

        let block = &mut self.blocks[start.block_index];
        if block.is_rule() {
            return Err(EditError::NotATextBlock(start.block_index));
        }

        let (before, selected, after) = split_range(&block.content, start.offset, end.offset);
        let mut wrapped = Vec::new();
        let mut label: Vec<TextRun> = Vec::new();
        for item in selected {
            match item {
                InlineContent::Text(run) => label.push(run),
                // Existing links inside the range are retargeted, never nested
                InlineContent::Link { runs, .. } => label.extend(runs),
                InlineContent::Image { .. } => {
                    flush_link(&mut wrapped, &mut label, &link);
                    wrapped.push(item);
                }
            }
        }
        flush_link(&mut wrapped, &mut label, &link);

        if !wrapped
            .iter()
            .any(|item| matches!(item, InlineContent::Link { .. }))
        {
            return Err(EditError::EmptyLabel);
        }

        let mut content = before;
        content.extend(wrapped);
        content.extend(after);
        block.content = normalize_content(content);
        Ok(EditOutcome {
            remaps: Vec::new(),
            clipped_at_block_boundary: clipped,
        })
    }

    fn unwrap_range(
        &mut self,
        anchor: DocumentPosition,
        focus: DocumentPosition,
    ) -> Result<EditOutcome, EditError> {
        self.check_position(anchor)?;
        self.check_position(focus)?;
        let (start, end) = ordered(anchor, focus);
        let collapsed = start == end;

        for block_index in start.block_index..=end.block_index {
            let (from, to) = local_range(&self.blocks[block_index], block_index, start, end);
            let block = &mut self.blocks[block_index];
            let mut content = Vec::with_capacity(block.content.len());
            let mut pos = 0usize;
            for item in std::mem::take(&mut block.content) {
                let item_start = pos;
                let item_end = pos + item.text_len();
                pos = item_end;
                let hit = if collapsed {
                    item_start <= from && from <= item_end
                } else {
                    item_start < to && item_end > from
                };
                match item {
                    InlineContent::Link { runs, .. } if hit => {
                        content.extend(runs.into_iter().map(InlineContent::Text))
                    }
                    other => content.push(other),
                }
            }
            block.content = normalize_content(content);
        }
        Ok(EditOutcome::default())
    }

    fn restyle_range(
        &mut self,
        anchor: DocumentPosition,
        focus: DocumentPosition,
        change: &StyleChange,
    ) -> Result<EditOutcome, EditError> {
        self.check_position(anchor)?;
        self.check_position(focus)?;
        let (start, end) = ordered(anchor, focus);

        let restyle = |run: TextRun| TextRun::new(run.text, change.applied_to(&run.style));
        for block_index in start.block_index..=end.block_index {
            let (from, to) = local_range(&self.blocks[block_index], block_index, start, end);
            let block = &mut self.blocks[block_index];
            if block.is_rule() || from >= to {
                continue;
            }
            let (mut content, selected, after) = split_range(&block.content, from, to);
            content.extend(selected.into_iter().map(|item| match item {
                InlineContent::Text(run) => InlineContent::Text(restyle(run)),
                InlineContent::Link { link, runs } => InlineContent::Link {
                    link,
                    runs: runs.into_iter().map(restyle).collect(),
                },
                image => image,
            }));
            content.extend(after);
            block.content = normalize_content(content);
        }
        Ok(EditOutcome::default())
    }

    fn set_block_kind(
        &mut self,
        block_index: usize,
        kind: BlockType,
    ) -> Result<EditOutcome, EditError> {
        let block = self
            .blocks
            .get_mut(block_index)
            .ok_or(EditError::InvalidBlockIndex(block_index))?;
        let kind = match kind {
            BlockType::Heading { level } => BlockType::Heading {
                level: level.clamp(1, 6),
            },
            BlockType::ListItem { kind, depth } => BlockType::ListItem {
                kind,
                depth: depth.min(MAX_LIST_DEPTH),
            },
            other => other,
        };
        if kind == BlockType::HorizontalRule && !block.content.is_empty() {
            return Err(EditError::InvalidBlockKind(block_index));
        }
        block.block_type = kind;
        Ok(EditOutcome::default())
    }

    fn split_block(&mut self, at: DocumentPosition) -> Result<EditOutcome, EditError> {
        self.check_text_position(at)?;

        let block = &mut self.blocks[at.block_index];
        let (left, right) = split_content(&block.content, at.offset);
        let block_type = match &block.block_type {
            // A heading split at its end continues as a paragraph
            BlockType::Heading { .. } if right.is_empty() => BlockType::Paragraph,
            other => other.clone(),
        };
        let alignment = block.alignment;
        let id = block.id;
        block.content = normalize_content(left);

        let mut new_block = Block::new(block_type).with_alignment(alignment);
        new_block.content = right;
        let into = self.insert_block(at.block_index + 1, new_block);

        Ok(EditOutcome::with_remap(Remap::Split {
            block: id,
            at: at.offset,
            into,
        }))
    }
}

fn flush_link(wrapped: &mut Vec<InlineContent>, label: &mut Vec<TextRun>, link: &Link) {
    if !label.is_empty() {
        wrapped.push(InlineContent::Link {
            link: link.clone(),
            runs: std::mem::take(label),
        });
    }
}

/// Order two positions in document order
pub fn ordered(a: DocumentPosition, b: DocumentPosition) -> (DocumentPosition, DocumentPosition) {
    (min(a, b), max(a, b))
}

/// The part of [start..end) that falls inside one block
fn local_range(
    block: &Block,
    block_index: usize,
    start: DocumentPosition,
    end: DocumentPosition,
) -> (usize, usize) {
    let from = if block_index == start.block_index {
        start.offset
    } else {
        0
    };
    let to = if block_index == end.block_index {
        end.offset
    } else {
        block.text_len()
    };
    (from, to)
}

impl Default for StructuredDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StructuredDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "StructuredDocument ({} blocks):", self.blocks.len())?;
        for (i, block) in self.blocks.iter().enumerate() {
            write!(f, "  [{}] ", i)?;
            match &block.block_type {
                BlockType::Paragraph => write!(f, "Paragraph")?,
                BlockType::Heading { level } => write!(f, "Heading(h{})", level)?,
                BlockType::BlockQuote => write!(f, "BlockQuote")?,
                BlockType::HorizontalRule => write!(f, "HorizontalRule")?,
                BlockType::ListItem { kind, depth } => write!(
                    f,
                    "ListItem({}, depth {})",
                    match kind {
                        ListKind::Ordered => "ordered",
                        ListKind::Unordered => "unordered",
                    },
                    depth
                )?,
            }
            if block.alignment != Alignment::Left {
                write!(f, " [{}]", block.alignment.as_css())?;
            }
            writeln!(f, ": {:?}", block.to_plain_text())?;
        }
        Ok(())
    }
}
