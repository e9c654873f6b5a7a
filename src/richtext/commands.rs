// Command executor
// Every editing action is a Command. Commands run against a working copy of
// the document and selection; the copy replaces the live state only when the
// command succeeds, and the previous state is pushed to the undo history.

use std::fmt;
use std::str::FromStr;

use log::{debug, warn};
use thiserror::Error;

use super::history::{DEFAULT_HISTORY_LIMIT, History, Snapshot};
use super::sanitizer::{ImportedContent, is_safe_style, is_safe_url};
use super::selection::{Selection, capture, restore};
use super::structured_document::{
    Alignment, Block, BlockType, DocumentPosition, Edit, EditError, EditOutcome, InlineContent,
    Link, ListKind, MAX_LIST_DEPTH, Rgb, StructuredDocument, StyleChange, StyleFlag, TextRun,
    TextStyle, Wrapper,
};

/// Characters that would break out of a style declaration
const FORBIDDEN_STYLE_CHARS: &[char] = &[';', '"', '<', '>', '{', '}'];

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ToggleStyle(StyleFlag),
    SetAlignment(Alignment),
    /// `None` turns list items back into paragraphs
    SetList(Option<ListKind>),
    /// `None` turns headings back into paragraphs
    SetHeading(Option<u8>),
    ToggleBlockQuote,
    Indent,
    Outdent,
    SetFontFamily(Option<String>),
    SetFontSize(Option<String>),
    SetColor(Option<Rgb>),
    ClearFormatting,
    InsertLink { url: String, label: Option<String> },
    RemoveLink,
    InsertImage { source: String },
    InsertHorizontalRule,
    InsertText(String),
    InsertContent(ImportedContent),
    SplitBlock,
    DeleteBackward,
    DeleteForward,
    Undo,
    Redo,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::ToggleStyle(StyleFlag::Bold) => "bold",
            Command::ToggleStyle(StyleFlag::Italic) => "italic",
            Command::ToggleStyle(StyleFlag::Underline) => "underline",
            Command::ToggleStyle(StyleFlag::Strikethrough) => "strike",
            Command::SetAlignment(_) => "align",
            Command::SetList(_) => "list",
            Command::SetHeading(_) => "header",
            Command::ToggleBlockQuote => "blockquote",
            Command::Indent => "indent",
            Command::Outdent => "outdent",
            Command::SetFontFamily(_) => "font",
            Command::SetFontSize(_) => "size",
            Command::SetColor(_) => "color",
            Command::ClearFormatting => "clean",
            Command::InsertLink { .. } => "link",
            Command::RemoveLink => "unlink",
            Command::InsertImage { .. } => "image",
            Command::InsertHorizontalRule => "hr",
            Command::InsertText(_) => "insert-text",
            Command::InsertContent(_) => "paste",
            Command::SplitBlock => "split-block",
            Command::DeleteBackward => "delete-backward",
            Command::DeleteForward => "delete-forward",
            Command::Undo => "undo",
            Command::Redo => "redo",
        }
    }

    /// Build a command from its toolbar name and optional value.
    /// Returns `None` for unknown names and unusable values.
    pub fn from_named(name: &str, value: Option<&str>) -> Option<Command> {
        let value = value.map(str::trim).filter(|v| !v.is_empty());
        let command = match name {
            "bold" => Command::ToggleStyle(StyleFlag::Bold),
            "italic" => Command::ToggleStyle(StyleFlag::Italic),
            "underline" => Command::ToggleStyle(StyleFlag::Underline),
            "strike" => Command::ToggleStyle(StyleFlag::Strikethrough),
            "align" => Command::SetAlignment(match value {
                None => Alignment::Left,
                Some(v) => Alignment::from_css(v)?,
            }),
            "list" => Command::SetList(match value {
                None => None,
                Some("ordered") => Some(ListKind::Ordered),
                Some("bullet" | "unordered") => Some(ListKind::Unordered),
                Some(_) => return None,
            }),
            "header" => Command::SetHeading(match value {
                None => None,
                Some(v) => Some(v.parse::<u8>().ok().filter(|l| (1..=6).contains(l))?),
            }),
            "blockquote" => Command::ToggleBlockQuote,
            "indent" => match value {
                Some("-1") => Command::Outdent,
                _ => Command::Indent,
            },
            "outdent" => Command::Outdent,
            "font" => Command::SetFontFamily(value.map(str::to_string)),
            "size" => Command::SetFontSize(value.map(str::to_string)),
            "color" => Command::SetColor(match value {
                None => None,
                Some(v) => Some(Rgb::parse(v)?),
            }),
            "clean" => Command::ClearFormatting,
            "link" => Command::InsertLink {
                url: value.unwrap_or_default().to_string(),
                label: None,
            },
            "unlink" => Command::RemoveLink,
            "image" => Command::InsertImage {
                source: value.unwrap_or_default().to_string(),
            },
            "hr" => Command::InsertHorizontalRule,
            "undo" => Command::Undo,
            "redo" => Command::Redo,
            _ => return None,
        };
        Some(command)
    }
}

/// Error for `Command::from_str`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown command `{0}`")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    /// Parse `name` or `name=value`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = match s.split_once('=') {
            Some((name, value)) => (name.trim(), Some(value)),
            None => (s.trim(), None),
        };
        Command::from_named(name, value).ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

/// Why a command was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("missing URL")]
    MissingUrl,
    #[error("missing link label")]
    MissingLabel,
    #[error("URL scheme is not allowed")]
    UnsafeUrl,
    #[error("invalid style value")]
    InvalidStyleValue,
    #[error(transparent)]
    Edit(#[from] EditError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The document changed and the previous state is in the history
    Applied { clipped_at_block_boundary: bool },
    /// Only the selection (or its pending style) changed
    SelectionOnly,
    Unchanged,
    Rejected(RejectReason),
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutcome::Applied {
                clipped_at_block_boundary: true,
            } => write!(f, "applied (clipped at block boundary)"),
            CommandOutcome::Applied { .. } => write!(f, "applied"),
            CommandOutcome::SelectionOnly => write!(f, "selection updated"),
            CommandOutcome::Unchanged => write!(f, "unchanged"),
            CommandOutcome::Rejected(reason) => write!(f, "rejected: {}", reason),
        }
    }
}

/// Runs commands and owns the undo history
#[derive(Debug)]
pub struct CommandExecutor {
    history: History,
}

impl CommandExecutor {
    pub fn new(history_limit: usize) -> Self {
        CommandExecutor {
            history: History::new(history_limit),
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Execute a command against the live document and selection
    pub fn execute(
        &mut self,
        document: &mut StructuredDocument,
        selection: &mut Selection,
        command: Command,
    ) -> CommandOutcome {
        match command {
            Command::Undo => return self.step_history(document, selection, true),
            Command::Redo => return self.step_history(document, selection, false),
            _ => {}
        }

        let name = command.name();
        let mut session = Session {
            document: document.clone(),
            selection: selection.clamped(document),
        };

        let clipped = match session.run(command) {
            Ok(clipped) => clipped,
            Err(reason) => {
                warn!("Command {} rejected: {}", name, reason);
                return CommandOutcome::Rejected(reason);
            }
        };

        if session.document.blocks() == document.blocks() {
            if session.selection != *selection {
                *selection = session.selection;
                return CommandOutcome::SelectionOnly;
            }
            return CommandOutcome::Unchanged;
        }

        self.history.push(Snapshot {
            document: std::mem::replace(document, session.document),
            selection: std::mem::replace(selection, session.selection),
        });
        debug!("Applied command {}", name);
        CommandOutcome::Applied {
            clipped_at_block_boundary: clipped,
        }
    }

    fn step_history(
        &mut self,
        document: &mut StructuredDocument,
        selection: &mut Selection,
        backwards: bool,
    ) -> CommandOutcome {
        let current = Snapshot {
            document: document.clone(),
            selection: selection.clone(),
        };
        let restored = if backwards {
            self.history.undo(current)
        } else {
            self.history.redo(current)
        };
        match restored {
            Some(snapshot) => {
                *document = snapshot.document;
                *selection = snapshot.selection;
                debug!("Applied command {}", if backwards { "undo" } else { "redo" });
                CommandOutcome::Applied {
                    clipped_at_block_boundary: false,
                }
            }
            None => CommandOutcome::Unchanged,
        }
    }
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

/// Working copy a command mutates
struct Session {
    document: StructuredDocument,
    selection: Selection,
}

impl Session {
    /// Apply an edit, carrying the selection through it
    fn apply(&mut self, edit: Edit) -> Result<EditOutcome, RejectReason> {
        let mut saved = capture(&self.document, &self.selection);
        let outcome = self.document.apply(edit)?;
        saved.apply_remaps(&outcome.remaps);
        self.selection = restore(&self.document, &saved);
        Ok(outcome)
    }

    fn cursor(&self) -> DocumentPosition {
        self.selection.focus
    }

    fn block(&self, index: usize) -> Option<&Block> {
        self.document.block(index)
    }

    fn set_cursor(&mut self, position: DocumentPosition) {
        let pending = self.selection.pending.take();
        self.selection = Selection::collapsed(position);
        self.selection.pending = pending;
    }

    /// Block indices the selection intersects
    fn selected_blocks(&self) -> std::ops::RangeInclusive<usize> {
        let (start, end) = self.selection.range();
        start.block_index..=end.block_index
    }

    /// Run a command; Ok(true) means a link wrap was clipped
    fn run(&mut self, command: Command) -> Result<bool, RejectReason> {
        match command {
            Command::ToggleStyle(flag) => self.toggle_style(flag)?,
            Command::SetAlignment(alignment) => {
                for block_index in self.selected_blocks() {
                    self.apply(Edit::SetAlignment {
                        block_index,
                        alignment,
                    })?;
                }
            }
            Command::SetList(kind) => self.set_list(kind)?,
            Command::SetHeading(level) => self.set_heading(level)?,
            Command::ToggleBlockQuote => self.toggle_block_quote()?,
            Command::Indent => self.indent(1)?,
            Command::Outdent => self.indent(-1)?,
            Command::SetFontFamily(family) => {
                let family = validate_style_value(family)?;
                self.restyle(StyleChange::FontFamily(family))?;
            }
            Command::SetFontSize(size) => {
                let size = validate_style_value(size)?;
                self.restyle(StyleChange::FontSize(size))?;
            }
            Command::SetColor(color) => self.restyle(StyleChange::Color(color))?,
            Command::ClearFormatting => self.restyle(StyleChange::Clear)?,
            Command::InsertLink { url, label } => return self.insert_link(&url, label),
            Command::RemoveLink => {
                let (anchor, focus) = self.selection.range();
                self.apply(Edit::UnwrapRange { anchor, focus })?;
            }
            Command::InsertImage { source } => self.insert_image(&source)?,
            Command::InsertHorizontalRule => self.insert_rule()?,
            Command::InsertText(text) => self.insert_text(text, None)?,
            Command::InsertContent(content) => self.insert_content(content)?,
            Command::SplitBlock => self.split_block()?,
            Command::DeleteBackward => self.delete_backward()?,
            Command::DeleteForward => self.delete_forward()?,
            // Handled by the executor before a session exists
            Command::Undo | Command::Redo => {}
        }
        Ok(false)
    }

    fn toggle_style(&mut self, flag: StyleFlag) -> Result<(), RejectReason> {
        if self.selection.is_collapsed() {
            let base = self
                .selection
                .pending
                .clone()
                .unwrap_or_else(|| self.document.style_at(self.cursor()));
            let on = !base.flag(flag);
            self.selection.pending = Some(base.with_flag(flag, on));
            return Ok(());
        }

        // Mixed ranges turn the flag on; it is only removed when every run has it
        let (anchor, focus) = self.selection.range();
        let runs = self.document.runs_in_range(anchor, focus);
        let all_on = !runs.is_empty() && runs.iter().all(|placed| placed.run.style.flag(flag));
        self.apply(Edit::RestyleRange {
            anchor,
            focus,
            change: StyleChange::Flag(flag, !all_on),
        })?;
        Ok(())
    }

    /// Font and color changes: pending style when collapsed, run split otherwise
    fn restyle(&mut self, change: StyleChange) -> Result<(), RejectReason> {
        if self.selection.is_collapsed() {
            let base = self
                .selection
                .pending
                .clone()
                .unwrap_or_else(|| self.document.style_at(self.cursor()));
            self.selection.pending = Some(change.applied_to(&base));
            return Ok(());
        }
        let (anchor, focus) = self.selection.range();
        self.apply(Edit::RestyleRange {
            anchor,
            focus,
            change,
        })?;
        Ok(())
    }

    fn set_kind(&mut self, block_index: usize, kind: BlockType) -> Result<(), RejectReason> {
        self.apply(Edit::SetBlockKind { block_index, kind })?;
        Ok(())
    }

    fn set_list(&mut self, kind: Option<ListKind>) -> Result<(), RejectReason> {
        for block_index in self.selected_blocks() {
            let Some(block) = self.block(block_index) else {
                continue;
            };
            let current = block.block_type.clone();
            let new_kind = match (&current, kind) {
                (BlockType::HorizontalRule, _) => continue,
                (BlockType::ListItem { depth, .. }, Some(kind)) => BlockType::ListItem {
                    kind,
                    depth: *depth,
                },
                (_, Some(kind)) => BlockType::ListItem { kind, depth: 0 },
                (BlockType::ListItem { .. }, None) => BlockType::Paragraph,
                (_, None) => continue,
            };
            self.set_kind(block_index, new_kind)?;
        }
        Ok(())
    }

    fn set_heading(&mut self, level: Option<u8>) -> Result<(), RejectReason> {
        for block_index in self.selected_blocks() {
            let Some(block) = self.block(block_index) else {
                continue;
            };
            let new_kind = match (&block.block_type, level) {
                (BlockType::HorizontalRule, _) => continue,
                (_, Some(level)) => BlockType::Heading { level },
                (BlockType::Heading { .. }, None) => BlockType::Paragraph,
                (_, None) => continue,
            };
            self.set_kind(block_index, new_kind)?;
        }
        Ok(())
    }

    fn toggle_block_quote(&mut self) -> Result<(), RejectReason> {
        let blocks: Vec<usize> = self
            .selected_blocks()
            .filter(|&i| self.block(i).is_some_and(|b| !b.is_rule()))
            .collect();
        let all_quoted = !blocks.is_empty()
            && blocks
                .iter()
                .all(|&i| self.block(i).is_some_and(|b| b.block_type == BlockType::BlockQuote));
        let kind = if all_quoted {
            BlockType::Paragraph
        } else {
            BlockType::BlockQuote
        };
        for block_index in blocks {
            self.set_kind(block_index, kind.clone())?;
        }
        Ok(())
    }

    /// Change list depth by `delta`; outdenting a top-level item ends the list
    fn indent(&mut self, delta: i8) -> Result<(), RejectReason> {
        for block_index in self.selected_blocks() {
            let Some(BlockType::ListItem { kind, depth }) =
                self.block(block_index).map(|b| b.block_type.clone())
            else {
                continue;
            };
            let new_kind = match (delta > 0, depth) {
                (true, depth) => BlockType::ListItem {
                    kind,
                    depth: (depth + 1).min(MAX_LIST_DEPTH),
                },
                (false, 0) => BlockType::Paragraph,
                (false, depth) => BlockType::ListItem {
                    kind,
                    depth: depth - 1,
                },
            };
            self.set_kind(block_index, new_kind)?;
        }
        Ok(())
    }

    fn delete_selection(&mut self) -> Result<(), RejectReason> {
        if !self.selection.is_collapsed() {
            let (anchor, focus) = self.selection.range();
            self.apply(Edit::DeleteRange { anchor, focus })?;
        }
        Ok(())
    }

    /// Make sure the cursor sits in a block that takes inline content
    fn ensure_text_block(&mut self) -> Result<DocumentPosition, RejectReason> {
        if self.document.is_empty() {
            self.apply(Edit::InsertBlock {
                index: 0,
                block: Block::paragraph(),
            })?;
            self.set_cursor(DocumentPosition::start());
        }
        let cursor = self.cursor();
        if self.block(cursor.block_index).is_some_and(Block::is_rule) {
            let index = cursor.block_index + 1;
            self.apply(Edit::InsertBlock {
                index,
                block: Block::paragraph(),
            })?;
            self.set_cursor(DocumentPosition::new(index, 0));
        }
        Ok(self.cursor())
    }

    fn insert_text(&mut self, text: String, style: Option<TextStyle>) -> Result<(), RejectReason> {
        if text.is_empty() {
            return Ok(());
        }
        self.delete_selection()?;
        let at = self.ensure_text_block()?;
        let style = match style {
            Some(style) => style,
            None => self
                .selection
                .pending
                .take()
                .unwrap_or_else(|| self.document.style_at(at)),
        };
        self.apply(Edit::InsertText { at, text, style })?;
        self.selection.pending = None;
        Ok(())
    }

    fn insert_link(&mut self, url: &str, label: Option<String>) -> Result<bool, RejectReason> {
        let url = url.trim();
        if url.is_empty() {
            return Err(RejectReason::MissingUrl);
        }
        if !is_safe_url(url, false) {
            return Err(RejectReason::UnsafeUrl);
        }

        if !self.selection.is_collapsed() {
            let (anchor, focus) = self.selection.range();
            let outcome = self
                .apply(Edit::WrapRange {
                    anchor,
                    focus,
                    wrapper: Wrapper::Link(Link::new(url)),
                })
                .map_err(|err| match err {
                    RejectReason::Edit(EditError::EmptyLabel) => RejectReason::MissingLabel,
                    other => other,
                })?;
            return Ok(outcome.clipped_at_block_boundary);
        }

        let label = label
            .filter(|label| !label.trim().is_empty())
            .ok_or(RejectReason::MissingLabel)?;
        let at = self.ensure_text_block()?;
        let style = self
            .selection
            .pending
            .take()
            .unwrap_or_else(|| self.document.style_at(at));
        self.apply(Edit::InsertInline {
            at,
            node: InlineContent::Link {
                link: Link::new(url),
                runs: vec![TextRun::new(label, style)],
            },
        })?;
        Ok(false)
    }

    fn insert_image(&mut self, source: &str) -> Result<(), RejectReason> {
        let source = source.trim();
        if source.is_empty() {
            return Err(RejectReason::MissingUrl);
        }
        if !is_safe_url(source, true) {
            return Err(RejectReason::UnsafeUrl);
        }
        self.delete_selection()?;
        let at = self.ensure_text_block()?;
        self.apply(Edit::InsertInline {
            at,
            node: InlineContent::Image {
                source: source.to_string(),
            },
        })?;
        Ok(())
    }

    fn insert_rule(&mut self) -> Result<(), RejectReason> {
        self.delete_selection()?;
        let cursor = self.cursor();
        if self.document.is_empty() || self.block(cursor.block_index).is_some_and(Block::is_rule) {
            let index = if self.document.is_empty() {
                0
            } else {
                cursor.block_index + 1
            };
            self.apply(Edit::InsertBlock {
                index,
                block: Block::rule(),
            })?;
            self.set_cursor(DocumentPosition::new(index, 0));
            return Ok(());
        }

        // The cursor follows the right half into its new block
        self.apply(Edit::SplitBlock { at: cursor })?;
        self.apply(Edit::InsertBlock {
            index: cursor.block_index + 1,
            block: Block::rule(),
        })?;
        Ok(())
    }

    fn insert_content(&mut self, content: ImportedContent) -> Result<(), RejectReason> {
        match content {
            ImportedContent::PlainText(text) => self.insert_text(text, Some(TextStyle::default())),
            ImportedContent::Inline(items) => {
                let items: Vec<InlineContent> =
                    items.into_iter().filter(|item| item.text_len() > 0).collect();
                if items.is_empty() {
                    return Ok(());
                }
                self.delete_selection()?;
                self.ensure_text_block()?;
                for node in items {
                    let at = self.cursor();
                    self.apply(Edit::InsertInline { at, node })?;
                }
                self.selection.pending = None;
                Ok(())
            }
            ImportedContent::Blocks(blocks) => self.insert_blocks(blocks),
        }
    }

    /// Paste whole blocks: split the current block, put the pasted blocks
    /// between the halves, then join the halves' text onto the outer pasted blocks
    fn insert_blocks(&mut self, blocks: Vec<Block>) -> Result<(), RejectReason> {
        if blocks.is_empty() {
            return Ok(());
        }
        self.delete_selection()?;
        let cursor = self.ensure_text_block()?;
        let left = cursor.block_index;
        let count = blocks.len();
        let first_kind = blocks[0].block_type.clone();
        let first_alignment = blocks[0].alignment;

        self.apply(Edit::SplitBlock { at: cursor })?;
        for (i, block) in blocks.into_iter().enumerate() {
            self.apply(Edit::InsertBlock {
                index: left + 1 + i,
                block,
            })?;
        }

        let last = left + count;
        let right = last + 1;
        let joinable = |doc: &StructuredDocument, i: usize| doc.block(i).is_some_and(|b| !b.is_rule());

        if joinable(&self.document, last) && joinable(&self.document, right) {
            let end = DocumentPosition::new(last, self.document.blocks()[last].text_len());
            self.set_cursor(end);
            self.apply(Edit::DeleteRange {
                anchor: end,
                focus: DocumentPosition::new(right, 0),
            })?;
        } else {
            self.set_cursor(DocumentPosition::new(right, 0));
        }

        if joinable(&self.document, left) && joinable(&self.document, left + 1) {
            // An empty left half takes the kind of the first pasted block
            if self.document.blocks()[left].is_empty() {
                self.set_kind(left, first_kind)?;
                self.apply(Edit::SetAlignment {
                    block_index: left,
                    alignment: first_alignment,
                })?;
            }
            let join = DocumentPosition::new(left, self.document.blocks()[left].text_len());
            self.apply(Edit::DeleteRange {
                anchor: join,
                focus: DocumentPosition::new(left + 1, 0),
            })?;
        }
        self.selection.pending = None;
        Ok(())
    }

    fn split_block(&mut self) -> Result<(), RejectReason> {
        self.delete_selection()?;
        let cursor = self.cursor();
        let Some(block) = self.block(cursor.block_index) else {
            self.ensure_text_block()?;
            return Ok(());
        };

        if block.is_rule() {
            self.ensure_text_block()?;
            return Ok(());
        }
        // Enter in an empty list item steps out of the list instead
        if block.list_depth().is_some() && block.is_empty() {
            return self.indent(-1);
        }
        self.apply(Edit::SplitBlock { at: cursor })?;
        Ok(())
    }

    fn delete_backward(&mut self) -> Result<(), RejectReason> {
        if !self.selection.is_collapsed() {
            return self.delete_selection();
        }
        let cursor = self.cursor();
        let Some(block) = self.block(cursor.block_index) else {
            return Ok(());
        };

        if cursor.offset > 0 {
            let previous = block.previous_grapheme(cursor.offset);
            self.apply(Edit::DeleteRange {
                anchor: DocumentPosition::new(cursor.block_index, previous),
                focus: cursor,
            })?;
            return Ok(());
        }

        // At the start of a block: undo its block formatting first
        let block_type = block.block_type.clone();
        match block_type {
            BlockType::ListItem { .. } => return self.indent(-1),
            BlockType::Heading { .. } | BlockType::BlockQuote => {
                return self.set_kind(cursor.block_index, BlockType::Paragraph);
            }
            BlockType::HorizontalRule if cursor.block_index == 0 => {
                return self.delete_forward();
            }
            _ => {}
        }

        if cursor.block_index > 0 {
            let previous = cursor.block_index - 1;
            let end = self.document.blocks()[previous].text_len();
            self.apply(Edit::DeleteRange {
                anchor: DocumentPosition::new(previous, end),
                focus: cursor,
            })?;
        }
        Ok(())
    }

    fn delete_forward(&mut self) -> Result<(), RejectReason> {
        if !self.selection.is_collapsed() {
            return self.delete_selection();
        }
        let cursor = self.cursor();
        let Some(block) = self.block(cursor.block_index) else {
            return Ok(());
        };

        let focus = if cursor.offset < block.text_len() {
            DocumentPosition::new(cursor.block_index, block.next_grapheme(cursor.offset))
        } else if cursor.block_index + 1 < self.document.block_count() {
            DocumentPosition::new(cursor.block_index + 1, 0)
        } else if block.is_rule() && cursor.block_index > 0 {
            // A trailing rule is removed by joining it onto the block before
            let previous = cursor.block_index - 1;
            let end = self.document.blocks()[previous].text_len();
            self.apply(Edit::DeleteRange {
                anchor: DocumentPosition::new(previous, end),
                focus: cursor,
            })?;
            return Ok(());
        } else {
            return Ok(());
        };

        self.apply(Edit::DeleteRange {
            anchor: cursor,
            focus,
        })?;
        Ok(())
    }
}

fn validate_style_value(value: Option<String>) -> Result<Option<String>, RejectReason> {
    let Some(value) = value else {
        return Ok(None);
    };
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if value.contains(FORBIDDEN_STYLE_CHARS) || !is_safe_style(value) {
        return Err(RejectReason::InvalidStyleValue);
    }
    Ok(Some(value.to_string()))
}
