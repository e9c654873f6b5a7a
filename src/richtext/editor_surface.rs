// Editor surface controller
// Owns the live document, selection and command history of one editable
// field. Platform input arrives as `EditorEvent`s; committed changes are
// serialized and handed to the embedding form through a `ChangeListener`.

use log::{debug, warn};

use super::commands::{Command, CommandExecutor, CommandOutcome, RejectReason};
use super::format_state::{FormatState, compute_active_formats};
use super::keymap::{Key, KeyChord, Keymap, Motion, Shortcut};
use super::markup_converter::{document_to_markup, markup_to_document};
use super::sanitizer::{ImportedContent, import, is_safe_url};
use super::selection::{SavedSelection, Selection, capture, restore};
use super::structured_document::{DocumentPosition, StructuredDocument};
use crate::config::EditorConfig;

/// Receives the serialized document after every committed change
pub trait ChangeListener {
    fn on_change(&mut self, value: &str);
}

impl<F: FnMut(&str)> ChangeListener for F {
    fn on_change(&mut self, value: &str) {
        self(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    TextInput(String),
    Paste {
        html: Option<String>,
        text: Option<String>,
    },
    Key(KeyChord),
    PointerDown {
        position: DocumentPosition,
        extend: bool,
    },
    LinkClicked(String),
    SelectionChanged(Selection),
    Command(Command),
    /// Toolbar command by name, e.g. `header` with value `2`
    Named {
        name: String,
        value: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventResponse {
    None,
    Changed,
    SelectionMoved,
    /// Open the destination in a new browsing context
    OpenLink(String),
    /// Ask the user for a link URL, then call `confirm_link` or `cancel_link_prompt`
    PromptForLink,
    Rejected(RejectReason),
}

pub struct EditorSurface<L: ChangeListener> {
    document: StructuredDocument,
    selection: Selection,
    executor: CommandExecutor,
    keymap: Keymap,
    format_state: FormatState,
    value: String,
    focused: bool,
    link_prompt: Option<SavedSelection>,
    listener: L,
}

impl<L: ChangeListener> EditorSurface<L> {
    pub fn new(config: &EditorConfig, listener: L) -> Self {
        let document = StructuredDocument::from_blocks(Vec::new());
        let value = document_to_markup(&document);
        let mut surface = EditorSurface {
            document,
            selection: Selection::default(),
            executor: CommandExecutor::new(config.history_limit),
            keymap: Keymap::new(config.shortcut_modifier),
            format_state: FormatState::default(),
            value,
            focused: false,
            link_prompt: None,
            listener,
        };
        surface.refresh_format_state();
        surface
    }

    /// Load the initial stored value
    pub fn initialize(&mut self, markup: &str) {
        self.load(markup);
    }

    /// Replace the content from outside. Returns false when `markup` is
    /// what the surface last reported, so echoes of our own changes are ignored.
    pub fn set_value(&mut self, markup: &str) -> bool {
        if markup == self.value {
            return false;
        }
        self.load(markup);
        true
    }

    fn load(&mut self, markup: &str) {
        self.document = markup_to_document(markup);
        self.selection = Selection::collapsed(DocumentPosition::start());
        self.executor.clear_history();
        self.link_prompt = None;
        self.value = document_to_markup(&self.document);
        self.refresh_format_state();
    }

    /// The current value as markup
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn document(&self) -> &StructuredDocument {
        &self.document
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn format_state(&self) -> &FormatState {
        &self.format_state
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn can_undo(&self) -> bool {
        self.executor.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.executor.can_redo()
    }

    pub fn focus(&mut self) {
        self.focused = true;
    }

    pub fn blur(&mut self) {
        self.focused = false;
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn handle_event(&mut self, event: EditorEvent) -> EventResponse {
        match event {
            EditorEvent::TextInput(text) => self.execute(Command::InsertText(text)),
            EditorEvent::Paste { html, text } => {
                let content = match (html, text) {
                    (Some(html), _) if !html.trim().is_empty() => import(&html),
                    (_, Some(text)) => ImportedContent::PlainText(text),
                    _ => return EventResponse::None,
                };
                self.execute(Command::InsertContent(content))
            }
            EditorEvent::Key(chord) => self.handle_key(&chord),
            EditorEvent::PointerDown { position, extend } => self.pointer_down(position, extend),
            EditorEvent::LinkClicked(url) => {
                if is_safe_url(&url, false) {
                    EventResponse::OpenLink(url)
                } else {
                    warn!("Ignoring click on unsafe link {}", url);
                    EventResponse::None
                }
            }
            EditorEvent::SelectionChanged(selection) => {
                self.set_selection(selection.clamped(&self.document))
            }
            EditorEvent::Command(command) => self.execute(command),
            EditorEvent::Named { name, value } => self.named(&name, value.as_deref()),
        }
    }

    fn named(&mut self, name: &str, value: Option<&str>) -> EventResponse {
        if name == "link" && value.is_none_or(|v| v.trim().is_empty()) {
            self.begin_link_prompt();
            return EventResponse::PromptForLink;
        }
        match Command::from_named(name, value) {
            Some(command) => self.execute(command),
            None => {
                warn!("Unsupported command {} ({:?})", name, value);
                EventResponse::None
            }
        }
    }

    /// Run a command and notify the listener when the document changed
    pub fn execute(&mut self, command: Command) -> EventResponse {
        match self
            .executor
            .execute(&mut self.document, &mut self.selection, command)
        {
            CommandOutcome::Applied { .. } => {
                self.commit();
                EventResponse::Changed
            }
            CommandOutcome::SelectionOnly => {
                self.refresh_format_state();
                EventResponse::SelectionMoved
            }
            CommandOutcome::Unchanged => EventResponse::None,
            CommandOutcome::Rejected(reason) => EventResponse::Rejected(reason),
        }
    }

    fn commit(&mut self) {
        self.value = document_to_markup(&self.document);
        self.refresh_format_state();
        self.listener.on_change(&self.value);
    }

    fn refresh_format_state(&mut self) {
        self.format_state = compute_active_formats(&self.document, &self.selection);
    }

    fn set_selection(&mut self, selection: Selection) -> EventResponse {
        if selection == self.selection {
            return EventResponse::None;
        }
        self.selection = selection;
        self.refresh_format_state();
        EventResponse::SelectionMoved
    }

    /// Remember the selection while the user is asked for a URL
    pub fn begin_link_prompt(&mut self) {
        self.link_prompt = Some(capture(&self.document, &self.selection));
    }

    pub fn confirm_link(&mut self, url: &str, label: Option<String>) -> EventResponse {
        let Some(saved) = self.link_prompt.take() else {
            debug!("confirm_link without an open link prompt");
            return EventResponse::None;
        };
        self.selection = restore(&self.document, &saved);
        self.execute(Command::InsertLink {
            url: url.to_string(),
            label,
        })
    }

    pub fn cancel_link_prompt(&mut self) -> EventResponse {
        match self.link_prompt.take() {
            Some(saved) => {
                let selection = restore(&self.document, &saved);
                self.set_selection(selection)
            }
            None => EventResponse::None,
        }
    }

    fn pointer_down(&mut self, position: DocumentPosition, extend: bool) -> EventResponse {
        let position = self.document.clamp_position(position);
        if !extend && let Some(link) = self.document.link_at(position) {
            return EventResponse::OpenLink(link.destination.clone());
        }
        let selection = if extend {
            Selection::new(self.selection.anchor, position)
        } else {
            Selection::collapsed(position)
        };
        self.set_selection(selection)
    }

    fn handle_key(&mut self, chord: &KeyChord) -> EventResponse {
        let Some(shortcut) = self.keymap.resolve(chord) else {
            if let Key::Char(c) = chord.key {
                debug!("No shortcut for {:?}+{}", chord.modifiers, c);
            }
            return EventResponse::None;
        };

        match shortcut {
            Shortcut::ToggleStyle(flag) => self.execute(Command::ToggleStyle(flag)),
            Shortcut::InsertLink => {
                self.begin_link_prompt();
                EventResponse::PromptForLink
            }
            Shortcut::Undo => self.execute(Command::Undo),
            Shortcut::Redo => self.execute(Command::Redo),
            Shortcut::SelectAll => self.set_selection(Selection::new(
                DocumentPosition::start(),
                self.document.end_position(),
            )),
            Shortcut::SplitBlock => self.execute(Command::SplitBlock),
            Shortcut::DeleteBackward => self.execute(Command::DeleteBackward),
            Shortcut::DeleteForward => self.execute(Command::DeleteForward),
            // Tab only means indentation inside lists
            Shortcut::Indent | Shortcut::Outdent if !self.in_list() => EventResponse::None,
            Shortcut::Indent => self.execute(Command::Indent),
            Shortcut::Outdent => self.execute(Command::Outdent),
            Shortcut::Move { motion, extend } => self.move_cursor(motion, extend),
        }
    }

    fn in_list(&self) -> bool {
        self.document
            .block(self.selection.focus.block_index)
            .is_some_and(|block| block.list_depth().is_some())
    }

    fn move_cursor(&mut self, motion: Motion, extend: bool) -> EventResponse {
        // Arrows on a range collapse it to the matching edge
        if !extend && !self.selection.is_collapsed() {
            match motion {
                Motion::Left => return self.set_selection(Selection::collapsed(self.selection.start())),
                Motion::Right => return self.set_selection(Selection::collapsed(self.selection.end())),
                _ => {}
            }
        }

        let focus = self.document.clamp_position(self.selection.focus);
        let target = match motion {
            Motion::Left => self.grapheme_left(focus),
            Motion::Right => self.grapheme_right(focus),
            Motion::Up => self.vertical(focus, false),
            Motion::Down => self.vertical(focus, true),
            Motion::WordLeft => word_left_position(&self.document, focus),
            Motion::WordRight => word_right_position(&self.document, focus),
            Motion::LineStart => DocumentPosition::new(focus.block_index, 0),
            Motion::LineEnd => self.block_end(focus.block_index),
        };

        let selection = if extend {
            Selection::new(self.selection.anchor, target)
        } else {
            Selection::collapsed(target)
        };
        self.set_selection(selection)
    }

    fn block_end(&self, block_index: usize) -> DocumentPosition {
        let len = self.document.block(block_index).map_or(0, |b| b.text_len());
        DocumentPosition::new(block_index, len)
    }

    fn grapheme_left(&self, pos: DocumentPosition) -> DocumentPosition {
        match self.document.block(pos.block_index) {
            Some(block) if pos.offset > 0 => {
                DocumentPosition::new(pos.block_index, block.previous_grapheme(pos.offset))
            }
            _ if pos.block_index > 0 => self.block_end(pos.block_index - 1),
            _ => pos,
        }
    }

    fn grapheme_right(&self, pos: DocumentPosition) -> DocumentPosition {
        match self.document.block(pos.block_index) {
            Some(block) if pos.offset < block.text_len() => {
                DocumentPosition::new(pos.block_index, block.next_grapheme(pos.offset))
            }
            _ if pos.block_index + 1 < self.document.block_count() => {
                DocumentPosition::new(pos.block_index + 1, 0)
            }
            _ => pos,
        }
    }

    /// Move to the neighbouring block, keeping the offset where possible
    fn vertical(&self, pos: DocumentPosition, down: bool) -> DocumentPosition {
        if down {
            if pos.block_index + 1 < self.document.block_count() {
                return self
                    .document
                    .clamp_position(DocumentPosition::new(pos.block_index + 1, pos.offset));
            }
            self.document.end_position()
        } else if pos.block_index > 0 {
            self.document
                .clamp_position(DocumentPosition::new(pos.block_index - 1, pos.offset))
        } else {
            DocumentPosition::start()
        }
    }
}

fn is_word_separator(ch: char) -> bool {
    ch.is_whitespace() || ch.is_ascii_punctuation()
}

/// Skip separators, then the word after them. At a block end, go to the next block.
fn word_right_position(doc: &StructuredDocument, pos: DocumentPosition) -> DocumentPosition {
    let blocks = doc.blocks();
    let Some(block) = blocks.get(pos.block_index) else {
        return pos;
    };
    let text = block.to_plain_text();
    let start = block.floor_boundary(pos.offset);
    if start >= text.len() {
        if pos.block_index + 1 < blocks.len() {
            return DocumentPosition::new(pos.block_index + 1, 0);
        }
        return pos;
    }

    let rest = &text[start..];
    let word_start = rest.find(|c| !is_word_separator(c)).unwrap_or(rest.len());
    let word_end = rest[word_start..]
        .find(is_word_separator)
        .map_or(rest.len(), |i| word_start + i);
    DocumentPosition::new(pos.block_index, start + word_end)
}

/// Mirror of `word_right_position`
fn word_left_position(doc: &StructuredDocument, pos: DocumentPosition) -> DocumentPosition {
    let blocks = doc.blocks();
    let Some(block) = blocks.get(pos.block_index) else {
        return pos;
    };
    let text = block.to_plain_text();
    let end = block.floor_boundary(pos.offset);
    if end == 0 {
        if pos.block_index > 0 {
            return DocumentPosition::new(pos.block_index - 1, blocks[pos.block_index - 1].text_len());
        }
        return pos;
    }

    let head = text[..end].trim_end_matches(is_word_separator);
    let offset = head
        .char_indices()
        .rev()
        .find(|(_, ch)| is_word_separator(*ch))
        .map_or(0, |(i, ch)| i + ch.len_utf8());
    DocumentPosition::new(pos.block_index, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::richtext::keymap::ShortcutModifier;
    use crate::richtext::structured_document::StyleFlag;

    #[derive(Default)]
    struct Recorder {
        values: Vec<String>,
    }

    impl ChangeListener for Recorder {
        fn on_change(&mut self, value: &str) {
            self.values.push(value.to_string());
        }
    }

    fn surface(markup: &str) -> EditorSurface<Recorder> {
        let config = EditorConfig {
            shortcut_modifier: ShortcutModifier::Control,
            ..EditorConfig::default()
        };
        let mut surface = EditorSurface::new(&config, Recorder::default());
        surface.initialize(markup);
        surface
    }

    fn key(chord: KeyChord) -> EditorEvent {
        EditorEvent::Key(chord)
    }

    fn select(surface: &mut EditorSurface<Recorder>, a: (usize, usize), b: (usize, usize)) {
        surface.handle_event(EditorEvent::SelectionChanged(Selection::new(
            DocumentPosition::new(a.0, a.1),
            DocumentPosition::new(b.0, b.1),
        )));
    }

    #[test]
    fn test_initialize_does_not_notify() {
        let s = surface("<p>Hello</p>");
        assert_eq!(s.value(), "<p>Hello</p>");
        assert!(s.listener().values.is_empty());
        assert!(!s.can_undo());
    }

    #[test]
    fn test_typing_notifies_listener() {
        let mut s = surface("<p>Hello</p>");
        s.handle_event(key(KeyChord::new(Key::End)));
        let response = s.handle_event(EditorEvent::TextInput("!".into()));
        assert_eq!(response, EventResponse::Changed);
        assert_eq!(s.listener().values, vec!["<p>Hello!</p>".to_string()]);
    }

    #[test]
    fn test_set_value_ignores_own_echo() {
        let mut s = surface("<p>a</p>");
        s.handle_event(EditorEvent::TextInput("b".into()));
        let echoed = s.value().to_string();
        assert!(!s.set_value(&echoed));
        assert!(s.can_undo());

        assert!(s.set_value("<p>other</p>"));
        assert_eq!(s.document().to_plain_text(), "other");
        assert!(!s.can_undo());
        assert_eq!(s.selection(), &Selection::collapsed(DocumentPosition::start()));
    }

    #[test]
    fn test_bold_shortcut_updates_format_state() {
        let mut s = surface("<p>Hello world</p>");
        select(&mut s, (0, 0), (0, 5));
        assert!(!s.format_state().bold);
        let response = s.handle_event(key(KeyChord::new(Key::Char('b')).ctrl()));
        assert_eq!(response, EventResponse::Changed);
        assert!(s.format_state().bold);
        assert_eq!(s.value(), "<p><strong>Hello</strong> world</p>");

        s.handle_event(key(KeyChord::new(Key::Char('z')).ctrl()));
        assert_eq!(s.value(), "<p>Hello world</p>");
        assert!(!s.format_state().bold);
    }

    #[test]
    fn test_paste_prefers_markup_and_sanitizes() {
        let mut s = surface("<p>ab</p>");
        select(&mut s, (0, 1), (0, 1));
        s.handle_event(EditorEvent::Paste {
            html: Some("<b onclick=\"x()\">X</b><script>bad()</script>".into()),
            text: Some("X".into()),
        });
        assert_eq!(s.value(), "<p>a<strong>X</strong>b</p>");

        s.handle_event(EditorEvent::Paste {
            html: None,
            text: Some("<i>".into()),
        });
        assert_eq!(s.document().to_plain_text(), "aX<i>b");
    }

    #[test]
    fn test_link_prompt_restores_selection_once() {
        let mut s = surface("<p>Hello world</p>");
        select(&mut s, (0, 6), (0, 11));
        let response = s.handle_event(key(KeyChord::new(Key::Char('k')).ctrl()));
        assert_eq!(response, EventResponse::PromptForLink);

        // Focus moves to the prompt and the selection is lost meanwhile
        select(&mut s, (0, 0), (0, 0));
        let response = s.confirm_link("https://example.com", None);
        assert_eq!(response, EventResponse::Changed);
        assert_eq!(
            s.value(),
            "<p>Hello <a href=\"https://example.com\" target=\"_blank\" rel=\"noopener noreferrer\">world</a></p>"
        );
        assert_eq!(s.confirm_link("https://example.com", None), EventResponse::None);
    }

    #[test]
    fn test_cancel_link_prompt() {
        let mut s = surface("<p>Hello world</p>");
        select(&mut s, (0, 0), (0, 5));
        s.handle_event(EditorEvent::Named {
            name: "link".into(),
            value: None,
        });
        select(&mut s, (0, 8), (0, 8));
        assert_eq!(s.cancel_link_prompt(), EventResponse::SelectionMoved);
        assert_eq!(
            s.selection(),
            &Selection::new(DocumentPosition::new(0, 0), DocumentPosition::new(0, 5))
        );
        assert_eq!(s.cancel_link_prompt(), EventResponse::None);
    }

    #[test]
    fn test_click_inside_link_opens_it() {
        let mut s = surface("<p>go <a href=\"https://example.com\">here</a></p>");
        let response = s.handle_event(EditorEvent::PointerDown {
            position: DocumentPosition::new(0, 5),
            extend: false,
        });
        assert_eq!(response, EventResponse::OpenLink("https://example.com".into()));

        let response = s.handle_event(EditorEvent::PointerDown {
            position: DocumentPosition::new(0, 1),
            extend: false,
        });
        assert_eq!(response, EventResponse::SelectionMoved);
    }

    #[test]
    fn test_unknown_named_command_is_ignored() {
        let mut s = surface("<p>x</p>");
        let response = s.handle_event(EditorEvent::Named {
            name: "formula".into(),
            value: None,
        });
        assert_eq!(response, EventResponse::None);
        assert!(s.listener().values.is_empty());
    }

    #[test]
    fn test_named_header_command() {
        let mut s = surface("<p>Title</p>");
        s.handle_event(EditorEvent::Named {
            name: "header".into(),
            value: Some("1".into()),
        });
        assert_eq!(s.value(), "<h1>Title</h1>");
        assert_eq!(s.format_state().heading, Some(1));
    }

    #[test]
    fn test_tab_indents_only_in_lists() {
        let mut s = surface("<p>x</p>");
        assert_eq!(s.handle_event(key(KeyChord::new(Key::Tab))), EventResponse::None);

        let mut s = surface("<ul><li>a</li></ul>");
        s.handle_event(key(KeyChord::new(Key::Tab)));
        assert_eq!(s.value(), "<ul><li class=\"indent-1\">a</li></ul>");
        s.handle_event(key(KeyChord::new(Key::Tab).shift()));
        assert_eq!(s.value(), "<ul><li>a</li></ul>");
    }

    #[test]
    fn test_word_movement() {
        let mut s = surface("<p>one, two</p><p>three</p>");
        let right = KeyChord::new(Key::Right).ctrl();
        s.handle_event(key(right));
        assert_eq!(s.selection().focus, DocumentPosition::new(0, 3));
        s.handle_event(key(right));
        assert_eq!(s.selection().focus, DocumentPosition::new(0, 8));
        s.handle_event(key(right));
        assert_eq!(s.selection().focus, DocumentPosition::new(1, 0));

        let left = KeyChord::new(Key::Left).ctrl();
        s.handle_event(key(left));
        assert_eq!(s.selection().focus, DocumentPosition::new(0, 8));
        s.handle_event(key(left));
        assert_eq!(s.selection().focus, DocumentPosition::new(0, 5));
    }

    #[test]
    fn test_arrow_collapses_range_and_shift_extends() {
        let mut s = surface("<p>abcdef</p>");
        select(&mut s, (0, 1), (0, 4));
        s.handle_event(key(KeyChord::new(Key::Left)));
        assert_eq!(s.selection(), &Selection::collapsed(DocumentPosition::new(0, 1)));

        s.handle_event(key(KeyChord::new(Key::Right).shift()));
        s.handle_event(key(KeyChord::new(Key::Right).shift()));
        assert_eq!(
            s.selection(),
            &Selection::new(DocumentPosition::new(0, 1), DocumentPosition::new(0, 3))
        );
    }

    #[test]
    fn test_select_all_then_type_replaces_everything() {
        let mut s = surface("<h1>a</h1><p>b</p>");
        s.handle_event(key(KeyChord::new(Key::Char('a')).ctrl()));
        s.handle_event(EditorEvent::TextInput("z".into()));
        assert_eq!(s.document().to_plain_text(), "z");
    }

    #[test]
    fn test_collapsed_toggle_only_moves_selection() {
        let mut s = surface("<p>abc</p>");
        let response = s.handle_event(EditorEvent::Command(Command::ToggleStyle(StyleFlag::Bold)));
        assert_eq!(response, EventResponse::SelectionMoved);
        assert!(s.format_state().bold);
        assert!(s.listener().values.is_empty());
    }

    #[test]
    fn test_focus_tracking() {
        let mut s = surface("<p></p>");
        assert!(!s.is_focused());
        s.focus();
        assert!(s.is_focused());
        s.blur();
        assert!(!s.is_focused());
    }

    #[test]
    fn test_closure_listener() {
        let mut seen = Vec::new();
        {
            let mut s = EditorSurface::new(&EditorConfig::default(), |value: &str| {
                seen.push(value.to_string())
            });
            s.handle_event(EditorEvent::TextInput("hi".into()));
        }
        assert_eq!(seen, vec!["<p>hi</p>".to_string()]);
    }
}
