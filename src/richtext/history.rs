use super::selection::Selection;
use super::structured_document::StructuredDocument;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Editor state recorded before a mutating command
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub document: StructuredDocument,
    pub selection: Selection,
}

/// Linear undo history.
/// `entries[..cursor]` are undo states, `entries[cursor..]` redo states.
#[derive(Debug)]
pub struct History {
    entries: Vec<Snapshot>,
    cursor: usize,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        History {
            entries: Vec::new(),
            cursor: 0,
            limit: limit.max(1),
        }
    }

    /// Record the state before a change.
    /// This clears any redo states.
    pub fn push(&mut self, snapshot: Snapshot) {
        self.entries.truncate(self.cursor);
        self.entries.push(snapshot);

        // Limit history size
        if self.entries.len() > self.limit {
            self.entries.remove(0);
        }

        self.cursor = self.entries.len();
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    /// Step back. `current` is kept so that redo can return to it.
    pub fn undo(&mut self, current: Snapshot) -> Option<Snapshot> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        Some(std::mem::replace(&mut self.entries[self.cursor], current))
    }

    /// Step forward again after an undo
    pub fn redo(&mut self, current: Snapshot) -> Option<Snapshot> {
        if !self.can_redo() {
            return None;
        }
        let snapshot = std::mem::replace(&mut self.entries[self.cursor], current);
        self.cursor += 1;
        Some(snapshot)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(text: &str) -> Snapshot {
        Snapshot {
            document: StructuredDocument::with_paragraph(text),
            selection: Selection::default(),
        }
    }

    fn text(snapshot: &Snapshot) -> String {
        snapshot.document.to_plain_text()
    }

    #[test]
    fn test_undo_and_redo() {
        let mut history = History::default();

        history.push(snapshot("one"));
        history.push(snapshot("two"));
        assert!(history.can_undo());
        assert!(!history.can_redo());

        let previous = history.undo(snapshot("three")).unwrap();
        assert_eq!(text(&previous), "two");
        assert!(history.can_redo());

        let next = history.redo(previous).unwrap();
        assert_eq!(text(&next), "three");
        assert!(!history.can_redo());
    }

    #[test]
    fn test_push_clears_redo_states() {
        let mut history = History::default();

        history.push(snapshot("one"));
        history.push(snapshot("two"));
        let two = history.undo(snapshot("three")).unwrap();
        let one = history.undo(two).unwrap();
        assert_eq!(text(&one), "one");
        assert!(!history.can_undo());

        history.push(one);
        assert!(!history.can_redo());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_limit() {
        let mut history = History::new(3);
        for i in 0..10 {
            history.push(snapshot(&format!("state{}", i)));
        }

        assert_eq!(history.len(), 3);
        let latest = history.undo(snapshot("current")).unwrap();
        assert_eq!(text(&latest), "state9");
    }

    #[test]
    fn test_empty_history() {
        let mut history = History::default();
        assert!(history.is_empty());
        assert!(history.undo(snapshot("x")).is_none());
        assert!(history.redo(snapshot("x")).is_none());
    }
}
