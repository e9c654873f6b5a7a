pub mod commands;
pub mod editor_surface;
pub mod format_state;
pub mod history;
pub mod keymap;
pub mod markup_converter;
pub mod markup_tree;
pub mod sanitizer;
pub mod selection;
pub mod structured_document;
