// Library exports for scribe

pub mod config;
pub mod richtext;

pub use config::EditorConfig;
pub use richtext::editor_surface::{ChangeListener, EditorEvent, EditorSurface, EventResponse};
