//! Front ends that collect a pipeline selection.
//!
//! - [`MenuPrompt`]: interactive terminal menu

mod menu;

pub use menu::MenuPrompt;
