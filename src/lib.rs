pub mod app;
pub mod config;
pub mod filters;
pub mod gate;
pub mod hotkey;
pub mod library;
pub mod logging;
pub mod prompts;
pub mod shortcut;
pub mod tags_meta;
