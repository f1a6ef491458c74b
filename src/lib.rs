pub mod config;
pub mod error;
pub mod hotkey;
pub mod models;
pub mod wakeword;

pub use error::{AssistantError, Result};
