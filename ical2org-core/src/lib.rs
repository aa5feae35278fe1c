//! ical2org Core Library
//!
//! This library converts iCalendar VEVENT records into org-mode agenda
//! entries, translating recurrence rules into Emacs diary sexps.

pub mod diary;
pub mod error;
pub mod org;
pub mod parser;
pub mod timezone;
pub mod types;

// Re-export core types and error handling
pub use error::{Error, Result};
pub use types::*;

/// Commonly used items
pub mod prelude {
    pub use crate::{diary::*, org::*, parser::*, timezone::*, types::*};
}
