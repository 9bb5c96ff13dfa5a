//! The preprocessing pipeline: lexer, macro engine, directives

pub mod ifexpr;
pub mod macros;
pub mod pdtoken;
pub mod pltoken;

pub use pdtoken::{Event, Preprocessor};
pub use pltoken::{PpKind, PpTok};
