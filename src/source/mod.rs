//! Source identity and the character stream

pub mod fchar;
pub mod fileid;
pub mod tokid;

pub use fchar::Fchar;
pub use fileid::{FileId, FileRegistry, IncDetails};
pub use tokid::Tokid;
