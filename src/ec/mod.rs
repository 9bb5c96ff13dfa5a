//! Equivalence classes, attributes, and projects

pub mod attr;
pub mod eclass;

pub use attr::{AttrSet, Projects};
pub use eclass::{EcId, EcStore};
