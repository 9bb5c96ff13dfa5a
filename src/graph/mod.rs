//! Call graph

pub mod call;

pub use call::{CallGraph, CallId, CallNode, Direction};
