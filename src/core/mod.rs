//! Core types shared by every analysis pass

pub mod config;
pub mod error;
