//! Endpoint handlers

pub mod admin;
pub mod files;
pub mod funs;
pub mod ident;
pub mod index;
pub mod qinc;
pub mod queries;

use crate::web::html;
use std::net::SocketAddr;

/// Guard for operations that mutate state or exit: only the local host
/// may perform them.
pub fn local_access(addr: &SocketAddr) -> std::result::Result<(), String> {
    if addr.ip().is_loopback() {
        Ok(())
    } else {
        Err(html::page(
            "Remote access not allowed",
            "<p>This function can not be executed from a remote host.</p>\
             <p>Make sure you are accessing scour as localhost or 127.0.0.1.</p>",
            None,
        ))
    }
}
